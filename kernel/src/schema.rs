//! Algebraic schema model and its JSON codec.
//!
//! The wire format for a schema is a single JSON value: either a quoted
//! primitive type name, a `decimal(p,s)` string, or an object tagged by
//! `"type"` (`"array"`, `"map"`, `"struct"`). Field/struct-level metadata and
//! nullability live alongside the type, not inside it. We model the
//! recursive structure as `DataType` and hand-roll its (de)serialization
//! instead of deriving it, since serde's derive can't express "tag lives in
//! the `type` key, but only for object variants, and primitives are bare
//! strings".

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use serde::de::Error as DeError;
use serde::ser::Error as SerError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{DeltaResult, Error};

/// A decimal's precision (total digits) and scale (digits after the point).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecimalType {
    pub precision: u8,
    pub scale: u8,
}

impl DecimalType {
    pub const MAX_PRECISION: u8 = 38;

    pub fn try_new(precision: u8, scale: u8) -> DeltaResult<Self> {
        if precision == 0 || precision > Self::MAX_PRECISION {
            return Err(Error::invalid_schema(format!(
                "decimal precision {precision} out of range 1..={}",
                Self::MAX_PRECISION
            )));
        }
        if scale > precision {
            return Err(Error::invalid_schema(format!(
                "decimal scale {scale} exceeds precision {precision}"
            )));
        }
        Ok(Self { precision, scale })
    }
}

impl fmt::Display for DecimalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "decimal({},{})", self.precision, self.scale)
    }
}

/// The full set of primitive (non-nested) leaf types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    String,
    Long,
    Integer,
    Short,
    Byte,
    Float,
    Double,
    Boolean,
    Binary,
    Date,
    Timestamp,
}

impl PrimitiveType {
    fn as_str(&self) -> &'static str {
        match self {
            PrimitiveType::String => "string",
            PrimitiveType::Long => "long",
            PrimitiveType::Integer => "integer",
            PrimitiveType::Short => "short",
            PrimitiveType::Byte => "byte",
            PrimitiveType::Float => "float",
            PrimitiveType::Double => "double",
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Binary => "binary",
            PrimitiveType::Date => "date",
            PrimitiveType::Timestamp => "timestamp",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "string" => PrimitiveType::String,
            "long" => PrimitiveType::Long,
            "integer" => PrimitiveType::Integer,
            "short" => PrimitiveType::Short,
            "byte" => PrimitiveType::Byte,
            "float" => PrimitiveType::Float,
            "double" => PrimitiveType::Double,
            "boolean" => PrimitiveType::Boolean,
            "binary" => PrimitiveType::Binary,
            "date" => PrimitiveType::Date,
            "timestamp" => PrimitiveType::Timestamp,
            _ => return None,
        })
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The recursive type algebra: a leaf (primitive or decimal) or one of the
/// three nested shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    Primitive(PrimitiveType),
    Decimal(DecimalType),
    Array(Box<ArrayType>),
    Map(Box<MapType>),
    Struct(Box<StructType>),
}

impl DataType {
    pub const STRING: DataType = DataType::Primitive(PrimitiveType::String);
    pub const LONG: DataType = DataType::Primitive(PrimitiveType::Long);
    pub const INTEGER: DataType = DataType::Primitive(PrimitiveType::Integer);
    pub const BOOLEAN: DataType = DataType::Primitive(PrimitiveType::Boolean);
    pub const BINARY: DataType = DataType::Primitive(PrimitiveType::Binary);
    pub const DATE: DataType = DataType::Primitive(PrimitiveType::Date);
    pub const TIMESTAMP: DataType = DataType::Primitive(PrimitiveType::Timestamp);

    pub fn decimal(precision: u8, scale: u8) -> DeltaResult<Self> {
        Ok(DataType::Decimal(DecimalType::try_new(precision, scale)?))
    }

    /// Parse from a `serde_json::Value`, the shape produced by parsing a raw
    /// `schema_string`.
    pub fn from_value(value: &Value) -> DeltaResult<Self> {
        match value {
            Value::String(s) => Self::from_primitive_str(s),
            Value::Object(_) => {
                let tag = value
                    .get("type")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::invalid_schema("nested type missing 'type' tag"))?;
                match tag {
                    "array" => Ok(DataType::Array(Box::new(ArrayType::from_value(value)?))),
                    "map" => Ok(DataType::Map(Box::new(MapType::from_value(value)?))),
                    "struct" => Ok(DataType::Struct(Box::new(StructType::from_value(value)?))),
                    other => Err(Error::UnsupportedType(other.to_string())),
                }
            }
            other => Err(Error::invalid_schema(format!(
                "expected a type name or object, found {other}"
            ))),
        }
    }

    fn from_primitive_str(s: &str) -> DeltaResult<Self> {
        if let Some(p) = PrimitiveType::from_str(s) {
            return Ok(DataType::Primitive(p));
        }
        if s == "decimal" {
            // Bare "decimal" with no (precision,scale) suffix falls back to (10,0).
            return Self::decimal(10, 0);
        }
        if let Some(rest) = s.strip_prefix("decimal(").and_then(|r| r.strip_suffix(')')) {
            let (p, s) = rest
                .split_once(',')
                .ok_or_else(|| Error::invalid_schema(format!("malformed decimal type '{s}'")))?;
            let precision: u8 = p
                .trim()
                .parse()
                .map_err(|_| Error::invalid_schema(format!("malformed decimal precision '{p}'")))?;
            let scale: u8 = s
                .trim()
                .parse()
                .map_err(|_| Error::invalid_schema(format!("malformed decimal scale '{s}'")))?;
            return Self::decimal(precision, scale);
        }
        Err(Error::UnsupportedType(s.to_string()))
    }

    /// Render back to the wire `Value` shape.
    pub fn to_value(&self) -> Value {
        match self {
            DataType::Primitive(p) => Value::String(p.as_str().to_string()),
            DataType::Decimal(d) => Value::String(d.to_string()),
            DataType::Array(a) => a.to_value(),
            DataType::Map(m) => m.to_value(),
            DataType::Struct(s) => s.to_value(),
        }
    }

    pub fn as_struct(&self) -> Option<&StructType> {
        match self {
            DataType::Struct(s) => Some(s),
            _ => None,
        }
    }
}

impl Serialize for DataType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value()
            .serialize(serializer)
            .map_err(S::Error::custom)
    }
}

impl<'de> Deserialize<'de> for DataType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        DataType::from_value(&value).map_err(D::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayType {
    pub element_type: DataType,
    pub contains_null: bool,
}

impl ArrayType {
    pub fn new(element_type: DataType, contains_null: bool) -> Self {
        Self {
            element_type,
            contains_null,
        }
    }

    fn from_value(value: &Value) -> DeltaResult<Self> {
        let element_type = value
            .get("elementType")
            .ok_or_else(|| Error::invalid_schema("array type missing 'elementType'"))
            .and_then(DataType::from_value)?;
        let contains_null = value
            .get("containsNull")
            .and_then(Value::as_bool)
            .ok_or_else(|| Error::invalid_schema("array type missing 'containsNull'"))?;
        Ok(Self {
            element_type,
            contains_null,
        })
    }

    fn to_value(&self) -> Value {
        serde_json::json!({
            "type": "array",
            "elementType": self.element_type.to_value(),
            "containsNull": self.contains_null,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapType {
    pub key_type: DataType,
    pub value_type: DataType,
    pub value_contains_null: bool,
}

impl MapType {
    pub fn new(key_type: DataType, value_type: DataType, value_contains_null: bool) -> Self {
        Self {
            key_type,
            value_type,
            value_contains_null,
        }
    }

    fn from_value(value: &Value) -> DeltaResult<Self> {
        let key_type = value
            .get("keyType")
            .ok_or_else(|| Error::invalid_schema("map type missing 'keyType'"))
            .and_then(DataType::from_value)?;
        let value_type = value
            .get("valueType")
            .ok_or_else(|| Error::invalid_schema("map type missing 'valueType'"))
            .and_then(DataType::from_value)?;
        let value_contains_null = value
            .get("valueContainsNull")
            .and_then(Value::as_bool)
            .ok_or_else(|| Error::invalid_schema("map type missing 'valueContainsNull'"))?;
        Ok(Self {
            key_type,
            value_type,
            value_contains_null,
        })
    }

    fn to_value(&self) -> Value {
        serde_json::json!({
            "type": "map",
            "keyType": self.key_type.to_value(),
            "valueType": self.value_type.to_value(),
            "valueContainsNull": self.value_contains_null,
        })
    }
}

/// A single field of a struct: name, type, nullability, and free-form
/// metadata carried opaquely (we don't interpret column-mapping ids/physical
/// names, but we preserve them so a round-trip is lossless).
#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub metadata: IndexMap<String, Value>,
}

impl StructField {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
            metadata: IndexMap::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: IndexMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    fn from_value(value: &Value) -> DeltaResult<Self> {
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid_schema("struct field missing 'name'"))?
            .to_string();
        let data_type = value
            .get("type")
            .ok_or_else(|| Error::invalid_schema(format!("field '{name}' missing 'type'")))
            .and_then(DataType::from_value)?;
        let nullable = value
            .get("nullable")
            .and_then(Value::as_bool)
            .ok_or_else(|| Error::invalid_schema(format!("field '{name}' missing 'nullable'")))?;
        let metadata = match value.get("metadata") {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            Some(_) => {
                return Err(Error::invalid_schema(format!(
                    "field '{name}' has non-object 'metadata'"
                )))
            }
            None => IndexMap::new(),
        };
        Ok(Self {
            name,
            data_type,
            nullable,
            metadata,
        })
    }

    fn to_value(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "type": self.data_type.to_value(),
            "nullable": self.nullable,
            "metadata": Value::Object(
                self.metadata.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
            ),
        })
    }
}

/// An ordered, named collection of fields. Field order is preserved exactly
/// as parsed since it determines column position in the underlying files.
#[derive(Debug, Clone, PartialEq)]
pub struct StructType {
    pub fields: Vec<StructField>,
}

impl StructType {
    pub fn new(fields: Vec<StructField>) -> DeltaResult<Self> {
        let mut seen = HashMap::with_capacity(fields.len());
        for field in &fields {
            if seen.insert(field.name.as_str(), ()).is_some() {
                return Err(Error::invalid_schema(format!(
                    "duplicate struct field name '{}'",
                    field.name
                )));
            }
        }
        Ok(Self { fields })
    }

    pub fn field(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Parse a full schema from its canonical JSON-string representation
    /// (the value carried in `Metadata.schema_string`).
    pub fn parse_json(schema_string: &str) -> DeltaResult<Self> {
        let value: Value = serde_json::from_str(schema_string)
            .map_err(|e| Error::invalid_schema(format!("malformed schema JSON: {e}")))?;
        Self::from_value(&value)
    }

    pub fn to_json_string(&self) -> String {
        self.to_value().to_string()
    }

    fn from_value(value: &Value) -> DeltaResult<Self> {
        let tag = value.get("type").and_then(Value::as_str);
        if tag != Some("struct") {
            return Err(Error::invalid_schema(
                "top-level schema must be a struct type",
            ));
        }
        let fields = value
            .get("fields")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::invalid_schema("struct type missing 'fields' array"))?
            .iter()
            .map(StructField::from_value)
            .collect::<DeltaResult<Vec<_>>>()?;
        Self::new(fields)
    }

    fn to_value(&self) -> Value {
        serde_json::json!({
            "type": "struct",
            "fields": self.fields.iter().map(StructField::to_value).collect::<Vec<_>>(),
        })
    }
}
