//! The row-over-column adapter: turns the columnar data files named by a
//! snapshot's active-file set into a single stream of row-shaped records,
//! via an injected columnar reader. This crate never parses Parquet itself;
//! it only defines the shape a reader hands rows back in and the typed
//! accessors callers pull values out with.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use url::Url;

use crate::error::{DeltaResult, Error};
use crate::schema::{DataType, StructType};
use crate::snapshot::Snapshot;

/// Epoch used for `DataType::Date`: days since 1970-01-01.
fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).expect("valid epoch date")
}

/// A decimal value as an unscaled integer plus its scale, matching the
/// `DecimalType` it was read against (`value == unscaled * 10^-scale`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecimalValue {
    pub unscaled: i128,
    pub scale: u8,
}

/// A single column value, shaped to mirror [`DataType`] one-to-one.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Binary(Vec<u8>),
    Decimal(DecimalValue),
    /// Days since the Unix epoch.
    Date(i32),
    /// Microseconds since the Unix epoch, UTC.
    Timestamp(i64),
    Array(Vec<ColumnValue>),
    Map(Vec<(ColumnValue, ColumnValue)>),
    Struct(RowRecord),
}

impl ColumnValue {
    fn type_name(&self) -> &'static str {
        match self {
            ColumnValue::Null => "null",
            ColumnValue::Boolean(_) => "boolean",
            ColumnValue::Byte(_) => "byte",
            ColumnValue::Short(_) => "short",
            ColumnValue::Integer(_) => "integer",
            ColumnValue::Long(_) => "long",
            ColumnValue::Float(_) => "float",
            ColumnValue::Double(_) => "double",
            ColumnValue::String(_) => "string",
            ColumnValue::Binary(_) => "binary",
            ColumnValue::Decimal(_) => "decimal",
            ColumnValue::Date(_) => "date",
            ColumnValue::Timestamp(_) => "timestamp",
            ColumnValue::Array(_) => "array",
            ColumnValue::Map(_) => "map",
            ColumnValue::Struct(_) => "struct",
        }
    }
}

/// One row of a data file, addressed by column name against the schema it
/// was read with.
#[derive(Debug, Clone)]
pub struct RowRecord {
    schema: Arc<StructType>,
    values: Vec<ColumnValue>,
}

impl RowRecord {
    /// Construct a row. `values` must have exactly one entry per field of
    /// `schema`, in field order; this is an invariant of whatever
    /// [`ColumnReader`] produced the row, not something this type enforces
    /// at construction beyond a length check.
    pub fn new(schema: Arc<StructType>, values: Vec<ColumnValue>) -> DeltaResult<Self> {
        if values.len() != schema.fields.len() {
            return Err(Error::EngineInvariantViolation(format!(
                "row has {} values but schema has {} fields",
                values.len(),
                schema.fields.len()
            )));
        }
        Ok(Self { schema, values })
    }

    pub fn schema(&self) -> &Arc<StructType> {
        &self.schema
    }

    fn field(&self, name: &str) -> DeltaResult<(usize, &DataType)> {
        let index = self
            .schema
            .index_of(name)
            .ok_or_else(|| Error::ColumnNotFound(name.to_string()))?;
        Ok((index, &self.schema.fields[index].data_type))
    }

    fn value(&self, name: &str) -> DeltaResult<&ColumnValue> {
        let (index, _) = self.field(name)?;
        Ok(&self.values[index])
    }

    fn mismatch(name: &str, expected: &str, actual: &ColumnValue) -> Error {
        Error::TypeMismatch {
            name: name.to_string(),
            expected: expected.to_string(),
            actual: actual.type_name().to_string(),
        }
    }

    pub fn is_null(&self, name: &str) -> DeltaResult<bool> {
        Ok(matches!(self.value(name)?, ColumnValue::Null))
    }

    pub fn get_boolean(&self, name: &str) -> DeltaResult<bool> {
        match self.value(name)? {
            ColumnValue::Boolean(v) => Ok(*v),
            other => Err(Self::mismatch(name, "boolean", other)),
        }
    }

    pub fn get_long(&self, name: &str) -> DeltaResult<i64> {
        match self.value(name)? {
            ColumnValue::Long(v) => Ok(*v),
            other => Err(Self::mismatch(name, "long", other)),
        }
    }

    pub fn get_integer(&self, name: &str) -> DeltaResult<i32> {
        match self.value(name)? {
            ColumnValue::Integer(v) => Ok(*v),
            other => Err(Self::mismatch(name, "integer", other)),
        }
    }

    pub fn get_double(&self, name: &str) -> DeltaResult<f64> {
        match self.value(name)? {
            ColumnValue::Double(v) => Ok(*v),
            other => Err(Self::mismatch(name, "double", other)),
        }
    }

    pub fn get_string(&self, name: &str) -> DeltaResult<&str> {
        match self.value(name)? {
            ColumnValue::String(v) => Ok(v.as_str()),
            other => Err(Self::mismatch(name, "string", other)),
        }
    }

    pub fn get_binary(&self, name: &str) -> DeltaResult<&[u8]> {
        match self.value(name)? {
            ColumnValue::Binary(v) => Ok(v.as_slice()),
            other => Err(Self::mismatch(name, "binary", other)),
        }
    }

    pub fn get_decimal(&self, name: &str) -> DeltaResult<DecimalValue> {
        match self.value(name)? {
            ColumnValue::Decimal(v) => Ok(*v),
            other => Err(Self::mismatch(name, "decimal", other)),
        }
    }

    pub fn get_date(&self, name: &str) -> DeltaResult<NaiveDate> {
        match self.value(name)? {
            ColumnValue::Date(days) => Ok(epoch() + chrono::Duration::days(*days as i64)),
            other => Err(Self::mismatch(name, "date", other)),
        }
    }

    /// The timestamp, reinterpreted in `zone` (typically the table's
    /// configured `parquet.time.zone.id`). Stored values are always UTC
    /// microseconds; `zone` only affects how the instant is *displayed*,
    /// not which instant it denotes.
    pub fn get_timestamp(&self, name: &str, zone: Tz) -> DeltaResult<DateTime<Tz>> {
        match self.value(name)? {
            ColumnValue::Timestamp(micros) => {
                let utc = micros_to_utc(*micros)?;
                Ok(utc.with_timezone(&zone))
            }
            other => Err(Self::mismatch(name, "timestamp", other)),
        }
    }

    pub fn get_list(&self, name: &str) -> DeltaResult<&[ColumnValue]> {
        match self.value(name)? {
            ColumnValue::Array(v) => Ok(v.as_slice()),
            other => Err(Self::mismatch(name, "array", other)),
        }
    }

    pub fn get_map(&self, name: &str) -> DeltaResult<&[(ColumnValue, ColumnValue)]> {
        match self.value(name)? {
            ColumnValue::Map(v) => Ok(v.as_slice()),
            other => Err(Self::mismatch(name, "map", other)),
        }
    }

    pub fn get_record(&self, name: &str) -> DeltaResult<&RowRecord> {
        match self.value(name)? {
            ColumnValue::Struct(v) => Ok(v),
            other => Err(Self::mismatch(name, "struct", other)),
        }
    }

    /// The element count of a list/map column, or the byte/char length of a
    /// binary/string column. Not to be confused with [`RowRecord::len`],
    /// which is the row's own arity.
    pub fn get_collection_length(&self, name: &str) -> DeltaResult<usize> {
        match self.value(name)? {
            ColumnValue::Array(v) => Ok(v.len()),
            ColumnValue::Map(v) => Ok(v.len()),
            ColumnValue::Binary(v) => Ok(v.len()),
            ColumnValue::String(v) => Ok(v.len()),
            other => Err(Error::TypeMismatch {
                name: name.to_string(),
                expected: "array, map, binary, or string".to_string(),
                actual: other.type_name().to_string(),
            }),
        }
    }

    /// The row's arity: the number of columns, paired with [`RowRecord::schema`]
    /// to enumerate and address every value in the row positionally.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Equivalent to [`RowRecord::len`]; kept for callers that expect the
    /// `getLength` name directly.
    pub fn get_length(&self) -> usize {
        self.len()
    }
}

fn micros_to_utc(micros: i64) -> DeltaResult<DateTime<Utc>> {
    Utc.timestamp_micros(micros)
        .single()
        .ok_or_else(|| Error::generic(format!("timestamp out of range: {micros} micros")))
}

/// Opens the columnar file at `path` (one of the snapshot's active files)
/// and yields its contents as rows conforming to `schema`. `time_zone`
/// carries the table's configured zone through to the reader in case the
/// underlying format needs it to interpret local, zone-naive timestamp
/// columns (`timestamp_ntz`) at read time; UTC-stamped columns are
/// unaffected.
pub trait ColumnReader {
    fn open_columnar(
        &self,
        path: &Url,
        schema: &Arc<StructType>,
        time_zone: Tz,
    ) -> DeltaResult<Box<dyn Iterator<Item = DeltaResult<RowRecord>>>>;
}

/// Drains a snapshot's active files one at a time, in the order
/// [`Snapshot::all_files`] yields them, presenting their rows as a single
/// stream. Each file's reader is opened lazily, just before its first row is
/// needed, and dropped as soon as its rows are exhausted — so at most one
/// underlying file handle is held open at a time.
pub struct RowIterator<'a> {
    reader: &'a dyn ColumnReader,
    schema: Arc<StructType>,
    time_zone: Tz,
    pending_files: std::vec::IntoIter<Url>,
    current: Option<Box<dyn Iterator<Item = DeltaResult<RowRecord>>>>,
}

impl<'a> RowIterator<'a> {
    pub fn new(snapshot: &Snapshot, reader: &'a dyn ColumnReader) -> DeltaResult<Self> {
        let schema = snapshot.schema()?.clone();
        let time_zone = snapshot.table_config().parquet_time_zone()?;
        let files: Vec<Url> = snapshot
            .all_files()
            .map(|add| crate::path::canonicalize(snapshot.table_root(), &add.path))
            .collect::<DeltaResult<Vec<_>>>()?;
        Ok(Self {
            reader,
            schema,
            time_zone,
            pending_files: files.into_iter(),
            current: None,
        })
    }
}

impl<'a> Iterator for RowIterator<'a> {
    type Item = DeltaResult<RowRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(current) = self.current.as_mut() {
                if let Some(row) = current.next() {
                    return Some(row);
                }
                self.current = None;
            }
            let next_file = self.pending_files.next()?;
            match self.reader.open_columnar(&next_file, &self.schema, self.time_zone) {
                Ok(iter) => self.current = Some(iter),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::StructField;
    use chrono::Timelike;

    fn schema() -> Arc<StructType> {
        Arc::new(
            StructType::new(vec![
                StructField::new("id", DataType::LONG, false),
                StructField::new("name", DataType::STRING, true),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn rejects_wrong_value_count() {
        let err = RowRecord::new(schema(), vec![ColumnValue::Long(1)]).unwrap_err();
        assert!(matches!(err, Error::EngineInvariantViolation(_)));
    }

    #[test]
    fn typed_accessors_round_trip() {
        let row = RowRecord::new(
            schema(),
            vec![ColumnValue::Long(42), ColumnValue::String("hi".to_string())],
        )
        .unwrap();
        assert_eq!(row.get_long("id").unwrap(), 42);
        assert_eq!(row.get_string("name").unwrap(), "hi");
        assert_eq!(row.get_collection_length("name").unwrap(), 2);
        assert_eq!(row.len(), 2);
        assert_eq!(row.get_length(), 2);
    }

    #[test]
    fn wrong_accessor_is_type_mismatch() {
        let row = RowRecord::new(
            schema(),
            vec![ColumnValue::Long(42), ColumnValue::String("hi".to_string())],
        )
        .unwrap();
        let err = row.get_boolean("id").unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn missing_column_is_column_not_found() {
        let row = RowRecord::new(
            schema(),
            vec![ColumnValue::Long(42), ColumnValue::String("hi".to_string())],
        )
        .unwrap();
        assert!(matches!(
            row.get_long("missing"),
            Err(Error::ColumnNotFound(_))
        ));
    }

    #[test]
    fn timestamp_reinterprets_same_instant_in_requested_zone() {
        let schema = Arc::new(
            StructType::new(vec![StructField::new("ts", DataType::TIMESTAMP, false)]).unwrap(),
        );
        // 2024-01-01T00:00:00Z in micros.
        let micros = 1_704_067_200_000_000;
        let row = RowRecord::new(schema, vec![ColumnValue::Timestamp(micros)]).unwrap();
        let utc = row.get_timestamp("ts", Tz::UTC).unwrap();
        let la = row.get_timestamp("ts", Tz::America__Los_Angeles).unwrap();
        assert_eq!(utc.timestamp_micros(), la.timestamp_micros());
        assert_ne!(utc.hour(), la.hour());
    }
}
