//! The action model: the five record shapes that make up a commit JSON line,
//! and their wire codec.
//!
//! Each line of a commit file is a JSON object with at most one of
//! `metaData`, `add`, `remove`, `protocol`, `commitInfo` populated; any other
//! top-level key (e.g. a `txn` or `domainMetadata` record from a newer
//! writer) is tolerated and ignored. We decode the line into an
//! [`indexmap::IndexMap`] of raw JSON spans first and dispatch on whichever
//! recognized key is present, rather than through a `serde_json::Value`
//! tree, so that `commitInfo.operationParameters` — which must be re-emitted
//! byte-for-byte — never gets rebuilt through a lossy intermediate.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use uuid::Uuid;

use crate::error::{DeltaResult, Error};

const KNOWN_VARIANT_KEYS: [&str; 5] = ["metaData", "add", "remove", "protocol", "commitInfo"];

/// `Metadata.format`: the file format backing the table's data files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Format {
    pub provider: String,
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl Default for Format {
    fn default() -> Self {
        Self {
            provider: "parquet".to_string(),
            options: HashMap::new(),
        }
    }
}

/// The table's schema and partitioning, as of the commit that introduced or
/// last replaced it. `schema_string` is kept raw here; parsing it into a
/// [`crate::schema::StructType`] and caching the result is the [`crate::snapshot::Snapshot`]'s
/// job, not this struct's, so that two `Metadata` values with the same
/// schema string remain trivially `PartialEq`-comparable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub format: Format,
    pub schema_string: String,
    #[serde(default)]
    pub partition_columns: Vec<String>,
    #[serde(default)]
    pub created_time: Option<i64>,
    #[serde(default)]
    pub configuration: HashMap<String, String>,
}

/// The minimum reader/writer protocol versions a client must support to
/// operate on the table. The spec's action model carries no feature-list
/// fields, only the two version numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Protocol {
    pub min_reader_version: i32,
    pub min_writer_version: i32,
}

/// A data file added to the table's logical contents as of this commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Add {
    pub path: String,
    #[serde(default)]
    pub partition_values: HashMap<String, String>,
    pub size: i64,
    pub modification_time: i64,
    pub data_change: bool,
    #[serde(default)]
    pub stats: Option<String>,
    #[serde(default)]
    pub tags: Option<HashMap<String, String>>,
}

/// A data file logically removed from the table as of this commit. Stays in
/// the log as a tombstone until it ages out of the retention window (log
/// truncation is outside this reader's scope).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Remove {
    pub path: String,
    #[serde(default)]
    pub deletion_timestamp: Option<i64>,
    #[serde(default = "default_true")]
    pub data_change: bool,
    #[serde(default)]
    pub extended_file_metadata: Option<bool>,
    #[serde(default)]
    pub partition_values: Option<HashMap<String, String>>,
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(default)]
    pub tags: Option<HashMap<String, String>>,
}

fn default_true() -> bool {
    true
}

/// A free-form record describing the operation that produced a commit.
/// `operation_parameters` values are pre-serialized JSON fragments (e.g. a
/// predicate string, or a `"[\"date\"]"`-style partition list) and must be
/// re-emitted exactly as received, never re-quoted or reformatted — hence
/// `Box<RawValue>` rather than `serde_json::Value`.
///
/// `version` is optional: a writer's first commit has no `readVersion` to
/// report and some writers omit `version` on every commit, relying on the
/// commit file's own name to carry it. Call sites must handle its absence
/// rather than assume it is always populated. `timestamp` and `operation`,
/// unlike `version`, are required on the wire; a record missing either one
/// fails to decode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    #[serde(default)]
    pub version: Option<i64>,
    #[serde(with = "timestamp_millis")]
    pub timestamp: i64,
    pub operation: String,
    #[serde(default)]
    pub operation_parameters: Option<IndexMap<String, Box<RawValue>>>,
    #[serde(default)]
    pub is_blind_append: Option<bool>,
    #[serde(default)]
    pub engine_info: Option<String>,
    #[serde(default)]
    pub txn_id: Option<String>,
    /// Anything else a writer included (`isolationLevel`, `operationMetrics`,
    /// ...) is preserved raw so a decode-then-encode round trip is lossless.
    #[serde(flatten)]
    pub extra: IndexMap<String, Box<RawValue>>,
}

/// Serializes/deserializes an `i64` millisecond epoch timestamp as an
/// ISO-8601 string on the wire (unlike `Remove.deletion_timestamp`, which
/// stays a bare integer).
mod timestamp_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        let dt = DateTime::<Utc>::from_timestamp_millis(*value)
            .ok_or_else(|| serde::ser::Error::custom(format!("timestamp {value} out of range")))?;
        serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        let s = String::deserialize(deserializer)?;
        let dt = DateTime::parse_from_rfc3339(&s)
            .map_err(|e| D::Error::custom(format!("invalid ISO-8601 timestamp '{s}': {e}")))?;
        Ok(dt.with_timezone(&Utc).timestamp_millis())
    }
}

/// One decoded line of a commit or checkpoint file.
#[derive(Debug, Clone)]
pub enum Action {
    Metadata(Metadata),
    Add(Add),
    Remove(Remove),
    Protocol(Protocol),
    CommitInfo(CommitInfo),
    /// A record whose top-level key isn't one this reader recognizes (e.g.
    /// `txn`, `domainMetadata`). Carried through decode so callers that want
    /// every line can see it, but ignored by log replay.
    Unknown,
}

/// Decode one line of a commit/checkpoint file into an [`Action`].
///
/// The whole line is first parsed into an [`IndexMap`] of raw JSON spans so
/// that only the one recognized variant key gets a second, targeted parse —
/// any nested raw values inside it (like `commitInfo.operationParameters`)
/// pass through untouched. Returns [`Error::CodecError`] if more than one of
/// the five variant keys is populated.
pub fn decode_line(line: &str) -> DeltaResult<Action> {
    let top: IndexMap<String, Box<RawValue>> = serde_json::from_str(line)
        .map_err(|e| Error::codec(format!("malformed action record: {e}")))?;

    let mut present: Vec<&str> = KNOWN_VARIANT_KEYS
        .iter()
        .copied()
        .filter(|key| top.contains_key(*key))
        .collect();

    if present.len() > 1 {
        present.sort_unstable();
        return Err(Error::codec(format!(
            "action record has more than one variant populated: {}",
            present.join(", ")
        )));
    }

    let Some(key) = present.first().copied() else {
        if let Some(unknown_key) = top.keys().next() {
            tracing::debug!(key = unknown_key, "unrecognized action key, ignoring record");
        }
        return Ok(Action::Unknown);
    };
    let raw = &top[key];

    let parse_err = |e: serde_json::Error| Error::codec(format!("malformed '{key}' record: {e}"));
    match key {
        "metaData" => Ok(Action::Metadata(
            serde_json::from_str(raw.get()).map_err(parse_err)?,
        )),
        "add" => {
            let add: Add = serde_json::from_str(raw.get()).map_err(parse_err)?;
            if add.path.is_empty() {
                return Err(Error::codec("'add' record has an empty path"));
            }
            Ok(Action::Add(add))
        }
        "remove" => {
            let remove: Remove = serde_json::from_str(raw.get()).map_err(parse_err)?;
            if remove.path.is_empty() {
                return Err(Error::codec("'remove' record has an empty path"));
            }
            Ok(Action::Remove(remove))
        }
        "protocol" => Ok(Action::Protocol(
            serde_json::from_str(raw.get()).map_err(parse_err)?,
        )),
        "commitInfo" => Ok(Action::CommitInfo(
            serde_json::from_str(raw.get()).map_err(parse_err)?,
        )),
        _ => unreachable!("key is one of KNOWN_VARIANT_KEYS"),
    }
}

/// Encode an [`Action`] back to a single JSON line (no trailing newline).
/// [`Action::Unknown`] has no encode representation: it only arises from
/// decoding a record this reader doesn't originate.
pub fn encode(action: &Action) -> DeltaResult<String> {
    let value = match action {
        Action::Metadata(m) => serde_json::json!({ "metaData": m }),
        Action::Add(a) => serde_json::json!({ "add": a }),
        Action::Remove(r) => serde_json::json!({ "remove": r }),
        Action::Protocol(p) => serde_json::json!({ "protocol": p }),
        Action::CommitInfo(c) => serde_json::json!({ "commitInfo": c }),
        Action::Unknown => {
            return Err(Error::EngineInvariantViolation(
                "cannot encode an Unknown action".to_string(),
            ))
        }
    };
    serde_json::to_string(&value).map_err(|e| Error::codec(format!("failed to encode action: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata_line() -> String {
        serde_json::json!({
            "metaData": {
                "id": "a1b2c3d4-e5f6-4789-a012-3456789abcde",
                "format": { "provider": "parquet", "options": {} },
                "schemaString": "{\"type\":\"struct\",\"fields\":[]}",
                "partitionColumns": [],
                "configuration": {},
                "createdTime": 1000
            }
        })
        .to_string()
    }

    #[test]
    fn decodes_metadata() {
        let action = decode_line(&sample_metadata_line()).unwrap();
        match action {
            Action::Metadata(m) => {
                assert_eq!(m.id.to_string(), "a1b2c3d4-e5f6-4789-a012-3456789abcde");
                assert_eq!(m.format.provider, "parquet");
            }
            other => panic!("expected Metadata, got {other:?}"),
        }
    }

    #[test]
    fn decodes_protocol() {
        let line = serde_json::json!({
            "protocol": { "minReaderVersion": 1, "minWriterVersion": 2 }
        })
        .to_string();
        match decode_line(&line).unwrap() {
            Action::Protocol(p) => {
                assert_eq!(p.min_reader_version, 1);
                assert_eq!(p.min_writer_version, 2);
            }
            other => panic!("expected Protocol, got {other:?}"),
        }
    }

    #[test]
    fn rejects_multiple_populated_variants() {
        let line = serde_json::json!({
            "add": {
                "path": "f1.parquet",
                "partitionValues": {},
                "size": 100,
                "modificationTime": 1,
                "dataChange": true
            },
            "remove": {
                "path": "f2.parquet",
                "dataChange": true
            }
        })
        .to_string();
        assert!(matches!(decode_line(&line), Err(Error::CodecError(_))));
    }

    #[test]
    fn tolerates_unrecognized_top_level_keys() {
        let line = serde_json::json!({
            "txn": { "appId": "writer-1", "version": 3 }
        })
        .to_string();
        assert!(matches!(decode_line(&line).unwrap(), Action::Unknown));
    }

    #[test]
    fn rejects_empty_add_path() {
        let line = serde_json::json!({
            "add": {
                "path": "",
                "partitionValues": {},
                "size": 1,
                "modificationTime": 1,
                "dataChange": true
            }
        })
        .to_string();
        assert!(matches!(decode_line(&line), Err(Error::CodecError(_))));
    }

    #[test]
    fn commit_info_operation_parameters_round_trip_byte_exact() {
        // The nested value is deliberately compact (no spaces) so we can
        // assert the re-encoded line preserves it exactly, rather than
        // normalizing through a Value tree which would be legal JSON but a
        // different byte sequence.
        let line = r#"{"commitInfo":{"timestamp":"2023-11-14T22:13:20.000Z","operation":"WRITE","operationParameters":{"mode":"Append","partitionBy":"[\"date\"]"}}}"#;
        let action = decode_line(line).unwrap();
        let Action::CommitInfo(info) = &action else {
            panic!("expected CommitInfo");
        };
        assert_eq!(info.timestamp, 1700000000000);
        assert_eq!(info.operation, "WRITE");
        let params = info.operation_parameters.as_ref().unwrap();
        assert_eq!(params["mode"].get(), r#""Append""#);
        assert_eq!(params["partitionBy"].get(), r#""[\"date\"]""#);

        let re_encoded = encode(&action).unwrap();
        let reparsed = decode_line(&re_encoded).unwrap();
        let Action::CommitInfo(info2) = reparsed else {
            panic!("expected CommitInfo");
        };
        assert_eq!(
            info2.operation_parameters.unwrap()["partitionBy"].get(),
            r#""[\"date\"]""#
        );
    }

    #[test]
    fn commit_info_timestamp_is_iso8601_on_the_wire() {
        let info = CommitInfo {
            version: None,
            timestamp: 1700000000000,
            operation: "WRITE".to_string(),
            operation_parameters: None,
            is_blind_append: None,
            engine_info: None,
            txn_id: None,
            extra: IndexMap::new(),
        };
        let line = encode(&Action::CommitInfo(info)).unwrap();
        assert!(line.contains(r#""timestamp":"2023-11-14T22:13:20.000Z""#));
    }

    #[test]
    fn commit_info_missing_timestamp_is_codec_error() {
        let line = r#"{"commitInfo":{"operation":"WRITE"}}"#;
        assert!(matches!(decode_line(line), Err(Error::CodecError(_))));
    }

    #[test]
    fn commit_info_missing_operation_is_codec_error() {
        let line = r#"{"commitInfo":{"timestamp":"2023-11-14T22:13:20.000Z"}}"#;
        assert!(matches!(decode_line(line), Err(Error::CodecError(_))));
    }

    #[test]
    fn tolerates_unrecognized_top_level_keys_logs_the_key() {
        let line = serde_json::json!({
            "domainMetadata": { "domain": "delta.constraints", "configuration": "{}" }
        })
        .to_string();
        assert!(matches!(decode_line(&line).unwrap(), Action::Unknown));
    }

    #[test]
    fn add_round_trips_through_encode_decode() {
        let add = Add {
            path: "part-00000.parquet".to_string(),
            partition_values: HashMap::new(),
            size: 1234,
            modification_time: 1700000000000,
            data_change: true,
            stats: Some(r#"{"numRecords":10}"#.to_string()),
            tags: None,
        };
        let action = Action::Add(add.clone());
        let line = encode(&action).unwrap();
        match decode_line(&line).unwrap() {
            Action::Add(decoded) => assert_eq!(decoded, add),
            other => panic!("expected Add, got {other:?}"),
        }
    }
}
