//! A number of utilities useful for testing that we want to use in multiple crates.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono_tz::Tz;
use itertools::Itertools;
use lakehouse_kernel::actions::Action;
use lakehouse_kernel::row::{ColumnReader, ColumnValue, RowRecord};
use lakehouse_kernel::schema::StructType;
use lakehouse_kernel::storage::{CheckpointReader, FileMeta, FileStore};
use lakehouse_kernel::{DeltaResult, Error};
use serde_json::json;
use url::Url;

/// A common useful initial metadata and protocol. Also includes a single commitInfo.
pub const METADATA: &str = r#"{"commitInfo":{"timestamp":"2020-04-27T06:23:06.154Z","operation":"WRITE","operationParameters":{"mode":"ErrorIfExists","partitionBy":"[]"},"isBlindAppend":true}}
{"protocol":{"minReaderVersion":1,"minWriterVersion":2}}
{"metaData":{"id":"5fba94ed-9794-4965-ba6e-6ee3c0d22af9","format":{"provider":"parquet","options":{}},"schemaString":"{\"type\":\"struct\",\"fields\":[{\"name\":\"id\",\"type\":\"integer\",\"nullable\":true,\"metadata\":{}},{\"name\":\"val\",\"type\":\"string\",\"nullable\":true,\"metadata\":{}}]}","partitionColumns":[],"configuration":{},"createdTime":1587968585495}}"#;

/// A common useful initial metadata and protocol, with `val` as a partition column.
pub const METADATA_WITH_PARTITION_COLS: &str = r#"{"commitInfo":{"timestamp":"2020-04-27T06:23:06.154Z","operation":"WRITE","operationParameters":{"mode":"ErrorIfExists","partitionBy":"[]"},"isBlindAppend":true}}
{"protocol":{"minReaderVersion":1,"minWriterVersion":2}}
{"metaData":{"id":"5fba94ed-9794-4965-ba6e-6ee3c0d22af9","format":{"provider":"parquet","options":{}},"schemaString":"{\"type\":\"struct\",\"fields\":[{\"name\":\"id\",\"type\":\"integer\",\"nullable\":true,\"metadata\":{}},{\"name\":\"val\",\"type\":\"string\",\"nullable\":true,\"metadata\":{}}]}","partitionColumns":["val"],"configuration":{},"createdTime":1587968585495}}"#;

pub enum TestAction {
    Add(String),
    Remove(String),
    Metadata,
}

/// Convert a vector of actions into a newline delimited json string, with standard metadata.
pub fn actions_to_string(actions: Vec<TestAction>) -> String {
    actions_to_string_with_metadata(actions, METADATA)
}

/// Convert a vector of actions into a newline delimited json string, with metadata including a
/// partition column.
pub fn actions_to_string_partitioned(actions: Vec<TestAction>) -> String {
    actions_to_string_with_metadata(actions, METADATA_WITH_PARTITION_COLS)
}

fn actions_to_string_with_metadata(actions: Vec<TestAction>, metadata: &str) -> String {
    actions
        .into_iter()
        .map(|test_action| match test_action {
            TestAction::Add(path) => format!(
                r#"{{"add":{{"path":"{path}","partitionValues":{{}},"size":262,"modificationTime":1587968586000,"dataChange":true,"stats":"{{\"numRecords\":2,\"nullCount\":{{\"id\":0}},\"minValues\":{{\"id\": 1}},\"maxValues\":{{\"id\":3}}}}"}}}}"#
            ),
            TestAction::Remove(path) => format!(
                r#"{{"remove":{{"path":"{path}","partitionValues":{{}},"size":262,"modificationTime":1587968586000,"dataChange":true}}}}"#
            ),
            TestAction::Metadata => metadata.into(),
        })
        .join("\n")
}

/// The file name (not path) for a commit at `version`.
pub fn delta_path_for_version(version: u64, suffix: &str) -> String {
    format!("{version:020}.{suffix}")
}

/// An in-memory [`FileStore`] backing this crate's and `kernel`'s own tests. Not meant to model
/// concurrent-writer semantics, just to give `Snapshot::try_new` something real to read from.
#[derive(Default)]
pub struct MemoryStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, location: &Url, contents: Vec<u8>) {
        self.files
            .lock()
            .unwrap()
            .insert(location.to_string(), contents);
    }

    /// Write a commit file for `table_root` at `version` containing `data` (already
    /// newline-delimited JSON, as produced by [`actions_to_string`]).
    pub fn commit(&self, table_root: &Url, version: u64, data: &str) -> DeltaResult<()> {
        let location = table_root.join(&format!(
            "_delta_log/{}",
            delta_path_for_version(version, "json")
        ))?;
        self.put(&location, data.as_bytes().to_vec());
        Ok(())
    }

    /// Write a `_last_checkpoint` hint pointing at `version`.
    pub fn write_checkpoint_hint(&self, table_root: &Url, version: u64, parts: Option<u32>) -> DeltaResult<()> {
        let location = table_root.join("_delta_log/_last_checkpoint")?;
        let hint = json!({ "version": version, "size": 0, "parts": parts });
        self.put(&location, hint.to_string().into_bytes());
        Ok(())
    }
}

impl FileStore for MemoryStore {
    fn list_log(&self, table_root: &Url) -> DeltaResult<Vec<FileMeta>> {
        let prefix = format!("{table_root}_delta_log/");
        let files = self.files.lock().unwrap();
        Ok(files
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix) && !k.ends_with("_last_checkpoint"))
            .map(|(k, v)| FileMeta {
                location: Url::parse(k).expect("stored keys are always valid URLs"),
                size: v.len() as u64,
                last_modified: 0,
            })
            .collect())
    }

    fn read(&self, location: &Url) -> DeltaResult<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(location.as_str())
            .cloned()
            .ok_or_else(|| Error::generic(format!("no such file: {location}")))
    }
}

/// A [`FileStore`] backed by the real local filesystem, for pointing tooling (the `inspect-table`
/// demo) at an actual on-disk table instead of the in-memory fixtures used by this crate's own
/// tests. Lives here rather than in `lakehouse-kernel` itself, which is kept free of concrete I/O
/// so its replay/snapshot logic can be unit tested without touching a filesystem at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileStore;

impl FileStore for LocalFileStore {
    fn list_log(&self, table_root: &Url) -> DeltaResult<Vec<FileMeta>> {
        let log_dir = table_root
            .to_file_path()
            .map_err(|_| Error::generic(format!("'{table_root}' is not a local path")))?
            .join("_delta_log");
        if !log_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&log_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let meta = entry.metadata()?;
            let last_modified = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as i64)
                .unwrap_or(0);
            out.push(FileMeta {
                location: Url::from_file_path(entry.path())
                    .map_err(|_| Error::generic("non-UTF8 log path"))?,
                size: meta.len(),
                last_modified,
            });
        }
        Ok(out)
    }

    fn read(&self, location: &Url) -> DeltaResult<Vec<u8>> {
        let path = location
            .to_file_path()
            .map_err(|_| Error::generic(format!("'{location}' is not a local path")))?;
        Ok(std::fs::read(path)?)
    }
}

/// A [`CheckpointReader`] that can't actually decode Parquet, returning an empty action list for
/// every checkpoint. Sufficient for tests that only exercise commit-file replay.
pub struct NoopCheckpointReader;

impl CheckpointReader for NoopCheckpointReader {
    fn read_checkpoint(&self, _location: &Url) -> DeltaResult<Vec<Action>> {
        Ok(Vec::new())
    }
}

/// Create a minimal empty table at `table_root`: a single commit with protocol + metadata, no
/// data files. Mirrors the shape real writers produce for a brand new table.
pub fn create_table(
    store: &MemoryStore,
    table_root: &Url,
    schema_string: &str,
    partition_columns: &[&str],
) -> DeltaResult<()> {
    let protocol = json!({
        "protocol": { "minReaderVersion": 1, "minWriterVersion": 2 }
    });
    let metadata = json!({
        "metaData": {
            "id": "00000000-0000-4000-8000-000000000000",
            "format": { "provider": "parquet", "options": {} },
            "schemaString": schema_string,
            "partitionColumns": partition_columns,
            "configuration": {},
            "createdTime": 1_677_811_175_819u64
        }
    });
    let data = format!("{protocol}\n{metadata}");
    store.commit(table_root, 0, &data)
}

/// Like [`create_table`], but lets the caller set `Metadata.configuration`
/// directly (e.g. `parquet.time.zone.id`) instead of always writing `{}`.
pub fn create_table_with_config(
    store: &MemoryStore,
    table_root: &Url,
    schema_string: &str,
    partition_columns: &[&str],
    configuration: &HashMap<String, String>,
) -> DeltaResult<()> {
    let protocol = json!({
        "protocol": { "minReaderVersion": 1, "minWriterVersion": 2 }
    });
    let metadata = json!({
        "metaData": {
            "id": "00000000-0000-4000-8000-000000000000",
            "format": { "provider": "parquet", "options": {} },
            "schemaString": schema_string,
            "partitionColumns": partition_columns,
            "configuration": configuration,
            "createdTime": 1_677_811_175_819u64
        }
    });
    let data = format!("{protocol}\n{metadata}");
    store.commit(table_root, 0, &data)
}

/// A fixed set of rows to hand back for one data file, keyed by the file's
/// canonical `Url` string. Each row is the field values of one `RowRecord`,
/// in schema field order.
type Fixture = HashMap<String, Vec<Vec<ColumnValue>>>;

/// A [`ColumnReader`] that serves pre-built rows out of an in-memory map
/// instead of decoding Parquet, so `kernel`'s own tests can drive a
/// [`lakehouse_kernel::row::RowIterator`] without a real columnar reader.
/// Also records, for each `open_columnar` call, the path opened and how
/// many files were open at once, so a test can assert the iterator drains
/// one file at a time rather than eagerly opening all of them.
pub struct MockColumnReader {
    fixture: Fixture,
    open_order: Mutex<Vec<String>>,
    open_count: Arc<AtomicUsize>,
    max_concurrent_open: Arc<AtomicUsize>,
}

impl MockColumnReader {
    pub fn new(fixture: Fixture) -> Self {
        Self {
            fixture,
            open_order: Mutex::new(Vec::new()),
            open_count: Arc::new(AtomicUsize::new(0)),
            max_concurrent_open: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The paths opened so far, in the order `open_columnar` was called.
    pub fn open_order(&self) -> Vec<String> {
        self.open_order.lock().unwrap().clone()
    }

    /// The largest number of files this reader ever had open at once.
    pub fn max_concurrent_open(&self) -> usize {
        self.max_concurrent_open.load(Ordering::SeqCst)
    }
}

impl ColumnReader for MockColumnReader {
    fn open_columnar(
        &self,
        path: &Url,
        schema: &Arc<StructType>,
        _time_zone: Tz,
    ) -> DeltaResult<Box<dyn Iterator<Item = DeltaResult<RowRecord>>>> {
        let rows = self
            .fixture
            .get(path.as_str())
            .cloned()
            .ok_or_else(|| Error::generic(format!("no fixture rows for '{path}'")))?;

        self.open_order.lock().unwrap().push(path.to_string());
        let now_open = self.open_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_open.fetch_max(now_open, Ordering::SeqCst);

        let schema = schema.clone();
        let records: Vec<DeltaResult<RowRecord>> = rows
            .into_iter()
            .map(move |values| RowRecord::new(schema.clone(), values))
            .collect();
        Ok(Box::new(MockFileRows {
            rows: records.into_iter(),
            open_count: self.open_count.clone(),
        }))
    }
}

/// The per-file row iterator [`MockColumnReader`] hands back. Decrements the
/// shared open-file count on drop, mirroring a real reader releasing its
/// file handle when the caller is done with it.
struct MockFileRows {
    rows: std::vec::IntoIter<DeltaResult<RowRecord>>,
    open_count: Arc<AtomicUsize>,
}

impl Iterator for MockFileRows {
    type Item = DeltaResult<RowRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next()
    }
}

impl Drop for MockFileRows {
    fn drop(&mut self) {
        self.open_count.fetch_sub(1, Ordering::SeqCst);
    }
}
