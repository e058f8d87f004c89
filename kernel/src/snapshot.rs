//! The consistent, point-in-time view of a table produced by folding a log
//! segment: current protocol, current metadata, the set of files that make
//! up the table's logical contents, and tombstones still in the retention
//! window.

use std::sync::{Arc, OnceLock};

use url::Url;

use crate::actions::{decode_line, Action, Add, Metadata, Protocol, Remove};
use crate::config::TableConfig;
use crate::error::{DeltaResult, Error};
use crate::log_segment::{LogPathFileType, LogSegment, Version};
use crate::path;
use crate::replay::ReplayState;
use crate::schema::StructType;
use crate::storage::{CheckpointReader, FileStore};

/// A consistent view of a table at a single version.
pub struct Snapshot {
    table_root: Url,
    version: Version,
    protocol: Option<Protocol>,
    metadata: Metadata,
    active_files: indexmap::IndexMap<Url, Add>,
    tombstones: indexmap::IndexMap<Url, Remove>,
    size_in_bytes: i64,
    num_adds: u64,
    num_removes: u64,
    num_metadata: u64,
    num_protocol: u64,
    schema: OnceLock<Arc<StructType>>,
}

impl Snapshot {
    /// Build the snapshot at `version` (or the latest available version, if
    /// `None`), by discovering the relevant log segment, decoding any
    /// checkpoint, and folding every commit on top of it in order.
    ///
    /// Returns [`Error::TableNotFound`] if no commits or checkpoint exist at
    /// or before the requested version.
    pub fn try_new(
        table_root: &str,
        version: Option<Version>,
        store: &dyn FileStore,
        checkpoint_reader: &dyn CheckpointReader,
    ) -> DeltaResult<Self> {
        let table_root = path::table_root_url(table_root)?;

        let segment = LogSegment::discover(store, &table_root, version)?
            .ok_or_else(|| Error::TableNotFound(table_root.to_string()))?;

        let mut state = ReplayState::new();

        if !segment.checkpoint_parts.is_empty() {
            let checkpoint_version = segment.checkpoint_parts[0].version;
            let mut actions = Vec::new();
            for part in &segment.checkpoint_parts {
                debug_assert!(matches!(part.file_type, LogPathFileType::Checkpoint { .. }));
                actions.extend(checkpoint_reader.read_checkpoint(&part.location)?);
            }
            state.apply(checkpoint_version, &table_root, actions)?;
        }

        for commit in &segment.commit_files {
            let bytes = store.read(&commit.location)?;
            let text = String::from_utf8(bytes)
                .map_err(|e| Error::codec(format!("commit file is not valid UTF-8: {e}")))?;
            let actions = text
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(decode_line)
                .collect::<DeltaResult<Vec<Action>>>()?;
            state.apply(commit.version, &table_root, actions)?;
        }

        if state.current_version < 0 {
            return Err(Error::TableNotFound(table_root.to_string()));
        }

        let protocol = state.protocol;
        let metadata = state
            .metadata
            .ok_or_else(|| Error::InvalidSchema("no metadata action found in log".to_string()))?;

        Ok(Snapshot {
            table_root,
            version: state.current_version,
            protocol,
            metadata,
            active_files: state.active_files,
            tombstones: state.tombstones,
            size_in_bytes: state.size_in_bytes,
            num_adds: state.num_adds,
            num_removes: state.num_removes,
            num_metadata: state.num_metadata,
            num_protocol: state.num_protocol,
            schema: OnceLock::new(),
        })
    }

    pub fn table_root(&self) -> &Url {
        &self.table_root
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// The table's protocol, if the replayed log contained one. A log
    /// segment consisting only of `commitInfo` and `metaData` records (no
    /// `protocol` action yet written) replays to `None` rather than an
    /// error — see spec scenario S5.
    pub fn protocol(&self) -> Option<&Protocol> {
        self.protocol.as_ref()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn table_config(&self) -> TableConfig<'_> {
        TableConfig::new(&self.metadata.configuration)
    }

    /// The table's schema, parsed from `metadata.schema_string` and cached
    /// on first access — the cache lives here, not on [`Metadata`], so that
    /// two structurally-identical `Metadata` values stay directly
    /// comparable without forcing a parse.
    pub fn schema(&self) -> DeltaResult<&Arc<StructType>> {
        if let Some(schema) = self.schema.get() {
            return Ok(schema);
        }
        let parsed = Arc::new(StructType::parse_json(&self.metadata.schema_string)?);
        Ok(self.schema.get_or_init(|| parsed))
    }

    /// All files currently part of the table's logical contents, in no
    /// particular order.
    pub fn all_files(&self) -> impl Iterator<Item = &Add> {
        self.active_files.values()
    }

    pub fn num_files(&self) -> usize {
        self.active_files.len()
    }

    pub fn tombstones(&self) -> impl Iterator<Item = &Remove> {
        self.tombstones.values()
    }

    pub fn size_in_bytes(&self) -> i64 {
        self.size_in_bytes
    }

    pub fn num_adds(&self) -> u64 {
        self.num_adds
    }

    pub fn num_removes(&self) -> u64 {
        self.num_removes
    }

    pub fn num_metadata(&self) -> u64 {
        self.num_metadata
    }

    pub fn num_protocol(&self) -> u64 {
        self.num_protocol
    }
}
