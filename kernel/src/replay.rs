//! The log replay engine: folds a sequence of per-version action batches
//! into running state (current protocol, current metadata, active files,
//! tombstones) with the contiguity invariant enforced at the point of
//! application rather than trusted to the caller.

use indexmap::IndexMap;
use url::Url;

use crate::actions::{Action, Add, Metadata, Protocol, Remove};
use crate::error::{DeltaResult, Error};
use crate::log_segment::Version;
use crate::path;

/// Accumulated state after folding zero or more commit/checkpoint batches.
/// `current_version` is `-1` until the first batch is applied.
#[derive(Debug, Clone, Default)]
pub struct ReplayState {
    pub current_version: Version,
    pub protocol: Option<Protocol>,
    pub metadata: Option<Metadata>,
    pub active_files: IndexMap<Url, Add>,
    pub tombstones: IndexMap<Url, Remove>,
    pub size_in_bytes: i64,
    pub num_adds: u64,
    pub num_removes: u64,
    pub num_metadata: u64,
    pub num_protocol: u64,
}

impl ReplayState {
    pub fn new() -> Self {
        Self {
            current_version: -1,
            ..Default::default()
        }
    }

    /// Fold one version's worth of actions into the running state.
    ///
    /// `version` must be exactly `current_version + 1` (or any value, the
    /// first time, since `current_version` starts at `-1`); anything else
    /// is a caller bug, reported as [`Error::EngineInvariantViolation`]
    /// rather than silently accepted or corrected.
    ///
    /// Fold rules, applied in iteration order:
    /// - `Metadata`/`Protocol`: replace whatever was latest.
    /// - `Add`: normalized to `data_change = false` (log replay output is
    ///   never itself a data-changing write) and inserted into
    ///   `active_files`, clearing any tombstone at the same canonical path.
    /// - `Remove`: moved from `active_files` into `tombstones`, with
    ///   `size_in_bytes` adjusted by the removed file's size.
    /// - `CommitInfo` and `Unknown`: ignored.
    ///
    /// Relies on the log's own invariant that within one version's actions,
    /// an `add` always precedes a `remove` for the same path if both occur
    /// (a writer never adds and removes a file as separate same-version
    /// actions in reverse order) — replay applies actions strictly in the
    /// order given, so this fold does not itself re-order or buffer them.
    pub fn apply(
        &mut self,
        version: Version,
        table_root: &Url,
        actions: impl IntoIterator<Item = Action>,
    ) -> DeltaResult<()> {
        if self.current_version != -1 && version != self.current_version + 1 {
            tracing::warn!(
                current = self.current_version,
                requested = version,
                "non-contiguous version applied to replay state"
            );
            return Err(Error::EngineInvariantViolation(format!(
                "expected version {}, got {version}",
                self.current_version + 1
            )));
        }
        tracing::debug!(version, "folding commit into replay state");

        for action in actions {
            match action {
                Action::Metadata(m) => {
                    self.num_metadata += 1;
                    self.metadata = Some(m);
                }
                Action::Protocol(p) => {
                    self.num_protocol += 1;
                    self.protocol = Some(p);
                }
                Action::Add(mut add) => {
                    add.data_change = false;
                    let canonical = path::canonicalize(table_root, &add.path)?;
                    self.size_in_bytes += add.size;
                    self.tombstones.shift_remove(&canonical);
                    self.active_files.insert(canonical, add);
                    self.num_adds += 1;
                }
                Action::Remove(remove) => {
                    let canonical = path::canonicalize(table_root, &remove.path)?;
                    if let Some(removed) = self.active_files.shift_remove(&canonical) {
                        self.size_in_bytes -= removed.size;
                    }
                    self.tombstones.insert(canonical, remove);
                    self.num_removes += 1;
                }
                Action::CommitInfo(_) | Action::Unknown => {}
            }
        }

        self.current_version = version;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Format;

    fn root() -> Url {
        Url::parse("file:///t/").unwrap()
    }

    fn metadata() -> Metadata {
        Metadata {
            id: uuid::Uuid::nil(),
            name: None,
            description: None,
            format: Format::default(),
            schema_string: r#"{"type":"struct","fields":[]}"#.to_string(),
            partition_columns: vec![],
            created_time: Some(0),
            configuration: Default::default(),
        }
    }

    fn add(path: &str, size: i64) -> Add {
        Add {
            path: path.to_string(),
            partition_values: Default::default(),
            size,
            modification_time: 0,
            data_change: true,
            stats: None,
            tags: None,
        }
    }

    #[test]
    fn first_apply_accepts_any_version() {
        let mut state = ReplayState::new();
        state.apply(3, &root(), vec![Action::Metadata(metadata())]).unwrap();
        assert_eq!(state.current_version, 3);
    }

    #[test_log::test]
    fn rejects_non_contiguous_version() {
        let mut state = ReplayState::new();
        state.apply(0, &root(), vec![]).unwrap();
        let err = state.apply(2, &root(), vec![]).unwrap_err();
        assert!(matches!(err, Error::EngineInvariantViolation(_)));
    }

    #[test]
    fn add_then_remove_moves_file_to_tombstones() {
        let mut state = ReplayState::new();
        state
            .apply(0, &root(), vec![Action::Add(add("f1.parquet", 100))])
            .unwrap();
        assert_eq!(state.active_files.len(), 1);
        assert_eq!(state.size_in_bytes, 100);

        state
            .apply(
                1,
                &root(),
                vec![Action::Remove(Remove {
                    path: "f1.parquet".to_string(),
                    deletion_timestamp: Some(1000),
                    data_change: true,
                    extended_file_metadata: None,
                    partition_values: None,
                    size: Some(100),
                    tags: None,
                })],
            )
            .unwrap();
        assert!(state.active_files.is_empty());
        assert_eq!(state.tombstones.len(), 1);
        assert_eq!(state.size_in_bytes, 0);
    }

    #[test]
    fn add_normalizes_data_change_to_false() {
        let mut state = ReplayState::new();
        state
            .apply(0, &root(), vec![Action::Add(add("f1.parquet", 100))])
            .unwrap();
        let (_, stored) = state.active_files.iter().next().unwrap();
        assert!(!stored.data_change);
    }

    #[test]
    fn re_adding_a_removed_path_clears_its_tombstone() {
        let mut state = ReplayState::new();
        state
            .apply(0, &root(), vec![Action::Add(add("f1.parquet", 100))])
            .unwrap();
        state
            .apply(
                1,
                &root(),
                vec![Action::Remove(Remove {
                    path: "f1.parquet".to_string(),
                    deletion_timestamp: Some(1000),
                    data_change: true,
                    extended_file_metadata: None,
                    partition_values: None,
                    size: Some(100),
                    tags: None,
                })],
            )
            .unwrap();
        state
            .apply(2, &root(), vec![Action::Add(add("f1.parquet", 50))])
            .unwrap();
        assert_eq!(state.active_files.len(), 1);
        assert!(state.tombstones.is_empty());
    }

    #[test]
    fn metadata_and_protocol_replace_latest() {
        let mut state = ReplayState::new();
        state.apply(0, &root(), vec![Action::Protocol(Protocol {
            min_reader_version: 1,
            min_writer_version: 1,
        })]).unwrap();
        state.apply(1, &root(), vec![Action::Protocol(Protocol {
            min_reader_version: 2,
            min_writer_version: 3,
        })]).unwrap();
        assert_eq!(state.protocol.unwrap().min_reader_version, 2);
        assert_eq!(state.num_protocol, 2);
    }
}
