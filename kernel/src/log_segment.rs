//! Discovery of the set of `_delta_log/` files needed to reconstruct a
//! snapshot at a given version: parsing log file names, reading the
//! `_last_checkpoint` hint, and picking the checkpoint-plus-commits window
//! that log replay will fold over.

use std::collections::BTreeMap;

use itertools::Itertools;
use serde::Deserialize;
use url::Url;

use crate::error::{DeltaResult, Error};
use crate::storage::{FileMeta, FileStore};

pub type Version = i64;

const COMMIT_SUFFIX: &str = ".json";
const CHECKPOINT_MARKER: &str = ".checkpoint";
const LAST_CHECKPOINT_NAME: &str = "_last_checkpoint";

/// The kind of file a single `_delta_log/` entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogPathFileType {
    Commit,
    /// A single-file checkpoint, or one part of a multi-part checkpoint
    /// (`part` is 1-based, `num_parts` is the total part count).
    Checkpoint { part: u32, num_parts: u32 },
}

/// A `_delta_log/` entry with its version and kind parsed out of the file
/// name.
#[derive(Debug, Clone)]
pub struct ParsedLogPath {
    pub version: Version,
    pub file_type: LogPathFileType,
    pub location: Url,
    pub size: u64,
}

fn file_name(url: &Url) -> Option<&str> {
    url.path_segments()?.next_back()
}

/// Parse one log file name into its version and kind. Returns `None` for
/// entries that aren't commit or checkpoint files (`_last_checkpoint`,
/// CRC sidecars, stray files left by a writer).
pub fn parse_log_path(meta: &FileMeta) -> Option<ParsedLogPath> {
    let name = file_name(&meta.location)?;
    let stem = name.strip_suffix(".parquet").or_else(|| name.strip_suffix(COMMIT_SUFFIX))?;

    if let Some(version_str) = stem.strip_suffix(CHECKPOINT_MARKER) {
        let version: Version = version_str.parse().ok()?;
        return Some(ParsedLogPath {
            version,
            file_type: LogPathFileType::Checkpoint { part: 1, num_parts: 1 },
            location: meta.location.clone(),
            size: meta.size,
        });
    }

    if let Some(rest) = stem.find(CHECKPOINT_MARKER).map(|i| &stem[..i]) {
        // multi-part: "<version>.checkpoint.<part>.<num_parts>"
        let version: Version = rest.parse().ok()?;
        let after_marker = &stem[rest.len() + CHECKPOINT_MARKER.len()..];
        let mut pieces = after_marker.trim_start_matches('.').split('.');
        let part: u32 = pieces.next()?.parse().ok()?;
        let num_parts: u32 = pieces.next()?.parse().ok()?;
        return Some(ParsedLogPath {
            version,
            file_type: LogPathFileType::Checkpoint { part, num_parts },
            location: meta.location.clone(),
            size: meta.size,
        });
    }

    let version: Version = stem.parse().ok()?;
    Some(ParsedLogPath {
        version,
        file_type: LogPathFileType::Commit,
        location: meta.location.clone(),
        size: meta.size,
    })
}

pub fn commit_file_name(version: Version) -> String {
    format!("{version:020}{COMMIT_SUFFIX}")
}

pub fn single_part_checkpoint_file_name(version: Version) -> String {
    format!("{version:020}.checkpoint.parquet")
}

pub fn multi_part_checkpoint_file_name(version: Version, part: u32, num_parts: u32) -> String {
    format!("{version:020}.checkpoint.{part:010}.{num_parts:010}.parquet")
}

/// The `_last_checkpoint` hint: points at the most recent checkpoint a
/// writer knows about, so a reader can avoid listing the whole log
/// directory. Advisory only — if the file it names is missing, or its
/// version is beyond what's actually in the log, we fall back to a full
/// listing.
#[derive(Debug, Clone, Deserialize)]
pub struct LastCheckpointHint {
    pub version: Version,
    #[allow(dead_code)]
    pub size: i64,
    pub parts: Option<u32>,
}

pub fn read_last_checkpoint_hint(
    store: &dyn FileStore,
    table_root: &Url,
) -> DeltaResult<Option<LastCheckpointHint>> {
    let location = table_root
        .join(&format!("_delta_log/{LAST_CHECKPOINT_NAME}"))
        .map_err(Error::InvalidUrl)?;
    match store.read(&location) {
        Ok(bytes) => {
            let hint = serde_json::from_slice(&bytes)
                .map_err(|e| Error::codec(format!("malformed _last_checkpoint: {e}")))?;
            Ok(Some(hint))
        }
        Err(_) => Ok(None),
    }
}

/// The set of files log replay needs to fold over to produce a snapshot:
/// an optional checkpoint (all parts, if multi-part) followed by the
/// contiguous run of commits from `checkpoint_version + 1` (or `0`) through
/// `end_version`.
#[derive(Debug, Clone)]
pub struct LogSegment {
    pub end_version: Version,
    pub checkpoint_parts: Vec<ParsedLogPath>,
    pub commit_files: Vec<ParsedLogPath>,
}

impl LogSegment {
    /// Discover the log segment ending at `end_version` (or the latest
    /// available version, if `None`).
    ///
    /// Tries the `_last_checkpoint` hint first; if it's missing, stale
    /// (points past `end_version`), or any of its parts can't be found in a
    /// listing, falls back to picking the latest complete checkpoint found
    /// by a full directory listing.
    pub fn discover(
        store: &dyn FileStore,
        table_root: &Url,
        end_version: Option<Version>,
    ) -> DeltaResult<Option<Self>> {
        let listing = store.list_log(table_root)?;
        let mut by_version: BTreeMap<Version, Vec<ParsedLogPath>> = BTreeMap::new();
        for meta in &listing {
            if let Some(parsed) = parse_log_path(meta) {
                by_version.entry(parsed.version).or_default().push(parsed);
            }
        }

        let end_version = match end_version.or_else(|| by_version.keys().next_back().copied()) {
            Some(v) => v,
            None => return Ok(None),
        };

        let hint = read_last_checkpoint_hint(store, table_root)?;
        let used_hint = hint.as_ref().is_some_and(|h| h.version <= end_version);
        let checkpoint_version = hint
            .filter(|h| h.version <= end_version)
            .map(|h| h.version)
            .or_else(|| {
                by_version
                    .iter()
                    .rev()
                    .find(|(version, entries)| {
                        **version <= end_version
                            && entries
                                .iter()
                                .any(|e| matches!(e.file_type, LogPathFileType::Checkpoint { .. }))
                    })
                    .map(|(version, _)| *version)
            });
        match checkpoint_version {
            Some(v) => tracing::debug!(version = v, from_hint = used_hint, "selected checkpoint"),
            None => tracing::debug!("no usable checkpoint, replaying from version 0"),
        }

        let checkpoint_parts = match checkpoint_version {
            Some(version) => {
                let entries = by_version.get(&version).cloned().unwrap_or_default();
                let parts: Vec<ParsedLogPath> = entries
                    .into_iter()
                    .filter(|e| matches!(e.file_type, LogPathFileType::Checkpoint { .. }))
                    .collect();
                verify_checkpoint_complete(version, &parts)?;
                parts
            }
            None => Vec::new(),
        };

        let replay_start = checkpoint_version.map(|v| v + 1).unwrap_or(0);
        let commit_files: Vec<ParsedLogPath> = by_version
            .range(replay_start..=end_version)
            .flat_map(|(_, entries)| entries.iter().cloned())
            .filter(|e| matches!(e.file_type, LogPathFileType::Commit))
            .collect();

        if checkpoint_parts.is_empty() && commit_files.is_empty() {
            return Ok(None);
        }

        Ok(Some(LogSegment {
            end_version,
            checkpoint_parts,
            commit_files,
        }))
    }
}

fn verify_checkpoint_complete(version: Version, parts: &[ParsedLogPath]) -> DeltaResult<()> {
    let Some(first) = parts.first() else {
        return Ok(());
    };
    let LogPathFileType::Checkpoint { num_parts, .. } = first.file_type else {
        unreachable!("filtered to Checkpoint entries");
    };
    // A correct multi-part checkpoint has exactly one file per part number in
    // `1..=num_parts`; checking the count alone would let a duplicate part
    // silently stand in for a missing one.
    let found: Vec<u32> = parts
        .iter()
        .map(|p| match p.file_type {
            LogPathFileType::Checkpoint { part, .. } => part,
            LogPathFileType::Commit => unreachable!("filtered to Checkpoint entries"),
        })
        .sorted()
        .dedup()
        .collect();
    let expected: Vec<u32> = (1..=num_parts).collect();
    if found != expected {
        return Err(Error::EngineInvariantViolation(format!(
            "checkpoint at version {version} expects parts 1..={num_parts}, found {found:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(path: &str) -> FileMeta {
        FileMeta {
            location: Url::parse(&format!("file:///t/_delta_log/{path}")).unwrap(),
            size: 10,
            last_modified: 0,
        }
    }

    #[test]
    fn parses_commit_file_name() {
        let parsed = parse_log_path(&meta("00000000000000000005.json")).unwrap();
        assert_eq!(parsed.version, 5);
        assert_eq!(parsed.file_type, LogPathFileType::Commit);
    }

    #[test]
    fn parses_single_part_checkpoint() {
        let parsed = parse_log_path(&meta("00000000000000000010.checkpoint.parquet")).unwrap();
        assert_eq!(parsed.version, 10);
        assert_eq!(
            parsed.file_type,
            LogPathFileType::Checkpoint { part: 1, num_parts: 1 }
        );
    }

    #[test]
    fn parses_multi_part_checkpoint() {
        let name = multi_part_checkpoint_file_name(10, 2, 3);
        let parsed = parse_log_path(&meta(&name)).unwrap();
        assert_eq!(parsed.version, 10);
        assert_eq!(
            parsed.file_type,
            LogPathFileType::Checkpoint { part: 2, num_parts: 3 }
        );
    }

    #[test]
    fn ignores_unrelated_files() {
        assert!(parse_log_path(&meta("_last_checkpoint")).is_none());
        assert!(parse_log_path(&meta("00000000000000000005.crc")).is_none());
    }

    struct FixedStore {
        files: Vec<FileMeta>,
    }

    impl FileStore for FixedStore {
        fn list_log(&self, _table_root: &Url) -> DeltaResult<Vec<FileMeta>> {
            Ok(self.files.clone())
        }
        fn read(&self, _location: &Url) -> DeltaResult<Vec<u8>> {
            Err(Error::generic("not found"))
        }
    }

    #[test]
    fn discovers_commits_only_with_no_checkpoint() {
        let store = FixedStore {
            files: vec![meta("00000000000000000000.json"), meta("00000000000000000001.json")],
        };
        let root = Url::parse("file:///t/").unwrap();
        let segment = LogSegment::discover(&store, &root, None).unwrap().unwrap();
        assert_eq!(segment.end_version, 1);
        assert_eq!(segment.commit_files.len(), 2);
        assert!(segment.checkpoint_parts.is_empty());
    }

    #[test_log::test]
    fn discovers_checkpoint_plus_trailing_commits() {
        let store = FixedStore {
            files: vec![
                meta("00000000000000000000.json"),
                meta("00000000000000000001.json"),
                meta("00000000000000000001.checkpoint.parquet"),
                meta("00000000000000000002.json"),
            ],
        };
        let root = Url::parse("file:///t/").unwrap();
        let segment = LogSegment::discover(&store, &root, None).unwrap().unwrap();
        assert_eq!(segment.checkpoint_parts.len(), 1);
        assert_eq!(segment.commit_files.len(), 1);
        assert_eq!(segment.commit_files[0].version, 2);
    }

    #[test]
    fn rejects_incomplete_multi_part_checkpoint() {
        let store = FixedStore {
            files: vec![
                meta("00000000000000000000.json"),
                FileMeta {
                    location: Url::parse(&format!(
                        "file:///t/_delta_log/{}",
                        multi_part_checkpoint_file_name(0, 1, 2)
                    ))
                    .unwrap(),
                    size: 10,
                    last_modified: 0,
                },
            ],
        };
        let root = Url::parse("file:///t/").unwrap();
        assert!(LogSegment::discover(&store, &root, None).is_err());
    }

    #[test_log::test]
    fn rejects_duplicate_checkpoint_part() {
        // Two files both claiming to be part 1 of 2: right count, wrong contents.
        let dup_parts = vec![
            ParsedLogPath {
                version: 0,
                file_type: LogPathFileType::Checkpoint { part: 1, num_parts: 2 },
                location: Url::parse("file:///t/_delta_log/a.parquet").unwrap(),
                size: 10,
            },
            ParsedLogPath {
                version: 0,
                file_type: LogPathFileType::Checkpoint { part: 1, num_parts: 2 },
                location: Url::parse("file:///t/_delta_log/b.parquet").unwrap(),
                size: 10,
            },
        ];
        assert!(verify_checkpoint_complete(0, &dup_parts).is_err());
    }
}
