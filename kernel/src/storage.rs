//! Collaborator traits this crate depends on but doesn't implement: how to
//! list and read the files that make up a table's log, and how to know the
//! current wall-clock time. A real deployment wires these to object storage
//! or a local filesystem; `test-utils` provides an in-memory implementation
//! for this crate's own tests.

use url::Url;

use crate::actions::Action;
use crate::error::DeltaResult;

/// Metadata about one file discovered under `_delta_log/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub location: Url,
    pub size: u64,
    /// Last-modified time, milliseconds since the Unix epoch.
    pub last_modified: i64,
}

/// The storage abstraction this reader is built against. Implementors need
/// only support listing and reading `_delta_log/` itself; canonicalizing
/// `add`/`remove` paths is handled by [`crate::path`] and does not require
/// a round trip through this trait.
pub trait FileStore {
    /// List the contents of `_delta_log/` directly under `table_root`
    /// (non-recursive), ordered by file name. Implementations are not
    /// required to sort; callers that care about order (log segment
    /// discovery) sort the result themselves.
    fn list_log(&self, table_root: &Url) -> DeltaResult<Vec<FileMeta>>;

    /// Read the full contents of a single file.
    fn read(&self, location: &Url) -> DeltaResult<Vec<u8>>;
}

/// Decodes a checkpoint file's action records. Checkpoints are written in
/// the same columnar format as the table's own data files (see
/// [`crate::row`]), so — like the data files themselves — this crate does
/// not decode them directly; an engine supplies a reader capable of turning
/// one into the handful of action rows it contains.
pub trait CheckpointReader {
    fn read_checkpoint(&self, location: &Url) -> DeltaResult<Vec<Action>>;
}

/// A source of the current wall-clock time, in milliseconds since the Unix
/// epoch. Exists as a trait so tests can supply a fixed clock instead of
/// depending on real time. Part of this crate's collaborator contract
/// (spec §6) for parity with the write path this reader doesn't implement;
/// nothing in log replay or snapshot construction calls it today, since a
/// pure reader never needs "now" to fold an already-committed log.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// The default [`Clock`] implementation, backed by [`std::time::SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}
