//! Path canonicalization: turning the `path` field of an `add`/`remove`
//! action (which may be a bare relative file name, a relative path with
//! subdirectories, or an already-absolute URI) into a single canonical URI
//! qualified against the table root.
//!
//! Canonicalization must be idempotent and must preserve percent-escaping,
//! since two differently-escaped encodings of the same URI are expected to
//! collide when used as map keys in the active-file / tombstone sets.

use url::Url;

use crate::error::{DeltaResult, Error};

/// Qualify `path` (as it appears in an action record) against `table_root`,
/// producing the canonical URI used as the key in the snapshot's file maps.
///
/// - If `path` already parses as an absolute URI (has a scheme), it is
///   returned unchanged except for `Url`'s own normalization (this makes the
///   operation idempotent: re-canonicalizing an already-canonical path is a
///   no-op).
/// - Otherwise `path` is resolved relative to `table_root`, inheriting its
///   scheme and authority.
pub fn canonicalize(table_root: &Url, path: &str) -> DeltaResult<Url> {
    if let Ok(absolute) = Url::parse(path) {
        tracing::debug!(path, "path is already an absolute URI, leaving unresolved");
        return Ok(absolute);
    }
    table_root.join(path).map_err(|e| {
        tracing::warn!(path, table_root = %table_root, "failed to resolve path against table root");
        Error::InvalidUrl(e)
    })
}

/// Parse a table-root string (as passed to `Snapshot::try_new`) into a
/// [`Url`], treating a bare filesystem path as a `file://` URI and ensuring
/// it ends in `/` so `Url::join` resolves relative paths underneath it
/// rather than replacing the last path segment.
pub fn table_root_url(root: &str) -> DeltaResult<Url> {
    let mut url = match Url::parse(root) {
        Ok(url) => url,
        Err(_) => Url::from_file_path(root)
            .map_err(|_| Error::generic(format!("'{root}' is not a valid table root")))?,
    };
    if !url.path().ends_with('/') {
        let mut path = url.path().to_string();
        path.push('/');
        url.set_path(&path);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> Url {
        Url::parse("file:///tables/my_table/").unwrap()
    }

    #[test]
    fn qualifies_bare_relative_path() {
        let result = canonicalize(&root(), "part-00000-abc.parquet").unwrap();
        assert_eq!(
            result.as_str(),
            "file:///tables/my_table/part-00000-abc.parquet"
        );
    }

    #[test]
    fn qualifies_relative_path_with_subdirectory() {
        let result = canonicalize(&root(), "date=2024-01-01/part-00000.parquet").unwrap();
        assert_eq!(
            result.as_str(),
            "file:///tables/my_table/date=2024-01-01/part-00000.parquet"
        );
    }

    #[test]
    fn leaves_absolute_uri_unchanged() {
        let absolute = "s3://bucket/tables/my_table/part-00000.parquet";
        let result = canonicalize(&root(), absolute).unwrap();
        assert_eq!(result.as_str(), absolute);
    }

    #[test]
    fn is_idempotent() {
        let once = canonicalize(&root(), "part-00000.parquet").unwrap();
        let twice = canonicalize(&root(), once.as_str()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn preserves_percent_escaping_so_equivalent_encodings_collide() {
        let encoded = canonicalize(&root(), "date%3D2024-01-01/part-00000.parquet").unwrap();
        let also_encoded = canonicalize(&root(), "date%3D2024-01-01/part-00000.parquet").unwrap();
        assert_eq!(encoded, also_encoded);
    }

    #[test]
    fn differently_escaped_paths_to_the_same_uri_collide() {
        // spec.md S3: a pre-escaped path and its raw (unescaped) equivalent
        // must canonicalize to the same key.
        let pre_escaped = canonicalize(&root(), "col=foo%20bar/part.parquet").unwrap();
        let raw = canonicalize(&root(), "col=foo bar/part.parquet").unwrap();
        assert_eq!(pre_escaped, raw);
    }

    #[test]
    fn table_root_gets_trailing_slash() {
        let root = table_root_url("file:///tables/my_table").unwrap();
        assert!(root.path().ends_with('/'));
    }
}
