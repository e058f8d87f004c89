//! Typed access to the table-level configuration carried in
//! `Metadata.configuration`. Only the two keys this reader interprets are
//! given accessors; everything else in the map is left for callers to read
//! directly off [`crate::actions::Metadata`].

use std::collections::HashMap;

use chrono_tz::Tz;

use crate::error::{DeltaResult, Error};

const PARQUET_TIME_ZONE_ID: &str = "parquet.time.zone.id";
const LOG_CACHE_SIZE: &str = "log.cacheSize";

const DEFAULT_TIME_ZONE: &str = "UTC";
const DEFAULT_LOG_CACHE_SIZE: u32 = 20;

/// A read-only view over a table's configuration map.
pub struct TableConfig<'a> {
    configuration: &'a HashMap<String, String>,
}

impl<'a> TableConfig<'a> {
    pub fn new(configuration: &'a HashMap<String, String>) -> Self {
        Self { configuration }
    }

    /// The IANA time zone row-level timestamp columns should be interpreted
    /// in when read out of the underlying columnar files. Defaults to
    /// `"UTC"` when unset.
    pub fn parquet_time_zone(&self) -> DeltaResult<Tz> {
        let raw = self
            .configuration
            .get(PARQUET_TIME_ZONE_ID)
            .map(String::as_str)
            .unwrap_or(DEFAULT_TIME_ZONE);
        raw.parse()
            .map_err(|_| Error::generic(format!("invalid '{PARQUET_TIME_ZONE_ID}' value: '{raw}'")))
    }

    /// Advisory hint for how many log files an engine should keep cached
    /// across snapshot constructions. Not enforced by this crate; exposed
    /// purely so callers building their own caching layer on top don't have
    /// to parse the configuration map themselves. Defaults to `20`.
    pub fn log_cache_size(&self) -> DeltaResult<u32> {
        match self.configuration.get(LOG_CACHE_SIZE) {
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::generic(format!("invalid '{LOG_CACHE_SIZE}' value: '{raw}'"))),
            None => Ok(DEFAULT_LOG_CACHE_SIZE),
        }
    }
}
