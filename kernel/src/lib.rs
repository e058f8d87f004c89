//! A standalone reader for a Delta-Lake-style transactional table format:
//! log replay over a versioned sequence of JSON commits and Parquet
//! checkpoints, a snapshot model built from that replay, a schema and
//! action codec for the wire formats involved, and a row-over-column
//! adapter for reading a snapshot's data files through an injected columnar
//! reader.
//!
//! This crate does not talk to storage or decode Parquet itself — see
//! [`storage`] for the collaborator traits a caller implements to supply
//! both.

pub mod actions;
pub mod config;
pub mod error;
pub mod log_segment;
pub mod path;
pub mod replay;
pub mod row;
pub mod schema;
pub mod snapshot;
pub mod storage;

pub use error::{DeltaResult, Error};
pub use log_segment::Version;
pub use snapshot::Snapshot;
