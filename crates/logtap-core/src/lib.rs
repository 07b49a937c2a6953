//! logtap-core: shared types and pure transforms for logtap.
//!
//! This crate holds everything the feed readers agree on but that performs no
//! I/O of its own: the canonical [`Record`], the [`Watermark`] used to resume
//! historical queries, the `--from` [`TimeRange`] grammar, the entry
//! normalizer, the [`FeedError`] taxonomy and the layered [`config::Config`].
//!
//! # Data flow
//!
//! ```text
//! source ──► raw entry / line ──► normalizer ──► Record ──► channel ──► consumer
//! ```

pub mod config;
pub mod error;
pub mod normalizer;
pub mod time_range;
pub mod types;

pub use error::{FeedError, Result};
pub use normalizer::{normalize_entry, normalize_line, Payload, RawEntry};
pub use time_range::TimeRange;
pub use types::{Record, Severity, SourceKind, Watermark};
