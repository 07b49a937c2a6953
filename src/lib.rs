//! logtap: stream log entries from files, stdin or Cloud Logging.
//!
//! The readers live in `logtap-feeds`; this crate wires one of them to a
//! consumer that prints each record as a JSON line.
//!
//! # Architecture
//!
//! ```text
//! FileReader / StdinReader / RemoteReader ──► mpsc(1) ──► consumer ──► stdout
//!                                  ▲
//!                       AuthGate (remote only)
//! ```

pub mod consumer;
