//! Shared test utilities for logtap integration harnesses.
//!
//! Import everything you need via `mod common; use common::*;` at the top of
//! each harness file.

pub mod assertions;
pub mod fake_logging_api;
pub mod fake_logging_server;
pub mod fixtures;

pub use assertions::*;
pub use fake_logging_api::*;
pub use fake_logging_server::*;
pub use fixtures::*;
