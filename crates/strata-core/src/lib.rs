//! Shared substrate for the strata data access layer.
//!
//! This crate carries the pieces every storage adapter needs regardless of
//! backend: the error taxonomy, the operation/status vocabulary used for
//! logs and metric identifiers, and the construction-time retry helper.

#![forbid(unsafe_code)]

pub mod error;
pub mod retry;
pub mod status;

pub use error::{BoxedError, Error, ErrorKind, Result};
pub use retry::{retry, PING_ATTEMPTS, RETRY_INITIAL_DELAY, TIMEOUT_PING};
pub use status::{Operation, Status};
