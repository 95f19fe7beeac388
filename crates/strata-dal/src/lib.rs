//! Unified data access layer over heterogeneous storage backends.
//!
//! Callers write once against the six-operation [`Storage`] contract
//! (count, create, retrieve, update, delete, list) and concrete adapters
//! translate each operation into backend-native calls. A fan-out layer
//! multiplexes one logical operation across several backends concurrently;
//! a fan-in layer multiplexes many logical items against a single backend.
//!
//! # Architecture
//!
//! - [`contract`]: the abstract storage capability and its generic
//!   deserializing helpers.
//! - [`params`] / [`options`]: the per-operation parameter model and the
//!   hook/override carrier assembled from option functions.
//! - [`base`] / [`observability`]: the composable substrate every adapter
//!   embeds, holding the tagged logger and monotonic per-operation
//!   counters.
//! - [`adapter`]: the backend families (in-memory and filesystem always
//!   available; the rest behind feature flags).
//! - [`fanout`] / [`fanin`]: concurrent multiplexing with aggregate-error
//!   semantics.
//! - [`registry`]: named singleton slots for configured adapters.

#![forbid(unsafe_code)]

pub mod adapter;
pub mod base;
pub mod config;
pub mod contract;
pub mod fanin;
pub mod fanout;
pub mod mock;
pub mod observability;
pub mod options;
pub mod params;
pub mod prelude;
pub mod registry;
pub mod response;

pub use strata_core::{BoxedError, Error, ErrorKind, Operation, Result, Status};

pub use base::{resolve_target, StorageBase};
pub use config::AdapterConfig;
pub use contract::{list_as, retrieve_as, Storage, STORAGE_KIND};
pub use fanout::StorageMap;
