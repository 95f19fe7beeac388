//! The abstract storage capability.
//!
//! Six operations (count, create, retrieve, update, delete, list) plus
//! identity, client, logger, and counter accessors. Adapters translate
//! the contract into backend-native calls; callers that need the native
//! client downcast the opaque handle returned by [`Storage::client`].

use std::any::Any;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use strata_core::{Error, Result};

use crate::observability::{OperationCounters, OperationLogger};
use crate::options::OptionFn;
use crate::params;

/// The entity type of every storage, used in logs, metrics, and spans.
pub const STORAGE_KIND: &str = "storage";

/// The data access contract.
///
/// Implementations must be safe for concurrent use; the underlying native
/// clients are assumed thread-safe. All six operations follow the same
/// execution skeleton: argument pre-check, span, options assembly, target
/// resolution, parameter defaulting, pre-hook, native call, decode,
/// post-hook, debug log, counter.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Counts items in `target`.
    async fn count(
        &self,
        target: &str,
        prm: Option<&params::Count>,
        options: Vec<OptionFn<params::Count>>,
    ) -> Result<i64>;

    /// Creates `value` under `id` in `target`, returning the stored id.
    async fn create(
        &self,
        id: &str,
        target: &str,
        value: &Value,
        prm: Option<&params::Create>,
        options: Vec<OptionFn<params::Create>>,
    ) -> Result<String>;

    /// Retrieves the item stored under `id` in `target`.
    ///
    /// A missing record is reported as a not-found error, not a panic.
    async fn retrieve(
        &self,
        id: &str,
        target: &str,
        prm: Option<&params::Retrieve>,
        options: Vec<OptionFn<params::Retrieve>>,
    ) -> Result<Value>;

    /// Updates the item stored under `id` in `target` with `value`.
    async fn update(
        &self,
        id: &str,
        target: &str,
        value: &Value,
        prm: Option<&params::Update>,
        options: Vec<OptionFn<params::Update>>,
    ) -> Result<()>;

    /// Deletes the item stored under `id` in `target`.
    async fn delete(
        &self,
        id: &str,
        target: &str,
        prm: Option<&params::Delete>,
        options: Vec<OptionFn<params::Delete>>,
    ) -> Result<()>;

    /// Lists items in `target`, shaped per adapter family (array of
    /// documents, or a `{"keys": [...]}` envelope for key-oriented
    /// backends).
    async fn list(
        &self,
        target: &str,
        prm: Option<&params::List>,
        options: Vec<OptionFn<params::List>>,
    ) -> Result<Value>;

    /// Returns the storage name (lowercase backend identifier).
    fn name(&self) -> &str;

    /// Returns the entity type, always [`STORAGE_KIND`].
    fn kind(&self) -> &'static str {
        STORAGE_KIND
    }

    /// Returns the opaque native client handle. Callers that need the
    /// native type perform a checked downcast; the layer is intentionally
    /// a pass-through to native power when needed.
    fn client(&self) -> &(dyn Any + Send + Sync);

    /// Returns the logger tagged with this storage's kind and name.
    fn logger(&self) -> &OperationLogger;

    /// Returns the counter set of this storage.
    fn counters(&self) -> &OperationCounters;
}

/// Retrieves the item under `id` and deserializes it into `T`.
pub async fn retrieve_as<T: DeserializeOwned>(
    storage: &dyn Storage,
    id: &str,
    target: &str,
    prm: Option<&params::Retrieve>,
    options: Vec<OptionFn<params::Retrieve>>,
) -> Result<T> {
    let value = storage.retrieve(id, target, prm, options).await?;

    serde_json::from_value(value).map_err(|e| Error::failed_to("decode").with_source(e))
}

/// Lists items in `target` and deserializes the response into `T`.
pub async fn list_as<T: DeserializeOwned>(
    storage: &dyn Storage,
    target: &str,
    prm: Option<&params::List>,
    options: Vec<OptionFn<params::List>>,
) -> Result<T> {
    let value = storage.list(target, prm, options).await?;

    serde_json::from_value(value).map_err(|e| Error::failed_to("decode").with_source(e))
}
