//! A configurable storage test double.
//!
//! Returns canned per-operation results and counts calls through the
//! regular counter set, so tests can assert both payloads and call
//! volumes. Primarily used by the fan-out/fan-in tests; exported for
//! downstream consumers' tests as well.

use std::any::Any;

use async_trait::async_trait;
use serde_json::Value;
use strata_core::{Error, ErrorKind, Result, Status};

use crate::base::StorageBase;
use crate::contract::Storage;
use crate::observability::{OperationCounters, OperationLogger};
use crate::options::OptionFn;
use crate::params;

/// A storage whose operations return configured values.
pub struct MockStorage {
    base: StorageBase,
    client: (),
    count_result: i64,
    create_result: String,
    retrieve_result: Value,
    list_result: Value,
    fail_with: Option<ErrorKind>,
}

impl MockStorage {
    /// Creates a mock with empty results.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Ok(Self {
            base: StorageBase::new(name)?,
            client: (),
            count_result: 0,
            create_result: String::new(),
            retrieve_result: Value::Null,
            list_result: Value::Array(Vec::new()),
            fail_with: None,
        })
    }

    /// Sets the Count result.
    pub fn with_count(mut self, count: i64) -> Self {
        self.count_result = count;
        self
    }

    /// Sets the id returned by Create.
    pub fn with_create_result(mut self, id: impl Into<String>) -> Self {
        self.create_result = id.into();
        self
    }

    /// Sets the value returned by Retrieve.
    pub fn with_retrieve_result(mut self, value: Value) -> Self {
        self.retrieve_result = value;
        self
    }

    /// Sets the value returned by List.
    pub fn with_list_result(mut self, value: Value) -> Self {
        self.list_result = value;
        self
    }

    /// Makes every operation fail with the given error kind.
    pub fn with_failure(mut self, kind: ErrorKind) -> Self {
        self.fail_with = Some(kind);
        self
    }

    fn outcome(&self, status: Status, target: &str) -> Result<()> {
        if let Some(kind) = self.fail_with {
            return Err(self.base.failure(
                status,
                Error::new(kind).with_message("mock failure"),
            ));
        }

        self.base.completed(status, target);

        Ok(())
    }
}

#[async_trait]
impl Storage for MockStorage {
    async fn count(
        &self,
        target: &str,
        _prm: Option<&params::Count>,
        _options: Vec<OptionFn<params::Count>>,
    ) -> Result<i64> {
        self.outcome(Status::Counted, target)?;
        Ok(self.count_result)
    }

    async fn create(
        &self,
        _id: &str,
        target: &str,
        _value: &Value,
        _prm: Option<&params::Create>,
        _options: Vec<OptionFn<params::Create>>,
    ) -> Result<String> {
        self.outcome(Status::Created, target)?;
        Ok(self.create_result.clone())
    }

    async fn retrieve(
        &self,
        _id: &str,
        target: &str,
        _prm: Option<&params::Retrieve>,
        _options: Vec<OptionFn<params::Retrieve>>,
    ) -> Result<Value> {
        self.outcome(Status::Retrieved, target)?;
        Ok(self.retrieve_result.clone())
    }

    async fn update(
        &self,
        _id: &str,
        target: &str,
        _value: &Value,
        _prm: Option<&params::Update>,
        _options: Vec<OptionFn<params::Update>>,
    ) -> Result<()> {
        self.outcome(Status::Updated, target)
    }

    async fn delete(
        &self,
        _id: &str,
        target: &str,
        _prm: Option<&params::Delete>,
        _options: Vec<OptionFn<params::Delete>>,
    ) -> Result<()> {
        self.outcome(Status::Deleted, target)
    }

    async fn list(
        &self,
        target: &str,
        _prm: Option<&params::List>,
        _options: Vec<OptionFn<params::List>>,
    ) -> Result<Value> {
        self.outcome(Status::Listed, target)?;
        Ok(self.list_result.clone())
    }

    fn name(&self) -> &str {
        self.base.name()
    }

    fn client(&self) -> &(dyn Any + Send + Sync) {
        &self.client
    }

    fn logger(&self) -> &OperationLogger {
        self.base.logger()
    }

    fn counters(&self) -> &OperationCounters {
        self.base.counters()
    }
}
