//! Redis adapter.
//!
//! The target argument is unused; keys live in the flat keyspace. Count
//! and List enumerate keys against the `search` pattern (default `*`);
//! List returns a `{"keys": [...]}` envelope, not the values. Create and
//! Update SET the marshalled value, honouring the `ttl` parameter.

mod config;

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
pub use config::{CountStrategy, RedisConfig};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::{json, Value};
use strata_core::{retry, Error, Operation, Result, Status};
use tracing::Instrument;
use validator::Validate;

use crate::base::StorageBase;
use crate::contract::Storage;
use crate::observability::{OperationCounters, OperationLogger};
use crate::options::{HookArgs, OptionFn, Options};
use crate::params;
use crate::registry;

/// Name of the storage.
pub const NAME: &str = "redis";

/// Default key pattern for Count and List.
const DEFAULT_PATTERN: &str = "*";

/// Page size hint for cursor-based key scans.
const SCAN_PAGE: usize = 100;

/// Redis storage definition.
pub struct Redis {
    base: StorageBase,
    config: RedisConfig,
    client: ConnectionManager,
}

/// Walks the keyspace with SCAN, collecting keys matching `pattern`.
async fn scan_keys(con: &mut ConnectionManager, pattern: &str) -> redis::RedisResult<Vec<String>> {
    let mut keys = Vec::new();
    let mut cursor: u64 = 0;

    loop {
        let (next, page): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(SCAN_PAGE)
            .query_async(con)
            .await?;

        keys.extend(page);
        cursor = next;

        if cursor == 0 {
            break;
        }
    }

    Ok(keys)
}

impl Redis {
    /// Creates a new Redis storage: opens the client, probes the
    /// connection through the standard retrier, and stores the adapter in
    /// the registry slot.
    pub async fn new(config: RedisConfig) -> Result<Arc<Self>> {
        let base = StorageBase::new(NAME)?;

        if let Err(errors) = config.validate() {
            return Err(base.instantiation_failure(Error::validation(errors.to_string())));
        }

        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| base.instantiation_failure(Error::connection(e.to_string())))?;

        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| base.ping_failure(Error::connection(e.to_string())))?;

        retry::probe(|| {
            let mut con = manager.clone();
            async move {
                redis::cmd("PING")
                    .query_async::<String>(&mut con)
                    .await
                    .map(|_| ())
                    .map_err(|e| Error::failed_to("ping").with_source(e))
            }
        })
        .await
        .map_err(|e| base.ping_failure(e))?;

        let storage = Arc::new(Self {
            base,
            config,
            client: manager,
        });

        registry::set(NAME, storage.clone());

        Ok(storage)
    }

    fn marshal(&self, status: Status, value: &Value) -> Result<Vec<u8>> {
        serde_json::to_vec(value)
            .map_err(|e| self.base.failure(status, Error::failed_to("marshal value").with_source(e)))
    }

    async fn set_value(
        &self,
        status: Status,
        operation: Operation,
        id: &str,
        bytes: Vec<u8>,
        ttl: Option<std::time::Duration>,
    ) -> Result<()> {
        let mut con = self.client.clone();

        let outcome: redis::RedisResult<()> = match ttl {
            Some(ttl) if !ttl.is_zero() => con.set_ex(id, bytes, ttl.as_secs()).await,
            _ => con.set(id, bytes).await,
        };

        outcome.map_err(|e| {
            self.base
                .failure(status, Error::failed_to(operation).with_source(e))
        })
    }
}

#[async_trait]
impl Storage for Redis {
    async fn count(
        &self,
        target: &str,
        prm: Option<&params::Count>,
        options: Vec<OptionFn<params::Count>>,
    ) -> Result<i64> {
        let span = self.base.operation_span(Status::Counted);

        async {
            let o = Options::assemble(options).map_err(|e| self.base.failure(Status::Counted, e))?;
            let prm = prm.cloned().unwrap_or_default();
            let pattern = prm.search.clone().unwrap_or_else(|| DEFAULT_PATTERN.to_owned());

            o.run_pre_hook(HookArgs {
                storage: self,
                id: "",
                target,
                data: None,
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Counted, e))?;

            let mut con = self.client.clone();

            let keys = match self.config.count_strategy {
                CountStrategy::Keys => con.keys::<_, Vec<String>>(&pattern).await,
                CountStrategy::Scan => scan_keys(&mut con, &pattern).await,
            }
            .map_err(|e| {
                self.base
                    .failure(Status::Counted, Error::failed_to(Operation::Count).with_source(e))
            })?;

            let count = keys.len() as i64;

            let data = Value::from(count);
            o.run_post_hook(HookArgs {
                storage: self,
                id: "",
                target,
                data: Some(&data),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Counted, e))?;

            self.base.completed(Status::Counted, target);

            Ok(count)
        }
        .instrument(span)
        .await
    }

    async fn create(
        &self,
        id: &str,
        target: &str,
        value: &Value,
        prm: Option<&params::Create>,
        options: Vec<OptionFn<params::Create>>,
    ) -> Result<String> {
        let span = self.base.operation_span(Status::Created);

        async {
            let o = Options::assemble(options).map_err(|e| self.base.failure(Status::Created, e))?;
            let prm = prm.cloned().unwrap_or_default();

            o.run_pre_hook(HookArgs {
                storage: self,
                id,
                target,
                data: Some(value),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Created, e))?;

            let bytes = self.marshal(Status::Created, value)?;
            self.set_value(Status::Created, Operation::Create, id, bytes, prm.ttl)
                .await?;

            o.run_post_hook(HookArgs {
                storage: self,
                id,
                target,
                data: Some(value),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Created, e))?;

            self.base.completed(Status::Created, target);

            Ok(id.to_owned())
        }
        .instrument(span)
        .await
    }

    async fn retrieve(
        &self,
        id: &str,
        target: &str,
        prm: Option<&params::Retrieve>,
        options: Vec<OptionFn<params::Retrieve>>,
    ) -> Result<Value> {
        self.base.require_id(id, Status::Retrieved)?;

        let span = self.base.operation_span(Status::Retrieved);

        async {
            let o =
                Options::assemble(options).map_err(|e| self.base.failure(Status::Retrieved, e))?;
            let prm = prm.cloned().unwrap_or_default();

            o.run_pre_hook(HookArgs {
                storage: self,
                id,
                target,
                data: None,
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Retrieved, e))?;

            let mut con = self.client.clone();

            let stored: Option<String> = con.get(id).await.map_err(|e| {
                self.base.failure(
                    Status::Retrieved,
                    Error::failed_to(Operation::Retrieve).with_source(e),
                )
            })?;

            let value = match stored {
                Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                    self.base.failure(
                        Status::Retrieved,
                        Error::failed_to("unmarshal value").with_source(e),
                    )
                })?,
                None => return Err(self.base.failure(Status::Retrieved, Error::not_found())),
            };

            o.run_post_hook(HookArgs {
                storage: self,
                id,
                target,
                data: Some(&value),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Retrieved, e))?;

            self.base.completed(Status::Retrieved, target);

            Ok(value)
        }
        .instrument(span)
        .await
    }

    async fn update(
        &self,
        id: &str,
        target: &str,
        value: &Value,
        prm: Option<&params::Update>,
        options: Vec<OptionFn<params::Update>>,
    ) -> Result<()> {
        self.base.require_id(id, Status::Updated)?;

        let span = self.base.operation_span(Status::Updated);

        async {
            let o = Options::assemble(options).map_err(|e| self.base.failure(Status::Updated, e))?;
            let prm = prm.cloned().unwrap_or_default();

            o.run_pre_hook(HookArgs {
                storage: self,
                id,
                target,
                data: Some(value),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Updated, e))?;

            let bytes = self.marshal(Status::Updated, value)?;
            self.set_value(Status::Updated, Operation::Update, id, bytes, prm.ttl)
                .await?;

            o.run_post_hook(HookArgs {
                storage: self,
                id,
                target,
                data: Some(value),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Updated, e))?;

            self.base.completed(Status::Updated, target);

            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn delete(
        &self,
        id: &str,
        target: &str,
        prm: Option<&params::Delete>,
        options: Vec<OptionFn<params::Delete>>,
    ) -> Result<()> {
        self.base.require_id(id, Status::Deleted)?;

        let span = self.base.operation_span(Status::Deleted);

        async {
            let o = Options::assemble(options).map_err(|e| self.base.failure(Status::Deleted, e))?;
            let prm = prm.cloned().unwrap_or_default();

            o.run_pre_hook(HookArgs {
                storage: self,
                id,
                target,
                data: None,
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Deleted, e))?;

            let mut con = self.client.clone();

            let _removed: i64 = con.del(id).await.map_err(|e| {
                self.base
                    .failure(Status::Deleted, Error::failed_to(Operation::Delete).with_source(e))
            })?;

            o.run_post_hook(HookArgs {
                storage: self,
                id,
                target,
                data: None,
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Deleted, e))?;

            self.base.completed(Status::Deleted, target);

            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn list(
        &self,
        target: &str,
        prm: Option<&params::List>,
        options: Vec<OptionFn<params::List>>,
    ) -> Result<Value> {
        let span = self.base.operation_span(Status::Listed);

        async {
            let o = Options::assemble(options).map_err(|e| self.base.failure(Status::Listed, e))?;
            let prm = prm.cloned().unwrap_or_default();
            let pattern = prm.search.clone().unwrap_or_else(|| DEFAULT_PATTERN.to_owned());

            o.run_pre_hook(HookArgs {
                storage: self,
                id: "",
                target,
                data: None,
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Listed, e))?;

            let mut con = self.client.clone();

            let keys = scan_keys(&mut con, &pattern).await.map_err(|e| {
                self.base
                    .failure(Status::Listed, Error::failed_to(Operation::List).with_source(e))
            })?;

            let value = json!({ "keys": keys });

            o.run_post_hook(HookArgs {
                storage: self,
                id: "",
                target,
                data: Some(&value),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Listed, e))?;

            self.base.completed(Status::Listed, target);

            Ok(value)
        }
        .instrument(span)
        .await
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

impl std::fmt::Debug for Redis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Redis")
            .field("count_strategy", &self.config.count_strategy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::contract::list_as;
    use crate::response::ListKeys;

    fn config() -> RedisConfig {
        RedisConfig::new(
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/0".to_owned()),
        )
    }

    #[tokio::test]
    #[ignore] // Requires a running Redis instance.
    async fn test_pattern_scan_round_trip() {
        let storage = Redis::new(config()).await.unwrap();
        let id = "VFzrp-scan-fixture";

        storage
            .create(id, "", &json!({"k": "v"}), None, Vec::new())
            .await
            .unwrap();

        let mut prm = params::Count::new();
        prm.search = Some("VF*".to_owned());
        assert_eq!(storage.count("", Some(&prm), Vec::new()).await.unwrap(), 1);

        let mut prm = params::List::new();
        prm.search = Some("VF*".to_owned());
        let keys: ListKeys = list_as(storage.as_ref(), "", Some(&prm), Vec::new())
            .await
            .unwrap();
        assert!(keys.keys.contains(&id.to_owned()));

        storage.delete(id, "", None, Vec::new()).await.unwrap();

        let mut prm = params::Count::new();
        prm.search = Some("VF*".to_owned());
        assert_eq!(storage.count("", Some(&prm), Vec::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    #[ignore] // Requires a running Redis instance.
    async fn test_retrieve_missing_is_not_found() {
        let storage = Redis::new(config()).await.unwrap();

        let err = storage
            .retrieve("strata-ghost", "", None, Vec::new())
            .await
            .unwrap_err();

        assert!(err.is_not_found());
    }

    #[tokio::test]
    #[ignore] // Requires a running Redis instance.
    async fn test_ttl_is_applied() {
        let storage = Redis::new(config()).await.unwrap();

        let mut prm = params::Create::new();
        prm.ttl = Some(std::time::Duration::from_secs(60));

        storage
            .create("strata-ttl", "", &json!({"k": "v"}), Some(&prm), Vec::new())
            .await
            .unwrap();

        let manager = storage
            .client()
            .downcast_ref::<ConnectionManager>()
            .unwrap();
        let mut con = manager.clone();
        let ttl: i64 = redis::cmd("TTL")
            .arg("strata-ttl")
            .query_async(&mut con)
            .await
            .unwrap();
        assert!(ttl > 0);

        storage.delete("strata-ttl", "", None, Vec::new()).await.unwrap();
    }
}
