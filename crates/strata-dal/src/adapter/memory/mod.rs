//! In-memory storage adapter.
//!
//! A concurrent map keyed by id; values are the JSON-marshalled bytes of
//! whatever was stored. The target argument is unused. Count ignores the
//! filter expression: it reports the whole map.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use strata_core::{Error, Operation, Result, Status};
use tracing::Instrument;

use crate::base::StorageBase;
use crate::contract::Storage;
use crate::observability::{OperationCounters, OperationLogger};
use crate::options::{HookArgs, OptionFn, Options};
use crate::params;
use crate::registry;

/// Name of the storage.
pub const NAME: &str = "memory";

/// In-memory storage definition.
pub struct Memory {
    base: StorageBase,
    client: Arc<DashMap<String, Vec<u8>>>,
}

impl Memory {
    /// Creates a new in-memory storage and stores it in the registry
    /// slot.
    pub fn new() -> Result<Arc<Self>> {
        let base = StorageBase::new(NAME)?;

        let storage = Arc::new(Self {
            base,
            client: Arc::new(DashMap::new()),
        });

        registry::set(NAME, storage.clone());

        Ok(storage)
    }

    fn marshal(&self, status: Status, value: &Value) -> Result<Vec<u8>> {
        serde_json::to_vec(value)
            .map_err(|e| self.base.failure(status, Error::failed_to("marshal value").with_source(e)))
    }
}

#[async_trait]
impl Storage for Memory {
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

            o.run_pre_hook(HookArgs {
                storage: self,
                id: "",
                target,
                data: None,
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Counted, e))?;

            let count = self.client.len() as i64;

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
            self.client.insert(id.to_owned(), bytes);

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

            let value = match self.client.get(id) {
                Some(entry) => serde_json::from_slice(entry.value()).map_err(|e| {
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
            self.client.insert(id.to_owned(), bytes);

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

            self.client.remove(id);

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

            o.run_pre_hook(HookArgs {
                storage: self,
                id: "",
                target,
                data: None,
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Listed, e))?;

            // Concatenate the stored JSON bytes into one items envelope
            // and parse it back, so the response carries the values
            // exactly as marshalled.
            let mut buf = String::from(r#"{"items":["#);
            let mut first = true;

            for entry in self.client.iter() {
                let item = std::str::from_utf8(entry.value()).map_err(|e| {
                    self.base.failure(
                        Status::Listed,
                        Error::failed_to(Operation::List).with_source(e),
                    )
                })?;

                if !first {
                    buf.push(',');
                }

                buf.push_str(item);
                first = false;
            }

            buf.push_str("]}");

            let value: Value = serde_json::from_str(&buf).map_err(|e| {
                self.base.failure(
                    Status::Listed,
                    Error::failed_to("unmarshal items").with_source(e),
                )
            })?;

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

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory")
            .field("entries", &self.client.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::contract::list_as;
    use crate::options::{with_post_hook, with_pre_hook, HookFn};
    use crate::response::ListItems;

    #[tokio::test]
    async fn test_round_trip() {
        let storage = Memory::new().unwrap();

        let created = storage
            .create(
                "u-1",
                "api",
                &json!({"id": "u-1", "name": "test", "version": "1.0.0"}),
                None,
                Vec::new(),
            )
            .await
            .unwrap();
        assert_eq!(created, "u-1");

        assert_eq!(storage.count("api", None, Vec::new()).await.unwrap(), 1);

        let got = storage.retrieve("u-1", "api", None, Vec::new()).await.unwrap();
        assert_eq!(got, json!({"id": "u-1", "name": "test", "version": "1.0.0"}));

        storage
            .update(
                "u-1",
                "api",
                &json!({"id": "u-1", "name": "test", "version": "2.0.0"}),
                None,
                Vec::new(),
            )
            .await
            .unwrap();

        let got = storage.retrieve("u-1", "api", None, Vec::new()).await.unwrap();
        assert_eq!(got["version"], json!("2.0.0"));

        storage.delete("u-1", "api", None, Vec::new()).await.unwrap();
        assert_eq!(storage.count("api", None, Vec::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_retrieve_missing_is_not_found() {
        let storage = Memory::new().unwrap();

        let err = storage
            .retrieve("ghost", "api", None, Vec::new())
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(err.status_code(), 404);
        assert_eq!(storage.counters().retrieved_failed().value(), 1);
        assert_eq!(storage.counters().retrieved().value(), 0);
    }

    #[tokio::test]
    async fn test_empty_id_is_rejected_before_any_effect() {
        let storage = Memory::new().unwrap();

        let err = storage
            .update("", "api", &json!({}), None, Vec::new())
            .await
            .unwrap_err();

        assert!(err.is_required());
        assert_eq!(storage.counters().updated_failed().value(), 1);
        assert_eq!(storage.counters().updated().value(), 0);
    }

    #[tokio::test]
    async fn test_exactly_one_counter_moves_per_call() {
        let storage = Memory::new().unwrap();

        storage
            .create("k", "api", &json!({"v": 1}), None, Vec::new())
            .await
            .unwrap();
        let _ = storage.retrieve("nope", "api", None, Vec::new()).await;

        assert_eq!(
            storage.counters().created().value() + storage.counters().created_failed().value(),
            1
        );
        assert_eq!(
            storage.counters().retrieved().value() + storage.counters().retrieved_failed().value(),
            1
        );
    }

    #[tokio::test]
    async fn test_pre_hook_error_short_circuits() {
        let storage = Memory::new().unwrap();

        let pre: HookFn<params::Create> = Arc::new(|_args| {
            Box::pin(async { Err(Error::validation("rejected by pre-hook")) })
        });
        let post: HookFn<params::Create> =
            Arc::new(|_args| Box::pin(async { panic!("post-hook must not run") }));

        let err = storage
            .create(
                "k",
                "api",
                &json!({"v": 1}),
                None,
                vec![with_pre_hook(pre), with_post_hook(post)],
            )
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "validation failed: rejected by pre-hook");
        // The driver was never touched.
        assert_eq!(storage.count("api", None, Vec::new()).await.unwrap(), 0);
        assert_eq!(storage.counters().created_failed().value(), 1);
    }

    #[tokio::test]
    async fn test_post_hook_runs_on_success() {
        let storage = Memory::new().unwrap();
        let seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let seen_in_hook = seen.clone();
        let post: HookFn<params::Create> = Arc::new(move |args| {
            let seen = seen_in_hook.clone();
            Box::pin(async move {
                assert_eq!(args.id, "k");
                assert!(args.data.is_some());
                seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            })
        });

        storage
            .create("k", "api", &json!({"v": 1}), None, vec![with_post_hook(post)])
            .await
            .unwrap();

        assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_count_post_hook_receives_count() {
        let storage = Memory::new().unwrap();
        storage
            .create("k", "api", &json!({"v": 1}), None, Vec::new())
            .await
            .unwrap();

        let post: HookFn<params::Count> = Arc::new(|args| {
            Box::pin(async move {
                assert_eq!(args.data, Some(&json!(1)));
                Ok(())
            })
        });

        let count = storage
            .count("api", None, vec![with_post_hook(post)])
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_list_envelope() {
        let storage = Memory::new().unwrap();
        storage
            .create("a", "api", &json!({"k": "a"}), None, Vec::new())
            .await
            .unwrap();
        storage
            .create("b", "api", &json!({"k": "b"}), None, Vec::new())
            .await
            .unwrap();

        let listed: ListItems<Value> = list_as(storage.as_ref(), "api", None, Vec::new())
            .await
            .unwrap();

        assert_eq!(listed.items.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_missing_is_stable() {
        let storage = Memory::new().unwrap();

        storage.delete("ghost", "api", None, Vec::new()).await.unwrap();
        storage.delete("ghost", "api", None, Vec::new()).await.unwrap();

        assert_eq!(storage.counters().deleted().value(), 2);
    }
}
