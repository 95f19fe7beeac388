//! S3 object-store adapter.
//!
//! The target is an object key within the configured bucket (a key
//! prefix for Count/List). Create and Update write the JSON-marshalled
//! value, or raw bytes when the caller passes them through
//! [`AnyParam::RawBytes`], and return the canonical object location as
//! the stored id. [`S3::retrieve_signed`] yields a pre-signed GET URL.

mod config;

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
pub use config::S3Config;
use opendal::{services, Operator};
use serde_json::{json, Value};
use strata_core::{retry, Error, Operation, Result, Status};
use tracing::Instrument;
use validator::Validate;

use crate::base::{resolve_target, StorageBase};
use crate::contract::Storage;
use crate::observability::{OperationCounters, OperationLogger};
use crate::options::{HookArgs, OptionFn, Options};
use crate::params::{self, AnyParam};
use crate::registry;

/// Name of the storage.
pub const NAME: &str = "s3";

/// S3 storage definition.
pub struct S3 {
    base: StorageBase,
    config: S3Config,
    client: Operator,
}

fn is_not_found(err: &opendal::Error) -> bool {
    err.kind() == opendal::ErrorKind::NotFound
}

impl S3 {
    /// Creates a new S3 storage: builds the operator, probes the bucket
    /// through the standard retrier, and stores the adapter in the
    /// registry slot.
    pub async fn new(config: S3Config) -> Result<Arc<Self>> {
        let base = StorageBase::new(NAME)?;

        if let Err(errors) = config.validate() {
            return Err(base.instantiation_failure(Error::validation(errors.to_string())));
        }

        let mut builder = services::S3::default().bucket(&config.bucket);

        if let Some(ref region) = config.region {
            builder = builder.region(region);
        }

        if let Some(ref endpoint) = config.endpoint {
            builder = builder.endpoint(endpoint);
        }

        if let Some(ref access_key_id) = config.access_key_id {
            builder = builder.access_key_id(access_key_id);
        }

        if let Some(ref secret_access_key) = config.secret_access_key {
            builder = builder.secret_access_key(secret_access_key);
        }

        if let Some(ref prefix) = config.prefix {
            builder = builder.root(prefix);
        }

        let operator = Operator::new(builder)
            .map(|op| op.finish())
            .map_err(|e| base.instantiation_failure(Error::connection(e.to_string())))?;

        retry::probe(|| {
            let operator = operator.clone();
            async move {
                operator
                    .check()
                    .await
                    .map_err(|e| Error::failed_to("ping").with_source(e))
            }
        })
        .await
        .map_err(|e| base.ping_failure(e))?;

        let storage = Arc::new(Self {
            base,
            config,
            client: operator,
        });

        registry::set(NAME, storage.clone());

        Ok(storage)
    }

    fn static_target(&self) -> &str {
        self.config.target.as_deref().unwrap_or_default()
    }

    /// The canonical location of an object, reported as the stored id.
    fn location(&self, key: &str) -> String {
        format!("s3://{}/{}", self.config.bucket, key.trim_start_matches('/'))
    }

    fn body(&self, status: Status, value: &Value, any: &Option<AnyParam>) -> Result<Vec<u8>> {
        match any {
            Some(AnyParam::RawBytes(bytes)) => Ok(bytes.to_vec()),
            _ => serde_json::to_vec(value).map_err(|e| {
                self.base
                    .failure(status, Error::failed_to("marshal value").with_source(e))
            }),
        }
    }

    async fn object_keys(&self, status: Status, prefix: &str) -> Result<Vec<String>> {
        let entries = self
            .client
            .list_with(prefix)
            .recursive(true)
            .await
            .map_err(|e| {
                self.base
                    .failure(status, Error::failed_to("list objects").with_source(e))
            })?;

        Ok(entries
            .into_iter()
            .filter(|entry| !entry.metadata().mode().is_dir())
            .map(|entry| entry.path().to_owned())
            .collect())
    }

    /// Generates a pre-signed GET URL for `target`, valid for
    /// `expires_in`.
    pub async fn retrieve_signed(&self, target: &str, expires_in: Duration) -> Result<String> {
        let key = resolve_target(target, self.static_target())
            .map_err(|e| self.base.failure(Status::Retrieved, e))?;

        let presigned = self
            .client
            .presign_read(&key, expires_in)
            .await
            .map_err(|e| {
                self.base.failure(
                    Status::Retrieved,
                    Error::failed_to("presign request").with_source(e),
                )
            })?;

        Ok(presigned.uri().to_string())
    }
}

#[async_trait]
impl Storage for S3 {
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

            let prefix = resolve_target(target, self.static_target())
                .map_err(|e| self.base.failure(Status::Counted, e))?;

            o.run_pre_hook(HookArgs {
                storage: self,
                id: "",
                target: &prefix,
                data: None,
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Counted, e))?;

            let count = self.object_keys(Status::Counted, &prefix).await?.len() as i64;

            let data = Value::from(count);
            o.run_post_hook(HookArgs {
                storage: self,
                id: "",
                target: &prefix,
                data: Some(&data),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Counted, e))?;

            self.base.completed(Status::Counted, &prefix);

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

            let key = resolve_target(target, self.static_target())
                .map_err(|e| self.base.failure(Status::Created, e))?;

            o.run_pre_hook(HookArgs {
                storage: self,
                id,
                target: &key,
                data: Some(value),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Created, e))?;

            let body = self.body(Status::Created, value, &prm.any)?;

            self.client.write(&key, body).await.map_err(|e| {
                self.base.failure(
                    Status::Created,
                    Error::failed_to(Operation::Create).with_source(e),
                )
            })?;

            let location = self.location(&key);

            o.run_post_hook(HookArgs {
                storage: self,
                id: &location,
                target: &key,
                data: Some(value),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Created, e))?;

            self.base.completed(Status::Created, &key);

            Ok(location)
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

            let key = resolve_target(target, self.static_target())
                .map_err(|e| self.base.failure(Status::Retrieved, e))?;

            o.run_pre_hook(HookArgs {
                storage: self,
                id,
                target: &key,
                data: None,
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Retrieved, e))?;

            let buffer = match self.client.read(&key).await {
                Ok(buffer) => buffer,
                Err(e) if is_not_found(&e) => {
                    return Err(self.base.failure(Status::Retrieved, Error::not_found()));
                }
                Err(e) => {
                    return Err(self.base.failure(
                        Status::Retrieved,
                        Error::failed_to(Operation::Retrieve).with_source(e),
                    ));
                }
            };

            let value: Value = serde_json::from_slice(&buffer.to_vec()).map_err(|e| {
                self.base.failure(
                    Status::Retrieved,
                    Error::failed_to("unmarshal object body").with_source(e),
                )
            })?;

            o.run_post_hook(HookArgs {
                storage: self,
                id,
                target: &key,
                data: Some(&value),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Retrieved, e))?;

            self.base.completed(Status::Retrieved, &key);

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

            let key = resolve_target(target, self.static_target())
                .map_err(|e| self.base.failure(Status::Updated, e))?;

            o.run_pre_hook(HookArgs {
                storage: self,
                id,
                target: &key,
                data: Some(value),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Updated, e))?;

            let body = self.body(Status::Updated, value, &prm.any)?;

            self.client.write(&key, body).await.map_err(|e| {
                self.base.failure(
                    Status::Updated,
                    Error::failed_to(Operation::Update).with_source(e),
                )
            })?;

            o.run_post_hook(HookArgs {
                storage: self,
                id,
                target: &key,
                data: Some(value),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Updated, e))?;

            self.base.completed(Status::Updated, &key);

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

            let key = resolve_target(target, self.static_target())
                .map_err(|e| self.base.failure(Status::Deleted, e))?;

            o.run_pre_hook(HookArgs {
                storage: self,
                id,
                target: &key,
                data: None,
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Deleted, e))?;

            self.client.delete(&key).await.map_err(|e| {
                self.base.failure(
                    Status::Deleted,
                    Error::failed_to(Operation::Delete).with_source(e),
                )
            })?;

            o.run_post_hook(HookArgs {
                storage: self,
                id,
                target: &key,
                data: None,
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Deleted, e))?;

            self.base.completed(Status::Deleted, &key);

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

            let prefix = resolve_target(target, self.static_target())
                .map_err(|e| self.base.failure(Status::Listed, e))?;

            o.run_pre_hook(HookArgs {
                storage: self,
                id: "",
                target: &prefix,
                data: None,
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Listed, e))?;

            let keys = self.object_keys(Status::Listed, &prefix).await?;
            let value = json!({ "keys": keys });

            o.run_post_hook(HookArgs {
                storage: self,
                id: "",
                target: &prefix,
                data: Some(&value),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Listed, e))?;

            self.base.completed(Status::Listed, &prefix);

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

impl std::fmt::Debug for S3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3")
            .field("bucket", &self.config.bucket)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn config() -> S3Config {
        let mut config = S3Config::new(
            std::env::var("S3_BUCKET").unwrap_or_else(|_| "strata-test".to_owned()),
        );
        config.endpoint = std::env::var("S3_ENDPOINT").ok();
        config.region = Some("us-east-1".to_owned());
        config.access_key_id = std::env::var("S3_ACCESS_KEY_ID").ok();
        config.secret_access_key = std::env::var("S3_SECRET_ACCESS_KEY").ok();
        config
    }

    /// Builds the adapter without the connectivity probe; good enough
    /// for paths that fail before any driver call.
    fn offline_storage() -> S3 {
        let mut config = S3Config::new("strata-test");
        config.region = Some("us-east-1".to_owned());
        config.endpoint = Some("http://127.0.0.1:9000".to_owned());
        config.access_key_id = Some("test".to_owned());
        config.secret_access_key = Some("test".to_owned());

        let builder = services::S3::default()
            .bucket(&config.bucket)
            .region("us-east-1")
            .endpoint("http://127.0.0.1:9000")
            .access_key_id("test")
            .secret_access_key("test");

        let operator = Operator::new(builder).unwrap().finish();

        S3 {
            base: StorageBase::new(NAME).unwrap(),
            config,
            client: operator,
        }
    }

    #[tokio::test]
    async fn test_empty_id_is_rejected_before_any_driver_call() {
        let storage = offline_storage();

        let err = storage
            .retrieve("", "fixtures/dal-x.json", None, Vec::new())
            .await
            .unwrap_err();
        assert!(err.is_required());

        let err = storage
            .update("", "fixtures/dal-x.json", &json!({}), None, Vec::new())
            .await
            .unwrap_err();
        assert!(err.is_required());

        let err = storage
            .delete("", "fixtures/dal-x.json", None, Vec::new())
            .await
            .unwrap_err();
        assert!(err.is_required());

        assert_eq!(storage.counters().retrieved_failed().value(), 1);
        assert_eq!(storage.counters().updated_failed().value(), 1);
        assert_eq!(storage.counters().deleted_failed().value(), 1);
        assert_eq!(storage.counters().retrieved().value(), 0);
        assert_eq!(storage.counters().updated().value(), 0);
        assert_eq!(storage.counters().deleted().value(), 0);
    }

    #[tokio::test]
    #[ignore] // Requires a reachable S3-compatible service.
    async fn test_object_round_trip() {
        let storage = S3::new(config()).await.unwrap();

        let location = storage
            .create("", "fixtures/dal-x.json", &json!({"k": "v"}), None, Vec::new())
            .await
            .unwrap();
        assert!(location.starts_with("s3://"));
        assert!(location.ends_with("fixtures/dal-x.json"));

        let got = storage
            .retrieve("dal-x", "fixtures/dal-x.json", None, Vec::new())
            .await
            .unwrap();
        assert_eq!(got, json!({"k": "v"}));

        assert!(storage.count("fixtures/", None, Vec::new()).await.unwrap() >= 1);

        let url = storage
            .retrieve_signed("fixtures/dal-x.json", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(url.contains("fixtures/dal-x.json"));

        storage
            .delete("dal-x", "fixtures/dal-x.json", None, Vec::new())
            .await
            .unwrap();
    }
}
