//! SFTP adapter.
//!
//! Same shape as the filesystem adapter, over the remote connection: the
//! target is a full path, Count and List glob a directory against the
//! `search` pattern, directory listings exclude subdirectories, and
//! deleting a missing file is not an error.

mod config;

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
pub use config::SftpConfig;
use globset::{Glob, GlobMatcher};
use opendal::{services, Operator};
use serde_json::{json, Value};
use strata_core::{retry, Error, Operation, Result, Status};
use tracing::Instrument;
use validator::Validate;

use crate::base::{resolve_target, StorageBase};
use crate::contract::Storage;
use crate::observability::{OperationCounters, OperationLogger};
use crate::options::{HookArgs, OptionFn, Options};
use crate::params;
use crate::registry;

/// Name of the storage.
pub const NAME: &str = "sftp";

/// Default glob pattern for Count and List.
const DEFAULT_PATTERN: &str = "*";

/// SFTP storage definition.
pub struct Sftp {
    base: StorageBase,
    config: SftpConfig,
    client: Operator,
}

fn is_not_found(err: &opendal::Error) -> bool {
    err.kind() == opendal::ErrorKind::NotFound
}

impl Sftp {
    /// Creates a new SFTP storage: builds the operator, probes the
    /// server through the standard retrier, and stores the adapter in
    /// the registry slot.
    pub async fn new(config: SftpConfig) -> Result<Arc<Self>> {
        let base = StorageBase::new(NAME)?;

        if let Err(errors) = config.validate() {
            return Err(base.instantiation_failure(Error::validation(errors.to_string())));
        }

        let mut builder = services::Sftp::default()
            .endpoint(&config.endpoint)
            .user(&config.user);

        if let Some(ref key) = config.key {
            builder = builder.key(key);
        }

        if let Some(ref strategy) = config.known_hosts_strategy {
            builder = builder.known_hosts_strategy(strategy);
        }

        if let Some(ref root) = config.root {
            builder = builder.root(root);
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

    fn matcher(&self, status: Status, pattern: &str) -> Result<GlobMatcher> {
        Glob::new(pattern)
            .map(|glob| glob.compile_matcher())
            .map_err(|e| {
                self.base.failure(
                    status,
                    Error::failed_to("compile glob pattern").with_source(e),
                )
            })
    }

    /// Lists the file names directly under `dir` matching `pattern`;
    /// subdirectories are excluded.
    async fn matched_names(
        &self,
        status: Status,
        dir: &str,
        pattern: &str,
    ) -> Result<Vec<String>> {
        let matcher = self.matcher(status, pattern)?;

        let entries = self.client.list(dir).await.map_err(|e| {
            self.base
                .failure(status, Error::failed_to("list directory").with_source(e))
        })?;

        let mut names: Vec<String> = entries
            .into_iter()
            .filter(|entry| !entry.metadata().mode().is_dir())
            .map(|entry| entry.name().to_owned())
            .filter(|name| matcher.is_match(name))
            .collect();

        names.sort();

        Ok(names)
    }

    fn marshal(&self, status: Status, value: &Value) -> Result<Vec<u8>> {
        serde_json::to_vec(value)
            .map_err(|e| self.base.failure(status, Error::failed_to("marshal value").with_source(e)))
    }
}

#[async_trait]
impl Storage for Sftp {
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

            let dir = resolve_target(target, self.static_target())
                .map_err(|e| self.base.failure(Status::Counted, e))?;

            o.run_pre_hook(HookArgs {
                storage: self,
                id: "",
                target: &dir,
                data: None,
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Counted, e))?;

            let count = self.matched_names(Status::Counted, &dir, &pattern).await?.len() as i64;

            let data = Value::from(count);
            o.run_post_hook(HookArgs {
                storage: self,
                id: "",
                target: &dir,
                data: Some(&data),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Counted, e))?;

            self.base.completed(Status::Counted, &dir);

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

            let path = resolve_target(target, self.static_target())
                .map_err(|e| self.base.failure(Status::Created, e))?;

            o.run_pre_hook(HookArgs {
                storage: self,
                id,
                target: &path,
                data: Some(value),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Created, e))?;

            let bytes = self.marshal(Status::Created, value)?;

            self.client.write(&path, bytes).await.map_err(|e| {
                self.base.failure(
                    Status::Created,
                    Error::failed_to(Operation::Create).with_source(e),
                )
            })?;

            o.run_post_hook(HookArgs {
                storage: self,
                id,
                target: &path,
                data: Some(value),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Created, e))?;

            self.base.completed(Status::Created, &path);

            Ok(path)
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

            let path = resolve_target(target, self.static_target())
                .map_err(|e| self.base.failure(Status::Retrieved, e))?;

            o.run_pre_hook(HookArgs {
                storage: self,
                id,
                target: &path,
                data: None,
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Retrieved, e))?;

            let buffer = match self.client.read(&path).await {
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
                    Error::failed_to("unmarshal file content").with_source(e),
                )
            })?;

            o.run_post_hook(HookArgs {
                storage: self,
                id,
                target: &path,
                data: Some(&value),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Retrieved, e))?;

            self.base.completed(Status::Retrieved, &path);

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

            let path = resolve_target(target, self.static_target())
                .map_err(|e| self.base.failure(Status::Updated, e))?;

            o.run_pre_hook(HookArgs {
                storage: self,
                id,
                target: &path,
                data: Some(value),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Updated, e))?;

            let bytes = self.marshal(Status::Updated, value)?;

            self.client.write(&path, bytes).await.map_err(|e| {
                self.base.failure(
                    Status::Updated,
                    Error::failed_to(Operation::Update).with_source(e),
                )
            })?;

            o.run_post_hook(HookArgs {
                storage: self,
                id,
                target: &path,
                data: Some(value),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Updated, e))?;

            self.base.completed(Status::Updated, &path);

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
        let span = self.base.operation_span(Status::Deleted);

        async {
            let o = Options::assemble(options).map_err(|e| self.base.failure(Status::Deleted, e))?;
            let prm = prm.cloned().unwrap_or_default();

            let path = resolve_target(target, self.static_target())
                .map_err(|e| self.base.failure(Status::Deleted, e))?;

            o.run_pre_hook(HookArgs {
                storage: self,
                id,
                target: &path,
                data: None,
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Deleted, e))?;

            // A missing file is not an error.
            match self.client.delete(&path).await {
                Ok(()) => {}
                Err(e) if is_not_found(&e) => {}
                Err(e) => {
                    return Err(self.base.failure(
                        Status::Deleted,
                        Error::failed_to(Operation::Delete).with_source(e),
                    ));
                }
            }

            o.run_post_hook(HookArgs {
                storage: self,
                id,
                target: &path,
                data: None,
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Deleted, e))?;

            self.base.completed(Status::Deleted, &path);

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

            let dir = resolve_target(target, self.static_target())
                .map_err(|e| self.base.failure(Status::Listed, e))?;

            o.run_pre_hook(HookArgs {
                storage: self,
                id: "",
                target: &dir,
                data: None,
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Listed, e))?;

            let names = self.matched_names(Status::Listed, &dir, &pattern).await?;
            let value = json!({ "keys": names });

            o.run_post_hook(HookArgs {
                storage: self,
                id: "",
                target: &dir,
                data: Some(&value),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Listed, e))?;

            self.base.completed(Status::Listed, &dir);

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

impl std::fmt::Debug for Sftp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sftp")
            .field("endpoint", &self.config.endpoint)
            .field("user", &self.config.user)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn config() -> SftpConfig {
        let mut config = SftpConfig::new(
            std::env::var("SFTP_ENDPOINT").unwrap_or_else(|_| "ssh://127.0.0.1:22".to_owned()),
            std::env::var("SFTP_USER").unwrap_or_else(|_| "strata".to_owned()),
        );
        config.key = std::env::var("SFTP_KEY").ok();
        config.known_hosts_strategy = Some("accept-new".to_owned());
        config
    }

    #[tokio::test]
    #[ignore] // Requires a reachable SFTP server.
    async fn test_remote_round_trip() {
        let storage = Sftp::new(config()).await.unwrap();

        storage
            .create("", "fixtures/dal-x.json", &json!({"k": "v"}), None, Vec::new())
            .await
            .unwrap();

        let got = storage
            .retrieve("dal-x", "fixtures/dal-x.json", None, Vec::new())
            .await
            .unwrap();
        assert_eq!(got, json!({"k": "v"}));

        let mut prm = params::Count::new();
        prm.search = Some("*.json".to_owned());
        assert!(storage.count("fixtures/", Some(&prm), Vec::new()).await.unwrap() >= 1);

        storage
            .delete("", "fixtures/dal-x.json", None, Vec::new())
            .await
            .unwrap();

        // Deleting again must stay silent.
        storage
            .delete("", "fixtures/dal-x.json", None, Vec::new())
            .await
            .unwrap();
    }
}
