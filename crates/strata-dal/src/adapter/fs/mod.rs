//! Local filesystem adapter.
//!
//! The target is a full path: a directory for Count/List, a file for the
//! other operations. Count and List glob the directory against the
//! `search` pattern (default `*`). Create overwrites; parent directories
//! are only created when the caller asks for it through
//! [`AnyParam::CreateIfMissing`]. Deleting a missing file is not an
//! error.

mod config;

use std::any::Any;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
pub use config::FsConfig;
use globset::{Glob, GlobMatcher};
use serde_json::{json, Value};
use strata_core::{Error, Operation, Result, Status};
use tracing::Instrument;
use validator::Validate;

use crate::base::{resolve_target, StorageBase};
use crate::contract::Storage;
use crate::observability::{OperationCounters, OperationLogger};
use crate::options::{HookArgs, OptionFn, Options};
use crate::params::{self, AnyParam};
use crate::registry;

/// Name of the storage.
pub const NAME: &str = "fs";

/// Default glob pattern for Count and List.
const DEFAULT_PATTERN: &str = "*";

/// Local filesystem storage definition.
pub struct Fs {
    base: StorageBase,
    config: FsConfig,
    client: (),
}

impl Fs {
    /// Creates a new filesystem storage and stores it in the registry
    /// slot.
    pub fn new(config: FsConfig) -> Result<Arc<Self>> {
        let base = StorageBase::new(NAME)?;

        if let Err(errors) = config.validate() {
            return Err(base.instantiation_failure(Error::validation(errors.to_string())));
        }

        let storage = Arc::new(Self {
            base,
            config,
            client: (),
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

    async fn matched_names(
        &self,
        status: Status,
        dir: &str,
        pattern: &str,
    ) -> Result<Vec<String>> {
        let matcher = self.matcher(status, pattern)?;

        let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
            self.base
                .failure(status, Error::failed_to("read directory").with_source(e))
        })?;

        let mut names = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            self.base
                .failure(status, Error::failed_to("read directory").with_source(e))
        })? {
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);

            let name = entry.file_name().to_string_lossy().into_owned();

            if is_file && matcher.is_match(&name) {
                names.push(name);
            }
        }

        names.sort();

        Ok(names)
    }

    async fn write_value(
        &self,
        status: Status,
        path: &str,
        value: &Value,
        any: &Option<AnyParam>,
    ) -> Result<()> {
        if let Some(AnyParam::CreateIfMissing(true)) = any {
            if let Some(parent) = Path::new(path).parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    self.base.failure(
                        status,
                        Error::failed_to("create parent directories").with_source(e),
                    )
                })?;
            }
        }

        let bytes = serde_json::to_vec(value).map_err(|e| {
            self.base
                .failure(status, Error::failed_to("marshal value").with_source(e))
        })?;

        tokio::fs::write(path, bytes).await.map_err(|e| {
            self.base
                .failure(status, Error::failed_to("write file").with_source(e))
        })
    }
}

#[async_trait]
impl Storage for Fs {
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

            self.write_value(Status::Created, &path, value, &prm.any).await?;

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

            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(self.base.failure(Status::Retrieved, Error::not_found()));
                }
                Err(e) => {
                    return Err(self.base.failure(
                        Status::Retrieved,
                        Error::failed_to(Operation::Retrieve).with_source(e),
                    ));
                }
            };

            let value: Value = serde_json::from_slice(&bytes).map_err(|e| {
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

            self.write_value(Status::Updated, &path, value, &prm.any).await?;

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

            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                // A missing file is not an error.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
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

impl std::fmt::Debug for Fs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fs").field("config", &self.config).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::contract::list_as;
    use crate::response::ListKeys;

    fn scratch_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "strata-fs-{label}-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_create_if_missing_builds_parents() {
        let root = scratch_dir("missing");
        let path = root
            .join("sub")
            .join("missing")
            .join("dal-x.json")
            .to_string_lossy()
            .into_owned();

        let storage = Fs::new(FsConfig::default()).unwrap();
        let value = serde_json::json!({"id": "u-1", "name": "test"});

        let mut prm = params::Create::new();
        prm.any = Some(AnyParam::CreateIfMissing(true));

        let created = storage
            .create("u-1", &path, &value, Some(&prm), Vec::new())
            .await
            .unwrap();
        assert_eq!(created, path);

        let got = storage.retrieve("u-1", &path, None, Vec::new()).await.unwrap();
        assert_eq!(got, value);

        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn test_create_without_parents_fails_by_default() {
        let root = scratch_dir("noparents");
        let path = root
            .join("nope")
            .join("dal-y.json")
            .to_string_lossy()
            .into_owned();

        let storage = Fs::new(FsConfig::default()).unwrap();

        let err = storage
            .create("u-1", &path, &serde_json::json!({}), None, Vec::new())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "failed to write file");

        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn test_count_and_list_glob() {
        let root = scratch_dir("glob");
        let dir = root.to_string_lossy().into_owned();

        let storage = Fs::new(FsConfig::default()).unwrap();

        for name in ["a.json", "b.json", "c.txt"] {
            let path = root.join(name).to_string_lossy().into_owned();
            storage
                .create("", &path, &serde_json::json!({"name": name}), None, Vec::new())
                .await
                .unwrap();
        }

        let mut prm = params::Count::new();
        prm.search = Some("*.json".to_owned());
        assert_eq!(
            storage.count(&dir, Some(&prm), Vec::new()).await.unwrap(),
            2
        );

        let mut prm = params::List::new();
        prm.search = Some("*.json".to_owned());
        let keys: ListKeys = list_as(storage.as_ref(), &dir, Some(&prm), Vec::new())
            .await
            .unwrap();
        assert_eq!(keys.keys, vec!["a.json".to_owned(), "b.json".to_owned()]);

        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn test_delete_missing_is_idempotent() {
        let root = scratch_dir("delete");
        let path = root.join("ghost.json").to_string_lossy().into_owned();

        let storage = Fs::new(FsConfig::default()).unwrap();

        storage.delete("", &path, None, Vec::new()).await.unwrap();
        storage.delete("", &path, None, Vec::new()).await.unwrap();

        assert_eq!(storage.counters().deleted().value(), 2);

        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn test_empty_id_is_rejected_for_retrieve_and_update() {
        let storage = Fs::new(FsConfig::default()).unwrap();

        let err = storage
            .retrieve("", "/tmp/dal-x.json", None, Vec::new())
            .await
            .unwrap_err();
        assert!(err.is_required());

        let err = storage
            .update("", "/tmp/dal-x.json", &serde_json::json!({}), None, Vec::new())
            .await
            .unwrap_err();
        assert!(err.is_required());

        assert_eq!(storage.counters().retrieved_failed().value(), 1);
        assert_eq!(storage.counters().updated_failed().value(), 1);
        assert_eq!(storage.counters().retrieved().value(), 0);
        assert_eq!(storage.counters().updated().value(), 0);
    }

    #[tokio::test]
    async fn test_missing_target_is_total() {
        let storage = Fs::new(FsConfig::default()).unwrap();

        let err = storage.retrieve("id", "", None, Vec::new()).await.unwrap_err();

        assert!(err.is_required());
        assert_eq!(err.to_string(), "target name is required");
    }
}
