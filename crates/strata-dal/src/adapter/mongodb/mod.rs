//! MongoDB adapter.
//!
//! The target is a collection; the logical database comes from the
//! configuration and can be overridden per call with `with_database`.
//! Retrieval, update and deletion address documents by `_id` equality.

mod config;

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
pub use config::MongodbConfig;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::Client;
use serde_json::Value;
use strata_core::{retry, Error, Operation, Result, Status};
use tracing::Instrument;
use validator::Validate;

use crate::base::{resolve_target, StorageBase};
use crate::contract::Storage;
use crate::observability::{OperationCounters, OperationLogger};
use crate::options::{HookArgs, OptionFn, Options};
use crate::params::{self, AnyParam, Direction, SortField};
use crate::registry;

/// Name of the storage.
pub const NAME: &str = "mongodb";

/// MongoDB storage definition.
pub struct Mongodb {
    base: StorageBase,
    config: MongodbConfig,
    client: Client,
}

/// Converts a multi-key sort into the `±1` document form.
fn to_mongo_sort(sort: &[SortField]) -> Document {
    let mut spec = Document::new();

    for key in sort {
        let order = match key.direction {
            Direction::Asc => 1,
            Direction::Desc => -1,
        };

        spec.insert(&key.field, order);
    }

    spec
}

/// Parses a JSON filter expression into a filter document; empty input
/// matches all.
fn parse_filter(search: Option<&str>) -> std::result::Result<Document, Error> {
    match search {
        Some(raw) if !raw.is_empty() => {
            let value: Value = serde_json::from_str(raw)
                .map_err(|e| Error::failed_to("unmarshal filter").with_source(e))?;

            mongodb::bson::to_document(&value)
                .map_err(|e| Error::failed_to("convert filter").with_source(e))
        }
        _ => Ok(Document::new()),
    }
}

impl Mongodb {
    /// Creates a new MongoDB storage: connects, probes the deployment
    /// through the standard retrier, and stores the adapter in the
    /// registry slot.
    pub async fn new(config: MongodbConfig) -> Result<Arc<Self>> {
        let base = StorageBase::new(NAME)?;

        if let Err(errors) = config.validate() {
            return Err(base.instantiation_failure(Error::validation(errors.to_string())));
        }

        let client = Client::with_uri_str(&config.uri)
            .await
            .map_err(|e| base.instantiation_failure(Error::connection(e.to_string())))?;

        retry::probe(|| {
            let client = client.clone();
            async move {
                client
                    .database("admin")
                    .run_command(doc! {"ping": 1})
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
            client,
        });

        registry::set(NAME, storage.clone());

        Ok(storage)
    }

    fn collection(&self, database: Option<&str>, target: &str) -> mongodb::Collection<Document> {
        let database = database.unwrap_or(&self.config.database);

        self.client.database(database).collection(target)
    }

    fn static_target(&self) -> &str {
        self.config.target.as_deref().unwrap_or_default()
    }

    fn to_document(&self, status: Status, value: &Value) -> Result<Document> {
        mongodb::bson::to_document(value).map_err(|e| {
            self.base
                .failure(status, Error::failed_to("convert value").with_source(e))
        })
    }

    fn to_value(&self, status: Status, document: &Document) -> Result<Value> {
        serde_json::to_value(document).map_err(|e| {
            self.base
                .failure(status, Error::failed_to("convert document").with_source(e))
        })
    }
}

#[async_trait]
impl Storage for Mongodb {
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

            let filter = parse_filter(prm.search.as_deref())
                .map_err(|e| self.base.failure(Status::Counted, e))?;

            let trgt = resolve_target(target, self.static_target())
                .map_err(|e| self.base.failure(Status::Counted, e))?;

            o.run_pre_hook(HookArgs {
                storage: self,
                id: "",
                target: &trgt,
                data: None,
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Counted, e))?;

            let count = self
                .collection(o.database.as_deref(), &trgt)
                .count_documents(filter)
                .await
                .map_err(|e| {
                    self.base
                        .failure(Status::Counted, Error::failed_to(Operation::Count).with_source(e))
                })? as i64;

            let data = Value::from(count);
            o.run_post_hook(HookArgs {
                storage: self,
                id: "",
                target: &trgt,
                data: Some(&data),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Counted, e))?;

            self.base.completed(Status::Counted, &trgt);

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

            let trgt = resolve_target(target, self.static_target())
                .map_err(|e| self.base.failure(Status::Created, e))?;

            o.run_pre_hook(HookArgs {
                storage: self,
                id,
                target: &trgt,
                data: Some(value),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Created, e))?;

            let mut document = self.to_document(Status::Created, value)?;

            // The document is addressed by the caller's id; the adapter
            // never invents one.
            if !id.is_empty() && !document.contains_key("_id") {
                document.insert("_id", id);
            }

            let inserted = self
                .collection(o.database.as_deref(), &trgt)
                .insert_one(document)
                .await
                .map_err(|e| {
                    self.base.failure(
                        Status::Created,
                        Error::failed_to(Operation::Create).with_source(e),
                    )
                })?;

            let final_id = match inserted.inserted_id.as_str() {
                Some(stored) => stored.to_owned(),
                None => id.to_owned(),
            };

            o.run_post_hook(HookArgs {
                storage: self,
                id: &final_id,
                target: &trgt,
                data: Some(value),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Created, e))?;

            self.base.completed(Status::Created, &trgt);

            Ok(final_id)
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

            let trgt = resolve_target(target, self.static_target())
                .map_err(|e| self.base.failure(Status::Retrieved, e))?;

            o.run_pre_hook(HookArgs {
                storage: self,
                id,
                target: &trgt,
                data: None,
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Retrieved, e))?;

            let document = self
                .collection(o.database.as_deref(), &trgt)
                .find_one(doc! {"_id": id})
                .await
                .map_err(|e| {
                    self.base.failure(
                        Status::Retrieved,
                        Error::failed_to(Operation::Retrieve).with_source(e),
                    )
                })?
                .ok_or_else(|| self.base.failure(Status::Retrieved, Error::not_found()))?;

            let value = self.to_value(Status::Retrieved, &document)?;

            o.run_post_hook(HookArgs {
                storage: self,
                id,
                target: &trgt,
                data: Some(&value),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Retrieved, e))?;

            self.base.completed(Status::Retrieved, &trgt);

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

            let trgt = resolve_target(target, self.static_target())
                .map_err(|e| self.base.failure(Status::Updated, e))?;

            o.run_pre_hook(HookArgs {
                storage: self,
                id,
                target: &trgt,
                data: Some(value),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Updated, e))?;

            let fields = self.to_document(Status::Updated, value)?;

            self.collection(o.database.as_deref(), &trgt)
                .update_one(doc! {"_id": id}, doc! {"$set": fields})
                .await
                .map_err(|e| {
                    self.base.failure(
                        Status::Updated,
                        Error::failed_to(Operation::Update).with_source(e),
                    )
                })?;

            o.run_post_hook(HookArgs {
                storage: self,
                id,
                target: &trgt,
                data: Some(value),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Updated, e))?;

            self.base.completed(Status::Updated, &trgt);

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

            let trgt = resolve_target(target, self.static_target())
                .map_err(|e| self.base.failure(Status::Deleted, e))?;

            o.run_pre_hook(HookArgs {
                storage: self,
                id,
                target: &trgt,
                data: None,
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Deleted, e))?;

            self.collection(o.database.as_deref(), &trgt)
                .delete_one(doc! {"_id": id})
                .await
                .map_err(|e| {
                    self.base.failure(
                        Status::Deleted,
                        Error::failed_to(Operation::Delete).with_source(e),
                    )
                })?;

            o.run_post_hook(HookArgs {
                storage: self,
                id,
                target: &trgt,
                data: None,
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Deleted, e))?;

            self.base.completed(Status::Deleted, &trgt);

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

            let filter = match &prm.any {
                Some(AnyParam::Filter(map)) => {
                    mongodb::bson::to_document(map).map_err(|e| {
                        self.base.failure(
                            Status::Listed,
                            Error::failed_to("convert filter").with_source(e),
                        )
                    })?
                }
                _ => Document::new(),
            };

            let trgt = resolve_target(target, self.static_target())
                .map_err(|e| self.base.failure(Status::Listed, e))?;

            o.run_pre_hook(HookArgs {
                storage: self,
                id: "",
                target: &trgt,
                data: None,
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Listed, e))?;

            let collection = self.collection(o.database.as_deref(), &trgt);
            let mut find = collection.find(filter);

            if !prm.fields.is_empty() {
                let mut projection = Document::new();

                for field in &prm.fields {
                    projection.insert(field, 1);
                }

                find = find.projection(projection);
            }

            if !prm.sort.is_empty() {
                find = find.sort(to_mongo_sort(&prm.sort));
            }

            if prm.offset > 0 {
                find = find.skip(prm.offset);
            }

            if prm.limit > 0 {
                find = find.limit(prm.limit as i64);
            }

            let mut cursor = find.await.map_err(|e| {
                self.base
                    .failure(Status::Listed, Error::failed_to(Operation::List).with_source(e))
            })?;

            let mut items = Vec::new();

            while let Some(document) = cursor.try_next().await.map_err(|e| {
                self.base
                    .failure(Status::Listed, Error::failed_to("walk cursor").with_source(e))
            })? {
                items.push(self.to_value(Status::Listed, &document)?);
            }

            let value = Value::Array(items);

            o.run_post_hook(HookArgs {
                storage: self,
                id: "",
                target: &trgt,
                data: Some(&value),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Listed, e))?;

            self.base.completed(Status::Listed, &trgt);

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

impl std::fmt::Debug for Mongodb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mongodb")
            .field("database", &self.config.database)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_to_mongo_sort() {
        let spec = to_mongo_sort(&[SortField::asc("id"), SortField::desc("version")]);
        assert_eq!(spec, doc! {"id": 1, "version": -1});
    }

    #[test]
    fn test_parse_filter() {
        assert_eq!(parse_filter(None).unwrap(), Document::new());
        assert_eq!(parse_filter(Some("")).unwrap(), Document::new());
        assert_eq!(
            parse_filter(Some(r#"{"name": "test"}"#)).unwrap(),
            doc! {"name": "test"}
        );
        assert!(parse_filter(Some("not json")).is_err());
    }

    fn config() -> MongodbConfig {
        MongodbConfig::new(
            std::env::var("MONGODB_URI")
                .unwrap_or_else(|_| "mongodb://127.0.0.1:27017".to_owned()),
            "strata_test",
        )
    }

    #[tokio::test]
    #[ignore] // Requires a running MongoDB instance.
    async fn test_document_round_trip() {
        let storage = Mongodb::new(config()).await.unwrap();

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
        assert_eq!(got["name"], json!("test"));
        assert_eq!(got["version"], json!("1.0.0"));

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
    #[ignore] // Requires a running MongoDB instance.
    async fn test_list_with_projection_and_sort() {
        let storage = Mongodb::new(config()).await.unwrap();

        for (id, version) in [("a", "1"), ("b", "2"), ("c", "3")] {
            storage
                .create(
                    id,
                    "list",
                    &json!({"id": id, "version": version}),
                    None,
                    Vec::new(),
                )
                .await
                .unwrap();
        }

        let mut prm = params::List::new();
        prm.fields = vec!["id".to_owned(), "version".to_owned()];
        prm.sort = vec![SortField::desc("id")];
        prm.limit = 2;

        let listed = storage.list("list", Some(&prm), Vec::new()).await.unwrap();
        let items = listed.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["id"], json!("c"));

        for id in ["a", "b", "c"] {
            storage.delete(id, "list", None, Vec::new()).await.unwrap();
        }
    }
}
