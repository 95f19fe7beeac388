//! Elasticsearch adapter.
//!
//! Speaks the HTTP+JSON API directly. The target is an index name; for
//! time-partitioned indices a dynamic index function can produce it at
//! operation time. Query bodies are concatenated from fragments: the
//! required `"query"`, optional `"_source"` projection, `"sort"`,
//! `"from"`/`"size"`, plus addons such as `"track_total_hits"`.

mod config;
mod types;

use std::any::Any;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
pub use config::ElasticsearchConfig;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde_json::Value;
use strata_core::{retry, Error, Operation, Result, Status};
use tracing::Instrument;
use types::{ErrorResponse, GetResponse, SearchResponse};
use validator::Validate;

use crate::base::{resolve_target, StorageBase};
use crate::contract::Storage;
use crate::observability::{Counter, OperationCounters, OperationLogger};
use crate::options::{HookArgs, OptionFn, Options};
use crate::params::{self, AnyParam, SortField};
use crate::registry;

/// Name of the storage.
pub const NAME: &str = "elasticsearch";

/// Environment variable prefixing the embedded HTTP client counters.
pub const HTTPCLIENT_METRICS_PREFIX_ENV: &str = "HTTPCLIENT_METRICS_PREFIX";

/// Default match-all query fragment.
const MATCH_ALL: &str = r#"{"match_all": {}}"#;

/// Produces the index name at operation time, supporting
/// time-partitioned indices such as `log-{YYYY}-{MM}`.
pub type DynamicIndexFn = Arc<dyn Fn() -> String + Send + Sync>;

/// Elasticsearch storage definition.
pub struct Elasticsearch {
    base: StorageBase,
    config: ElasticsearchConfig,
    client: reqwest::Client,
    index_fn: Option<DynamicIndexFn>,
    http_requests: Arc<Counter>,
    http_requests_failed: Arc<Counter>,
}

/// Converts a multi-key sort into the search JSON form.
fn to_es_sort(sort: &[SortField]) -> String {
    let keys: Vec<String> = sort
        .iter()
        .map(|key| format!(r#"{{"{}": {{"order": "{}"}}}}"#, key.field, key.direction.as_str()))
        .collect();

    format!("[{}]", keys.join(","))
}

/// Builds a query body from the list parameters and optional addons by
/// concatenating JSON fragments.
fn build_query(prm: &params::List, addons: &[String]) -> Result<String> {
    let search = prm
        .search
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::required("search"))?;

    let mut query = String::from(r#"{ "query": "#);
    query.push_str(search);

    if !prm.fields.is_empty() {
        let fields = serde_json::to_string(&prm.fields)
            .map_err(|e| Error::failed_to("marshal projection").with_source(e))?;

        query.push_str(r#", "_source": "#);
        query.push_str(&fields);
    }

    if !prm.sort.is_empty() {
        query.push_str(r#", "sort": "#);
        query.push_str(&to_es_sort(&prm.sort));
    }

    if prm.offset > 0 {
        query.push_str(&format!(r#", "from": {}"#, prm.offset));
    }

    if prm.limit > 0 {
        query.push_str(&format!(r#", "size": {}"#, prm.limit));
    }

    if !addons.is_empty() {
        query.push_str(", ");
        query.push_str(&addons.join(", "));
    }

    query.push('}');

    Ok(query)
}

impl Elasticsearch {
    /// Creates a new Elasticsearch storage against a static (or
    /// per-call) index.
    pub async fn new(config: ElasticsearchConfig) -> Result<Arc<Self>> {
        Self::with_index_fn(config, None).await
    }

    /// Creates a new Elasticsearch storage whose index name is produced
    /// at operation time.
    pub async fn with_index_fn(
        config: ElasticsearchConfig,
        index_fn: Option<DynamicIndexFn>,
    ) -> Result<Arc<Self>> {
        let base = StorageBase::new(NAME)?;

        if let Err(errors) = config.validate() {
            return Err(base.instantiation_failure(Error::validation(errors.to_string())));
        }

        let client = reqwest::Client::new();

        let http_requests = Counter::with_env_prefix(
            HTTPCLIENT_METRICS_PREFIX_ENV,
            format!("httpclient.{NAME}.requests.counter"),
        );
        let http_requests_failed = Counter::with_env_prefix(
            HTTPCLIENT_METRICS_PREFIX_ENV,
            format!("httpclient.{NAME}.requests.failed.counter"),
        );

        let storage = Arc::new(Self {
            base,
            config,
            client,
            index_fn,
            http_requests,
            http_requests_failed,
        });

        retry::probe(|| {
            let storage = storage.clone();
            async move {
                let response = storage
                    .send(storage.request(Method::GET, ""))
                    .await
                    .map_err(|e| Error::failed_to("ping").with_source(e))?;

                if response.status().is_success() {
                    Ok(())
                } else {
                    Err(Error::failed_to("ping")
                        .with_source(format!("status {}", response.status())))
                }
            }
        })
        .await
        .map_err(|e| storage.base.ping_failure(e))?;

        registry::set(NAME, storage.clone());

        Ok(storage)
    }

    fn static_index(&self) -> String {
        match &self.index_fn {
            Some(index_fn) => index_fn(),
            None => self.config.index.clone().unwrap_or_default(),
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.config.url.trim_end_matches('/'), path);

        let mut request = self.client.request(method, url);

        if let Some(ref username) = self.config.username {
            request = request.basic_auth(username, self.config.password.as_deref());
        }

        request
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> reqwest::Result<reqwest::Response> {
        self.http_requests.inc();

        let outcome = request.send().await;

        if outcome.is_err() {
            self.http_requests_failed.inc();
        }

        outcome
    }

    /// Checks a response. Failure reasons containing a configured or
    /// per-call ignore substring are treated as no-ops and yield `None`;
    /// other failures become errors.
    async fn ensure_success(
        &self,
        operation: Operation,
        response: reqwest::Response,
        ignore: &[&str],
    ) -> Result<Option<reqwest::Response>> {
        let status = response.status();

        if status.is_success() {
            return Ok(Some(response));
        }

        self.http_requests_failed.inc();

        let reason = response
            .json::<ErrorResponse>()
            .await
            .ok()
            .and_then(|body| body.error.reason)
            .unwrap_or_else(|| format!("status {status}"));

        let ignored = self
            .config
            .ignore_substrings
            .iter()
            .map(String::as_str)
            .chain(ignore.iter().copied())
            .any(|needle| reason.contains(needle));

        if ignored {
            return Ok(None);
        }

        if status.as_u16() == 404 {
            return Err(Error::not_found());
        }

        Err(Error::failed_to(operation).with_source(reason))
    }

    /// Creates an index with the given mapping; an index that already
    /// exists is not an error.
    pub async fn create_index(&self, name: &str, mapping: &str) -> Result<()> {
        let index = resolve_target(name, &self.static_index())?;

        let response = self
            .send(
                self.request(Method::PUT, &index)
                    .header(CONTENT_TYPE, "application/json")
                    .body(mapping.to_owned()),
            )
            .await
            .map_err(|e| Error::failed_to("create index").with_source(e))?;

        self.ensure_success(Operation::Create, response, &["already"])
            .await?;

        Ok(())
    }

    /// Deletes an index.
    pub async fn delete_index(&self, name: &str) -> Result<()> {
        let index = resolve_target(name, &self.static_index())?;

        let response = self
            .send(self.request(Method::DELETE, &index))
            .await
            .map_err(|e| Error::failed_to("delete index").with_source(e))?;

        self.ensure_success(Operation::Delete, response, &[]).await?;

        Ok(())
    }
}

#[async_trait]
impl Storage for Elasticsearch {
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

            let index = resolve_target(target, &self.static_index())
                .map_err(|e| self.base.failure(Status::Counted, e))?;

            let mut body_prm = params::List::new();
            body_prm.search = Some(
                prm.search
                    .clone()
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| MATCH_ALL.to_owned()),
            );

            let body = build_query(&body_prm, &[r#""track_total_hits": true"#.to_owned()])
                .map_err(|e| self.base.failure(Status::Counted, e))?;

            o.run_pre_hook(HookArgs {
                storage: self,
                id: "",
                target: &index,
                data: None,
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Counted, e))?;

            let mut request = self
                .request(Method::POST, &format!("{index}/_search"))
                .header(CONTENT_TYPE, "application/json")
                .body(body);

            if let Some(ref routing) = prm.routing {
                request = request.query(&[("routing", routing)]);
            }

            let response = self.send(request).await.map_err(|e| {
                self.base
                    .failure(Status::Counted, Error::failed_to(Operation::Count).with_source(e))
            })?;

            let response = self
                .ensure_success(Operation::Count, response, &[])
                .await
                .map_err(|e| self.base.failure(Status::Counted, e))?
                .ok_or_else(|| {
                    self.base
                        .failure(Status::Counted, Error::failed_to(Operation::Count))
                })?;

            let parsed: SearchResponse = response.json().await.map_err(|e| {
                self.base.failure(
                    Status::Counted,
                    Error::failed_to("decode search response").with_source(e),
                )
            })?;

            let count = parsed.hits.total.value;

            let data = Value::from(count);
            o.run_post_hook(HookArgs {
                storage: self,
                id: "",
                target: &index,
                data: Some(&data),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Counted, e))?;

            self.base.completed(Status::Counted, &index);

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
        // The id is caller-supplied; this adapter never generates one.
        self.base.require_id(id, Status::Created)?;

        let span = self.base.operation_span(Status::Created);

        async {
            let o = Options::assemble(options).map_err(|e| self.base.failure(Status::Created, e))?;
            let prm = prm.cloned().unwrap_or_default();

            let index = resolve_target(target, &self.static_index())
                .map_err(|e| self.base.failure(Status::Created, e))?;

            o.run_pre_hook(HookArgs {
                storage: self,
                id,
                target: &index,
                data: Some(value),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Created, e))?;

            let mut request = self
                .request(Method::PUT, &format!("{index}/_doc/{id}"))
                .json(value);

            if let Some(ref routing) = prm.routing {
                request = request.query(&[("routing", routing)]);
            }

            let response = self.send(request).await.map_err(|e| {
                self.base
                    .failure(Status::Created, Error::failed_to(Operation::Create).with_source(e))
            })?;

            self.ensure_success(Operation::Create, response, &[])
                .await
                .map_err(|e| self.base.failure(Status::Created, e))?;

            o.run_post_hook(HookArgs {
                storage: self,
                id,
                target: &index,
                data: Some(value),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Created, e))?;

            self.base.completed(Status::Created, &index);

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

            let index = resolve_target(target, &self.static_index())
                .map_err(|e| self.base.failure(Status::Retrieved, e))?;

            o.run_pre_hook(HookArgs {
                storage: self,
                id,
                target: &index,
                data: None,
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Retrieved, e))?;

            let mut request = self.request(Method::GET, &format!("{index}/_doc/{id}"));

            if let Some(ref routing) = prm.routing {
                request = request.query(&[("routing", routing)]);
            }

            let response = self.send(request).await.map_err(|e| {
                self.base.failure(
                    Status::Retrieved,
                    Error::failed_to(Operation::Retrieve).with_source(e),
                )
            })?;

            let response = self
                .ensure_success(Operation::Retrieve, response, &[])
                .await
                .map_err(|e| self.base.failure(Status::Retrieved, e))?
                .ok_or_else(|| self.base.failure(Status::Retrieved, Error::not_found()))?;

            let parsed: GetResponse = response.json().await.map_err(|e| {
                self.base.failure(
                    Status::Retrieved,
                    Error::failed_to("decode document").with_source(e),
                )
            })?;

            let value = match (parsed.found, parsed.source) {
                (true, Some(source)) => source,
                _ => return Err(self.base.failure(Status::Retrieved, Error::not_found())),
            };

            o.run_post_hook(HookArgs {
                storage: self,
                id,
                target: &index,
                data: Some(&value),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Retrieved, e))?;

            self.base.completed(Status::Retrieved, &index);

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

            let index = resolve_target(target, &self.static_index())
                .map_err(|e| self.base.failure(Status::Updated, e))?;

            o.run_pre_hook(HookArgs {
                storage: self,
                id,
                target: &index,
                data: Some(value),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Updated, e))?;

            let mut request = self
                .request(Method::POST, &format!("{index}/_update/{id}"))
                .query(&[("refresh", "true")])
                .json(&serde_json::json!({ "doc": value }));

            if let Some(ref routing) = prm.routing {
                request = request.query(&[("routing", routing)]);
            }

            let response = self.send(request).await.map_err(|e| {
                self.base
                    .failure(Status::Updated, Error::failed_to(Operation::Update).with_source(e))
            })?;

            self.ensure_success(Operation::Update, response, &[])
                .await
                .map_err(|e| self.base.failure(Status::Updated, e))?;

            o.run_post_hook(HookArgs {
                storage: self,
                id,
                target: &index,
                data: Some(value),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Updated, e))?;

            self.base.completed(Status::Updated, &index);

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

            let index = resolve_target(target, &self.static_index())
                .map_err(|e| self.base.failure(Status::Deleted, e))?;

            o.run_pre_hook(HookArgs {
                storage: self,
                id,
                target: &index,
                data: None,
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Deleted, e))?;

            let mut request = self.request(Method::DELETE, &format!("{index}/_doc/{id}"));

            if let Some(ref routing) = prm.routing {
                request = request.query(&[("routing", routing)]);
            }

            let response = self.send(request).await.map_err(|e| {
                self.base
                    .failure(Status::Deleted, Error::failed_to(Operation::Delete).with_source(e))
            })?;

            self.ensure_success(Operation::Delete, response, &[])
                .await
                .map_err(|e| self.base.failure(Status::Deleted, e))?;

            o.run_post_hook(HookArgs {
                storage: self,
                id,
                target: &index,
                data: None,
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Deleted, e))?;

            self.base.completed(Status::Deleted, &index);

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
            let mut prm = prm.cloned().unwrap_or_default();

            if prm.search.as_deref().unwrap_or_default().is_empty() {
                prm.search = Some(MATCH_ALL.to_owned());
            }

            let index = resolve_target(target, &self.static_index())
                .map_err(|e| self.base.failure(Status::Listed, e))?;

            let mut addons = Vec::new();

            if let Some(AnyParam::TrackTotalHits(true)) = prm.any {
                addons.push(r#""track_total_hits": true"#.to_owned());
            }

            let body = build_query(&prm, &addons)
                .map_err(|e| self.base.failure(Status::Listed, e))?;

            o.run_pre_hook(HookArgs {
                storage: self,
                id: "",
                target: &index,
                data: None,
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Listed, e))?;

            let mut request = self
                .request(Method::POST, &format!("{index}/_search"))
                .header(CONTENT_TYPE, "application/json")
                .body(body);

            if let Some(ref routing) = prm.routing {
                request = request.query(&[("routing", routing)]);
            }

            let response = self.send(request).await.map_err(|e| {
                self.base
                    .failure(Status::Listed, Error::failed_to(Operation::List).with_source(e))
            })?;

            let response = self
                .ensure_success(Operation::List, response, &[])
                .await
                .map_err(|e| self.base.failure(Status::Listed, e))?
                .ok_or_else(|| {
                    self.base
                        .failure(Status::Listed, Error::failed_to(Operation::List))
                })?;

            let parsed: SearchResponse = response.json().await.map_err(|e| {
                self.base.failure(
                    Status::Listed,
                    Error::failed_to("decode search response").with_source(e),
                )
            })?;

            // Report the true total through the back-channel when the
            // caller asked for it.
            if let Some(ref total) = prm.count {
                total.store(parsed.hits.total.value, Ordering::Relaxed);
            }

            let items: Vec<Value> = parsed.hits.hits.into_iter().map(|hit| hit.source).collect();
            let value = Value::Array(items);

            o.run_post_hook(HookArgs {
                storage: self,
                id: "",
                target: &index,
                data: Some(&value),
                param: &prm,
            })
            .await
            .map_err(|e| self.base.failure(Status::Listed, e))?;

            self.base.completed(Status::Listed, &index);

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

impl std::fmt::Debug for Elasticsearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Elasticsearch")
            .field("url", &self.config.url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_to_es_sort() {
        assert_eq!(
            to_es_sort(&[SortField::asc("id"), SortField::desc("version")]),
            r#"[{"id": {"order": "asc"}},{"version": {"order": "desc"}}]"#
        );
    }

    #[test]
    fn test_build_query_requires_search() {
        let err = build_query(&params::List::new(), &[]).unwrap_err();
        assert!(err.is_required());
    }

    #[test]
    fn test_build_query_shape() {
        let mut prm = params::List::new();
        prm.search = Some(MATCH_ALL.to_owned());
        prm.fields = vec!["id".to_owned(), "name".to_owned(), "version".to_owned()];
        prm.sort = vec![SortField::asc("id")];
        prm.limit = 10;

        let body = build_query(&prm, &[]).unwrap();
        let parsed: Value = serde_json::from_str(&body).unwrap();

        assert_eq!(
            parsed,
            json!({
                "_source": ["id", "name", "version"],
                "query": {"match_all": {}},
                "size": 10,
                "sort": [{"id": {"order": "asc"}}],
            })
        );
    }

    #[test]
    fn test_build_query_with_addons() {
        let mut prm = params::List::new();
        prm.search = Some(MATCH_ALL.to_owned());

        let body = build_query(&prm, &[r#""track_total_hits": true"#.to_owned()]).unwrap();
        let parsed: Value = serde_json::from_str(&body).unwrap();

        assert_eq!(parsed["track_total_hits"], json!(true));
    }

    #[test]
    fn test_build_query_offset_only_when_positive() {
        let mut prm = params::List::new();
        prm.search = Some(MATCH_ALL.to_owned());

        let body = build_query(&prm, &[]).unwrap();
        assert!(!body.contains("from"));
        assert!(!body.contains("size"));
    }

    fn config() -> ElasticsearchConfig {
        ElasticsearchConfig::new(
            std::env::var("ELASTICSEARCH_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:9200".to_owned()),
        )
    }

    #[tokio::test]
    #[ignore] // Requires a running Elasticsearch instance.
    async fn test_match_all_count() {
        let storage = Elasticsearch::new(config()).await.unwrap();

        storage.create_index("api", "{}").await.unwrap();

        storage
            .create("u-1", "api", &json!({"id": "u-1", "name": "test"}), None, Vec::new())
            .await
            .unwrap();

        // Newly indexed documents become visible after a refresh.
        storage
            .update("u-1", "api", &json!({"name": "test"}), None, Vec::new())
            .await
            .unwrap();

        assert!(storage.count("api", None, Vec::new()).await.unwrap() >= 1);

        storage.delete("u-1", "api", None, Vec::new()).await.unwrap();
        storage.delete_index("api").await.unwrap();
    }
}
