//! Fan-out: one logical operation applied concurrently to many storages.
//!
//! Operates on a named mapping from backend tag to storage. Results come
//! back in the mapping's iteration order, which is unspecified; callers
//! needing determinism sort client-side. Errors are collected into one
//! aggregate error and the payload is dropped when any child failed.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use strata_core::{Error, Result};

use crate::contract::Storage;
use crate::options::OptionFn;
use crate::params;

/// A named mapping from backend tag to storage.
pub type StorageMap = HashMap<String, Arc<dyn Storage>>;

pub(crate) fn collect_results<T>(results: Vec<Result<T>>) -> Result<Vec<T>> {
    let mut values = Vec::with_capacity(results.len());
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(value) => values.push(value),
            Err(err) => errors.push(err),
        }
    }

    if !errors.is_empty() {
        return Err(Error::aggregate(errors));
    }

    Ok(values)
}

/// Counts `target` on every storage concurrently.
pub async fn count_from_many(
    map: &StorageMap,
    target: &str,
    prm: Option<&params::Count>,
    options: Vec<OptionFn<params::Count>>,
) -> Result<Vec<i64>> {
    let tasks = map.values().map(|storage| {
        let options = options.clone();
        async move { storage.count(target, prm, options).await }
    });

    collect_results(join_all(tasks).await)
}

/// Creates `value` under `id` on every storage concurrently, returning
/// the stored ids.
pub async fn create_into_many(
    map: &StorageMap,
    id: &str,
    target: &str,
    value: &Value,
    prm: Option<&params::Create>,
    options: Vec<OptionFn<params::Create>>,
) -> Result<Vec<String>> {
    let tasks = map.values().map(|storage| {
        let options = options.clone();
        async move { storage.create(id, target, value, prm, options).await }
    });

    collect_results(join_all(tasks).await)
}

/// Deletes `id` on every storage concurrently.
pub async fn delete_from_many(
    map: &StorageMap,
    id: &str,
    target: &str,
    prm: Option<&params::Delete>,
    options: Vec<OptionFn<params::Delete>>,
) -> Result<Vec<bool>> {
    let tasks = map.values().map(|storage| {
        let options = options.clone();
        async move {
            storage.delete(id, target, prm, options).await?;
            Ok(true)
        }
    });

    collect_results(join_all(tasks).await)
}

/// Lists `target` on every storage concurrently. Per-storage result
/// arrays are flattened into a single sequence.
pub async fn list_from_many(
    map: &StorageMap,
    target: &str,
    prm: Option<&params::List>,
    options: Vec<OptionFn<params::List>>,
) -> Result<Vec<Value>> {
    let tasks = map.values().map(|storage| {
        let options = options.clone();
        async move { storage.list(target, prm, options).await }
    });

    let results = collect_results(join_all(tasks).await)?;

    let mut flattened = Vec::new();

    for result in results {
        match result {
            Value::Array(items) => flattened.extend(items),
            other => flattened.push(other),
        }
    }

    Ok(flattened)
}

/// Retrieves `id` from every storage concurrently.
pub async fn retrieve_from_many(
    map: &StorageMap,
    id: &str,
    target: &str,
    prm: Option<&params::Retrieve>,
    options: Vec<OptionFn<params::Retrieve>>,
) -> Result<Vec<Value>> {
    let tasks = map.values().map(|storage| {
        let options = options.clone();
        async move { storage.retrieve(id, target, prm, options).await }
    });

    collect_results(join_all(tasks).await)
}

/// Updates `id` with `value` on every storage concurrently.
pub async fn update_into_many(
    map: &StorageMap,
    id: &str,
    target: &str,
    value: &Value,
    prm: Option<&params::Update>,
    options: Vec<OptionFn<params::Update>>,
) -> Result<Vec<bool>> {
    let tasks = map.values().map(|storage| {
        let options = options.clone();
        async move {
            storage.update(id, target, value, prm, options).await?;
            Ok(true)
        }
    });

    collect_results(join_all(tasks).await)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use strata_core::ErrorKind;

    use super::*;
    use crate::mock::MockStorage;

    fn fixture() -> StorageMap {
        let m1 = MockStorage::new("m1")
            .unwrap()
            .with_count(10)
            .with_create_result("mock1")
            .with_retrieve_result(json!({"k": "mock1"}))
            .with_list_result(json!(["mock1", "mock2"]));

        let m2 = MockStorage::new("m2")
            .unwrap()
            .with_count(20)
            .with_create_result("mock2")
            .with_retrieve_result(json!({"k": "mock2"}))
            .with_list_result(json!(["mock3", "mock4"]));

        let mut map: StorageMap = HashMap::new();
        map.insert("m1".to_owned(), Arc::new(m1));
        map.insert("m2".to_owned(), Arc::new(m2));
        map
    }

    #[tokio::test]
    async fn test_count_from_many() {
        let got = count_from_many(&fixture(), "target", None, Vec::new())
            .await
            .unwrap();

        assert_eq!(got.len(), 2);
        assert!(got.contains(&10));
        assert!(got.contains(&20));
    }

    #[tokio::test]
    async fn test_create_into_many() {
        let got = create_into_many(
            &fixture(),
            "id",
            "target",
            &json!("value"),
            None,
            Vec::new(),
        )
        .await
        .unwrap();

        assert_eq!(got.len(), 2);
        assert!(got.contains(&"mock1".to_owned()));
        assert!(got.contains(&"mock2".to_owned()));
    }

    #[tokio::test]
    async fn test_delete_from_many() {
        let got = delete_from_many(&fixture(), "id", "target", None, Vec::new())
            .await
            .unwrap();

        assert_eq!(got, vec![true, true]);
    }

    #[tokio::test]
    async fn test_list_from_many_flattens() {
        let got = list_from_many(&fixture(), "target", None, Vec::new())
            .await
            .unwrap();

        assert_eq!(got.len(), 4);
        for key in ["mock1", "mock2", "mock3", "mock4"] {
            assert!(got.contains(&json!(key)));
        }
    }

    #[tokio::test]
    async fn test_retrieve_from_many() {
        let got = retrieve_from_many(&fixture(), "id", "target", None, Vec::new())
            .await
            .unwrap();

        assert_eq!(got.len(), 2);
        assert!(got.contains(&json!({"k": "mock1"})));
        assert!(got.contains(&json!({"k": "mock2"})));
    }

    #[tokio::test]
    async fn test_update_into_many() {
        let got = update_into_many(
            &fixture(),
            "id",
            "target",
            &json!("value"),
            None,
            Vec::new(),
        )
        .await
        .unwrap();

        assert_eq!(got, vec![true, true]);
    }

    #[tokio::test]
    async fn test_failure_aggregates_and_drops_payload() {
        let mut map = fixture();
        map.insert(
            "broken".to_owned(),
            Arc::new(
                MockStorage::new("broken")
                    .unwrap()
                    .with_failure(ErrorKind::FailedTo),
            ),
        );

        let err = count_from_many(&map, "target", None, Vec::new())
            .await
            .unwrap_err();

        assert!(err.is_aggregate());
        assert_eq!(err.related().len(), 1);
    }
}
