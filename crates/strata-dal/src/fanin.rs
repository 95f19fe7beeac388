//! Fan-in: many logical operations applied concurrently to one storage.
//!
//! The counterpart to [`crate::fanout`]: a batch of ids or items runs
//! against a single storage, with the same aggregate-error semantics.

use std::collections::HashMap;

use futures::future::join_all;
use serde_json::Value;
use strata_core::Result;

use crate::contract::Storage;
use crate::fanout::collect_results;
use crate::params;

/// Creates every `(id, value)` item concurrently, returning the stored
/// ids.
pub async fn create_many(
    storage: &dyn Storage,
    target: &str,
    prm: Option<&params::Create>,
    items: &HashMap<String, Value>,
) -> Result<Vec<String>> {
    let tasks = items
        .iter()
        .map(|(id, value)| async move { storage.create(id, target, value, prm, Vec::new()).await });

    collect_results(join_all(tasks).await)
}

/// Retrieves every id concurrently.
pub async fn retrieve_many(
    storage: &dyn Storage,
    target: &str,
    prm: Option<&params::Retrieve>,
    ids: &[&str],
) -> Result<Vec<Value>> {
    let tasks = ids
        .iter()
        .map(|id| async move { storage.retrieve(id, target, prm, Vec::new()).await });

    collect_results(join_all(tasks).await)
}

/// Updates every `(id, value)` item concurrently.
pub async fn update_many(
    storage: &dyn Storage,
    target: &str,
    prm: Option<&params::Update>,
    items: &HashMap<String, Value>,
) -> Result<Vec<bool>> {
    let tasks = items.iter().map(|(id, value)| async move {
        storage.update(id, target, value, prm, Vec::new()).await?;
        Ok(true)
    });

    collect_results(join_all(tasks).await)
}

/// Deletes every id concurrently.
pub async fn delete_many(
    storage: &dyn Storage,
    target: &str,
    prm: Option<&params::Delete>,
    ids: &[&str],
) -> Result<Vec<bool>> {
    let tasks = ids.iter().map(|id| async move {
        storage.delete(id, target, prm, Vec::new()).await?;
        Ok(true)
    });

    collect_results(join_all(tasks).await)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use strata_core::ErrorKind;

    use super::*;
    use crate::mock::MockStorage;

    fn items(n: usize) -> HashMap<String, Value> {
        (0..n)
            .map(|i| (format!("id-{i}"), json!({"n": i})))
            .collect()
    }

    #[tokio::test]
    async fn test_create_many_runs_once_per_item() {
        let mock = MockStorage::new("m1").unwrap().with_create_result("mock1");

        let got = create_many(&mock, "target", None, &items(5)).await.unwrap();

        assert_eq!(got.len(), 5);
        assert_eq!(mock.counters().created().value(), 5);
    }

    #[tokio::test]
    async fn test_retrieve_many() {
        let mock = MockStorage::new("m1")
            .unwrap()
            .with_retrieve_result(json!({"k": "mock1"}));

        let got = retrieve_many(&mock, "target", None, &["a", "b"]).await.unwrap();

        assert_eq!(got.len(), 2);
        assert_eq!(mock.counters().retrieved().value(), 2);
    }

    #[tokio::test]
    async fn test_update_and_delete_many() {
        let mock = MockStorage::new("m1").unwrap();

        let updated = update_many(&mock, "target", None, &items(3)).await.unwrap();
        assert_eq!(updated, vec![true, true, true]);

        let deleted = delete_many(&mock, "target", None, &["a", "b", "c"])
            .await
            .unwrap();
        assert_eq!(deleted, vec![true, true, true]);
    }

    #[tokio::test]
    async fn test_failures_aggregate() {
        let mock = MockStorage::new("m1")
            .unwrap()
            .with_failure(ErrorKind::FailedTo);

        let err = delete_many(&mock, "target", None, &["a", "b"])
            .await
            .unwrap_err();

        assert!(err.is_aggregate());
        assert_eq!(err.related().len(), 2);
    }
}
