//! Cross-module scenarios exercised through the public API only.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use strata_dal::mock::MockStorage;
use strata_dal::prelude::*;

fn mock_pair() -> StorageMap {
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
async fn create_into_many_reaches_every_backend() {
    let got = create_into_many(
        &mock_pair(),
        "id",
        "target",
        &json!({"k": "v"}),
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
async fn count_from_many_returns_individual_counts() {
    let got = count_from_many(&mock_pair(), "target", None, Vec::new())
        .await
        .unwrap();

    assert_eq!(got.len(), 2);
    assert!(got.contains(&10));
    assert!(got.contains(&20));
}

#[tokio::test]
async fn memory_round_trip_through_the_contract() {
    let storage: Arc<dyn Storage> = AdapterConfig::Memory.build().await.unwrap();

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

    let got: Value = retrieve_as(storage.as_ref(), "u-1", "api", None, Vec::new())
        .await
        .unwrap();
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

    let got: Value = retrieve_as(storage.as_ref(), "u-1", "api", None, Vec::new())
        .await
        .unwrap();
    assert_eq!(got["version"], json!("2.0.0"));

    storage.delete("u-1", "api", None, Vec::new()).await.unwrap();
    assert_eq!(storage.count("api", None, Vec::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn registry_hands_back_the_configured_storage() {
    let built = AdapterConfig::Memory.build().await.unwrap();
    let storage = registry::get("memory");

    assert_eq!(storage.name(), built.name());
}

#[tokio::test]
async fn fan_in_runs_once_per_item() {
    let storage = AdapterConfig::Memory.build().await.unwrap();

    let items: HashMap<String, Value> = (0..4)
        .map(|i| (format!("id-{i}"), json!({"n": i})))
        .collect();

    let ids = create_many(storage.as_ref(), "api", None, &items).await.unwrap();
    assert_eq!(ids.len(), 4);
    assert_eq!(storage.count("api", None, Vec::new()).await.unwrap(), 4);

    let values = retrieve_many(storage.as_ref(), "api", None, &["id-0", "id-1"])
        .await
        .unwrap();
    assert_eq!(values.len(), 2);

    let deleted = delete_many(
        storage.as_ref(),
        "api",
        None,
        &["id-0", "id-1", "id-2", "id-3"],
    )
    .await
    .unwrap();
    assert_eq!(deleted.len(), 4);
    assert_eq!(storage.count("api", None, Vec::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn hooks_bracket_the_native_call() {
    let storage = AdapterConfig::Memory.build().await.unwrap();
    let order = Arc::new(AtomicUsize::new(0));

    let pre_seen = order.clone();
    let pre: HookFn<params::Create> = Arc::new(move |args| {
        let order = pre_seen.clone();
        Box::pin(async move {
            assert_eq!(args.target, "api");
            assert_eq!(order.fetch_add(1, Ordering::SeqCst), 0);
            Ok(())
        })
    });

    let post_seen = order.clone();
    let post: HookFn<params::Create> = Arc::new(move |args| {
        let order = post_seen.clone();
        Box::pin(async move {
            assert_eq!(args.id, "u-1");
            assert_eq!(order.fetch_add(1, Ordering::SeqCst), 1);
            Ok(())
        })
    });

    storage
        .create(
            "u-1",
            "api",
            &json!({"k": "v"}),
            None,
            vec![with_pre_hook(pre), with_post_hook(post)],
        )
        .await
        .unwrap();

    assert_eq!(order.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn post_hook_error_counts_as_failure() {
    let storage = AdapterConfig::Memory.build().await.unwrap();

    let post: HookFn<params::Create> =
        Arc::new(|_args| Box::pin(async { Err(Error::validation("rejected by post-hook")) }));

    let err = storage
        .create("u-1", "api", &json!({"k": "v"}), None, vec![with_post_hook(post)])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(storage.counters().created().value(), 0);
    assert_eq!(storage.counters().created_failed().value(), 1);
}
