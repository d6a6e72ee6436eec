//! Registry engine behavior against the in-memory backend.

use pretty_assertions::assert_eq;
use regsync_core::{RegistryBackends, RegistryEngine, ReloadSummary, ResultCode, SyncError};
use regsync_test::fixtures::{endpoint, instance, registry_task, task};
use regsync_test::{MockRegistry, RegistryCall};
use regsync_types::{
    Group, Instance, Match, Method, ResourceType, Service, SyncTask, DEFAULT_GROUP,
    OPTION_DEFAULT_NAMESPACE,
};
use std::time::Duration;

fn engine_with(registry: &MockRegistry) -> RegistryEngine {
    let mut backends = RegistryBackends::new();
    registry.register(&mut backends, ResourceType::Nacos);
    registry.register(&mut backends, ResourceType::Polaris);
    RegistryEngine::new(backends)
}

/// Lets spawned workers run their pending ticks.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

fn addresses(instances: &[Instance]) -> Vec<String> {
    let mut out: Vec<String> = instances.iter().map(Instance::address).collect();
    out.sort();
    out
}

#[tokio::test(start_paused = true)]
async fn test_pull_replaces_destination_state() {
    let registry = MockRegistry::new();
    let engine = engine_with(&registry);
    let svc = Service::new("prod", "orders");
    registry.set_instances(
        &svc,
        DEFAULT_GROUP,
        vec![instance("10.0.0.1", 8080), instance("10.0.0.2", 8080)],
    );

    engine
        .init(&[registry_task("t1", "prod", "orders")], &[Method::pull("10s")])
        .await
        .unwrap();
    settle().await;

    let written = registry.written_instances(&svc, DEFAULT_GROUP).unwrap();
    assert_eq!(addresses(&written), vec!["10.0.0.1:8080", "10.0.0.2:8080"]);
    assert!(written.iter().all(|i| i.namespace == "prod" && i.service == "orders"));

    registry.set_instances(
        &svc,
        DEFAULT_GROUP,
        vec![instance("10.0.0.2", 8080), instance("10.0.0.3", 8080)],
    );
    tokio::time::sleep(Duration::from_secs(10)).await;
    settle().await;

    let written = registry.written_instances(&svc, DEFAULT_GROUP).unwrap();
    assert_eq!(addresses(&written), vec!["10.0.0.2:8080", "10.0.0.3:8080"]);

    engine.destroy().await;
}

#[tokio::test(start_paused = true)]
async fn test_default_group_is_always_synced() {
    let registry = MockRegistry::new();
    let engine = engine_with(&registry);
    let svc = Service::new("prod", "orders");
    registry.set_instances(&svc, DEFAULT_GROUP, vec![instance("10.0.0.1", 80)]);
    registry.set_instances(&svc, "canary", vec![instance("10.0.1.1", 80)]);

    let t = task(
        "t1",
        endpoint("src", ResourceType::Nacos),
        endpoint("dst", ResourceType::Polaris),
    )
    .with_match(Match::new("prod", "orders").with_group(Group::new("canary")));

    engine.init(&[t], &[Method::pull("10s")]).await.unwrap();
    settle().await;

    let groups: Vec<String> = registry
        .written_groups(&svc)
        .unwrap()
        .into_iter()
        .map(|g| g.name)
        .collect();
    assert_eq!(groups, vec!["default", "canary"]);
    assert!(registry.written_instances(&svc, DEFAULT_GROUP).is_some());
    assert!(registry.written_instances(&svc, "canary").is_some());

    engine.destroy().await;
}

#[tokio::test(start_paused = true)]
async fn test_group_metadata_filters_instances() {
    let registry = MockRegistry::new();
    let engine = engine_with(&registry);
    let svc = Service::new("prod", "orders");
    registry.set_instances(
        &svc,
        "zoned",
        vec![
            instance("10.0.0.1", 80).with_metadata("zone", "a"),
            instance("10.0.0.2", 80).with_metadata("zone", "b"),
        ],
    );

    let t = task(
        "t1",
        endpoint("src", ResourceType::Nacos),
        endpoint("dst", ResourceType::Polaris),
    )
    .with_match(
        Match::new("prod", "orders").with_group(Group::new("zoned").with_metadata("zone", "a")),
    );

    engine.init(&[t], &[Method::pull("10s")]).await.unwrap();
    settle().await;

    let written = registry.written_instances(&svc, "zoned").unwrap();
    assert_eq!(addresses(&written), vec!["10.0.0.1:80"]);

    engine.destroy().await;
}

#[tokio::test(start_paused = true)]
async fn test_empty_match_gets_no_workers() {
    let registry = MockRegistry::new();
    let engine = engine_with(&registry);
    let t = task(
        "t1",
        endpoint("src", ResourceType::Nacos),
        endpoint("dst", ResourceType::Polaris),
    )
    .with_match(Match::default());

    let summary = engine
        .init(&[t], &[Method::pull("10s"), Method::watch()])
        .await
        .unwrap();
    settle().await;

    assert_eq!(summary, ReloadSummary::default());
    assert!(engine.pull_workers().await.is_empty());
    assert!(engine.watch_workers().is_empty());
    assert_eq!(
        registry.count_calls(|c| matches!(c, RegistryCall::UpdateServices(_))),
        0
    );

    engine.destroy().await;
}

#[tokio::test(start_paused = true)]
async fn test_reload_same_revision_is_noop() {
    let registry = MockRegistry::new();
    let engine = engine_with(&registry);
    let tasks = vec![
        registry_task("a", "prod", "orders"),
        registry_task("b", "prod", "billing"),
    ];
    let methods = vec![Method::pull("10s"), Method::watch()];

    let first = engine.init(&tasks, &methods).await.unwrap();
    assert_eq!(first.pull_added, 2);
    assert_eq!(first.watch_added, 2);
    let workers = engine.pull_workers().await;

    let second = engine.reload(&tasks, &methods).await.unwrap();
    assert!(second.is_noop());
    assert_eq!(engine.pull_workers().await, workers);

    engine.destroy().await;
}

#[tokio::test(start_paused = true)]
async fn test_reload_only_touches_changed_tasks() {
    let registry = MockRegistry::new();
    let engine = engine_with(&registry);
    let methods = vec![Method::pull("10s")];
    let a = registry_task("a", "prod", "orders");
    let b = registry_task("b", "prod", "billing");
    let c = registry_task("c", "prod", "users");

    engine.init(&[a.clone(), b], &methods).await.unwrap();
    let before = engine.pull_workers().await;

    let summary = engine.reload(&[a, c], &methods).await.unwrap();
    assert_eq!(summary.pull_added, 1);
    assert_eq!(summary.pull_deleted, 1);

    let after = engine.pull_workers().await;
    assert_eq!(after.get("a"), before.get("a"));
    assert!(after.contains_key("c"));
    assert!(!after.contains_key("b"));

    engine.destroy().await;
}

#[tokio::test(start_paused = true)]
async fn test_changed_task_is_recreated() {
    let registry = MockRegistry::new();
    let engine = engine_with(&registry);
    let methods = vec![Method::pull("10s")];
    let a = registry_task("a", "prod", "orders");

    engine.init(&[a.clone()], &methods).await.unwrap();
    let before = engine.pull_workers().await;

    let changed = a.with_match(Match::new("prod", "billing"));
    let summary = engine.reload(&[changed], &methods).await.unwrap();
    assert_eq!(summary.pull_deleted, 1);
    assert_eq!(summary.pull_added, 1);
    assert_ne!(engine.pull_workers().await.get("a"), before.get("a"));

    engine.destroy().await;
}

#[tokio::test(start_paused = true)]
async fn test_method_change_rebuilds_everything() {
    let registry = MockRegistry::new();
    let engine = engine_with(&registry);
    let tasks = vec![
        registry_task("a", "prod", "orders"),
        registry_task("b", "prod", "billing"),
    ];

    engine.init(&tasks, &[Method::pull("10s")]).await.unwrap();
    let summary = engine
        .reload(&tasks, &[Method::pull("20s")])
        .await
        .unwrap();
    assert_eq!(summary.pull_deleted, 2);
    assert_eq!(summary.pull_added, 2);

    let summary = engine.reload(&tasks, &[Method::watch()]).await.unwrap();
    assert_eq!(summary.pull_deleted, 2);
    assert_eq!(summary.watch_added, 2);
    assert!(engine.pull_workers().await.is_empty());

    engine.destroy().await;
}

#[tokio::test(start_paused = true)]
async fn test_invalid_reload_keeps_running_state() {
    let registry = MockRegistry::new();
    let engine = engine_with(&registry);
    let methods = vec![Method::pull("10s")];
    let good = registry_task("a", "prod", "orders");

    engine.init(&[good.clone()], &methods).await.unwrap();
    let workers = engine.pull_workers().await;

    let unsupported = task(
        "b",
        endpoint("kong", ResourceType::Kong),
        endpoint("dst", ResourceType::Polaris),
    )
    .with_match(Match::new("prod", "billing"));
    let err = engine
        .reload(&[good.clone(), unsupported], &methods)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::UnsupportedBackend { .. }));

    let duplicate = engine
        .reload(&[good.clone(), good.clone()], &methods)
        .await
        .unwrap_err();
    assert!(duplicate.is_config_error());

    assert_eq!(engine.tasks().await, vec![good]);
    assert_eq!(engine.pull_workers().await, workers);

    engine.destroy().await;
}

#[tokio::test(start_paused = true)]
async fn test_disabled_task_is_ignored() {
    let registry = MockRegistry::new();
    let engine = engine_with(&registry);
    let mut disabled: SyncTask = registry_task("a", "prod", "orders");
    disabled.enable = false;

    let summary = engine.init(&[disabled], &[Method::pull("10s")]).await.unwrap();
    assert!(summary.is_noop());
    assert_eq!(engine.live_centers().await, 0);
    assert_eq!(registry.created(), 0);

    engine.destroy().await;
}

#[tokio::test(start_paused = true)]
async fn test_shared_backends_destroyed_once() {
    let registry = MockRegistry::new();
    let engine = engine_with(&registry);
    let src = endpoint("src", ResourceType::Nacos);
    let dst = endpoint("dst", ResourceType::Polaris);
    let a = task("a", src.clone(), dst.clone()).with_match(Match::new("prod", "orders"));
    let b = task("b", src, dst).with_match(Match::new("prod", "billing"));
    let methods = vec![Method::pull("10s")];

    engine.init(&[a.clone(), b], &methods).await.unwrap();
    assert_eq!(registry.created(), 2);
    assert_eq!(engine.live_centers().await, 2);

    engine.reload(&[a], &methods).await.unwrap();
    assert_eq!(registry.destroyed(), 0);
    assert_eq!(engine.live_centers().await, 2);

    engine.reload(&[], &methods).await.unwrap();
    assert_eq!(registry.destroyed(), 2);
    assert_eq!(engine.live_centers().await, 0);

    engine.destroy().await;
    assert_eq!(registry.destroyed(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_destination_learns_its_source() {
    let registry = MockRegistry::new();
    let engine = engine_with(&registry);
    engine
        .init(&[registry_task("a", "prod", "orders")], &[Method::pull("10s")])
        .await
        .unwrap();

    let inits: Vec<_> = registry
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            RegistryCall::Init(request) => Some(request),
            _ => None,
        })
        .collect();
    assert_eq!(inits.len(), 2);
    assert_eq!(inits[0].source_name, "");
    assert_eq!(inits[1].source_name, "a-src");
    assert_eq!(inits[1].source_type, ResourceType::Nacos);

    engine.destroy().await;
}

#[tokio::test(start_paused = true)]
async fn test_wildcard_expands_against_source() {
    let registry = MockRegistry::new();
    let engine = engine_with(&registry);
    let orders = Service::new("prod", "orders");
    let billing = Service::new("prod", "billing");
    registry.set_instances(&orders, DEFAULT_GROUP, vec![instance("10.0.0.1", 80)]);
    registry.set_instances(&billing, DEFAULT_GROUP, vec![instance("10.0.0.2", 80)]);

    engine
        .init(&[registry_task("a", "prod", "*")], &[Method::pull("10s")])
        .await
        .unwrap();
    settle().await;

    let services: Vec<Service> = registry.written_services().into_iter().collect();
    assert_eq!(services, vec![billing.clone(), orders.clone()]);
    assert!(registry.written_instances(&orders, DEFAULT_GROUP).is_some());
    assert!(registry.written_instances(&billing, DEFAULT_GROUP).is_some());

    engine.destroy().await;
}

#[tokio::test(start_paused = true)]
async fn test_default_namespace_alias_rewrites_identity() {
    let registry = MockRegistry::new();
    let engine = engine_with(&registry);
    let svc = Service::new("public", "orders");
    registry.set_instances(&svc, DEFAULT_GROUP, vec![instance("10.0.0.1", 80)]);

    let t = task(
        "a",
        endpoint("src", ResourceType::Nacos).with_option(OPTION_DEFAULT_NAMESPACE, "public"),
        endpoint("dst", ResourceType::Polaris).with_option(OPTION_DEFAULT_NAMESPACE, "default"),
    )
    .with_match(Match::new("public", "orders"));

    engine.init(&[t], &[Method::pull("10s")]).await.unwrap();
    settle().await;

    let target = Service::new("default", "orders");
    let written = registry.written_instances(&target, DEFAULT_GROUP).unwrap();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].namespace, "default");
    assert!(registry.written_instances(&svc, DEFAULT_GROUP).is_none());

    engine.destroy().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_listing_skips_write() {
    let registry = MockRegistry::new();
    let engine = engine_with(&registry);
    let svc = Service::new("prod", "orders");
    registry.set_instances(&svc, DEFAULT_GROUP, vec![instance("10.0.0.1", 80)]);
    registry.set_list_failure(Some(ResultCode::ServerError));

    engine
        .init(&[registry_task("a", "prod", "orders")], &[Method::pull("10s")])
        .await
        .unwrap();
    settle().await;
    assert!(registry.written_instances(&svc, DEFAULT_GROUP).is_none());

    registry.set_list_failure(None);
    tokio::time::sleep(Duration::from_secs(10)).await;
    settle().await;
    assert!(registry.written_instances(&svc, DEFAULT_GROUP).is_some());

    engine.destroy().await;
}

#[tokio::test(start_paused = true)]
async fn test_task_with_failed_backend_is_retried_on_next_reload() {
    let registry = MockRegistry::new();
    let engine = engine_with(&registry);
    let svc = Service::new("prod", "orders");
    registry.set_instances(&svc, DEFAULT_GROUP, vec![instance("10.0.0.1", 80)]);
    registry.fail_next_inits(1);
    let tasks = [registry_task("t1", "prod", "orders")];
    let methods = [Method::pull("1h")];

    let summary = engine.init(&tasks, &methods).await.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.pull_added, 0);
    assert!(engine.tasks().await.is_empty());
    assert!(engine.pull_workers().await.is_empty());
    assert_eq!(engine.live_centers().await, 0);

    let summary = engine.reload(&tasks, &methods).await.unwrap();
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.pull_added, 1);
    assert_eq!(engine.tasks().await, tasks.to_vec());
    settle().await;
    assert!(registry.written_instances(&svc, DEFAULT_GROUP).is_some());

    engine.destroy().await;
}
