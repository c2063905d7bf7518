//! 实例缓存集成测试

mod common;

use async_trait::async_trait;
use common::{APP_ID, SERVICE, manager, manager_with_config, registry_with, rest_instance};
use flare_discovery::config::CacheConfig;
use flare_discovery::{
    ChangeAction, DiscoveryError, ErrorCode, HistoryStatus, InstanceCacheManager, InstanceChangedEvent,
    InstanceStatus, PingStatus, RefreshStatus, RegisteredInstance, RegistryClient, StaticRegistry,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Notify, mpsc};
use tokio::time::{Duration, sleep};

fn event(action: ChangeAction, instance_id: &str, port: u16) -> InstanceChangedEvent {
    InstanceChangedEvent::new(action, APP_ID, SERVICE, rest_instance(instance_id, port))
}

/// 首次之后的拉取停在注册中心里，直到测试放行
struct GatedRegistry {
    inner: Arc<StaticRegistry>,
    calls: AtomicUsize,
    entered: Notify,
    release: Notify,
}

impl GatedRegistry {
    fn new(inner: Arc<StaticRegistry>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl RegistryClient for GatedRegistry {
    async fn find_instances(
        &self,
        app_id: &str,
        microservice_name: &str,
        version_rule: &str,
    ) -> flare_discovery::Result<Option<Vec<RegisteredInstance>>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner
            .find_instances(app_id, microservice_name, version_rule)
            .await
    }
}

/// 测试：首次访问全量拉取，之后命中缓存
#[tokio::test]
async fn test_get_or_create_fetches_once() {
    let registry = registry_with(vec![rest_instance("a", 8080), rest_instance("b", 8081)]).await;
    let manager = manager(registry.clone());

    let first = manager
        .get_or_create(APP_ID, SERVICE)
        .await
        .expect("fetch failed")
        .expect("microservice not found");
    let second = manager
        .get_or_create(APP_ID, SERVICE)
        .await
        .expect("fetch failed")
        .expect("microservice not found");

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.len(), 2);
    assert_eq!(registry.fetch_count(), 1);
    assert_eq!(manager.metrics().snapshot().full_fetches, 1);
}

/// 测试：并发首次访问只拉取一次
#[tokio::test]
async fn test_concurrent_first_access_fetches_once() {
    let registry = registry_with(vec![rest_instance("a", 8080)]).await;
    let manager = manager(registry.clone());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            manager.get_or_create(APP_ID, SERVICE).await
        }));
    }
    for handle in handles {
        let cache = handle.await.expect("task panicked").expect("fetch failed");
        assert!(cache.is_some());
    }

    assert_eq!(registry.fetch_count(), 1);
}

/// 测试：不存在的微服务与没有实例的微服务是两种结果
#[tokio::test]
async fn test_not_found_is_distinct_from_empty() {
    let registry = Arc::new(StaticRegistry::new());
    registry.declare_service(APP_ID, "empty-service");
    let manager = manager(registry.clone());

    let missing = manager
        .get_or_create(APP_ID, "unknown-service")
        .await
        .expect("fetch failed");
    assert!(missing.is_none());
    assert!(manager.get(APP_ID, "unknown-service").is_none());

    let empty = manager
        .get_or_create(APP_ID, "empty-service")
        .await
        .expect("fetch failed")
        .expect("known microservice reported as not found");
    assert!(empty.is_empty());
    assert_eq!(manager.metrics().snapshot().not_found_fetches, 1);
}

/// 测试：拉取失败不缓存，也不影响其他微服务
#[tokio::test]
async fn test_fetch_failure_is_not_cached() {
    let registry = registry_with(vec![rest_instance("a", 8080)]).await;
    let manager = manager(registry.clone());

    registry.set_unavailable(true);
    let error = manager
        .get_or_create(APP_ID, SERVICE)
        .await
        .expect_err("fetch should fail");
    assert!(matches!(error, DiscoveryError::TransientFetchFailure { .. }));
    assert_eq!(error.code(), ErrorCode::RegistryFetchFailed);
    assert!(error.is_retryable());
    assert!(manager.cached_entries().is_empty());

    registry.set_unavailable(false);
    let cache = manager
        .get_or_create(APP_ID, SERVICE)
        .await
        .expect("fetch failed")
        .expect("microservice not found");
    assert_eq!(cache.len(), 1);
    assert_eq!(registry.fetch_count(), 2);
    assert_eq!(manager.metrics().snapshot().fetch_failures, 1);
}

/// 测试：`otherApp:svc` 形式的名字访问其他应用
#[tokio::test]
async fn test_cross_app_name_is_normalized() {
    let registry = Arc::new(StaticRegistry::new());
    registry
        .register("billing", "invoice", rest_instance("x", 9000))
        .await;
    let manager = manager(registry.clone());

    let cache = manager
        .get_or_create(APP_ID, "billing:invoice")
        .await
        .expect("fetch failed")
        .expect("microservice not found");

    assert_eq!(cache.app_id(), "billing");
    assert_eq!(cache.microservice_name(), "invoice");
    assert_eq!(cache.name(), "billing/invoice");
    assert!(manager.get("billing", "invoice").is_some());
}

/// 测试：CREATE/UPDATE/DELETE 生成新版本，旧快照保持不变
#[tokio::test]
async fn test_incremental_updates_are_copy_on_write() {
    let registry = registry_with(vec![rest_instance("a", 8080), rest_instance("b", 8081)]).await;
    let manager = manager(registry.clone());
    let original = manager
        .get_or_create(APP_ID, SERVICE)
        .await
        .expect("fetch failed")
        .expect("microservice not found");
    let held_map = original.instances().clone();

    manager.on_instance_update(&event(ChangeAction::Create, "c", 8082));
    let created = manager.get(APP_ID, SERVICE).expect("cache dropped");
    assert!(created.version() > original.version());
    assert_eq!(created.len(), 3);

    manager.on_instance_update(&event(ChangeAction::Delete, "a", 8080));
    let deleted = manager.get(APP_ID, SERVICE).expect("cache dropped");
    assert!(deleted.version() > created.version());
    assert!(deleted.get("a").is_none());

    // 持有旧映射的读者看到的内容不变
    assert_eq!(held_map.len(), 2);
    assert!(held_map.contains_key("a"));
    assert!(!held_map.contains_key("c"));
    assert_eq!(original.len(), 2);
    assert_eq!(registry.fetch_count(), 1);
}

/// 测试：UPDATE 替换注册数据并保留运行时状态
#[tokio::test]
async fn test_update_keeps_runtime_state() {
    let registry = registry_with(vec![rest_instance("a", 8080)]).await;
    let manager = manager(registry.clone());
    manager
        .get_or_create(APP_ID, SERVICE)
        .await
        .expect("fetch failed");

    assert!(manager.update_runtime_state(APP_ID, SERVICE, "a", |state| {
        state.ping_status = PingStatus::Ok;
    }));
    assert!(!manager.update_runtime_state(APP_ID, SERVICE, "missing", |_| {}));

    let updated = InstanceChangedEvent::new(
        ChangeAction::Update,
        APP_ID,
        SERVICE,
        rest_instance("a", 8080).with_status(InstanceStatus::Down),
    );
    manager.on_instance_update(&updated);

    let record = manager
        .get(APP_ID, SERVICE)
        .and_then(|cache| cache.get("a"))
        .expect("instance dropped");
    assert_eq!(record.status(), InstanceStatus::Down);
    assert_eq!(record.ping_status(), PingStatus::Ok);
}

/// 测试：未缓存的微服务忽略增量事件
#[tokio::test]
async fn test_update_for_uncached_key_is_ignored() {
    let registry = registry_with(vec![]).await;
    let manager = manager(registry.clone());

    manager.on_instance_update(&event(ChangeAction::Create, "a", 8080));

    assert!(manager.get(APP_ID, SERVICE).is_none());
    assert_eq!(manager.metrics().snapshot().incremental_updates, 0);
}

/// 测试：EXPIRE 丢弃缓存，下次访问恰好全量拉取一次
#[tokio::test]
async fn test_expire_triggers_single_full_fetch() {
    let registry = registry_with(vec![rest_instance("a", 8080)]).await;
    let manager = manager(registry.clone());
    manager
        .get_or_create(APP_ID, SERVICE)
        .await
        .expect("fetch failed");
    assert_eq!(registry.fetch_count(), 1);

    manager.on_instance_update(&event(ChangeAction::Expire, "", 0));
    assert!(manager.get(APP_ID, SERVICE).is_none());

    manager
        .get_or_create(APP_ID, SERVICE)
        .await
        .expect("fetch failed");
    manager
        .get_or_create(APP_ID, SERVICE)
        .await
        .expect("fetch failed");
    assert_eq!(registry.fetch_count(), 2);
    assert_eq!(manager.metrics().snapshot().expires, 1);
}

/// 测试：订阅按投递顺序应用事件
#[tokio::test]
async fn test_subscription_applies_events_in_order() {
    let registry = registry_with(vec![rest_instance("a", 8080)]).await;
    let manager = manager(registry.clone());
    manager
        .get_or_create(APP_ID, SERVICE)
        .await
        .expect("fetch failed");

    let (tx, rx) = mpsc::channel(16);
    let handle = manager.subscribe(rx);

    tx.send(event(ChangeAction::Create, "b", 8081)).await.expect("send failed");
    tx.send(InstanceChangedEvent::new(
        ChangeAction::Update,
        APP_ID,
        SERVICE,
        rest_instance("b", 8081).with_property("zone", "z2"),
    ))
    .await
    .expect("send failed");
    tx.send(event(ChangeAction::Delete, "a", 8080)).await.expect("send failed");
    drop(tx);
    handle.await.expect("subscription panicked");

    let cache = manager.get(APP_ID, SERVICE).expect("cache dropped");
    assert!(cache.get("a").is_none());
    let b = cache.get("b").expect("instance b missing");
    assert_eq!(b.property("zone").as_deref(), Some("z2"));
}

/// 测试：注册中心推送的事件经订阅到达缓存
#[tokio::test]
async fn test_registry_events_reach_cache() {
    let (tx, rx) = mpsc::channel(16);
    let registry = Arc::new(StaticRegistry::new().with_event_sender(tx));
    registry.declare_service(APP_ID, SERVICE);
    let manager = manager(registry.clone());
    manager
        .get_or_create(APP_ID, SERVICE)
        .await
        .expect("fetch failed");
    let _handle = manager.subscribe(rx);

    registry.register(APP_ID, SERVICE, rest_instance("a", 8080)).await;

    let mut found = false;
    for _ in 0..50 {
        if manager
            .get(APP_ID, SERVICE)
            .is_some_and(|cache| cache.get("a").is_some())
        {
            found = true;
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert!(found, "CREATE event was not applied");
    assert_eq!(registry.fetch_count(), 1);
}

/// 测试：刷新结果
#[tokio::test]
async fn test_refresh_statuses() {
    let registry = registry_with(vec![rest_instance("a", 8080)]).await;
    let manager = manager(registry.clone());

    let status = manager.refresh(APP_ID, SERVICE).await.expect("refresh failed");
    assert_eq!(status, RefreshStatus::NotCached);

    let before = manager
        .get_or_create(APP_ID, SERVICE)
        .await
        .expect("fetch failed")
        .expect("microservice not found");

    let status = manager.refresh(APP_ID, SERVICE).await.expect("refresh failed");
    assert_eq!(status, RefreshStatus::NoChange);
    assert_eq!(manager.get(APP_ID, SERVICE).map(|c| c.version()), Some(before.version()));

    registry.register(APP_ID, SERVICE, rest_instance("b", 8081)).await;
    let status = manager.refresh(APP_ID, SERVICE).await.expect("refresh failed");
    assert_eq!(status, RefreshStatus::Refreshed);
    let after = manager.get(APP_ID, SERVICE).expect("cache dropped");
    assert!(after.version() > before.version());
    assert_eq!(after.len(), 2);

    registry.remove_service(APP_ID, SERVICE);
    let status = manager.refresh(APP_ID, SERVICE).await.expect("refresh failed");
    assert_eq!(status, RefreshStatus::ServiceNotFound);
    assert_eq!(manager.get(APP_ID, SERVICE).map(|c| c.len()), Some(2));
}

/// 测试：普通模式下刷新删除消失的实例
#[tokio::test]
async fn test_refresh_drops_vanished_instances() {
    let registry = registry_with(vec![rest_instance("a", 8080), rest_instance("b", 8081)]).await;
    let manager = manager(registry.clone());
    manager
        .get_or_create(APP_ID, SERVICE)
        .await
        .expect("fetch failed");

    registry.unregister(APP_ID, SERVICE, "b").await;
    manager.refresh(APP_ID, SERVICE).await.expect("refresh failed");

    let cache = manager.get(APP_ID, SERVICE).expect("cache dropped");
    assert_eq!(cache.len(), 1);
    assert!(cache.get("b").is_none());
}

/// 测试：安全模式下消失的实例保留并标记为 HISTORY
#[tokio::test]
async fn test_safe_mode_keeps_history_instances() {
    let registry = registry_with(vec![rest_instance("a", 8080), rest_instance("b", 8081)]).await;
    let manager = manager(registry.clone());
    manager
        .get_or_create(APP_ID, SERVICE)
        .await
        .expect("fetch failed");

    manager.set_safe_mode(true);
    registry.unregister(APP_ID, SERVICE, "b").await;
    let status = manager.refresh(APP_ID, SERVICE).await.expect("refresh failed");
    assert_eq!(status, RefreshStatus::Refreshed);

    let cache = manager.get(APP_ID, SERVICE).expect("cache dropped");
    let b = cache.get("b").expect("history instance dropped");
    assert_eq!(b.history_status(), HistoryStatus::History);
    assert_eq!(
        cache.get("a").map(|a| a.history_status()),
        Some(HistoryStatus::Current)
    );

    // 内容没有再变化时保持版本
    let status = manager.refresh(APP_ID, SERVICE).await.expect("refresh failed");
    assert_eq!(status, RefreshStatus::NoChange);
}

/// 测试：空实例保护
#[tokio::test]
async fn test_empty_instance_protection() {
    let registry = registry_with(vec![rest_instance("a", 8080)]).await;
    let protected = manager_with_config(
        registry.clone(),
        CacheConfig::default().with_empty_instance_protection(true),
    );
    let unprotected = manager(registry.clone());
    for manager in [&protected, &unprotected] {
        manager
            .get_or_create(APP_ID, SERVICE)
            .await
            .expect("fetch failed");
    }

    registry.unregister(APP_ID, SERVICE, "a").await;
    protected.refresh(APP_ID, SERVICE).await.expect("refresh failed");
    unprotected.refresh(APP_ID, SERVICE).await.expect("refresh failed");

    let kept = protected.get(APP_ID, SERVICE).expect("cache dropped");
    assert_eq!(
        kept.get("a").map(|a| a.history_status()),
        Some(HistoryStatus::History)
    );
    assert!(unprotected.get(APP_ID, SERVICE).expect("cache dropped").is_empty());
}

/// 测试：与注册中心恢复连接后清空缓存
#[tokio::test]
async fn test_recovery_cleans_up_after_exception() {
    let registry = registry_with(vec![rest_instance("a", 8080)]).await;
    let manager = manager(registry.clone());
    manager
        .get_or_create(APP_ID, SERVICE)
        .await
        .expect("fetch failed");

    // 没有发生过异常时恢复事件不清空缓存
    manager.on_registry_recovered();
    assert_eq!(manager.cached_entries().len(), 1);

    manager.on_registry_exception();
    assert!(!manager.is_cache_available());
    assert_eq!(manager.cached_entries().len(), 1);

    manager.on_registry_recovered();
    assert!(manager.is_cache_available());
    assert!(manager.cached_entries().is_empty());
}

/// 测试：定时拉取任务刷新缓存并可正常停止
#[tokio::test]
async fn test_pull_task_refreshes_cache() {
    let registry = registry_with(vec![rest_instance("a", 8080)]).await;
    let manager = manager(registry.clone());
    manager
        .get_or_create(APP_ID, SERVICE)
        .await
        .expect("fetch failed");

    let mut task = manager.start_pull_task(Duration::from_millis(20));
    registry.register(APP_ID, SERVICE, rest_instance("b", 8081)).await;

    let mut refreshed = false;
    for _ in 0..50 {
        if manager.get(APP_ID, SERVICE).is_some_and(|cache| cache.len() == 2) {
            refreshed = true;
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    task.shutdown().await;

    assert!(refreshed, "pull task did not refresh the cache");
    assert!(manager.metrics().snapshot().refreshes >= 1);
}

/// 测试：拉取期间到达的增量事件不会被较旧的拉取结果覆盖
#[tokio::test]
async fn test_refresh_does_not_overwrite_concurrent_update() {
    let registry = Arc::new(GatedRegistry::new(
        registry_with(vec![rest_instance("a", 8080)]).await,
    ));
    let manager = Arc::new(InstanceCacheManager::new(registry.clone(), CacheConfig::default()));
    let before = manager
        .get_or_create(APP_ID, SERVICE)
        .await
        .expect("fetch failed")
        .expect("microservice not found");

    let refreshing = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.refresh(APP_ID, SERVICE).await })
    };
    registry.entered.notified().await;
    manager.on_instance_update(&event(ChangeAction::Create, "b", 8081));
    registry.release.notify_one();

    let status = refreshing
        .await
        .expect("refresh panicked")
        .expect("refresh failed");
    assert_eq!(status, RefreshStatus::Superseded);

    let cache = manager.get(APP_ID, SERVICE).expect("cache dropped");
    assert!(cache.get("b").is_some(), "CREATE event was overwritten by refresh");
    assert!(cache.version() > before.version());
    assert_eq!(manager.metrics().snapshot().refreshes, 0);
}

/// 测试：微服务不存在或缓存失效后不保留拉取锁
#[tokio::test]
async fn test_fetch_locks_released() {
    let registry = registry_with(vec![rest_instance("a", 8080)]).await;
    let manager = manager(registry);

    let missing = manager
        .get_or_create(APP_ID, "unknown-service")
        .await
        .expect("fetch failed");
    assert!(missing.is_none());
    assert_eq!(manager.fetch_lock_count(), 0);

    manager
        .get_or_create(APP_ID, SERVICE)
        .await
        .expect("fetch failed")
        .expect("microservice not found");
    assert_eq!(manager.fetch_lock_count(), 1);

    manager.on_instance_update(&event(ChangeAction::Expire, "", 0));
    assert_eq!(manager.fetch_lock_count(), 0);
}
