//! 服务发现组装测试

mod common;

use common::{APP_ID, SERVICE, endpoint_addresses, registry_with, rest_instance};
use flare_discovery::config::{CacheConfig, PriorityPropertyConfig, ZoneAwareConfig};
use flare_discovery::{
    ChangeAction, DiscoveryConfig, DiscoveryContext, DiscoveryFactory, InstanceChangedEvent,
    InstanceStatus,
};
use std::collections::HashSet;
use tokio::sync::mpsc;

/// 测试：默认过滤链按顺序排列
#[tokio::test]
async fn test_default_filter_chain() {
    let registry = registry_with(vec![]).await;
    let stack = DiscoveryFactory::create(&DiscoveryConfig::default(), registry).expect("create failed");

    let orders: Vec<i32> = stack.tree.filters().iter().map(|filter| filter.order()).collect();
    assert_eq!(orders, vec![-10000, 300, 301, 500, i16::MAX as i32]);

    let enabled: Vec<bool> = stack.tree.filters().iter().map(|filter| filter.enabled()).collect();
    assert_eq!(enabled, vec![true, false, false, true, true]);
    assert!(!stack.has_pull_task());
}

/// 测试：默认过滤链解析出可用的 endpoint
#[tokio::test]
async fn test_resolve_endpoints_through_default_chain() {
    let registry = registry_with(vec![
        rest_instance("a", 8080),
        rest_instance("b", 8081),
        rest_instance("down", 8082).with_status(InstanceStatus::Down),
    ])
    .await;
    let stack = DiscoveryFactory::create(&DiscoveryConfig::default(), registry).expect("create failed");

    let node = stack
        .resolve(APP_ID, SERVICE)
        .await
        .expect("resolve failed")
        .into_node()
        .expect("microservice not found");
    assert_eq!(endpoint_addresses(&node), vec!["127.0.0.1:8080", "127.0.0.1:8081"]);

    let mut context = DiscoveryContext::new().with_transport("rest");
    let rest = stack
        .resolve_with(&mut context, APP_ID, SERVICE)
        .await
        .expect("resolve failed")
        .into_node()
        .expect("microservice not found");
    assert_eq!(endpoint_addresses(&rest), vec!["127.0.0.1:8080", "127.0.0.1:8081"]);

    let snapshot = stack.cache_manager.metrics().snapshot();
    assert_eq!(snapshot.full_fetches, 1);
    assert_eq!(snapshot.resolutions, 2);
}

/// 测试：就近访问配置生效
#[tokio::test]
async fn test_zone_aware_chain() {
    let registry = registry_with(vec![
        rest_instance("local", 8080)
            .with_property("region", "r1")
            .with_property("zone", "z1"),
        rest_instance("remote", 8081)
            .with_property("region", "r2")
            .with_property("zone", "z2"),
    ])
    .await;
    let config = DiscoveryConfig::default()
        .with_zone_aware(ZoneAwareConfig::default().with_data_center("r1", "z1"));
    let stack = DiscoveryFactory::create(&config, registry).expect("create failed");

    let node = stack
        .resolve(APP_ID, SERVICE)
        .await
        .expect("resolve failed")
        .into_node()
        .expect("microservice not found");
    assert_eq!(endpoint_addresses(&node), vec!["127.0.0.1:8080"]);
}

/// 测试：订阅的事件使下一次解析看到新实例
#[tokio::test]
async fn test_subscription_invalidates_tree() {
    let registry = registry_with(vec![rest_instance("a", 8080)]).await;
    let stack = DiscoveryFactory::create(&DiscoveryConfig::default(), registry).expect("create failed");
    stack.resolve(APP_ID, SERVICE).await.expect("resolve failed");

    let (tx, rx) = mpsc::channel(4);
    let handle = stack.subscribe(rx);
    tx.send(InstanceChangedEvent::new(
        ChangeAction::Create,
        APP_ID,
        SERVICE,
        rest_instance("b", 8081),
    ))
    .await
    .expect("send failed");
    drop(tx);
    handle.await.expect("subscription panicked");

    let node = stack
        .resolve(APP_ID, SERVICE)
        .await
        .expect("resolve failed")
        .into_node()
        .expect("microservice not found");
    let addresses: HashSet<String> = endpoint_addresses(&node).into_iter().collect();
    assert!(addresses.contains("127.0.0.1:8081"));
}

/// 测试：定时拉取任务随配置启动，并可停止
#[tokio::test]
async fn test_pull_task_lifecycle() {
    let registry = registry_with(vec![]).await;
    let config = DiscoveryConfig::default().with_cache(CacheConfig::default().with_pull_interval_secs(1));
    let mut stack = DiscoveryFactory::create_with_pull_task(&config, registry.clone()).expect("create failed");
    assert!(stack.has_pull_task());
    stack.shutdown().await;
    assert!(!stack.has_pull_task());

    let disabled = DiscoveryConfig::default().with_cache(CacheConfig::default().with_pull_interval_secs(0));
    let stack = DiscoveryFactory::create_with_pull_task(&disabled, registry).expect("create failed");
    assert!(!stack.has_pull_task());
}

/// 测试：非法配置无法组装
#[tokio::test]
async fn test_invalid_config_rejected() {
    let registry = registry_with(vec![]).await;
    let mut config = DiscoveryConfig::default();
    config.cache.version_rule = String::new();

    assert!(DiscoveryFactory::create(&config, registry).is_err());
}

/// 测试：clean_up 同时丢弃实例缓存和发现树根节点
#[tokio::test]
async fn test_clean_up_drops_all_cached_state() {
    let registry = registry_with(vec![rest_instance("a", 8080)]).await;
    let stack = DiscoveryFactory::create(&DiscoveryConfig::default(), registry.clone()).expect("create failed");
    stack.resolve(APP_ID, SERVICE).await.expect("resolve failed");
    assert_eq!(stack.cache_manager.cached_entries().len(), 1);
    assert!(stack.tree.root(APP_ID, SERVICE).is_some());

    stack.clean_up();
    assert!(stack.cache_manager.cached_entries().is_empty());
    assert!(stack.tree.root(APP_ID, SERVICE).is_none());

    stack.resolve(APP_ID, SERVICE).await.expect("resolve failed");
    assert_eq!(registry.fetch_count(), 2);
}

/// 测试：开启属性优先级分组后优先同环境实例
#[tokio::test]
async fn test_priority_property_chain() {
    let registry = registry_with(vec![
        rest_instance("gray", 8080).with_property("environment", "prod.gray"),
        rest_instance("prod", 8081).with_property("environment", "prod"),
    ])
    .await;
    let config = DiscoveryConfig::default().with_priority_property(
        PriorityPropertyConfig::default()
            .with_enabled(true)
            .with_value("prod.gray"),
    );
    let stack = DiscoveryFactory::create(&config, registry).expect("create failed");

    let node = stack
        .resolve(APP_ID, SERVICE)
        .await
        .expect("resolve failed")
        .into_node()
        .expect("microservice not found");
    assert_eq!(endpoint_addresses(&node), vec!["127.0.0.1:8080"]);
}
