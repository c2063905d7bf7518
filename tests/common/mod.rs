//! 集成测试公共工具

#![allow(dead_code)]

use std::sync::Arc;

use flare_discovery::config::CacheConfig;
use flare_discovery::discovery::filter::Endpoint;
use flare_discovery::{
    DiscoveryFilter, DiscoveryTree, DiscoveryTreeNode, InstanceCacheManager, InstanceRecord,
    RegisteredInstance, StaticRegistry,
};

/// 测试应用 ID
pub const APP_ID: &str = "default";

/// 测试微服务名
pub const SERVICE: &str = "order-service";

/// 创建带一个 rest endpoint 的实例
pub fn rest_instance(instance_id: &str, port: u16) -> RegisteredInstance {
    RegisteredInstance::new(instance_id, "order-service-id")
        .with_endpoint(format!("rest://127.0.0.1:{}", port))
}

/// 注册中心里预先放入给定实例
pub async fn registry_with(instances: Vec<RegisteredInstance>) -> Arc<StaticRegistry> {
    let registry = StaticRegistry::new();
    registry.declare_service(APP_ID, SERVICE);
    for instance in instances {
        registry.register(APP_ID, SERVICE, instance).await;
    }
    Arc::new(registry)
}

pub fn manager(registry: Arc<StaticRegistry>) -> Arc<InstanceCacheManager> {
    Arc::new(InstanceCacheManager::new(registry, CacheConfig::default()))
}

pub fn manager_with_config(registry: Arc<StaticRegistry>, config: CacheConfig) -> Arc<InstanceCacheManager> {
    Arc::new(InstanceCacheManager::new(registry, config))
}

/// 用给定过滤器组装发现树
pub fn tree(manager: Arc<InstanceCacheManager>, filters: Vec<Arc<dyn DiscoveryFilter>>) -> DiscoveryTree {
    let tree = DiscoveryTree::new(manager);
    for filter in filters {
        tree.add_filter(filter);
    }
    tree.sort();
    tree
}

/// 节点上实例 ID（已排序）
pub fn instance_ids(node: &DiscoveryTreeNode) -> Vec<String> {
    let mut ids: Vec<String> = node
        .data_as::<Vec<Arc<InstanceRecord>>>()
        .expect("node data is not an instance list")
        .iter()
        .map(|instance| instance.instance_id().to_string())
        .collect();
    ids.sort();
    ids
}

/// 节点上 endpoint 的 `host:port`（已排序）
pub fn endpoint_addresses(node: &DiscoveryTreeNode) -> Vec<String> {
    let mut addresses: Vec<String> = node
        .data_as::<Vec<Endpoint>>()
        .expect("node data is not an endpoint list")
        .iter()
        .map(Endpoint::address)
        .collect();
    addresses.sort();
    addresses
}
