//! 服务发现工厂
//!
//! 按配置组装实例缓存、发现树和默认过滤链

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::DiscoveryConfig;
use crate::discovery::backend::{InstanceChangedEvent, RegistryClient};
use crate::discovery::cache::{InstanceCacheManager, PullTask};
use crate::discovery::filter::{
    DefaultEndpointFactory, EndpointDiscoveryFilter, GroupDiscoveryFilter, InstanceStatusDiscoveryFilter,
    IsolationDiscoveryFilter, PriorityPropertyDiscoveryFilter, ZoneAware,
};
use crate::discovery::tree::{DiscoveryContext, DiscoveryTree, Resolution};
use crate::error::Result;

/// 组装完成的服务发现
pub struct DiscoveryStack {
    pub cache_manager: Arc<InstanceCacheManager>,
    pub tree: Arc<DiscoveryTree>,
    pull_task: Option<PullTask>,
}

impl DiscoveryStack {
    pub async fn resolve(&self, app_id: &str, microservice_name: &str) -> Result<Resolution> {
        self.tree.resolve(app_id, microservice_name).await
    }

    pub async fn resolve_with(
        &self,
        context: &mut DiscoveryContext,
        app_id: &str,
        microservice_name: &str,
    ) -> Result<Resolution> {
        self.tree.resolve_with(context, app_id, microservice_name).await
    }

    /// 订阅注册中心的实例变更事件
    pub fn subscribe(&self, events: mpsc::Receiver<InstanceChangedEvent>) -> JoinHandle<()> {
        self.cache_manager.subscribe(events)
    }

    /// 丢弃所有实例缓存和发现树根节点
    pub fn clean_up(&self) {
        self.cache_manager.clean_up();
        self.tree.clean_up();
        info!("Discovery caches cleaned up");
    }

    pub fn has_pull_task(&self) -> bool {
        self.pull_task.is_some()
    }

    /// 停止定时拉取任务
    pub async fn shutdown(&mut self) {
        if let Some(mut pull_task) = self.pull_task.take() {
            pull_task.shutdown().await;
        }
    }
}

/// 服务发现工厂
pub struct DiscoveryFactory;

impl DiscoveryFactory {
    /// 创建服务发现，过滤链：状态分层、就近访问、属性优先级、隔离、endpoint 转换
    pub fn create(config: &DiscoveryConfig, registry: Arc<dyn RegistryClient>) -> Result<DiscoveryStack> {
        config.validate()?;

        let cache_manager = Arc::new(InstanceCacheManager::new(registry, config.cache.clone()));
        let tree = Arc::new(DiscoveryTree::new(cache_manager.clone()));

        tree.add_filter(Arc::new(InstanceStatusDiscoveryFilter::status_tiers()));
        tree.add_filter(Arc::new(GroupDiscoveryFilter::new(ZoneAware::from_config(
            &config.zone_aware,
        ))));
        tree.add_filter(Arc::new(PriorityPropertyDiscoveryFilter::new(
            config.priority_property.clone(),
        )));
        tree.add_filter(Arc::new(IsolationDiscoveryFilter::new(config.isolation.clone())));
        tree.add_filter(Arc::new(EndpointDiscoveryFilter::new(DefaultEndpointFactory)));
        tree.sort();

        info!(
            version_rule = %config.cache.version_rule,
            filters = tree.filters().len(),
            "Discovery stack created"
        );

        Ok(DiscoveryStack {
            cache_manager,
            tree,
            pull_task: None,
        })
    }

    /// 创建服务发现并启动定时拉取（需在 tokio 运行时内调用）
    ///
    /// `pull_interval_secs` 为 0 时不启动
    pub fn create_with_pull_task(
        config: &DiscoveryConfig,
        registry: Arc<dyn RegistryClient>,
    ) -> Result<DiscoveryStack> {
        let mut stack = Self::create(config, registry)?;
        if config.cache.pull_interval_secs > 0 {
            let period = config.cache.pull_interval();
            stack.pull_task = Some(stack.cache_manager.start_pull_task(period));
            info!(interval_secs = config.cache.pull_interval_secs, "Instance pull task started");
        }
        Ok(stack)
    }
}
