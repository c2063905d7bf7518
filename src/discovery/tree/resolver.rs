//! 发现树
//!
//! 以 `(appId, 微服务名)` 为键维护根节点。根节点的版本与实例缓存一致时直接复用整棵子树；
//! 缓存更新后整棵子树被丢弃并以新版本重建。

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, info};

use crate::discovery::cache::{InstanceCache, InstanceCacheManager, MicroserviceKey};
use crate::discovery::filter::DiscoveryFilter;
use crate::discovery::tree::context::DiscoveryContext;
use crate::discovery::tree::node::DiscoveryTreeNode;
use crate::discovery::versioned::{self, Versioned};
use crate::error::{DiscoveryError, Result};
use crate::metrics::DiscoveryMetrics;

/// 每个过滤器允许的最大回溯次数，超过后判定分组序列不会终止
pub const MAX_RERUNS_PER_FILTER: usize = 1024;

/// 解析结果
#[derive(Debug, Clone)]
pub enum Resolution {
    /// 终端节点，其数据由过滤链决定
    Resolved(Arc<DiscoveryTreeNode>),
    /// 注册中心不认识该微服务
    MicroserviceNotFound,
}

impl Resolution {
    pub fn node(&self) -> Option<&Arc<DiscoveryTreeNode>> {
        match self {
            Resolution::Resolved(node) => Some(node),
            Resolution::MicroserviceNotFound => None,
        }
    }

    pub fn into_node(self) -> Option<Arc<DiscoveryTreeNode>> {
        match self {
            Resolution::Resolved(node) => Some(node),
            Resolution::MicroserviceNotFound => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Resolution::MicroserviceNotFound)
    }
}

/// 发现树
pub struct DiscoveryTree {
    cache_manager: Arc<InstanceCacheManager>,
    filters: RwLock<Vec<Arc<dyn DiscoveryFilter>>>,
    roots: DashMap<String, Arc<DiscoveryTreeNode>>,
    root_lock: Mutex<()>,
    metrics: Arc<DiscoveryMetrics>,
}

impl DiscoveryTree {
    pub fn new(cache_manager: Arc<InstanceCacheManager>) -> Self {
        let metrics = cache_manager.metrics().clone();
        Self {
            cache_manager,
            filters: RwLock::new(Vec::new()),
            roots: DashMap::new(),
            root_lock: Mutex::new(()),
            metrics,
        }
    }

    pub fn cache_manager(&self) -> &Arc<InstanceCacheManager> {
        &self.cache_manager
    }

    /// 添加过滤器，添加完成后需调用 `sort`
    pub fn add_filter(&self, filter: Arc<dyn DiscoveryFilter>) {
        self.filters.write().push(filter);
    }

    /// 按 `order` 升序排列过滤器
    pub fn sort(&self) {
        let mut filters = self.filters.write();
        filters.sort_by_key(|filter| filter.order());

        for filter in filters.iter() {
            info!(
                filter = filter.filter_name(),
                enabled = filter.enabled(),
                order = filter.order(),
                "Discovery filter registered"
            );
        }
    }

    pub fn filters(&self) -> Vec<Arc<dyn DiscoveryFilter>> {
        self.filters.read().clone()
    }

    /// 丢弃所有根节点
    pub fn clean_up(&self) {
        let _guard = self.root_lock.lock();
        self.roots.clear();
    }

    /// 丢弃某个微服务的根节点及其子树
    fn remove_root(&self, app_id: &str, microservice_name: &str) {
        let key = MicroserviceKey::new(app_id, microservice_name).to_string();
        let _guard = self.root_lock.lock();
        if self.roots.remove(&key).is_some() {
            debug!(key = %key, "Microservice disappeared, discovery tree root dropped");
        }
    }

    /// 当前安装的根节点
    pub fn root(&self, app_id: &str, microservice_name: &str) -> Option<Arc<DiscoveryTreeNode>> {
        let key = MicroserviceKey::new(app_id, microservice_name);
        self.roots.get(&key.to_string()).map(|root| root.value().clone())
    }

    /// 以默认上下文解析
    pub async fn resolve(&self, app_id: &str, microservice_name: &str) -> Result<Resolution> {
        let mut context = DiscoveryContext::new();
        self.resolve_with(&mut context, app_id, microservice_name).await
    }

    /// 以调用方提供的上下文解析（可携带传输协议等输入参数）
    pub async fn resolve_with(
        &self,
        context: &mut DiscoveryContext,
        app_id: &str,
        microservice_name: &str,
    ) -> Result<Resolution> {
        let Some(cache) = self
            .cache_manager
            .get_or_create(app_id, microservice_name)
            .await?
        else {
            self.remove_root(app_id, microservice_name);
            return Ok(Resolution::MicroserviceNotFound);
        };

        self.resolve_snapshot(context, &cache)
            .map(Resolution::Resolved)
    }

    /// 基于给定的缓存快照解析
    pub fn resolve_snapshot(
        &self,
        context: &mut DiscoveryContext,
        cache: &InstanceCache,
    ) -> Result<Arc<DiscoveryTreeNode>> {
        self.metrics.record_resolution();

        let root = self.get_or_create_root(cache);
        let data_node = root.child_or_create(cache.name(), |node| {
            node.set_data(cache.instance_list());
        });
        self.do_discovery(context, data_node)
    }

    fn get_or_create_root(&self, cache: &InstanceCache) -> Arc<DiscoveryTreeNode> {
        let root_key = cache.name();
        if let Some(root) = self.installed_root(root_key) {
            if root.is_same_version(cache) {
                return root;
            }
        }

        let _guard = self.root_lock.lock();
        let existing = self.installed_root(root_key);
        if versioned::is_expired(existing.as_deref(), cache) {
            let root = DiscoveryTreeNode::root(root_key, cache.version());
            self.roots.insert(root_key.to_string(), root.clone());
            self.metrics.record_root_rebuild();
            debug!(key = %root_key, version = cache.version(), "Discovery tree root rebuilt");
            return root;
        }

        match existing {
            Some(root) if root.is_same_version(cache) => root,
            Some(root) => {
                // 调用方持有的快照比已安装的根旧：只在本次调用中使用临时根
                self.metrics.record_temporary_root();
                debug!(
                    key = %root_key,
                    installed = root.cache_version(),
                    requested = cache.version(),
                    "Stale instance cache, resolving with a temporary root"
                );
                DiscoveryTreeNode::root(root_key, cache.version())
            }
            None => DiscoveryTreeNode::root(root_key, cache.version()),
        }
    }

    fn installed_root(&self, root_key: &str) -> Option<Arc<DiscoveryTreeNode>> {
        self.roots.get(root_key).map(|root| root.value().clone())
    }

    fn do_discovery(
        &self,
        context: &mut DiscoveryContext,
        start: Arc<DiscoveryTreeNode>,
    ) -> Result<Arc<DiscoveryTreeNode>> {
        let filters = self.filters();
        let rerun_limit = filters.len().max(1) * MAX_RERUNS_PER_FILTER;
        let mut reruns = 0;
        let mut parent = start;
        let mut index = 0;

        while index < filters.len() {
            let filter = &filters[index];
            if !filter.enabled() {
                index += 1;
                continue;
            }

            context.set_current_node(parent.clone());
            context.set_current_index(index);
            let child = filter.discovery(context, &parent).ok_or_else(|| {
                DiscoveryError::contract_violation(filter.filter_name(), "discovery returned no child node")
            })?;

            child.set_level(index + 1);
            if !filter.is_grouping_filter() {
                child.set_name(parent.name());
            }
            parent = child;

            if parent.is_empty() {
                if let Some(rerun) = context.pop_rerun() {
                    reruns += 1;
                    self.metrics.record_rerun();
                    if reruns > rerun_limit {
                        return Err(DiscoveryError::contract_violation(
                            filters[rerun.filter_index].filter_name(),
                            "group sequence never terminates",
                        ));
                    }

                    index = rerun.filter_index;
                    parent = rerun.node;
                    continue;
                }
            }

            index += 1;
        }

        Ok(parent)
    }
}
