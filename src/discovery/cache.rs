//! 实例缓存
//!
//! 每个 (appId, 微服务名) 对应一份 `InstanceCache`，内容是带版本号的
//! `instanceId -> InstanceRecord` 映射。缓存只会被整体替换（写时复制），
//! 持有旧快照的读者永远看到替换前的内容。

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::config::CacheConfig;
use crate::discovery::backend::{ChangeAction, InstanceChangedEvent, RegistryClient};
use crate::discovery::instance::{HistoryStatus, InstanceRecord, RegisteredInstance, RuntimeState};
use crate::discovery::versioned::{Versioned, VersionedSnapshot};
use crate::error::Result;
use crate::metrics::DiscoveryMetrics;

/// 微服务名中用于指定其他应用的分隔符，如 `otherApp:svc`
pub const APP_SERVICE_SEPARATOR: char = ':';

/// `instanceId -> InstanceRecord`
pub type InstanceMap = HashMap<String, Arc<InstanceRecord>>;

/// 缓存键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MicroserviceKey {
    pub app_id: String,
    pub microservice_name: String,
}

impl MicroserviceKey {
    /// `otherApp:svc` 形式的微服务名忽略调用方的 appId
    pub fn new(app_id: &str, microservice_name: &str) -> Self {
        match microservice_name.split_once(APP_SERVICE_SEPARATOR) {
            Some((app, name)) => Self {
                app_id: app.to_string(),
                microservice_name: name.to_string(),
            },
            None => Self {
                app_id: app_id.to_string(),
                microservice_name: microservice_name.to_string(),
            },
        }
    }
}

impl fmt::Display for MicroserviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.app_id, self.microservice_name)
    }
}

/// 单个微服务的实例缓存
#[derive(Debug)]
pub struct InstanceCache {
    key: MicroserviceKey,
    version_rule: String,
    snapshot: VersionedSnapshot<Arc<InstanceMap>>,
}

impl InstanceCache {
    /// 以新版本号创建缓存
    pub fn new(key: MicroserviceKey, version_rule: impl Into<String>, instances: InstanceMap) -> Self {
        let name = key.to_string();
        Self {
            key,
            version_rule: version_rule.into(),
            snapshot: VersionedSnapshot::new(name, Arc::new(instances)),
        }
    }

    /// 从注册数据构建缓存
    pub fn from_registered(
        key: MicroserviceKey,
        version_rule: impl Into<String>,
        instances: Vec<RegisteredInstance>,
    ) -> Self {
        let map = instances
            .into_iter()
            .map(|instance| (instance.instance_id.clone(), Arc::new(InstanceRecord::new(instance))))
            .collect();
        Self::new(key, version_rule, map)
    }

    /// 同一个键、新的内容与新版本
    fn derive(&self, instances: InstanceMap) -> Self {
        Self::new(self.key.clone(), self.version_rule.clone(), instances)
    }

    pub fn key(&self) -> &MicroserviceKey {
        &self.key
    }

    pub fn app_id(&self) -> &str {
        &self.key.app_id
    }

    pub fn microservice_name(&self) -> &str {
        &self.key.microservice_name
    }

    pub fn version_rule(&self) -> &str {
        &self.version_rule
    }

    pub fn version(&self) -> u64 {
        self.snapshot.version()
    }

    /// 缓存名（`app/name`），也是发现树中数据节点的名字
    pub fn name(&self) -> &str {
        self.snapshot.name()
    }

    pub fn snapshot(&self) -> &VersionedSnapshot<Arc<InstanceMap>> {
        &self.snapshot
    }

    /// 时间点一致的实例映射
    pub fn instances(&self) -> &Arc<InstanceMap> {
        self.snapshot.payload()
    }

    /// 按实例 ID 排序的实例列表
    pub fn instance_list(&self) -> Vec<Arc<InstanceRecord>> {
        let mut list: Vec<_> = self.instances().values().cloned().collect();
        list.sort_by(|a, b| a.instance_id().cmp(b.instance_id()));
        list
    }

    pub fn get(&self, instance_id: &str) -> Option<Arc<InstanceRecord>> {
        self.instances().get(instance_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.instances().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances().is_empty()
    }
}

impl Versioned for InstanceCache {
    fn cache_version(&self) -> u64 {
        self.snapshot.version()
    }
}

/// 定时拉取的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStatus {
    /// 内容变化，已替换为新版本
    Refreshed,
    /// 内容未变化，保留原版本
    NoChange,
    /// 拉取期间缓存被增量事件替换，丢弃本次拉取结果
    Superseded,
    /// 注册中心已不认识该微服务，缓存保持不变
    ServiceNotFound,
    /// 没有该键的缓存，无需拉取
    NotCached,
}

/// 实例缓存管理器
///
/// - 读路径走 `DashMap`，不加锁
/// - 所有替换映射的操作都在 `update_lock` 下串行执行，避免同一键上并发的
///   CREATE/DELETE 互相覆盖
/// - 全量拉取按键串行，并发的首次访问只拉取一次
pub struct InstanceCacheManager {
    registry: Arc<dyn RegistryClient>,
    config: CacheConfig,
    caches: DashMap<String, Arc<InstanceCache>>,
    update_lock: Mutex<()>,
    fetch_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    cache_available: AtomicBool,
    safe_mode: AtomicBool,
    metrics: Arc<DiscoveryMetrics>,
}

impl InstanceCacheManager {
    pub fn new(registry: Arc<dyn RegistryClient>, config: CacheConfig) -> Self {
        Self::with_metrics(registry, config, Arc::new(DiscoveryMetrics::new()))
    }

    pub fn with_metrics(
        registry: Arc<dyn RegistryClient>,
        config: CacheConfig,
        metrics: Arc<DiscoveryMetrics>,
    ) -> Self {
        Self {
            registry,
            config,
            caches: DashMap::new(),
            update_lock: Mutex::new(()),
            fetch_locks: DashMap::new(),
            cache_available: AtomicBool::new(true),
            safe_mode: AtomicBool::new(false),
            metrics,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<DiscoveryMetrics> {
        &self.metrics
    }

    /// 只读查询，不触发拉取
    pub fn get(&self, app_id: &str, microservice_name: &str) -> Option<Arc<InstanceCache>> {
        let key = MicroserviceKey::new(app_id, microservice_name);
        self.get_by_key(&key.to_string())
    }

    fn get_by_key(&self, cache_key: &str) -> Option<Arc<InstanceCache>> {
        self.caches.get(cache_key).map(|entry| entry.value().clone())
    }

    /// 获取缓存，不存在时从注册中心全量拉取
    ///
    /// # 返回
    /// * `Ok(Some(cache))` - 微服务存在（实例可能为空）
    /// * `Ok(None)` - 注册中心不认识该微服务，结果不缓存
    /// * `Err` - 拉取失败，结果不缓存，也不影响其他键
    pub async fn get_or_create(
        &self,
        app_id: &str,
        microservice_name: &str,
    ) -> Result<Option<Arc<InstanceCache>>> {
        let key = MicroserviceKey::new(app_id, microservice_name);
        let cache_key = key.to_string();
        if let Some(cache) = self.get_by_key(&cache_key) {
            return Ok(Some(cache));
        }

        let fetch_lock = self
            .fetch_locks
            .entry(cache_key.clone())
            .or_default()
            .value()
            .clone();
        let _fetching = fetch_lock.lock().await;

        // 等锁期间可能已经有人拉取完成
        if let Some(cache) = self.get_by_key(&cache_key) {
            return Ok(Some(cache));
        }

        let Some(instances) = self.fetch(&key).await? else {
            self.fetch_locks.remove(&cache_key);
            return Ok(None);
        };

        let cache = Arc::new(InstanceCache::from_registered(
            key,
            self.config.version_rule.clone(),
            instances,
        ));
        {
            let _guard = self.update_lock.lock();
            self.caches.insert(cache_key, cache.clone());
        }
        Ok(Some(cache))
    }

    async fn fetch(&self, key: &MicroserviceKey) -> Result<Option<Vec<RegisteredInstance>>> {
        self.metrics.record_full_fetch();
        match self
            .registry
            .find_instances(&key.app_id, &key.microservice_name, &self.config.version_rule)
            .await
        {
            Ok(Some(instances)) => {
                info!(
                    key = %key,
                    instances = instances.len(),
                    "Fetched microservice instances"
                );
                Ok(Some(instances))
            }
            Ok(None) => {
                self.metrics.record_not_found();
                warn!(key = %key, "Microservice not found in registry");
                Ok(None)
            }
            Err(e) => {
                self.metrics.record_fetch_failure();
                error!(key = %key, error = %e, "Failed to fetch microservice instances");
                Err(e)
            }
        }
    }

    /// 处理注册中心推送的实例变更
    pub fn on_instance_update(&self, event: &InstanceChangedEvent) {
        let key = MicroserviceKey::new(&event.app_id, &event.microservice_name);
        let cache_key = key.to_string();
        let instance_id = &event.instance.instance_id;

        let _guard = self.update_lock.lock();
        let Some(current) = self.get_by_key(&cache_key) else {
            // 尚未缓存（或刚被清理），下次访问会全量拉取
            debug!(
                key = %key,
                action = ?event.action,
                "Ignore instance change for uncached microservice"
            );
            return;
        };

        match event.action {
            ChangeAction::Create | ChangeAction::Update => {
                let mut instances = InstanceMap::clone(current.instances());
                let mut runtime = instances
                    .get(instance_id)
                    .map(|record| record.runtime_state())
                    .unwrap_or_default();
                runtime.history_status = HistoryStatus::Current;
                instances.insert(
                    instance_id.clone(),
                    Arc::new(InstanceRecord::with_runtime_state(event.instance.clone(), runtime)),
                );
                self.caches.insert(cache_key, Arc::new(current.derive(instances)));
            }
            ChangeAction::Expire => {
                self.caches.remove(&cache_key);
                self.fetch_locks.remove(&cache_key);
                self.metrics.record_expire();
            }
            ChangeAction::Delete => {
                let mut instances = InstanceMap::clone(current.instances());
                instances.remove(instance_id);
                self.caches.insert(cache_key, Arc::new(current.derive(instances)));
            }
        }

        self.metrics.record_incremental_update();
        info!(
            key = %key,
            action = ?event.action,
            instance_id = %instance_id,
            version = %event.version,
            "Applied instance change"
        );
    }

    /// 重新拉取一个已缓存的微服务并替换缓存
    pub async fn refresh(&self, app_id: &str, microservice_name: &str) -> Result<RefreshStatus> {
        let key = MicroserviceKey::new(app_id, microservice_name);
        let cache_key = key.to_string();
        let Some(base) = self.get_by_key(&cache_key) else {
            return Ok(RefreshStatus::NotCached);
        };

        let Some(pulled) = self.fetch(&key).await? else {
            return Ok(RefreshStatus::ServiceNotFound);
        };

        let _guard = self.update_lock.lock();
        // 拉取期间可能收到 EXPIRE
        let Some(current) = self.get_by_key(&cache_key) else {
            return Ok(RefreshStatus::NotCached);
        };
        // 拉取期间缓存已被事件替换，拉取结果可能比事件旧，不能覆盖
        if current.version() != base.version() {
            debug!(
                key = %key,
                pulled_from = base.version(),
                current = current.version(),
                "Instances changed while pulling, discard pulled instances"
            );
            return Ok(RefreshStatus::Superseded);
        }

        let merged = self.merge_instances(&current, pulled);
        if is_same_content(current.instances(), &merged) {
            debug!(key = %key, "Instances not changed");
            return Ok(RefreshStatus::NoChange);
        }

        info!(
            key = %key,
            old = current.len(),
            new = merged.len(),
            "Refreshed microservice instances"
        );
        self.caches.insert(cache_key, Arc::new(current.derive(merged)));
        self.metrics.record_refresh();
        Ok(RefreshStatus::Refreshed)
    }

    /// 合并拉取结果
    ///
    /// 安全模式下，或开启空实例保护且拉取结果为空时，消失的实例保留并标记为 HISTORY
    fn merge_instances(&self, current: &InstanceCache, pulled: Vec<RegisteredInstance>) -> InstanceMap {
        let old = current.instances();
        let keep_history = self.is_safe_mode()
            || (pulled.is_empty() && !old.is_empty() && self.config.empty_instance_protection);

        let mut merged: InstanceMap = pulled
            .into_iter()
            .map(|instance| {
                let mut runtime = old
                    .get(&instance.instance_id)
                    .map(|record| record.runtime_state())
                    .unwrap_or_default();
                runtime.history_status = HistoryStatus::Current;
                (
                    instance.instance_id.clone(),
                    Arc::new(InstanceRecord::with_runtime_state(instance, runtime)),
                )
            })
            .collect();

        if keep_history {
            for (instance_id, record) in old.iter() {
                if merged.contains_key(instance_id) {
                    continue;
                }
                let runtime = RuntimeState {
                    history_status: HistoryStatus::History,
                    ..record.runtime_state()
                };
                merged.insert(
                    instance_id.clone(),
                    Arc::new(InstanceRecord::with_runtime_state(record.registered(), runtime)),
                );
            }
        }
        merged
    }

    /// 重新拉取所有已缓存的微服务，单个失败只记录日志
    pub async fn refresh_all(&self) {
        let keys: Vec<MicroserviceKey> = self
            .caches
            .iter()
            .map(|entry| entry.value().key().clone())
            .collect();

        for key in keys {
            if let Err(e) = self.refresh(&key.app_id, &key.microservice_name).await {
                warn!(key = %key, error = %e, "Failed to refresh microservice instances");
            }
        }
    }

    /// 原地修改某个实例的运行时状态（供健康探测使用）
    ///
    /// 返回实例是否存在
    pub fn update_runtime_state(
        &self,
        app_id: &str,
        microservice_name: &str,
        instance_id: &str,
        f: impl FnOnce(&mut RuntimeState),
    ) -> bool {
        match self
            .get(app_id, microservice_name)
            .and_then(|cache| cache.get(instance_id))
        {
            Some(record) => {
                record.update_runtime_state(f);
                true
            }
            None => false,
        }
    }

    /// 丢弃所有缓存（注册中心重连恢复时使用）
    pub fn clean_up(&self) {
        let _guard = self.update_lock.lock();
        self.caches.clear();
    }

    /// 所有缓存条目的快照
    pub fn cached_entries(&self) -> Vec<Arc<InstanceCache>> {
        self.caches.iter().map(|entry| entry.value().clone()).collect()
    }

    /// 保留的全量拉取锁数量
    pub fn fetch_lock_count(&self) -> usize {
        self.fetch_locks.len()
    }

    /// 与注册中心通信异常：缓存标记为不可用，但保留数据
    pub fn on_registry_exception(&self) {
        self.cache_available.store(false, Ordering::Release);
    }

    /// 与注册中心恢复通信：若此前异常过，清空缓存以便重新拉取
    pub fn on_registry_recovered(&self) {
        if self
            .cache_available
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.clean_up();
            info!("Reconnected to registry, clean up microservice instances cache");
        }
    }

    pub fn is_cache_available(&self) -> bool {
        self.cache_available.load(Ordering::Acquire)
    }

    /// 安全模式下定时拉取不会删除实例
    pub fn set_safe_mode(&self, safe_mode: bool) {
        let previous = self.safe_mode.swap(safe_mode, Ordering::AcqRel);
        if previous != safe_mode {
            info!(safe_mode, "Registry safe mode changed");
        }
    }

    pub fn is_safe_mode(&self) -> bool {
        self.safe_mode.load(Ordering::Acquire)
    }

    /// 按投递顺序消费变更事件
    pub fn subscribe(self: &Arc<Self>, mut events: mpsc::Receiver<InstanceChangedEvent>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                manager.on_instance_update(&event);
            }
            debug!("Instance change subscription closed");
        })
    }

    /// 启动定时拉取任务
    pub fn start_pull_task(self: &Arc<Self>, period: Duration) -> PullTask {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let manager = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // 第一次 tick 立即返回，跳过
            timer.tick().await;

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        manager.refresh_all().await;
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Instance pull task stopped");
                        break;
                    }
                }
            }
        });

        PullTask {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }
}

/// 实例 ID、注册数据以及历史状态都相同
fn is_same_content(old: &InstanceMap, new: &InstanceMap) -> bool {
    old.len() == new.len()
        && new.iter().all(|(instance_id, record)| {
            old.get(instance_id).is_some_and(|existing| {
                existing.history_status() == record.history_status()
                    && existing.registered() == record.registered()
            })
        })
}

/// 定时拉取任务句柄
pub struct PullTask {
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PullTask {
    /// 停止任务并等待其退出
    pub async fn shutdown(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for PullTask {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.try_send(());
        }
    }
}
