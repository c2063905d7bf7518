//! 内存注册中心
//!
//! 用于本地开发与测试的 `RegistryClient` 实现，可选地把注册/注销
//! 以变更事件的形式推送给订阅方。

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::discovery::backend::{ChangeAction, InstanceChangedEvent, RegistryClient};
use crate::discovery::cache::MicroserviceKey;
use crate::discovery::instance::RegisteredInstance;
use crate::error::{DiscoveryError, Result};

/// JSON 定义中的单个微服务
#[derive(Debug, Clone, Deserialize)]
struct StaticService {
    app_id: String,
    microservice_name: String,
    #[serde(default)]
    instances: Vec<RegisteredInstance>,
}

/// 内存注册中心
#[derive(Default)]
pub struct StaticRegistry {
    services: DashMap<String, Vec<RegisteredInstance>>,
    unavailable: AtomicBool,
    fetch_count: AtomicUsize,
    events: Option<mpsc::Sender<InstanceChangedEvent>>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册/注销时向订阅方推送变更事件
    pub fn with_event_sender(mut self, events: mpsc::Sender<InstanceChangedEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// 从 JSON 数组加载静态服务定义
    pub fn from_json(json: &str) -> Result<Self> {
        let services: Vec<StaticService> = serde_json::from_str(json)?;
        let registry = Self::new();
        for service in services {
            let key = MicroserviceKey::new(&service.app_id, &service.microservice_name);
            registry.services.insert(key.to_string(), service.instances);
        }
        info!(
            services = registry.services.len(),
            "Static registry loaded"
        );
        Ok(registry)
    }

    /// 声明一个微服务（可以没有实例）
    pub fn declare_service(&self, app_id: &str, microservice_name: &str) {
        let key = MicroserviceKey::new(app_id, microservice_name);
        self.services.entry(key.to_string()).or_default();
    }

    /// 删除整个微服务，之后的拉取返回“不存在”
    pub fn remove_service(&self, app_id: &str, microservice_name: &str) -> bool {
        let key = MicroserviceKey::new(app_id, microservice_name);
        self.services.remove(&key.to_string()).is_some()
    }

    /// 注册或更新实例，首次出现推送 CREATE，否则推送 UPDATE
    pub async fn register(
        &self,
        app_id: &str,
        microservice_name: &str,
        instance: RegisteredInstance,
    ) {
        let key = MicroserviceKey::new(app_id, microservice_name);
        let action = {
            let mut instances = self.services.entry(key.to_string()).or_default();
            match instances
                .iter_mut()
                .find(|existing| existing.instance_id == instance.instance_id)
            {
                Some(existing) => {
                    *existing = instance.clone();
                    ChangeAction::Update
                }
                None => {
                    instances.push(instance.clone());
                    ChangeAction::Create
                }
            }
        };
        self.publish(action, &key, instance).await;
    }

    /// 注销实例，存在时推送 DELETE
    pub async fn unregister(&self, app_id: &str, microservice_name: &str, instance_id: &str) {
        let key = MicroserviceKey::new(app_id, microservice_name);
        let removed = self.services.get_mut(&key.to_string()).and_then(|mut instances| {
            let position = instances
                .iter()
                .position(|existing| existing.instance_id == instance_id)?;
            Some(instances.remove(position))
        });

        match removed {
            Some(instance) => self.publish(ChangeAction::Delete, &key, instance).await,
            None => debug!(key = %key, instance_id = %instance_id, "Instance not registered"),
        }
    }

    /// 推送 EXPIRE 事件
    pub async fn expire(&self, app_id: &str, microservice_name: &str) {
        let key = MicroserviceKey::new(app_id, microservice_name);
        self.publish(ChangeAction::Expire, &key, RegisteredInstance::new("", ""))
            .await;
    }

    /// 模拟注册中心不可用
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Release);
    }

    /// 已处理的全量拉取次数
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::Acquire)
    }

    async fn publish(&self, action: ChangeAction, key: &MicroserviceKey, instance: RegisteredInstance) {
        let Some(events) = &self.events else {
            return;
        };

        let event = InstanceChangedEvent::new(action, &key.app_id, &key.microservice_name, instance);
        if let Err(e) = events.send(event).await {
            warn!(key = %key, error = %e, "Failed to publish instance change event");
        }
    }
}

#[async_trait]
impl RegistryClient for StaticRegistry {
    async fn find_instances(
        &self,
        app_id: &str,
        microservice_name: &str,
        _version_rule: &str,
    ) -> Result<Option<Vec<RegisteredInstance>>> {
        self.fetch_count.fetch_add(1, Ordering::AcqRel);

        let key = MicroserviceKey::new(app_id, microservice_name);
        if self.unavailable.load(Ordering::Acquire) {
            return Err(DiscoveryError::fetch_failed(
                key.to_string(),
                "registry unavailable",
            ));
        }

        Ok(self
            .services
            .get(&key.to_string())
            .map(|instances| instances.value().clone()))
    }
}
