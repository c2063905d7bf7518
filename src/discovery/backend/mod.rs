//! 注册中心客户端抽象
//!
//! 发现核心只通过两个窄接口与注册中心交互：
//! - 全量拉取：`RegistryClient::find_instances`
//! - 变更订阅：按投递顺序到达的 `InstanceChangedEvent`

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::discovery::instance::RegisteredInstance;
use crate::error::Result;

pub use memory::StaticRegistry;

/// 注册中心客户端 trait
///
/// 真实实现（service center、etcd、consul 等）位于发现核心之外；
/// 由于需要动态分发（dyn），使用 async-trait
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// 拉取微服务当前的全部实例
    ///
    /// # 参数
    /// * `app_id` - 应用 ID
    /// * `microservice_name` - 微服务名
    /// * `version_rule` - 版本规则（如 `0.0.0.0+`）
    ///
    /// # 返回
    /// * `Ok(Some(list))` - 微服务存在（列表可能为空）
    /// * `Ok(None)` - 注册中心不认识该微服务
    /// * `Err` - 网络或注册中心错误
    async fn find_instances(
        &self,
        app_id: &str,
        microservice_name: &str,
        version_rule: &str,
    ) -> Result<Option<Vec<RegisteredInstance>>>;
}

/// 实例变更动作
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeAction {
    Create,
    Update,
    /// 注册中心使该微服务的整体缓存失效（如规则变化）
    Expire,
    Delete,
}

/// 实例变更事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceChangedEvent {
    pub action: ChangeAction,
    pub app_id: String,
    pub microservice_name: String,
    /// 微服务版本（注册中心侧的版本号，不是缓存版本）
    pub version: String,
    pub instance: RegisteredInstance,
}

impl InstanceChangedEvent {
    pub fn new(
        action: ChangeAction,
        app_id: impl Into<String>,
        microservice_name: impl Into<String>,
        instance: RegisteredInstance,
    ) -> Self {
        Self {
            action,
            app_id: app_id.into(),
            microservice_name: microservice_name.into(),
            version: String::new(),
            instance,
        }
    }

    /// 设置微服务版本
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}
