//! 服务实例定义
//!
//! `RegisteredInstance` 是注册中心返回的原始数据；`InstanceRecord` 在其上叠加
//! 由健康探测维护的运行时状态（历史/隔离/探活）。

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 实例注册状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    #[default]
    Up,
    Down,
    Starting,
    OutOfService,
    Unknown,
}

/// 实例是否仍存在于注册中心的最新结果中
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryStatus {
    #[default]
    Current,
    History,
}

/// 实例隔离状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IsolationStatus {
    #[default]
    Normal,
    Isolated,
}

/// 探活状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PingStatus {
    #[default]
    Unknown,
    Ok,
    Fail,
}

/// 健康检查方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthCheckMode {
    #[default]
    Push,
    Pull,
    Platform,
}

/// 健康检查描述
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthCheck {
    pub mode: HealthCheckMode,

    /// 检查间隔（秒）
    pub interval: u32,

    /// 连续失败多少次后判定下线
    pub times: u32,

    /// 拉模式下的探测端口
    #[serde(default)]
    pub port: Option<u16>,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            mode: HealthCheckMode::Push,
            interval: 30,
            times: 3,
            port: None,
        }
    }
}

/// 注册中心返回的实例数据
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisteredInstance {
    /// 实例 ID（重新注册后保持不变）
    pub instance_id: String,

    /// 所属微服务 ID
    pub service_id: String,

    /// 有序的 endpoint 列表，如 `rest://10.0.0.1:8080`
    #[serde(default)]
    pub endpoints: Vec<String>,

    #[serde(default)]
    pub status: InstanceStatus,

    /// 自定义属性（zone/region/stage/group 等）
    #[serde(default)]
    pub properties: HashMap<String, String>,

    #[serde(default)]
    pub health_check: Option<HealthCheck>,
}

impl RegisteredInstance {
    /// 创建新的注册实例
    pub fn new(instance_id: impl Into<String>, service_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            service_id: service_id.into(),
            endpoints: Vec::new(),
            status: InstanceStatus::Up,
            properties: HashMap::new(),
            health_check: None,
        }
    }

    /// 添加 endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoints.push(endpoint.into());
        self
    }

    /// 设置状态
    pub fn with_status(mut self, status: InstanceStatus) -> Self {
        self.status = status;
        self
    }

    /// 添加属性
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// 设置健康检查
    pub fn with_health_check(mut self, health_check: HealthCheck) -> Self {
        self.health_check = Some(health_check);
        self
    }
}

/// 运行时状态，由外部健康探测维护
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RuntimeState {
    pub history_status: HistoryStatus,
    pub isolation_status: IsolationStatus,
    pub ping_status: PingStatus,
}

/// 缓存中的实例记录
///
/// 身份字段创建后不可变；只有运行时状态、`status` 和 `properties` 允许原地修改。
#[derive(Debug)]
pub struct InstanceRecord {
    instance_id: String,
    service_id: String,
    endpoints: Vec<String>,
    health_check: Option<HealthCheck>,
    status: RwLock<InstanceStatus>,
    properties: RwLock<HashMap<String, String>>,
    runtime: RwLock<RuntimeState>,
}

impl InstanceRecord {
    /// 从注册数据创建记录，运行时状态为默认值
    pub fn new(instance: RegisteredInstance) -> Self {
        Self::with_runtime_state(instance, RuntimeState::default())
    }

    /// 从注册数据创建记录，并沿用给定的运行时状态
    pub fn with_runtime_state(instance: RegisteredInstance, runtime: RuntimeState) -> Self {
        Self {
            instance_id: instance.instance_id,
            service_id: instance.service_id,
            endpoints: instance.endpoints,
            health_check: instance.health_check,
            status: RwLock::new(instance.status),
            properties: RwLock::new(instance.properties),
            runtime: RwLock::new(runtime),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    pub fn health_check(&self) -> Option<&HealthCheck> {
        self.health_check.as_ref()
    }

    pub fn status(&self) -> InstanceStatus {
        *self.status.read()
    }

    pub fn set_status(&self, status: InstanceStatus) {
        *self.status.write() = status;
    }

    /// 读取单个属性
    pub fn property(&self, key: &str) -> Option<String> {
        self.properties.read().get(key).cloned()
    }

    /// 属性快照
    pub fn properties(&self) -> HashMap<String, String> {
        self.properties.read().clone()
    }

    pub fn set_property(&self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.write().insert(key.into(), value.into());
    }

    /// 运行时状态快照
    pub fn runtime_state(&self) -> RuntimeState {
        *self.runtime.read()
    }

    /// 原地修改运行时状态
    pub fn update_runtime_state(&self, f: impl FnOnce(&mut RuntimeState)) {
        f(&mut self.runtime.write());
    }

    pub fn history_status(&self) -> HistoryStatus {
        self.runtime.read().history_status
    }

    pub fn set_history_status(&self, status: HistoryStatus) {
        self.runtime.write().history_status = status;
    }

    pub fn isolation_status(&self) -> IsolationStatus {
        self.runtime.read().isolation_status
    }

    pub fn set_isolation_status(&self, status: IsolationStatus) {
        self.runtime.write().isolation_status = status;
    }

    pub fn ping_status(&self) -> PingStatus {
        self.runtime.read().ping_status
    }

    pub fn set_ping_status(&self, status: PingStatus) {
        self.runtime.write().ping_status = status;
    }

    /// 以注册数据的形式导出当前记录（不含运行时状态）
    pub fn registered(&self) -> RegisteredInstance {
        RegisteredInstance {
            instance_id: self.instance_id.clone(),
            service_id: self.service_id.clone(),
            endpoints: self.endpoints.clone(),
            status: self.status(),
            properties: self.properties(),
            health_check: self.health_check.clone(),
        }
    }
}
