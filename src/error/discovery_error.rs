//! 服务发现统一错误类型
//!
//! "微服务不存在" 不属于错误：它通过 `Option` / `Resolution::MicroserviceNotFound`
//! 显式返回给调用方，便于负载均衡层返回 404。

use super::code::ErrorCode;
use thiserror::Error;

/// 服务发现统一错误类型
#[derive(Error, Debug, Clone)]
pub enum DiscoveryError {
    /// 全量拉取实例时注册中心或网络出错，不缓存、不重试
    #[error("拉取实例失败 [{key}]: {reason}")]
    TransientFetchFailure { key: String, reason: String },

    /// 过滤器实现缺陷（返回空子节点，或分组序列永不终止）
    #[error("过滤器 {filter} 违反契约: {reason}")]
    FilterContractViolation { filter: String, reason: String },

    /// 配置错误
    #[error("配置错误: {0}")]
    InvalidConfig(String),

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(String),
}

impl DiscoveryError {
    /// 创建拉取失败错误
    pub fn fetch_failed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        DiscoveryError::TransientFetchFailure {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// 创建过滤器契约错误
    pub fn contract_violation(filter: impl Into<String>, reason: impl Into<String>) -> Self {
        DiscoveryError::FilterContractViolation {
            filter: filter.into(),
            reason: reason.into(),
        }
    }

    /// 创建配置错误
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        DiscoveryError::InvalidConfig(msg.into())
    }

    /// 获取错误代码
    pub fn code(&self) -> ErrorCode {
        match self {
            DiscoveryError::TransientFetchFailure { .. } => ErrorCode::RegistryFetchFailed,
            DiscoveryError::FilterContractViolation { .. } => ErrorCode::FilterContractViolation,
            DiscoveryError::InvalidConfig(_) => ErrorCode::ConfigurationError,
            DiscoveryError::Io(_) => ErrorCode::IoError,
        }
    }

    /// 是否可由调用方重试
    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }
}

impl From<std::io::Error> for DiscoveryError {
    fn from(err: std::io::Error) -> Self {
        DiscoveryError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for DiscoveryError {
    fn from(err: toml::de::Error) -> Self {
        DiscoveryError::InvalidConfig(err.to_string())
    }
}

impl From<serde_json::Error> for DiscoveryError {
    fn from(err: serde_json::Error) -> Self {
        DiscoveryError::InvalidConfig(err.to_string())
    }
}

/// 服务发现结果类型
pub type Result<T> = std::result::Result<T, DiscoveryError>;
