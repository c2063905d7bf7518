//! 服务发现错误处理模块
//!
//! 提供统一的错误类型与错误代码分类

pub mod code;
pub mod discovery_error;

pub use code::{ErrorCategory, ErrorCode};
pub use discovery_error::{DiscoveryError, Result};

/// 注册中心客户端内部使用的结果类型
pub type InfraResult<T> = anyhow::Result<T>;

/// 将注册中心客户端错误转换为 `DiscoveryError::TransientFetchFailure`
pub fn map_registry_error<E>(error: E, key: impl Into<String>) -> DiscoveryError
where
    E: std::fmt::Display,
{
    DiscoveryError::fetch_failed(key, error.to_string())
}

/// `InfraResult` 的辅助扩展，用于快速转换为统一的发现错误类型
pub trait InfraResultExt<T> {
    fn into_discovery(self, key: impl Into<String>) -> Result<T>;
}

impl<T> InfraResultExt<T> for InfraResult<T> {
    fn into_discovery(self, key: impl Into<String>) -> Result<T> {
        self.map_err(|err| map_registry_error(err, key))
    }
}
