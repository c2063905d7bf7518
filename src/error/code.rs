//! 错误代码和错误类别定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 错误代码枚举
///
/// 错误代码按类别分组，每个类别占用1000个代码范围：
/// - 1000-1999: 注册中心相关错误
/// - 2000-2999: 发现过滤器相关错误
/// - 6000-6999: 系统相关错误
/// - 9000-9999: 通用错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u32)]
pub enum ErrorCode {
    // ============================================================
    // 注册中心相关错误 (1000-1999)
    // ============================================================
    RegistryFetchFailed = 1000,
    RegistryUnavailable = 1001,

    // ============================================================
    // 发现过滤器相关错误 (2000-2999)
    // ============================================================
    FilterContractViolation = 2000,

    // ============================================================
    // 系统相关错误 (6000-6999)
    // ============================================================
    InternalError = 6000,
    ConfigurationError = 6003,
    IoError = 6005,

    // ============================================================
    // 通用错误 (9000-9999)
    // ============================================================
    UnknownError = 9999,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ErrorCode {
    /// 获取错误代码的数字值
    #[inline]
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }

    /// 从数字值创建错误代码
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            1000 => Some(ErrorCode::RegistryFetchFailed),
            1001 => Some(ErrorCode::RegistryUnavailable),
            2000 => Some(ErrorCode::FilterContractViolation),
            6000 => Some(ErrorCode::InternalError),
            6003 => Some(ErrorCode::ConfigurationError),
            6005 => Some(ErrorCode::IoError),
            9999 => Some(ErrorCode::UnknownError),
            _ => None,
        }
    }

    /// 获取错误代码的英文标识符
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::RegistryFetchFailed => "REGISTRY_FETCH_FAILED",
            ErrorCode::RegistryUnavailable => "REGISTRY_UNAVAILABLE",
            ErrorCode::FilterContractViolation => "FILTER_CONTRACT_VIOLATION",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::ConfigurationError => "CONFIGURATION_ERROR",
            ErrorCode::IoError => "IO_ERROR",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// 获取错误代码的类别（用于错误分类）
    pub fn category(&self) -> ErrorCategory {
        match self.as_u32() {
            1000..=1999 => ErrorCategory::Registry,
            2000..=2999 => ErrorCategory::Filter,
            6000..=6999 => ErrorCategory::System,
            _ => ErrorCategory::General,
        }
    }

    /// 判断是否为可重试的错误
    ///
    /// 重试由调用方的退避策略负责，缓存本身从不重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::RegistryFetchFailed | ErrorCode::RegistryUnavailable
        )
    }
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Registry,
    Filter,
    System,
    General,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Registry => write!(f, "REGISTRY"),
            ErrorCategory::Filter => write!(f, "FILTER"),
            ErrorCategory::System => write!(f, "SYSTEM"),
            ErrorCategory::General => write!(f, "GENERAL"),
        }
    }
}
