//! 日志初始化

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LoggingConfig;
use crate::error::{DiscoveryError, Result};

/// 安装全局 tracing subscriber
///
/// `RUST_LOG` 存在时优先于配置中的级别；已经安装过全局 subscriber 时返回错误
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| DiscoveryError::invalid_config(format!("invalid log level: {}", e)))?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };

    installed.map_err(|e| DiscoveryError::invalid_config(format!("tracing already initialized: {}", e)))
}
