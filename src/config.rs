use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{DiscoveryError, Result};

/// 默认版本规则：匹配所有版本
pub const DEFAULT_VERSION_RULE: &str = "0.0.0.0+";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub cache: CacheConfig,
    pub isolation: IsolationConfig,
    pub zone_aware: ZoneAwareConfig,
    pub priority_property: PriorityPropertyConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub version_rule: String,
    /// 定时拉取间隔（秒），0 表示不启动定时拉取
    pub pull_interval_secs: u64,
    /// 拉取结果为空时保留旧实例
    pub empty_instance_protection: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            version_rule: DEFAULT_VERSION_RULE.to_string(),
            pull_interval_secs: 30,
            empty_instance_protection: false,
        }
    }
}

impl CacheConfig {
    pub fn pull_interval(&self) -> Duration {
        Duration::from_secs(self.pull_interval_secs)
    }

    pub fn with_version_rule(mut self, version_rule: impl Into<String>) -> Self {
        self.version_rule = version_rule.into();
        self
    }

    pub fn with_pull_interval_secs(mut self, secs: u64) -> Self {
        self.pull_interval_secs = secs;
        self
    }

    pub fn with_empty_instance_protection(mut self, enable: bool) -> Self {
        self.empty_instance_protection = enable;
        self
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IsolationConfig {
    pub enabled: bool,
    /// 所有实例都被隔离时保留全部实例
    pub empty_instance_protection: bool,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            empty_instance_protection: false,
        }
    }
}

impl IsolationConfig {
    pub fn with_enabled(mut self, enable: bool) -> Self {
        self.enabled = enable;
        self
    }

    pub fn with_empty_instance_protection(mut self, enable: bool) -> Self {
        self.empty_instance_protection = enable;
        self
    }
}

/// 本地数据中心，未配置 region 时就近过滤器不生效
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ZoneAwareConfig {
    pub enabled: bool,
    pub region: Option<String>,
    pub zone: Option<String>,
}

impl Default for ZoneAwareConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            region: None,
            zone: None,
        }
    }
}

impl ZoneAwareConfig {
    pub fn with_data_center(mut self, region: impl Into<String>, zone: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self.zone = Some(zone.into());
        self
    }
}

/// 默认的优先级属性键
pub const DEFAULT_PRIORITY_PROPERTY_KEY: &str = "environment";

/// 按实例属性优先级分组，默认关闭
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PriorityPropertyConfig {
    pub enabled: bool,
    pub key: String,
    /// 本服务自身的属性值，如 `prod.cn.a`
    pub value: Option<String>,
}

impl Default for PriorityPropertyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            key: DEFAULT_PRIORITY_PROPERTY_KEY.to_string(),
            value: None,
        }
    }
}

impl PriorityPropertyConfig {
    pub fn with_enabled(mut self, enable: bool) -> Self {
        self.enabled = enable;
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 默认日志级别，`RUST_LOG` 优先
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl DiscoveryConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: DiscoveryConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.version_rule.trim().is_empty() {
            return Err(DiscoveryError::invalid_config("cache.version_rule must not be empty"));
        }
        if self.zone_aware.zone.is_some() && self.zone_aware.region.is_none() {
            return Err(DiscoveryError::invalid_config(
                "zone_aware.zone requires zone_aware.region",
            ));
        }
        if self.priority_property.enabled && self.priority_property.key.trim().is_empty() {
            return Err(DiscoveryError::invalid_config(
                "priority_property.key must not be empty",
            ));
        }
        Ok(())
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_isolation(mut self, isolation: IsolationConfig) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn with_zone_aware(mut self, zone_aware: ZoneAwareConfig) -> Self {
        self.zone_aware = zone_aware;
        self
    }

    pub fn with_priority_property(mut self, priority_property: PriorityPropertyConfig) -> Self {
        self.priority_property = priority_property;
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }
}
