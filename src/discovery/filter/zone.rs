//! 就近访问过滤器
//!
//! 按本地数据中心把实例分为三组：同 region 同 zone、同 region 其他 zone、全部实例。

use std::sync::Arc;

use crate::config::ZoneAwareConfig;
use crate::discovery::filter::group::{GroupDiscoveryFilter, GroupingStrategy};
use crate::discovery::instance::InstanceRecord;

pub const ZONE_AWARE_FILTER_ORDER: i32 = 300;

/// 实例属性中的 region 键
pub const PROPERTY_REGION: &str = "region";

/// 实例属性中的 zone 键
pub const PROPERTY_ZONE: &str = "zone";

/// 上下文中保存就近分组游标的参数名
pub const ZONE_AWARE_CONTEXT_PARAM: &str = "zone-aware-level";

/// 最后一组包含全部实例
pub const ZONE_GROUP_ALL_INSTANCES: usize = 2;

/// 就近分组策略
#[derive(Debug, Clone, Default)]
pub struct ZoneAware {
    enabled: bool,
    region: Option<String>,
    zone: Option<String>,
}

impl ZoneAware {
    pub fn new(region: impl Into<String>, zone: impl Into<String>) -> Self {
        Self {
            enabled: true,
            region: Some(region.into()),
            zone: Some(zone.into()),
        }
    }

    pub fn from_config(config: &ZoneAwareConfig) -> Self {
        Self {
            enabled: config.enabled,
            region: config.region.clone(),
            zone: config.zone.clone(),
        }
    }

    /// 同 region 的实例所属的组，其他 region 返回 `None`
    fn local_group_of(&self, instance: &InstanceRecord, region: &str) -> Option<usize> {
        if instance.property(PROPERTY_REGION).as_deref() != Some(region) {
            return None;
        }

        match (&self.zone, instance.property(PROPERTY_ZONE)) {
            (Some(zone), Some(instance_zone)) if *zone == instance_zone => Some(0),
            _ => Some(1),
        }
    }
}

impl GroupingStrategy for ZoneAware {
    fn order(&self) -> i32 {
        ZONE_AWARE_FILTER_ORDER
    }

    /// 未配置本地 region 时不启用
    fn enabled(&self) -> bool {
        self.enabled && self.region.is_some()
    }

    fn context_param(&self) -> &'static str {
        ZONE_AWARE_CONTEXT_PARAM
    }

    fn group_prefix(&self) -> &'static str {
        "zone"
    }

    fn partition(&self, instances: &[Arc<InstanceRecord>]) -> Vec<Vec<Arc<InstanceRecord>>> {
        let mut groups = vec![Vec::new(); 3];
        groups[ZONE_GROUP_ALL_INSTANCES] = instances.to_vec();
        let Some(region) = self.region.as_deref() else {
            return groups;
        };

        for instance in instances {
            if let Some(group) = self.local_group_of(instance, region) {
                groups[group].push(instance.clone());
            }
        }
        groups
    }
}

pub type ZoneAwareDiscoveryFilter = GroupDiscoveryFilter<ZoneAware>;
