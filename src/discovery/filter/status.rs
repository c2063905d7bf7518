//! 实例状态分层过滤器
//!
//! 过滤链中第一个执行，顺序固定不可配置：
//! - 第 0 层：CURRENT、UP、探活 OK、未隔离
//! - 第 1 层：CURRENT、UP、探活 UNKNOWN、未隔离
//! - 第 2 层：HISTORY、UP、探活 OK、未隔离
//! - 第 3 层：其余所有实例

use std::sync::Arc;

use crate::discovery::filter::group::{GroupDiscoveryFilter, GroupingStrategy};
use crate::discovery::instance::{
    HistoryStatus, InstanceRecord, InstanceStatus, IsolationStatus, PingStatus,
};

pub const STATUS_FILTER_ORDER: i32 = -10000;

const TIER_COUNT: usize = 4;

/// 状态分层策略
#[derive(Debug, Clone, Copy, Default)]
pub struct InstanceStatusTiers;

impl InstanceStatusTiers {
    /// 实例所在的层
    pub fn tier_of(instance: &InstanceRecord) -> usize {
        let runtime = instance.runtime_state();
        if instance.status() != InstanceStatus::Up
            || runtime.isolation_status != IsolationStatus::Normal
        {
            return 3;
        }

        match (runtime.history_status, runtime.ping_status) {
            (HistoryStatus::Current, PingStatus::Ok) => 0,
            (HistoryStatus::Current, PingStatus::Unknown) => 1,
            (HistoryStatus::History, PingStatus::Ok) => 2,
            _ => 3,
        }
    }
}

impl GroupingStrategy for InstanceStatusTiers {
    fn order(&self) -> i32 {
        STATUS_FILTER_ORDER
    }

    fn context_param(&self) -> &'static str {
        "instance-status-tier"
    }

    fn group_prefix(&self) -> &'static str {
        "tier"
    }

    fn partition(&self, instances: &[Arc<InstanceRecord>]) -> Vec<Vec<Arc<InstanceRecord>>> {
        let mut tiers = vec![Vec::new(); TIER_COUNT];
        for instance in instances {
            tiers[Self::tier_of(instance)].push(instance.clone());
        }
        tiers
    }
}

pub type InstanceStatusDiscoveryFilter = GroupDiscoveryFilter<InstanceStatusTiers>;

impl InstanceStatusDiscoveryFilter {
    pub fn status_tiers() -> Self {
        GroupDiscoveryFilter::new(InstanceStatusTiers)
    }
}
