//! 隔离过滤器
//!
//! 剔除被健康探测标记为 ISOLATED 的实例。隔离状态随时可能变化，
//! 因此结果节点的数据每次调用都重新计算；实例集合变化时清空其子节点，
//! 让后续过滤器重新计算。
//!
//! 空实例保护只在就近分组已经退到“全部实例”一组（或就近过滤器未执行）时生效，
//! 否则应当回溯到其他 zone 的健康实例。

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

use crate::config::IsolationConfig;
use crate::discovery::filter::group::group_position;
use crate::discovery::filter::zone::ZONE_AWARE_CONTEXT_PARAM;
use crate::discovery::filter::{DiscoveryFilter, instance_list};
use crate::discovery::instance::{InstanceRecord, IsolationStatus};
use crate::discovery::tree::{DiscoveryContext, DiscoveryTreeNode};

pub const ISOLATION_FILTER_ORDER: i32 = 500;

const FILTERED_CHILD: &str = "filtered";

/// 隔离过滤器
#[derive(Debug)]
pub struct IsolationDiscoveryFilter {
    config: IsolationConfig,
    update_lock: Mutex<()>,
}

impl IsolationDiscoveryFilter {
    pub fn new(config: IsolationConfig) -> Self {
        Self {
            config,
            update_lock: Mutex::new(()),
        }
    }
}

impl DiscoveryFilter for IsolationDiscoveryFilter {
    fn order(&self) -> i32 {
        ISOLATION_FILTER_ORDER
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    fn discovery(
        &self,
        context: &mut DiscoveryContext,
        parent: &Arc<DiscoveryTreeNode>,
    ) -> Option<Arc<DiscoveryTreeNode>> {
        let instances = instance_list(parent);
        let filtered: Vec<Arc<InstanceRecord>> = instances
            .iter()
            .filter(|instance| instance.isolation_status() == IsolationStatus::Normal)
            .cloned()
            .collect();

        let at_all_instances = group_position(context, ZONE_AWARE_CONTEXT_PARAM)
            .is_none_or(|position| position.is_last());
        let retained = if filtered.is_empty()
            && !instances.is_empty()
            && self.config.empty_instance_protection
            && at_all_instances
        {
            warn!(
                parent = %parent.name(),
                instances = instances.len(),
                "All instances have been isolated, keep them all"
            );
            instances
        } else {
            Arc::new(filtered)
        };

        let child = parent.child_or_create(FILTERED_CHILD, |_| {});
        let _guard = self.update_lock.lock();
        let previous = child.data_as::<Vec<Arc<InstanceRecord>>>();
        if previous.is_some_and(|previous| !same_instance_ids(&previous, &retained)) {
            child.clear_children();
        }
        child.set_shared_data(retained);
        Some(child)
    }
}

fn same_instance_ids(old: &[Arc<InstanceRecord>], new: &[Arc<InstanceRecord>]) -> bool {
    if old.len() != new.len() {
        return false;
    }
    let ids: HashSet<&str> = new.iter().map(|instance| instance.instance_id()).collect();
    old.iter().all(|instance| ids.contains(instance.instance_id()))
}
