//! 发现过滤器
//!
//! 过滤器按 `order` 升序组成过滤链，每个过滤器从父节点计算（或复用）一个子节点。
//! 过滤器在并发解析间共享，自身不保存单次调用的状态。

pub mod endpoint;
pub mod group;
pub mod isolation;
pub mod priority;
pub mod status;
pub mod zone;

use std::sync::Arc;

use crate::discovery::instance::InstanceRecord;
use crate::discovery::tree::{DiscoveryContext, DiscoveryTreeNode};

pub use endpoint::{DefaultEndpointFactory, Endpoint, EndpointDiscoveryFilter, EndpointFactory};
pub use group::{GROUP_COUNT_ATTRIBUTE, GroupDiscoveryFilter, GroupPosition, GroupingStrategy, group_position};
pub use isolation::IsolationDiscoveryFilter;
pub use priority::PriorityPropertyDiscoveryFilter;
pub use status::{InstanceStatusDiscoveryFilter, InstanceStatusTiers};
pub use zone::{ZoneAware, ZoneAwareDiscoveryFilter};

/// 发现过滤器
pub trait DiscoveryFilter: Send + Sync {
    /// 过滤链中的位置，升序执行
    fn order(&self) -> i32;

    fn enabled(&self) -> bool {
        true
    }

    /// 分组过滤器的子节点保留自己的名字，其余子节点沿用父节点名字
    fn is_grouping_filter(&self) -> bool {
        false
    }

    /// 返回 `None` 属于过滤器实现缺陷，解析会立即失败
    fn discovery(
        &self,
        context: &mut DiscoveryContext,
        parent: &Arc<DiscoveryTreeNode>,
    ) -> Option<Arc<DiscoveryTreeNode>>;

    fn filter_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// 节点上的实例列表，数据不是实例列表时视为空
pub fn instance_list(node: &DiscoveryTreeNode) -> Arc<Vec<Arc<InstanceRecord>>> {
    node.data_as::<Vec<Arc<InstanceRecord>>>()
        .unwrap_or_default()
}
