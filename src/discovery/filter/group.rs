//! 通用分组过滤器
//!
//! 首次访问父节点时把实例划分为有序的若干组，并全部注册为子节点。
//! 解析时从第一组开始；还有未尝试的组时记录回溯点，后续过滤器结果为空时
//! 解析器回到这里并选择下一组。

use std::sync::Arc;
use tracing::debug;

use crate::discovery::filter::{DiscoveryFilter, instance_list};
use crate::discovery::instance::InstanceRecord;
use crate::discovery::tree::{DiscoveryContext, DiscoveryTreeNode};

/// 父节点上记录分组数量的属性名
pub const GROUP_COUNT_ATTRIBUTE: &str = "group-count";

/// 分组策略
pub trait GroupingStrategy: Send + Sync + 'static {
    fn order(&self) -> i32;

    fn enabled(&self) -> bool {
        true
    }

    /// 上下文中保存分组游标的参数名，不同策略之间必须唯一
    fn context_param(&self) -> &'static str;

    /// 子节点名前缀，第 i 组（从 0 开始）名为 `{prefix}{i}`
    fn group_prefix(&self) -> &'static str;

    /// 按优先级返回各组实例，组的数量对同一策略保持固定
    fn partition(&self, instances: &[Arc<InstanceRecord>]) -> Vec<Vec<Arc<InstanceRecord>>>;
}

/// 分组游标：当前父节点和已选择的组（从 1 开始）
struct GroupCursor {
    parent: Arc<DiscoveryTreeNode>,
    level: usize,
}

/// 分组过滤器在本次解析中选中的组
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupPosition {
    /// 选中组的下标（从 0 开始）
    pub index: usize,
    pub groups: usize,
}

impl GroupPosition {
    pub fn is_last(&self) -> bool {
        self.index + 1 >= self.groups
    }
}

/// 读取某个分组过滤器当前选中的组，该过滤器尚未执行时返回 `None`
pub fn group_position(context: &DiscoveryContext, param: &str) -> Option<GroupPosition> {
    context.param::<GroupCursor>(param).map(|cursor| GroupPosition {
        index: cursor.level - 1,
        groups: cursor
            .parent
            .attribute::<usize>(GROUP_COUNT_ATTRIBUTE)
            .map(|count| *count)
            .unwrap_or(0),
    })
}

/// 通用分组过滤器
#[derive(Debug, Clone, Default)]
pub struct GroupDiscoveryFilter<S> {
    strategy: S,
}

impl<S: GroupingStrategy> GroupDiscoveryFilter<S> {
    pub fn new(strategy: S) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn group_name(&self, index: usize) -> String {
        format!("{}{}", self.strategy.group_prefix(), index)
    }

    fn init_children(&self, parent: &Arc<DiscoveryTreeNode>) {
        let instances = instance_list(parent);
        let groups = self.strategy.partition(&instances);

        for (index, group) in groups.iter().enumerate() {
            parent.child_or_create(&self.group_name(index), |node| {
                node.set_data(group.clone());
            });
        }
        parent.set_attribute(GROUP_COUNT_ATTRIBUTE, groups.len());

        debug!(
            filter = self.filter_name(),
            parent = %parent.name(),
            groups = groups.len(),
            sizes = ?groups.iter().map(Vec::len).collect::<Vec<_>>(),
            "Instances grouped"
        );
    }

    /// 选择本次访问的组
    ///
    /// 回溯回到同一个父节点时游标前进一组；父节点变化（外层过滤器换了组）时
    /// 从第一组重新开始
    fn find_child_name(&self, context: &mut DiscoveryContext, parent: &Arc<DiscoveryTreeNode>) -> String {
        let groups = parent
            .attribute::<usize>(GROUP_COUNT_ATTRIBUTE)
            .map(|count| *count)
            .unwrap_or(0);
        let param = self.strategy.context_param();

        let resumed = context
            .param::<GroupCursor>(param)
            .filter(|cursor| Arc::ptr_eq(&cursor.parent, parent))
            .map(|cursor| cursor.level);

        let level = match resumed {
            Some(level) => level + 1,
            None => 1,
        };
        if level < groups {
            context.push_rerun(parent.clone());
        }
        context.set_param(
            param,
            GroupCursor {
                parent: parent.clone(),
                level,
            },
        );

        self.group_name(level - 1)
    }
}

impl<S: GroupingStrategy> DiscoveryFilter for GroupDiscoveryFilter<S> {
    fn order(&self) -> i32 {
        self.strategy.order()
    }

    fn enabled(&self) -> bool {
        self.strategy.enabled()
    }

    fn is_grouping_filter(&self) -> bool {
        true
    }

    fn discovery(
        &self,
        context: &mut DiscoveryContext,
        parent: &Arc<DiscoveryTreeNode>,
    ) -> Option<Arc<DiscoveryTreeNode>> {
        parent.init_children_once(|| self.init_children(parent));
        let child_name = self.find_child_name(context, parent);
        parent.child(&child_name)
    }

    fn filter_name(&self) -> &'static str {
        std::any::type_name::<S>()
    }
}
