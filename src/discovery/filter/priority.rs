//! 按实例属性优先级分组
//!
//! 按可配置的属性键（默认 `environment`）把实例分组。解析从调用方的属性值开始，
//! 当前组为空时依次退到更宽泛的值：`a.b.c` → `a.b` → `a` → `""`。
//! 每一步（空值除外）都记录回溯点。

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::PriorityPropertyConfig;
use crate::discovery::filter::zone::ZONE_AWARE_FILTER_ORDER;
use crate::discovery::filter::{DiscoveryFilter, instance_list};
use crate::discovery::instance::InstanceRecord;
use crate::discovery::tree::{DiscoveryContext, DiscoveryTreeNode};

pub const PRIORITY_PROPERTY_FILTER_ORDER: i32 = ZONE_AWARE_FILTER_ORDER + 1;

/// 包含全部实例的子节点
pub const ALL_INSTANCES_CHILD: &str = "allInstance";

const PRIORITY_SEPARATOR: char = '.';

/// 更宽泛一级的属性值，`a.b` → `a`，`a` → `""`
pub fn wider_value(value: &str) -> &str {
    value
        .rsplit_once(PRIORITY_SEPARATOR)
        .map(|(prefix, _)| prefix)
        .unwrap_or("")
}

/// 调用方覆盖本地属性值时使用的输入参数名，如 `x-environment`
pub fn property_input_key(property_key: &str) -> String {
    format!("x-{}", property_key)
}

struct PriorityCursor {
    parent: Arc<DiscoveryTreeNode>,
    value: String,
}

/// 属性优先级过滤器
#[derive(Debug, Clone)]
pub struct PriorityPropertyDiscoveryFilter {
    config: PriorityPropertyConfig,
    input_key: String,
    context_param: String,
}

impl PriorityPropertyDiscoveryFilter {
    pub fn new(config: PriorityPropertyConfig) -> Self {
        let input_key = property_input_key(&config.key);
        let context_param = format!("priority-property:{}", config.key);
        Self {
            config,
            input_key,
            context_param,
        }
    }

    pub fn property_key(&self) -> &str {
        &self.config.key
    }

    fn init_children(&self, parent: &Arc<DiscoveryTreeNode>) {
        let instances = instance_list(parent);
        let mut groups: HashMap<String, Vec<Arc<InstanceRecord>>> = HashMap::new();
        for instance in instances.iter() {
            let value = instance.property(&self.config.key).unwrap_or_default();
            groups.entry(value).or_default().push(instance.clone());
        }

        let group_count = groups.len();
        for (value, group) in groups {
            parent.child_or_create(&value, |node| node.set_data(group));
        }
        parent.child_or_create(ALL_INSTANCES_CHILD, |node| node.set_shared_data(instances));

        debug!(
            key = %self.config.key,
            parent = %parent.name(),
            groups = group_count,
            "Instances grouped by property"
        );
    }

    /// 同一个父节点上回溯时退到更宽泛的值，否则从调用方的属性值开始，
    /// 跳过没有对应实例的值
    fn find_child_name(&self, context: &mut DiscoveryContext, parent: &Arc<DiscoveryTreeNode>) -> String {
        let resumed = context
            .param::<PriorityCursor>(&self.context_param)
            .filter(|cursor| Arc::ptr_eq(&cursor.parent, parent))
            .map(|cursor| wider_value(&cursor.value).to_string());

        let value = match resumed {
            Some(value) => value,
            None => {
                let mut value = context
                    .input(&self.input_key)
                    .map(str::to_string)
                    .or_else(|| self.config.value.clone())
                    .unwrap_or_default();
                while !value.is_empty() && parent.child(&value).is_none() {
                    value = wider_value(&value).to_string();
                }
                value
            }
        };

        debug!(key = %self.config.key, value = %value, "Discovery instances filtered by property");
        if !value.is_empty() {
            context.push_rerun(parent.clone());
        }
        context.set_param(
            self.context_param.clone(),
            PriorityCursor {
                parent: parent.clone(),
                value: value.clone(),
            },
        );
        value
    }
}

impl DiscoveryFilter for PriorityPropertyDiscoveryFilter {
    fn order(&self) -> i32 {
        PRIORITY_PROPERTY_FILTER_ORDER
    }

    fn enabled(&self) -> bool {
        self.config.enabled
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
        // 中间层级（如 `a.b`）可能没有实例，以空节点触发回溯
        Some(parent.child_or_create(&child_name, |node| {
            node.set_data(Vec::<Arc<InstanceRecord>>::new())
        }))
    }
}
