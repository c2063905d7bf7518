//! 单次解析的上下文

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::discovery::tree::node::DiscoveryTreeNode;

/// 调用方指定传输协议时使用的输入参数名
pub const INPUT_TRANSPORT: &str = "transport";

/// 回溯点：从 `filter_index` 处的过滤器、以 `node` 为父节点重新执行
#[derive(Debug, Clone)]
pub struct RerunPoint {
    pub filter_index: usize,
    pub node: Arc<DiscoveryTreeNode>,
}

/// 解析上下文
///
/// 每次解析独占一个，不在调用之间共享。分组过滤器的游标等状态都放在
/// 参数表里，过滤器本身保持无状态。
#[derive(Default)]
pub struct DiscoveryContext {
    current_node: Option<Arc<DiscoveryTreeNode>>,
    current_index: usize,
    reruns: Vec<RerunPoint>,
    params: HashMap<String, Box<dyn Any + Send>>,
    inputs: HashMap<String, String>,
}

impl DiscoveryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置调用方的输入参数
    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inputs.insert(key.into(), value.into());
        self
    }

    /// 设置请求的传输协议，空字符串表示全部
    pub fn with_transport(self, transport: impl Into<String>) -> Self {
        self.with_input(INPUT_TRANSPORT, transport)
    }

    pub fn input(&self, key: &str) -> Option<&str> {
        self.inputs.get(key).map(String::as_str)
    }

    pub fn set_input(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inputs.insert(key.into(), value.into());
    }

    pub fn transport(&self) -> &str {
        self.input(INPUT_TRANSPORT).unwrap_or("")
    }

    pub fn current_node(&self) -> Option<&Arc<DiscoveryTreeNode>> {
        self.current_node.as_ref()
    }

    pub(crate) fn set_current_node(&mut self, node: Arc<DiscoveryTreeNode>) {
        self.current_node = Some(node);
    }

    /// 正在执行的过滤器下标
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub(crate) fn set_current_index(&mut self, index: usize) {
        self.current_index = index;
    }

    /// 在当前过滤器处记录回溯点
    pub fn push_rerun(&mut self, node: Arc<DiscoveryTreeNode>) {
        self.reruns.push(RerunPoint {
            filter_index: self.current_index,
            node,
        });
    }

    pub fn pop_rerun(&mut self) -> Option<RerunPoint> {
        self.reruns.pop()
    }

    pub fn pending_reruns(&self) -> usize {
        self.reruns.len()
    }

    pub fn param<T: Any>(&self, key: &str) -> Option<&T> {
        self.params.get(key).and_then(|value| value.downcast_ref::<T>())
    }

    pub fn set_param<T: Any + Send>(&mut self, key: impl Into<String>, value: T) {
        self.params.insert(key.into(), Box::new(value));
    }

    pub fn remove_param(&mut self, key: &str) -> bool {
        self.params.remove(key).is_some()
    }
}
