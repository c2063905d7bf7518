//! 发现树节点
//!
//! 同一个父节点下，每个名字只创建一次子节点并在后续调用中复用，
//! 树本身就是过滤结果的缓存。

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crate::discovery::versioned::Versioned;

/// 节点数据
///
/// 解析器不关心具体类型，只需要知道数据是否为空以决定是否回溯
pub trait NodeData: Any + Send + Sync {
    fn is_empty(&self) -> bool;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Send + Sync + 'static> NodeData for Vec<T> {
    fn is_empty(&self) -> bool {
        Vec::is_empty(self)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl<K, V> NodeData for HashMap<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn is_empty(&self) -> bool {
        HashMap::is_empty(self)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// 发现树节点
pub struct DiscoveryTreeNode {
    name: RwLock<String>,
    level: AtomicUsize,
    cache_version: u64,
    data: RwLock<Option<Arc<dyn NodeData>>>,
    children: DashMap<String, Arc<DiscoveryTreeNode>>,
    attributes: DashMap<String, Arc<dyn Any + Send + Sync>>,
    children_inited: Mutex<bool>,
    parent: Weak<DiscoveryTreeNode>,
}

impl DiscoveryTreeNode {
    fn with_parent(name: String, cache_version: u64, parent: Weak<DiscoveryTreeNode>) -> Self {
        Self {
            name: RwLock::new(name),
            level: AtomicUsize::new(0),
            cache_version,
            data: RwLock::new(None),
            children: DashMap::new(),
            attributes: DashMap::new(),
            children_inited: Mutex::new(false),
            parent,
        }
    }

    /// 创建根节点
    pub fn root(name: impl Into<String>, cache_version: u64) -> Arc<Self> {
        Arc::new(Self::with_parent(name.into(), cache_version, Weak::new()))
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.write() = name.into();
    }

    /// 产生该节点的过滤器下标 + 1，根节点为 0
    pub fn level(&self) -> usize {
        self.level.load(Ordering::Acquire)
    }

    pub fn set_level(&self, level: usize) {
        self.level.store(level, Ordering::Release);
    }

    pub fn parent(&self) -> Option<Arc<DiscoveryTreeNode>> {
        self.parent.upgrade()
    }

    pub fn data(&self) -> Option<Arc<dyn NodeData>> {
        self.data.read().clone()
    }

    /// 按具体类型读取数据，类型不符时返回 `None`
    pub fn data_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.data().and_then(|data| data.into_any().downcast::<T>().ok())
    }

    pub fn set_data<T: NodeData>(&self, data: T) {
        self.set_shared_data(Arc::new(data));
    }

    pub fn set_shared_data(&self, data: Arc<dyn NodeData>) {
        *self.data.write() = Some(data);
    }

    /// 没有数据或数据为空
    pub fn is_empty(&self) -> bool {
        self.data.read().as_ref().is_none_or(|data| data.is_empty())
    }

    pub fn child(&self, name: &str) -> Option<Arc<DiscoveryTreeNode>> {
        self.children.get(name).map(|child| child.value().clone())
    }

    /// 子节点不存在时创建，`init` 只在创建时执行一次
    pub fn child_or_create(
        self: &Arc<Self>,
        name: &str,
        init: impl FnOnce(&DiscoveryTreeNode),
    ) -> Arc<DiscoveryTreeNode> {
        if let Some(child) = self.child(name) {
            return child;
        }

        self.children
            .entry(name.to_string())
            .or_insert_with(|| {
                let child =
                    Self::with_parent(name.to_string(), self.cache_version, Arc::downgrade(self));
                init(&child);
                Arc::new(child)
            })
            .value()
            .clone()
    }

    pub fn child_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.children.iter().map(|child| child.key().clone()).collect();
        names.sort();
        names
    }

    pub fn children_len(&self) -> usize {
        self.children.len()
    }

    /// 首次访问时初始化全部子节点，并发调用方会等待初始化完成
    pub fn init_children_once(&self, init: impl FnOnce()) {
        let mut inited = self.children_inited.lock();
        if !*inited {
            init();
            *inited = true;
        }
    }

    /// 清空子节点，下次访问时重新初始化
    pub fn clear_children(&self) {
        let mut inited = self.children_inited.lock();
        self.children.clear();
        *inited = false;
    }

    pub fn attribute<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.attributes
            .get(key)
            .and_then(|value| value.value().clone().downcast::<T>().ok())
    }

    pub fn set_attribute<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.attributes.insert(key.into(), Arc::new(value));
    }
}

impl Versioned for DiscoveryTreeNode {
    fn cache_version(&self) -> u64 {
        self.cache_version
    }
}

impl fmt::Debug for DiscoveryTreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryTreeNode")
            .field("name", &self.name())
            .field("level", &self.level())
            .field("cache_version", &self.cache_version)
            .field("empty", &self.is_empty())
            .field("children", &self.child_names())
            .finish()
    }
}
