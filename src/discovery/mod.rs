//! 服务发现核心
//!
//! 带版本号的实例缓存 + 过滤树解析：注册中心事件更新缓存，缓存版本变化使发现树
//! 的根节点失效，下一次解析只重建过期的子树。

pub mod backend;
pub mod cache;
pub mod factory;
pub mod filter;
pub mod instance;
pub mod tree;
pub mod versioned;

pub use backend::{ChangeAction, InstanceChangedEvent, RegistryClient, StaticRegistry};
pub use cache::{InstanceCache, InstanceCacheManager, MicroserviceKey, PullTask, RefreshStatus};
pub use factory::{DiscoveryFactory, DiscoveryStack};
pub use filter::{
    DefaultEndpointFactory, DiscoveryFilter, Endpoint, EndpointDiscoveryFilter, EndpointFactory,
    GroupDiscoveryFilter, GroupingStrategy, InstanceStatusDiscoveryFilter, InstanceStatusTiers,
    IsolationDiscoveryFilter, PriorityPropertyDiscoveryFilter, ZoneAware, ZoneAwareDiscoveryFilter,
};
pub use instance::{
    HealthCheck, HealthCheckMode, HistoryStatus, InstanceRecord, InstanceStatus, IsolationStatus,
    PingStatus, RegisteredInstance, RuntimeState,
};
pub use tree::{DiscoveryContext, DiscoveryTree, DiscoveryTreeNode, NodeData, Resolution};
pub use versioned::{Versioned, VersionedSnapshot, next_version};
