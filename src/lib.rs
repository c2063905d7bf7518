//! Flare Discovery
//!
//! 微服务发现解析核心：带版本号的实例缓存、事件驱动的增量更新，
//! 以及可组合、可回溯的过滤链。

pub mod config;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod metrics;

// Re-exports
pub use config::{
    CacheConfig, DiscoveryConfig, IsolationConfig, LoggingConfig, PriorityPropertyConfig, ZoneAwareConfig,
};
pub use discovery::{
    ChangeAction, DefaultEndpointFactory, DiscoveryContext, DiscoveryFactory, DiscoveryFilter,
    DiscoveryStack, DiscoveryTree, DiscoveryTreeNode, Endpoint, EndpointDiscoveryFilter,
    EndpointFactory, GroupDiscoveryFilter, GroupingStrategy, HealthCheck, HealthCheckMode,
    HistoryStatus, InstanceCache, InstanceCacheManager, InstanceChangedEvent, InstanceRecord,
    InstanceStatus, InstanceStatusDiscoveryFilter, IsolationDiscoveryFilter, IsolationStatus,
    MicroserviceKey, NodeData, PingStatus, PriorityPropertyDiscoveryFilter, PullTask, RefreshStatus, RegisteredInstance,
    RegistryClient, Resolution, RuntimeState, StaticRegistry, Versioned, VersionedSnapshot,
    ZoneAware, ZoneAwareDiscoveryFilter,
};
pub use error::{DiscoveryError, ErrorCategory, ErrorCode, Result};
pub use logging::init_tracing;
pub use metrics::{DiscoveryMetrics, MetricsSnapshot};
