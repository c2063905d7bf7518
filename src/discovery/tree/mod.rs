//! 发现树：版本化的根节点 + 过滤链

pub mod context;
pub mod node;
pub mod resolver;

pub use context::{DiscoveryContext, INPUT_TRANSPORT, RerunPoint};
pub use node::{DiscoveryTreeNode, NodeData};
pub use resolver::{DiscoveryTree, MAX_RERUNS_PER_FILTER, Resolution};
