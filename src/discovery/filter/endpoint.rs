//! Endpoint 转换过滤器
//!
//! 把实例列表按传输协议分组并转换为 endpoint 对象。子节点：
//! - `""`：全部 endpoint
//! - 每个协议名（URI scheme）一个子节点
//! - `"websocket"`：支持 websocket 的 endpoint
//!
//! 无法解析的 endpoint 只记录日志并跳过，不影响其他 endpoint。

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::discovery::filter::{DiscoveryFilter, instance_list};
use crate::discovery::instance::InstanceRecord;
use crate::discovery::tree::{DiscoveryContext, DiscoveryTreeNode};

pub const ENDPOINT_FILTER_ORDER: i32 = i16::MAX as i32;

/// 全部传输协议
pub const ALL_TRANSPORTS: &str = "";

/// 支持 websocket 的 endpoint 分组
pub const WEBSOCKET_TRANSPORT: &str = "websocket";

/// endpoint 查询参数中声明 websocket 支持的键
pub const WEBSOCKET_ENABLED_PARAM: &str = "websocketEnabled";

/// 转换后的 endpoint
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub transport: String,
    pub uri: Url,
    pub instance: Arc<InstanceRecord>,
}

impl Endpoint {
    pub fn instance_id(&self) -> &str {
        self.instance.instance_id()
    }

    /// `host:port`，缺少端口时只有 host
    pub fn address(&self) -> String {
        let host = self.uri.host_str().unwrap_or_default();
        match self.uri.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }
}

/// endpoint 构造钩子
pub trait EndpointFactory: Send + Sync + 'static {
    type Endpoint: Clone + Send + Sync + 'static;

    /// 返回 `None` 表示本地没有部署该传输协议，endpoint 被跳过
    fn create_endpoint(
        &self,
        transport: &str,
        uri: &Url,
        instance: &Arc<InstanceRecord>,
    ) -> Option<Self::Endpoint>;

    /// 默认：`ws`/`wss` 协议，或查询参数 `websocketEnabled=true`
    fn supports_websocket(&self, uri: &Url) -> bool {
        matches!(uri.scheme(), "ws" | "wss")
            || uri
                .query_pairs()
                .any(|(key, value)| key == WEBSOCKET_ENABLED_PARAM && value == "true")
    }
}

/// 默认 endpoint 构造
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEndpointFactory;

impl EndpointFactory for DefaultEndpointFactory {
    type Endpoint = Endpoint;

    fn create_endpoint(
        &self,
        transport: &str,
        uri: &Url,
        instance: &Arc<InstanceRecord>,
    ) -> Option<Endpoint> {
        Some(Endpoint {
            transport: transport.to_string(),
            uri: uri.clone(),
            instance: instance.clone(),
        })
    }
}

/// Endpoint 转换过滤器
#[derive(Debug, Clone, Default)]
pub struct EndpointDiscoveryFilter<F = DefaultEndpointFactory> {
    factory: F,
}

impl<F: EndpointFactory> EndpointDiscoveryFilter<F> {
    pub fn new(factory: F) -> Self {
        Self { factory }
    }

    fn init_children(&self, parent: &Arc<DiscoveryTreeNode>) {
        let mut all = Vec::new();
        let mut websocket = Vec::new();
        let mut by_transport: HashMap<String, Vec<F::Endpoint>> = HashMap::new();

        for instance in instance_list(parent).iter() {
            for raw in instance.endpoints() {
                let uri = match Url::parse(raw) {
                    Ok(uri) => uri,
                    Err(e) => {
                        warn!(
                            instance_id = %instance.instance_id(),
                            endpoint = %raw,
                            error = %e,
                            "Unrecognized endpoint, skipped"
                        );
                        continue;
                    }
                };

                let transport = uri.scheme();
                let Some(endpoint) = self.factory.create_endpoint(transport, &uri, instance) else {
                    debug!(
                        instance_id = %instance.instance_id(),
                        transport = %transport,
                        "Transport not deployed, endpoint skipped"
                    );
                    continue;
                };

                if self.factory.supports_websocket(&uri) {
                    websocket.push(endpoint.clone());
                }
                by_transport
                    .entry(transport.to_string())
                    .or_default()
                    .push(endpoint.clone());
                all.push(endpoint);
            }
        }

        for (transport, endpoints) in by_transport {
            parent.child_or_create(&transport, |node| node.set_data(endpoints));
        }
        parent.child_or_create(WEBSOCKET_TRANSPORT, |node| node.set_data(websocket));
        parent.child_or_create(ALL_TRANSPORTS, |node| node.set_data(all));
    }
}

impl<F: EndpointFactory> DiscoveryFilter for EndpointDiscoveryFilter<F> {
    fn order(&self) -> i32 {
        ENDPOINT_FILTER_ORDER
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

        // 未知协议得到空节点
        let transport = context.transport();
        Some(parent.child_or_create(transport, |node| {
            node.set_data(Vec::<F::Endpoint>::new());
        }))
    }
}
