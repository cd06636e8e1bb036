//! Round-Robin Dispatcher - 多后端轮询调度
//!
//! 位于多个队列服务前面，对客户端隐藏多后端拓扑

mod backend_pool;
mod forwarder;

pub use backend_pool::{BackendPool, BackendTarget, DispatcherStats, SelectedBackend};
pub use forwarder::{
    BackendHealth, Dispatcher, DispatcherConfig, DispatcherHealth, ForwardRequest, ForwardedBody,
    ForwardedResponse,
};
