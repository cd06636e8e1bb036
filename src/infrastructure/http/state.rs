//! Application State
//!
//! 队列服务和调度器各自持有自己的状态，通过 axum State 注入

use std::sync::Arc;

use crate::infrastructure::dispatcher::Dispatcher;
use crate::infrastructure::queue::JobQueue;

use super::dto::RequestDefaults;

/// 队列服务状态
pub struct QueueState {
    pub queue: Arc<JobQueue>,
    pub defaults: RequestDefaults,
}

impl QueueState {
    pub fn new(queue: Arc<JobQueue>, defaults: RequestDefaults) -> Self {
        Self { queue, defaults }
    }
}

/// 调度器状态
pub struct DispatcherState {
    pub dispatcher: Arc<Dispatcher>,
}

impl DispatcherState {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}
