//! HTTP Layer - 队列服务与调度器的对外接口

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use dto::RequestDefaults;
pub use error::ApiError;
pub use routes::{dispatcher_routes, queue_routes};
pub use server::{HttpServer, ServerConfig};
pub use state::{DispatcherState, QueueState};
