//! Target Adapter - 批处理提交目标实现

mod http_job_target;

pub use http_job_target::HttpJobTarget;
