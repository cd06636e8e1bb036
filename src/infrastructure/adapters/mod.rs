//! Infrastructure Adapters
//!
//! 六边形架构的适配器实现

pub mod storage;
pub mod synth;
pub mod target;

pub use storage::*;
pub use synth::*;
pub use target::*;
