//! HTTP Handlers

mod health;
mod proxy;
mod tts;

pub use health::*;
pub use proxy::*;
pub use tts::*;
