//! Synthesizer Adapters - 推理资源实现

mod fake_synthesizer;
mod http_synthesizer;

pub use fake_synthesizer::{silent_wav, FakeSynthesizer, FakeSynthesizerConfig};
pub use http_synthesizer::{HttpSynthesizer, HttpSynthesizerConfig};
