//! Exclusive Synthesizer - 推理资源互斥包装
//!
//! 同一时刻只允许一个任务进入推理资源

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::application::ports::{SynthesisError, SynthesisRequest, SynthesizerPort};
use crate::domain::SynthesizedAudio;

/// 独占推理资源
#[derive(Clone)]
pub struct ExclusiveSynthesizer {
    inner: Arc<dyn SynthesizerPort>,
    lock: Arc<Mutex<()>>,
}

impl ExclusiveSynthesizer {
    pub fn new(inner: Arc<dyn SynthesizerPort>) -> Self {
        Self {
            inner,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// 持锁执行推理
    pub async fn synthesize(
        &self,
        request: SynthesisRequest,
    ) -> Result<SynthesizedAudio, SynthesisError> {
        let _guard = self.lock.lock().await;
        self.inner.synthesize(request).await
    }
}
