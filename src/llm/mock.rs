//! Scripted in-process provider.
//!
//! Queued replies and errors are consumed in order. Once the queue is empty
//! every call returns the default reply.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{GenerationError, GenerationOptions, GenerationProvider, ModelCapabilities};

#[derive(Debug)]
pub struct MockProvider {
    name: String,
    model: String,
    context_window: usize,
    vision_capable: bool,
    default_reply: String,
    available: AtomicBool,
    script: Mutex<VecDeque<Result<String, GenerationError>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            model: format!("{name}-model"),
            name,
            context_window: 32_768,
            vision_capable: false,
            default_reply: "{}".to_string(),
            available: AtomicBool::new(true),
            script: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn with_context_window(mut self, tokens: usize) -> Self {
        self.context_window = tokens;
        self
    }

    #[must_use]
    pub fn with_vision(mut self) -> Self {
        self.vision_capable = true;
        self
    }

    /// Reply returned once the script is exhausted.
    #[must_use]
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.default_reply = reply.into();
        self
    }

    /// Start out failing liveness probes and every generate call.
    #[must_use]
    pub fn unavailable(self) -> Self {
        self.available.store(false, Ordering::SeqCst);
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Ok(reply.into()));
    }

    /// Queue a backend error carrying `message`.
    pub fn push_error(&self, message: impl Into<String>) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(GenerationError::Backend {
                provider: self.name.clone(),
                message: message.into(),
            }));
    }

    /// Number of `generate` calls received, including failed ones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl GenerationProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> &'static str {
        "mock"
    }

    fn capabilities(&self) -> ModelCapabilities {
        ModelCapabilities {
            model: self.model.clone(),
            context_window_tokens: self.context_window,
            vision_capable: self.vision_capable,
        }
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.to_string());

        if !self.available.load(Ordering::SeqCst) {
            return Err(GenerationError::Unavailable {
                provider: self.name.clone(),
                message: "mock marked unavailable".to_string(),
            });
        }
        if !options.images.is_empty() && !self.vision_capable {
            return Err(GenerationError::VisionUnsupported {
                provider: self.name.clone(),
                model: self.model.clone(),
            });
        }

        let scripted = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        scripted.unwrap_or_else(|| Ok(self.default_reply.clone()))
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}
