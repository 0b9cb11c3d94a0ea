//! Scripted inference backend for tests and demos.
//!
//! Replays a fixed list of tokens for every prompt. Load failures, mid-stream
//! failures, load and per-token delays, and context support are configurable.

use super::backend::{InferenceBackend, ModelHandle, TokenStream};
use super::error::BackendError;
use super::params::EffectiveParameters;
use async_trait::async_trait;
use lc_protocol::session_models::{ContextSnapshot, ModelIdentity};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct MockStats {
    next_handle: AtomicU64,
    loads: AtomicUsize,
    resets: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    context: Mutex<Vec<String>>,
}

/// Backend that streams scripted tokens.
///
/// Clones share their call counters, so a test can keep one clone and hand
/// another to a session.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    tokens: Vec<String>,
    token_delay: Duration,
    load_delay: Duration,
    load_failure: Option<String>,
    fail_after: Option<usize>,
    context_support: bool,
    stats: Arc<MockStats>,
}

impl MockBackend {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Wait this long before each token.
    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = delay;
        self
    }

    /// Take this long to load the model.
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Fail every model load with `reason`.
    pub fn failing_load(mut self, reason: impl Into<String>) -> Self {
        self.load_failure = Some(reason.into());
        self
    }

    /// Fail each prediction after yielding `count` tokens.
    pub fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Support context introspection and in-place reset.
    pub fn with_context_support(mut self) -> Self {
        self.context_support = true;
        self
    }

    pub fn load_count(&self) -> usize {
        self.stats.loads.load(Ordering::SeqCst)
    }

    pub fn reset_count(&self) -> usize {
        self.stats.resets.load(Ordering::SeqCst)
    }

    /// Every prompt received, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.stats.prompts).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl InferenceBackend for MockBackend {
    async fn load_model(
        &self,
        model: &ModelIdentity,
        _params: &EffectiveParameters,
    ) -> Result<ModelHandle, BackendError> {
        self.stats.loads.fetch_add(1, Ordering::SeqCst);
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        if let Some(reason) = &self.load_failure {
            return Err(BackendError::LoadFailed {
                path: model.path.clone(),
                reason: reason.clone(),
            });
        }
        lock(&self.stats.context).clear();
        Ok(ModelHandle::new(
            self.stats.next_handle.fetch_add(1, Ordering::SeqCst),
        ))
    }

    async fn predict(
        &self,
        _handle: &ModelHandle,
        prompt: &str,
        cancel: CancellationToken,
    ) -> Result<TokenStream, BackendError> {
        lock(&self.stats.prompts).push(prompt.to_string());
        lock(&self.stats.context).push(prompt.to_string());

        let tokens = self.tokens.clone();
        let delay = self.token_delay;
        let fail_after = self.fail_after;
        let stats = Arc::clone(&self.stats);

        Ok(Box::pin(async_stream::stream! {
            for (index, token) in tokens.into_iter().enumerate() {
                if fail_after == Some(index) {
                    yield Err(BackendError::PredictionFailed("scripted failure".to_string()));
                    break;
                }

                if !delay.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                if cancel.is_cancelled() {
                    break;
                }

                lock(&stats.context).push(token.clone());
                yield Ok(token);
            }
        }))
    }

    async fn current_context(
        &self,
        _handle: &ModelHandle,
    ) -> Result<Option<ContextSnapshot>, BackendError> {
        if !self.context_support {
            return Ok(None);
        }
        let context = lock(&self.stats.context);
        Ok(Some(ContextSnapshot {
            tokens: (0..context.len() as i32).collect(),
            rendered: context.concat(),
        }))
    }

    async fn reset_context(&self, _handle: &ModelHandle) -> Result<(), BackendError> {
        if !self.context_support {
            return Err(BackendError::Unsupported);
        }
        self.stats.resets.fetch_add(1, Ordering::SeqCst);
        lock(&self.stats.context).clear();
        Ok(())
    }
}
