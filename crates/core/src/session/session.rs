//! Inference session state machine.
//!
//! An [`InferenceSession`] wraps one model on a backend:
//!
//! ```text
//! NotStarted -> LoadingModel -> ReadyToPredict <-> Predicting
//!                    |
//!                    +------> Error (terminal)
//! ```
//!
//! A failed prediction only fails the current turn; the session returns to
//! ReadyToPredict.

use super::backend::{InferenceBackend, ModelHandle};
use super::error::{BackendError, SessionError};
use super::params::EffectiveParameters;
use crate::events::EventSink;
use lc_protocol::ipc::Event;
use lc_protocol::session_models::{ContextSnapshot, ModelIdentity, SessionState};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{watch, Mutex};
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One event of a running prediction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredictionEvent {
    /// A chunk of generated text.
    Token(String),

    /// Generation completed.
    Finished,

    /// Generation was cancelled through the handle.
    Cancelled,

    /// Generation failed; the session remains usable.
    Error(BackendError),
}

impl PredictionEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Token(_))
    }
}

/// Prediction events, always ending with exactly one terminal event.
pub type PredictionStream = Pin<Box<dyn Stream<Item = PredictionEvent> + Send>>;

/// Cancels one prediction.
#[derive(Debug, Clone)]
pub struct PredictionHandle {
    token: CancellationToken,
}

impl PredictionHandle {
    /// Stop the prediction. No tokens are delivered afterwards.
    ///
    /// Calling this more than once, or after the prediction finished, has
    /// no effect.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// A started prediction.
pub struct Prediction {
    pub handle: PredictionHandle,
    pub events: PredictionStream,
}

struct SessionInner {
    id: Uuid,
    backend: Arc<dyn InferenceBackend>,
    model: ModelIdentity,
    params: EffectiveParameters,
    state: watch::Sender<SessionState>,

    /// Loaded model. Held across a load so concurrent loads serialize.
    handle: Mutex<Option<ModelHandle>>,
    reset_pending: AtomicBool,
    last_context: StdMutex<Option<ContextSnapshot>>,
    events: EventSink,
}

impl SessionInner {
    fn set_state(&self, state: SessionState) {
        debug!(session = %self.id, to = ?state, "Session state change");
        self.state.send_replace(state.clone());
        self.events.emit(Event::SessionStateChanged {
            session_id: self.id,
            state,
        });
    }

    /// Move from `from` to `to` only if the session is still in `from`.
    fn transition(&self, from: &SessionState, to: SessionState) -> Result<(), SessionState> {
        let mut current = None;
        let changed = self.state.send_if_modified(|state| {
            if *state == *from {
                *state = to.clone();
                true
            } else {
                current = Some(state.clone());
                false
            }
        });

        if changed {
            debug!(session = %self.id, from = ?from, to = ?to, "Session state change");
            self.events.emit(Event::SessionStateChanged {
                session_id: self.id,
                state: to,
            });
            Ok(())
        } else {
            Err(current.unwrap_or_default())
        }
    }
}

/// Returns the session to ReadyToPredict when a prediction ends, including
/// when its event stream is dropped early.
struct PredictingGuard {
    session: Arc<SessionInner>,
    released: bool,
}

impl PredictingGuard {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            // Fails only if a reset or reload already moved the session on.
            let _ = self
                .session
                .transition(&SessionState::Predicting, SessionState::ReadyToPredict);
        }
    }
}

impl Drop for PredictingGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Stateful adapter over one model loaded on an [`InferenceBackend`].
///
/// Cloning is cheap; clones share the same session.
#[derive(Clone)]
pub struct InferenceSession {
    inner: Arc<SessionInner>,
}

impl InferenceSession {
    /// Create a session in the NotStarted state. The model is not loaded
    /// until [`load`](Self::load) or the first prediction.
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        model: ModelIdentity,
        params: EffectiveParameters,
        events: EventSink,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::NotStarted);
        Self {
            inner: Arc::new(SessionInner {
                id: Uuid::new_v4(),
                backend,
                model,
                params,
                state,
                handle: Mutex::new(None),
                reset_pending: AtomicBool::new(false),
                last_context: StdMutex::new(None),
                events,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn model(&self) -> &ModelIdentity {
        &self.inner.model
    }

    pub fn params(&self) -> &EffectiveParameters {
        &self.inner.params
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Watch the session state.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Load the model if it is not loaded yet.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Failed`] if the session is in the Error
    /// state, and the backend error if loading fails. A failed load moves
    /// the session to Error.
    pub async fn load(&self) -> Result<(), SessionError> {
        let mut slot = self.inner.handle.lock().await;
        self.load_locked(&mut slot).await.map(|_| ())
    }

    async fn load_locked(
        &self,
        slot: &mut Option<ModelHandle>,
    ) -> Result<ModelHandle, SessionError> {
        if let SessionState::Error { reason } = self.state() {
            return Err(SessionError::Failed { reason });
        }
        if let Some(loaded) = *slot {
            return Ok(loaded);
        }

        info!(
            session = %self.inner.id,
            model = %self.inner.model.path.display(),
            kind = self.inner.model.kind.name(),
            "Loading model"
        );
        self.inner.set_state(SessionState::LoadingModel);

        match self
            .inner
            .backend
            .load_model(&self.inner.model, &self.inner.params)
            .await
        {
            Ok(loaded) => {
                *slot = Some(loaded);
                self.inner.set_state(SessionState::ReadyToPredict);
                Ok(loaded)
            }
            Err(e) => {
                warn!(session = %self.inner.id, error = %e, "Model load failed");
                self.inner.set_state(SessionState::Error {
                    reason: e.to_string(),
                });
                Err(SessionError::Backend(e))
            }
        }
    }

    /// Start a prediction, loading the model first if needed.
    ///
    /// A context reset requested during the previous prediction is applied
    /// first. Once this returns `Ok`, every outcome of the turn
    /// (completion, cancellation, backend failure) is reported through the
    /// event stream.
    ///
    /// # Errors
    ///
    /// Returns a load error, or [`SessionError::Busy`] if another
    /// prediction is in flight.
    pub async fn predict(&self, prompt: impl Into<String>) -> Result<Prediction, SessionError> {
        // The model lock is held until the session is Predicting, so a
        // concurrent reset cannot unload the model in between.
        let handle = {
            let mut slot = self.inner.handle.lock().await;

            // Only this critical section enters Predicting.
            if self.state() == SessionState::Predicting {
                return Err(SessionError::Busy);
            }
            if self.inner.reset_pending.swap(false, Ordering::SeqCst) {
                if let Err(e) = self.reset_locked(&mut slot).await {
                    warn!(session = %self.inner.id, error = %e, "Deferred context reset failed");
                }
            }

            let loaded = self.load_locked(&mut slot).await?;
            self.inner
                .transition(&SessionState::ReadyToPredict, SessionState::Predicting)
                .map_err(|current| match current {
                    SessionState::Predicting => SessionError::Busy,
                    SessionState::Error { reason } => SessionError::Failed { reason },
                    other => SessionError::InvalidState(other),
                })?;
            loaded
        };

        let cancel = CancellationToken::new();
        let prompt = prompt.into();
        let session = Arc::clone(&self.inner);
        let token = cancel.clone();
        let session_id = self.inner.id;
        let guard = PredictingGuard {
            session: Arc::clone(&session),
            released: false,
        };

        let events = async_stream::stream! {
            let mut guard = guard;

            let started = session.backend.predict(&handle, &prompt, token.clone()).await;
            let mut tokens = match started {
                Ok(tokens) => tokens,
                Err(e) => {
                    warn!(session = %session_id, error = %e, "Prediction failed to start");
                    guard.release();
                    yield PredictionEvent::Error(e);
                    return;
                }
            };

            loop {
                let next = tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    next = tokens.next() => Some(next),
                };

                let terminal = match next {
                    Some(Some(Ok(text))) => {
                        yield PredictionEvent::Token(text);
                        continue;
                    }
                    None => PredictionEvent::Cancelled,
                    Some(None) => PredictionEvent::Finished,
                    Some(Some(Err(e))) => {
                        warn!(session = %session_id, error = %e, "Prediction failed");
                        PredictionEvent::Error(e)
                    }
                };

                debug!(session = %session_id, outcome = ?terminal, "Prediction ended");
                guard.release();
                yield terminal;
                break;
            }
        };

        Ok(Prediction {
            handle: PredictionHandle { token: cancel },
            events: Box::pin(events),
        })
    }

    /// The backend's current context, for debugging display.
    ///
    /// Falls back to the last snapshot read when the backend cannot be
    /// asked. Returns `None` if the backend does not support introspection.
    pub async fn current_context(&self) -> Option<ContextSnapshot> {
        let handle = *self.inner.handle.lock().await;

        if let Some(loaded) = handle {
            match self.inner.backend.current_context(&loaded).await {
                Ok(snapshot) => {
                    self.store_context(snapshot.clone());
                    return snapshot;
                }
                Err(e) => warn!(session = %self.inner.id, error = %e, "Failed to read context"),
            }
        }

        match self.inner.last_context.lock() {
            Ok(last) => last.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Discard the accumulated context.
    ///
    /// Uses the backend's in-place reset when it has one. Otherwise the
    /// model is unloaded and the session returns to NotStarted, so the next
    /// prediction pays for a full reload.
    ///
    /// While a prediction is in flight the reset is deferred: the running
    /// turn completes untouched and the reset is applied before the next
    /// prediction starts.
    ///
    /// # Errors
    ///
    /// Returns any backend error other than an unsupported reset.
    pub async fn reset_context(&self) -> Result<(), SessionError> {
        let mut slot = self.inner.handle.lock().await;

        if self.state() == SessionState::Predicting {
            debug!(session = %self.inner.id, "Prediction in flight, deferring context reset");
            self.inner.reset_pending.store(true, Ordering::SeqCst);
            return Ok(());
        }

        self.inner.reset_pending.store(false, Ordering::SeqCst);
        self.reset_locked(&mut slot).await
    }

    /// Whether a reset is waiting for the current prediction to end.
    pub fn reset_pending(&self) -> bool {
        self.inner.reset_pending.load(Ordering::SeqCst)
    }

    async fn reset_locked(&self, slot: &mut Option<ModelHandle>) -> Result<(), SessionError> {
        let Some(loaded) = *slot else {
            self.store_context(None);
            return Ok(());
        };

        match self.inner.backend.reset_context(&loaded).await {
            Ok(()) => {
                debug!(session = %self.inner.id, "Context reset in place");
            }
            Err(BackendError::Unsupported) => {
                info!(session = %self.inner.id, "Backend cannot reset context, unloading model");
                self.inner.backend.unload(&loaded).await;
                *slot = None;
                self.inner.set_state(SessionState::NotStarted);
            }
            Err(e) => return Err(SessionError::Backend(e)),
        }

        self.store_context(None);
        Ok(())
    }

    fn store_context(&self, snapshot: Option<ContextSnapshot>) {
        match self.inner.last_context.lock() {
            Ok(mut last) => *last = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }
}

impl std::fmt::Debug for InferenceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceSession")
            .field("id", &self.inner.id)
            .field("model", &self.inner.model)
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}
