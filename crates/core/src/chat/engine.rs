//! Per-source chat engine.
//!
//! A [`ChatEngine`] owns the message log of one chat source and the
//! inference session behind it. Outgoing messages are sequenced by the
//! reply-state gate:
//!
//! ```text
//! None --send(me)--> WaitingToRespond --first token--> Responding
//!   ^                       |                               |
//!   +-------- finished / cancelled / error -----------------+
//! ```

use super::errors::{backend_error_message, session_error_message, ChatError};
use crate::events::EventSink;
use crate::session::{
    EffectiveParameters, InferenceBackend, InferenceSession, Prediction, PredictionEvent,
};
use lc_protocol::ipc::Event;
use lc_protocol::message_models::{
    ClearedContextMarker, GeneratedMessage, GenerationState, Message, ReplyState, Sender,
    StaticMessage,
};
use lc_protocol::session_models::ContextSnapshot;
use lc_protocol::settings_models::ChatSourceSettings;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{watch, Mutex};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Ids of the records appended by [`ChatEngine::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentMessage {
    pub message_id: Uuid,

    /// The pending reply, when the message was sent by the user.
    pub reply_id: Option<Uuid>,
}

struct SessionSlot {
    settings: ChatSourceSettings,
    session: Option<InferenceSession>,
}

struct EngineInner {
    source_id: String,
    backend: Arc<dyn InferenceBackend>,
    core_count: usize,
    slot: Mutex<SessionSlot>,
    log: Mutex<Vec<Message>>,
    reply_state: watch::Sender<ReplyState>,

    /// In-flight replies by generated message id.
    replies: StdMutex<HashMap<Uuid, CancellationToken>>,
    events: EventSink,
}

/// Conversation state and reply sequencing for one chat source.
///
/// Cloning is cheap; clones share the same log and session.
#[derive(Clone)]
pub struct ChatEngine {
    inner: Arc<EngineInner>,
}

impl ChatEngine {
    /// Create an engine with an empty log. The session is created on first
    /// use.
    ///
    /// # Arguments
    ///
    /// * `settings` - The chat source's model and parameters
    /// * `backend` - Engine that loads and runs the model
    /// * `core_count` - Logical cores used to derive the thread count
    /// * `events` - Receives message, reply-state and session events
    pub fn new(
        settings: ChatSourceSettings,
        backend: Arc<dyn InferenceBackend>,
        core_count: usize,
        events: EventSink,
    ) -> Self {
        let (reply_state, _) = watch::channel(ReplyState::None);
        Self {
            inner: Arc::new(EngineInner {
                source_id: settings.id.clone(),
                backend,
                core_count,
                slot: Mutex::new(SessionSlot {
                    settings,
                    session: None,
                }),
                log: Mutex::new(Vec::new()),
                reply_state,
                replies: StdMutex::new(HashMap::new()),
                events,
            }),
        }
    }

    pub fn source_id(&self) -> &str {
        &self.inner.source_id
    }

    pub async fn settings(&self) -> ChatSourceSettings {
        self.inner.slot.lock().await.settings.clone()
    }

    pub fn reply_state(&self) -> ReplyState {
        *self.inner.reply_state.borrow()
    }

    /// Watch the reply-state gate.
    pub fn subscribe_reply_state(&self) -> watch::Receiver<ReplyState> {
        self.inner.reply_state.subscribe()
    }

    /// Whether the composer may send a message now.
    pub fn allowed_to_compose(&self) -> bool {
        self.reply_state() == ReplyState::None
    }

    /// Wait until no reply is pending.
    pub async fn wait_until_idle(&self) {
        let mut reply_state = self.inner.reply_state.subscribe();
        // The sender lives as long as `self`.
        let _ = reply_state.wait_for(|state| *state == ReplyState::None).await;
    }

    /// A snapshot of the message log, oldest first.
    pub async fn messages(&self) -> Vec<Message> {
        self.inner.log.lock().await.clone()
    }

    /// Append a message and, if the user sent it, start a reply.
    ///
    /// The reply streams into a pending generated message in the
    /// background; use [`wait_until_idle`](Self::wait_until_idle) or the
    /// event sink to follow it.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Busy`] if the user sends while a reply is still
    /// pending. Nothing is appended in that case.
    pub async fn send(
        &self,
        sender: Sender,
        content: impl Into<String>,
    ) -> Result<SentMessage, ChatError> {
        let content = content.into();

        if sender == Sender::Me {
            let claimed = self.inner.reply_state.send_if_modified(|state| {
                if *state == ReplyState::None {
                    *state = ReplyState::WaitingToRespond;
                    true
                } else {
                    false
                }
            });
            if !claimed {
                return Err(ChatError::Busy);
            }
            self.inner.emit_reply_state(ReplyState::WaitingToRespond);
        }

        let message = StaticMessage::new(sender, content.clone());
        let message_id = message.id;
        self.inner.append(Message::Static(message)).await;

        if sender != Sender::Me {
            return Ok(SentMessage {
                message_id,
                reply_id: None,
            });
        }

        let reply = GeneratedMessage::pending();
        let reply_id = reply.id;
        self.inner.append(Message::Generated(reply)).await;

        let cancel = CancellationToken::new();
        match self.inner.replies.lock() {
            Ok(mut replies) => replies.insert(reply_id, cancel.clone()),
            Err(poisoned) => poisoned.into_inner().insert(reply_id, cancel.clone()),
        };

        tokio::spawn(respond(Arc::clone(&self.inner), reply_id, content, cancel));

        Ok(SentMessage {
            message_id,
            reply_id: Some(reply_id),
        })
    }

    /// Cancel the pending reply, if any. Safe to call repeatedly.
    pub fn cancel_reply(&self) {
        let replies = match self.inner.replies.lock() {
            Ok(replies) => replies,
            Err(poisoned) => poisoned.into_inner(),
        };
        for (reply_id, cancel) in replies.iter() {
            debug!(source = %self.inner.source_id, reply = %reply_id, "Cancelling reply");
            cancel.cancel();
        }
    }

    /// Record a context reset and ask the session to discard its context.
    ///
    /// The marker is always appended. A reply in flight is left to finish;
    /// the session applies the reset before the next turn. A failed reset
    /// is logged and does not undo the marker.
    pub async fn clear_context(&self) {
        self.inner
            .append(Message::ClearedContext(ClearedContextMarker::new()))
            .await;
        self.inner.events.emit(Event::ContextCleared {
            source_id: self.inner.source_id.clone(),
        });

        let session = self.inner.slot.lock().await.session.clone();
        if let Some(session) = session {
            if let Err(e) = session.reset_context().await {
                warn!(source = %self.inner.source_id, error = %e, "Failed to reset context");
            }
        }
    }

    /// The session's context, for debugging display.
    pub async fn current_context(&self) -> Option<ContextSnapshot> {
        let session = self.inner.slot.lock().await.session.clone();
        match session {
            Some(session) => session.current_context().await,
            None => None,
        }
    }

    /// Replace the chat source's settings.
    ///
    /// When the model path, kind or parameters change, the pending reply is
    /// cancelled and the session is dropped so the next message loads the
    /// new model.
    ///
    /// Returns whether the session was recreated.
    pub async fn update_settings(&self, settings: ChatSourceSettings) -> bool {
        let mut slot = self.inner.slot.lock().await;
        let model_changed = slot.settings.model_identity() != settings.model_identity()
            || slot.settings.parameters != settings.parameters;
        slot.settings = settings;

        if model_changed && slot.session.take().is_some() {
            info!(source = %self.inner.source_id, "Model settings changed, recreating session");
            drop(slot);
            self.cancel_reply();
            return true;
        }
        false
    }
}

impl std::fmt::Debug for ChatEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatEngine")
            .field("source_id", &self.inner.source_id)
            .field("reply_state", &*self.inner.reply_state.borrow())
            .finish_non_exhaustive()
    }
}

impl EngineInner {
    fn emit_reply_state(&self, state: ReplyState) {
        debug!(source = %self.source_id, state = ?state, "Reply state change");
        self.events.emit(Event::ReplyStateChanged {
            source_id: self.source_id.clone(),
            state,
        });
    }

    fn set_reply_state(&self, state: ReplyState) {
        if self.reply_state.send_replace(state) != state {
            self.emit_reply_state(state);
        }
    }

    async fn append(&self, message: Message) {
        self.log.lock().await.push(message.clone());
        self.events.emit(Event::MessageAppended {
            source_id: self.source_id.clone(),
            message,
        });
    }

    /// Apply `update` to a generated message and emit its new content.
    async fn update_reply<F>(&self, reply_id: Uuid, update: F)
    where
        F: FnOnce(&mut GeneratedMessage),
    {
        let mut log = self.log.lock().await;
        let reply = log.iter_mut().rev().find_map(|message| match message {
            Message::Generated(reply) if reply.id == reply_id => Some(reply),
            _ => None,
        });

        let Some(reply) = reply else {
            warn!(source = %self.source_id, reply = %reply_id, "Reply is no longer in the log");
            return;
        };
        if reply.state.is_terminal() {
            return;
        }

        update(reply);
        self.events.emit(Event::MessageUpdated {
            source_id: self.source_id.clone(),
            message_id: reply_id,
            content: reply.content.clone(),
            state: reply.state,
            is_error: reply.is_error,
        });
    }

    async fn finish_reply(&self, reply_id: Uuid, state: GenerationState, error: Option<&str>) {
        self.update_reply(reply_id, |reply| {
            reply.state = state;
            if let Some(message) = error {
                reply.is_error = true;
                reply.content = message.to_string();
            }
        })
        .await;

        match self.replies.lock() {
            Ok(mut replies) => replies.remove(&reply_id),
            Err(poisoned) => poisoned.into_inner().remove(&reply_id),
        };
        self.set_reply_state(ReplyState::None);
    }

    /// The current session, created if absent or after a failed load.
    async fn session(&self) -> InferenceSession {
        let mut slot = self.slot.lock().await;
        if let Some(session) = &slot.session {
            if !session.state().is_error() {
                return session.clone();
            }
            info!(source = %self.source_id, "Recreating session after failed load");
        }

        let params = EffectiveParameters::derive(&slot.settings.parameters, self.core_count);
        let session = InferenceSession::new(
            Arc::clone(&self.backend),
            slot.settings.model_identity(),
            params,
            self.events.clone(),
        );
        slot.session = Some(session.clone());
        session
    }
}

/// Drive one reply from prediction start to its terminal state.
async fn respond(inner: Arc<EngineInner>, reply_id: Uuid, prompt: String, cancel: CancellationToken) {
    let session = inner.session().await;

    let Prediction { handle, mut events } = match session.predict(prompt).await {
        Ok(prediction) => prediction,
        Err(e) => {
            warn!(source = %inner.source_id, error = %e, "Failed to start prediction");
            inner
                .finish_reply(reply_id, GenerationState::Error, Some(session_error_message(&e)))
                .await;
            return;
        }
    };

    let mut first_token = true;
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled(), if !handle.is_cancelled() => {
                handle.cancel();
                continue;
            }
            event = events.next() => event,
        };

        match event {
            Some(PredictionEvent::Token(text)) => {
                let text = if first_token {
                    first_token = false;
                    inner.set_reply_state(ReplyState::Responding);
                    text.trim_start().to_string()
                } else {
                    text
                };
                inner
                    .update_reply(reply_id, |reply| {
                        reply.state = GenerationState::Generating;
                        reply.content.push_str(&text);
                    })
                    .await;
            }
            Some(PredictionEvent::Finished) | None => {
                inner
                    .finish_reply(reply_id, GenerationState::Finished, None)
                    .await;
                break;
            }
            Some(PredictionEvent::Cancelled) => {
                inner
                    .finish_reply(reply_id, GenerationState::Cancelled, None)
                    .await;
                break;
            }
            Some(PredictionEvent::Error(e)) => {
                inner
                    .finish_reply(reply_id, GenerationState::Error, Some(backend_error_message(&e)))
                    .await;
                break;
            }
        }
    }
}
