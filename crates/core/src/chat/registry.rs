//! Registry of chat sources.
//!
//! ChatSources owns one [`ChatEngine`] per configured source, keyed by the
//! source id. Removing a source drops its message log.

use super::engine::ChatEngine;
use super::errors::ChatError;
use crate::events::EventSink;
use crate::session::{core_count, InferenceBackend};
use lc_protocol::settings_models::ChatSourceSettings;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// All configured chat sources and their engines.
pub struct ChatSources {
    backend: Arc<dyn InferenceBackend>,
    core_count: usize,
    engines: HashMap<String, ChatEngine>,
    order: Vec<String>,
    events: EventSink,
}

impl ChatSources {
    pub fn new(backend: Arc<dyn InferenceBackend>, events: EventSink) -> Self {
        Self::with_core_count(backend, core_count(), events)
    }

    /// Create a registry that derives thread counts for `core_count` cores.
    pub fn with_core_count(
        backend: Arc<dyn InferenceBackend>,
        core_count: usize,
        events: EventSink,
    ) -> Self {
        Self {
            backend,
            core_count,
            engines: HashMap::new(),
            order: Vec::new(),
            events,
        }
    }

    /// Register every source in `settings`, in order.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::DuplicateSource`] if two entries share an id.
    pub fn load(&mut self, settings: Vec<ChatSourceSettings>) -> Result<(), ChatError> {
        for source in settings {
            self.add(source)?;
        }
        Ok(())
    }

    /// Register a new chat source.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::DuplicateSource`] if the id is taken.
    pub fn add(&mut self, settings: ChatSourceSettings) -> Result<ChatEngine, ChatError> {
        if self.engines.contains_key(&settings.id) {
            return Err(ChatError::DuplicateSource(settings.id));
        }

        info!(source = %settings.id, model = %settings.model_path.display(), "Adding chat source");
        let id = settings.id.clone();
        let engine = ChatEngine::new(
            settings,
            Arc::clone(&self.backend),
            self.core_count,
            self.events.clone(),
        );
        self.engines.insert(id.clone(), engine.clone());
        self.order.push(id);
        Ok(engine)
    }

    /// Remove a chat source, cancelling its pending reply and dropping its
    /// message log.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::UnknownSource`] if no source has the id.
    pub fn remove(&mut self, id: &str) -> Result<(), ChatError> {
        let engine = self
            .engines
            .remove(id)
            .ok_or_else(|| ChatError::UnknownSource(id.to_string()))?;
        self.order.retain(|existing| existing != id);
        engine.cancel_reply();
        info!(source = %id, "Removed chat source");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&ChatEngine> {
        self.engines.get(id)
    }

    /// Engines in the order their sources were added.
    pub fn engines(&self) -> impl Iterator<Item = &ChatEngine> {
        self.order.iter().filter_map(|id| self.engines.get(id))
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Replace a source's settings.
    ///
    /// Returns whether the source's session was recreated.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::UnknownSource`] if no source has the id.
    pub async fn update(&self, settings: ChatSourceSettings) -> Result<bool, ChatError> {
        let engine = self
            .engines
            .get(&settings.id)
            .ok_or_else(|| ChatError::UnknownSource(settings.id.clone()))?;
        Ok(engine.update_settings(settings).await)
    }

    /// Point a source at a freshly converted model file.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::UnknownSource`] if no source has the id.
    pub async fn install_converted_model(
        &self,
        id: &str,
        model_path: impl Into<PathBuf>,
    ) -> Result<bool, ChatError> {
        let engine = self
            .engines
            .get(id)
            .ok_or_else(|| ChatError::UnknownSource(id.to_string()))?;
        let mut settings = engine.settings().await;
        settings.model_path = model_path.into();
        Ok(engine.update_settings(settings).await)
    }

    /// Current settings of every source, for persisting.
    pub async fn settings(&self) -> Vec<ChatSourceSettings> {
        let mut settings = Vec::with_capacity(self.engines.len());
        for engine in self.engines() {
            settings.push(engine.settings().await);
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MockBackend;
    use lc_protocol::message_models::Sender;
    use lc_protocol::session_models::ModelKind;

    fn sources() -> ChatSources {
        ChatSources::with_core_count(
            Arc::new(MockBackend::new(["ok"])),
            8,
            EventSink::disabled(),
        )
    }

    fn alpaca() -> ChatSourceSettings {
        ChatSourceSettings::new("alpaca", "Alpaca", ModelKind::Llama, "/models/alpaca.bin")
    }

    #[tokio::test]
    async fn test_add_and_remove() {
        let mut sources = sources();
        sources.add(alpaca()).unwrap();
        sources
            .add(ChatSourceSettings::new("gptj", "GPT-J", ModelKind::Gptj, "/models/gptj.bin"))
            .unwrap();

        assert!(matches!(sources.add(alpaca()), Err(ChatError::DuplicateSource(_))));
        let ids: Vec<_> = sources.engines().map(|e| e.source_id().to_string()).collect();
        assert_eq!(ids, vec!["alpaca", "gptj"]);

        sources.remove("alpaca").unwrap();
        assert!(sources.get("alpaca").is_none());
        assert_eq!(sources.len(), 1);
        assert!(matches!(sources.remove("alpaca"), Err(ChatError::UnknownSource(_))));
    }

    #[tokio::test]
    async fn test_removed_source_starts_with_empty_log() {
        let mut sources = sources();
        let engine = sources.add(alpaca()).unwrap();
        engine.send(Sender::Me, "Hi").await.unwrap();
        engine.wait_until_idle().await;

        sources.remove("alpaca").unwrap();
        let engine = sources.add(alpaca()).unwrap();

        assert!(engine.messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_install_converted_model() {
        let mut sources = sources();
        sources.add(alpaca()).unwrap();

        sources
            .install_converted_model("alpaca", "/models/out/ggml-model-q4_0.bin")
            .await
            .unwrap();

        let settings = sources.settings().await;
        assert_eq!(
            settings[0].model_path,
            PathBuf::from("/models/out/ggml-model-q4_0.bin")
        );
        assert!(matches!(
            sources.install_converted_model("missing", "/x.bin").await,
            Err(ChatError::UnknownSource(_))
        ));
    }
}
