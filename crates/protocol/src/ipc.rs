//! Event protocol between the core and its observers.
//!
//! Every stateful entity in the core (step, pipeline, session, message log)
//! reports its changes as an [`Event`]. Events for one entity are delivered
//! on a single ordered channel, so an observer sees them in emission order.
//!
//! Uses tagged enum serialization for TypeScript compatibility:
//! ```json
//! {
//!   "type": "stepStateChanged",
//!   "payload": {
//!     "pipeline_id": "uuid-here",
//!     "step_index": 1,
//!     "state": { "type": "running" }
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::message_models::{GenerationState, Message, ReplyState};
use crate::pipeline_models::PipelineState;
use crate::session_models::SessionState;
use crate::step_models::{OutputStream, StepState};

/// Events sent from the core to observers.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Event {
    /// A pipeline changed lifecycle state.
    PipelineStateChanged {
        #[ts(type = "string")]
        pipeline_id: Uuid,
        state: PipelineState,
    },

    /// A pipeline step changed lifecycle state.
    StepStateChanged {
        #[ts(type = "string")]
        pipeline_id: Uuid,
        step_index: usize,
        state: StepState,
    },

    /// A pipeline step wrote a line to one of its output sinks.
    StepOutput {
        #[ts(type = "string")]
        pipeline_id: Uuid,
        step_index: usize,
        stream: OutputStream,
        content: String,
    },

    /// An inference session changed lifecycle state.
    SessionStateChanged {
        #[ts(type = "string")]
        session_id: Uuid,
        state: SessionState,
    },

    /// A message was appended to a chat source's log.
    MessageAppended { source_id: String, message: Message },

    /// A generated message received tokens or changed generation state.
    MessageUpdated {
        source_id: String,
        #[ts(type = "string")]
        message_id: Uuid,
        content: String,
        state: GenerationState,
        is_error: bool,
    },

    /// A chat source's reply-state gate changed.
    ReplyStateChanged {
        source_id: String,
        state: ReplyState,
    },

    /// A chat source's model context was reset.
    ContextCleared { source_id: String },
}
