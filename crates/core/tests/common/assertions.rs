//! Custom assertion helpers over emitted events.

use lc_protocol::ipc::Event;
use lc_protocol::pipeline_models::PipelineState;
use lc_protocol::step_models::StepState;
use tokio::sync::mpsc::UnboundedReceiver;

/// Drain every event already delivered to the receiver.
#[allow(dead_code)]
pub fn drain_events(rx: &mut UnboundedReceiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// The step state changes in emission order, as `(index, state)` pairs.
#[allow(dead_code)]
pub fn step_transitions(events: &[Event]) -> Vec<(usize, StepState)> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::StepStateChanged {
                step_index, state, ..
            } => Some((*step_index, state.clone())),
            _ => None,
        })
        .collect()
}

/// The pipeline state changes in emission order.
#[allow(dead_code)]
pub fn pipeline_transitions(events: &[Event]) -> Vec<PipelineState> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::PipelineStateChanged { state, .. } => Some(*state),
            _ => None,
        })
        .collect()
}

/// Assert that no step started before the previous one reached a terminal
/// state.
#[allow(dead_code)]
pub fn assert_sequential(events: &[Event]) {
    let mut running: Option<usize> = None;
    let mut last_terminal: Option<usize> = None;

    for (index, state) in step_transitions(events) {
        match state {
            StepState::Running => {
                assert!(running.is_none(), "step {index} started while another was running");
                if let Some(previous) = last_terminal {
                    assert_eq!(index, previous + 1, "steps must start in order");
                } else {
                    assert_eq!(index, 0, "the first step to run must be step 0");
                }
                running = Some(index);
            }
            state if state.is_terminal() => {
                if running == Some(index) {
                    running = None;
                }
                last_terminal = Some(index);
            }
            _ => {}
        }
    }

    assert!(running.is_none(), "a step was left running");
}
