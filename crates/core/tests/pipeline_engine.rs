//! Integration tests for conversion pipelines.
//!
//! These tests verify that a Pipeline:
//! - Runs its steps strictly one after another
//! - Skips every later step once a step fails or is skipped
//! - Emits step and pipeline events in order
//! - Rebuilds its steps on restart

mod common;

use common::*;
use lc_core::conversion::{Pipeline, Step};
use lc_core::events::EventSink;
use lc_protocol::pipeline_models::PipelineState;
use lc_protocol::step_models::{StepOutcome, StepState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn test_steps_run_sequentially() {
    // Given: a five-step pipeline whose executors record overlap
    let probe = ConcurrencyProbe::default();
    let builder_probe = probe.clone();
    let (events, mut rx) = EventSink::channel();
    let mut pipeline = Pipeline::new(
        move || {
            (0..5)
                .map(|i| {
                    Step::new(
                        format!("step {i}"),
                        ScriptedExecutor::new(&format!("tool{i}"), 0, &builder_probe),
                    )
                })
                .collect()
        },
        events,
    );

    // When: the pipeline runs
    let success = pipeline.run().await.unwrap();

    // Then: every step ran, never two at a time, in order
    assert!(success);
    assert_eq!(probe.runs(), 5);
    assert_eq!(probe.max_active(), 1);

    let events = drain_events(&mut rx);
    assert_sequential(&events);
    assert_eq!(
        pipeline_transitions(&events),
        vec![PipelineState::Running, PipelineState::Finished { success: true }]
    );
}

#[tokio::test]
async fn test_failure_skips_remaining_steps() {
    // Given: three steps where the first exits with 1
    let probe = ConcurrencyProbe::default();
    let builder_probe = probe.clone();
    let mut pipeline = Pipeline::new(
        move || {
            vec![
                Step::new("convert", ScriptedExecutor::new("convert", 1, &builder_probe)),
                Step::new("quantize", ScriptedExecutor::new("quantize", 0, &builder_probe)),
                Step::new("cleanup", ScriptedExecutor::new("cleanup", 0, &builder_probe)),
            ]
        },
        EventSink::disabled(),
    );

    // When: the pipeline runs
    let success = pipeline.run().await.unwrap();

    // Then: the later steps are skipped without running
    assert!(!success);
    assert_eq!(pipeline.state(), PipelineState::Finished { success: false });
    assert_eq!(
        pipeline.steps()[0].state(),
        &StepState::Finished(StepOutcome::Failure { exit_code: 1 })
    );
    assert_eq!(pipeline.steps()[1].state(), &StepState::Skipped);
    assert_eq!(pipeline.steps()[2].state(), &StepState::Skipped);
    assert_eq!(probe.runs(), 1);
}

#[tokio::test]
async fn test_handler_error_skips_remaining_steps() {
    // Given: a middle step whose handler errors
    let mut pipeline = Pipeline::new(
        || {
            let probe = ConcurrencyProbe::default();
            vec![
                Step::new("check", ScriptedExecutor::new("check", 0, &probe)),
                Step::new(
                    "convert",
                    FailingExecutor {
                        message: "torch is not installed".to_string(),
                    },
                ),
                Step::new("quantize", ScriptedExecutor::new("quantize", 0, &probe)),
            ]
        },
        EventSink::disabled(),
    );

    // When: the pipeline runs
    assert!(!pipeline.run().await.unwrap());

    // Then: the error is recorded on the failing step and later steps skip
    assert_eq!(
        pipeline.steps()[1].state(),
        &StepState::Finished(StepOutcome::HandlerError {
            message: "torch is not installed".to_string()
        })
    );
    assert_eq!(pipeline.steps()[2].state(), &StepState::Skipped);
}

#[tokio::test]
async fn test_restart_rebuilds_fresh_steps() {
    // Given: a pipeline that fails on its first run and succeeds after
    let builds = Arc::new(AtomicUsize::new(0));
    let builder_builds = Arc::clone(&builds);
    let probe = ConcurrencyProbe::default();
    let builder_probe = probe.clone();
    let mut pipeline = Pipeline::new(
        move || {
            let build = builder_builds.fetch_add(1, Ordering::SeqCst);
            let exit_code = if build == 0 { 2 } else { 0 };
            vec![
                Step::new("convert", ScriptedExecutor::new("convert", exit_code, &builder_probe)),
                Step::new("quantize", ScriptedExecutor::new("quantize", 0, &builder_probe)),
            ]
        },
        EventSink::disabled(),
    );
    assert!(!pipeline.run().await.unwrap());

    // When: the pipeline is reset
    pipeline.reset().unwrap();

    // Then: every step is NotStarted again
    assert_eq!(pipeline.state(), PipelineState::NotRunning);
    assert!(pipeline
        .steps()
        .iter()
        .all(|step| *step.state() == StepState::NotStarted && step.output().is_empty()));

    // And: the rerun is independent of the first run's history
    assert!(pipeline.run().await.unwrap());
    assert_eq!(builds.load(Ordering::SeqCst), 2);
    assert_eq!(probe.runs(), 3);
}

#[tokio::test]
async fn test_step_output_is_emitted_in_order() {
    // Given: a single scripted step bound to a pipeline
    let probe = ConcurrencyProbe::default();
    let (events, mut rx) = EventSink::channel();
    let mut pipeline = Pipeline::new(
        move || vec![Step::new("convert", ScriptedExecutor::new("convert", 0, &probe))],
        events,
    );

    // When: it runs
    pipeline.run().await.unwrap();

    // Then: output lines arrive between Running and Finished
    let events = drain_events(&mut rx);
    let kinds: Vec<&str> = events
        .iter()
        .map(|event| match event {
            lc_protocol::ipc::Event::PipelineStateChanged { .. } => "pipeline",
            lc_protocol::ipc::Event::StepStateChanged { .. } => "step",
            lc_protocol::ipc::Event::StepOutput { .. } => "output",
            _ => "other",
        })
        .collect();
    assert_eq!(
        kinds,
        vec!["pipeline", "step", "output", "output", "step", "pipeline"]
    );
}
