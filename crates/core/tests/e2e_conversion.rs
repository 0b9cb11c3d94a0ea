//! E2E tests for the PyTorch to ggml conversion recipe.
//!
//! These run the real recipe against a fake toolchain of shell scripts, so
//! they cover process spawning, output streaming and file handling without
//! needing python or llama.cpp installed.

#![cfg(unix)]

mod common;

use common::*;
use lc_core::conversion::{
    CommandExecutor, ConversionManager, ConversionRecipe, ModelSource, Pipeline, Step,
};
use lc_core::events::EventSink;
use lc_protocol::pipeline_models::PipelineState;
use lc_protocol::step_models::{OutputStream, StepOutcome, StepState};

#[tokio::test]
async fn test_convert_then_quantize_succeeds() {
    // Given: a two-step pipeline of processes that both exit 0
    let (_root, model_dir) = create_model_source().unwrap();
    let intermediate = model_dir.join("ggml-model-f16.bin");
    let output = model_dir.join("ggml-model-q4_0.bin");
    let convert_target = intermediate.display().to_string();
    let quantize_args = (intermediate.clone(), output.clone());

    let mut pipeline = Pipeline::new(
        move || {
            vec![
                Step::new(
                    "Converting to f16",
                    CommandExecutor::new("sh")
                        .arg("-c")
                        .arg(format!("printf f16 > '{convert_target}'")),
                ),
                Step::new(
                    "Quantizing",
                    CommandExecutor::new("cp")
                        .arg(&quantize_args.0)
                        .arg(&quantize_args.1),
                ),
            ]
        },
        EventSink::disabled(),
    );

    // When: the pipeline runs
    let success = pipeline.run().await.unwrap();

    // Then: both steps succeed and the quantized file exists
    assert!(success);
    for step in pipeline.steps() {
        assert_eq!(
            step.state(),
            &StepState::Finished(StepOutcome::Success { exit_code: 0 })
        );
    }
    assert_eq!(pipeline.state(), PipelineState::Finished { success: true });
    assert_eq!(std::fs::read(&output).unwrap(), b"f16");
}

#[tokio::test]
async fn test_recipe_with_fake_toolchain() {
    // Given: a valid model source and a working fake toolchain
    let (root, model_dir) = create_model_source().unwrap();
    let tools = create_fake_toolchain(root.path(), 0).unwrap();
    let source = ModelSource::from_directory(&model_dir).unwrap();
    let out_dir = root.path().join("out");
    let recipe = ConversionRecipe::new(source, &out_dir, tools);
    let output_path = recipe.output_path();
    let intermediate = recipe.intermediate_path();

    // When: the recipe runs through the manager
    let (events, mut rx) = EventSink::channel();
    let manager = ConversionManager::new();
    let id = manager.start(recipe.into_pipeline(events)).await;
    let pipeline = manager.wait(id).await.unwrap();

    // Then: every step succeeded, the model exists and the f16 file is gone
    assert_eq!(pipeline.state(), PipelineState::Finished { success: true });
    assert!(output_path.is_file());
    assert!(!intermediate.exists());

    let version_line = pipeline.steps()[0]
        .output()
        .into_iter()
        .find(|line| line.stream == OutputStream::Stdout && line.content.starts_with("Python"));
    assert!(version_line.is_some());

    let events = drain_events(&mut rx);
    assert_sequential(&events);
}

#[tokio::test]
async fn test_recipe_missing_dependencies_skips_conversion() {
    // Given: a toolchain whose python cannot import torch
    let (root, model_dir) = create_model_source().unwrap();
    let tools = create_fake_toolchain(root.path(), 1).unwrap();
    let source = ModelSource::from_directory(&model_dir).unwrap();
    let recipe = ConversionRecipe::new(source, root.path().join("out"), tools);
    let output_path = recipe.output_path();

    // When: the recipe runs
    let mut pipeline = recipe.into_pipeline(EventSink::disabled());
    let success = pipeline.run().await.unwrap();

    // Then: the dependency check fails and nothing after it runs
    assert!(!success);
    assert_eq!(
        pipeline.steps()[1].state(),
        &StepState::Finished(StepOutcome::Failure { exit_code: 1 })
    );
    for step in &pipeline.steps()[2..] {
        assert_eq!(step.state(), &StepState::Skipped);
    }
    assert!(!output_path.exists());
}

#[tokio::test]
async fn test_recipe_missing_interpreter_is_handler_error() {
    // Given: tools pointing at an interpreter that does not exist
    let (root, model_dir) = create_model_source().unwrap();
    let mut tools = create_fake_toolchain(root.path(), 0).unwrap();
    tools.python = root.path().join("no-such-python");
    let source = ModelSource::from_directory(&model_dir).unwrap();

    // When: the recipe runs
    let mut pipeline =
        ConversionRecipe::new(source, root.path().join("out"), tools).into_pipeline(EventSink::disabled());
    assert!(!pipeline.run().await.unwrap());

    // Then: the environment check records why it failed
    match pipeline.steps()[0].state() {
        StepState::Finished(StepOutcome::HandlerError { message }) => {
            assert!(message.contains("no-such-python"), "unexpected message: {message}");
        }
        other => panic!("unexpected state {other:?}"),
    }
}
