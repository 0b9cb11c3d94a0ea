//! `llamachat`: convert PyTorch LLaMA checkpoints and inspect chat sources.

mod logging;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, WrapErr};
use colored::Colorize;
use lc_core::config::loader::{load_chat_sources, load_config};
use lc_core::conversion::{ConversionManager, ConversionRecipe, ModelSource};
use lc_core::events::EventSink;
use lc_core::session::{core_count, EffectiveParameters};
use lc_protocol::ipc::Event;
use lc_protocol::pipeline_models::PipelineState;
use lc_protocol::step_models::{OutputStream, StepOutcome, StepState};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "llamachat", version, about = "Local LLaMA model tooling")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a PyTorch checkpoint directory into a quantized ggml model
    Convert {
        /// Directory containing params.json and consolidated.*.pth
        source: PathBuf,

        /// Where to write the quantized model (defaults to the source directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Directory containing `.llamachat/config.toml`
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },

    /// List the chat sources stored in a settings file
    Sources {
        /// Versioned chat sources JSON file
        settings: PathBuf,

        /// Print the sources as JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Write TypeScript declarations for the event and settings types
    Bindings {
        /// Directory to write the `.ts` files into
        #[arg(default_value = "bindings")]
        out_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Command::Convert {
            source,
            output,
            root,
        } => convert(source, output, root).await,
        Command::Sources { settings, json } => sources(settings, json).await,
        Command::Bindings { out_dir } => {
            lc_protocol::export_bindings(&out_dir)
                .wrap_err_with(|| format!("Failed to write bindings to {}", out_dir.display()))?;
            println!("{} {}", "Bindings written to".green().bold(), out_dir.display());
            Ok(())
        }
    }
}

async fn convert(
    source: PathBuf,
    output: Option<PathBuf>,
    root: PathBuf,
) -> color_eyre::Result<()> {
    let config = load_config(&root)
        .await
        .wrap_err("Failed to load configuration")?;
    let source = ModelSource::from_directory(&source).wrap_err("Invalid model source")?;
    let output_dir = output.unwrap_or_else(|| source.directory.clone());

    let recipe = ConversionRecipe::new(source, output_dir, config.conversion);
    let output_path = recipe.output_path();
    let labels: Vec<String> = recipe
        .steps()
        .iter()
        .map(|step| step.label().to_string())
        .collect();

    let (events, mut rx) = EventSink::channel();
    let manager = ConversionManager::new();
    let id = manager.start(recipe.into_pipeline(events)).await;

    let mut stopping = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c(), if !stopping => {
                eprintln!("{}", "Stopping conversion...".yellow());
                stopping = true;
                manager.stop(id).await?;
            }
            event = rx.recv() => match event {
                Some(Event::PipelineStateChanged { state: PipelineState::Finished { .. }, .. }) | None => break,
                Some(event) => print_event(&event, &labels),
            },
        }
    }

    let pipeline = manager.wait(id).await?;
    match pipeline.state() {
        PipelineState::Finished { success: true } => {
            println!(
                "{} {}",
                "Model written to".green().bold(),
                output_path.display()
            );
            Ok(())
        }
        _ => Err(eyre!("Conversion did not complete")),
    }
}

fn print_event(event: &Event, labels: &[String]) {
    match event {
        Event::StepStateChanged {
            step_index, state, ..
        } => {
            let label = labels
                .get(*step_index)
                .map(String::as_str)
                .unwrap_or("step");
            let position = format!("[{}/{}]", step_index + 1, labels.len());
            match state {
                StepState::Running => println!("{} {}", position.bold(), label.bold()),
                StepState::Finished(StepOutcome::Success { .. }) => {
                    println!("{} {} {}", position.bold(), label, "done".green());
                }
                StepState::Finished(outcome) => {
                    let detail = match outcome {
                        StepOutcome::Failure { exit_code } => format!("exited with {exit_code}"),
                        StepOutcome::HandlerError { message } => message.clone(),
                        StepOutcome::Success { .. } => String::new(),
                    };
                    println!("{} {} {}", position.bold(), label, format!("failed: {detail}").red());
                }
                StepState::Skipped => println!("{} {} {}", position.bold(), label, "skipped".dimmed()),
                StepState::NotStarted => {}
            }
        }
        Event::StepOutput {
            stream, content, ..
        } => match stream {
            OutputStream::Command => println!("  {} {}", "$".cyan(), content.cyan()),
            OutputStream::Stdout => println!("  {content}"),
            OutputStream::Stderr => eprintln!("  {}", content.red()),
        },
        _ => {}
    }
}

async fn sources(settings: PathBuf, json: bool) -> color_eyre::Result<()> {
    let sources = load_chat_sources(&settings)
        .await
        .wrap_err_with(|| format!("Failed to read {}", settings.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sources)?);
        return Ok(());
    }

    if sources.is_empty() {
        println!("{}", "No chat sources configured".dimmed());
        return Ok(());
    }

    let cores = core_count();
    for source in sources {
        let effective = EffectiveParameters::derive(&source.parameters, cores);
        println!("{} {}", source.name.bold(), format!("({})", source.id).dimmed());
        println!("  model:   {} ({})", source.model_path.display(), source.model_kind.name());
        println!(
            "  context: {} tokens, {} threads, temperature {}",
            effective.context_size, effective.thread_count, effective.temperature
        );
    }
    Ok(())
}
