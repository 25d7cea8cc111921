use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod client;
mod config;
mod convert;
mod error;
mod extract;
mod judge;
mod models;
mod report;
mod runner;
mod scoring;
mod similarity;

use crate::client::VertexClient;
use crate::config::Config;
use crate::report::OutputFormat;
use crate::runner::{Mode, RunInputs, Runner};

/// Tuned vs base model comparison CLI - generate, score, judge and compare responses
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Prompt sent to the models in generation modes
    prompt: Option<String>,

    /// What to run
    #[arg(short, long, value_enum, default_value_t = Mode::Simultaneous)]
    mode: Mode,

    /// Path to an optional TOML configuration file; environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Issue body for the parse modes
    #[arg(long, env = "ISSUE_BODY", hide_env_values = true)]
    body: Option<String>,

    /// JSON file with earlier turns: [{"role": "user"|"model", "text": "..."}]
    #[arg(long)]
    history: Option<PathBuf>,

    /// Base model response file
    #[arg(long)]
    base_file: Option<PathBuf>,

    /// Tuned model response file
    #[arg(long)]
    tuned_file: Option<PathBuf>,

    /// Original prompt shown to the judge
    #[arg(long)]
    prompt_text: Option<String>,

    /// Reference answer for the similarity check
    #[arg(long)]
    reference_text: Option<String>,

    /// Chat-format training data to convert
    #[arg(long)]
    input: Option<PathBuf>,

    /// Report or conversion output path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Report format: markdown or json
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Markdown)]
    format: OutputFormat,

    /// Verbose output - show debug logs for each request
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn inputs(&self) -> RunInputs {
        RunInputs {
            prompt: self.prompt.clone(),
            body: self.body.clone(),
            base_file: self.base_file.clone(),
            tuned_file: self.tuned_file.clone(),
            prompt_text: self.prompt_text.clone(),
            reference_text: self.reference_text.clone(),
            history: self.history.clone(),
            input: self.input.clone(),
            output: self.output.clone(),
            format: self.format,
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "tuning_compare=debug,info"
    } else {
        "tuning_compare=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // Logs go to stderr so stdout carries only the extracted text or report
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = Config::load(args.config.as_deref())?;
    let client = VertexClient::new(config.clone())?;
    let runner = Runner::new(config, client)?;

    let output = runner.run(args.mode, &args.inputs()).await?;
    if !output.is_empty() {
        println!("{}", output);
    }

    Ok(())
}
