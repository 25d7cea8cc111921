use crate::client::{Embedder, GenerationSettings, ModelTarget, TextGenerator, labeled};
use crate::config::{Config, Requirement};
use crate::convert::convert_training_data;
use crate::error::EvalError;
use crate::extract::SectionExtractor;
use crate::judge::{JudgeComparison, JudgeEvaluator};
use crate::models::{Conversation, Turn};
use crate::report::{ComparisonReport, OutputFormat, render_response};
use crate::scoring;
use crate::similarity::SimilarityEvaluator;
use anyhow::{Context, Result};
use clap::ValueEnum;
use std::path::{Path, PathBuf};

/// Default report path for the comparison modes
pub const DEFAULT_REPORT_PATH: &str = "score_result.md";
/// Default output path for training data conversion
pub const DEFAULT_CONVERT_PATH: &str = "training_data_vertex.jsonl";

/// What a single invocation does
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Extract the prompt from an issue body
    Parse,
    /// Extract the reference answer from an issue body; prints nothing when absent
    ParseReference,
    /// Ask the base model
    Base,
    /// Ask the tuned model
    Tuned,
    /// Ask both models
    Simultaneous,
    /// Compare length and structure metrics of two response files
    Evaluate,
    /// Have the base model grade two response files
    Judge,
    /// Compare two response files to a reference answer via embeddings
    Similarity,
    /// Convert chat-format training data to tuning format
    Convert,
}

impl Mode {
    fn requirements(&self) -> &'static [Requirement] {
        match self {
            Mode::Base => &[
                Requirement::ProjectId,
                Requirement::Credential,
                Requirement::BaseModel,
            ],
            Mode::Tuned => &[
                Requirement::ProjectId,
                Requirement::Credential,
                Requirement::TunedEndpoint,
            ],
            Mode::Simultaneous => &[
                Requirement::ProjectId,
                Requirement::Credential,
                Requirement::BaseModel,
                Requirement::TunedEndpoint,
            ],
            Mode::Judge => &[
                Requirement::ProjectId,
                Requirement::Credential,
                Requirement::BaseModel,
            ],
            Mode::Similarity => &[Requirement::ProjectId, Requirement::Credential],
            Mode::Parse | Mode::ParseReference | Mode::Evaluate | Mode::Convert => &[],
        }
    }
}

/// Command-line inputs for one run
#[derive(Debug, Clone, Default)]
pub struct RunInputs {
    pub prompt: Option<String>,
    pub body: Option<String>,
    pub base_file: Option<PathBuf>,
    pub tuned_file: Option<PathBuf>,
    pub prompt_text: Option<String>,
    pub reference_text: Option<String>,
    pub history: Option<PathBuf>,
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub format: OutputFormat,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Main runner that dispatches a mode to the clients and evaluators
pub struct Runner<C> {
    config: Config,
    client: C,
    extractor: SectionExtractor,
}

impl<C: TextGenerator + Embedder> Runner<C> {
    /// Create a new runner with the given configuration and backend client
    pub fn new(config: Config, client: C) -> Result<Self> {
        let extractor = SectionExtractor::new(&config.extract)?;
        Ok(Self {
            config,
            client,
            extractor,
        })
    }

    /// Run one mode and return the text to print
    pub async fn run(&self, mode: Mode, inputs: &RunInputs) -> Result<String> {
        self.validate(mode, inputs)?;
        tracing::debug!(?mode, "inputs validated");

        match mode {
            Mode::Parse => Ok(self.extractor.prompt(inputs.body.as_deref().unwrap_or_default())),
            Mode::ParseReference => Ok(self
                .extractor
                .reference(inputs.body.as_deref().unwrap_or_default())
                .unwrap_or_default()),
            Mode::Base | Mode::Tuned | Mode::Simultaneous => self.run_generation(mode, inputs).await,
            Mode::Evaluate => self.run_evaluate(inputs),
            Mode::Judge => self.run_judge(inputs).await,
            Mode::Similarity => self.run_similarity(inputs).await,
            Mode::Convert => self.run_convert(inputs),
        }
    }

    /// Check every required input and configuration value up front, reporting all gaps at once
    fn validate(&self, mode: Mode, inputs: &RunInputs) -> Result<(), EvalError> {
        let mut missing = Vec::new();
        let mut require = |present: bool, name: &str| {
            if !present {
                missing.push(name.to_string());
            }
        };

        match mode {
            Mode::Parse => require(non_blank(&inputs.body).is_some(), "--body (or ISSUE_BODY)"),
            Mode::ParseReference => {}
            Mode::Base | Mode::Tuned | Mode::Simultaneous => {
                require(non_blank(&inputs.prompt).is_some(), "prompt")
            }
            Mode::Evaluate | Mode::Judge | Mode::Similarity => {
                require(inputs.base_file.is_some(), "--base-file");
                require(inputs.tuned_file.is_some(), "--tuned-file");
                if mode == Mode::Judge {
                    require(
                        self.judge_prompt(inputs).is_some(),
                        "--prompt-text (or default_prompt)",
                    );
                }
                if mode == Mode::Similarity {
                    require(non_blank(&inputs.reference_text).is_some(), "--reference-text");
                }
            }
            Mode::Convert => require(inputs.input.is_some(), "--input"),
        }

        missing.extend(self.config.missing(mode.requirements()));

        if missing.is_empty() {
            Ok(())
        } else {
            Err(EvalError::Configuration(missing))
        }
    }

    fn judge_prompt<'a>(&'a self, inputs: &'a RunInputs) -> Option<&'a str> {
        non_blank(&inputs.prompt_text).or_else(|| non_blank(&self.config.default_prompt))
    }

    fn build_conversation(&self, inputs: &RunInputs) -> Result<Conversation> {
        let prompt = inputs.prompt.clone().unwrap_or_default();
        let conversation = match &inputs.history {
            Some(path) => Conversation::with_history(load_history(path)?, prompt),
            None => Conversation::single(prompt),
        };
        conversation.validate_for_generation()?;
        Ok(conversation)
    }

    /// Send the prompt to one or both models; failures are printed in place of the response
    async fn run_generation(&self, mode: Mode, inputs: &RunInputs) -> Result<String> {
        let conversation = self.build_conversation(inputs)?;
        let settings = GenerationSettings {
            max_output_tokens: self.config.max_output_tokens,
            temperature: self.config.temperature,
        };
        let labels = &self.config.report;

        let ask = |target: ModelTarget, wanted: bool| {
            let conversation = &conversation;
            async move {
                if !wanted {
                    return None;
                }
                tracing::info!(?target, "generating response");
                Some(self.client.generate(target, conversation, settings).await)
            }
        };

        let (base, tuned) = tokio::join!(
            ask(ModelTarget::Base, mode != Mode::Tuned),
            ask(ModelTarget::Tuned, mode != Mode::Base),
        );

        let mut sections = Vec::new();
        if let Some(result) = base {
            sections.push(render_response(
                &format!("🔹 {} ({})", labels.base_label, self.config.base_model),
                &labeled(&labels.base_label, result),
            ));
        }
        if let Some(result) = tuned {
            sections.push(render_response(
                &format!(
                    "🔸 {} ({})",
                    labels.tuned_label,
                    self.config.tuned_endpoint_id.as_deref().unwrap_or_default()
                ),
                &labeled(&labels.tuned_label, result),
            ));
        }

        Ok(sections.join("\n---\n\n"))
    }

    fn read_responses(&self, inputs: &RunInputs) -> Result<(String, String)> {
        let base = read_text(inputs.base_file.as_deref())?;
        let tuned = read_text(inputs.tuned_file.as_deref())?;
        Ok((base, tuned))
    }

    fn run_evaluate(&self, inputs: &RunInputs) -> Result<String> {
        let (base_text, tuned_text) = self.read_responses(inputs)?;
        let comparison = scoring::compare(&scoring::score(&base_text), &scoring::score(&tuned_text));
        self.finish_report(&ComparisonReport::Quantitative(comparison), inputs)
    }

    async fn run_judge(&self, inputs: &RunInputs) -> Result<String> {
        let (base_text, tuned_text) = self.read_responses(inputs)?;
        let original_prompt = self.judge_prompt(inputs).unwrap_or_default();
        let settings = GenerationSettings {
            max_output_tokens: self.config.judge.max_output_tokens,
            temperature: self.config.judge.temperature,
        };
        let evaluator = JudgeEvaluator::new(&self.client, &self.config.judge.rubric, settings);

        tracing::info!("judging {} response", self.config.report.base_label);
        let base = evaluator.judge(&base_text, original_prompt).await;
        tracing::info!("judging {} response", self.config.report.tuned_label);
        let tuned = evaluator.judge(&tuned_text, original_prompt).await;

        self.finish_report(&ComparisonReport::Judge(JudgeComparison { base, tuned }), inputs)
    }

    async fn run_similarity(&self, inputs: &RunInputs) -> Result<String> {
        let (base_text, tuned_text) = self.read_responses(inputs)?;
        let reference = non_blank(&inputs.reference_text).unwrap_or_default();

        let comparison = SimilarityEvaluator::new(&self.client)
            .compare(reference, &base_text, &tuned_text)
            .await;

        self.finish_report(&ComparisonReport::Similarity(comparison), inputs)
    }

    fn run_convert(&self, inputs: &RunInputs) -> Result<String> {
        let input = inputs.input.as_deref().context("--input is required")?;
        let output = inputs
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONVERT_PATH));

        let summary = convert_training_data(input, &output)?;
        Ok(format!(
            "Converted {} records ({} skipped) from {} to {}",
            summary.written,
            summary.skipped,
            input.display(),
            output.display()
        ))
    }

    /// Render, store at the output path (overwriting) and return the report
    fn finish_report(&self, report: &ComparisonReport, inputs: &RunInputs) -> Result<String> {
        let rendered = report.render(inputs.format, &self.config.report)?;
        let path = inputs
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT_PATH));
        store_report(&path, &rendered)?;
        Ok(rendered)
    }
}

fn read_text(path: Option<&Path>) -> Result<String> {
    let path = path.context("response file path is required")?;
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read response file: {}", path.display()))
}

fn load_history(path: &Path) -> Result<Vec<Turn>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse history file: {}", path.display()))
}

/// Write the report, creating parent directories as needed
fn store_report(path: &Path, content: &str) -> Result<()> {
    ensure_directory_exists(path)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to: {}", path.display()))?;
    tracing::info!("report stored to: {}", path.display());
    Ok(())
}

/// Ensure the directory for the report file exists
fn ensure_directory_exists(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}
