use crate::config::ReportConfig;
use crate::judge::{JudgeComparison, JudgeVerdict};
use crate::models::{JudgeOutcome, Outcome};
use crate::scoring::{QuantComparison, QuantVerdict};
use crate::similarity::{SimilarityComparison, SimilarityOutcome};
use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    #[default]
    Markdown,
    Json,
}

/// Any comparison that can be rendered as a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "result", rename_all = "snake_case")]
pub enum ComparisonReport {
    Quantitative(QuantComparison),
    Judge(JudgeComparison),
    Similarity(SimilarityComparison),
}

impl ComparisonReport {
    /// Render in the requested format
    pub fn render(&self, format: OutputFormat, labels: &ReportConfig) -> Result<String> {
        match format {
            OutputFormat::Markdown => Ok(self.to_markdown(labels)),
            OutputFormat::Json => {
                serde_json::to_string_pretty(self).context("Failed to serialize report to JSON")
            }
        }
    }

    pub fn to_markdown(&self, labels: &ReportConfig) -> String {
        match self {
            ComparisonReport::Quantitative(comparison) => render_quantitative(comparison, labels),
            ComparisonReport::Judge(comparison) => render_judge(comparison, labels),
            ComparisonReport::Similarity(comparison) => render_similarity(comparison, labels),
        }
    }
}

fn signed(diff: i64) -> String {
    if diff >= 0 {
        format!("+{}", diff)
    } else {
        diff.to_string()
    }
}

fn quant_verdict_text(verdict: QuantVerdict) -> String {
    match verdict {
        QuantVerdict::AllMetrics => "tuned wins all metrics.".to_string(),
        QuantVerdict::Partial { wins, total } => {
            format!("tuned wins {}/{} metrics.", wins, total)
        }
        QuantVerdict::NoImprovement => {
            "no improvement over the base model. Consider reviewing the tuning data.".to_string()
        }
    }
}

/// Metric table plus one verdict line
fn render_quantitative(comparison: &QuantComparison, labels: &ReportConfig) -> String {
    let mut report = String::from("## 📊 Quantitative Summary\n\n");
    let _ = writeln!(
        report,
        "| Metric | 🔹 {} | 🔸 {} | Diff |",
        labels.base_label, labels.tuned_label
    );
    report.push_str("|---|---|---|---|\n");

    for row in &comparison.rows {
        let _ = writeln!(
            report,
            "| {} | {} | {} | {} {} |",
            row.metric.label(),
            row.base,
            row.tuned,
            signed(row.diff()),
            row.outcome().mark()
        );
    }

    let _ = writeln!(
        report,
        "\n**Verdict:** {}",
        quant_verdict_text(comparison.verdict())
    );
    report
}

fn render_judge_side(outcome: &JudgeOutcome) -> String {
    let score = match outcome {
        JudgeOutcome::Scored(score) => score,
        JudgeOutcome::Failed(reason) => return format!("> evaluation failed: {}\n", reason),
    };

    let mut table = String::from("| Criterion | Score |\n|---|---|\n");
    for entry in &score.scores {
        let _ = writeln!(table, "| {} | {}/5 |", entry.criterion, entry.score);
    }
    let _ = writeln!(
        table,
        "| **Total** | **{}/{}** |",
        score.total(),
        score.max_total()
    );
    if !score.comment.is_empty() {
        let _ = writeln!(table, "\n> {}", score.comment);
    }
    table
}

fn points(margin: u32) -> &'static str {
    if margin == 1 { "point" } else { "points" }
}

fn render_judge(comparison: &JudgeComparison, labels: &ReportConfig) -> String {
    let mut report = String::from("## 🧑‍⚖️ Judge Evaluation\n\n");
    let _ = writeln!(report, "### 🔹 {}\n", labels.base_label);
    report.push_str(&render_judge_side(&comparison.base));
    let _ = writeln!(report, "\n### 🔸 {}\n", labels.tuned_label);
    report.push_str(&render_judge_side(&comparison.tuned));

    if let Some(verdict) = comparison.verdict() {
        let text = match verdict {
            JudgeVerdict::TunedAhead(margin) => {
                format!("{} ahead by +{} {}. ✅", labels.tuned_label, margin, points(margin))
            }
            JudgeVerdict::Tied => "both models scored the same. ➖".to_string(),
            JudgeVerdict::BaseAhead(margin) => {
                format!("{} ahead by {} {}. ⚠️", labels.base_label, margin, points(margin))
            }
        };
        let _ = writeln!(report, "\n**Verdict:** {}", text);
    }
    report
}

fn render_similarity(comparison: &SimilarityComparison, labels: &ReportConfig) -> String {
    let mut report = String::from("## 🔍 Semantic Similarity\n\n");
    let _ = writeln!(
        report,
        "Closeness to the reference answer, measured with the `{}` embedding model.\n",
        comparison.embedding_model
    );

    let (base, tuned) = match &comparison.outcome {
        SimilarityOutcome::Measured { base, tuned } => (*base, *tuned),
        SimilarityOutcome::Failed(reason) => {
            let _ = writeln!(report, "> evaluation failed: {}", reason);
            return report;
        }
    };

    let diff = tuned - base;
    let outcome = Outcome::of(base, tuned);
    let sign = if diff >= 0.0 { "+" } else { "" };

    report.push_str("| Model | Similarity |\n|---|---|\n");
    let _ = writeln!(report, "| 🔹 {} | {:.4} |", labels.base_label, base);
    let _ = writeln!(report, "| 🔸 {} | {:.4} |", labels.tuned_label, tuned);
    let _ = writeln!(
        report,
        "| **Diff** | **{}{:.4} {}** |",
        sign,
        diff,
        outcome.mark()
    );

    let verdict = match outcome {
        Outcome::Win => format!(
            "the {} answer is semantically closer to the reference.",
            labels.tuned_label
        ),
        Outcome::Tie => "both answers are equally close to the reference.".to_string(),
        Outcome::Loss => format!(
            "the {} answer is semantically closer to the reference. Consider reviewing the tuning data.",
            labels.base_label
        ),
    };
    let _ = writeln!(report, "\n**Verdict:** {}", verdict);
    report
}

/// Heading plus response text for one generation target
pub fn render_response(heading: &str, text: &str) -> String {
    format!("### {}\n{}\n", heading, text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CriterionScore, JudgeScore, QuantScore};
    use crate::scoring::compare;

    fn labels() -> ReportConfig {
        ReportConfig::default()
    }

    fn quant(character: usize, paragraph: usize, effective: usize) -> QuantScore {
        QuantScore {
            character_count: character,
            paragraph_count: paragraph,
            effective_character_count: effective,
        }
    }

    fn judge_score(values: [u8; 3], comment: &str) -> JudgeOutcome {
        JudgeOutcome::Scored(JudgeScore {
            scores: ["実用性", "共感性", "専門性"]
                .iter()
                .zip(values)
                .map(|(name, score)| CriterionScore {
                    criterion: name.to_string(),
                    score,
                })
                .collect(),
            comment: comment.to_string(),
        })
    }

    #[test]
    fn test_quantitative_all_wins() {
        let report =
            ComparisonReport::Quantitative(compare(&quant(10, 2, 8), &quant(15, 3, 12)));
        let text = report.to_markdown(&labels());

        assert!(text.contains("| Metric | 🔹 Base Model | 🔸 Tuned Model | Diff |"));
        assert!(text.contains("| Characters | 10 | 15 | +5 ✅ |"));
        assert!(text.contains("| Paragraphs | 2 | 3 | +1 ✅ |"));
        assert!(text.contains("| Effective characters | 8 | 12 | +4 ✅ |"));
        assert!(text.contains("**Verdict:** tuned wins all metrics."));
    }

    #[test]
    fn test_quantitative_partial_and_none() {
        let partial = ComparisonReport::Quantitative(compare(&quant(10, 2, 8), &quant(12, 2, 5)));
        let text = partial.to_markdown(&labels());
        assert!(text.contains("| Paragraphs | 2 | 2 | +0 ➖ |"));
        assert!(text.contains("| Effective characters | 8 | 5 | -3 ⚠️ |"));
        assert!(text.contains("tuned wins 1/3 metrics."));

        let none = ComparisonReport::Quantitative(compare(&quant(10, 2, 8), &quant(9, 2, 8)));
        assert!(none.to_markdown(&labels()).contains("no improvement over the base model"));
    }

    #[test]
    fn test_judge_report_with_verdict() {
        let report = ComparisonReport::Judge(JudgeComparison {
            base: judge_score([3, 3, 3], ""),
            tuned: judge_score([4, 5, 3], "good"),
        });
        let text = report.to_markdown(&labels());

        assert!(text.contains("| 実用性 | 4/5 |"));
        assert!(text.contains("| **Total** | **9/15** |"));
        assert!(text.contains("| **Total** | **12/15** |"));
        assert!(text.contains("> good"));
        assert!(text.contains("**Verdict:** Tuned Model ahead by +3 points."));
    }

    #[test]
    fn test_judge_report_failure_is_rendered() {
        let report = ComparisonReport::Judge(JudgeComparison {
            base: JudgeOutcome::Failed("transport error: HTTP 429: quota".to_string()),
            tuned: judge_score([4, 4, 4], ""),
        });
        let text = report.to_markdown(&labels());

        assert!(text.contains("> evaluation failed: transport error: HTTP 429: quota"));
        assert!(text.contains("| **Total** | **12/15** |"));
        assert!(!text.contains("**Verdict:**"));
    }

    #[test]
    fn test_judge_report_base_ahead_and_tied() {
        let behind = ComparisonReport::Judge(JudgeComparison {
            base: judge_score([5, 5, 5], ""),
            tuned: judge_score([4, 5, 5], ""),
        });
        assert!(behind.to_markdown(&labels()).contains("Base Model ahead by 1 point. ⚠️"));

        let ahead = ComparisonReport::Judge(JudgeComparison {
            base: judge_score([4, 5, 5], ""),
            tuned: judge_score([5, 5, 5], ""),
        });
        assert!(ahead.to_markdown(&labels()).contains("Tuned Model ahead by +1 point. ✅"));

        let tied = ComparisonReport::Judge(JudgeComparison {
            base: judge_score([3, 4, 5], ""),
            tuned: judge_score([5, 4, 3], ""),
        });
        assert!(tied.to_markdown(&labels()).contains("both models scored the same."));
    }

    #[test]
    fn test_similarity_report() {
        let report = ComparisonReport::Similarity(SimilarityComparison {
            embedding_model: "text-multilingual-embedding-002".to_string(),
            outcome: SimilarityOutcome::Measured { base: 0.0, tuned: 1.0 },
        });
        let text = report.to_markdown(&labels());

        assert!(text.contains("`text-multilingual-embedding-002`"));
        assert!(text.contains("| 🔹 Base Model | 0.0000 |"));
        assert!(text.contains("| 🔸 Tuned Model | 1.0000 |"));
        assert!(text.contains("| **Diff** | **+1.0000 ✅** |"));
        assert!(text.contains("the Tuned Model answer is semantically closer to the reference."));
    }

    #[test]
    fn test_similarity_report_base_closer() {
        let report = ComparisonReport::Similarity(SimilarityComparison {
            embedding_model: "m".to_string(),
            outcome: SimilarityOutcome::Measured { base: 0.9, tuned: 0.8 },
        });
        let text = report.to_markdown(&labels());
        assert!(text.contains("**-0.1000 ⚠️**"));
        assert!(text.contains("Consider reviewing the tuning data."));
    }

    #[test]
    fn test_similarity_report_failure() {
        let report = ComparisonReport::Similarity(SimilarityComparison {
            embedding_model: "m".to_string(),
            outcome: SimilarityOutcome::Failed("transport error: timeout".to_string()),
        });
        let text = report.to_markdown(&labels());
        assert!(text.contains("> evaluation failed: transport error: timeout"));
        assert!(!text.contains("**Verdict:**"));
    }

    #[test]
    fn test_custom_labels() {
        let labels = ReportConfig {
            base_label: "gemini-2.0-flash".to_string(),
            tuned_label: "saiteki-v1".to_string(),
        };
        let report = ComparisonReport::Quantitative(compare(&quant(1, 1, 1), &quant(2, 2, 2)));
        assert!(report
            .to_markdown(&labels)
            .contains("| Metric | 🔹 gemini-2.0-flash | 🔸 saiteki-v1 | Diff |"));
    }

    #[test]
    fn test_json_output() {
        let report =
            ComparisonReport::Quantitative(compare(&quant(10, 2, 8), &quant(15, 3, 12)));
        let text = report.render(OutputFormat::Json, &labels()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["kind"], "quantitative");
        assert_eq!(value["result"]["rows"][0]["metric"], "characters");
        assert_eq!(value["result"]["rows"][0]["tuned"], 15);
    }

    #[test]
    fn test_json_output_judge_failure() {
        let report = ComparisonReport::Judge(JudgeComparison {
            base: JudgeOutcome::Failed("boom".to_string()),
            tuned: judge_score([1, 2, 3], ""),
        });
        let text = report.render(OutputFormat::Json, &labels()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["result"]["base"]["failed"], "boom");
        assert_eq!(value["result"]["tuned"]["scored"]["scores"][2]["score"], 3);
    }

    #[test]
    fn test_render_response() {
        assert_eq!(
            render_response("🔹 Base Model (gemini-2.0-flash-001)", "hello"),
            "### 🔹 Base Model (gemini-2.0-flash-001)\nhello\n"
        );
    }
}
