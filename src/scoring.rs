use crate::models::{Outcome, QuantScore};
use serde::{Deserialize, Serialize};

/// Characters that do not count towards the effective length
const IGNORED_CHARS: [char; 4] = [' ', '\u{3000}', '\n', '\r'];

/// Compute length and structure metrics for a response
pub fn score(text: &str) -> QuantScore {
    let character_count = text.chars().count();
    let paragraph_count = text
        .split('\n')
        .filter(|line| !line.trim().is_empty())
        .count();
    let effective_character_count = text.chars().filter(|c| !IGNORED_CHARS.contains(c)).count();

    QuantScore {
        character_count,
        paragraph_count,
        effective_character_count,
    }
}

/// Metrics reported in the quantitative table, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Characters,
    Paragraphs,
    EffectiveCharacters,
}

impl Metric {
    pub const ALL: [Metric; 3] = [
        Metric::Characters,
        Metric::Paragraphs,
        Metric::EffectiveCharacters,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Metric::Characters => "Characters",
            Metric::Paragraphs => "Paragraphs",
            Metric::EffectiveCharacters => "Effective characters",
        }
    }

    fn value(&self, score: &QuantScore) -> usize {
        match self {
            Metric::Characters => score.character_count,
            Metric::Paragraphs => score.paragraph_count,
            Metric::EffectiveCharacters => score.effective_character_count,
        }
    }
}

/// One row of the quantitative comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricComparison {
    pub metric: Metric,
    pub base: usize,
    pub tuned: usize,
}

impl MetricComparison {
    pub fn diff(&self) -> i64 {
        self.tuned as i64 - self.base as i64
    }

    pub fn outcome(&self) -> Outcome {
        Outcome::of(self.base, self.tuned)
    }
}

/// Aggregate wording of the quantitative comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantVerdict {
    AllMetrics,
    Partial { wins: usize, total: usize },
    NoImprovement,
}

/// Base and tuned metrics side by side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantComparison {
    pub rows: Vec<MetricComparison>,
}

impl QuantComparison {
    pub fn wins(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| row.outcome() == Outcome::Win)
            .count()
    }

    /// Ties and losses both count as not-a-win
    pub fn verdict(&self) -> QuantVerdict {
        let wins = self.wins();
        let total = self.rows.len();
        if total > 0 && wins == total {
            QuantVerdict::AllMetrics
        } else if wins > 0 {
            QuantVerdict::Partial { wins, total }
        } else {
            QuantVerdict::NoImprovement
        }
    }
}

pub fn compare(base: &QuantScore, tuned: &QuantScore) -> QuantComparison {
    QuantComparison {
        rows: Metric::ALL
            .iter()
            .map(|metric| MetricComparison {
                metric: *metric,
                base: metric.value(base),
                tuned: metric.value(tuned),
            })
            .collect(),
    }
}
