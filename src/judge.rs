use crate::client::{GenerationSettings, ModelTarget, TextGenerator};
use crate::error::{EvalError, truncate_chars};
use crate::models::{Conversation, CriterionScore, JudgeOutcome, JudgeScore};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw judge output quoted in error messages is cut to this many characters
const RAW_PREVIEW_CHARS: usize = 200;

/// A single scoring axis of the rubric
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Criterion {
    pub name: String,
    pub description: String,
}

impl Criterion {
    fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
        }
    }
}

/// Instructions and criteria handed to the judge model
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Rubric {
    /// Role the judge is asked to take
    pub persona: String,
    pub criteria: Vec<Criterion>,
    /// JSON key holding the free-text comment
    pub comment_key: String,
}

impl Default for Rubric {
    fn default() -> Self {
        Self {
            persona: "You are an expert in people management.".to_string(),
            criteria: vec![
                Criterion::new("実用性", "具体的なアクションや手順が含まれているか"),
                Criterion::new("共感性", "相談者の感情を受け止め、心理的安全性を確保しているか"),
                Criterion::new("専門性", "マネジメント理論や業界知識が反映されているか"),
            ],
            comment_key: "コメント".to_string(),
        }
    }
}

impl Rubric {
    /// Build the prompt asking the judge for a JSON-only verdict
    pub fn build_prompt(&self, original_prompt: &str, response: &str) -> String {
        let criteria_lines: Vec<String> = self
            .criteria
            .iter()
            .map(|c| format!("- {}: {}", c.name, c.description))
            .collect();
        let shape: Vec<String> = self
            .criteria
            .iter()
            .map(|c| format!("\"{}\": <1-5>", c.name))
            .chain(std::iter::once(format!(
                "\"{}\": \"<one-sentence summary>\"",
                self.comment_key
            )))
            .collect();

        format!(
            "{}\nStrictly evaluate the answer to the question below and reply in JSON only.\n\n\
             ## Question\n{}\n\n\
             ## Answer to evaluate\n{}\n\n\
             ## Criteria (each scored 1 to 5)\n{}\n\n\
             ## Output format\n\
             Return only the following JSON object and no other text.\n{{{}}}\n",
            self.persona,
            original_prompt,
            response,
            criteria_lines.join("\n"),
            shape.join(", ")
        )
    }
}

/// Find the first balanced `{...}` region, ignoring braces inside JSON strings
pub fn extract_json_object(text: &str) -> Option<&str> {
    let mut from = 0;
    while let Some(found) = text[from..].find('{') {
        let start = from + found;
        if let Some(end) = balanced_end(&text[start..]) {
            return Some(&text[start..=start + end]);
        }
        // Unclosed from here; a later brace may still open a balanced region
        from = start + 1;
    }
    None
}

/// Byte offset of the brace closing the one `text` starts with
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(offset);
                }
            }
            _ => {}
        }
    }

    None
}

/// Parse the judge's free-text reply into a score
pub fn parse_judgement(raw: &str, rubric: &Rubric) -> Result<JudgeScore, EvalError> {
    let Some(object_text) = extract_json_object(raw) else {
        return Err(EvalError::Parse(format!(
            "no JSON object in judge output: {}",
            truncate_chars(raw, RAW_PREVIEW_CHARS)
        )));
    };

    let preview = || truncate_chars(object_text, RAW_PREVIEW_CHARS);

    let parsed: Value = serde_json::from_str(object_text)
        .map_err(|e| EvalError::Parse(format!("{} / raw: {}", e, preview())))?;
    let Some(object) = parsed.as_object() else {
        return Err(EvalError::Parse(format!("not a JSON object / raw: {}", preview())));
    };

    let mut scores = Vec::with_capacity(rubric.criteria.len());
    for criterion in &rubric.criteria {
        let value = object
            .get(&criterion.name)
            .and_then(integer_score)
            .ok_or_else(|| {
                EvalError::Parse(format!(
                    "criterion '{}' missing or not an integer / raw: {}",
                    criterion.name,
                    preview()
                ))
            })?;
        scores.push(CriterionScore {
            criterion: criterion.name.clone(),
            score: value.clamp(1, 5) as u8,
        });
    }

    let comment = object
        .get(&rubric.comment_key)
        .and_then(|c| c.as_str())
        .unwrap_or_default()
        .to_string();

    Ok(JudgeScore { scores, comment })
}

/// Accept integers, integral floats and numeric strings
fn integer_score(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Scores responses by asking the base model to grade them against a rubric
pub struct JudgeEvaluator<'a, G: TextGenerator + ?Sized> {
    generator: &'a G,
    rubric: &'a Rubric,
    settings: GenerationSettings,
}

impl<'a, G: TextGenerator + ?Sized> JudgeEvaluator<'a, G> {
    pub fn new(generator: &'a G, rubric: &'a Rubric, settings: GenerationSettings) -> Self {
        Self {
            generator,
            rubric,
            settings,
        }
    }

    /// Grade one response; every failure becomes `JudgeOutcome::Failed`
    pub async fn judge(&self, response: &str, original_prompt: &str) -> JudgeOutcome {
        match self.try_judge(response, original_prompt).await {
            Ok(score) => JudgeOutcome::Scored(score),
            Err(e) => {
                tracing::warn!("judge evaluation failed: {}", e);
                JudgeOutcome::Failed(e.to_string())
            }
        }
    }

    async fn try_judge(&self, response: &str, original_prompt: &str) -> Result<JudgeScore, EvalError> {
        let conversation = Conversation::single(self.rubric.build_prompt(original_prompt, response));
        // The base model grades both responses.
        let raw = self
            .generator
            .generate(ModelTarget::Base, &conversation, self.settings)
            .await?;
        tracing::debug!(raw = %truncate_chars(&raw, RAW_PREVIEW_CHARS), "judge replied");
        parse_judgement(&raw, self.rubric)
    }
}

/// Both sides' judge outcomes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeComparison {
    pub base: JudgeOutcome,
    pub tuned: JudgeOutcome,
}

/// Three-way verdict on judge totals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeVerdict {
    TunedAhead(u32),
    Tied,
    BaseAhead(u32),
}

impl JudgeComparison {
    /// Only available when both sides were scored
    pub fn verdict(&self) -> Option<JudgeVerdict> {
        let base = self.base.score()?.total();
        let tuned = self.tuned.score()?.total();
        Some(match tuned.cmp(&base) {
            std::cmp::Ordering::Greater => JudgeVerdict::TunedAhead(tuned - base),
            std::cmp::Ordering::Equal => JudgeVerdict::Tied,
            std::cmp::Ordering::Less => JudgeVerdict::BaseAhead(base - tuned),
        })
    }
}
