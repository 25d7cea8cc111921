use crate::client::Embedder;
use crate::error::EvalError;
use serde::{Deserialize, Serialize};

/// Cosine similarity of two vectors; 0.0 when either has zero norm
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Similarity of each response to the reference answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityOutcome {
    Measured { base: f64, tuned: f64 },
    Failed(String),
}

/// Result of a similarity comparison, tagged with the model that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityComparison {
    pub embedding_model: String,
    pub outcome: SimilarityOutcome,
}

/// Scores semantic closeness of two responses to a reference answer
pub struct SimilarityEvaluator<'a, E: Embedder + ?Sized> {
    embedder: &'a E,
}

impl<'a, E: Embedder + ?Sized> SimilarityEvaluator<'a, E> {
    pub fn new(embedder: &'a E) -> Self {
        Self { embedder }
    }

    /// Embed all three texts and compare; failures are reported in the outcome
    pub async fn compare(&self, reference: &str, base: &str, tuned: &str) -> SimilarityComparison {
        let outcome = match self.measure(reference, base, tuned).await {
            Ok((base, tuned)) => SimilarityOutcome::Measured { base, tuned },
            Err(e) => {
                tracing::warn!("similarity evaluation failed: {}", e);
                SimilarityOutcome::Failed(e.to_string())
            }
        };

        SimilarityComparison {
            embedding_model: self.embedder.model_name().to_string(),
            outcome,
        }
    }

    async fn measure(&self, reference: &str, base: &str, tuned: &str) -> Result<(f64, f64), EvalError> {
        tracing::info!("fetching embeddings");
        let reference_vec = self.embedder.embed(reference).await?;
        let base_vec = self.embedder.embed(base).await?;
        let tuned_vec = self.embedder.embed(tuned).await?;

        for (label, vector) in [("base", &base_vec), ("tuned", &tuned_vec)] {
            if vector.len() != reference_vec.len() {
                return Err(EvalError::MalformedResponse(format!(
                    "{} embedding has {} dimensions, reference has {}",
                    label,
                    vector.len(),
                    reference_vec.len()
                )));
            }
        }

        Ok((
            cosine_similarity(&reference_vec, &base_vec),
            cosine_similarity(&reference_vec, &tuned_vec),
        ))
    }
}
