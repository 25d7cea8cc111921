use crate::config::{AuthScheme, Config, Requirement};
use crate::error::{EvalError, truncate_chars};
use crate::models::{Conversation, Role};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which deployment a generation request is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTarget {
    /// Untuned publisher model; also used as the judge
    Base,
    /// Fine-tuned endpoint
    Tuned,
}

/// Sampling settings for one generation call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    pub max_output_tokens: u32,
    pub temperature: f64,
}

/// Anything that can turn a conversation into generated text
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        target: ModelTarget,
        conversation: &Conversation,
        settings: GenerationSettings,
    ) -> Result<String, EvalError>;
}

/// Anything that can turn text into an embedding vector
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f64>, EvalError>;

    /// Name of the embedding model, shown in reports
    fn model_name(&self) -> &str;
}

/// Render a generation result as text, labeling failures instead of raising them
pub fn labeled(label: &str, result: Result<String, EvalError>) -> String {
    match result {
        Ok(text) => text,
        Err(err) => format!("Error ({}): {}", label, err),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: Role,
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f64,
}

/// The streaming endpoint answers with an array of envelopes; accept a lone one too
#[derive(Deserialize)]
#[serde(untagged)]
enum StreamBody {
    Envelopes(Vec<Envelope>),
    Single(Envelope),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    instances: [EmbedInstance<'a>; 1],
}

#[derive(Serialize)]
struct EmbedInstance<'a> {
    content: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
struct Prediction {
    embeddings: Embeddings,
}

#[derive(Deserialize)]
struct Embeddings {
    values: Vec<f64>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: String,
}

/// Concatenate every text fragment of a streamed generation body, in order
fn collect_stream_text(body: &str) -> Result<String, EvalError> {
    let envelopes = match serde_json::from_str::<StreamBody>(body) {
        Ok(StreamBody::Envelopes(envelopes)) => envelopes,
        Ok(StreamBody::Single(envelope)) => vec![envelope],
        Err(e) => {
            return Err(EvalError::MalformedResponse(format!(
                "{} / raw: {}",
                e,
                truncate_chars(body, 200)
            )));
        }
    };

    // An error envelope may arrive after partial output; the whole call fails
    if let Some(error) = envelopes.iter().find_map(|envelope| envelope.error.as_ref()) {
        return Err(EvalError::Transport {
            status: error.code,
            message: format!("error in response stream: {}", error.message),
        });
    }

    Ok(envelopes
        .into_iter()
        .flat_map(|envelope| envelope.candidates)
        .filter_map(|candidate| candidate.content)
        .flat_map(|content| content.parts)
        .filter_map(|part| part.text)
        .collect())
}

/// REST client for the Vertex AI generation and embedding endpoints
pub struct VertexClient {
    config: Config,
    http_client: Client,
}

impl VertexClient {
    /// Create a client whose requests all carry the configured timeout
    pub fn new(config: Config) -> Result<Self, EvalError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            config,
            http_client,
        })
    }

    fn location_path(&self, version: &str) -> String {
        format!(
            "{}/{}/projects/{}/locations/{}",
            self.config.api_base(),
            version,
            self.config.project_id.as_deref().unwrap_or_default(),
            self.config.region
        )
    }

    /// Resource URL of the model addressed by `target`
    pub fn model_url(&self, target: ModelTarget) -> String {
        match target {
            ModelTarget::Base => format!(
                "{}/publishers/google/models/{}",
                self.location_path("v1beta1"),
                self.config.base_model
            ),
            ModelTarget::Tuned => format!(
                "{}/endpoints/{}",
                self.location_path("v1beta1"),
                self.config.tuned_endpoint_id.as_deref().unwrap_or_default()
            ),
        }
    }

    fn embedding_url(&self) -> String {
        format!(
            "{}/publishers/google/models/{}:predict",
            self.location_path("v1"),
            self.config.embedding_model
        )
    }

    fn ensure(&self, requirements: &[Requirement]) -> Result<(), EvalError> {
        let missing = self.config.missing(requirements);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(EvalError::Configuration(missing))
        }
    }

    /// Attach the credential according to the configured scheme
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let credential = self.config.credential.as_deref().unwrap_or_default();
        match self.config.auth {
            AuthScheme::ApiKey => request.query(&[("key", credential)]),
            AuthScheme::Bearer => request.bearer_auth(credential),
        }
    }

    /// POST a JSON body and return the raw response text of a successful call
    async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<String, EvalError> {
        let response = self
            .authorize(self.http_client.post(url))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = match serde_json::from_str::<ApiError>(&text) {
                Ok(error) => error.error.message,
                Err(_) => truncate_chars(&text, 200).to_string(),
            };
            return Err(EvalError::Transport {
                status: Some(status.as_u16()),
                message,
            });
        }

        Ok(text)
    }
}

#[async_trait]
impl TextGenerator for VertexClient {
    async fn generate(
        &self,
        target: ModelTarget,
        conversation: &Conversation,
        settings: GenerationSettings,
    ) -> Result<String, EvalError> {
        conversation.validate_for_generation()?;
        match target {
            ModelTarget::Base => self.ensure(&[
                Requirement::Credential,
                Requirement::ProjectId,
                Requirement::BaseModel,
            ])?,
            ModelTarget::Tuned => self.ensure(&[
                Requirement::Credential,
                Requirement::ProjectId,
                Requirement::TunedEndpoint,
            ])?,
        }

        let request = GenerateRequest {
            contents: conversation
                .turns()
                .iter()
                .map(|turn| RequestContent {
                    role: turn.role,
                    parts: [RequestPart { text: &turn.text }],
                })
                .collect(),
            generation_config: GenerationConfig {
                max_output_tokens: settings.max_output_tokens,
                temperature: settings.temperature,
            },
        };

        let url = format!("{}:streamGenerateContent", self.model_url(target));
        tracing::debug!(?target, turns = conversation.turns().len(), "sending generation request");

        let body = self.post_json(&url, &request).await?;
        let text = collect_stream_text(&body)?;

        tracing::debug!(?target, chars = text.chars().count(), "generation complete");
        Ok(text)
    }
}

#[async_trait]
impl Embedder for VertexClient {
    async fn embed(&self, text: &str) -> Result<Vec<f64>, EvalError> {
        self.ensure(&[Requirement::Credential, Requirement::ProjectId])?;

        let content = truncate_chars(text, self.config.embedding_char_limit);
        let request = EmbedRequest {
            instances: [EmbedInstance { content }],
        };

        let body = self.post_json(&self.embedding_url(), &request).await?;
        let response: EmbedResponse = serde_json::from_str(&body)
            .map_err(|e| EvalError::MalformedResponse(e.to_string()))?;

        response
            .predictions
            .into_iter()
            .next()
            .map(|prediction| prediction.embeddings.values)
            .ok_or_else(|| EvalError::MalformedResponse("no predictions in response".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.config.embedding_model
    }
}
