use crate::judge::Rubric;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How the credential is attached to each request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthScheme {
    /// `?key=<credential>` query parameter
    #[default]
    ApiKey,
    /// `Authorization: Bearer <credential>` header
    Bearer,
}

/// Settings used when the base model acts as judge
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JudgeConfig {
    #[serde(default = "default_judge_temperature")]
    pub temperature: f64,
    #[serde(default = "default_judge_max_tokens")]
    pub max_output_tokens: u32,
    #[serde(default)]
    pub rubric: Rubric,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            temperature: default_judge_temperature(),
            max_output_tokens: default_judge_max_tokens(),
            rubric: Rubric::default(),
        }
    }
}

/// Labels used for the two subjects in rendered reports
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportConfig {
    #[serde(default = "default_base_label")]
    pub base_label: String,
    #[serde(default = "default_tuned_label")]
    pub tuned_label: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            base_label: default_base_label(),
            tuned_label: default_tuned_label(),
        }
    }
}

/// Section headers searched for in free-form issue bodies
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractConfig {
    #[serde(default = "default_prompt_header")]
    pub prompt_header: String,
    #[serde(default = "default_reference_header")]
    pub reference_header: String,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            prompt_header: default_prompt_header(),
            reference_header: default_reference_header(),
        }
    }
}

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Cloud project identifier
    #[serde(default)]
    pub project_id: Option<String>,
    /// Cloud region hosting the models
    #[serde(default = "default_region")]
    pub region: String,
    /// Endpoint identifier of the tuned deployment
    #[serde(default)]
    pub tuned_endpoint_id: Option<String>,
    /// Publisher model used as baseline and judge
    #[serde(default = "default_base_model")]
    pub base_model: String,
    /// Publisher model used for embeddings
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Override for the API host, e.g. a local mock server
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub auth: AuthScheme,
    /// Environment variable name containing the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Environment variable name containing the bearer access token
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,
    /// Resolved credential; never read from the file
    #[serde(skip)]
    pub credential: Option<String>,
    /// Temperature for response generation
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Maximum tokens for response generation
    #[serde(default = "default_max_tokens")]
    pub max_output_tokens: u32,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Embedding input is truncated to this many characters
    #[serde(default = "default_embedding_char_limit")]
    pub embedding_char_limit: usize,
    /// Prompt used by judge mode when none is given on the command line
    #[serde(default)]
    pub default_prompt: Option<String>,
    #[serde(default)]
    pub judge: JudgeConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
}

fn default_region() -> String {
    "us-central1".to_string()
}

fn default_base_model() -> String {
    "gemini-2.0-flash-001".to_string()
}

fn default_embedding_model() -> String {
    "text-multilingual-embedding-002".to_string()
}

fn default_api_key_env() -> String {
    "VERTEX_API_KEY".to_string()
}

fn default_access_token_env() -> String {
    "VERTEX_ACCESS_TOKEN".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_embedding_char_limit() -> usize {
    3000
}

fn default_judge_temperature() -> f64 {
    0.1
}

fn default_judge_max_tokens() -> u32 {
    512
}

fn default_base_label() -> String {
    "Base Model".to_string()
}

fn default_tuned_label() -> String {
    "Tuned Model".to_string()
}

fn default_prompt_header() -> String {
    "Prompt".to_string()
}

fn default_reference_header() -> String {
    "参照回答".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_id: None,
            region: default_region(),
            tuned_endpoint_id: None,
            base_model: default_base_model(),
            embedding_model: default_embedding_model(),
            api_base: None,
            auth: AuthScheme::default(),
            api_key_env: default_api_key_env(),
            access_token_env: default_access_token_env(),
            credential: None,
            temperature: default_temperature(),
            max_output_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            embedding_char_limit: default_embedding_char_limit(),
            default_prompt: None,
            judge: JudgeConfig::default(),
            report: ReportConfig::default(),
            extract: ExtractConfig::default(),
        }
    }
}

/// A configuration value some mode cannot run without
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    ProjectId,
    Credential,
    TunedEndpoint,
    BaseModel,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.display()))
    }

    /// Load from an optional file, then overlay the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(config.with_env(|name| std::env::var(name).ok()))
    }

    /// Overlay values found through `lookup`; blank values count as unset
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(project_id) = get("GCP_PROJECT_ID") {
            self.project_id = Some(project_id);
        }
        if let Some(region) = get("GCP_REGION") {
            self.region = region;
        }
        if let Some(endpoint) = get("VERTEX_ENDPOINT_ID") {
            self.tuned_endpoint_id = Some(endpoint);
        }
        if let Some(model) = get("VERTEX_BASE_MODEL") {
            self.base_model = model;
        }
        self.credential = get(self.credential_env());
        self
    }

    /// Name of the environment variable the credential is read from
    pub fn credential_env(&self) -> &str {
        match self.auth {
            AuthScheme::ApiKey => &self.api_key_env,
            AuthScheme::Bearer => &self.access_token_env,
        }
    }

    /// Host the REST paths are appended to
    pub fn api_base(&self) -> String {
        match &self.api_base {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!("https://{}-aiplatform.googleapis.com", self.region),
        }
    }

    /// Names of every unmet requirement, in the order given
    pub fn missing(&self, requirements: &[Requirement]) -> Vec<String> {
        requirements
            .iter()
            .filter_map(|requirement| match requirement {
                Requirement::ProjectId if is_blank(&self.project_id) => {
                    Some("GCP_PROJECT_ID".to_string())
                }
                Requirement::Credential if is_blank(&self.credential) => {
                    Some(self.credential_env().to_string())
                }
                Requirement::TunedEndpoint if is_blank(&self.tuned_endpoint_id) => {
                    Some("VERTEX_ENDPOINT_ID".to_string())
                }
                Requirement::BaseModel if self.base_model.trim().is_empty() => {
                    Some("VERTEX_BASE_MODEL".to_string())
                }
                _ => None,
            })
            .collect()
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_config_parsing() {
        let toml_content = r#"
project_id = "my-project"
region = "asia-northeast1"
tuned_endpoint_id = "3814882036406026240"
base_model = "gemini-2.0-flash-001"
auth = "bearer"
temperature = 0.5
max_output_tokens = 800
timeout_secs = 30
default_prompt = "How do you motivate a team member?"

[judge]
temperature = 0.0
max_output_tokens = 256

[report]
base_label = "Base"
tuned_label = "Tuned"

[extract]
reference_header = "Reference"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", toml_content).unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();
        assert_eq!(config.project_id.as_deref(), Some("my-project"));
        assert_eq!(config.region, "asia-northeast1");
        assert_eq!(config.auth, AuthScheme::Bearer);
        assert_eq!(config.temperature, 0.5);
        assert_eq!(config.max_output_tokens, 800);
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.judge.temperature, 0.0);
        assert_eq!(config.judge.max_output_tokens, 256);
        assert_eq!(config.judge.rubric.criteria.len(), 3);
        assert_eq!(config.report.base_label, "Base");
        assert_eq!(config.extract.prompt_header, "Prompt");
        assert_eq!(config.extract.reference_header, "Reference");
        assert!(config.credential.is_none());
    }

    #[test]
    fn test_config_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "project_id = \"p\"\n").unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();
        assert_eq!(config.region, "us-central1");
        assert_eq!(config.base_model, "gemini-2.0-flash-001");
        assert_eq!(config.embedding_model, "text-multilingual-embedding-002");
        assert_eq!(config.auth, AuthScheme::ApiKey);
        assert_eq!(config.temperature, 0.7);
        assert_eq!(config.max_output_tokens, 8192);
        assert_eq!(config.timeout_secs, 120);
        assert_eq!(config.embedding_char_limit, 3000);
        assert_eq!(config.judge.temperature, 0.1);
        assert_eq!(config.judge.max_output_tokens, 512);
        assert_eq!(config.report.tuned_label, "Tuned Model");
    }

    #[test]
    fn test_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "auth = \"kerberos\"\n").unwrap();

        let err = Config::from_file(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse TOML config"));
    }

    #[test]
    fn test_env_overlay() {
        let config = Config::default().with_env(env(&[
            ("GCP_PROJECT_ID", "proj"),
            ("GCP_REGION", "europe-west4"),
            ("VERTEX_ENDPOINT_ID", "42"),
            ("VERTEX_API_KEY", "secret"),
        ]));

        assert_eq!(config.project_id.as_deref(), Some("proj"));
        assert_eq!(config.region, "europe-west4");
        assert_eq!(config.tuned_endpoint_id.as_deref(), Some("42"));
        assert_eq!(config.credential.as_deref(), Some("secret"));
        assert_eq!(config.api_base(), "https://europe-west4-aiplatform.googleapis.com");
    }

    #[test]
    fn test_bearer_reads_access_token_env() {
        let mut config = Config::default();
        config.auth = AuthScheme::Bearer;
        let config = config.with_env(env(&[
            ("VERTEX_API_KEY", "key"),
            ("VERTEX_ACCESS_TOKEN", "token"),
        ]));
        assert_eq!(config.credential.as_deref(), Some("token"));
    }

    #[test]
    fn test_missing_reports_every_name() {
        let config = Config::default().with_env(env(&[("VERTEX_API_KEY", "  ")]));
        let missing = config.missing(&[
            Requirement::ProjectId,
            Requirement::Credential,
            Requirement::TunedEndpoint,
            Requirement::BaseModel,
        ]);
        assert_eq!(
            missing,
            vec!["GCP_PROJECT_ID", "VERTEX_API_KEY", "VERTEX_ENDPOINT_ID"]
        );
    }

    #[test]
    fn test_api_base_override_trims_slash() {
        let mut config = Config::default();
        config.api_base = Some("http://127.0.0.1:1234/".to_string());
        assert_eq!(config.api_base(), "http://127.0.0.1:1234");
    }
}
