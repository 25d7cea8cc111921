use thiserror::Error;

/// Errors raised by the Vertex clients and the evaluators built on them
#[derive(Debug, Error)]
pub enum EvalError {
    /// Required credentials or inputs are absent; detected before any I/O
    #[error("missing required configuration: {}", .0.join(", "))]
    Configuration(Vec<String>),

    /// Network, HTTP or timeout failure
    #[error("{}", transport_message(.status, .message))]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// Backend payload did not match the expected envelope structure
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Judge output could not be turned into a score
    #[error("parse error: {0}")]
    Parse(String),
}

fn transport_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("transport error: HTTP {}: {}", code, message),
        None => format!("transport error: {}", message),
    }
}

impl EvalError {
    pub fn configuration(name: impl Into<String>) -> Self {
        EvalError::Configuration(vec![name.into()])
    }

    #[cfg(test)]
    pub fn transport(message: impl Into<String>) -> Self {
        EvalError::Transport {
            status: None,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for EvalError {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out: {}", err)
        } else {
            err.to_string()
        };
        EvalError::Transport {
            status: err.status().map(|s| s.as_u16()),
            message,
        }
    }
}

/// Cut `text` down to at most `limit` characters, respecting char boundaries
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
