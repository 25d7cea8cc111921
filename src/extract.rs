use crate::config::ExtractConfig;
use anyhow::{Context, Result};
use regex::Regex;

/// Pulls labeled sections out of loosely structured text such as issue bodies
pub struct SectionExtractor {
    prompt: Regex,
    reference: Regex,
    next_header: Regex,
}

fn section_pattern(header: &str) -> Result<Regex> {
    Regex::new(&format!(r"(?s)### {}\s*\n\s*(.*)", regex::escape(header)))
        .with_context(|| format!("Invalid section header: {}", header))
}

impl SectionExtractor {
    pub fn new(config: &ExtractConfig) -> Result<Self> {
        Ok(Self {
            prompt: section_pattern(&config.prompt_header)?,
            reference: section_pattern(&config.reference_header)?,
            next_header: Regex::new(r"(?m)^###").context("Invalid next-header pattern")?,
        })
    }

    /// Text after the prompt header to the end of the document, or the whole input
    pub fn prompt(&self, body: &str) -> String {
        match self.prompt.captures(body).and_then(|c| c.get(1)) {
            Some(section) => section.as_str().trim().to_string(),
            None => body.trim().to_string(),
        }
    }

    /// Text after the reference header up to the next header; `None` means skip the check
    pub fn reference(&self, body: &str) -> Option<String> {
        let section = self.reference.captures(body)?.get(1)?.as_str().trim();
        let section = match self.next_header.find(section) {
            Some(next) => &section[..next.start()],
            None => section,
        };
        let section = section.trim();
        (!section.is_empty()).then(|| section.to_string())
    }
}
