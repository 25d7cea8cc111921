use crate::models::{Role, Turn};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// One line of chat-style training data
#[derive(Debug, Deserialize)]
struct ChatRecord {
    #[serde(default)]
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: String,
}

/// One line of tuning data
#[derive(Debug, Serialize)]
struct TuningRecord {
    contents: Vec<TuningContent>,
}

#[derive(Debug, Serialize)]
struct TuningContent {
    role: Role,
    parts: Vec<TuningPart>,
}

#[derive(Debug, Serialize)]
struct TuningPart {
    text: String,
}

impl From<Turn> for TuningContent {
    fn from(turn: Turn) -> Self {
        Self {
            role: turn.role,
            parts: vec![TuningPart { text: turn.text }],
        }
    }
}

/// Counts reported after a conversion
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ConversionSummary {
    pub written: usize,
    pub skipped: usize,
}

/// Map chat messages to turns, dropping roles the tuning format has no place for
fn to_turns(record: ChatRecord, line_num: usize) -> Vec<Turn> {
    record
        .messages
        .into_iter()
        .filter_map(|message| match Role::from_chat_role(&message.role) {
            Some(role) => Some(Turn {
                role,
                text: message.content,
            }),
            None => {
                tracing::warn!("line {}: skipping message with role '{}'", line_num, message.role);
                None
            }
        })
        .collect()
}

/// Convert chat-format JSONL (`messages`) into tuning-format JSONL (`contents`)
pub fn convert_training_data(input: &Path, output: &Path) -> Result<ConversionSummary> {
    let infile = std::fs::File::open(input)
        .with_context(|| format!("Failed to open training data: {}", input.display()))?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let outfile = std::fs::File::create(output)
        .with_context(|| format!("Failed to create output file: {}", output.display()))?;

    let mut writer = BufWriter::new(outfile);
    let mut summary = ConversionSummary::default();

    for (index, line) in BufReader::new(infile).lines().enumerate() {
        let line_num = index + 1;
        let line = line.with_context(|| format!("Failed to read line {}", line_num))?;
        if line.trim().is_empty() {
            continue;
        }

        let record: ChatRecord = serde_json::from_str(&line)
            .with_context(|| format!("Failed to parse line {} of {}", line_num, input.display()))?;
        let turns = to_turns(record, line_num);
        if turns.is_empty() {
            summary.skipped += 1;
            continue;
        }

        let tuning = TuningRecord {
            contents: turns.into_iter().map(TuningContent::from).collect(),
        };
        serde_json::to_writer(&mut writer, &tuning).context("Failed to serialize tuning record")?;
        writeln!(writer).context("Failed to write output")?;
        summary.written += 1;
    }

    writer.flush().context("Failed to flush output")?;
    tracing::info!(
        written = summary.written,
        skipped = summary.skipped,
        "converted {} to {}",
        input.display(),
        output.display()
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use tempfile::tempdir;

    #[test]
    fn test_convert_maps_assistant_to_model() {
        let temp_dir = tempdir().unwrap();
        let input = temp_dir.path().join("training_data.jsonl");
        let output = temp_dir.path().join("out/training_data_vertex.jsonl");

        let lines = [
            json!({"messages": [
                {"role": "user", "content": "部下のやる気が出ません"},
                {"role": "assistant", "content": "まず話を聴きましょう"}
            ]})
            .to_string(),
            String::new(),
            json!({"messages": [{"role": "system", "content": "ignored"}]}).to_string(),
            json!({"messages": []}).to_string(),
        ];
        std::fs::write(&input, lines.join("\n")).unwrap();

        let summary = convert_training_data(&input, &output).unwrap();
        assert_eq!(summary, ConversionSummary { written: 1, skipped: 2 });

        let content = std::fs::read_to_string(&output).unwrap();
        let records: Vec<Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0],
            json!({"contents": [
                {"role": "user", "parts": [{"text": "部下のやる気が出ません"}]},
                {"role": "model", "parts": [{"text": "まず話を聴きましょう"}]}
            ]})
        );
        // non-ASCII text is written as-is
        assert!(content.contains("部下のやる気が出ません"));
    }

    #[test]
    fn test_convert_invalid_line_reports_position() {
        let temp_dir = tempdir().unwrap();
        let input = temp_dir.path().join("bad.jsonl");
        let output = temp_dir.path().join("out.jsonl");
        std::fs::write(&input, "{\"messages\": []}\nnot json\n").unwrap();

        let err = convert_training_data(&input, &output).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_convert_missing_input() {
        let temp_dir = tempdir().unwrap();
        let err = convert_training_data(
            &temp_dir.path().join("missing.jsonl"),
            &temp_dir.path().join("out.jsonl"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Failed to open training data"));
    }
}
