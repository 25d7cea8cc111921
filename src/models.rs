use crate::error::EvalError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Speaker of a single conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    /// Map a chat-style role name onto a tuning role; `assistant` is the model side
    pub fn from_chat_role(role: &str) -> Option<Self> {
        match role {
            "user" => Some(Role::User),
            "assistant" | "model" => Some(Role::Model),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Model => write!(f, "model"),
        }
    }
}

/// One turn of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    #[cfg(test)]
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// Ordered dialogue history sent to a generation endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    /// A single user turn
    pub fn single(prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::user(prompt)],
        }
    }

    /// Prior history followed by a new user prompt
    pub fn with_history(history: Vec<Turn>, prompt: impl Into<String>) -> Self {
        let mut turns = history;
        turns.push(Turn::user(prompt));
        Self { turns }
    }

    #[cfg(test)]
    pub fn from_turns(turns: Vec<Turn>) -> Self {
        Self { turns }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Check the alternation rules: starts with user, alternates, ends with user
    pub fn validate_for_generation(&self) -> Result<(), EvalError> {
        let Some(last) = self.turns.last() else {
            return Err(EvalError::configuration("conversation (no turns)"));
        };

        for (index, turn) in self.turns.iter().enumerate() {
            let expected = if index % 2 == 0 { Role::User } else { Role::Model };
            if turn.role != expected {
                return Err(EvalError::configuration(format!(
                    "conversation turn {} (expected role '{}', found '{}')",
                    index + 1,
                    expected,
                    turn.role
                )));
            }
        }

        if last.role != Role::User {
            return Err(EvalError::configuration(
                "conversation (final turn must be 'user')",
            ));
        }

        Ok(())
    }
}

/// Length and structure metrics of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuantScore {
    /// Unicode scalar values in the text
    pub character_count: usize,
    /// Non-blank lines
    pub paragraph_count: usize,
    /// Characters excluding spaces, ideographic spaces and line breaks
    pub effective_character_count: usize,
}

/// Result of comparing one metric from the tuned side's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Win,
    Tie,
    Loss,
}

impl Outcome {
    /// Classify `tuned` against `base`
    pub fn of<T: PartialOrd>(base: T, tuned: T) -> Self {
        match tuned.partial_cmp(&base) {
            Some(Ordering::Greater) => Outcome::Win,
            Some(Ordering::Less) => Outcome::Loss,
            _ => Outcome::Tie,
        }
    }

    pub fn mark(&self) -> &'static str {
        match self {
            Outcome::Win => "✅",
            Outcome::Tie => "➖",
            Outcome::Loss => "⚠️",
        }
    }
}

/// A single criterion score from the judge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub criterion: String,
    pub score: u8,
}

/// Scores produced by the judge for one response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeScore {
    /// Scores in rubric order
    pub scores: Vec<CriterionScore>,
    pub comment: String,
}

impl JudgeScore {
    pub fn total(&self) -> u32 {
        self.scores.iter().map(|s| u32::from(s.score)).sum()
    }

    pub fn max_total(&self) -> u32 {
        5 * self.scores.len() as u32
    }

    #[cfg(test)]
    pub fn get(&self, criterion: &str) -> Option<u8> {
        self.scores
            .iter()
            .find(|s| s.criterion == criterion)
            .map(|s| s.score)
    }
}

/// Either a judge score or the reason one could not be produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeOutcome {
    Scored(JudgeScore),
    Failed(String),
}

impl JudgeOutcome {
    pub fn score(&self) -> Option<&JudgeScore> {
        match self {
            JudgeOutcome::Scored(score) => Some(score),
            JudgeOutcome::Failed(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_conversation_is_valid() {
        let conversation = Conversation::single("hello");
        assert!(conversation.validate_for_generation().is_ok());
        assert_eq!(conversation.turns().len(), 1);
    }

    #[test]
    fn test_history_conversation_is_valid() {
        let conversation = Conversation::with_history(
            vec![Turn::user("How do you work?"), Turn::model("As a partner.")],
            "And with sudden spec changes?",
        );
        assert!(conversation.validate_for_generation().is_ok());
        assert_eq!(conversation.turns().last().unwrap().role, Role::User);
    }

    #[test]
    fn test_empty_conversation_rejected() {
        let conversation = Conversation::default();
        assert!(matches!(
            conversation.validate_for_generation(),
            Err(EvalError::Configuration(_))
        ));
    }

    #[test]
    fn test_trailing_model_turn_rejected() {
        let conversation =
            Conversation::from_turns(vec![Turn::user("question"), Turn::model("answer")]);
        let err = conversation.validate_for_generation().unwrap_err();
        assert!(err.to_string().contains("final turn"));
    }

    #[test]
    fn test_non_alternating_rejected() {
        let conversation = Conversation::from_turns(vec![Turn::user("a"), Turn::user("b")]);
        let err = conversation.validate_for_generation().unwrap_err();
        assert!(err.to_string().contains("turn 2"));
    }

    #[test]
    fn test_role_from_chat_role() {
        assert_eq!(Role::from_chat_role("assistant"), Some(Role::Model));
        assert_eq!(Role::from_chat_role("user"), Some(Role::User));
        assert_eq!(Role::from_chat_role("system"), None);
    }

    #[test]
    fn test_outcome_classification() {
        assert_eq!(Outcome::of(10, 15), Outcome::Win);
        assert_eq!(Outcome::of(3, 3), Outcome::Tie);
        assert_eq!(Outcome::of(0.5, 0.25), Outcome::Loss);
    }

    #[test]
    fn test_judge_score_total() {
        let score = JudgeScore {
            scores: vec![
                CriterionScore { criterion: "a".to_string(), score: 4 },
                CriterionScore { criterion: "b".to_string(), score: 5 },
                CriterionScore { criterion: "c".to_string(), score: 3 },
            ],
            comment: String::new(),
        };
        assert_eq!(score.total(), 12);
        assert_eq!(score.max_total(), 15);
        assert_eq!(score.get("b"), Some(5));
    }
}
