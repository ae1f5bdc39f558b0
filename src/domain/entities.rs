//! Question records as they move between the persistent store and the cache.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::error::DomainError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub option_id: i32,
    pub option_text: String,
}

/// A question row as returned by the persistent store, joined with its options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredQuestion {
    pub id: i64,
    pub question_text: String,
    pub options: Vec<QuestionOption>,
    pub correct_option_id: i32,
    pub explanation: String,
    pub last_shown: Option<OffsetDateTime>,
}

/// One cached question of a level.
///
/// Everything except `shown` and `shown_at` is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedTest {
    pub id: i64,
    pub question_text: String,
    pub options: Vec<QuestionOption>,
    pub correct_option_id: i32,
    pub explanation: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub shown_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub shown: bool,
}

impl CachedTest {
    pub fn mark_shown(&mut self, shown_at: OffsetDateTime) {
        self.shown = true;
        self.shown_at = Some(shown_at);
    }
}

impl TryFrom<StoredQuestion> for CachedTest {
    type Error = DomainError;

    fn try_from(question: StoredQuestion) -> Result<Self, Self::Error> {
        if question.id <= 0 {
            return Err(DomainError::validation(format!(
                "question id must be positive, got {}",
                question.id
            )));
        }
        if question.question_text.trim().is_empty() {
            return Err(DomainError::validation(format!(
                "question {} has empty text",
                question.id
            )));
        }
        if question.explanation.trim().is_empty() {
            return Err(DomainError::validation(format!(
                "question {} has empty explanation",
                question.id
            )));
        }
        if let Some(option) = question
            .options
            .iter()
            .find(|option| option.option_id < 0 || option.option_text.trim().is_empty())
        {
            return Err(DomainError::validation(format!(
                "question {} has invalid option {}",
                question.id, option.option_id
            )));
        }
        if !question
            .options
            .iter()
            .any(|option| option.option_id == question.correct_option_id)
        {
            return Err(DomainError::validation(format!(
                "question {} references missing correct option {}",
                question.id, question.correct_option_id
            )));
        }

        Ok(Self {
            id: question.id,
            question_text: question.question_text,
            options: question.options,
            correct_option_id: question.correct_option_id,
            explanation: question.explanation,
            shown_at: question.last_shown,
            shown: false,
        })
    }
}

/// Drop every record whose id already appeared earlier in the list.
pub fn dedup_by_id(records: Vec<CachedTest>) -> Vec<CachedTest> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|record| seen.insert(record.id))
        .collect()
}
