use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{QuestionsRepo, RepoError, ShownUpdate};
use crate::domain::entities::{QuestionOption, StoredQuestion};
use crate::domain::types::Level;

use super::{PostgresRepositories, map_sqlx_error};

/// One question joined with one of its options.
#[derive(Debug, sqlx::FromRow)]
struct QuestionOptionRow {
    id: i64,
    question: String,
    correct_id: i32,
    explanation: String,
    datetime_shown: Option<OffsetDateTime>,
    option_id: i32,
    option_text: String,
}

// The subquery picks the batch; the join only attaches options, so a question
// without options drops out instead of shrinking the batch of others.
const FETCH_BATCH_SQL: &str = r#"
    SELECT q.id, q.question, q.correct_id, q.explanation, q.datetime_shown,
           o.option_id, o.option_text
    FROM (
        SELECT id, question, correct_id, explanation, datetime_shown
        FROM questions
        WHERE level = $1
        ORDER BY datetime_shown ASC NULLS FIRST, id ASC
        LIMIT $2
    ) AS q
    INNER JOIN options o ON o.question_id = q.id
    ORDER BY q.datetime_shown ASC NULLS FIRST, q.id ASC, o.option_id ASC
"#;

#[async_trait]
impl QuestionsRepo for PostgresRepositories {
    async fn fetch_batch(
        &self,
        level: Level,
        limit: u32,
    ) -> Result<Vec<StoredQuestion>, RepoError> {
        let rows = sqlx::query_as::<_, QuestionOptionRow>(FETCH_BATCH_SQL)
            .bind(level.as_str())
            .bind(i64::from(limit))
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(group_rows(rows))
    }

    async fn apply_shown_update(
        &self,
        id: i64,
        shown_at: OffsetDateTime,
    ) -> Result<ShownUpdate, RepoError> {
        let result = sqlx::query("UPDATE questions SET datetime_shown = $2 WHERE id = $1")
            .bind(id)
            .bind(shown_at)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            Ok(ShownUpdate::NotFound)
        } else {
            Ok(ShownUpdate::Applied)
        }
    }
}

/// Fold joined rows back into questions, keeping row order.
fn group_rows(rows: Vec<QuestionOptionRow>) -> Vec<StoredQuestion> {
    let mut questions: Vec<StoredQuestion> = Vec::new();

    for row in rows {
        let option = QuestionOption {
            option_id: row.option_id,
            option_text: row.option_text,
        };

        match questions.last_mut() {
            Some(current) if current.id == row.id => current.options.push(option),
            _ => questions.push(StoredQuestion {
                id: row.id,
                question_text: row.question,
                options: vec![option],
                correct_option_id: row.correct_id,
                explanation: row.explanation,
                last_shown: row.datetime_shown,
            }),
        }
    }

    questions
}
