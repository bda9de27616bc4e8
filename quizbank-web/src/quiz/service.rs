//! Quiz operations on top of a [`QuizStore`]

use super::scoring::score;
use chrono::Utc;
use quizbank_core::{
    Page, Question, QuestionAttempt, QuestionBank, QuestionDraft, QuizStore, QuizbankError,
    QuizbankResult,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const COMPONENT: &str = "quiz_service";

pub const DEFAULT_RANDOM_LIMIT: i64 = 5;
pub const DEFAULT_ATTEMPT_THRESHOLD: i64 = 3;

/// Outcome of a submitted answer
#[derive(Debug, Clone)]
pub struct ScoredAttempt {
    pub attempt: QuestionAttempt,
    pub correct: bool,
}

pub struct QuizService {
    store: Arc<dyn QuizStore>,
}

impl QuizService {
    pub fn new(store: Arc<dyn QuizStore>) -> Self {
        Self { store }
    }

    pub async fn list_banks(&self) -> QuizbankResult<Vec<QuestionBank>> {
        self.store.list_banks().await
    }

    pub async fn create_bank(&self, name: &str) -> QuizbankResult<QuestionBank> {
        let name = name.trim();
        if name.is_empty() {
            return Err(quizbank_core::validation_error!(
                "bank name must not be empty",
                "name",
                COMPONENT
            ));
        }
        self.store.create_bank(name).await
    }

    pub async fn create_question(&self, draft: QuestionDraft) -> QuizbankResult<Question> {
        draft.validate()?;
        self.store.create_question(draft).await
    }

    pub async fn update_question(&self, id: i64, draft: QuestionDraft) -> QuizbankResult<Question> {
        draft.validate()?;
        self.store.update_question(id, draft).await
    }

    pub async fn delete_question(&self, id: i64) -> QuizbankResult<()> {
        self.store.delete_question(id).await
    }

    pub async fn get_question(&self, id: i64) -> QuizbankResult<Question> {
        self.store
            .get_question(id)
            .await?
            .ok_or_else(|| QuizbankError::not_found(format!("question {}", id), COMPONENT))
    }

    pub async fn list_questions(
        &self,
        bank_id: i64,
        tag: Option<&str>,
        page: Page,
    ) -> QuizbankResult<(Vec<Question>, i64)> {
        let tag = tag.map(str::trim).filter(|t| !t.is_empty());
        self.store.list_questions(bank_id, tag, page).await
    }

    /// Random sample of a bank; a missing or non-positive limit means five
    pub async fn random_questions(
        &self,
        bank_id: i64,
        limit: Option<i64>,
    ) -> QuizbankResult<Vec<Question>> {
        let limit = limit.filter(|l| *l > 0).unwrap_or(DEFAULT_RANDOM_LIMIT);
        self.store.random_questions(bank_id, limit).await
    }

    /// Score the answer and fold it into the caller's attempt record
    pub async fn record_attempt(
        &self,
        user_id: i64,
        question_id: i64,
        answer: Value,
    ) -> QuizbankResult<ScoredAttempt> {
        let question = self.get_question(question_id).await?;
        let correct = score(&question, &answer)?;
        let attempt = self
            .store
            .record_attempt(user_id, question_id, correct, answer, Utc::now())
            .await?;
        debug!(user_id, question_id, correct, attempts = attempt.attempts, "Attempt recorded");
        Ok(ScoredAttempt { attempt, correct })
    }

    /// Attempts the user has not yet answered correctly `threshold` times in a row
    pub async fn attempts_below(
        &self,
        user_id: i64,
        bank_id: i64,
        threshold: Option<i64>,
    ) -> QuizbankResult<Vec<QuestionAttempt>> {
        let threshold = threshold.unwrap_or(DEFAULT_ATTEMPT_THRESHOLD);
        self.store.attempts_below(user_id, bank_id, threshold).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory_pool;
    use crate::quiz::database::SqliteQuizStore;
    use quizbank_core::{AnswerKey, AnswerOption, ErrorKind, QuestionType};
    use serde_json::json;

    async fn setup() -> (QuizService, i64, i64) {
        let pool = memory_pool().await;
        let user_id = sqlx::query(
            "INSERT INTO users (username, password_hash, status, token_version, created_at, updated_at) \
             VALUES ('learner', 'x', 1, 1, ?, ?)",
        )
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();

        let service = QuizService::new(Arc::new(SqliteQuizStore::new(pool)));
        let bank = service.create_bank("Math").await.unwrap();
        (service, bank.id, user_id)
    }

    async fn two_plus_two(service: &QuizService, bank_id: i64, author_id: i64) -> Question {
        let option = |text: &str, is_correct| AnswerOption {
            id: None,
            option_text: text.to_string(),
            is_correct,
        };
        service
            .create_question(QuestionDraft {
                question_bank_id: bank_id,
                question_type: QuestionType::SingleChoice,
                content: "2 + 2 = ?".to_string(),
                explanation: String::new(),
                author_id,
                tags: vec!["arithmetic".to_string()],
                answer: AnswerKey::Choice(vec![option("3", false), option("4", true)]),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_attempt_sequence() {
        let (service, bank_id, user_id) = setup().await;
        let question = two_plus_two(&service, bank_id, user_id).await;
        let correct_id = question.answer.correct_option_ids()[0];
        let wrong_id = match &question.answer {
            AnswerKey::Choice(options) => options
                .iter()
                .find(|o| !o.is_correct)
                .and_then(|o| o.id)
                .unwrap(),
            _ => unreachable!(),
        };

        let first = service
            .record_attempt(user_id, question.id, json!([correct_id]))
            .await
            .unwrap();
        assert!(first.correct);
        let a = &first.attempt;
        assert_eq!((a.attempts, a.wrong, a.consecutive_correct), (1, 0, 1));

        let second = service
            .record_attempt(user_id, question.id, json!([wrong_id]))
            .await
            .unwrap();
        assert!(!second.correct);
        let a = &second.attempt;
        assert_eq!((a.attempts, a.wrong, a.consecutive_correct), (2, 1, 0));
        assert_eq!(a.id, first.attempt.id);
    }

    #[tokio::test]
    async fn test_malformed_answer_is_rejected_without_recording() {
        let (service, bank_id, user_id) = setup().await;
        let question = two_plus_two(&service, bank_id, user_id).await;

        let err = service
            .record_attempt(user_id, question.id, json!("four"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(service
            .attempts_below(user_id, bank_id, None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_attempts_below_default_threshold() {
        let (service, bank_id, user_id) = setup().await;
        let question = two_plus_two(&service, bank_id, user_id).await;
        let correct_id = question.answer.correct_option_ids()[0];

        for _ in 0..2 {
            service
                .record_attempt(user_id, question.id, json!([correct_id]))
                .await
                .unwrap();
        }
        assert_eq!(service.attempts_below(user_id, bank_id, None).await.unwrap().len(), 1);

        service
            .record_attempt(user_id, question.id, json!([correct_id]))
            .await
            .unwrap();
        assert!(service.attempts_below(user_id, bank_id, None).await.unwrap().is_empty());
        assert_eq!(service.attempts_below(user_id, bank_id, Some(4)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_draft_and_missing_question() {
        let (service, bank_id, user_id) = setup().await;
        let err = service
            .create_question(QuestionDraft {
                question_bank_id: bank_id,
                question_type: QuestionType::SingleChoice,
                content: "Pick one".to_string(),
                explanation: String::new(),
                author_id: user_id,
                tags: Vec::new(),
                answer: AnswerKey::Choice(Vec::new()),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = service.get_question(404).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(service.create_bank("  ").await.is_err());
    }

    #[tokio::test]
    async fn test_random_limit_defaults() {
        let (service, bank_id, user_id) = setup().await;
        for _ in 0..7 {
            two_plus_two(&service, bank_id, user_id).await;
        }
        assert_eq!(service.random_questions(bank_id, None).await.unwrap().len(), 5);
        assert_eq!(service.random_questions(bank_id, Some(-1)).await.unwrap().len(), 5);
        assert_eq!(service.random_questions(bank_id, Some(2)).await.unwrap().len(), 2);
    }
}
