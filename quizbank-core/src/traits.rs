//! Storage seams used by the services

use crate::error::QuizbankResult;
use crate::types::*;
use async_trait::async_trait;

/// Persisted users, roles, permissions and their associations
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn count_users(&self) -> QuizbankResult<i64>;

    /// Insert a user with `token_version = 1` and attach the named roles.
    /// Fails as a whole if the username is taken or any role is missing.
    async fn insert_user(&self, user: NewUser) -> QuizbankResult<User>;

    /// Replace username, status and role set; rewrite the hash only when given.
    async fn update_user(&self, id: i64, update: UserUpdate) -> QuizbankResult<()>;

    async fn find_user_by_id(&self, id: i64) -> QuizbankResult<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> QuizbankResult<Option<User>>;

    async fn list_users(&self) -> QuizbankResult<Vec<User>>;

    /// Atomically bump the user's token version.
    async fn increment_token_version(&self, id: i64) -> QuizbankResult<()>;

    /// Returns the existing role when the name is already taken.
    async fn create_role(&self, name: &str) -> QuizbankResult<Role>;

    async fn find_role(&self, id: i64) -> QuizbankResult<Option<Role>>;

    async fn delete_role(&self, id: i64) -> QuizbankResult<()>;

    /// Rename the role and replace its permission set.
    async fn update_role(&self, id: i64, name: &str, permission_ids: &[i64]) -> QuizbankResult<()>;

    async fn list_roles(&self) -> QuizbankResult<Vec<Role>>;

    async fn role_permissions(&self, role_id: i64) -> QuizbankResult<Vec<Permission>>;

    async fn list_permissions(&self) -> QuizbankResult<Vec<Permission>>;

    /// Upsert keyed by name; the description follows the latest caller.
    async fn ensure_permission(&self, name: &str, description: &str) -> QuizbankResult<Permission>;

    /// Every (role name, permission name) association.
    async fn role_permission_pairs(&self) -> QuizbankResult<Vec<(String, String)>>;
}

/// Question banks, questions and answer attempts
#[async_trait]
pub trait QuizStore: Send + Sync {
    async fn list_banks(&self) -> QuizbankResult<Vec<QuestionBank>>;

    async fn create_bank(&self, name: &str) -> QuizbankResult<QuestionBank>;

    async fn create_question(&self, draft: QuestionDraft) -> QuizbankResult<Question>;

    async fn update_question(&self, id: i64, draft: QuestionDraft) -> QuizbankResult<Question>;

    async fn delete_question(&self, id: i64) -> QuizbankResult<()>;

    async fn get_question(&self, id: i64) -> QuizbankResult<Option<Question>>;

    /// One page of a bank's questions, optionally filtered by tag, plus the total count.
    async fn list_questions(
        &self,
        bank_id: i64,
        tag: Option<&str>,
        page: Page,
    ) -> QuizbankResult<(Vec<Question>, i64)>;

    async fn random_questions(&self, bank_id: i64, limit: i64) -> QuizbankResult<Vec<Question>>;

    /// Fold one scored answer into the (user, question) record.
    ///
    /// The counters change in a single statement, so concurrent submissions
    /// for the same pair are never lost.
    async fn record_attempt(
        &self,
        user_id: i64,
        question_id: i64,
        correct: bool,
        answer: serde_json::Value,
        at: chrono::DateTime<chrono::Utc>,
    ) -> QuizbankResult<QuestionAttempt>;

    /// Attempts in a bank whose consecutive-correct count is below the threshold.
    async fn attempts_below(
        &self,
        user_id: i64,
        bank_id: i64,
        threshold: i64,
    ) -> QuizbankResult<Vec<QuestionAttempt>>;
}
