//! Core data type definitions

use crate::error::{QuizbankError, QuizbankResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account status; serialized as its integer code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum UserStatus {
    Inactive,
    Active,
    Pending,
    Suspended,
}

impl UserStatus {
    /// Only active accounts may log in or refresh tokens
    pub fn is_active(self) -> bool {
        self == UserStatus::Active
    }

    pub fn code(self) -> i64 {
        match self {
            UserStatus::Inactive => 0,
            UserStatus::Active => 1,
            UserStatus::Pending => 2,
            UserStatus::Suspended => 3,
        }
    }
}

impl TryFrom<i64> for UserStatus {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(UserStatus::Inactive),
            1 => Ok(UserStatus::Active),
            2 => Ok(UserStatus::Pending),
            3 => Ok(UserStatus::Suspended),
            other => Err(format!("unknown user status: {}", other)),
        }
    }
}

impl From<UserStatus> for i64 {
    fn from(status: UserStatus) -> Self {
        status.code()
    }
}

/// A role; names are unique
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Role {
    pub id: i64,
    pub name: String,
}

/// A named permission checked by the policy engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Permission {
    pub id: i64,
    pub name: String,
    pub description: String,
}

/// A user account together with its roles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub status: UserStatus,
    pub token_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl User {
    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.name.clone()).collect()
    }
}

/// Fields for a new account; the password is already hashed
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub status: UserStatus,
    pub roles: Vec<String>,
}

/// Replacement values for an existing account
#[derive(Debug, Clone)]
pub struct UserUpdate {
    pub username: String,
    pub status: UserStatus,
    pub roles: Vec<String>,
    /// `None` leaves the stored hash untouched
    pub password_hash: Option<String>,
}

/// Question kind; serialized as its integer code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
    TrueFalse,
    WrittenAnswer,
    FillInTheBlank,
}

impl QuestionType {
    pub fn code(self) -> i64 {
        match self {
            QuestionType::SingleChoice => 0,
            QuestionType::MultipleChoice => 1,
            QuestionType::TrueFalse => 2,
            QuestionType::WrittenAnswer => 3,
            QuestionType::FillInTheBlank => 4,
        }
    }

    pub fn is_choice(self) -> bool {
        matches!(
            self,
            QuestionType::SingleChoice | QuestionType::MultipleChoice
        )
    }
}

impl TryFrom<i64> for QuestionType {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QuestionType::SingleChoice),
            1 => Ok(QuestionType::MultipleChoice),
            2 => Ok(QuestionType::TrueFalse),
            3 => Ok(QuestionType::WrittenAnswer),
            4 => Ok(QuestionType::FillInTheBlank),
            other => Err(format!("unknown question type: {}", other)),
        }
    }
}

impl From<QuestionType> for i64 {
    fn from(kind: QuestionType) -> Self {
        kind.code()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct QuestionBank {
    pub id: i64,
    pub name: String,
}

/// One option of a choice question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AnswerOption {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub option_text: String,
    #[serde(default)]
    pub is_correct: bool,
}

/// One blank of a fill-in-the-blank question, in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Blank {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub blank_text: String,
}

/// The stored answer of a question, shaped by its type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerKey {
    Choice(Vec<AnswerOption>),
    TrueFalse(bool),
    Written(String),
    FillInTheBlank(Vec<Blank>),
}

impl AnswerKey {
    /// Ids of the options marked correct
    pub fn correct_option_ids(&self) -> Vec<i64> {
        match self {
            AnswerKey::Choice(options) => options
                .iter()
                .filter(|o| o.is_correct)
                .filter_map(|o| o.id)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Copy with everything that reveals the solution removed
    pub fn redacted(&self) -> AnswerKey {
        match self {
            AnswerKey::Choice(options) => AnswerKey::Choice(
                options
                    .iter()
                    .map(|o| AnswerOption {
                        id: o.id,
                        option_text: o.option_text.clone(),
                        is_correct: false,
                    })
                    .collect(),
            ),
            AnswerKey::TrueFalse(_) => AnswerKey::TrueFalse(false),
            AnswerKey::Written(_) => AnswerKey::Written(String::new()),
            AnswerKey::FillInTheBlank(blanks) => AnswerKey::FillInTheBlank(
                blanks
                    .iter()
                    .map(|b| Blank {
                        id: b.id,
                        blank_text: String::new(),
                    })
                    .collect(),
            ),
        }
    }
}

/// A question with its answer and tags
#[derive(Debug, Clone)]
pub struct Question {
    pub id: i64,
    pub question_bank_id: i64,
    pub question_type: QuestionType,
    pub content: String,
    pub explanation: String,
    pub author_id: i64,
    pub author_name: String,
    pub created_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub answer: AnswerKey,
}

/// Input for creating or replacing a question
#[derive(Debug, Clone)]
pub struct QuestionDraft {
    pub question_bank_id: i64,
    pub question_type: QuestionType,
    pub content: String,
    pub explanation: String,
    pub author_id: i64,
    pub tags: Vec<String>,
    pub answer: AnswerKey,
}

impl QuestionDraft {
    /// Check that the answer shape fits the question type
    pub fn validate(&self) -> QuizbankResult<()> {
        if self.content.trim().is_empty() {
            return Err(crate::validation_error!(
                "content must not be empty",
                "content",
                "question"
            ));
        }

        match (&self.question_type, &self.answer) {
            (kind, AnswerKey::Choice(options)) if kind.is_choice() => {
                if options.is_empty() {
                    return Err(crate::validation_error!(
                        "choice questions need at least one option",
                        "answer_options",
                        "question"
                    ));
                }
                let correct = options.iter().filter(|o| o.is_correct).count();
                if correct == 0 {
                    return Err(crate::validation_error!(
                        "at least one option must be correct",
                        "answer_options",
                        "question"
                    ));
                }
                if *kind == QuestionType::SingleChoice && correct > 1 {
                    return Err(crate::validation_error!(
                        "single choice questions have exactly one correct option",
                        "answer_options",
                        "question"
                    ));
                }
                Ok(())
            }
            (QuestionType::TrueFalse, AnswerKey::TrueFalse(_)) => Ok(()),
            (QuestionType::WrittenAnswer, AnswerKey::Written(_)) => Ok(()),
            (QuestionType::FillInTheBlank, AnswerKey::FillInTheBlank(blanks)) => {
                if blanks.is_empty() {
                    return Err(crate::validation_error!(
                        "fill-in-the-blank questions need at least one blank",
                        "blanks",
                        "question"
                    ));
                }
                Ok(())
            }
            _ => Err(QuizbankError::validation(
                "answer does not match question type",
                "question",
            )),
        }
    }
}

/// Per-(user, question) answer history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionAttempt {
    pub id: i64,
    pub user_id: i64,
    pub question_id: i64,
    pub attempts: i64,
    pub wrong: i64,
    pub consecutive_correct: i64,
    pub last_answer: serde_json::Value,
    pub last_answer_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Normalized pagination request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub page_size: i64,
}

impl Page {
    pub const DEFAULT_PAGE: i64 = 1;
    pub const DEFAULT_PAGE_SIZE: i64 = 10;
    pub const MAX_PAGE_SIZE: i64 = 100;

    /// Highest page whose offset still fits in an `i64`
    pub const MAX_PAGE: i64 = i64::MAX / Self::MAX_PAGE_SIZE;

    /// Missing or non-positive values fall back to the defaults
    pub fn new(page: Option<i64>, page_size: Option<i64>) -> Self {
        let page = page
            .filter(|p| *p > 0)
            .unwrap_or(Self::DEFAULT_PAGE)
            .min(Self::MAX_PAGE);
        let page_size = page_size
            .filter(|s| *s > 0)
            .unwrap_or(Self::DEFAULT_PAGE_SIZE)
            .min(Self::MAX_PAGE_SIZE);
        Self { page, page_size }
    }

    pub fn offset(&self) -> i64 {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Pagination metadata returned with list responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PageMeta {
    pub total_records: i64,
    pub current_page: i64,
    pub page_size: i64,
}

impl PageMeta {
    pub fn new(page: Page, total_records: i64) -> Self {
        Self {
            total_records,
            current_page: page.page,
            page_size: page.page_size,
        }
    }
}
