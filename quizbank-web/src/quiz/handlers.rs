//! Question bank, question and attempt endpoints

use crate::{
    auth::AuthUser,
    handlers::response::{ApiResponse, ApiResult, JsonBody},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use quizbank_core::{
    AnswerKey, AnswerOption, Blank, Page, PageMeta, Question, QuestionAttempt, QuestionBank,
    QuestionDraft, QuestionType, QuizbankResult,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBankRequest {
    pub name: String,
}

/// Question payload; which answer field is read depends on `question_type`
#[derive(Debug, Deserialize, ToSchema)]
pub struct QuestionRequest {
    pub content: String,
    /// 0 single choice, 1 multiple choice, 2 true/false, 3 written, 4 fill-in-the-blank
    #[schema(value_type = i64)]
    pub question_type: QuestionType,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub answer_options: Option<Vec<AnswerOption>>,
    #[serde(default)]
    pub true_false: Option<bool>,
    #[serde(default)]
    pub answer_text: Option<String>,
    #[serde(default)]
    pub blanks: Option<Vec<Blank>>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl QuestionRequest {
    pub fn into_draft(self, question_bank_id: i64, author_id: i64) -> QuizbankResult<QuestionDraft> {
        let answer = match self.question_type {
            QuestionType::SingleChoice | QuestionType::MultipleChoice => {
                AnswerKey::Choice(self.answer_options.unwrap_or_default())
            }
            QuestionType::TrueFalse => match self.true_false {
                Some(value) => AnswerKey::TrueFalse(value),
                None => {
                    return Err(quizbank_core::validation_error!(
                        "true_false is required for true/false questions",
                        "true_false",
                        "quiz"
                    ))
                }
            },
            QuestionType::WrittenAnswer => AnswerKey::Written(self.answer_text.unwrap_or_default()),
            QuestionType::FillInTheBlank => AnswerKey::FillInTheBlank(self.blanks.unwrap_or_default()),
        };

        Ok(QuestionDraft {
            question_bank_id,
            question_type: self.question_type,
            content: self.content,
            explanation: self.explanation.unwrap_or_default(),
            author_id,
            tags: self.tags,
            answer,
        })
    }
}

/// A question as returned to clients
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct QuestionResponse {
    pub id: i64,
    pub question_bank_id: i64,
    pub question_type: i64,
    pub content: String,
    pub explanation: String,
    pub author_id: i64,
    pub author_name: String,
    pub created_at: DateTime<Utc>,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_options: Option<Vec<AnswerOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub true_false_answer: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub written_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_in_the_blanks: Option<Vec<Blank>>,
}

impl QuestionResponse {
    /// Full detail including the answer key
    pub fn detailed(question: Question) -> Self {
        let answer = question.answer.clone();
        Self::with_answer(question, answer, true)
    }

    /// Answer key stripped for quiz-taking
    pub fn redacted(question: Question) -> Self {
        let answer = question.answer.redacted();
        Self::with_answer(question, answer, false)
    }

    fn with_answer(question: Question, answer: AnswerKey, reveal: bool) -> Self {
        let mut response = Self {
            id: question.id,
            question_bank_id: question.question_bank_id,
            question_type: question.question_type.code(),
            content: question.content,
            explanation: if reveal {
                question.explanation
            } else {
                String::new()
            },
            author_id: question.author_id,
            author_name: question.author_name,
            created_at: question.created_at,
            tags: question.tags,
            answer_options: None,
            true_false_answer: None,
            written_answer: None,
            fill_in_the_blanks: None,
        };

        match answer {
            AnswerKey::Choice(options) => response.answer_options = Some(options),
            AnswerKey::TrueFalse(value) if reveal => response.true_false_answer = Some(value),
            AnswerKey::Written(text) if reveal => response.written_answer = Some(text),
            AnswerKey::FillInTheBlank(blanks) => response.fill_in_the_blanks = Some(blanks),
            _ => {}
        }
        response
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct QuestionListQuery {
    pub tag: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct RandomQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ThresholdQuery {
    pub threshold: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AttemptRequest {
    pub question_id: i64,
    /// Option ids, a boolean, an array of blank texts or free text
    #[schema(value_type = Object)]
    pub answer: Value,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AttemptResponse {
    pub question_id: i64,
    pub attempts: i64,
    pub wrong: i64,
    pub consecutive_correct: i64,
    pub last_answer_at: DateTime<Utc>,
    pub correct: bool,
}

/// A stored attempt record
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AttemptRecordResponse {
    pub question_id: i64,
    pub attempts: i64,
    pub wrong: i64,
    pub consecutive_correct: i64,
    #[schema(value_type = Object)]
    pub last_answer: Value,
    pub last_answer_at: DateTime<Utc>,
}

impl From<QuestionAttempt> for AttemptRecordResponse {
    fn from(attempt: QuestionAttempt) -> Self {
        Self {
            question_id: attempt.question_id,
            attempts: attempt.attempts,
            wrong: attempt.wrong,
            consecutive_correct: attempt.consecutive_correct,
            last_answer: attempt.last_answer,
            last_answer_at: attempt.last_answer_at,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/quiz/question_banks",
    tag = "Quiz",
    responses((status = 200, description = "All question banks", body = [QuestionBank])),
    security(("bearer_auth" = []))
)]
pub async fn list_banks(
    State(state): State<AppState>,
) -> ApiResult<Json<ApiResponse<Vec<QuestionBank>>>> {
    let banks = state.quiz.list_banks().await?;
    Ok(ApiResponse::success(banks))
}

#[utoipa::path(
    post,
    path = "/api/quiz/question_banks",
    tag = "Quiz",
    request_body = CreateBankRequest,
    responses(
        (status = 201, description = "Bank created", body = QuestionBank),
        (status = 409, description = "Name already taken")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_bank(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<CreateBankRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<QuestionBank>>)> {
    let bank = state.quiz.create_bank(&request.name).await?;
    Ok(ApiResponse::created(bank))
}

#[utoipa::path(
    get,
    path = "/api/quiz/question_banks/{id}/questions",
    tag = "Quiz",
    params(("id" = i64, Path, description = "Question bank id"), QuestionListQuery),
    responses(
        (status = 200, description = "One page of questions", body = [QuestionResponse]),
        (status = 404, description = "Unknown bank")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_questions(
    State(state): State<AppState>,
    Path(bank_id): Path<i64>,
    Query(query): Query<QuestionListQuery>,
) -> ApiResult<Json<ApiResponse<Vec<QuestionResponse>>>> {
    let page = Page::new(query.page, query.page_size);
    let (questions, total) = state
        .quiz
        .list_questions(bank_id, query.tag.as_deref(), page)
        .await?;

    let data = questions
        .into_iter()
        .map(QuestionResponse::detailed)
        .collect();
    Ok(ApiResponse::paged(data, PageMeta::new(page, total)))
}

#[utoipa::path(
    post,
    path = "/api/quiz/question_banks/{id}/questions",
    tag = "Quiz",
    params(("id" = i64, Path, description = "Question bank id")),
    request_body = QuestionRequest,
    responses(
        (status = 201, description = "Question created", body = QuestionResponse),
        (status = 400, description = "Invalid question"),
        (status = 404, description = "Unknown bank")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_question(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(bank_id): Path<i64>,
    JsonBody(request): JsonBody<QuestionRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<QuestionResponse>>)> {
    let draft = request.into_draft(bank_id, user.id)?;
    let question = state.quiz.create_question(draft).await?;
    info!(question_id = question.id, author_id = user.id, "Question created");
    Ok(ApiResponse::created(QuestionResponse::detailed(question)))
}

#[utoipa::path(
    get,
    path = "/api/quiz/questions/{id}",
    tag = "Quiz",
    params(("id" = i64, Path, description = "Question id")),
    responses(
        (status = 200, description = "Question with answers", body = QuestionResponse),
        (status = 404, description = "Unknown question")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_question(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ApiResponse<QuestionResponse>>> {
    let question = state.quiz.get_question(id).await?;
    Ok(ApiResponse::success(QuestionResponse::detailed(question)))
}

#[utoipa::path(
    put,
    path = "/api/quiz/questions/{id}",
    tag = "Quiz",
    params(("id" = i64, Path, description = "Question id")),
    request_body = QuestionRequest,
    responses(
        (status = 200, description = "Question replaced", body = QuestionResponse),
        (status = 400, description = "Invalid question"),
        (status = 404, description = "Unknown question")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_question(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(request): JsonBody<QuestionRequest>,
) -> ApiResult<Json<ApiResponse<QuestionResponse>>> {
    let existing = state.quiz.get_question(id).await?;
    let draft = request.into_draft(existing.question_bank_id, existing.author_id)?;
    let question = state.quiz.update_question(id, draft).await?;
    Ok(ApiResponse::success(QuestionResponse::detailed(question)))
}

#[utoipa::path(
    delete,
    path = "/api/quiz/questions/{id}",
    tag = "Quiz",
    params(("id" = i64, Path, description = "Question id")),
    responses(
        (status = 204, description = "Question deleted"),
        (status = 404, description = "Unknown question")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_question(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.quiz.delete_question(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/quiz/question_banks/{id}/random_questions",
    tag = "Quiz",
    params(("id" = i64, Path, description = "Question bank id"), RandomQuery),
    responses(
        (status = 200, description = "Random questions without answers", body = [QuestionResponse]),
        (status = 404, description = "Unknown bank")
    ),
    security(("bearer_auth" = []))
)]
pub async fn random_questions(
    State(state): State<AppState>,
    Path(bank_id): Path<i64>,
    Query(query): Query<RandomQuery>,
) -> ApiResult<Json<ApiResponse<Vec<QuestionResponse>>>> {
    let questions = state.quiz.random_questions(bank_id, query.limit).await?;
    let data = questions
        .into_iter()
        .map(QuestionResponse::redacted)
        .collect();
    Ok(ApiResponse::success(data))
}

#[utoipa::path(
    post,
    path = "/api/quiz/question_attempts",
    tag = "Quiz",
    request_body = AttemptRequest,
    responses(
        (status = 200, description = "Scored attempt", body = AttemptResponse),
        (status = 400, description = "Answer does not fit the question type"),
        (status = 404, description = "Unknown question")
    ),
    security(("bearer_auth" = []))
)]
pub async fn submit_attempt(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(request): JsonBody<AttemptRequest>,
) -> ApiResult<Json<ApiResponse<AttemptResponse>>> {
    let scored = state
        .quiz
        .record_attempt(user.id, request.question_id, request.answer)
        .await?;

    let attempt = scored.attempt;
    Ok(ApiResponse::success(AttemptResponse {
        question_id: attempt.question_id,
        attempts: attempt.attempts,
        wrong: attempt.wrong,
        consecutive_correct: attempt.consecutive_correct,
        last_answer_at: attempt.last_answer_at,
        correct: scored.correct,
    }))
}

#[utoipa::path(
    get,
    path = "/api/quiz/question_attempts/{user_id}/{question_bank_id}",
    tag = "Quiz",
    params(
        ("user_id" = i64, Path, description = "User id"),
        ("question_bank_id" = i64, Path, description = "Question bank id"),
        ThresholdQuery
    ),
    responses(
        (status = 200, description = "Attempts below the consecutive-correct threshold", body = [AttemptRecordResponse])
    ),
    security(("bearer_auth" = []))
)]
pub async fn attempts_below(
    State(state): State<AppState>,
    Path((user_id, bank_id)): Path<(i64, i64)>,
    Query(query): Query<ThresholdQuery>,
) -> ApiResult<Json<ApiResponse<Vec<AttemptRecordResponse>>>> {
    let attempts = state
        .quiz
        .attempts_below(user_id, bank_id, query.threshold)
        .await?;
    Ok(ApiResponse::success(
        attempts.into_iter().map(AttemptRecordResponse::from).collect(),
    ))
}
