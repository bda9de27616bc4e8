//! SQLite-backed quiz store

use crate::database::db_error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quizbank_core::{
    AnswerKey, AnswerOption, Blank, Page, Question, QuestionAttempt, QuestionBank, QuestionDraft,
    QuestionType, QuizStore, QuizbankError, QuizbankResult,
};
use sqlx::{types::Json, SqliteConnection, SqlitePool};
use tracing::{debug, info};

const COMPONENT: &str = "quiz_store";

const QUESTION_COLUMNS: &str = "q.id, q.question_bank_id, q.question_type, q.content, \
     q.explanation, q.author_id, u.username AS author_name, q.created_at";

const QUESTION_FROM: &str = "FROM questions q JOIN users u ON u.id = q.author_id";

const TAG_FILTER: &str = "AND q.id IN (SELECT qt.question_id FROM question_tags qt \
     JOIN tags t ON t.id = qt.tag_id WHERE t.name = ?)";

#[derive(Debug, sqlx::FromRow)]
struct QuestionRecord {
    id: i64,
    question_bank_id: i64,
    question_type: i64,
    content: String,
    explanation: String,
    author_id: i64,
    author_name: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct AttemptRecord {
    id: i64,
    user_id: i64,
    question_id: i64,
    attempts: i64,
    wrong: i64,
    consecutive_correct: i64,
    last_answer: Json<serde_json::Value>,
    last_answer_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AttemptRecord> for QuestionAttempt {
    fn from(record: AttemptRecord) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            question_id: record.question_id,
            attempts: record.attempts,
            wrong: record.wrong,
            consecutive_correct: record.consecutive_correct,
            last_answer: record.last_answer.0,
            last_answer_at: record.last_answer_at,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Question banks, questions and attempts over a SQLite pool
#[derive(Debug, Clone)]
pub struct SqliteQuizStore {
    pool: SqlitePool,
}

impl SqliteQuizStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn connection(&self) -> QuizbankResult<sqlx::pool::PoolConnection<sqlx::Sqlite>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| db_error(e, COMPONENT, "acquire"))
    }

    async fn begin(&self) -> QuizbankResult<sqlx::Transaction<'static, sqlx::Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(|e| db_error(e, COMPONENT, "begin"))
    }
}

async fn ensure_bank(conn: &mut SqliteConnection, bank_id: i64) -> QuizbankResult<()> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM question_banks WHERE id = ?")
        .bind(bank_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| db_error(e, COMPONENT, "find_bank"))?;

    match exists {
        Some(_) => Ok(()),
        None => Err(QuizbankError::not_found(
            format!("question bank {}", bank_id),
            COMPONENT,
        )),
    }
}

async fn load_answer(
    conn: &mut SqliteConnection,
    question_id: i64,
    kind: QuestionType,
) -> QuizbankResult<AnswerKey> {
    match kind {
        QuestionType::SingleChoice | QuestionType::MultipleChoice => {
            let rows: Vec<(i64, String, bool)> = sqlx::query_as(
                "SELECT id, option_text, is_correct FROM answer_options \
                 WHERE question_id = ? ORDER BY id",
            )
            .bind(question_id)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| db_error(e, COMPONENT, "load_options"))?;

            Ok(AnswerKey::Choice(
                rows.into_iter()
                    .map(|(id, option_text, is_correct)| AnswerOption {
                        id: Some(id),
                        option_text,
                        is_correct,
                    })
                    .collect(),
            ))
        }
        QuestionType::TrueFalse => {
            let value: Option<bool> =
                sqlx::query_scalar("SELECT is_true FROM true_false_answers WHERE question_id = ?")
                    .bind(question_id)
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(|e| db_error(e, COMPONENT, "load_true_false"))?;

            value.map(AnswerKey::TrueFalse).ok_or_else(|| {
                QuizbankError::internal(
                    format!("question {} has no true/false answer", question_id),
                    COMPONENT,
                )
            })
        }
        QuestionType::WrittenAnswer => {
            let text: Option<String> =
                sqlx::query_scalar("SELECT answer_text FROM written_answers WHERE question_id = ?")
                    .bind(question_id)
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(|e| db_error(e, COMPONENT, "load_written"))?;

            Ok(AnswerKey::Written(text.unwrap_or_default()))
        }
        QuestionType::FillInTheBlank => {
            let rows: Vec<(i64, String)> = sqlx::query_as(
                "SELECT id, blank_text FROM fill_in_the_blank_answers \
                 WHERE question_id = ? ORDER BY position",
            )
            .bind(question_id)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| db_error(e, COMPONENT, "load_blanks"))?;

            Ok(AnswerKey::FillInTheBlank(
                rows.into_iter()
                    .map(|(id, blank_text)| Blank {
                        id: Some(id),
                        blank_text,
                    })
                    .collect(),
            ))
        }
    }
}

async fn load_tags(conn: &mut SqliteConnection, question_id: i64) -> QuizbankResult<Vec<String>> {
    sqlx::query_scalar(
        "SELECT t.name FROM tags t JOIN question_tags qt ON qt.tag_id = t.id \
         WHERE qt.question_id = ? ORDER BY t.name",
    )
    .bind(question_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| db_error(e, COMPONENT, "load_tags"))
}

async fn hydrate(conn: &mut SqliteConnection, record: QuestionRecord) -> QuizbankResult<Question> {
    let question_type = QuestionType::try_from(record.question_type)
        .map_err(|e| QuizbankError::internal(e, COMPONENT))?;
    let answer = load_answer(conn, record.id, question_type).await?;
    let tags = load_tags(conn, record.id).await?;

    Ok(Question {
        id: record.id,
        question_bank_id: record.question_bank_id,
        question_type,
        content: record.content,
        explanation: record.explanation,
        author_id: record.author_id,
        author_name: record.author_name,
        created_at: record.created_at,
        tags,
        answer,
    })
}

async fn hydrate_all(
    conn: &mut SqliteConnection,
    records: Vec<QuestionRecord>,
) -> QuizbankResult<Vec<Question>> {
    let mut questions = Vec::with_capacity(records.len());
    for record in records {
        questions.push(hydrate(conn, record).await?);
    }
    Ok(questions)
}

async fn fetch_question(
    conn: &mut SqliteConnection,
    id: i64,
) -> QuizbankResult<Option<Question>> {
    let record: Option<QuestionRecord> = sqlx::query_as(&format!(
        "SELECT {} {} WHERE q.id = ?",
        QUESTION_COLUMNS, QUESTION_FROM
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| db_error(e, COMPONENT, "get_question"))?;

    match record {
        Some(record) => hydrate(conn, record).await.map(Some),
        None => Ok(None),
    }
}

async fn write_answer(
    conn: &mut SqliteConnection,
    question_id: i64,
    answer: &AnswerKey,
) -> QuizbankResult<()> {
    match answer {
        AnswerKey::Choice(options) => {
            for option in options {
                sqlx::query(
                    "INSERT INTO answer_options (question_id, option_text, is_correct) VALUES (?, ?, ?)",
                )
                .bind(question_id)
                .bind(&option.option_text)
                .bind(option.is_correct)
                .execute(&mut *conn)
                .await
                .map_err(|e| db_error(e, COMPONENT, "insert_option"))?;
            }
        }
        AnswerKey::TrueFalse(value) => {
            sqlx::query("INSERT INTO true_false_answers (question_id, is_true) VALUES (?, ?)")
                .bind(question_id)
                .bind(value)
                .execute(&mut *conn)
                .await
                .map_err(|e| db_error(e, COMPONENT, "insert_true_false"))?;
        }
        AnswerKey::Written(text) => {
            sqlx::query("INSERT INTO written_answers (question_id, answer_text) VALUES (?, ?)")
                .bind(question_id)
                .bind(text)
                .execute(&mut *conn)
                .await
                .map_err(|e| db_error(e, COMPONENT, "insert_written"))?;
        }
        AnswerKey::FillInTheBlank(blanks) => {
            for (position, blank) in blanks.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO fill_in_the_blank_answers (question_id, position, blank_text) \
                     VALUES (?, ?, ?)",
                )
                .bind(question_id)
                .bind(position as i64)
                .bind(&blank.blank_text)
                .execute(&mut *conn)
                .await
                .map_err(|e| db_error(e, COMPONENT, "insert_blank"))?;
            }
        }
    }
    Ok(())
}

async fn clear_answer(conn: &mut SqliteConnection, question_id: i64) -> QuizbankResult<()> {
    for statement in [
        "DELETE FROM answer_options WHERE question_id = ?",
        "DELETE FROM true_false_answers WHERE question_id = ?",
        "DELETE FROM written_answers WHERE question_id = ?",
        "DELETE FROM fill_in_the_blank_answers WHERE question_id = ?",
    ] {
        sqlx::query(statement)
            .bind(question_id)
            .execute(&mut *conn)
            .await
            .map_err(|e| db_error(e, COMPONENT, "clear_answer"))?;
    }
    Ok(())
}

/// Link tags by name, creating unknown ones
async fn write_tags(
    conn: &mut SqliteConnection,
    question_id: i64,
    tags: &[String],
) -> QuizbankResult<()> {
    for name in tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        sqlx::query("INSERT INTO tags (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
            .bind(name)
            .execute(&mut *conn)
            .await
            .map_err(|e| db_error(e, COMPONENT, "create_tag"))?;

        let tag_id: i64 = sqlx::query_scalar("SELECT id FROM tags WHERE name = ?")
            .bind(name)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| db_error(e, COMPONENT, "find_tag"))?;

        sqlx::query("INSERT OR IGNORE INTO question_tags (question_id, tag_id) VALUES (?, ?)")
            .bind(question_id)
            .bind(tag_id)
            .execute(&mut *conn)
            .await
            .map_err(|e| db_error(e, COMPONENT, "attach_tag"))?;
    }
    Ok(())
}

fn missing_question(id: i64) -> QuizbankError {
    QuizbankError::not_found(format!("question {}", id), COMPONENT)
}

#[async_trait]
impl QuizStore for SqliteQuizStore {
    async fn list_banks(&self) -> QuizbankResult<Vec<QuestionBank>> {
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, name FROM question_banks ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_error(e, COMPONENT, "list_banks"))?;

        Ok(rows
            .into_iter()
            .map(|(id, name)| QuestionBank { id, name })
            .collect())
    }

    async fn create_bank(&self, name: &str) -> QuizbankResult<QuestionBank> {
        let id = sqlx::query("INSERT INTO question_banks (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| match db_error(e, COMPONENT, "create_bank") {
                QuizbankError::Conflict { .. } => QuizbankError::conflict(
                    format!("question bank '{}' already exists", name),
                    COMPONENT,
                ),
                other => other,
            })?
            .last_insert_rowid();

        info!(bank_id = id, name, "Question bank created");
        Ok(QuestionBank {
            id,
            name: name.to_string(),
        })
    }

    async fn create_question(&self, draft: QuestionDraft) -> QuizbankResult<Question> {
        let mut tx = self.begin().await?;
        ensure_bank(&mut tx, draft.question_bank_id).await?;

        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO questions \
             (question_bank_id, question_type, content, explanation, author_id, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(draft.question_bank_id)
        .bind(draft.question_type.code())
        .bind(&draft.content)
        .bind(&draft.explanation)
        .bind(draft.author_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error(e, COMPONENT, "insert_question"))?
        .last_insert_rowid();

        write_answer(&mut tx, id, &draft.answer).await?;
        write_tags(&mut tx, id, &draft.tags).await?;
        let question = fetch_question(&mut tx, id)
            .await?
            .ok_or_else(|| missing_question(id))?;

        tx.commit()
            .await
            .map_err(|e| db_error(e, COMPONENT, "commit"))?;

        info!(question_id = id, bank_id = draft.question_bank_id, "Question created");
        Ok(question)
    }

    async fn update_question(&self, id: i64, draft: QuestionDraft) -> QuizbankResult<Question> {
        let mut tx = self.begin().await?;

        let affected = sqlx::query(
            "UPDATE questions SET question_type = ?, content = ?, explanation = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(draft.question_type.code())
        .bind(&draft.content)
        .bind(&draft.explanation)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error(e, COMPONENT, "update_question"))?
        .rows_affected();

        if affected == 0 {
            return Err(missing_question(id));
        }

        clear_answer(&mut tx, id).await?;
        write_answer(&mut tx, id, &draft.answer).await?;

        sqlx::query("DELETE FROM question_tags WHERE question_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error(e, COMPONENT, "clear_tags"))?;
        write_tags(&mut tx, id, &draft.tags).await?;

        let question = fetch_question(&mut tx, id)
            .await?
            .ok_or_else(|| missing_question(id))?;

        tx.commit()
            .await
            .map_err(|e| db_error(e, COMPONENT, "commit"))?;

        debug!(question_id = id, "Question updated");
        Ok(question)
    }

    async fn delete_question(&self, id: i64) -> QuizbankResult<()> {
        let mut tx = self.begin().await?;

        clear_answer(&mut tx, id).await?;
        for statement in [
            "DELETE FROM question_tags WHERE question_id = ?",
            "DELETE FROM question_attempts WHERE question_id = ?",
        ] {
            sqlx::query(statement)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error(e, COMPONENT, "delete_question_links"))?;
        }

        let affected = sqlx::query("DELETE FROM questions WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error(e, COMPONENT, "delete_question"))?
            .rows_affected();

        if affected == 0 {
            return Err(missing_question(id));
        }

        tx.commit()
            .await
            .map_err(|e| db_error(e, COMPONENT, "commit"))?;

        info!(question_id = id, "Question deleted");
        Ok(())
    }

    async fn get_question(&self, id: i64) -> QuizbankResult<Option<Question>> {
        let mut conn = self.connection().await?;
        fetch_question(&mut conn, id).await
    }

    async fn list_questions(
        &self,
        bank_id: i64,
        tag: Option<&str>,
        page: Page,
    ) -> QuizbankResult<(Vec<Question>, i64)> {
        let mut conn = self.connection().await?;
        ensure_bank(&mut conn, bank_id).await?;

        let filter = if tag.is_some() { TAG_FILTER } else { "" };

        let count_sql = format!(
            "SELECT COUNT(*) FROM questions q WHERE q.question_bank_id = ? {}",
            filter
        );
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql).bind(bank_id);
        if let Some(tag) = tag {
            count_query = count_query.bind(tag);
        }
        let total: i64 = count_query
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| db_error(e, COMPONENT, "count_questions"))?;

        let list_sql = format!(
            "SELECT {} {} WHERE q.question_bank_id = ? {} ORDER BY q.id LIMIT ? OFFSET ?",
            QUESTION_COLUMNS, QUESTION_FROM, filter
        );
        let mut list_query = sqlx::query_as::<_, QuestionRecord>(&list_sql).bind(bank_id);
        if let Some(tag) = tag {
            list_query = list_query.bind(tag);
        }
        let records = list_query
            .bind(page.page_size)
            .bind(page.offset())
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| db_error(e, COMPONENT, "list_questions"))?;

        let questions = hydrate_all(&mut conn, records).await?;
        Ok((questions, total))
    }

    async fn random_questions(&self, bank_id: i64, limit: i64) -> QuizbankResult<Vec<Question>> {
        let mut conn = self.connection().await?;
        ensure_bank(&mut conn, bank_id).await?;

        let records: Vec<QuestionRecord> = sqlx::query_as(&format!(
            "SELECT {} {} WHERE q.question_bank_id = ? ORDER BY RANDOM() LIMIT ?",
            QUESTION_COLUMNS, QUESTION_FROM
        ))
        .bind(bank_id)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| db_error(e, COMPONENT, "random_questions"))?;

        hydrate_all(&mut conn, records).await
    }

    async fn record_attempt(
        &self,
        user_id: i64,
        question_id: i64,
        correct: bool,
        answer: serde_json::Value,
        at: DateTime<Utc>,
    ) -> QuizbankResult<QuestionAttempt> {
        let (wrong, streak) = if correct { (0_i64, 1_i64) } else { (1, 0) };

        let record: AttemptRecord = sqlx::query_as(
            "INSERT INTO question_attempts \
             (user_id, question_id, attempts, wrong, consecutive_correct, last_answer, \
              last_answer_at, created_at, updated_at) \
             VALUES (?, ?, 1, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(user_id, question_id) DO UPDATE SET \
               attempts = question_attempts.attempts + 1, \
               wrong = question_attempts.wrong + excluded.wrong, \
               consecutive_correct = CASE WHEN excluded.consecutive_correct > 0 \
                 THEN question_attempts.consecutive_correct + 1 ELSE 0 END, \
               last_answer = excluded.last_answer, \
               last_answer_at = excluded.last_answer_at, \
               updated_at = excluded.updated_at \
             RETURNING *",
        )
        .bind(user_id)
        .bind(question_id)
        .bind(wrong)
        .bind(streak)
        .bind(Json(&answer))
        .bind(at)
        .bind(at)
        .bind(at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, COMPONENT, "record_attempt"))?;

        Ok(QuestionAttempt::from(record))
    }

    async fn attempts_below(
        &self,
        user_id: i64,
        bank_id: i64,
        threshold: i64,
    ) -> QuizbankResult<Vec<QuestionAttempt>> {
        let records: Vec<AttemptRecord> = sqlx::query_as(
            "SELECT a.* FROM question_attempts a \
             JOIN questions q ON q.id = a.question_id \
             WHERE a.user_id = ? AND q.question_bank_id = ? AND a.consecutive_correct < ? \
             ORDER BY a.id",
        )
        .bind(user_id)
        .bind(bank_id)
        .bind(threshold)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error(e, COMPONENT, "attempts_below"))?;

        Ok(records.into_iter().map(QuestionAttempt::from).collect())
    }
}
