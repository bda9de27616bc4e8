//! SQLite connection pool and schema

use quizbank_core::{ErrorContext, QuizbankError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::{WebError, WebResult};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        status INTEGER NOT NULL,
        token_version INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS roles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS permissions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        description TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_roles (
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        role_id INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
        PRIMARY KEY (user_id, role_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS role_permissions (
        role_id INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
        permission_id INTEGER NOT NULL REFERENCES permissions(id) ON DELETE CASCADE,
        PRIMARY KEY (role_id, permission_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS question_banks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS questions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        question_bank_id INTEGER NOT NULL REFERENCES question_banks(id) ON DELETE CASCADE,
        question_type INTEGER NOT NULL,
        content TEXT NOT NULL,
        explanation TEXT NOT NULL DEFAULT '',
        author_id INTEGER NOT NULL REFERENCES users(id),
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_questions_bank ON questions(question_bank_id)",
    r#"
    CREATE TABLE IF NOT EXISTS answer_options (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        question_id INTEGER NOT NULL REFERENCES questions(id) ON DELETE CASCADE,
        option_text TEXT NOT NULL,
        is_correct INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS true_false_answers (
        question_id INTEGER PRIMARY KEY REFERENCES questions(id) ON DELETE CASCADE,
        is_true INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS written_answers (
        question_id INTEGER PRIMARY KEY REFERENCES questions(id) ON DELETE CASCADE,
        answer_text TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS fill_in_the_blank_answers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        question_id INTEGER NOT NULL REFERENCES questions(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        blank_text TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS question_tags (
        question_id INTEGER NOT NULL REFERENCES questions(id) ON DELETE CASCADE,
        tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
        PRIMARY KEY (question_id, tag_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS question_attempts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        question_id INTEGER NOT NULL REFERENCES questions(id) ON DELETE CASCADE,
        attempts INTEGER NOT NULL,
        wrong INTEGER NOT NULL,
        consecutive_correct INTEGER NOT NULL,
        last_answer TEXT NOT NULL,
        last_answer_at TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (user_id, question_id)
    )
    "#,
];

/// Open the pool and create any missing tables.
///
/// In-memory databases live only as long as their connection, so they get
/// a single connection that is never recycled.
pub async fn connect(
    database_url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> WebResult<SqlitePool> {
    info!("Connecting to database: {}", database_url);

    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| WebError::Database(format!("Invalid database URL: {}", e)))?
        .create_if_missing(true)
        .foreign_keys(true);

    let in_memory = database_url.contains(":memory:");
    let mut pool_options = SqlitePoolOptions::new().acquire_timeout(acquire_timeout);
    pool_options = if in_memory {
        pool_options
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        pool_options.max_connections(max_connections.max(1))
    };

    let pool = pool_options.connect_with(options).await.map_err(|e| {
        error!("Database connection failed: {}", e);
        WebError::Database(format!("Failed to connect to database: {}", e))
    })?;

    create_tables(&pool).await?;
    info!("Database ready");
    Ok(pool)
}

async fn create_tables(pool: &SqlitePool) -> WebResult<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await.map_err(|e| {
            error!("Failed to apply schema statement: {}", e);
            WebError::Database(format!("Failed to create tables: {}", e))
        })?;
    }
    debug!(statements = SCHEMA.len(), "Schema applied");
    Ok(())
}

/// Wrap a sqlx error with context; unique violations become conflicts and
/// missing rows become not-found
pub(crate) fn db_error(e: sqlx::Error, component: &str, operation: &str) -> QuizbankError {
    if matches!(e, sqlx::Error::RowNotFound) {
        return QuizbankError::not_found(format!("{}: no matching row", operation), component);
    }

    if let Some(db) = e.as_database_error() {
        if db.is_unique_violation() {
            return QuizbankError::Conflict {
                message: format!("{}: already exists", operation),
                context: ErrorContext::new(component).with_operation(operation),
            };
        }
    }

    error!(component, operation, error = %e, "Database operation failed");
    QuizbankError::Storage {
        message: format!("{} failed", operation),
        source: Some(Box::new(e)),
        context: ErrorContext::new(component).with_operation(operation),
    }
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    connect("sqlite::memory:", 1, Duration::from_secs(5))
        .await
        .expect("in-memory database")
}
