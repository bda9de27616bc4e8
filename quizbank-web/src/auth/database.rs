//! SQLite-backed credential store

use crate::database::db_error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quizbank_core::{
    CredentialStore, NewUser, Permission, QuizbankError, QuizbankResult, Role, User, UserStatus,
    UserUpdate,
};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

const COMPONENT: &str = "credential_store";

/// Database user record
#[derive(Debug, sqlx::FromRow)]
struct UserRecord {
    id: i64,
    username: String,
    password_hash: String,
    status: i64,
    token_version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRecord {
    fn into_user(self, roles: Vec<Role>) -> QuizbankResult<User> {
        let status = UserStatus::try_from(self.status)
            .map_err(|e| QuizbankError::internal(e, COMPONENT))?;

        Ok(User {
            id: self.id,
            username: self.username,
            password_hash: self.password_hash,
            status,
            token_version: self.token_version,
            created_at: self.created_at,
            updated_at: self.updated_at,
            roles,
        })
    }
}

const USER_COLUMNS: &str =
    "id, username, password_hash, status, token_version, created_at, updated_at";

/// Credential store over a SQLite pool
#[derive(Debug, Clone)]
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn connection(&self) -> QuizbankResult<sqlx::pool::PoolConnection<sqlx::Sqlite>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| db_error(e, COMPONENT, "acquire"))
    }
}

async fn roles_of(conn: &mut SqliteConnection, user_id: i64) -> QuizbankResult<Vec<Role>> {
    let rows: Vec<(i64, String)> = sqlx::query_as(
        "SELECT r.id, r.name FROM roles r \
         JOIN user_roles ur ON ur.role_id = r.id \
         WHERE ur.user_id = ? ORDER BY r.name",
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| db_error(e, COMPONENT, "load_user_roles"))?;

    Ok(rows
        .into_iter()
        .map(|(id, name)| Role { id, name })
        .collect())
}

async fn with_roles(
    conn: &mut SqliteConnection,
    record: Option<UserRecord>,
) -> QuizbankResult<Option<User>> {
    match record {
        Some(record) => {
            let roles = roles_of(conn, record.id).await?;
            record.into_user(roles).map(Some)
        }
        None => Ok(None),
    }
}

/// Link the named roles to a user; any unknown name fails the call
async fn attach_roles(
    conn: &mut SqliteConnection,
    user_id: i64,
    role_names: &[String],
) -> QuizbankResult<()> {
    for name in role_names {
        let role_id: Option<i64> = sqlx::query_scalar("SELECT id FROM roles WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| db_error(e, COMPONENT, "find_role"))?;

        let role_id =
            role_id.ok_or_else(|| QuizbankError::not_found(format!("role '{}'", name), COMPONENT))?;

        sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(role_id)
            .execute(&mut *conn)
            .await
            .map_err(|e| db_error(e, COMPONENT, "attach_role"))?;
    }
    Ok(())
}

fn username_taken(e: sqlx::Error, username: &str, operation: &str) -> QuizbankError {
    match db_error(e, COMPONENT, operation) {
        QuizbankError::Conflict { .. } => {
            QuizbankError::conflict(format!("username '{}' already exists", username), COMPONENT)
        }
        other => other,
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn count_users(&self) -> QuizbankResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error(e, COMPONENT, "count_users"))
    }

    async fn insert_user(&self, user: NewUser) -> QuizbankResult<User> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error(e, COMPONENT, "begin"))?;

        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO users (username, password_hash, status, token_version, created_at, updated_at) \
             VALUES (?, ?, ?, 1, ?, ?)",
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.status.code())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| username_taken(e, &user.username, "insert_user"))?
        .last_insert_rowid();

        attach_roles(&mut tx, id, &user.roles).await?;
        let roles = roles_of(&mut tx, id).await?;

        tx.commit()
            .await
            .map_err(|e| db_error(e, COMPONENT, "commit"))?;

        info!(user_id = id, username = %user.username, "User created");
        Ok(User {
            id,
            username: user.username,
            password_hash: user.password_hash,
            status: user.status,
            token_version: 1,
            created_at: now,
            updated_at: now,
            roles,
        })
    }

    async fn update_user(&self, id: i64, update: UserUpdate) -> QuizbankResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error(e, COMPONENT, "begin"))?;

        let affected = sqlx::query(
            "UPDATE users SET username = ?, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&update.username)
        .bind(update.status.code())
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| username_taken(e, &update.username, "update_user"))?
        .rows_affected();

        if affected == 0 {
            return Err(QuizbankError::not_found(format!("user {}", id), COMPONENT));
        }

        if let Some(hash) = &update.password_hash {
            sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
                .bind(hash)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error(e, COMPONENT, "update_password"))?;
        }

        sqlx::query("DELETE FROM user_roles WHERE user_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error(e, COMPONENT, "clear_user_roles"))?;
        attach_roles(&mut tx, id, &update.roles).await?;

        tx.commit()
            .await
            .map_err(|e| db_error(e, COMPONENT, "commit"))?;

        debug!(user_id = id, "User updated");
        Ok(())
    }

    async fn find_user_by_id(&self, id: i64) -> QuizbankResult<Option<User>> {
        let mut conn = self.connection().await?;
        let record: Option<UserRecord> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
                .bind(id)
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| db_error(e, COMPONENT, "find_user_by_id"))?;

        with_roles(&mut conn, record).await
    }

    async fn find_user_by_username(&self, username: &str) -> QuizbankResult<Option<User>> {
        let mut conn = self.connection().await?;
        let record: Option<UserRecord> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE username = ?", USER_COLUMNS))
                .bind(username)
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| db_error(e, COMPONENT, "find_user_by_username"))?;

        with_roles(&mut conn, record).await
    }

    async fn list_users(&self) -> QuizbankResult<Vec<User>> {
        let mut conn = self.connection().await?;
        let records: Vec<UserRecord> =
            sqlx::query_as(&format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS))
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| db_error(e, COMPONENT, "list_users"))?;

        let mut users = Vec::with_capacity(records.len());
        for record in records {
            let roles = roles_of(&mut conn, record.id).await?;
            users.push(record.into_user(roles)?);
        }
        Ok(users)
    }

    async fn increment_token_version(&self, id: i64) -> QuizbankResult<()> {
        let affected = sqlx::query(
            "UPDATE users SET token_version = token_version + 1, updated_at = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error(e, COMPONENT, "increment_token_version"))?
        .rows_affected();

        if affected == 0 {
            return Err(QuizbankError::not_found(format!("user {}", id), COMPONENT));
        }
        Ok(())
    }

    async fn create_role(&self, name: &str) -> QuizbankResult<Role> {
        let mut conn = self.connection().await?;
        sqlx::query("INSERT INTO roles (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
            .bind(name)
            .execute(&mut *conn)
            .await
            .map_err(|e| db_error(e, COMPONENT, "create_role"))?;

        let (id, name): (i64, String) = sqlx::query_as("SELECT id, name FROM roles WHERE name = ?")
            .bind(name)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| db_error(e, COMPONENT, "create_role"))?;

        Ok(Role { id, name })
    }

    async fn find_role(&self, id: i64) -> QuizbankResult<Option<Role>> {
        let row: Option<(i64, String)> = sqlx::query_as("SELECT id, name FROM roles WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error(e, COMPONENT, "find_role"))?;

        Ok(row.map(|(id, name)| Role { id, name }))
    }

    async fn delete_role(&self, id: i64) -> QuizbankResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error(e, COMPONENT, "begin"))?;

        for statement in [
            "DELETE FROM role_permissions WHERE role_id = ?",
            "DELETE FROM user_roles WHERE role_id = ?",
        ] {
            sqlx::query(statement)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error(e, COMPONENT, "delete_role_links"))?;
        }

        let affected = sqlx::query("DELETE FROM roles WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error(e, COMPONENT, "delete_role"))?
            .rows_affected();

        if affected == 0 {
            return Err(QuizbankError::not_found(format!("role {}", id), COMPONENT));
        }

        tx.commit()
            .await
            .map_err(|e| db_error(e, COMPONENT, "commit"))?;
        info!(role_id = id, "Role deleted");
        Ok(())
    }

    async fn update_role(&self, id: i64, name: &str, permission_ids: &[i64]) -> QuizbankResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error(e, COMPONENT, "begin"))?;

        let affected = sqlx::query("UPDATE roles SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| match db_error(e, COMPONENT, "update_role") {
                QuizbankError::Conflict { .. } => {
                    QuizbankError::conflict(format!("role '{}' already exists", name), COMPONENT)
                }
                other => other,
            })?
            .rows_affected();

        if affected == 0 {
            return Err(QuizbankError::not_found(format!("role {}", id), COMPONENT));
        }

        sqlx::query("DELETE FROM role_permissions WHERE role_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error(e, COMPONENT, "clear_role_permissions"))?;

        for permission_id in permission_ids {
            let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM permissions WHERE id = ?")
                .bind(permission_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| db_error(e, COMPONENT, "find_permission"))?;

            if exists.is_none() {
                return Err(QuizbankError::not_found(
                    format!("permission {}", permission_id),
                    COMPONENT,
                ));
            }

            sqlx::query(
                "INSERT OR IGNORE INTO role_permissions (role_id, permission_id) VALUES (?, ?)",
            )
            .bind(id)
            .bind(permission_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error(e, COMPONENT, "attach_permission"))?;
        }

        tx.commit()
            .await
            .map_err(|e| db_error(e, COMPONENT, "commit"))?;
        info!(role_id = id, permissions = permission_ids.len(), "Role updated");
        Ok(())
    }

    async fn list_roles(&self) -> QuizbankResult<Vec<Role>> {
        let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, name FROM roles ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error(e, COMPONENT, "list_roles"))?;

        Ok(rows
            .into_iter()
            .map(|(id, name)| Role { id, name })
            .collect())
    }

    async fn role_permissions(&self, role_id: i64) -> QuizbankResult<Vec<Permission>> {
        if self.find_role(role_id).await?.is_none() {
            return Err(QuizbankError::not_found(format!("role {}", role_id), COMPONENT));
        }

        let rows: Vec<(i64, String, String)> = sqlx::query_as(
            "SELECT p.id, p.name, p.description FROM permissions p \
             JOIN role_permissions rp ON rp.permission_id = p.id \
             WHERE rp.role_id = ? ORDER BY p.id",
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error(e, COMPONENT, "role_permissions"))?;

        Ok(rows
            .into_iter()
            .map(|(id, name, description)| Permission {
                id,
                name,
                description,
            })
            .collect())
    }

    async fn list_permissions(&self) -> QuizbankResult<Vec<Permission>> {
        let rows: Vec<(i64, String, String)> =
            sqlx::query_as("SELECT id, name, description FROM permissions ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_error(e, COMPONENT, "list_permissions"))?;

        Ok(rows
            .into_iter()
            .map(|(id, name, description)| Permission {
                id,
                name,
                description,
            })
            .collect())
    }

    async fn ensure_permission(&self, name: &str, description: &str) -> QuizbankResult<Permission> {
        let mut conn = self.connection().await?;
        sqlx::query(
            "INSERT INTO permissions (name, description) VALUES (?, ?) \
             ON CONFLICT(name) DO UPDATE SET description = excluded.description",
        )
        .bind(name)
        .bind(description)
        .execute(&mut *conn)
        .await
        .map_err(|e| db_error(e, COMPONENT, "ensure_permission"))?;

        let (id, name, description): (i64, String, String) =
            sqlx::query_as("SELECT id, name, description FROM permissions WHERE name = ?")
                .bind(name)
                .fetch_one(&mut *conn)
                .await
                .map_err(|e| db_error(e, COMPONENT, "ensure_permission"))?;

        Ok(Permission {
            id,
            name,
            description,
        })
    }

    async fn role_permission_pairs(&self) -> QuizbankResult<Vec<(String, String)>> {
        sqlx::query_as(
            "SELECT r.name, p.name FROM role_permissions rp \
             JOIN roles r ON r.id = rp.role_id \
             JOIN permissions p ON p.id = rp.permission_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error(e, COMPONENT, "role_permission_pairs"))
    }
}
