//! User, role and token lifecycle service

use super::{
    jwt::{TokenPair, TokenService},
    password::{hash_password, verify_dummy, verify_password},
    policy::{PolicyEngine, ADMIN_ROLE},
};
use chrono::{DateTime, Utc};
use quizbank_core::{
    AuthConfig, CredentialStore, NewUser, Permission, QuizbankError, QuizbankResult, Role, User,
    UserStatus, UserUpdate,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

const COMPONENT: &str = "auth_service";

/// Message for every failed login, whatever the cause
pub const INVALID_CREDENTIALS: &str = "Invalid username or password";

/// User login request
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Self-service registration request
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

/// Token refresh request
#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub token: String,
}

/// Administrative user creation
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[schema(value_type = i64)]
    pub status: UserStatus,
}

/// Full replacement of a user's account data
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub username: String,
    /// Leave out to keep the current password
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[schema(value_type = i64)]
    pub status: UserStatus,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleRequest {
    pub name: String,
}

/// Rename a role and replace its permissions (by id)
#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleUpdateRequest {
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreatedResponse {
    pub id: i64,
}

/// Public view of a user account
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub token_version: i64,
    pub status: i64,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            created_at: user.created_at,
            updated_at: user.updated_at,
            token_version: user.token_version,
            status: user.status.code(),
        }
    }
}

/// The caller's own account with role names
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CurrentUserResponse {
    pub id: i64,
    pub username: String,
    pub roles: Vec<String>,
    pub status: i64,
}

impl From<&User> for CurrentUserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            roles: user.role_names(),
            status: user.status.code(),
        }
    }
}

/// Authentication, token lifecycle and role administration
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    tokens: TokenService,
    policy: PolicyEngine,
}

impl AuthService {
    /// Build the service; the policy is loaded from the store here
    pub async fn new(store: Arc<dyn CredentialStore>, config: &AuthConfig) -> QuizbankResult<Self> {
        let tokens = TokenService::new(config)?;
        let policy = PolicyEngine::new(store.clone()).await?;
        Ok(Self {
            store,
            tokens,
            policy,
        })
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    /// Hash the password and store the user with the named roles
    pub async fn create_user(
        &self,
        username: &str,
        password: &str,
        roles: Vec<String>,
        status: UserStatus,
    ) -> QuizbankResult<User> {
        validate_credentials(username, password)?;

        let password_hash = hash_password(password).await?;
        self.store
            .insert_user(NewUser {
                username: username.trim().to_string(),
                password_hash,
                status,
                roles,
            })
            .await
    }

    /// Self-registration: pending, no roles
    pub async fn register(&self, username: &str, password: &str) -> QuizbankResult<User> {
        self.create_user(username, password, Vec::new(), UserStatus::Pending)
            .await
    }

    pub async fn update_user(&self, id: i64, request: UpdateUserRequest) -> QuizbankResult<()> {
        if request.username.trim().is_empty() {
            return Err(quizbank_core::validation_error!(
                "username must not be empty",
                "username",
                COMPONENT
            ));
        }

        let password_hash = match request.password.as_deref() {
            Some(password) if !password.is_empty() => Some(hash_password(password).await?),
            _ => None,
        };

        self.store
            .update_user(
                id,
                UserUpdate {
                    username: request.username.trim().to_string(),
                    status: request.status,
                    roles: request.roles,
                    password_hash,
                },
            )
            .await
    }

    /// Verify credentials of an active account
    pub async fn authenticate(&self, username: &str, password: &str) -> QuizbankResult<User> {
        let user = match self.store.find_user_by_username(username).await? {
            Some(user) => user,
            None => {
                debug!(username, "Login for unknown user");
                verify_dummy(password).await?;
                return Err(invalid_credentials());
            }
        };

        if !verify_password(password, &user.password_hash).await? {
            debug!(user_id = user.id, "Login with wrong password");
            return Err(invalid_credentials());
        }

        if !user.status.is_active() {
            info!(user_id = user.id, status = ?user.status, "Login for inactive user");
            return Err(invalid_credentials());
        }

        Ok(user)
    }

    pub async fn login(&self, username: &str, password: &str) -> QuizbankResult<TokenPair> {
        let user = self.authenticate(username, password).await?;
        let pair = self.tokens.issue_pair(&user)?;
        info!(user_id = user.id, "User logged in");
        Ok(pair)
    }

    /// Resolve an access token to the current user.
    ///
    /// Fails unless the signature and expiry check out, the user still
    /// exists and the embedded token version equals the stored one.
    pub async fn validate_access(&self, token: &str) -> QuizbankResult<User> {
        let claims = self.tokens.decode_access(token)?;

        let user = self
            .store
            .find_user_by_id(claims.user_id)
            .await?
            .ok_or_else(|| QuizbankError::authentication("User no longer exists", COMPONENT))?;

        if user.token_version != claims.token_version {
            debug!(user_id = user.id, "Access token version is stale");
            return Err(QuizbankError::authentication(
                "Token is no longer valid",
                COMPONENT,
            ));
        }

        Ok(user)
    }

    /// Exchange a refresh token for new tokens.
    ///
    /// Inside the sliding window both tokens are reissued; otherwise only
    /// the access token is new and the refresh token is echoed back.
    pub async fn refresh(&self, refresh_token: &str) -> QuizbankResult<TokenPair> {
        let claims = self.tokens.decode_refresh(refresh_token)?;

        let user = self
            .store
            .find_user_by_id(claims.user_id)
            .await?
            .ok_or_else(|| QuizbankError::authentication("User no longer exists", COMPONENT))?;

        if user.token_version != claims.token_version {
            return Err(QuizbankError::authentication(
                "Refresh token is no longer valid",
                COMPONENT,
            ));
        }

        if !user.status.is_active() {
            return Err(QuizbankError::authentication(
                "User is not active",
                COMPONENT,
            ));
        }

        if self.tokens.should_rotate(&claims, Utc::now()) {
            debug!(user_id = user.id, "Rotating refresh token");
            return self.tokens.issue_pair(&user);
        }

        let access_token = self.tokens.issue_access(&user)?;
        Ok(self
            .tokens
            .pair(access_token, refresh_token.to_string()))
    }

    /// Log the user out everywhere
    pub async fn invalidate_session(&self, user_id: i64) -> QuizbankResult<()> {
        self.store.increment_token_version(user_id).await?;
        info!(user_id, "Sessions invalidated");
        Ok(())
    }

    /// Seed an active admin account into an empty user table.
    ///
    /// Returns whether an account was created.
    pub async fn ensure_bootstrap_admin(
        &self,
        username: &str,
        password: &str,
    ) -> QuizbankResult<bool> {
        self.store.create_role(ADMIN_ROLE).await?;

        if self.store.count_users().await? > 0 {
            debug!("Users exist; skipping admin bootstrap");
            return Ok(false);
        }

        let admin = self
            .create_user(
                username,
                password,
                vec![ADMIN_ROLE.to_string()],
                UserStatus::Active,
            )
            .await?;
        warn!(
            user_id = admin.id,
            username = %admin.username,
            "Created bootstrap admin account; change its password"
        );
        Ok(true)
    }

    pub async fn ensure_permission_exists(
        &self,
        name: &str,
        description: &str,
    ) -> QuizbankResult<Permission> {
        self.store.ensure_permission(name, description).await
    }

    /// Does any of the user's roles grant the permission?
    pub async fn is_allowed(&self, user: &User, permission: &str) -> bool {
        self.policy.enforce_any(&user.role_names(), permission).await
    }

    pub async fn get_user(&self, id: i64) -> QuizbankResult<User> {
        self.store
            .find_user_by_id(id)
            .await?
            .ok_or_else(|| QuizbankError::not_found(format!("user {}", id), COMPONENT))
    }

    pub async fn list_users(&self) -> QuizbankResult<Vec<User>> {
        self.store.list_users().await
    }

    pub async fn create_role(&self, name: &str) -> QuizbankResult<Role> {
        let name = name.trim();
        if name.is_empty() {
            return Err(quizbank_core::validation_error!(
                "role name must not be empty",
                "name",
                COMPONENT
            ));
        }
        self.store.create_role(name).await
    }

    pub async fn update_role(
        &self,
        id: i64,
        name: &str,
        permission_ids: &[i64],
    ) -> QuizbankResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(quizbank_core::validation_error!(
                "role name must not be empty",
                "name",
                COMPONENT
            ));
        }
        self.store.update_role(id, name, permission_ids).await?;
        self.policy.rebuild().await?;
        Ok(())
    }

    pub async fn delete_role(&self, id: i64) -> QuizbankResult<()> {
        self.store.delete_role(id).await?;
        self.policy.rebuild().await?;
        Ok(())
    }

    pub async fn list_roles(&self) -> QuizbankResult<Vec<Role>> {
        self.store.list_roles().await
    }

    pub async fn role_permissions(&self, role_id: i64) -> QuizbankResult<Vec<Permission>> {
        self.store.role_permissions(role_id).await
    }

    pub async fn list_permissions(&self) -> QuizbankResult<Vec<Permission>> {
        self.store.list_permissions().await
    }
}

fn invalid_credentials() -> QuizbankError {
    QuizbankError::authentication(INVALID_CREDENTIALS, COMPONENT)
}

fn validate_credentials(username: &str, password: &str) -> QuizbankResult<()> {
    if username.trim().is_empty() {
        return Err(quizbank_core::validation_error!(
            "username must not be empty",
            "username",
            COMPONENT
        ));
    }
    if password.is_empty() {
        return Err(quizbank_core::validation_error!(
            "password must not be empty",
            "password",
            COMPONENT
        ));
    }
    Ok(())
}
