//! Signed access and refresh tokens (HS256)
//!
//! Tokens are never stored. They carry the user's token version at issue
//! time; the auth service compares it with the current value on every use.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use quizbank_core::{AuthConfig, QuizbankError, QuizbankResult, User};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};
use utoipa::ToSchema;

/// JWT signing and verification keys
struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Keys {
    fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// Token type enumeration
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims of a short-lived access token
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AccessClaims {
    pub user_id: i64,
    pub username: String,
    /// Role names as of issue time
    pub roles: Vec<String>,
    pub token_version: i64,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub token_type: TokenType,
}

/// Claims of a long-lived refresh token; roles are re-read at refresh time
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RefreshClaims {
    pub user_id: i64,
    pub token_version: i64,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub token_type: TokenType,
}

/// Access + refresh token pair handed to clients
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// Issues and decodes tokens with a process-wide secret
pub struct TokenService {
    keys: Keys,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
    sliding_window: Duration,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> QuizbankResult<Self> {
        if !config.has_secret() {
            return Err(quizbank_core::config_error!(
                "auth.jwt_secret is not set",
                "token_service"
            ));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Ok(Self {
            keys: Keys::new(config.jwt_secret.as_bytes()),
            validation,
            access_ttl: Duration::seconds(config.access_token_ttl_secs),
            refresh_ttl: Duration::seconds(config.refresh_token_ttl_secs),
            sliding_window: Duration::seconds(config.refresh_sliding_window_secs),
        })
    }

    /// Mint an access token embedding the user's current roles and version
    pub fn issue_access(&self, user: &User) -> QuizbankResult<String> {
        let now = Utc::now();
        let claims = AccessClaims {
            user_id: user.id,
            username: user.username.clone(),
            roles: user.role_names(),
            token_version: user.token_version,
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
            token_type: TokenType::Access,
        };
        self.sign(&claims)
    }

    /// Mint a refresh token carrying only identity and version
    pub fn issue_refresh(&self, user: &User) -> QuizbankResult<String> {
        let now = Utc::now();
        let claims = RefreshClaims {
            user_id: user.id,
            token_version: user.token_version,
            iat: now.timestamp(),
            exp: (now + self.refresh_ttl).timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
            token_type: TokenType::Refresh,
        };
        self.sign(&claims)
    }

    pub fn issue_pair(&self, user: &User) -> QuizbankResult<TokenPair> {
        let access_token = self.issue_access(user)?;
        let refresh_token = self.issue_refresh(user)?;
        Ok(self.pair(access_token, refresh_token))
    }

    pub fn pair(&self, access_token: String, refresh_token: String) -> TokenPair {
        TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_ttl.num_seconds(),
        }
    }

    /// Signature and expiry check of an access token
    pub fn decode_access(&self, token: &str) -> QuizbankResult<AccessClaims> {
        let claims: AccessClaims = self.verify(token)?;
        if claims.token_type != TokenType::Access {
            return Err(QuizbankError::authentication(
                "Invalid token type",
                "token_service",
            ));
        }
        Ok(claims)
    }

    /// Signature and expiry check of a refresh token
    pub fn decode_refresh(&self, token: &str) -> QuizbankResult<RefreshClaims> {
        let claims: RefreshClaims = self.verify(token)?;
        if claims.token_type != TokenType::Refresh {
            return Err(QuizbankError::authentication(
                "Invalid token type",
                "token_service",
            ));
        }
        Ok(claims)
    }

    /// Whether a refresh at `now` should also rotate the refresh token
    pub fn should_rotate(&self, claims: &RefreshClaims, now: DateTime<Utc>) -> bool {
        claims.exp - now.timestamp() < self.sliding_window.num_seconds()
    }

    fn sign<T: Serialize>(&self, claims: &T) -> QuizbankResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.keys.encoding).map_err(|e| {
            warn!("Failed to encode JWT token: {}", e);
            QuizbankError::internal("failed to sign token", "token_service")
        })
    }

    fn verify<T: DeserializeOwned>(&self, token: &str) -> QuizbankResult<T> {
        decode::<T>(token, &self.keys.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("Token verification failed: {}", e);
                QuizbankError::authentication("Invalid or expired token", "token_service")
            })
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quizbank_core::{Role, UserStatus};

    fn config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "jwt_secret".to_string(),
            access_token_ttl_secs: 3600,
            refresh_token_ttl_secs: 7 * 24 * 3600,
            refresh_sliding_window_secs: 24 * 3600,
        }
    }

    fn user() -> User {
        User {
            id: 42,
            username: "alice".to_string(),
            password_hash: String::new(),
            status: UserStatus::Active,
            token_version: 3,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            roles: vec![Role {
                id: 1,
                name: "editor".to_string(),
            }],
        }
    }

    #[test]
    fn test_access_claims_round_trip() {
        let service = TokenService::new(&config()).unwrap();
        let token = service.issue_access(&user()).unwrap();
        let claims = service.decode_access(&token).unwrap();

        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.roles, vec!["editor".to_string()]);
        assert_eq!(claims.token_version, 3);
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn test_token_types_are_not_interchangeable() {
        let service = TokenService::new(&config()).unwrap();
        let pair = service.issue_pair(&user()).unwrap();

        assert!(service.decode_access(&pair.refresh_token).is_err());
        assert!(service.decode_refresh(&pair.access_token).is_err());
        assert!(service.decode_refresh(&pair.refresh_token).is_ok());
    }

    #[test]
    fn test_expired_token_rejected() {
        let service = TokenService::new(&AuthConfig {
            access_token_ttl_secs: -10,
            ..config()
        })
        .unwrap();
        let token = service.issue_access(&user()).unwrap();
        assert!(service.decode_access(&token).is_err());
    }

    #[test]
    fn test_foreign_signature_rejected() {
        let ours = TokenService::new(&config()).unwrap();
        let theirs = TokenService::new(&AuthConfig {
            jwt_secret: "another".to_string(),
            ..config()
        })
        .unwrap();
        let token = theirs.issue_access(&user()).unwrap();
        assert!(ours.decode_access(&token).is_err());
        assert!(ours.decode_access("garbage").is_err());
    }

    #[test]
    fn test_rotation_window() {
        let service = TokenService::new(&config()).unwrap();
        let now = Utc::now();
        let mut claims = RefreshClaims {
            user_id: 1,
            token_version: 1,
            iat: now.timestamp(),
            exp: (now + Duration::days(7)).timestamp(),
            jti: String::new(),
            token_type: TokenType::Refresh,
        };
        assert!(!service.should_rotate(&claims, now));

        claims.exp = (now + Duration::hours(2)).timestamp();
        assert!(service.should_rotate(&claims, now));
    }

    #[test]
    fn test_missing_secret_is_config_error() {
        let result = TokenService::new(&AuthConfig {
            jwt_secret: " ".to_string(),
            ..config()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Basic abc"), None);
    }
}
