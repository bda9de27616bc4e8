//! Quizbank Web Server
//!
//! JSON API for question banks, quizzes, users and roles, protected by
//! JWT bearer tokens and a role/permission policy.

pub mod auth;
pub mod database;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod quiz;
pub mod routes;
pub mod server;
pub mod state;

// Re-export main types
pub use server::{QuizbankServer, QuizbankServerBuilder};
pub use state::AppState;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware::from_fn_with_state,
    Router,
};
use quizbank_core::{QuizbankError, QuizbankResult};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Build the application router and register the permissions it declares
pub async fn create_app(state: AppState) -> QuizbankResult<Router> {
    let table = routes::route_table(state.clone());
    table.register_permissions(&state.auth, &state.menu).await?;

    let server_config = &state.config.server;
    let mut app = Router::new().nest("/api", table.into_router());

    if server_config.enable_swagger {
        info!("Swagger UI enabled at /swagger-ui");
        app = app.merge(
            SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()),
        );
    }

    Ok(app
        .layer(from_fn_with_state(
            server_config.request_timeout(),
            middleware::timeout_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&server_config.cors_origins))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .with_state(state))
}

/// CORS for the configured origins; an empty list allows any origin
fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE]);

    if origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    cors.allow_origin(allowed)
}

/// Error types for the web server
#[derive(thiserror::Error, Debug)]
pub enum WebError {
    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error(transparent)]
    Core(#[from] QuizbankError),
}

/// Result type for web operations
pub type WebResult<T> = Result<T, WebError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::menu::MenuCatalog;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        response::Response,
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const MENU: &str = r#"{"menus": [
        {"id": "home", "path": "/", "label": "Home", "order": 1},
        {"id": "quiz", "path": "/quiz", "label": "Quiz", "order": 2, "permission": "quiz:read"},
        {"id": "users", "path": "/users", "label": "Users", "order": 3, "permission": "users:read"}
    ]}"#;

    struct TestApp {
        app: Router,
        state: AppState,
    }

    impl TestApp {
        async fn new() -> Self {
            let state = AppState::for_tests(MenuCatalog::from_json(MENU).unwrap()).await;
            let app = create_app(state.clone()).await.unwrap();
            Self { app, state }
        }

        async fn call(
            &self,
            method: &str,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header("Authorization", format!("Bearer {}", token));
            }
            let request = match body {
                Some(body) => builder
                    .header("Content-Type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };

            let response: Response = self.app.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }

        async fn login(&self, username: &str, password: &str) -> Value {
            let (status, body) = self
                .call(
                    "POST",
                    "/api/auth/login",
                    None,
                    Some(json!({"username": username, "password": password})),
                )
                .await;
            assert_eq!(status, StatusCode::OK, "login failed: {}", body);
            body["data"].clone()
        }

        async fn admin_token(&self) -> String {
            self.login("admin", "admin123").await["access_token"]
                .as_str()
                .unwrap()
                .to_string()
        }

        /// Active user holding a role with exactly the given permissions
        async fn user_with(&self, username: &str, permissions: &[&str]) -> String {
            let auth = &self.state.auth;
            let role = auth.create_role(&format!("{}_role", username)).await.unwrap();
            let all = auth.list_permissions().await.unwrap();
            let ids: Vec<i64> = all
                .iter()
                .filter(|p| permissions.contains(&p.name.as_str()))
                .map(|p| p.id)
                .collect();
            auth.update_role(role.id, &role.name, &ids).await.unwrap();
            auth.create_user(
                username,
                "p@ss",
                vec![role.name.clone()],
                quizbank_core::UserStatus::Active,
            )
            .await
            .unwrap();

            self.login(username, "p@ss").await["access_token"]
                .as_str()
                .unwrap()
                .to_string()
        }
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = TestApp::new().await;
        let (status, body) = app.call("GET", "/api/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_protected_routes_require_token() {
        let app = TestApp::new().await;
        let (status, body) = app.call("GET", "/api/users", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], "error");

        let (status, _) = app.call("GET", "/api/menu", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_login_failures_are_uniform() {
        let app = TestApp::new().await;
        let (status, wrong) = app
            .call(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({"username": "admin", "password": "nope"})),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, unknown) = app
            .call(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({"username": "ghost", "password": "nope"})),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong["message"], unknown["message"]);
    }

    #[tokio::test]
    async fn test_incomplete_body_is_bad_request() {
        let app = TestApp::new().await;
        let (status, body) = app
            .call(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({"username": "admin"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().contains("password"));
    }

    #[tokio::test]
    async fn test_huge_page_number_returns_empty_page() {
        let app = TestApp::new().await;
        let admin = app.admin_token().await;
        let (_, bank) = app
            .call(
                "POST",
                "/api/quiz/question_banks",
                Some(&admin),
                Some(json!({"name": "Paging"})),
            )
            .await;
        let bank_id = bank["data"]["id"].as_i64().unwrap();

        let (status, page) = app
            .call(
                "GET",
                &format!(
                    "/api/quiz/question_banks/{}/questions?page={}",
                    bank_id,
                    i64::MAX
                ),
                Some(&admin),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(page["data"].as_array().unwrap().is_empty());
        assert_eq!(page["meta"]["current_page"], quizbank_core::Page::MAX_PAGE);
    }

    #[tokio::test]
    async fn test_register_then_pending_login_rejected() {
        let app = TestApp::new().await;
        let (status, body) = app
            .call(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({"username": "newbie", "password": "pw"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["data"]["id"].as_i64().is_some());

        let (status, _) = app
            .call(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({"username": "newbie", "password": "pw"})),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app
            .call(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({"username": "newbie", "password": "pw"})),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_deactivated_user_cannot_refresh() {
        let app = TestApp::new().await;
        let admin = app.admin_token().await;

        let (status, created) = app
            .call(
                "POST",
                "/api/users",
                Some(&admin),
                Some(json!({"username": "alice", "password": "secret", "roles": ["admin"], "status": 1})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let alice_id = created["data"]["id"].as_i64().unwrap();

        let tokens = app.login("alice", "secret").await;
        assert!(!tokens["access_token"].as_str().unwrap().is_empty());
        assert!(!tokens["refresh_token"].as_str().unwrap().is_empty());

        let (status, _) = app
            .call(
                "PUT",
                &format!("/api/users/{}", alice_id),
                Some(&admin),
                Some(json!({"username": "alice", "roles": ["admin"], "status": 0})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app
            .call(
                "POST",
                "/api/auth/refresh",
                None,
                Some(json!({"token": tokens["refresh_token"]})),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_invalidate_session_forces_logout() {
        let app = TestApp::new().await;
        let admin = app.admin_token().await;
        let bob = app.user_with("bob", &[]).await;

        let (status, me) = app.call("GET", "/api/users/me", Some(&bob), None).await;
        assert_eq!(status, StatusCode::OK);
        let bob_id = me["data"]["id"].as_i64().unwrap();

        let (status, _) = app
            .call(
                "POST",
                &format!("/api/users/{}/invalidate_session", bob_id),
                Some(&admin),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app.call("GET", "/api/users/me", Some(&bob), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_permission_gate() {
        let app = TestApp::new().await;
        let reader = app.user_with("reader", &["users:read"]).await;

        let (status, body) = app.call("GET", "/api/users", Some(&reader), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"].as_array().unwrap().len() >= 2);

        let (status, body) = app
            .call(
                "POST",
                "/api/users",
                Some(&reader),
                Some(json!({"username": "x", "password": "y", "status": 1})),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["status"], "error");

        let (status, _) = app.call("GET", "/api/roles", Some(&reader), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_role_update_takes_effect_immediately() {
        let app = TestApp::new().await;
        let admin = app.admin_token().await;
        let carol = app.user_with("carol", &[]).await;

        let (status, _) = app.call("GET", "/api/permissions", Some(&carol), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (_, permissions) = app.call("GET", "/api/permissions", Some(&admin), None).await;
        let read_id = permissions["data"]
            .as_array()
            .unwrap()
            .iter()
            .find(|p| p["name"] == "permissions:read")
            .and_then(|p| p["id"].as_i64())
            .unwrap();
        let (_, roles) = app.call("GET", "/api/roles", Some(&admin), None).await;
        let role_id = roles["data"]
            .as_array()
            .unwrap()
            .iter()
            .find(|r| r["name"] == "carol_role")
            .and_then(|r| r["id"].as_i64())
            .unwrap();

        let (status, _) = app
            .call(
                "PUT",
                &format!("/api/roles/{}", role_id),
                Some(&admin),
                Some(json!({"name": "carol_role", "permissions": [read_id]})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app.call("GET", "/api/permissions", Some(&carol), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app
            .call("DELETE", &format!("/api/roles/{}", role_id), Some(&admin), None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, Value::Null);

        let (status, _) = app.call("GET", "/api/permissions", Some(&carol), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_menu_filtered_by_permission() {
        let app = TestApp::new().await;
        let quizzer = app.user_with("quizzer", &["quiz:read"]).await;

        let (status, body) = app.call("GET", "/api/menu", Some(&quizzer), None).await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|item| item["id"].as_str())
            .collect();
        assert_eq!(ids, vec!["home", "quiz"]);

        let admin = app.admin_token().await;
        let (_, body) = app.call("GET", "/api/menu", Some(&admin), None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_quiz_flow() {
        let app = TestApp::new().await;
        let admin = app.admin_token().await;

        let (status, bank) = app
            .call(
                "POST",
                "/api/quiz/question_banks",
                Some(&admin),
                Some(json!({"name": "Arithmetic"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let bank_id = bank["data"]["id"].as_i64().unwrap();

        let (status, question) = app
            .call(
                "POST",
                &format!("/api/quiz/question_banks/{}/questions", bank_id),
                Some(&admin),
                Some(json!({
                    "content": "Which are even?",
                    "question_type": 1,
                    "answer_options": [
                        {"option_text": "2", "is_correct": true},
                        {"option_text": "3", "is_correct": false},
                        {"option_text": "4", "is_correct": true}
                    ],
                    "tags": ["numbers"]
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", question);
        assert_eq!(question["data"]["author_name"], "admin");
        let question_id = question["data"]["id"].as_i64().unwrap();
        let correct: Vec<i64> = question["data"]["answer_options"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|o| o["is_correct"] == true)
            .filter_map(|o| o["id"].as_i64())
            .collect();

        let (status, page) = app
            .call(
                "GET",
                &format!("/api/quiz/question_banks/{}/questions?tag=numbers&page=0", bank_id),
                Some(&admin),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["meta"]["total_records"], 1);
        assert_eq!(page["meta"]["current_page"], 1);
        assert_eq!(page["meta"]["page_size"], 10);

        let (_, random) = app
            .call(
                "GET",
                &format!("/api/quiz/question_banks/{}/random_questions", bank_id),
                Some(&admin),
                None,
            )
            .await;
        let options = random["data"][0]["answer_options"].as_array().unwrap();
        assert!(options.iter().all(|o| o["is_correct"] == false));

        let reversed: Vec<i64> = correct.iter().rev().copied().collect();
        let (status, attempt) = app
            .call(
                "POST",
                "/api/quiz/question_attempts",
                Some(&admin),
                Some(json!({"question_id": question_id, "answer": reversed})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(attempt["data"]["correct"], true);
        assert_eq!(attempt["data"]["attempts"], 1);
        assert_eq!(attempt["data"]["consecutive_correct"], 1);

        let (status, _) = app
            .call(
                "POST",
                "/api/quiz/question_attempts",
                Some(&admin),
                Some(json!({"question_id": question_id, "answer": "two"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, me) = app.call("GET", "/api/users/me", Some(&admin), None).await;
        let admin_id = me["data"]["id"].as_i64().unwrap();
        let (_, weak) = app
            .call(
                "GET",
                &format!("/api/quiz/question_attempts/{}/{}", admin_id, bank_id),
                Some(&admin),
                None,
            )
            .await;
        assert_eq!(weak["data"].as_array().unwrap().len(), 1);

        let (status, _) = app
            .call(
                "DELETE",
                &format!("/api/quiz/questions/{}", question_id),
                Some(&admin),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = app
            .call(
                "GET",
                &format!("/api/quiz/questions/{}", question_id),
                Some(&admin),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_cors_layer_accepts_configured_origins() {
        let _ = cors_layer(&[]);
        let _ = cors_layer(&["http://localhost:3000".to_string(), "bad\norigin".to_string()]);
    }
}
