//! Integration test harness: spawns the full application on a random port

#![allow(dead_code)]

use quizbank_core::QuizbankConfig;
use serde_json::{json, Value};
use std::sync::LazyLock;
use tokio::net::TcpListener;

// Initialize tracing once per test binary
static TRACING: LazyLock<()> = LazyLock::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    } else {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_writer(std::io::sink)
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    }
});

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin123";

/// Running application
pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub api_client: reqwest::Client,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.address, path)
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> reqwest::Response {
        let mut request = self.api_client.get(self.url(path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.expect("Failed to execute request.")
    }

    pub async fn post(&self, path: &str, token: Option<&str>, body: &Value) -> reqwest::Response {
        let mut request = self.api_client.post(self.url(path)).json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.expect("Failed to execute request.")
    }

    pub async fn put(&self, path: &str, token: &str, body: &Value) -> reqwest::Response {
        self.api_client
            .put(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn delete(&self, path: &str, token: &str) -> reqwest::Response {
        self.api_client
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Log in and return the token pair
    pub async fn login(&self, username: &str, password: &str) -> Value {
        let response = self
            .post(
                "/auth/login",
                None,
                &json!({"username": username, "password": password}),
            )
            .await;
        assert_eq!(response.status().as_u16(), 200, "login as {} failed", username);
        let body: Value = response.json().await.unwrap();
        body["data"].clone()
    }

    pub async fn admin_token(&self) -> String {
        self.login(ADMIN_USERNAME, ADMIN_PASSWORD).await["access_token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    /// Id of a permission by name, as seen by the admin
    pub async fn permission_id(&self, admin: &str, name: &str) -> i64 {
        let body: Value = self.get("/permissions", Some(admin)).await.json().await.unwrap();
        body["data"]
            .as_array()
            .unwrap()
            .iter()
            .find(|p| p["name"] == name)
            .and_then(|p| p["id"].as_i64())
            .unwrap_or_else(|| panic!("permission {} not registered", name))
    }

    /// Create a role holding the given permissions and an active user with it
    pub async fn create_user_with(
        &self,
        admin: &str,
        username: &str,
        password: &str,
        permissions: &[&str],
    ) -> i64 {
        let role_name = format!("{}_role", username);
        let role: Value = self
            .post("/roles", Some(admin), &json!({"name": role_name}))
            .await
            .json()
            .await
            .unwrap();
        let role_id = role["data"]["id"].as_i64().unwrap();

        let mut ids = Vec::new();
        for permission in permissions {
            ids.push(self.permission_id(admin, permission).await);
        }
        let response = self
            .put(
                &format!("/roles/{}", role_id),
                admin,
                &json!({"name": role_name, "permissions": ids}),
            )
            .await;
        assert_eq!(response.status().as_u16(), 200);

        let created: Value = self
            .post(
                "/users",
                Some(admin),
                &json!({
                    "username": username,
                    "password": password,
                    "roles": [role_name],
                    "status": 1
                }),
            )
            .await
            .json()
            .await
            .unwrap();
        created["data"]["id"].as_i64().unwrap()
    }
}

/// Test configuration over an in-memory database
pub fn test_config() -> QuizbankConfig {
    let mut config = QuizbankConfig::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.database.url = "sqlite::memory:".to_string();
    config.auth.jwt_secret = "integration_test_secret".to_string();
    config.menu_file = None;
    config
}

/// Start the application with the default test configuration
pub async fn spawn_app() -> TestApp {
    spawn_app_with(test_config()).await
}

pub async fn spawn_app_with(config: QuizbankConfig) -> TestApp {
    LazyLock::force(&TRACING);

    let state = quizbank_web::AppState::new(config).await.unwrap();
    let app = quizbank_web::create_app(state).await.unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        port,
        api_client: client,
    }
}
