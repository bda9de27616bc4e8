//! Shared application state

use crate::{
    auth::{database::SqliteCredentialStore, AuthService},
    database,
    handlers::menu::MenuCatalog,
    quiz::{QuizService, SqliteQuizStore},
    WebResult,
};
use quizbank_core::QuizbankConfig;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

/// State handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<QuizbankConfig>,
    pub auth: Arc<AuthService>,
    pub quiz: Arc<QuizService>,
    pub menu: Arc<MenuCatalog>,
}

impl AppState {
    /// Connect to the database, build the services and seed the admin account
    pub async fn new(config: QuizbankConfig) -> WebResult<Self> {
        let pool = database::connect(
            &config.database.url,
            config.database.max_connections,
            config.server.request_timeout(),
        )
        .await?;

        let menu = match &config.menu_file {
            Some(path) => MenuCatalog::load(path)?,
            None => MenuCatalog::default(),
        };

        Self::with_pool(config, pool, menu).await
    }

    /// Build the state over an existing pool
    pub async fn with_pool(
        config: QuizbankConfig,
        pool: SqlitePool,
        menu: MenuCatalog,
    ) -> WebResult<Self> {
        let credentials = Arc::new(SqliteCredentialStore::new(pool.clone()));
        let auth = AuthService::new(credentials, &config.auth).await?;

        let created = auth
            .ensure_bootstrap_admin(
                &config.bootstrap.admin_username,
                &config.bootstrap.admin_password,
            )
            .await?;
        if created {
            info!(
                "Seeded admin account '{}'",
                config.bootstrap.admin_username
            );
        }

        let quiz = QuizService::new(Arc::new(SqliteQuizStore::new(pool)));

        Ok(Self {
            config: Arc::new(config),
            auth: Arc::new(auth),
            quiz: Arc::new(quiz),
            menu: Arc::new(menu),
        })
    }

    /// In-memory state for tests
    #[cfg(test)]
    pub(crate) async fn for_tests(menu: MenuCatalog) -> Self {
        let mut config = QuizbankConfig::default();
        config.auth.jwt_secret = "test_secret".to_string();
        let pool = database::memory_pool().await;
        Self::with_pool(config, pool, menu)
            .await
            .expect("test state")
    }
}
