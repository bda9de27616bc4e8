//! Navigation menu filtered by the caller's permissions

use crate::{auth::AuthUser, handlers::response::ApiResponse, AppState};
use axum::{extract::State, response::Json};
use quizbank_core::{QuizbankError, QuizbankResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

/// One entry of the navigation menu
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MenuItem {
    pub id: String,
    pub path: String,
    #[serde(default)]
    pub parent: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub order: i64,
    /// Empty means visible to every authenticated user
    #[serde(default)]
    pub permission: String,
}

#[derive(Debug, Deserialize)]
struct MenuFile {
    #[serde(default)]
    menus: Vec<MenuItem>,
}

/// All menu items known to the server, unique by id
#[derive(Debug, Clone, Default)]
pub struct MenuCatalog {
    items: Vec<MenuItem>,
}

impl MenuCatalog {
    pub fn new(items: Vec<MenuItem>) -> Self {
        let mut seen = HashSet::new();
        let mut items: Vec<MenuItem> = items
            .into_iter()
            .filter(|item| seen.insert(item.id.clone()))
            .collect();
        items.sort_by_key(|item| item.order);
        Self { items }
    }

    /// Parse a `{"menus": [...]}` document
    pub fn from_json(json: &str) -> QuizbankResult<Self> {
        let file: MenuFile = serde_json::from_str(json)?;
        Ok(Self::new(file.menus))
    }

    /// Load the menu file; a missing file yields an empty menu
    pub fn load<P: AsRef<Path>>(path: P) -> QuizbankResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Menu file {} not found, serving an empty menu", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let catalog = Self::from_json(&content).map_err(|e| {
            QuizbankError::validation(
                format!("invalid menu file {}: {}", path.display(), e),
                "menu",
            )
        })?;
        info!(items = catalog.len(), "Loaded menu from {}", path.display());
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Permissions referenced by menu items
    pub fn permissions(&self) -> impl Iterator<Item = &str> {
        self.items
            .iter()
            .map(|item| item.permission.as_str())
            .filter(|permission| !permission.is_empty())
    }

    pub fn items(&self) -> &[MenuItem] {
        &self.items
    }
}

/// Menu items visible to the caller
#[utoipa::path(
    get,
    path = "/api/menu",
    tag = "Menu",
    summary = "Navigation menu",
    description = "Menu items the caller's roles are allowed to see",
    responses(
        (status = 200, description = "Visible menu items", body = [MenuItem]),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_menu(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Json<ApiResponse<Vec<MenuItem>>> {
    let roles = user.role_names();
    let mut visible = Vec::new();
    for item in state.menu.items() {
        if item.permission.is_empty()
            || state
                .auth
                .policy()
                .enforce_any(&roles, &item.permission)
                .await
        {
            visible.push(item.clone());
        }
    }

    debug!(user_id = user.id, visible = visible.len(), "Menu resolved");
    ApiResponse::success(visible)
}
