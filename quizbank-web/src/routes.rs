//! Route table for the quizbank API
//!
//! Every endpoint is declared once with its method, path, required
//! permission and description. The declared permissions are registered in
//! the credential store when the router is built, so roles can be granted
//! them without seeding the permission table by hand.

use crate::{
    auth::{handlers as auth, AuthService},
    handlers::{self, menu::MenuCatalog},
    middleware::{auth_middleware, permission_middleware, PermissionGate},
    quiz::handlers as quiz,
    AppState,
};
use axum::{
    handler::Handler,
    middleware::from_fn_with_state,
    routing::{on, MethodFilter},
    Router,
};
use quizbank_core::QuizbankResult;
use std::collections::HashSet;
use tracing::info;

/// Who may call an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
    Permission(&'static str),
}

/// One declared endpoint
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub method: MethodFilter,
    pub path: &'static str,
    pub access: Access,
    pub description: &'static str,
}

/// Endpoints plus the router serving them
pub struct RouteTable {
    state: AppState,
    public: Router<AppState>,
    protected: Router<AppState>,
    endpoints: Vec<Endpoint>,
}

impl RouteTable {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            public: Router::new(),
            protected: Router::new(),
            endpoints: Vec::new(),
        }
    }

    /// Declare an endpoint and mount its handler
    pub fn endpoint<H, T>(
        mut self,
        method: MethodFilter,
        path: &'static str,
        access: Access,
        description: &'static str,
        handler: H,
    ) -> Self
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        let route = on(method, handler);
        match access {
            Access::Public => self.public = self.public.route(path, route),
            Access::Authenticated => self.protected = self.protected.route(path, route),
            Access::Permission(permission) => {
                let gate = PermissionGate {
                    state: self.state.clone(),
                    permission,
                };
                self.protected = self.protected.route(
                    path,
                    route.route_layer(from_fn_with_state(gate, permission_middleware)),
                );
            }
        }

        self.endpoints.push(Endpoint {
            method,
            path,
            access,
            description,
        });
        self
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Distinct permissions with the description of their first endpoint
    pub fn declared_permissions(&self) -> Vec<(&'static str, &'static str)> {
        let mut seen = HashSet::new();
        self.endpoints
            .iter()
            .filter_map(|endpoint| match endpoint.access {
                Access::Permission(permission) => Some((permission, endpoint.description)),
                _ => None,
            })
            .filter(|(permission, _)| seen.insert(*permission))
            .collect()
    }

    /// Make sure every permission referenced by a route or menu item exists
    pub async fn register_permissions(
        &self,
        auth: &AuthService,
        menu: &MenuCatalog,
    ) -> QuizbankResult<usize> {
        let declared = self.declared_permissions();
        let mut registered: HashSet<&str> = HashSet::new();

        for (permission, description) in declared {
            auth.ensure_permission_exists(permission, description).await?;
            registered.insert(permission);
        }

        for permission in menu.permissions() {
            if registered.insert(permission) {
                auth.ensure_permission_exists(permission, "Menu entry").await?;
            }
        }

        info!(permissions = registered.len(), "Permissions registered");
        Ok(registered.len())
    }

    /// Router with authentication applied to every non-public endpoint
    pub fn into_router(self) -> Router<AppState> {
        let protected = self
            .protected
            .route_layer(from_fn_with_state(self.state.clone(), auth_middleware));
        self.public.merge(protected)
    }
}

/// Every endpoint of the API, relative to `/api`
pub fn route_table(state: AppState) -> RouteTable {
    use Access::{Authenticated, Permission, Public};

    RouteTable::new(state)
        // Public
        .endpoint(MethodFilter::GET, "/health", Public, "Health check", handlers::health_check)
        .endpoint(MethodFilter::POST, "/auth/login", Public, "Log in", auth::login)
        .endpoint(MethodFilter::POST, "/auth/register", Public, "Register an account", auth::register)
        .endpoint(MethodFilter::POST, "/auth/refresh", Public, "Refresh tokens", auth::refresh)
        // Any authenticated user
        .endpoint(MethodFilter::GET, "/users/me", Authenticated, "Current user", auth::current_user)
        .endpoint(MethodFilter::GET, "/menu", Authenticated, "Navigation menu", handlers::get_menu)
        .endpoint(
            MethodFilter::GET,
            "/quiz/question_banks/{id}/random_questions",
            Authenticated,
            "Random questions from a bank",
            quiz::random_questions,
        )
        // User administration
        .endpoint(MethodFilter::GET, "/users", Permission("users:read"), "View users", auth::list_users)
        .endpoint(MethodFilter::POST, "/users", Permission("users:edit"), "Create and edit users", auth::create_user)
        .endpoint(MethodFilter::PUT, "/users/{id}", Permission("users:edit"), "Create and edit users", auth::update_user)
        .endpoint(MethodFilter::GET, "/users/{id}/roles", Permission("users:read"), "View users", auth::user_roles)
        .endpoint(
            MethodFilter::POST,
            "/users/{id}/invalidate_session",
            Permission("users:logout"),
            "Log users out of every session",
            auth::invalidate_session,
        )
        // Roles and permissions
        .endpoint(MethodFilter::GET, "/roles", Permission("roles:read"), "View roles", auth::list_roles)
        .endpoint(MethodFilter::POST, "/roles", Permission("roles:create"), "Create roles", auth::create_role)
        .endpoint(MethodFilter::PUT, "/roles/{id}", Permission("roles:edit"), "Edit roles", auth::update_role)
        .endpoint(MethodFilter::DELETE, "/roles/{id}", Permission("roles:delete"), "Delete roles", auth::delete_role)
        .endpoint(
            MethodFilter::GET,
            "/roles/{id}/permissions",
            Permission("roles:read"),
            "View roles",
            auth::role_permissions,
        )
        .endpoint(
            MethodFilter::GET,
            "/permissions",
            Permission("permissions:read"),
            "View permissions",
            auth::list_permissions,
        )
        // Quiz content
        .endpoint(
            MethodFilter::GET,
            "/quiz/question_banks",
            Permission("quiz:read"),
            "View quiz content",
            quiz::list_banks,
        )
        .endpoint(
            MethodFilter::POST,
            "/quiz/question_banks",
            Permission("quiz:edit"),
            "Edit quiz content",
            quiz::create_bank,
        )
        .endpoint(
            MethodFilter::GET,
            "/quiz/question_banks/{id}/questions",
            Permission("quiz:read"),
            "View quiz content",
            quiz::list_questions,
        )
        .endpoint(
            MethodFilter::POST,
            "/quiz/question_banks/{id}/questions",
            Permission("quiz:edit"),
            "Edit quiz content",
            quiz::create_question,
        )
        .endpoint(MethodFilter::GET, "/quiz/questions/{id}", Permission("quiz:read"), "View quiz content", quiz::get_question)
        .endpoint(MethodFilter::PUT, "/quiz/questions/{id}", Permission("quiz:edit"), "Edit quiz content", quiz::update_question)
        .endpoint(
            MethodFilter::DELETE,
            "/quiz/questions/{id}",
            Permission("quiz:edit"),
            "Edit quiz content",
            quiz::delete_question,
        )
        .endpoint(
            MethodFilter::POST,
            "/quiz/question_attempts",
            Permission("quiz:edit"),
            "Edit quiz content",
            quiz::submit_attempt,
        )
        .endpoint(
            MethodFilter::GET,
            "/quiz/question_attempts/{user_id}/{question_bank_id}",
            Permission("quiz:read"),
            "View quiz content",
            quiz::attempts_below,
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_check_route() {
        let state = AppState::for_tests(MenuCatalog::default()).await;
        let app = route_table(state.clone()).into_router().with_state(state);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_declared_permissions_are_registered() {
        let state = AppState::for_tests(MenuCatalog::default()).await;
        let table = route_table(state.clone());

        let declared = table.declared_permissions();
        let names: Vec<&str> = declared.iter().map(|(name, _)| *name).collect();
        for expected in [
            "users:read",
            "users:edit",
            "users:logout",
            "roles:read",
            "roles:create",
            "roles:edit",
            "roles:delete",
            "permissions:read",
            "quiz:read",
            "quiz:edit",
        ] {
            assert!(names.contains(&expected), "missing {}", expected);
        }
        assert_eq!(names.len(), 10);

        let count = table
            .register_permissions(&state.auth, &MenuCatalog::default())
            .await
            .unwrap();
        assert_eq!(count, 10);
        assert_eq!(state.auth.list_permissions().await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_public_endpoints() {
        let table = route_table(AppState::for_tests(MenuCatalog::default()).await);
        let public: Vec<&str> = table
            .endpoints()
            .iter()
            .filter(|e| e.access == Access::Public)
            .map(|e| e.path)
            .collect();
        assert_eq!(
            public,
            vec!["/health", "/auth/login", "/auth/register", "/auth/refresh"]
        );
    }

    #[tokio::test]
    async fn test_endpoints_only_answer_their_declared_method() {
        let state = AppState::for_tests(MenuCatalog::default()).await;
        let table = route_table(state.clone());

        let delete_role = table
            .endpoints()
            .iter()
            .find(|e| e.path == "/roles/{id}" && e.method == MethodFilter::DELETE);
        assert!(delete_role.is_some());

        let app = table.into_router().with_state(state);
        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/auth/login")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
