//! OpenAPI specification for the quizbank API

use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::{
    auth::{
        jwt::TokenPair,
        users::{
            CreateUserRequest, CreatedResponse, CurrentUserResponse, LoginRequest,
            RefreshRequest, RegisterRequest, RoleRequest, RoleUpdateRequest, UpdateUserRequest,
            UserResponse,
        },
    },
    handlers::{menu::MenuItem, HealthResponse},
    quiz::handlers::{
        AttemptRecordResponse, AttemptRequest, AttemptResponse, CreateBankRequest,
        QuestionRequest, QuestionResponse,
    },
};
use quizbank_core::{
    AnswerOption, Blank, PageMeta, Permission, QuestionBank, QuizbankError, QuizbankResult, Role,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Quizbank API",
        version = "0.1.0",
        description = "Question banks, quizzes and role-based access control",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server")
    ),
    paths(
        crate::handlers::health::health_check,
        crate::handlers::menu::get_menu,

        // Authentication
        crate::auth::handlers::login,
        crate::auth::handlers::register,
        crate::auth::handlers::refresh,

        // Users
        crate::auth::handlers::current_user,
        crate::auth::handlers::list_users,
        crate::auth::handlers::create_user,
        crate::auth::handlers::update_user,
        crate::auth::handlers::user_roles,
        crate::auth::handlers::invalidate_session,

        // Roles and permissions
        crate::auth::handlers::list_roles,
        crate::auth::handlers::create_role,
        crate::auth::handlers::update_role,
        crate::auth::handlers::delete_role,
        crate::auth::handlers::role_permissions,
        crate::auth::handlers::list_permissions,

        // Quiz
        crate::quiz::handlers::list_banks,
        crate::quiz::handlers::create_bank,
        crate::quiz::handlers::list_questions,
        crate::quiz::handlers::create_question,
        crate::quiz::handlers::get_question,
        crate::quiz::handlers::update_question,
        crate::quiz::handlers::delete_question,
        crate::quiz::handlers::random_questions,
        crate::quiz::handlers::submit_attempt,
        crate::quiz::handlers::attempts_below,
    ),
    components(
        schemas(
            HealthResponse,
            MenuItem,
            TokenPair,
            LoginRequest,
            RegisterRequest,
            RefreshRequest,
            CreateUserRequest,
            UpdateUserRequest,
            CreatedResponse,
            UserResponse,
            CurrentUserResponse,
            RoleRequest,
            RoleUpdateRequest,
            Role,
            Permission,
            QuestionBank,
            CreateBankRequest,
            QuestionRequest,
            QuestionResponse,
            AnswerOption,
            Blank,
            PageMeta,
            AttemptRequest,
            AttemptResponse,
            AttemptRecordResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Authentication", description = "Login, registration and token refresh"),
        (name = "Users", description = "User administration"),
        (name = "Roles", description = "Roles and permissions"),
        (name = "Menu", description = "Navigation menu"),
        (name = "Quiz", description = "Question banks, questions and attempts"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Bearer JWT security scheme
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Get the OpenAPI specification as JSON
pub fn get_openapi_json() -> QuizbankResult<String> {
    ApiDoc::openapi()
        .to_pretty_json()
        .map_err(|e| QuizbankError::internal(format!("Failed to render OpenAPI: {}", e), "openapi"))
}
