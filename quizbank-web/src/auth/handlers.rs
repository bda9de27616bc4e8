//! Authentication, user and role administration handlers

use super::{
    jwt::TokenPair,
    users::{
        CreateUserRequest, CreatedResponse, CurrentUserResponse, LoginRequest, RefreshRequest,
        RegisterRequest, RoleRequest, RoleUpdateRequest, UpdateUserRequest, UserResponse,
    },
    AuthUser,
};
use crate::{
    handlers::response::{ApiResponse, ApiResult, JsonBody},
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use quizbank_core::{Permission, Role};
use tracing::info;

/// User login endpoint
///
/// Every failure answers 401 with the same message.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = TokenPair),
        (status = 401, description = "Invalid username or password")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<LoginRequest>,
) -> ApiResult<Json<ApiResponse<TokenPair>>> {
    info!("User login attempt: {}", request.username);
    let tokens = state.auth.login(&request.username, &request.password).await?;
    Ok(ApiResponse::success(tokens))
}

/// Self-service registration; the account stays pending until activated
#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "Authentication",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = CreatedResponse),
        (status = 409, description = "Username already taken")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<CreatedResponse>>)> {
    let user = state
        .auth
        .register(&request.username, &request.password)
        .await?;
    info!(user_id = user.id, "User registered: {}", user.username);
    Ok(ApiResponse::created(CreatedResponse { id: user.id }))
}

#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    tag = "Authentication",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New tokens", body = TokenPair),
        (status = 401, description = "Refresh token rejected")
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<RefreshRequest>,
) -> ApiResult<Json<ApiResponse<TokenPair>>> {
    let tokens = state.auth.refresh(&request.token).await?;
    Ok(ApiResponse::success(tokens))
}

#[utoipa::path(
    get,
    path = "/api/users/me",
    tag = "Users",
    responses(
        (status = 200, description = "The caller", body = CurrentUserResponse),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer_auth" = []))
)]
pub async fn current_user(AuthUser(user): AuthUser) -> Json<ApiResponse<CurrentUserResponse>> {
    ApiResponse::success(CurrentUserResponse::from(&user))
}

#[utoipa::path(
    get,
    path = "/api/users",
    tag = "Users",
    responses((status = 200, description = "All users", body = [UserResponse])),
    security(("bearer_auth" = []))
)]
pub async fn list_users(
    State(state): State<AppState>,
) -> ApiResult<Json<ApiResponse<Vec<UserResponse>>>> {
    let users = state.auth.list_users().await?;
    Ok(ApiResponse::success(
        users.iter().map(UserResponse::from).collect(),
    ))
}

#[utoipa::path(
    post,
    path = "/api/users",
    tag = "Users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = CreatedResponse),
        (status = 404, description = "Unknown role"),
        (status = 409, description = "Username already taken")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_user(
    State(state): State<AppState>,
    AuthUser(admin): AuthUser,
    JsonBody(request): JsonBody<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<CreatedResponse>>)> {
    let user = state
        .auth
        .create_user(
            &request.username,
            &request.password,
            request.roles,
            request.status,
        )
        .await?;
    info!(user_id = user.id, created_by = admin.id, "User created: {}", user.username);
    Ok(ApiResponse::created(CreatedResponse { id: user.id }))
}

#[utoipa::path(
    put,
    path = "/api/users/{id}",
    tag = "Users",
    params(("id" = i64, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated"),
        (status = 404, description = "Unknown user or role")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(request): JsonBody<UpdateUserRequest>,
) -> ApiResult<Json<ApiResponse<CreatedResponse>>> {
    state.auth.update_user(id, request).await?;
    Ok(ApiResponse::success(CreatedResponse { id }))
}

#[utoipa::path(
    get,
    path = "/api/users/{id}/roles",
    tag = "Users",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "Roles of the user", body = [Role]),
        (status = 404, description = "Unknown user")
    ),
    security(("bearer_auth" = []))
)]
pub async fn user_roles(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ApiResponse<Vec<Role>>>> {
    let user = state.auth.get_user(id).await?;
    Ok(ApiResponse::success(user.roles))
}

/// Revoke every token issued to the user so far
#[utoipa::path(
    post,
    path = "/api/users/{id}/invalidate_session",
    tag = "Users",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "Sessions invalidated"),
        (status = 404, description = "Unknown user")
    ),
    security(("bearer_auth" = []))
)]
pub async fn invalidate_session(
    State(state): State<AppState>,
    AuthUser(admin): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<ApiResponse<CreatedResponse>>> {
    state.auth.invalidate_session(id).await?;
    info!(user_id = id, by = admin.id, "Session invalidation requested");
    Ok(ApiResponse::success(CreatedResponse { id }))
}

#[utoipa::path(
    get,
    path = "/api/roles",
    tag = "Roles",
    responses((status = 200, description = "All roles", body = [Role])),
    security(("bearer_auth" = []))
)]
pub async fn list_roles(State(state): State<AppState>) -> ApiResult<Json<ApiResponse<Vec<Role>>>> {
    Ok(ApiResponse::success(state.auth.list_roles().await?))
}

#[utoipa::path(
    post,
    path = "/api/roles",
    tag = "Roles",
    request_body = RoleRequest,
    responses((status = 201, description = "Role created", body = Role)),
    security(("bearer_auth" = []))
)]
pub async fn create_role(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<RoleRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Role>>)> {
    let role = state.auth.create_role(&request.name).await?;
    info!(role_id = role.id, "Role created: {}", role.name);
    Ok(ApiResponse::created(role))
}

/// Rename a role and replace its permission set; the policy is rebuilt
#[utoipa::path(
    put,
    path = "/api/roles/{id}",
    tag = "Roles",
    params(("id" = i64, Path, description = "Role id")),
    request_body = RoleUpdateRequest,
    responses(
        (status = 200, description = "Role updated"),
        (status = 404, description = "Unknown role or permission"),
        (status = 409, description = "Name already taken")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_role(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(request): JsonBody<RoleUpdateRequest>,
) -> ApiResult<Json<ApiResponse<CreatedResponse>>> {
    state
        .auth
        .update_role(id, &request.name, &request.permissions)
        .await?;
    Ok(ApiResponse::success(CreatedResponse { id }))
}

#[utoipa::path(
    delete,
    path = "/api/roles/{id}",
    tag = "Roles",
    params(("id" = i64, Path, description = "Role id")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 404, description = "Unknown role")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_role(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.auth.delete_role(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/roles/{id}/permissions",
    tag = "Roles",
    params(("id" = i64, Path, description = "Role id")),
    responses((status = 200, description = "Permissions granted to the role", body = [Permission])),
    security(("bearer_auth" = []))
)]
pub async fn role_permissions(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ApiResponse<Vec<Permission>>>> {
    Ok(ApiResponse::success(state.auth.role_permissions(id).await?))
}

#[utoipa::path(
    get,
    path = "/api/permissions",
    tag = "Roles",
    responses((status = 200, description = "All permissions", body = [Permission])),
    security(("bearer_auth" = []))
)]
pub async fn list_permissions(
    State(state): State<AppState>,
) -> ApiResult<Json<ApiResponse<Vec<Permission>>>> {
    Ok(ApiResponse::success(state.auth.list_permissions().await?))
}
