//! Authentication and authorization over real HTTP

mod helpers;

use helpers::{spawn_app, spawn_app_with, test_config};
use serde_json::{json, Value};

#[tokio::test]
async fn health_check_works() {
    let app = spawn_app().await;

    let response = app.get("/health", None).await;
    assert!(response.status().is_success());

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn admin_login_returns_token_pair() {
    let app = spawn_app().await;
    let tokens = app.login("admin", "admin123").await;

    assert_eq!(tokens["token_type"], "Bearer");
    assert!(tokens["expires_in"].as_i64().unwrap() > 0);
    assert_ne!(tokens["access_token"], tokens["refresh_token"]);

    let access = tokens["access_token"].as_str().unwrap();
    let me: Value = app.get("/users/me", Some(access)).await.json().await.unwrap();
    assert_eq!(me["data"]["username"], "admin");
    assert_eq!(me["data"]["roles"][0], "admin");
}

#[tokio::test]
async fn refresh_token_is_not_an_access_token() {
    let app = spawn_app().await;
    let tokens = app.login("admin", "admin123").await;
    let refresh = tokens["refresh_token"].as_str().unwrap();

    let response = app.get("/users/me", Some(refresh)).await;
    assert_eq!(response.status().as_u16(), 401);

    let response = app
        .post("/auth/refresh", None, &json!({"token": tokens["access_token"]}))
        .await;
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn refresh_outside_window_keeps_refresh_token() {
    let app = spawn_app().await;
    let tokens = app.login("admin", "admin123").await;

    let response = app
        .post("/auth/refresh", None, &json!({"token": tokens["refresh_token"]}))
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["refresh_token"], tokens["refresh_token"]);
    assert_ne!(body["data"]["access_token"], tokens["access_token"]);
}

#[tokio::test]
async fn refresh_inside_window_rotates_refresh_token() {
    let mut config = test_config();
    config.auth.refresh_token_ttl_secs = 120;
    config.auth.refresh_sliding_window_secs = 119;
    let app = spawn_app_with(config).await;
    let tokens = app.login("admin", "admin123").await;

    // Less than 119 seconds of validity left once two seconds pass
    tokio::time::sleep(std::time::Duration::from_millis(2100)).await;

    let body: Value = app
        .post("/auth/refresh", None, &json!({"token": tokens["refresh_token"]}))
        .await
        .json()
        .await
        .unwrap();
    assert_ne!(body["data"]["refresh_token"], tokens["refresh_token"]);
}

#[tokio::test]
async fn unknown_user_and_wrong_password_look_the_same() {
    let app = spawn_app().await;

    let wrong = app
        .post("/auth/login", None, &json!({"username": "admin", "password": "bad"}))
        .await;
    let unknown = app
        .post("/auth/login", None, &json!({"username": "nobody", "password": "bad"}))
        .await;

    assert_eq!(wrong.status().as_u16(), 401);
    assert_eq!(unknown.status().as_u16(), 401);
    let wrong: Value = wrong.json().await.unwrap();
    let unknown: Value = unknown.json().await.unwrap();
    assert_eq!(wrong, unknown);
}

#[tokio::test]
async fn permissions_gate_endpoints() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    app.create_user_with(&admin, "viewer", "viewer-pw", &["users:read"])
        .await;
    let viewer = app.login("viewer", "viewer-pw").await;
    let viewer = viewer["access_token"].as_str().unwrap();

    assert_eq!(app.get("/users", Some(viewer)).await.status().as_u16(), 200);
    assert_eq!(app.get("/roles", Some(viewer)).await.status().as_u16(), 403);
    assert_eq!(app.get("/users", None).await.status().as_u16(), 401);

    let response = app
        .post("/roles", Some(viewer), &json!({"name": "sneaky"}))
        .await;
    assert_eq!(response.status().as_u16(), 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn session_invalidation_revokes_all_tokens() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    let user_id = app.create_user_with(&admin, "dave", "dave-pw", &[]).await;
    let tokens = app.login("dave", "dave-pw").await;
    let access = tokens["access_token"].as_str().unwrap();

    assert_eq!(app.get("/users/me", Some(access)).await.status().as_u16(), 200);

    let response = app
        .post(
            &format!("/users/{}/invalidate_session", user_id),
            Some(&admin),
            &json!({}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);

    assert_eq!(app.get("/users/me", Some(access)).await.status().as_u16(), 401);
    let response = app
        .post("/auth/refresh", None, &json!({"token": tokens["refresh_token"]}))
        .await;
    assert_eq!(response.status().as_u16(), 401);

    // A fresh login works again
    let tokens = app.login("dave", "dave-pw").await;
    let access = tokens["access_token"].as_str().unwrap();
    assert_eq!(app.get("/users/me", Some(access)).await.status().as_u16(), 200);
}

#[tokio::test]
async fn role_lifecycle() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;

    let created = app
        .post("/roles", Some(&admin), &json!({"name": "Editors"}))
        .await;
    assert_eq!(created.status().as_u16(), 201);
    let role: Value = created.json().await.unwrap();
    let role_id = role["data"]["id"].as_i64().unwrap();

    // Creating an existing role hands back the same row
    let duplicate: Value = app
        .post("/roles", Some(&admin), &json!({"name": "Editors"}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(duplicate["data"]["id"], role_id);

    let quiz_edit = app.permission_id(&admin, "quiz:edit").await;
    let response = app
        .put(
            &format!("/roles/{}", role_id),
            &admin,
            &json!({"name": "Editors", "permissions": [quiz_edit]}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let granted: Value = app
        .get(&format!("/roles/{}/permissions", role_id), Some(&admin))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(granted["data"][0]["name"], "quiz:edit");

    let response = app.delete(&format!("/roles/{}", role_id), &admin).await;
    assert_eq!(response.status().as_u16(), 204);

    let response = app.delete(&format!("/roles/{}", role_id), &admin).await;
    assert_eq!(response.status().as_u16(), 404);
}
