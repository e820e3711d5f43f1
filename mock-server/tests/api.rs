use axum::http::{self, Request, StatusCode};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use http_body_util::BodyExt;
use mock_server::{app, app_with_store, Db, User};
use serde_json::Value;
use tower::ServiceExt;

const APP_ID: &str = "test-app";
const API_KEY: &str = "test-key";

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn auth() -> String {
    format!("Basic {}", STANDARD.encode(format!("{APP_ID}:{API_KEY}")))
}

fn request(method: &str, uri: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::AUTHORIZATION, auth())
        .body(String::new())
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::AUTHORIZATION, auth())
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .unwrap()
}

// --- auth ---

#[tokio::test]
async fn missing_credentials_return_401() {
    let app = app(APP_ID, API_KEY);
    let resp = app
        .oneshot(Request::builder().uri("/v1/users").body(String::new()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_credentials_return_401() {
    let app = app(APP_ID, "other-key");
    let resp = app.oneshot(request("GET", "/v1/users")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

// --- list ---

#[tokio::test]
async fn list_users_empty() {
    let app = app(APP_ID, API_KEY);
    let resp = app.oneshot(request("GET", "/v1/users?page=1")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let page: Value = body_json(resp).await;
    assert!(page["users"].as_array().unwrap().is_empty());
    assert_eq!(page["total_count"], 0);
    assert!(page["next_page"].is_null());
}

#[tokio::test]
async fn list_users_far_page_is_empty() {
    let db = Db::default();
    db.write().await.users.push(User {
        user_id: Some("1".to_string()),
        ..User::default()
    });
    let app = app_with_store(APP_ID, API_KEY, db);
    let resp = app
        .oneshot(request("GET", &format!("/v1/users?page={}&per_page=2", usize::MAX)))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let page: Value = body_json(resp).await;
    assert!(page["users"].as_array().unwrap().is_empty());
    assert_eq!(page["total_count"], 1);
    assert!(page["next_page"].is_null());
}

#[tokio::test]
async fn seeded_store_is_served() {
    let db = Db::default();
    db.write().await.users.push(User {
        user_id: Some("9".to_string()),
        email: Some("pat@example.com".to_string()),
        ..User::default()
    });
    let app = app_with_store(APP_ID, API_KEY, db.clone());
    let resp = app
        .oneshot(request("GET", "/v1/users?email=pat%40example.com"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let user: User = body_json(resp).await;
    assert_eq!(user.user_id.as_deref(), Some("9"));
    assert_eq!(db.read().await.users.len(), 1);
}

// --- create ---

#[tokio::test]
async fn create_user_returns_200() {
    let app = app(APP_ID, API_KEY);
    let resp = app
        .oneshot(json_request(
            "POST",
            "/v1/users",
            r#"{"user_id":"42","email":"jo@example.com","custom_data":{"used_mention":1}}"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let user: User = body_json(resp).await;
    assert_eq!(user.user_id.as_deref(), Some("42"));
    assert_eq!(user.custom_data["used_mention"], 1);
}

#[tokio::test]
async fn create_user_without_identity_returns_400() {
    let app = app(APP_ID, API_KEY);
    let resp = app
        .oneshot(json_request("POST", "/v1/users", r#"{"name":"Nobody"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_user_malformed_json_returns_4xx() {
    let app = app(APP_ID, API_KEY);
    let resp = app
        .oneshot(json_request("POST", "/v1/users", r#"{"user_id":7}"#))
        .await
        .unwrap();

    assert!(resp.status().is_client_error());
}

// --- get ---

#[tokio::test]
async fn get_user_not_found() {
    let app = app(APP_ID, API_KEY);
    let resp = app.oneshot(request("GET", "/v1/users?user_id=404")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn threads_for_unknown_user_not_found() {
    let app = app(APP_ID, API_KEY);
    let resp = app
        .oneshot(request("GET", "/v1/users/message_threads?email=nobody%40example.com"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// --- delete ---

#[tokio::test]
async fn delete_user_not_found() {
    let app = app(APP_ID, API_KEY);
    let resp = app.oneshot(request("DELETE", "/v1/users?user_id=404")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// --- impressions ---

#[tokio::test]
async fn impression_requires_user_id() {
    let app = app(APP_ID, API_KEY);
    let resp = app
        .oneshot(json_request("POST", "/v1/users/impressions", r#"{"email":"a@example.com"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn impression_is_recorded() {
    let db = Db::default();
    let app = app_with_store(APP_ID, API_KEY, db.clone());
    let resp = app
        .oneshot(json_request(
            "POST",
            "/v1/users/impressions",
            r#"{"user_id":"7","current_url":"https://app.example.com"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let result: Value = body_json(resp).await;
    assert_eq!(result["unique_user_count"], 1);
    let store = db.read().await;
    assert_eq!(store.impressions.len(), 1);
    assert_eq!(store.impressions[0]["current_url"], "https://app.example.com");
}

// --- full lifecycle ---

#[tokio::test]
async fn user_lifecycle() {
    use tower::Service;

    let mut app = app(APP_ID, API_KEY).into_service();

    // create
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(json_request(
            "POST",
            "/v1/users",
            r#"{"user_id":"7","email":"sam@example.com","custom_data":{"read_mention":2}}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let created: User = body_json(resp).await;
    let id = created.id;

    // get by email
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(request("GET", "/v1/users?email=sam%40example.com"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let fetched: User = body_json(resp).await;
    assert_eq!(fetched.id, id);

    // update merges custom data key by key
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(json_request(
            "PUT",
            "/v1/users",
            r#"{"user_id":"7","name":"Sam","custom_data":{"used_mention":4}}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let updated: User = body_json(resp).await;
    assert_eq!(updated.id, id);
    assert_eq!(updated.name.as_deref(), Some("Sam"));
    assert_eq!(updated.email.as_deref(), Some("sam@example.com"));
    assert_eq!(updated.custom_data["read_mention"], 2);
    assert_eq!(updated.custom_data["used_mention"], 4);

    // threads
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(request("GET", "/v1/users/message_threads?user_id=7"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let threads: Vec<Value> = body_json(resp).await;
    assert!(threads.is_empty());

    // bulk create adds two more
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(json_request(
            "POST",
            "/v1/users/bulk_create",
            r#"[{"user_id":"8"},{"email":"kim@example.com"}]"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let result: Value = body_json(resp).await;
    assert_eq!(result["count"], 2);

    // list pages
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(request("GET", "/v1/users?page=1&per_page=2"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let page: Value = body_json(resp).await;
    assert_eq!(page["users"].as_array().unwrap().len(), 2);
    assert_eq!(page["total_count"], 3);
    assert_eq!(page["next_page"], 2);

    // delete
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(request("DELETE", "/v1/users?user_id=7"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_bytes(resp).await;
    assert!(!body.is_empty());

    // get after delete is 404
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(request("GET", "/v1/users?user_id=7"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
