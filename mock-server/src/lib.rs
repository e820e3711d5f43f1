use std::sync::Arc;

use axum::{
    extract::{Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub created_at: Option<i64>,
    pub last_seen_ip: Option<String>,
    pub last_seen_user_agent: Option<String>,
    pub last_request_at: Option<i64>,
    #[serde(default)]
    pub custom_data: Map<String, Value>,
    #[serde(default)]
    pub companies: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserInput {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub created_at: Option<i64>,
    pub last_seen_ip: Option<String>,
    pub last_seen_user_agent: Option<String>,
    pub last_request_at: Option<i64>,
    pub custom_data: Option<Map<String, Value>>,
    pub companies: Option<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Default)]
pub struct Store {
    pub users: Vec<User>,
    pub impressions: Vec<Value>,
}

pub type Db = Arc<RwLock<Store>>;

#[derive(Clone)]
struct AppState {
    db: Db,
    authorization: Arc<String>,
}

const DEFAULT_PER_PAGE: usize = 500;

pub fn app(app_id: &str, api_key: &str) -> Router {
    app_with_store(app_id, api_key, Db::default())
}

/// Build the router over an existing store, e.g. one pre-seeded by a test.
pub fn app_with_store(app_id: &str, api_key: &str, db: Db) -> Router {
    let token = STANDARD.encode(format!("{app_id}:{api_key}"));
    let state = AppState {
        db,
        authorization: Arc::new(format!("Basic {token}")),
    };
    Router::new()
        .route(
            "/v1/users",
            get(get_users).post(upsert_user).put(upsert_user).delete(delete_user),
        )
        .route("/v1/users/message_threads", get(get_threads))
        .route("/v1/users/impressions", post(create_impression))
        .route("/v1/users/bulk_create", post(bulk_create))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state)
}

pub async fn run(listener: TcpListener, app_id: &str, api_key: &str) -> Result<(), std::io::Error> {
    axum::serve(listener, app(app_id, api_key)).await
}

async fn require_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == state.authorization.as_str());
    if !authorized {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(request).await)
}

fn find(users: &[User], user_id: Option<&str>, email: Option<&str>) -> Option<usize> {
    let by_id = user_id.and_then(|id| users.iter().position(|u| u.user_id.as_deref() == Some(id)));
    by_id.or_else(|| email.and_then(|email| users.iter().position(|u| u.email.as_deref() == Some(email))))
}

fn apply(user: &mut User, input: UserInput) {
    if input.user_id.is_some() {
        user.user_id = input.user_id;
    }
    if input.email.is_some() {
        user.email = input.email;
    }
    if input.name.is_some() {
        user.name = input.name;
    }
    if input.created_at.is_some() {
        user.created_at = input.created_at;
    }
    if input.last_seen_ip.is_some() {
        user.last_seen_ip = input.last_seen_ip;
    }
    if input.last_seen_user_agent.is_some() {
        user.last_seen_user_agent = input.last_seen_user_agent;
    }
    if input.last_request_at.is_some() {
        user.last_request_at = input.last_request_at;
    }
    if let Some(custom_data) = input.custom_data {
        user.custom_data.extend(custom_data);
    }
    if let Some(companies) = input.companies {
        user.companies = companies;
    }
}

fn upsert(store: &mut Store, input: UserInput) -> Result<User, StatusCode> {
    if input.user_id.is_none() && input.email.is_none() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let index = match find(&store.users, input.user_id.as_deref(), input.email.as_deref()) {
        Some(index) => index,
        None => {
            store.users.push(User {
                id: Uuid::new_v4(),
                ..User::default()
            });
            store.users.len() - 1
        }
    };
    let user = &mut store.users[index];
    apply(user, input);
    Ok(user.clone())
}

async fn get_users(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Value>, StatusCode> {
    let store = state.db.read().await;
    if query.user_id.is_some() || query.email.is_some() {
        let index = find(&store.users, query.user_id.as_deref(), query.email.as_deref())
            .ok_or(StatusCode::NOT_FOUND)?;
        return Ok(Json(json!(store.users[index])));
    }

    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(DEFAULT_PER_PAGE).max(1);
    let total = store.users.len();
    let total_pages = total.div_ceil(per_page).max(1);
    // Out-of-range pages are empty.
    let skip = (page - 1).checked_mul(per_page).unwrap_or(usize::MAX);
    let users: Vec<&User> = store.users.iter().skip(skip).take(per_page).collect();
    Ok(Json(json!({
        "users": users,
        "page": page,
        "next_page": (page < total_pages).then(|| page + 1),
        "total_pages": total_pages,
        "total_count": total,
    })))
}

async fn upsert_user(
    State(state): State<AppState>,
    Json(input): Json<UserInput>,
) -> Result<Json<User>, StatusCode> {
    let mut store = state.db.write().await;
    upsert(&mut store, input).map(Json)
}

async fn delete_user(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<User>, StatusCode> {
    let mut store = state.db.write().await;
    let index = find(&store.users, query.user_id.as_deref(), query.email.as_deref())
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(store.users.remove(index)))
}

async fn get_threads(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<Value>>, StatusCode> {
    let store = state.db.read().await;
    find(&store.users, query.user_id.as_deref(), query.email.as_deref())
        .map(|_| Json(Vec::new()))
        .ok_or(StatusCode::NOT_FOUND)
}

async fn create_impression(
    State(state): State<AppState>,
    Json(input): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    if input.get("user_id").and_then(Value::as_str).is_none() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let mut store = state.db.write().await;
    store.impressions.push(input);
    Ok(Json(json!({ "unique_user_count": store.impressions.len() })))
}

async fn bulk_create(
    State(state): State<AppState>,
    Json(inputs): Json<Vec<UserInput>>,
) -> Result<Json<Value>, StatusCode> {
    let mut store = state.db.write().await;
    let mut created = 0;
    for input in inputs {
        upsert(&mut store, input)?;
        created += 1;
    }
    Ok(Json(json!({ "count": created })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(user_id: Option<&str>, email: Option<&str>) -> UserInput {
        UserInput {
            user_id: user_id.map(str::to_string),
            email: email.map(str::to_string),
            ..UserInput::default()
        }
    }

    #[test]
    fn upsert_creates_then_updates() {
        let mut store = Store::default();
        let created = upsert(&mut store, input(Some("1"), Some("a@example.com"))).unwrap();
        let updated = upsert(
            &mut store,
            UserInput {
                name: Some("Jo".to_string()),
                ..input(Some("1"), None)
            },
        )
        .unwrap();
        assert_eq!(store.users.len(), 1);
        assert_eq!(created.id, updated.id);
        assert_eq!(updated.email.as_deref(), Some("a@example.com"));
        assert_eq!(updated.name.as_deref(), Some("Jo"));
    }

    #[test]
    fn upsert_merges_custom_data_keys() {
        let mut store = Store::default();
        let mut first = Map::new();
        first.insert("a".to_string(), json!(1));
        first.insert("b".to_string(), json!(2));
        upsert(
            &mut store,
            UserInput {
                custom_data: Some(first),
                ..input(Some("1"), None)
            },
        )
        .unwrap();

        let mut second = Map::new();
        second.insert("b".to_string(), json!(3));
        let user = upsert(
            &mut store,
            UserInput {
                custom_data: Some(second),
                ..input(Some("1"), None)
            },
        )
        .unwrap();
        assert_eq!(user.custom_data["a"], json!(1));
        assert_eq!(user.custom_data["b"], json!(3));
    }

    #[test]
    fn upsert_requires_identity() {
        let mut store = Store::default();
        assert_eq!(upsert(&mut store, UserInput::default()).unwrap_err(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn find_prefers_user_id() {
        let mut store = Store::default();
        upsert(&mut store, input(Some("1"), Some("a@example.com"))).unwrap();
        upsert(&mut store, input(Some("2"), Some("b@example.com"))).unwrap();
        assert_eq!(find(&store.users, Some("2"), Some("a@example.com")), Some(1));
        assert_eq!(find(&store.users, None, Some("a@example.com")), Some(0));
        assert_eq!(find(&store.users, None, None), None);
    }

    #[test]
    fn user_serializes_custom_data() {
        let mut user = User {
            user_id: Some("1".to_string()),
            ..User::default()
        };
        user.custom_data.insert("used_mention".to_string(), json!(4));
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["user_id"], "1");
        assert_eq!(json["custom_data"]["used_mention"], 4);
    }
}
