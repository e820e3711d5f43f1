//! Stateless HTTP request builder and response parser for the Intercom user API.
//!
//! # Design
//! `IntercomClient` holds only the base URL and the basic-auth credentials and
//! carries no mutable state between calls. Each operation is split into a
//! `build_*` method that produces an `HttpRequest` and a `parse_*` method that
//! consumes an `HttpResponse`. Whoever holds a `Transport` executes the
//! round-trip in between.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::lookup::UserLookup;
use crate::queue::DeferredCall;
use crate::types::{Impression, RemoteUser, UserList, UserPayload};

/// Application id and API key, sent as HTTP basic auth.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub app_id: String,
    pub api_key: String,
}

impl Credentials {
    pub fn new(app_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            api_key: api_key.into(),
        }
    }

    /// Value of the `authorization` header.
    pub fn basic_auth(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.app_id, self.api_key));
        format!("Basic {token}")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("app_id", &self.app_id)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Synchronous, stateless client for the Intercom user API.
#[derive(Debug, Clone)]
pub struct IntercomClient {
    base_url: String,
    credentials: Credentials,
}

impl IntercomClient {
    pub fn new(base_url: &str, credentials: Credentials) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_list_users(&self, page: u32, per_page: Option<u32>) -> HttpRequest {
        let mut path = format!("{}/users?page={page}", self.base_url);
        if let Some(per_page) = per_page {
            path.push_str(&format!("&per_page={per_page}"));
        }
        self.request(HttpMethod::Get, path, None)
    }

    pub fn build_get_user(&self, lookup: &UserLookup) -> HttpRequest {
        let path = format!("{}/users?{}", self.base_url, lookup.query());
        self.request(HttpMethod::Get, path, None)
    }

    pub fn build_get_thread(&self, lookup: &UserLookup) -> HttpRequest {
        let path = format!("{}/users/message_threads?{}", self.base_url, lookup.query());
        self.request(HttpMethod::Get, path, None)
    }

    pub fn build_create_user(&self, input: &UserPayload) -> Result<HttpRequest, ApiError> {
        self.build_user_write(HttpMethod::Post, input)
    }

    pub fn build_update_user(&self, input: &UserPayload) -> Result<HttpRequest, ApiError> {
        self.build_user_write(HttpMethod::Put, input)
    }

    pub fn build_delete_user(&self, lookup: &UserLookup) -> HttpRequest {
        let path = format!("{}/users?{}", self.base_url, lookup.query());
        self.request(HttpMethod::Delete, path, None)
    }

    pub fn build_create_impression(&self, input: &Impression) -> Result<HttpRequest, ApiError> {
        let body = to_json(input)?;
        let path = format!("{}/users/impressions", self.base_url);
        Ok(self.request(HttpMethod::Post, path, Some(body)))
    }

    pub fn build_bulk_create(&self, users: &[UserPayload]) -> Result<HttpRequest, ApiError> {
        let body = to_json(&users)?;
        let path = format!("{}/users/bulk_create", self.base_url);
        Ok(self.request(HttpMethod::Post, path, Some(body)))
    }

    /// Turn a call read back from the deferred log into a sendable request,
    /// re-attaching the headers the log does not store.
    pub fn build_replay(&self, call: &DeferredCall) -> HttpRequest {
        self.request(call.method, call.url.clone(), call.body.clone())
    }

    pub fn parse_list_users(&self, response: HttpResponse) -> Result<UserList, ApiError> {
        parse_json(response)
    }

    pub fn parse_user(&self, response: HttpResponse) -> Result<RemoteUser, ApiError> {
        parse_json(response)
    }

    pub fn parse_thread(&self, response: HttpResponse) -> Result<Vec<Value>, ApiError> {
        parse_json(response)
    }

    pub fn parse_impression(&self, response: HttpResponse) -> Result<Value, ApiError> {
        parse_json(response)
    }

    pub fn parse_bulk_create(&self, response: HttpResponse) -> Result<Value, ApiError> {
        check_status(&response)?;
        if response.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&response.body).map_err(|e| ApiError::DeserializationError(e.to_string()))
    }

    fn build_user_write(&self, method: HttpMethod, input: &UserPayload) -> Result<HttpRequest, ApiError> {
        if !input.has_identity() {
            return Err(ApiError::MissingIdentity);
        }
        let body = to_json(input)?;
        let path = format!("{}/users", self.base_url);
        Ok(self.request(method, path, Some(body)))
    }

    fn request(&self, method: HttpMethod, path: String, body: Option<String>) -> HttpRequest {
        let mut headers = vec![("authorization".to_string(), self.credentials.basic_auth())];
        if body.is_some() {
            headers.push(("content-type".to_string(), "application/json".to_string()));
        }
        HttpRequest {
            method,
            path,
            headers,
            body,
        }
    }
}

fn to_json<T: Serialize + ?Sized>(input: &T) -> Result<String, ApiError> {
    serde_json::to_string(input).map_err(|e| ApiError::SerializationError(e.to_string()))
}

fn parse_json<T: DeserializeOwned>(response: HttpResponse) -> Result<T, ApiError> {
    check_status(&response)?;
    serde_json::from_str(&response.body).map_err(|e| ApiError::DeserializationError(e.to_string()))
}

/// Map non-success status codes to the appropriate `ApiError` variant.
fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    match response.status {
        401 => Err(ApiError::Unauthorized),
        404 => Err(ApiError::NotFound),
        status => Err(ApiError::HttpError {
            status,
            body: response.body.clone(),
        }),
    }
}
