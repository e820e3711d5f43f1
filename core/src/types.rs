//! Domain DTOs for the Intercom user API.
//!
//! # Design
//! These types mirror the remote schema but are defined independently from
//! the mock-server crate; integration tests catch schema drift. Custom data is
//! kept as a raw JSON map because its keys are product-defined.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::merge::AttributeSource;

/// A user record as returned by the remote service.
///
/// A snapshot only: it is fetched right before a merge and dropped after.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RemoteUser {
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

/// One page of users.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserList {
    #[serde(default)]
    pub users: Vec<RemoteUser>,
    pub page: Option<u32>,
    pub next_page: Option<u32>,
    pub total_pages: Option<u32>,
    pub total_count: Option<u64>,
}

/// Request payload for creating or updating a user. Omitted fields are left
/// untouched on the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen_user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_request_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub custom_data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub companies: Vec<Value>,
}

impl UserPayload {
    /// True when a non-empty user id or email identifies the user.
    pub fn has_identity(&self) -> bool {
        let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.is_empty());
        present(&self.user_id) || present(&self.email)
    }
}

/// Request payload recording a page impression for a user.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Impression {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_url: Option<String>,
}

/// The caller's live view of an account, the source of truth for identity
/// and for attributes that are recomputed on every sync.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountSnapshot {
    pub user_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub created_at: Option<i64>,
    pub last_request_at: Option<i64>,
    pub attributes: Map<String, Value>,
}

impl AccountSnapshot {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Create payload carrying this account's identity and the given data.
    pub fn to_payload(&self, custom_data: Map<String, Value>, companies: Vec<Value>) -> UserPayload {
        UserPayload {
            user_id: Some(self.user_id.clone()),
            email: self.email.clone(),
            name: self.name.clone(),
            created_at: self.created_at,
            last_request_at: self.last_request_at,
            custom_data,
            companies,
            ..UserPayload::default()
        }
    }
}

impl AttributeSource for AccountSnapshot {
    fn attribute(&self, name: &str) -> Option<Value> {
        self.attributes.attribute(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_user_tolerates_missing_fields() {
        let user: RemoteUser = serde_json::from_str(r#"{"email":"a@example.com"}"#).unwrap();
        assert_eq!(user.email.as_deref(), Some("a@example.com"));
        assert!(user.user_id.is_none());
        assert!(user.custom_data.is_empty());
        assert!(user.companies.is_empty());
    }

    #[test]
    fn remote_user_ignores_unknown_fields() {
        let user: RemoteUser =
            serde_json::from_str(r#"{"user_id":"7","intercom_id":"x","session_count":3}"#).unwrap();
        assert_eq!(user.user_id.as_deref(), Some("7"));
    }

    #[test]
    fn payload_omits_absent_fields() {
        let payload = UserPayload {
            user_id: Some("42".to_string()),
            ..UserPayload::default()
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json, serde_json::json!({"user_id": "42"}));
    }

    #[test]
    fn empty_identity_fields_do_not_count() {
        let payload = UserPayload {
            user_id: Some(String::new()),
            email: None,
            ..UserPayload::default()
        };
        assert!(!payload.has_identity());

        let payload = UserPayload {
            email: Some("a@example.com".to_string()),
            ..UserPayload::default()
        };
        assert!(payload.has_identity());
    }

    #[test]
    fn account_payload_carries_identity() {
        let mut account = AccountSnapshot::new("42");
        account.email = Some("jo@example.com".to_string());
        account.created_at = Some(1_300_000_000);

        let payload = account.to_payload(Map::new(), Vec::new());
        assert_eq!(payload.user_id.as_deref(), Some("42"));
        assert_eq!(payload.email.as_deref(), Some("jo@example.com"));
        assert_eq!(payload.created_at, Some(1_300_000_000));
    }
}
