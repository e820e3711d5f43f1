//! Routing of user identifiers to the `email` or `user_id` query parameter.

use std::sync::LazyLock;

use regex::Regex;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
    )
    .expect("email pattern is valid")
});

/// True when `value` is a syntactically valid email address with a dotted
/// domain.
pub fn is_email(value: &str) -> bool {
    value.len() <= 254 && EMAIL.is_match(value)
}

/// How a user is addressed in lookup and delete queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserLookup {
    UserId(String),
    Email(String),
}

impl UserLookup {
    /// Pick the query parameter from the shape of `identifier`.
    pub fn detect(identifier: &str) -> Self {
        if is_email(identifier) {
            UserLookup::Email(identifier.to_string())
        } else {
            UserLookup::UserId(identifier.to_string())
        }
    }

    pub fn param(&self) -> &'static str {
        match self {
            UserLookup::UserId(_) => "user_id",
            UserLookup::Email(_) => "email",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            UserLookup::UserId(value) | UserLookup::Email(value) => value,
        }
    }

    /// `param=value` with the value percent-encoded.
    pub fn query(&self) -> String {
        format!("{}={}", self.param(), urlencoding::encode(self.value()))
    }
}
