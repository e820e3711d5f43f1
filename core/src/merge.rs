//! Reconciliation of an update payload against the remote user record.
//!
//! # Design
//! Two configured field sets drive the merge:
//! - incremental fields are counters that accumulate across updates. With
//!   increment mode on, the caller's value is a delta added to the remote
//!   value; with it off, the caller's value overwrites.
//! - recompute rules name attributes that always reflect the caller's live
//!   source object, never the remote record.
//!
//! Fields in neither set pass through untouched.
//!
//! When the remote record already holds a counter and the caller does not
//! mention it, the counter is left out of the result rather than zeroed, so
//! the remote value stands. Zero-defaulting only happens when no prior remote
//! value exists.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tracing::warn;

use crate::types::RemoteUser;

/// Counters merged by default.
pub const DEFAULT_INCREMENTAL_FIELDS: &[&str] = &[
    "pluggued_social_account",
    "received_shared_alert",
    "shared_an_alert",
    "has_sent_an_invite",
    "downloaded_stats",
    "read_mention",
    "used_mention",
];

/// Supplies current values for recomputed attributes. `None` means the
/// source has nothing to say and the rule is skipped.
pub trait AttributeSource {
    fn attribute(&self, name: &str) -> Option<Value>;
}

impl AttributeSource for Map<String, Value> {
    fn attribute(&self, name: &str) -> Option<Value> {
        self.get(name).filter(|value| !value.is_null()).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecomputeMode {
    /// Overwrite whatever the caller supplied.
    Always,
    /// Fill in only when the caller left the field out.
    IfAbsent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecomputeRule {
    pub field: String,
    pub mode: RecomputeMode,
}

impl RecomputeRule {
    pub fn always(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            mode: RecomputeMode::Always,
        }
    }

    pub fn if_absent(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            mode: RecomputeMode::IfAbsent,
        }
    }
}

/// Field sets for payload reconciliation, loadable from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergePolicy {
    pub incremental_fields: Vec<String>,
    pub recompute: Vec<RecomputeRule>,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            incremental_fields: DEFAULT_INCREMENTAL_FIELDS.iter().map(|f| f.to_string()).collect(),
            recompute: vec![
                RecomputeRule::always("quota_exceeded_at"),
                RecomputeRule::always("consumed_mentions"),
                RecomputeRule::always("langue"),
                RecomputeRule::always("VIP"),
                RecomputeRule::always("actual_plan"),
                RecomputeRule::always("quota"),
                RecomputeRule::if_absent("end_of_trial"),
                RecomputeRule::if_absent("deleted_account"),
                RecomputeRule::if_absent("team_members"),
                RecomputeRule::if_absent("created_alert"),
            ],
        }
    }
}

impl MergePolicy {
    pub fn new(incremental_fields: Vec<String>, recompute: Vec<RecomputeRule>) -> Self {
        Self {
            incremental_fields,
            recompute,
        }
    }

    pub fn is_incremental(&self, field: &str) -> bool {
        self.incremental_fields.iter().any(|f| f == field)
    }

    /// Compute the custom data to send on an update.
    ///
    /// `remote` is the record fetched just before the update, `None` when the
    /// user does not exist remotely yet. `source` feeds the recompute rules;
    /// without one they are not applied.
    pub fn reconcile(
        &self,
        remote: Option<&RemoteUser>,
        payload: Map<String, Value>,
        source: Option<&dyn AttributeSource>,
        increment_mode: bool,
    ) -> Map<String, Value> {
        let mut merged = payload;

        if let Some(source) = source {
            self.apply_recompute(&mut merged, source);
        }

        for field in &self.incremental_fields {
            let supplied = merged.get(field).filter(|value| !value.is_null()).cloned();
            let prior = remote
                .and_then(|user| user.custom_data.get(field))
                .filter(|value| !value.is_null());

            match (remote, prior, supplied) {
                (Some(_), Some(prior), Some(delta)) => {
                    if increment_mode {
                        let sum = add_counters(&delta, prior).unwrap_or_else(|| {
                            warn!(field = %field, "non-numeric counter, keeping caller value");
                            delta
                        });
                        merged.insert(field.clone(), sum);
                    }
                }
                (Some(_), Some(_), None) => {
                    merged.remove(field);
                }
                (_, _, None) => {
                    merged.insert(field.clone(), Value::from(0));
                }
                (_, _, Some(_)) => {}
            }
        }

        merged
    }

    fn apply_recompute(&self, merged: &mut Map<String, Value>, source: &dyn AttributeSource) {
        for rule in &self.recompute {
            let present = merged.get(&rule.field).is_some_and(|value| !value.is_null());
            if rule.mode == RecomputeMode::IfAbsent && present {
                continue;
            }
            if let Some(value) = source.attribute(&rule.field) {
                merged.insert(rule.field.clone(), value);
            }
        }
    }
}

enum Counter {
    Int(i64),
    Float(f64),
}

fn counter(value: &Value) -> Option<Counter> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(Counter::Int)
            .or_else(|| n.as_f64().map(Counter::Float)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .map(Counter::Int)
                .or_else(|_| s.parse::<f64>().map(Counter::Float))
                .ok()
        }
        _ => None,
    }
}

/// Sum two counters; integers stay integral unless the sum overflows.
fn add_counters(a: &Value, b: &Value) -> Option<Value> {
    let as_float = |c: &Counter| match c {
        Counter::Int(i) => *i as f64,
        Counter::Float(f) => *f,
    };
    match (counter(a)?, counter(b)?) {
        (Counter::Int(x), Counter::Int(y)) => match x.checked_add(y) {
            Some(sum) => Some(Value::from(sum)),
            None => Number::from_f64(x as f64 + y as f64).map(Value::Number),
        },
        (x, y) => Number::from_f64(as_float(&x) + as_float(&y)).map(Value::Number),
    }
}
