//! Status conditions
//!
//! Each condition reports one concern (host provisioning, bootstrap, endpoint
//! readiness, ...) independently of the others. The aggregate `Ready`
//! condition is derived from a set of them by [`summarize`], a pure fold that
//! can be tested on its own.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Type of the derived summary condition
pub const READY_CONDITION: &str = "Ready";

/// Condition status following Kubernetes conventions
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum ConditionStatus {
    /// Condition is met
    True,
    /// Condition is not met
    False,
    /// Condition has not been evaluated yet
    #[default]
    Unknown,
}

/// How bad a `False` condition is
///
/// Ordering matters: the summary picks the most severe false condition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ConditionSeverity {
    /// No severity (used for `True` conditions)
    #[default]
    #[serde(rename = "")]
    None,
    /// Informational: progress is expected
    Info,
    /// Something failed but will be retried
    Warning,
    /// Something failed and needs attention
    Error,
}

/// A single status condition
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g., HostProvisioned)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition
    pub status: ConditionStatus,

    /// Machine-readable reason, empty for `True` conditions
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    /// Severity, only meaningful for `False` conditions
    #[serde(default)]
    pub severity: ConditionSeverity,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// Last time the status flipped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Condition {
    /// A `True` condition of the given type
    pub fn true_condition(type_: impl Into<String>) -> Self {
        Self {
            type_: type_.into(),
            status: ConditionStatus::True,
            reason: String::new(),
            severity: ConditionSeverity::None,
            message: String::new(),
            last_transition_time: Some(Utc::now()),
        }
    }

    /// A `False` condition of the given type
    pub fn false_condition(
        type_: impl Into<String>,
        reason: impl Into<String>,
        severity: ConditionSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status: ConditionStatus::False,
            reason: reason.into(),
            severity,
            message: message.into(),
            last_transition_time: Some(Utc::now()),
        }
    }

    /// Whether the condition is `True`
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }

    /// Same status, reason, severity and message (timestamps ignored)
    fn same_state(&self, other: &Self) -> bool {
        self.status == other.status
            && self.reason == other.reason
            && self.severity == other.severity
            && self.message == other.message
    }
}

/// Look up a condition by type
pub fn get<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Whether the condition of the given type exists and is `True`
pub fn is_true(conditions: &[Condition], type_: &str) -> bool {
    get(conditions, type_).is_some_and(Condition::is_true)
}

/// Insert or replace a condition.
///
/// The transition time of an existing condition is kept when the status does
/// not change, and the whole entry is left untouched when nothing changed, so
/// repeated reconciliation does not produce spurious writes.
pub fn set(conditions: &mut Vec<Condition>, condition: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            if existing.same_state(&condition) {
                return;
            }
            let keep_time = existing.status == condition.status;
            let previous_time = existing.last_transition_time;
            *existing = condition;
            if keep_time {
                existing.last_transition_time = previous_time;
            }
        }
        None => conditions.push(condition),
    }
}

/// Set a `True` condition
pub fn mark_true(conditions: &mut Vec<Condition>, type_: &str) {
    set(conditions, Condition::true_condition(type_));
}

/// Set a `False` condition
pub fn mark_false(
    conditions: &mut Vec<Condition>,
    type_: &str,
    reason: &str,
    severity: ConditionSeverity,
    message: impl Into<String>,
) {
    set(conditions, Condition::false_condition(type_, reason, severity, message));
}

/// Fold a set of conditions into one aggregate `Ready` condition.
///
/// - any listed condition `False`: `False`, taking reason and message from the
///   most severe one (first wins on ties)
/// - all listed conditions present and `True`: `True`
/// - otherwise: `Unknown`
pub fn summarize(conditions: &[Condition], types: &[&str]) -> Condition {
    let mut worst: Option<&Condition> = None;
    let mut all_true = !types.is_empty();

    for type_ in types {
        match get(conditions, type_) {
            Some(c) if c.is_true() => {}
            Some(c) if c.status == ConditionStatus::False => {
                all_true = false;
                if worst.is_none_or(|w| c.severity > w.severity) {
                    worst = Some(c);
                }
            }
            _ => all_true = false,
        }
    }

    match worst {
        Some(w) => Condition::false_condition(READY_CONDITION, w.reason.clone(), w.severity, w.message.clone()),
        None if all_true => Condition::true_condition(READY_CONDITION),
        None => Condition {
            type_: READY_CONDITION.to_string(),
            status: ConditionStatus::Unknown,
            reason: String::new(),
            severity: ConditionSeverity::None,
            message: String::new(),
            last_transition_time: Some(Utc::now()),
        },
    }
}

/// Recompute the `Ready` summary from `types` and store it
pub fn set_summary(conditions: &mut Vec<Condition>, types: &[&str]) {
    let summary = summarize(conditions, types);
    set(conditions, summary);
}
