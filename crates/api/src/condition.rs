//! Status condition helpers.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};

pub const READY: &str = "Ready";

/// Insert or update the condition of type `type_`.
///
/// The transition time only moves when the status flips, so rewriting an
/// unchanged condition leaves the list structurally equal.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    type_: &str,
    healthy: bool,
    reason: &str,
    message: impl Into<String>,
    observed_generation: Option<i64>,
) {
    let status = if healthy { "True" } else { "False" }.to_string();
    let message = message.into();

    match conditions.iter_mut().find(|c| c.type_ == type_) {
        Some(existing) => {
            if existing.status != status {
                existing.last_transition_time = Time(chrono::Utc::now());
                existing.status = status;
            }
            existing.reason = reason.to_string();
            existing.message = message;
            existing.observed_generation = observed_generation;
        }
        None => conditions.push(Condition {
            type_: type_.to_string(),
            status,
            reason: reason.to_string(),
            message,
            observed_generation,
            last_transition_time: Time(chrono::Utc::now()),
        }),
    }
}

/// Whether the condition of type `type_` is present and true.
pub fn is_true(conditions: &[Condition], type_: &str) -> bool {
    conditions
        .iter()
        .any(|c| c.type_ == type_ && c.status == "True")
}
