//! Condition bookkeeping helpers shared by all reconcilers.

use chrono::Utc;

use crate::domain::meta::{Condition, ConditionStatus};

/// Standard condition type set when an object is reconciled and healthy.
pub const CONDITION_READY: &str = "Ready";

/// Standard condition type set when reconciliation cannot make progress.
pub const CONDITION_DEGRADED: &str = "Degraded";

/// Build a condition stamped now.
pub fn condition(
    condition_type: &str,
    status: ConditionStatus,
    reason: &str,
    message: impl Into<String>,
    observed_generation: i64,
) -> Condition {
    Condition {
        condition_type: condition_type.to_string(),
        status,
        reason: reason.to_string(),
        message: message.into(),
        observed_generation,
        last_transition_time: Utc::now(),
    }
}

/// Upsert a condition by type. Returns whether anything observable
/// changed; an equivalent condition keeps its original transition time and
/// causes no write.
pub fn set_condition(conditions: &mut Vec<Condition>, new: Condition) -> bool {
    match conditions
        .iter_mut()
        .find(|c| c.condition_type == new.condition_type)
    {
        Some(existing) => {
            if existing.equivalent(&new) {
                return false;
            }
            let transition_time = if existing.status == new.status {
                existing.last_transition_time
            } else {
                new.last_transition_time
            };
            *existing = Condition {
                last_transition_time: transition_time,
                ..new
            };
            true
        }
        None => {
            conditions.push(new);
            true
        }
    }
}

/// Remove a condition by type; returns whether it was present.
pub fn clear_condition(conditions: &mut Vec<Condition>, condition_type: &str) -> bool {
    let before = conditions.len();
    conditions.retain(|c| c.condition_type != condition_type);
    conditions.len() != before
}

/// Find a condition by type.
pub fn find_condition<'a>(
    conditions: &'a [Condition],
    condition_type: &str,
) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.condition_type == condition_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equivalent_condition_causes_no_change() {
        let mut conditions = Vec::new();
        let first = condition(CONDITION_READY, ConditionStatus::True, "Reconciled", "ok", 3);
        assert!(set_condition(&mut conditions, first.clone()));

        let again = condition(CONDITION_READY, ConditionStatus::True, "Reconciled", "ok", 3);
        assert!(!set_condition(&mut conditions, again));
        assert_eq!(conditions.len(), 1);
    }

    #[test]
    fn test_transition_time_kept_when_status_unchanged() {
        let mut conditions = Vec::new();
        let first = condition(CONDITION_READY, ConditionStatus::True, "Reconciled", "ok", 3);
        let original_time = first.last_transition_time;
        set_condition(&mut conditions, first);

        // Message changes, status does not: observable change, stable time.
        let updated = condition(
            CONDITION_READY,
            ConditionStatus::True,
            "Reconciled",
            "applied 4 resources",
            3,
        );
        assert!(set_condition(&mut conditions, updated));
        assert_eq!(conditions[0].last_transition_time, original_time);
        assert_eq!(conditions[0].message, "applied 4 resources");
    }

    #[test]
    fn test_status_flip_updates_transition_time() {
        let mut conditions = Vec::new();
        set_condition(
            &mut conditions,
            condition(CONDITION_READY, ConditionStatus::True, "Reconciled", "ok", 3),
        );
        let flipped = condition(
            CONDITION_READY,
            ConditionStatus::False,
            "ApplyRejected",
            "denied",
            4,
        );
        let flip_time = flipped.last_transition_time;
        set_condition(&mut conditions, flipped);
        assert_eq!(conditions[0].last_transition_time, flip_time);
    }

    #[test]
    fn test_clear_and_find() {
        let mut conditions = Vec::new();
        set_condition(
            &mut conditions,
            condition(CONDITION_DEGRADED, ConditionStatus::True, "Invalid", "bad", 1),
        );
        assert!(find_condition(&conditions, CONDITION_DEGRADED).is_some());
        assert!(clear_condition(&mut conditions, CONDITION_DEGRADED));
        assert!(!clear_condition(&mut conditions, CONDITION_DEGRADED));
    }
}
