//! The key schema shared by every backend.

/// The durable event cursor.
pub const CURSOR: &str = "events:cursor";

/// The ranking consumer's queue.
pub const RANKING_QUEUE: &str = "ranking:queue";

/// An intent's body.
pub fn intent(intent_id: &str) -> String {
    format!("intent:{intent_id}")
}

/// The set of an intent's passed solution ids.
pub fn passed_set(intent_id: &str) -> String {
    format!("intent:{intent_id}:passed")
}

/// The set of an intent's failed solution ids.
pub fn failed_set(intent_id: &str) -> String {
    format!("intent:{intent_id}:failed")
}

/// A per-solution record, keyed by `(intent_id, solution_id)`.
pub fn solution(intent_id: &str, solution_id: &str) -> String {
    format!("intent:{intent_id}:solution:{solution_id}")
}
