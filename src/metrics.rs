//! Metric names and recording helpers.
//!
//! Uses the `metrics` facade only.  Installing a recorder (Prometheus or
//! otherwise) is left to the embedding server; without one every call here
//! is a no-op.

use metrics::{counter, describe_counter};

// -- Metric name constants ----------------------------------------------------

/// Authorization decisions (counter). Labels: kind (bucket|object), decision.
pub const AUTHZ_DECISIONS_TOTAL: &str = "bleepstore_authz_decisions_total";

/// Multipart state transitions (counter). Labels: transition.
pub const MULTIPART_TRANSITIONS_TOTAL: &str = "bleepstore_multipart_transitions_total";

/// Register metric descriptions with the global recorder.
pub fn describe_metrics() {
    describe_counter!(AUTHZ_DECISIONS_TOTAL, "Authorization decisions by kind and outcome");
    describe_counter!(
        MULTIPART_TRANSITIONS_TOTAL,
        "Multipart upload state transitions"
    );
}

/// Count one authorization decision.
pub fn record_decision(kind: &'static str, allowed: bool) {
    let decision = if allowed { "allow" } else { "deny" };
    counter!(AUTHZ_DECISIONS_TOTAL, "kind" => kind, "decision" => decision).increment(1);
}

/// Count one multipart transition (`initiate`, `part`, `abort`, `abort_noop`,
/// `complete`).
pub fn record_transition(transition: &'static str) {
    counter!(MULTIPART_TRANSITIONS_TOTAL, "transition" => transition).increment(1);
}
