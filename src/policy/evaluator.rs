//! Bucket policy evaluation with owner fallback.
//!
//! Every statement is matched before a decision is taken: the effects of the
//! applying statements are collected first and only then combined, so an
//! explicit `Deny` wins no matter where it sits in the document.

use tracing::{debug, Span};

use crate::identity::Requester;
use crate::metadata::store::BucketRecord;
use crate::metrics;

use super::document::{BucketPolicy, Effect};
use super::matcher::{matches, RequestContext};

/// Combined outcome of a policy over one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    /// At least one statement allowed and none denied.
    Allow,
    /// At least one statement denied.
    Deny,
    /// No statement applied.
    NoMatch,
}

/// Run every statement of `policy` against `ctx` and combine the effects.
pub fn evaluate_policy(policy: &BucketPolicy, ctx: &RequestContext<'_>) -> PolicyDecision {
    let effects: Vec<Effect> = policy
        .statements
        .iter()
        .filter_map(|stmt| {
            let m = matches(stmt, ctx);
            debug!(
                sid = stmt.sid.as_deref().unwrap_or(""),
                applies = m.applies,
                effect = ?m.effect,
                "policy statement evaluated"
            );
            m.applies.then_some(m.effect)
        })
        .collect();

    if effects.contains(&Effect::Deny) {
        PolicyDecision::Deny
    } else if effects.contains(&Effect::Allow) {
        PolicyDecision::Allow
    } else {
        PolicyDecision::NoMatch
    }
}

/// Decide a bucket-level action.
///
/// Without a policy, or when no statement applies, only the bucket owner is
/// allowed.
pub fn is_bucket_authorized(
    bucket: &BucketRecord,
    action: &str,
    requester: &Requester,
    log: &Span,
) -> bool {
    let ctx = RequestContext {
        requester,
        action,
        bucket: &bucket.name,
        key: None,
    };
    let allowed = log.in_scope(|| decide(bucket, &bucket.owner_id, &ctx));
    metrics::record_decision("bucket", allowed);
    allowed
}

/// Decide an object-level action.
///
/// The ownership fallback uses `object_owner`, or the bucket owner when the
/// object does not exist yet (writes, multipart uploads).
pub fn is_object_authorized(
    bucket: &BucketRecord,
    key: &str,
    object_owner: Option<&str>,
    action: &str,
    requester: &Requester,
    log: &Span,
) -> bool {
    let ctx = RequestContext {
        requester,
        action,
        bucket: &bucket.name,
        key: Some(key),
    };
    let owner = object_owner.unwrap_or(&bucket.owner_id);
    let allowed = log.in_scope(|| decide(bucket, owner, &ctx));
    metrics::record_decision("object", allowed);
    allowed
}

fn decide(bucket: &BucketRecord, owner_id: &str, ctx: &RequestContext<'_>) -> bool {
    let is_owner = ctx.requester.canonical_id == owner_id;
    let Some(policy) = bucket.policy.as_deref() else {
        debug!(action = ctx.action, is_owner, "no bucket policy, owner check");
        return is_owner;
    };

    match evaluate_policy(policy, ctx) {
        PolicyDecision::Deny => {
            debug!(action = ctx.action, "explicit deny");
            false
        }
        PolicyDecision::Allow => {
            debug!(action = ctx.action, "allowed by policy");
            true
        }
        PolicyDecision::NoMatch => {
            debug!(action = ctx.action, is_owner, "no statement applied, owner check");
            is_owner
        }
    }
}
