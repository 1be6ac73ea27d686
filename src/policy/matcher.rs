//! Per-statement matching.
//!
//! A statement applies to a request when its principal, action and resource
//! all cover the request.  The matcher only answers that question; combining
//! the answers of several statements is the evaluator's job.

use crate::identity::{AccountIdentity, Requester};

use super::document::{AwsPrincipal, Effect, PolicyStatement, Principal};
use super::resource::{bucket_arn, object_arn};

/// Everything the matcher needs to know about one request.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    /// Who is asking.
    pub requester: &'a Requester,
    /// Normalized action identifier, e.g. `s3:PutObject`.
    pub action: &'a str,
    /// Target bucket.
    pub bucket: &'a str,
    /// Target key for object requests; `None` for bucket requests.
    pub key: Option<&'a str>,
}

impl RequestContext<'_> {
    /// Whether this request targets an object rather than the bucket.
    pub fn is_object_request(&self) -> bool {
        self.key.is_some()
    }

    /// ARN of the resource being acted on.
    pub fn resource_arn(&self) -> String {
        match self.key {
            Some(key) => object_arn(self.bucket, key),
            None => bucket_arn(self.bucket),
        }
    }
}

/// Outcome of matching one statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementMatch {
    /// Whether the statement covers the request.
    pub applies: bool,
    /// The statement's effect; only meaningful when `applies` is true.
    pub effect: Effect,
}

/// Match one statement against a request.
pub fn matches(statement: &PolicyStatement, ctx: &RequestContext<'_>) -> StatementMatch {
    let resource = ctx.resource_arn();
    let applies = principal_matches(&statement.principal, ctx.requester)
        && action_matches(&statement.actions, ctx.action)
        && resource_matches(&statement.resources, &resource);
    StatementMatch {
        applies,
        effect: statement.effect,
    }
}

/// Whether a statement's principal covers the requester.
pub fn principal_matches(principal: &Principal, requester: &Requester) -> bool {
    match principal {
        Principal::Any => true,
        Principal::Specific { canonical_ids, aws } => {
            canonical_ids.contains(&requester.canonical_id)
                || aws.iter().any(|entry| aws_entry_matches(entry, requester))
        }
    }
}

fn aws_entry_matches(entry: &AwsPrincipal, requester: &Requester) -> bool {
    match entry {
        AwsPrincipal::Any => true,
        AwsPrincipal::Literal(value) => requester.arn.as_deref() == Some(value.as_str()),
        AwsPrincipal::Account(named) => requester
            .account()
            .is_some_and(|presented| account_matches(named, presented)),
    }
}

/// Account containment between a statement identity and a presented one.
///
/// Account ids and root ARNs stand for the whole account, so they match any
/// identity of that account.  A user ARN matches the same user, and also a
/// request that only presents the account.  Identities of different accounts
/// never match.
fn account_matches(named: &AccountIdentity, presented: &AccountIdentity) -> bool {
    if named.account_id() != presented.account_id() {
        return false;
    }
    match named {
        AccountIdentity::AccountId(_) | AccountIdentity::Root(_) => true,
        AccountIdentity::User { .. } => presented.is_account_wide() || named == presented,
    }
}

/// Whether any action pattern covers `action`.  Action names compare
/// case-insensitively.
pub fn action_matches(patterns: &[String], action: &str) -> bool {
    let action = action.to_ascii_lowercase();
    patterns
        .iter()
        .any(|p| wildcard_match(&p.to_ascii_lowercase(), &action))
}

/// Whether any resource pattern covers `resource`.
pub fn resource_matches(patterns: &[String], resource: &str) -> bool {
    patterns.iter().any(|p| wildcard_match(p, resource))
}

/// Glob match supporting `*` (any run, including empty) and `?` (one char).
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if let Some((star, matched)) = backtrack {
            pi = star + 1;
            ti = matched + 1;
            backtrack = Some((star, ti));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}
