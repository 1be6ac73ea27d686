//! Bucket policy documents.
//!
//! Policies arrive as IAM-style JSON.  Fields that may be either a string or
//! a list are normalized once, at parse time, so matching never has to care
//! which shape the author used.

use std::collections::BTreeSet;

use serde::Deserialize;

use crate::errors::S3Error;
use crate::identity::AccountIdentity;

/// A string or a list of strings, as written in the policy JSON.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    /// A single string.
    Single(String),
    /// A list of strings.
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::Single(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

/// Effect of a policy statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Effect {
    /// Grant the action.
    Allow,
    /// Refuse the action, overriding any grant.
    Deny,
}

/// One entry of an `AWS` principal list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AwsPrincipal {
    /// `"*"`
    Any,
    /// A user ARN, root ARN or bare account id.
    Account(AccountIdentity),
    /// Anything else; only ever compared verbatim.
    Literal(String),
}

impl AwsPrincipal {
    fn parse(value: String) -> Self {
        if value == "*" {
            return AwsPrincipal::Any;
        }
        match AccountIdentity::parse(&value) {
            Some(identity) => AwsPrincipal::Account(identity),
            None => AwsPrincipal::Literal(value),
        }
    }
}

/// Normalized principal of a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// Everyone, including anonymous requesters.
    Any,
    /// Named principals.
    Specific {
        /// Canonical user ids.
        canonical_ids: BTreeSet<String>,
        /// Account-level principals.
        aws: Vec<AwsPrincipal>,
    },
}

/// A single parsed statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyStatement {
    /// Optional statement id.
    pub sid: Option<String>,
    /// Allow or deny.
    pub effect: Effect,
    /// Who the statement applies to.
    pub principal: Principal,
    /// Action patterns, e.g. `s3:GetObject` or `s3:*`.
    pub actions: Vec<String>,
    /// Resource ARNs or ARN patterns.
    pub resources: Vec<String>,
}

/// A bucket policy: the parsed statements plus the document as submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketPolicy {
    /// Policy language version.
    pub version: Option<String>,
    /// Parsed statements, in document order.
    pub statements: Vec<PolicyStatement>,
    raw: String,
}

// -- Wire shapes ---------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawPolicy {
    #[serde(default)]
    version: Option<String>,
    statement: RawStatements,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawStatements {
    Single(Box<RawStatement>),
    Many(Vec<RawStatement>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawStatement {
    #[serde(default)]
    sid: Option<String>,
    effect: Effect,
    principal: RawPrincipal,
    action: OneOrMany,
    resource: OneOrMany,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPrincipal {
    Wildcard(String),
    Map(RawPrincipalMap),
}

#[derive(Debug, Deserialize)]
struct RawPrincipalMap {
    #[serde(rename = "AWS", default)]
    aws: Option<OneOrMany>,
    #[serde(rename = "CanonicalUser", default)]
    canonical_user: Option<OneOrMany>,
}

impl RawPrincipal {
    fn normalize(self) -> Result<Principal, String> {
        match self {
            RawPrincipal::Wildcard(s) if s == "*" => Ok(Principal::Any),
            RawPrincipal::Wildcard(s) => Err(format!("Invalid principal: {s}")),
            RawPrincipal::Map(map) => {
                if map.aws.is_none() && map.canonical_user.is_none() {
                    return Err("Principal must name AWS or CanonicalUser".to_string());
                }
                let aws: Vec<AwsPrincipal> = map
                    .aws
                    .map(OneOrMany::into_vec)
                    .unwrap_or_default()
                    .into_iter()
                    .map(AwsPrincipal::parse)
                    .collect();
                if aws.contains(&AwsPrincipal::Any) {
                    return Ok(Principal::Any);
                }
                let canonical_ids = map
                    .canonical_user
                    .map(OneOrMany::into_vec)
                    .unwrap_or_default()
                    .into_iter()
                    .collect();
                Ok(Principal::Specific { canonical_ids, aws })
            }
        }
    }
}

impl RawStatement {
    fn normalize(self) -> Result<PolicyStatement, String> {
        let actions = self.action.into_vec();
        if actions.is_empty() {
            return Err("Statement must have at least one action".to_string());
        }
        Ok(PolicyStatement {
            sid: self.sid,
            effect: self.effect,
            principal: self.principal.normalize()?,
            actions,
            resources: self.resource.into_vec(),
        })
    }
}

impl BucketPolicy {
    /// Parse a policy document.
    ///
    /// Structural problems are reported as [`S3Error::MalformedPolicy`].
    /// Resources are only checked for presence here; whether they belong to
    /// the target bucket is decided by
    /// [`validate_policy_resource`](super::resource::validate_policy_resource).
    pub fn parse(json: &str) -> Result<Self, S3Error> {
        let raw: RawPolicy = serde_json::from_str(json).map_err(|e| S3Error::MalformedPolicy {
            message: format!("Invalid policy JSON: {e}"),
        })?;

        let raw_statements = match raw.statement {
            RawStatements::Single(stmt) => vec![*stmt],
            RawStatements::Many(list) => list,
        };
        if raw_statements.is_empty() {
            return Err(S3Error::MalformedPolicy {
                message: "Policy must contain at least one statement".to_string(),
            });
        }

        let statements = raw_statements
            .into_iter()
            .enumerate()
            .map(|(i, stmt)| {
                stmt.normalize().map_err(|e| S3Error::MalformedPolicy {
                    message: format!("Statement {i}: {e}"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            version: raw.version,
            statements,
            raw: json.to_string(),
        })
    }

    /// Build a policy directly from statements.  The stored document is
    /// empty, so this is meant for tests and programmatic callers.
    pub fn from_statements(statements: Vec<PolicyStatement>) -> Self {
        Self {
            version: Some("2012-10-17".to_string()),
            statements,
            raw: String::new(),
        }
    }

    /// The document exactly as submitted.
    pub fn as_json(&self) -> &str {
        &self.raw
    }
}
