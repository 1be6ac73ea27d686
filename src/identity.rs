//! Requester identity as seen by the authorization engine.
//!
//! Signature verification happens upstream; by the time a request reaches
//! this crate its principal is already resolved to a canonical id and,
//! optionally, an IAM-style account identity.

use std::fmt;

/// Canonical id used for unauthenticated requests.
pub const PUBLIC_ID: &str = "http://acs.amazonaws.com/groups/global/AllUsers";

const IAM_ARN_PREFIX: &str = "arn:aws:iam::";

/// An account-level identity: a user ARN, an account root ARN, or a bare
/// account id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AccountIdentity {
    /// `123456789012`
    AccountId(String),
    /// `arn:aws:iam::123456789012:root`
    Root(String),
    /// `arn:aws:iam::123456789012:user/<name>`
    User { account: String, name: String },
}

impl AccountIdentity {
    /// Parse an ARN or bare account id.  Returns `None` for anything else.
    pub fn parse(value: &str) -> Option<Self> {
        if let Some(rest) = value.strip_prefix(IAM_ARN_PREFIX) {
            let (account, resource) = rest.split_once(':')?;
            if !is_account_id(account) {
                return None;
            }
            if resource == "root" {
                return Some(AccountIdentity::Root(account.to_string()));
            }
            let name = resource.strip_prefix("user/")?;
            if name.is_empty() {
                return None;
            }
            return Some(AccountIdentity::User {
                account: account.to_string(),
                name: name.to_string(),
            });
        }
        is_account_id(value).then(|| AccountIdentity::AccountId(value.to_string()))
    }

    /// The account id this identity belongs to.
    pub fn account_id(&self) -> &str {
        match self {
            AccountIdentity::AccountId(account) | AccountIdentity::Root(account) => account,
            AccountIdentity::User { account, .. } => account,
        }
    }

    /// Whether this identity names a whole account rather than one user.
    pub fn is_account_wide(&self) -> bool {
        !matches!(self, AccountIdentity::User { .. })
    }
}

impl fmt::Display for AccountIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountIdentity::AccountId(account) => f.write_str(account),
            AccountIdentity::Root(account) => write!(f, "{IAM_ARN_PREFIX}{account}:root"),
            AccountIdentity::User { account, name } => {
                write!(f, "{IAM_ARN_PREFIX}{account}:user/{name}")
            }
        }
    }
}

fn is_account_id(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

/// The principal behind one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    /// Canonical id of the authenticated entity.
    pub canonical_id: String,
    /// Account identity string as presented (user ARN, root ARN or account id).
    pub arn: Option<String>,
    account: Option<AccountIdentity>,
}

impl Requester {
    /// A requester known only by canonical id.
    pub fn new(canonical_id: impl Into<String>) -> Self {
        Self {
            canonical_id: canonical_id.into(),
            arn: None,
            account: None,
        }
    }

    /// Attach an account identity.  Unparseable values are kept for exact
    /// comparison but never match by account containment.
    pub fn with_arn(mut self, arn: impl Into<String>) -> Self {
        let arn = arn.into();
        self.account = AccountIdentity::parse(&arn);
        self.arn = Some(arn);
        self
    }

    /// The anonymous requester.
    pub fn public() -> Self {
        Self::new(PUBLIC_ID)
    }

    /// Parsed account identity, if one was presented and is well formed.
    pub fn account(&self) -> Option<&AccountIdentity> {
        self.account.as_ref()
    }
}
