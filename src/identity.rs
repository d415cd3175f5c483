//! Identity claim parsing
//!
//! The host stores the OAuth subject of a user as `<provider>@<subject>`.
//! Only users that signed in through the `oidc` provider can be exchanged
//! for a broker token; the subject is the key the broker knows them by.

use std::fmt;

/// The only identity provider the broker accepts
pub const ACCEPTED_PROVIDER: &str = "oidc";

/// External user key sent to the token broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalUserKey(String);

impl ExternalUserKey {
    /// Parse a host `oauth_sub` claim; `None` means wrong or missing provider
    pub fn from_oauth_sub(oauth_sub: Option<&str>) -> Option<Self> {
        let rest = oauth_sub?.strip_prefix(ACCEPTED_PROVIDER)?.strip_prefix('@')?;
        let subject = rest.split('@').next().unwrap_or_default();
        if subject.is_empty() {
            return None;
        }
        Some(Self(subject.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalUserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
