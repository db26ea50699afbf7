//! Canonical user identity record and its partial-update form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::RepoIdentifier;

/// Store-assigned user identifier. Never reassigned.
pub type UserId = i64;

/// Mapping from provider name to provider-assigned account id to credential.
///
/// A user may link more than one account per provider (e.g. two GitHub
/// accounts). BTreeMap keeps iteration order deterministic.
pub type AuthInfo = BTreeMap<String, BTreeMap<String, Credential>>;

/// One stored OAuth credential for a provider account.
///
/// Created on first successful authorization; replaced only by a credential
/// with a strictly newer expiry (see `UserUpdate` merge rules); never deleted
/// by a merge. Expiry is re-checked lazily on use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// Credential type as reported by the OAuth flow (usually "oauth").
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Access-token expiry as unix seconds. Absent for providers whose
    /// tokens do not expire (e.g. GitHub OAuth apps).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    /// Provider-specific fields we carry through without interpreting.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Credential {
    /// Whether this credential's expiry is strictly newer than `other`'s.
    ///
    /// A credential with no expiry never counts as newer, so an
    /// out-of-order delivery cannot clobber a dated token.
    pub fn is_newer_than(&self, other: &Credential) -> bool {
        matches!(
            (self.expires_at, other.expires_at),
            (Some(incoming), Some(current)) if incoming > current
        )
    }
}

/// Canonical identity record, merging all linked provider credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    /// Assigned by the store on creation; `None` before the first persist.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
    /// Verified secondary identifiers (emails). Append-only: the merge path
    /// never removes entries.
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub auth_info: AuthInfo,
    /// Cached repository access set, rebuilt wholesale by aggregation.
    #[serde(default)]
    pub repos: Vec<RepoIdentifier>,
}

impl User {
    /// Look up the stored credential for a `(provider, account_id)` pair.
    pub fn credential(&self, provider: &str, account_id: &str) -> Option<&Credential> {
        self.auth_info.get(provider)?.get(account_id)
    }

    /// Whether this user already has any credential for `(provider, account_id)`.
    pub fn has_credential(&self, provider: &str, account_id: &str) -> bool {
        self.credential(provider, account_id).is_some()
    }
}

/// Partial user update: only fields that actually changed are populated.
///
/// This is the only shape the store accepts for updates, so callers cannot
/// accidentally overwrite fields they did not mean to touch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
    /// Full replacement alias list (current aliases plus appended ones).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aliases: Option<Vec<String>>,
    /// Full replacement auth_info map after the monotonic merge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_info: Option<AuthInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repos: Option<Vec<RepoIdentifier>>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.profile_url.is_none()
            && self.aliases.is_none()
            && self.auth_info.is_none()
            && self.repos.is_none()
    }
}
