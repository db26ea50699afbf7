// SPDX-License-Identifier: MIT

//! Identity resolution: map an incoming authentication event to the
//! canonical user record, merging credentials without destroying history.
//!
//! Resolution order: exact `(provider, account_id)` match, then verified
//! email alias. More than one alias match is ambiguous and fails closed —
//! no record is created or updated and sign-in is refused.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::db::UserStore;
use crate::error::AppError;
use crate::models::{AuthInfo, Credential, User, UserId, UserUpdate};
use crate::services::events::{LifecycleEvent, LifecycleSink};

/// Profile fields delivered by the OAuth callback.
#[derive(Debug, Clone, Default)]
pub struct IncomingProfile {
    pub display_name: Option<String>,
    /// Verified email; used for alias matching when no provider-account
    /// match exists.
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

/// Provider account delivered alongside the profile. Absent on
/// credential-less session refreshes, in which case only profile fields are
/// merged.
#[derive(Debug, Clone)]
pub struct IncomingAccount {
    pub provider: String,
    pub account_id: String,
    pub credential: Credential,
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub user_id: UserId,
    pub new_user: bool,
    /// Whether this sign-in linked a provider account the user did not
    /// already have.
    pub new_credential: bool,
}

pub struct IdentityResolver {
    store: Arc<dyn UserStore>,
    events: Arc<dyn LifecycleSink>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn UserStore>, events: Arc<dyn LifecycleSink>) -> Self {
        Self { store, events }
    }

    /// Resolve an authentication event to a canonical user, creating or
    /// merging as needed.
    ///
    /// Fails with `AppError::AmbiguousIdentity` when the email matches more
    /// than one user; every other persistence failure on the merge path is
    /// logged and swallowed so a store hiccup cannot break sign-in.
    pub async fn resolve(
        &self,
        profile: &IncomingProfile,
        account: Option<&IncomingAccount>,
    ) -> Result<Resolution, AppError> {
        let existing = self.find_existing(profile, account).await?;

        match existing {
            None => self.create(profile, account).await,
            Some(user) => self.merge(user, profile, account).await,
        }
    }

    async fn find_existing(
        &self,
        profile: &IncomingProfile,
        account: Option<&IncomingAccount>,
    ) -> Result<Option<User>, AppError> {
        if let Some(account) = account {
            let by_account = self
                .store
                .find_by_provider_account(&account.provider, &account.account_id)
                .await?;
            if by_account.is_some() {
                return Ok(by_account);
            }
        }

        let Some(email) = &profile.email else {
            return Ok(None);
        };

        let mut by_alias = self.store.find_by_alias(email).await?;
        match by_alias.len() {
            0 => Ok(None),
            1 => Ok(Some(by_alias.remove(0))),
            n => {
                tracing::warn!(matches = n, "Alias matches multiple users, refusing sign-in");
                Err(AppError::AmbiguousIdentity)
            }
        }
    }

    async fn create(
        &self,
        profile: &IncomingProfile,
        account: Option<&IncomingAccount>,
    ) -> Result<Resolution, AppError> {
        let mut auth_info = AuthInfo::new();
        if let Some(account) = account {
            auth_info.insert(
                account.provider.clone(),
                BTreeMap::from([(account.account_id.clone(), account.credential.clone())]),
            );
        }

        let user = User {
            id: None,
            name: profile.display_name.clone(),
            profile_url: profile.avatar_url.clone(),
            aliases: profile.email.iter().cloned().collect(),
            auth_info,
            repos: Vec::new(),
        };

        let user_id = self.store.create_user(&user).await?;
        tracing::info!(user_id, "New user created");

        self.events
            .track(LifecycleEvent::new(
                "signup",
                Some(user_id),
                serde_json::json!({
                    "provider": account.map(|a| a.provider.clone()),
                }),
            ))
            .await;

        Ok(Resolution {
            user_id,
            new_user: true,
            new_credential: account.is_some(),
        })
    }

    async fn merge(
        &self,
        user: User,
        profile: &IncomingProfile,
        account: Option<&IncomingAccount>,
    ) -> Result<Resolution, AppError> {
        let user_id = user
            .id
            .ok_or_else(|| AppError::Database("stored user missing id".to_string()))?;

        let new_credential = account
            .map(|a| !user.has_credential(&a.provider, &a.account_id))
            .unwrap_or(false);

        let update = build_update(&user, profile, account);
        if !update.is_empty() {
            // Last-writer-wins; a concurrent resolution of the same identity
            // may race us and that is accepted.
            if let Err(e) = self.store.update_user(user_id, &update).await {
                tracing::warn!(user_id, error = %e, "Failed to persist sign-in merge");
            }
        }

        self.events
            .track(LifecycleEvent::new(
                "login",
                Some(user_id),
                serde_json::json!({
                    "provider": account.map(|a| a.provider.clone()),
                    "new_auth": new_credential,
                }),
            ))
            .await;

        Ok(Resolution {
            user_id,
            new_user: false,
            new_credential,
        })
    }
}

/// Compute the minimal diff merging an authentication event into `user`.
///
/// Only fields that actually change are populated:
/// - `name`/`profile_url` are last-writer-wins, included when different;
/// - `aliases` is append-only, never dropping existing entries;
/// - `auth_info` inserts new credentials and replaces an existing slot only
///   when the incoming expiry is strictly newer, so an out-of-order or
///   replayed callback cannot clobber a fresher token.
pub fn build_update(
    user: &User,
    profile: &IncomingProfile,
    account: Option<&IncomingAccount>,
) -> UserUpdate {
    let mut update = UserUpdate::default();

    if let Some(name) = &profile.display_name {
        if user.name.as_ref() != Some(name) {
            update.name = Some(name.clone());
        }
    }
    if let Some(avatar_url) = &profile.avatar_url {
        if user.profile_url.as_ref() != Some(avatar_url) {
            update.profile_url = Some(avatar_url.clone());
        }
    }
    if let Some(email) = &profile.email {
        if !user.aliases.iter().any(|a| a == email) {
            let mut aliases = user.aliases.clone();
            aliases.push(email.clone());
            update.aliases = Some(aliases);
        }
    }

    if let Some(account) = account {
        if let Some(merged) = merge_auth_info(&user.auth_info, account) {
            update.auth_info = Some(merged);
        }
    }

    update
}

/// Merge one incoming credential into the auth map. Returns `None` when
/// nothing changes.
fn merge_auth_info(current: &AuthInfo, account: &IncomingAccount) -> Option<AuthInfo> {
    let stored = current
        .get(&account.provider)
        .and_then(|accounts| accounts.get(&account.account_id));
    if let Some(stored) = stored {
        if !account.credential.is_newer_than(stored) {
            return None;
        }
    }

    let mut merged = current.clone();
    merged
        .entry(account.provider.clone())
        .or_default()
        .insert(account.account_id.clone(), account.credential.clone());
    Some(merged)
}
