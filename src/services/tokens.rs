// SPDX-License-Identifier: MIT

//! Provider credential refresh.
//!
//! Refresh is strictly best-effort: every failure (missing refresh token,
//! network error, revoked grant, provider outage) is logged and converted to
//! `None`, and the caller falls back to the stored access token. A stale but
//! present credential is preferred over failing the whole aggregation.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::db::UserStore;
use crate::models::{Credential, UserId, UserUpdate};
use crate::providers::{BitbucketClient, BITBUCKET};

/// Refreshes a provider credential, returning the new access token or `None`.
#[async_trait]
pub trait CredentialRefresher: Send + Sync {
    async fn refresh(&self, provider: &str, account_id: &str, user_id: UserId) -> Option<String>;
}

/// OAuth refresh-token exchange against the provider token endpoint.
pub struct OAuthRefresher {
    store: Arc<dyn UserStore>,
    bitbucket: BitbucketClient,
    /// Per-account mutex so concurrent aggregations don't race the same
    /// refresh token.
    locks: DashMap<(String, String), Arc<Mutex<()>>>,
}

impl OAuthRefresher {
    pub fn new(store: Arc<dyn UserStore>, bitbucket: BitbucketClient) -> Self {
        Self {
            store,
            bitbucket,
            locks: DashMap::new(),
        }
    }

    async fn refresh_bitbucket(&self, account_id: &str, user_id: UserId) -> Option<String> {
        let user = match self.store.get_user(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::warn!(user_id, account_id, "Refresh requested for unknown user");
                return None;
            }
            Err(e) => {
                tracing::warn!(user_id, account_id, error = %e, "Failed to load user for refresh");
                return None;
            }
        };

        let stored = user.credential(BITBUCKET, account_id)?.clone();
        let refresh_token = match &stored.refresh_token {
            Some(token) => token.clone(),
            None => {
                tracing::debug!(user_id, account_id, "No refresh token stored");
                return None;
            }
        };

        let tokens = match self.bitbucket.exchange_refresh_token(&refresh_token).await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(
                    user_id,
                    account_id,
                    error = %e,
                    "Bitbucket token refresh failed, falling back to stored token"
                );
                return None;
            }
        };

        let refreshed = Credential {
            auth_type: stored.auth_type.clone(),
            scope: tokens.scope.or(stored.scope.clone()),
            access_token: tokens.access_token.clone(),
            // Bitbucket rotates refresh tokens; keep the old one if none came back
            refresh_token: tokens.refresh_token.or(stored.refresh_token.clone()),
            expires_at: tokens.expires_at,
            extra: stored.extra.clone(),
        };

        // Persist under the monotonic-expiry rule. A failed write still
        // returns the token: it is valid for this aggregation either way.
        if refreshed.is_newer_than(&stored) || stored.expires_at.is_none() {
            let mut auth_info = user.auth_info.clone();
            auth_info
                .entry(BITBUCKET.to_string())
                .or_default()
                .insert(account_id.to_string(), refreshed);

            let update = UserUpdate {
                auth_info: Some(auth_info),
                ..Default::default()
            };
            if let Err(e) = self.store.update_user(user_id, &update).await {
                tracing::warn!(user_id, account_id, error = %e, "Failed to persist refreshed token");
            }
        }

        tracing::debug!(user_id, account_id, "Bitbucket token refreshed");
        Some(tokens.access_token)
    }
}

#[async_trait]
impl CredentialRefresher for OAuthRefresher {
    async fn refresh(&self, provider: &str, account_id: &str, user_id: UserId) -> Option<String> {
        let lock = self
            .locks
            .entry((provider.to_string(), account_id.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        match provider {
            BITBUCKET => self.refresh_bitbucket(account_id, user_id).await,
            _ => {
                tracing::debug!(provider, account_id, "Provider has no refresh flow");
                None
            }
        }
    }
}
