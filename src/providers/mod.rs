// SPDX-License-Identifier: MIT

//! Source-control provider integrations.
//!
//! Each provider module contains an OAuth client (code exchange + profile
//! fetch) and a `RepoFetcher` implementation for that provider's pagination
//! protocol. The aggregator only sees the `RepoFetcher` trait.

pub mod bitbucket;
pub mod github;

pub use bitbucket::{BitbucketClient, BitbucketFetcher};
pub use github::{GithubClient, GithubFetcher};

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::RepoIdentifier;

pub const GITHUB: &str = "github";
pub const BITBUCKET: &str = "bitbucket";

/// Lists every repository a credential can access, across all pages.
#[async_trait]
pub trait RepoFetcher: Send + Sync {
    /// Provider name, as used as the `auth_info` key.
    fn provider(&self) -> &'static str;

    /// Whether stored access tokens expire and should be refreshed before use.
    fn requires_refresh(&self) -> bool {
        false
    }

    /// Fetch the complete repository set for one credential.
    ///
    /// Transport and API errors are fatal for this credential and propagate;
    /// the fetcher never silently drops part of the result.
    async fn fetch_all(
        &self,
        access_token: &str,
        account_id: &str,
    ) -> Result<Vec<RepoIdentifier>, AppError>;
}

/// User profile as reported by a provider after authorization.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    /// Provider-assigned account id.
    pub account_id: String,
    pub display_name: Option<String>,
    /// Verified primary email, when the provider exposes one.
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

/// Result of an authorization-code exchange.
#[derive(Debug, Clone)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix seconds; absent when the token does not expire.
    pub expires_at: Option<i64>,
    pub scope: Option<String>,
}

/// Per-request timeout applied to every provider HTTP call.
pub(crate) const HTTP_TIMEOUT_SECS: u64 = 30;

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
        .unwrap_or_default()
}

/// Check response status and parse the JSON body.
pub(crate) async fn check_json<T: for<'de> serde::Deserialize<'de>>(
    provider: &str,
    response: reqwest::Response,
) -> Result<T, AppError> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::provider(
            provider,
            format!("HTTP {}: {}", status, body),
        ));
    }
    response
        .json()
        .await
        .map_err(|e| AppError::provider(provider, format!("JSON parse error: {}", e)))
}
