// SPDX-License-Identifier: MIT

//! Bitbucket integration: OAuth client and hierarchy-paginated fetcher.
//!
//! Repository listing is two-level: enumerate the workspaces the credential
//! can access, then page through each workspace's repositories. Bitbucket
//! access tokens expire after two hours, so the fetcher asks for a refresh
//! before use.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::ProviderCredentials;
use crate::error::AppError;
use crate::models::RepoIdentifier;
use crate::providers::{check_json, http_client, ProviderProfile, RepoFetcher, TokenSet, BITBUCKET};

const PAGE_SIZE: u32 = 100;

/// Bitbucket API client with OAuth consumer credentials.
#[derive(Clone)]
pub struct BitbucketClient {
    http: reqwest::Client,
    api_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl BitbucketClient {
    pub fn new(credentials: &ProviderCredentials) -> Self {
        Self {
            http: http_client(),
            api_url: "https://api.bitbucket.org/2.0".to_string(),
            token_url: "https://bitbucket.org/site/oauth2/access_token".to_string(),
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
        }
    }

    /// Override API endpoints (used when pointing at a local stub).
    pub fn with_base_urls(mut self, api_url: String, token_url: String) -> Self {
        self.api_url = api_url;
        self.token_url = token_url;
        self
    }

    /// Basic authorization header value for the token endpoint.
    fn basic_auth(&self) -> String {
        let raw = format!("{}:{}", self.client_id, self.client_secret);
        format!("Basic {}", STANDARD.encode(raw.as_bytes()))
    }

    // ─── OAuth ───────────────────────────────────────────────────────────────

    /// Exchange an authorization code for a token set.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenSet, AppError> {
        self.token_grant(&[("grant_type", "authorization_code"), ("code", code)])
            .await
    }

    /// Exchange a refresh token for a fresh token set.
    pub async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenSet, AppError> {
        self.token_grant(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn token_grant(&self, form: &[(&str, &str)]) -> Result<TokenSet, AppError> {
        let response = self
            .http
            .post(&self.token_url)
            .header(reqwest::header::AUTHORIZATION, self.basic_auth())
            .form(form)
            .send()
            .await
            .map_err(|e| AppError::provider(BITBUCKET, format!("Token request failed: {}", e)))?;

        let token: BitbucketTokenResponse = check_json(BITBUCKET, response).await?;
        let expires_at = token
            .expires_in
            .map(|secs| chrono::Utc::now().timestamp() + secs);

        Ok(TokenSet {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
            scope: token.scopes,
        })
    }

    /// Fetch the authenticated user's profile.
    ///
    /// The `/user` payload carries no email; the primary confirmed address
    /// comes from `/user/emails`.
    pub async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, AppError> {
        let response = self
            .http
            .get(format!("{}/user", self.api_url))
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AppError::provider(BITBUCKET, format!("Profile fetch failed: {}", e)))?;

        let user: BitbucketUser = check_json(BITBUCKET, response).await?;
        let email = self.fetch_primary_email(access_token).await?;

        Ok(ProviderProfile {
            account_id: user.account_id,
            display_name: user.display_name,
            email,
            avatar_url: user.links.and_then(|l| l.avatar).map(|a| a.href),
        })
    }

    async fn fetch_primary_email(&self, access_token: &str) -> Result<Option<String>, AppError> {
        let response = self
            .http
            .get(format!("{}/user/emails", self.api_url))
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AppError::provider(BITBUCKET, format!("Email fetch failed: {}", e)))?;

        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), "Bitbucket email listing unavailable");
            return Ok(None);
        }

        let page: Page<BitbucketEmail> = response
            .json()
            .await
            .map_err(|e| AppError::provider(BITBUCKET, format!("JSON parse error: {}", e)))?;

        Ok(pick_primary_email(&page.values))
    }

    // ─── Paginated listing ───────────────────────────────────────────────────

    /// Follow Bitbucket `next` links until the listing is exhausted.
    async fn retrieve_all_pages<T: DeserializeOwned>(
        &self,
        path: &str,
        access_token: &str,
    ) -> Result<Vec<T>, AppError> {
        let mut values = Vec::new();
        let mut url = format!("{}{}?pagelen={}", self.api_url, path, PAGE_SIZE);

        loop {
            let response = self
                .http
                .get(&url)
                .bearer_auth(access_token)
                .header(reqwest::header::ACCEPT, "application/json")
                .send()
                .await
                .map_err(|e| {
                    AppError::provider(BITBUCKET, format!("Request to {} failed: {}", url, e))
                })?;

            let page: Page<T> = check_json(BITBUCKET, response).await?;
            values.extend(page.values);

            match page.next {
                // A next link pointing at the page we just fetched would loop forever
                Some(next) if next != url => url = next,
                Some(_) => {
                    tracing::warn!(%url, "Bitbucket returned a self-referential next link");
                    break;
                }
                None => break,
            }
        }

        Ok(values)
    }
}

/// Hierarchy-paginated repository fetcher: workspaces first, then the
/// repositories within each workspace.
#[derive(Clone)]
pub struct BitbucketFetcher {
    client: BitbucketClient,
}

impl BitbucketFetcher {
    pub fn new(client: BitbucketClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RepoFetcher for BitbucketFetcher {
    fn provider(&self) -> &'static str {
        BITBUCKET
    }

    fn requires_refresh(&self) -> bool {
        true
    }

    async fn fetch_all(
        &self,
        access_token: &str,
        account_id: &str,
    ) -> Result<Vec<RepoIdentifier>, AppError> {
        let memberships: Vec<WorkspaceMembership> = self
            .client
            .retrieve_all_pages("/user/permissions/workspaces", access_token)
            .await?;

        let mut repos = Vec::new();
        for membership in memberships {
            let slug = membership.workspace.slug;
            let workspace_repos: Vec<BitbucketRepo> = self
                .client
                .retrieve_all_pages(&format!("/repositories/{}", slug), access_token)
                .await?;

            repos.extend(
                workspace_repos
                    .into_iter()
                    .map(|repo| RepoIdentifier::new(BITBUCKET, slug.clone(), repo.slug)),
            );
        }

        tracing::debug!(account_id, count = repos.len(), "Bitbucket repositories fetched");
        Ok(repos)
    }
}

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct BitbucketTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    scopes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BitbucketUser {
    account_id: String,
    display_name: Option<String>,
    links: Option<UserLinks>,
}

#[derive(Debug, Deserialize)]
struct UserLinks {
    avatar: Option<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
}

#[derive(Debug, Deserialize)]
struct BitbucketEmail {
    email: String,
    is_primary: bool,
    is_confirmed: bool,
}

/// Bitbucket's standard paginated envelope.
#[derive(Debug, Deserialize)]
struct Page<T> {
    values: Vec<T>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorkspaceMembership {
    workspace: Workspace,
}

#[derive(Debug, Deserialize)]
struct Workspace {
    slug: String,
}

#[derive(Debug, Deserialize)]
struct BitbucketRepo {
    slug: String,
}

fn pick_primary_email(emails: &[BitbucketEmail]) -> Option<String> {
    emails
        .iter()
        .find(|e| e.is_primary && e.is_confirmed)
        .or_else(|| emails.iter().find(|e| e.is_confirmed))
        .map(|e| e.email.clone())
}
