// SPDX-License-Identifier: MIT

//! GitHub integration: OAuth client and cursor-paginated repository fetcher.
//!
//! Repository listing uses the GraphQL API: fixed page size, opaque end
//! cursor, loop until `hasNextPage` is false. GitHub OAuth app tokens do not
//! expire, so no refresh step is needed before fetching.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::ProviderCredentials;
use crate::error::AppError;
use crate::models::RepoIdentifier;
use crate::providers::{check_json, http_client, ProviderProfile, RepoFetcher, TokenSet, GITHUB};

const PAGE_SIZE: u32 = 100;

const REPOSITORIES_QUERY: &str = r#"
query UserRepositories($pageSize: Int!, $cursor: String) {
  viewer {
    repositories(
      first: $pageSize
      after: $cursor
      affiliations: [OWNER, ORGANIZATION_MEMBER, COLLABORATOR]
      ownerAffiliations: [OWNER, ORGANIZATION_MEMBER, COLLABORATOR]
    ) {
      pageInfo {
        endCursor
        hasNextPage
      }
      nodes {
        name
        owner {
          login
        }
      }
    }
  }
}
"#;

/// GitHub API client with OAuth credentials.
#[derive(Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    api_url: String,
    oauth_url: String,
    client_id: String,
    client_secret: String,
}

impl GithubClient {
    pub fn new(credentials: &ProviderCredentials) -> Self {
        Self {
            http: http_client(),
            api_url: "https://api.github.com".to_string(),
            oauth_url: "https://github.com/login/oauth".to_string(),
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
        }
    }

    /// Override API endpoints (used when pointing at a local stub).
    pub fn with_base_urls(mut self, api_url: String, oauth_url: String) -> Self {
        self.api_url = api_url;
        self.oauth_url = oauth_url;
        self
    }

    // ─── OAuth ───────────────────────────────────────────────────────────────

    /// Exchange an authorization code for an access token.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenSet, AppError> {
        let response = self
            .http
            .post(format!("{}/access_token", self.oauth_url))
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
            ])
            .send()
            .await
            .map_err(|e| AppError::provider(GITHUB, format!("Token exchange failed: {}", e)))?;

        let token: GithubTokenResponse = check_json(GITHUB, response).await?;
        Ok(TokenSet {
            access_token: token.access_token,
            refresh_token: None,
            // OAuth app tokens have no expiry
            expires_at: None,
            scope: token.scope,
        })
    }

    /// Fetch the authenticated user's profile.
    ///
    /// GitHub omits the email from `/user` unless it is public; in that case
    /// the primary verified address is taken from `/user/emails`.
    pub async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, AppError> {
        let response = self
            .http
            .get(format!("{}/user", self.api_url))
            .bearer_auth(access_token)
            .header(reqwest::header::USER_AGENT, "repolink")
            .send()
            .await
            .map_err(|e| AppError::provider(GITHUB, format!("Profile fetch failed: {}", e)))?;

        let user: GithubUser = check_json(GITHUB, response).await?;

        let email = match user.email {
            Some(email) => Some(email),
            None => self.fetch_primary_email(access_token).await?,
        };

        Ok(ProviderProfile {
            account_id: user.id.to_string(),
            display_name: user.name.or(Some(user.login)),
            email,
            avatar_url: user.avatar_url,
        })
    }

    async fn fetch_primary_email(&self, access_token: &str) -> Result<Option<String>, AppError> {
        let response = self
            .http
            .get(format!("{}/user/emails", self.api_url))
            .bearer_auth(access_token)
            .header(reqwest::header::USER_AGENT, "repolink")
            .send()
            .await
            .map_err(|e| AppError::provider(GITHUB, format!("Email fetch failed: {}", e)))?;

        // The emails scope may not be granted; treat that as "no email".
        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), "GitHub email listing unavailable");
            return Ok(None);
        }

        let emails: Vec<GithubEmail> = response
            .json()
            .await
            .map_err(|e| AppError::provider(GITHUB, format!("JSON parse error: {}", e)))?;

        Ok(pick_verified_primary(&emails))
    }

    // ─── Repository listing ──────────────────────────────────────────────────

    async fn fetch_page(
        &self,
        access_token: &str,
        cursor: Option<&str>,
    ) -> Result<RepositoryPage, AppError> {
        let body = serde_json::json!({
            "query": REPOSITORIES_QUERY,
            "variables": { "pageSize": PAGE_SIZE, "cursor": cursor },
        });

        let response = self
            .http
            .post(format!("{}/graphql", self.api_url))
            .bearer_auth(access_token)
            .header(reqwest::header::USER_AGENT, "repolink")
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::provider(GITHUB, format!("GraphQL request failed: {}", e)))?;

        let envelope: GraphQlResponse = check_json(GITHUB, response).await?;

        if let Some(errors) = envelope.errors {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(AppError::provider(
                GITHUB,
                format!("GraphQL errors: {}", messages.join("; ")),
            ));
        }

        envelope
            .data
            .map(|data| data.viewer.repositories)
            .ok_or_else(|| AppError::provider(GITHUB, "GraphQL response missing data"))
    }
}

/// Cursor-paginated repository fetcher over the GraphQL API.
#[derive(Clone)]
pub struct GithubFetcher {
    client: GithubClient,
}

impl GithubFetcher {
    pub fn new(client: GithubClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RepoFetcher for GithubFetcher {
    fn provider(&self) -> &'static str {
        GITHUB
    }

    async fn fetch_all(
        &self,
        access_token: &str,
        account_id: &str,
    ) -> Result<Vec<RepoIdentifier>, AppError> {
        let mut repos = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self.client.fetch_page(access_token, cursor.as_deref()).await?;

            if page.nodes.is_empty() {
                // An empty page mid-sequence is anomalous; stop rather than
                // trusting pageInfo to terminate the loop.
                if cursor.is_some() {
                    tracing::warn!(
                        account_id,
                        "Empty repository page from GitHub mid-pagination, stopping early"
                    );
                }
                break;
            }

            repos.extend(page.nodes.into_iter().map(|node| {
                RepoIdentifier::new(GITHUB, node.owner.login, node.name)
            }));

            if !page.page_info.has_next_page {
                break;
            }
            cursor = page.page_info.end_cursor;
            if cursor.is_none() {
                tracing::warn!(account_id, "GitHub reported a next page without a cursor");
                break;
            }
        }

        tracing::debug!(account_id, count = repos.len(), "GitHub repositories fetched");
        Ok(repos)
    }
}

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GithubTokenResponse {
    access_token: String,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubUser {
    id: u64,
    login: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<GraphQlData>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlData {
    viewer: Viewer,
}

#[derive(Debug, Deserialize)]
struct Viewer {
    repositories: RepositoryPage,
}

#[derive(Debug, Deserialize)]
struct RepositoryPage {
    #[serde(rename = "pageInfo")]
    page_info: PageInfo,
    nodes: Vec<RepoNode>,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    #[serde(rename = "endCursor")]
    end_cursor: Option<String>,
    #[serde(rename = "hasNextPage")]
    has_next_page: bool,
}

#[derive(Debug, Deserialize)]
struct RepoNode {
    name: String,
    owner: RepoOwner,
}

#[derive(Debug, Deserialize)]
struct RepoOwner {
    login: String,
}

fn pick_verified_primary(emails: &[GithubEmail]) -> Option<String> {
    emails
        .iter()
        .find(|e| e.primary && e.verified)
        .or_else(|| emails.iter().find(|e| e.verified))
        .map(|e| e.email.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_page_parses_graphql_shape() {
        let raw = serde_json::json!({
            "data": {
                "viewer": {
                    "repositories": {
                        "pageInfo": { "endCursor": "abc", "hasNextPage": true },
                        "nodes": [
                            { "name": "widget", "owner": { "login": "acme" } }
                        ]
                    }
                }
            }
        });
        let parsed: GraphQlResponse = serde_json::from_value(raw).unwrap();
        let page = parsed.data.unwrap().viewer.repositories;
        assert!(page.page_info.has_next_page);
        assert_eq!(page.page_info.end_cursor.as_deref(), Some("abc"));
        assert_eq!(page.nodes.len(), 1);
        assert_eq!(page.nodes[0].owner.login, "acme");
    }

    #[test]
    fn graphql_errors_are_surfaced() {
        let raw = serde_json::json!({
            "errors": [ { "message": "Bad credentials" } ]
        });
        let parsed: GraphQlResponse = serde_json::from_value(raw).unwrap();
        assert!(parsed.data.is_none());
        assert_eq!(parsed.errors.unwrap()[0].message, "Bad credentials");
    }

    #[test]
    fn primary_verified_email_preferred() {
        let emails = vec![
            GithubEmail {
                email: "old@x.com".to_string(),
                primary: false,
                verified: true,
            },
            GithubEmail {
                email: "main@x.com".to_string(),
                primary: true,
                verified: true,
            },
        ];
        assert_eq!(pick_verified_primary(&emails).as_deref(), Some("main@x.com"));
    }

    #[test]
    fn unverified_emails_ignored() {
        let emails = vec![GithubEmail {
            email: "spoof@x.com".to_string(),
            primary: true,
            verified: false,
        }];
        assert_eq!(pick_verified_primary(&emails), None);
    }
}
