// SPDX-License-Identifier: MIT

//! Shared fixtures: fake fetchers, fake refresher, recording event sink.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use repolink::error::AppError;
use repolink::models::{AuthInfo, Credential, RepoIdentifier, User};
use repolink::providers::RepoFetcher;
use repolink::services::{CredentialRefresher, LifecycleEvent, LifecycleSink};

pub fn credential(token: &str, expires_at: Option<i64>) -> Credential {
    Credential {
        auth_type: Some("oauth".to_string()),
        scope: None,
        access_token: token.to_string(),
        refresh_token: None,
        expires_at,
        extra: BTreeMap::new(),
    }
}

/// A user with one credential per `(provider, account_id, token)` triple.
pub fn user_with_accounts(accounts: &[(&str, &str, &str)]) -> User {
    let mut auth_info = AuthInfo::new();
    for (provider, account_id, token) in accounts {
        auth_info
            .entry(provider.to_string())
            .or_default()
            .insert(account_id.to_string(), credential(token, Some(9999)));
    }
    User {
        id: Some(1),
        name: Some("Ada".to_string()),
        auth_info,
        ..Default::default()
    }
}

pub fn repo(provider: &str, owner: &str, name: &str) -> RepoIdentifier {
    RepoIdentifier::new(provider, owner, name)
}

/// Canned-response fetcher keyed by account id; records the tokens it was
/// called with.
pub struct FakeFetcher {
    provider: &'static str,
    requires_refresh: bool,
    responses: HashMap<String, Result<Vec<RepoIdentifier>, String>>,
    pub seen_tokens: Arc<Mutex<Vec<String>>>,
}

impl FakeFetcher {
    pub fn new(provider: &'static str, requires_refresh: bool) -> Self {
        Self {
            provider,
            requires_refresh,
            responses: HashMap::new(),
            seen_tokens: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_repos(mut self, account_id: &str, repos: Vec<RepoIdentifier>) -> Self {
        self.responses.insert(account_id.to_string(), Ok(repos));
        self
    }

    pub fn with_error(mut self, account_id: &str, message: &str) -> Self {
        self.responses
            .insert(account_id.to_string(), Err(message.to_string()));
        self
    }
}

#[async_trait]
impl RepoFetcher for FakeFetcher {
    fn provider(&self) -> &'static str {
        self.provider
    }

    fn requires_refresh(&self) -> bool {
        self.requires_refresh
    }

    async fn fetch_all(
        &self,
        access_token: &str,
        account_id: &str,
    ) -> Result<Vec<RepoIdentifier>, AppError> {
        self.seen_tokens
            .lock()
            .unwrap()
            .push(access_token.to_string());
        match self.responses.get(account_id) {
            Some(Ok(repos)) => Ok(repos.clone()),
            Some(Err(message)) => Err(AppError::provider(self.provider, message)),
            None => Ok(Vec::new()),
        }
    }
}

/// Refresher returning a fixed outcome, regardless of account.
pub struct FakeRefresher {
    token: Option<String>,
}

impl FakeRefresher {
    pub fn succeeding(token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
        }
    }

    pub fn failing() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl CredentialRefresher for FakeRefresher {
    async fn refresh(&self, _provider: &str, _account_id: &str, _user_id: i64) -> Option<String> {
        self.token.clone()
    }
}

/// Sink that records every event for assertions. Clones share the log.
#[derive(Default, Clone)]
pub struct RecordingSink {
    pub events: Arc<Mutex<Vec<LifecycleEvent>>>,
}

#[async_trait]
impl LifecycleSink for RecordingSink {
    async fn track(&self, event: LifecycleEvent) {
        self.events.lock().unwrap().push(event);
    }
}
