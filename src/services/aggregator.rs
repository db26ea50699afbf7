// SPDX-License-Identifier: MIT

//! Cross-provider repository aggregation.
//!
//! One fetch task per `(provider, account_id)` credential, fanned out
//! concurrently and joined on completion of every task. A failed task costs
//! only its own contribution; partial results are preferred to total
//! failure. The final ordering is imposed here, independent of completion
//! order, so repeated calls over an unchanged access set are byte-identical.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;

use crate::db::UserStore;
use crate::error::AppError;
use crate::models::{RepoIdentifier, User, UserUpdate};
use crate::providers::RepoFetcher;
use crate::services::tokens::CredentialRefresher;

/// Upper bound on one credential's whole fetch (all pages), so a slow or
/// broken provider cannot delay aggregation indefinitely.
const FETCH_TASK_TIMEOUT_SECS: u64 = 60;

/// One failed fetch task, with enough context to diagnose.
#[derive(Debug)]
pub struct FetchFailure {
    pub provider: String,
    pub account_id: String,
    pub error: AppError,
}

/// Result of the fan-out before merging: every task settled, none cancelled.
pub struct FanOutOutcome {
    pub successes: Vec<Vec<RepoIdentifier>>,
    pub failures: Vec<FetchFailure>,
}

pub struct RepoAggregator {
    store: Arc<dyn UserStore>,
    refresher: Arc<dyn CredentialRefresher>,
    fetchers: HashMap<&'static str, Arc<dyn RepoFetcher>>,
}

impl RepoAggregator {
    pub fn new(
        store: Arc<dyn UserStore>,
        refresher: Arc<dyn CredentialRefresher>,
        fetchers: Vec<Arc<dyn RepoFetcher>>,
    ) -> Self {
        let fetchers = fetchers
            .into_iter()
            .map(|fetcher| (fetcher.provider(), fetcher))
            .collect();
        Self {
            store,
            refresher,
            fetchers,
        }
    }

    /// Fetch, deduplicate, and order the complete repository set across all
    /// of the user's linked credentials, then rebuild the user's cached
    /// `repos` wholesale (best-effort).
    pub async fn aggregate(&self, user: &User) -> Vec<RepoIdentifier> {
        let outcome = self.fan_out(user).await;

        for failure in &outcome.failures {
            tracing::error!(
                user_id = ?user.id,
                provider = %failure.provider,
                account_id = %failure.account_id,
                error = %failure.error,
                "Repository fetch failed for one credential"
            );
        }

        let mut seen = HashSet::new();
        let mut repos: Vec<RepoIdentifier> = outcome
            .successes
            .into_iter()
            .flatten()
            .filter(|repo| seen.insert(repo.clone()))
            .collect();
        repos.sort_by(|a, b| a.display_cmp(b));

        if let Some(user_id) = user.id {
            if repos != user.repos {
                let update = UserUpdate {
                    repos: Some(repos.clone()),
                    ..Default::default()
                };
                if let Err(e) = self.store.update_user(user_id, &update).await {
                    tracing::warn!(user_id, error = %e, "Failed to cache aggregated repositories");
                }
            }
        }

        repos
    }

    /// Launch one fetch task per credential and wait for all of them to
    /// settle. No fail-fast, no sibling cancellation.
    async fn fan_out(&self, user: &User) -> FanOutOutcome {
        let mut tasks = Vec::new();

        for (provider, accounts) in &user.auth_info {
            let Some(fetcher) = self.fetchers.get(provider.as_str()) else {
                tracing::warn!(provider = %provider, user_id = ?user.id, "No fetcher for provider, skipping");
                continue;
            };

            for (account_id, credential) in accounts {
                tasks.push(self.fetch_one(
                    Arc::clone(fetcher),
                    provider.clone(),
                    account_id.clone(),
                    credential.access_token.clone(),
                    user.id,
                ));
            }
        }

        let mut successes = Vec::new();
        let mut failures = Vec::new();
        for settled in join_all(tasks).await {
            match settled {
                Ok(repos) => successes.push(repos),
                Err(failure) => failures.push(failure),
            }
        }
        FanOutOutcome { successes, failures }
    }

    async fn fetch_one(
        &self,
        fetcher: Arc<dyn RepoFetcher>,
        provider: String,
        account_id: String,
        stored_token: String,
        user_id: Option<i64>,
    ) -> Result<Vec<RepoIdentifier>, FetchFailure> {
        let access_token = if fetcher.requires_refresh() {
            match user_id {
                Some(user_id) => self
                    .refresher
                    .refresh(&provider, &account_id, user_id)
                    .await
                    .unwrap_or_else(|| stored_token.clone()),
                None => stored_token.clone(),
            }
        } else {
            stored_token.clone()
        };

        let fetch = fetcher.fetch_all(&access_token, &account_id);
        let result = tokio::time::timeout(Duration::from_secs(FETCH_TASK_TIMEOUT_SECS), fetch)
            .await
            .unwrap_or_else(|_| {
                Err(AppError::provider(
                    &provider,
                    format!("fetch timed out after {}s", FETCH_TASK_TIMEOUT_SECS),
                ))
            });

        result.map_err(|error| FetchFailure {
            provider,
            account_id,
            error,
        })
    }
}
