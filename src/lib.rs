// SPDX-License-Identifier: MIT

//! Repolink: cross-provider identity resolution and repository aggregation.
//!
//! This crate resolves incoming OAuth sign-ins to a canonical user record
//! (merging credentials across providers without losing history) and
//! aggregates the repositories a user can access across all linked
//! provider accounts.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod providers;
pub mod routes;
pub mod services;

use std::sync::Arc;

use config::Config;
use db::UserStore;
use providers::{BitbucketClient, GithubClient};
use services::{IdentityResolver, RepoAggregator};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn UserStore>,
    pub resolver: IdentityResolver,
    pub aggregator: RepoAggregator,
    pub github: GithubClient,
    pub bitbucket: BitbucketClient,
}
