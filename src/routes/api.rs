// SPDX-License-Identifier: MIT

//! Repository listing API.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{RepoIdentifier, UserId};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/users/{user_id}/repos", get(list_repos))
}

#[derive(Serialize)]
pub struct ReposResponse {
    pub repos: Vec<RepoIdentifier>,
}

/// List every repository the user can access across all linked providers.
///
/// A provider failure drops only that provider's contribution; the response
/// is still 200 with the remaining repositories.
async fn list_repos(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> Result<Json<ReposResponse>> {
    let user = state
        .store
        .get_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))?;

    let repos = state.aggregator.aggregate(&user).await;
    Ok(Json(ReposResponse { repos }))
}
