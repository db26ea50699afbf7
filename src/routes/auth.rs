// SPDX-License-Identifier: MIT

//! OAuth callback handling.
//!
//! The redirect/consent leg of the OAuth dance is owned by the frontend and
//! the provider; this module picks up at the callback, exchanges the
//! authorization code, fetches the profile, and resolves the identity.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{Credential, UserId};
use crate::providers::{ProviderProfile, TokenSet, BITBUCKET, GITHUB};
use crate::services::{IncomingAccount, IncomingProfile};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/{provider}/callback", get(auth_callback))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Serialize)]
pub struct SignInResponse {
    pub user_id: UserId,
    pub new_user: bool,
}

/// OAuth callback - exchange code, fetch profile, resolve identity.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<SignInResponse>> {
    if let Some(error) = params.error {
        return Err(AppError::BadRequest(format!(
            "provider returned an error: {}",
            error
        )));
    }
    let code = params
        .code
        .ok_or_else(|| AppError::BadRequest("missing authorization code".to_string()))?;

    let (tokens, profile) = match provider.as_str() {
        GITHUB => {
            let tokens = state.github.exchange_code(&code).await?;
            let profile = state.github.fetch_profile(&tokens.access_token).await?;
            (tokens, profile)
        }
        BITBUCKET => {
            let tokens = state.bitbucket.exchange_code(&code).await?;
            let profile = state.bitbucket.fetch_profile(&tokens.access_token).await?;
            (tokens, profile)
        }
        other => {
            return Err(AppError::BadRequest(format!(
                "unsupported provider: {}",
                other
            )));
        }
    };

    let account = to_incoming_account(&provider, &profile, tokens);
    let incoming_profile = IncomingProfile {
        display_name: profile.display_name,
        email: profile.email,
        avatar_url: profile.avatar_url,
    };

    let resolution = state
        .resolver
        .resolve(&incoming_profile, Some(&account))
        .await?;

    tracing::info!(
        user_id = resolution.user_id,
        provider = %provider,
        new_user = resolution.new_user,
        new_credential = resolution.new_credential,
        "Sign-in resolved"
    );

    Ok(Json(SignInResponse {
        user_id: resolution.user_id,
        new_user: resolution.new_user,
    }))
}

fn to_incoming_account(
    provider: &str,
    profile: &ProviderProfile,
    tokens: TokenSet,
) -> IncomingAccount {
    IncomingAccount {
        provider: provider.to_string(),
        account_id: profile.account_id.clone(),
        credential: Credential {
            auth_type: Some("oauth".to_string()),
            scope: tokens.scope,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: tokens.expires_at,
            extra: BTreeMap::new(),
        },
    }
}
