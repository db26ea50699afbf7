// SPDX-License-Identifier: MIT

//! Postgres-backed user store.
//!
//! Identity columns: `id bigserial`, `name text`, `profile_url text`,
//! `aliases text[]`, `auth_info jsonb`, `repos jsonb`. Schema management is
//! outside this crate; this module only implements the read/write contract.
//! Every query is parameterized — no values are interpolated into SQL text.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};

use crate::db::UserStore;
use crate::error::AppError;
use crate::models::{AuthInfo, RepoIdentifier, User, UserId, UserUpdate};

/// Postgres client wrapper implementing `UserStore`.
#[derive(Clone)]
pub struct PgUserStore {
    client: Arc<tokio_postgres::Client>,
}

impl PgUserStore {
    /// Connect to Postgres and drive the connection on a background task.
    pub async fn connect(database_url: &str) -> Result<Self, AppError> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Postgres: {}", e)))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "Postgres connection terminated");
            }
        });

        tracing::info!("Connected to Postgres");
        Ok(Self {
            client: Arc::new(client),
        })
    }

    fn row_to_user(row: &Row) -> Result<User, AppError> {
        let auth_info: Option<Value> = row.get("auth_info");
        let auth_info: AuthInfo = match auth_info {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| AppError::Database(format!("Malformed auth_info: {}", e)))?,
            None => AuthInfo::new(),
        };

        let repos: Option<Value> = row.get("repos");
        let repos: Vec<RepoIdentifier> = match repos {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| AppError::Database(format!("Malformed repos: {}", e)))?,
            None => Vec::new(),
        };

        Ok(User {
            id: Some(row.get::<_, i64>("id")),
            name: row.get("name"),
            profile_url: row.get("profile_url"),
            aliases: row.get::<_, Option<Vec<String>>>("aliases").unwrap_or_default(),
            auth_info,
            repos,
        })
    }
}

const USER_COLUMNS: &str = "id, name, profile_url, aliases, auth_info, repos";

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_provider_account(
        &self,
        provider: &str,
        account_id: &str,
    ) -> Result<Option<User>, AppError> {
        let query = format!(
            "SELECT {} FROM users WHERE auth_info -> $1 -> $2 IS NOT NULL ORDER BY id",
            USER_COLUMNS
        );
        let rows = self
            .client
            .query(query.as_str(), &[&provider, &account_id])
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if rows.len() > 1 {
            tracing::warn!(provider, account_id, "Multiple users hold the same credential");
        }
        rows.first().map(Self::row_to_user).transpose()
    }

    async fn find_by_alias(&self, email: &str) -> Result<Vec<User>, AppError> {
        let query = format!(
            "SELECT {} FROM users WHERE $1 = ANY(aliases) ORDER BY id",
            USER_COLUMNS
        );
        let rows = self
            .client
            .query(query.as_str(), &[&email])
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        rows.iter().map(Self::row_to_user).collect()
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, AppError> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let rows = self
            .client
            .query(query.as_str(), &[&id])
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        rows.first().map(Self::row_to_user).transpose()
    }

    async fn create_user(&self, user: &User) -> Result<UserId, AppError> {
        let auth_info = serde_json::to_value(&user.auth_info)
            .map_err(|e| AppError::Database(format!("Failed to encode auth_info: {}", e)))?;
        let repos = serde_json::to_value(&user.repos)
            .map_err(|e| AppError::Database(format!("Failed to encode repos: {}", e)))?;

        let row = self
            .client
            .query_one(
                "INSERT INTO users (name, profile_url, aliases, auth_info, repos)
                 VALUES ($1, $2, $3, $4, $5)
                 RETURNING id",
                &[
                    &user.name,
                    &user.profile_url,
                    &user.aliases,
                    &auth_info,
                    &repos,
                ],
            )
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let id: i64 = row.get(0);
        tracing::debug!(user_id = id, "User created");
        Ok(id)
    }

    async fn update_user(&self, id: UserId, update: &UserUpdate) -> Result<(), AppError> {
        if update.is_empty() {
            return Err(AppError::BadRequest("empty user update".to_string()));
        }

        // Encoded jsonb values must outlive the parameter slice.
        let auth_info = update
            .auth_info
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| AppError::Database(format!("Failed to encode auth_info: {}", e)))?;
        let repos = update
            .repos
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| AppError::Database(format!("Failed to encode repos: {}", e)))?;

        let mut assignments: Vec<String> = Vec::new();
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();

        if let Some(name) = &update.name {
            params.push(name);
            assignments.push(format!("name = ${}", params.len()));
        }
        if let Some(profile_url) = &update.profile_url {
            params.push(profile_url);
            assignments.push(format!("profile_url = ${}", params.len()));
        }
        if let Some(aliases) = &update.aliases {
            params.push(aliases);
            assignments.push(format!("aliases = ${}", params.len()));
        }
        if let Some(auth_info) = &auth_info {
            params.push(auth_info);
            assignments.push(format!("auth_info = ${}", params.len()));
        }
        if let Some(repos) = &repos {
            params.push(repos);
            assignments.push(format!("repos = ${}", params.len()));
        }

        params.push(&id);
        let query = format!(
            "UPDATE users SET {} WHERE id = ${}",
            assignments.join(", "),
            params.len()
        );

        let updated = self
            .client
            .execute(query.as_str(), &params)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if updated == 0 {
            return Err(AppError::NotFound(format!("user {}", id)));
        }
        tracing::debug!(user_id = id, "User updated");
        Ok(())
    }
}
