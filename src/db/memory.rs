//! In-memory user store for tests and local development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::db::UserStore;
use crate::error::AppError;
use crate::models::{User, UserId, UserUpdate};

/// HashMap-backed store with the same last-writer-wins semantics as the
/// relational backend.
#[derive(Default)]
pub struct InMemoryStore {
    users: RwLock<HashMap<UserId, User>>,
    next_id: AtomicI64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    fn lock_err() -> AppError {
        AppError::Database("user store lock poisoned".to_string())
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn find_by_provider_account(
        &self,
        provider: &str,
        account_id: &str,
    ) -> Result<Option<User>, AppError> {
        let users = self.users.read().map_err(|_| Self::lock_err())?;
        let mut matches: Vec<&User> = users
            .values()
            .filter(|u| u.has_credential(provider, account_id))
            .collect();
        if matches.len() > 1 {
            tracing::warn!(provider, account_id, "Multiple users hold the same credential");
            // Deterministic pick so repeated lookups agree
            matches.sort_by_key(|u| u.id);
        }
        Ok(matches.first().map(|u| (*u).clone()))
    }

    async fn find_by_alias(&self, email: &str) -> Result<Vec<User>, AppError> {
        let users = self.users.read().map_err(|_| Self::lock_err())?;
        let mut found: Vec<User> = users
            .values()
            .filter(|u| u.aliases.iter().any(|a| a == email))
            .cloned()
            .collect();
        found.sort_by_key(|u| u.id);
        Ok(found)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, AppError> {
        let users = self.users.read().map_err(|_| Self::lock_err())?;
        Ok(users.get(&id).cloned())
    }

    async fn create_user(&self, user: &User) -> Result<UserId, AppError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut stored = user.clone();
        stored.id = Some(id);
        let mut users = self.users.write().map_err(|_| Self::lock_err())?;
        users.insert(id, stored);
        Ok(id)
    }

    async fn update_user(&self, id: UserId, update: &UserUpdate) -> Result<(), AppError> {
        if update.is_empty() {
            return Err(AppError::BadRequest("empty user update".to_string()));
        }
        let mut users = self.users.write().map_err(|_| Self::lock_err())?;
        let user = users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("user {}", id)))?;

        if let Some(name) = &update.name {
            user.name = Some(name.clone());
        }
        if let Some(profile_url) = &update.profile_url {
            user.profile_url = Some(profile_url.clone());
        }
        if let Some(aliases) = &update.aliases {
            user.aliases = aliases.clone();
        }
        if let Some(auth_info) = &update.auth_info {
            user.auth_info = auth_info.clone();
        }
        if let Some(repos) = &update.repos {
            user.repos = repos.clone();
        }
        Ok(())
    }
}
