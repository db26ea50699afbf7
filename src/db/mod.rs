//! Storage layer: the user-record read/write contract and its backends.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgUserStore;

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::{User, UserId, UserUpdate};

/// Read/write contract against the user store.
///
/// The identity resolver and aggregator depend on this trait rather than a
/// concrete backend, so tests substitute `InMemoryStore`.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up the user holding a credential for `(provider, account_id)`.
    ///
    /// At most one user may hold a given pair; if the backing data violates
    /// that, implementations log and return the first match.
    async fn find_by_provider_account(
        &self,
        provider: &str,
        account_id: &str,
    ) -> Result<Option<User>, AppError>;

    /// All users carrying `email` as an alias. More than one result means
    /// identity resolution is ambiguous.
    async fn find_by_alias(&self, email: &str) -> Result<Vec<User>, AppError>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>, AppError>;

    /// Create a user and return the store-assigned id.
    async fn create_user(&self, user: &User) -> Result<UserId, AppError>;

    /// Apply a partial update. Rejects empty updates.
    async fn update_user(&self, id: UserId, update: &UserUpdate) -> Result<(), AppError>;
}
