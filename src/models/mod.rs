// SPDX-License-Identifier: MIT

//! Data models for the application.

pub mod repo;
pub mod user;

pub use repo::RepoIdentifier;
pub use user::{AuthInfo, Credential, User, UserId, UserUpdate};
