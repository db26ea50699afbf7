// SPDX-License-Identifier: MIT

//! Services module - business logic layer.

pub mod aggregator;
pub mod events;
pub mod identity;
pub mod tokens;

pub use aggregator::RepoAggregator;
pub use events::{HttpSink, LifecycleEvent, LifecycleSink, NoopSink};
pub use identity::{IdentityResolver, IncomingAccount, IncomingProfile, Resolution};
pub use tokens::{CredentialRefresher, OAuthRefresher};
