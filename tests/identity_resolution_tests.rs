// SPDX-License-Identifier: MIT

//! Identity resolution scenarios over the in-memory store.

mod common;

use std::sync::Arc;

use repolink::db::{InMemoryStore, UserStore};
use repolink::error::AppError;
use repolink::models::User;
use repolink::services::{IdentityResolver, IncomingAccount, IncomingProfile};

use common::{credential, RecordingSink};

fn profile(name: &str, email: Option<&str>) -> IncomingProfile {
    IncomingProfile {
        display_name: Some(name.to_string()),
        email: email.map(|e| e.to_string()),
        avatar_url: None,
    }
}

fn account(provider: &str, id: &str, token: &str, expires_at: Option<i64>) -> IncomingAccount {
    IncomingAccount {
        provider: provider.to_string(),
        account_id: id.to_string(),
        credential: credential(token, expires_at),
    }
}

fn resolver_with_store() -> (IdentityResolver, Arc<InMemoryStore>, RecordingSink) {
    let store = Arc::new(InMemoryStore::new());
    let sink = RecordingSink::default();
    let resolver = IdentityResolver::new(
        store.clone() as Arc<dyn UserStore>,
        Arc::new(sink.clone()),
    );
    (resolver, store, sink)
}

#[tokio::test]
async fn first_sign_in_creates_user_with_credential_and_alias() {
    let (resolver, store, sink) = resolver_with_store();

    let resolution = resolver
        .resolve(
            &profile("Ada", Some("a@x.com")),
            Some(&account("github", "42", "tok-1", Some(100))),
        )
        .await
        .expect("resolution should succeed");

    assert!(resolution.new_user);
    assert!(resolution.new_credential);

    let user = store.get_user(resolution.user_id).await.unwrap().unwrap();
    assert_eq!(user.aliases, vec!["a@x.com"]);
    assert!(user.has_credential("github", "42"));

    let events = sink.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, "signup");
}

#[tokio::test]
async fn repeat_sign_in_resolves_to_same_user() {
    let (resolver, _store, sink) = resolver_with_store();

    let first = resolver
        .resolve(
            &profile("Ada", Some("a@x.com")),
            Some(&account("github", "42", "tok-1", Some(100))),
        )
        .await
        .unwrap();

    let second = resolver
        .resolve(
            &profile("Ada", Some("a@x.com")),
            Some(&account("github", "42", "tok-2", Some(200))),
        )
        .await
        .unwrap();

    assert_eq!(first.user_id, second.user_id);
    assert!(!second.new_user);
    assert!(!second.new_credential);

    let events = sink.events.lock().unwrap();
    assert_eq!(events[1].event, "login");
}

#[tokio::test]
async fn same_email_links_second_provider_to_existing_user() {
    let (resolver, store, _sink) = resolver_with_store();

    let first = resolver
        .resolve(
            &profile("Ada", Some("a@x.com")),
            Some(&account("github", "42", "tok-gh", Some(100))),
        )
        .await
        .unwrap();

    // Different provider account id, same verified email
    let second = resolver
        .resolve(
            &profile("Ada", Some("a@x.com")),
            Some(&account("bitbucket", "bb-9", "tok-bb", Some(300))),
        )
        .await
        .unwrap();

    assert_eq!(second.user_id, first.user_id);
    assert!(!second.new_user);
    assert!(second.new_credential);

    let user = store.get_user(first.user_id).await.unwrap().unwrap();
    assert!(user.has_credential("github", "42"), "github entry untouched");
    assert!(user.has_credential("bitbucket", "bb-9"));
    assert_eq!(
        user.credential("github", "42").unwrap().access_token,
        "tok-gh"
    );
}

#[tokio::test]
async fn ambiguous_alias_fails_closed() {
    let (resolver, store, sink) = resolver_with_store();

    // Two distinct users sharing the alias
    for provider in ["github", "bitbucket"] {
        store
            .create_user(&User {
                aliases: vec!["shared@x.com".to_string()],
                name: Some(provider.to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
    }

    let result = resolver
        .resolve(
            &profile("Eve", Some("shared@x.com")),
            Some(&account("gitlab", "g-1", "tok", Some(100))),
        )
        .await;

    assert!(matches!(result, Err(AppError::AmbiguousIdentity)));

    // No record was created or updated
    assert!(store
        .find_by_provider_account("gitlab", "g-1")
        .await
        .unwrap()
        .is_none());
    let matches = store.find_by_alias("shared@x.com").await.unwrap();
    assert_eq!(matches.len(), 2);
    for user in matches {
        assert!(user.auth_info.is_empty());
    }
    assert!(sink.events.lock().unwrap().is_empty(), "no lifecycle signal");
}

#[tokio::test]
async fn stale_token_does_not_clobber_newer_one() {
    let (resolver, store, _sink) = resolver_with_store();

    let first = resolver
        .resolve(
            &profile("Ada", Some("a@x.com")),
            Some(&account("bitbucket", "bb-1", "fresh", Some(1000))),
        )
        .await
        .unwrap();

    // Out-of-order delivery of an older token for the same account
    resolver
        .resolve(
            &profile("Ada", Some("a@x.com")),
            Some(&account("bitbucket", "bb-1", "stale", Some(500))),
        )
        .await
        .unwrap();

    let user = store.get_user(first.user_id).await.unwrap().unwrap();
    let stored = user.credential("bitbucket", "bb-1").unwrap();
    assert_eq!(stored.access_token, "fresh");
    assert_eq!(stored.expires_at, Some(1000));
}

#[tokio::test]
async fn missing_email_skips_alias_matching() {
    let (resolver, _store, _sink) = resolver_with_store();

    let first = resolver
        .resolve(
            &profile("Ada", Some("a@x.com")),
            Some(&account("github", "42", "tok", Some(100))),
        )
        .await
        .unwrap();

    // Same human, no email in the profile, different provider account:
    // nothing links them, so a fresh user is created.
    let second = resolver
        .resolve(
            &profile("Ada", None),
            Some(&account("bitbucket", "bb-1", "tok", Some(100))),
        )
        .await
        .unwrap();

    assert_ne!(first.user_id, second.user_id);
    assert!(second.new_user);
}

#[tokio::test]
async fn credential_less_event_merges_profile_fields_only() {
    let (resolver, store, _sink) = resolver_with_store();

    let first = resolver
        .resolve(
            &profile("Ada", Some("a@x.com")),
            Some(&account("github", "42", "tok", Some(100))),
        )
        .await
        .unwrap();

    // Session refresh delivers a profile without an account object
    let second = resolver
        .resolve(&profile("Ada Lovelace", Some("a@x.com")), None)
        .await
        .unwrap();

    assert_eq!(second.user_id, first.user_id);
    assert!(!second.new_credential);

    let user = store.get_user(first.user_id).await.unwrap().unwrap();
    assert_eq!(user.name.as_deref(), Some("Ada Lovelace"));
    assert!(user.has_credential("github", "42"));
}
