// SPDX-License-Identifier: MIT

//! Pagination loop behavior against local provider stubs.
//!
//! The clients are pointed at a throwaway axum server via `with_base_urls`,
//! so the cursor loop and `next`-link following are exercised end to end,
//! including the anomalous-termination paths.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use repolink::config::ProviderCredentials;
use repolink::models::RepoIdentifier;
use repolink::providers::{
    BitbucketClient, BitbucketFetcher, GithubClient, GithubFetcher, RepoFetcher,
};

fn creds() -> ProviderCredentials {
    ProviderCredentials {
        client_id: "test_id".to_string(),
        client_secret: "test_secret".to_string(),
    }
}

async fn spawn_stub(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    base
}

fn github_page(nodes: Value, has_next: bool, cursor: Option<&str>) -> Value {
    json!({
        "data": {
            "viewer": {
                "repositories": {
                    "pageInfo": { "endCursor": cursor, "hasNextPage": has_next },
                    "nodes": nodes
                }
            }
        }
    })
}

#[tokio::test]
async fn github_cursor_loop_fetches_every_page() {
    let hits = Arc::new(AtomicUsize::new(0));
    let pages = vec![
        github_page(
            json!([
                { "name": "widget", "owner": { "login": "acme" } },
                { "name": "backend", "owner": { "login": "acme" } }
            ]),
            true,
            Some("c1"),
        ),
        github_page(json!([{ "name": "api", "owner": { "login": "zeta" } }]), false, None),
    ];

    let counter = Arc::clone(&hits);
    let app = Router::new().route(
        "/graphql",
        post(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let page = pages[n.min(pages.len() - 1)].clone();
            async move { Json(page) }
        }),
    );
    let base = spawn_stub(app).await;

    let client = GithubClient::new(&creds()).with_base_urls(base.clone(), base);
    let repos = GithubFetcher::new(client).fetch_all("tok", "42").await.unwrap();

    assert_eq!(repos.len(), 3);
    assert_eq!(repos[2], RepoIdentifier::new("github", "zeta", "api"));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn github_stops_on_empty_page_mid_sequence() {
    let hits = Arc::new(AtomicUsize::new(0));
    // Second page claims hasNextPage but carries no nodes; the loop must not
    // keep chasing cursors.
    let pages = vec![
        github_page(
            json!([{ "name": "widget", "owner": { "login": "acme" } }]),
            true,
            Some("c1"),
        ),
        github_page(json!([]), true, Some("c2")),
    ];

    let counter = Arc::clone(&hits);
    let app = Router::new().route(
        "/graphql",
        post(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let page = pages[n.min(pages.len() - 1)].clone();
            async move { Json(page) }
        }),
    );
    let base = spawn_stub(app).await;

    let client = GithubClient::new(&creds()).with_base_urls(base.clone(), base);
    let repos = GithubFetcher::new(client).fetch_all("tok", "42").await.unwrap();

    assert_eq!(repos, vec![RepoIdentifier::new("github", "acme", "widget")]);
    assert_eq!(hits.load(Ordering::SeqCst), 2, "loop stopped after the empty page");
}

#[tokio::test]
async fn bitbucket_follows_next_links_across_pages() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let repo_hits = Arc::new(AtomicUsize::new(0));
    let ws_page = json!({ "values": [{ "workspace": { "slug": "acme" } }] });
    let repo_pages = vec![
        json!({
            "values": [{ "slug": "one" }],
            "next": format!("{}/repositories/acme?page=2", base)
        }),
        json!({ "values": [{ "slug": "two" }] }),
    ];

    let counter = Arc::clone(&repo_hits);
    let app = Router::new()
        .route(
            "/user/permissions/workspaces",
            get(move || {
                let page = ws_page.clone();
                async move { Json(page) }
            }),
        )
        .route(
            "/repositories/acme",
            get(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let page = repo_pages[n.min(repo_pages.len() - 1)].clone();
                async move { Json(page) }
            }),
        );
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client =
        BitbucketClient::new(&creds()).with_base_urls(base.clone(), format!("{}/token", base));
    let repos = BitbucketFetcher::new(client).fetch_all("tok", "bb-1").await.unwrap();

    assert_eq!(
        repos,
        vec![
            RepoIdentifier::new("bitbucket", "acme", "one"),
            RepoIdentifier::new("bitbucket", "acme", "two"),
        ]
    );
    assert_eq!(repo_hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn bitbucket_self_referential_next_link_terminates() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let ws_hits = Arc::new(AtomicUsize::new(0));
    // `next` points back at the URL that produced this page
    let ws_page = json!({
        "values": [{ "workspace": { "slug": "acme" } }],
        "next": format!("{}/user/permissions/workspaces?pagelen=100", base)
    });
    let repo_page = json!({ "values": [{ "slug": "backend" }] });

    let counter = Arc::clone(&ws_hits);
    let app = Router::new()
        .route(
            "/user/permissions/workspaces",
            get(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                let page = ws_page.clone();
                async move { Json(page) }
            }),
        )
        .route(
            "/repositories/acme",
            get(move || {
                let page = repo_page.clone();
                async move { Json(page) }
            }),
        );
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client =
        BitbucketClient::new(&creds()).with_base_urls(base.clone(), format!("{}/token", base));
    let repos = BitbucketFetcher::new(client).fetch_all("tok", "bb-1").await.unwrap();

    assert_eq!(repos, vec![RepoIdentifier::new("bitbucket", "acme", "backend")]);
    assert_eq!(
        ws_hits.load(Ordering::SeqCst),
        1,
        "the repeated page was not fetched again"
    );
}
