// SPDX-License-Identifier: MIT

//! Repolink API Server
//!
//! Resolves OAuth sign-ins to canonical user records and aggregates
//! repository access across linked source-control providers.

use std::sync::Arc;

use repolink::{
    config::Config,
    db::{InMemoryStore, PgUserStore, UserStore},
    providers::{BitbucketClient, BitbucketFetcher, GithubClient, GithubFetcher, RepoFetcher},
    services::{HttpSink, IdentityResolver, LifecycleSink, NoopSink, OAuthRefresher, RepoAggregator},
    AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Repolink API");

    // Pick the store backend
    let store: Arc<dyn UserStore> = match &config.database_url {
        Some(url) => Arc::new(
            PgUserStore::connect(url)
                .await
                .expect("Failed to connect to Postgres"),
        ),
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            Arc::new(InMemoryStore::new())
        }
    };

    // Provider clients
    let github = GithubClient::new(&config.github);
    let bitbucket = BitbucketClient::new(&config.bitbucket);

    // Lifecycle event sink (best-effort analytics)
    let events: Arc<dyn LifecycleSink> = match &config.events_endpoint {
        Some(endpoint) => Arc::new(HttpSink::new(
            endpoint.clone(),
            config.events_write_key.clone(),
        )),
        None => Arc::new(NoopSink),
    };

    let resolver = IdentityResolver::new(Arc::clone(&store), events);

    let refresher = Arc::new(OAuthRefresher::new(Arc::clone(&store), bitbucket.clone()));
    let fetchers: Vec<Arc<dyn RepoFetcher>> = vec![
        Arc::new(GithubFetcher::new(github.clone())),
        Arc::new(BitbucketFetcher::new(bitbucket.clone())),
    ];
    let aggregator = RepoAggregator::new(Arc::clone(&store), refresher, fetchers);

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        resolver,
        aggregator,
        github,
        bitbucket,
    });

    // Build router
    let app = repolink::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("repolink=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
