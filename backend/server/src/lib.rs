//! Post ranking and voting engine of a community forum.
//!
//!
//!
//! # General Infrastructure
//! - The relational store owns post, user and community rows, this crate only ranks ids
//! - An identity layer in front of the server authenticates users and forwards `x-user-id`
//! - Redis holds every ranking structure, the server keeps no state of its own besides vote locks
//! - Listings return ids in rank order, the caller hydrates them from the relational store
//!
//!
//!
//! # Ranking
//!
//! - Two global sorted sets: by creation time and by score
//! - A fresh post scores its creation timestamp, so it ranks by recency until voted on
//! - Each unit of direction change moves the score by 432 seconds, 200 upvotes buy a day of recency
//! - Votes close a week after the post was created
//! - Community listings read a 60 second cached intersection of the community and a global set
//!
//!
//!
//! # Voting
//!
//! - Directions are down, none, up
//! - The author upvotes their own post on creation, that vote does not move the score
//! - None is stored as absence from the post's voter set
//! - Displayed counts are upvoters only, never the weighted score
//!
//!
//!
//! # Notes
//!
//! ## Caches
//! Votes never invalidate community caches. A community listing by score can trail the global one by up
//! to the TTL. Deleted posts linger in cached listings the same way.
//!
//! ## Retries
//! Store timeouts and outages come back as retryable errors (503). Creation, deletion and listing can
//! simply be rerun, a repeated create leaves the post and its votes as they are.
//!
//! A vote whose MULTI/EXEC went out without a reply in time answers 504 with an unknown outcome and is
//! not retryable. Read the post back before voting again.
//!
//!
//!
//! # Setup
//!
//! Run against a local Redis.
//! ```sh
//! STORE_URL=redis://127.0.0.1:6379 RUST_LOG=info cargo run -p ranking-server
//! ```
//!
//! Run without Redis.
//! ```sh
//! STORE_URL=memory:// cargo run -p ranking-server
//! ```
//!
//! Drive a live instance.
//! ```sh
//! cargo run -p tester -- scenario
//! ```
use std::{sync::Arc, time::Duration};

use anyhow::Result;
use axum::{
    Router,
    http::{HeaderName, Method, header::CONTENT_TYPE},
    routing::{delete, get, post},
};
use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod config;
pub mod counts;
pub mod database;
pub mod engine;
pub mod error;
pub mod keys;
pub mod memory;
pub mod models;
pub mod posts;
pub mod ranking;
pub mod routes;
pub mod state;
pub mod store;
pub mod utils;
pub mod votes;

use routes::{
    create_post_handler, delete_post_handler, health_handler, list_handler, vote_counts_handler,
    vote_handler,
};
use state::State;
use utils::USER_HEADER;

pub fn create_router(state: Arc<State>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static(USER_HEADER)])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/", get(health_handler))
        .route("/api/v1/post", post(create_post_handler))
        .route("/api/v1/post/{post_id}", delete(delete_post_handler))
        .route("/api/v1/post/vote", post(vote_handler))
        .route("/api/v1/post/votes", get(vote_counts_handler))
        .route("/api/v1/posts", get(list_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn start_server() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = State::new().await?;

    info!("Starting server...");

    let address = format!("0.0.0.0:{}", state.config.port);
    let app = create_router(state);

    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down...");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
