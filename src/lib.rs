//! Signed, hash-chained ledger node.
//!
//! Every block is signed by the node key, the chain file is signed as a
//! whole, and new blocks are pushed to peers that accept them only when they
//! extend their own tip.

pub mod chain;
pub mod config;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod model;
pub mod routes;
pub mod storage;
pub mod sync;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use ledger::Ledger;
use sync::PeerBroadcaster;

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub peers: Arc<PeerBroadcaster>,
    pub node_name: Arc<str>,
}

/// Build the node's HTTP router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chain", get(routes::get_chain))
        .route("/add-block", post(routes::add_block))
        .route("/sync-block", post(routes::sync_block))
        .route("/validate", get(routes::validate_chain))
        .route("/reset", post(routes::reset))
        .route("/pubkey", get(routes::pubkey))
        .route("/health", get(routes::health))
        .route("/version", get(routes::version))
        .with_state(state)
}
