//! HTTP surface

use std::time::Duration;

use axum::routing::{get, post, put};
use axum::Router;
use daosub::{CompletionReporter, Coordinator};
use daosub_common::database::DynDirectoryWriter;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::router_handlers::*;

/// Shared state of the HTTP handlers
#[derive(Clone)]
pub struct RouterState {
    pub coordinator: Coordinator,
    pub reporter: CompletionReporter,
    pub directory: DynDirectoryWriter,
    pub subscribe_timeout: Duration,
    /// Cancelled on shutdown, releases every pending subscribe request
    pub shutdown: CancellationToken,
}

impl std::fmt::Debug for RouterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterState")
            .field("coordinator", &self.coordinator)
            .field("subscribe_timeout", &self.subscribe_timeout)
            .finish()
    }
}

/// Create the daemon router
pub fn create_router(state: RouterState) -> Router {
    let v1_router = Router::new()
        .route(
            "/communities/{community_id}/subscribe",
            post(post_subscribe),
        )
        .route("/communities/{community_id}", put(put_community))
        .route("/identities/{address}", put(put_identity))
        .route("/orders/{order_id}", get(get_order));

    Router::new()
        .nest("/v1", v1_router)
        .route("/pay/notify", post(post_pay_notify))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
