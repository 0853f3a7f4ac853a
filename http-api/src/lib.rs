//! HTTP surface of the Airyra coordination service.
//!
//! The crate pairs the coordination engine (validation, id generation,
//! lifecycle orchestration) with the axum router that exposes it under
//! `/v1`. Errors cross the boundary as `{ "error": { code, message,
//! context } }` with a fixed code-to-status mapping; list responses use the
//! `{ data, pagination }` envelope.

pub mod engine;
pub mod error;
pub mod extract;
pub mod routes;

pub use engine::CoordinationEngine;
pub use error::{ApiError, ApiResult};
pub use routes::{router, AppState};

use std::future::Future;
use tokio::net::TcpListener;

/// Serve the API on `listener` until `shutdown` resolves, then stop
/// accepting connections and drain in-flight requests. The caller bounds
/// the drain (the server binary allows 10 seconds).
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
