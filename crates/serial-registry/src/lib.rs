//! Serial Registry Service
//!
//! Owns the mapping of serial number → (product, used flag) and exposes the
//! operator console for seeding serials. The registration service links this
//! crate and talks to the same store through `SerialStore`.

pub mod config;
pub mod console;
pub mod handlers;
pub mod models;
pub mod storage;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use config::Config;
pub use handlers::AppState;
pub use models::{ClaimOutcome, SerialRecord};
pub use storage::{MemorySerialStore, RedisSerialStore, SerialStore};

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let shared_state = Arc::new(state);

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/api/serials/{serial}", get(handlers::get_serial_handler))
        .route(
            "/api/products/{product_id}/next-unused",
            get(handlers::next_unused_handler),
        )
        .route(
            "/admin/serials",
            get(handlers::console_handler).post(handlers::add_serial_handler),
        )
        .with_state(shared_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
