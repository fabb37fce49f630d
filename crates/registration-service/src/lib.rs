//! Registration Service
//!
//! Allocates serial numbers to completed orders, takes buyer registrations
//! against a serial, and publishes the public page a tag's QR code points to.

pub mod allocation;
pub mod config;
pub mod form;
pub mod handlers;
pub mod media;
pub mod notices;
pub mod orders;
pub mod pages;
pub mod publisher;
pub mod registration;
pub mod webhook;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

pub use allocation::{AllocationReport, AllocationTrigger};
pub use config::Config;
pub use handlers::AppState;
pub use registration::{Registrar, RegistrationTarget, MANUAL_ORDER_ID};

/// Runtime settings the handlers depend on
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL pages and media are published under
    pub public_base_url: String,

    /// Accept registrations posted with the manual order id
    pub manual_test_mode: bool,

    /// Product manual registrations are filed under
    pub manual_test_product_id: u64,

    /// Shared secret of the order webhook; unsigned deliveries are accepted when unset
    pub webhook_secret: Option<String>,

    /// Directory uploaded images are stored in
    pub media_dir: PathBuf,

    /// Largest accepted request body
    pub max_upload_bytes: usize,
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let media = ServeDir::new(&state.settings.media_dir);
    let body_limit = state.settings.max_upload_bytes;
    let shared_state = Arc::new(state);

    Router::new()
        .route("/health", get(handlers::health_handler))
        // Shop integration
        .route("/hooks/order-completed", post(handlers::order_webhook_handler))
        // Buyer registration
        .route(
            "/orders/{order_id}/registration",
            get(handlers::order_form_handler),
        )
        .route("/register/manual", get(handlers::manual_form_handler))
        .route("/register", post(handlers::register_handler))
        // Public pages
        .route("/pages/{page_id}", get(handlers::page_handler))
        .route("/p/{serial}", get(handlers::serial_page_handler))
        .nest_service("/media", media)
        .with_state(shared_state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
