//! Shared building blocks for the serial tag services.
//!
//! - `error`: the error taxonomy every service reports through
//! - `context`: explicit per-request identity, extracted from proxy headers
//! - `nonce`: rotating anti-forgery tokens scoped to `(action, scope)`
//! - `phone`: dial-link normalization
//! - `text`: form input sanitizing and HTML escaping

pub mod context;
pub mod error;
pub mod nonce;
pub mod phone;
pub mod text;

pub use context::{RequestContext, Role};
pub use error::{Error, Result};
pub use nonce::Nonces;
pub use phone::dial_reference;
pub use text::{escape_html, sanitize_text_field, sanitize_textarea_field};
