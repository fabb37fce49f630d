//! API request handlers for the serial registry

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Form, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tagpage_common::{sanitize_text_field, Error, Nonces, RequestContext};
use tracing::{info, warn};

use crate::{
    console::{self, Banner, ConsoleView, ProductPreview, ADD_SERIAL_ACTION},
    models::SerialRecord,
    storage::SerialStore,
};

/// Shared application state
pub struct AppState {
    pub storage: Arc<dyn SerialStore>,
    pub nonces: Nonces,
}

/// API Error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message
        });

        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::Validation(_) | Error::UnsupportedImageType(_) => StatusCode::BAD_REQUEST,
            Error::Authorization(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::DuplicateSerial(_) | Error::SerialAlreadyRegistered(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        ApiError {
            status,
            message: err.to_string(),
        }
    }
}

/// Serial lookup response
#[derive(Debug, Serialize)]
pub struct SerialResponse {
    pub serial: SerialRecord,
}

/// Next-unused preview response
#[derive(Debug, Serialize)]
pub struct NextUnusedResponse {
    pub product_id: u64,
    pub next_unused: Option<SerialRecord>,
}

/// Query string of the console page
#[derive(Debug, Default, Deserialize)]
pub struct ConsoleQuery {
    pub added: Option<String>,
    pub error: Option<String>,
    pub product: Option<u64>,
}

/// Fields posted by the console's add form
#[derive(Debug, Deserialize)]
pub struct AddSerialForm {
    #[serde(default)]
    pub serial_number: String,
    #[serde(default)]
    pub item_no: String,
    #[serde(default, rename = "_token")]
    pub token: String,
    pub add_serial: Option<String>,
}

/// Health check endpoint
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.storage.health_check().await {
        Ok(()) => Json(serde_json::json!({
            "status": "healthy",
            "service": "serial-registry"
        }))
        .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "unhealthy",
                "service": "serial-registry",
                "error": e.to_string()
            })),
        )
            .into_response(),
    }
}

/// Get a serial record by value
pub async fn get_serial_handler(
    State(state): State<Arc<AppState>>,
    Path(serial): Path<String>,
) -> Result<Json<SerialResponse>, ApiError> {
    info!("Getting serial: {}", serial);

    match state.storage.find_by_serial(&serial).await? {
        Some(record) => Ok(Json(SerialResponse { serial: record })),
        None => Err(ApiError {
            status: StatusCode::NOT_FOUND,
            message: format!("Serial number not found: {}", serial),
        }),
    }
}

/// Preview the next unused serial of a product
pub async fn next_unused_handler(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<u64>,
) -> Result<Json<NextUnusedResponse>, ApiError> {
    let next_unused = state.storage.find_next_unused(product_id).await?;

    Ok(Json(NextUnusedResponse {
        product_id,
        next_unused,
    }))
}

fn forbidden(err: &Error) -> Response {
    (
        StatusCode::FORBIDDEN,
        Html(format!(
            "<!DOCTYPE html><html><body><p>{}</p></body></html>",
            tagpage_common::escape_html(&err.notice())
        )),
    )
        .into_response()
}

/// Render the operator console
pub async fn console_handler(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Query(query): Query<ConsoleQuery>,
) -> Result<Response, ApiError> {
    let user_id = match ctx.require_admin() {
        Ok(id) => id,
        Err(e) => return Ok(forbidden(&e)),
    };

    let mut products = state.storage.list_products().await?;
    if let Some(product) = query.product.filter(|p| *p > 0) {
        if !products.contains(&product) {
            products.push(product);
        }
    }

    let mut previews = Vec::with_capacity(products.len());
    for product_id in products {
        previews.push(ProductPreview {
            product_id,
            next_unused: state.storage.find_next_unused(product_id).await?,
        });
    }

    let view = ConsoleView {
        token: state
            .nonces
            .issue(ADD_SERIAL_ACTION, &user_id.to_string(), user_id),
        banner: Banner::from_query(query.added.as_deref(), query.error.as_deref()),
        previews,
    };

    Ok(Html(console::render_console(&view)).into_response())
}

/// Add a serial number from the console form
pub async fn add_serial_handler(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Form(form): Form<AddSerialForm>,
) -> Result<Response, ApiError> {
    if form.add_serial.is_none() {
        return Ok(Redirect::to("/admin/serials").into_response());
    }

    let user_id = match ctx.require_admin() {
        Ok(id) => id,
        Err(e) => return Ok(forbidden(&e)),
    };

    if !state
        .nonces
        .verify(&form.token, ADD_SERIAL_ACTION, &user_id.to_string(), user_id)
    {
        warn!("Rejected console submission with bad token from user {}", user_id);
        return Ok(forbidden(&Error::Authorization(
            "invalid anti-forgery token".to_string(),
        )));
    }

    let serial = sanitize_text_field(&form.serial_number);
    let item_no = form.item_no.trim().parse::<u64>().ok().filter(|n| *n > 0);

    let Some(item_no) = item_no.filter(|_| !serial.is_empty()) else {
        return Ok(Redirect::to("/admin/serials?error=invalid").into_response());
    };

    match state.storage.insert(&serial, item_no, false).await {
        Ok(record) => {
            info!(
                "Operator {} added serial {} for product {}",
                user_id, record.serial_number, record.item_no
            );
            Ok(Redirect::to("/admin/serials?added=1").into_response())
        }
        Err(Error::DuplicateSerial(_)) => {
            Ok(Redirect::to("/admin/serials?error=duplicate").into_response())
        }
        Err(e) => Err(e.into()),
    }
}
