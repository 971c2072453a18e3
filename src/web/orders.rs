//! Order CRUD, CSV exchange, and contacts download.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use super::AppState;
use crate::models::order::{NewOrder, Order, OrderUpdate};
use crate::persistence::csv;
use crate::Result;

const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

/// `GET /api/orders`.
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Order>>> {
    Ok(Json(state.orders.list().await?))
}

/// `POST /api/orders`.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(new): Json<NewOrder>,
) -> Result<(StatusCode, Json<Order>)> {
    let order = state.orders.create(new).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// `GET /api/orders/{id}`.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Order>> {
    Ok(Json(state.orders.get(&id).await?))
}

/// `PUT /api/orders/{id}`.
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(update): Json<OrderUpdate>,
) -> Result<Json<Order>> {
    Ok(Json(state.orders.update(&id, update).await?))
}

/// `DELETE /api/orders/{id}`.
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.orders.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/orders/export/csv`.
pub async fn export_csv(State(state): State<Arc<AppState>>) -> Result<Response> {
    let orders = state.orders.list().await?;
    let body = csv::export_orders(&orders);
    let disposition = format!("attachment; filename={}", csv::export_filename(Utc::now()));
    info!(count = orders.len(), "orders exported");
    Ok((
        [
            (CONTENT_TYPE, CSV_CONTENT_TYPE.to_owned()),
            (CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// `POST /api/orders/import/csv`: replace every order with the CSV rows.
///
/// Nothing is written if any row is invalid.
pub async fn import_csv(State(state): State<Arc<AppState>>, body: String) -> Result<Response> {
    let report = csv::import_orders(&body, Utc::now())?;
    if !report.errors.is_empty() {
        warn!(errors = report.errors.len(), "order import rejected");
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "message": "Import failed due to errors",
                "errors": report.errors,
            })),
        )
            .into_response());
    }

    let message = report.summary();
    state.orders.replace_all(report.orders.clone()).await?;
    info!(
        imported = report.orders.len(),
        skipped = report.skipped,
        "orders imported"
    );
    Ok(Json(json!({ "message": message, "orders": report.orders })).into_response())
}

/// `GET /download_contacts`.
pub async fn download_contacts(State(state): State<Arc<AppState>>) -> Result<Response> {
    let Some(contacts) = csv::read_contacts(&state.config.paths.contacts).await? else {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "No contacts found" })),
        )
            .into_response());
    };
    Ok((
        [
            (CONTENT_TYPE, CSV_CONTENT_TYPE),
            (CONTENT_DISPOSITION, "attachment; filename=contacts.csv"),
        ],
        csv::contacts_csv(&contacts),
    )
        .into_response())
}
