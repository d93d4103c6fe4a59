use axum::{
    extract::{Path, State},
    Extension, Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;
use crate::auth::CurrentTenant;
use crate::error::GarageError;
use crate::lifecycle::{BoardSnapshot, MoveOutcome};
use crate::models::{Estimate, EstimateItemInput, Invoice, InvoiceSummary, JobStatus, PaymentMethod};

type ApiResult<T> = Result<Json<T>, GarageError>;

/// Column drop on the board.
#[derive(Debug, Deserialize)]
pub struct MoveJobRequest {
    pub from: JobStatus,
    pub to: JobStatus,
}

#[derive(Debug, Deserialize)]
pub struct ApplyPaymentRequest {
    pub amount: Decimal,
    #[serde(default = "default_method")]
    pub method: PaymentMethod,
}

fn default_method() -> PaymentMethod {
    PaymentMethod::Cash
}

/// Health check endpoint.
///
/// Returns a simple JSON response indicating the server is running.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "garageflow-core",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn board(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
) -> ApiResult<BoardSnapshot> {
    Ok(Json(state.engine.board(tenant_id).await?))
}

pub async fn move_job(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
    Path(job_id): Path<Uuid>,
    Json(req): Json<MoveJobRequest>,
) -> ApiResult<MoveOutcome> {
    let outcome = state
        .engine
        .move_job(tenant_id, job_id, req.from, req.to)
        .await?;
    Ok(Json(outcome))
}

pub async fn get_estimate(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Estimate> {
    Ok(Json(state.engine.estimate(tenant_id, job_id).await?))
}

pub async fn add_estimate_item(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
    Path(job_id): Path<Uuid>,
    Json(input): Json<EstimateItemInput>,
) -> ApiResult<Estimate> {
    let estimate = state
        .engine
        .add_estimate_item(tenant_id, job_id, input)
        .await?;
    Ok(Json(estimate))
}

pub async fn update_estimate_item(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
    Path((job_id, item_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<EstimateItemInput>,
) -> ApiResult<Estimate> {
    let estimate = state
        .engine
        .update_estimate_item(tenant_id, job_id, item_id, input)
        .await?;
    Ok(Json(estimate))
}

pub async fn remove_estimate_item(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
    Path((job_id, item_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Estimate> {
    let estimate = state
        .engine
        .remove_estimate_item(tenant_id, job_id, item_id)
        .await?;
    Ok(Json(estimate))
}

pub async fn generate_invoice(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Invoice> {
    Ok(Json(state.engine.generate_invoice(tenant_id, job_id).await?))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
    Path(invoice_id): Path<Uuid>,
) -> ApiResult<InvoiceSummary> {
    Ok(Json(
        state.engine.invoice_summary(tenant_id, invoice_id).await?,
    ))
}

pub async fn apply_payment(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
    Path(invoice_id): Path<Uuid>,
    Json(req): Json<ApplyPaymentRequest>,
) -> ApiResult<Invoice> {
    let invoice = state
        .engine
        .apply_payment(tenant_id, invoice_id, req.amount, req.method)
        .await?;
    Ok(Json(invoice))
}
