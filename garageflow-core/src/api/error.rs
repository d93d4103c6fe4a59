use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::error::GarageError;

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl GarageError {
    /// HTTP status a rejected operation is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GarageError::InvalidTransition { .. }
            | GarageError::InvalidItem(_)
            | GarageError::InvalidTaxRate(_)
            | GarageError::Overpayment { .. }
            | GarageError::InvalidPaymentAmount { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            GarageError::PaymentRequired { .. } => StatusCode::PAYMENT_REQUIRED,
            GarageError::EstimateLocked { .. } | GarageError::StaleStatus { .. } => {
                StatusCode::CONFLICT
            }
            GarageError::JobNotFound(_)
            | GarageError::EstimateNotFound(_)
            | GarageError::InvoiceNotFound(_)
            | GarageError::ItemNotFound(_) => StatusCode::NOT_FOUND,
            GarageError::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            GarageError::PaymentRequired {
                job_id,
                invoice_id,
                total_amount,
                paid_amount,
                outstanding,
            } => Some(json!({
                "job_id": job_id,
                "invoice_id": invoice_id,
                "total_amount": total_amount,
                "paid_amount": paid_amount,
                "outstanding": outstanding,
            })),
            GarageError::Overpayment {
                invoice_id,
                amount,
                balance,
            } => Some(json!({
                "invoice_id": invoice_id,
                "amount": amount,
                "balance": balance,
            })),
            GarageError::InvalidTransition { from, to } => Some(json!({
                "from": from,
                "to": to,
                "allowed": from.allowed_targets(),
            })),
            GarageError::StaleStatus {
                job_id,
                expected,
                actual,
            } => Some(json!({
                "job_id": job_id,
                "expected": expected,
                "actual": actual,
            })),
            _ => None,
        }
    }
}

impl IntoResponse for GarageError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if self.is_transient() {
            warn!("Request failed with transient error: {}", self);
        }

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
                details: self.details(),
            }),
        )
            .into_response()
    }
}
