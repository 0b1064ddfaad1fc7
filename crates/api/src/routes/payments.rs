//! Payment gateway webhook.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use common::Money;
use serde::{Deserialize, Serialize};
use store::FulfillmentStore;

use crate::AppState;

/// Transfer notification as sent by the bank-transfer gateway.
#[derive(Debug, Deserialize)]
pub struct PaymentWebhookRequest {
    /// Free-text transfer description carrying the order marker.
    pub description: String,
    pub amount: Money,
    #[serde(alias = "transactionCode")]
    pub transaction_id: String,
    #[serde(default, alias = "paidAt")]
    pub paid_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub message: String,
}

/// POST /payments/webhook — always answers 200 so the gateway does not
/// retry; the outcome is carried in the body.
#[tracing::instrument(skip(state, payload))]
pub async fn webhook<S: FulfillmentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<PaymentWebhookRequest>, JsonRejection>,
) -> Json<WebhookResponse> {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "malformed payment notification");
            metrics::counter!("payment_notifications_total", "outcome" => "malformed")
                .increment(1);
            return Json(WebhookResponse {
                success: false,
                message: format!("Malformed notification: {}", rejection.body_text()),
            });
        }
    };

    tracing::debug!(
        transaction_id = %req.transaction_id,
        paid_at = ?req.paid_at,
        "payment notification received"
    );
    let outcome = state
        .payments
        .handle_notification(&req.description, req.amount, &req.transaction_id)
        .await;

    Json(WebhookResponse {
        success: outcome.is_success(),
        message: outcome.message(),
    })
}
