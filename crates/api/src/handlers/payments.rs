use actix_web::{web, HttpRequest, HttpResponse};
use cardrail_fulfillment::{FulfillmentError, FulfillmentOutcome, RecordPaymentRequest};
use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

use super::ApiError;

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPaymentBody {
    pub session_id: String,
    pub tx_hash: String,
    pub amount_crypto: String,
    pub token: String,
    #[serde(default)]
    pub gift_card_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentBody {
    pub id: i64,
    pub session_id: String,
    pub tx_hash: String,
    pub amount_crypto: String,
    pub token: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionBody {
    pub id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gift_card_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordPaymentResponse {
    pub success: bool,
    pub payment: PaymentBody,
    pub session: SessionBody,
}

pub async fn record_payment_handler(
    state: web::Data<AppState>,
    request: HttpRequest,
    payload: web::Json<RecordPaymentBody>,
) -> Result<HttpResponse, ApiError> {
    let client = request
        .peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_owned());
    state
        .gate()
        .admit(&client)
        .map_err(|retry| ApiError::RateLimited {
            retry_after: retry.0,
        })?;

    let body = payload.into_inner();
    let outcome = state
        .orchestrator()
        .record_payment(RecordPaymentRequest {
            session_id: body.session_id,
            tx_hash: body.tx_hash,
            amount_crypto: body.amount_crypto,
            token: body.token,
            gift_card_id: body.gift_card_id,
        })
        .await
        .inspect_err(|err| {
            counter!("api_payment_requests_total", "status" => status_label(err)).increment(1);
        })?;

    counter!("api_payment_requests_total", "status" => "success").increment(1);
    Ok(HttpResponse::Ok().json(build_response(outcome)))
}

fn build_response(outcome: FulfillmentOutcome) -> RecordPaymentResponse {
    RecordPaymentResponse {
        success: true,
        payment: PaymentBody {
            id: outcome.payment.id,
            session_id: outcome.payment.session_id.into_inner(),
            tx_hash: outcome.payment.tx_hash.as_str().to_owned(),
            amount_crypto: outcome.payment.amount.format_decimal(),
            token: outcome.payment.token,
            status: outcome.payment.status.to_string(),
        },
        session: SessionBody {
            id: outcome.session.id.into_inner(),
            status: outcome.session.status.to_string(),
            gift_card_id: outcome.session.gift_card_id,
        },
    }
}

fn status_label(err: &FulfillmentError) -> &'static str {
    match err {
        FulfillmentError::Validation(_) => "invalid_request",
        FulfillmentError::SessionState(_) => "session_state",
        FulfillmentError::SessionNotFound => "session_not_found",
        FulfillmentError::GiftCardNotFound => "gift_card_not_found",
        FulfillmentError::GiftCardUnavailable => "gift_card_unavailable",
        FulfillmentError::DuplicatePayment => "duplicate",
        FulfillmentError::Verification(_) => "verification_failed",
        FulfillmentError::MissingEmail => "missing_email",
        FulfillmentError::Decryption => "decryption_failed",
        FulfillmentError::EmailDelivery { .. } => "email_failed",
        FulfillmentError::Storage(_) => "storage_error",
    }
}
