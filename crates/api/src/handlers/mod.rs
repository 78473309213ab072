pub mod metrics;
pub mod payments;

pub use metrics::metrics_handler;
pub use payments::record_payment_handler;

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

use cardrail_fulfillment::FulfillmentError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Fulfillment(#[from] FulfillmentError),
    #[error("rate limit exceeded")]
    RateLimited { retry_after: u64 },
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Fulfillment(err) => match err {
                FulfillmentError::Validation(_)
                | FulfillmentError::SessionState(_)
                | FulfillmentError::Verification(_)
                | FulfillmentError::MissingEmail => StatusCode::BAD_REQUEST,
                FulfillmentError::SessionNotFound | FulfillmentError::GiftCardNotFound => {
                    StatusCode::NOT_FOUND
                }
                FulfillmentError::DuplicatePayment | FulfillmentError::GiftCardUnavailable => {
                    StatusCode::CONFLICT
                }
                FulfillmentError::Decryption | FulfillmentError::Storage(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                FulfillmentError::EmailDelivery { .. } => StatusCode::BAD_GATEWAY,
            },
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());

        match self {
            ApiError::RateLimited { retry_after } => {
                builder.insert_header(("Retry-After", retry_after.to_string()));
                builder.json(ErrorBody::new(self.to_string()))
            }
            ApiError::Fulfillment(FulfillmentError::Verification(err)) => {
                let mut body = ErrorBody::new(err.to_string());
                body.confirmations = Some(err.confirmations);
                builder.json(body)
            }
            ApiError::Fulfillment(FulfillmentError::EmailDelivery { message }) => {
                let mut body = ErrorBody::new("Email failed".to_owned());
                body.message = Some(message.clone());
                builder.json(body)
            }
            other => builder.json(ErrorBody::new(other.to_string())),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmations: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorBody {
    fn new(error: String) -> Self {
        Self {
            error,
            confirmations: None,
            message: None,
        }
    }
}
