//! External email-dispatcher collaborator.

use std::time::Duration;

use async_trait::async_trait;
use cardrail_domain::config::CollaboratorConfig;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::vault::Redacted;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// The redemption data handed to the dispatcher. Secrets stay wrapped until
/// the moment they are serialized onto the wire.
#[derive(Debug, Clone)]
pub struct GiftCardPayload {
    pub store: String,
    pub currency: String,
    pub amount_usd_cents: i64,
    pub number: Redacted,
    pub pin: Redacted,
}

/// Identifiers accompanying the delivery so support can trace it later.
#[derive(Debug, Clone)]
pub struct PaymentContext {
    pub payment_id: i64,
    pub session_id: String,
    pub reference: String,
    pub tx_hash: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmailError {
    #[error("email transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for EmailError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

#[async_trait]
pub trait EmailDispatcher: Send + Sync {
    /// Returns whether the dispatcher confirmed delivery. `Ok(false)` and
    /// transport errors both mean "not confirmed" to the orchestrator.
    async fn send(
        &self,
        recipient: &str,
        card: &GiftCardPayload,
        context: &PaymentContext,
    ) -> Result<bool, EmailError>;
}

pub struct HttpEmailDispatcher {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpEmailDispatcher {
    pub fn new(config: &CollaboratorConfig) -> Result<Self, EmailError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: config.email_api_url().trim_end_matches('/').to_owned(),
            api_key: config.email_api_key().map(str::to_owned),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    accepted: bool,
}

#[async_trait]
impl EmailDispatcher for HttpEmailDispatcher {
    async fn send(
        &self,
        recipient: &str,
        card: &GiftCardPayload,
        context: &PaymentContext,
    ) -> Result<bool, EmailError> {
        let body = json!({
            "to": recipient,
            "template": "gift_card_delivery",
            "card": {
                "store": card.store,
                "currency": card.currency,
                "amountUsdCents": card.amount_usd_cents,
                "number": card.number.expose(),
                "pin": card.pin.expose(),
            },
            "payment": {
                "id": context.payment_id,
                "sessionId": context.session_id,
                "reference": context.reference,
                "txHash": context.tx_hash,
            },
        });

        let mut request = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(EmailError::Transport(format!(
                "dispatcher returned HTTP {}",
                response.status()
            )));
        }
        let body: SendResponse = response.json().await?;
        Ok(body.accepted)
    }
}
