//! External vault collaborator: decrypts stored gift-card secrets.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use cardrail_domain::config::CollaboratorConfig;
use cardrail_domain::model::GiftCardRecord;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A decrypted value whose Debug form never reveals the content. Redemption
/// material only ever leaves this wrapper at the email-dispatch boundary.
#[derive(Clone, PartialEq, Eq)]
pub struct Redacted(String);

impl Redacted {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Redacted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[redacted]")
    }
}

/// Decrypted redemption material for one gift card.
#[derive(Debug, Clone)]
pub struct CardSecret {
    pub number: Redacted,
    pub pin: Redacted,
}

/// The sealed unit stored on a gift card row: two ciphertexts protected by
/// one iv/tag pair, decrypted in a single vault call.
#[derive(Debug, Clone, Serialize)]
pub struct SealedCardSecret {
    pub encrypted_number: String,
    pub encrypted_pin: String,
    pub iv: String,
    pub tag: String,
}

impl SealedCardSecret {
    pub fn from_card(card: &GiftCardRecord) -> Self {
        Self {
            encrypted_number: card.encrypted_number.clone(),
            encrypted_pin: card.encrypted_pin.clone(),
            iv: card.iv.clone(),
            tag: card.tag.clone(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VaultError {
    /// The vault refused the ciphertext (tampered or corrupt payload).
    #[error("vault rejected the ciphertext")]
    Rejected,
    #[error("vault transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for VaultError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

#[async_trait]
pub trait Vault: Send + Sync {
    async fn decrypt_card(&self, sealed: &SealedCardSecret) -> Result<CardSecret, VaultError>;
}

pub struct HttpVaultClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpVaultClient {
    pub fn new(config: &CollaboratorConfig) -> Result<Self, VaultError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: config.vault_url().trim_end_matches('/').to_owned(),
            api_key: config.vault_api_key().map(str::to_owned),
        })
    }
}

#[derive(Debug, Deserialize)]
struct DecryptResponse {
    number: String,
    pin: String,
}

#[async_trait]
impl Vault for HttpVaultClient {
    async fn decrypt_card(&self, sealed: &SealedCardSecret) -> Result<CardSecret, VaultError> {
        let mut request = self
            .http
            .post(format!("{}/v1/decrypt", self.base_url))
            .json(sealed);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Err(VaultError::Rejected),
            status if status.is_success() => {
                let body: DecryptResponse = response.json().await?;
                Ok(CardSecret {
                    number: Redacted::new(body.number),
                    pin: Redacted::new(body.pin),
                })
            }
            status => Err(VaultError::Transport(format!(
                "vault returned HTTP {status}"
            ))),
        }
    }
}
