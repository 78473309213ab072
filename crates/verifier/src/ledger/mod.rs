//! Thin request wrapper over the chain-indexing HTTP API.

pub mod mock;
mod types;

use std::time::Duration;

use async_trait::async_trait;
use cardrail_domain::config::ChainConfig;
use cardrail_domain::model::TxHash;
use reqwest::StatusCode;
use thiserror::Error;

pub(crate) use types::{RawReceipt, RawTransaction};
pub use types::{ExecutionStatus, TransactionSummary};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger transport error: {0}")]
    Transport(String),
    #[error("ledger returned HTTP {0}")]
    Status(u16),
    #[error("malformed ledger response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for LedgerError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

/// The two indexer lookups the verifier needs, behind a trait so tests can
/// script chain behavior without HTTP.
#[async_trait]
pub trait LedgerApi: Send + Sync {
    /// Looks the transaction up by hash. `None` means the indexer has not
    /// seen it yet, which callers treat as retryable.
    async fn transaction_info(
        &self,
        tx_hash: &TxHash,
    ) -> Result<Option<TransactionSummary>, LedgerError>;

    /// Fetches the execution outcome from the transaction receipt.
    async fn execution_status(&self, tx_hash: &TxHash) -> Result<ExecutionStatus, LedgerError>;
}

pub struct HttpLedgerClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpLedgerClient {
    pub fn new(config: &ChainConfig) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: config.ledger_api_url().trim_end_matches('/').to_owned(),
            api_key: config.ledger_api_key().map(str::to_owned),
        })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let mut request = self.http.get(format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }
        request
    }
}

#[async_trait]
impl LedgerApi for HttpLedgerClient {
    async fn transaction_info(
        &self,
        tx_hash: &TxHash,
    ) -> Result<Option<TransactionSummary>, LedgerError> {
        let response = self
            .get(&format!("/api/v1/tx/{}", tx_hash.as_str()))
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let raw: RawTransaction = response.json().await?;
                TransactionSummary::try_from(raw).map(Some)
            }
            status => Err(LedgerError::Status(status.as_u16())),
        }
    }

    async fn execution_status(&self, tx_hash: &TxHash) -> Result<ExecutionStatus, LedgerError> {
        let response = self
            .get(&format!("/api/v1/tx/{}/receipt", tx_hash.as_str()))
            .send()
            .await?;
        match response.status() {
            // No receipt yet: the transaction is still waiting to execute.
            StatusCode::NOT_FOUND => Ok(ExecutionStatus::Pending),
            status if status.is_success() => {
                let raw: RawReceipt = response.json().await?;
                ExecutionStatus::try_from(raw)
            }
            status => Err(LedgerError::Status(status.as_u16())),
        }
    }
}
