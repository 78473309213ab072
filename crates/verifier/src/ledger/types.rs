//! Wire DTOs for the indexer API, translated at the boundary into a strict
//! internal schema so nothing downstream depends on the raw external shape.

use cardrail_domain::model::WalletAddress;
use serde::Deserialize;

use super::LedgerError;

/// Raw `GET /api/v1/tx/{hash}` payload as the indexer serves it.
#[derive(Debug, Deserialize)]
pub(crate) struct RawTransaction {
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub confirmations: u64,
}

/// Raw `GET /api/v1/tx/{hash}/receipt` payload.
#[derive(Debug, Deserialize)]
pub(crate) struct RawReceipt {
    pub status: String,
}

/// The decoded transaction fields the verifier actually reasons about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSummary {
    pub from: WalletAddress,
    /// Absent for contract-creation transactions.
    pub to: Option<WalletAddress>,
    pub input: Vec<u8>,
    pub confirmations: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Pending,
    Success,
    Failed,
}

impl TryFrom<RawTransaction> for TransactionSummary {
    type Error = LedgerError;

    fn try_from(raw: RawTransaction) -> Result<Self, Self::Error> {
        let from = WalletAddress::parse(&raw.from)
            .map_err(|err| LedgerError::Malformed(format!("from address: {err}")))?;
        let to = raw
            .to
            .as_deref()
            .map(WalletAddress::parse)
            .transpose()
            .map_err(|err| LedgerError::Malformed(format!("to address: {err}")))?;
        let input_hex = raw.input.strip_prefix("0x").unwrap_or(&raw.input);
        let input = hex::decode(input_hex)
            .map_err(|err| LedgerError::Malformed(format!("input data: {err}")))?;

        Ok(Self {
            from,
            to,
            input,
            confirmations: raw.confirmations,
        })
    }
}

impl TryFrom<RawReceipt> for ExecutionStatus {
    type Error = LedgerError;

    fn try_from(raw: RawReceipt) -> Result<Self, Self::Error> {
        match raw.status.as_str() {
            "pending" => Ok(ExecutionStatus::Pending),
            "success" => Ok(ExecutionStatus::Success),
            "failed" | "reverted" => Ok(ExecutionStatus::Failed),
            other => Err(LedgerError::Malformed(format!(
                "unknown execution status `{other}`"
            ))),
        }
    }
}
