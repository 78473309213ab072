//! On-chain transaction verification: a thin client for the chain-indexing
//! HTTP API, the fixed-layout calldata codec of the payment contract, and the
//! confirmation-polling verifier that cross-checks a submitted transaction
//! against its checkout session.

pub mod calldata;
pub mod ledger;
pub mod verify;

pub use ledger::{ExecutionStatus, HttpLedgerClient, LedgerApi, LedgerError, TransactionSummary};
pub use verify::{BlockchainVerifier, CallParam, VerificationError, Verified, VerifyFailure};
