//! Confirmation polling and transaction cross-checking.

use std::sync::Arc;
use std::time::Duration;

use cardrail_domain::config::ChainConfig;
use cardrail_domain::model::{SessionId, TokenAmount, TxHash, WalletAddress};
use metrics::{counter, histogram};
use moka::sync::Cache;
use strum_macros::Display;
use thiserror::Error;
use tokio::time::{interval, Instant};
use tracing::{info, warn};

use crate::calldata::{self, CalldataError};
use crate::ledger::{ExecutionStatus, LedgerApi, TransactionSummary};

const VERDICT_CACHE_TTL: Duration = Duration::from_secs(600);
const VERDICT_CACHE_CAPACITY: u64 = 10_000;

/// A successful verification verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verified {
    pub confirmations: u64,
}

/// Which decoded call parameter failed the byte-for-byte comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum CallParam {
    Selector,
    SessionId,
    Amount,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyFailure {
    #[error("transaction execution failed on chain")]
    ExecutionFailed,
    #[error("transaction paid the wrong destination: expected {expected}, got {actual}")]
    WrongDestination { expected: String, actual: String },
    #[error("transaction sender does not match the session wallet: expected {expected}, got {actual}")]
    WrongSender { expected: String, actual: String },
    #[error("call parameter mismatch: {param}")]
    ParamMismatch { param: CallParam },
    #[error("timed out waiting for confirmations")]
    Timeout,
}

impl VerifyFailure {
    fn metric_label(&self) -> &'static str {
        match self {
            VerifyFailure::ExecutionFailed => "execution_failed",
            VerifyFailure::WrongDestination { .. } => "wrong_destination",
            VerifyFailure::WrongSender { .. } => "wrong_sender",
            VerifyFailure::ParamMismatch { .. } => "param_mismatch",
            VerifyFailure::Timeout => "timeout",
        }
    }
}

/// Verification failure plus the confirmation depth observed so far, so
/// callers can render progress alongside the rejection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct VerificationError {
    pub reason: VerifyFailure,
    pub confirmations: u64,
}

#[derive(Clone)]
struct CachedVerdict {
    confirmations: u64,
    session_id: SessionId,
    sender: WalletAddress,
    amount: TokenAmount,
}

/// Polls the ledger until a transaction is buried deep enough, then validates
/// execution status, destination, sender, and encoded call parameters against
/// the expected session.
pub struct BlockchainVerifier {
    ledger: Arc<dyn LedgerApi>,
    config: ChainConfig,
    // Successful verdicts are immutable once confirmed, so client retries
    // after a downstream failure skip the polling budget entirely.
    verified: Cache<String, CachedVerdict>,
}

impl BlockchainVerifier {
    pub fn new(ledger: Arc<dyn LedgerApi>, config: ChainConfig) -> Self {
        Self {
            ledger,
            config,
            verified: Cache::builder()
                .time_to_live(VERDICT_CACHE_TTL)
                .max_capacity(VERDICT_CACHE_CAPACITY)
                .build(),
        }
    }

    pub async fn verify(
        &self,
        tx_hash: &TxHash,
        session_id: &SessionId,
        expected_wallet: &WalletAddress,
        expected_amount: TokenAmount,
    ) -> Result<Verified, VerificationError> {
        if let Some(cached) = self.verified.get(tx_hash.as_str()) {
            if cached.session_id == *session_id
                && cached.sender == *expected_wallet
                && cached.amount == expected_amount
            {
                counter!("verifier_cache_hits_total").increment(1);
                return Ok(Verified {
                    confirmations: cached.confirmations,
                });
            }
        }

        let started = Instant::now();
        let (summary, status, confirmations) = self.await_confirmed_execution(tx_hash).await?;
        histogram!("verifier_wait_seconds").record(started.elapsed().as_secs_f64());

        if status == ExecutionStatus::Failed {
            return Err(reject(VerifyFailure::ExecutionFailed, confirmations));
        }

        let contract = self.config.payment_contract();
        if summary.to.as_ref() != Some(contract) {
            let actual = summary
                .to
                .as_ref()
                .map(WalletAddress::to_string)
                .unwrap_or_else(|| "(none)".to_owned());
            return Err(reject(
                VerifyFailure::WrongDestination {
                    expected: contract.to_string(),
                    actual,
                },
                confirmations,
            ));
        }

        if summary.from != *expected_wallet {
            return Err(reject(
                VerifyFailure::WrongSender {
                    expected: expected_wallet.to_string(),
                    actual: summary.from.to_string(),
                },
                confirmations,
            ));
        }

        let decoded = calldata::decode_call(&summary.input).map_err(|err| {
            reject(
                VerifyFailure::ParamMismatch {
                    param: param_for(&err),
                },
                confirmations,
            )
        })?;
        if decoded.session_word != calldata::encode_session_id(session_id) {
            return Err(reject(
                VerifyFailure::ParamMismatch {
                    param: CallParam::SessionId,
                },
                confirmations,
            ));
        }
        if decoded.amount_word != calldata::encode_amount(expected_amount) {
            return Err(reject(
                VerifyFailure::ParamMismatch {
                    param: CallParam::Amount,
                },
                confirmations,
            ));
        }

        self.verified.insert(
            tx_hash.as_str().to_owned(),
            CachedVerdict {
                confirmations,
                session_id: session_id.clone(),
                sender: expected_wallet.clone(),
                amount: expected_amount,
            },
        );
        counter!("verifier_outcomes_total", "outcome" => "verified").increment(1);
        info!(
            tx_hash = %tx_hash,
            session_id = %session_id,
            confirmations,
            "transaction verified"
        );
        Ok(Verified { confirmations })
    }

    /// Polls until the transaction is confirmed to the required depth and has
    /// a terminal execution status, or the wait budget runs out. Transient
    /// ledger errors stay retryable inside the budget and only ever surface
    /// as a timeout.
    async fn await_confirmed_execution(
        &self,
        tx_hash: &TxHash,
    ) -> Result<(TransactionSummary, ExecutionStatus, u64), VerificationError> {
        let deadline = Instant::now() + self.config.max_wait();
        let mut ticker = interval(self.config.poll_interval());
        let mut observed = 0u64;

        loop {
            ticker.tick().await;

            match self.ledger.transaction_info(tx_hash).await {
                Ok(Some(summary)) => {
                    observed = summary.confirmations;
                    if summary.confirmations >= self.config.confirmation_threshold() {
                        match self.ledger.execution_status(tx_hash).await {
                            Ok(ExecutionStatus::Pending) => {
                                counter!("verifier_polls_total", "result" => "receipt_pending")
                                    .increment(1);
                            }
                            Ok(status) => {
                                counter!("verifier_polls_total", "result" => "confirmed")
                                    .increment(1);
                                return Ok((summary, status, observed));
                            }
                            Err(err) => {
                                counter!("verifier_polls_total", "result" => "error").increment(1);
                                warn!(tx_hash = %tx_hash, error = %err, "receipt fetch failed");
                            }
                        }
                    } else {
                        counter!("verifier_polls_total", "result" => "confirming").increment(1);
                    }
                }
                Ok(None) => {
                    counter!("verifier_polls_total", "result" => "not_found").increment(1);
                }
                Err(err) => {
                    counter!("verifier_polls_total", "result" => "error").increment(1);
                    warn!(tx_hash = %tx_hash, error = %err, "transaction poll failed");
                }
            }

            if Instant::now() >= deadline {
                return Err(reject(VerifyFailure::Timeout, observed));
            }
        }
    }
}

fn reject(reason: VerifyFailure, confirmations: u64) -> VerificationError {
    counter!("verifier_outcomes_total", "outcome" => reason.metric_label()).increment(1);
    VerificationError {
        reason,
        confirmations,
    }
}

fn param_for(err: &CalldataError) -> CallParam {
    match err {
        CalldataError::WrongLength(_) | CalldataError::UnknownSelector => CallParam::Selector,
        CalldataError::MalformedSessionId => CallParam::SessionId,
        CalldataError::AmountOverflow => CallParam::Amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calldata::encode_call;
    use crate::ledger::mock::ScriptedLedger;
    use crate::ledger::LedgerError;

    const CONTRACT: &str = "0x00000000000000000000000000000000000000aa";
    const WALLET: &str = "0xabcdef0123456789abcdef0123456789abcdef01";
    const OTHER: &str = "0x1111111111111111111111111111111111111111";
    const TX: &str = "0xc3d224630a6f59856302e592d329953df0b2a057693906976e5019df6347320d";

    fn addr(value: &str) -> WalletAddress {
        WalletAddress::parse(value).unwrap()
    }

    fn session() -> SessionId {
        SessionId::parse("cs_1").unwrap()
    }

    fn amount() -> TokenAmount {
        TokenAmount::parse_decimal("1.5").unwrap()
    }

    fn config() -> ChainConfig {
        ChainConfig::new("http://ledger.invalid", addr(CONTRACT))
            .with_confirmation_threshold(5)
            .with_poll_interval(Duration::from_millis(1))
            .with_max_wait(Duration::from_millis(100))
    }

    fn summary(from: &str, to: &str, confirmations: u64, input: Vec<u8>) -> TransactionSummary {
        TransactionSummary {
            from: addr(from),
            to: Some(addr(to)),
            input,
            confirmations,
        }
    }

    fn valid_summary(confirmations: u64) -> TransactionSummary {
        summary(
            WALLET,
            CONTRACT,
            confirmations,
            encode_call(&session(), amount()),
        )
    }

    async fn run(
        ledger: Arc<ScriptedLedger>,
        session_id: &SessionId,
        wallet: &str,
        expected: TokenAmount,
    ) -> Result<Verified, VerificationError> {
        let verifier = BlockchainVerifier::new(ledger, config());
        verifier
            .verify(
                &TxHash::parse(TX).unwrap(),
                session_id,
                &addr(wallet),
                expected,
            )
            .await
    }

    #[tokio::test]
    async fn verifies_a_correct_confirmed_transaction() {
        let ledger = Arc::new(ScriptedLedger::confirmed(valid_summary(6)));
        let verdict = run(ledger, &session(), WALLET, amount())
            .await
            .expect("verification succeeds");
        assert_eq!(verdict.confirmations, 6);
    }

    #[tokio::test]
    async fn rejects_wrong_destination_naming_both_addresses() {
        let input = encode_call(&session(), amount());
        let ledger = Arc::new(ScriptedLedger::confirmed(summary(WALLET, OTHER, 6, input)));

        let err = run(ledger, &session(), WALLET, amount()).await.unwrap_err();
        assert!(matches!(
            err.reason,
            VerifyFailure::WrongDestination { .. }
        ));
        assert_eq!(err.confirmations, 6);
        let rendered = err.to_string();
        assert!(rendered.contains(CONTRACT));
        assert!(rendered.contains(OTHER));
    }

    #[tokio::test]
    async fn rejects_wrong_sender() {
        let input = encode_call(&session(), amount());
        let ledger = Arc::new(ScriptedLedger::confirmed(summary(OTHER, CONTRACT, 5, input)));

        let err = run(ledger, &session(), WALLET, amount()).await.unwrap_err();
        assert!(matches!(err.reason, VerifyFailure::WrongSender { .. }));
    }

    #[tokio::test]
    async fn session_and_amount_mismatches_are_distinct() {
        let wrong_session = encode_call(&SessionId::parse("cs_other").unwrap(), amount());
        let ledger = Arc::new(ScriptedLedger::confirmed(summary(
            WALLET,
            CONTRACT,
            5,
            wrong_session,
        )));
        let err = run(ledger, &session(), WALLET, amount()).await.unwrap_err();
        assert_eq!(
            err.reason,
            VerifyFailure::ParamMismatch {
                param: CallParam::SessionId
            }
        );

        let wrong_amount = encode_call(&session(), TokenAmount::from_base_units(1));
        let ledger = Arc::new(ScriptedLedger::confirmed(summary(
            WALLET,
            CONTRACT,
            5,
            wrong_amount,
        )));
        let err = run(ledger, &session(), WALLET, amount()).await.unwrap_err();
        assert_eq!(
            err.reason,
            VerifyFailure::ParamMismatch {
                param: CallParam::Amount
            }
        );
    }

    #[tokio::test]
    async fn rejects_reverted_transactions() {
        let ledger = Arc::new(ScriptedLedger::confirmed(valid_summary(8)));
        ledger.set_status(Ok(ExecutionStatus::Failed));

        let err = run(ledger, &session(), WALLET, amount()).await.unwrap_err();
        assert_eq!(err.reason, VerifyFailure::ExecutionFailed);
        assert_eq!(err.confirmations, 8);
    }

    #[tokio::test]
    async fn unknown_transaction_times_out() {
        let ledger = Arc::new(ScriptedLedger::unknown());
        let err = run(ledger, &session(), WALLET, amount()).await.unwrap_err();
        assert_eq!(err.reason, VerifyFailure::Timeout);
        assert_eq!(err.confirmations, 0);
    }

    #[tokio::test]
    async fn shallow_confirmations_time_out_reporting_depth() {
        let ledger = Arc::new(ScriptedLedger::unknown());
        ledger.set_fallback(Ok(Some(valid_summary(3))));

        let err = run(ledger, &session(), WALLET, amount()).await.unwrap_err();
        assert_eq!(err.reason, VerifyFailure::Timeout);
        assert_eq!(err.confirmations, 3);
    }

    #[tokio::test]
    async fn transient_ledger_errors_are_retried() {
        let ledger = Arc::new(ScriptedLedger::confirmed(valid_summary(5)));
        ledger.push_info(Err(LedgerError::Transport("connection reset".into())));
        ledger.push_info(Ok(None));

        let verdict = run(ledger.clone(), &session(), WALLET, amount())
            .await
            .expect("verification succeeds after retries");
        assert_eq!(verdict.confirmations, 5);
        assert!(ledger.info_calls() >= 3);
    }

    #[tokio::test]
    async fn successful_verdicts_are_cached_per_request_tuple() {
        let ledger = Arc::new(ScriptedLedger::confirmed(valid_summary(6)));
        let verifier = BlockchainVerifier::new(ledger.clone(), config());
        let tx = TxHash::parse(TX).unwrap();

        verifier
            .verify(&tx, &session(), &addr(WALLET), amount())
            .await
            .expect("first verification succeeds");
        let polls = ledger.info_calls();

        verifier
            .verify(&tx, &session(), &addr(WALLET), amount())
            .await
            .expect("second verification succeeds");
        assert_eq!(ledger.info_calls(), polls, "cache hit must not re-poll");

        // A different expected session must not ride the cached verdict.
        let err = verifier
            .verify(
                &tx,
                &SessionId::parse("cs_other").unwrap(),
                &addr(WALLET),
                amount(),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.reason,
            VerifyFailure::ParamMismatch {
                param: CallParam::SessionId
            }
        );
        assert!(ledger.info_calls() > polls);
    }
}
