//! In-memory ledger used by verifier, orchestrator, and API tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use cardrail_domain::model::TxHash;

use super::{ExecutionStatus, LedgerApi, LedgerError, TransactionSummary};

type InfoResult = Result<Option<TransactionSummary>, LedgerError>;

/// Scripted ledger: queued `transaction_info` steps are served in order, then
/// every further poll gets the fallback answer. Execution status is a single
/// switchable response.
pub struct ScriptedLedger {
    steps: Mutex<VecDeque<InfoResult>>,
    fallback: Mutex<InfoResult>,
    status: Mutex<Result<ExecutionStatus, LedgerError>>,
    info_calls: AtomicUsize,
    status_calls: AtomicUsize,
}

impl ScriptedLedger {
    /// A ledger that has never seen the transaction.
    pub fn unknown() -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Ok(None)),
            status: Mutex::new(Ok(ExecutionStatus::Pending)),
            info_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
        }
    }

    /// A ledger that reports the given already-confirmed transaction with a
    /// successful execution status.
    pub fn confirmed(summary: TransactionSummary) -> Self {
        let ledger = Self::unknown();
        *ledger.fallback.lock().expect("mutex poisoned") = Ok(Some(summary));
        *ledger.status.lock().expect("mutex poisoned") = Ok(ExecutionStatus::Success);
        ledger
    }

    /// Queues one `transaction_info` response ahead of the fallback.
    pub fn push_info(&self, step: InfoResult) {
        self.steps.lock().expect("mutex poisoned").push_back(step);
    }

    pub fn set_fallback(&self, result: InfoResult) {
        *self.fallback.lock().expect("mutex poisoned") = result;
    }

    pub fn set_status(&self, status: Result<ExecutionStatus, LedgerError>) {
        *self.status.lock().expect("mutex poisoned") = status;
    }

    pub fn info_calls(&self) -> usize {
        self.info_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerApi for ScriptedLedger {
    async fn transaction_info(
        &self,
        _tx_hash: &TxHash,
    ) -> Result<Option<TransactionSummary>, LedgerError> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(step) = self.steps.lock().expect("mutex poisoned").pop_front() {
            return step;
        }
        self.fallback.lock().expect("mutex poisoned").clone()
    }

    async fn execution_status(&self, _tx_hash: &TxHash) -> Result<ExecutionStatus, LedgerError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.status.lock().expect("mutex poisoned").clone()
    }
}
