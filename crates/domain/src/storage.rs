//! Storage contracts implemented by the SeaORM adapters in
//! `cardrail_storage`. The fulfillment orchestrator is written against these
//! traits so tests can drive it with any conforming store.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{
    GiftCardRecord, NewGiftCard, NewPayment, NewSession, PaymentRecord, SessionId, SessionRecord,
    UserRecord, WalletRecord,
};

/// Common result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
}

impl StorageError {
    pub fn from_source(err: impl std::fmt::Display) -> Self {
        Self::Database(err.to_string())
    }
}

/// Failures of the phase-1 transaction (payment insert + reservation +
/// session flip). Everything here leaves the store untouched: the whole
/// transaction rolled back.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BeginPaymentError {
    #[error("a payment already exists for this session")]
    DuplicatePayment,
    #[error("session is no longer payable")]
    SessionNotPayable,
    #[error("gift card not found")]
    GiftCardNotFound,
    #[error("gift card is not available for reservation")]
    GiftCardUnavailable,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Terminal failure states a compensating transaction can leave behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalFailure {
    Failed,
    EmailFailed,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, session: NewSession) -> StorageResult<SessionRecord>;

    async fn find_session(&self, id: &SessionId) -> StorageResult<Option<SessionRecord>>;

    /// Returns the session, first flipping a pending-but-overdue row to
    /// `expired` so callers always observe the effective state.
    async fn check_and_expire_session(
        &self,
        id: &SessionId,
    ) -> StorageResult<Option<SessionRecord>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: UserRecord) -> StorageResult<()>;

    async fn find_user(&self, id: &str) -> StorageResult<Option<UserRecord>>;

    async fn insert_wallet(&self, wallet: WalletRecord) -> StorageResult<()>;

    async fn find_wallet(&self, id: &str) -> StorageResult<Option<WalletRecord>>;
}

#[async_trait]
pub trait GiftCardStore: Send + Sync {
    async fn insert_gift_card(&self, card: NewGiftCard) -> StorageResult<GiftCardRecord>;

    async fn find_gift_card(&self, id: i64) -> StorageResult<Option<GiftCardRecord>>;

    /// Clears the reservation held by `payment_id`, restoring eligibility.
    /// Returns whether a reservation was actually released.
    async fn release_gift_card(&self, id: i64, payment_id: i64) -> StorageResult<bool>;

    /// Retires the card held by `payment_id`: `active` becomes false and the
    /// reservation is cleared. Returns whether the card was consumed.
    async fn consume_gift_card(&self, id: i64, payment_id: i64) -> StorageResult<bool>;
}

#[async_trait]
pub trait FulfillmentStore: Send + Sync {
    async fn find_payment_by_session(
        &self,
        session_id: &SessionId,
    ) -> StorageResult<Option<PaymentRecord>>;

    /// Phase 1: inside one transaction, inserts the payment row
    /// (`confirming`), reserves the gift card, and flips the session to
    /// `paid`. The transaction is the sole serialization mechanism for
    /// concurrent reservation attempts on the same card.
    async fn begin_fulfillment(&self, payment: NewPayment)
        -> Result<PaymentRecord, BeginPaymentError>;

    /// Direct path for payments without a gift card: one transaction creating
    /// the payment as `succeeded` and flipping the session to `paid`.
    async fn record_direct_payment(
        &self,
        payment: NewPayment,
    ) -> Result<PaymentRecord, BeginPaymentError>;

    /// The single inventory-consuming transaction, gated on confirmed email
    /// delivery: card retired, payment `succeeded`, session `fulfilled`.
    async fn complete_fulfillment(
        &self,
        payment_id: i64,
        session_id: &SessionId,
        gift_card_id: i64,
    ) -> StorageResult<()>;

    /// Compensating transaction shared by every phase-2 failure branch:
    /// releases the reservation (if any) and moves payment and session to the
    /// given terminal state together.
    async fn compensate_fulfillment(
        &self,
        payment_id: i64,
        session_id: &SessionId,
        gift_card_id: Option<i64>,
        terminal: TerminalFailure,
    ) -> StorageResult<()>;
}
