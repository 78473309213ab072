//! The fulfillment orchestrator: verification, phase 1 (reserve), phase 2
//! (decrypt → email → consume), and the compensating rollback every phase-2
//! failure funnels through.

use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tracing::{info, warn};

use cardrail_domain::config::ChainConfig;
use cardrail_domain::model::{
    GiftCardRecord, NewPayment, PaymentRecord, SessionId, SessionRecord, TokenAmount, TxHash,
};
use cardrail_domain::storage::{
    BeginPaymentError, FulfillmentStore, GiftCardStore, SessionStore, StorageError,
    TerminalFailure, UserStore,
};
use cardrail_verifier::verify::{BlockchainVerifier, VerificationError};

use crate::email::{EmailDispatcher, GiftCardPayload, PaymentContext};
use crate::vault::{SealedCardSecret, Vault};

/// The inbound "record payment" request, still unvalidated.
#[derive(Debug, Clone)]
pub struct RecordPaymentRequest {
    pub session_id: String,
    pub tx_hash: String,
    pub amount_crypto: String,
    pub token: String,
    pub gift_card_id: Option<i64>,
}

/// Terminal result of a successful run: the payment and session as committed.
#[derive(Debug, Clone)]
pub struct FulfillmentOutcome {
    pub payment: PaymentRecord,
    pub session: SessionRecord,
}

#[derive(Debug, Error)]
pub enum FulfillmentError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    SessionState(String),
    #[error("session not found")]
    SessionNotFound,
    #[error("gift card not found")]
    GiftCardNotFound,
    #[error("gift card unavailable")]
    GiftCardUnavailable,
    #[error("a payment already exists for this session")]
    DuplicatePayment,
    #[error("payment verification failed: {0}")]
    Verification(VerificationError),
    #[error("buyer email address is missing")]
    MissingEmail,
    #[error("gift card decryption failed")]
    Decryption,
    #[error("email delivery failed")]
    EmailDelivery { message: String },
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

/// What went wrong inside phase 2, before the compensating transaction maps
/// it onto a terminal state.
enum Phase2Failure {
    MissingEmail,
    Decryption,
    Email { message: String },
    Unexpected(StorageError),
}

struct ParsedRequest {
    session_id: SessionId,
    tx_hash: TxHash,
    amount: TokenAmount,
    token: String,
    gift_card_id: Option<i64>,
}

pub struct FulfillmentOrchestrator<S> {
    store: S,
    verifier: BlockchainVerifier,
    vault: Arc<dyn Vault>,
    mailer: Arc<dyn EmailDispatcher>,
    config: ChainConfig,
}

impl<S> FulfillmentOrchestrator<S>
where
    S: SessionStore + UserStore + GiftCardStore + FulfillmentStore,
{
    pub fn new(
        store: S,
        verifier: BlockchainVerifier,
        vault: Arc<dyn Vault>,
        mailer: Arc<dyn EmailDispatcher>,
        config: ChainConfig,
    ) -> Self {
        Self {
            store,
            verifier,
            vault,
            mailer,
            config,
        }
    }

    pub async fn record_payment(
        &self,
        request: RecordPaymentRequest,
    ) -> Result<FulfillmentOutcome, FulfillmentError> {
        let parsed = self.validate(&request)?;

        // One payment per session. The unique index inside phase 1 closes
        // the race this pre-check leaves open.
        if self
            .store
            .find_payment_by_session(&parsed.session_id)
            .await?
            .is_some()
        {
            counter!("fulfillment_outcomes_total", "outcome" => "duplicate").increment(1);
            return Err(FulfillmentError::DuplicatePayment);
        }

        let session = self
            .store
            .check_and_expire_session(&parsed.session_id)
            .await?
            .ok_or(FulfillmentError::SessionNotFound)?;
        if !session.status.is_payable() {
            return Err(FulfillmentError::SessionState(format!(
                "session is {}",
                session.status
            )));
        }

        let wallet = self
            .store
            .find_wallet(&session.wallet_id)
            .await?
            .ok_or_else(|| {
                FulfillmentError::Storage(StorageError::Database(format!(
                    "wallet `{}` referenced by session `{}` is missing",
                    session.wallet_id, session.id
                )))
            })?;

        // Nothing is persisted until verification passes, so a failed or
        // timed-out verification is always safe to retry.
        let verified = self
            .verifier
            .verify(
                &parsed.tx_hash,
                &parsed.session_id,
                &wallet.address,
                parsed.amount,
            )
            .await
            .map_err(|err| {
                counter!("fulfillment_outcomes_total", "outcome" => "verification_failed")
                    .increment(1);
                FulfillmentError::Verification(err)
            })?;
        info!(
            session_id = %parsed.session_id,
            tx_hash = %parsed.tx_hash,
            confirmations = verified.confirmations,
            "payment transaction verified"
        );

        match parsed.gift_card_id {
            Some(card_id) => {
                let card = self
                    .store
                    .find_gift_card(card_id)
                    .await?
                    .ok_or(FulfillmentError::GiftCardNotFound)?;
                if !card.is_reservable() {
                    counter!("fulfillment_outcomes_total", "outcome" => "inventory_unavailable")
                        .increment(1);
                    return Err(FulfillmentError::GiftCardUnavailable);
                }
                self.fulfill_with_card(&parsed, &session, card).await
            }
            None => self.record_direct(&parsed, &session).await,
        }
    }

    fn validate(&self, request: &RecordPaymentRequest) -> Result<ParsedRequest, FulfillmentError> {
        let session_id = SessionId::parse(&request.session_id)
            .map_err(|err| FulfillmentError::Validation(format!("sessionId: {err}")))?;
        let tx_hash = TxHash::parse(&request.tx_hash)
            .map_err(|err| FulfillmentError::Validation(format!("txHash: {err}")))?;
        let amount = TokenAmount::parse_decimal(&request.amount_crypto)
            .map_err(|err| FulfillmentError::Validation(format!("amountCrypto: {err}")))?;
        if amount.base_units() == 0 {
            return Err(FulfillmentError::Validation(
                "amountCrypto must be positive".into(),
            ));
        }
        let token = request.token.trim().to_ascii_uppercase();
        if !self.config.supports_token(&token) {
            return Err(FulfillmentError::Validation(format!(
                "token `{token}` is not accepted"
            )));
        }

        Ok(ParsedRequest {
            session_id,
            tx_hash,
            amount,
            token,
            gift_card_id: request.gift_card_id,
        })
    }

    async fn record_direct(
        &self,
        parsed: &ParsedRequest,
        session: &SessionRecord,
    ) -> Result<FulfillmentOutcome, FulfillmentError> {
        let payment = self
            .store
            .record_direct_payment(new_payment(parsed, session, None))
            .await
            .map_err(map_begin_error)?;
        counter!("fulfillment_outcomes_total", "outcome" => "direct").increment(1);
        info!(
            payment_id = payment.id,
            session_id = %payment.session_id,
            "payment recorded without gift card"
        );
        self.reload_outcome(&payment.session_id).await
    }

    async fn fulfill_with_card(
        &self,
        parsed: &ParsedRequest,
        session: &SessionRecord,
        card: GiftCardRecord,
    ) -> Result<FulfillmentOutcome, FulfillmentError> {
        let payment = self
            .store
            .begin_fulfillment(new_payment(parsed, session, Some(card.id)))
            .await
            .map_err(map_begin_error)?;
        info!(
            payment_id = payment.id,
            session_id = %payment.session_id,
            gift_card_id = card.id,
            "payment recorded, gift card reserved"
        );

        if let Err(failure) = self.deliver(&payment, session, &card).await {
            return Err(self.fail_fulfillment(&payment, card.id, failure).await);
        }

        if let Err(err) = self
            .store
            .complete_fulfillment(payment.id, &payment.session_id, card.id)
            .await
        {
            warn!(
                payment_id = payment.id,
                error = %err,
                "consuming transaction failed"
            );
            return Err(self
                .fail_fulfillment(&payment, card.id, Phase2Failure::Unexpected(err))
                .await);
        }

        counter!("fulfillment_outcomes_total", "outcome" => "fulfilled").increment(1);
        info!(
            payment_id = payment.id,
            session_id = %payment.session_id,
            gift_card_id = card.id,
            "gift card consumed after confirmed delivery"
        );
        self.reload_outcome(&payment.session_id).await
    }

    /// Phase-2 side effects up to (not including) the consuming transaction.
    /// Secrets stay inside `Redacted` wrappers; only ids are logged.
    async fn deliver(
        &self,
        payment: &PaymentRecord,
        session: &SessionRecord,
        card: &GiftCardRecord,
    ) -> Result<(), Phase2Failure> {
        let user = self
            .store
            .find_user(&session.user_id)
            .await
            .map_err(Phase2Failure::Unexpected)?;
        let Some(email) = user
            .and_then(|u| u.email)
            .filter(|email| !email.trim().is_empty())
        else {
            warn!(
                payment_id = payment.id,
                user_id = %session.user_id,
                "buyer has no email address on file"
            );
            return Err(Phase2Failure::MissingEmail);
        };

        let secret = self
            .vault
            .decrypt_card(&SealedCardSecret::from_card(card))
            .await
            .map_err(|err| {
                warn!(
                    payment_id = payment.id,
                    gift_card_id = card.id,
                    error = %err,
                    "gift card decryption failed"
                );
                Phase2Failure::Decryption
            })?;

        let payload = GiftCardPayload {
            store: card.store.clone(),
            currency: card.currency.clone(),
            amount_usd_cents: card.amount_usd_cents,
            number: secret.number,
            pin: secret.pin,
        };
        let context = PaymentContext {
            payment_id: payment.id,
            session_id: payment.session_id.as_str().to_owned(),
            reference: payment.reference.clone(),
            tx_hash: payment.tx_hash.as_str().to_owned(),
        };

        match self.mailer.send(&email, &payload, &context).await {
            Ok(true) => {
                info!(payment_id = payment.id, "redemption email delivered");
                Ok(())
            }
            Ok(false) => Err(Phase2Failure::Email {
                message: "dispatcher did not confirm delivery".into(),
            }),
            Err(err) => Err(Phase2Failure::Email {
                message: err.to_string(),
            }),
        }
    }

    /// The single compensation funnel: every phase-2 failure releases the
    /// reservation and flips payment + session to the terminal state in one
    /// transaction, then surfaces the original error.
    async fn fail_fulfillment(
        &self,
        payment: &PaymentRecord,
        gift_card_id: i64,
        failure: Phase2Failure,
    ) -> FulfillmentError {
        let terminal = match &failure {
            Phase2Failure::Email { .. } => TerminalFailure::EmailFailed,
            _ => TerminalFailure::Failed,
        };
        if let Err(err) = self
            .store
            .compensate_fulfillment(
                payment.id,
                &payment.session_id,
                Some(gift_card_id),
                terminal,
            )
            .await
        {
            // The original failure still wins; a stuck reservation here needs
            // operator attention.
            warn!(
                payment_id = payment.id,
                session_id = %payment.session_id,
                error = %err,
                "compensating transaction failed"
            );
        }

        let (label, error) = match failure {
            Phase2Failure::MissingEmail => ("missing_email", FulfillmentError::MissingEmail),
            Phase2Failure::Decryption => ("decryption_failed", FulfillmentError::Decryption),
            Phase2Failure::Email { message } => {
                ("email_failed", FulfillmentError::EmailDelivery { message })
            }
            Phase2Failure::Unexpected(err) => ("unexpected", FulfillmentError::Storage(err)),
        };
        counter!("fulfillment_outcomes_total", "outcome" => label).increment(1);
        error
    }

    async fn reload_outcome(
        &self,
        session_id: &SessionId,
    ) -> Result<FulfillmentOutcome, FulfillmentError> {
        let payment = self
            .store
            .find_payment_by_session(session_id)
            .await?
            .ok_or_else(|| StorageError::Database("payment vanished after commit".into()))?;
        let session = self
            .store
            .find_session(session_id)
            .await?
            .ok_or_else(|| StorageError::Database("session vanished after commit".into()))?;
        Ok(FulfillmentOutcome { payment, session })
    }
}

fn new_payment(
    parsed: &ParsedRequest,
    session: &SessionRecord,
    gift_card_id: Option<i64>,
) -> NewPayment {
    NewPayment {
        session_id: parsed.session_id.clone(),
        wallet_id: session.wallet_id.clone(),
        user_id: session.user_id.clone(),
        amount: parsed.amount,
        token: parsed.token.clone(),
        tx_hash: parsed.tx_hash.clone(),
        gift_card_id,
    }
}

fn map_begin_error(err: BeginPaymentError) -> FulfillmentError {
    match err {
        BeginPaymentError::DuplicatePayment => FulfillmentError::DuplicatePayment,
        BeginPaymentError::SessionNotPayable => {
            FulfillmentError::SessionState("session is no longer payable".into())
        }
        BeginPaymentError::GiftCardNotFound => FulfillmentError::GiftCardNotFound,
        BeginPaymentError::GiftCardUnavailable => FulfillmentError::GiftCardUnavailable,
        BeginPaymentError::Storage(err) => FulfillmentError::Storage(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use cardrail_domain::model::{
        NewGiftCard, NewSession, PaymentStatus, SessionStatus, UserRecord, WalletAddress,
        WalletRecord,
    };
    use cardrail_storage::SeaOrmStorage;
    use cardrail_verifier::calldata::encode_call;
    use cardrail_verifier::ledger::mock::ScriptedLedger;
    use cardrail_verifier::ledger::TransactionSummary;
    use cardrail_verifier::verify::{CallParam, VerifyFailure};

    use crate::mock::{MailOutcome, MockMailer, MockVault};

    const CONTRACT: &str = "0x00000000000000000000000000000000000000aa";
    const WALLET: &str = "0xabcdef0123456789abcdef0123456789abcdef01";
    const TX: &str = "0xc3d224630a6f59856302e592d329953df0b2a057693906976e5019df6347320d";

    struct Harness {
        storage: SeaOrmStorage,
        mailer: Arc<MockMailer>,
        orchestrator: FulfillmentOrchestrator<SeaOrmStorage>,
    }

    fn chain_config() -> ChainConfig {
        ChainConfig::new(
            "http://ledger.invalid",
            WalletAddress::parse(CONTRACT).unwrap(),
        )
        .with_poll_interval(Duration::from_millis(1))
        .with_max_wait(Duration::from_millis(100))
    }

    fn confirmed_ledger() -> Arc<ScriptedLedger> {
        let session = SessionId::parse("cs_1").unwrap();
        let amount = TokenAmount::parse_decimal("1.5").unwrap();
        Arc::new(ScriptedLedger::confirmed(TransactionSummary {
            from: WalletAddress::parse(WALLET).unwrap(),
            to: Some(WalletAddress::parse(CONTRACT).unwrap()),
            input: encode_call(&session, amount),
            confirmations: 6,
        }))
    }

    async fn harness(mail: MailOutcome, vault: MockVault) -> Harness {
        let storage = SeaOrmStorage::connect("sqlite::memory:")
            .await
            .expect("storage inits");
        let mailer = Arc::new(MockMailer::with_outcome(mail));
        let verifier = BlockchainVerifier::new(confirmed_ledger(), chain_config());
        let orchestrator = FulfillmentOrchestrator::new(
            storage.clone(),
            verifier,
            Arc::new(vault),
            mailer.clone(),
            chain_config(),
        );
        Harness {
            storage,
            mailer,
            orchestrator,
        }
    }

    async fn seed(harness: &Harness, email: Option<&str>) -> i64 {
        harness
            .storage
            .insert_user(UserRecord {
                id: "u1".into(),
                email: email.map(str::to_owned),
            })
            .await
            .unwrap();
        harness
            .storage
            .insert_wallet(WalletRecord {
                id: "w1".into(),
                address: WalletAddress::parse(WALLET).unwrap(),
                user_id: "u1".into(),
            })
            .await
            .unwrap();
        harness
            .storage
            .insert_session(NewSession {
                id: SessionId::parse("cs_1").unwrap(),
                store: "acme".into(),
                amount_usd_cents: 2_500,
                currency: "USD".into(),
                wallet_id: "w1".into(),
                user_id: "u1".into(),
                expires_at: chrono::Utc::now() + chrono::Duration::minutes(30),
            })
            .await
            .unwrap();
        harness
            .storage
            .insert_gift_card(NewGiftCard {
                store: "acme".into(),
                currency: "USD".into(),
                amount_usd_cents: 2_500,
                encrypted_number: "b64:number".into(),
                encrypted_pin: "b64:pin".into(),
                iv: "b64:iv".into(),
                tag: "b64:tag".into(),
            })
            .await
            .unwrap()
            .id
    }

    fn request(gift_card_id: Option<i64>) -> RecordPaymentRequest {
        RecordPaymentRequest {
            session_id: "cs_1".into(),
            tx_hash: TX.into(),
            amount_crypto: "1.5".into(),
            token: "DAI".into(),
            gift_card_id,
        }
    }

    async fn card_state(harness: &Harness, card_id: i64) -> (bool, Option<i64>) {
        let card = harness
            .storage
            .find_gift_card(card_id)
            .await
            .unwrap()
            .unwrap();
        (card.active, card.reserved_by_payment_id)
    }

    async fn stored_statuses(harness: &Harness) -> (PaymentStatus, SessionStatus) {
        let session_id = SessionId::parse("cs_1").unwrap();
        let payment = harness
            .storage
            .find_payment_by_session(&session_id)
            .await
            .unwrap()
            .expect("payment row exists");
        let session = harness
            .storage
            .find_session(&session_id)
            .await
            .unwrap()
            .unwrap();
        (payment.status, session.status)
    }

    #[tokio::test]
    async fn confirmed_delivery_consumes_the_card() {
        let harness = harness(MailOutcome::Accepted, MockVault::default()).await;
        let card_id = seed(&harness, Some("buyer@example.com")).await;

        let outcome = harness
            .orchestrator
            .record_payment(request(Some(card_id)))
            .await
            .expect("fulfillment succeeds");
        assert_eq!(outcome.payment.status, PaymentStatus::Succeeded);
        assert_eq!(outcome.session.status, SessionStatus::Fulfilled);
        assert_eq!(outcome.session.gift_card_id, Some(card_id));

        assert_eq!(card_state(&harness, card_id).await, (false, None));

        let sent = harness.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "buyer@example.com");
        assert_eq!(sent[0].number, "b64:number");
        assert_eq!(sent[0].reference, outcome.payment.reference);
    }

    #[tokio::test]
    async fn rejected_delivery_releases_the_card_as_email_failed() {
        let harness = harness(MailOutcome::Rejected, MockVault::default()).await;
        let card_id = seed(&harness, Some("buyer@example.com")).await;

        let err = harness
            .orchestrator
            .record_payment(request(Some(card_id)))
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::EmailDelivery { .. }));

        assert_eq!(
            stored_statuses(&harness).await,
            (PaymentStatus::EmailFailed, SessionStatus::EmailFailed)
        );
        assert_eq!(card_state(&harness, card_id).await, (true, None));
    }

    #[tokio::test]
    async fn transport_errors_count_as_unconfirmed_delivery() {
        let harness = harness(MailOutcome::TransportError, MockVault::default()).await;
        let card_id = seed(&harness, Some("buyer@example.com")).await;

        let err = harness
            .orchestrator
            .record_payment(request(Some(card_id)))
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::EmailDelivery { .. }));
        assert_eq!(card_state(&harness, card_id).await, (true, None));
    }

    #[tokio::test]
    async fn missing_buyer_email_rolls_back_to_failed() {
        let harness = harness(MailOutcome::Accepted, MockVault::default()).await;
        let card_id = seed(&harness, None).await;

        let err = harness
            .orchestrator
            .record_payment(request(Some(card_id)))
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::MissingEmail));

        assert_eq!(
            stored_statuses(&harness).await,
            (PaymentStatus::Failed, SessionStatus::Failed)
        );
        assert_eq!(card_state(&harness, card_id).await, (true, None));
        assert!(harness.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn decryption_failure_rolls_back_to_failed() {
        let harness = harness(MailOutcome::Accepted, MockVault::rejecting()).await;
        let card_id = seed(&harness, Some("buyer@example.com")).await;

        let err = harness
            .orchestrator
            .record_payment(request(Some(card_id)))
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::Decryption));

        assert_eq!(
            stored_statuses(&harness).await,
            (PaymentStatus::Failed, SessionStatus::Failed)
        );
        assert_eq!(card_state(&harness, card_id).await, (true, None));
        assert!(harness.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn second_request_for_a_session_is_a_conflict() {
        let harness = harness(MailOutcome::Accepted, MockVault::default()).await;
        let card_id = seed(&harness, Some("buyer@example.com")).await;

        harness
            .orchestrator
            .record_payment(request(Some(card_id)))
            .await
            .expect("first run succeeds");
        let err = harness
            .orchestrator
            .record_payment(request(Some(card_id)))
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::DuplicatePayment));

        // Still consumed exactly once.
        assert_eq!(card_state(&harness, card_id).await, (false, None));
        assert_eq!(harness.mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn no_gift_card_uses_the_direct_path() {
        let harness = harness(MailOutcome::Accepted, MockVault::default()).await;
        seed(&harness, Some("buyer@example.com")).await;

        let outcome = harness
            .orchestrator
            .record_payment(request(None))
            .await
            .expect("direct path succeeds");
        assert_eq!(outcome.payment.status, PaymentStatus::Succeeded);
        assert_eq!(outcome.session.status, SessionStatus::Paid);
        assert!(harness.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn verification_failure_persists_nothing() {
        let harness = harness(MailOutcome::Accepted, MockVault::default()).await;
        let card_id = seed(&harness, Some("buyer@example.com")).await;

        let mut wrong_amount = request(Some(card_id));
        wrong_amount.amount_crypto = "2".into();
        let err = harness
            .orchestrator
            .record_payment(wrong_amount)
            .await
            .unwrap_err();
        let FulfillmentError::Verification(verification) = err else {
            panic!("expected verification failure");
        };
        assert_eq!(
            verification.reason,
            VerifyFailure::ParamMismatch {
                param: CallParam::Amount
            }
        );

        let session_id = SessionId::parse("cs_1").unwrap();
        assert!(harness
            .storage
            .find_payment_by_session(&session_id)
            .await
            .unwrap()
            .is_none());
        let session = harness
            .storage
            .find_session(&session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.status, SessionStatus::Pending);
        assert_eq!(card_state(&harness, card_id).await, (true, None));
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let harness = harness(MailOutcome::Accepted, MockVault::default()).await;

        let err = harness
            .orchestrator
            .record_payment(request(None))
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::SessionNotFound));
    }

    #[tokio::test]
    async fn expired_session_is_a_session_state_error() {
        let harness = harness(MailOutcome::Accepted, MockVault::default()).await;
        seed(&harness, Some("buyer@example.com")).await;
        harness
            .storage
            .insert_session(NewSession {
                id: SessionId::parse("cs_2").unwrap(),
                store: "acme".into(),
                amount_usd_cents: 2_500,
                currency: "USD".into(),
                wallet_id: "w1".into(),
                user_id: "u1".into(),
                expires_at: chrono::Utc::now() - chrono::Duration::minutes(5),
            })
            .await
            .unwrap();

        let mut overdue = request(None);
        overdue.session_id = "cs_2".into();
        let err = harness
            .orchestrator
            .record_payment(overdue)
            .await
            .unwrap_err();
        let FulfillmentError::SessionState(message) = err else {
            panic!("expected session-state error");
        };
        assert!(message.contains("expired"));
    }

    #[tokio::test]
    async fn held_card_is_unavailable_without_writes() {
        let harness = harness(MailOutcome::Accepted, MockVault::default()).await;
        let card_id = seed(&harness, Some("buyer@example.com")).await;
        // Simulate a rival reservation.
        let rival = harness
            .storage
            .insert_session(NewSession {
                id: SessionId::parse("cs_rival").unwrap(),
                store: "acme".into(),
                amount_usd_cents: 2_500,
                currency: "USD".into(),
                wallet_id: "w1".into(),
                user_id: "u1".into(),
                expires_at: chrono::Utc::now() + chrono::Duration::minutes(30),
            })
            .await
            .unwrap();
        harness
            .storage
            .begin_fulfillment(NewPayment {
                session_id: rival.id,
                wallet_id: "w1".into(),
                user_id: "u1".into(),
                amount: TokenAmount::parse_decimal("1.5").unwrap(),
                token: "DAI".into(),
                tx_hash: TxHash::parse(TX).unwrap(),
                gift_card_id: Some(card_id),
            })
            .await
            .unwrap();

        let err = harness
            .orchestrator
            .record_payment(request(Some(card_id)))
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::GiftCardUnavailable));

        let session_id = SessionId::parse("cs_1").unwrap();
        assert!(harness
            .storage
            .find_payment_by_session(&session_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn unsupported_token_fails_validation() {
        let harness = harness(MailOutcome::Accepted, MockVault::default()).await;
        seed(&harness, Some("buyer@example.com")).await;

        let mut bad_token = request(None);
        bad_token.token = "DOGE".into();
        let err = harness
            .orchestrator
            .record_payment(bad_token)
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::Validation(_)));
    }
}
