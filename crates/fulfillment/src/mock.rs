//! In-memory collaborators for orchestrator and API tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::email::{EmailDispatcher, EmailError, GiftCardPayload, PaymentContext};
use crate::vault::{CardSecret, Redacted, SealedCardSecret, Vault, VaultError};

/// Vault stand-in that "decrypts" by echoing the ciphertext fields back, or
/// rejects everything when told to.
#[derive(Default)]
pub struct MockVault {
    reject: Mutex<bool>,
    calls: AtomicUsize,
}

impl MockVault {
    pub fn rejecting() -> Self {
        let vault = Self::default();
        *vault.reject.lock().expect("mutex poisoned") = true;
        vault
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Vault for MockVault {
    async fn decrypt_card(&self, sealed: &SealedCardSecret) -> Result<CardSecret, VaultError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.reject.lock().expect("mutex poisoned") {
            return Err(VaultError::Rejected);
        }
        Ok(CardSecret {
            number: Redacted::new(sealed.encrypted_number.clone()),
            pin: Redacted::new(sealed.encrypted_pin.clone()),
        })
    }
}

/// What the mock dispatcher should do with the next send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailOutcome {
    Accepted,
    Rejected,
    TransportError,
}

/// A sent email as the mock recorded it.
#[derive(Debug, Clone)]
pub struct SentEmail {
    pub recipient: String,
    pub session_id: String,
    pub reference: String,
    pub number: String,
}

#[derive(Default)]
pub struct MockMailer {
    outcome: Mutex<Option<MailOutcome>>,
    sent: Mutex<Vec<SentEmail>>,
}

impl MockMailer {
    pub fn with_outcome(outcome: MailOutcome) -> Self {
        let mailer = Self::default();
        *mailer.outcome.lock().expect("mutex poisoned") = Some(outcome);
        mailer
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().expect("mutex poisoned").clone()
    }
}

#[async_trait]
impl EmailDispatcher for MockMailer {
    async fn send(
        &self,
        recipient: &str,
        card: &GiftCardPayload,
        context: &PaymentContext,
    ) -> Result<bool, EmailError> {
        let outcome = self
            .outcome
            .lock()
            .expect("mutex poisoned")
            .unwrap_or(MailOutcome::Accepted);
        match outcome {
            MailOutcome::TransportError => {
                Err(EmailError::Transport("connection refused".into()))
            }
            MailOutcome::Rejected => Ok(false),
            MailOutcome::Accepted => {
                self.sent.lock().expect("mutex poisoned").push(SentEmail {
                    recipient: recipient.to_owned(),
                    session_id: context.session_id.clone(),
                    reference: context.reference.clone(),
                    number: card.number.expose().to_owned(),
                });
                Ok(true)
            }
        }
    }
}
