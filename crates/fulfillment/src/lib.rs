//! The two-phase fulfillment protocol: reserve inventory, perform the
//! irreversible email delivery exactly once, and only then consume the card,
//! with a single compensating transaction behind every failure branch.

pub mod email;
pub mod mock;
pub mod orchestrator;
pub mod vault;

pub use email::{EmailDispatcher, EmailError, GiftCardPayload, HttpEmailDispatcher, PaymentContext};
pub use orchestrator::{
    FulfillmentError, FulfillmentOrchestrator, FulfillmentOutcome, RecordPaymentRequest,
};
pub use vault::{CardSecret, HttpVaultClient, Redacted, SealedCardSecret, Vault, VaultError};
