//! Data structures and validated identifiers shared by the API, verifier,
//! and fulfillment crates.

use std::fmt;

use chrono::{DateTime, Utc};
use hex::encode as hex_encode;
use sha3::{Digest, Sha3_256};
use strum_macros::{AsRefStr, Display};
use thiserror::Error;

/// Maximum length of an externally supplied checkout session id. The bound
/// exists because the id must pack into a single 32-byte call parameter.
pub const SESSION_ID_MAX_LENGTH: usize = 32;

/// Errors emitted when user-supplied session ids fail validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionIdFormatError {
    #[error("session id must be between 1 and {SESSION_ID_MAX_LENGTH} characters")]
    WrongLength,
    #[error("session id contains characters outside [A-Za-z0-9_-]")]
    InvalidCharacter,
}

/// Identifier of a checkout session, as minted by the checkout service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn parse(id: &str) -> Result<Self, SessionIdFormatError> {
        if id.is_empty() || id.len() > SESSION_ID_MAX_LENGTH {
            return Err(SessionIdFormatError::WrongLength);
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(SessionIdFormatError::InvalidCharacter);
        }
        Ok(Self(id.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors emitted when hex-encoded chain identifiers fail validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HexIdFormatError {
    #[error("missing 0x prefix")]
    MissingPrefix,
    #[error("expected {expected} hex characters, got {actual}")]
    WrongLength { expected: usize, actual: usize },
    #[error("contains non-hex characters")]
    NonHex,
}

fn validate_hex_id(value: &str, hex_len: usize) -> Result<String, HexIdFormatError> {
    let body = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or(HexIdFormatError::MissingPrefix)?;
    if body.len() != hex_len {
        return Err(HexIdFormatError::WrongLength {
            expected: hex_len,
            actual: body.len(),
        });
    }
    if !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(HexIdFormatError::NonHex);
    }
    Ok(format!("0x{}", body.to_ascii_lowercase()))
}

/// A 20-byte chain account address. Canonicalized to lowercase at parse time
/// so every downstream comparison is a plain (case-insensitive) equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WalletAddress(String);

impl WalletAddress {
    pub fn parse(address: &str) -> Result<Self, HexIdFormatError> {
        validate_hex_id(address, 40).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A 32-byte transaction hash, lowercase-canonicalized like [`WalletAddress`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxHash(String);

impl TxHash {
    pub fn parse(hash: &str) -> Result<Self, HexIdFormatError> {
        validate_hex_id(hash, 64).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Number of decimals in a token's base-unit representation.
pub const TOKEN_DECIMALS: u32 = 18;

/// Errors emitted when a decimal token amount fails to parse.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AmountFormatError {
    #[error("amount is empty")]
    Empty,
    #[error("amount contains invalid characters")]
    InvalidDigit,
    #[error("amount has more than {TOKEN_DECIMALS} decimal places")]
    TooManyDecimals,
    #[error("amount exceeds the representable range")]
    Overflow,
}

/// A token amount in integer base units ({18}-decimal fixed point). All
/// monetary arithmetic and comparison happens on this exact representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(u128);

impl TokenAmount {
    pub fn from_base_units(units: u128) -> Self {
        Self(units)
    }

    pub fn base_units(&self) -> u128 {
        self.0
    }

    /// Parses a decimal string such as `"1.5"` into exact base units.
    pub fn parse_decimal(value: &str) -> Result<Self, AmountFormatError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(AmountFormatError::Empty);
        }
        let (integer, fraction) = match value.split_once('.') {
            Some((i, f)) => (i, f),
            None => (value, ""),
        };
        if integer.is_empty() && fraction.is_empty() {
            return Err(AmountFormatError::Empty);
        }
        if !integer.chars().all(|c| c.is_ascii_digit())
            || !fraction.chars().all(|c| c.is_ascii_digit())
        {
            return Err(AmountFormatError::InvalidDigit);
        }
        if fraction.len() > TOKEN_DECIMALS as usize {
            return Err(AmountFormatError::TooManyDecimals);
        }

        let scale = 10u128.pow(TOKEN_DECIMALS);
        let whole: u128 = if integer.is_empty() {
            0
        } else {
            integer.parse().map_err(|_| AmountFormatError::Overflow)?
        };
        let frac_units: u128 = if fraction.is_empty() {
            0
        } else {
            let parsed: u128 = fraction.parse().map_err(|_| AmountFormatError::Overflow)?;
            parsed * 10u128.pow(TOKEN_DECIMALS - fraction.len() as u32)
        };

        whole
            .checked_mul(scale)
            .and_then(|units| units.checked_add(frac_units))
            .map(Self)
            .ok_or(AmountFormatError::Overflow)
    }

    /// Renders the amount back as a decimal string with trailing zeros
    /// trimmed, e.g. `1_500_000_000_000_000_000` → `"1.5"`.
    pub fn format_decimal(&self) -> String {
        let scale = 10u128.pow(TOKEN_DECIMALS);
        let whole = self.0 / scale;
        let frac = self.0 % scale;
        if frac == 0 {
            return whole.to_string();
        }
        let frac = format!("{:0width$}", frac, width = TOKEN_DECIMALS as usize);
        format!("{}.{}", whole, frac.trim_end_matches('0'))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_decimal())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Paid,
    Fulfilled,
    Failed,
    EmailFailed,
    Expired,
}

impl SessionStatus {
    /// A session accepts a payment only while pending.
    pub fn is_payable(&self) -> bool {
        matches!(self, SessionStatus::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    Confirming,
    Succeeded,
    Failed,
    EmailFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: SessionId,
    pub store: String,
    pub amount_usd_cents: i64,
    pub currency: String,
    pub status: SessionStatus,
    pub wallet_id: String,
    pub user_id: String,
    pub gift_card_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub id: SessionId,
    pub store: String,
    pub amount_usd_cents: i64,
    pub currency: String,
    pub wallet_id: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecord {
    pub id: i64,
    pub session_id: SessionId,
    pub wallet_id: String,
    pub user_id: String,
    pub amount: TokenAmount,
    pub token: String,
    pub tx_hash: TxHash,
    pub reference: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub session_id: SessionId,
    pub wallet_id: String,
    pub user_id: String,
    pub amount: TokenAmount,
    pub token: String,
    pub tx_hash: TxHash,
    pub gift_card_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GiftCardRecord {
    pub id: i64,
    pub store: String,
    pub currency: String,
    pub amount_usd_cents: i64,
    pub encrypted_number: String,
    pub encrypted_pin: String,
    pub iv: String,
    pub tag: String,
    pub active: bool,
    pub reserved_by_payment_id: Option<i64>,
    pub reserved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl GiftCardRecord {
    /// A card is reservable iff it is active and nobody holds it.
    pub fn is_reservable(&self) -> bool {
        self.active && self.reserved_by_payment_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGiftCard {
    pub store: String,
    pub currency: String,
    pub amount_usd_cents: i64,
    pub encrypted_number: String,
    pub encrypted_pin: String,
    pub iv: String,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletRecord {
    pub id: String,
    pub address: WalletAddress,
    pub user_id: String,
}

/// Derives a deterministic SHA3-256 support reference for a payment from its
/// session id and transaction hash. Surfaced to support staff and in the
/// delivery email context instead of raw row ids.
pub fn derive_payment_reference(session_id: &SessionId, tx_hash: &TxHash) -> String {
    let mut hasher = Sha3_256::new();
    hasher.update(session_id.as_str().as_bytes());
    hasher.update(tx_hash.as_str().as_bytes());
    let digest = hasher.finalize();
    hex_encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_TX: &str = "0xc3d224630a6f59856302e592d329953df0b2a057693906976e5019df6347320d";

    #[test]
    fn session_id_accepts_typical_checkout_ids() {
        assert!(SessionId::parse("cs_a1B2c3D4").is_ok());
        assert!(SessionId::parse("order-2024-0001").is_ok());
    }

    #[test]
    fn session_id_rejects_invalid_inputs() {
        assert_eq!(SessionId::parse(""), Err(SessionIdFormatError::WrongLength));
        assert_eq!(
            SessionId::parse(&"a".repeat(SESSION_ID_MAX_LENGTH + 1)),
            Err(SessionIdFormatError::WrongLength)
        );
        assert_eq!(
            SessionId::parse("cs a"),
            Err(SessionIdFormatError::InvalidCharacter)
        );
    }

    #[test]
    fn wallet_address_canonicalizes_case() {
        let addr = WalletAddress::parse("0xAbCdEf0123456789abcdef0123456789ABCDEF01").unwrap();
        assert_eq!(addr.as_str(), "0xabcdef0123456789abcdef0123456789abcdef01");
    }

    #[test]
    fn wallet_address_rejects_invalid_inputs() {
        assert_eq!(
            WalletAddress::parse("abcdef0123456789abcdef0123456789abcdef01"),
            Err(HexIdFormatError::MissingPrefix)
        );
        assert_eq!(
            WalletAddress::parse("0xabcd"),
            Err(HexIdFormatError::WrongLength {
                expected: 40,
                actual: 4
            })
        );
        assert_eq!(
            WalletAddress::parse(&format!("0x{}", "z".repeat(40))),
            Err(HexIdFormatError::NonHex)
        );
    }

    #[test]
    fn tx_hash_parse_checks_format() {
        assert!(TxHash::parse(VALID_TX).is_ok());
        assert!(TxHash::parse("0xdeadbeef").is_err());
    }

    #[test]
    fn amount_parses_exact_base_units() {
        assert_eq!(
            TokenAmount::parse_decimal("1.5").unwrap().base_units(),
            1_500_000_000_000_000_000
        );
        assert_eq!(TokenAmount::parse_decimal("0").unwrap().base_units(), 0);
        assert_eq!(
            TokenAmount::parse_decimal(".25").unwrap().base_units(),
            250_000_000_000_000_000
        );
        assert_eq!(
            TokenAmount::parse_decimal("42").unwrap().base_units(),
            42_000_000_000_000_000_000
        );
    }

    #[test]
    fn amount_rejects_invalid_inputs() {
        assert_eq!(
            TokenAmount::parse_decimal(""),
            Err(AmountFormatError::Empty)
        );
        assert_eq!(
            TokenAmount::parse_decimal("."),
            Err(AmountFormatError::Empty)
        );
        assert_eq!(
            TokenAmount::parse_decimal("1,5"),
            Err(AmountFormatError::InvalidDigit)
        );
        assert_eq!(
            TokenAmount::parse_decimal("-1"),
            Err(AmountFormatError::InvalidDigit)
        );
        assert_eq!(
            TokenAmount::parse_decimal("0.0000000000000000001"),
            Err(AmountFormatError::TooManyDecimals)
        );
        assert!(TokenAmount::parse_decimal(&"9".repeat(40)).is_err());
    }

    #[test]
    fn amount_round_trips_through_decimal_form() {
        for input in ["1.5", "0.000000000000000001", "1000000", "12.345"] {
            let amount = TokenAmount::parse_decimal(input).unwrap();
            assert_eq!(amount.format_decimal(), input);
        }
        assert_eq!(TokenAmount::from_base_units(0).format_decimal(), "0");
    }

    #[test]
    fn status_strings_are_snake_case() {
        assert_eq!(SessionStatus::EmailFailed.as_ref(), "email_failed");
        assert_eq!(PaymentStatus::Confirming.to_string(), "confirming");
    }

    #[test]
    fn payment_reference_is_deterministic() {
        let session = SessionId::parse("cs_1").unwrap();
        let tx = TxHash::parse(VALID_TX).unwrap();
        let left = derive_payment_reference(&session, &tx);
        let right = derive_payment_reference(&session, &tx);
        assert_eq!(left, right);
        assert_eq!(left.len(), 64);
    }
}
