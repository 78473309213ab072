//! Fixed-layout call-parameter codec for the payment contract.
//!
//! The contract's pay call carries exactly two 32-byte words after the
//! selector: the session id packed left-aligned with zero padding, and the
//! amount in token base units as a big-endian integer. The verifier never
//! trusts its own decoding for the final verdict; it re-encodes the expected
//! values and compares words byte-for-byte.

use cardrail_domain::model::{SessionId, TokenAmount};
use once_cell::sync::Lazy;
use sha3::{Digest, Keccak256};
use thiserror::Error;

pub const WORD_LENGTH: usize = 32;
pub const SELECTOR_LENGTH: usize = 4;
pub const CALL_LENGTH: usize = SELECTOR_LENGTH + 2 * WORD_LENGTH;

/// Keccak-256 selector of `payForSession(bytes32,uint256)`.
pub static PAY_FOR_SESSION_SELECTOR: Lazy<[u8; SELECTOR_LENGTH]> = Lazy::new(|| {
    let digest = Keccak256::digest(b"payForSession(bytes32,uint256)");
    [digest[0], digest[1], digest[2], digest[3]]
});

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CalldataError {
    #[error("call data is {0} bytes, expected {CALL_LENGTH}")]
    WrongLength(usize),
    #[error("unknown function selector")]
    UnknownSelector,
    #[error("session id field is not zero-padded ascii")]
    MalformedSessionId,
    #[error("amount exceeds the supported 128-bit range")]
    AmountOverflow,
}

/// The two parameter words of a decoded pay call, kept raw so callers can
/// compare them byte-for-byte against independently encoded expectations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCall {
    pub session_word: [u8; WORD_LENGTH],
    pub amount_word: [u8; WORD_LENGTH],
}

/// Packs a session id into its fixed-width word: ascii bytes left-aligned,
/// zero-padded on the right. Ids are validated to fit at parse time.
pub fn encode_session_id(session_id: &SessionId) -> [u8; WORD_LENGTH] {
    let mut word = [0u8; WORD_LENGTH];
    let bytes = session_id.as_str().as_bytes();
    word[..bytes.len()].copy_from_slice(bytes);
    word
}

/// Recovers the session id string from its fixed-width word. Strict: the
/// padding must be all zeros and the prefix printable ascii.
pub fn decode_session_id(word: &[u8; WORD_LENGTH]) -> Result<String, CalldataError> {
    let len = word.iter().position(|b| *b == 0).unwrap_or(WORD_LENGTH);
    if word[len..].iter().any(|b| *b != 0) {
        return Err(CalldataError::MalformedSessionId);
    }
    let prefix = &word[..len];
    if !prefix.iter().all(|b| b.is_ascii_graphic()) {
        return Err(CalldataError::MalformedSessionId);
    }
    String::from_utf8(prefix.to_vec()).map_err(|_| CalldataError::MalformedSessionId)
}

/// Encodes an amount of base units as a 32-byte big-endian integer.
pub fn encode_amount(amount: TokenAmount) -> [u8; WORD_LENGTH] {
    let mut word = [0u8; WORD_LENGTH];
    word[WORD_LENGTH - 16..].copy_from_slice(&amount.base_units().to_be_bytes());
    word
}

/// Decodes a 32-byte big-endian amount word. Values wider than 128 bits are
/// rejected rather than truncated.
pub fn decode_amount(word: &[u8; WORD_LENGTH]) -> Result<TokenAmount, CalldataError> {
    if word[..WORD_LENGTH - 16].iter().any(|b| *b != 0) {
        return Err(CalldataError::AmountOverflow);
    }
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&word[WORD_LENGTH - 16..]);
    Ok(TokenAmount::from_base_units(u128::from_be_bytes(bytes)))
}

/// Builds the full calldata for a pay call. Used by tests and tooling to
/// construct well-formed transactions.
pub fn encode_call(session_id: &SessionId, amount: TokenAmount) -> Vec<u8> {
    let mut data = Vec::with_capacity(CALL_LENGTH);
    data.extend_from_slice(&*PAY_FOR_SESSION_SELECTOR);
    data.extend_from_slice(&encode_session_id(session_id));
    data.extend_from_slice(&encode_amount(amount));
    data
}

/// Splits calldata into its raw parameter words, validating shape and
/// selector only.
pub fn decode_call(data: &[u8]) -> Result<DecodedCall, CalldataError> {
    if data.len() != CALL_LENGTH {
        return Err(CalldataError::WrongLength(data.len()));
    }
    if data[..SELECTOR_LENGTH] != *PAY_FOR_SESSION_SELECTOR {
        return Err(CalldataError::UnknownSelector);
    }

    let mut session_word = [0u8; WORD_LENGTH];
    session_word.copy_from_slice(&data[SELECTOR_LENGTH..SELECTOR_LENGTH + WORD_LENGTH]);
    let mut amount_word = [0u8; WORD_LENGTH];
    amount_word.copy_from_slice(&data[SELECTOR_LENGTH + WORD_LENGTH..]);

    Ok(DecodedCall {
        session_word,
        amount_word,
    })
}
