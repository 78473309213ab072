//! Environment-driven configuration structures shared by all binaries.
//!
//! Nothing in the verifier or orchestrator reads the environment directly:
//! they receive these structs at construction, so tests can build them with
//! arbitrary values through the `new`/`with_*` constructors.

use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::model::{HexIdFormatError, WalletAddress};

/// API-binary configuration (HTTP bind + shared database) so the HTTP
/// surface does not depend on verifier-only environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    database_url: String,
    api_bind_address: String,
    internal_bind_address: Option<String>,
}

impl ApiConfig {
    /// Loads only the environment variables required by the API binary.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        Ok(Self {
            database_url: get_required_var("DATABASE_URL")?,
            api_bind_address: get_required_var("API_BIND_ADDRESS")?,
            internal_bind_address: get_optional_var("API_INTERNAL_BIND_ADDRESS"),
        })
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn api_bind_address(&self) -> &str {
        &self.api_bind_address
    }

    pub fn internal_bind_address(&self) -> Option<&str> {
        self.internal_bind_address.as_deref()
    }

    pub fn has_internal_listener(&self) -> bool {
        self.internal_bind_address.is_some()
    }
}

/// Chain-facing knobs injected into the verifier and orchestrator: the
/// indexer endpoint, the payment contract, confirmation policy, and the set
/// of tokens the contract accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    ledger_api_url: String,
    ledger_api_key: Option<String>,
    payment_contract: WalletAddress,
    confirmation_threshold: u64,
    poll_interval: Duration,
    max_wait: Duration,
    supported_tokens: Vec<String>,
}

impl ChainConfig {
    pub const DEFAULT_CONFIRMATION_THRESHOLD: u64 = 5;
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
    pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(120);

    pub fn new(ledger_api_url: impl Into<String>, payment_contract: WalletAddress) -> Self {
        Self {
            ledger_api_url: ledger_api_url.into(),
            ledger_api_key: None,
            payment_contract,
            confirmation_threshold: Self::DEFAULT_CONFIRMATION_THRESHOLD,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            max_wait: Self::DEFAULT_MAX_WAIT,
            supported_tokens: vec!["DAI".to_owned(), "WETH".to_owned()],
        }
    }

    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let contract_raw = get_required_var("PAYMENT_CONTRACT_ADDRESS")?;
        let payment_contract =
            WalletAddress::parse(&contract_raw).map_err(|source| ConfigError::InvalidAddress {
                key: "PAYMENT_CONTRACT_ADDRESS",
                source,
            })?;

        let mut config = Self::new(get_required_var("LEDGER_API_URL")?, payment_contract);
        config.ledger_api_key = get_optional_var("LEDGER_API_KEY");
        if let Some(threshold) = get_optional_number("CONFIRMATION_THRESHOLD")? {
            config.confirmation_threshold = threshold;
        }
        if let Some(ms) = get_optional_number("VERIFIER_POLL_INTERVAL_MS")? {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = get_optional_number("VERIFIER_MAX_WAIT_MS")? {
            config.max_wait = Duration::from_millis(ms);
        }
        if let Some(tokens) = get_optional_var("SUPPORTED_TOKENS") {
            config.supported_tokens = tokens
                .split(',')
                .map(|token| token.trim().to_ascii_uppercase())
                .filter(|token| !token.is_empty())
                .collect();
        }

        Ok(config)
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.ledger_api_key = Some(key.into());
        self
    }

    pub fn with_confirmation_threshold(mut self, threshold: u64) -> Self {
        self.confirmation_threshold = threshold;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn with_supported_tokens(mut self, tokens: Vec<String>) -> Self {
        self.supported_tokens = tokens
            .into_iter()
            .map(|token| token.to_ascii_uppercase())
            .collect();
        self
    }

    pub fn ledger_api_url(&self) -> &str {
        &self.ledger_api_url
    }

    pub fn ledger_api_key(&self) -> Option<&str> {
        self.ledger_api_key.as_deref()
    }

    pub fn payment_contract(&self) -> &WalletAddress {
        &self.payment_contract
    }

    pub fn confirmation_threshold(&self) -> u64 {
        self.confirmation_threshold
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    pub fn supports_token(&self, token: &str) -> bool {
        self.supported_tokens
            .iter()
            .any(|supported| supported.eq_ignore_ascii_case(token))
    }

    pub fn supported_tokens(&self) -> &[String] {
        &self.supported_tokens
    }
}

/// Endpoints of the external vault and email dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollaboratorConfig {
    vault_url: String,
    vault_api_key: Option<String>,
    email_api_url: String,
    email_api_key: Option<String>,
}

impl CollaboratorConfig {
    pub fn new(vault_url: impl Into<String>, email_api_url: impl Into<String>) -> Self {
        Self {
            vault_url: vault_url.into(),
            vault_api_key: None,
            email_api_url: email_api_url.into(),
            email_api_key: None,
        }
    }

    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let mut config = Self::new(
            get_required_var("VAULT_API_URL")?,
            get_required_var("EMAIL_API_URL")?,
        );
        config.vault_api_key = get_optional_var("VAULT_API_KEY");
        config.email_api_key = get_optional_var("EMAIL_API_KEY");
        Ok(config)
    }

    pub fn vault_url(&self) -> &str {
        &self.vault_url
    }

    pub fn vault_api_key(&self) -> Option<&str> {
        self.vault_api_key.as_deref()
    }

    pub fn email_api_url(&self) -> &str {
        &self.email_api_url
    }

    pub fn email_api_key(&self) -> Option<&str> {
        self.email_api_key.as_deref()
    }
}

/// Admission-control knobs for the request gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateConfig {
    requests_per_second: u32,
    burst: u32,
}

impl GateConfig {
    pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 5;
    pub const DEFAULT_BURST: u32 = 10;

    pub fn new(requests_per_second: u32, burst: u32) -> Self {
        Self {
            requests_per_second: requests_per_second.max(1),
            burst: burst.max(1),
        }
    }

    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let rps = get_optional_number("GATE_REQUESTS_PER_SECOND")?
            .unwrap_or(Self::DEFAULT_REQUESTS_PER_SECOND);
        let burst = get_optional_number("GATE_BURST")?.unwrap_or(Self::DEFAULT_BURST);
        Ok(Self::new(rps, burst))
    }

    pub fn requests_per_second(&self) -> u32 {
        self.requests_per_second
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }
}

fn get_required_var(key: &'static str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Err(ConfigError::MissingVar { key })
            } else {
                Ok(trimmed.to_string())
            }
        }
        Err(_) => Err(ConfigError::MissingVar { key }),
    }
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn get_optional_number<T: std::str::FromStr<Err = std::num::ParseIntError>>(
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match get_optional_var(key) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|source| ConfigError::InvalidNumber { key, source }),
        None => Ok(None),
    }
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("CARDRAIL_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{key}`")]
    MissingVar { key: &'static str },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("invalid address in `{key}`: {source}")]
    InvalidAddress {
        key: &'static str,
        #[source]
        source: HexIdFormatError,
    },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}
