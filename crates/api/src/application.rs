use std::sync::Arc;

use actix_web::{middleware::Logger, web, App, HttpServer};
use thiserror::Error;

use cardrail_domain::config::{ApiConfig, ChainConfig, CollaboratorConfig, ConfigError, GateConfig};
use cardrail_domain::telemetry::{init_telemetry, TelemetryConfig, TelemetryError};
use cardrail_fulfillment::{
    FulfillmentOrchestrator, HttpEmailDispatcher, HttpVaultClient, Vault,
};
use cardrail_storage::SeaOrmStorage;
use cardrail_verifier::{BlockchainVerifier, HttpLedgerClient};

use crate::{
    gate::RequestGate,
    handlers::{metrics_handler, record_payment_handler},
    state::AppState,
};

pub async fn run() -> Result<(), BootstrapError> {
    let config = ApiConfig::load_from_env()?;
    let telemetry_config = TelemetryConfig::from_env("API");
    let telemetry = init_telemetry(&telemetry_config)?;

    let chain_config = ChainConfig::load_from_env()?;
    let collaborator_config = CollaboratorConfig::load_from_env()?;
    let gate_config = GateConfig::load_from_env()?;

    let storage = SeaOrmStorage::connect(config.database_url()).await?;

    let ledger = HttpLedgerClient::new(&chain_config)
        .map_err(|err| BootstrapError::Collaborator(err.to_string()))?;
    let verifier = BlockchainVerifier::new(Arc::new(ledger), chain_config.clone());
    let vault: Arc<dyn Vault> = Arc::new(
        HttpVaultClient::new(&collaborator_config)
            .map_err(|err| BootstrapError::Collaborator(err.to_string()))?,
    );
    let mailer = Arc::new(
        HttpEmailDispatcher::new(&collaborator_config)
            .map_err(|err| BootstrapError::Collaborator(err.to_string()))?,
    );
    let orchestrator = FulfillmentOrchestrator::new(
        storage,
        verifier,
        vault,
        mailer,
        chain_config,
    );

    let state = AppState::new(
        Arc::new(orchestrator),
        Arc::new(RequestGate::new(gate_config)),
        telemetry,
    );

    // Metrics stay off the public listener whenever an internal one exists.
    let include_metrics_on_public = !config.has_internal_listener();

    let public_state = state.clone();
    let public_server = HttpServer::new(move || {
        let mut app = App::new()
            .app_data(web::Data::new(public_state.clone()))
            .wrap(Logger::default())
            .route("/api/v1/payments", web::post().to(record_payment_handler));

        if include_metrics_on_public {
            app = app.route("/metrics", web::get().to(metrics_handler));
        }

        app
    })
    .bind(config.api_bind_address())?
    .run();

    let internal_server = match config.internal_bind_address() {
        Some(addr) => {
            let internal_state = state.clone();
            Some(
                HttpServer::new(move || {
                    App::new()
                        .app_data(web::Data::new(internal_state.clone()))
                        .wrap(Logger::default())
                        .route("/metrics", web::get().to(metrics_handler))
                })
                .bind(addr)?
                .run(),
            )
        }
        None => None,
    };

    if let Some(internal) = internal_server {
        tokio::try_join!(public_server, internal)?;
    } else {
        public_server.await?;
    }

    Ok(())
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("storage error: {0}")]
    Storage(#[from] cardrail_domain::storage::StorageError),
    #[error("collaborator setup failed: {0}")]
    Collaborator(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
