use std::sync::Arc;

use cardrail_domain::telemetry::TelemetryGuard;
use cardrail_fulfillment::FulfillmentOrchestrator;
use cardrail_storage::SeaOrmStorage;

use crate::gate::RequestGate;

pub type Orchestrator = FulfillmentOrchestrator<SeaOrmStorage>;

#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    gate: Arc<RequestGate>,
    telemetry: TelemetryGuard,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        gate: Arc<RequestGate>,
        telemetry: TelemetryGuard,
    ) -> Self {
        Self {
            orchestrator,
            gate,
            telemetry,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        self.orchestrator.as_ref()
    }

    pub fn gate(&self) -> &RequestGate {
        self.gate.as_ref()
    }

    pub fn telemetry(&self) -> &TelemetryGuard {
        &self.telemetry
    }
}
