use std::sync::Arc;
use stepline_core::{Authenticator, Config, CycleOrchestrator, JobStore, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    authenticator: Arc<dyn Authenticator>,
    orchestrator: Arc<CycleOrchestrator>,
    store: Arc<dyn JobStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        orchestrator: Arc<CycleOrchestrator>,
        store: Arc<dyn JobStore>,
    ) -> Self {
        Self {
            config,
            authenticator,
            orchestrator,
            store,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    pub fn orchestrator(&self) -> &CycleOrchestrator {
        self.orchestrator.as_ref()
    }

    pub fn store(&self) -> &dyn JobStore {
        self.store.as_ref()
    }
}
