//! Shared Application State

use std::sync::Arc;
use tutor_core::orchestrator::TurnOrchestrator;

/// Created once at startup and shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<TurnOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: TurnOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }
}
