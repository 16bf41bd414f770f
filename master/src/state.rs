// master/src/state.rs

use std::sync::Arc;

use crate::orchestrator::Orchestrator;
use crate::registry::Registry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub orchestrator: Orchestrator,
}
