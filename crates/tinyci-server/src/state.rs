//! Application state.

use std::sync::Arc;
use tinyci_scheduler::CiService;
use tinyci_store::BuildRepo;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CiService>,
}

impl AppState {
    pub fn new(service: Arc<CiService>) -> Self {
        Self { service }
    }

    pub fn repo(&self) -> &Arc<dyn BuildRepo> {
        self.service.repo()
    }
}
