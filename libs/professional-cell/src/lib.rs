pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::HealthcareProfessional;
pub use services::directory::ProfessionalDirectoryService;

use std::sync::Arc;

use shared_config::AppConfig;

/// Per-cell state: the directory service is built once at process start
/// and shared by handle, not reconstructed per request.
pub struct ProfessionalCellState {
    pub config: Arc<AppConfig>,
    pub directory: Arc<ProfessionalDirectoryService>,
}

impl ProfessionalCellState {
    pub fn new(config: Arc<AppConfig>) -> Self {
        let directory = Arc::new(ProfessionalDirectoryService::new(&config));
        Self { config, directory }
    }
}
