pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod store;

pub use models::{Appointment, AppointmentStatus, TimeRange};
pub use services::booking::AppointmentBookingService;
pub use services::policy::SchedulingPolicy;

use std::sync::Arc;

use professional_cell::ProfessionalDirectoryService;
use shared_config::AppConfig;

/// Per-cell state, built once at process start. The booking service owns
/// the store; the professional directory backs the existence check on
/// booking requests.
pub struct AppointmentCellState {
    pub config: Arc<AppConfig>,
    pub service: Arc<AppointmentBookingService>,
    pub directory: Arc<ProfessionalDirectoryService>,
}

impl AppointmentCellState {
    pub fn new(config: Arc<AppConfig>) -> Self {
        let service = Arc::new(AppointmentBookingService::new(&config));
        let directory = Arc::new(ProfessionalDirectoryService::new(&config));
        Self {
            config,
            service,
            directory,
        }
    }
}
