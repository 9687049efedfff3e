use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::AppointmentCellState;
use appointment_cell::router::appointment_routes;
use professional_cell::ProfessionalCellState;
use professional_cell::router::professional_routes;
use shared_config::AppConfig;

pub fn create_router(config: Arc<AppConfig>) -> Router {
    let appointment_state = Arc::new(AppointmentCellState::new(config.clone()));
    let professional_state = Arc::new(ProfessionalCellState::new(config));

    Router::new()
        .route("/", get(|| async { "Appointments API is running!" }))
        .nest("/appointments", appointment_routes(appointment_state))
        .nest("/professionals", professional_routes(professional_state))
}
