// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, patch},
};

use shared_utils::extractor::auth_middleware;

use crate::AppointmentCellState;
use crate::handlers;

pub fn appointment_routes(state: Arc<AppointmentCellState>) -> Router {
    let protected_routes = Router::new()
        .route(
            "/",
            get(handlers::list_appointments).post(handlers::book_appointment),
        )
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/cancel", patch(handlers::cancel_appointment))
        .route(
            "/{appointment_id}/complete",
            patch(handlers::complete_appointment),
        )
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
