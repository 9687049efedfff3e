// libs/professional-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::get,
    middleware,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::ProfessionalCellState;

pub fn professional_routes(state: Arc<ProfessionalCellState>) -> Router {
    let protected_routes = Router::new()
        .route("/", get(handlers::list_professionals))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
