// libs/professional-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use shared_models::error::AppError;

use crate::ProfessionalCellState;

#[derive(Debug, Deserialize)]
pub struct ProfessionalQueryParams {
    pub specialty: Option<String>,
    pub page: Option<u32>,
}

#[axum::debug_handler]
pub async fn list_professionals(
    State(state): State<Arc<ProfessionalCellState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(params): Query<ProfessionalQueryParams>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let page = state.directory
        .list_professionals(params.specialty.as_deref(), params.page.unwrap_or(1), token)
        .await
        .map_err(|e| {
            error!("Unable to fetch healthcare professionals: {}", e);
            AppError::Internal("An unexpected error occurred. Please try again later.".to_string())
        })?;

    Ok(Json(json!({
        "success": true,
        "message": "Healthcare professionals fetched successfully",
        "data": page.data,
        "meta": page.meta
    })))
}
