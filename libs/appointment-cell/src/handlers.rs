// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::error;
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::AppointmentCellState;
use crate::models::{AppointmentError, BookAppointmentRequest, CancelError, CompleteError};

#[derive(Debug, Deserialize)]
pub struct AppointmentQueryParams {
    pub page: Option<u32>,
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<Arc<AppointmentCellState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(params): Query<AppointmentQueryParams>,
) -> Result<Json<Value>, AppError> {
    let user_id = user.user_id()?;

    let page = state
        .service
        .list_user_appointments(user_id, params.page.unwrap_or(1), auth.token())
        .await
        .map_err(map_domain_error)?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointments fetched successfully",
        "data": page.data,
        "meta": page.meta
    })))
}

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let user_id = user.user_id()?;
    let token = auth.token();

    // The professional must exist before any scheduling work happens.
    let exists = state
        .directory
        .professional_exists(request.professional_id, token)
        .await
        .map_err(|e| {
            error!("Professional lookup failed: {}", e);
            AppError::Internal("An unexpected error occurred. Please try again later.".to_string())
        })?;
    if !exists {
        return Err(AppError::Unprocessable(
            "The selected healthcare professional does not exist".to_string(),
        ));
    }

    let appointment = state
        .service
        .create_appointment(user_id, &request, token)
        .await
        .map_err(map_domain_error)?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointment booked successfully",
        "data": appointment
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let user_id = user.user_id()?;

    let appointment = state
        .service
        .get_user_appointment(user_id, appointment_id, auth.token())
        .await
        .map_err(map_domain_error)?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointment fetched successfully",
        "data": appointment
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let user_id = user.user_id()?;

    let appointment = state
        .service
        .cancel_appointment(user_id, appointment_id, auth.token())
        .await
        .map_err(map_domain_error)?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointment cancelled successfully",
        "data": appointment
    })))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let user_id = user.user_id()?;

    let appointment = state
        .service
        .complete_appointment(user_id, appointment_id, auth.token())
        .await
        .map_err(map_domain_error)?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointment marked as completed",
        "data": appointment
    })))
}

/// Translate domain failures to HTTP. Database details never leave the
/// process; clients get a generic 500 message.
fn map_domain_error(err: AppointmentError) -> AppError {
    match &err {
        AppointmentError::Booking(e) => AppError::BadRequest(e.to_string()),
        AppointmentError::ProfessionalConflict | AppointmentError::UserConflict => {
            AppError::Conflict(err.to_string())
        }
        AppointmentError::Cancel(CancelError::NotOwner)
        | AppointmentError::Complete(CompleteError::NotOwner)
        | AppointmentError::Forbidden => AppError::Forbidden(err.to_string()),
        AppointmentError::Cancel(_) | AppointmentError::Complete(_) => {
            AppError::Unprocessable(err.to_string())
        }
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::Database(details) => {
            error!("Appointment storage failure: {}", details);
            AppError::Internal("An unexpected error occurred. Please try again later.".to_string())
        }
    }
}
