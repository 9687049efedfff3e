// libs/professional-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A healthcare professional users can book appointments with.
/// Directory data only; scheduling state lives in the appointment cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthcareProfessional {
    pub id: Uuid,
    pub full_name: String,
    pub specialty: String,
    pub created_at: DateTime<Utc>,
}
