// libs/appointment-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// A booked time slot between one user and one professional.
///
/// Every field except `status` is immutable after creation; there is no
/// rescheduling. Records are never deleted, so cancelled and completed
/// appointments remain as history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub professional_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    /// The half-open `[start_time, end_time)` interval this appointment
    /// occupies. Persisted rows always satisfy `end_time > start_time`,
    /// so this cannot fail for a stored appointment.
    pub fn time_range(&self) -> TimeRange {
        TimeRange {
            start: self.start_time,
            end: self.end_time,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Booked,
    Cancelled,
    Completed,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Booked => write!(f, "booked"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::Completed => write!(f, "completed"),
        }
    }
}

impl AppointmentStatus {
    /// `Booked` is the only state that admits further transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AppointmentStatus::Booked)
    }
}

/// Half-open time interval `[start, end)`. Construction enforces
/// `end > start`, so a `TimeRange` value is always a valid interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, BookingError> {
        if end <= start {
            return Err(BookingError::InvalidRange);
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Half-open intersection: touching endpoints do not overlap.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Record handed to the store for creation. Carrying a `TimeRange` rather
/// than two raw timestamps keeps the `end > start` invariant on the type.
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub user_id: Uuid,
    pub professional_id: Uuid,
    pub range: TimeRange,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub professional_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BookingError {
    #[error("Appointment end time must be after the start time")]
    InvalidRange,

    #[error("Appointment start time must be in the future")]
    PastStart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CancelError {
    #[error("You can only cancel your own appointments")]
    NotOwner,

    #[error("Cancellation not allowed within 24 hours of the appointment time")]
    TooLate,

    #[error("This appointment is already cancelled or completed")]
    NotBooked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CompleteError {
    #[error("You can only complete your own appointments")]
    NotOwner,

    #[error("Only booked appointments can be marked completed")]
    NotBooked,
}

/// Everything the appointment service can fail with. Policy errors are
/// wrapped so handlers see a single error surface; `Database` is the only
/// variant that maps to a server-side failure.
#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error(transparent)]
    Cancel(#[from] CancelError),

    #[error(transparent)]
    Complete(#[from] CompleteError),

    #[error("The professional is already booked during this time")]
    ProfessionalConflict,

    #[error("You already have an appointment during this time")]
    UserConflict,

    #[error("You can only view your own appointments")]
    Forbidden,

    #[error("Appointment not found")]
    NotFound,

    #[error("Database error: {0}")]
    Database(String),
}
