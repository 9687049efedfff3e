// libs/appointment-cell/src/services/policy.rs
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentStatus, BookingError, CancelError, CompleteError, TimeRange,
};

/// Cancellation closes this many hours before the appointment starts.
/// The boundary is inclusive: an appointment starting exactly 24 hours
/// from now can no longer be cancelled.
pub const CANCELLATION_CUTOFF_HOURS: i64 = 24;

/// Pure scheduling rules. No IO and no clock of its own: callers pass
/// `now`, so every decision is deterministic and unit-testable.
#[derive(Debug, Default, Clone, Copy)]
pub struct SchedulingPolicy;

impl SchedulingPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Gatekeeper for new bookings: the requested slot must be a valid
    /// interval and must start strictly in the future.
    pub fn validate_booking(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<TimeRange, BookingError> {
        let range = TimeRange::new(start, end)?;
        if start <= now {
            return Err(BookingError::PastStart);
        }
        Ok(range)
    }

    /// Checks run in order: ownership, then the cutoff, then status, so
    /// a non-owner always sees `NotOwner` even for a stale appointment.
    pub fn can_cancel(
        &self,
        appointment: &Appointment,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), CancelError> {
        if appointment.user_id != user_id {
            return Err(CancelError::NotOwner);
        }
        if appointment.start_time <= now + Duration::hours(CANCELLATION_CUTOFF_HOURS) {
            return Err(CancelError::TooLate);
        }
        if appointment.status != AppointmentStatus::Booked {
            return Err(CancelError::NotBooked);
        }
        Ok(())
    }

    /// Completion has no time cutoff; only ownership and status gate it.
    pub fn can_complete(
        &self,
        appointment: &Appointment,
        user_id: Uuid,
    ) -> Result<(), CompleteError> {
        if appointment.user_id != user_id {
            return Err(CompleteError::NotOwner);
        }
        if appointment.status != AppointmentStatus::Booked {
            return Err(CompleteError::NotBooked);
        }
        Ok(())
    }
}
