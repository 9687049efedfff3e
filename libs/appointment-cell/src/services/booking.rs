// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::pagination::{DEFAULT_PER_PAGE, Page};

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, BookAppointmentRequest, NewAppointment,
    TimeRange,
};
use crate::services::policy::SchedulingPolicy;
use crate::store::{AppointmentStore, SupabaseAppointmentStore};

const LOCK_RETRY_ATTEMPTS: u32 = 3;

/// Orchestrates the booking flow: policy checks, advisory locks, overlap
/// checks under lock, then persistence. All storage goes through the
/// `AppointmentStore` port.
pub struct AppointmentBookingService {
    store: Arc<dyn AppointmentStore>,
    policy: SchedulingPolicy,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_store(Arc::new(SupabaseAppointmentStore::new(config)))
    }

    pub fn with_store(store: Arc<dyn AppointmentStore>) -> Self {
        Self {
            store,
            policy: SchedulingPolicy::new(),
        }
    }

    /// Book a slot with a professional.
    ///
    /// Locks are taken in a fixed order (professional, then user) so two
    /// competing bookings can never deadlock against each other. The
    /// overlap checks run only while both locks are held; a writer that
    /// cannot get a lock within the retry budget is reported as the
    /// corresponding conflict, since someone else is actively booking
    /// the same calendar.
    pub async fn create_appointment(
        &self,
        user_id: Uuid,
        request: &BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let range = self
            .policy
            .validate_booking(request.start_time, request.end_time, Utc::now())?;

        let professional_key = professional_lock_key(request.professional_id);
        let user_key = user_lock_key(user_id);

        if !self.acquire_with_retry(&professional_key, auth_token).await? {
            return Err(AppointmentError::ProfessionalConflict);
        }
        if !self.acquire_with_retry(&user_key, auth_token).await? {
            self.release(&professional_key, auth_token).await;
            return Err(AppointmentError::UserConflict);
        }

        let result = self
            .book_under_locks(user_id, request.professional_id, range, auth_token)
            .await;

        self.release(&user_key, auth_token).await;
        self.release(&professional_key, auth_token).await;

        result
    }

    async fn book_under_locks(
        &self,
        user_id: Uuid,
        professional_id: Uuid,
        range: TimeRange,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        if self
            .store
            .has_overlap_for_professional(professional_id, &range, auth_token)
            .await?
        {
            return Err(AppointmentError::ProfessionalConflict);
        }
        if self
            .store
            .has_overlap_for_user(user_id, &range, auth_token)
            .await?
        {
            return Err(AppointmentError::UserConflict);
        }

        let appointment = self
            .store
            .create(
                NewAppointment {
                    user_id,
                    professional_id,
                    range,
                },
                auth_token,
            )
            .await?;

        info!(
            "Appointment {} booked for user {} with professional {} at {}",
            appointment.id, user_id, professional_id, appointment.start_time
        );
        Ok(appointment)
    }

    async fn acquire_with_retry(
        &self,
        lock_key: &str,
        auth_token: &str,
    ) -> Result<bool, AppointmentError> {
        for attempt in 1..=LOCK_RETRY_ATTEMPTS {
            if self.store.try_lock(lock_key, auth_token).await? {
                return Ok(true);
            }
            if attempt < LOCK_RETRY_ATTEMPTS {
                debug!(
                    "Lock {} busy, retry {}/{}",
                    lock_key, attempt, LOCK_RETRY_ATTEMPTS
                );
                tokio::time::sleep(std::time::Duration::from_millis(50 * attempt as u64)).await;
            }
        }
        Ok(false)
    }

    async fn release(&self, lock_key: &str, auth_token: &str) {
        // Locks carry a TTL; a failed delete only delays the next writer
        // until expiry cleanup, so it must not fail the operation.
        if let Err(e) = self.store.unlock(lock_key, auth_token).await {
            warn!("Failed to release scheduling lock {}: {}", lock_key, e);
        }
    }

    pub async fn cancel_appointment(
        &self,
        user_id: Uuid,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.store.get(appointment_id, auth_token).await?;
        self.policy.can_cancel(&appointment, user_id, Utc::now())?;

        let updated = self
            .store
            .save_status(appointment.id, AppointmentStatus::Cancelled, auth_token)
            .await?;
        info!("Appointment {} cancelled by user {}", updated.id, user_id);
        Ok(updated)
    }

    pub async fn complete_appointment(
        &self,
        user_id: Uuid,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.store.get(appointment_id, auth_token).await?;
        self.policy.can_complete(&appointment, user_id)?;

        let updated = self
            .store
            .save_status(appointment.id, AppointmentStatus::Completed, auth_token)
            .await?;
        info!("Appointment {} marked completed by user {}", updated.id, user_id);
        Ok(updated)
    }

    pub async fn list_user_appointments(
        &self,
        user_id: Uuid,
        page: u32,
        auth_token: &str,
    ) -> Result<Page<Appointment>, AppointmentError> {
        self.store
            .list_by_user(user_id, page, DEFAULT_PER_PAGE, auth_token)
            .await
    }

    /// Fetch one appointment, refusing to reveal other users' records.
    /// An existing-but-foreign appointment is `Forbidden`, not `NotFound`,
    /// matching the rest of the ownership checks.
    pub async fn get_user_appointment(
        &self,
        user_id: Uuid,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.store.get(appointment_id, auth_token).await?;
        if appointment.user_id != user_id {
            return Err(AppointmentError::Forbidden);
        }
        Ok(appointment)
    }
}

fn professional_lock_key(professional_id: Uuid) -> String {
    format!("professional:{}", professional_id)
}

fn user_lock_key(user_id: Uuid) -> String {
    format!("user:{}", user_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BookingError, CancelError, CompleteError};
    use crate::store::memory::MemoryAppointmentStore;
    use assert_matches::assert_matches;
    use chrono::{DateTime, Duration, Utc};

    const TOKEN: &str = "test-token";

    fn service() -> (AppointmentBookingService, Arc<MemoryAppointmentStore>) {
        let store = Arc::new(MemoryAppointmentStore::new());
        (AppointmentBookingService::with_store(store.clone()), store)
    }

    fn in_hours(hours: i64) -> DateTime<Utc> {
        Utc::now() + Duration::hours(hours)
    }

    fn booking(professional_id: Uuid, start_hours: i64, end_hours: i64) -> BookAppointmentRequest {
        BookAppointmentRequest {
            professional_id,
            start_time: in_hours(start_hours),
            end_time: in_hours(end_hours),
        }
    }

    fn seeded(
        store: &MemoryAppointmentStore,
        user_id: Uuid,
        professional_id: Uuid,
        start_hours: i64,
        status: AppointmentStatus,
    ) -> Appointment {
        let appointment = Appointment {
            id: Uuid::new_v4(),
            user_id,
            professional_id,
            start_time: in_hours(start_hours),
            end_time: in_hours(start_hours) + Duration::hours(1),
            status,
            created_at: Utc::now(),
        };
        store.seed(appointment.clone());
        appointment
    }

    #[tokio::test]
    async fn booking_a_free_slot_succeeds() {
        let (service, store) = service();
        let user = Uuid::new_v4();
        let professional = Uuid::new_v4();

        let appointment = service
            .create_appointment(user, &booking(professional, 48, 49), TOKEN)
            .await
            .unwrap();

        assert_eq!(appointment.user_id, user);
        assert_eq!(appointment.professional_id, professional);
        assert_eq!(appointment.status, AppointmentStatus::Booked);
        assert_eq!(store.held_locks(), 0);
    }

    #[tokio::test]
    async fn overlapping_professional_slot_is_rejected() {
        let (service, store) = service();
        let professional = Uuid::new_v4();
        seeded(
            &store,
            Uuid::new_v4(),
            professional,
            48,
            AppointmentStatus::Booked,
        );

        // Overlaps the seeded 48h-49h slot by half an hour.
        let request = BookAppointmentRequest {
            professional_id: professional,
            start_time: in_hours(48) + Duration::minutes(30),
            end_time: in_hours(48) + Duration::minutes(90),
        };
        let err = service
            .create_appointment(Uuid::new_v4(), &request, TOKEN)
            .await
            .unwrap_err();

        assert_matches!(err, AppointmentError::ProfessionalConflict);
        assert_eq!(store.appointment_count(), 1);
        assert_eq!(store.held_locks(), 0);
    }

    #[tokio::test]
    async fn overlapping_user_slot_with_another_professional_is_rejected() {
        let (service, store) = service();
        let user = Uuid::new_v4();
        seeded(&store, user, Uuid::new_v4(), 48, AppointmentStatus::Booked);

        let err = service
            .create_appointment(user, &booking(Uuid::new_v4(), 48, 49), TOKEN)
            .await
            .unwrap_err();

        assert_matches!(err, AppointmentError::UserConflict);
        assert_eq!(store.held_locks(), 0);
    }

    #[tokio::test]
    async fn back_to_back_slots_both_book() {
        let (service, _) = service();
        let professional = Uuid::new_v4();

        service
            .create_appointment(Uuid::new_v4(), &booking(professional, 48, 49), TOKEN)
            .await
            .unwrap();
        // Second slot starts exactly where the first ends.
        service
            .create_appointment(Uuid::new_v4(), &booking(professional, 49, 50), TOKEN)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cancelled_appointment_frees_the_slot() {
        let (service, store) = service();
        let professional = Uuid::new_v4();
        seeded(
            &store,
            Uuid::new_v4(),
            professional,
            48,
            AppointmentStatus::Cancelled,
        );

        service
            .create_appointment(Uuid::new_v4(), &booking(professional, 48, 49), TOKEN)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn invalid_range_is_rejected_before_any_lock() {
        let (service, store) = service();

        let err = service
            .create_appointment(Uuid::new_v4(), &booking(Uuid::new_v4(), 49, 48), TOKEN)
            .await
            .unwrap_err();

        assert_matches!(err, AppointmentError::Booking(BookingError::InvalidRange));
        assert_eq!(store.held_locks(), 0);
    }

    #[tokio::test]
    async fn past_start_is_rejected() {
        let (service, _) = service();

        let err = service
            .create_appointment(Uuid::new_v4(), &booking(Uuid::new_v4(), -1, 1), TOKEN)
            .await
            .unwrap_err();

        assert_matches!(err, AppointmentError::Booking(BookingError::PastStart));
    }

    #[tokio::test]
    async fn busy_professional_lock_becomes_a_conflict() {
        let (service, store) = service();
        let professional = Uuid::new_v4();
        store.hold_lock(&professional_lock_key(professional));

        let err = service
            .create_appointment(Uuid::new_v4(), &booking(professional, 48, 49), TOKEN)
            .await
            .unwrap_err();

        assert_matches!(err, AppointmentError::ProfessionalConflict);
        assert_eq!(store.appointment_count(), 0);
        // The foreign lock stays; we never held it.
        assert_eq!(store.held_locks(), 1);
    }

    #[tokio::test]
    async fn busy_user_lock_releases_the_professional_lock() {
        let (service, store) = service();
        let user = Uuid::new_v4();
        store.hold_lock(&user_lock_key(user));

        let err = service
            .create_appointment(user, &booking(Uuid::new_v4(), 48, 49), TOKEN)
            .await
            .unwrap_err();

        assert_matches!(err, AppointmentError::UserConflict);
        assert_eq!(store.appointment_count(), 0);
        assert_eq!(store.held_locks(), 1);
    }

    #[tokio::test]
    async fn failed_insert_still_releases_both_locks() {
        let (service, store) = service();
        store.fail_writes();

        let err = service
            .create_appointment(Uuid::new_v4(), &booking(Uuid::new_v4(), 48, 49), TOKEN)
            .await
            .unwrap_err();

        assert_matches!(err, AppointmentError::Database(_));
        assert_eq!(store.held_locks(), 0);
    }

    #[tokio::test]
    async fn cancel_flips_status_to_cancelled() {
        let (service, store) = service();
        let user = Uuid::new_v4();
        let appointment = seeded(&store, user, Uuid::new_v4(), 48, AppointmentStatus::Booked);

        let updated = service
            .cancel_appointment(user, appointment.id, TOKEN)
            .await
            .unwrap();

        assert_eq!(updated.status, AppointmentStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_inside_cutoff_is_too_late() {
        let (service, store) = service();
        let user = Uuid::new_v4();
        let appointment = seeded(&store, user, Uuid::new_v4(), 23, AppointmentStatus::Booked);

        let err = service
            .cancel_appointment(user, appointment.id, TOKEN)
            .await
            .unwrap_err();

        assert_matches!(err, AppointmentError::Cancel(CancelError::TooLate));
    }

    #[tokio::test]
    async fn cancel_by_non_owner_is_rejected() {
        let (service, store) = service();
        let appointment = seeded(
            &store,
            Uuid::new_v4(),
            Uuid::new_v4(),
            48,
            AppointmentStatus::Booked,
        );

        let err = service
            .cancel_appointment(Uuid::new_v4(), appointment.id, TOKEN)
            .await
            .unwrap_err();

        assert_matches!(err, AppointmentError::Cancel(CancelError::NotOwner));
    }

    #[tokio::test]
    async fn cancel_of_completed_appointment_is_rejected() {
        let (service, store) = service();
        let user = Uuid::new_v4();
        let appointment = seeded(&store, user, Uuid::new_v4(), 48, AppointmentStatus::Completed);

        let err = service
            .cancel_appointment(user, appointment.id, TOKEN)
            .await
            .unwrap_err();

        assert_matches!(err, AppointmentError::Cancel(CancelError::NotBooked));
    }

    #[tokio::test]
    async fn cancel_of_unknown_appointment_is_not_found() {
        let (service, _) = service();

        let err = service
            .cancel_appointment(Uuid::new_v4(), Uuid::new_v4(), TOKEN)
            .await
            .unwrap_err();

        assert_matches!(err, AppointmentError::NotFound);
    }

    #[tokio::test]
    async fn complete_flips_status_to_completed() {
        let (service, store) = service();
        let user = Uuid::new_v4();
        let appointment = seeded(&store, user, Uuid::new_v4(), -2, AppointmentStatus::Booked);

        let updated = service
            .complete_appointment(user, appointment.id, TOKEN)
            .await
            .unwrap();

        assert_eq!(updated.status, AppointmentStatus::Completed);
    }

    #[tokio::test]
    async fn complete_of_cancelled_appointment_is_rejected() {
        let (service, store) = service();
        let user = Uuid::new_v4();
        let appointment = seeded(&store, user, Uuid::new_v4(), -2, AppointmentStatus::Cancelled);

        let err = service
            .complete_appointment(user, appointment.id, TOKEN)
            .await
            .unwrap_err();

        assert_matches!(err, AppointmentError::Complete(CompleteError::NotBooked));
    }

    #[tokio::test]
    async fn complete_by_non_owner_is_rejected() {
        let (service, store) = service();
        let appointment = seeded(
            &store,
            Uuid::new_v4(),
            Uuid::new_v4(),
            -2,
            AppointmentStatus::Booked,
        );

        let err = service
            .complete_appointment(Uuid::new_v4(), appointment.id, TOKEN)
            .await
            .unwrap_err();

        assert_matches!(err, AppointmentError::Complete(CompleteError::NotOwner));
    }

    #[tokio::test]
    async fn foreign_appointment_lookup_is_forbidden() {
        let (service, store) = service();
        let appointment = seeded(
            &store,
            Uuid::new_v4(),
            Uuid::new_v4(),
            48,
            AppointmentStatus::Booked,
        );

        let err = service
            .get_user_appointment(Uuid::new_v4(), appointment.id, TOKEN)
            .await
            .unwrap_err();

        assert_matches!(err, AppointmentError::Forbidden);
    }

    #[tokio::test]
    async fn listing_is_scoped_to_the_user_and_paginated() {
        let (service, store) = service();
        let user = Uuid::new_v4();
        for i in 0..3 {
            seeded(
                &store,
                user,
                Uuid::new_v4(),
                48 + i * 2,
                AppointmentStatus::Booked,
            );
        }
        seeded(
            &store,
            Uuid::new_v4(),
            Uuid::new_v4(),
            48,
            AppointmentStatus::Booked,
        );

        let page = service.list_user_appointments(user, 1, TOKEN).await.unwrap();

        assert_eq!(page.data.len(), 3);
        assert_eq!(page.meta.total, 3);
        assert_eq!(page.meta.current_page, 1);
        assert_eq!(page.meta.last_page, 1);
        assert!(page.data.iter().all(|a| a.user_id == user));
        // Newest first.
        assert!(page.data[0].start_time > page.data[2].start_time);
    }

    #[tokio::test]
    async fn listing_survives_a_huge_page_number() {
        let (service, store) = service();
        let user = Uuid::new_v4();
        seeded(&store, user, Uuid::new_v4(), 48, AppointmentStatus::Booked);

        let page = service
            .list_user_appointments(user, u32::MAX, TOKEN)
            .await
            .unwrap();

        assert!(page.data.is_empty());
        assert_eq!(page.meta.current_page, u32::MAX);
        assert_eq!(page.meta.total, 1);
    }
}
