// libs/appointment-cell/src/store.rs
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{Value, json};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::pagination::Page;

use crate::models::{Appointment, AppointmentError, AppointmentStatus, NewAppointment, TimeRange};

/// Persistence port for appointments. The store is also where mutual
/// exclusion lives: `try_lock`/`unlock` back the booking section so that
/// overlap checks and the insert happen while competing writers wait.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn get(&self, id: Uuid, auth_token: &str) -> Result<Appointment, AppointmentError>;

    /// All appointments belonging to a user, any status, newest first.
    async fn list_by_user(
        &self,
        user_id: Uuid,
        page: u32,
        per_page: u32,
        auth_token: &str,
    ) -> Result<Page<Appointment>, AppointmentError>;

    /// Does any *booked* appointment of this professional overlap `range`?
    /// Cancelled and completed rows never count.
    async fn has_overlap_for_professional(
        &self,
        professional_id: Uuid,
        range: &TimeRange,
        auth_token: &str,
    ) -> Result<bool, AppointmentError>;

    /// Same check keyed by the booking user.
    async fn has_overlap_for_user(
        &self,
        user_id: Uuid,
        range: &TimeRange,
        auth_token: &str,
    ) -> Result<bool, AppointmentError>;

    async fn create(
        &self,
        record: NewAppointment,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError>;

    /// Persist a status transition and return the updated row.
    async fn save_status(
        &self,
        appointment_id: Uuid,
        status: AppointmentStatus,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError>;

    /// Attempt to take the named advisory lock. `Ok(false)` means another
    /// writer currently holds it.
    async fn try_lock(&self, lock_key: &str, auth_token: &str) -> Result<bool, AppointmentError>;

    async fn unlock(&self, lock_key: &str, auth_token: &str) -> Result<(), AppointmentError>;
}

// ==============================================================================
// SUPABASE-BACKED STORE
// ==============================================================================

pub struct SupabaseAppointmentStore {
    supabase: SupabaseClient,
    lock_timeout_seconds: i64,
}

impl SupabaseAppointmentStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            lock_timeout_seconds: 30,
        }
    }

    fn overlap_path(column: &str, owner: Uuid, range: &TimeRange) -> String {
        // Half-open overlap in PostgREST terms: existing.start < new.end
        // AND existing.end > new.start, restricted to status=booked.
        format!(
            "/rest/v1/appointments?{}=eq.{}&status=eq.booked&start_time=lt.{}&end_time=gt.{}&select=id&limit=1",
            column,
            owner,
            urlencoding::encode(&range.end().to_rfc3339()),
            urlencoding::encode(&range.start().to_rfc3339()),
        )
    }

    /// Insert-as-lock against the `scheduling_locks` table. A unique
    /// constraint on `lock_key` makes the insert the contention point; an
    /// expired row left by a crashed writer is removed and the insert
    /// retried once. A failed insert with no competing lock row is a
    /// storage failure, not contention, and propagates as such.
    async fn acquire_row_lock(&self, lock_key: &str) -> Result<bool, AppointmentError> {
        match self.insert_lock_row(lock_key).await {
            Ok(()) => {
                debug!("Scheduling lock acquired: {}", lock_key);
                Ok(true)
            }
            Err(insert_err) => match self.existing_lock_expiry(lock_key).await? {
                None => Err(insert_err),
                Some(expires_at) if expires_at < Utc::now() => {
                    info!("Cleaning up expired scheduling lock: {}", lock_key);
                    self.delete_lock_row(lock_key).await?;

                    let reacquired = self.insert_lock_row(lock_key).await.is_ok();
                    if reacquired {
                        debug!("Scheduling lock acquired after cleanup: {}", lock_key);
                    }
                    Ok(reacquired)
                }
                Some(_) => Ok(false),
            },
        }
    }

    async fn insert_lock_row(&self, lock_key: &str) -> Result<(), AppointmentError> {
        let lock_data = json!({
            "lock_key": lock_key,
            "acquired_at": Utc::now().to_rfc3339(),
            "expires_at": (Utc::now() + Duration::seconds(self.lock_timeout_seconds)).to_rfc3339(),
            "holder": format!("scheduler_{}", Uuid::new_v4()),
        });

        self.supabase
            .request::<Value>(Method::POST, "/rest/v1/scheduling_locks", None, Some(lock_data))
            .await
            .map(|_| ())
            .map_err(|e| AppointmentError::Database(format!("Lock insert failed: {}", e)))
    }

    /// Expiry timestamp of the lock row currently holding `lock_key`,
    /// or `None` when no such row exists.
    async fn existing_lock_expiry(
        &self,
        lock_key: &str,
    ) -> Result<Option<DateTime<Utc>>, AppointmentError> {
        let response: Value = self
            .supabase
            .request::<Value>(
                Method::GET,
                &format!(
                    "/rest/v1/scheduling_locks?lock_key=eq.{}&select=expires_at",
                    urlencoding::encode(lock_key)
                ),
                None,
                None,
            )
            .await
            .map_err(|e| AppointmentError::Database(format!("Lock check failed: {}", e)))?;

        Ok(response
            .as_array()
            .and_then(|locks| locks.first())
            .and_then(|lock| lock.get("expires_at"))
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|expires_at| expires_at.with_timezone(&Utc)))
    }

    async fn delete_lock_row(&self, lock_key: &str) -> Result<(), AppointmentError> {
        self.supabase
            .request::<Value>(
                Method::DELETE,
                &format!(
                    "/rest/v1/scheduling_locks?lock_key=eq.{}",
                    urlencoding::encode(lock_key)
                ),
                None,
                None,
            )
            .await
            .map(|_| ())
            .map_err(|e| AppointmentError::Database(format!("Lock release failed: {}", e)))
    }

    fn representation_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        headers
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    // Deliberately unscoped by user: the service compares the owner after
    // the fetch so non-owners get NotOwner/Forbidden rather than a 404.
    // Row-level security on the auth token still bounds what the query
    // can see.
    async fn get(&self, id: Uuid, auth_token: &str) -> Result<Appointment, AppointmentError> {
        let rows: Vec<Appointment> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/appointments?id=eq.{}&limit=1", id),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| AppointmentError::Database(format!("Appointment lookup failed: {}", e)))?;

        rows.into_iter().next().ok_or(AppointmentError::NotFound)
    }

    async fn list_by_user(
        &self,
        user_id: Uuid,
        page: u32,
        per_page: u32,
        auth_token: &str,
    ) -> Result<Page<Appointment>, AppointmentError> {
        let page = page.max(1);
        let per_page = per_page.max(1);
        // u64 arithmetic: a caller-supplied page near u32::MAX must not
        // overflow the offset.
        let offset = (page as u64 - 1) * per_page as u64;

        let path = format!(
            "/rest/v1/appointments?user_id=eq.{}&order=start_time.desc&limit={}&offset={}",
            user_id, per_page, offset,
        );

        let (rows, total): (Vec<Appointment>, u64) = self
            .supabase
            .request_with_count(&path, Some(auth_token))
            .await
            .map_err(|e| AppointmentError::Database(format!("Appointment listing failed: {}", e)))?;

        Ok(Page::new(rows, page, per_page, total))
    }

    async fn has_overlap_for_professional(
        &self,
        professional_id: Uuid,
        range: &TimeRange,
        auth_token: &str,
    ) -> Result<bool, AppointmentError> {
        let rows: Vec<Value> = self
            .supabase
            .request(
                Method::GET,
                &Self::overlap_path("professional_id", professional_id, range),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| AppointmentError::Database(format!("Conflict check failed: {}", e)))?;

        Ok(!rows.is_empty())
    }

    async fn has_overlap_for_user(
        &self,
        user_id: Uuid,
        range: &TimeRange,
        auth_token: &str,
    ) -> Result<bool, AppointmentError> {
        let rows: Vec<Value> = self
            .supabase
            .request(
                Method::GET,
                &Self::overlap_path("user_id", user_id, range),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| AppointmentError::Database(format!("Conflict check failed: {}", e)))?;

        Ok(!rows.is_empty())
    }

    async fn create(
        &self,
        record: NewAppointment,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment_data = json!({
            "id": Uuid::new_v4(),
            "user_id": record.user_id,
            "professional_id": record.professional_id,
            "start_time": record.range.start().to_rfc3339(),
            "end_time": record.range.end().to_rfc3339(),
            "status": AppointmentStatus::Booked,
            "created_at": Utc::now().to_rfc3339(),
        });

        let rows: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(appointment_data),
                Some(Self::representation_headers()),
            )
            .await
            .map_err(|e| AppointmentError::Database(format!("Appointment insert failed: {}", e)))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| AppointmentError::Database("Insert returned no row".to_string()))
    }

    async fn save_status(
        &self,
        appointment_id: Uuid,
        status: AppointmentStatus,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let rows: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &format!("/rest/v1/appointments?id=eq.{}", appointment_id),
                Some(auth_token),
                Some(json!({ "status": status })),
                Some(Self::representation_headers()),
            )
            .await
            .map_err(|e| AppointmentError::Database(format!("Status update failed: {}", e)))?;

        rows.into_iter().next().ok_or(AppointmentError::NotFound)
    }

    async fn try_lock(&self, lock_key: &str, _auth_token: &str) -> Result<bool, AppointmentError> {
        self.acquire_row_lock(lock_key).await
    }

    async fn unlock(&self, lock_key: &str, _auth_token: &str) -> Result<(), AppointmentError> {
        self.delete_lock_row(lock_key).await?;
        debug!("Scheduling lock released: {}", lock_key);
        Ok(())
    }
}

// ==============================================================================
// IN-MEMORY STORE (unit tests)
// ==============================================================================

#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Test double with the same locking semantics as the Supabase store.
    #[derive(Default)]
    pub struct MemoryAppointmentStore {
        appointments: Mutex<Vec<Appointment>>,
        locks: Mutex<HashSet<String>>,
        fail_writes: AtomicBool,
    }

    impl MemoryAppointmentStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn seed(&self, appointment: Appointment) {
            self.appointments.lock().unwrap().push(appointment);
        }

        pub fn hold_lock(&self, lock_key: &str) {
            self.locks.lock().unwrap().insert(lock_key.to_string());
        }

        pub fn held_locks(&self) -> usize {
            self.locks.lock().unwrap().len()
        }

        pub fn fail_writes(&self) {
            self.fail_writes.store(true, Ordering::SeqCst);
        }

        pub fn appointment_count(&self) -> usize {
            self.appointments.lock().unwrap().len()
        }

        fn booked_overlap(&self, range: &TimeRange, pick: impl Fn(&Appointment) -> bool) -> bool {
            self.appointments
                .lock()
                .unwrap()
                .iter()
                .filter(|a| a.status == AppointmentStatus::Booked)
                .filter(|a| pick(a))
                .any(|a| a.time_range().overlaps(range))
        }
    }

    #[async_trait]
    impl AppointmentStore for MemoryAppointmentStore {
        async fn get(&self, id: Uuid, _auth_token: &str) -> Result<Appointment, AppointmentError> {
            self.appointments
                .lock()
                .unwrap()
                .iter()
                .find(|a| a.id == id)
                .cloned()
                .ok_or(AppointmentError::NotFound)
        }

        async fn list_by_user(
            &self,
            user_id: Uuid,
            page: u32,
            per_page: u32,
            _auth_token: &str,
        ) -> Result<Page<Appointment>, AppointmentError> {
            let mut rows: Vec<Appointment> = self
                .appointments
                .lock()
                .unwrap()
                .iter()
                .filter(|a| a.user_id == user_id)
                .cloned()
                .collect();
            rows.sort_by(|a, b| b.start_time.cmp(&a.start_time));

            let total = rows.len() as u64;
            let page = page.max(1);
            let per_page = per_page.max(1);
            // Same u64 offset arithmetic as the Supabase store.
            let start = (page as u64 - 1) * per_page as u64;
            let rows = rows
                .into_iter()
                .skip(usize::try_from(start).unwrap_or(usize::MAX))
                .take(per_page as usize)
                .collect();

            Ok(Page::new(rows, page, per_page, total))
        }

        async fn has_overlap_for_professional(
            &self,
            professional_id: Uuid,
            range: &TimeRange,
            _auth_token: &str,
        ) -> Result<bool, AppointmentError> {
            Ok(self.booked_overlap(range, |a| a.professional_id == professional_id))
        }

        async fn has_overlap_for_user(
            &self,
            user_id: Uuid,
            range: &TimeRange,
            _auth_token: &str,
        ) -> Result<bool, AppointmentError> {
            Ok(self.booked_overlap(range, |a| a.user_id == user_id))
        }

        async fn create(
            &self,
            record: NewAppointment,
            _auth_token: &str,
        ) -> Result<Appointment, AppointmentError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(AppointmentError::Database("simulated write failure".to_string()));
            }

            let appointment = Appointment {
                id: Uuid::new_v4(),
                user_id: record.user_id,
                professional_id: record.professional_id,
                start_time: record.range.start(),
                end_time: record.range.end(),
                status: AppointmentStatus::Booked,
                created_at: Utc::now(),
            };
            self.appointments.lock().unwrap().push(appointment.clone());
            Ok(appointment)
        }

        async fn save_status(
            &self,
            appointment_id: Uuid,
            status: AppointmentStatus,
            _auth_token: &str,
        ) -> Result<Appointment, AppointmentError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(AppointmentError::Database("simulated write failure".to_string()));
            }

            let mut rows = self.appointments.lock().unwrap();
            let appointment = rows
                .iter_mut()
                .find(|a| a.id == appointment_id)
                .ok_or(AppointmentError::NotFound)?;
            appointment.status = status;
            Ok(appointment.clone())
        }

        async fn try_lock(
            &self,
            lock_key: &str,
            _auth_token: &str,
        ) -> Result<bool, AppointmentError> {
            Ok(self.locks.lock().unwrap().insert(lock_key.to_string()))
        }

        async fn unlock(&self, lock_key: &str, _auth_token: &str) -> Result<(), AppointmentError> {
            self.locks.lock().unwrap().remove(lock_key);
            Ok(())
        }
    }
}
