// libs/professional-cell/src/services/directory.rs
use anyhow::{Result, anyhow};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::pagination::{Page, DEFAULT_PER_PAGE};

use crate::models::HealthcareProfessional;

pub struct ProfessionalDirectoryService {
    supabase: SupabaseClient,
}

impl ProfessionalDirectoryService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Paginated listing, optionally filtered by specialty.
    pub async fn list_professionals(
        &self,
        specialty: Option<&str>,
        page: u32,
        auth_token: &str,
    ) -> Result<Page<HealthcareProfessional>> {
        let page = page.max(1);
        let per_page = DEFAULT_PER_PAGE;
        // u64 arithmetic: a caller-supplied page near u32::MAX must not
        // overflow the offset.
        let offset = (page as u64 - 1) * per_page as u64;

        let mut path = format!(
            "/rest/v1/healthcare_professionals?order=full_name.asc&limit={}&offset={}",
            per_page, offset
        );
        if let Some(specialty) = specialty {
            path.push_str(&format!("&specialty=eq.{}", urlencoding::encode(specialty)));
        }

        debug!("Listing healthcare professionals (page {})", page);

        let (rows, total): (Vec<Value>, u64) = self.supabase
            .request_with_count(&path, Some(auth_token))
            .await?;

        let professionals = rows.into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<HealthcareProfessional>, _>>()
            .map_err(|e| anyhow!("Failed to parse professionals: {}", e))?;

        Ok(Page::new(professionals, page, per_page, total))
    }

    /// Existence check consumed by the appointment cell as a booking
    /// precondition.
    pub async fn professional_exists(&self, professional_id: Uuid, auth_token: &str) -> Result<bool> {
        let path = format!(
            "/rest/v1/healthcare_professionals?id=eq.{}&select=id&limit=1",
            professional_id
        );

        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        Ok(!rows.is_empty())
    }
}
