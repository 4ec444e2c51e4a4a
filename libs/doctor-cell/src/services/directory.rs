// libs/doctor-cell/src/services/directory.rs
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, warn};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    AvailabilityWindow, ConsultationType, DoctorAvailabilityProfile, DoctorError, FeeTable,
    TimeOfDay, DEFAULT_SLOT_DURATION_MINUTES, MAX_SLOT_DURATION_MINUTES, MIN_SLOT_DURATION_MINUTES,
};

/// Read access to doctors' availability profiles. The booking engine never
/// writes through this seam.
#[async_trait]
pub trait DoctorDirectory: Send + Sync {
    async fn availability_profile(&self, doctor_id: &str) -> Result<DoctorAvailabilityProfile, DoctorError>;
}

/// Shape of a `doctors` row as selected for scheduling.
#[derive(Debug, Clone, Deserialize)]
pub struct DoctorProfileRow {
    pub id: String,
    pub availability_from: Option<String>,
    pub availability_to: Option<String>,
    pub slot_duration_minutes: Option<i64>,
    pub consultation_fee: Option<HashMap<String, f64>>,
}

impl DoctorProfileRow {
    pub fn into_profile(self) -> Result<DoctorAvailabilityProfile, DoctorError> {
        let duration = match self.slot_duration_minutes {
            None => DEFAULT_SLOT_DURATION_MINUTES,
            Some(d) if (MIN_SLOT_DURATION_MINUTES as i64..=MAX_SLOT_DURATION_MINUTES as i64).contains(&d) => d as u32,
            Some(d) => {
                return Err(DoctorError::InvalidProfile(format!(
                    "slot duration {} outside {}..={} minutes",
                    d, MIN_SLOT_DURATION_MINUTES, MAX_SLOT_DURATION_MINUTES
                )));
            }
        };

        // Unparseable hours mean "not configured": the doctor simply has no slots.
        let window = match (
            self.availability_from.as_deref().map(str::trim).and_then(TimeOfDay::parse),
            self.availability_to.as_deref().map(str::trim).and_then(TimeOfDay::parse),
        ) {
            (Some(start), Some(end)) => Some(AvailabilityWindow::new(start, end)),
            _ => {
                debug!("Doctor {} has no usable availability window", self.id);
                None
            }
        };

        let mut fees = FeeTable::new();
        for (key, amount) in self.consultation_fee.unwrap_or_default() {
            match ConsultationType::parse(&key) {
                Some(consultation_type) => fees.set(consultation_type, amount),
                None => warn!("Ignoring fee for unknown consultation type '{}' on doctor {}", key, self.id),
            }
        }

        Ok(DoctorAvailabilityProfile::new(self.id, window, duration).with_fees(fees))
    }
}

pub struct SupabaseDoctorDirectory {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseDoctorDirectory {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_client(Arc::new(SupabaseClient::new(config)))
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl DoctorDirectory for SupabaseDoctorDirectory {
    async fn availability_profile(&self, doctor_id: &str) -> Result<DoctorAvailabilityProfile, DoctorError> {
        debug!("Fetching availability profile for doctor: {}", doctor_id);

        let path = format!(
            "/rest/v1/doctors?id=eq.{}&select=id,availability_from,availability_to,slot_duration_minutes,consultation_fee",
            doctor_id
        );
        let rows: Vec<DoctorProfileRow> = self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| DoctorError::Directory(e.to_string()))?;

        rows.into_iter()
            .next()
            .ok_or(DoctorError::NotFound)?
            .into_profile()
    }
}

/// Profiles held in memory. Backs local runs and tests; `upsert` stands in
/// for a doctor editing their schedule.
#[derive(Default)]
pub struct StaticDoctorDirectory {
    profiles: RwLock<HashMap<String, DoctorAvailabilityProfile>>,
}

impl StaticDoctorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profiles(profiles: impl IntoIterator<Item = DoctorAvailabilityProfile>) -> Self {
        let directory = Self::new();
        for profile in profiles {
            directory.upsert(profile);
        }
        directory
    }

    pub fn upsert(&self, profile: DoctorAvailabilityProfile) {
        let mut profiles = self.profiles.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        profiles.insert(profile.doctor_id.clone(), profile);
    }
}

#[async_trait]
impl DoctorDirectory for StaticDoctorDirectory {
    async fn availability_profile(&self, doctor_id: &str) -> Result<DoctorAvailabilityProfile, DoctorError> {
        let profiles = self.profiles.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        profiles.get(doctor_id).cloned().ok_or(DoctorError::NotFound)
    }
}
