// libs/appointment-cell/src/services/store/mod.rs
use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use doctor_cell::models::TimeOfDay;

use crate::models::{
    Appointment, AppointmentError, AppointmentGuard, AppointmentPatch, LedgerHeader, LedgerSlot, SlotClaim,
};

pub mod memory;
pub mod supabase;

pub use memory::InMemoryBookingStore;
pub use supabase::SupabaseBookingStore;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("Record already exists: {0}")]
    Conflict(String),

    /// Transport-level fault; the request may or may not have been applied.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Malformed record: {0}")]
    Malformed(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<StoreError> for AppointmentError {
    fn from(err: StoreError) -> Self {
        AppointmentError::Storage(err.to_string())
    }
}

/// Persistence for daily booking ledgers.
///
/// Mutual exclusion lives here, not in the engine: `claim_slot` and
/// `release_slot` must each be a single conditional write against shared
/// state, because several engine instances may run against one store.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn find_ledger(&self, doctor_id: &str, date: NaiveDate) -> Result<Option<LedgerHeader>, StoreError>;

    /// Inserts `header` unless a ledger already exists for its (doctor, date)
    /// key. Returns whichever header is stored afterwards.
    async fn insert_ledger(&self, header: LedgerHeader) -> Result<LedgerHeader, StoreError>;

    async fn load_slots(&self, doctor_id: &str, date: NaiveDate) -> Result<Vec<LedgerSlot>, StoreError>;

    /// Inserts free slot rows, skipping any (doctor, date, time) already present.
    async fn insert_free_slots(&self, slots: Vec<LedgerSlot>) -> Result<(), StoreError>;

    async fn find_slot(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        time_of_day: TimeOfDay,
    ) -> Result<Option<LedgerSlot>, StoreError>;

    /// Compare-and-swap free -> booked. `None` when the slot does not exist
    /// or is not free.
    async fn claim_slot(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        time_of_day: TimeOfDay,
        claim: &SlotClaim,
    ) -> Result<Option<LedgerSlot>, StoreError>;

    /// Compare-and-swap booked -> free, only while the slot is still held by
    /// `booking_ref`. `false` when nothing matched.
    async fn release_slot(&self, slot_id: Uuid, booking_ref: Uuid) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn insert(&self, appointment: Appointment) -> Result<Appointment, StoreError>;

    async fn find(&self, id: Uuid) -> Result<Option<Appointment>, StoreError>;

    async fn list_by_patient(&self, patient_id: &str) -> Result<Vec<Appointment>, StoreError>;

    async fn list_by_doctor(&self, doctor_id: &str) -> Result<Vec<Appointment>, StoreError>;

    /// Applies `patch` only while the stored record still matches `guard`.
    /// `None` when the guard no longer holds.
    async fn update_if(
        &self,
        id: Uuid,
        guard: AppointmentGuard,
        patch: AppointmentPatch,
    ) -> Result<Option<Appointment>, StoreError>;
}
