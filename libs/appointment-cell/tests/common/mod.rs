#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use appointment_cell::models::{
    Appointment, AppointmentGuard, AppointmentPatch, LedgerHeader, LedgerSlot, Reservation,
    SlotClaim,
};
use appointment_cell::services::{
    AppointmentStore, BookingEngine, InMemoryBookingStore, LedgerStore, StoreError,
};
use doctor_cell::models::{
    AvailabilityWindow, ConsultationType, DoctorAvailabilityProfile, FeeTable, TimeOfDay,
};
use doctor_cell::services::StaticDoctorDirectory;

pub const DOCTOR: &str = "65f1c0a2b3d4e5f601234568";
pub const OTHER_DOCTOR: &str = "65f1c0a2b3d4e5f6012345ff";
pub const P1: &str = "65f1c0a2b3d4e5f601234501";
pub const P2: &str = "65f1c0a2b3d4e5f601234502";

pub fn t(text: &str) -> TimeOfDay {
    TimeOfDay::parse(text).unwrap()
}

/// A date far enough ahead that "today" pruning never applies.
pub fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 15).unwrap()
}

pub fn profile(doctor_id: &str, from: &str, to: &str, duration: u32) -> DoctorAvailabilityProfile {
    DoctorAvailabilityProfile::new(
        doctor_id,
        Some(AvailabilityWindow::new(t(from), t(to))),
        duration,
    )
    .with_fees(
        FeeTable::new()
            .with_fee(ConsultationType::Chat, 200.0)
            .with_fee(ConsultationType::Voice, 300.0)
            .with_fee(ConsultationType::Video, 500.0),
    )
}

pub fn reservation(patient_id: &str, time: &str, consultation_type: ConsultationType) -> Reservation {
    Reservation {
        patient_id: patient_id.to_string(),
        doctor_id: DOCTOR.to_string(),
        date: day(),
        time: t(time),
        consultation_type,
        notes: None,
    }
}

pub fn times(slots: &[LedgerSlot]) -> Vec<String> {
    slots.iter().map(|slot| slot.time_of_day.to_string()).collect()
}

pub struct Fixture {
    pub engine: Arc<BookingEngine>,
    pub store: Arc<InMemoryBookingStore>,
    pub directory: Arc<StaticDoctorDirectory>,
}

impl Fixture {
    /// Doctor available 09:00-09:45 in 15 minute slots.
    pub fn new() -> Self {
        let store = Arc::new(InMemoryBookingStore::new());
        let directory = Arc::new(StaticDoctorDirectory::with_profiles([
            profile(DOCTOR, "09:00", "09:45", 15),
            profile(OTHER_DOCTOR, "10:00", "12:00", 30),
        ]));
        let engine = Arc::new(BookingEngine::new(store.clone(), store.clone(), directory.clone()));
        Self { engine, store, directory }
    }

    pub async fn slots(&self, date: NaiveDate) -> Vec<LedgerSlot> {
        self.store.load_slots(DOCTOR, date).await.unwrap()
    }

    pub async fn booked_times(&self, date: NaiveDate) -> Vec<String> {
        let slots: Vec<LedgerSlot> = self.slots(date).await.into_iter().filter(|s| !s.is_free()).collect();
        times(&slots)
    }

    pub async fn free_times(&self, date: NaiveDate) -> Vec<String> {
        let slots: Vec<LedgerSlot> = self.slots(date).await.into_iter().filter(|s| s.is_free()).collect();
        times(&slots)
    }
}

// ==============================================================================
// FAULT-INJECTING STORES
// ==============================================================================

/// Delegates to an in-memory store and fails selected operations on demand.
pub struct FaultyStore {
    pub inner: Arc<InMemoryBookingStore>,
    pub fail_insert: AtomicBool,
    pub fail_release: AtomicBool,
    /// Claims that fail with a transport error before touching the slot.
    pub drop_claims_before: AtomicUsize,
    /// Claims that apply, then report a transport error.
    pub drop_claims_after: AtomicUsize,
    pub claim_calls: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: Arc<InMemoryBookingStore>) -> Self {
        Self {
            inner,
            fail_insert: AtomicBool::new(false),
            fail_release: AtomicBool::new(false),
            drop_claims_before: AtomicUsize::new(0),
            drop_claims_after: AtomicUsize::new(0),
            claim_calls: AtomicUsize::new(0),
        }
    }

    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl LedgerStore for FaultyStore {
    async fn find_ledger(&self, doctor_id: &str, date: NaiveDate) -> Result<Option<LedgerHeader>, StoreError> {
        self.inner.find_ledger(doctor_id, date).await
    }

    async fn insert_ledger(&self, header: LedgerHeader) -> Result<LedgerHeader, StoreError> {
        self.inner.insert_ledger(header).await
    }

    async fn load_slots(&self, doctor_id: &str, date: NaiveDate) -> Result<Vec<LedgerSlot>, StoreError> {
        self.inner.load_slots(doctor_id, date).await
    }

    async fn insert_free_slots(&self, slots: Vec<LedgerSlot>) -> Result<(), StoreError> {
        self.inner.insert_free_slots(slots).await
    }

    async fn find_slot(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        time_of_day: TimeOfDay,
    ) -> Result<Option<LedgerSlot>, StoreError> {
        self.inner.find_slot(doctor_id, date, time_of_day).await
    }

    async fn claim_slot(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        time_of_day: TimeOfDay,
        claim: &SlotClaim,
    ) -> Result<Option<LedgerSlot>, StoreError> {
        self.claim_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take(&self.drop_claims_before) {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        let result = self.inner.claim_slot(doctor_id, date, time_of_day, claim).await?;
        if Self::take(&self.drop_claims_after) {
            return Err(StoreError::Unavailable("response lost".to_string()));
        }
        Ok(result)
    }

    async fn release_slot(&self, slot_id: Uuid, booking_ref: Uuid) -> Result<bool, StoreError> {
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("release rejected".to_string()));
        }
        self.inner.release_slot(slot_id, booking_ref).await
    }
}

#[async_trait]
impl AppointmentStore for FaultyStore {
    async fn insert(&self, appointment: Appointment) -> Result<Appointment, StoreError> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("insert rejected".to_string()));
        }
        self.inner.insert(appointment).await
    }

    async fn find(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        self.inner.find(id).await
    }

    async fn list_by_patient(&self, patient_id: &str) -> Result<Vec<Appointment>, StoreError> {
        self.inner.list_by_patient(patient_id).await
    }

    async fn list_by_doctor(&self, doctor_id: &str) -> Result<Vec<Appointment>, StoreError> {
        self.inner.list_by_doctor(doctor_id).await
    }

    async fn update_if(
        &self,
        id: Uuid,
        guard: AppointmentGuard,
        patch: AppointmentPatch,
    ) -> Result<Option<Appointment>, StoreError> {
        self.inner.update_if(id, guard, patch).await
    }
}

pub struct FaultyFixture {
    pub engine: BookingEngine,
    pub faults: Arc<FaultyStore>,
    pub store: Arc<InMemoryBookingStore>,
}

impl FaultyFixture {
    pub fn new(claim_retries: u32) -> Self {
        let store = Arc::new(InMemoryBookingStore::new());
        let faults = Arc::new(FaultyStore::new(store.clone()));
        let directory = Arc::new(StaticDoctorDirectory::with_profiles([profile(DOCTOR, "09:00", "09:45", 15)]));
        let engine = BookingEngine::new(faults.clone(), faults.clone(), directory)
            .with_claim_retries(claim_retries);
        Self { engine, faults, store }
    }
}
