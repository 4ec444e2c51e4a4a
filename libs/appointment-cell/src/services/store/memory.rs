// libs/appointment-cell/src/services/store/memory.rs
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tracing::debug;
use uuid::Uuid;

use doctor_cell::models::TimeOfDay;

use crate::models::{
    Appointment, AppointmentGuard, AppointmentPatch, LedgerHeader, LedgerSlot, SlotClaim,
};

use super::{AppointmentStore, LedgerStore, StoreError};

type LedgerKey = (String, NaiveDate);
type SlotKey = (String, NaiveDate, TimeOfDay);

#[derive(Default)]
struct MemoryState {
    ledgers: HashMap<LedgerKey, LedgerHeader>,
    slots: HashMap<Uuid, LedgerSlot>,
    slot_index: HashMap<SlotKey, Uuid>,
    appointments: HashMap<Uuid, Appointment>,
}

/// Single-process store. Every operation takes the one lock, so each
/// conditional write is atomic with respect to every other.
#[derive(Default)]
pub struct InMemoryBookingStore {
    state: Mutex<MemoryState>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
    }

    pub fn ledger_count(&self) -> usize {
        self.state().map(|state| state.ledgers.len()).unwrap_or(0)
    }

    pub fn appointment_count(&self) -> usize {
        self.state().map(|state| state.appointments.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LedgerStore for InMemoryBookingStore {
    async fn find_ledger(&self, doctor_id: &str, date: NaiveDate) -> Result<Option<LedgerHeader>, StoreError> {
        let state = self.state()?;
        Ok(state.ledgers.get(&(doctor_id.to_string(), date)).cloned())
    }

    async fn insert_ledger(&self, header: LedgerHeader) -> Result<LedgerHeader, StoreError> {
        let mut state = self.state()?;
        let stored = state
            .ledgers
            .entry((header.doctor_id.clone(), header.date))
            .or_insert(header);
        Ok(stored.clone())
    }

    async fn load_slots(&self, doctor_id: &str, date: NaiveDate) -> Result<Vec<LedgerSlot>, StoreError> {
        let state = self.state()?;
        let mut slots: Vec<LedgerSlot> = state
            .slots
            .values()
            .filter(|slot| slot.doctor_id == doctor_id && slot.date == date)
            .cloned()
            .collect();
        slots.sort_by_key(|slot| slot.time_of_day);
        Ok(slots)
    }

    async fn insert_free_slots(&self, slots: Vec<LedgerSlot>) -> Result<(), StoreError> {
        let mut state = self.state()?;
        for slot in slots {
            let key = (slot.doctor_id.clone(), slot.date, slot.time_of_day);
            if state.slot_index.contains_key(&key) {
                continue;
            }
            state.slot_index.insert(key, slot.id);
            state.slots.insert(slot.id, slot);
        }
        Ok(())
    }

    async fn find_slot(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        time_of_day: TimeOfDay,
    ) -> Result<Option<LedgerSlot>, StoreError> {
        let state = self.state()?;
        Ok(state
            .slot_index
            .get(&(doctor_id.to_string(), date, time_of_day))
            .and_then(|id| state.slots.get(id))
            .cloned())
    }

    async fn claim_slot(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        time_of_day: TimeOfDay,
        claim: &SlotClaim,
    ) -> Result<Option<LedgerSlot>, StoreError> {
        let mut state = self.state()?;
        let Some(id) = state.slot_index.get(&(doctor_id.to_string(), date, time_of_day)).copied() else {
            return Ok(None);
        };

        match state.slots.get_mut(&id) {
            Some(slot) if slot.is_free() => {
                slot.mark_booked(claim);
                Ok(Some(slot.clone()))
            }
            _ => {
                debug!("Claim on {} {} lost: slot not free", date, time_of_day);
                Ok(None)
            }
        }
    }

    async fn release_slot(&self, slot_id: Uuid, booking_ref: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state()?;
        match state.slots.get_mut(&slot_id) {
            Some(slot) if !slot.is_free() && slot.booking_ref == Some(booking_ref) => {
                slot.mark_free();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl AppointmentStore for InMemoryBookingStore {
    async fn insert(&self, appointment: Appointment) -> Result<Appointment, StoreError> {
        let mut state = self.state()?;
        if state.appointments.contains_key(&appointment.id) {
            return Err(StoreError::Conflict(format!("appointment {}", appointment.id)));
        }
        state.appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let state = self.state()?;
        Ok(state.appointments.get(&id).cloned())
    }

    async fn list_by_patient(&self, patient_id: &str) -> Result<Vec<Appointment>, StoreError> {
        let state = self.state()?;
        Ok(state
            .appointments
            .values()
            .filter(|appointment| appointment.patient_id == patient_id)
            .cloned()
            .collect())
    }

    async fn list_by_doctor(&self, doctor_id: &str) -> Result<Vec<Appointment>, StoreError> {
        let state = self.state()?;
        Ok(state
            .appointments
            .values()
            .filter(|appointment| appointment.doctor_id == doctor_id)
            .cloned()
            .collect())
    }

    async fn update_if(
        &self,
        id: Uuid,
        guard: AppointmentGuard,
        patch: AppointmentPatch,
    ) -> Result<Option<Appointment>, StoreError> {
        let mut state = self.state()?;
        match state.appointments.get_mut(&id) {
            Some(appointment) if appointment.status == guard.status && appointment.slot_id == guard.slot_id => {
                patch.apply(appointment, Utc::now());
                Ok(Some(appointment.clone()))
            }
            _ => Ok(None),
        }
    }
}
