// libs/appointment-cell/src/services/ledger.rs
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, error, info, instrument};

use doctor_cell::models::{ConsultationType, DoctorAvailabilityProfile, DoctorError};
use doctor_cell::services::{prune_past_slots, DoctorDirectory};

use crate::models::{
    AppointmentError, AvailabilityResponse, BookingLedger, DaySlot, LedgerHeader, LedgerSlot, SlotView,
};
use crate::services::store::LedgerStore;

impl From<DoctorError> for AppointmentError {
    fn from(err: DoctorError) -> Self {
        match err {
            DoctorError::NotFound => AppointmentError::NotFound("Doctor".to_string()),
            other => AppointmentError::Storage(other.to_string()),
        }
    }
}

/// Access to daily booking ledgers: lazy materialization and the
/// availability read model.
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    directory: Arc<dyn DoctorDirectory>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>, directory: Arc<dyn DoctorDirectory>) -> Self {
        Self { store, directory }
    }

    /// Returns the ledger for (doctor, date), materializing it from the
    /// doctor's current profile on first access.
    #[instrument(skip(self))]
    pub async fn ensure_ledger(&self, doctor_id: &str, date: NaiveDate) -> Result<BookingLedger, AppointmentError> {
        let header = match self.store.find_ledger(doctor_id, date).await? {
            Some(header) => header,
            None => {
                let profile = self.directory.availability_profile(doctor_id).await?;
                self.create_header(&profile, date).await?
            }
        };
        self.complete_slots(header).await
    }

    /// Same as `ensure_ledger` for a caller that already holds the profile.
    pub async fn ensure_ledger_for(
        &self,
        profile: &DoctorAvailabilityProfile,
        date: NaiveDate,
    ) -> Result<BookingLedger, AppointmentError> {
        let header = match self.store.find_ledger(&profile.doctor_id, date).await? {
            Some(header) => header,
            None => self.create_header(profile, date).await?,
        };
        self.complete_slots(header).await
    }

    async fn create_header(
        &self,
        profile: &DoctorAvailabilityProfile,
        date: NaiveDate,
    ) -> Result<LedgerHeader, AppointmentError> {
        let candidate = LedgerHeader::from_profile(profile, date);
        let candidate_id = candidate.id;
        let stored = self.store.insert_ledger(candidate).await?;

        if stored.id == candidate_id {
            info!(
                "Materialized ledger for doctor {} on {} ({} slots of {} min)",
                stored.doctor_id,
                date,
                stored.grid().len(),
                stored.slot_duration_minutes
            );
        } else {
            debug!("Lost ledger creation race for doctor {} on {}", stored.doctor_id, date);
        }
        Ok(stored)
    }

    /// Brings the slot rows in line with the header's grid. Rows are derived
    /// from the stored snapshot, so it does not matter which caller created it.
    async fn complete_slots(&self, header: LedgerHeader) -> Result<BookingLedger, AppointmentError> {
        let slots = self.store.load_slots(&header.doctor_id, header.date).await?;
        let ledger = BookingLedger::new(header, slots);

        let missing = ledger.missing_times();
        if missing.is_empty() {
            return Ok(ledger);
        }

        debug!("Inserting {} missing slot rows for {}", missing.len(), ledger.header.date);
        let rows: Vec<LedgerSlot> = missing
            .into_iter()
            .map(|time| LedgerSlot::free(&ledger.header, time))
            .collect();
        self.store.insert_free_slots(rows).await?;

        let slots = self.store.load_slots(&ledger.header.doctor_id, ledger.header.date).await?;
        let ledger = BookingLedger::new(ledger.header, slots);

        let still_missing = ledger.missing_times();
        if !still_missing.is_empty() {
            error!(
                "Ledger {} for doctor {} on {} is missing slots {:?} after reconciliation",
                ledger.header.id, ledger.header.doctor_id, ledger.header.date, still_missing
            );
            return Err(AppointmentError::InternalInconsistency(format!(
                "ledger for {} is incomplete",
                ledger.header.date
            )));
        }
        Ok(ledger)
    }

    /// Free/booked partition for one day. Free slots carry the requested
    /// type's fee from the ledger snapshot; booked slots keep the type they
    /// were booked under regardless of the filter. Times already past today
    /// are pruned from the free list and the day view only.
    pub async fn get_availability(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        consultation_type: Option<ConsultationType>,
        now: NaiveDateTime,
    ) -> Result<AvailabilityResponse, AppointmentError> {
        let ledger = self.ensure_ledger(doctor_id, date).await?;
        let duration = ledger.header.slot_duration_minutes;

        let visible = prune_past_slots(
            ledger.slots.iter().map(|slot| slot.time_of_day).collect(),
            date,
            now,
            duration,
        );

        let slots = ledger
            .free_slots()
            .filter(|slot| visible.contains(&slot.time_of_day))
            .map(|slot| SlotView {
                slot_id: slot.id,
                time: slot.time_of_day,
                consultation_type,
                fee: consultation_type.map(|t| ledger.header.fees.fee_for(t)),
                booking_ref: None,
                booked_at: None,
            })
            .collect();

        let booked_slots = ledger
            .booked_slots()
            .map(|slot| SlotView {
                slot_id: slot.id,
                time: slot.time_of_day,
                consultation_type: slot.consultation_type,
                fee: slot.fee,
                booking_ref: slot.booking_ref,
                booked_at: slot.booked_at,
            })
            .collect();

        let day_view = ledger
            .slots
            .iter()
            .filter(|slot| visible.contains(&slot.time_of_day))
            .map(|slot| DaySlot { time: slot.time_of_day, booked: !slot.is_free() })
            .collect();

        Ok(AvailabilityResponse {
            doctor_id: doctor_id.to_string(),
            date,
            slots,
            booked_slots,
            slot_duration_minutes: duration,
            day_view,
        })
    }
}
