// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use doctor_cell::models::{ConsultationType, TimeOfDay};
use doctor_cell::services::{DoctorDirectory, StaticDoctorDirectory, SupabaseDoctorDirectory};
use shared_config::{AppConfig, BookingStoreKind};
use shared_database::supabase::SupabaseClient;

use crate::models::{
    Actor, Appointment, AppointmentError, AppointmentGuard, AppointmentPatch, AppointmentStatus,
    AvailabilityResponse, LedgerSlot, PaymentStatus, Reservation, RescheduleTarget, SlotClaim,
    SlotLocator,
};
use crate::services::ledger::LedgerService;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::store::{
    AppointmentStore, InMemoryBookingStore, LedgerStore, SupabaseBookingStore,
};

/// Guarded appointment updates that lose to a concurrent reschedule are
/// re-evaluated against the fresh record this many times.
const MAX_GUARD_ATTEMPTS: usize = 3;

/// Coordinates reserve, cancel, reschedule and complete against the daily
/// ledgers and the appointment records.
///
/// Slot occupancy changes only through the store's compare-and-swap
/// primitives. Every multi-step operation claims before it releases and
/// compensates on failure, so a caller observes either the whole change
/// or none of it.
pub struct BookingEngine {
    ledger: LedgerService,
    ledgers: Arc<dyn LedgerStore>,
    appointments: Arc<dyn AppointmentStore>,
    directory: Arc<dyn DoctorDirectory>,
    lifecycle: AppointmentLifecycleService,
    claim_retry_attempts: u32,
}

impl BookingEngine {
    pub fn new(
        ledgers: Arc<dyn LedgerStore>,
        appointments: Arc<dyn AppointmentStore>,
        directory: Arc<dyn DoctorDirectory>,
    ) -> Self {
        Self {
            ledger: LedgerService::new(Arc::clone(&ledgers), Arc::clone(&directory)),
            ledgers,
            appointments,
            directory,
            lifecycle: AppointmentLifecycleService::new(),
            claim_retry_attempts: 1,
        }
    }

    pub fn with_claim_retries(mut self, attempts: u32) -> Self {
        self.claim_retry_attempts = attempts;
        self
    }

    /// Wires the configured storage backend. Doctor profiles are always read
    /// from Supabase when it is configured.
    pub fn from_config(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        let directory: Arc<dyn DoctorDirectory> = if config.has_supabase() {
            Arc::new(SupabaseDoctorDirectory::with_client(Arc::clone(&supabase)))
        } else {
            warn!("Supabase not configured, doctor directory starts empty");
            Arc::new(StaticDoctorDirectory::new())
        };

        let engine = match config.booking_store {
            BookingStoreKind::Supabase => {
                let store = Arc::new(SupabaseBookingStore::new(supabase));
                Self::new(store.clone(), store, directory)
            }
            BookingStoreKind::Memory => {
                let store = Arc::new(InMemoryBookingStore::new());
                Self::new(store.clone(), store, directory)
            }
        };

        info!("Booking engine using {} store", config.booking_store);
        engine.with_claim_retries(config.claim_retry_attempts)
    }

    pub fn lifecycle(&self) -> &AppointmentLifecycleService {
        &self.lifecycle
    }

    // ==========================================================================
    // READS
    // ==========================================================================

    pub async fn availability(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        consultation_type: Option<ConsultationType>,
        now: NaiveDateTime,
    ) -> Result<AvailabilityResponse, AppointmentError> {
        self.ledger.get_availability(doctor_id, date, consultation_type, now).await
    }

    pub async fn get(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.appointments
            .find(appointment_id)
            .await?
            .ok_or_else(|| AppointmentError::NotFound("Appointment".to_string()))
    }

    /// Most recent first.
    pub async fn list_by_patient(&self, patient_id: &str) -> Result<Vec<Appointment>, AppointmentError> {
        let mut appointments = self.appointments.list_by_patient(patient_id).await?;
        appointments.sort_by(|a, b| b.scheduled_at.cmp(&a.scheduled_at));
        Ok(appointments)
    }

    /// Most recent first.
    pub async fn list_by_doctor(&self, doctor_id: &str) -> Result<Vec<Appointment>, AppointmentError> {
        let mut appointments = self.appointments.list_by_doctor(doctor_id).await?;
        appointments.sort_by(|a, b| b.scheduled_at.cmp(&a.scheduled_at));
        Ok(appointments)
    }

    /// Booked appointments starting at or after `now`, soonest first.
    pub async fn upcoming_for_doctor(
        &self,
        doctor_id: &str,
        now: NaiveDateTime,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut appointments: Vec<Appointment> = self
            .appointments
            .list_by_doctor(doctor_id)
            .await?
            .into_iter()
            .filter(|a| a.is_booked() && a.scheduled_at >= now)
            .collect();
        appointments.sort_by_key(|a| a.scheduled_at);
        Ok(appointments)
    }

    // ==========================================================================
    // RESERVE AND CONFIRM
    // ==========================================================================

    #[instrument(skip(self, reservation), fields(doctor_id = %reservation.doctor_id, date = %reservation.date, time = %reservation.time))]
    pub async fn reserve_and_confirm(&self, reservation: Reservation) -> Result<Appointment, AppointmentError> {
        info!("Reserving slot for patient {}", reservation.patient_id);

        // Step 1: current profile, the source of today's fee
        let profile = self.directory.availability_profile(&reservation.doctor_id).await?;
        let fee = profile.fee_for(reservation.consultation_type);

        // Step 2: make sure the day exists
        let ledger = self.ledger.ensure_ledger_for(&profile, reservation.date).await?;
        let quoted = ledger.header.fees.fee_for(reservation.consultation_type);
        if quoted != fee {
            info!(
                "{} fee for doctor {} changed since {} was materialized ({} -> {}), charging {}",
                reservation.consultation_type, reservation.doctor_id, reservation.date, quoted, fee, fee
            );
        }
        let duration = ledger.header.slot_duration_minutes;
        if ledger.slot_at(reservation.time).is_none() {
            debug!("{} is not on the grid for {}", reservation.time, reservation.date);
            return Err(AppointmentError::SlotUnavailable { date: reservation.date, time: reservation.time });
        }
        let end_time = end_of_slot(reservation.time, duration)?;

        // Step 3: atomic free -> booked
        let appointment_id = Uuid::new_v4();
        let now = Utc::now();
        let claim = SlotClaim {
            booking_ref: appointment_id,
            consultation_type: reservation.consultation_type,
            fee,
            booked_at: now,
        };
        let slot = self
            .claim(&reservation.doctor_id, reservation.date, reservation.time, &claim)
            .await?;

        // Step 4: the appointment; undo the claim if it cannot be written
        let appointment = Appointment {
            id: appointment_id,
            patient_id: reservation.patient_id,
            doctor_id: reservation.doctor_id,
            consultation_type: reservation.consultation_type,
            date: reservation.date,
            start_time: reservation.time,
            end_time,
            scheduled_at: reservation.date.and_time(reservation.time.to_naive_time()),
            slot_id: slot.id,
            fee,
            status: AppointmentStatus::Booked,
            payment_status: PaymentStatus::for_fee(fee),
            notes: reservation.notes,
            cancelled_at: None,
            cancel_reason: None,
            cancelled_by: None,
            rescheduled_by: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };

        match self.appointments.insert(appointment).await {
            Ok(appointment) => {
                info!("Appointment {} booked at {} {}", appointment.id, appointment.date, appointment.start_time);
                Ok(appointment)
            }
            Err(e) => {
                // The write may have landed before its response was lost.
                if let Ok(Some(existing)) = self.appointments.find(appointment_id).await {
                    warn!("Appointment {} insert reported {} but the record exists", appointment_id, e);
                    return Ok(existing);
                }

                warn!("Appointment insert failed ({}), releasing slot {}", e, slot.id);
                self.release_or_log(slot.id, appointment_id).await;
                Err(e.into())
            }
        }
    }

    // ==========================================================================
    // CANCEL
    // ==========================================================================

    #[instrument(skip(self, reason))]
    pub async fn cancel(
        &self,
        appointment_id: Uuid,
        actor: Actor,
        reason: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        for _ in 0..MAX_GUARD_ATTEMPTS {
            let appointment = self.get(appointment_id).await?;
            self.lifecycle
                .validate_status_transition(appointment.status, AppointmentStatus::Cancelled)?;

            let guard = AppointmentGuard { status: AppointmentStatus::Booked, slot_id: appointment.slot_id };
            let patch = AppointmentPatch {
                status: Some(AppointmentStatus::Cancelled),
                cancelled_at: Some(Some(Utc::now())),
                cancel_reason: Some(reason.clone()),
                cancelled_by: Some(Some(actor)),
                ..Default::default()
            };

            // Step 1: booked -> cancelled, only if nobody moved it meanwhile
            let Some(cancelled) = self.appointments.update_if(appointment_id, guard, patch).await? else {
                debug!("Appointment {} changed during cancel, re-reading", appointment_id);
                continue;
            };

            // Step 2: give the slot back
            return match self.ledgers.release_slot(appointment.slot_id, appointment.id).await {
                Ok(true) => {
                    info!("Appointment {} cancelled by {}", appointment_id, actor);
                    Ok(cancelled)
                }
                Ok(false) => {
                    error!(
                        "Slot {} is not held by appointment {}; reverting cancellation",
                        appointment.slot_id, appointment_id
                    );
                    self.revert_cancel(&appointment).await;
                    Err(AppointmentError::InternalInconsistency(format!(
                        "slot for appointment {} is not booked by it",
                        appointment_id
                    )))
                }
                Err(e) => {
                    error!("Releasing slot {} failed ({}); reverting cancellation", appointment.slot_id, e);
                    self.revert_cancel(&appointment).await;
                    Err(e.into())
                }
            };
        }

        Err(self.contention_error(appointment_id).await)
    }

    /// Cancels whatever appointment holds the slot at (doctor, date, time).
    #[instrument(skip(self, reason), fields(doctor_id = %locator.doctor_id, date = %locator.date, time = %locator.time))]
    pub async fn cancel_slot(
        &self,
        locator: &SlotLocator,
        reason: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        let slot = self
            .ledgers
            .find_slot(&locator.doctor_id, locator.date, locator.time)
            .await?
            .ok_or_else(|| AppointmentError::NotFound("Slot".to_string()))?;

        let booking_ref = match (slot.is_free(), slot.booking_ref) {
            (false, Some(booking_ref)) => booking_ref,
            _ => return Err(AppointmentError::NotFound("Booking for slot".to_string())),
        };

        if self.appointments.find(booking_ref).await?.is_none() {
            error!("Slot {} is booked by missing appointment {}", slot.id, booking_ref);
            return Err(AppointmentError::InternalInconsistency(format!(
                "slot {} references a missing appointment",
                slot.id
            )));
        }

        self.cancel(booking_ref, Actor::Doctor, reason).await
    }

    // ==========================================================================
    // RESCHEDULE
    // ==========================================================================

    #[instrument(skip(self))]
    pub async fn reschedule(
        &self,
        appointment_id: Uuid,
        target: RescheduleTarget,
        actor: Actor,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get(appointment_id).await?;
        self.lifecycle.ensure_reschedulable(&appointment)?;

        if (target.date, target.time) == appointment.slot_key() {
            return Err(AppointmentError::validation("new slot must differ from the current one"));
        }

        // Step 1: the target day, materialized if needed
        let ledger = self.ledger.ensure_ledger(&appointment.doctor_id, target.date).await?;
        if ledger.slot_at(target.time).is_none() {
            return Err(AppointmentError::SlotUnavailable { date: target.date, time: target.time });
        }
        let end_time = end_of_slot(target.time, ledger.header.slot_duration_minutes)?;

        // Step 2: claim the new slot under the existing appointment id
        let consultation_type = target.consultation_type.unwrap_or(appointment.consultation_type);
        let claim = SlotClaim {
            booking_ref: appointment.id,
            consultation_type,
            fee: appointment.fee,
            booked_at: Utc::now(),
        };
        let new_slot = self
            .claim(&appointment.doctor_id, target.date, target.time, &claim)
            .await?;

        // Step 3: re-point the appointment while it still holds the old slot
        let guard = AppointmentGuard { status: AppointmentStatus::Booked, slot_id: appointment.slot_id };
        let patch = AppointmentPatch {
            date: Some(target.date),
            start_time: Some(target.time),
            end_time: Some(end_time),
            scheduled_at: Some(target.date.and_time(target.time.to_naive_time())),
            slot_id: Some(new_slot.id),
            consultation_type: Some(consultation_type),
            rescheduled_by: Some(Some(actor)),
            ..Default::default()
        };

        let updated = match self.appointments.update_if(appointment_id, guard, patch).await {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                self.release_or_log(new_slot.id, appointment.id).await;
                let current = self.get(appointment_id).await?;
                warn!("Appointment {} changed during reschedule (now {})", appointment_id, current.status);
                return Err(AppointmentError::InvalidState(current.status));
            }
            Err(e) => {
                // Same lost-response case as the insert in reserve.
                if let Ok(current) = self.get(appointment_id).await {
                    if current.slot_id == new_slot.id && current.is_booked() {
                        warn!("Appointment {} update reported {} but was applied", appointment_id, e);
                        return self.finish_reschedule(&appointment, new_slot, current).await;
                    }
                }
                self.release_or_log(new_slot.id, appointment.id).await;
                return Err(e.into());
            }
        };

        // Step 4: release the old slot
        self.finish_reschedule(&appointment, new_slot, updated).await
    }

    async fn finish_reschedule(
        &self,
        original: &Appointment,
        new_slot: LedgerSlot,
        updated: Appointment,
    ) -> Result<Appointment, AppointmentError> {
        let failure = match self.ledgers.release_slot(original.slot_id, original.id).await {
            Ok(true) => {
                info!(
                    "Appointment {} moved from {} {} to {} {}",
                    original.id, original.date, original.start_time, updated.date, updated.start_time
                );
                return Ok(updated);
            }
            Ok(false) => AppointmentError::InternalInconsistency(format!(
                "old slot of appointment {} is not booked by it",
                original.id
            )),
            Err(e) => e.into(),
        };

        error!(
            "Releasing old slot {} for appointment {} failed ({}); reverting reschedule",
            original.slot_id, original.id, failure
        );
        self.revert_reschedule(original, new_slot.id).await;
        self.release_or_log(new_slot.id, original.id).await;
        Err(failure)
    }

    // ==========================================================================
    // COMPLETE
    // ==========================================================================

    /// booked -> completed. The slot stays booked as the day's record.
    #[instrument(skip(self))]
    pub async fn complete(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        for _ in 0..MAX_GUARD_ATTEMPTS {
            let appointment = self.get(appointment_id).await?;
            self.lifecycle
                .validate_status_transition(appointment.status, AppointmentStatus::Completed)?;

            let guard = AppointmentGuard { status: AppointmentStatus::Booked, slot_id: appointment.slot_id };
            let patch = AppointmentPatch {
                status: Some(AppointmentStatus::Completed),
                completed_at: Some(Utc::now()),
                ..Default::default()
            };

            if let Some(completed) = self.appointments.update_if(appointment_id, guard, patch).await? {
                info!("Appointment {} completed", appointment_id);
                return Ok(completed);
            }
        }

        Err(self.contention_error(appointment_id).await)
    }

    // ==========================================================================
    // HELPERS
    // ==========================================================================

    /// Compare-and-swap claim with transparent retry on transport faults.
    /// A retry that finds the slot already held by `claim.booking_ref` means
    /// an earlier attempt landed and counts as success.
    async fn claim(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        time: TimeOfDay,
        claim: &SlotClaim,
    ) -> Result<LedgerSlot, AppointmentError> {
        let mut attempt = 0;
        loop {
            match self.ledgers.claim_slot(doctor_id, date, time, claim).await {
                Ok(Some(slot)) => return Ok(slot),
                Ok(None) if attempt == 0 => {
                    debug!("Slot {} {} already taken", date, time);
                    return Err(AppointmentError::SlotUnavailable { date, time });
                }
                Ok(None) => {
                    return match self.ledgers.find_slot(doctor_id, date, time).await? {
                        Some(slot) if !slot.is_free() && slot.booking_ref == Some(claim.booking_ref) => Ok(slot),
                        _ => Err(AppointmentError::SlotUnavailable { date, time }),
                    };
                }
                Err(e) if e.is_transient() && attempt < self.claim_retry_attempts => {
                    attempt += 1;
                    warn!("Claim on {} {} failed ({}), retry {}", date, time, e, attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn release_or_log(&self, slot_id: Uuid, booking_ref: Uuid) {
        match self.ledgers.release_slot(slot_id, booking_ref).await {
            Ok(true) => debug!("Released slot {}", slot_id),
            Ok(false) => error!("Compensating release of slot {} for {} matched nothing", slot_id, booking_ref),
            Err(e) => error!("Compensating release of slot {} for {} failed: {}", slot_id, booking_ref, e),
        }
    }

    async fn revert_cancel(&self, original: &Appointment) {
        let guard = AppointmentGuard { status: AppointmentStatus::Cancelled, slot_id: original.slot_id };
        let patch = AppointmentPatch {
            status: Some(AppointmentStatus::Booked),
            cancelled_at: Some(original.cancelled_at),
            cancel_reason: Some(original.cancel_reason.clone()),
            cancelled_by: Some(original.cancelled_by),
            ..Default::default()
        };
        match self.appointments.update_if(original.id, guard, patch).await {
            Ok(Some(_)) => debug!("Reverted cancellation of {}", original.id),
            Ok(None) => error!("Could not revert cancellation of {}: record changed", original.id),
            Err(e) => error!("Could not revert cancellation of {}: {}", original.id, e),
        }
    }

    async fn revert_reschedule(&self, original: &Appointment, new_slot_id: Uuid) {
        let guard = AppointmentGuard { status: AppointmentStatus::Booked, slot_id: new_slot_id };
        let patch = AppointmentPatch {
            date: Some(original.date),
            start_time: Some(original.start_time),
            end_time: Some(original.end_time),
            scheduled_at: Some(original.scheduled_at),
            slot_id: Some(original.slot_id),
            consultation_type: Some(original.consultation_type),
            rescheduled_by: Some(original.rescheduled_by),
            ..Default::default()
        };
        match self.appointments.update_if(original.id, guard, patch).await {
            Ok(Some(_)) => debug!("Reverted reschedule of {}", original.id),
            Ok(None) => error!("Could not revert reschedule of {}: record changed", original.id),
            Err(e) => error!("Could not revert reschedule of {}: {}", original.id, e),
        }
    }

    async fn contention_error(&self, appointment_id: Uuid) -> AppointmentError {
        match self.get(appointment_id).await {
            Ok(current) if !current.is_booked() => AppointmentError::InvalidState(current.status),
            Ok(_) => AppointmentError::Storage(format!(
                "appointment {} kept changing; giving up",
                appointment_id
            )),
            Err(e) => e,
        }
    }
}

fn end_of_slot(start: TimeOfDay, duration_minutes: u32) -> Result<TimeOfDay, AppointmentError> {
    start.plus_minutes(duration_minutes).ok_or_else(|| {
        AppointmentError::InternalInconsistency(format!("slot at {} runs past midnight", start))
    })
}
