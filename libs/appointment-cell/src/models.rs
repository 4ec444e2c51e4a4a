// libs/appointment-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use doctor_cell::models::{
    AvailabilityWindow, ConsultationType, DoctorAvailabilityProfile, FeeTable, TimeOfDay,
};

// ==============================================================================
// APPOINTMENT RECORD
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: String,
    pub doctor_id: String,
    #[serde(rename = "type")]
    pub consultation_type: ConsultationType,
    pub date: NaiveDate,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub scheduled_at: NaiveDateTime,
    /// Ledger slot this appointment occupies; kept after cancellation for audit.
    pub slot_id: Uuid,
    pub fee: f64,
    pub status: AppointmentStatus,
    pub payment_status: PaymentStatus,
    pub notes: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub cancelled_by: Option<Actor>,
    pub rescheduled_by: Option<Actor>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn slot_key(&self) -> (NaiveDate, TimeOfDay) {
        (self.date, self.start_time)
    }

    pub fn is_booked(&self) -> bool {
        self.status == AppointmentStatus::Booked
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Booked,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Booked => "booked",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Waived,
}

impl PaymentStatus {
    /// Confirmation follows payment, so anything with a price is paid.
    pub fn for_fee(fee: f64) -> Self {
        if fee > 0.0 { PaymentStatus::Paid } else { PaymentStatus::Waived }
    }
}

/// Party that cancelled or moved an appointment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Patient,
    Doctor,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Patient => write!(f, "patient"),
            Actor::Doctor => write!(f, "doctor"),
        }
    }
}

/// Field changes applied through `AppointmentStore::update_if`.
#[derive(Debug, Clone, Default)]
pub struct AppointmentPatch {
    pub status: Option<AppointmentStatus>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<TimeOfDay>,
    pub end_time: Option<TimeOfDay>,
    pub scheduled_at: Option<NaiveDateTime>,
    pub slot_id: Option<Uuid>,
    pub consultation_type: Option<ConsultationType>,
    /// `Some(None)` clears the field.
    pub cancelled_at: Option<Option<DateTime<Utc>>>,
    pub cancel_reason: Option<Option<String>>,
    pub cancelled_by: Option<Option<Actor>>,
    pub rescheduled_by: Option<Option<Actor>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AppointmentPatch {
    pub fn apply(&self, appointment: &mut Appointment, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            appointment.status = status;
        }
        if let Some(date) = self.date {
            appointment.date = date;
        }
        if let Some(start_time) = self.start_time {
            appointment.start_time = start_time;
        }
        if let Some(end_time) = self.end_time {
            appointment.end_time = end_time;
        }
        if let Some(scheduled_at) = self.scheduled_at {
            appointment.scheduled_at = scheduled_at;
        }
        if let Some(slot_id) = self.slot_id {
            appointment.slot_id = slot_id;
        }
        if let Some(consultation_type) = self.consultation_type {
            appointment.consultation_type = consultation_type;
        }
        if let Some(cancelled_at) = self.cancelled_at {
            appointment.cancelled_at = cancelled_at;
        }
        if let Some(cancel_reason) = &self.cancel_reason {
            appointment.cancel_reason = cancel_reason.clone();
        }
        if let Some(cancelled_by) = self.cancelled_by {
            appointment.cancelled_by = cancelled_by;
        }
        if let Some(rescheduled_by) = self.rescheduled_by {
            appointment.rescheduled_by = rescheduled_by;
        }
        if let Some(completed_at) = self.completed_at {
            appointment.completed_at = Some(completed_at);
        }
        appointment.updated_at = now;
    }
}

/// Precondition for a conditional appointment update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppointmentGuard {
    pub status: AppointmentStatus,
    pub slot_id: Uuid,
}

// ==============================================================================
// DAILY BOOKING LEDGER
// ==============================================================================

/// Per (doctor, date) header. Snapshots the scheduling inputs at creation so
/// later profile edits never reinterpret a materialized day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerHeader {
    pub id: Uuid,
    pub doctor_id: String,
    pub date: NaiveDate,
    pub window: Option<AvailabilityWindow>,
    pub slot_duration_minutes: u32,
    pub fees: FeeTable,
    pub created_at: DateTime<Utc>,
}

impl LedgerHeader {
    pub fn from_profile(profile: &DoctorAvailabilityProfile, date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            doctor_id: profile.doctor_id.clone(),
            date,
            window: profile.window,
            slot_duration_minutes: profile.slot_duration_minutes,
            fees: profile.fees.clone(),
            created_at: Utc::now(),
        }
    }

    /// The day's grid as fixed by the snapshot.
    pub fn grid(&self) -> Vec<TimeOfDay> {
        match self.window {
            Some(window) => doctor_cell::services::generate_slot_grid(
                window.start,
                window.end,
                self.slot_duration_minutes as i64,
            ),
            None => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Free,
    Booked,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerSlot {
    pub id: Uuid,
    pub doctor_id: String,
    pub date: NaiveDate,
    pub time_of_day: TimeOfDay,
    pub status: SlotStatus,
    pub booking_ref: Option<Uuid>,
    pub booked_at: Option<DateTime<Utc>>,
    pub consultation_type: Option<ConsultationType>,
    pub fee: Option<f64>,
}

impl LedgerSlot {
    pub fn free(header: &LedgerHeader, time_of_day: TimeOfDay) -> Self {
        Self {
            id: Uuid::new_v4(),
            doctor_id: header.doctor_id.clone(),
            date: header.date,
            time_of_day,
            status: SlotStatus::Free,
            booking_ref: None,
            booked_at: None,
            consultation_type: None,
            fee: None,
        }
    }

    pub fn is_free(&self) -> bool {
        self.status == SlotStatus::Free
    }

    pub(crate) fn mark_booked(&mut self, claim: &SlotClaim) {
        self.status = SlotStatus::Booked;
        self.booking_ref = Some(claim.booking_ref);
        self.booked_at = Some(claim.booked_at);
        self.consultation_type = Some(claim.consultation_type);
        self.fee = Some(claim.fee);
    }

    pub(crate) fn mark_free(&mut self) {
        self.status = SlotStatus::Free;
        self.booking_ref = None;
        self.booked_at = None;
        self.consultation_type = None;
        self.fee = None;
    }
}

/// Metadata attached to a slot when it moves free -> booked.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotClaim {
    pub booking_ref: Uuid,
    pub consultation_type: ConsultationType,
    pub fee: f64,
    pub booked_at: DateTime<Utc>,
}

/// A materialized day: header plus one slot per grid time.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingLedger {
    pub header: LedgerHeader,
    pub slots: Vec<LedgerSlot>,
}

impl BookingLedger {
    pub fn new(header: LedgerHeader, mut slots: Vec<LedgerSlot>) -> Self {
        slots.sort_by_key(|slot| slot.time_of_day);
        Self { header, slots }
    }

    pub fn slot_at(&self, time_of_day: TimeOfDay) -> Option<&LedgerSlot> {
        self.slots.iter().find(|slot| slot.time_of_day == time_of_day)
    }

    pub fn free_slots(&self) -> impl Iterator<Item = &LedgerSlot> {
        self.slots.iter().filter(|slot| slot.is_free())
    }

    pub fn booked_slots(&self) -> impl Iterator<Item = &LedgerSlot> {
        self.slots.iter().filter(|slot| !slot.is_free())
    }

    /// Grid times with no slot row yet.
    pub fn missing_times(&self) -> Vec<TimeOfDay> {
        self.header
            .grid()
            .into_iter()
            .filter(|time| self.slot_at(*time).is_none())
            .collect()
    }
}

// ==============================================================================
// AVAILABILITY VIEW
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlotView {
    pub slot_id: Uuid,
    pub time: TimeOfDay,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub consultation_type: Option<ConsultationType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_ref: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaySlot {
    pub time: TimeOfDay,
    pub booked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    pub doctor_id: String,
    pub date: NaiveDate,
    pub slots: Vec<SlotView>,
    pub booked_slots: Vec<SlotView>,
    pub slot_duration_minutes: u32,
    pub day_view: Vec<DaySlot>,
}

// ==============================================================================
// ENGINE INPUTS
// ==============================================================================

/// A validated reserve-and-confirm request.
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub patient_id: String,
    pub doctor_id: String,
    pub date: NaiveDate,
    pub time: TimeOfDay,
    pub consultation_type: ConsultationType,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RescheduleTarget {
    pub date: NaiveDate,
    pub time: TimeOfDay,
    pub consultation_type: Option<ConsultationType>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlotLocator {
    pub doctor_id: String,
    pub date: NaiveDate,
    pub time: TimeOfDay,
}

// ==============================================================================
// REQUEST BODIES
// ==============================================================================

// Required fields default to empty so that a missing field reaches the
// validation layer instead of failing JSON extraction.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPaymentRequest {
    #[serde(default)]
    pub patient_id: String,
    #[serde(default)]
    pub doctor_id: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default, rename = "type")]
    pub consultation_type: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelAppointmentRequest {
    pub patient_id: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleAppointmentRequest {
    pub patient_id: Option<String>,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(rename = "type")]
    pub consultation_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelSlotRequest {
    #[serde(default)]
    pub doctor_id: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityQuery {
    #[serde(default)]
    pub doctor_id: String,
    #[serde(default)]
    pub date: String,
    #[serde(rename = "type")]
    pub consultation_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DoctorAppointmentsQuery {
    pub upcoming: Option<bool>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppointmentError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Slot {time} on {date} is no longer available")]
    SlotUnavailable { date: NaiveDate, time: TimeOfDay },

    #[error("Appointment is {0}; operation requires a booked appointment")]
    InvalidState(AppointmentStatus),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Not allowed: {0}")]
    Forbidden(String),

    #[error("Ledger and appointment disagree: {0}")]
    InternalInconsistency(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl AppointmentError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppointmentError::ValidationError(message.into())
    }
}
