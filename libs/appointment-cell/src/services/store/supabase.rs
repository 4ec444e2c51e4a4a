// libs/appointment-cell/src/services/store/supabase.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use doctor_cell::models::{AvailabilityWindow, ConsultationType, FeeTable, TimeOfDay};
use shared_database::supabase::{
    is_conflict, prefer_ignore_duplicates, prefer_representation, SupabaseClient, SupabaseError,
};

use crate::models::{
    Actor, Appointment, AppointmentGuard, AppointmentPatch, AppointmentStatus, LedgerHeader,
    LedgerSlot, PaymentStatus, SlotClaim, SlotStatus,
};

use super::{AppointmentStore, LedgerStore, StoreError};

/// PostgREST-backed store over `booking_ledgers`, `ledger_slots` and
/// `appointments`. Conditional writes are `PATCH` requests whose filters
/// carry the expected state; PostgREST applies each as one `UPDATE`, so an
/// empty representation means the precondition did not hold.
pub struct SupabaseBookingStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseBookingStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn fetch<T>(&self, path: &str) -> Result<Vec<T>, StoreError>
    where
        T: serde::de::DeserializeOwned,
    {
        self.supabase
            .request(Method::GET, path, None, None)
            .await
            .map_err(store_error)
    }

    async fn write<T>(&self, method: Method, path: &str, body: Value, ignore_duplicates: bool) -> Result<Vec<T>, StoreError>
    where
        T: serde::de::DeserializeOwned,
    {
        let headers = if ignore_duplicates { prefer_ignore_duplicates() } else { prefer_representation() };
        self.supabase
            .request_with_headers(method, path, None, Some(body), Some(headers))
            .await
            .map_err(store_error)
    }
}

/// Sorts a client failure into the store taxonomy. Transport faults and
/// gateway errors are transient; everything else is not worth retrying.
fn store_error(err: anyhow::Error) -> StoreError {
    if is_conflict(&err) {
        return StoreError::Conflict(err.to_string());
    }
    if let Some(SupabaseError::Api { status, .. }) = err.downcast_ref::<SupabaseError>() {
        if *status >= 500 {
            return StoreError::Unavailable(err.to_string());
        }
    }
    if err.downcast_ref::<reqwest::Error>().is_some() {
        return StoreError::Unavailable(err.to_string());
    }
    if err.downcast_ref::<serde_json::Error>().is_some() {
        return StoreError::Malformed(err.to_string());
    }
    StoreError::Backend(err.to_string())
}

// ==============================================================================
// ROW SHAPES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerHeaderRow {
    id: Uuid,
    doctor_id: String,
    date: NaiveDate,
    availability_from: Option<TimeOfDay>,
    availability_to: Option<TimeOfDay>,
    slot_duration_minutes: u32,
    consultation_fee: FeeTable,
    created_at: DateTime<Utc>,
}

impl From<LedgerHeader> for LedgerHeaderRow {
    fn from(header: LedgerHeader) -> Self {
        Self {
            id: header.id,
            doctor_id: header.doctor_id,
            date: header.date,
            availability_from: header.window.map(|w| w.start),
            availability_to: header.window.map(|w| w.end),
            slot_duration_minutes: header.slot_duration_minutes,
            consultation_fee: header.fees,
            created_at: header.created_at,
        }
    }
}

impl From<LedgerHeaderRow> for LedgerHeader {
    fn from(row: LedgerHeaderRow) -> Self {
        let window = match (row.availability_from, row.availability_to) {
            (Some(start), Some(end)) => Some(AvailabilityWindow::new(start, end)),
            _ => None,
        };
        Self {
            id: row.id,
            doctor_id: row.doctor_id,
            date: row.date,
            window,
            slot_duration_minutes: row.slot_duration_minutes,
            fees: row.consultation_fee,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AppointmentRow {
    id: Uuid,
    patient_id: String,
    doctor_id: String,
    consultation_type: ConsultationType,
    date: NaiveDate,
    start_time: TimeOfDay,
    end_time: TimeOfDay,
    scheduled_at: NaiveDateTime,
    slot_id: Uuid,
    fee: f64,
    status: AppointmentStatus,
    payment_status: PaymentStatus,
    notes: Option<String>,
    cancelled_at: Option<DateTime<Utc>>,
    cancel_reason: Option<String>,
    cancelled_by: Option<Actor>,
    rescheduled_by: Option<Actor>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<Appointment> for AppointmentRow {
    fn from(a: Appointment) -> Self {
        Self {
            id: a.id,
            patient_id: a.patient_id,
            doctor_id: a.doctor_id,
            consultation_type: a.consultation_type,
            date: a.date,
            start_time: a.start_time,
            end_time: a.end_time,
            scheduled_at: a.scheduled_at,
            slot_id: a.slot_id,
            fee: a.fee,
            status: a.status,
            payment_status: a.payment_status,
            notes: a.notes,
            cancelled_at: a.cancelled_at,
            cancel_reason: a.cancel_reason,
            cancelled_by: a.cancelled_by,
            rescheduled_by: a.rescheduled_by,
            completed_at: a.completed_at,
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}

impl From<AppointmentRow> for Appointment {
    fn from(r: AppointmentRow) -> Self {
        Self {
            id: r.id,
            patient_id: r.patient_id,
            doctor_id: r.doctor_id,
            consultation_type: r.consultation_type,
            date: r.date,
            start_time: r.start_time,
            end_time: r.end_time,
            scheduled_at: r.scheduled_at,
            slot_id: r.slot_id,
            fee: r.fee,
            status: r.status,
            payment_status: r.payment_status,
            notes: r.notes,
            cancelled_at: r.cancelled_at,
            cancel_reason: r.cancel_reason,
            cancelled_by: r.cancelled_by,
            rescheduled_by: r.rescheduled_by,
            completed_at: r.completed_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Column updates for a conditional appointment PATCH.
fn patch_body(patch: &AppointmentPatch, now: DateTime<Utc>) -> Value {
    let mut body = Map::new();
    if let Some(status) = patch.status {
        body.insert("status".into(), json!(status));
    }
    if let Some(date) = patch.date {
        body.insert("date".into(), json!(date));
    }
    if let Some(start_time) = patch.start_time {
        body.insert("start_time".into(), json!(start_time));
    }
    if let Some(end_time) = patch.end_time {
        body.insert("end_time".into(), json!(end_time));
    }
    if let Some(scheduled_at) = patch.scheduled_at {
        body.insert("scheduled_at".into(), json!(scheduled_at));
    }
    if let Some(slot_id) = patch.slot_id {
        body.insert("slot_id".into(), json!(slot_id));
    }
    if let Some(consultation_type) = patch.consultation_type {
        body.insert("consultation_type".into(), json!(consultation_type));
    }
    if let Some(cancelled_at) = patch.cancelled_at {
        body.insert("cancelled_at".into(), json!(cancelled_at));
    }
    if let Some(cancel_reason) = &patch.cancel_reason {
        body.insert("cancel_reason".into(), json!(cancel_reason));
    }
    if let Some(cancelled_by) = patch.cancelled_by {
        body.insert("cancelled_by".into(), json!(cancelled_by));
    }
    if let Some(rescheduled_by) = patch.rescheduled_by {
        body.insert("rescheduled_by".into(), json!(rescheduled_by));
    }
    if let Some(completed_at) = patch.completed_at {
        body.insert("completed_at".into(), json!(completed_at));
    }
    body.insert("updated_at".into(), json!(now));
    Value::Object(body)
}

fn slot_filter(doctor_id: &str, date: NaiveDate, time_of_day: TimeOfDay) -> String {
    format!("doctor_id=eq.{}&date=eq.{}&time_of_day=eq.{}", doctor_id, date, time_of_day)
}

// ==============================================================================
// LEDGER STORE
// ==============================================================================

#[async_trait]
impl LedgerStore for SupabaseBookingStore {
    async fn find_ledger(&self, doctor_id: &str, date: NaiveDate) -> Result<Option<LedgerHeader>, StoreError> {
        let path = format!("/rest/v1/booking_ledgers?doctor_id=eq.{}&date=eq.{}", doctor_id, date);
        let rows: Vec<LedgerHeaderRow> = self.fetch(&path).await?;
        Ok(rows.into_iter().next().map(LedgerHeader::from))
    }

    async fn insert_ledger(&self, header: LedgerHeader) -> Result<LedgerHeader, StoreError> {
        let (doctor_id, date) = (header.doctor_id.clone(), header.date);
        let body = serde_json::to_value(LedgerHeaderRow::from(header))
            .map_err(|e| StoreError::Malformed(e.to_string()))?;

        let inserted: Result<Vec<LedgerHeaderRow>, StoreError> = self
            .write(Method::POST, "/rest/v1/booking_ledgers?on_conflict=doctor_id,date", body, true)
            .await;

        match inserted {
            Ok(rows) => {
                if let Some(row) = rows.into_iter().next() {
                    return Ok(row.into());
                }
            }
            Err(StoreError::Conflict(_)) => {}
            Err(e) => return Err(e),
        }

        // Duplicate ignored or rejected: another caller materialized it first.
        debug!("Ledger for doctor {} on {} already exists, reading it back", doctor_id, date);
        self.find_ledger(&doctor_id, date).await?.ok_or_else(|| {
            StoreError::Backend(format!("ledger for doctor {} on {} vanished after insert", doctor_id, date))
        })
    }

    async fn load_slots(&self, doctor_id: &str, date: NaiveDate) -> Result<Vec<LedgerSlot>, StoreError> {
        let path = format!(
            "/rest/v1/ledger_slots?doctor_id=eq.{}&date=eq.{}&order=time_of_day.asc",
            doctor_id, date
        );
        self.fetch(&path).await
    }

    async fn insert_free_slots(&self, slots: Vec<LedgerSlot>) -> Result<(), StoreError> {
        if slots.is_empty() {
            return Ok(());
        }
        let body = serde_json::to_value(&slots).map_err(|e| StoreError::Malformed(e.to_string()))?;
        let _: Vec<LedgerSlot> = self
            .write(Method::POST, "/rest/v1/ledger_slots?on_conflict=doctor_id,date,time_of_day", body, true)
            .await?;
        Ok(())
    }

    async fn find_slot(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        time_of_day: TimeOfDay,
    ) -> Result<Option<LedgerSlot>, StoreError> {
        let path = format!("/rest/v1/ledger_slots?{}", slot_filter(doctor_id, date, time_of_day));
        let rows: Vec<LedgerSlot> = self.fetch(&path).await?;
        Ok(rows.into_iter().next())
    }

    async fn claim_slot(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        time_of_day: TimeOfDay,
        claim: &SlotClaim,
    ) -> Result<Option<LedgerSlot>, StoreError> {
        let path = format!(
            "/rest/v1/ledger_slots?{}&status=eq.free",
            slot_filter(doctor_id, date, time_of_day)
        );
        let body = json!({
            "status": SlotStatus::Booked,
            "booking_ref": claim.booking_ref,
            "booked_at": claim.booked_at,
            "consultation_type": claim.consultation_type,
            "fee": claim.fee,
        });

        let rows: Vec<LedgerSlot> = self.write(Method::PATCH, &path, body, false).await?;
        if rows.len() > 1 {
            warn!("Claim on {} {} for doctor {} matched {} rows", date, time_of_day, doctor_id, rows.len());
        }
        Ok(rows.into_iter().next())
    }

    async fn release_slot(&self, slot_id: Uuid, booking_ref: Uuid) -> Result<bool, StoreError> {
        let path = format!(
            "/rest/v1/ledger_slots?id=eq.{}&booking_ref=eq.{}&status=eq.booked",
            slot_id, booking_ref
        );
        let body = json!({
            "status": SlotStatus::Free,
            "booking_ref": Value::Null,
            "booked_at": Value::Null,
            "consultation_type": Value::Null,
            "fee": Value::Null,
        });

        let rows: Vec<LedgerSlot> = self.write(Method::PATCH, &path, body, false).await?;
        Ok(!rows.is_empty())
    }
}

// ==============================================================================
// APPOINTMENT STORE
// ==============================================================================

#[async_trait]
impl AppointmentStore for SupabaseBookingStore {
    async fn insert(&self, appointment: Appointment) -> Result<Appointment, StoreError> {
        let body = serde_json::to_value(AppointmentRow::from(appointment))
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        let rows: Vec<AppointmentRow> = self.write(Method::POST, "/rest/v1/appointments", body, false).await?;
        rows.into_iter()
            .next()
            .map(Appointment::from)
            .ok_or_else(|| StoreError::Backend("appointment insert returned no row".to_string()))
    }

    async fn find(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let rows: Vec<AppointmentRow> = self.fetch(&format!("/rest/v1/appointments?id=eq.{}", id)).await?;
        Ok(rows.into_iter().next().map(Appointment::from))
    }

    async fn list_by_patient(&self, patient_id: &str) -> Result<Vec<Appointment>, StoreError> {
        let path = format!("/rest/v1/appointments?patient_id=eq.{}&order=scheduled_at.desc", patient_id);
        let rows: Vec<AppointmentRow> = self.fetch(&path).await?;
        Ok(rows.into_iter().map(Appointment::from).collect())
    }

    async fn list_by_doctor(&self, doctor_id: &str) -> Result<Vec<Appointment>, StoreError> {
        let path = format!("/rest/v1/appointments?doctor_id=eq.{}&order=scheduled_at.desc", doctor_id);
        let rows: Vec<AppointmentRow> = self.fetch(&path).await?;
        Ok(rows.into_iter().map(Appointment::from).collect())
    }

    async fn update_if(
        &self,
        id: Uuid,
        guard: AppointmentGuard,
        patch: AppointmentPatch,
    ) -> Result<Option<Appointment>, StoreError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.{}&slot_id=eq.{}",
            id, guard.status, guard.slot_id
        );
        let rows: Vec<AppointmentRow> = self
            .write(Method::PATCH, &path, patch_body(&patch, Utc::now()), false)
            .await?;
        Ok(rows.into_iter().next().map(Appointment::from))
    }
}
