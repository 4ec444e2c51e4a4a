// libs/appointment-cell/src/services/validation.rs
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use uuid::Uuid;

use doctor_cell::models::{ConsultationType, TimeOfDay};

use crate::models::{
    AppointmentError, AvailabilityQuery, CancelSlotRequest, ConfirmPaymentRequest, Reservation,
    RescheduleAppointmentRequest, RescheduleTarget, SlotLocator,
};

static HEX_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{24}$").expect("static hex id pattern")
});

static YYYY_MM_DD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static date pattern")
});

pub const MAX_REASON_LENGTH: usize = 500;
pub const MAX_NOTES_LENGTH: usize = 2000;

/// Opaque patient/doctor identifier: 24 hex characters or a UUID,
/// returned lowercase so one party always maps to one key.
pub fn validate_identifier(field: &str, value: &str) -> Result<String, AppointmentError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppointmentError::validation(format!("{} is required", field)));
    }
    if HEX_ID.is_match(value) || Uuid::parse_str(value).is_ok() {
        Ok(value.to_ascii_lowercase())
    } else {
        Err(AppointmentError::validation(format!("Invalid {}", field)))
    }
}

pub fn parse_appointment_id(value: &str) -> Result<Uuid, AppointmentError> {
    Uuid::parse_str(value.trim())
        .map_err(|_| AppointmentError::validation("Invalid appointmentId"))
}

/// Strict `YYYY-MM-DD` calendar date; `2026-02-30` is rejected.
pub fn parse_date(value: &str) -> Result<NaiveDate, AppointmentError> {
    if !YYYY_MM_DD.is_match(value) {
        return Err(AppointmentError::validation("date is required (YYYY-MM-DD)"));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AppointmentError::validation(format!("Invalid date: {}", value)))
}

pub fn parse_time(value: &str) -> Result<TimeOfDay, AppointmentError> {
    TimeOfDay::parse(value).ok_or_else(|| AppointmentError::validation("time is required (HH:MM)"))
}

pub fn parse_consultation_type(value: &str) -> Result<ConsultationType, AppointmentError> {
    ConsultationType::parse(value).ok_or_else(|| {
        AppointmentError::validation("type is required (chat/voice/video/in-person)")
    })
}

fn optional_text(value: Option<&str>, field: &str, max: usize) -> Result<Option<String>, AppointmentError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) if text.chars().count() > max => Err(AppointmentError::validation(format!(
            "{} must be at most {} characters",
            field, max
        ))),
        Some(text) => Ok(Some(text.to_string())),
    }
}

pub fn validate_reason(reason: Option<&str>) -> Result<Option<String>, AppointmentError> {
    optional_text(reason, "reason", MAX_REASON_LENGTH)
}

pub fn validate_reservation(request: &ConfirmPaymentRequest) -> Result<Reservation, AppointmentError> {
    Ok(Reservation {
        patient_id: validate_identifier("patientId", &request.patient_id)?,
        doctor_id: validate_identifier("doctorId", &request.doctor_id)?,
        date: parse_date(&request.date)?,
        time: parse_time(&request.time)?,
        consultation_type: parse_consultation_type(&request.consultation_type)?,
        notes: optional_text(request.notes.as_deref(), "notes", MAX_NOTES_LENGTH)?,
    })
}

pub fn validate_reschedule(request: &RescheduleAppointmentRequest) -> Result<RescheduleTarget, AppointmentError> {
    if let Some(patient_id) = &request.patient_id {
        validate_identifier("patientId", patient_id)?;
    }
    Ok(RescheduleTarget {
        date: parse_date(&request.date)?,
        time: parse_time(&request.time)?,
        consultation_type: request
            .consultation_type
            .as_deref()
            .map(parse_consultation_type)
            .transpose()?,
    })
}

pub fn validate_cancel_slot(request: &CancelSlotRequest) -> Result<SlotLocator, AppointmentError> {
    Ok(SlotLocator {
        doctor_id: validate_identifier("doctorId", &request.doctor_id)?,
        date: parse_date(&request.date)?,
        time: parse_time(&request.time)?,
    })
}

pub fn validate_availability_query(
    query: &AvailabilityQuery,
) -> Result<(String, NaiveDate, Option<ConsultationType>), AppointmentError> {
    let doctor_id = validate_identifier("doctorId", &query.doctor_id)?;
    let date = parse_date(&query.date)?;
    let consultation_type = match query.consultation_type.as_deref() {
        None | Some("") => None,
        Some(value) => Some(parse_consultation_type(value)?),
    };
    Ok((doctor_id, date, consultation_type))
}
