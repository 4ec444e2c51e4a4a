// libs/appointment-cell/src/handlers.rs
use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    Actor, AppointmentError, AvailabilityQuery, CancelAppointmentRequest, CancelSlotRequest,
    ConfirmPaymentRequest, DoctorAppointmentsQuery, RescheduleAppointmentRequest,
};
use crate::router::AppointmentState;
use crate::services::validation::{
    parse_appointment_id, validate_availability_query, validate_cancel_slot, validate_identifier,
    validate_reason, validate_reschedule, validate_reservation,
};

impl From<AppointmentError> for AppError {
    fn from(e: AppointmentError) -> Self {
        match e {
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::SlotUnavailable { .. } => AppError::SlotUnavailable(e.to_string()),
            AppointmentError::InvalidState(_) => AppError::InvalidState(e.to_string()),
            AppointmentError::NotFound(_) => AppError::NotFound(e.to_string()),
            AppointmentError::Forbidden(msg) => AppError::Forbidden(msg),
            AppointmentError::InternalInconsistency(msg) => AppError::Internal(msg),
            AppointmentError::Storage(msg) => AppError::Database(msg),
        }
    }
}

fn local_now() -> chrono::NaiveDateTime {
    chrono::Local::now().naive_local()
}

// ==============================================================================
// AVAILABILITY (PUBLIC)
// ==============================================================================

pub async fn get_availability(
    State(state): State<AppointmentState>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Value>, AppError> {
    let (doctor_id, date, consultation_type) = validate_availability_query(&query)?;

    let availability = state
        .engine
        .availability(&doctor_id, date, consultation_type, local_now())
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": availability
    })))
}

// ==============================================================================
// BOOKING
// ==============================================================================

/// Reserve-and-confirm, called once the (simulated) payment went through.
#[axum::debug_handler]
pub async fn confirm_payment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Json(request): Json<ConfirmPaymentRequest>,
) -> Result<Json<Value>, AppError> {
    let reservation = validate_reservation(&request)?;

    // Patients book for themselves; admins for anyone
    if !user.has_id(&reservation.patient_id) && !user.is_admin() {
        return Err(AppError::Forbidden("Not authorized to book for this patient".to_string()));
    }

    let appointment = state.engine.reserve_and_confirm(reservation).await?;

    Ok(Json(json!({
        "success": true,
        "appointmentId": appointment.id,
        "data": appointment,
        "message": "Appointment confirmed"
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<String>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointment_id = parse_appointment_id(&appointment_id)?;
    let appointment = state.engine.get(appointment_id).await?;

    if !state.engine.lifecycle().can_view(&user, &appointment) {
        return Err(AppError::Forbidden("Not authorized to view this appointment".to_string()));
    }

    Ok(Json(json!({
        "success": true,
        "data": appointment
    })))
}

// ==============================================================================
// CANCELLATION
// ==============================================================================

async fn authorized_appointment(
    state: &AppointmentState,
    user: &User,
    appointment_id: &str,
    actor: Actor,
) -> Result<Uuid, AppError> {
    let appointment_id = parse_appointment_id(appointment_id)?;
    let appointment = state.engine.get(appointment_id).await?;
    state.engine.lifecycle().authorize(user, &appointment, actor)?;
    Ok(appointment_id)
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<String>,
    Extension(user): Extension<User>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let reason = validate_reason(request.reason.as_deref())?;
    let appointment_id = authorized_appointment(&state, &user, &appointment_id, Actor::Patient).await?;

    if let Some(patient_id) = &request.patient_id {
        let patient_id = validate_identifier("patientId", patient_id)?;
        let appointment = state.engine.get(appointment_id).await?;
        if appointment.patient_id != patient_id {
            return Err(AppError::Forbidden("Appointment does not belong to this patient".to_string()));
        }
    }

    let appointment = state.engine.cancel(appointment_id, Actor::Patient, reason).await?;

    Ok(Json(json!({
        "success": true,
        "data": appointment,
        "message": "Appointment cancelled"
    })))
}

#[axum::debug_handler]
pub async fn doctor_cancel_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<String>,
    Extension(user): Extension<User>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let reason = validate_reason(request.reason.as_deref())?;
    let appointment_id = authorized_appointment(&state, &user, &appointment_id, Actor::Doctor).await?;

    let appointment = state.engine.cancel(appointment_id, Actor::Doctor, reason).await?;

    Ok(Json(json!({
        "success": true,
        "data": appointment,
        "message": "Appointment cancelled by doctor"
    })))
}

/// A doctor frees one of their booked slots by time.
#[axum::debug_handler]
pub async fn cancel_slot(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Json(request): Json<CancelSlotRequest>,
) -> Result<Json<Value>, AppError> {
    let locator = validate_cancel_slot(&request)?;
    let reason = validate_reason(request.reason.as_deref())?;

    let is_owner = user.has_role("doctor") && user.has_id(&locator.doctor_id);
    if !is_owner && !user.is_admin() {
        return Err(AppError::Forbidden("Not authorized to cancel this doctor's slots".to_string()));
    }

    let appointment = state.engine.cancel_slot(&locator, reason).await?;

    Ok(Json(json!({
        "success": true,
        "data": appointment,
        "message": "Slot released"
    })))
}

// ==============================================================================
// RESCHEDULE AND COMPLETION
// ==============================================================================

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<String>,
    Extension(user): Extension<User>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let target = validate_reschedule(&request)?;
    let appointment_id = authorized_appointment(&state, &user, &appointment_id, Actor::Patient).await?;

    let appointment = state.engine.reschedule(appointment_id, target, Actor::Patient).await?;

    Ok(Json(json!({
        "success": true,
        "data": appointment,
        "message": "Appointment rescheduled"
    })))
}

#[axum::debug_handler]
pub async fn doctor_reschedule_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<String>,
    Extension(user): Extension<User>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let target = validate_reschedule(&request)?;
    let appointment_id = authorized_appointment(&state, &user, &appointment_id, Actor::Doctor).await?;

    let appointment = state.engine.reschedule(appointment_id, target, Actor::Doctor).await?;

    Ok(Json(json!({
        "success": true,
        "data": appointment,
        "message": "Appointment rescheduled by doctor"
    })))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<String>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointment_id = authorized_appointment(&state, &user, &appointment_id, Actor::Doctor).await?;

    let appointment = state.engine.complete(appointment_id).await?;

    Ok(Json(json!({
        "success": true,
        "data": appointment
    })))
}

// ==============================================================================
// LISTINGS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_patient_appointments(
    State(state): State<AppointmentState>,
    Path(patient_id): Path<String>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let patient_id = validate_identifier("patientId", &patient_id)?;

    if !user.has_id(&patient_id) && !user.is_admin() {
        return Err(AppError::Forbidden("Not authorized to view these appointments".to_string()));
    }

    let appointments = state.engine.list_by_patient(&patient_id).await?;

    Ok(Json(json!({
        "success": true,
        "total": appointments.len(),
        "data": appointments
    })))
}

#[axum::debug_handler]
pub async fn get_doctor_appointments(
    State(state): State<AppointmentState>,
    Path(doctor_id): Path<String>,
    Query(query): Query<DoctorAppointmentsQuery>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = validate_identifier("doctorId", &doctor_id)?;

    if !user.has_id(&doctor_id) && !user.is_admin() {
        return Err(AppError::Forbidden("Not authorized to view these appointments".to_string()));
    }

    let appointments = if query.upcoming.unwrap_or(false) {
        state.engine.upcoming_for_doctor(&doctor_id, local_now()).await?
    } else {
        state.engine.list_by_doctor(&doctor_id).await?
    };

    Ok(Json(json!({
        "success": true,
        "total": appointments.len(),
        "data": appointments
    })))
}
