// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::BookingEngine;

#[derive(Clone)]
pub struct AppointmentState {
    pub config: Arc<AppConfig>,
    pub engine: Arc<BookingEngine>,
}

pub fn appointment_routes(config: Arc<AppConfig>, engine: Arc<BookingEngine>) -> Router {
    let state = AppointmentState { config: config.clone(), engine };

    let public_routes = Router::new()
        .route("/availability", get(handlers::get_availability));

    let protected_routes = Router::new()
        // Booking
        .route("/confirm-payment", post(handlers::confirm_payment))
        .route("/cancel-slot", post(handlers::cancel_slot))
        .route("/{appointment_id}", get(handlers::get_appointment))

        // Patient actions
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/{appointment_id}/reschedule", post(handlers::reschedule_appointment))

        // Doctor actions
        .route("/{appointment_id}/doctor-cancel", post(handlers::doctor_cancel_appointment))
        .route("/{appointment_id}/doctor-reschedule", post(handlers::doctor_reschedule_appointment))
        .route("/{appointment_id}/complete", post(handlers::complete_appointment))

        // Listings
        .route("/patient/{patient_id}", get(handlers::get_patient_appointments))
        .route("/doctor/{doctor_id}", get(handlers::get_doctor_appointments))

        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
