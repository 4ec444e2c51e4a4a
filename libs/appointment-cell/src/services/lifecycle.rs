// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use shared_models::auth::User;

use crate::models::{Actor, Appointment, AppointmentError, AppointmentStatus};

pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Status only moves forward: booked -> cancelled | completed.
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidState(current_status));
        }

        Ok(())
    }

    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Booked => vec![AppointmentStatus::Cancelled, AppointmentStatus::Completed],
            // Terminal states
            AppointmentStatus::Cancelled | AppointmentStatus::Completed => vec![],
        }
    }

    /// Reschedule keeps the status but still needs a live booking.
    pub fn ensure_reschedulable(&self, appointment: &Appointment) -> Result<(), AppointmentError> {
        if appointment.is_booked() {
            Ok(())
        } else {
            Err(AppointmentError::InvalidState(appointment.status))
        }
    }

    /// Checks that `user` may act on `appointment` as `actor`. Admins act for anyone.
    pub fn authorize(&self, user: &User, appointment: &Appointment, actor: Actor) -> Result<(), AppointmentError> {
        if user.is_admin() {
            return Ok(());
        }

        let allowed = match actor {
            Actor::Patient => user.has_id(&appointment.patient_id),
            Actor::Doctor => user.has_role("doctor") && user.has_id(&appointment.doctor_id),
        };

        if allowed {
            Ok(())
        } else {
            warn!("User {} denied {} access to appointment {}", user.id, actor, appointment.id);
            Err(AppointmentError::Forbidden(format!(
                "appointment {} does not belong to this {}",
                appointment.id, actor
            )))
        }
    }

    /// Read access: either party of the appointment, or an admin.
    pub fn can_view(&self, user: &User, appointment: &Appointment) -> bool {
        user.is_admin() || user.has_id(&appointment.patient_id) || user.has_id(&appointment.doctor_id)
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}
