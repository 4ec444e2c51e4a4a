pub mod directory;
pub mod slots;

pub use directory::{DoctorDirectory, StaticDoctorDirectory, SupabaseDoctorDirectory};
pub use slots::{generate_slot_grid, prune_past_slots, today_cutoff};
