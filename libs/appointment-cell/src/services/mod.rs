pub mod booking;
pub mod ledger;
pub mod lifecycle;
pub mod store;
pub mod validation;

pub use booking::BookingEngine;
pub use ledger::LedgerService;
pub use lifecycle::AppointmentLifecycleService;
pub use store::{AppointmentStore, InMemoryBookingStore, LedgerStore, StoreError, SupabaseBookingStore};
