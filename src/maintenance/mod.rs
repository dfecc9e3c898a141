//! Daily maintenance — a date-gated batch over all contacts, plus the
//! background ticker that triggers it.

pub mod scheduler;
pub mod ticker;

pub use scheduler::{
    LAST_RUN_KEY, MAINTENANCE_NAMESPACE, MaintenanceOutcome, MaintenanceReport,
    MaintenanceScheduler, REPLY_CURSOR_KEY, THREAD_CURSOR_KEY,
};
pub use ticker::{next_fire, parse_schedule, spawn_maintenance_ticker};
