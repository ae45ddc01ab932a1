//! After-Hours mode authorization gate.

mod gate;
mod middleware;

pub use gate::{AccessDecision, AfterHoursGate};
pub use middleware::{AfterHoursAccess, require_after_hours_access};
