pub mod audit;
pub mod load;
pub mod manager;

pub use audit::{AuditReport, Divergence};
pub use load::{analyze_fairness, Fairness, FairnessReport, LoadReport, LoadStats, LoadTester};
pub use manager::{ReservationManager, NO_SEATS_AVAILABLE};
