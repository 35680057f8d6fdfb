pub mod allocator;
pub mod catalog;

pub use allocator::{ClaimError, ClaimResult, ClaimedSeat, SeatAllocator};
pub use catalog::{CatalogService, Fixtures, FlightStatus};
