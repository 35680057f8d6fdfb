pub mod models;
pub mod pii;
pub mod seat_map;

pub use models::events::ReservationEvent;
pub use models::flight::Flight;
pub use models::reservation::{Reservation, ReservationStatus};
pub use models::seat::{Claim, Seat};
pub use models::user::User;
pub use pii::Masked;
