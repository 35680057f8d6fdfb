pub mod events;
pub mod flight;
pub mod reservation;
pub mod seat;
pub mod user;
