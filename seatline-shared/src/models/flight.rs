use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::seat_map;

/// A scheduled flight. Capacity is fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flight {
    pub id: Uuid,
    pub origin: String,
    pub destination: String,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub capacity: u32,
    pub created_at: DateTime<Utc>,
}

impl Flight {
    pub fn new(
        origin: String,
        destination: String,
        departure_time: DateTime<Utc>,
        arrival_time: DateTime<Utc>,
        capacity: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            origin,
            destination,
            departure_time,
            arrival_time,
            capacity,
            created_at: crate::models::seat::now_micros(),
        }
    }

    /// Canonical seat number if `label` names a seat within this flight's capacity.
    pub fn seat_number(&self, label: &str) -> Option<String> {
        let index = seat_map::seat_index(label)?;
        if index > self.capacity {
            return None;
        }
        seat_map::seat_label(index)
    }

    /// Every seat number of the cabin, in order.
    pub fn seat_numbers(&self) -> impl Iterator<Item = String> {
        seat_map::labels(self.capacity)
    }
}
