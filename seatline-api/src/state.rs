use std::sync::Arc;

use seatline_catalog::{CatalogService, SeatAllocator};
use seatline_core::events::EventSink;
use seatline_core::repository::Repositories;
use seatline_order::ReservationManager;
use seatline_store::app_config::BusinessRules;

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CatalogService>,
    pub allocator: Arc<SeatAllocator>,
    pub reservations: Arc<ReservationManager>,
    pub repos: Repositories,
    pub metrics: Arc<Metrics>,
    pub business_rules: BusinessRules,
}

impl AppState {
    /// Wire the services onto already opened store handles.
    pub fn new(
        repos: Repositories,
        events: Arc<dyn EventSink>,
        business_rules: BusinessRules,
    ) -> Result<Self, prometheus::Error> {
        let allocator = Arc::new(SeatAllocator::new(repos.seats.clone(), repos.flights.clone()));
        let catalog = Arc::new(
            CatalogService::new(
                repos.users.clone(),
                repos.flights.clone(),
                repos.seats.clone(),
                repos.reservations.clone(),
                business_rules.max_page_size,
            )
            .with_max_capacity(business_rules.max_capacity),
        );
        let reservations = Arc::new(
            ReservationManager::new(allocator.clone(), repos.reservations.clone(), events)
                .with_random_candidates(business_rules.random_seat_candidates)
                .with_max_page_size(business_rules.max_page_size),
        );

        Ok(Self {
            catalog,
            allocator,
            reservations,
            repos,
            metrics: Arc::new(Metrics::new()?),
            business_rules,
        })
    }
}
