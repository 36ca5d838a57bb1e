use booking_ledger::{ExpiryReaper, ReservationLedger};
use std::sync::Arc;

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<ReservationLedger>,
    pub reaper: Arc<ExpiryReaper>,
    pub metrics: Arc<Metrics>,
    pub auth: AuthConfig,
}
