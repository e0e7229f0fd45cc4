//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use std::sync::Arc;

use crate::config::Config;
use lms_core::ports::{CardPaymentGateway, DatabaseService, MobileMoneyGateway};
use lms_core::progress::ProgressTracker;
use lms_core::settlement::PaymentSettlement;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// Everything a handler can reach: the storage port, the two payment
/// gateways, and the domain services built over them.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub card_gateway: Arc<dyn CardPaymentGateway>,
    pub mobile_gateway: Arc<dyn MobileMoneyGateway>,
    pub progress: Arc<ProgressTracker>,
    pub settlement: Arc<PaymentSettlement>,
}

impl AppState {
    /// Wires the services around one database port and the two payment
    /// gateways.
    pub fn new(
        db: Arc<dyn DatabaseService>,
        config: Arc<Config>,
        card_gateway: Arc<dyn CardPaymentGateway>,
        mobile_gateway: Arc<dyn MobileMoneyGateway>,
    ) -> Self {
        let progress = Arc::new(ProgressTracker::new(db.clone()));
        let settlement = Arc::new(PaymentSettlement::new(db.clone()));
        Self {
            db,
            config,
            card_gateway,
            mobile_gateway,
            progress,
            settlement,
        }
    }
}
