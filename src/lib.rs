#![doc(test(attr(deny(warnings))))]

//! Presupuesto Core provides the monthly ledger aggregation and
//! dual-persistence primitives behind a personal budgeting app: month-scoped
//! totals and category breakdowns, a local/remote persistence router keyed
//! by profile and month, and the profile lifecycle around them.

pub mod auth;
pub mod errors;
pub mod export;
pub mod keys;
pub mod ledger;
pub mod profiles;
pub mod rates;
pub mod router;
pub mod storage;

use std::sync::Once;

static INIT_TRACING: Once = Once::new();

/// Initializes global tracing and emits a startup info log.
pub fn init() {
    INIT_TRACING.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter =
            EnvFilter::from_default_env().add_directive("presupuesto_core=info".parse().unwrap());
        fmt().with_env_filter(filter).init();
        tracing::info!("Presupuesto Core tracing initialized.");
    });
}
