//! Display-only currency conversion.
//!
//! Amounts are recorded in Chilean pesos; when the display currency is USD
//! they are divided by the current CLP-per-USD rate at render time. Stored
//! values are never rewritten. The network half of rate fetching lives
//! outside this crate behind [`RateProvider`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::StoreError;

/// Currency newly created profiles start with.
pub const DEFAULT_CURRENCY: &str = "CLP";

/// Approximate rate used when no provider is reachable.
pub const FALLBACK_CLP_PER_USD: f64 = 950.0;

/// A fetched CLP-per-USD quote.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub clp_per_usd: f64,
    pub fetched_at: DateTime<Utc>,
}

impl ExchangeRate {
    pub fn new(clp_per_usd: f64) -> Self {
        Self {
            clp_per_usd,
            fetched_at: Utc::now(),
        }
    }

    /// The hard-coded fallback quote.
    pub fn fallback() -> Self {
        Self::new(FALLBACK_CLP_PER_USD)
    }
}

/// Source of exchange-rate quotes. Implementations may hit the network;
/// callers fall back to [`ExchangeRate::fallback`] on failure.
pub trait RateProvider {
    fn latest(&self) -> Result<ExchangeRate, StoreError>;
}

/// Provider returning a fixed quote; used in tests and offline mode.
pub struct FixedRate(pub f64);

impl RateProvider for FixedRate {
    fn latest(&self) -> Result<ExchangeRate, StoreError> {
        Ok(ExchangeRate::new(self.0))
    }
}

/// Converts a stored CLP amount into the display currency.
pub fn display_amount(amount_clp: f64, currency: &str, rate: &ExchangeRate) -> f64 {
    if currency.eq_ignore_ascii_case("USD") && rate.clp_per_usd > 0.0 {
        amount_clp / rate.clp_per_usd
    } else {
        amount_clp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clp_display_is_identity() {
        let rate = ExchangeRate::new(950.0);
        assert_eq!(display_amount(47_500.0, "CLP", &rate), 47_500.0);
    }

    #[test]
    fn usd_display_divides_by_the_rate() {
        let rate = ExchangeRate::new(950.0);
        assert_eq!(display_amount(47_500.0, "USD", &rate), 50.0);
        assert_eq!(display_amount(47_500.0, "usd", &rate), 50.0);
    }

    #[test]
    fn zero_rate_never_divides() {
        let rate = ExchangeRate::new(0.0);
        assert_eq!(display_amount(100.0, "USD", &rate), 100.0);
    }

    #[test]
    fn fixed_provider_round_trips_its_rate() {
        let provider = FixedRate(900.0);
        assert_eq!(provider.latest().unwrap().clp_per_usd, 900.0);
    }
}
