// Central configuration for the reconciliation core.
//
// Everything tunable lives here and is passed explicitly into importers and
// calculators. Tests build their own Config to vary tolerance without
// touching any global state.

use serde::{Deserialize, Serialize};

/// Default list of currencies accepted on import.
pub const ALLOWED_CURRENCIES: [&str; 4] = ["GBP", "EUR", "USD", "AUD"];

/// Currency used when a source omits one or supplies an unknown code.
pub const DEFAULT_CURRENCY: &str = "GBP";

/// Tolerance for amount comparisons (handles floating point rounding).
pub const AMOUNT_TOLERANCE: f64 = 0.01;

/// Outgoing payment types the agency records.
pub const OUTGOING_PAYMENT_TYPES: [&str; 7] = [
    "Artist Advance",
    "Artist Final Settlement",
    "Hotel",
    "Flights",
    "Ground Transport",
    "Production",
    "Other Expense",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Currencies accepted by the importers. Anything else falls back to
    /// `default_currency`.
    pub allowed_currencies: Vec<String>,

    /// Currency assumed when a row has none.
    pub default_currency: String,

    /// Tolerance applied to every amount comparison.
    pub amount_tolerance: f64,

    /// Recognized outgoing payment types (classification buckets match on
    /// "artist"/"hotel"/"flight" substrings; the rest land in "other").
    pub outgoing_payment_types: Vec<String>,
}

impl Config {
    pub fn new() -> Self {
        Config {
            allowed_currencies: ALLOWED_CURRENCIES.iter().map(|s| s.to_string()).collect(),
            default_currency: DEFAULT_CURRENCY.to_string(),
            amount_tolerance: AMOUNT_TOLERANCE,
            outgoing_payment_types: OUTGOING_PAYMENT_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    pub fn with_tolerance(tolerance: f64) -> Self {
        Config {
            amount_tolerance: tolerance,
            ..Config::new()
        }
    }

    /// Check whether a currency code is on the allowed list.
    pub fn is_allowed_currency(&self, code: &str) -> bool {
        let upper = code.trim().to_uppercase();
        self.allowed_currencies.iter().any(|c| c == &upper)
    }

    /// Normalize an optional raw currency cell to an accepted code,
    /// falling back to the configured default.
    pub fn normalize_currency(&self, raw: Option<&str>) -> String {
        match raw {
            Some(code) if self.is_allowed_currency(code) => code.trim().to_uppercase(),
            _ => self.default_currency.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_normalization() {
        let config = Config::new();

        assert_eq!(config.normalize_currency(Some("eur")), "EUR");
        assert_eq!(config.normalize_currency(Some(" usd ")), "USD");
        assert_eq!(config.normalize_currency(Some("MXN")), "GBP");
        assert_eq!(config.normalize_currency(None), "GBP");
    }

    #[test]
    fn test_with_tolerance() {
        let config = Config::with_tolerance(0.5);
        assert_eq!(config.amount_tolerance, 0.5);
        assert_eq!(config.default_currency, "GBP");
    }
}
