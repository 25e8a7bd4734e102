//! Bar data validation.
//!
//! Validates bars from connectors before they are returned to the
//! caller:
//! - OHLC invariants (high >= low, open/close between high/low)
//! - Non-negative prices
//! - Sanity ceiling on prices

use rust_decimal::Decimal;

use crate::models::Bar;

/// Bar validator configuration.
#[derive(Clone, Debug)]
pub struct ValidatorConfig {
    /// Whether to reject bars with negative prices.
    pub reject_negative_prices: bool,
    /// Whether to reject bars violating OHLC invariants.
    pub reject_invalid_ohlc: bool,
    /// Maximum allowed price value (sanity check).
    pub max_price: Option<Decimal>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            reject_negative_prices: true,
            reject_invalid_ohlc: true,
            max_price: Some(Decimal::from(1_000_000_000i64)),
        }
    }
}

/// Bar data validator.
///
/// The orchestrator runs every fetched bar through this before
/// returning a series; bars that fail are dropped with a warning.
pub struct BarValidator {
    config: ValidatorConfig,
}

impl BarValidator {
    /// Create a new validator with default configuration.
    pub fn new() -> Self {
        Self {
            config: ValidatorConfig::default(),
        }
    }

    /// Create a validator with custom configuration.
    pub fn with_config(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Validate a bar.
    ///
    /// Returns a description of the first violation found, if any.
    pub fn validate(&self, bar: &Bar) -> Result<(), String> {
        if self.config.reject_negative_prices {
            for (name, price) in [
                ("open", bar.open),
                ("high", bar.high),
                ("low", bar.low),
                ("close", bar.close),
            ] {
                if price < Decimal::ZERO {
                    return Err(format!("negative {} price: {}", name, price));
                }
            }
        }

        if self.config.reject_invalid_ohlc {
            if bar.high < bar.low {
                return Err(format!(
                    "high ({}) is less than low ({})",
                    bar.high, bar.low
                ));
            }
            if bar.open < bar.low || bar.open > bar.high {
                return Err(format!(
                    "open ({}) is outside low/high range ({}-{})",
                    bar.open, bar.low, bar.high
                ));
            }
            if bar.close < bar.low || bar.close > bar.high {
                return Err(format!(
                    "close ({}) is outside low/high range ({}-{})",
                    bar.close, bar.low, bar.high
                ));
            }
        }

        if let Some(max_price) = self.config.max_price {
            if bar.high > max_price {
                return Err(format!(
                    "high price ({}) exceeds sanity ceiling ({})",
                    bar.high, max_price
                ));
            }
        }

        Ok(())
    }
}

impl Default for BarValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn make_bar(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Bar {
        Bar::new(Utc::now(), open, high, low, close, 1000)
    }

    #[test]
    fn test_valid_bar() {
        let validator = BarValidator::new();
        let bar = make_bar(dec!(100), dec!(110), dec!(95), dec!(105));
        assert!(validator.validate(&bar).is_ok());
    }

    #[test]
    fn test_high_less_than_low_rejected() {
        let validator = BarValidator::new();
        let bar = make_bar(dec!(95), dec!(90), dec!(95), dec!(92));

        let result = validator.validate(&bar);
        assert!(result.unwrap_err().contains("less than low"));
    }

    #[test]
    fn test_open_outside_range_rejected() {
        let validator = BarValidator::new();
        let bar = make_bar(dec!(120), dec!(110), dec!(95), dec!(105));
        assert!(validator.validate(&bar).is_err());
    }

    #[test]
    fn test_close_outside_range_rejected() {
        let validator = BarValidator::new();
        let bar = make_bar(dec!(100), dec!(110), dec!(95), dec!(90));
        assert!(validator.validate(&bar).is_err());
    }

    #[test]
    fn test_negative_price_rejected() {
        let validator = BarValidator::new();
        let bar = make_bar(dec!(-10), dec!(110), dec!(-20), dec!(105));

        let result = validator.validate(&bar);
        assert!(result.unwrap_err().contains("negative"));
    }

    #[test]
    fn test_price_ceiling() {
        let validator = BarValidator::with_config(ValidatorConfig {
            max_price: Some(dec!(1000)),
            ..Default::default()
        });

        let bar = make_bar(dec!(900), dec!(5000), dec!(800), dec!(950));
        assert!(validator.validate(&bar).is_err());
    }

    #[test]
    fn test_boundary_prices_accepted() {
        let validator = BarValidator::new();
        // Open at the low, close at the high
        let bar = make_bar(dec!(95), dec!(110), dec!(95), dec!(110));
        assert!(validator.validate(&bar).is_ok());
    }

    #[test]
    fn test_permissive_config() {
        let validator = BarValidator::with_config(ValidatorConfig {
            reject_negative_prices: false,
            reject_invalid_ohlc: false,
            max_price: None,
        });

        let bar = make_bar(dec!(-10), dec!(90), dec!(95), dec!(120));
        assert!(validator.validate(&bar).is_ok());
    }
}
