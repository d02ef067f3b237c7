use std::collections::HashMap;
use std::path::Path;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PricingError {
    #[error("pricing file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed pricing file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid pricing for model '{model}': {reason}")]
    InvalidPricing { model: String, reason: String },
}

/// Per-model prices in dollars per million tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_price_per_million: Decimal,
    pub output_price_per_million: Decimal,
    pub cached_input_price_per_million: Decimal,
}

/// Cost facts for one completed request, exact decimal dollars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub cost: Decimal,
    pub cached_savings: Decimal,
}

/// Pricing table keyed by model id, with a fallback row for models that have
/// not been priced yet. Pure: `cost` performs no I/O and no mutation.
#[derive(Debug, Clone)]
pub struct PricingTable {
    models: HashMap<String, ModelPricing>,
    fallback: ModelPricing,
}

const TOKENS_PER_PRICE_UNIT: Decimal = dec!(1000000);

impl Default for PricingTable {
    fn default() -> Self {
        let mut models = HashMap::new();
        models.insert(
            "claude-sonnet".to_string(),
            ModelPricing {
                input_price_per_million: dec!(3),
                output_price_per_million: dec!(15),
                cached_input_price_per_million: dec!(0.3),
            },
        );
        models.insert(
            "claude-haiku".to_string(),
            ModelPricing {
                input_price_per_million: dec!(0.8),
                output_price_per_million: dec!(4),
                cached_input_price_per_million: dec!(0.08),
            },
        );
        models.insert(
            "claude-opus".to_string(),
            ModelPricing {
                input_price_per_million: dec!(15),
                output_price_per_million: dec!(75),
                cached_input_price_per_million: dec!(1.5),
            },
        );

        Self {
            models,
            fallback: ModelPricing {
                input_price_per_million: dec!(3),
                output_price_per_million: dec!(15),
                cached_input_price_per_million: dec!(3),
            },
        }
    }
}

impl PricingTable {
    /// Load model rows from a JSON file, replacing the compiled defaults for
    /// any model named in the file. The file maps model id to pricing row.
    pub fn load_overrides(mut self, path: &Path) -> Result<Self, PricingError> {
        let raw = std::fs::read_to_string(path)?;
        let overrides: HashMap<String, ModelPricing> = serde_json::from_str(&raw)?;
        self.models.extend(overrides);
        Ok(self)
    }

    pub fn pricing_for(&self, model_id: &str) -> &ModelPricing {
        self.models.get(model_id).unwrap_or(&self.fallback)
    }

    /// Startup validation of the table precondition: prices non-negative and
    /// the cached rate never above the full input rate, so savings cannot go
    /// negative at request time.
    pub fn validate(&self) -> Result<(), PricingError> {
        let rows = self
            .models
            .iter()
            .map(|(id, row)| (id.as_str(), row))
            .chain(std::iter::once(("<fallback>", &self.fallback)));

        for (model, row) in rows {
            if row.input_price_per_million < Decimal::ZERO
                || row.output_price_per_million < Decimal::ZERO
                || row.cached_input_price_per_million < Decimal::ZERO
            {
                return Err(PricingError::InvalidPricing {
                    model: model.to_string(),
                    reason: "prices must be non-negative".into(),
                });
            }
            if row.cached_input_price_per_million > row.input_price_per_million {
                return Err(PricingError::InvalidPricing {
                    model: model.to_string(),
                    reason: "cached input price exceeds input price".into(),
                });
            }
        }
        Ok(())
    }

    /// Cost of one request. Cached tokens are billed at the cached rate and
    /// the discount relative to the full input rate is reported as savings.
    pub fn cost(
        &self,
        model_id: &str,
        input_tokens: u64,
        output_tokens: u64,
        cached_tokens: u64,
    ) -> CostBreakdown {
        let row = self.pricing_for(model_id);
        let uncached = Decimal::from(input_tokens.saturating_sub(cached_tokens));
        let cached = Decimal::from(cached_tokens.min(input_tokens));
        let output = Decimal::from(output_tokens);

        let cost = (uncached * row.input_price_per_million
            + cached * row.cached_input_price_per_million
            + output * row.output_price_per_million)
            / TOKENS_PER_PRICE_UNIT;
        let cached_savings = cached
            * (row.input_price_per_million - row.cached_input_price_per_million)
            / TOKENS_PER_PRICE_UNIT;

        CostBreakdown {
            cost,
            cached_savings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(model: &str, input: Decimal, output: Decimal, cached: Decimal) -> PricingTable {
        let mut table = PricingTable::default();
        table.models.insert(
            model.to_string(),
            ModelPricing {
                input_price_per_million: input,
                output_price_per_million: output,
                cached_input_price_per_million: cached,
            },
        );
        table
    }

    #[test]
    fn cost_matches_reference_breakdown() {
        // input $3/1M, output $15/1M, cached $0.3/1M over (1000, 500, 200)
        let table = table_with("model-x", dec!(3), dec!(15), dec!(0.3));
        let breakdown = table.cost("model-x", 1_000, 500, 200);

        assert_eq!(breakdown.cost, dec!(0.00996));
        assert_eq!(breakdown.cached_savings, dec!(0.00054));
    }

    #[test]
    fn cost_is_pure() {
        let table = PricingTable::default();
        let first = table.cost("claude-sonnet", 123_456, 7_890, 1_000);
        let second = table.cost("claude-sonnet", 123_456, 7_890, 1_000);
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_model_uses_fallback_row() {
        let table = PricingTable::default();
        let breakdown = table.cost("never-heard-of-it", 1_000_000, 0, 0);
        assert_eq!(breakdown.cost, table.fallback.input_price_per_million);
    }

    #[test]
    fn fallback_row_yields_no_savings() {
        // fallback prices cached input at the full rate
        let table = PricingTable::default();
        let breakdown = table.cost("unpriced", 1_000, 0, 500);
        assert_eq!(breakdown.cached_savings, Decimal::ZERO);
    }

    #[test]
    fn zero_tokens_cost_nothing() {
        let table = PricingTable::default();
        let breakdown = table.cost("claude-sonnet", 0, 0, 0);
        assert_eq!(breakdown.cost, Decimal::ZERO);
        assert_eq!(breakdown.cached_savings, Decimal::ZERO);
    }

    #[test]
    fn cached_tokens_clamped_to_input() {
        let table = table_with("model-x", dec!(3), dec!(15), dec!(0.3));
        // cached > input must not produce a negative uncached share
        let breakdown = table.cost("model-x", 100, 0, 500);
        assert_eq!(breakdown.cost, dec!(100) * dec!(0.3) / dec!(1000000));
    }

    #[test]
    fn validate_rejects_cached_price_above_input_price() {
        let table = table_with("bad-model", dec!(1), dec!(2), dec!(5));
        assert!(table.validate().is_err());
    }

    #[test]
    fn validate_rejects_negative_prices() {
        let table = table_with("bad-model", dec!(-1), dec!(2), dec!(-2));
        assert!(table.validate().is_err());
    }

    #[test]
    fn default_table_is_valid() {
        PricingTable::default().validate().unwrap();
    }
}
