//! Cumulative cost accounting with a hard ceiling.
//!
//! The manager is checked *before* every LLM request and records usage after
//! every response. Once it refuses, it stays refused: no record is accepted
//! after the ceiling error has been raised.

mod pricing;

pub use pricing::{ModelPricing, PricingTable, request_cost};

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::{Error, Result};
use crate::settings::Settings;

/// Token and dollar usage attributed to one model.
#[derive(Debug, Clone, Default)]
pub struct ModelUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: Decimal,
}

/// Snapshot of the budget state for reporting.
#[derive(Debug, Clone)]
pub struct BudgetSummary {
    pub spent: Decimal,
    pub limit: Decimal,
    pub remaining: Decimal,
    pub requests: u32,
    pub per_model: HashMap<String, ModelUsage>,
}

/// Tracks spend across iterations and enforces the ceiling.
pub struct BudgetManager {
    pricing: PricingTable,
    limit: Decimal,
    spent: Decimal,
    /// Largest single-request cost seen so far; used to project whether one
    /// more request could cross the ceiling.
    max_delta: Decimal,
    requests: u32,
    per_model: HashMap<String, ModelUsage>,
    exhausted: bool,
}

impl BudgetManager {
    pub fn new(limit: Decimal, pricing: PricingTable) -> Self {
        Self {
            pricing,
            limit,
            spent: Decimal::ZERO,
            max_delta: Decimal::ZERO,
            requests: 0,
            per_model: HashMap::new(),
            exhausted: false,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let pricing = PricingTable::load(settings.pricing_path.as_deref())?;
        Ok(Self::new(settings.max_budget_dollars, pricing))
    }

    /// Refuse if the ceiling is reached, or if a request shaped like the
    /// ones seen so far would cross it. Called strictly before each LLM
    /// request.
    pub fn ensure_available(&mut self) -> Result<()> {
        if self.exhausted {
            return Err(self.exceeded());
        }
        if self.spent >= self.limit || self.spent + self.max_delta > self.limit {
            self.exhausted = true;
            return Err(self.exceeded());
        }
        Ok(())
    }

    /// Record one request's usage; returns the cost delta.
    pub fn record(&mut self, model: &str, input_tokens: u64, output_tokens: u64) -> Result<Decimal> {
        if self.exhausted {
            return Err(self.exceeded());
        }

        let delta = match self.pricing.lookup(model) {
            Some(p) => request_cost(p, input_tokens, output_tokens),
            None => {
                tracing::warn!(model, "no pricing entry; applying default rates");
                request_cost(
                    &ModelPricing {
                        input_cost_per_m: dec!(1.00),
                        output_cost_per_m: dec!(3.00),
                    },
                    input_tokens,
                    output_tokens,
                )
            }
        };

        self.spent += delta;
        self.max_delta = self.max_delta.max(delta);
        self.requests += 1;
        let usage = self.per_model.entry(model.to_string()).or_default();
        usage.input_tokens += input_tokens;
        usage.output_tokens += output_tokens;
        usage.cost += delta;

        tracing::debug!(model, %delta, spent = %self.spent, "recorded llm usage");
        Ok(delta)
    }

    pub fn total(&self) -> Decimal {
        self.spent
    }

    pub fn remaining(&self) -> Decimal {
        (self.limit - self.spent).max(Decimal::ZERO)
    }

    pub fn summary(&self) -> BudgetSummary {
        BudgetSummary {
            spent: self.spent,
            limit: self.limit,
            remaining: self.remaining(),
            requests: self.requests,
            per_model: self.per_model.clone(),
        }
    }

    fn exceeded(&self) -> Error {
        Error::BudgetExceeded {
            spent: self.spent,
            limit: self.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap_table() -> PricingTable {
        PricingTable::from_entries([(
            "test-model".to_string(),
            ModelPricing {
                input_cost_per_m: dec!(3.00),
                output_cost_per_m: dec!(3.00),
            },
        )])
    }

    #[test]
    fn totals_are_sums_of_deltas() {
        let mut budget = BudgetManager::new(dec!(1.00), cheap_table());
        let mut sum = Decimal::ZERO;
        for _ in 0..5 {
            sum += budget.record("test-model", 10_000, 10_000).unwrap();
        }
        assert_eq!(budget.total(), sum);
        assert_eq!(budget.summary().requests, 5);
    }

    #[test]
    fn ceiling_refuses_before_the_request_that_would_cross() {
        // 1000+1000 tokens at $3/M both ways: $0.006 per request.
        let mut budget = BudgetManager::new(dec!(0.01), cheap_table());

        budget.ensure_available().unwrap();
        budget.record("test-model", 1000, 1000).unwrap();
        assert_eq!(budget.total(), dec!(0.006));

        // Projected second request would cross $0.01.
        let err = budget.ensure_available().unwrap_err();
        assert_eq!(err.code(), "budget_exceeded");
    }

    #[test]
    fn no_record_after_refusal() {
        let mut budget = BudgetManager::new(dec!(0.01), cheap_table());
        budget.record("test-model", 1000, 1000).unwrap();
        let _ = budget.ensure_available().unwrap_err();

        let total_before = budget.total();
        assert!(budget.record("test-model", 1000, 1000).is_err());
        assert_eq!(budget.total(), total_before);
    }

    #[test]
    fn unknown_model_still_costs() {
        let mut budget = BudgetManager::new(dec!(1.00), cheap_table());
        let delta = budget.record("mystery", 1_000_000, 0).unwrap();
        assert_eq!(delta, dec!(1.00));
    }

    #[test]
    fn per_model_breakdown() {
        let mut budget = BudgetManager::new(dec!(1.00), cheap_table());
        budget.record("test-model", 500, 250).unwrap();
        budget.record("test-model", 500, 250).unwrap();
        let summary = budget.summary();
        let usage = &summary.per_model["test-model"];
        assert_eq!(usage.input_tokens, 1000);
        assert_eq!(usage.output_tokens, 500);
    }

    #[test]
    fn remaining_never_negative() {
        let mut budget = BudgetManager::new(dec!(0.001), cheap_table());
        budget.record("test-model", 1_000_000, 0).unwrap();
        assert_eq!(budget.remaining(), Decimal::ZERO);
    }
}
