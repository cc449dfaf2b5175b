//! Model pricing tables.
//!
//! Format: `{"models": {"<name>": {"input_cost_per_m": f, "output_cost_per_m": f}}}`.
//! An operator-supplied JSON file wins; otherwise a minimal built-in table is
//! used and flagged stale, since published prices drift.

use std::collections::HashMap;
use std::path::Path;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Well-known pricing file looked up when no explicit path is configured.
const DEFAULT_PRICING_FILE: &str = "crucible-pricing.json";

/// Dollars per million tokens, input and output.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelPricing {
    pub input_cost_per_m: Decimal,
    pub output_cost_per_m: Decimal,
}

#[derive(Debug, Deserialize)]
struct PricingFile {
    models: HashMap<String, ModelPricing>,
}

/// Loaded pricing table.
#[derive(Debug, Clone)]
pub struct PricingTable {
    models: HashMap<String, ModelPricing>,
    builtin: bool,
}

impl PricingTable {
    /// Load from an explicit path, the well-known file, or the built-in
    /// fallback (in that order).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        if Path::new(DEFAULT_PRICING_FILE).is_file() {
            return Self::from_file(Path::new(DEFAULT_PRICING_FILE));
        }

        tracing::warn!("no pricing file found; using built-in table (pricing may be stale)");
        Ok(Self::builtin())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Configuration {
            reason: format!("cannot read pricing file {}: {e}", path.display()),
        })?;
        let file: PricingFile = serde_json::from_str(&raw).map_err(|e| Error::Configuration {
            reason: format!("invalid pricing file {}: {e}", path.display()),
        })?;
        Ok(Self {
            models: file.models,
            builtin: false,
        })
    }

    /// Minimal built-in table for common models.
    pub fn builtin() -> Self {
        let mut models = HashMap::new();
        models.insert(
            "gpt-4o".to_string(),
            ModelPricing {
                input_cost_per_m: dec!(2.50),
                output_cost_per_m: dec!(10.00),
            },
        );
        models.insert(
            "gpt-4o-mini".to_string(),
            ModelPricing {
                input_cost_per_m: dec!(0.15),
                output_cost_per_m: dec!(0.60),
            },
        );
        models.insert(
            "claude-3-5-sonnet".to_string(),
            ModelPricing {
                input_cost_per_m: dec!(3.00),
                output_cost_per_m: dec!(15.00),
            },
        );
        models.insert(
            "claude-3-5-haiku".to_string(),
            ModelPricing {
                input_cost_per_m: dec!(0.80),
                output_cost_per_m: dec!(4.00),
            },
        );
        models.insert(
            "gemini-1.5-pro".to_string(),
            ModelPricing {
                input_cost_per_m: dec!(1.25),
                output_cost_per_m: dec!(5.00),
            },
        );
        models.insert(
            "gemini-1.5-flash".to_string(),
            ModelPricing {
                input_cost_per_m: dec!(0.075),
                output_cost_per_m: dec!(0.30),
            },
        );
        Self {
            models,
            builtin: true,
        }
    }

    /// Build a table from explicit entries (tests, embedders).
    pub fn from_entries(entries: impl IntoIterator<Item = (String, ModelPricing)>) -> Self {
        Self {
            models: entries.into_iter().collect(),
            builtin: false,
        }
    }

    /// Whether this is the built-in (possibly stale) table.
    pub fn is_builtin(&self) -> bool {
        self.builtin
    }

    pub fn lookup(&self, model: &str) -> Option<&ModelPricing> {
        // Exact name first, then prefix match for dated variants like
        // "gpt-4o-2024-08-06".
        self.models.get(model).or_else(|| {
            self.models
                .iter()
                .filter(|(name, _)| model.starts_with(name.as_str()))
                .max_by_key(|(name, _)| name.len())
                .map(|(_, pricing)| pricing)
        })
    }

    /// All entries, sorted by name, for display.
    pub fn entries(&self) -> Vec<(&str, &ModelPricing)> {
        let mut out: Vec<_> = self
            .models
            .iter()
            .map(|(name, pricing)| (name.as_str(), pricing))
            .collect();
        out.sort_by_key(|(name, _)| *name);
        out
    }
}

/// Cost of one request at the given pricing.
pub fn request_cost(pricing: &ModelPricing, input_tokens: u64, output_tokens: u64) -> Decimal {
    let million = dec!(1_000_000);
    Decimal::from(input_tokens) / million * pricing.input_cost_per_m
        + Decimal::from(output_tokens) / million * pricing.output_cost_per_m
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn builtin_lookup_and_prefix_match() {
        let table = PricingTable::builtin();
        assert!(table.is_builtin());
        assert!(table.lookup("gpt-4o-mini").is_some());
        // Dated variant resolves to the longest matching prefix entry.
        let dated = table.lookup("gpt-4o-mini-2024-07-18").unwrap();
        assert_eq!(dated.input_cost_per_m, dec!(0.15));
        assert!(table.lookup("unknown-model").is_none());
    }

    #[test]
    fn cost_arithmetic_is_exact() {
        let pricing = ModelPricing {
            input_cost_per_m: dec!(2.50),
            output_cost_per_m: dec!(10.00),
        };
        assert_eq!(request_cost(&pricing, 1_000_000, 0), dec!(2.50));
        assert_eq!(request_cost(&pricing, 0, 500_000), dec!(5.00));
        assert_eq!(request_cost(&pricing, 100_000, 10_000), dec!(0.35));
    }

    #[test]
    fn file_parsing() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{"models": {{"my-model": {{"input_cost_per_m": 1.5, "output_cost_per_m": 6.0}}}}}}"#
        )
        .unwrap();
        f.flush().unwrap();

        let table = PricingTable::load(Some(f.path())).unwrap();
        assert!(!table.is_builtin());
        let p = table.lookup("my-model").unwrap();
        assert_eq!(p.output_cost_per_m, dec!(6.0));
    }

    #[test]
    fn bad_file_is_a_config_error() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "not json").unwrap();
        f.flush().unwrap();
        let err = PricingTable::load(Some(f.path())).unwrap_err();
        assert_eq!(err.code(), "config");
    }
}
