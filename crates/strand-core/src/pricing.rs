//! Per-model token prices used to accrue run cost.

use std::collections::HashMap;

/// USD per 1K tokens for known OpenAI chat models.
const MODEL_PRICES: &[(&str, f64)] = &[
    ("gpt-4o", 0.00250),
    ("gpt-4o-mini", 0.000150),
    ("gpt-4o-2024-08-06", 0.003750),
    ("gpt-4o-mini-2024-07-18", 0.000300),
    ("gpt-3.5-turbo", 0.003000),
    ("davinci-002", 0.012000),
    ("babbage-002", 0.001600),
    ("chatgpt-4o-latest", 0.0050),
    ("gpt-4-turbo", 0.0100),
    ("gpt-4-turbo-2024-04-09", 0.0100),
    ("gpt-4", 0.0300),
    ("gpt-4-32k", 0.0600),
    ("gpt-4-0125-preview", 0.0100),
    ("gpt-4-1106-preview", 0.0100),
    ("gpt-4-vision-preview", 0.0100),
    ("gpt-3.5-turbo-0125", 0.0005),
    ("gpt-3.5-turbo-instruct", 0.0015),
    ("gpt-3.5-turbo-1106", 0.0010),
    ("gpt-3.5-turbo-0613", 0.0015),
    ("gpt-3.5-turbo-16k-0613", 0.0030),
    ("gpt-3.5-turbo-0301", 0.0015),
];

/// Price lookup with user overrides taking precedence over the built-in table.
#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    overrides: HashMap<String, f64>,
}

impl PriceTable {
    pub fn new(overrides: HashMap<String, f64>) -> Self {
        Self { overrides }
    }

    /// Price per 1K tokens; unknown models are free.
    pub fn price_per_1k(&self, model: &str) -> f64 {
        if let Some(price) = self.overrides.get(model) {
            return *price;
        }
        MODEL_PRICES
            .iter()
            .find(|(name, _)| *name == model)
            .map(|(_, price)| *price)
            .unwrap_or(0.0)
    }

    /// Cost of `tokens` tokens on `model`.
    pub fn token_cost(&self, tokens: u64, model: &str) -> f64 {
        self.price_per_1k(model) * tokens as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_model_cost() {
        let table = PriceTable::default();
        let cost = table.token_cost(2000, "gpt-4o");
        assert!((cost - 0.005).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_model_is_free() {
        let table = PriceTable::default();
        assert_eq!(table.token_cost(10_000, "my-local-llama"), 0.0);
    }

    #[test]
    fn test_override_wins() {
        let mut overrides = HashMap::new();
        overrides.insert("gpt-4o".to_string(), 1.0);
        let table = PriceTable::new(overrides);
        assert!((table.token_cost(500, "gpt-4o") - 0.5).abs() < 1e-12);
    }
}
