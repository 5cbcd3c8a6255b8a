//! Static model price table.
//!
//! Prices are dollars per 1000 tokens. Models missing from the table cost
//! zero; pricing never blocks a response.

use super::provider::TokenUsage;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

const fn price(input_per_1k: f64, output_per_1k: f64) -> ModelPrice {
    ModelPrice {
        input_per_1k,
        output_per_1k,
    }
}

pub const PRICE_TABLE: &[(&str, ModelPrice)] = &[
    ("gpt-4o", price(0.005, 0.015)),
    ("gpt-4o-mini", price(0.00015, 0.0006)),
    ("gpt-4-turbo", price(0.01, 0.03)),
    ("claude-3-5-sonnet-20241022", price(0.003, 0.015)),
    ("claude-3-haiku-20240307", price(0.00025, 0.00125)),
    ("gemini/gemini-1.5-pro", price(0.00125, 0.005)),
    ("gemini/gemini-1.5-flash", price(0.000075, 0.0003)),
];

/// Exact-name lookup
pub fn price_for(model: &str) -> Option<ModelPrice> {
    PRICE_TABLE
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, p)| *p)
}

pub fn calculate_cost(model: &str, usage: &TokenUsage) -> f64 {
    match price_for(model) {
        Some(p) => {
            (usage.prompt_tokens as f64 / 1000.0) * p.input_per_1k
                + (usage.completion_tokens as f64 / 1000.0) * p.output_per_1k
        }
        None => 0.0,
    }
}
