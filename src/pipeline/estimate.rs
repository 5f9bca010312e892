//! Per-model token counts and USD costs.
//!
//! Pure arithmetic over a catalog: never fails, touches no I/O. Costs are
//! computed from the same corrected count that is reported, so
//! `total_cost == input_cost + output_cost` holds exactly for every entry.

use crate::catalog::{ModelCatalog, ModelProfile, TokenFamily};
use crate::output::{AnalysisResult, CostBreakdown, ModelAnalysis};

const TOKENS_PER_PRICE_UNIT: f64 = 1_000_000.0;

/// Apply the family correction to a reference count.
///
/// Claude-family counts are `ceil(base * factor)`, never below `base`.
pub fn corrected_token_count(base: usize, family: TokenFamily, catalog: &ModelCatalog) -> usize {
    match family {
        TokenFamily::GptFamily => base,
        TokenFamily::ClaudeFamily => {
            let scaled = (base as f64 * catalog.correction_for(family)).ceil() as usize;
            scaled.max(base)
        }
    }
}

/// USD cost of sending and of receiving `tokens` tokens on `profile`.
pub fn cost_for(profile: &ModelProfile, tokens: usize) -> CostBreakdown {
    let t = tokens as f64;
    CostBreakdown::new(
        profile.id.clone(),
        t * profile.input_price_per_million_tokens / TOKENS_PER_PRICE_UNIT,
        t * profile.output_price_per_million_tokens / TOKENS_PER_PRICE_UNIT,
    )
}

/// Estimate every model in the catalog, in catalog order.
pub fn estimate(base_token_count: usize, catalog: &ModelCatalog) -> AnalysisResult {
    let models = catalog
        .iter()
        .map(|profile| {
            let tokens = corrected_token_count(base_token_count, profile.token_family, catalog);
            ModelAnalysis::from_parts(profile, tokens, cost_for(profile, tokens))
        })
        .collect();
    AnalysisResult::new(base_token_count, models)
}
