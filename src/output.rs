//! Output types: extracted text, per-model estimates, and the final result.
//!
//! [`AnalysisResult`] serialises as a JSON object keyed by model id, in
//! catalog order, so presentation code written against the original
//! `{ "gpt-4": { "name", "tokenCount", "inputCost", ... } }` shape keeps
//! working. Costs stay full-precision `f64` in the data; rounding to four
//! decimal places happens only in [`format_cost`].

use crate::catalog::{ModelProfile, TokenFamily};
use crate::pipeline::input::SupportedFormat;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Plain text pulled out of an uploaded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedDocument {
    pub source_file_name: Option<String>,
    pub text: String,
    /// Only known for PDFs.
    pub page_count: Option<usize>,
}

impl ExtractedDocument {
    pub fn new(source_file_name: Option<String>, text: String, page_count: Option<usize>) -> Self {
        Self {
            source_file_name,
            text,
            page_count,
        }
    }
}

/// What was analysed, kept alongside the result for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub source_file_name: Option<String>,
    pub format: Option<SupportedFormat>,
    pub page_count: Option<usize>,
    pub char_count: usize,
}

/// Token count for one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenEstimate {
    pub model_id: String,
    pub token_count: usize,
}

/// Cost for one model, in USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub model_id: String,
    pub input_cost: f64,
    pub output_cost: f64,
    /// Always `input_cost + output_cost`.
    pub total_cost: f64,
}

impl CostBreakdown {
    pub fn new(model_id: impl Into<String>, input_cost: f64, output_cost: f64) -> Self {
        Self {
            model_id: model_id.into(),
            input_cost,
            output_cost,
            total_cost: input_cost + output_cost,
        }
    }
}

/// One row of the result: display fields, token count, and costs.
///
/// Costs are always computed from `token_count`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelAnalysis {
    /// The map key in serialised output.
    #[serde(skip)]
    pub model_id: String,
    pub name: String,
    pub description: String,
    pub token_family: TokenFamily,
    pub context_window_tokens: usize,
    pub input_price_per_million_tokens: f64,
    pub output_price_per_million_tokens: f64,
    pub token_count: usize,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
    pub exceeds_context_window: bool,
}

impl ModelAnalysis {
    pub(crate) fn from_parts(profile: &ModelProfile, token_count: usize, cost: CostBreakdown) -> Self {
        Self {
            model_id: profile.id.clone(),
            name: profile.display_name.clone(),
            description: profile.description.clone(),
            token_family: profile.token_family,
            context_window_tokens: profile.context_window_tokens,
            input_price_per_million_tokens: profile.input_price_per_million_tokens,
            output_price_per_million_tokens: profile.output_price_per_million_tokens,
            token_count,
            input_cost: cost.input_cost,
            output_cost: cost.output_cost,
            total_cost: cost.total_cost,
            exceeds_context_window: token_count > profile.context_window_tokens,
        }
    }

    pub fn token_estimate(&self) -> TokenEstimate {
        TokenEstimate {
            model_id: self.model_id.clone(),
            token_count: self.token_count,
        }
    }

    pub fn cost_breakdown(&self) -> CostBreakdown {
        CostBreakdown {
            model_id: self.model_id.clone(),
            input_cost: self.input_cost,
            output_cost: self.output_cost,
            total_cost: self.total_cost,
        }
    }

    pub fn input_cost_display(&self) -> String {
        format_cost(self.input_cost)
    }

    pub fn output_cost_display(&self) -> String {
        format_cost(self.output_cost)
    }

    pub fn total_cost_display(&self) -> String {
        format_cost(self.total_cost)
    }
}

/// The sole output of [`crate::analyze::analyze`].
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    base_token_count: usize,
    models: Vec<ModelAnalysis>,
    documents: Vec<DocumentSummary>,
}

impl AnalysisResult {
    pub(crate) fn new(base_token_count: usize, models: Vec<ModelAnalysis>) -> Self {
        Self {
            base_token_count,
            models,
            documents: Vec::new(),
        }
    }

    pub(crate) fn with_documents(mut self, documents: Vec<DocumentSummary>) -> Self {
        self.documents = documents;
        self
    }

    /// Reference-tokenizer count before any per-family correction.
    pub fn base_token_count(&self) -> usize {
        self.base_token_count
    }

    /// Entries in catalog order.
    pub fn models(&self) -> &[ModelAnalysis] {
        &self.models
    }

    pub fn get(&self, model_id: &str) -> Option<&ModelAnalysis> {
        self.models.iter().find(|m| m.model_id == model_id)
    }

    /// The first analysed document; `None` for raw-text input.
    pub fn document(&self) -> Option<&DocumentSummary> {
        self.documents.first()
    }

    /// Every analysed document, in input order. Empty for raw-text input.
    pub fn documents(&self) -> &[DocumentSummary] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl Serialize for AnalysisResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.models.len()))?;
        for m in &self.models {
            map.serialize_entry(&m.model_id, m)?;
        }
        map.end()
    }
}

/// Render a USD amount with four decimal places: `0.000025` → `"$0.0000"`.
pub fn format_cost(amount: f64) -> String {
    format!("${amount:.4}")
}

/// Render a token count with thousands separators: `1234567` → `"1,234,567"`.
pub fn format_tokens(count: usize) -> String {
    let digits = count.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
