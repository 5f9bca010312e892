//! Model catalog: pricing and context metadata for each supported model.
//!
//! The catalog is plain data. It is built once (from the embedded
//! `assets/models.json` or a user-supplied file), validated, and then passed
//! by reference into the estimator. Nothing in the library holds a global
//! copy, so two callers can price the same document against different
//! catalogs in the same process.
//!
//! ## File format
//!
//! ```json
//! {
//!   "claudeCorrectionFactor": 1.15,
//!   "models": [
//!     {
//!       "id": "gpt-4o",
//!       "displayName": "GPT-4o",
//!       "description": "Multimodal flagship GPT model",
//!       "inputPricePerMillionTokens": 2.5,
//!       "outputPricePerMillionTokens": 10.0,
//!       "contextWindowTokens": 128000,
//!       "tokenFamily": "gptFamily"
//!     }
//!   ]
//! }
//! ```

use crate::error::TokenCostError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Empirical ratio of Claude-family to GPT-family token counts for the same text.
///
/// Claude's tokenizer tends to split text roughly 15 % more finely than
/// `cl100k_base`. This is an approximation with no stated confidence bound;
/// it is not derived from Anthropic's actual tokenizer. Override it per
/// catalog with [`ModelCatalog::with_claude_correction`].
pub const DEFAULT_CLAUDE_CORRECTION: f64 = 1.15;

const BUILTIN_CATALOG: &str = include_str!("../assets/models.json");

/// Which tokenizer family a model belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TokenFamily {
    /// Counted directly with the reference BPE.
    GptFamily,
    /// Reference count scaled by the catalog's Claude correction factor.
    ClaudeFamily,
}

/// Static pricing and context metadata for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelProfile {
    /// Unique key, e.g. `"gpt-4o"`.
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    /// USD per 1 000 000 input tokens.
    pub input_price_per_million_tokens: f64,
    /// USD per 1 000 000 output tokens.
    pub output_price_per_million_tokens: f64,
    pub context_window_tokens: usize,
    pub token_family: TokenFamily,
}

impl ModelProfile {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        token_family: TokenFamily,
        input_price_per_million_tokens: f64,
        output_price_per_million_tokens: f64,
        context_window_tokens: usize,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            description: String::new(),
            input_price_per_million_tokens,
            output_price_per_million_tokens,
            context_window_tokens,
            token_family,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

fn default_claude_correction() -> f64 {
    DEFAULT_CLAUDE_CORRECTION
}

/// An ordered, validated list of [`ModelProfile`]s.
///
/// Iteration order is the order of the source file; it is also the order of
/// entries in every [`crate::output::AnalysisResult`]. Deserialising goes
/// through the same validation as [`ModelCatalog::from_json_str`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawCatalog")]
pub struct ModelCatalog {
    claude_correction_factor: f64,
    models: Vec<ModelProfile>,
}

/// Catalog JSON as written, before validation.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCatalog {
    #[serde(default = "default_claude_correction")]
    claude_correction_factor: f64,
    models: Vec<ModelProfile>,
}

impl TryFrom<RawCatalog> for ModelCatalog {
    type Error = TokenCostError;

    fn try_from(raw: RawCatalog) -> Result<Self, Self::Error> {
        let catalog = Self {
            claude_correction_factor: raw.claude_correction_factor,
            models: raw.models,
        };
        catalog.validate()?;
        Ok(catalog)
    }
}

impl ModelCatalog {
    /// Build a catalog from profiles, using [`DEFAULT_CLAUDE_CORRECTION`].
    pub fn new(models: Vec<ModelProfile>) -> Result<Self, TokenCostError> {
        let catalog = Self {
            claude_correction_factor: DEFAULT_CLAUDE_CORRECTION,
            models,
        };
        catalog.validate()?;
        Ok(catalog)
    }

    /// The catalog compiled into the crate.
    pub fn builtin() -> Result<Self, TokenCostError> {
        Self::from_json_str(BUILTIN_CATALOG)
    }

    /// Parse and validate a catalog from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, TokenCostError> {
        let raw: RawCatalog = serde_json::from_str(json)
            .map_err(|e| TokenCostError::InvalidCatalog(format!("JSON parse error: {e}")))?;
        let catalog = Self::try_from(raw)?;
        debug!("Loaded model catalog with {} models", catalog.models.len());
        Ok(catalog)
    }

    /// Read and validate a catalog file.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, TokenCostError> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| TokenCostError::FileReadFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
        Self::from_json_str(&json)
    }

    /// Replace the Claude correction factor. Must be finite and ≥ 1.0 so
    /// corrected counts never fall below the reference count.
    pub fn with_claude_correction(mut self, factor: f64) -> Result<Self, TokenCostError> {
        self.claude_correction_factor = factor;
        self.validate()?;
        Ok(self)
    }

    pub fn claude_correction_factor(&self) -> f64 {
        self.claude_correction_factor
    }

    /// Multiplier applied to the reference count for `family`.
    pub fn correction_for(&self, family: TokenFamily) -> f64 {
        match family {
            TokenFamily::GptFamily => 1.0,
            TokenFamily::ClaudeFamily => self.claude_correction_factor,
        }
    }

    pub fn models(&self) -> &[ModelProfile] {
        &self.models
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelProfile> {
        self.models.iter()
    }

    pub fn get(&self, id: &str) -> Option<&ModelProfile> {
        self.models.iter().find(|m| m.id == id)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    fn validate(&self) -> Result<(), TokenCostError> {
        let f = self.claude_correction_factor;
        if !f.is_finite() || f < 1.0 {
            return Err(TokenCostError::InvalidCatalog(format!(
                "claudeCorrectionFactor must be a finite number ≥ 1.0, got {f}"
            )));
        }

        let mut seen = HashSet::new();
        for m in &self.models {
            if m.id.trim().is_empty() {
                return Err(TokenCostError::InvalidCatalog(
                    "model id must not be empty".into(),
                ));
            }
            if !seen.insert(m.id.as_str()) {
                return Err(TokenCostError::InvalidCatalog(format!(
                    "duplicate model id '{}'",
                    m.id
                )));
            }
            for (label, price) in [
                ("inputPricePerMillionTokens", m.input_price_per_million_tokens),
                ("outputPricePerMillionTokens", m.output_price_per_million_tokens),
            ] {
                if !price.is_finite() || price < 0.0 {
                    return Err(TokenCostError::InvalidCatalog(format!(
                        "model '{}': {label} must be a finite non-negative number, got {price}",
                        m.id
                    )));
                }
            }
        }
        Ok(())
    }
}
