//! # edgequake-tokcost
//!
//! Estimate how many LLM tokens a document contains and what it would cost to
//! send it to each model in a pricing catalog.
//!
//! ## Pipeline Overview
//!
//! ```text
//! file(s) / text
//!  │
//!  ├─ 1. Validate  declared media type + size limit (10 MiB)
//!  ├─ 2. Extract   plain text · PDF (pdfium, batched pages) · .doc · .docx
//!  ├─ 3. Tokenize  cl100k_base BPE via tiktoken-rs (spawn_blocking)
//!  ├─ 4. Estimate  per-model token count (+ Claude correction) and cost
//!  └─ 5. Output    AnalysisResult keyed by model id, catalog order
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_tokcost::{analyze_text, AnalysisConfig, ModelCatalog};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalog = ModelCatalog::builtin()?;
//!     let config = AnalysisConfig::default();
//!     let result = analyze_text("Hello world", &catalog, &config).await?;
//!     for model in result.models() {
//!         println!("{}: {} tokens, {}", model.name, model.token_count, model.total_cost_display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Token counts for non-GPT models
//!
//! Only one real tokenizer is used. Claude-family counts are derived from the
//! GPT count with a fixed correction factor
//! ([`catalog::DEFAULT_CLAUDE_CORRECTION`], 1.15). This is an empirical
//! approximation, not a replication of Anthropic's tokenizer.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `tokcost` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod catalog;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{
    analyze, analyze_file, analyze_files, analyze_sync, analyze_text, extract_document,
    AnalysisInput,
};
pub use catalog::{ModelCatalog, ModelProfile, TokenFamily, DEFAULT_CLAUDE_CORRECTION};
pub use config::{AnalysisConfig, AnalysisConfigBuilder, SpecialTokenPolicy, TextDecoding, TokenEncoding};
pub use error::{ErrorKind, TokenCostError, ValidationError};
pub use output::{
    format_cost, format_tokens, AnalysisResult, CostBreakdown, DocumentSummary, ExtractedDocument,
    ModelAnalysis, TokenEstimate,
};
pub use pipeline::input::{InputFile, SupportedFormat};
pub use pipeline::pdf::{PdfSourceError, PdfTextSource, PdfiumTextSource, TextFragment};
pub use pipeline::tokenize::Tokenizer;
pub use pipeline::word::{DocxBackend, LegacyDocBackend, TextBackend};
pub use progress::{AnalysisProgressCallback, AnalysisStage, NoopProgressCallback, ProgressCallback};
pub use stream::{analyze_stream, AnalysisEvent, AnalysisEventStream};
