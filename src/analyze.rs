//! Analysis entry points and the pipeline state machine.
//!
//! [`analyze`] runs one request end to end:
//!
//! ```text
//! Idle → Validating → Extracting → Tokenizing → Estimating → Done
//! ```
//!
//! Raw text skips validation and extraction. Several files are validated
//! together, then extracted in order and joined with `\n` into one text, so
//! they are priced as a single request. Any stage failure ends the
//! request in `Failed(kind)`; only `Done` yields a result. Cancellation is
//! checked before every stage (and before every PDF batch inside
//! extraction).

use crate::catalog::ModelCatalog;
use crate::config::AnalysisConfig;
use crate::error::TokenCostError;
use crate::output::{AnalysisResult, DocumentSummary, ExtractedDocument};
use crate::pipeline::input::InputFile;
use crate::pipeline::tokenize::{self, Tokenizer};
use crate::pipeline::{estimate, extract, validate};
use crate::progress::AnalysisStage;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// What to analyse.
#[derive(Debug, Clone)]
pub enum AnalysisInput {
    /// An uploaded or on-disk document.
    File(InputFile),
    /// Several documents counted as one combined text.
    Files(Vec<InputFile>),
    /// Text supplied directly, counted as-is.
    Text(String),
}

impl From<InputFile> for AnalysisInput {
    fn from(file: InputFile) -> Self {
        AnalysisInput::File(file)
    }
}

impl From<Vec<InputFile>> for AnalysisInput {
    fn from(files: Vec<InputFile>) -> Self {
        AnalysisInput::Files(files)
    }
}

impl From<String> for AnalysisInput {
    fn from(text: String) -> Self {
        AnalysisInput::Text(text)
    }
}

impl From<&str> for AnalysisInput {
    fn from(text: &str) -> Self {
        AnalysisInput::Text(text.to_string())
    }
}

/// Estimate token counts and costs for every model in `catalog`.
///
/// This is the primary entry point for the library.
///
/// # Errors
/// Returns the first failure of any stage, classified as a
/// [`TokenCostError`]. Validation problems are reported size-first.
pub async fn analyze(
    input: impl Into<AnalysisInput>,
    catalog: &ModelCatalog,
    config: &AnalysisConfig,
) -> Result<AnalysisResult, TokenCostError> {
    let start = Instant::now();
    let outcome = run(input.into(), catalog, config).await;
    finish(config, outcome, start)
}

/// Analyse raw text.
pub async fn analyze_text(
    text: impl Into<String>,
    catalog: &ModelCatalog,
    config: &AnalysisConfig,
) -> Result<AnalysisResult, TokenCostError> {
    analyze(AnalysisInput::Text(text.into()), catalog, config).await
}

/// Analyse a file on disk, inferring its media type from the extension.
///
/// Bytes are read only after the file passes validation.
pub async fn analyze_file(
    path: impl AsRef<Path>,
    catalog: &ModelCatalog,
    config: &AnalysisConfig,
) -> Result<AnalysisResult, TokenCostError> {
    let file = InputFile::from_path(path).await?;
    analyze(AnalysisInput::File(file), catalog, config).await
}

/// Analyse several files as one combined text.
///
/// Every file is validated before any is extracted; the first failure
/// ends the request. The result carries one [`DocumentSummary`] per file.
pub async fn analyze_files(
    files: Vec<InputFile>,
    catalog: &ModelCatalog,
    config: &AnalysisConfig,
) -> Result<AnalysisResult, TokenCostError> {
    analyze(AnalysisInput::Files(files), catalog, config).await
}

/// Synchronous wrapper around [`analyze`].
///
/// Creates a temporary tokio runtime internally.
pub fn analyze_sync(
    input: impl Into<AnalysisInput>,
    catalog: &ModelCatalog,
    config: &AnalysisConfig,
) -> Result<AnalysisResult, TokenCostError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| TokenCostError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(analyze(input, catalog, config))
}

/// Validate and extract a file without tokenizing it.
///
/// Reports `Validating`, `Extracting` and then `Done` (or `Failed`) to the
/// progress callback.
pub async fn extract_document(
    file: &InputFile,
    config: &AnalysisConfig,
) -> Result<ExtractedDocument, TokenCostError> {
    let start = Instant::now();
    let outcome = validate_and_extract(std::slice::from_ref(file), config)
        .await
        .and_then(|mut docs| {
            docs.pop()
                .ok_or_else(|| TokenCostError::Internal("extraction returned no document".into()))
        });
    finish(config, outcome, start)
}

fn finish<T>(
    config: &AnalysisConfig,
    outcome: Result<T, TokenCostError>,
    start: Instant,
) -> Result<T, TokenCostError> {
    match outcome {
        Ok(value) => {
            enter(config, AnalysisStage::Done);
            debug!("Request finished in {} ms", start.elapsed().as_millis());
            Ok(value)
        }
        Err(e) => {
            warn!("Analysis failed: {}", e);
            enter(config, AnalysisStage::Failed(e.kind()));
            Err(e)
        }
    }
}

async fn run(
    input: AnalysisInput,
    catalog: &ModelCatalog,
    config: &AnalysisConfig,
) -> Result<AnalysisResult, TokenCostError> {
    let files = match input {
        AnalysisInput::File(file) => vec![file],
        AnalysisInput::Files(files) => files,
        AnalysisInput::Text(text) => {
            return count_and_estimate(text, Vec::new(), catalog, config).await
        }
    };

    let docs = validate_and_extract(&files, config).await?;
    let summaries = files
        .iter()
        .zip(&docs)
        .map(|(file, doc)| DocumentSummary {
            source_file_name: doc.source_file_name.clone(),
            format: file.format(),
            page_count: doc.page_count,
            char_count: doc.text.chars().count(),
        })
        .collect();
    let text = docs
        .into_iter()
        .map(|doc| doc.text)
        .collect::<Vec<_>>()
        .join("\n");

    count_and_estimate(text, summaries, catalog, config).await
}

async fn count_and_estimate(
    text: String,
    summaries: Vec<DocumentSummary>,
    catalog: &ModelCatalog,
    config: &AnalysisConfig,
) -> Result<AnalysisResult, TokenCostError> {
    checkpoint(config, AnalysisStage::Tokenizing)?;
    let tokenize_start = Instant::now();
    let tokenizer = resolve_tokenizer(config).await?;
    let base = tokenize::count_tokens(tokenizer, text, config.special_tokens).await?;
    info!(
        "Counted {} base tokens in {} ms",
        base,
        tokenize_start.elapsed().as_millis()
    );

    checkpoint(config, AnalysisStage::Estimating)?;
    let result = estimate::estimate(base, catalog);
    debug!("Estimated {} models", result.len());

    Ok(result.with_documents(summaries))
}

async fn validate_and_extract(
    files: &[InputFile],
    config: &AnalysisConfig,
) -> Result<Vec<ExtractedDocument>, TokenCostError> {
    checkpoint(config, AnalysisStage::Validating)?;
    for file in files {
        let errors = validate::validate(file, config.max_file_size_bytes);
        if let Some(first) = errors.into_iter().next() {
            return Err(first.into());
        }
    }

    checkpoint(config, AnalysisStage::Extracting)?;
    let mut docs = Vec::with_capacity(files.len());
    for file in files {
        if config.is_cancelled() {
            return Err(TokenCostError::Cancelled {
                stage: "extracting".into(),
            });
        }
        let extract_start = Instant::now();
        let doc = extract::extract(file, config).await?;
        info!(
            "Extracted {} chars from '{}' in {} ms",
            doc.text.chars().count(),
            file.name(),
            extract_start.elapsed().as_millis()
        );
        docs.push(doc);
    }
    Ok(docs)
}

/// Bail out if cancelled, otherwise announce `stage`.
fn checkpoint(config: &AnalysisConfig, stage: AnalysisStage) -> Result<(), TokenCostError> {
    if config.is_cancelled() {
        return Err(TokenCostError::Cancelled {
            stage: stage.to_string(),
        });
    }
    enter(config, stage);
    Ok(())
}

fn enter(config: &AnalysisConfig, stage: AnalysisStage) {
    debug!("Stage → {}", stage);
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_change(stage);
    }
}

async fn resolve_tokenizer(config: &AnalysisConfig) -> Result<Arc<Tokenizer>, TokenCostError> {
    if let Some(ref t) = config.tokenizer {
        return Ok(Arc::clone(t));
    }
    let encoding = config.encoding;
    tokio::task::spawn_blocking(move || Tokenizer::new(encoding).map(Arc::new))
        .await
        .map_err(|e| TokenCostError::Internal(format!("Tokenizer load task panicked: {e}")))?
}
