//! Format dispatch and the plain-text decoder.
//!
//! [`extract`] picks a reader from the declared format and funnels every
//! reader's failures into [`TokenCostError`]. Backends come from the config
//! when overridden, otherwise the defaults ([`PdfiumTextSource`],
//! [`DocxBackend`], [`LegacyDocBackend`]).

use crate::config::{AnalysisConfig, TextDecoding};
use crate::error::TokenCostError;
use crate::output::ExtractedDocument;
use crate::pipeline::input::{InputFile, SupportedFormat};
use crate::pipeline::pdf::{self, PdfTextSource, PdfiumTextSource};
use crate::pipeline::word::{self, DocxBackend, LegacyDocBackend, TextBackend};
use std::sync::Arc;
use tracing::{info, warn};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Read the file and extract its text according to its declared format.
///
/// Assumes the file has already passed validation; an unsupported media type
/// here is reported as [`TokenCostError::UnsupportedType`].
pub async fn extract(
    file: &InputFile,
    config: &AnalysisConfig,
) -> Result<ExtractedDocument, TokenCostError> {
    let format = file
        .format()
        .ok_or_else(|| TokenCostError::UnsupportedType {
            name: file.name().to_string(),
            media_type: file.media_type().to_string(),
        })?;
    let bytes = file.read_bytes().await?;
    info!(
        "Extracting '{}' as {} ({} bytes)",
        file.name(),
        format,
        bytes.len()
    );

    let doc = match format {
        SupportedFormat::PlainText => {
            let text = decode_text(file.name(), &bytes, config.text_decoding)?;
            ExtractedDocument::new(Some(file.name().to_string()), text, None)
        }
        SupportedFormat::Pdf => {
            let source: Arc<dyn PdfTextSource> = config
                .pdf_source
                .clone()
                .unwrap_or_else(|| Arc::new(PdfiumTextSource::new()));
            pdf::extract_pdf(file.name(), bytes, source, config).await?
        }
        SupportedFormat::ModernWord => {
            word::extract_word(file.name(), bytes, docx_backend(config)).await?
        }
        SupportedFormat::LegacyWord if word::is_zip(&bytes) => {
            warn!(
                "'{}' is declared as .doc but is a ZIP package; reading it as .docx",
                file.name()
            );
            word::extract_word(file.name(), bytes, docx_backend(config)).await?
        }
        SupportedFormat::LegacyWord => {
            let backend: Arc<dyn TextBackend> = config
                .doc_backend
                .clone()
                .unwrap_or_else(|| Arc::new(LegacyDocBackend));
            word::extract_word(file.name(), bytes, backend).await?
        }
    };

    if format != SupportedFormat::Pdf {
        if let Some(ref cb) = config.progress_callback {
            cb.on_extract_progress(1.0);
        }
    }
    Ok(doc)
}

fn docx_backend(config: &AnalysisConfig) -> Arc<dyn TextBackend> {
    config
        .docx_backend
        .clone()
        .unwrap_or_else(|| Arc::new(DocxBackend))
}

/// Decode plain-text bytes as UTF-8, stripping a leading BOM.
pub fn decode_text(
    name: &str,
    bytes: &[u8],
    decoding: TextDecoding,
) -> Result<String, TokenCostError> {
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match decoding {
        TextDecoding::Strict => std::str::from_utf8(body)
            .map(str::to_string)
            .map_err(|e| TokenCostError::DecodeError {
                name: name.to_string(),
                detail: e.to_string(),
            }),
        TextDecoding::Lossy => Ok(String::from_utf8_lossy(body).into_owned()),
    }
}
