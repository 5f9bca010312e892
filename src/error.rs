//! Error types for the edgequake-tokcost library.
//!
//! Two shapes reflect two distinct contracts:
//!
//! * [`ValidationError`]: returned as a *list* by
//!   [`crate::pipeline::validate::validate`], which never fails. A caller
//!   rendering an upload form wants every problem with a file at once.
//!
//! * [`TokenCostError`]: the single typed failure surfaced by
//!   [`crate::analyze::analyze`]. Every stage classifies its own failures at
//!   the stage boundary, so callers never see pdfium, docx-rs, cfb, or
//!   tiktoken error shapes. [`TokenCostError::kind`] maps each variant onto
//!   the coarse [`ErrorKind`] taxonomy used by the pipeline state machine.

use crate::pipeline::input::SupportedFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse failure taxonomy carried by [`crate::progress::AnalysisStage::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    FileTooLarge,
    UnsupportedType,
    DecodeError,
    MalformedDocument,
    TokenizationFailure,
    Cancelled,
    FileReadFailed,
    PdfiumBindingFailed,
    InvalidConfig,
    InvalidCatalog,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::FileTooLarge => "file too large",
            ErrorKind::UnsupportedType => "unsupported type",
            ErrorKind::DecodeError => "decode error",
            ErrorKind::MalformedDocument => "malformed document",
            ErrorKind::TokenizationFailure => "tokenization failure",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::FileReadFailed => "file read failed",
            ErrorKind::PdfiumBindingFailed => "pdfium binding failed",
            ErrorKind::InvalidConfig => "invalid configuration",
            ErrorKind::InvalidCatalog => "invalid model catalog",
            ErrorKind::Internal => "internal error",
        };
        f.write_str(s)
    }
}

/// A single reason a file was rejected before extraction.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ValidationError {
    /// The file exceeds the configured size limit.
    #[error("File '{name}' is too large ({size_bytes} bytes). Maximum size is {}MB", limit_bytes / (1024 * 1024))]
    FileTooLarge {
        name: String,
        size_bytes: u64,
        limit_bytes: u64,
    },

    /// The declared media type is not one of the supported formats.
    #[error("File '{name}' has unsupported type '{media_type}'. Supported types are: txt, pdf, doc, docx")]
    UnsupportedType { name: String, media_type: String },
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ValidationError::FileTooLarge { .. } => ErrorKind::FileTooLarge,
            ValidationError::UnsupportedType { .. } => ErrorKind::UnsupportedType,
        }
    }
}

/// All errors returned by the edgequake-tokcost library.
#[derive(Debug, Error)]
pub enum TokenCostError {
    // ── Validation ────────────────────────────────────────────────────────
    /// Size validation failed.
    #[error("File '{name}' is too large: {size_bytes} bytes exceeds the {limit_bytes}-byte limit")]
    FileTooLarge {
        name: String,
        size_bytes: u64,
        limit_bytes: u64,
    },

    /// Declared media type is not supported.
    #[error("File '{name}' has unsupported media type '{media_type}'\nSupported: text/plain, application/pdf, application/msword, .docx")]
    UnsupportedType { name: String, media_type: String },

    // ── Extraction ────────────────────────────────────────────────────────
    /// Bytes could not be interpreted as text.
    #[error("File '{name}' is not valid UTF-8 text: {detail}\nRe-save it as UTF-8 or enable lossy decoding.")]
    DecodeError { name: String, detail: String },

    /// PDF or Word structure could not be parsed.
    #[error("{format} document '{name}' is malformed: {detail}")]
    MalformedDocument {
        name: String,
        format: SupportedFormat,
        detail: String,
    },

    /// Could not read an on-disk input file.
    #[error("Failed to read '{path}': {source}")]
    FileReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDF extraction needs the PDFium shared library.\n\
  • Install libpdfium system-wide, or\n\
  • Set PDFIUM_LIB_PATH=/path/to/dir-containing-libpdfium\n"
    )]
    PdfiumBindingFailed(String),

    // ── Tokenization ──────────────────────────────────────────────────────
    /// The reference tokenizer rejected the input or could not be loaded.
    #[error("Tokenization failed: {detail}")]
    TokenizationFailure { detail: String },

    // ── Control ───────────────────────────────────────────────────────────
    /// The caller cancelled the request before it completed.
    #[error("Analysis cancelled during {stage}")]
    Cancelled { stage: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Model catalog could not be parsed or failed validation.
    #[error("Invalid model catalog: {0}")]
    InvalidCatalog(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TokenCostError {
    /// Classify this error into the pipeline's [`ErrorKind`] taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TokenCostError::FileTooLarge { .. } => ErrorKind::FileTooLarge,
            TokenCostError::UnsupportedType { .. } => ErrorKind::UnsupportedType,
            TokenCostError::DecodeError { .. } => ErrorKind::DecodeError,
            TokenCostError::MalformedDocument { .. } => ErrorKind::MalformedDocument,
            TokenCostError::FileReadFailed { .. } => ErrorKind::FileReadFailed,
            TokenCostError::PdfiumBindingFailed(_) => ErrorKind::PdfiumBindingFailed,
            TokenCostError::TokenizationFailure { .. } => ErrorKind::TokenizationFailure,
            TokenCostError::Cancelled { .. } => ErrorKind::Cancelled,
            TokenCostError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            TokenCostError::InvalidCatalog(_) => ErrorKind::InvalidCatalog,
            TokenCostError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Shorthand used by the PDF and Word extractors.
    pub(crate) fn malformed(
        name: &str,
        format: SupportedFormat,
        detail: impl Into<String>,
    ) -> Self {
        TokenCostError::MalformedDocument {
            name: name.to_string(),
            format,
            detail: detail.into(),
        }
    }
}

impl From<ValidationError> for TokenCostError {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::FileTooLarge {
                name,
                size_bytes,
                limit_bytes,
            } => TokenCostError::FileTooLarge {
                name,
                size_bytes,
                limit_bytes,
            },
            ValidationError::UnsupportedType { name, media_type } => {
                TokenCostError::UnsupportedType { name, media_type }
            }
        }
    }
}
