//! Configuration types for document analysis.
//!
//! All pipeline behaviour is controlled through [`AnalysisConfig`], built via
//! its [`AnalysisConfigBuilder`]. The model catalog is deliberately *not* part
//! of this struct: pricing data and pipeline knobs change for different
//! reasons, and keeping them apart lets one config price against many
//! catalogs.

use crate::error::TokenCostError;
use crate::pipeline::pdf::PdfTextSource;
use crate::pipeline::tokenize::Tokenizer;
use crate::pipeline::validate::DEFAULT_MAX_FILE_SIZE;
use crate::pipeline::word::TextBackend;
use crate::progress::{AnalysisProgressCallback, ProgressCallback};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Default number of PDF pages extracted concurrently.
pub const DEFAULT_PDF_BATCH_SIZE: usize = 5;

/// Configuration for one or more analysis requests.
///
/// # Example
/// ```rust
/// use edgequake_tokcost::{AnalysisConfig, TextDecoding};
///
/// let config = AnalysisConfig::builder()
///     .pdf_batch_size(8)
///     .text_decoding(TextDecoding::Lossy)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Largest accepted upload, in bytes. Default: 10 MiB.
    pub max_file_size_bytes: u64,

    /// PDF pages extracted concurrently per batch. Default: 5.
    ///
    /// Each batch is gathered completely before the next one starts, so peak
    /// memory is bounded by the batch size rather than the page count.
    pub pdf_batch_size: usize,

    /// How plain-text uploads with invalid UTF-8 are handled. Default: strict.
    pub text_decoding: TextDecoding,

    /// Reference BPE used for the base count. Default: `cl100k_base`.
    pub encoding: TokenEncoding,

    /// Treatment of special-token strings such as `<|endoftext|>`. Default: as text.
    pub special_tokens: SpecialTokenPolicy,

    /// PDF user password for encrypted documents.
    pub pdf_password: Option<String>,

    /// Receives stage transitions and extraction progress.
    pub progress_callback: Option<ProgressCallback>,

    /// Cooperative cancellation, checked between stages and PDF batches.
    pub cancel_token: Option<CancellationToken>,

    /// PDF text backend. Defaults to [`crate::PdfiumTextSource`].
    pub pdf_source: Option<Arc<dyn PdfTextSource>>,

    /// `.docx` backend. Defaults to [`crate::DocxBackend`].
    pub docx_backend: Option<Arc<dyn TextBackend>>,

    /// Legacy `.doc` backend. Defaults to [`crate::LegacyDocBackend`].
    pub doc_backend: Option<Arc<dyn TextBackend>>,

    /// Pre-built tokenizer shared across requests.
    ///
    /// Loading a BPE rank table takes tens of milliseconds; long-lived
    /// services should build one [`Tokenizer`] and share it here. When
    /// `None`, each request builds its own from `encoding`.
    pub tokenizer: Option<Arc<Tokenizer>>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE,
            pdf_batch_size: DEFAULT_PDF_BATCH_SIZE,
            text_decoding: TextDecoding::default(),
            encoding: TokenEncoding::default(),
            special_tokens: SpecialTokenPolicy::default(),
            pdf_password: None,
            progress_callback: None,
            cancel_token: None,
            pdf_source: None,
            docx_backend: None,
            doc_backend: None,
            tokenizer: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("max_file_size_bytes", &self.max_file_size_bytes)
            .field("pdf_batch_size", &self.pdf_batch_size)
            .field("text_decoding", &self.text_decoding)
            .field("encoding", &self.encoding)
            .field("special_tokens", &self.special_tokens)
            .field("pdf_password", &self.pdf_password.as_ref().map(|_| "<redacted>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn AnalysisProgressCallback>"),
            )
            .field("cancel_token", &self.cancel_token)
            .field("pdf_source", &self.pdf_source.as_ref().map(|_| "<dyn PdfTextSource>"))
            .field("docx_backend", &self.docx_backend.as_ref().map(|_| "<dyn TextBackend>"))
            .field("doc_backend", &self.doc_backend.as_ref().map(|_| "<dyn TextBackend>"))
            .field("tokenizer", &self.tokenizer.as_ref().map(|t| t.encoding()))
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }

    /// True once the caller has cancelled this request.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token
            .as_ref()
            .is_some_and(|t| t.is_cancelled())
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn max_file_size_bytes(mut self, bytes: u64) -> Self {
        self.config.max_file_size_bytes = bytes;
        self
    }

    pub fn pdf_batch_size(mut self, n: usize) -> Self {
        self.config.pdf_batch_size = n.max(1);
        self
    }

    pub fn text_decoding(mut self, decoding: TextDecoding) -> Self {
        self.config.text_decoding = decoding;
        self
    }

    pub fn encoding(mut self, encoding: TokenEncoding) -> Self {
        self.config.encoding = encoding;
        self
    }

    pub fn special_tokens(mut self, policy: SpecialTokenPolicy) -> Self {
        self.config.special_tokens = policy;
        self
    }

    pub fn pdf_password(mut self, pwd: impl Into<String>) -> Self {
        self.config.pdf_password = Some(pwd.into());
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn AnalysisProgressCallback>) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.config.cancel_token = Some(token);
        self
    }

    pub fn pdf_source(mut self, source: Arc<dyn PdfTextSource>) -> Self {
        self.config.pdf_source = Some(source);
        self
    }

    pub fn docx_backend(mut self, backend: Arc<dyn TextBackend>) -> Self {
        self.config.docx_backend = Some(backend);
        self
    }

    pub fn doc_backend(mut self, backend: Arc<dyn TextBackend>) -> Self {
        self.config.doc_backend = Some(backend);
        self
    }

    /// Share a pre-built tokenizer; also sets `encoding` to match it.
    pub fn tokenizer(mut self, tokenizer: Arc<Tokenizer>) -> Self {
        self.config.encoding = tokenizer.encoding();
        self.config.tokenizer = Some(tokenizer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, TokenCostError> {
        let c = &self.config;
        if c.pdf_batch_size == 0 {
            return Err(TokenCostError::InvalidConfig(
                "PDF batch size must be ≥ 1".into(),
            ));
        }
        if let Some(ref t) = c.tokenizer {
            if t.encoding() != c.encoding {
                return Err(TokenCostError::InvalidConfig(format!(
                    "tokenizer uses {:?} but encoding is set to {:?}",
                    t.encoding(),
                    c.encoding
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How invalid UTF-8 in plain-text uploads is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextDecoding {
    /// Fail with [`TokenCostError::DecodeError`]. (default)
    #[default]
    Strict,
    /// Replace invalid sequences with U+FFFD and continue.
    Lossy,
}

/// Reference BPE encoding for the base token count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TokenEncoding {
    /// GPT-4 / GPT-3.5-turbo encoding. (default)
    #[default]
    Cl100kBase,
    /// GPT-4o encoding.
    O200kBase,
}

/// Treatment of special-token strings (`<|endoftext|>` etc.) found in documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpecialTokenPolicy {
    /// Encode them as ordinary text. (default)
    #[default]
    AsText,
    /// Encode each as its single special token.
    Allow,
    /// Fail with [`TokenCostError::TokenizationFailure`].
    Reject,
}
