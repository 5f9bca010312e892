//! PDF text extraction via pdfium, in bounded page batches.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and is not safe to call from async contexts. Every page read runs
//! on the blocking pool, so Tokio worker threads never stall on parsing.
//!
//! ## Why batches?
//!
//! Pages are read `pdf_batch_size` at a time. Each batch is gathered
//! completely before the next one starts, which bounds peak memory for
//! long documents and gives cancellation a natural checkpoint. Within a
//! batch, pages may finish in any order; results are re-sorted by page
//! number before they are joined or reported.
//!
//! ## Reading order
//!
//! Fragments on a page are ordered top-to-bottom (y descending, since PDF
//! space grows upwards) and then left-to-right. Coordinates are rounded to
//! whole points first, so fragments on the same visual line share a `y`
//! even when their baselines differ by a fraction of a point.

use crate::config::AnalysisConfig;
use crate::error::TokenCostError;
use crate::output::ExtractedDocument;
use crate::pipeline::input::SupportedFormat;
use bytes::Bytes;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// The `%PDF-` header must appear within this many leading bytes.
const PDF_HEADER_WINDOW: usize = 1024;

/// A positioned run of text on one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFragment {
    pub text: String,
    /// Left edge, rounded to whole PDF points.
    pub x: i64,
    /// Baseline, rounded to whole PDF points. Larger is higher on the page.
    pub y: i64,
}

impl TextFragment {
    pub fn new(text: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            text: text.into(),
            x: x.round() as i64,
            y: y.round() as i64,
        }
    }
}

/// Failure reported by a [`PdfTextSource`].
#[derive(Debug, Error)]
pub enum PdfSourceError {
    /// The backing library could not be loaded.
    #[error("{0}")]
    Unavailable(String),

    /// The bytes are not a readable PDF.
    #[error("{0}")]
    Malformed(String),
}

/// Something that can read positioned text out of PDF bytes.
///
/// Implementations are called from the blocking thread pool, once for the
/// page count and then once per page, possibly concurrently.
pub trait PdfTextSource: Send + Sync {
    /// Number of pages in the document.
    fn page_count(&self, bytes: &[u8], password: Option<&str>) -> Result<usize, PdfSourceError>;

    /// Text fragments of one page, in any order.
    ///
    /// `page_num` is 1-indexed.
    fn page_fragments(
        &self,
        bytes: &[u8],
        password: Option<&str>,
        page_num: usize,
    ) -> Result<Vec<TextFragment>, PdfSourceError>;
}

/// [`PdfTextSource`] backed by the pdfium shared library.
///
/// Binds to the library named by `PDFIUM_LIB_PATH` (a file, or a directory
/// containing the platform library) when set, otherwise to the system
/// library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumTextSource {
    library_path: Option<PathBuf>,
}

impl PdfiumTextSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to an explicit library file or directory, ignoring `PDFIUM_LIB_PATH`.
    pub fn with_library_path(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }

    fn bind(&self) -> Result<Pdfium, PdfSourceError> {
        let configured = self
            .library_path
            .clone()
            .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

        let bindings = match configured {
            Some(path) => Pdfium::bind_to_library(library_file(&path)),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| PdfSourceError::Unavailable(e.to_string()))?;

        Ok(Pdfium::new(bindings))
    }
}

fn library_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        Pdfium::pdfium_platform_library_name_at_path(path)
    } else {
        path.to_path_buf()
    }
}

/// Zero-based pdfium index for a 1-indexed page number.
fn page_index(page_num: usize) -> Result<u16, PdfSourceError> {
    page_num
        .checked_sub(1)
        .and_then(|i| u16::try_from(i).ok())
        .ok_or_else(|| PdfSourceError::Malformed(format!("page {page_num} is out of range")))
}

fn load_error(e: PdfiumError, password: Option<&str>) -> PdfSourceError {
    let detail = format!("{e:?}");
    if detail.contains("Password") || detail.contains("password") {
        if password.is_some() {
            PdfSourceError::Malformed("incorrect password".into())
        } else {
            PdfSourceError::Malformed("document is encrypted; a password is required".into())
        }
    } else {
        PdfSourceError::Malformed(detail)
    }
}

impl PdfTextSource for PdfiumTextSource {
    fn page_count(&self, bytes: &[u8], password: Option<&str>) -> Result<usize, PdfSourceError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, password)
            .map_err(|e| load_error(e, password))?;
        Ok(document.pages().len() as usize)
    }

    fn page_fragments(
        &self,
        bytes: &[u8],
        password: Option<&str>,
        page_num: usize,
    ) -> Result<Vec<TextFragment>, PdfSourceError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, password)
            .map_err(|e| load_error(e, password))?;

        let index = page_index(page_num)?;
        let page = document
            .pages()
            .get(index)
            .map_err(|e| PdfSourceError::Malformed(format!("page {page_num}: {e:?}")))?;
        let text = page
            .text()
            .map_err(|e| PdfSourceError::Malformed(format!("page {page_num} text: {e:?}")))?;

        let fragments = text
            .segments()
            .iter()
            .map(|segment| {
                let bounds = segment.bounds();
                TextFragment::new(
                    segment.text(),
                    bounds.left().value as f64,
                    bounds.bottom().value as f64,
                )
            })
            .collect();

        Ok(fragments)
    }
}

/// True when `%PDF-` appears in the first kilobyte.
pub fn has_pdf_header(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(PDF_HEADER_WINDOW)];
    window.windows(5).any(|w| w == b"%PDF-")
}

/// Join a page's fragments in reading order.
pub fn page_text(mut fragments: Vec<TextFragment>) -> String {
    fragments.sort_by(|a, b| b.y.cmp(&a.y).then(a.x.cmp(&b.x)));
    fragments
        .into_iter()
        .map(|f| f.text)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extract the text of every page of a PDF.
///
/// Fires `on_extraction_start` once the page count is known, then
/// `on_page_extracted` and `on_extract_progress` once per page in ascending
/// page order. Cancellation is checked before each batch.
pub async fn extract_pdf(
    name: &str,
    bytes: Bytes,
    source: Arc<dyn PdfTextSource>,
    config: &AnalysisConfig,
) -> Result<ExtractedDocument, TokenCostError> {
    if !has_pdf_header(&bytes) {
        return Err(TokenCostError::malformed(
            name,
            SupportedFormat::Pdf,
            "missing %PDF header",
        ));
    }

    let password = config.pdf_password.clone();
    let total_pages = {
        let source = Arc::clone(&source);
        let bytes = bytes.clone();
        let password = password.clone();
        tokio::task::spawn_blocking(move || source.page_count(&bytes, password.as_deref()))
            .await
            .map_err(|e| TokenCostError::Internal(format!("PDF page-count task panicked: {e}")))?
            .map_err(|e| source_error(name, e))?
    };
    info!("PDF '{}' has {} pages", name, total_pages);

    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_start(total_pages);
    }

    let batch_size = config.pdf_batch_size.max(1);
    let page_numbers: Vec<usize> = (1..=total_pages).collect();
    let mut pages = Vec::with_capacity(total_pages);

    for batch in page_numbers.chunks(batch_size) {
        if config.is_cancelled() {
            return Err(TokenCostError::Cancelled {
                stage: "extracting".into(),
            });
        }
        debug!(
            "Extracting pages {}-{} of {}",
            batch[0],
            batch[batch.len() - 1],
            total_pages
        );

        let tasks = batch.iter().map(|&page_num| {
            let source = Arc::clone(&source);
            let bytes = bytes.clone();
            let password = password.clone();
            async move {
                let fragments = tokio::task::spawn_blocking(move || {
                    source.page_fragments(&bytes, password.as_deref(), page_num)
                })
                .await;
                (page_num, fragments)
            }
        });

        let mut results = futures::future::join_all(tasks).await;
        results.sort_by_key(|(page_num, _)| *page_num);

        for (page_num, fragments) in results {
            let fragments = fragments
                .map_err(|e| {
                    TokenCostError::Internal(format!("PDF page {page_num} task panicked: {e}"))
                })?
                .map_err(|e| source_error(name, e))?;
            let text = page_text(fragments);
            if text.is_empty() {
                warn!("PDF '{}' page {} has no extractable text", name, page_num);
            }
            pages.push(text);

            if let Some(ref cb) = config.progress_callback {
                cb.on_page_extracted(page_num, total_pages);
                cb.on_extract_progress(page_num as f32 / total_pages as f32);
            }
        }
    }

    if total_pages == 0 {
        if let Some(ref cb) = config.progress_callback {
            cb.on_extract_progress(1.0);
        }
    }

    let text = pages.join("\n").trim().to_string();
    Ok(ExtractedDocument::new(
        Some(name.to_string()),
        text,
        Some(total_pages),
    ))
}

fn source_error(name: &str, e: PdfSourceError) -> TokenCostError {
    match e {
        PdfSourceError::Unavailable(detail) => TokenCostError::PdfiumBindingFailed(detail),
        PdfSourceError::Malformed(detail) => {
            TokenCostError::malformed(name, SupportedFormat::Pdf, detail)
        }
    }
}
