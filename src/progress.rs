//! Progress-callback trait and the pipeline state machine.
//!
//! Inject an [`Arc<dyn AnalysisProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to receive
//! stage transitions and extraction progress.
//!
//! Callbacks are advisory: the pipeline does not wait on them and their
//! return values carry nothing. The trait is `Send + Sync` because PDF pages
//! are extracted on the blocking thread pool.
//!
//! # Example
//!
//! ```rust
//! use edgequake_tokcost::{AnalysisProgressCallback, AnalysisConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct PageCounter {
//!     pages: AtomicUsize,
//! }
//!
//! impl AnalysisProgressCallback for PageCounter {
//!     fn on_page_extracted(&self, page_num: usize, total_pages: usize) {
//!         self.pages.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {}/{} extracted", page_num, total_pages);
//!     }
//! }
//!
//! let counter = Arc::new(PageCounter { pages: AtomicUsize::new(0) });
//!
//! let config = AnalysisConfig::builder()
//!     .progress_callback(counter as Arc<dyn AnalysisProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Where an analysis request currently is.
///
/// ```text
/// Idle → Validating → Extracting → Tokenizing → Estimating → Done
///            │             │            │
///            └─────────────┴────────────┴──▶ Failed(kind)
/// ```
///
/// Raw-text input goes straight from `Idle` to `Tokenizing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisStage {
    Idle,
    Validating,
    Extracting,
    Tokenizing,
    Estimating,
    Done,
    Failed(ErrorKind),
}

impl AnalysisStage {
    /// `Done` and `Failed` are terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalysisStage::Done | AnalysisStage::Failed(_))
    }
}

impl fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisStage::Idle => f.write_str("idle"),
            AnalysisStage::Validating => f.write_str("validating"),
            AnalysisStage::Extracting => f.write_str("extracting"),
            AnalysisStage::Tokenizing => f.write_str("tokenizing"),
            AnalysisStage::Estimating => f.write_str("estimating"),
            AnalysisStage::Done => f.write_str("done"),
            AnalysisStage::Failed(kind) => write!(f, "failed ({kind})"),
        }
    }
}

/// Called by the pipeline as it moves through stages and pages.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait AnalysisProgressCallback: Send + Sync {
    /// Called on every state-machine transition, including the terminal one.
    fn on_stage_change(&self, stage: AnalysisStage) {
        let _ = stage;
    }

    /// Called once the PDF page count is known, before any page is extracted.
    fn on_extraction_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called once per PDF page, in ascending page order.
    ///
    /// # Arguments
    /// * `page_num`   : 1-indexed page number
    /// * `total_pages`: total pages in the document
    fn on_page_extracted(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Extraction progress as a fraction in `0.0..=1.0`.
    ///
    /// PDFs report `page / total` after each page; other formats report
    /// `1.0` once extraction finishes.
    fn on_extract_progress(&self, fraction: f32) {
        let _ = fraction;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;
