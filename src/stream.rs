//! Streaming analysis API: observe a request as a sequence of events.
//!
//! ## Why stream?
//!
//! Callbacks suit progress bars; UIs built around async streams (SSE
//! handlers, TUI event loops) would rather `select!` over one `Stream`.
//! [`analyze_stream`] runs [`crate::analyze::analyze`] on a spawned task and
//! forwards every stage change and page event through a channel, ending
//! with exactly one [`AnalysisEvent::Finished`].
//!
//! A progress callback already present in the config still fires; events
//! are forwarded in addition to it.

use crate::analyze::{analyze, AnalysisInput};
use crate::catalog::ModelCatalog;
use crate::config::AnalysisConfig;
use crate::error::TokenCostError;
use crate::output::AnalysisResult;
use crate::progress::{AnalysisProgressCallback, AnalysisStage, ProgressCallback};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;

/// One observation of a running analysis.
#[derive(Debug)]
pub enum AnalysisEvent {
    /// The pipeline entered a new stage.
    Stage(AnalysisStage),
    /// A PDF page finished extracting (1-indexed, ascending).
    PageExtracted { page_num: usize, total_pages: usize },
    /// Extraction progress in `0.0..=1.0`.
    Progress(f32),
    /// Final outcome; always the last event.
    Finished(Result<AnalysisResult, TokenCostError>),
}

/// A boxed stream of analysis events.
pub type AnalysisEventStream = Pin<Box<dyn Stream<Item = AnalysisEvent> + Send>>;

struct ChannelCallback {
    tx: mpsc::UnboundedSender<AnalysisEvent>,
    inner: Option<ProgressCallback>,
}

impl AnalysisProgressCallback for ChannelCallback {
    fn on_stage_change(&self, stage: AnalysisStage) {
        if let Some(ref cb) = self.inner {
            cb.on_stage_change(stage);
        }
        let _ = self.tx.send(AnalysisEvent::Stage(stage));
    }

    fn on_extraction_start(&self, total_pages: usize) {
        if let Some(ref cb) = self.inner {
            cb.on_extraction_start(total_pages);
        }
    }

    fn on_page_extracted(&self, page_num: usize, total_pages: usize) {
        if let Some(ref cb) = self.inner {
            cb.on_page_extracted(page_num, total_pages);
        }
        let _ = self.tx.send(AnalysisEvent::PageExtracted {
            page_num,
            total_pages,
        });
    }

    fn on_extract_progress(&self, fraction: f32) {
        if let Some(ref cb) = self.inner {
            cb.on_extract_progress(fraction);
        }
        let _ = self.tx.send(AnalysisEvent::Progress(fraction));
    }
}

/// Analyse `input` on a background task, streaming events as they happen.
///
/// Must be called from within a Tokio runtime. Dropping the stream does not
/// stop the analysis; use the config's cancel token for that.
///
/// # Example
/// ```rust,no_run
/// use edgequake_tokcost::{analyze_stream, AnalysisConfig, AnalysisEvent, ModelCatalog};
/// use futures::StreamExt;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let catalog = Arc::new(ModelCatalog::builtin()?);
/// let mut events = analyze_stream("Hello world", catalog, AnalysisConfig::default());
/// while let Some(event) = events.next().await {
///     match event {
///         AnalysisEvent::Stage(s) => println!("stage: {s}"),
///         AnalysisEvent::Finished(Ok(r)) => println!("{} models priced", r.len()),
///         AnalysisEvent::Finished(Err(e)) => eprintln!("Error: {e}"),
///         _ => {}
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn analyze_stream(
    input: impl Into<AnalysisInput>,
    catalog: Arc<ModelCatalog>,
    mut config: AnalysisConfig,
) -> AnalysisEventStream {
    let (tx, rx) = mpsc::unbounded_channel();
    config.progress_callback = Some(Arc::new(ChannelCallback {
        tx: tx.clone(),
        inner: config.progress_callback.take(),
    }));

    let input = input.into();
    tokio::spawn(async move {
        let outcome = analyze(input, &catalog, &config).await;
        let _ = tx.send(AnalysisEvent::Finished(outcome));
    });

    Box::pin(UnboundedReceiverStream::new(rx))
}
