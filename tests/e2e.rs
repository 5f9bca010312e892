//! End-to-end integration tests for edgequake-tokcost.
//!
//! Most tests substitute fake PDF sources, so they run anywhere. Tests that
//! need the real PDFium library are gated behind the `PDFIUM_TESTS`
//! environment variable.
//!
//! Run with:
//!   cargo test --test e2e -- --nocapture
//!
//! Including the PDFium tests:
//!   PDFIUM_TESTS=1 PDFIUM_LIB_PATH=/path/to/libpdfium cargo test --test e2e

use docx_rs::{Docx, Paragraph, Run};
use edgequake_tokcost::{
    analyze, analyze_file, analyze_files, analyze_stream, analyze_text, extract_document,
    AnalysisConfig,
    AnalysisEvent, AnalysisProgressCallback, AnalysisStage, ErrorKind, InputFile, ModelCatalog,
    NoopProgressCallback, PdfSourceError, PdfTextSource, PdfiumTextSource, TextFragment,
    TokenCostError, TokenFamily,
};
use futures::StreamExt;
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const MEDIA_TYPE_PDF: &str = "application/pdf";
const MEDIA_TYPE_TEXT: &str = "text/plain";
const MEDIA_TYPE_DOC: &str = "application/msword";
const MEDIA_TYPE_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip this test unless PDFIUM_TESTS is set.
macro_rules! pdfium_skip_unless_ready {
    () => {{
        if std::env::var("PDFIUM_TESTS").is_err() {
            println!("SKIP: set PDFIUM_TESTS=1 to run PDFium tests");
            return;
        }
    }};
}

fn catalog() -> ModelCatalog {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    ModelCatalog::builtin().expect("builtin catalog")
}

/// Fake PDF whose pages each hold one word. Later pages in a batch finish
/// first, so ordering bugs would show up.
struct WordPages {
    words: Vec<&'static str>,
    on_page: Option<Box<dyn Fn(usize) + Send + Sync>>,
}

impl WordPages {
    fn new(words: Vec<&'static str>) -> Self {
        Self {
            words,
            on_page: None,
        }
    }
}

impl PdfTextSource for WordPages {
    fn page_count(&self, _: &[u8], _: Option<&str>) -> Result<usize, PdfSourceError> {
        Ok(self.words.len())
    }

    fn page_fragments(
        &self,
        _: &[u8],
        _: Option<&str>,
        page_num: usize,
    ) -> Result<Vec<TextFragment>, PdfSourceError> {
        let delay = (self.words.len() - page_num) as u64 * 5;
        std::thread::sleep(Duration::from_millis(delay));
        if let Some(ref f) = self.on_page {
            f(page_num);
        }
        Ok(vec![TextFragment::new(self.words[page_num - 1], 72.0, 720.0)])
    }
}

/// Fake PDF with several positioned fragments per page, listed out of
/// reading order.
struct LayoutPages;

impl PdfTextSource for LayoutPages {
    fn page_count(&self, _: &[u8], _: Option<&str>) -> Result<usize, PdfSourceError> {
        Ok(2)
    }

    fn page_fragments(
        &self,
        _: &[u8],
        _: Option<&str>,
        page_num: usize,
    ) -> Result<Vec<TextFragment>, PdfSourceError> {
        Ok(match page_num {
            1 => vec![
                TextFragment::new("world", 150.2, 700.0),
                TextFragment::new("Hello", 72.0, 699.6),
                TextFragment::new("Title", 72.0, 750.0),
            ],
            _ => vec![
                TextFragment::new("last", 72.0, 100.0),
                TextFragment::new("column", 300.0, 400.0),
                TextFragment::new("second", 72.0, 400.0),
            ],
        })
    }
}

#[derive(Default)]
struct Recorder {
    stages: Mutex<Vec<AnalysisStage>>,
    pages: Mutex<Vec<usize>>,
    fractions: Mutex<Vec<f32>>,
}

impl AnalysisProgressCallback for Recorder {
    fn on_stage_change(&self, stage: AnalysisStage) {
        self.stages.lock().unwrap().push(stage);
    }

    fn on_page_extracted(&self, page_num: usize, _total_pages: usize) {
        self.pages.lock().unwrap().push(page_num);
    }

    fn on_extract_progress(&self, fraction: f32) {
        self.fractions.lock().unwrap().push(fraction);
    }
}

fn fake_pdf(name: &str) -> InputFile {
    InputFile::from_bytes(name, MEDIA_TYPE_PDF, b"%PDF-1.7\n%fake\n".to_vec())
}

/// A real, minimal PDF with one line of Helvetica text per page.
fn build_pdf(pages: &[&str]) -> Vec<u8> {
    let n = pages.len();
    let font_id = 3;
    let first_page_id = 4;
    let mut objects: Vec<String> = Vec::new();

    objects.push("<< /Type /Catalog /Pages 2 0 R >>".into());
    let kids: Vec<String> = (0..n)
        .map(|i| format!("{} 0 R", first_page_id + i * 2))
        .collect();
    objects.push(format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        n
    ));
    objects.push("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".into());
    for (i, text) in pages.iter().enumerate() {
        let content_id = first_page_id + i * 2 + 1;
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 {font_id} 0 R >> >> /Contents {content_id} 0 R >>"
        ));
        let stream = format!("BT /F1 24 Tf 72 720 Td ({text}) Tj ET");
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            stream.len(),
            stream
        ));
    }

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref_at = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for off in offsets {
        out.extend_from_slice(format!("{off:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_at
        )
        .as_bytes(),
    );
    out
}

fn docx_bytes(paragraphs: &[&str]) -> Vec<u8> {
    let mut docx = Docx::new();
    for p in paragraphs {
        docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(*p)));
    }
    let mut buf = Cursor::new(Vec::new());
    docx.build().pack(&mut buf).unwrap();
    buf.into_inner()
}

/// A minimal Word 97 `.doc`: one compressed piece holding `text`.
fn doc_bytes(text: &[u8]) -> Vec<u8> {
    const TEXT_AT: usize = 1024;
    let mut word = vec![0u8; TEXT_AT];
    word[0..2].copy_from_slice(&0xA5ECu16.to_le_bytes());
    word[0x0A..0x0C].copy_from_slice(&0x0200u16.to_le_bytes());
    word[0x20..0x22].copy_from_slice(&14u16.to_le_bytes());
    word[0x3E..0x40].copy_from_slice(&22u16.to_le_bytes());
    word[0x4C..0x50].copy_from_slice(&(text.len() as u32).to_le_bytes());
    word[0x98..0x9A].copy_from_slice(&93u16.to_le_bytes());
    word.extend_from_slice(text);

    let mut clx = vec![0x02];
    clx.extend_from_slice(&16u32.to_le_bytes());
    clx.extend_from_slice(&0u32.to_le_bytes());
    clx.extend_from_slice(&(text.len() as u32).to_le_bytes());
    clx.extend_from_slice(&[0, 0]);
    clx.extend_from_slice(&(((TEXT_AT * 2) as u32) | 0x4000_0000).to_le_bytes());
    clx.extend_from_slice(&[0, 0]);
    word[0x1A6..0x1AA].copy_from_slice(&(clx.len() as u32).to_le_bytes());

    let mut comp = cfb::CompoundFile::create(Cursor::new(Vec::new())).unwrap();
    comp.create_stream("/WordDocument")
        .unwrap()
        .write_all(&word)
        .unwrap();
    comp.create_stream("/1Table").unwrap().write_all(&clx).unwrap();
    comp.flush().unwrap();
    comp.into_inner().into_inner()
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_hello_world_gpt_pricing() {
    let result = analyze_text("Hello world", &catalog(), &AnalysisConfig::default())
        .await
        .unwrap();
    assert_eq!(result.base_token_count(), 2);

    let gpt4o = result.get("gpt-4o").unwrap();
    assert_eq!(gpt4o.token_count, 2);
    assert!((gpt4o.input_cost - 0.000005).abs() < 1e-12);
    assert!((gpt4o.output_cost - 0.00002).abs() < 1e-12);
    assert!((gpt4o.total_cost - 0.000025).abs() < 1e-12);
    assert_eq!(gpt4o.total_cost_display(), "$0.0000");
}

#[tokio::test]
async fn test_hello_world_claude_correction() {
    let result = analyze_text("Hello world", &catalog(), &AnalysisConfig::default())
        .await
        .unwrap();
    for m in result.models() {
        let expected = match m.token_family {
            TokenFamily::GptFamily => 2,
            TokenFamily::ClaudeFamily => 3,
        };
        assert_eq!(m.token_count, expected, "{}", m.model_id);
        assert_eq!(m.total_cost, m.input_cost + m.output_cost);
    }
}

#[tokio::test]
async fn test_three_page_pdf_text() {
    let config = AnalysisConfig::builder()
        .pdf_source(Arc::new(WordPages::new(vec!["A", "B", "C"])))
        .build()
        .unwrap();
    let doc = extract_document(&fake_pdf("abc.pdf"), &config).await.unwrap();
    assert_eq!(doc.text, "A\nB\nC");
    assert_eq!(doc.page_count, Some(3));
}

#[tokio::test]
async fn test_pdf_fragments_in_reading_order() {
    for batch in [1, 5] {
        let config = AnalysisConfig::builder()
            .pdf_source(Arc::new(LayoutPages))
            .pdf_batch_size(batch)
            .build()
            .unwrap();
        let doc = extract_document(&fake_pdf("layout.pdf"), &config)
            .await
            .unwrap();
        assert_eq!(doc.text, "Title Hello world\nsecond column last", "batch {batch}");
    }
}

#[tokio::test]
async fn test_empty_text_file_costs_nothing() {
    let file = InputFile::from_bytes("empty.txt", MEDIA_TYPE_TEXT, Vec::new());
    let result = analyze(file, &catalog(), &AnalysisConfig::default())
        .await
        .unwrap();
    assert_eq!(result.base_token_count(), 0);
    for m in result.models() {
        assert_eq!(m.token_count, 0);
        assert_eq!(m.total_cost, 0.0);
    }
    assert_eq!(result.document().unwrap().char_count, 0);
}

// ── Validation and malformed input ───────────────────────────────────────────

#[tokio::test]
async fn test_oversized_file_rejected_without_reading() {
    let mut tmp = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
    tmp.write_all(&[0u8; 2048]).unwrap();

    let config = AnalysisConfig::builder()
        .max_file_size_bytes(1024)
        .build()
        .unwrap();
    let err = analyze_file(tmp.path(), &catalog(), &config)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FileTooLarge);
}

#[tokio::test]
async fn test_oversized_and_unsupported_reports_size() {
    let file = InputFile::from_bytes("movie.mp4", "video/mp4", vec![0u8; 64]);
    let config = AnalysisConfig::builder()
        .max_file_size_bytes(8)
        .build()
        .unwrap();
    let err = analyze(file, &catalog(), &config).await.unwrap_err();
    assert!(matches!(err, TokenCostError::FileTooLarge { .. }));
}

#[tokio::test]
async fn test_unsupported_type() {
    let file = InputFile::from_bytes("a.png", "image/png", vec![1, 2, 3]);
    let err = analyze(file, &catalog(), &AnalysisConfig::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedType);
}

#[tokio::test]
async fn test_pdf_with_non_pdf_bytes() {
    let file = InputFile::from_bytes("fake.pdf", MEDIA_TYPE_PDF, "not a pdf at all");
    let recorder = Arc::new(Recorder::default());
    let config = AnalysisConfig::builder()
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let err = analyze(file, &catalog(), &config).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedDocument);
    assert_eq!(
        recorder.stages.lock().unwrap().last(),
        Some(&AnalysisStage::Failed(ErrorKind::MalformedDocument))
    );
}

#[tokio::test]
async fn test_invalid_utf8_strict_and_lossy() {
    let bytes = b"caf\xE9".to_vec();
    let strict = analyze(
        InputFile::from_bytes("latin1.txt", MEDIA_TYPE_TEXT, bytes.clone()),
        &catalog(),
        &AnalysisConfig::default(),
    )
    .await
    .unwrap_err();
    assert_eq!(strict.kind(), ErrorKind::DecodeError);

    let lossy = AnalysisConfig::builder()
        .text_decoding(edgequake_tokcost::TextDecoding::Lossy)
        .build()
        .unwrap();
    let result = analyze(
        InputFile::from_bytes("latin1.txt", MEDIA_TYPE_TEXT, bytes),
        &catalog(),
        &lossy,
    )
    .await
    .unwrap();
    assert!(result.base_token_count() > 0);
}

// ── PDF progress ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_page_events_ascending_for_any_batch_size() {
    let words = vec!["one", "two", "three", "four", "five", "six", "seven"];
    let mut texts = Vec::new();

    for batch in [1, 3, 5, 10] {
        let recorder = Arc::new(Recorder::default());
        let config = AnalysisConfig::builder()
            .pdf_batch_size(batch)
            .pdf_source(Arc::new(WordPages::new(words.clone())))
            .progress_callback(recorder.clone())
            .build()
            .unwrap();

        let doc = extract_document(&fake_pdf("seven.pdf"), &config)
            .await
            .unwrap();
        texts.push(doc.text);

        let pages = recorder.pages.lock().unwrap().clone();
        assert_eq!(pages, (1..=7).collect::<Vec<_>>(), "batch size {batch}");
        let fractions = recorder.fractions.lock().unwrap().clone();
        assert_eq!(fractions.len(), 7);
        assert!(fractions.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(fractions.last(), Some(&1.0));
    }

    assert!(texts.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(texts[0], "one\ntwo\nthree\nfour\nfive\nsix\nseven");
}

#[tokio::test]
async fn test_cancel_between_pdf_batches() {
    let token = CancellationToken::new();
    let mut source = WordPages::new(vec!["a", "b", "c", "d"]);
    let trip = token.clone();
    source.on_page = Some(Box::new(move |page| {
        if page == 1 {
            trip.cancel();
        }
    }));

    let recorder = Arc::new(Recorder::default());
    let config = AnalysisConfig::builder()
        .pdf_batch_size(1)
        .pdf_source(Arc::new(source))
        .cancel_token(token)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    let err = analyze(fake_pdf("c.pdf"), &catalog(), &config)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(recorder.pages.lock().unwrap().as_slice(), &[1]);
    assert_eq!(
        recorder.stages.lock().unwrap().last(),
        Some(&AnalysisStage::Failed(ErrorKind::Cancelled))
    );
}

#[tokio::test]
async fn test_stream_reports_pages_then_result() {
    let config = AnalysisConfig::builder()
        .pdf_batch_size(2)
        .pdf_source(Arc::new(WordPages::new(vec!["x", "y", "z"])))
        .build()
        .unwrap();

    let events: Vec<AnalysisEvent> =
        analyze_stream(fake_pdf("s.pdf"), Arc::new(catalog()), config)
            .collect()
            .await;

    let pages: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            AnalysisEvent::PageExtracted { page_num, .. } => Some(*page_num),
            _ => None,
        })
        .collect();
    assert_eq!(pages, vec![1, 2, 3]);

    match events.last() {
        Some(AnalysisEvent::Finished(Ok(result))) => {
            assert_eq!(result.document().unwrap().page_count, Some(3));
        }
        other => panic!("expected Finished(Ok), got {other:?}"),
    }
}

// ── Word documents ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_docx_from_disk() {
    let mut tmp = tempfile::Builder::new().suffix(".docx").tempfile().unwrap();
    tmp.write_all(&docx_bytes(&["Hello", "world"])).unwrap();

    let result = analyze_file(tmp.path(), &catalog(), &AnalysisConfig::default())
        .await
        .unwrap();
    assert!(result.base_token_count() >= 2);
    assert_eq!(result.document().unwrap().char_count, "Hello\n\nworld".len());
}

#[tokio::test]
async fn test_legacy_doc() {
    let file = InputFile::from_bytes("old.doc", MEDIA_TYPE_DOC, doc_bytes(b"Hello world\r"));
    let doc = extract_document(&file, &AnalysisConfig::default())
        .await
        .unwrap();
    assert_eq!(doc.text, "Hello world");

    let result = analyze(file, &catalog(), &AnalysisConfig::default())
        .await
        .unwrap();
    assert_eq!(result.base_token_count(), 2);
}

#[tokio::test]
async fn test_docx_mislabelled_as_doc() {
    let file = InputFile::from_bytes("renamed.doc", MEDIA_TYPE_DOC, docx_bytes(&["Hi there"]));
    let doc = extract_document(&file, &AnalysisConfig::default())
        .await
        .unwrap();
    assert_eq!(doc.text, "Hi there");
}

// ── Several files ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_files_joined_into_one_analysis() {
    let recorder = Arc::new(Recorder::default());
    let config = AnalysisConfig::builder()
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let files = vec![
        InputFile::from_bytes("a.txt", MEDIA_TYPE_TEXT, "Hello"),
        InputFile::from_bytes("b.docx", MEDIA_TYPE_DOCX, docx_bytes(&["world"])),
    ];

    let combined = analyze_files(files, &catalog(), &config).await.unwrap();
    let single = analyze_text("Hello\nworld", &catalog(), &AnalysisConfig::default())
        .await
        .unwrap();
    assert_eq!(combined.base_token_count(), single.base_token_count());

    let names: Vec<_> = combined
        .documents()
        .iter()
        .map(|d| d.source_file_name.as_deref().unwrap())
        .collect();
    assert_eq!(names, vec!["a.txt", "b.docx"]);
    assert_eq!(combined.documents()[1].char_count, 5);
    assert_eq!(
        recorder.stages.lock().unwrap().as_slice(),
        &[
            AnalysisStage::Validating,
            AnalysisStage::Extracting,
            AnalysisStage::Tokenizing,
            AnalysisStage::Estimating,
            AnalysisStage::Done
        ]
    );
}

#[tokio::test]
async fn test_files_validated_before_any_extraction() {
    let recorder = Arc::new(Recorder::default());
    let config = AnalysisConfig::builder()
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let files = vec![
        InputFile::from_bytes("ok.txt", MEDIA_TYPE_TEXT, "fine"),
        InputFile::from_bytes("bad.bin", "application/zip", "PK"),
    ];

    let err = analyze_files(files, &catalog(), &config).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedType);
    assert!(!recorder
        .stages
        .lock()
        .unwrap()
        .contains(&AnalysisStage::Extracting));
}

#[tokio::test]
async fn test_no_files_is_empty_text() {
    let result = analyze_files(Vec::new(), &catalog(), &AnalysisConfig::default())
        .await
        .unwrap();
    assert_eq!(result.base_token_count(), 0);
    assert!(result.documents().is_empty());
}

// ── Output shape ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_json_keyed_by_model_in_catalog_order() {
    let result = analyze_text("Hello world", &catalog(), &AnalysisConfig::default())
        .await
        .unwrap();
    let json = serde_json::to_string(&result).unwrap();

    let ids = ["gpt-4", "gpt-3.5-turbo", "gpt-4o", "claude-3-opus", "claude-3-sonnet"];
    let positions: Vec<usize> = ids
        .iter()
        .map(|id| json.find(&format!("\"{id}\":")).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{json}");

    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    let opus = &value["claude-3-opus"];
    assert_eq!(opus["name"], "Claude 3 Opus");
    assert_eq!(opus["tokenCount"], 3);
    assert_eq!(opus["tokenFamily"], "claudeFamily");
    assert_eq!(opus["exceedsContextWindow"], false);
    for key in ["description", "inputCost", "outputCost", "totalCost", "contextWindowTokens"] {
        assert!(!opus[key].is_null(), "missing {key}");
    }
}

#[tokio::test]
async fn test_context_window_flag() {
    let long = "word ".repeat(9000);
    let result = analyze_text(long, &catalog(), &AnalysisConfig::default())
        .await
        .unwrap();
    assert!(result.get("gpt-4").unwrap().exceeds_context_window);
    assert!(!result.get("gpt-4o").unwrap().exceeds_context_window);
}

// ── Callback plumbing ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_callback_send_in_tokio_spawn() {
    let recorder = Arc::new(Recorder::default());
    let config = AnalysisConfig::builder()
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    let handle = tokio::spawn(async move {
        analyze_text("spawned", &catalog(), &config).await
    });
    handle.await.unwrap().unwrap();
    assert_eq!(
        recorder.stages.lock().unwrap().last(),
        Some(&AnalysisStage::Done)
    );
}

#[test]
fn test_noop_callback_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<NoopProgressCallback>();
    assert_send_sync::<AnalysisConfig>();
    assert_send_sync::<ModelCatalog>();
}

// ── Real PDFium ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_pdfium_three_pages() {
    pdfium_skip_unless_ready!();

    let file = InputFile::from_bytes("abc.pdf", MEDIA_TYPE_PDF, build_pdf(&["A", "B", "C"]));
    let config = AnalysisConfig::builder()
        .pdf_source(Arc::new(PdfiumTextSource::new()))
        .build()
        .unwrap();
    let doc = extract_document(&file, &config).await.unwrap();
    assert_eq!(doc.page_count, Some(3));
    assert_eq!(doc.text, "A\nB\nC");
}

#[tokio::test]
async fn test_pdfium_garbage_after_header() {
    pdfium_skip_unless_ready!();

    let file = InputFile::from_bytes("bad.pdf", MEDIA_TYPE_PDF, b"%PDF-1.4\ngarbage".to_vec());
    let err = extract_document(&file, &AnalysisConfig::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedDocument);
}
