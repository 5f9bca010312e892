//! CLI binary for edgequake-tokcost.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `AnalysisConfig` and prints the per-model cost table.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_tokcost::{
    analyze, extract_document, format_tokens, AnalysisConfig, AnalysisInput,
    AnalysisProgressCallback, AnalysisResult, AnalysisStage, InputFile, ModelCatalog,
    ProgressCallback, SpecialTokenPolicy, TextDecoding, TokenEncoding,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

/// Terminal progress callback: a spinner that follows the pipeline stages and
/// turns into a page bar once a PDF's page count is known.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_stage_change(&self, stage: AnalysisStage) {
        match stage {
            AnalysisStage::Done => self.bar.finish_and_clear(),
            AnalysisStage::Failed(kind) => {
                self.bar.finish_and_clear();
                eprintln!("{} {}", red("✘"), red(&format!("failed: {kind}")));
            }
            AnalysisStage::Idle => {}
            stage => {
                let label = stage.to_string();
                let mut chars = label.chars();
                let prefix: String = chars
                    .next()
                    .map(|c| c.to_uppercase().chain(chars).collect())
                    .unwrap_or_default();
                self.bar.set_prefix(prefix);
                self.bar.set_message("");
            }
        }
    }

    fn on_extraction_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Reading {total_pages} pages…"))
        ));
    }

    fn on_page_extracted(&self, _page_num: usize, _total_pages: usize) {
        self.bar.inc(1);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Price a document against the built-in catalog
  tokcost report.pdf

  # Raw text instead of a file
  tokcost --text "Hello world"

  # Word documents, old and new
  tokcost contract.docx
  tokcost legacy.doc

  # Several files priced as one combined text
  tokcost chapter1.pdf chapter2.docx appendix.txt

  # Machine-readable output keyed by model id
  tokcost --json notes.txt > costs.json

  # Custom price list and Claude correction factor
  tokcost --catalog prices.json --claude-factor 1.2 paper.pdf

  # Show the extracted text only
  tokcost --extract-only scan.pdf

BUILT-IN MODELS:
  Model            Input $/1M  Output $/1M  Context   Family
  ───────────────  ──────────  ───────────  ────────  ──────
  gpt-4            $30.00      $60.00       8,192     gpt
  gpt-3.5-turbo    $1.00       $2.00        16,385    gpt
  gpt-4o           $2.50       $10.00       128,000   gpt
  claude-3-opus    $15.00      $75.00       200,000   claude
  claude-3-sonnet  $3.00       $15.00       200,000   claude

  Claude counts are the cl100k_base count × 1.15, rounded up. This is an
  approximation, not Anthropic's tokenizer.

ENVIRONMENT VARIABLES:
  TOKCOST_CATALOG         Path to a model catalog JSON file
  TOKCOST_CLAUDE_FACTOR   Override the Claude correction factor
  TOKCOST_ENCODING        cl100k or o200k
  PDFIUM_LIB_PATH         libpdfium file, or the directory containing it
  RUST_LOG                Log filter (e.g. edgequake_tokcost=debug)
"#;

/// Estimate LLM token counts and costs for documents.
#[derive(Parser, Debug)]
#[command(
    name = "tokcost",
    version,
    about = "Estimate LLM token counts and costs for text, PDF, and Word documents",
    long_about = "Extract the text of a .txt, .pdf, .doc or .docx file (or take raw text), \
count its tokens with the cl100k_base BPE, and price it against every model in a catalog.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Documents to analyse (.txt, .pdf, .doc, .docx). Several files are
    /// joined with newlines and priced as one text.
    #[arg(required_unless_present = "text")]
    input: Vec<PathBuf>,

    /// Analyse this text instead of a file.
    #[arg(long, conflicts_with = "input")]
    text: Option<String>,

    /// Model catalog JSON file (default: built-in catalog).
    #[arg(long, env = "TOKCOST_CATALOG")]
    catalog: Option<PathBuf>,

    /// Claude-family correction factor (≥ 1.0).
    #[arg(long, env = "TOKCOST_CLAUDE_FACTOR")]
    claude_factor: Option<f64>,

    /// Reference BPE encoding.
    #[arg(long, env = "TOKCOST_ENCODING", value_enum, default_value = "cl100k")]
    encoding: EncodingArg,

    /// Treatment of special-token strings such as <|endoftext|>.
    #[arg(long, env = "TOKCOST_SPECIAL_TOKENS", value_enum, default_value = "as-text")]
    special_tokens: SpecialTokensArg,

    /// Replace invalid UTF-8 in text files instead of failing.
    #[arg(long, env = "TOKCOST_LOSSY")]
    lossy: bool,

    /// PDF pages extracted concurrently.
    #[arg(long, env = "TOKCOST_BATCH_SIZE", default_value_t = 5)]
    batch_size: usize,

    /// Largest accepted file, in MiB.
    #[arg(long, env = "TOKCOST_MAX_SIZE_MB", default_value_t = 10)]
    max_size_mb: u64,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "TOKCOST_PASSWORD")]
    password: Option<String>,

    /// Output the result as JSON keyed by model id.
    #[arg(long, env = "TOKCOST_JSON")]
    json: bool,

    /// Print the extracted text only, no token counting.
    #[arg(long)]
    extract_only: bool,

    /// Disable progress bar.
    #[arg(long, env = "TOKCOST_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "TOKCOST_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "TOKCOST_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum EncodingArg {
    Cl100k,
    O200k,
}

impl From<EncodingArg> for TokenEncoding {
    fn from(v: EncodingArg) -> Self {
        match v {
            EncodingArg::Cl100k => TokenEncoding::Cl100kBase,
            EncodingArg::O200k => TokenEncoding::O200kBase,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum SpecialTokensArg {
    AsText,
    Allow,
    Reject,
}

impl From<SpecialTokensArg> for SpecialTokenPolicy {
    fn from(v: SpecialTokensArg) -> Self {
        match v {
            SpecialTokensArg::AsText => SpecialTokenPolicy::AsText,
            SpecialTokensArg::Allow => SpecialTokenPolicy::Allow,
            SpecialTokensArg::Reject => SpecialTokenPolicy::Reject,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Ctrl-C cancels the running request ───────────────────────────────
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn AnalysisProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb, cancel)?;

    let input = match cli.text {
        Some(ref text) => AnalysisInput::Text(text.clone()),
        None if cli.input.is_empty() => anyhow::bail!("Provide a file or --text"),
        None => {
            let mut files = Vec::with_capacity(cli.input.len());
            for path in &cli.input {
                files.push(
                    InputFile::from_path(path)
                        .await
                        .with_context(|| format!("Failed to open {}", path.display()))?,
                );
            }
            AnalysisInput::Files(files)
        }
    };

    // ── Extract-only mode ────────────────────────────────────────────────
    if cli.extract_only {
        let AnalysisInput::Files(files) = input else {
            anyhow::bail!("--extract-only needs a file");
        };
        let mut docs = Vec::with_capacity(files.len());
        for file in &files {
            let doc = extract_document(file, &config)
                .await
                .with_context(|| format!("Extraction of {} failed", file.name()))?;
            docs.push(doc);
        }
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&docs).context("Failed to serialise documents")?
            );
        } else {
            let texts: Vec<&str> = docs.iter().map(|d| d.text.as_str()).collect();
            println!("{}", texts.join("\n"));
        }
        return Ok(());
    }

    // ── Run analysis ─────────────────────────────────────────────────────
    let catalog = load_catalog(&cli).await?;
    let start = Instant::now();
    let result = analyze(input, &catalog, &config)
        .await
        .context("Analysis failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&result).context("Failed to serialise result")?;
        println!("{json}");
        return Ok(());
    }

    print_table(&result);

    if !cli.quiet {
        for doc in result.documents() {
            let pages = doc
                .page_count
                .map(|p| format!("  {p} pages"))
                .unwrap_or_default();
            eprintln!(
                "{} {}  {} chars{}  {}",
                green("✔"),
                bold(doc.source_file_name.as_deref().unwrap_or("document")),
                format_tokens(doc.char_count),
                pages,
                dim(&format!("{}ms", start.elapsed().as_millis())),
            );
        }
        eprintln!(
            "   {} base tokens ({:?})",
            dim(&format_tokens(result.base_token_count())),
            config.encoding
        );
    }

    Ok(())
}

/// Map CLI args to `AnalysisConfig`.
fn build_config(
    cli: &Cli,
    progress: Option<ProgressCallback>,
    cancel: CancellationToken,
) -> Result<AnalysisConfig> {
    let mut builder = AnalysisConfig::builder()
        .max_file_size_bytes(cli.max_size_mb.saturating_mul(1024 * 1024))
        .pdf_batch_size(cli.batch_size)
        .encoding(cli.encoding.clone().into())
        .special_tokens(cli.special_tokens.clone().into())
        .text_decoding(if cli.lossy {
            TextDecoding::Lossy
        } else {
            TextDecoding::Strict
        })
        .cancel_token(cancel);

    if let Some(ref pwd) = cli.password {
        builder = builder.pdf_password(pwd.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn load_catalog(cli: &Cli) -> Result<ModelCatalog> {
    let catalog = match cli.catalog {
        Some(ref path) => ModelCatalog::from_path(path)
            .await
            .with_context(|| format!("Failed to load catalog from {}", path.display()))?,
        None => ModelCatalog::builtin().context("Built-in catalog is invalid")?,
    };
    match cli.claude_factor {
        Some(f) => catalog
            .with_claude_correction(f)
            .context("Invalid --claude-factor"),
        None => Ok(catalog),
    }
}

fn print_table(result: &AnalysisResult) {
    let name_width = result
        .models()
        .iter()
        .map(|m| m.name.chars().count())
        .max()
        .unwrap_or(5)
        .max(5);

    println!(
        "{}",
        bold(&format!(
            "{:<name_width$}  {:>12}  {:>12}  {:>12}  {:>12}",
            "Model", "Tokens", "Input", "Output", "Total"
        ))
    );
    for m in result.models() {
        let warn = if m.exceeds_context_window {
            format!(
                "  {}",
                red(&format!(
                    "exceeds {} context",
                    format_tokens(m.context_window_tokens)
                ))
            )
        } else {
            String::new()
        };
        println!(
            "{:<name_width$}  {:>12}  {:>12}  {:>12}  {:>12}{}",
            m.name,
            format_tokens(m.token_count),
            m.input_cost_display(),
            m.output_cost_display(),
            m.total_cost_display(),
            warn,
        );
    }
}
