//! Word document readers: `.docx` via docx-rs, legacy `.doc` via cfb.
//!
//! Both sit behind [`TextBackend`] so the orchestrator and tests can swap
//! them out. Readers are synchronous; [`extract_word`] runs them on the
//! blocking pool.
//!
//! ## Legacy `.doc` layout
//!
//! A `.doc` file is an OLE2 compound file. The `WordDocument` stream starts
//! with the File Information Block (FIB), which records the main-text length
//! (`ccpText`) and where the piece table (CLX) lives inside the `0Table` or
//! `1Table` stream. The piece table maps character positions onto byte
//! ranges of `WordDocument`, each stored either as 8-bit cp1252 or UTF-16LE.

use crate::error::TokenCostError;
use crate::output::ExtractedDocument;
use crate::pipeline::input::SupportedFormat;
use bytes::Bytes;
use std::io::{Cursor, Read};
use std::sync::Arc;
use tracing::{debug, info};

/// Something that can turn a Word document into plain text.
pub trait TextBackend: Send + Sync {
    /// Extract the document's text. `name` is used only in error messages.
    fn extract_text(&self, name: &str, bytes: &[u8]) -> Result<String, TokenCostError>;
}

/// Run `backend` on the blocking pool and wrap its output.
pub async fn extract_word(
    name: &str,
    bytes: Bytes,
    backend: Arc<dyn TextBackend>,
) -> Result<ExtractedDocument, TokenCostError> {
    let owned_name = name.to_string();
    let text = tokio::task::spawn_blocking(move || backend.extract_text(&owned_name, &bytes))
        .await
        .map_err(|e| TokenCostError::Internal(format!("Word extraction task panicked: {e}")))??;

    info!("Extracted {} chars from '{}'", text.chars().count(), name);
    Ok(ExtractedDocument::new(Some(name.to_string()), text, None))
}

/// True for a ZIP local-file header, i.e. an OOXML package.
pub fn is_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(b"PK\x03\x04")
}

// ── .docx ────────────────────────────────────────────────────────────────

/// Reads `.docx` packages with docx-rs.
///
/// Paragraphs are separated by a blank line; table cells by tabs and table
/// rows by newlines. Formatting is discarded. Tracked insertions, moved-to
/// text, content controls and nested tables count as visible text; tracked
/// deletions and moved-from text do not.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocxBackend;

impl TextBackend for DocxBackend {
    fn extract_text(&self, name: &str, bytes: &[u8]) -> Result<String, TokenCostError> {
        if !is_zip(bytes) {
            return Err(TokenCostError::malformed(
                name,
                SupportedFormat::ModernWord,
                "not a ZIP package",
            ));
        }

        let doc = docx_rs::read_docx(bytes).map_err(|e| {
            TokenCostError::malformed(name, SupportedFormat::ModernWord, e.to_string())
        })?;

        let mut blocks = Vec::new();
        for child in &doc.document.children {
            match child {
                docx_rs::DocumentChild::Paragraph(para) => blocks.push(paragraph_text(para)),
                docx_rs::DocumentChild::Table(table) => blocks.push(table_text(table)),
                docx_rs::DocumentChild::StructuredDataTag(sdt) => push_sdt_blocks(sdt, &mut blocks),
                _ => {}
            }
        }

        Ok(blocks.join("\n\n").trim().to_string())
    }
}

/// Block-level content control: runs collect into one block, paragraphs and
/// tables each become their own.
fn push_sdt_blocks(sdt: &docx_rs::StructuredDataTag, blocks: &mut Vec<String>) {
    let mut inline = String::new();
    for child in &sdt.children {
        match child {
            docx_rs::StructuredDataTagChild::Run(run) => push_run(run, &mut inline),
            docx_rs::StructuredDataTagChild::Paragraph(para) => {
                flush_inline(&mut inline, blocks);
                blocks.push(paragraph_text(para));
            }
            docx_rs::StructuredDataTagChild::Table(table) => {
                flush_inline(&mut inline, blocks);
                blocks.push(table_text(table));
            }
            docx_rs::StructuredDataTagChild::StructuredDataTag(inner) => {
                flush_inline(&mut inline, blocks);
                push_sdt_blocks(inner, blocks);
            }
            _ => {}
        }
    }
    flush_inline(&mut inline, blocks);
}

fn flush_inline(inline: &mut String, blocks: &mut Vec<String>) {
    if !inline.is_empty() {
        blocks.push(std::mem::take(inline));
    }
}

fn paragraph_text(para: &docx_rs::Paragraph) -> String {
    let mut out = String::new();
    for child in &para.children {
        push_paragraph_child(child, &mut out);
    }
    out
}

fn push_paragraph_child(child: &docx_rs::ParagraphChild, out: &mut String) {
    match child {
        docx_rs::ParagraphChild::Run(run) => push_run(run, out),
        docx_rs::ParagraphChild::Hyperlink(link) => {
            for c in &link.children {
                push_paragraph_child(c, out);
            }
        }
        docx_rs::ParagraphChild::Insert(ins) => {
            for c in &ins.children {
                if let docx_rs::InsertChild::Run(run) = c {
                    push_run(run, out);
                }
            }
        }
        docx_rs::ParagraphChild::MoveTo(moved) => {
            for c in &moved.children {
                if let docx_rs::MoveToChild::Run(run) = c {
                    push_run(run, out);
                }
            }
        }
        docx_rs::ParagraphChild::StructuredDataTag(sdt) => push_sdt_inline(sdt, out),
        _ => {}
    }
}

fn push_sdt_inline(sdt: &docx_rs::StructuredDataTag, out: &mut String) {
    for child in &sdt.children {
        match child {
            docx_rs::StructuredDataTagChild::Run(run) => push_run(run, out),
            docx_rs::StructuredDataTagChild::Paragraph(para) => out.push_str(&paragraph_text(para)),
            docx_rs::StructuredDataTagChild::Table(table) => out.push_str(&table_text(table)),
            docx_rs::StructuredDataTagChild::StructuredDataTag(inner) => {
                push_sdt_inline(inner, out)
            }
            _ => {}
        }
    }
}

fn push_run(run: &docx_rs::Run, out: &mut String) {
    for run_child in &run.children {
        match run_child {
            docx_rs::RunChild::Text(text) => out.push_str(&text.text),
            docx_rs::RunChild::Tab(_) => out.push('\t'),
            docx_rs::RunChild::Break(_) => out.push('\n'),
            _ => {}
        }
    }
}

fn table_text(table: &docx_rs::Table) -> String {
    let mut rows = Vec::new();
    for row in &table.rows {
        let docx_rs::TableChild::TableRow(tr) = row;
        let mut cells = Vec::new();
        for cell in &tr.cells {
            let docx_rs::TableRowChild::TableCell(tc) = cell;
            let mut parts = Vec::new();
            for content in &tc.children {
                match content {
                    docx_rs::TableCellContent::Paragraph(p) => parts.push(paragraph_text(p)),
                    docx_rs::TableCellContent::Table(nested) => {
                        parts.push(table_text(nested).replace(['\t', '\n'], " "))
                    }
                    docx_rs::TableCellContent::StructuredDataTag(sdt) => {
                        let mut blocks = Vec::new();
                        push_sdt_blocks(sdt, &mut blocks);
                        parts.extend(blocks);
                    }
                    _ => {}
                }
            }
            cells.push(parts.join(" "));
        }
        rows.push(cells.join("\t"));
    }
    rows.join("\n")
}

// ── .doc ─────────────────────────────────────────────────────────────────

const FIB_MAGIC: u16 = 0xA5EC;
const FIB_FLAGS: usize = 0x0A;
const FLAG_ENCRYPTED: u16 = 0x0100;
const FLAG_WHICH_TABLE: u16 = 0x0200;
const FIB_CSW: usize = 0x20;
/// Index of the fcClx/lcbClx pair in FibRgFcLcb.
const CLX_PAIR_INDEX: usize = 33;
const PIECE_COMPRESSED: u32 = 0x4000_0000;

/// Reads legacy Word 97-2003 `.doc` files.
///
/// Only the main document text is returned; headers, footnotes and other
/// sub-documents are skipped. Field codes are dropped and field results
/// kept. Encrypted documents are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyDocBackend;

impl TextBackend for LegacyDocBackend {
    fn extract_text(&self, name: &str, bytes: &[u8]) -> Result<String, TokenCostError> {
        let malformed =
            |detail: String| TokenCostError::malformed(name, SupportedFormat::LegacyWord, detail);

        let mut file = cfb::CompoundFile::open(Cursor::new(bytes))
            .map_err(|e| malformed(format!("not an OLE2 compound file: {e}")))?;
        let word = read_stream(&mut file, "/WordDocument").map_err(&malformed)?;

        let fib = Fib::parse(&word).map_err(&malformed)?;
        if fib.encrypted {
            return Err(malformed("document is encrypted".into()));
        }

        let table_name = if fib.table_one { "/1Table" } else { "/0Table" };
        let table = read_stream(&mut file, table_name).map_err(&malformed)?;

        let clx = slice(&table, fib.fc_clx as usize, fib.lcb_clx as usize)
            .ok_or_else(|| malformed("piece table lies outside the table stream".into()))?;
        let pieces = parse_pieces(clx).map_err(&malformed)?;
        debug!("'{}': {} pieces, ccpText={}", name, pieces.len(), fib.ccp_text);

        let raw = read_main_text(&word, &pieces, fib.ccp_text as usize).map_err(&malformed)?;
        Ok(clean_control_chars(&raw).trim().to_string())
    }
}

fn read_stream<F: Read + std::io::Seek>(
    file: &mut cfb::CompoundFile<F>,
    path: &str,
) -> Result<Vec<u8>, String> {
    let mut stream = file
        .open_stream(path)
        .map_err(|e| format!("missing {} stream: {e}", path.trim_start_matches('/')))?;
    let mut buf = Vec::new();
    stream
        .read_to_end(&mut buf)
        .map_err(|e| format!("could not read {}: {e}", path.trim_start_matches('/')))?;
    Ok(buf)
}

struct Fib {
    encrypted: bool,
    table_one: bool,
    ccp_text: u32,
    fc_clx: u32,
    lcb_clx: u32,
}

impl Fib {
    fn parse(word: &[u8]) -> Result<Self, String> {
        let short = || "WordDocument stream is too short for a FIB".to_string();

        if read_u16(word, 0).ok_or_else(short)? != FIB_MAGIC {
            return Err("WordDocument stream does not start with a Word FIB".into());
        }
        let flags = read_u16(word, FIB_FLAGS).ok_or_else(short)?;

        let csw = read_u16(word, FIB_CSW).ok_or_else(short)? as usize;
        let cslw_at = FIB_CSW + 2 + csw * 2;
        let cslw = read_u16(word, cslw_at).ok_or_else(short)? as usize;
        let rglw_at = cslw_at + 2;
        let ccp_text = read_u32(word, rglw_at + 3 * 4).ok_or_else(short)?;

        let fclcb_at = rglw_at + cslw * 4 + 2;
        let clx_at = fclcb_at + CLX_PAIR_INDEX * 8;
        let fc_clx = read_u32(word, clx_at).ok_or_else(short)?;
        let lcb_clx = read_u32(word, clx_at + 4).ok_or_else(short)?;

        Ok(Self {
            encrypted: flags & FLAG_ENCRYPTED != 0,
            table_one: flags & FLAG_WHICH_TABLE != 0,
            ccp_text,
            fc_clx,
            lcb_clx,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Piece {
    cp_start: u32,
    cp_end: u32,
    /// Byte offset in WordDocument.
    offset: usize,
    compressed: bool,
}

fn parse_pieces(clx: &[u8]) -> Result<Vec<Piece>, String> {
    let mut pos = 0;
    // Skip Prc entries (formatting) until the Pcdt.
    while clx.get(pos) == Some(&0x01) {
        let cb = read_u16(clx, pos + 1).ok_or("truncated Prc entry")? as i16;
        if cb < 0 {
            return Err("negative Prc size".into());
        }
        pos += 3 + cb as usize;
    }
    if clx.get(pos) != Some(&0x02) {
        return Err("piece table descriptor not found".into());
    }
    let lcb = read_u32(clx, pos + 1).ok_or("truncated piece table")? as usize;
    let plc = slice(clx, pos + 5, lcb).ok_or("truncated piece table")?;
    if lcb < 4 || (lcb - 4) % 12 != 0 {
        return Err(format!("piece table has invalid size {lcb}"));
    }

    let n = (lcb - 4) / 12;
    let pcd_at = (n + 1) * 4;
    let mut pieces = Vec::with_capacity(n);
    for i in 0..n {
        let cp_start = read_u32(plc, i * 4).ok_or("truncated piece table")?;
        let cp_end = read_u32(plc, (i + 1) * 4).ok_or("truncated piece table")?;
        let fc = read_u32(plc, pcd_at + i * 8 + 2).ok_or("truncated piece descriptor")?;
        let compressed = fc & PIECE_COMPRESSED != 0;
        let fc = fc & !PIECE_COMPRESSED;
        pieces.push(Piece {
            cp_start,
            cp_end,
            offset: if compressed { fc as usize / 2 } else { fc as usize },
            compressed,
        });
    }
    Ok(pieces)
}

fn read_main_text(word: &[u8], pieces: &[Piece], ccp_text: usize) -> Result<String, String> {
    let mut out = String::new();
    for piece in pieces {
        let start = piece.cp_start as usize;
        if start >= ccp_text {
            break;
        }
        let end = (piece.cp_end as usize).min(ccp_text);
        if end <= start {
            continue;
        }
        let chars = end - start;

        if piece.compressed {
            let data = slice(word, piece.offset, chars)
                .ok_or_else(|| format!("piece at CP {start} lies outside WordDocument"))?;
            out.extend(data.iter().map(|&b| cp1252_char(b)));
        } else {
            let data = slice(word, piece.offset, chars * 2)
                .ok_or_else(|| format!("piece at CP {start} lies outside WordDocument"))?;
            let units = data.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]]));
            out.extend(char::decode_utf16(units).map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER)));
        }
    }
    Ok(out)
}

/// Map Word's in-text control characters onto plain text.
fn clean_control_chars(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    // One entry per open field; true while still inside its code part.
    let mut fields: Vec<bool> = Vec::new();

    for ch in raw.chars() {
        match ch {
            '\u{13}' => fields.push(true),
            '\u{14}' => {
                if let Some(top) = fields.last_mut() {
                    *top = false;
                }
            }
            '\u{15}' => {
                fields.pop();
            }
            _ if fields.iter().any(|&in_code| in_code) => {}
            '\r' | '\u{07}' | '\u{0B}' | '\u{0C}' => out.push('\n'),
            '\u{1E}' => out.push('-'),
            '\u{01}' | '\u{08}' | '\u{1F}' => {}
            _ => out.push(ch),
        }
    }
    out
}

fn cp1252_char(b: u8) -> char {
    const HIGH: [char; 32] = [
        '\u{20AC}', '\u{FFFD}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}',
        '\u{2021}', '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{FFFD}',
        '\u{017D}', '\u{FFFD}', '\u{FFFD}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}',
        '\u{2022}', '\u{2013}', '\u{2014}', '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}',
        '\u{0153}', '\u{FFFD}', '\u{017E}', '\u{0178}',
    ];
    match b {
        0x80..=0x9F => HIGH[(b - 0x80) as usize],
        _ => b as char,
    }
}

fn slice(buf: &[u8], at: usize, len: usize) -> Option<&[u8]> {
    buf.get(at..at.checked_add(len)?)
}

fn read_u16(buf: &[u8], at: usize) -> Option<u16> {
    slice(buf, at, 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32(buf: &[u8], at: usize) -> Option<u32> {
    slice(buf, at, 4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}
