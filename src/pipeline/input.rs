//! Input model: a named file with a declared media type and lazily-read bytes.
//!
//! ## Why lazy bytes?
//!
//! Validation only needs the declared type and the size. Reading a 500 MB
//! file into memory just to reject it as too large would defeat the point of
//! the size limit, so [`InputFile::from_path`] records the size from file
//! metadata and defers the read to [`InputFile::read_bytes`], which the
//! orchestrator calls only after validation passes.

use crate::error::TokenCostError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Media type for `.txt` files.
pub const MEDIA_TYPE_TEXT: &str = "text/plain";
/// Media type for `.pdf` files.
pub const MEDIA_TYPE_PDF: &str = "application/pdf";
/// Media type for legacy Word `.doc` files.
pub const MEDIA_TYPE_DOC: &str = "application/msword";
/// Media type for Office Open XML `.docx` files.
pub const MEDIA_TYPE_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
/// Fallback media type for files with an unknown extension.
pub const MEDIA_TYPE_UNKNOWN: &str = "application/octet-stream";

/// Document formats the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SupportedFormat {
    PlainText,
    Pdf,
    LegacyWord,
    ModernWord,
}

impl SupportedFormat {
    /// Map a declared media type onto a format.
    ///
    /// Comparison ignores ASCII case and any parameters after `;`, so
    /// `text/plain; charset=utf-8` is plain text.
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            MEDIA_TYPE_TEXT => Some(SupportedFormat::PlainText),
            MEDIA_TYPE_PDF => Some(SupportedFormat::Pdf),
            MEDIA_TYPE_DOC => Some(SupportedFormat::LegacyWord),
            MEDIA_TYPE_DOCX => Some(SupportedFormat::ModernWord),
            _ => None,
        }
    }

    /// Infer a format from a file extension (`.txt`, `.pdf`, `.doc`, `.docx`).
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" => Some(SupportedFormat::PlainText),
            "pdf" => Some(SupportedFormat::Pdf),
            "doc" => Some(SupportedFormat::LegacyWord),
            "docx" => Some(SupportedFormat::ModernWord),
            _ => None,
        }
    }

    /// Canonical media type for this format.
    pub fn media_type(&self) -> &'static str {
        match self {
            SupportedFormat::PlainText => MEDIA_TYPE_TEXT,
            SupportedFormat::Pdf => MEDIA_TYPE_PDF,
            SupportedFormat::LegacyWord => MEDIA_TYPE_DOC,
            SupportedFormat::ModernWord => MEDIA_TYPE_DOCX,
        }
    }
}

impl fmt::Display for SupportedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SupportedFormat::PlainText => "Plain text",
            SupportedFormat::Pdf => "PDF",
            SupportedFormat::LegacyWord => "Word (.doc)",
            SupportedFormat::ModernWord => "Word (.docx)",
        };
        f.write_str(s)
    }
}

/// Where the bytes of an [`InputFile`] live.
#[derive(Debug, Clone)]
pub enum FileContent {
    /// Bytes already in memory (uploads, tests).
    Memory(Bytes),
    /// A file on disk, read on first use.
    Disk(PathBuf),
}

/// A user-supplied document awaiting analysis.
#[derive(Debug, Clone)]
pub struct InputFile {
    name: String,
    media_type: String,
    size_bytes: u64,
    content: FileContent,
}

impl InputFile {
    /// Wrap in-memory bytes with an explicitly declared media type.
    pub fn from_bytes(
        name: impl Into<String>,
        media_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        let bytes = bytes.into();
        Self {
            name: name.into(),
            media_type: media_type.into(),
            size_bytes: bytes.len() as u64,
            content: FileContent::Memory(bytes),
        }
    }

    /// Describe an on-disk file without reading its contents.
    ///
    /// The media type is inferred from the extension; unknown extensions get
    /// `application/octet-stream`, which validation then rejects.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, TokenCostError> {
        let path = path.as_ref().to_path_buf();
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| TokenCostError::FileReadFailed {
                path: path.clone(),
                source: e,
            })?;

        let media_type = SupportedFormat::from_extension(&path)
            .map(|f| f.media_type())
            .unwrap_or(MEDIA_TYPE_UNKNOWN);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        debug!(
            "Input file {} ({} bytes, {})",
            path.display(),
            meta.len(),
            media_type
        );

        Ok(Self {
            name,
            media_type: media_type.to_string(),
            size_bytes: meta.len(),
            content: FileContent::Disk(path),
        })
    }

    /// Override the declared media type (e.g. from an HTTP upload header).
    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = media_type.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn content(&self) -> &FileContent {
        &self.content
    }

    /// The format implied by the declared media type, if supported.
    pub fn format(&self) -> Option<SupportedFormat> {
        SupportedFormat::from_media_type(&self.media_type)
    }

    /// Load the raw bytes. Cheap for in-memory content; reads disk otherwise.
    pub async fn read_bytes(&self) -> Result<Bytes, TokenCostError> {
        match &self.content {
            FileContent::Memory(b) => Ok(b.clone()),
            FileContent::Disk(path) => tokio::fs::read(path)
                .await
                .map(Bytes::from)
                .map_err(|e| TokenCostError::FileReadFailed {
                    path: path.clone(),
                    source: e,
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_media_type() {
        assert_eq!(
            SupportedFormat::from_media_type("text/plain"),
            Some(SupportedFormat::PlainText)
        );
        assert_eq!(
            SupportedFormat::from_media_type("Text/Plain; charset=UTF-8"),
            Some(SupportedFormat::PlainText)
        );
        assert_eq!(
            SupportedFormat::from_media_type("application/pdf"),
            Some(SupportedFormat::Pdf)
        );
        assert_eq!(
            SupportedFormat::from_media_type(MEDIA_TYPE_DOC),
            Some(SupportedFormat::LegacyWord)
        );
        assert_eq!(
            SupportedFormat::from_media_type(MEDIA_TYPE_DOCX),
            Some(SupportedFormat::ModernWord)
        );
        assert_eq!(SupportedFormat::from_media_type("image/png"), None);
        assert_eq!(SupportedFormat::from_media_type(""), None);
    }

    #[test]
    fn test_from_extension() {
        assert_eq!(
            SupportedFormat::from_extension(Path::new("notes.TXT")),
            Some(SupportedFormat::PlainText)
        );
        assert_eq!(
            SupportedFormat::from_extension(Path::new("/tmp/report.docx")),
            Some(SupportedFormat::ModernWord)
        );
        assert_eq!(
            SupportedFormat::from_extension(Path::new("legacy.doc")),
            Some(SupportedFormat::LegacyWord)
        );
        assert_eq!(SupportedFormat::from_extension(Path::new("image.png")), None);
        assert_eq!(SupportedFormat::from_extension(Path::new("README")), None);
    }

    #[test]
    fn test_media_type_roundtrips_through_format() {
        for f in [
            SupportedFormat::PlainText,
            SupportedFormat::Pdf,
            SupportedFormat::LegacyWord,
            SupportedFormat::ModernWord,
        ] {
            assert_eq!(SupportedFormat::from_media_type(f.media_type()), Some(f));
        }
    }

    #[tokio::test]
    async fn test_from_bytes_records_size() {
        let file = InputFile::from_bytes("a.txt", MEDIA_TYPE_TEXT, b"hello".to_vec());
        assert_eq!(file.size_bytes(), 5);
        assert_eq!(file.format(), Some(SupportedFormat::PlainText));
        assert_eq!(&file.read_bytes().await.unwrap()[..], b"hello");
    }

    #[tokio::test]
    async fn test_from_path_is_lazy_and_infers_type() {
        let mut tmp = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        tmp.write_all(b"on disk").unwrap();

        let file = InputFile::from_path(tmp.path()).await.unwrap();
        assert_eq!(file.media_type(), MEDIA_TYPE_TEXT);
        assert_eq!(file.size_bytes(), 7);
        assert!(matches!(file.content(), FileContent::Disk(_)));
        assert_eq!(&file.read_bytes().await.unwrap()[..], b"on disk");
    }

    #[tokio::test]
    async fn test_from_path_missing_file() {
        let err = InputFile::from_path("/definitely/not/here.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, TokenCostError::FileReadFailed { .. }));
    }
}
