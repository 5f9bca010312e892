//! Format detection and validation.
//!
//! Runs before any bytes are read. Size is checked before type so an
//! oversized file always reports [`ValidationError::FileTooLarge`] first,
//! whatever it claims to be.

use crate::error::ValidationError;
use crate::pipeline::input::{InputFile, SupportedFormat};

/// Default upload limit: 10 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Check a file against the size limit and the supported media types.
///
/// Returns every problem found; an empty list means the file is acceptable.
/// The limit is inclusive: a file of exactly `max_size_bytes` passes, and a
/// zero-byte file is always valid.
pub fn validate(file: &InputFile, max_size_bytes: u64) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if file.size_bytes() > max_size_bytes {
        errors.push(ValidationError::FileTooLarge {
            name: file.name().to_string(),
            size_bytes: file.size_bytes(),
            limit_bytes: max_size_bytes,
        });
    }

    if SupportedFormat::from_media_type(file.media_type()).is_none() {
        errors.push(ValidationError::UnsupportedType {
            name: file.name().to_string(),
            media_type: file.media_type().to_string(),
        });
    }

    errors
}
