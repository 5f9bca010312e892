//! Reference token counting with tiktoken-rs.
//!
//! Only GPT-family encodings are real here; other families are derived from
//! this count by the estimator. Loading a rank table is comparatively
//! expensive, so a [`Tokenizer`] is built once and shared via `Arc`.

use crate::config::{SpecialTokenPolicy, TokenEncoding};
use crate::error::TokenCostError;
use std::fmt;
use std::sync::Arc;
use tiktoken_rs::{cl100k_base, o200k_base, CoreBPE};
use tracing::debug;

/// A loaded BPE encoding.
pub struct Tokenizer {
    encoding: TokenEncoding,
    bpe: CoreBPE,
}

impl fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokenizer")
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

impl Tokenizer {
    /// Load the rank table for `encoding`.
    pub fn new(encoding: TokenEncoding) -> Result<Self, TokenCostError> {
        let bpe = match encoding {
            TokenEncoding::Cl100kBase => cl100k_base(),
            TokenEncoding::O200kBase => o200k_base(),
        }
        .map_err(|e| TokenCostError::TokenizationFailure {
            detail: format!("could not load {encoding:?} encoding: {e}"),
        })?;
        debug!("Loaded {:?} tokenizer", encoding);
        Ok(Self { encoding, bpe })
    }

    pub fn encoding(&self) -> TokenEncoding {
        self.encoding
    }

    /// Count tokens in `text`. The empty string has zero tokens; nothing is
    /// truncated.
    pub fn count_base_tokens(
        &self,
        text: &str,
        policy: SpecialTokenPolicy,
    ) -> Result<usize, TokenCostError> {
        if text.is_empty() {
            return Ok(0);
        }
        let count = match policy {
            SpecialTokenPolicy::AsText => self.bpe.encode_ordinary(text).len(),
            SpecialTokenPolicy::Allow => self.bpe.encode_with_special_tokens(text).len(),
            SpecialTokenPolicy::Reject => {
                // Only the loaded encoding's own special tokens are rejected.
                let first = self
                    .bpe
                    .special_tokens()
                    .into_iter()
                    .filter_map(|tok| text.find(tok).map(|at| (at, tok)))
                    .min();
                if let Some((_, tok)) = first {
                    return Err(TokenCostError::TokenizationFailure {
                        detail: format!("text contains the special token {tok}"),
                    });
                }
                self.bpe.encode_ordinary(text).len()
            }
        };
        Ok(count)
    }
}

/// Count tokens on the blocking pool.
pub async fn count_tokens(
    tokenizer: Arc<Tokenizer>,
    text: String,
    policy: SpecialTokenPolicy,
) -> Result<usize, TokenCostError> {
    tokio::task::spawn_blocking(move || tokenizer.count_base_tokens(&text, policy))
        .await
        .map_err(|e| TokenCostError::Internal(format!("Tokenizer task panicked: {e}")))?
}
