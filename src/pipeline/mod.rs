//! Pipeline stages for document token and cost estimation.
//!
//! Each submodule implements exactly one step and is independently
//! testable; the orchestrator in [`crate::analyze`] wires them together and
//! drives the progress state machine.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ validate ──▶ extract ──▶ tokenize ──▶ estimate
//! (file)    (size/type)  (pdf/word/  (tiktoken)   (per-model
//!                         text)                    count + cost)
//! ```
//!
//! 1. [`input`]   : the named file, its declared media type and lazy bytes
//! 2. [`validate`]: size and media-type checks, before any bytes are read
//! 3. [`extract`] : dispatch on format; [`pdf`] and [`word`] hold the
//!    format-specific readers, which run in `spawn_blocking`
//! 4. [`tokenize`]: reference BPE count, also on the blocking pool
//! 5. [`estimate`]: per-family correction and USD cost for every model

pub mod estimate;
pub mod extract;
pub mod input;
pub mod pdf;
pub mod tokenize;
pub mod validate;
pub mod word;
