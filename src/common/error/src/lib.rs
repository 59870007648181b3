//! Error types and result aliases for Tessera.
//!
//! Every failure surfaced by rewriting or per-group evaluation is a
//! [`TesseraError`]. None of them are recovered internally: an error aborts
//! the whole top-level evaluation.

mod error;

pub use error::{GenericError, TesseraError, TesseraResult};
