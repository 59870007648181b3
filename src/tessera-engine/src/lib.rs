//! Reference evaluation engine for Tessera.
//!
//! Provides [`ExprEvaluator`], a general-purpose evaluator over Arrow
//! compute kernels. The hybrid layer hands it every sub-expression that no
//! result handler claimed.

#![allow(
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation
)] // Some casts are intentional

pub mod expr;

pub use expr::{ExprEvaluator, Function};
