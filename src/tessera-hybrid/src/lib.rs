//! Hybrid grouped evaluation for Tessera.
//!
//! An expression is rewritten once per top-level evaluation and then run
//! against every group:
//!
//! - [`HandlerRegistry`] recognizes sub-expressions a [`ResultHandler`] can
//!   compute directly from column data
//! - the rewriter resolves `global()`, `column()` and `local()`, rejects
//!   assignments, substitutes handler placeholders and records proxy slots
//! - [`LazyEnv`] resolves the remaining free symbols against the data and
//!   the caller's scope, building its active level at most once
//! - [`PreparedEvaluator`] runs the rewritten tree per slice, handing
//!   residual code to the generic [`Evaluator`](tessera_expr::Evaluator)
//!
//! # Example
//!
//! ```ignore
//! let prepared = prepare(&expr, provider, Arc::new(scope), Arc::new(ExprEvaluator::new()))?;
//! let per_group = prepared.run_all(&slices)?;
//! ```

#![allow(clippy::missing_const_for_fn)] // Builder patterns often can't be const
#![allow(clippy::return_self_not_must_use)] // Builder patterns don't always need must_use
#![allow(
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation
)] // Some casts are intentional
#![allow(clippy::needless_lifetimes)] // Lifetimes are sometimes needed for clarity

mod builtins;
pub mod cancel;
pub mod driver;
pub mod env;
pub mod handler;
pub mod rewrite;

pub use cancel::CancellationHandle;
pub use driver::{HybridContext, PreparedEvaluator, prepare};
pub use env::LazyEnv;
pub use handler::{HandlerFactory, HandlerRegistry, MatchContext, ResultHandler};
pub use rewrite::ProxySlot;

/// Longest expression excerpt quoted in an error message.
pub const EXCERPT_LEN: usize = 120;
