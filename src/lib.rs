//! Tessera - hybrid grouped expression evaluation
//!
//! Tessera evaluates a parsed expression against a table split into groups.
//! The expression is rewritten once: sub-expressions a result handler
//! recognizes are replaced by placeholders, and whatever remains runs
//! through a generic evaluator per group.
//!
//! ```ignore
//! use tessera::hybrid::prepare;
//!
//! let prepared = prepare(&expr, provider, scope, evaluator)?;
//! let per_group = prepared.run_all(&slices)?;
//! ```

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

// Re-export core crates
pub use common_config as config;
pub use common_error as error;
pub use tessera_core as core;
pub use tessera_engine as engine;
pub use tessera_expr as expr;
pub use tessera_hybrid as hybrid;

/// Tessera version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{ArrayRef, Int64Array};

    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_reexports_work_together() {
        let provider = core::TableSubsets::from_columns([(
            "v",
            Arc::new(Int64Array::from(vec![1, 2, 3, 4])) as ArrayRef,
        )])
        .unwrap();
        let e = expr::Expr::call("sum", vec![expr::Expr::sym("v")]);
        let prepared = hybrid::prepare(
            &e,
            Arc::new(provider),
            Arc::new(expr::Environment::new()),
            Arc::new(engine::ExprEvaluator::new()),
        )
        .unwrap();
        let out = prepared
            .run_all(&[core::Slice::range(0, 2), core::Slice::range(2, 2)])
            .unwrap();
        assert_eq!(out, vec![core::Value::Int64(3), core::Value::Int64(7)]);
    }
}
