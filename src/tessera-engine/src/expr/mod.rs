//! Generic expression evaluation.
//!
//! [`ExprEvaluator`] runs whatever a prepared evaluator leaves for generic
//! evaluation, or any expression on its own:
//!
//! - Arithmetic: `+`, `-`, `*`, `/`, `%%`, `^`
//! - Comparison: `==`, `!=`, `<`, `<=`, `>`, `>=`
//! - Logical: `&`, `|`, `!`
//! - Built-ins: `c`, `length`, `sum`, `mean`, `min`, `max`, `abs`, `sqrt`, `is_na`
//! - Special: `(`, `local`, `$`/`@` on maps, `pkg::f(...)`
//!
//! # Example
//!
//! ```rust,ignore
//! use tessera_engine::ExprEvaluator;
//! use tessera_expr::{Environment, Evaluator, Expr};
//!
//! let env = Environment::new().with("y", 5i64);
//! let expr = Expr::binary("+", Expr::sym("y"), Expr::lit(1i64));
//! let value = ExprEvaluator::new().evaluate(&expr, &env)?;
//! ```

mod evaluator;
mod functions;
mod kernels;

pub use evaluator::{ExprEvaluator, Function};
