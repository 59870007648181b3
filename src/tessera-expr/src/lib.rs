//! Expression model for Tessera.
//!
//! - [`Expr`]: owned expression trees with structural queries and in-place mutation
//! - [`SpecialForm`]: classification of reserved call shapes
//! - [`Scope`] and [`Evaluator`]: the seams to the caller's scope and the generic evaluator

pub mod expr;
pub mod scope;
pub mod special;

pub use expr::{Call, Expr, HandlerId};
pub use scope::{Environment, Evaluator, Scope};
pub use special::{ACCESSOR_OPERATORS, ASSIGNMENT_OPERATORS, SpecialForm};
