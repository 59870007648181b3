//! Reserved call shapes with rewrite-time semantics.

use crate::Call;

/// Operators that assign rather than compute.
pub const ASSIGNMENT_OPERATORS: [&str; 5] = ["<-", "<<-", "->", "->>", "="];

/// Member and namespace access operators.
pub const ACCESSOR_OPERATORS: [&str; 4] = ["$", "@", "::", ":::"];

/// How the rewriter treats a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialForm {
    /// `local(e)`: left untouched, evaluated generically.
    Local,
    /// A formula `~ e` or a `function` definition; its body is not code to substitute into.
    Quoted,
    /// `global(name)`: spliced with the value of `name` in the caller's scope.
    Global,
    /// `column(e)`: spliced with a symbol for the column `e` names.
    Column,
    /// An assignment, which is always rejected.
    Assignment,
    /// `base ACCESSOR member`, atomic for symbol substitution.
    Accessor,
    /// Any other call.
    Ordinary,
}

impl SpecialForm {
    /// Classify a call by its operator and operand shape.
    pub fn classify(call: &Call) -> Self {
        let Some(op) = call.name() else {
            return Self::Ordinary;
        };
        match op {
            "local" => Self::Local,
            "~" | "function" => Self::Quoted,
            "global" => Self::Global,
            "column" => Self::Column,
            op if ASSIGNMENT_OPERATORS.contains(&op) => Self::Assignment,
            op if ACCESSOR_OPERATORS.contains(&op) && call.arity() == 2 => Self::Accessor,
            _ => Self::Ordinary,
        }
    }

    /// Whether the rewriter must leave the whole subtree alone.
    pub fn is_opaque(self) -> bool {
        matches!(self, Self::Local | Self::Quoted)
    }
}
