//! Core error types for Tessera.

use thiserror::Error;

/// Result type alias using `TesseraError`.
pub type TesseraResult<T> = std::result::Result<T, TesseraError>;

/// Generic boxed error for external error sources.
pub type GenericError = Box<dyn std::error::Error + Send + Sync>;

/// Core error type for Tessera operations.
///
/// The first five variants form the evaluation taxonomy: they carry the
/// deparsed sub-expression (and column name, where one is involved) so a
/// failure can be acted on without re-running with diagnostics.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TesseraError {
    /// A special form has the wrong number or shape of arguments.
    #[error("StructuralError: {message} in `{expr}`")]
    Structural {
        /// The offending sub-expression.
        expr: String,
        /// What is wrong with it.
        message: String,
    },

    /// `column()` named something that is not a column of the data.
    #[error(
        "UnknownColumn: result of column() expands to `{column}`, which is not a variable from the data (in `{expr}`)"
    )]
    UnknownColumn {
        /// The name `column()` resolved to.
        column: String,
        /// The offending sub-expression.
        expr: String,
    },

    /// An assignment appeared inside an expression.
    #[error("ForbiddenConstruct: assignments are forbidden, found `{operator}` in `{expr}`")]
    ForbiddenConstruct {
        /// The assignment operator.
        operator: String,
        /// The offending sub-expression.
        expr: String,
    },

    /// A free symbol is neither a declared column nor bound in the outer scope.
    #[error("UnresolvedSymbol: object `{name}` not found")]
    UnresolvedSymbol {
        /// The symbol name.
        name: String,
    },

    /// A result handler failed while producing a value for a slice.
    #[error("HandlerProcessError: `{expr}`: {message}")]
    HandlerProcess {
        /// The expression the handler stands in for.
        expr: String,
        /// The underlying failure.
        message: String,
    },

    /// Evaluation was cancelled between groups.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Type mismatch or invalid type operation.
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Invalid value provided.
    #[error("ValueError: {0}")]
    ValueError(String),

    /// Generic evaluation failure.
    #[error("ExecutionError: {0}")]
    ExecutionError(String),

    /// Feature not yet implemented.
    #[error("NotImplemented: {0}")]
    NotImplemented(String),

    /// Internal error (bug in Tessera).
    #[error("InternalError: {0}")]
    InternalError(String),

    /// Arrow error.
    #[error("ArrowError: {0}")]
    ArrowError(#[from] arrow_schema::ArrowError),

    /// JSON serialization error.
    #[error("SerdeJsonError: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// External error from third-party code such as a user handler.
    #[error("ExternalError: {0}")]
    ExternalError(GenericError),
}

impl TesseraError {
    /// Create a new `Structural` error.
    pub fn structural<E: Into<String>, M: Into<String>>(expr: E, message: M) -> Self {
        Self::Structural {
            expr: expr.into(),
            message: message.into(),
        }
    }

    /// Create a new `UnknownColumn` error.
    pub fn unknown_column<C: Into<String>, E: Into<String>>(column: C, expr: E) -> Self {
        Self::UnknownColumn {
            column: column.into(),
            expr: expr.into(),
        }
    }

    /// Create a new `ForbiddenConstruct` error.
    pub fn forbidden<O: Into<String>, E: Into<String>>(operator: O, expr: E) -> Self {
        Self::ForbiddenConstruct {
            operator: operator.into(),
            expr: expr.into(),
        }
    }

    /// Create a new `UnresolvedSymbol` error.
    pub fn unresolved<S: Into<String>>(name: S) -> Self {
        Self::UnresolvedSymbol { name: name.into() }
    }

    /// Create a new `HandlerProcess` error.
    pub fn handler<E: Into<String>, M: Into<String>>(expr: E, message: M) -> Self {
        Self::HandlerProcess {
            expr: expr.into(),
            message: message.into(),
        }
    }

    /// Create a cancellation error.
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Create a new `TypeError`.
    pub fn type_error<S: Into<String>>(msg: S) -> Self {
        Self::TypeError(msg.into())
    }

    /// Create a new `ValueError`.
    pub fn value_error<S: Into<String>>(msg: S) -> Self {
        Self::ValueError(msg.into())
    }

    /// Create a new `ExecutionError`.
    pub fn execution<S: Into<String>>(msg: S) -> Self {
        Self::ExecutionError(msg.into())
    }

    /// Create a new `NotImplemented` error.
    pub fn not_implemented<S: Into<String>>(msg: S) -> Self {
        Self::NotImplemented(msg.into())
    }

    /// Create a new `InternalError`.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::InternalError(msg.into())
    }

    /// Whether this error came from cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// Ensure a condition holds, returning an `ExecutionError` if not.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $msg:expr) => {
        if !$cond {
            return Err($crate::TesseraError::ExecutionError($msg.to_string()));
        }
    };
    ($cond:expr, $variant:ident: $($msg:tt)*) => {
        if !$cond {
            return Err($crate::TesseraError::$variant(format!($($msg)*)));
        }
    };
}

/// Return early with a `TypeError`.
#[macro_export]
macro_rules! type_err {
    ($($arg:tt)*) => {
        return Err($crate::TesseraError::TypeError(format!($($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TesseraError::type_error("expected Int64, got Utf8");
        assert_eq!(err.to_string(), "TypeError: expected Int64, got Utf8");
    }

    #[test]
    fn test_taxonomy_messages_name_the_culprit() {
        let err = TesseraError::unknown_column("missing", "column(\"missing\")");
        let msg = err.to_string();
        assert!(msg.contains("`missing`"));
        assert!(msg.contains("column(\"missing\")"));

        let err = TesseraError::forbidden("<-", "x <- 1");
        assert!(err.to_string().contains("`<-`"));

        let err = TesseraError::unresolved("zz");
        assert_eq!(err.to_string(), "UnresolvedSymbol: object `zz` not found");
    }

    #[test]
    fn test_cancelled() {
        assert!(TesseraError::cancelled("between groups").is_cancelled());
        assert!(!TesseraError::internal("bug").is_cancelled());
    }

    fn check_positive(n: i64) -> TesseraResult<i64> {
        ensure!(n > 0, ValueError: "expected a positive number, got {}", n);
        Ok(n)
    }

    #[test]
    fn test_ensure_macro() {
        assert_eq!(check_positive(3).unwrap(), 3);
        assert!(matches!(
            check_positive(-1),
            Err(TesseraError::ValueError(_))
        ));
    }
}
