//! Name resolution and the generic evaluator seam.

use std::collections::HashMap;
use std::sync::Arc;

use common_error::{TesseraError, TesseraResult};
use tessera_core::{Symbol, Value};

use crate::{Expr, HandlerId};

/// Something symbols can be resolved against.
pub trait Scope: Send + Sync {
    /// The value bound to `name`, or `None` when it is not bound here.
    fn resolve(&self, name: &Symbol) -> TesseraResult<Option<Value>>;

    /// The value a result handler produces for the current group.
    fn placeholder(&self, id: HandlerId) -> TesseraResult<Value> {
        Err(TesseraError::internal(format!(
            "{id} evaluated outside of a prepared evaluator"
        )))
    }
}

/// The general-purpose evaluator that runs whatever the rewriter left in place.
pub trait Evaluator: Send + Sync {
    /// Evaluate `expr`, resolving free symbols through `scope`.
    fn evaluate(&self, expr: &Expr, scope: &dyn Scope) -> TesseraResult<Value>;
}

/// A caller scope: named values with an optional enclosing scope.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<Symbol, Value>,
    parent: Option<Arc<Environment>>,
}

impl Environment {
    /// An empty top-level environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty environment enclosed by `parent`.
    pub fn with_parent(parent: Arc<Self>) -> Self {
        Self {
            vars: HashMap::new(),
            parent: Some(parent),
        }
    }

    /// Bind `name` to `value`, replacing any previous binding here.
    pub fn set(&mut self, name: impl Into<Symbol>, value: impl Into<Value>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Builder form of [`Environment::set`].
    #[must_use]
    pub fn with(mut self, name: impl Into<Symbol>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Look `name` up here, then in enclosing scopes.
    pub fn get(&self, name: &Symbol) -> Option<&Value> {
        self.vars
            .get(name)
            .or_else(|| self.parent.as_ref().and_then(|p| p.get(name)))
    }

    /// Whether `name` is bound here or in an enclosing scope.
    pub fn contains(&self, name: &Symbol) -> bool {
        self.get(name).is_some()
    }
}

impl Scope for Environment {
    fn resolve(&self, name: &Symbol) -> TesseraResult<Option<Value>> {
        Ok(self.get(name).cloned())
    }
}
