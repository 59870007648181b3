//! Result handlers and the registry that recognizes them.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use arrow::datatypes::DataType;
use log::trace;

use common_display::truncate_string;
use common_error::{TesseraError, TesseraResult};
use tessera_core::{ColumnSubsets, Slice, Symbol, Value};
use tessera_expr::{Call, Expr, HandlerId, Scope};

use crate::EXCERPT_LEN;

/// A precomputed stand-in for a recognized sub-expression.
///
/// Bound once during rewriting, then asked for a value once per group.
/// The output covers exactly the rows of `slice`, in slice order, though a
/// handler may look at the rest of the column to compute it.
pub trait ResultHandler: fmt::Debug + Send + Sync {
    /// Produce the value of the sub-expression for one group.
    fn process(&self, slice: &Slice) -> TesseraResult<Value>;
}

/// What a factory can see while deciding whether it matches a call.
pub struct MatchContext<'a> {
    provider: &'a Arc<dyn ColumnSubsets>,
    scope: &'a dyn Scope,
}

impl<'a> MatchContext<'a> {
    /// A context over `provider`, with `scope` as the caller's scope.
    pub fn new(provider: &'a Arc<dyn ColumnSubsets>, scope: &'a dyn Scope) -> Self {
        Self { provider, scope }
    }

    /// The column subset provider.
    pub fn provider(&self) -> &Arc<dyn ColumnSubsets> {
        self.provider
    }

    /// The caller's scope.
    pub fn scope(&self) -> &dyn Scope {
        self.scope
    }

    /// The column named by `expr`, if it is a bare symbol for a declared column.
    pub fn column(&self, expr: &Expr) -> Option<Symbol> {
        expr.as_symbol()
            .filter(|s| self.provider.count(s))
            .cloned()
    }

    /// Arrow type of a declared column.
    pub fn column_type(&self, name: &Symbol) -> Option<DataType> {
        self.provider.column(name).map(|c| c.data_type().clone())
    }
}

impl fmt::Debug for MatchContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchContext")
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

/// Recognizes calls it can stand in for.
pub trait HandlerFactory: Send + Sync {
    /// Bind a handler to `call`, or return `None` when the call is not one this factory handles.
    fn matches(
        &self,
        call: &Call,
        ctx: &MatchContext<'_>,
    ) -> TesseraResult<Option<Box<dyn ResultHandler>>>;
}

impl<F> HandlerFactory for F
where
    F: Fn(&Call, &MatchContext<'_>) -> TesseraResult<Option<Box<dyn ResultHandler>>>
        + Send
        + Sync,
{
    fn matches(
        &self,
        call: &Call,
        ctx: &MatchContext<'_>,
    ) -> TesseraResult<Option<Box<dyn ResultHandler>>> {
        self(call, ctx)
    }
}

/// Handler factories keyed by function name.
///
/// Every lookup is counted, in total and per call shape, so callers can
/// verify how often matching actually runs.
#[derive(Default)]
pub struct HandlerRegistry {
    factories: HashMap<Symbol, Arc<dyn HandlerFactory>>,
    attempts: AtomicUsize,
    shapes: Mutex<HashMap<String, usize>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.factories.keys().map(Symbol::as_str).collect();
        names.sort_unstable();
        f.debug_struct("HandlerRegistry")
            .field("factories", &names)
            .field("attempts", &self.match_attempts())
            .finish()
    }
}

impl HandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in handlers installed.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::builtins::register_all(&mut registry);
        registry
    }

    /// Install `factory` for calls to `name`, returning the factory it replaces.
    pub fn register(
        &mut self,
        name: &str,
        factory: impl HandlerFactory + 'static,
    ) -> Option<Arc<dyn HandlerFactory>> {
        self.factories.insert(Symbol::new(name), Arc::new(factory))
    }

    /// Whether a factory is installed for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&Symbol::new(name))
    }

    /// Ask the registry for a handler bound to `call`.
    pub fn lookup(
        &self,
        call: &Call,
        ctx: &MatchContext<'_>,
    ) -> TesseraResult<Option<Box<dyn ResultHandler>>> {
        let Some(op) = call.operator() else {
            return Ok(None);
        };
        self.attempts.fetch_add(1, Ordering::Relaxed);
        *self
            .shapes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(call.to_string())
            .or_default() += 1;

        let Some(factory) = self.factories.get(op) else {
            return Ok(None);
        };
        let handler = factory.matches(call, ctx)?;
        if handler.is_some() {
            trace!("handler matched `{call}`");
        }
        Ok(handler)
    }

    /// Total number of lookups.
    pub fn match_attempts(&self) -> usize {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Number of lookups for calls that deparse to `shape`.
    pub fn match_attempts_for(&self, shape: &str) -> usize {
        self.shapes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(shape)
            .copied()
            .unwrap_or(0)
    }

    /// The largest number of lookups made for any single call shape.
    pub fn max_attempts_per_shape(&self) -> usize {
        self.shapes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .copied()
            .max()
            .unwrap_or(0)
    }

    /// Reset the lookup counters.
    pub fn reset_match_counts(&self) {
        self.attempts.store(0, Ordering::Relaxed);
        self.shapes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[derive(Debug)]
struct HandlerEntry {
    handler: Box<dyn ResultHandler>,
    expr: String,
}

/// Handlers bound during one rewrite, addressed by [`HandlerId`].
#[derive(Debug, Default)]
pub(crate) struct HandlerTable {
    entries: Vec<HandlerEntry>,
}

impl HandlerTable {
    pub(crate) fn push(&mut self, handler: Box<dyn ResultHandler>, expr: String) -> HandlerId {
        self.entries.push(HandlerEntry { handler, expr });
        HandlerId(self.entries.len() - 1)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deparsed sub-expressions, in handler order.
    pub(crate) fn exprs(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.expr.as_str())
    }

    /// Run handler `id` for `slice`, attributing any failure to its sub-expression.
    pub(crate) fn process(&self, id: HandlerId, slice: &Slice) -> TesseraResult<Value> {
        let entry = self
            .entries
            .get(id.0)
            .ok_or_else(|| TesseraError::internal(format!("{id} is not bound")))?;
        entry.handler.process(slice).map_err(|e| match e {
            e @ (TesseraError::HandlerProcess { .. } | TesseraError::Cancelled(_)) => e,
            other => TesseraError::handler(truncate_string(&entry.expr, EXCERPT_LEN), other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{ArrayRef, Int64Array};
    use tessera_core::TableSubsets;
    use tessera_expr::Environment;

    use super::*;

    #[derive(Debug)]
    struct Constant(i64);

    impl ResultHandler for Constant {
        fn process(&self, _slice: &Slice) -> TesseraResult<Value> {
            Ok(Value::Int64(self.0))
        }
    }

    #[derive(Debug)]
    struct Failing;

    impl ResultHandler for Failing {
        fn process(&self, _slice: &Slice) -> TesseraResult<Value> {
            Err(TesseraError::type_error("bad operand"))
        }
    }

    fn provider() -> Arc<dyn ColumnSubsets> {
        Arc::new(
            TableSubsets::from_columns([(
                "x",
                Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef,
            )])
            .unwrap(),
        )
    }

    #[test]
    fn test_closure_factory_and_counting() {
        let mut registry = HandlerRegistry::new();
        registry.register(
            "seven",
            |_call: &Call, _ctx: &MatchContext<'_>| -> TesseraResult<Option<Box<dyn ResultHandler>>> {
                Ok(Some(Box::new(Constant(7))))
            },
        );
        let provider = provider();
        let env = Environment::new();
        let ctx = MatchContext::new(&provider, &env);

        let call = Expr::call("seven", vec![]);
        let handler = registry.lookup(call.as_call().unwrap(), &ctx).unwrap().unwrap();
        assert_eq!(handler.process(&Slice::whole(2)).unwrap(), Value::Int64(7));

        let other = Expr::call("other", vec![]);
        assert!(registry.lookup(other.as_call().unwrap(), &ctx).unwrap().is_none());

        assert_eq!(registry.match_attempts(), 2);
        assert_eq!(registry.match_attempts_for("seven()"), 1);
        registry.reset_match_counts();
        assert_eq!(registry.match_attempts(), 0);
    }

    #[test]
    fn test_match_context_column() {
        let provider = provider();
        let env = Environment::new();
        let ctx = MatchContext::new(&provider, &env);
        assert_eq!(ctx.column(&Expr::sym("x")), Some(Symbol::new("x")));
        assert_eq!(ctx.column(&Expr::sym("y")), None);
        assert_eq!(ctx.column(&Expr::lit(1i64)), None);
        assert_eq!(ctx.column_type(&Symbol::new("x")), Some(DataType::Int64));
    }

    #[test]
    fn test_table_attributes_failures() {
        let mut table = HandlerTable::default();
        let id = table.push(Box::new(Failing), "bad(x)".to_string());
        let err = table.process(id, &Slice::whole(1)).unwrap_err();
        match err {
            TesseraError::HandlerProcess { expr, message } => {
                assert_eq!(expr, "bad(x)");
                assert!(message.contains("bad operand"));
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(table.process(HandlerId(5), &Slice::whole(1)).is_err());
    }
}
