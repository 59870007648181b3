//! Per-group evaluation driver.
//!
//! [`HybridContext::prepare`] rewrites an expression once. The resulting
//! [`PreparedEvaluator`] is immutable and evaluates any number of slices,
//! sequentially or from several threads at once.

use std::collections::HashMap;
use std::fmt::{self, Write};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread;

use arrow::array::{ArrayRef, new_null_array};
use arrow::datatypes::DataType;
use log::debug;
use tokio::sync::watch;

use common_config::EvaluationConfig;
use common_error::{TesseraError, TesseraResult};
use tessera_core::{ColumnSubsets, Slice, Symbol, Value, collect_into, collector_for, combine_all};
use tessera_expr::{Evaluator, Expr, Scope};

use crate::env::{BoundScope, LazyEnv};
use crate::handler::{HandlerRegistry, HandlerTable};
use crate::rewrite::{ProxySlot, Rewriter};

/// Everything a rewrite needs: data, the caller's scope, the generic
/// evaluator, the handler registry and configuration.
#[derive(Clone)]
pub struct HybridContext {
    provider: Arc<dyn ColumnSubsets>,
    scope: Arc<dyn Scope>,
    evaluator: Arc<dyn Evaluator>,
    registry: Arc<HandlerRegistry>,
    config: EvaluationConfig,
}

impl fmt::Debug for HybridContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HybridContext")
            .field("provider", &self.provider)
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HybridContext {
    /// A context with the built-in handlers and default configuration.
    pub fn new(
        provider: Arc<dyn ColumnSubsets>,
        scope: Arc<dyn Scope>,
        evaluator: Arc<dyn Evaluator>,
    ) -> Self {
        Self {
            provider,
            scope,
            evaluator,
            registry: Arc::new(HandlerRegistry::with_builtins()),
            config: EvaluationConfig::default(),
        }
    }

    /// Use `registry` for handler matching.
    pub fn with_registry(mut self, registry: Arc<HandlerRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Use `config` for rewriting and evaluation.
    pub fn with_config(mut self, config: EvaluationConfig) -> Self {
        self.config = config;
        self
    }

    /// The handler registry.
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// The column subset provider.
    pub fn provider(&self) -> &Arc<dyn ColumnSubsets> {
        &self.provider
    }

    /// Rewrite `expr` once for evaluation over any number of groups.
    ///
    /// Structural errors, unknown columns and assignments are reported here,
    /// before any group runs.
    pub fn prepare(&self, expr: &Expr) -> TesseraResult<PreparedEvaluator> {
        let rewritten = Rewriter::new(
            &self.provider,
            self.scope.as_ref(),
            self.evaluator.as_ref(),
            &self.registry,
            &self.config,
        )
        .rewrite(expr)?;

        let mut proxy_names: Vec<Symbol> = Vec::new();
        for slot in &rewritten.proxies {
            if !proxy_names.contains(&slot.name) {
                proxy_names.push(slot.name.clone());
            }
        }

        Ok(PreparedEvaluator {
            expr: rewritten.expr,
            handlers: rewritten.handlers,
            proxies: rewritten.proxies,
            proxy_names,
            env: LazyEnv::declare(Arc::clone(&self.provider), Arc::clone(&self.scope)),
            provider: Arc::clone(&self.provider),
            evaluator: Arc::clone(&self.evaluator),
            config: self.config.clone(),
            cancel: None,
        })
    }
}

/// Rewrite `expr` with the built-in handlers and default configuration.
pub fn prepare(
    expr: &Expr,
    provider: Arc<dyn ColumnSubsets>,
    scope: Arc<dyn Scope>,
    evaluator: Arc<dyn Evaluator>,
) -> TesseraResult<PreparedEvaluator> {
    HybridContext::new(provider, scope, evaluator).prepare(expr)
}

/// A rewritten expression, ready to evaluate against slices.
pub struct PreparedEvaluator {
    expr: Expr,
    handlers: HandlerTable,
    proxies: Vec<ProxySlot>,
    proxy_names: Vec<Symbol>,
    env: LazyEnv,
    provider: Arc<dyn ColumnSubsets>,
    evaluator: Arc<dyn Evaluator>,
    config: EvaluationConfig,
    cancel: Option<watch::Receiver<bool>>,
}

impl fmt::Debug for PreparedEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedEvaluator")
            .field("expr", &self.expr.to_string())
            .field("handlers", &self.handlers.len())
            .field("proxies", &self.proxies)
            .field("env", &self.env)
            .finish_non_exhaustive()
    }
}

impl PreparedEvaluator {
    /// Check for cancellation between groups.
    pub fn with_cancellation(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel_rx);
        self
    }

    /// The rewritten expression.
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Proxy slots recorded during rewriting.
    pub fn proxy_slots(&self) -> &[ProxySlot] {
        &self.proxies
    }

    /// Whether the whole expression reduced to a single result handler.
    pub fn is_fully_hybrid(&self) -> bool {
        self.expr.is_placeholder()
    }

    /// Number of handlers bound during rewriting.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// How many times the lazy environment's active scope was built.
    pub fn scope_constructions(&self) -> usize {
        self.env.constructions()
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    fn bind<'a>(&'a self, slice: &'a Slice) -> TesseraResult<BoundScope<'a>> {
        let proxies = self
            .proxy_names
            .iter()
            .map(|name| Ok((name.clone(), self.provider.get(name, slice)?)))
            .collect::<TesseraResult<HashMap<_, _>>>()?;
        Ok(BoundScope::new(&self.env, slice, proxies, &self.handlers))
    }

    /// Evaluate the expression for one group.
    pub fn run(&self, slice: &Slice) -> TesseraResult<Value> {
        slice.check_bounds(self.provider.num_rows())?;
        match &self.expr {
            Expr::Placeholder(id) => self.handlers.process(*id, slice),
            Expr::Symbol(name) if self.provider.count(name) => self.provider.get(name, slice),
            Expr::Symbol(name) => self
                .env
                .outer()
                .resolve(name)?
                .ok_or_else(|| TesseraError::unresolved(name.as_str())),
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Call(_) => {
                let scope = self.bind(slice)?;
                self.evaluator.evaluate(&self.expr, &scope)
            }
        }
    }

    /// Evaluate every slice in order.
    ///
    /// Cancellation is checked between groups. A cancelled or failed run
    /// returns the error alone, never the results gathered so far.
    pub fn run_all(&self, slices: &[Slice]) -> TesseraResult<Vec<Value>> {
        let interval = self.config.cancellation_check_interval.max(1);
        let mut out = Vec::with_capacity(slices.len());
        for (i, slice) in slices.iter().enumerate() {
            if i % interval == 0 && self.is_cancelled() {
                debug!("evaluation cancelled after {i} of {} groups", slices.len());
                return Err(TesseraError::cancelled(format!(
                    "evaluation cancelled after {i} of {} groups",
                    slices.len()
                )));
            }
            out.push(self.run(slice)?);
        }
        Ok(out)
    }

    /// Evaluate slices on worker threads. Results keep slice order.
    pub fn run_all_parallel(&self, slices: &[Slice]) -> TesseraResult<Vec<Value>> {
        let workers = self
            .config
            .parallelism
            .unwrap_or_else(|| thread::available_parallelism().map_or(1, NonZeroUsize::get))
            .max(1);
        if workers == 1 || slices.len() < 2 {
            return self.run_all(slices);
        }
        let chunk = slices.len().div_ceil(workers);
        debug!("evaluating {} groups on {workers} threads", slices.len());

        thread::scope(|s| {
            let handles: Vec<_> = slices
                .chunks(chunk)
                .map(|part| s.spawn(move || self.run_all(part)))
                .collect();
            let mut out = Vec::with_capacity(slices.len());
            for handle in handles {
                let part = handle
                    .join()
                    .map_err(|_| TesseraError::internal("group worker panicked"))??;
                out.extend(part);
            }
            Ok(out)
        })
    }

    /// Evaluate every slice and place each result at its group's rows of a
    /// column as long as the table. Rows no slice covers are missing.
    pub fn gather(&self, slices: &[Slice]) -> TesseraResult<ArrayRef> {
        let num_rows = self.provider.num_rows();
        let results = self.run_all(slices)?;
        let mut pairs = slices.iter().zip(&results);
        let Some((slice, first)) = pairs.next() else {
            return Ok(new_null_array(&DataType::Null, num_rows));
        };
        let mut collector = collect_into(collector_for(first, num_rows)?, slice, first)?;
        for (slice, value) in pairs {
            collector = collect_into(collector, slice, value)?;
        }
        Ok(collector.finalize())
    }

    /// Evaluate every slice and concatenate the results end to end.
    pub fn combine(&self, slices: &[Slice]) -> TesseraResult<ArrayRef> {
        combine_all(&self.run_all(slices)?)
    }

    /// Describe the rewritten expression, its handlers and proxy slots.
    pub fn explain(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Rewritten: {}", self.expr);
        out.push_str(&self.expr.explain());
        if !self.handlers.is_empty() {
            out.push_str("Handlers:\n");
            for (i, expr) in self.handlers.exprs().enumerate() {
                let _ = writeln!(out, "  <handler {i}> = {expr}");
            }
        }
        if !self.proxies.is_empty() {
            out.push_str("Proxy slots:\n");
            for slot in &self.proxies {
                let _ = writeln!(out, "  {} at {:?}", slot.name, slot.path);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use arrow::array::{Array, Int64Array};
    use tessera_core::TableSubsets;
    use tessera_expr::Environment;

    use super::*;

    /// Evaluates literals, symbols, placeholders and `+` on integer scalars.
    struct Adder;

    impl Evaluator for Adder {
        fn evaluate(&self, expr: &Expr, scope: &dyn Scope) -> TesseraResult<Value> {
            match expr {
                Expr::Literal(v) => Ok(v.clone()),
                Expr::Symbol(s) => scope
                    .resolve(s)?
                    .ok_or_else(|| TesseraError::unresolved(s.as_str())),
                Expr::Placeholder(id) => scope.placeholder(*id),
                Expr::Call(c) if c.is("+") => {
                    let mut total = 0;
                    for arg in &c.args {
                        match self.evaluate(arg, scope)? {
                            Value::Int64(i) => total += i,
                            other => {
                                return Err(TesseraError::type_error(other.type_name()));
                            }
                        }
                    }
                    Ok(Value::Int64(total))
                }
                other => Err(TesseraError::not_implemented(other.to_string())),
            }
        }
    }

    fn context() -> HybridContext {
        let provider = TableSubsets::from_columns([(
            "v",
            Arc::new(Int64Array::from(vec![1, 2, 3, 4])) as ArrayRef,
        )])
        .unwrap();
        let scope = Environment::new().with("k", 10i64);
        HybridContext::new(Arc::new(provider), Arc::new(scope), Arc::new(Adder))
    }

    #[test]
    fn test_handler_result_plus_outer_symbol() {
        let ctx = context();
        let e = Expr::binary("+", Expr::call("n", vec![]), Expr::sym("k"));
        let prepared = ctx.prepare(&e).unwrap();
        assert!(!prepared.is_fully_hybrid());
        let out = prepared
            .run_all(&[Slice::range(0, 1), Slice::range(1, 3)])
            .unwrap();
        assert_eq!(out, vec![Value::Int64(11), Value::Int64(13)]);
        assert_eq!(prepared.scope_constructions(), 1);
    }

    #[test]
    fn test_shortcuts() {
        let ctx = context();
        let prepared = ctx.prepare(&Expr::sym("k")).unwrap();
        assert_eq!(prepared.run(&Slice::whole(4)).unwrap(), Value::Int64(10));
        let prepared = ctx.prepare(&Expr::lit(7i64)).unwrap();
        assert_eq!(prepared.run(&Slice::whole(4)).unwrap(), Value::Int64(7));
        let prepared = ctx.prepare(&Expr::sym("nope")).unwrap();
        assert!(matches!(
            prepared.run(&Slice::whole(4)),
            Err(TesseraError::UnresolvedSymbol { .. })
        ));
    }

    #[test]
    fn test_out_of_bounds_slice() {
        let prepared = context().prepare(&Expr::call("n", vec![])).unwrap();
        assert!(prepared.run(&Slice::range(2, 5)).is_err());
    }

    #[test]
    fn test_gather_places_rows() {
        let prepared = context().prepare(&Expr::call("n", vec![])).unwrap();
        let col = prepared
            .gather(&[Slice::indices([0, 3]), Slice::indices([1])])
            .unwrap();
        let expected = Int64Array::from(vec![Some(2), Some(1), None, Some(2)]);
        assert_eq!(col.as_ref(), &expected as &dyn Array);

        let empty = prepared.gather(&[]).unwrap();
        assert_eq!(empty.len(), 4);
        assert_eq!(empty.data_type(), &DataType::Null);
    }

    #[test]
    fn test_combine() {
        let prepared = context().prepare(&Expr::sym("v")).unwrap();
        let col = prepared
            .combine(&[Slice::indices([3, 0]), Slice::range(1, 1)])
            .unwrap();
        let expected = Int64Array::from(vec![4, 1, 2]);
        assert_eq!(col.as_ref(), &expected as &dyn Array);
    }

    #[test]
    fn test_explain() {
        let e = Expr::binary("+", Expr::call("sum", vec![Expr::sym("v")]), Expr::sym("v"));
        let prepared = context().prepare(&e).unwrap();
        let text = prepared.explain();
        assert!(text.starts_with("Rewritten: <handler 0> + v\n"));
        assert!(text.contains("<handler 0> = sum(v)"));
        assert!(text.contains("v at [2]"));
    }
}
