//! The one-time rewrite of an expression for grouped evaluation.
//!
//! Rewriting works on a private clone and runs three passes:
//!
//! 1. normalize special forms: splice `global()` and `column()`, reject
//!    assignments, leave `local()` and quoted code alone
//! 2. substitute handler placeholders, re-scanning from the top after each
//!    substitution until nothing more matches
//! 3. record proxy slots for the declared column symbols that remain

use std::sync::Arc;

use log::{debug, trace};

use common_config::EvaluationConfig;
use common_display::truncate_string;
use common_error::{TesseraError, TesseraResult};
use tessera_core::{ColumnSubsets, Symbol, Value};
use tessera_expr::{Call, Evaluator, Expr, HandlerId, Scope, SpecialForm};

use crate::EXCERPT_LEN;
use crate::handler::{HandlerRegistry, HandlerTable, MatchContext, ResultHandler};

/// A location in the rewritten tree holding a bare column symbol.
///
/// `path` follows [`Expr::get`]: `0` is a call's head, `i + 1` its `i`-th operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySlot {
    /// Path from the root to the symbol.
    pub path: Vec<usize>,
    /// The column the symbol names.
    pub name: Symbol,
}

/// Output of a rewrite.
#[derive(Debug)]
pub(crate) struct Rewritten {
    pub(crate) expr: Expr,
    pub(crate) handlers: HandlerTable,
    pub(crate) proxies: Vec<ProxySlot>,
}

pub(crate) struct Rewriter<'a> {
    provider: &'a Arc<dyn ColumnSubsets>,
    scope: &'a dyn Scope,
    evaluator: &'a dyn Evaluator,
    registry: &'a HandlerRegistry,
    config: &'a EvaluationConfig,
    handlers: HandlerTable,
    hits: Vec<(Call, HandlerId)>,
    misses: Vec<Call>,
}

fn excerpt(expr: &impl ToString) -> String {
    truncate_string(&expr.to_string(), EXCERPT_LEN)
}

/// Reject assignments anywhere under `expr`, except in quoted code.
fn reject_assignments(expr: &Expr) -> TesseraResult<()> {
    let Expr::Call(call) = expr else {
        return Ok(());
    };
    match SpecialForm::classify(call) {
        SpecialForm::Quoted => Ok(()),
        SpecialForm::Assignment => Err(TesseraError::forbidden(
            call.name().unwrap_or_default(),
            excerpt(call),
        )),
        _ => {
            reject_assignments(&call.head)?;
            call.args.iter().try_for_each(reject_assignments)
        }
    }
}

impl<'a> Rewriter<'a> {
    pub(crate) fn new(
        provider: &'a Arc<dyn ColumnSubsets>,
        scope: &'a dyn Scope,
        evaluator: &'a dyn Evaluator,
        registry: &'a HandlerRegistry,
        config: &'a EvaluationConfig,
    ) -> Self {
        Self {
            provider,
            scope,
            evaluator,
            registry,
            config,
            handlers: HandlerTable::default(),
            hits: Vec::new(),
            misses: Vec::new(),
        }
    }

    /// Rewrite a clone of `expr`. The caller's tree is never touched.
    pub(crate) fn rewrite(mut self, expr: &Expr) -> TesseraResult<Rewritten> {
        let mut expr = expr.clone();
        self.normalize(&mut expr)?;
        if self.config.is_hybrid() {
            self.simplify(&mut expr)?;
        }
        let mut proxies = Vec::new();
        self.collect_proxies(&expr, &mut Vec::new(), &mut proxies);
        debug!(
            "rewrote `{}` with {} handlers and {} proxy slots",
            excerpt(&expr),
            self.handlers.len(),
            proxies.len()
        );
        Ok(Rewritten {
            expr,
            handlers: self.handlers,
            proxies,
        })
    }

    // -----------------------------------------------------------------------
    // Special forms
    // -----------------------------------------------------------------------

    fn normalize(&self, expr: &mut Expr) -> TesseraResult<()> {
        let Expr::Call(call) = expr else {
            return Ok(());
        };
        match SpecialForm::classify(call) {
            SpecialForm::Quoted => Ok(()),
            SpecialForm::Local => call.args.iter().try_for_each(reject_assignments),
            SpecialForm::Assignment => Err(TesseraError::forbidden(
                call.name().unwrap_or_default(),
                excerpt(call),
            )),
            SpecialForm::Global => {
                let value = self.global(call)?;
                trace!("spliced global value into `{}`", excerpt(call));
                *expr = Expr::Literal(value);
                Ok(())
            }
            SpecialForm::Column => {
                let name = self.column(call)?;
                *expr = Expr::Symbol(name);
                Ok(())
            }
            SpecialForm::Accessor | SpecialForm::Ordinary => {
                self.normalize(&mut call.head)?;
                call.args.iter_mut().try_for_each(|arg| self.normalize(arg))
            }
        }
    }

    /// `global(name)`: the value of `name` in the caller's scope.
    fn global(&self, call: &Call) -> TesseraResult<Value> {
        let [Expr::Symbol(name)] = call.args.as_slice() else {
            return Err(TesseraError::structural(
                excerpt(call),
                "global() only handles symbols",
            ));
        };
        self.scope
            .resolve(name)?
            .ok_or_else(|| TesseraError::unresolved(name.as_str()))
    }

    /// `column(e)`: the declared column `e` names.
    fn column(&self, call: &Call) -> TesseraResult<Symbol> {
        let [arg] = call.args.as_slice() else {
            return Err(TesseraError::structural(
                excerpt(call),
                format!("column() takes exactly one argument, got {}", call.arity()),
            ));
        };
        let name = match arg {
            Expr::Call(formula) if formula.is("~") => match formula.args.as_slice() {
                [Expr::Symbol(name)] => name.clone(),
                _ => {
                    return Err(TesseraError::structural(
                        excerpt(call),
                        "unhandled formula in column()",
                    ));
                }
            },
            arg => match self.evaluator.evaluate(arg, self.scope)? {
                Value::String(s) => Symbol::new(&s),
                Value::Symbol(s) => s,
                Value::Array(arr) if arr.len() == 1 => {
                    match Value::from_array_element(arr.as_ref(), 0)? {
                        Value::String(s) => Symbol::new(&s),
                        _ => return Err(self.not_a_name(call)),
                    }
                }
                _ => return Err(self.not_a_name(call)),
            },
        };
        if !self.provider.count(&name) {
            return Err(TesseraError::unknown_column(name.as_str(), excerpt(call)));
        }
        Ok(name)
    }

    fn not_a_name(&self, call: &Call) -> TesseraError {
        TesseraError::structural(excerpt(call), "column argument must resolve to a single name")
    }

    // -----------------------------------------------------------------------
    // Handler substitution
    // -----------------------------------------------------------------------

    fn simplify(&mut self, expr: &mut Expr) -> TesseraResult<()> {
        let mut steps = 0;
        while self.step(expr)? {
            steps += 1;
            trace!("rewrite step {steps}: `{}`", excerpt(expr));
            if steps > self.config.max_rewrite_steps {
                return Err(TesseraError::internal(format!(
                    "rewrite of `{}` exceeded {} steps",
                    excerpt(expr),
                    self.config.max_rewrite_steps
                )));
            }
        }
        Ok(())
    }

    /// Substitute the first match in depth-first, left-to-right order.
    fn step(&mut self, expr: &mut Expr) -> TesseraResult<bool> {
        let Expr::Call(call) = expr else {
            return Ok(false);
        };
        let form = SpecialForm::classify(call);
        if form.is_opaque() {
            return Ok(false);
        }
        if form == SpecialForm::Ordinary {
            if let Some(id) = self.try_match(call)? {
                *expr = Expr::Placeholder(id);
                return Ok(true);
            }
        }
        if call.head.is_call() && self.step(&mut call.head)? {
            return Ok(true);
        }
        for arg in &mut call.args {
            if self.step(arg)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Bind a handler to `call`, asking the registry at most once per distinct call.
    fn try_match(&mut self, call: &Call) -> TesseraResult<Option<HandlerId>> {
        if let Some((_, id)) = self.hits.iter().find(|(c, _)| c == call) {
            return Ok(Some(*id));
        }
        if self.misses.contains(call) {
            return Ok(None);
        }
        let ctx = MatchContext::new(self.provider, self.scope);
        match self.registry.lookup(call, &ctx)? {
            Some(handler) => Ok(Some(self.bind(call, handler))),
            None => {
                self.misses.push(call.clone());
                Ok(None)
            }
        }
    }

    fn bind(&mut self, call: &Call, handler: Box<dyn ResultHandler>) -> HandlerId {
        let id = self.handlers.push(handler, call.to_string());
        debug!("substituted {id} for `{}`", excerpt(call));
        self.hits.push((call.clone(), id));
        id
    }

    // -----------------------------------------------------------------------
    // Proxy slots
    // -----------------------------------------------------------------------

    fn collect_proxies(&self, expr: &Expr, path: &mut Vec<usize>, out: &mut Vec<ProxySlot>) {
        let Expr::Call(call) = expr else {
            return;
        };
        let form = SpecialForm::classify(call);
        if form.is_opaque() {
            return;
        }
        if call.head.is_call() {
            path.push(0);
            self.collect_proxies(&call.head, path, out);
            path.pop();
        }
        for (i, arg) in call.args.iter().enumerate() {
            path.push(i + 1);
            match arg {
                Expr::Symbol(name)
                    if form != SpecialForm::Accessor && self.provider.count(name) =>
                {
                    out.push(ProxySlot {
                        path: path.clone(),
                        name: name.clone(),
                    });
                }
                Expr::Call(_) => self.collect_proxies(arg, path, out),
                _ => {}
            }
            path.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use arrow::array::{ArrayRef, Int64Array};
    use tessera_core::TableSubsets;
    use tessera_expr::Environment;

    use super::*;

    /// Evaluates only literals and symbols; enough for `column()` arguments.
    struct Literals;

    impl Evaluator for Literals {
        fn evaluate(&self, expr: &Expr, scope: &dyn Scope) -> TesseraResult<Value> {
            match expr {
                Expr::Literal(v) => Ok(v.clone()),
                Expr::Symbol(s) => scope
                    .resolve(s)?
                    .ok_or_else(|| TesseraError::unresolved(s.as_str())),
                other => Err(TesseraError::not_implemented(other.to_string())),
            }
        }
    }

    fn provider() -> Arc<dyn ColumnSubsets> {
        Arc::new(
            TableSubsets::from_columns([
                ("x", Arc::new(Int64Array::from(vec![1, 2, 3])) as ArrayRef),
                ("y", Arc::new(Int64Array::from(vec![4, 5, 6])) as ArrayRef),
            ])
            .unwrap(),
        )
    }

    fn rewrite(expr: &Expr, env: &Environment, config: &EvaluationConfig) -> TesseraResult<Rewritten> {
        let provider = provider();
        let registry = HandlerRegistry::with_builtins();
        Rewriter::new(&provider, env, &Literals, &registry, config).rewrite(expr)
    }

    fn rewrite_default(expr: &Expr) -> TesseraResult<Rewritten> {
        rewrite(expr, &Environment::new(), &EvaluationConfig::default())
    }

    #[test]
    fn test_whole_expression_match_stops_traversal() {
        let out = rewrite_default(&Expr::call("mean", vec![Expr::sym("x")])).unwrap();
        assert_eq!(out.expr, Expr::Placeholder(HandlerId(0)));
        assert_eq!(out.handlers.len(), 1);
        assert!(out.proxies.is_empty());
    }

    #[test]
    fn test_nested_matches_left_to_right() {
        // sum(x) / n() - y
        let e = Expr::binary(
            "-",
            Expr::binary("/", Expr::call("sum", vec![Expr::sym("x")]), Expr::call("n", vec![])),
            Expr::sym("y"),
        );
        let out = rewrite_default(&e).unwrap();
        assert_eq!(out.expr.to_string(), "<handler 0> / <handler 1> - y");
        assert_eq!(out.handlers.exprs().collect::<Vec<_>>(), ["sum(x)", "n()"]);
        assert_eq!(
            out.proxies,
            vec![ProxySlot {
                path: vec![2],
                name: Symbol::new("y")
            }]
        );
    }

    #[test]
    fn test_repeated_subexpression_shares_handler() {
        let e = Expr::binary("+", Expr::call("n", vec![]), Expr::call("n", vec![]));
        let out = rewrite_default(&e).unwrap();
        assert_eq!(out.handlers.len(), 1);
        assert_eq!(
            out.expr,
            Expr::binary("+", Expr::Placeholder(HandlerId(0)), Expr::Placeholder(HandlerId(0)))
        );
    }

    #[test]
    fn test_caller_tree_untouched() {
        let e = Expr::binary("+", Expr::call("n", vec![]), Expr::lit(1i64));
        let before = e.clone();
        rewrite_default(&e).unwrap();
        assert_eq!(e, before);
    }

    #[test]
    fn test_generic_mode_skips_substitution() {
        let config = EvaluationConfig::default().with_mode(common_config::EvaluationMode::Generic);
        let e = Expr::call("mean", vec![Expr::sym("x")]);
        let out = rewrite(&e, &Environment::new(), &config).unwrap();
        assert_eq!(out.expr, e);
        assert!(out.handlers.is_empty());
        assert_eq!(out.proxies.len(), 1);
    }

    #[test]
    fn test_global_and_column_splicing() {
        let env = Environment::new().with("y", 5i64).with("which", "x");
        let e = Expr::binary(
            "+",
            Expr::call("global", vec![Expr::sym("y")]),
            Expr::call("column", vec![Expr::sym("which")]),
        );
        let out = rewrite(&e, &env, &EvaluationConfig::default()).unwrap();
        assert_eq!(out.expr, Expr::binary("+", Expr::lit(5i64), Expr::sym("x")));
        assert_eq!(out.proxies[0].name, Symbol::new("x"));
    }

    #[test]
    fn test_column_formula_shorthand() {
        let e = Expr::call("column", vec![Expr::unary("~", Expr::sym("y"))]);
        let out = rewrite_default(&e).unwrap();
        assert_eq!(out.expr, Expr::sym("y"));

        let e = Expr::call("column", vec![Expr::unary("~", Expr::lit(1i64))]);
        assert!(matches!(rewrite_default(&e), Err(TesseraError::Structural { .. })));
    }

    #[test]
    fn test_malformed_special_forms() {
        let e = Expr::call("global", vec![Expr::lit(1i64)]);
        assert!(matches!(rewrite_default(&e), Err(TesseraError::Structural { .. })));
        let e = Expr::call("column", vec![]);
        assert!(matches!(rewrite_default(&e), Err(TesseraError::Structural { .. })));
        let e = Expr::call("column", vec![Expr::lit(3i64)]);
        let err = rewrite_default(&e).unwrap_err();
        assert!(err.to_string().contains("must resolve to a single name"));
    }

    #[test]
    fn test_assignments_rejected_even_inside_local() {
        let assign = Expr::binary("<-", Expr::sym("x"), Expr::lit(1i64));
        let nested = Expr::call("mean", vec![assign.clone()]);
        assert!(matches!(
            rewrite_default(&nested),
            Err(TesseraError::ForbiddenConstruct { .. })
        ));
        let local = Expr::call("local", vec![assign.clone()]);
        assert!(matches!(
            rewrite_default(&local),
            Err(TesseraError::ForbiddenConstruct { .. })
        ));
        // Quoted code is data, not a statement.
        let formula = Expr::unary("~", assign);
        assert!(rewrite_default(&formula).is_ok());
    }

    #[test]
    fn test_local_is_opaque() {
        let e = Expr::call("local", vec![Expr::call("n", vec![])]);
        let out = rewrite_default(&e).unwrap();
        assert_eq!(out.expr, e);
        assert!(out.handlers.is_empty());
        assert!(out.proxies.is_empty());
    }

    #[derive(Debug)]
    struct Missing;

    impl ResultHandler for Missing {
        fn process(&self, _slice: &tessera_core::Slice) -> TesseraResult<Value> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn test_miss_does_not_hide_call_with_same_text() {
        // `f(NA)` with the symbol `NA` and `f(<null literal>)` both print as "f(NA)".
        let mut registry = HandlerRegistry::new();
        registry.register(
            "f",
            |call: &Call, _ctx: &MatchContext<'_>| -> TesseraResult<Option<Box<dyn ResultHandler>>> {
                match call.args.as_slice() {
                    [Expr::Literal(Value::Null)] => Ok(Some(Box::new(Missing))),
                    _ => Ok(None),
                }
            },
        );
        let by_symbol = Expr::call("f", vec![Expr::sym("NA")]);
        let by_literal = Expr::call("f", vec![Expr::lit(Value::Null)]);
        assert_eq!(by_symbol.to_string(), by_literal.to_string());

        let e = Expr::binary("+", by_symbol.clone(), by_literal);
        let provider = provider();
        let env = Environment::new();
        let config = EvaluationConfig::default();
        let out = Rewriter::new(&provider, &env, &Literals, &registry, &config)
            .rewrite(&e)
            .unwrap();
        assert_eq!(out.handlers.len(), 1);
        assert_eq!(out.expr, Expr::binary("+", by_symbol, Expr::Placeholder(HandlerId(0))));
    }

    #[test]
    fn test_calls_inside_accessor_are_substituted() {
        // n()$k and obj$m(sum(x))
        let e = Expr::binary(
            "+",
            Expr::binary("$", Expr::call("n", vec![]), Expr::sym("k")),
            Expr::binary(
                "$",
                Expr::sym("obj"),
                Expr::call("m", vec![Expr::call("sum", vec![Expr::sym("x")])]),
            ),
        );
        let out = rewrite_default(&e).unwrap();
        assert_eq!(out.handlers.exprs().collect::<Vec<_>>(), ["n()", "sum(x)"]);
        assert_eq!(
            out.expr,
            Expr::binary(
                "+",
                Expr::binary("$", Expr::Placeholder(HandlerId(0)), Expr::sym("k")),
                Expr::binary(
                    "$",
                    Expr::sym("obj"),
                    Expr::call("m", vec![Expr::Placeholder(HandlerId(1))]),
                ),
            )
        );
        assert!(out.proxies.is_empty());
    }

    #[test]
    fn test_step_bound() {
        let e = Expr::binary("+", Expr::call("n", vec![]), Expr::call("row_number", vec![]));
        let config = EvaluationConfig::default().with_max_rewrite_steps(1);
        let err = rewrite(&e, &Environment::new(), &config).unwrap_err();
        assert!(matches!(err, TesseraError::InternalError(_)));
    }
}
