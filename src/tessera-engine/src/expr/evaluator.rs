//! Expression evaluator implementation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::trace;

use common_error::{TesseraError, TesseraResult};
use tessera_core::Value;
use tessera_expr::{ASSIGNMENT_OPERATORS, Call, Evaluator, Expr, Scope};

use super::functions::builtin;
use super::kernels;

/// A function registered with an [`ExprEvaluator`].
pub type Function = Arc<dyn Fn(&[Value]) -> TesseraResult<Value> + Send + Sync>;

/// Reference generic evaluator.
///
/// Evaluates any expression tree against a [`Scope`], computing vectorized
/// operators and built-in functions with Arrow kernels. Registered functions
/// take precedence over operators and built-ins of the same name.
#[derive(Clone, Default)]
pub struct ExprEvaluator {
    functions: HashMap<String, Function>,
}

impl fmt::Debug for ExprEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("ExprEvaluator")
            .field("functions", &names)
            .finish()
    }
}

impl ExprEvaluator {
    /// Create a new expression evaluator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&[Value]) -> TesseraResult<Value> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(f));
    }

    /// Builder form of [`ExprEvaluator::register`].
    #[must_use]
    pub fn with_function<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[Value]) -> TesseraResult<Value> + Send + Sync + 'static,
    {
        self.register(name, f);
        self
    }

    /// The function name a call dispatches on: a bare symbol, or `pkg::name`.
    fn function_name<'a>(&self, call: &'a Call) -> TesseraResult<&'a str> {
        match call.head.as_ref() {
            Expr::Symbol(s) => Ok(s.as_str()),
            Expr::Call(head) if matches!(head.name(), Some("::" | ":::")) && head.arity() == 2 => head
                .arg(1)
                .and_then(Expr::as_symbol)
                .map(|s| s.as_str())
                .ok_or_else(|| {
                    TesseraError::execution(format!("bad namespace-qualified call `{call}`"))
                }),
            head => Err(TesseraError::not_implemented(format!(
                "calling `{head}`: only named functions can be called"
            ))),
        }
    }

    fn eval_call(&self, call: &Call, scope: &dyn Scope) -> TesseraResult<Value> {
        let name = self.function_name(call)?;
        let qualified = !call.head.is_symbol();

        if !qualified {
            match (name, call.args.as_slice()) {
                ("(" | "local", [inner]) => return self.evaluate(inner, scope),
                ("$" | "@", [base, member]) => return self.eval_member(name, base, member, scope),
                ("::" | ":::", [_, _]) => {
                    return Err(TesseraError::not_implemented(format!(
                        "`{call}` used as a value"
                    )));
                }
                ("~" | "function", _) => {
                    return Err(TesseraError::not_implemented(format!("evaluating `{call}`")));
                }
                ("global" | "column", _) => {
                    return Err(TesseraError::execution(format!(
                        "`{name}()` is only valid in an expression prepared for grouped evaluation"
                    )));
                }
                (op, _) if ASSIGNMENT_OPERATORS.contains(&op) => {
                    return Err(TesseraError::forbidden(op, call.to_string()));
                }
                _ => {}
            }
        }

        let args = call
            .args
            .iter()
            .map(|arg| self.evaluate(arg, scope))
            .collect::<TesseraResult<Vec<_>>>()?;
        self.apply(name, &args, qualified)
    }

    fn apply(&self, name: &str, args: &[Value], qualified: bool) -> TesseraResult<Value> {
        if let Some(f) = self.functions.get(name) {
            trace!("calling registered function {name} with {} arguments", args.len());
            return f(args);
        }
        if !qualified {
            match (name, args) {
                ("+" | "-" | "*" | "/" | "%%" | "^", [l, r]) => {
                    return kernels::arithmetic(name, l, r);
                }
                ("-", [x]) => return kernels::negate(x),
                ("+", [x]) => return Ok(x.clone()),
                ("==" | "!=" | "<" | "<=" | ">" | ">=", [l, r]) => {
                    return kernels::compare(name, l, r);
                }
                ("&" | "|" | "&&" | "||", [l, r]) => return kernels::logical(name, l, r),
                ("!", [x]) => return kernels::not(x),
                _ => {}
            }
        }
        match builtin(name) {
            Some(f) => f(args),
            None => Err(TesseraError::execution(format!(
                "could not find function \"{name}\""
            ))),
        }
    }

    fn eval_member(
        &self,
        op: &str,
        base: &Expr,
        member: &Expr,
        scope: &dyn Scope,
    ) -> TesseraResult<Value> {
        let name = match member {
            Expr::Symbol(s) => s.as_str(),
            Expr::Literal(Value::String(s)) => s.as_str(),
            other => {
                return Err(TesseraError::type_error(format!(
                    "invalid member `{other}` for `{op}`"
                )));
            }
        };
        match self.evaluate(base, scope)? {
            Value::Map(members) => Ok(members.get(name).cloned().unwrap_or(Value::Null)),
            other => Err(TesseraError::type_error(format!(
                "`{op}` operator is invalid for {} values",
                other.type_name()
            ))),
        }
    }
}

impl Evaluator for ExprEvaluator {
    fn evaluate(&self, expr: &Expr, scope: &dyn Scope) -> TesseraResult<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Symbol(name) => scope
                .resolve(name)?
                .ok_or_else(|| TesseraError::unresolved(name.as_str())),
            Expr::Placeholder(id) => scope.placeholder(*id),
            Expr::Call(call) => self.eval_call(call, scope),
        }
    }
}
