//! Expression trees.
//!
//! An [`Expr`] is a literal, a symbol, a call, or a placeholder standing in
//! for a result handler. Trees own their children, so `clone()` is a deep
//! copy and mutating a working copy is never visible through the original.

use std::fmt;

use common_display::{DisplayTree, TreeNode};
use tessera_core::{Symbol, Value};

/// Index of a result handler in the table owned by a prepared evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub usize);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<handler {}>", self.0)
    }
}

/// A node of an expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A constant.
    Literal(Value),
    /// A name, resolved at evaluation time.
    Symbol(Symbol),
    /// An operator or function applied to operands.
    Call(Call),
    /// A sub-expression replaced by a result handler during rewriting.
    Placeholder(HandlerId),
}

/// A call node: a head applied to ordered operands.
///
/// The head is usually a symbol naming the operator, but may be any
/// expression, e.g. `obj$method` in `obj$method(x)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// The called expression.
    pub head: Box<Expr>,
    /// Operands in call order.
    pub args: Vec<Expr>,
}

impl Call {
    /// The operator symbol, when the head is a bare symbol.
    pub fn operator(&self) -> Option<&Symbol> {
        match self.head.as_ref() {
            Expr::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// The operator name, when the head is a bare symbol.
    pub fn name(&self) -> Option<&str> {
        self.operator().map(Symbol::as_str)
    }

    /// Whether the head is the symbol `name`.
    pub fn is(&self, name: &str) -> bool {
        self.name() == Some(name)
    }

    /// Number of operands.
    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// The `i`-th operand.
    pub fn arg(&self, i: usize) -> Option<&Expr> {
        self.args.get(i)
    }

    /// Replace the `i`-th operand, returning the old one.
    pub fn replace_arg(&mut self, i: usize, expr: Expr) -> Option<Expr> {
        self.args.get_mut(i).map(|slot| std::mem::replace(slot, expr))
    }

    /// Child `k` in path order: `0` is the head, `i + 1` the `i`-th operand.
    pub fn child(&self, k: usize) -> Option<&Expr> {
        match k {
            0 => Some(&self.head),
            k => self.args.get(k - 1),
        }
    }

    /// Mutable child `k` in path order.
    pub fn child_mut(&mut self, k: usize) -> Option<&mut Expr> {
        match k {
            0 => Some(&mut self.head),
            k => self.args.get_mut(k - 1),
        }
    }
}

impl Expr {
    /// A symbol expression.
    pub fn sym(name: &str) -> Self {
        Self::Symbol(Symbol::new(name))
    }

    /// A literal expression.
    pub fn lit(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// A call to the operator or function `name`.
    pub fn call(name: &str, args: Vec<Self>) -> Self {
        Self::call_with(Self::sym(name), args)
    }

    /// A call with an arbitrary head.
    pub fn call_with(head: Self, args: Vec<Self>) -> Self {
        Self::Call(Call {
            head: Box::new(head),
            args,
        })
    }

    /// A binary operator call.
    pub fn binary(op: &str, lhs: Self, rhs: Self) -> Self {
        Self::call(op, vec![lhs, rhs])
    }

    /// A unary operator call.
    pub fn unary(op: &str, operand: Self) -> Self {
        Self::call(op, vec![operand])
    }

    /// Check if this is a call.
    pub fn is_call(&self) -> bool {
        matches!(self, Self::Call(_))
    }

    /// Check if this is a bare symbol.
    pub fn is_symbol(&self) -> bool {
        matches!(self, Self::Symbol(_))
    }

    /// Check if this is a handler placeholder.
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder(_))
    }

    /// The symbol, if this is one.
    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Self::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// The call, if this is one.
    pub fn as_call(&self) -> Option<&Call> {
        match self {
            Self::Call(c) => Some(c),
            _ => None,
        }
    }

    /// The call, mutably, if this is one.
    pub fn as_call_mut(&mut self) -> Option<&mut Call> {
        match self {
            Self::Call(c) => Some(c),
            _ => None,
        }
    }

    /// The node at `path`, where each step is a [`Call::child`] index.
    pub fn get(&self, path: &[usize]) -> Option<&Self> {
        path.iter()
            .try_fold(self, |node, &k| node.as_call().and_then(|c| c.child(k)))
    }

    /// The node at `path`, mutably.
    pub fn get_mut(&mut self, path: &[usize]) -> Option<&mut Self> {
        let mut node = self;
        for &k in path {
            node = node.as_call_mut()?.child_mut(k)?;
        }
        Some(node)
    }

    /// Replace this node wholesale, returning the old subtree.
    pub fn replace(&mut self, expr: Self) -> Self {
        std::mem::replace(self, expr)
    }

    /// Visit every node in pre-order, heads before operands.
    pub fn walk<'a, F: FnMut(&'a Self)>(&'a self, f: &mut F) {
        f(self);
        if let Self::Call(c) = self {
            c.head.walk(f);
            for arg in &c.args {
                arg.walk(f);
            }
        }
    }

    /// Placeholders in pre-order.
    pub fn placeholders(&self) -> Vec<HandlerId> {
        let mut ids = Vec::new();
        self.walk(&mut |e| {
            if let Self::Placeholder(id) = e {
                ids.push(*id);
            }
        });
        ids
    }

    /// Number of call nodes in the tree.
    pub fn count_calls(&self) -> usize {
        let mut n = 0;
        self.walk(&mut |e| n += usize::from(e.is_call()));
        n
    }

    /// Render the tree structure for diagnostics.
    pub fn explain(&self) -> String {
        DisplayTree::new(self).to_string()
    }

    fn precedence(&self) -> u8 {
        match self {
            Self::Call(c) => match (c.name(), c.args.len()) {
                (Some(op), 2) => binary_precedence(op).map_or(ATOM, |(p, _)| p),
                (Some(op), 1) => unary_precedence(op).unwrap_or(ATOM),
                _ => ATOM,
            },
            Self::Literal(Value::Int64(i)) if *i < 0 => UNARY_MINUS,
            Self::Literal(Value::Float64(x)) if x.is_sign_negative() => UNARY_MINUS,
            _ => ATOM,
        }
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

impl From<Symbol> for Expr {
    fn from(symbol: Symbol) -> Self {
        Self::Symbol(symbol)
    }
}

impl From<Call> for Expr {
    fn from(call: Call) -> Self {
        Self::Call(call)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Assoc {
    Left,
    Right,
}

const ATOM: u8 = u8::MAX;
const UNARY_MINUS: u8 = 13;
const ACCESSOR: u8 = 16;

fn binary_precedence(op: &str) -> Option<(u8, Assoc)> {
    let p = match op {
        "::" | ":::" => (17, Assoc::Left),
        "$" | "@" => (ACCESSOR, Assoc::Left),
        "^" => (14, Assoc::Right),
        ":" => (12, Assoc::Left),
        "*" | "/" => (10, Assoc::Left),
        "+" | "-" => (9, Assoc::Left),
        "==" | "!=" | "<" | "<=" | ">" | ">=" => (8, Assoc::Left),
        "&" | "&&" => (6, Assoc::Left),
        "|" | "||" => (5, Assoc::Left),
        "~" => (4, Assoc::Left),
        "->" | "->>" => (3, Assoc::Left),
        "<-" | "<<-" => (2, Assoc::Right),
        "=" => (1, Assoc::Right),
        op if op.len() > 1 && op.starts_with('%') && op.ends_with('%') => (11, Assoc::Left),
        _ => return None,
    };
    Some(p)
}

fn unary_precedence(op: &str) -> Option<u8> {
    match op {
        "-" | "+" => Some(UNARY_MINUS),
        "!" => Some(7),
        "~" => Some(4),
        _ => None,
    }
}

fn is_tight(op: &str) -> bool {
    matches!(op, "$" | "@" | "::" | ":::" | "^" | ":")
}

fn is_syntactic(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '.')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '.')
}

fn fmt_operand(f: &mut fmt::Formatter<'_>, expr: &Expr, min: u8) -> fmt::Result {
    if expr.precedence() < min {
        write!(f, "({expr})")
    } else {
        write!(f, "{expr}")
    }
}

fn fmt_name(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    if is_syntactic(name) {
        f.write_str(name)
    } else {
        write!(f, "`{name}`")
    }
}

fn fmt_literal(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::Null => f.write_str("NA"),
        Value::Bool(true) => f.write_str("TRUE"),
        Value::Bool(false) => f.write_str("FALSE"),
        Value::Int64(i) => write!(f, "{i}"),
        Value::Float64(x) => write!(f, "{x}"),
        Value::String(s) => write!(f, "{s:?}"),
        Value::Symbol(s) => {
            f.write_str("quote(")?;
            fmt_name(f, s.as_str())?;
            f.write_str(")")
        }
        Value::Array(arr) if value.len() <= 6 => {
            f.write_str("c(")?;
            for i in 0..value.len() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                match Value::from_array_element(arr.as_ref(), i) {
                    Ok(v) => fmt_literal(f, &v)?,
                    Err(_) => f.write_str("?")?,
                }
            }
            f.write_str(")")
        }
        Value::Array(_) => write!(f, "<{} of length {}>", value.type_name(), value.len()),
        Value::Map(members) => {
            f.write_str("list(")?;
            for (i, (name, v)) in members.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                fmt_name(f, name)?;
                f.write_str(" = ")?;
                fmt_literal(f, v)?;
            }
            f.write_str(")")
        }
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let (Some(op), [lhs, rhs]) = (self.name(), self.args.as_slice()) {
            if let Some((p, assoc)) = binary_precedence(op) {
                let (lmin, rmin) = match assoc {
                    Assoc::Left => (p, p + 1),
                    Assoc::Right => (p + 1, p),
                };
                fmt_operand(f, lhs, lmin)?;
                if is_tight(op) {
                    f.write_str(op)?;
                } else {
                    write!(f, " {op} ")?;
                }
                return fmt_operand(f, rhs, rmin);
            }
        }
        if let (Some(op), [operand]) = (self.name(), self.args.as_slice()) {
            if op == "(" {
                return write!(f, "({operand})");
            }
            if let Some(p) = unary_precedence(op) {
                f.write_str(op)?;
                return fmt_operand(f, operand, p);
            }
        }

        match self.head.as_ref() {
            Expr::Symbol(s) => fmt_name(f, s.as_str())?,
            head => fmt_operand(f, head, ACCESSOR)?,
        }
        f.write_str("(")?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(v) => fmt_literal(f, v),
            Self::Symbol(s) => fmt_name(f, s.as_str()),
            Self::Call(c) => fmt::Display::fmt(c, f),
            Self::Placeholder(id) => fmt::Display::fmt(id, f),
        }
    }
}

impl TreeNode for Expr {
    fn label(&self) -> String {
        match self {
            Self::Call(c) => c
                .name()
                .map_or_else(|| "call".to_string(), ToString::to_string),
            other => other.to_string(),
        }
    }

    fn children(&self) -> Vec<&dyn TreeNode> {
        match self {
            Self::Call(c) => {
                let head = (!c.head.is_symbol()).then_some(c.head.as_ref());
                head.into_iter()
                    .chain(c.args.iter())
                    .map(|e| e as &dyn TreeNode)
                    .collect()
            }
            _ => Vec::new(),
        }
    }
}
