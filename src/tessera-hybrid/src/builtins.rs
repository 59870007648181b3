//! Built-in result handlers.
//!
//! Each factory matches only when its column operands are bare symbols
//! naming declared columns; anything else is left to the generic evaluator.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, Float64Array, Int64Array, UInt32Array};
use arrow::compute::{self, cast, take};
use arrow::datatypes::{DataType, Float64Type, Int64Type};

use common_error::{TesseraError, TesseraResult};
use tessera_core::{ColumnSubsets, Slice, Symbol, Value};
use tessera_expr::{Call, Expr};

use crate::handler::{HandlerRegistry, MatchContext, ResultHandler};

type Matched = TesseraResult<Option<Box<dyn ResultHandler>>>;

/// Install every built-in factory into `registry`.
pub(crate) fn register_all(registry: &mut HandlerRegistry) {
    registry.register("n", match_count);
    registry.register("row_number", match_row_number);
    registry.register("sum", match_sum);
    registry.register("mean", match_mean);
    registry.register("min", match_min);
    registry.register("max", match_max);
    registry.register("first", match_first);
    registry.register("last", match_last);
    registry.register("nth", match_nth);
    registry.register("cumsum", match_cumsum);
    registry.register("lag", match_lag);
    registry.register("lead", match_lead);
    registry.register("min_rank", match_min_rank);
}

fn boxed(handler: impl ResultHandler + 'static) -> Matched {
    Ok(Some(Box::new(handler)))
}

/// The column operand of a one-argument call.
fn sole_column(call: &Call, ctx: &MatchContext<'_>) -> Option<Symbol> {
    match call.args.as_slice() {
        [arg] => ctx.column(arg),
        _ => None,
    }
}

fn is_numeric(dt: &DataType) -> bool {
    dt.is_integer() || dt.is_floating() || dt == &DataType::Boolean
}

/// A declared column whose type satisfies `accept`.
fn typed_column(
    call: &Call,
    ctx: &MatchContext<'_>,
    accept: fn(&DataType) -> bool,
) -> Option<Symbol> {
    sole_column(call, ctx).filter(|c| ctx.column_type(c).is_some_and(|dt| accept(&dt)))
}

/// An integer literal operand.
fn int_literal(expr: &Expr) -> Option<i64> {
    match expr {
        Expr::Literal(Value::Int64(k)) => Some(*k),
        #[allow(clippy::float_cmp)]
        Expr::Literal(Value::Float64(x)) if x.fract() == 0.0 && x.is_finite() => Some(*x as i64),
        _ => None,
    }
}

fn arrow_err(e: arrow::error::ArrowError) -> TesseraError {
    TesseraError::execution(e.to_string())
}

/// The view of `column` for `slice`, as an array.
fn view(provider: &Arc<dyn ColumnSubsets>, column: &Symbol, slice: &Slice) -> TesseraResult<ArrayRef> {
    provider.get(column, slice)?.to_array()
}

/// Widen a numeric array to `Int64` or `Float64`.
fn numeric(arr: &ArrayRef) -> TesseraResult<ArrayRef> {
    match arr.data_type() {
        DataType::Int64 | DataType::Float64 => Ok(Arc::clone(arr)),
        dt if dt.is_floating() => cast(arr.as_ref(), &DataType::Float64).map_err(arrow_err),
        dt if dt.is_integer() || dt == &DataType::Boolean || dt == &DataType::Null => {
            cast(arr.as_ref(), &DataType::Int64).map_err(arrow_err)
        }
        other => Err(TesseraError::type_error(format!(
            "expected a numeric column, got {other}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// n(), row_number()
// ---------------------------------------------------------------------------

/// `n()`: the number of rows in the group.
#[derive(Debug)]
struct Count;

impl ResultHandler for Count {
    fn process(&self, slice: &Slice) -> TesseraResult<Value> {
        i64::try_from(slice.len())
            .map(Value::Int64)
            .map_err(|_| TesseraError::value_error("group too large"))
    }
}

fn match_count(call: &Call, _ctx: &MatchContext<'_>) -> Matched {
    if call.arity() == 0 {
        boxed(Count)
    } else {
        Ok(None)
    }
}

/// `row_number()`: positions `1..=n` within the group.
#[derive(Debug)]
struct RowNumber;

impl ResultHandler for RowNumber {
    fn process(&self, slice: &Slice) -> TesseraResult<Value> {
        let n = i64::try_from(slice.len())
            .map_err(|_| TesseraError::value_error("group too large"))?;
        Ok(Value::Array(Arc::new(Int64Array::from_iter_values(1..=n))))
    }
}

fn match_row_number(call: &Call, _ctx: &MatchContext<'_>) -> Matched {
    if call.arity() == 0 {
        boxed(RowNumber)
    } else {
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SummaryKind {
    Sum,
    Mean,
    Min,
    Max,
}

/// A summary of a numeric column over the group.
///
/// Missing values make the result missing. The sum of nothing is 0, the
/// mean of nothing is NaN and the extremes of nothing are missing.
#[derive(Debug)]
struct Summary {
    kind: SummaryKind,
    provider: Arc<dyn ColumnSubsets>,
    column: Symbol,
}

impl Summary {
    fn sum(x: &ArrayRef) -> TesseraResult<Value> {
        let value = match x.data_type() {
            DataType::Int64 => {
                let total = compute::sum_checked(x.as_primitive::<Int64Type>()).map_err(arrow_err)?;
                Value::Int64(total.unwrap_or(0))
            }
            _ => Value::Float64(compute::sum(x.as_primitive::<Float64Type>()).unwrap_or(0.0)),
        };
        Ok(value)
    }

    #[allow(clippy::cast_precision_loss)]
    fn mean(x: &ArrayRef) -> TesseraResult<Value> {
        if x.is_empty() {
            return Ok(Value::Float64(f64::NAN));
        }
        let x = cast(x.as_ref(), &DataType::Float64).map_err(arrow_err)?;
        let total = compute::sum(x.as_primitive::<Float64Type>()).unwrap_or(0.0);
        Ok(Value::Float64(total / x.len() as f64))
    }

    fn extreme(x: &ArrayRef, want_max: bool) -> Value {
        match x.data_type() {
            DataType::Int64 => {
                let arr = x.as_primitive::<Int64Type>();
                let m = if want_max { compute::max(arr) } else { compute::min(arr) };
                m.map_or(Value::Null, Value::Int64)
            }
            _ => {
                let arr = x.as_primitive::<Float64Type>();
                let m = if want_max { compute::max(arr) } else { compute::min(arr) };
                m.map_or(Value::Null, Value::Float64)
            }
        }
    }
}

impl ResultHandler for Summary {
    fn process(&self, slice: &Slice) -> TesseraResult<Value> {
        let x = numeric(&view(&self.provider, &self.column, slice)?)?;
        if x.null_count() > 0 {
            return Ok(Value::Null);
        }
        match self.kind {
            SummaryKind::Sum => Self::sum(&x),
            SummaryKind::Mean => Self::mean(&x),
            SummaryKind::Min => Ok(Self::extreme(&x, false)),
            SummaryKind::Max => Ok(Self::extreme(&x, true)),
        }
    }
}

fn match_summary(kind: SummaryKind, call: &Call, ctx: &MatchContext<'_>) -> Matched {
    match typed_column(call, ctx, is_numeric) {
        Some(column) => boxed(Summary {
            kind,
            provider: Arc::clone(ctx.provider()),
            column,
        }),
        None => Ok(None),
    }
}

fn match_sum(call: &Call, ctx: &MatchContext<'_>) -> Matched {
    match_summary(SummaryKind::Sum, call, ctx)
}

fn match_mean(call: &Call, ctx: &MatchContext<'_>) -> Matched {
    match_summary(SummaryKind::Mean, call, ctx)
}

fn match_min(call: &Call, ctx: &MatchContext<'_>) -> Matched {
    match_summary(SummaryKind::Min, call, ctx)
}

fn match_max(call: &Call, ctx: &MatchContext<'_>) -> Matched {
    match_summary(SummaryKind::Max, call, ctx)
}

// ---------------------------------------------------------------------------
// first(), last(), nth()
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    First,
    Last,
    /// 1-based; negative positions count back from the end.
    Nth(i64),
}

impl Position {
    /// Offset within a group of `len` rows, or `None` when out of range.
    fn resolve(self, len: usize) -> Option<usize> {
        let len = i64::try_from(len).ok()?;
        let i = match self {
            Self::First => 0,
            Self::Last => len - 1,
            Self::Nth(k) if k > 0 => k - 1,
            Self::Nth(k) if k < 0 => len + k,
            Self::Nth(_) => return None,
        };
        (0..len).contains(&i).then(|| usize::try_from(i).ok()).flatten()
    }
}

/// One element of a column, picked by position within the group.
#[derive(Debug)]
struct Nth {
    position: Position,
    provider: Arc<dyn ColumnSubsets>,
    column: Symbol,
}

impl ResultHandler for Nth {
    fn process(&self, slice: &Slice) -> TesseraResult<Value> {
        let column = self
            .provider
            .column(&self.column)
            .ok_or_else(|| TesseraError::unresolved(self.column.as_str()))?;
        slice.check_bounds(column.len())?;
        match self.position.resolve(slice.len()).and_then(|i| slice.get(i)) {
            Some(row) => Value::from_array_element(column.as_ref(), row),
            None => Ok(Value::Null),
        }
    }
}

fn match_position(position: Position, call: &Call, ctx: &MatchContext<'_>) -> Matched {
    match sole_column(call, ctx) {
        Some(column) => boxed(Nth {
            position,
            provider: Arc::clone(ctx.provider()),
            column,
        }),
        None => Ok(None),
    }
}

fn match_first(call: &Call, ctx: &MatchContext<'_>) -> Matched {
    match_position(Position::First, call, ctx)
}

fn match_last(call: &Call, ctx: &MatchContext<'_>) -> Matched {
    match_position(Position::Last, call, ctx)
}

fn match_nth(call: &Call, ctx: &MatchContext<'_>) -> Matched {
    let [col, k] = call.args.as_slice() else {
        return Ok(None);
    };
    match (ctx.column(col), int_literal(k)) {
        (Some(column), Some(k)) => boxed(Nth {
            position: Position::Nth(k),
            provider: Arc::clone(ctx.provider()),
            column,
        }),
        _ => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Window functions
// ---------------------------------------------------------------------------

/// Running total within the group. A missing value makes the rest missing.
#[derive(Debug)]
struct CumSum {
    provider: Arc<dyn ColumnSubsets>,
    column: Symbol,
}

impl ResultHandler for CumSum {
    fn process(&self, slice: &Slice) -> TesseraResult<Value> {
        let x = numeric(&view(&self.provider, &self.column, slice)?)?;
        let out: ArrayRef = match x.data_type() {
            DataType::Int64 => {
                let mut acc = Some(0i64);
                let values = x
                    .as_primitive::<Int64Type>()
                    .iter()
                    .map(|v| -> TesseraResult<Option<i64>> {
                        acc = match (acc, v) {
                            (Some(a), Some(v)) => Some(a.checked_add(v).ok_or_else(|| {
                                TesseraError::value_error("integer overflow in cumsum")
                            })?),
                            _ => None,
                        };
                        Ok(acc)
                    })
                    .collect::<TesseraResult<Int64Array>>()?;
                Arc::new(values)
            }
            _ => {
                let mut acc = Some(0.0f64);
                let values: Float64Array = x
                    .as_primitive::<Float64Type>()
                    .iter()
                    .map(|v| {
                        acc = acc.zip(v).map(|(a, v)| a + v);
                        acc
                    })
                    .collect();
                Arc::new(values)
            }
        };
        Ok(Value::Array(out))
    }
}

fn match_cumsum(call: &Call, ctx: &MatchContext<'_>) -> Matched {
    match typed_column(call, ctx, is_numeric) {
        Some(column) => boxed(CumSum {
            provider: Arc::clone(ctx.provider()),
            column,
        }),
        None => Ok(None),
    }
}

/// `lag(x, k)` / `lead(x, k)`: the column shifted by `k` rows within the group.
#[derive(Debug)]
struct Shift {
    offset: usize,
    forward: bool,
    provider: Arc<dyn ColumnSubsets>,
    column: Symbol,
}

impl ResultHandler for Shift {
    fn process(&self, slice: &Slice) -> TesseraResult<Value> {
        let x = view(&self.provider, &self.column, slice)?;
        let n = x.len();
        let indices: UInt32Array = (0..n)
            .map(|i| {
                let source = if self.forward {
                    i.checked_add(self.offset).filter(|&j| j < n)
                } else {
                    i.checked_sub(self.offset)
                };
                source.and_then(|j| u32::try_from(j).ok())
            })
            .collect();
        let out = take(x.as_ref(), &indices, None).map_err(arrow_err)?;
        Ok(Value::Array(out))
    }
}

fn match_shift(forward: bool, call: &Call, ctx: &MatchContext<'_>) -> Matched {
    let (col, offset) = match call.args.as_slice() {
        [col] => (col, Some(1)),
        [col, k] => (col, int_literal(k)),
        _ => return Ok(None),
    };
    let offset = offset.and_then(|k| usize::try_from(k).ok());
    match (ctx.column(col), offset) {
        (Some(column), Some(offset)) => boxed(Shift {
            offset,
            forward,
            provider: Arc::clone(ctx.provider()),
            column,
        }),
        _ => Ok(None),
    }
}

fn match_lag(call: &Call, ctx: &MatchContext<'_>) -> Matched {
    match_shift(false, call, ctx)
}

fn match_lead(call: &Call, ctx: &MatchContext<'_>) -> Matched {
    match_shift(true, call, ctx)
}

/// `min_rank(x)`: 1 + the number of smaller values; ties share the lowest rank.
/// Missing and NaN values get a missing rank.
#[derive(Debug)]
struct MinRank {
    provider: Arc<dyn ColumnSubsets>,
    column: Symbol,
}

fn min_rank<T: PartialOrd>(values: &[Option<T>]) -> Vec<Option<i64>> {
    // Values unordered against themselves (NaN) are treated as missing.
    let mut order: Vec<usize> = (0..values.len())
        .filter(|&i| values[i].as_ref().is_some_and(|v| v.partial_cmp(v).is_some()))
        .collect();
    order.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut ranks = vec![None; values.len()];
    let mut rank = 0i64;
    for (pos, &i) in order.iter().enumerate() {
        let tied = pos > 0 && values[order[pos - 1]] == values[i];
        if !tied {
            rank = i64::try_from(pos).unwrap_or(i64::MAX) + 1;
        }
        ranks[i] = Some(rank);
    }
    ranks
}

impl ResultHandler for MinRank {
    fn process(&self, slice: &Slice) -> TesseraResult<Value> {
        let x = view(&self.provider, &self.column, slice)?;
        let ranks = match x.data_type() {
            DataType::Utf8 => min_rank(&x.as_string::<i32>().iter().collect::<Vec<_>>()),
            DataType::LargeUtf8 => min_rank(&x.as_string::<i64>().iter().collect::<Vec<_>>()),
            _ => {
                let x = numeric(&x)?;
                match x.data_type() {
                    DataType::Int64 => {
                        min_rank(&x.as_primitive::<Int64Type>().iter().collect::<Vec<_>>())
                    }
                    _ => min_rank(&x.as_primitive::<Float64Type>().iter().collect::<Vec<_>>()),
                }
            }
        };
        Ok(Value::Array(Arc::new(Int64Array::from(ranks))))
    }
}

fn match_min_rank(call: &Call, ctx: &MatchContext<'_>) -> Matched {
    let rankable = |dt: &DataType| is_numeric(dt) || matches!(dt, DataType::Utf8 | DataType::LargeUtf8);
    match typed_column(call, ctx, rankable) {
        Some(column) => boxed(MinRank {
            provider: Arc::clone(ctx.provider()),
            column,
        }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use arrow::array::StringArray;
    use tessera_core::TableSubsets;
    use tessera_expr::Environment;

    use super::*;

    fn provider() -> Arc<dyn ColumnSubsets> {
        Arc::new(
            TableSubsets::from_columns([
                (
                    "v",
                    Arc::new(Int64Array::from(vec![Some(3), Some(1), None, Some(4), Some(1), Some(5)]))
                        as ArrayRef,
                ),
                (
                    "f",
                    Arc::new(Float64Array::from(vec![0.5, 1.5, 2.0, 2.0, 1.0, 3.0])) as ArrayRef,
                ),
                (
                    "s",
                    Arc::new(StringArray::from(vec!["b", "a", "c", "a", "d", "b"])) as ArrayRef,
                ),
            ])
            .unwrap(),
        )
    }

    fn bind(expr: &Expr) -> Option<Box<dyn ResultHandler>> {
        let provider = provider();
        let env = Environment::new();
        let ctx = MatchContext::new(&provider, &env);
        HandlerRegistry::with_builtins()
            .lookup(expr.as_call().unwrap(), &ctx)
            .unwrap()
    }

    fn run(expr: &Expr, slice: &Slice) -> Value {
        bind(expr).expect("handler matches").process(slice).unwrap()
    }

    #[test]
    fn test_count_and_row_number() {
        let slice = Slice::indices([5, 0, 2]);
        assert_eq!(run(&Expr::call("n", vec![]), &slice), Value::Int64(3));
        assert_eq!(
            run(&Expr::call("row_number", vec![]), &slice),
            Value::from(vec![1i64, 2, 3])
        );
        assert!(bind(&Expr::call("n", vec![Expr::sym("v")])).is_none());
    }

    #[test]
    fn test_summaries() {
        let f = Expr::sym("f");
        let slice = Slice::range(0, 4);
        assert_eq!(run(&Expr::call("sum", vec![f.clone()]), &slice), Value::Float64(6.0));
        assert_eq!(run(&Expr::call("mean", vec![f.clone()]), &slice), Value::Float64(1.5));
        assert_eq!(run(&Expr::call("min", vec![f.clone()]), &slice), Value::Float64(0.5));
        assert_eq!(run(&Expr::call("max", vec![f]), &slice), Value::Float64(2.0));

        let v = Expr::sym("v");
        assert_eq!(run(&Expr::call("sum", vec![v.clone()]), &Slice::range(0, 2)), Value::Int64(4));
        assert_eq!(run(&Expr::call("sum", vec![v.clone()]), &Slice::range(0, 3)), Value::Null);
        assert_eq!(run(&Expr::call("sum", vec![v.clone()]), &Slice::range(0, 0)), Value::Int64(0));
        assert_eq!(run(&Expr::call("max", vec![v]), &Slice::range(0, 0)), Value::Null);
    }

    #[test]
    fn test_summaries_only_match_numeric_columns() {
        assert!(bind(&Expr::call("sum", vec![Expr::sym("s")])).is_none());
        assert!(bind(&Expr::call("sum", vec![Expr::sym("nope")])).is_none());
        assert!(bind(&Expr::call("mean", vec![Expr::lit(1i64)])).is_none());
        let nested = Expr::call("sum", vec![Expr::binary("+", Expr::sym("f"), Expr::lit(1i64))]);
        assert!(bind(&nested).is_none());
    }

    #[test]
    fn test_positions() {
        let s = Expr::sym("s");
        let slice = Slice::indices([3, 4, 5]);
        assert_eq!(run(&Expr::call("first", vec![s.clone()]), &slice), Value::from("a"));
        assert_eq!(run(&Expr::call("last", vec![s.clone()]), &slice), Value::from("b"));
        let nth = |k: i64| Expr::call("nth", vec![s.clone(), Expr::lit(k)]);
        assert_eq!(run(&nth(2), &slice), Value::from("d"));
        assert_eq!(run(&nth(-1), &slice), Value::from("b"));
        assert_eq!(run(&nth(4), &slice), Value::Null);
        assert_eq!(run(&nth(0), &slice), Value::Null);
        assert_eq!(run(&Expr::call("first", vec![s]), &Slice::range(0, 0)), Value::Null);
    }

    #[test]
    fn test_cumsum() {
        let v = Expr::call("cumsum", vec![Expr::sym("v")]);
        let expected: ArrayRef = Arc::new(Int64Array::from(vec![Some(3), Some(4), None, None]));
        assert_eq!(run(&v, &Slice::range(0, 4)), Value::Array(expected));
        let f = Expr::call("cumsum", vec![Expr::sym("f")]);
        assert_eq!(run(&f, &Slice::range(0, 3)), Value::from(vec![0.5f64, 2.0, 4.0]));
    }

    #[test]
    fn test_lag_and_lead() {
        let slice = Slice::indices([5, 3, 1]);
        let lag = Expr::call("lag", vec![Expr::sym("s")]);
        let expected: ArrayRef = Arc::new(StringArray::from(vec![None, Some("b"), Some("a")]));
        assert_eq!(run(&lag, &slice), Value::Array(expected));

        let lead = Expr::call("lead", vec![Expr::sym("s"), Expr::lit(2i64)]);
        let expected: ArrayRef = Arc::new(StringArray::from(vec![Some("a"), None, None]));
        assert_eq!(run(&lead, &slice), Value::Array(expected));

        let negative = Expr::call("lag", vec![Expr::sym("s"), Expr::lit(-1i64)]);
        assert!(bind(&negative).is_none());
    }

    #[test]
    fn test_min_rank() {
        let rank = Expr::call("min_rank", vec![Expr::sym("s")]);
        assert_eq!(
            run(&rank, &Slice::whole(6)),
            Value::from(vec![3i64, 1, 5, 1, 6, 3])
        );
        let rank = Expr::call("min_rank", vec![Expr::sym("v")]);
        let expected: ArrayRef =
            Arc::new(Int64Array::from(vec![Some(3), Some(1), None, Some(4), Some(1), Some(5)]));
        assert_eq!(run(&rank, &Slice::whole(6)), Value::Array(expected));
    }

    #[test]
    fn test_min_rank_helper_ties() {
        let ranks = min_rank(&[Some(2.0), Some(1.0), Some(2.0), None]);
        assert_eq!(ranks, vec![Some(2), Some(1), Some(2), None]);
    }

    #[test]
    fn test_min_rank_nan_is_missing() {
        let values: Vec<Option<f64>> = (0..64)
            .map(|i| match i {
                i if i % 3 == 0 => Some(f64::NAN),
                i if i % 5 == 0 => None,
                i => Some(f64::from(i % 7)),
            })
            .collect();
        let ranks = min_rank(&values);
        for (i, rank) in ranks.iter().enumerate() {
            let expected = values[i].filter(|v| !v.is_nan()).map(|v| {
                let smaller = values
                    .iter()
                    .flatten()
                    .filter(|w| !w.is_nan() && **w < v)
                    .count();
                smaller as i64 + 1
            });
            assert_eq!(*rank, expected, "row {i}");
        }

        let provider: Arc<dyn ColumnSubsets> = Arc::new(
            TableSubsets::from_columns([(
                "f",
                Arc::new(Float64Array::from(vec![2.0, f64::NAN, 1.0, 2.0])) as ArrayRef,
            )])
            .unwrap(),
        );
        let env = Environment::new();
        let ctx = MatchContext::new(&provider, &env);
        let rank = Expr::call("min_rank", vec![Expr::sym("f")]);
        let handler = HandlerRegistry::with_builtins()
            .lookup(rank.as_call().unwrap(), &ctx)
            .unwrap()
            .expect("handler matches");
        let expected: ArrayRef = Arc::new(Int64Array::from(vec![Some(2), None, Some(1), Some(2)]));
        assert_eq!(handler.process(&Slice::whole(4)).unwrap(), Value::Array(expected));
    }
}
