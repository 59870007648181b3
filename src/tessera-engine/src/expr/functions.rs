//! Built-in functions of the reference evaluator.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, Int64Array};
use arrow::compute::{self, is_null};
use arrow::datatypes::{DataType, Float64Type, Int64Type};

use common_error::{TesseraError, TesseraResult};
use tessera_core::{Value, combine_all};

use super::kernels::{exec_err, finish, float_array, numeric_array};

/// Signature of a built-in function.
pub type BuiltinFn = fn(&[Value]) -> TesseraResult<Value>;

/// Look up a built-in function by name.
pub(crate) fn builtin(name: &str) -> Option<BuiltinFn> {
    let f: BuiltinFn = match name {
        "c" => combine,
        "length" => length,
        "sum" => sum,
        "mean" => mean,
        "min" => min,
        "max" => max,
        "abs" => abs,
        "sqrt" => sqrt,
        "is_na" | "is.na" => is_na,
        _ => return None,
    };
    Some(f)
}

fn single<'a>(name: &str, args: &'a [Value]) -> TesseraResult<&'a Value> {
    match args {
        [x] => Ok(x),
        _ => Err(TesseraError::execution(format!(
            "`{name}()` takes 1 argument, got {}",
            args.len()
        ))),
    }
}

fn combine(args: &[Value]) -> TesseraResult<Value> {
    if args.is_empty() {
        return Ok(Value::Null);
    }
    Ok(Value::Array(combine_all(args)?))
}

fn length(args: &[Value]) -> TesseraResult<Value> {
    let n = match single("length", args)? {
        Value::Map(members) => members.len(),
        other => other.len(),
    };
    Ok(Value::Int64(n as i64))
}

fn sum(args: &[Value]) -> TesseraResult<Value> {
    let x = numeric_array(single("sum", args)?, "sum")?;
    if x.null_count() > 0 {
        return Ok(Value::Null);
    }
    let value = match x.data_type() {
        DataType::Int64 => {
            let total = compute::sum_checked(x.as_primitive::<Int64Type>()).map_err(exec_err)?;
            Value::Int64(total.unwrap_or(0))
        }
        _ => Value::Float64(compute::sum(x.as_primitive::<Float64Type>()).unwrap_or(0.0)),
    };
    Ok(value)
}

fn mean(args: &[Value]) -> TesseraResult<Value> {
    let x = float_array(&numeric_array(single("mean", args)?, "mean")?)?;
    if x.null_count() > 0 {
        return Ok(Value::Null);
    }
    if x.is_empty() {
        return Ok(Value::Float64(f64::NAN));
    }
    let total = compute::sum(x.as_primitive::<Float64Type>()).unwrap_or(0.0);
    Ok(Value::Float64(total / x.len() as f64))
}

fn extreme(name: &str, args: &[Value], want_max: bool) -> TesseraResult<Value> {
    let x = numeric_array(single(name, args)?, name)?;
    if x.null_count() > 0 || x.is_empty() {
        return Ok(Value::Null);
    }
    let value = match x.data_type() {
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
    };
    Ok(value)
}

fn min(args: &[Value]) -> TesseraResult<Value> {
    extreme("min", args, false)
}

fn max(args: &[Value]) -> TesseraResult<Value> {
    extreme("max", args, true)
}

fn abs(args: &[Value]) -> TesseraResult<Value> {
    let v = single("abs", args)?;
    let x = numeric_array(v, "abs")?;
    let out: ArrayRef = match x.data_type() {
        DataType::Int64 => {
            let arr: Int64Array = x.as_primitive::<Int64Type>().unary(i64::wrapping_abs);
            Arc::new(arr)
        }
        _ => Arc::new(x.as_primitive::<Float64Type>().unary::<_, Float64Type>(f64::abs)),
    };
    finish(out, &[v])
}

fn sqrt(args: &[Value]) -> TesseraResult<Value> {
    let v = single("sqrt", args)?;
    let x = float_array(&numeric_array(v, "sqrt")?)?;
    let out = x.as_primitive::<Float64Type>().unary::<_, Float64Type>(f64::sqrt);
    finish(Arc::new(out), &[v])
}

fn is_na(args: &[Value]) -> TesseraResult<Value> {
    let v = single("is_na", args)?;
    let x = v.to_array()?;
    let out = is_null(x.as_ref()).map_err(exec_err)?;
    finish(Arc::new(out), &[v])
}
