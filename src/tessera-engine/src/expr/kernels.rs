//! Vectorized operator kernels over [`Value`]s.
//!
//! Operands are lifted to Arrow arrays, coerced, and handed to the Arrow
//! compute kernels. A length-one operand is broadcast against the other.
//! When every operand was a scalar the result is collapsed back to one.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, Datum, Float64Array, Scalar, UInt32Array};
use arrow::compute::kernels::arity::binary;
use arrow::compute::kernels::{boolean, cmp, numeric};
use arrow::compute::{cast, take};
use arrow::datatypes::{DataType, Float64Type};
use arrow::error::ArrowError;

use common_error::{TesseraError, TesseraResult};
use tessera_core::Value;

pub(crate) fn exec_err(e: ArrowError) -> TesseraError {
    TesseraError::execution(e.to_string())
}

/// Lift `value` to an `Int64` or `Float64` array.
pub(crate) fn numeric_array(value: &Value, op: &str) -> TesseraResult<ArrayRef> {
    let arr = value.to_array()?;
    let target = match arr.data_type() {
        DataType::Int64 | DataType::Float64 => return Ok(arr),
        DataType::Null | DataType::Boolean => DataType::Int64,
        dt if dt.is_integer() => DataType::Int64,
        dt if dt.is_floating() => DataType::Float64,
        other => {
            return Err(TesseraError::type_error(format!(
                "non-numeric argument to `{op}`: {other}"
            )));
        }
    };
    cast(arr.as_ref(), &target).map_err(exec_err)
}

pub(crate) fn float_array(arr: &ArrayRef) -> TesseraResult<ArrayRef> {
    cast(arr.as_ref(), &DataType::Float64).map_err(exec_err)
}

fn is_float(arr: &ArrayRef) -> bool {
    arr.data_type() == &DataType::Float64
}

fn check_lengths(op: &str, l: usize, r: usize) -> TesseraResult<()> {
    if l == r || l == 1 || r == 1 {
        Ok(())
    } else {
        Err(TesseraError::value_error(format!(
            "operands of `{op}` have incompatible lengths {l} and {r}"
        )))
    }
}

fn result_len(l: usize, r: usize) -> usize {
    if l == 1 {
        r
    } else {
        l
    }
}

fn apply<F>(op: &str, l: &ArrayRef, r: &ArrayRef, kernel: F) -> TesseraResult<ArrayRef>
where
    F: Fn(&dyn Datum, &dyn Datum) -> Result<ArrayRef, ArrowError>,
{
    check_lengths(op, l.len(), r.len())?;
    let result = match (l.len(), r.len()) {
        (1, n) if n != 1 => kernel(&Scalar::new(Arc::clone(l)), r),
        (n, 1) if n != 1 => kernel(l, &Scalar::new(Arc::clone(r))),
        _ => kernel(l, r),
    };
    result.map_err(exec_err)
}

fn broadcast(arr: &ArrayRef, n: usize) -> TesseraResult<ArrayRef> {
    if arr.len() == n {
        return Ok(Arc::clone(arr));
    }
    take(arr.as_ref(), &UInt32Array::from(vec![0u32; n]), None).map_err(exec_err)
}

/// Wrap a kernel result, collapsing it when every operand was a scalar.
pub(crate) fn finish(out: ArrayRef, operands: &[&Value]) -> TesseraResult<Value> {
    let value = Value::Array(out);
    if operands.iter().all(|v| v.is_scalar()) {
        value.into_scalar_if_unit()
    } else {
        Ok(value)
    }
}

/// `+ - * / %% ^`. Division and powers always produce floats.
pub(crate) fn arithmetic(op: &str, lhs: &Value, rhs: &Value) -> TesseraResult<Value> {
    let mut l = numeric_array(lhs, op)?;
    let mut r = numeric_array(rhs, op)?;
    if matches!(op, "/" | "^") || is_float(&l) || is_float(&r) {
        l = float_array(&l)?;
        r = float_array(&r)?;
    }
    let out = match op {
        "+" => apply(op, &l, &r, numeric::add)?,
        "-" => apply(op, &l, &r, numeric::sub)?,
        "*" => apply(op, &l, &r, numeric::mul)?,
        "/" => apply(op, &l, &r, numeric::div)?,
        // The result takes the sign of the divisor.
        "%%" => {
            let rem = apply(op, &l, &r, numeric::rem)?;
            let shifted = apply(op, &rem, &r, numeric::add)?;
            apply(op, &shifted, &r, numeric::rem)?
        }
        "^" => pow(&l, &r)?,
        other => {
            return Err(TesseraError::internal(format!(
                "`{other}` is not an arithmetic operator"
            )));
        }
    };
    finish(out, &[lhs, rhs])
}

fn pow(l: &ArrayRef, r: &ArrayRef) -> TesseraResult<ArrayRef> {
    check_lengths("^", l.len(), r.len())?;
    let base = l.as_primitive::<Float64Type>();
    let exp = r.as_primitive::<Float64Type>();
    let out: Float64Array = match (base.len(), exp.len()) {
        (1, n) if n != 1 => {
            if base.is_null(0) {
                Float64Array::new_null(n)
            } else {
                let b = base.value(0);
                exp.unary(|e| b.powf(e))
            }
        }
        (n, 1) if n != 1 => {
            if exp.is_null(0) {
                Float64Array::new_null(n)
            } else {
                let e = exp.value(0);
                base.unary(|b| b.powf(e))
            }
        }
        _ => binary(base, exp, |b: f64, e: f64| b.powf(e)).map_err(exec_err)?,
    };
    Ok(Arc::new(out))
}

fn comparable(lhs: &Value, rhs: &Value, op: &str) -> TesseraResult<(ArrayRef, ArrayRef)> {
    let l = lhs.to_array()?;
    let r = rhs.to_array()?;
    let is_text = |a: &ArrayRef| matches!(a.data_type(), DataType::Utf8 | DataType::LargeUtf8);
    if is_text(&l) || is_text(&r) {
        let l = cast(l.as_ref(), &DataType::Utf8).map_err(exec_err)?;
        let r = cast(r.as_ref(), &DataType::Utf8).map_err(exec_err)?;
        return Ok((l, r));
    }
    if l.data_type() == &DataType::Boolean && r.data_type() == &DataType::Boolean {
        return Ok((l, r));
    }
    let l = numeric_array(lhs, op)?;
    let r = numeric_array(rhs, op)?;
    if is_float(&l) || is_float(&r) {
        Ok((float_array(&l)?, float_array(&r)?))
    } else {
        Ok((l, r))
    }
}

/// `== != < <= > >=`.
pub(crate) fn compare(op: &str, lhs: &Value, rhs: &Value) -> TesseraResult<Value> {
    let kernel: fn(&dyn Datum, &dyn Datum) -> Result<arrow::array::BooleanArray, ArrowError> =
        match op {
            "==" => cmp::eq,
            "!=" => cmp::neq,
            "<" => cmp::lt,
            "<=" => cmp::lt_eq,
            ">" => cmp::gt,
            ">=" => cmp::gt_eq,
            other => {
                return Err(TesseraError::internal(format!(
                    "`{other}` is not a comparison operator"
                )));
            }
        };
    let (l, r) = comparable(lhs, rhs, op)?;
    let out = apply(op, &l, &r, |a, b| kernel(a, b).map(|x| Arc::new(x) as ArrayRef))?;
    finish(out, &[lhs, rhs])
}

fn boolean_array(value: &Value, op: &str) -> TesseraResult<ArrayRef> {
    let arr = value.to_array()?;
    match arr.data_type() {
        DataType::Boolean => Ok(arr),
        DataType::Null => cast(arr.as_ref(), &DataType::Boolean).map_err(exec_err),
        dt if dt.is_numeric() => cast(arr.as_ref(), &DataType::Boolean).map_err(exec_err),
        other => Err(TesseraError::type_error(format!(
            "operations are possible only for numeric or logical types, `{op}` got {other}"
        ))),
    }
}

/// `& | && ||` with three-valued logic.
pub(crate) fn logical(op: &str, lhs: &Value, rhs: &Value) -> TesseraResult<Value> {
    let l = boolean_array(lhs, op)?;
    let r = boolean_array(rhs, op)?;
    check_lengths(op, l.len(), r.len())?;
    let n = result_len(l.len(), r.len());
    let l = broadcast(&l, n)?;
    let r = broadcast(&r, n)?;
    let (a, b) = (l.as_boolean(), r.as_boolean());
    let out = match op {
        "&" | "&&" => boolean::and_kleene(a, b),
        _ => boolean::or_kleene(a, b),
    }
    .map_err(exec_err)?;
    finish(Arc::new(out), &[lhs, rhs])
}

/// Unary minus.
pub(crate) fn negate(value: &Value) -> TesseraResult<Value> {
    let arr = numeric_array(value, "-")?;
    let out = numeric::neg(arr.as_ref()).map_err(exec_err)?;
    finish(out, &[value])
}

/// Logical negation.
pub(crate) fn not(value: &Value) -> TesseraResult<Value> {
    let arr = boolean_array(value, "!")?;
    let out = boolean::not(arr.as_boolean()).map_err(exec_err)?;
    finish(Arc::new(out), &[value])
}
