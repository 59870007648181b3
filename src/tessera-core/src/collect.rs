//! Type-promoting collection of per-group results into one column.
//!
//! A [`Collector`] owns an output column of fixed length and fills it one
//! slice at a time. When a value arrives that the current column type cannot
//! hold, the caller asks whether the collector can be widened and, if so,
//! swaps it for the widened one.

use std::fmt;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, NullArray, StringArray,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Int64Type};
use log::trace;

use common_error::{TesseraError, TesseraResult};

use crate::{Slice, Value};

/// The column kinds a collector can hold.
///
/// `Bool < Int64 < Float64` form the numeric promotion chain; `Null` (every
/// element missing) can become anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValueKind {
    /// All elements missing.
    Null,
    /// Booleans.
    Bool,
    /// 64-bit integers.
    Int64,
    /// 64-bit floats.
    Float64,
    /// UTF-8 strings.
    Utf8,
}

impl ValueKind {
    /// Classify a value.
    pub fn of(value: &Value) -> TesseraResult<Self> {
        let kind = match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Bool,
            Value::Int64(_) => Self::Int64,
            Value::Float64(_) => Self::Float64,
            Value::String(_) | Value::Symbol(_) => Self::Utf8,
            Value::Array(arr) if arr.null_count() == arr.len() => Self::Null,
            Value::Array(arr) => match arr.data_type() {
                DataType::Null => Self::Null,
                DataType::Boolean => Self::Bool,
                dt if dt.is_integer() => Self::Int64,
                dt if dt.is_floating() => Self::Float64,
                DataType::Utf8 | DataType::LargeUtf8 => Self::Utf8,
                other => {
                    return Err(TesseraError::type_error(format!(
                        "cannot collect values of type {other}"
                    )));
                }
            },
            Value::Map(_) => {
                return Err(TesseraError::type_error("cannot collect Map values"));
            }
        };
        Ok(kind)
    }

    fn is_numeric(self) -> bool {
        matches!(self, Self::Bool | Self::Int64 | Self::Float64)
    }

    fn arrow_type(self) -> DataType {
        match self {
            Self::Null => DataType::Null,
            Self::Bool => DataType::Boolean,
            Self::Int64 => DataType::Int64,
            Self::Float64 => DataType::Float64,
            Self::Utf8 => DataType::Utf8,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "logical (all missing)",
            Self::Bool => "logical",
            Self::Int64 => "integer",
            Self::Float64 => "numeric",
            Self::Utf8 => "character",
        };
        f.write_str(name)
    }
}

/// Sink that gathers per-group values into one typed column.
pub trait Collector: fmt::Debug + Send {
    /// Whether `value` can be stored without widening.
    fn accepts(&self, value: &Value) -> bool;

    /// Whether a widened collector could store `value`.
    fn can_widen_to(&self, value: &Value) -> bool;

    /// Build a collector wide enough for `value`, carrying over everything collected so far.
    fn widen(self: Box<Self>, value: &Value) -> TesseraResult<Box<dyn Collector>>;

    /// Store `value` at the rows of `slice`. A length-one value is recycled.
    fn accumulate(&mut self, slice: &Slice, value: &Value) -> TesseraResult<()>;

    /// Finish and return the column.
    fn finalize(self: Box<Self>) -> ArrayRef;

    /// Human-readable description of the current column type.
    fn describe(&self) -> String;
}

#[derive(Debug, Clone)]
enum Buffer {
    Null,
    Bool(Vec<Option<bool>>),
    Int64(Vec<Option<i64>>),
    Float64(Vec<Option<f64>>),
    Utf8(Vec<Option<String>>),
}

/// The standard [`Collector`], backed by a vector of optional elements.
#[derive(Debug, Clone)]
pub struct TypedCollector {
    kind: ValueKind,
    len: usize,
    buffer: Buffer,
}

impl TypedCollector {
    /// A collector of `kind` for a column of `len` rows, initially all missing.
    pub fn new(kind: ValueKind, len: usize) -> Self {
        let buffer = match kind {
            ValueKind::Null => Buffer::Null,
            ValueKind::Bool => Buffer::Bool(vec![None; len]),
            ValueKind::Int64 => Buffer::Int64(vec![None; len]),
            ValueKind::Float64 => Buffer::Float64(vec![None; len]),
            ValueKind::Utf8 => Buffer::Utf8(vec![None; len]),
        };
        Self { kind, len, buffer }
    }

    /// The current column kind.
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    fn widened(&self, kind: ValueKind) -> Self {
        let buffer = match (&self.buffer, kind) {
            (Buffer::Null, _) => return Self::new(kind, self.len),
            (Buffer::Bool(v), ValueKind::Int64) => {
                Buffer::Int64(v.iter().map(|b| b.map(i64::from)).collect())
            }
            (Buffer::Bool(v), ValueKind::Float64) => {
                Buffer::Float64(v.iter().map(|b| b.map(|b| f64::from(u8::from(b)))).collect())
            }
            (Buffer::Int64(v), ValueKind::Float64) => {
                Buffer::Float64(v.iter().map(|i| i.map(|i| i as f64)).collect())
            }
            _ => return self.clone(),
        };
        Self {
            kind,
            len: self.len,
            buffer,
        }
    }
}

impl Collector for TypedCollector {
    fn accepts(&self, value: &Value) -> bool {
        match ValueKind::of(value) {
            Ok(ValueKind::Null) => true,
            Ok(kind) if kind == self.kind => true,
            Ok(kind) => self.kind.is_numeric() && kind.is_numeric() && kind < self.kind,
            Err(_) => false,
        }
    }

    fn can_widen_to(&self, value: &Value) -> bool {
        match ValueKind::of(value) {
            Ok(kind) if self.kind == ValueKind::Null => kind != ValueKind::Null,
            Ok(kind) => self.kind.is_numeric() && kind.is_numeric() && kind > self.kind,
            Err(_) => false,
        }
    }

    fn widen(self: Box<Self>, value: &Value) -> TesseraResult<Box<dyn Collector>> {
        if !self.can_widen_to(value) {
            return Err(TesseraError::type_error(format!(
                "Can not automatically convert from {} to {}",
                self.describe(),
                ValueKind::of(value)?
            )));
        }
        let target = ValueKind::of(value)?;
        trace!("widening collector from {} to {}", self.kind, target);
        Ok(Box::new(self.widened(target)))
    }

    fn accumulate(&mut self, slice: &Slice, value: &Value) -> TesseraResult<()> {
        if !self.accepts(value) {
            return Err(TesseraError::type_error(format!(
                "Can not automatically convert from {} to {}",
                self.describe(),
                ValueKind::of(value)?
            )));
        }
        let n = value.len();
        if n != 1 && n != slice.len() {
            return Err(TesseraError::value_error(format!(
                "incompatible size ({n}), expecting {} (the group size) or 1",
                slice.len()
            )));
        }
        slice.check_bounds(self.len)?;

        if matches!(self.buffer, Buffer::Null) || ValueKind::of(value)? == ValueKind::Null {
            // Missing values are already in place.
            return Ok(());
        }

        let source = cast(value.to_array()?.as_ref(), &self.kind.arrow_type())?;
        let src = |k: usize| if n == 1 { 0 } else { k };

        match &mut self.buffer {
            Buffer::Null => {}
            Buffer::Bool(out) => {
                let arr = source.as_boolean();
                for (k, row) in slice.iter().enumerate() {
                    let i = src(k);
                    out[row] = (!arr.is_null(i)).then(|| arr.value(i));
                }
            }
            Buffer::Int64(out) => {
                let arr = source.as_primitive::<Int64Type>();
                for (k, row) in slice.iter().enumerate() {
                    let i = src(k);
                    out[row] = (!arr.is_null(i)).then(|| arr.value(i));
                }
            }
            Buffer::Float64(out) => {
                let arr = source.as_primitive::<Float64Type>();
                for (k, row) in slice.iter().enumerate() {
                    let i = src(k);
                    out[row] = (!arr.is_null(i)).then(|| arr.value(i));
                }
            }
            Buffer::Utf8(out) => {
                let arr = source.as_string::<i32>();
                for (k, row) in slice.iter().enumerate() {
                    let i = src(k);
                    out[row] = (!arr.is_null(i)).then(|| arr.value(i).to_string());
                }
            }
        }
        Ok(())
    }

    fn finalize(self: Box<Self>) -> ArrayRef {
        match self.buffer {
            Buffer::Null => Arc::new(NullArray::new(self.len)),
            Buffer::Bool(v) => Arc::new(BooleanArray::from(v)),
            Buffer::Int64(v) => Arc::new(Int64Array::from(v)),
            Buffer::Float64(v) => Arc::new(Float64Array::from(v)),
            Buffer::Utf8(v) => Arc::new(StringArray::from(v)),
        }
    }

    fn describe(&self) -> String {
        self.kind.to_string()
    }
}

/// A collector for a column of `len` rows, typed after `first`.
pub fn collector_for(first: &Value, len: usize) -> TesseraResult<Box<dyn Collector>> {
    Ok(Box::new(TypedCollector::new(ValueKind::of(first)?, len)))
}

/// Feed `value` into `collector` at `slice`, widening it first when needed.
pub fn collect_into(
    collector: Box<dyn Collector>,
    slice: &Slice,
    value: &Value,
) -> TesseraResult<Box<dyn Collector>> {
    let mut collector = if collector.accepts(value) {
        collector
    } else if collector.can_widen_to(value) {
        collector.widen(value)?
    } else {
        return Err(TesseraError::type_error(format!(
            "Can not automatically convert from {} to {}",
            collector.describe(),
            ValueKind::of(value)?
        )));
    };
    collector.accumulate(slice, value)?;
    Ok(collector)
}

/// Concatenate values end to end into one column, promoting types as needed.
pub fn combine_all(values: &[Value]) -> TesseraResult<ArrayRef> {
    let Some(first) = values.first() else {
        return Err(TesseraError::value_error(
            "combine_all needs at least one value",
        ));
    };
    let total: usize = values.iter().map(Value::len).sum();
    let mut collector = collector_for(first, total)?;
    let mut offset = 0;
    for value in values {
        let n = value.len();
        if n == 0 {
            continue;
        }
        collector = collect_into(collector, &Slice::range(offset, n), value)?;
        offset += n;
    }
    Ok(collector.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(ValueKind::of(&Value::Int64(1)).unwrap(), ValueKind::Int64);
        assert_eq!(ValueKind::of(&Value::from("a")).unwrap(), ValueKind::Utf8);
        assert_eq!(
            ValueKind::of(&Value::from(vec![1.5f64])).unwrap(),
            ValueKind::Float64
        );
        let all_missing: ArrayRef = Arc::new(Int64Array::from(vec![None, None]));
        assert_eq!(
            ValueKind::of(&Value::Array(all_missing)).unwrap(),
            ValueKind::Null
        );
    }

    #[test]
    fn test_accumulate_recycles_scalars() {
        let mut c: Box<dyn Collector> = Box::new(TypedCollector::new(ValueKind::Int64, 6));
        c.accumulate(&Slice::indices([0, 1, 2]), &Value::Int64(3)).unwrap();
        c.accumulate(&Slice::indices([3, 4, 5]), &Value::from(vec![7i64, 8, 9]))
            .unwrap();
        let out = c.finalize();
        assert_eq!(
            Value::Array(out),
            Value::from(vec![3i64, 3, 3, 7, 8, 9])
        );
    }

    #[test]
    fn test_accumulate_places_rows_by_slice() {
        let mut c: Box<dyn Collector> = Box::new(TypedCollector::new(ValueKind::Utf8, 4));
        c.accumulate(&Slice::indices([3, 0]), &Value::from(vec!["d", "a"]))
            .unwrap();
        let out = c.finalize();
        let strings = out.as_string::<i32>();
        assert_eq!(strings.value(0), "a");
        assert!(strings.is_null(1));
        assert_eq!(strings.value(3), "d");
    }

    #[test]
    fn test_size_mismatch_is_rejected() {
        let mut c = TypedCollector::new(ValueKind::Int64, 4);
        let err = c
            .accumulate(&Slice::range(0, 3), &Value::from(vec![1i64, 2]))
            .unwrap_err();
        assert!(err.to_string().contains("incompatible size"));
    }

    #[test]
    fn test_widen_int_to_float() {
        let c: Box<dyn Collector> = Box::new(TypedCollector::new(ValueKind::Int64, 2));
        let c = collect_into(c, &Slice::range(0, 1), &Value::Int64(1)).unwrap();
        assert!(!c.accepts(&Value::Float64(0.5)));
        assert!(c.can_widen_to(&Value::Float64(0.5)));
        let c = collect_into(c, &Slice::range(1, 1), &Value::Float64(0.5)).unwrap();
        assert_eq!(c.describe(), "numeric");
        assert_eq!(Value::Array(c.finalize()), Value::from(vec![1.0f64, 0.5]));
    }

    #[test]
    fn test_float_collector_accepts_ints() {
        let c = TypedCollector::new(ValueKind::Float64, 1);
        assert!(c.accepts(&Value::Int64(2)));
        assert!(!c.can_widen_to(&Value::Int64(2)));
    }

    #[test]
    fn test_all_missing_collector_becomes_anything() {
        let c = TypedCollector::new(ValueKind::Null, 2);
        assert!(c.can_widen_to(&Value::from("x")));
        let c: Box<dyn Collector> = Box::new(c);
        let c = collect_into(c, &Slice::range(1, 1), &Value::from("x")).unwrap();
        let out = c.finalize();
        assert!(out.is_null(0));
        assert_eq!(out.as_string::<i32>().value(1), "x");
    }

    #[test]
    fn test_incompatible_kinds() {
        let err = combine_all(&[Value::from(vec![1i64]), Value::from("a")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: Can not automatically convert from integer to character"
        );
    }

    #[test]
    fn test_combine_all_promotes() {
        let out = combine_all(&[
            Value::Bool(true),
            Value::from(vec![2i64, 3]),
            Value::Null,
            Value::Float64(4.5),
        ])
        .unwrap();
        let floats = out.as_primitive::<Float64Type>();
        assert_eq!(out.len(), 5);
        assert_eq!(floats.value(0), 1.0);
        assert_eq!(floats.value(2), 3.0);
        assert!(floats.is_null(3));
        assert_eq!(floats.value(4), 4.5);
    }

    #[test]
    fn test_combine_all_requires_input() {
        assert!(combine_all(&[]).is_err());
    }
}
