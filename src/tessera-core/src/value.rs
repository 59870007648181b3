//! Runtime value representation.

use std::collections::BTreeMap;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, StringArray, new_null_array,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Int64Type};

use common_error::{TesseraError, TesseraResult};

use crate::Symbol;

/// Runtime value produced by evaluation.
///
/// Scalars are length-one values; column views and other vectors are Arrow
/// arrays. `Null` is a missing scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit floating point.
    Float64(f64),
    /// UTF-8 string.
    String(String),
    /// A quoted name.
    Symbol(Symbol),
    /// A vector of values, typically a column view.
    Array(ArrayRef),
    /// Named members, reachable with the `$` accessor.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Check if this value is a missing scalar.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this value is a scalar (not an array or map).
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Self::Array(_) | Self::Map(_))
    }

    /// Number of elements. Scalars and maps count as one.
    pub fn len(&self) -> usize {
        match self {
            Self::Array(arr) => arr.len(),
            _ => 1,
        }
    }

    /// Whether this is an empty array.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Try to get as boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64.
    pub fn as_int64(&self) -> Option<i64> {
        match self {
            Self::Int64(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as f64.
    pub fn as_float64(&self) -> Option<f64> {
        match self {
            Self::Float64(f) => Some(*f),
            Self::Int64(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get the underlying array.
    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Self::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Get the type name for error messages.
    pub fn type_name(&self) -> String {
        match self {
            Self::Null => "Null".to_string(),
            Self::Bool(_) => "Bool".to_string(),
            Self::Int64(_) => "Int64".to_string(),
            Self::Float64(_) => "Float64".to_string(),
            Self::String(_) => "String".to_string(),
            Self::Symbol(_) => "Symbol".to_string(),
            Self::Array(arr) => format!("Array<{}>", arr.data_type()),
            Self::Map(_) => "Map".to_string(),
        }
    }

    /// Convert to an Arrow array. Scalars become length-one arrays.
    pub fn to_array(&self) -> TesseraResult<ArrayRef> {
        let arr: ArrayRef = match self {
            Self::Null => new_null_array(&DataType::Null, 1),
            Self::Bool(b) => Arc::new(BooleanArray::from(vec![*b])),
            Self::Int64(i) => Arc::new(Int64Array::from(vec![*i])),
            Self::Float64(f) => Arc::new(Float64Array::from(vec![*f])),
            Self::String(s) => Arc::new(StringArray::from(vec![s.as_str()])),
            Self::Symbol(s) => Arc::new(StringArray::from(vec![s.as_str()])),
            Self::Array(arr) => Arc::clone(arr),
            Self::Map(_) => {
                return Err(TesseraError::type_error(
                    "a Map value cannot be converted to an array",
                ));
            }
        };
        Ok(arr)
    }

    /// Extract element `index` of `array` as a scalar value.
    ///
    /// Integer types widen to `Int64`, floating types to `Float64`.
    pub fn from_array_element(array: &dyn Array, index: usize) -> TesseraResult<Self> {
        if index >= array.len() {
            return Err(TesseraError::value_error(format!(
                "index {index} out of bounds for array of length {}",
                array.len()
            )));
        }
        if array.is_null(index) {
            return Ok(Self::Null);
        }
        let value = match array.data_type() {
            DataType::Null => Self::Null,
            DataType::Boolean => Self::Bool(array.as_boolean().value(index)),
            DataType::Int64 => Self::Int64(array.as_primitive::<Int64Type>().value(index)),
            DataType::Float64 => Self::Float64(array.as_primitive::<Float64Type>().value(index)),
            DataType::Utf8 => Self::String(array.as_string::<i32>().value(index).to_string()),
            DataType::LargeUtf8 => Self::String(array.as_string::<i64>().value(index).to_string()),
            dt if dt.is_integer() => {
                let one = cast(&array.slice(index, 1), &DataType::Int64)?;
                Self::Int64(one.as_primitive::<Int64Type>().value(0))
            }
            dt if dt.is_floating() => {
                let one = cast(&array.slice(index, 1), &DataType::Float64)?;
                Self::Float64(one.as_primitive::<Float64Type>().value(0))
            }
            other => {
                return Err(TesseraError::not_implemented(format!(
                    "scalar extraction for {other}"
                )));
            }
        };
        Ok(value)
    }

    /// Collapse a length-one array into a scalar; other values are returned as is.
    pub fn into_scalar_if_unit(self) -> TesseraResult<Self> {
        match self {
            Self::Array(arr) if arr.len() == 1 => Self::from_array_element(arr.as_ref(), 0),
            other => Ok(other),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int64(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int64(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float64(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<Symbol> for Value {
    fn from(s: Symbol) -> Self {
        Self::Symbol(s)
    }
}

impl From<ArrayRef> for Value {
    fn from(arr: ArrayRef) -> Self {
        Self::Array(arr)
    }
}

impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self {
        Self::Array(Arc::new(Int64Array::from(v)))
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Self::Array(Arc::new(Float64Array::from(v)))
    }
}

impl From<Vec<bool>> for Value {
    fn from(v: Vec<bool>) -> Self {
        Self::Array(Arc::new(BooleanArray::from(v)))
    }
}

impl From<Vec<&str>> for Value {
    fn from(v: Vec<&str>) -> Self {
        Self::Array(Arc::new(StringArray::from(v)))
    }
}
