//! Column subset providers.
//!
//! A provider maps a column name and a [`Slice`] to a view over exactly the
//! selected rows, in slice order. Source columns are never mutated.

use std::collections::HashMap;
use std::fmt;

use arrow::array::{Array, ArrayRef};
use arrow::compute::take;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;

use common_error::{TesseraError, TesseraResult};

use crate::{Slice, Symbol, Value};

/// Resolves column names to per-group views.
///
/// Lookups are pure: the same `(name, slice)` always yields an equal view.
pub trait ColumnSubsets: fmt::Debug + Send + Sync {
    /// Whether `name` is a declared column.
    fn count(&self, name: &Symbol) -> bool;

    /// The rows of column `name` selected by `slice`, in slice order.
    fn get(&self, name: &Symbol, slice: &Slice) -> TesseraResult<Value>;

    /// The full column, for handlers that look beyond the current slice.
    fn column(&self, name: &Symbol) -> Option<&ArrayRef>;

    /// Declared column names, in declaration order.
    fn variable_names(&self) -> &[Symbol];

    /// Number of rows in the whole table.
    fn num_rows(&self) -> usize;
}

/// A [`ColumnSubsets`] over an Arrow record batch.
///
/// Contiguous slices produce zero-copy views; index slices gather with `take`.
#[derive(Debug, Clone)]
pub struct TableSubsets {
    batch: RecordBatch,
    names: Vec<Symbol>,
    index: HashMap<Symbol, usize>,
}

impl TableSubsets {
    /// Wrap a record batch.
    pub fn new(batch: RecordBatch) -> Self {
        let names: Vec<Symbol> = batch
            .schema()
            .fields()
            .iter()
            .map(|f| Symbol::new(f.name()))
            .collect();
        let index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self {
            batch,
            names,
            index,
        }
    }

    /// Build from named columns of equal length.
    pub fn from_columns<I, S>(columns: I) -> TesseraResult<Self>
    where
        I: IntoIterator<Item = (S, ArrayRef)>,
        S: AsRef<str>,
    {
        let batch = RecordBatch::try_from_iter(columns)?;
        Ok(Self::new(batch))
    }

    /// Schema of the underlying batch.
    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    /// The underlying batch.
    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }
}

impl ColumnSubsets for TableSubsets {
    fn count(&self, name: &Symbol) -> bool {
        self.index.contains_key(name)
    }

    fn get(&self, name: &Symbol, slice: &Slice) -> TesseraResult<Value> {
        let column = self
            .column(name)
            .ok_or_else(|| TesseraError::unresolved(name.as_str()))?;
        slice.check_bounds(column.len())?;
        let view = match slice {
            Slice::Range { offset, len } => column.slice(*offset, *len),
            Slice::Indices(_) => take(column.as_ref(), &slice.to_indices()?, None)?,
        };
        Ok(Value::Array(view))
    }

    fn column(&self, name: &Symbol) -> Option<&ArrayRef> {
        self.index.get(name).map(|&i| self.batch.column(i))
    }

    fn variable_names(&self) -> &[Symbol] {
        &self.names
    }

    fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }
}
