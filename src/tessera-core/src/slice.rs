//! Slicing indices: the rows that make up one group.

use std::sync::Arc;

use arrow::array::UInt32Array;

use common_error::{TesseraError, TesseraResult};

/// The set of row positions identifying one group.
///
/// A slice is immutable once built. Iteration yields row positions in slice
/// order, which is also the order of every view taken through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slice {
    /// A contiguous window of rows.
    Range {
        /// First row.
        offset: usize,
        /// Number of rows.
        len: usize,
    },
    /// An explicit list of rows.
    Indices(Arc<[u32]>),
}

impl Slice {
    /// A contiguous window of `len` rows starting at `offset`.
    pub const fn range(offset: usize, len: usize) -> Self {
        Self::Range { offset, len }
    }

    /// The whole-table slice used for ungrouped evaluation.
    pub const fn whole(num_rows: usize) -> Self {
        Self::Range {
            offset: 0,
            len: num_rows,
        }
    }

    /// An explicit list of row positions.
    pub fn indices(rows: impl IntoIterator<Item = u32>) -> Self {
        Self::Indices(rows.into_iter().collect())
    }

    /// Number of rows in the slice.
    pub fn len(&self) -> usize {
        match self {
            Self::Range { len, .. } => *len,
            Self::Indices(rows) => rows.len(),
        }
    }

    /// Whether the slice selects no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the slice is a contiguous window.
    pub fn is_contiguous(&self) -> bool {
        matches!(self, Self::Range { .. })
    }

    /// Row position of the `i`-th element of the slice.
    pub fn get(&self, i: usize) -> Option<usize> {
        match self {
            Self::Range { offset, len } if i < *len => offset.checked_add(i),
            Self::Range { .. } => None,
            Self::Indices(rows) => rows.get(i).map(|&r| r as usize),
        }
    }

    /// Iterate over row positions in slice order.
    ///
    /// A range running past `usize::MAX` stops there; [`Slice::check_bounds`]
    /// rejects such slices.
    pub fn iter(&self) -> SliceIter<'_> {
        match self {
            Self::Range { offset, len } => SliceIter::Range(*offset..offset.saturating_add(*len)),
            Self::Indices(rows) => SliceIter::Indices(rows.iter()),
        }
    }

    /// One past the largest row position, or 0 for an empty slice.
    ///
    /// Fails when a range ends beyond `usize::MAX`.
    pub fn extent(&self) -> TesseraResult<usize> {
        match self {
            Self::Range { offset, len } if *len > 0 => offset.checked_add(*len).ok_or_else(|| {
                TesseraError::value_error(format!(
                    "row range of {len} rows at offset {offset} overflows"
                ))
            }),
            Self::Range { .. } => Ok(0),
            Self::Indices(rows) => Ok(rows.iter().max().map_or(0, |&m| m as usize + 1)),
        }
    }

    /// Check that every row position is below `num_rows`.
    pub fn check_bounds(&self, num_rows: usize) -> TesseraResult<()> {
        let extent = self.extent()?;
        if extent > num_rows {
            return Err(TesseraError::value_error(format!(
                "slice reaches row {} but the table has {num_rows} rows",
                extent - 1
            )));
        }
        Ok(())
    }

    /// Row positions as an Arrow index array, for use with `take`.
    pub fn to_indices(&self) -> TesseraResult<UInt32Array> {
        match self {
            Self::Indices(rows) => Ok(UInt32Array::from(rows.to_vec())),
            Self::Range { offset, len } => {
                let start = u32::try_from(*offset).map_err(|_| {
                    TesseraError::value_error(format!("row offset {offset} exceeds u32 range"))
                })?;
                let end = self.extent()?.max(*offset);
                let end = u32::try_from(end).map_err(|_| {
                    TesseraError::value_error(format!("row range end {end} exceeds u32 range"))
                })?;
                Ok(UInt32Array::from_iter_values(start..end))
            }
        }
    }
}

impl<'a> IntoIterator for &'a Slice {
    type Item = usize;
    type IntoIter = SliceIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the row positions of a [`Slice`].
#[derive(Debug, Clone)]
pub enum SliceIter<'a> {
    /// Iterating a contiguous window.
    Range(std::ops::Range<usize>),
    /// Iterating an explicit row list.
    Indices(std::slice::Iter<'a, u32>),
}

impl Iterator for SliceIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        match self {
            Self::Range(r) => r.next(),
            Self::Indices(it) => it.next().map(|&r| r as usize),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            Self::Range(r) => r.size_hint(),
            Self::Indices(it) => it.size_hint(),
        }
    }
}

impl ExactSizeIterator for SliceIter<'_> {}
