//! Tensor views over graph variables.
//!
//! A [`Tensor`] never owns storage. It is an ordered list of element intervals into graph
//! variables plus a row-major shape, so slicing, reshaping, broadcasting and concatenation are
//! pure view operations and two tensors alias exactly when they share intervals.

use std::collections::BTreeSet;

use smallvec::SmallVec;

use crate::error::{TileError, TileResult};
use crate::types::IpuType;

/// Identifier of a graph variable (a block of freshly allocated storage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(pub u32);

/// Half-open range `[begin, end)` of elements of one variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    pub variable: VariableId,
    pub begin: usize,
    pub end: usize,
}

impl Interval {
    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.begin
    }
}

type Intervals = SmallVec<[Interval; 2]>;

fn push_interval(out: &mut Intervals, interval: Interval) {
    if interval.is_empty() {
        return;
    }
    if let Some(last) = out.last_mut() {
        if last.variable == interval.variable && last.end == interval.begin {
            last.end = interval.end;
            return;
        }
    }
    out.push(interval);
}

/// Typed, shaped view over variable elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tensor {
    dtype: IpuType,
    shape: Vec<usize>,
    intervals: Intervals,
}

impl Tensor {
    pub(crate) fn from_variable(variable: VariableId, dtype: IpuType, shape: Vec<usize>) -> Self {
        let count: usize = shape.iter().product();
        let mut intervals = Intervals::new();
        push_interval(
            &mut intervals,
            Interval {
                variable,
                begin: 0,
                end: count,
            },
        );
        Tensor {
            dtype,
            shape,
            intervals,
        }
    }

    pub fn element_type(&self) -> IpuType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.num_elements() == 0
    }

    /// Length of the leading axis, `None` for scalars.
    pub fn leading_dim(&self) -> Option<usize> {
        self.shape.first().copied()
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    /// Distinct variables referenced by this view.
    pub fn variables(&self) -> BTreeSet<VariableId> {
        self.intervals.iter().map(|iv| iv.variable).collect()
    }

    /// Flat `(variable, offset)` pairs in row-major order.
    pub fn elements(&self) -> impl Iterator<Item = (VariableId, usize)> + '_ {
        self.intervals
            .iter()
            .flat_map(|iv| (iv.begin..iv.end).map(move |offset| (iv.variable, offset)))
    }

    fn flat_slice(&self, begin: usize, end: usize) -> Intervals {
        let mut out = Intervals::new();
        let mut cursor = 0usize;
        for iv in &self.intervals {
            let iv_start = cursor;
            let iv_end = cursor + iv.len();
            cursor = iv_end;
            if iv_end <= begin {
                continue;
            }
            if iv_start >= end {
                break;
            }
            let lo = begin.max(iv_start) - iv_start;
            let hi = end.min(iv_end) - iv_start;
            push_interval(
                &mut out,
                Interval {
                    variable: iv.variable,
                    begin: iv.begin + lo,
                    end: iv.begin + hi,
                },
            );
        }
        out
    }

    /// Item `index` along the leading axis.
    pub fn index(&self, index: usize) -> TileResult<Tensor> {
        let Some(&leading) = self.shape.first() else {
            return Err(TileError::invalid_view("cannot index a scalar tensor"));
        };
        if index >= leading {
            return Err(TileError::invalid_view(format!(
                "index {index} out of range for leading dimension {leading} (shape {:?})",
                self.shape
            )));
        }
        let inner: usize = self.shape[1..].iter().product();
        Ok(Tensor {
            dtype: self.dtype,
            shape: self.shape[1..].to_vec(),
            intervals: self.flat_slice(index * inner, (index + 1) * inner),
        })
    }

    /// Items `[begin, end)` along the leading axis.
    pub fn slice(&self, begin: usize, end: usize) -> TileResult<Tensor> {
        let Some(&leading) = self.shape.first() else {
            return Err(TileError::invalid_view("cannot slice a scalar tensor"));
        };
        if begin > end || end > leading {
            return Err(TileError::invalid_view(format!(
                "slice {begin}..{end} out of range for leading dimension {leading}"
            )));
        }
        let inner: usize = self.shape[1..].iter().product();
        let mut shape = self.shape.clone();
        shape[0] = end - begin;
        Ok(Tensor {
            dtype: self.dtype,
            shape,
            intervals: self.flat_slice(begin * inner, end * inner),
        })
    }

    pub fn flatten(&self) -> Tensor {
        Tensor {
            dtype: self.dtype,
            shape: vec![self.num_elements()],
            intervals: self.intervals.clone(),
        }
    }

    pub fn reshape(&self, shape: &[usize]) -> TileResult<Tensor> {
        let count: usize = shape.iter().product();
        if count != self.num_elements() {
            return Err(TileError::invalid_view(format!(
                "cannot reshape {:?} ({} elements) into {:?} ({count} elements)",
                self.shape,
                self.num_elements(),
                shape
            )));
        }
        Ok(Tensor {
            dtype: self.dtype,
            shape: shape.to_vec(),
            intervals: self.intervals.clone(),
        })
    }

    /// Inserts a unit dimension at `axis`.
    pub fn expand(&self, axis: usize) -> TileResult<Tensor> {
        if axis > self.rank() {
            return Err(TileError::invalid_view(format!(
                "cannot expand axis {axis} of a rank {} tensor",
                self.rank()
            )));
        }
        let mut shape = self.shape.clone();
        shape.insert(axis, 1);
        Ok(Tensor {
            dtype: self.dtype,
            shape,
            intervals: self.intervals.clone(),
        })
    }

    /// Repeats the tensor `factor` times along `axis` without copying storage.
    pub fn broadcast(&self, factor: usize, axis: usize) -> TileResult<Tensor> {
        if axis >= self.rank() {
            return Err(TileError::invalid_view(format!(
                "cannot broadcast axis {axis} of a rank {} tensor",
                self.rank()
            )));
        }
        let outer: usize = self.shape[..axis].iter().product();
        let block: usize = self.shape[axis..].iter().product();
        let mut intervals = Intervals::new();
        for o in 0..outer {
            let segment = self.flat_slice(o * block, (o + 1) * block);
            for _ in 0..factor {
                for iv in &segment {
                    push_interval(&mut intervals, *iv);
                }
            }
        }
        let mut shape = self.shape.clone();
        shape[axis] *= factor;
        Ok(Tensor {
            dtype: self.dtype,
            shape,
            intervals,
        })
    }

    /// Concatenates tensors along the leading axis.
    pub fn concat(tensors: &[Tensor]) -> TileResult<Tensor> {
        let Some(first) = tensors.first() else {
            return Err(TileError::invalid_view("cannot concatenate zero tensors"));
        };
        if first.rank() == 0 {
            return Err(TileError::invalid_view("cannot concatenate scalar tensors"));
        }
        let mut leading = 0usize;
        let mut intervals = Intervals::new();
        for tensor in tensors {
            if tensor.dtype != first.dtype || tensor.shape[1..] != first.shape[1..] {
                return Err(TileError::invalid_view(format!(
                    "cannot concatenate {:?} {:?} with {:?} {:?}",
                    first.dtype, first.shape, tensor.dtype, tensor.shape
                )));
            }
            leading += tensor.shape[0];
            for iv in &tensor.intervals {
                push_interval(&mut intervals, *iv);
            }
        }
        let mut shape = first.shape.clone();
        shape[0] = leading;
        Ok(Tensor {
            dtype: first.dtype,
            shape,
            intervals,
        })
    }

    /// Views the same storage with another element type of identical width.
    pub fn reinterpret(&self, dtype: IpuType) -> TileResult<Tensor> {
        if dtype.bitwidth() != self.dtype.bitwidth() {
            return Err(TileError::invalid_view(format!(
                "cannot reinterpret {:?} ({} bits) as {:?} ({} bits)",
                self.dtype,
                self.dtype.bitwidth(),
                dtype,
                dtype.bitwidth()
            )));
        }
        Ok(Tensor {
            dtype,
            shape: self.shape.clone(),
            intervals: self.intervals.clone(),
        })
    }

    /// Returns true when both views reference at least one common element.
    pub fn overlaps(&self, other: &Tensor) -> bool {
        self.intervals.iter().any(|a| {
            other
                .intervals
                .iter()
                .any(|b| a.variable == b.variable && a.begin < b.end && b.begin < a.end)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor(shape: &[usize]) -> Tensor {
        Tensor::from_variable(VariableId(0), IpuType::Float, shape.to_vec())
    }

    #[test]
    fn index_selects_contiguous_rows() {
        let t = tensor(&[3, 4]);
        let row = t.index(1).expect("row");
        assert_eq!(row.shape(), &[4]);
        assert_eq!(
            row.intervals(),
            &[Interval {
                variable: VariableId(0),
                begin: 4,
                end: 8
            }]
        );
        assert!(t.index(3).is_err());
    }

    #[test]
    fn concat_merges_adjacent_intervals() {
        let t = tensor(&[4, 2]);
        let rows = [t.index(0).unwrap(), t.index(1).unwrap()];
        let expanded: Vec<Tensor> = rows.iter().map(|r| r.expand(0).unwrap()).collect();
        let joined = Tensor::concat(&expanded).unwrap();
        assert_eq!(joined.shape(), &[2, 2]);
        assert_eq!(joined.intervals().len(), 1);
    }

    #[test]
    fn broadcast_repeats_without_new_variables() {
        let t = tensor(&[3]).expand(0).unwrap();
        let b = t.broadcast(4, 0).unwrap();
        assert_eq!(b.shape(), &[4, 3]);
        assert_eq!(b.num_elements(), 12);
        assert_eq!(b.variables().len(), 1);
        let offsets: Vec<usize> = b.elements().map(|(_, off)| off).collect();
        assert_eq!(offsets, vec![0, 1, 2, 0, 1, 2, 0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn broadcast_inner_axis_repeats_each_row() {
        let t = tensor(&[2, 1]);
        let b = t.broadcast(3, 1).unwrap();
        assert_eq!(b.shape(), &[2, 3]);
        let offsets: Vec<usize> = b.elements().map(|(_, off)| off).collect();
        assert_eq!(offsets, vec![0, 0, 0, 1, 1, 1]);
    }
}
