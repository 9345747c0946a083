use std::fmt;

use crate::error::{Error, Result};

// Shape: N-dimensional shape descriptor
//
// A Shape is the ordered list of dimension sizes of a tensor:
//   - Scalar: Shape([])          rank 0, 1 element
//   - Vector: Shape([5])         rank 1, 5 elements
//   - Matrix: Shape([3, 4])      rank 2, 12 elements
//   - Batch:  Shape([2, 3, 4])   rank 3, 24 elements
//
// Shapes are immutable. Reshape, broadcast and reduction all produce a new
// Shape rather than editing one in place.
//
// Flat indexing is row-major: the last dimension varies fastest.

/// N-dimensional shape of a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// Create a new shape from a vector of dimension sizes.
    ///
    /// Zero-sized dimensions are rejected when the shape is attached to a
    /// tensor (see [`Shape::validate`]).
    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    /// The rank-0 shape.
    pub fn scalar() -> Self {
        Shape(vec![])
    }

    /// The dimension sizes as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Number of dimensions (0 for scalar, 1 for vector, 2 for matrix, etc.).
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total number of elements (product of all dimensions).
    /// A scalar shape [] has 1 element.
    pub fn elem_count(&self) -> usize {
        self.0.iter().product::<usize>()
    }

    /// True for rank 0 or a single element.
    pub fn is_scalar(&self) -> bool {
        self.rank() == 0 || self.elem_count() == 1
    }

    pub fn is_vector(&self) -> bool {
        self.rank() == 1
    }

    pub fn is_matrix(&self) -> bool {
        self.rank() == 2
    }

    /// Number of rows of a rank-2 shape.
    pub fn row_count(&self) -> Result<usize> {
        self.require_matrix("row_count")?;
        Ok(self.0[0])
    }

    /// Number of columns of a rank-2 shape.
    pub fn col_count(&self) -> Result<usize> {
        self.require_matrix("col_count")?;
        Ok(self.0[1])
    }

    fn require_matrix(&self, op: &'static str) -> Result<()> {
        if self.is_matrix() {
            Ok(())
        } else {
            Err(Error::RankMismatch {
                op,
                expected: 2,
                got: self.rank(),
            })
        }
    }

    /// Check that every dimension is at least 1.
    pub fn validate(&self) -> Result<()> {
        if self.0.contains(&0) {
            return Err(Error::InvalidShape { shape: self.clone() });
        }
        Ok(())
    }

    /// Size of a specific dimension.
    pub fn dim(&self, d: usize) -> Result<usize> {
        self.0.get(d).copied().ok_or(Error::AxisOutOfRange {
            axis: d as isize,
            rank: self.rank(),
        })
    }

    /// Resolve a possibly negative axis (counted from the end) to a
    /// concrete dimension index.
    pub fn normalize_axis(&self, axis: isize) -> Result<usize> {
        let rank = self.rank() as isize;
        let resolved = if axis < 0 { axis + rank } else { axis };
        if resolved < 0 || resolved >= rank {
            return Err(Error::AxisOutOfRange {
                axis,
                rank: self.rank(),
            });
        }
        Ok(resolved as usize)
    }

    /// Compute the contiguous (row-major / C-order) strides for this shape.
    ///
    /// For shape [2, 3, 4], strides are [12, 4, 1]:
    ///   - Moving 1 step in dim 0 jumps 12 elements (3*4)
    ///   - Moving 1 step in dim 1 jumps 4 elements
    ///   - Moving 1 step in dim 2 jumps 1 element
    pub fn stride_contiguous(&self) -> Vec<usize> {
        let mut strides = vec![0usize; self.rank()];
        if self.rank() > 0 {
            strides[self.rank() - 1] = 1;
            for i in (0..self.rank() - 1).rev() {
                strides[i] = strides[i + 1] * self.0[i + 1];
            }
        }
        strides
    }

    /// Convert a multi-index into its flat row-major offset.
    pub fn index(&self, indices: &[usize]) -> Result<usize> {
        if indices.len() != self.rank() || indices.iter().zip(&self.0).any(|(&i, &d)| i >= d) {
            return Err(Error::IndexOutOfBounds {
                index: indices.to_vec(),
                shape: self.clone(),
            });
        }
        Ok(indices
            .iter()
            .zip(self.stride_contiguous())
            .map(|(i, s)| i * s)
            .sum())
    }

    /// Shape after reducing `axis` (already normalized).
    /// With `keepdims` the axis stays with size 1, otherwise it is removed.
    pub fn reduced(&self, axis: usize, keepdims: bool) -> Result<Shape> {
        if axis >= self.rank() {
            return Err(Error::AxisOutOfRange {
                axis: axis as isize,
                rank: self.rank(),
            });
        }
        let mut dims = self.0.clone();
        if keepdims {
            dims[axis] = 1;
        } else {
            dims.remove(axis);
        }
        Ok(Shape(dims))
    }

    // Broadcasting

    /// Compute the broadcast output shape from two input shapes.
    ///
    /// NumPy-style broadcasting rules:
    ///   1. Align shapes from the right (trailing dimensions).
    ///   2. Dimensions are compatible if they are equal or one of them is 1.
    ///   3. Missing leading dimensions are treated as 1.
    ///
    /// Examples:
    ///   [3, 4] and [4]     → [3, 4]
    ///   [2, 1] and [1, 3]  → [2, 3]
    ///   [5, 3, 1] and [3, 4] → [5, 3, 4]
    ///   [3] and [4]        → Error (3 ≠ 4 and neither is 1)
    pub fn broadcast_shape(lhs: &Shape, rhs: &Shape) -> Result<Shape> {
        let l = lhs.dims();
        let r = rhs.dims();
        let max_rank = l.len().max(r.len());
        let mut result = Vec::with_capacity(max_rank);

        for i in 0..max_rank {
            // Index from the right. If i >= len, treat as 1.
            let ld = if i < l.len() { l[l.len() - 1 - i] } else { 1 };
            let rd = if i < r.len() { r[r.len() - 1 - i] } else { 1 };

            if ld == rd || rd == 1 {
                result.push(ld);
            } else if ld == 1 {
                result.push(rd);
            } else {
                return Err(Error::ShapeMismatch {
                    op: "broadcast",
                    lhs: lhs.clone(),
                    rhs: rhs.clone(),
                });
            }
        }

        result.reverse();
        Ok(Shape::new(result))
    }

    /// True if `self` can be stretched into `target` without changing
    /// `target`: trailing alignment, each dim equal or 1, and `self` no
    /// longer than `target`.
    pub fn is_broadcastable_to(&self, target: &Shape) -> bool {
        if self.rank() > target.rank() {
            return false;
        }
        self.0
            .iter()
            .rev()
            .zip(target.0.iter().rev())
            .all(|(&s, &t)| s == t || s == 1)
    }

    /// Return the broadcast strides for this shape to match a target broadcast shape.
    ///
    /// For each dimension where self.dim[i] == 1 and target.dim[i] > 1,
    /// the stride is set to 0 (repeating the single element).
    /// Missing leading dimensions also get stride 0.
    pub fn broadcast_strides(&self, target: &Shape) -> Result<Vec<usize>> {
        self.check_broadcastable_to(target)?;
        let self_dims = self.dims();
        let target_dims = target.dims();
        let self_strides = self.stride_contiguous();

        let mut result = vec![0usize; target_dims.len()];
        let offset = target_dims.len() - self_dims.len();

        for i in 0..self_dims.len() {
            if self_dims[i] == target_dims[i + offset] {
                result[i + offset] = self_strides[i];
            }
        }
        Ok(result)
    }

    /// Axes of `broadcast` that were produced by stretching `self`: leading
    /// axes `self` lacks, plus axes where `self` has size 1 and `broadcast`
    /// does not. These are the axes an un-broadcast sums over.
    pub fn broadcast_axes(&self, broadcast: &Shape) -> Result<Vec<usize>> {
        self.check_broadcastable_to(broadcast)?;
        let offset = broadcast.rank() - self.rank();
        let mut axes: Vec<usize> = (0..offset).collect();
        for (i, &d) in self.0.iter().enumerate() {
            if d == 1 && broadcast.0[offset + i] != 1 {
                axes.push(offset + i);
            }
        }
        Ok(axes)
    }

    fn check_broadcastable_to(&self, target: &Shape) -> Result<()> {
        if !self.is_broadcastable_to(target) {
            return Err(Error::ShapeMismatch {
                op: "broadcast_to",
                lhs: self.clone(),
                rhs: target.clone(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

// These let you write: Shape::from((3, 4)) instead of Shape::new(vec![3, 4])

impl From<()> for Shape {
    fn from(_: ()) -> Self {
        Shape(vec![])
    }
}

impl From<usize> for Shape {
    fn from(d: usize) -> Self {
        Shape(vec![d])
    }
}

impl From<(usize,)> for Shape {
    fn from((d0,): (usize,)) -> Self {
        Shape(vec![d0])
    }
}

impl From<(usize, usize)> for Shape {
    fn from((d0, d1): (usize, usize)) -> Self {
        Shape(vec![d0, d1])
    }
}

impl From<(usize, usize, usize)> for Shape {
    fn from((d0, d1, d2): (usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2])
    }
}

impl From<(usize, usize, usize, usize)> for Shape {
    fn from((d0, d1, d2, d3): (usize, usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2, d3])
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Shape(v)
    }
}

impl From<&[usize]> for Shape {
    fn from(s: &[usize]) -> Self {
        Shape(s.to_vec())
    }
}

impl From<&Shape> for Shape {
    fn from(s: &Shape) -> Self {
        s.clone()
    }
}
