use rand::Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::shape::Shape;

// Tensor: dense n-dimensional array of f64
//
// A Tensor is a Shape plus a contiguous row-major buffer with exactly
// shape.elem_count() elements. Tensors have value semantics: every
// operation allocates and returns a new Tensor. The single exception is
// `add_assign`, which gradient accumulation uses to grow a buffer it owns.
//
// Binary elementwise operations broadcast NumPy-style (see
// Shape::broadcast_shape). Broadcasting is implemented by gathering each
// operand through its broadcast strides: a stride of 0 repeats the same
// element along a stretched axis.

/// Reductions along a single axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Mean,
    /// Population variance (divisor n).
    Variance,
}

impl ReduceOp {
    pub fn name(self) -> &'static str {
        match self {
            ReduceOp::Sum => "sum",
            ReduceOp::Mean => "mean",
            ReduceOp::Variance => "variance",
        }
    }

    fn apply(self, values: impl Iterator<Item = f64> + Clone, n: usize) -> f64 {
        let n = n as f64;
        match self {
            ReduceOp::Sum => values.sum(),
            ReduceOp::Mean => values.sum::<f64>() / n,
            ReduceOp::Variance => {
                let mean = values.clone().sum::<f64>() / n;
                values.map(|v| (v - mean) * (v - mean)).sum::<f64>() / n
            }
        }
    }
}

/// A dense n-dimensional array of `f64` values.
///
/// # Example
/// ```
/// use tessera_core::Tensor;
///
/// let a = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], (2, 2))?;
/// let b = Tensor::from_vec(vec![10.0, 20.0], 2)?;
/// let c = a.add(&b)?; // b broadcasts across rows
/// assert_eq!(c.as_slice(), &[11.0, 22.0, 13.0, 24.0]);
/// # Ok::<(), tessera_core::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Shape,
    data: Vec<f64>,
}

impl Tensor {
    // Creation

    /// Create a tensor from a flat row-major buffer.
    pub fn from_vec(data: Vec<f64>, shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();
        shape.validate()?;
        if data.len() != shape.elem_count() {
            return Err(Error::ElementCountMismatch {
                expected: shape.elem_count(),
                got: data.len(),
                shape,
            });
        }
        Ok(Tensor { shape, data })
    }

    pub fn from_slice(data: &[f64], shape: impl Into<Shape>) -> Result<Self> {
        Self::from_vec(data.to_vec(), shape)
    }

    /// A rank-0 tensor holding one value.
    pub fn scalar(value: f64) -> Self {
        Tensor {
            shape: Shape::scalar(),
            data: vec![value],
        }
    }

    /// Create a tensor filled with a constant value.
    pub fn full(shape: impl Into<Shape>, value: f64) -> Result<Self> {
        let shape = shape.into();
        shape.validate()?;
        let data = vec![value; shape.elem_count()];
        Ok(Tensor { shape, data })
    }

    pub fn zeros(shape: impl Into<Shape>) -> Result<Self> {
        Self::full(shape, 0.0)
    }

    pub fn ones(shape: impl Into<Shape>) -> Result<Self> {
        Self::full(shape, 1.0)
    }

    pub fn zeros_like(other: &Self) -> Self {
        Tensor {
            shape: other.shape.clone(),
            data: vec![0.0; other.data.len()],
        }
    }

    pub fn ones_like(other: &Self) -> Self {
        Tensor {
            shape: other.shape.clone(),
            data: vec![1.0; other.data.len()],
        }
    }

    /// Uniform samples in [0, 1).
    pub fn rand<R: Rng + ?Sized>(shape: impl Into<Shape>, rng: &mut R) -> Result<Self> {
        let shape = shape.into();
        shape.validate()?;
        let data = (0..shape.elem_count()).map(|_| rng.gen::<f64>()).collect();
        Ok(Tensor { shape, data })
    }

    /// Standard normal samples (mean 0, std 1).
    pub fn randn<R: Rng + ?Sized>(shape: impl Into<Shape>, rng: &mut R) -> Result<Self> {
        let shape = shape.into();
        shape.validate()?;
        let data = (0..shape.elem_count())
            .map(|_| rng.sample::<f64, _>(StandardNormal))
            .collect();
        Ok(Tensor { shape, data })
    }

    // Accessors

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn elem_count(&self) -> usize {
        self.data.len()
    }

    /// The row-major element buffer.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.data.clone()
    }

    /// Element at a multi-index.
    pub fn get(&self, index: &[usize]) -> Result<f64> {
        Ok(self.data[self.shape.index(index)?])
    }

    /// The single value of a one-element tensor.
    pub fn to_scalar(&self) -> Result<f64> {
        if self.data.len() != 1 {
            return Err(Error::ShapeMismatch {
                op: "to_scalar",
                lhs: self.shape.clone(),
                rhs: Shape::scalar(),
            });
        }
        Ok(self.data[0])
    }

    /// Same shape and every element within `tol`.
    pub fn all_close(&self, other: &Self, tol: f64) -> bool {
        self.shape == other.shape
            && self
                .data
                .iter()
                .zip(&other.data)
                .all(|(a, b)| (a - b).abs() <= tol)
    }

    // Element-wise unary

    /// Apply `f` to every element.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    pub fn neg(&self) -> Self {
        self.map(|v| -v)
    }

    pub fn exp(&self) -> Self {
        self.map(f64::exp)
    }

    pub fn log(&self) -> Self {
        self.map(f64::ln)
    }

    pub fn sqrt(&self) -> Self {
        self.map(f64::sqrt)
    }

    pub fn sigmoid(&self) -> Self {
        self.map(|v| 1.0 / (1.0 + (-v).exp()))
    }

    pub fn tanh(&self) -> Self {
        self.map(f64::tanh)
    }

    pub fn powf(&self, exponent: f64) -> Self {
        self.map(|v| v.powf(exponent))
    }

    /// `self * mul + add`, element-wise.
    pub fn affine(&self, mul: f64, add: f64) -> Self {
        self.map(|v| v * mul + add)
    }

    // Element-wise binary (broadcasting)

    /// Broadcast `self` and `rhs` against each other and combine them
    /// pairwise with `f`. `op` names the operation in shape errors.
    pub fn elementwise_binary(
        &self,
        rhs: &Self,
        op: &'static str,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<Self> {
        if self.shape == rhs.shape {
            let data = self.data.iter().zip(&rhs.data).map(|(&a, &b)| f(a, b)).collect();
            return Ok(Tensor {
                shape: self.shape.clone(),
                data,
            });
        }

        let out_shape =
            Shape::broadcast_shape(&self.shape, &rhs.shape).map_err(|_| Error::ShapeMismatch {
                op,
                lhs: self.shape.clone(),
                rhs: rhs.shape.clone(),
            })?;
        let lhs_offsets = broadcast_offsets(&self.shape, &out_shape)?;
        let rhs_offsets = broadcast_offsets(&rhs.shape, &out_shape)?;
        let data = lhs_offsets
            .iter()
            .zip(&rhs_offsets)
            .map(|(&l, &r)| f(self.data[l], rhs.data[r]))
            .collect();
        Ok(Tensor {
            shape: out_shape,
            data,
        })
    }

    pub fn add(&self, rhs: &Self) -> Result<Self> {
        self.elementwise_binary(rhs, "add", |a, b| a + b)
    }

    pub fn sub(&self, rhs: &Self) -> Result<Self> {
        self.elementwise_binary(rhs, "sub", |a, b| a - b)
    }

    pub fn mul(&self, rhs: &Self) -> Result<Self> {
        self.elementwise_binary(rhs, "mul", |a, b| a * b)
    }

    pub fn div(&self, rhs: &Self) -> Result<Self> {
        self.elementwise_binary(rhs, "div", |a, b| a / b)
    }

    /// In-place `self += rhs`. Shapes must match exactly; gradient
    /// accumulation is the only caller.
    pub fn add_assign(&mut self, rhs: &Self) -> Result<()> {
        if self.shape != rhs.shape {
            return Err(Error::ShapeMismatch {
                op: "add_assign",
                lhs: self.shape.clone(),
                rhs: rhs.shape.clone(),
            });
        }
        for (a, b) in self.data.iter_mut().zip(&rhs.data) {
            *a += b;
        }
        Ok(())
    }

    // Reductions

    /// Collapse `axis` (negative counts from the end) with `op`.
    ///
    /// With `keepdims` the reduced axis stays with size 1; otherwise it is
    /// removed and the following axes shift down.
    pub fn reduce(&self, axis: isize, op: ReduceOp, keepdims: bool) -> Result<Self> {
        let axis = self.shape.normalize_axis(axis)?;
        let dims = self.dims();
        let outer: usize = dims[..axis].iter().product();
        let n = dims[axis];
        let inner: usize = dims[axis + 1..].iter().product();

        let mut data = Vec::with_capacity(outer * inner);
        for o in 0..outer {
            let base = o * n * inner;
            for i in 0..inner {
                let lane = (0..n).map(|k| self.data[base + k * inner + i]);
                data.push(op.apply(lane, n));
            }
        }
        Ok(Tensor {
            shape: self.shape.reduced(axis, keepdims)?,
            data,
        })
    }

    pub fn sum(&self, axis: isize, keepdims: bool) -> Result<Self> {
        self.reduce(axis, ReduceOp::Sum, keepdims)
    }

    pub fn mean(&self, axis: isize, keepdims: bool) -> Result<Self> {
        self.reduce(axis, ReduceOp::Mean, keepdims)
    }

    pub fn variance(&self, axis: isize, keepdims: bool) -> Result<Self> {
        self.reduce(axis, ReduceOp::Variance, keepdims)
    }

    /// Reduce every element with `op` into a rank-0 tensor.
    pub fn reduce_all(&self, op: ReduceOp) -> Self {
        Tensor::scalar(op.apply(self.data.iter().copied(), self.data.len()))
    }

    pub fn sum_all(&self) -> Self {
        self.reduce_all(ReduceOp::Sum)
    }

    pub fn mean_all(&self) -> Self {
        self.reduce_all(ReduceOp::Mean)
    }

    /// Sum over the axes along which `target` would have been broadcast to
    /// produce `self`, then reshape to `target`. Inverse of `broadcast_to`
    /// for gradients.
    pub fn sum_to(&self, target: &Shape) -> Result<Self> {
        if &self.shape == target {
            return Ok(self.clone());
        }
        if !target.is_broadcastable_to(&self.shape) {
            return Err(Error::ShapeMismatch {
                op: "sum_to",
                lhs: self.shape.clone(),
                rhs: target.clone(),
            });
        }
        // Highest axis first keeps the remaining indices stable.
        let mut result = self.clone();
        for &axis in target.broadcast_axes(&self.shape)?.iter().rev() {
            result = result.sum(axis as isize, true)?;
        }
        result.reshape(target)
    }

    // Shape transforms

    /// Same data, new shape. Element counts must agree.
    pub fn reshape(&self, shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();
        shape.validate()?;
        if shape.elem_count() != self.elem_count() {
            return Err(Error::ShapeMismatch {
                op: "reshape",
                lhs: self.shape.clone(),
                rhs: shape,
            });
        }
        Ok(Tensor {
            shape,
            data: self.data.clone(),
        })
    }

    /// Stretch size-1 and missing leading axes to `target`.
    pub fn broadcast_to(&self, target: impl Into<Shape>) -> Result<Self> {
        let target = target.into();
        target.validate()?;
        if !self.shape.is_broadcastable_to(&target) {
            return Err(Error::ShapeMismatch {
                op: "broadcast_to",
                lhs: self.shape.clone(),
                rhs: target,
            });
        }
        let data = broadcast_offsets(&self.shape, &target)?
            .into_iter()
            .map(|o| self.data[o])
            .collect();
        Ok(Tensor {
            shape: target,
            data,
        })
    }

    /// Swap the last two axes.
    pub fn transpose(&self) -> Result<Self> {
        if self.rank() < 2 {
            return Err(Error::RankMismatch {
                op: "transpose",
                expected: 2,
                got: self.rank(),
            });
        }
        let r = self.rank();
        let (m, n) = (self.dims()[r - 2], self.dims()[r - 1]);
        let batch = self.elem_count() / (m * n);

        let mut data = vec![0.0; self.elem_count()];
        for b in 0..batch {
            let base = b * m * n;
            for i in 0..m {
                for j in 0..n {
                    data[base + j * m + i] = self.data[base + i * n + j];
                }
            }
        }
        let mut dims = self.dims().to_vec();
        dims.swap(r - 2, r - 1);
        Ok(Tensor {
            shape: Shape::new(dims),
            data,
        })
    }

    // Matrix multiplication

    /// Matrix multiplication: self @ rhs.
    ///
    /// - [m, k] @ [k, n] → [m, n]
    /// - Batched: [b, m, k] @ [b, k, n] → [b, m, n] (leading dims must match)
    ///
    /// Output rows are computed in parallel.
    pub fn matmul(&self, rhs: &Self) -> Result<Self> {
        if self.rank() < 2 || rhs.rank() < 2 {
            return Err(Error::RankMismatch {
                op: "matmul",
                expected: 2,
                got: self.rank().min(rhs.rank()),
            });
        }
        let lhs_dims = self.dims();
        let rhs_dims = rhs.dims();
        let (lr, rr) = (lhs_dims.len(), rhs_dims.len());
        let (m, k) = (lhs_dims[lr - 2], lhs_dims[lr - 1]);
        let (k2, n) = (rhs_dims[rr - 2], rhs_dims[rr - 1]);
        if k != k2 || lhs_dims[..lr - 2] != rhs_dims[..rr - 2] {
            return Err(Error::ShapeMismatch {
                op: "matmul",
                lhs: self.shape.clone(),
                rhs: rhs.shape.clone(),
            });
        }

        let a = &self.data;
        let b = &rhs.data;
        let mut data = vec![0.0f64; self.elem_count() / k * n];
        data.par_chunks_mut(n).enumerate().for_each(|(row, out)| {
            let batch = row / m;
            let a_row = &a[row * k..(row + 1) * k];
            let b_mat = &b[batch * k * n..(batch + 1) * k * n];
            for (p, &a_val) in a_row.iter().enumerate() {
                let b_row = &b_mat[p * n..(p + 1) * n];
                for (o, &b_val) in out.iter_mut().zip(b_row) {
                    *o += a_val * b_val;
                }
            }
        });

        let mut dims = lhs_dims[..lr - 2].to_vec();
        dims.push(m);
        dims.push(n);
        Ok(Tensor {
            shape: Shape::new(dims),
            data,
        })
    }
}

/// For each element of `target` (row-major), the flat offset of the
/// element of a `source`-shaped buffer it reads after broadcasting.
fn broadcast_offsets(source: &Shape, target: &Shape) -> Result<Vec<usize>> {
    let strides = source.broadcast_strides(target)?;
    let dims = target.dims();
    let total = target.elem_count();
    let mut offsets = Vec::with_capacity(total);
    let mut index = vec![0usize; dims.len()];
    let mut offset = 0usize;
    for _ in 0..total {
        offsets.push(offset);
        // Odometer increment, last axis fastest.
        for d in (0..dims.len()).rev() {
            index[d] += 1;
            offset += strides[d];
            if index[d] < dims[d] {
                break;
            }
            offset -= strides[d] * dims[d];
            index[d] = 0;
        }
    }
    Ok(offsets)
}
