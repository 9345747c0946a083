use crate::error::Result;
use crate::op::{check_arity, check_grad_shape, saved, unforwarded, Operation};
use crate::shape::Shape;
use crate::tensor::{ReduceOp, Tensor};

#[derive(Debug)]
struct ReduceSaved {
    input_shape: Shape,
    out_shape: Shape,
    /// Normalized axis, `None` for a reduction over every element.
    axis: Option<usize>,
    /// Number of elements folded into each output element.
    n: usize,
    /// Input and its keepdims mean, kept only for variance.
    centered: Option<(Tensor, Tensor)>,
}

/// Sum, mean or variance along one axis, or over all elements.
#[derive(Debug)]
pub struct Reduce {
    op: ReduceOp,
    axis: Option<isize>,
    keepdims: bool,
    saved: Option<ReduceSaved>,
}

impl Reduce {
    /// Reduce along `axis` (negative counts from the end).
    pub fn along(op: ReduceOp, axis: isize, keepdims: bool) -> Self {
        Reduce {
            op,
            axis: Some(axis),
            keepdims,
            saved: None,
        }
    }

    /// Reduce every element into a rank-0 tensor.
    pub fn all(op: ReduceOp) -> Self {
        Reduce {
            op,
            axis: None,
            keepdims: false,
            saved: None,
        }
    }
}

impl Operation for Reduce {
    fn name(&self) -> &'static str {
        self.op.name()
    }

    fn arity(&self) -> usize {
        1
    }

    fn forward(&mut self, inputs: &[&Tensor]) -> Result<Tensor> {
        check_arity(self, inputs.len())?;
        unforwarded(&self.saved, self.name())?;
        let x = inputs[0];
        let (out, axis, n) = match self.axis {
            Some(axis) => {
                let axis = x.shape().normalize_axis(axis)?;
                let out = x.reduce(axis as isize, self.op, self.keepdims)?;
                (out, Some(axis), x.dims()[axis])
            }
            None => (x.reduce_all(self.op), None, x.elem_count()),
        };
        let centered = match (self.op, axis) {
            (ReduceOp::Variance, Some(axis)) => {
                Some((x.clone(), x.mean(axis as isize, true)?))
            }
            (ReduceOp::Variance, None) => Some((x.clone(), x.mean_all())),
            _ => None,
        };
        self.saved = Some(ReduceSaved {
            input_shape: x.shape().clone(),
            out_shape: out.shape().clone(),
            axis,
            n,
            centered,
        });
        Ok(out)
    }

    fn backward(&self, grad_output: &Tensor) -> Result<Vec<Tensor>> {
        let s = saved(&self.saved, self.name())?;
        check_grad_shape(self.name(), grad_output, &s.out_shape)?;

        // Put the reduced axis back with size 1, then stretch the gradient
        // over it: every input element contributed to its output element.
        let kept = match s.axis {
            Some(axis) => s.input_shape.reduced(axis, true)?,
            None => Shape::new(vec![1; s.input_shape.rank()]),
        };
        let expanded = grad_output.reshape(kept)?.broadcast_to(&s.input_shape)?;
        let n = s.n as f64;

        let grad = match (self.op, &s.centered) {
            (ReduceOp::Sum, _) => expanded,
            (ReduceOp::Mean, _) => expanded.affine(1.0 / n, 0.0),
            // d var / dx_i = 2 (x_i - μ) / n
            (ReduceOp::Variance, Some((x, mean))) => {
                expanded.mul(&x.sub(mean)?)?.affine(2.0 / n, 0.0)
            }
            (ReduceOp::Variance, None) => {
                crate::bail!("variance: input was not saved during forward")
            }
        };
        Ok(vec![grad])
    }
}
