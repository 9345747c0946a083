// Operation: one differentiable step of the computation graph
//
// An Operation has a forward rule (input Tensors → output Tensor) and a
// backward rule (output gradient → one gradient per input). Each instance
// is a single graph edge-set, not a reusable kernel:
//
//   Unforwarded ──forward()──▶ Forwarded ──backward()* ──▶ (dropped)
//
// forward runs exactly once (Graph::apply takes the op by value) and saves
// whatever backward needs: operand values, pre-broadcast shapes, reduction
// divisors, cached means. backward is a pure function of the output
// gradient and that saved state, so it never touches the input Variables.
//
// GRADIENT RULES of the built-in catalog (see crate::ops):
//
//   Add:       grad_a = g,            grad_b = g
//   Sub:       grad_a = g,            grad_b = -g
//   Mul:       grad_a = g * b,        grad_b = g * a
//   Div:       grad_a = g / b,        grad_b = -g * a / b²
//   Mean(n):   grad_x = broadcast(g) / n
//   Var(n, μ): grad_x = broadcast(g) * 2 (x - μ) / n
//   MatMul:    grad_A = g @ Bᵀ,       grad_B = Aᵀ @ g
//
// Any binary op whose forward broadcast an operand must "un-broadcast" the
// gradient for that operand: sum over the stretched axes so the gradient
// has exactly the operand's original shape.

use std::fmt;

use crate::error::{Error, Result};
use crate::shape::Shape;
use crate::tensor::Tensor;

/// A differentiable computation step.
///
/// Implement this to register a custom operation with
/// [`Graph::apply`](crate::Graph::apply).
pub trait Operation: fmt::Debug + Send {
    /// Short name used in errors and traces.
    fn name(&self) -> &'static str;

    /// Number of inputs `forward` expects.
    fn arity(&self) -> usize;

    /// Compute the output value and save the state `backward` needs.
    ///
    /// Called exactly once, with exactly `arity()` inputs.
    fn forward(&mut self, inputs: &[&Tensor]) -> Result<Tensor>;

    /// Given the gradient of the output, return one gradient per input, in
    /// input order, each with its input's exact shape.
    fn backward(&self, grad_output: &Tensor) -> Result<Vec<Tensor>>;
}

/// Fail with an arity error unless `inputs` has `op.arity()` entries.
pub fn check_arity<O: Operation + ?Sized>(op: &O, got: usize) -> Result<()> {
    if got != op.arity() {
        return Err(Error::Arity {
            op: op.name(),
            expected: op.arity(),
            got,
        });
    }
    Ok(())
}

/// Fail unless the incoming output gradient has the shape forward produced.
pub fn check_grad_shape(op: &'static str, grad: &Tensor, expected: &Shape) -> Result<()> {
    if grad.shape() != expected {
        return Err(Error::ShapeMismatch {
            op,
            lhs: grad.shape().clone(),
            rhs: expected.clone(),
        });
    }
    Ok(())
}

/// Reduce a gradient back to the shape of an operand that was broadcast
/// during forward.
///
/// For example, if the operand was [3, 1] broadcast to [3, 4]:
///   grad is [3, 4], the operand's gradient must be [3, 1] → row sums
///
/// If the operand was [4] broadcast to [3, 4]:
///   grad is [3, 4], the operand's gradient must be [4] → sum over dim 0
pub fn unbroadcast(grad: &Tensor, target: &Shape) -> Result<Tensor> {
    if grad.shape() == target {
        return Ok(grad.clone());
    }
    grad.sum_to(target)
}

/// Fail unless `forward` has not run yet on this instance.
pub(crate) fn unforwarded<T>(state: &Option<T>, op: &'static str) -> Result<()> {
    match state {
        Some(_) => Err(Error::AlreadyForwarded { op }),
        None => Ok(()),
    }
}

/// Unwrap state saved by `forward`, or report that it never ran.
pub(crate) fn saved<'a, T>(state: &'a Option<T>, op: &'static str) -> Result<&'a T> {
    state.as_ref().ok_or(Error::NotForwarded { op })
}
