//! Central-difference gradient checking.
//!
//! Compares the gradients produced by the backward engine against
//! `(f(x + eps) - f(x - eps)) / 2eps`, one input element at a time.

use crate::error::{Error, Result};
use crate::graph::{Graph, VarId};
use crate::tensor::Tensor;

/// Step size and acceptance threshold for [`check_gradients`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradCheckConfig {
    pub eps: f64,
    /// Largest accepted absolute difference between analytic and numerical
    /// gradient elements.
    pub tolerance: f64,
}

impl Default for GradCheckConfig {
    fn default() -> Self {
        GradCheckConfig {
            eps: 1e-6,
            tolerance: 1e-4,
        }
    }
}

/// Outcome of a successful [`check_gradients`] run.
#[derive(Debug, Clone, PartialEq)]
pub struct GradCheckReport {
    /// Worst element-wise error over all inputs.
    pub max_abs_error: f64,
    /// Worst element-wise error for each input, in input order.
    pub per_input: Vec<f64>,
}

/// Numerical gradient of a scalar-valued function of several tensors.
///
/// Returns one tensor per input, shaped like that input.
pub fn numerical_grad<F>(mut f: F, inputs: &[Tensor], eps: f64) -> Result<Vec<Tensor>>
where
    F: FnMut(&[Tensor]) -> Result<f64>,
{
    let mut point = inputs.to_vec();
    let mut grads = Vec::with_capacity(inputs.len());
    for i in 0..inputs.len() {
        let mut grad = Vec::with_capacity(inputs[i].elem_count());
        for j in 0..inputs[i].elem_count() {
            let original = inputs[i].as_slice()[j];

            point[i] = perturbed(&inputs[i], j, original + eps)?;
            let f_plus = f(&point)?;
            point[i] = perturbed(&inputs[i], j, original - eps)?;
            let f_minus = f(&point)?;
            point[i] = inputs[i].clone();

            grad.push((f_plus - f_minus) / (2.0 * eps));
        }
        grads.push(Tensor::from_vec(grad, inputs[i].shape().clone())?);
    }
    Ok(grads)
}

fn perturbed(t: &Tensor, index: usize, value: f64) -> Result<Tensor> {
    let mut data = t.to_vec();
    data[index] = value;
    Tensor::from_vec(data, t.shape().clone())
}

/// Build a graph with `build` on fresh leaves holding `inputs`, reduce its
/// output with `sum_all`, and compare the backward gradients of every leaf
/// with central differences.
///
/// Fails with [`Error::Msg`] if any element differs by more than
/// `config.tolerance`.
pub fn check_gradients<F>(
    build: F,
    inputs: &[Tensor],
    config: &GradCheckConfig,
) -> Result<GradCheckReport>
where
    F: Fn(&mut Graph, &[VarId]) -> Result<VarId>,
{
    // Analytic
    let mut graph = Graph::new();
    let leaves: Vec<VarId> = inputs.iter().map(|t| graph.leaf(t.clone())).collect();
    let out = build(&mut graph, &leaves)?;
    let loss = graph.sum_all(out)?;
    graph.backward(loss)?;

    // Numerical
    let numeric = numerical_grad(
        |point| {
            let mut g = Graph::new();
            let ids: Vec<VarId> = point.iter().map(|t| g.leaf(t.clone())).collect();
            let out = build(&mut g, &ids)?;
            g.value(out)?.sum_all().to_scalar()
        },
        inputs,
        config.eps,
    )?;

    let mut per_input = Vec::with_capacity(inputs.len());
    for (i, (&leaf, expected)) in leaves.iter().zip(&numeric).enumerate() {
        // A leaf the output does not depend on has a zero gradient.
        let analytic = match graph.grad(leaf)? {
            Some(g) => g.clone(),
            None => Tensor::zeros_like(&inputs[i]),
        };
        let error = analytic
            .as_slice()
            .iter()
            .zip(expected.as_slice())
            .map(|(a, n)| (a - n).abs())
            .fold(0.0, f64::max);
        if !(error <= config.tolerance) {
            return Err(Error::msg(format!(
                "gradient check failed for input {i}: max error {error:e} exceeds tolerance {:e}",
                config.tolerance
            )));
        }
        per_input.push(error);
    }

    let max_abs_error = per_input.iter().copied().fold(0.0, f64::max);
    Ok(GradCheckReport {
        max_abs_error,
        per_input,
    })
}
