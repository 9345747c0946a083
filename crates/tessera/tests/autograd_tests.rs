// Integration tests for the autograd engine
//
// These tests drive the Graph end to end: building forward passes from
// leaves, running backward, and checking the resulting gradients against
// hand-derived values and central differences.

use rand::rngs::StdRng;
use rand::SeedableRng;
use tessera::grad_check::check_gradients;
use tessera::ops::{Binary, BinaryOp};
use tessera::prelude::*;
use tessera::GraphMark;

fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() < tol
}

fn assert_vec_approx(got: &[f64], expected: &[f64], tol: f64) {
    assert_eq!(
        got.len(),
        expected.len(),
        "length mismatch: {} vs {}",
        got.len(),
        expected.len()
    );
    for (i, (g, e)) in got.iter().zip(expected.iter()).enumerate() {
        assert!(
            approx_eq(*g, *e, tol),
            "index {}: got {} expected {} (tol {})",
            i,
            g,
            e,
            tol
        );
    }
}

fn grad_vec(g: &Graph, id: VarId) -> tessera::Result<Vec<f64>> {
    match g.grad(id)? {
        Some(t) => Ok(t.to_vec()),
        None => Err(Error::msg("missing gradient")),
    }
}

fn grad_scalar(g: &Graph, id: VarId) -> tessera::Result<f64> {
    match g.grad(id)? {
        Some(t) => t.to_scalar(),
        None => Err(Error::msg("missing gradient")),
    }
}

// Concrete scenarios

#[test]
fn test_add_scalars() -> tessera::Result<()> {
    let mut g = Graph::new();
    let x = g.leaf(Tensor::from_vec(vec![2.0], 1)?);
    let y = g.leaf(Tensor::from_vec(vec![3.0], 1)?);
    let z = g.add(x, y)?;
    g.backward(z)?;

    assert_eq!(g.value(z)?.as_slice(), &[5.0]);
    assert_eq!(grad_vec(&g, x)?, vec![1.0]);
    assert_eq!(grad_vec(&g, y)?, vec![1.0]);
    Ok(())
}

#[test]
fn test_add_then_mul() -> tessera::Result<()> {
    let mut g = Graph::new();
    let a = g.named_leaf("a", Tensor::scalar(1.0));
    let b = g.named_leaf("b", Tensor::scalar(2.0));
    let c = g.named_leaf("c", Tensor::scalar(3.0));
    let temp = g.add(a, b)?;
    let result = g.mul(temp, c)?;
    assert_eq!(g.value(result)?.to_scalar()?, 9.0);

    g.backward(result)?;
    assert_eq!(grad_scalar(&g, c)?, 3.0);
    assert_eq!(grad_scalar(&g, a)?, 3.0);
    assert_eq!(grad_scalar(&g, b)?, 3.0);
    assert_eq!(grad_scalar(&g, result)?, 1.0);
    Ok(())
}

#[test]
fn test_non_scalar_terminal_seeded_with_ones() -> tessera::Result<()> {
    let mut g = Graph::new();
    let x = g.leaf(Tensor::from_vec(vec![1.0, 2.0, 3.0], 3)?);
    let y = g.powf(x, 2.0)?;
    g.backward(y)?;
    assert_eq!(g.grad(y)?.map(|t| t.to_vec()), Some(vec![1.0; 3]));
    assert_vec_approx(&grad_vec(&g, x)?, &[2.0, 4.0, 6.0], 1e-12);
    Ok(())
}

// Fan-out and diamonds

#[test]
fn test_fan_out_accumulates_both_branches() -> tessera::Result<()> {
    // y = exp(x) + x^3, dy/dx = exp(x) + 3x^2
    let mut g = Graph::new();
    let x = g.leaf(Tensor::scalar(0.7));
    let f = g.exp(x)?;
    let h = g.powf(x, 3.0)?;
    let y = g.add(f, h)?;
    g.backward(y)?;

    let expected = 0.7f64.exp() + 3.0 * 0.7 * 0.7;
    assert!(approx_eq(grad_scalar(&g, x)?, expected, 1e-12));
    Ok(())
}

#[test]
fn test_diamond_with_uneven_depths() -> tessera::Result<()> {
    // Long branch: x → exp → tanh → (gen 2), short branch: x → neg (gen 1).
    // Both reconverge in a mul (gen 3). x's gradient must collect both.
    let mut g = Graph::new();
    let x = g.leaf(Tensor::scalar(0.3));
    let e = g.exp(x)?;
    let t = g.tanh(e)?;
    let n = g.neg(x)?;
    let y = g.mul(t, n)?;
    assert_eq!(g.generation(y)?, 3);
    g.backward(y)?;

    // y = -x tanh(e^x)
    // dy/dx = -tanh(e^x) - x (1 - tanh²(e^x)) e^x
    let xv: f64 = 0.3;
    let th = xv.exp().tanh();
    let expected = -th - xv * (1.0 - th * th) * xv.exp();
    assert!(approx_eq(grad_scalar(&g, x)?, expected, 1e-12));
    Ok(())
}

#[test]
fn test_shared_intermediate_processed_once() -> tessera::Result<()> {
    // s = a * b feeds three consumers; its creator must run after all three
    // have deposited their contributions, and exactly once.
    let mut g = Graph::new();
    let a = g.leaf(Tensor::scalar(2.0));
    let b = g.leaf(Tensor::scalar(5.0));
    let s = g.mul(a, b)?;
    let p = g.add(s, s)?;
    let q = g.mul(p, s)?;
    g.backward(q)?;

    // q = 2 s², dq/ds = 4s = 40, da = 40 b, db = 40 a
    assert_eq!(grad_scalar(&g, s)?, 40.0);
    assert_eq!(grad_scalar(&g, a)?, 200.0);
    assert_eq!(grad_scalar(&g, b)?, 80.0);
    Ok(())
}

// Un-broadcast

#[test]
fn test_unbroadcast_column_in_add() -> tessera::Result<()> {
    let mut g = Graph::new();
    let col = g.leaf(Tensor::from_vec(vec![1.0, 2.0, 3.0], (3, 1))?);
    let m = g.leaf(Tensor::zeros((3, 4))?);
    let y = g.add(col, m)?;
    assert_eq!(g.value(y)?.dims(), &[3, 4]);

    let upstream = Tensor::from_vec((0..12).map(|v| v as f64).collect(), (3, 4))?;
    g.accumulate_grad(y, upstream)?;
    g.backward(y)?;

    let grad = g.grad(col)?.ok_or_else(|| Error::msg("missing gradient"))?;
    assert_eq!(grad.dims(), &[3, 1]);
    assert_eq!(grad.as_slice(), &[6.0, 22.0, 38.0]);
    assert_eq!(g.grad(m)?.map(|t| t.dims().to_vec()), Some(vec![3, 4]));
    Ok(())
}

#[test]
fn test_bias_broadcast_over_batch() -> tessera::Result<()> {
    // y = x @ w + b, b: [3] broadcast over a batch of 4 rows
    let mut g = Graph::new();
    let x = g.leaf(Tensor::ones((4, 2))?);
    let w = g.leaf(Tensor::ones((2, 3))?);
    let b = g.leaf(Tensor::zeros(3)?);
    let xw = g.matmul(x, w)?;
    let y = g.add(xw, b)?;
    let loss = g.sum_all(y)?;
    g.backward(loss)?;

    assert_eq!(grad_vec(&g, b)?, vec![4.0; 3]);
    assert_eq!(grad_vec(&g, w)?, vec![4.0; 6]);
    assert_eq!(grad_vec(&g, x)?, vec![3.0; 8]);
    Ok(())
}

// Gradient checks for every built-in operation

fn rng() -> StdRng {
    StdRng::seed_from_u64(42)
}

/// Uniform in [0.5, 1.5), away from the poles of log, sqrt and div.
fn positive(shape: impl Into<Shape>, rng: &mut StdRng) -> tessera::Result<Tensor> {
    Ok(Tensor::rand(shape, rng)?.affine(1.0, 0.5))
}

fn check<F>(build: F, inputs: &[Tensor]) -> tessera::Result<()>
where
    F: Fn(&mut Graph, &[VarId]) -> tessera::Result<VarId>,
{
    let report = check_gradients(build, inputs, &GradCheckConfig::default())?;
    assert_eq!(report.per_input.len(), inputs.len());
    assert!(report.max_abs_error < 1e-4);
    Ok(())
}

/// Multiply by fixed random weights before the implicit sum, so linear
/// ops see a non-uniform upstream gradient.
fn weighted(g: &mut Graph, out: VarId, weights: &Tensor) -> tessera::Result<VarId> {
    let w = g.leaf(weights.clone());
    g.mul(out, w)
}

#[test]
fn test_grad_check_binary_broadcasting() -> tessera::Result<()> {
    let mut rng = rng();
    let a = Tensor::randn((3, 1), &mut rng)?;
    let b = positive(4, &mut rng)?;
    for op in [BinaryOp::Add, BinaryOp::Sub, BinaryOp::Mul, BinaryOp::Div] {
        let w = Tensor::randn((3, 4), &mut rng)?;
        check(
            |g, v| {
                let out = g.apply(Binary::new(op), &[v[0], v[1]])?;
                weighted(g, out, &w)
            },
            &[a.clone(), b.clone()],
        )?;
    }
    Ok(())
}

#[test]
fn test_grad_check_unary() -> tessera::Result<()> {
    let mut rng = rng();
    let x = Tensor::randn((2, 3), &mut rng)?;
    let p = positive((2, 3), &mut rng)?;
    check(|g, v| g.neg(v[0]), &[x.clone()])?;
    check(|g, v| g.exp(v[0]), &[x.clone()])?;
    check(|g, v| g.sigmoid(v[0]), &[x.clone()])?;
    check(|g, v| g.tanh(v[0]), &[x.clone()])?;
    check(|g, v| g.powf(v[0], 3.0), &[x])?;
    check(|g, v| g.log(v[0]), &[p.clone()])?;
    check(|g, v| g.sqrt(v[0]), &[p.clone()])?;
    check(|g, v| g.powf(v[0], -1.5), &[p])?;
    Ok(())
}

#[test]
fn test_grad_check_matmul() -> tessera::Result<()> {
    let mut rng = rng();
    let a = Tensor::randn((3, 4), &mut rng)?;
    let b = Tensor::randn((4, 2), &mut rng)?;
    let w = Tensor::randn((3, 2), &mut rng)?;
    check(
        |g, v| {
            let out = g.matmul(v[0], v[1])?;
            weighted(g, out, &w)
        },
        &[a, b],
    )
}

#[test]
fn test_grad_check_batched_matmul() -> tessera::Result<()> {
    let mut rng = rng();
    let a = Tensor::randn((2, 3, 4), &mut rng)?;
    let b = Tensor::randn((2, 4, 5), &mut rng)?;
    let w = Tensor::randn((2, 3, 5), &mut rng)?;
    check(
        |g, v| {
            let out = g.matmul(v[0], v[1])?;
            weighted(g, out, &w)
        },
        &[a, b],
    )
}

#[test]
fn test_grad_check_reductions() -> tessera::Result<()> {
    let mut rng = rng();
    let x = Tensor::randn((3, 4), &mut rng)?;
    let w_rows = Tensor::randn(3, &mut rng)?;
    let w_kept = Tensor::randn((1, 4), &mut rng)?;

    check(
        |g, v| {
            let s = g.sum(v[0], 1, false)?;
            weighted(g, s, &w_rows)
        },
        &[x.clone()],
    )?;
    check(
        |g, v| {
            let m = g.mean(v[0], 0, true)?;
            weighted(g, m, &w_kept)
        },
        &[x.clone()],
    )?;
    check(
        |g, v| {
            let var = g.variance(v[0], -1, false)?;
            weighted(g, var, &w_rows)
        },
        &[x.clone()],
    )?;
    check(
        |g, v| {
            let var = g.variance(v[0], 0, true)?;
            weighted(g, var, &w_kept)
        },
        &[x.clone()],
    )?;
    check(
        |g, v| {
            let sq = g.powf(v[0], 2.0)?;
            g.mean_all(sq)
        },
        &[x],
    )?;
    Ok(())
}

#[test]
fn test_grad_check_shape_ops() -> tessera::Result<()> {
    let mut rng = rng();
    let x = Tensor::randn((2, 3), &mut rng)?;
    let col = Tensor::randn((3, 1), &mut rng)?;
    let w6 = Tensor::randn((3, 2), &mut rng)?;
    let wb = Tensor::randn((2, 3, 4), &mut rng)?;

    check(
        |g, v| {
            let r = g.reshape(v[0], (3, 2))?;
            weighted(g, r, &w6)
        },
        &[x.clone()],
    )?;
    check(
        |g, v| {
            let t = g.transpose(v[0])?;
            weighted(g, t, &w6)
        },
        &[x],
    )?;
    check(
        |g, v| {
            let b = g.broadcast_to(v[0], (2, 3, 4))?;
            weighted(g, b, &wb)
        },
        &[col],
    )?;
    Ok(())
}

#[test]
fn test_grad_check_composite_layer() -> tessera::Result<()> {
    // Layer-norm-like composite: (x - mean) / sqrt(var + c), then sigmoid
    let mut rng = rng();
    let x = Tensor::randn((4, 5), &mut rng)?;
    let w = Tensor::randn((5, 3), &mut rng)?;
    check(
        |g, v| {
            let mu = g.mean(v[0], -1, true)?;
            let centered = g.sub(v[0], mu)?;
            let var = g.variance(v[0], -1, true)?;
            let c = g.leaf(Tensor::scalar(1e-1));
            let shifted = g.add(var, c)?;
            let std = g.sqrt(shifted)?;
            let normed = g.div(centered, std)?;
            let h = g.matmul(normed, v[1])?;
            g.sigmoid(h)
        },
        &[x, w],
    )
}

// Custom operations

/// f(x) = x³ with a hand-written backward rule.
#[derive(Debug, Default)]
struct Cube {
    input: Option<Tensor>,
}

impl Operation for Cube {
    fn name(&self) -> &'static str {
        "cube"
    }

    fn arity(&self) -> usize {
        1
    }

    fn forward(&mut self, inputs: &[&Tensor]) -> tessera::Result<Tensor> {
        self.input = Some(inputs[0].clone());
        Ok(inputs[0].powf(3.0))
    }

    fn backward(&self, grad_output: &Tensor) -> tessera::Result<Vec<Tensor>> {
        let x = self
            .input
            .as_ref()
            .ok_or(Error::NotForwarded { op: self.name() })?;
        Ok(vec![grad_output.mul(&x.powf(2.0).affine(3.0, 0.0))?])
    }
}

#[test]
fn test_custom_operation() -> tessera::Result<()> {
    let mut g = Graph::new();
    let x = g.leaf(Tensor::from_vec(vec![1.0, -2.0], 2)?);
    let y = g.apply(Cube::default(), &[x])?;
    let creator = g.creator(y)?.ok_or_else(|| Error::msg("expected a creator"))?;
    assert_eq!(g.op_name(creator)?, Some("cube"));
    assert_eq!(g.inputs(creator)?, &[x]);

    g.backward(y)?;
    assert_eq!(grad_vec(&g, x)?, vec![3.0, 12.0]);

    let mut rng = rng();
    check(
        |g, v| g.apply(Cube::default(), &[v[0]]),
        &[Tensor::randn(5, &mut rng)?],
    )
}

/// Returns a gradient of the wrong shape.
#[derive(Debug, Default)]
struct BadShapeGrad;

impl Operation for BadShapeGrad {
    fn name(&self) -> &'static str {
        "bad_shape_grad"
    }

    fn arity(&self) -> usize {
        1
    }

    fn forward(&mut self, inputs: &[&Tensor]) -> tessera::Result<Tensor> {
        Ok(inputs[0].clone())
    }

    fn backward(&self, _grad_output: &Tensor) -> tessera::Result<Vec<Tensor>> {
        Ok(vec![Tensor::ones((7, 7))?])
    }
}

/// Returns two gradients for its single input.
#[derive(Debug, Default)]
struct TooManyGrads;

impl Operation for TooManyGrads {
    fn name(&self) -> &'static str {
        "too_many_grads"
    }

    fn arity(&self) -> usize {
        1
    }

    fn forward(&mut self, inputs: &[&Tensor]) -> tessera::Result<Tensor> {
        Ok(inputs[0].clone())
    }

    fn backward(&self, grad_output: &Tensor) -> tessera::Result<Vec<Tensor>> {
        Ok(vec![grad_output.clone(), grad_output.clone()])
    }
}

// Failure semantics

#[test]
fn test_arity_error_creates_no_edge() -> tessera::Result<()> {
    let mut g = Graph::new();
    let x = g.leaf(Tensor::scalar(1.0));
    let before = (g.var_count(), g.op_count());

    let err = g.apply(Binary::new(BinaryOp::Add), &[x]).unwrap_err();
    assert!(err.is_arity_error());
    assert_eq!((g.var_count(), g.op_count()), before);
    Ok(())
}

#[test]
fn test_shape_error_in_forward_creates_no_edge() -> tessera::Result<()> {
    let mut g = Graph::new();
    let a = g.leaf(Tensor::ones((2, 3))?);
    let b = g.leaf(Tensor::ones((4, 5))?);
    let before = (g.var_count(), g.op_count());

    assert!(g.add(a, b).unwrap_err().is_shape_error());
    assert!(g.matmul(a, a).unwrap_err().is_shape_error());
    assert!(g.reshape(a, 5).unwrap_err().is_shape_error());
    assert!(g.sum(a, 2, false).unwrap_err().is_index_error());
    assert_eq!((g.var_count(), g.op_count()), before);
    Ok(())
}

#[test]
fn test_backward_shape_error_leaves_graph_untouched() -> tessera::Result<()> {
    let mut g = Graph::new();
    let x = g.leaf(Tensor::ones(3)?);
    let y = g.exp(x)?;
    let z = g.apply(BadShapeGrad, &[y])?;
    let w = g.sum_all(z)?;

    let err = g.backward(w).unwrap_err();
    assert!(err.is_shape_error());
    for id in [x, y, z, w] {
        assert!(g.grad(id)?.is_none());
    }
    assert!(g.creator(w)?.is_some());
    assert!(g.creator(z)?.is_some());
    Ok(())
}

#[test]
fn test_backward_wrong_gradient_count_is_arity_error() -> tessera::Result<()> {
    let mut g = Graph::new();
    let x = g.leaf(Tensor::ones(3)?);
    let y = g.apply(TooManyGrads, &[x])?;

    assert!(g.backward(y).unwrap_err().is_arity_error());
    assert!(g.grad(x)?.is_none());
    assert!(g.grad(y)?.is_none());
    Ok(())
}

// Repeated backward passes

#[test]
fn test_second_backward_is_noop() -> tessera::Result<()> {
    let mut g = Graph::new();
    let x = g.leaf(Tensor::scalar(3.0));
    let y = g.mul(x, x)?;
    let creator = g.creator(y)?.ok_or_else(|| Error::msg("expected a creator"))?;
    g.backward(y)?;
    assert_eq!(grad_scalar(&g, x)?, 6.0);

    // The pass released the operation but kept the creator link.
    assert_eq!(g.creator(y)?, Some(creator));
    assert_eq!(g.op_name(creator)?, None);
    assert_eq!(g.inputs(creator)?, &[x, x]);

    g.backward(y)?;
    assert_eq!(grad_scalar(&g, x)?, 6.0);

    // Without its gradient the terminal would need the released state.
    g.zero_grad(y)?;
    let err = g.backward(y).unwrap_err();
    assert!(matches!(err, Error::GraphReleased { .. }));
    assert_eq!(grad_scalar(&g, x)?, 6.0);
    Ok(())
}

fn two_heads(g: &mut Graph) -> tessera::Result<(VarId, VarId, VarId)> {
    // y = exp(x) at x = 0, a = 2y, b = 3y
    let x = g.leaf(Tensor::scalar(0.0));
    let y = g.exp(x)?;
    let two = g.leaf(Tensor::scalar(2.0));
    let three = g.leaf(Tensor::scalar(3.0));
    let a = g.mul(y, two)?;
    let b = g.mul(y, three)?;
    Ok((x, a, b))
}

#[test]
fn test_released_shared_subgraph_is_an_error() -> tessera::Result<()> {
    let mut g = Graph::new();
    let (x, a, b) = two_heads(&mut g)?;
    g.backward(a)?;
    assert_eq!(grad_scalar(&g, x)?, 2.0);

    // b shares exp(x) with a, and a's pass released it.
    let err = g.backward(b).unwrap_err();
    assert!(matches!(err, Error::GraphReleased { .. }));
    assert!(err.is_lifecycle_error());
    assert_eq!(grad_scalar(&g, x)?, 2.0);
    assert!(g.grad(b)?.is_none());
    Ok(())
}

#[test]
fn test_retained_shared_subgraph_serves_both_heads() -> tessera::Result<()> {
    let mut g = Graph::new();
    let (x, a, b) = two_heads(&mut g)?;
    g.backward_with(a, BackwardOptions { retain_graph: true })?;
    g.backward(b)?;
    assert_eq!(grad_scalar(&g, x)?, 5.0);
    Ok(())
}

#[test]
fn test_rebuilt_forward_accumulates() -> tessera::Result<()> {
    let mut g = Graph::new();
    let x = g.leaf(Tensor::scalar(3.0));
    for _ in 0..2 {
        let y = g.mul(x, x)?;
        g.backward(y)?;
    }
    assert_eq!(grad_scalar(&g, x)?, 12.0);
    Ok(())
}

#[test]
fn test_retain_graph_repeats_pass() -> tessera::Result<()> {
    let opts = BackwardOptions { retain_graph: true };

    let mut g = Graph::new();
    let x = g.leaf(Tensor::scalar(0.4));
    let a = g.exp(x)?;
    let y = g.mul(a, a)?;
    g.backward_with(y, opts)?;
    let once = grad_scalar(&g, x)?;
    assert!(approx_eq(once, 2.0 * (0.8f64).exp(), 1e-12));
    assert!(g.creator(y)?.is_some());

    // The second pass adds exactly one more contribution to every input,
    // even though the intermediate `a` already holds a gradient.
    g.backward_with(y, opts)?;
    assert!(approx_eq(grad_scalar(&g, x)?, 2.0 * once, 1e-12));
    assert_eq!(grad_scalar(&g, y)?, 1.0);
    Ok(())
}

#[test]
fn test_zero_grad_between_steps() -> tessera::Result<()> {
    let opts = BackwardOptions { retain_graph: true };
    let mut g = Graph::new();
    let x = g.leaf(Tensor::scalar(2.0));
    let y = g.powf(x, 2.0)?;
    g.backward_with(y, opts)?;
    g.zero_grads(&[x, y])?;
    assert!(g.grad(x)?.is_none());
    assert!(g.creator(y)?.is_some());

    g.backward_with(y, opts)?;
    assert_eq!(grad_scalar(&g, x)?, 4.0);

    g.zero_all_grads();
    assert!(g.grad(x)?.is_none());
    assert!(g.grad(y)?.is_none());
    Ok(())
}

// Training session arena

#[test]
fn test_gradient_descent_with_rewind() -> tessera::Result<()> {
    // Fit y = w * x with w* = 2 by plain gradient descent.
    let mut g = Graph::new();
    let w = g.named_leaf("w", Tensor::scalar(0.0));
    let xs = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], 4)?;
    let ys = xs.affine(2.0, 0.0);
    let session: GraphMark = g.mark();

    let mut losses = Vec::new();
    for _ in 0..50 {
        let x = g.leaf(xs.clone());
        let target = g.leaf(ys.clone());
        let pred = g.mul(w, x)?;
        let diff = g.sub(pred, target)?;
        let sq = g.powf(diff, 2.0)?;
        let loss = g.mean_all(sq)?;
        losses.push(g.value(loss)?.to_scalar()?);
        g.backward(loss)?;

        let step = g
            .grad(w)?
            .ok_or_else(|| Error::msg("w has no gradient"))?
            .affine(-0.02, 0.0);
        let updated = g.value(w)?.add(&step)?;
        g.set_value(w, updated)?;
        g.zero_grad(w)?;
        g.rewind(session);
    }

    assert_eq!(g.var_count(), 1);
    assert_eq!(g.name(w)?, Some("w"));
    assert!(losses.last() < losses.first());
    assert!(approx_eq(g.value(w)?.to_scalar()?, 2.0, 1e-3));
    Ok(())
}

fn session_step(
    g: &mut Graph,
    w: VarId,
    w2: VarId,
    opts: BackwardOptions,
) -> tessera::Result<f64> {
    let x = g.leaf(Tensor::scalar(1.0));
    let y = g.mul(w2, x)?;
    g.backward_with(y, opts)?;
    grad_scalar(g, w)
}

/// `w2 = w²` is built once before the session mark and reused by every
/// iteration. Returns w's gradient (or the error) for each iteration.
fn derived_parameter_session(
    opts: BackwardOptions,
) -> tessera::Result<Vec<tessera::Result<f64>>> {
    let mut g = Graph::new();
    let w = g.leaf(Tensor::scalar(3.0));
    let w2 = g.powf(w, 2.0)?;
    let mark = g.mark();

    let mut grads = Vec::new();
    for _ in 0..2 {
        grads.push(session_step(&mut g, w, w2, opts));
        g.zero_all_grads();
        g.rewind(mark);
    }
    Ok(grads)
}

#[test]
fn test_session_reusing_released_parameter_fails_loudly() -> tessera::Result<()> {
    let grads = derived_parameter_session(BackwardOptions::default())?;
    assert_eq!(grads[0].as_ref().ok(), Some(&6.0));
    assert!(matches!(grads[1], Err(Error::GraphReleased { .. })));
    Ok(())
}

#[test]
fn test_session_with_retained_parameter_graph() -> tessera::Result<()> {
    let grads = derived_parameter_session(BackwardOptions { retain_graph: true })?;
    for grad in grads {
        assert_eq!(grad?, 6.0);
    }
    Ok(())
}

#[test]
fn test_rewound_ids_are_rejected() -> tessera::Result<()> {
    let mut g = Graph::new();
    let mark = g.mark();
    let x = g.leaf(Tensor::scalar(1.0));
    g.rewind(mark);
    assert!(g.value(x).unwrap_err().is_index_error());
    assert!(g.backward(x).unwrap_err().is_index_error());
    Ok(())
}
