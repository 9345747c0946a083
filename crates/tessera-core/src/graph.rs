// Graph: Variable arena and reverse-mode backward engine
//
// Every Variable and every applied Operation lives in a Graph arena and is
// addressed by an integer id (VarId / OpId). Edges are ids, not pointers:
//
//   Variable ──creator──▶ OpNode ──inputs──▶ Variable, Variable, ...
//
// A Variable owns its value and gradient. An OpNode owns its Operation
// (with the state saved during forward) and the ids of its inputs. The same
// Variable may feed many OpNodes (fan-out), so the graph is a DAG.
//
// GENERATIONS:
//
//   leaf:    generation = 0
//   output:  generation = 1 + max(generation of inputs)
//
// Generations strictly increase along every edge, so popping pending
// operations highest-generation-first guarantees that every consumer of a
// Variable has deposited its gradient contribution before the operation
// that produced that Variable is processed. This is what makes diamonds
// and fan-out correct:
//
//        x (0)
//       /    \
//   a=f(x)  b=g(x)   (1)
//       \    /
//      y = a + b     (2)
//
//   pop add (gen 2) → grad a, grad b
//   pop f, g (gen 1, any order) → both contributions land in grad x
//
// TRANSACTIONAL BACKWARD:
//
// Gradients produced during a pass are staged in a side map and committed
// to the Variables only once every operation has succeeded. A shape error
// raised mid-pass leaves the graph exactly as it was.
//
// Each operation is handed the gradient its output received during the
// current pass, not the output's total accumulated gradient. The two differ
// only when an intermediate already holds a gradient (retain_graph or a
// manual accumulate_grad); earlier passes are never propagated again.
//
// GRAPH RELEASE:
//
// Unless BackwardOptions::retain_graph is set, a successful pass drops the
// Operation (and its saved state) of every node it processed. Creator links
// stay in place, so a later pass that reaches a released node fails with
// Error::GraphReleased instead of treating its output as a leaf:
//
//   y = exp(x); a = 2y; b = 3y
//   backward(a)   → releases mul(a) and exp
//   backward(b)   → mul(b) ok, exp released → GraphReleased
//
// A second backward() from the same terminal is a no-op: the terminal
// already carries its gradient and nothing new would flow. Rebuild the
// forward pass to differentiate again.

use std::collections::hash_map::Entry;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fmt;

use tracing::{debug, debug_span, trace};

use crate::bail;
use crate::error::{Error, Result};
use crate::op::{check_arity, Operation};
use crate::ops::{Binary, BinaryOp, BroadcastTo, MatMul, Reduce, Reshape, Transpose, Unary, UnaryOp};
use crate::shape::Shape;
use crate::tensor::{ReduceOp, Tensor};

/// Handle to a Variable in a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

impl VarId {
    /// Position in the arena.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Handle to an applied Operation in a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(usize);

impl OpId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A node of the computation graph: a value, its gradient, and the
/// operation that produced it.
#[derive(Debug)]
pub struct Variable {
    value: Tensor,
    grad: Option<Tensor>,
    creator: Option<OpId>,
    generation: usize,
    name: Option<String>,
}

impl Variable {
    pub fn value(&self) -> &Tensor {
        &self.value
    }

    /// Accumulated gradient, `None` until a backward pass reaches it.
    pub fn grad(&self) -> Option<&Tensor> {
        self.grad.as_ref()
    }

    /// The operation that produced this variable, `None` for leaves. The link
    /// survives graph release; see [`Graph::op_name`].
    pub fn creator(&self) -> Option<OpId> {
        self.creator
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_leaf(&self) -> bool {
        self.creator.is_none()
    }

    pub fn shape(&self) -> &Shape {
        self.value.shape()
    }
}

struct OpNode {
    /// `None` once released by a backward pass.
    op: Option<Box<dyn Operation>>,
    inputs: Vec<VarId>,
    output: VarId,
}

impl fmt::Debug for OpNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpNode")
            .field("op", &self.op.as_ref().map(|op| op.name()))
            .field("inputs", &self.inputs)
            .field("output", &self.output)
            .finish()
    }
}

/// Options for [`Graph::backward_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackwardOptions {
    /// Keep the saved state of every processed operation so the same graph
    /// can be differentiated again. Gradients keep accumulating across
    /// passes until [`Graph::zero_grad`] is called.
    pub retain_graph: bool,
}

/// Snapshot of the arena size, see [`Graph::mark`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphMark {
    vars: usize,
    ops: usize,
}

/// An operation waiting to be differentiated, ordered by the generation of
/// its output (then by id, so later operations win ties).
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Pending {
    generation: usize,
    op: OpId,
}

/// Arena of Variables and the Operations connecting them.
///
/// # Example
/// ```
/// use tessera_core::{Graph, Tensor};
///
/// let mut g = Graph::new();
/// let x = g.leaf(Tensor::scalar(2.0));
/// let y = g.leaf(Tensor::scalar(3.0));
/// let z = g.mul(x, y)?;
/// g.backward(z)?;
/// assert_eq!(g.grad(x)?.unwrap().to_scalar()?, 3.0);
/// assert_eq!(g.grad(y)?.unwrap().to_scalar()?, 2.0);
/// # Ok::<(), tessera_core::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct Graph {
    vars: Vec<Variable>,
    ops: Vec<OpNode>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    // Leaves

    /// Add an input or parameter Variable (generation 0, no creator).
    pub fn leaf(&mut self, value: Tensor) -> VarId {
        self.push_var(value, None, 0, None)
    }

    /// Like [`Graph::leaf`], with a name for diagnostics.
    pub fn named_leaf(&mut self, name: impl Into<String>, value: Tensor) -> VarId {
        self.push_var(value, None, 0, Some(name.into()))
    }

    fn push_var(
        &mut self,
        value: Tensor,
        creator: Option<OpId>,
        generation: usize,
        name: Option<String>,
    ) -> VarId {
        let id = VarId(self.vars.len());
        self.vars.push(Variable {
            value,
            grad: None,
            creator,
            generation,
            name,
        });
        id
    }

    // Edge creation

    /// Run `op` forward on the values of `inputs` and record the result as
    /// a new Variable created by `op`.
    ///
    /// Arity and shape errors are raised before anything is added to the
    /// graph.
    pub fn apply<O: Operation + 'static>(&mut self, op: O, inputs: &[VarId]) -> Result<VarId> {
        self.apply_boxed(Box::new(op), inputs)
    }

    pub fn apply_boxed(&mut self, mut op: Box<dyn Operation>, inputs: &[VarId]) -> Result<VarId> {
        check_arity(op.as_ref(), inputs.len())?;
        let mut values = Vec::with_capacity(inputs.len());
        let mut max_generation = 0;
        for &input in inputs {
            let var = self.var(input)?;
            values.push(&var.value);
            max_generation = max_generation.max(var.generation);
        }
        let value = op.forward(&values)?;
        let generation = max_generation + 1;

        let op_id = OpId(self.ops.len());
        let output = VarId(self.vars.len());
        trace!(
            op = op.name(),
            op_id = op_id.0,
            output = output.0,
            generation,
            "apply"
        );
        self.ops.push(OpNode {
            op: Some(op),
            inputs: inputs.to_vec(),
            output,
        });
        Ok(self.push_var(value, Some(op_id), generation, None))
    }

    // Accessors

    pub fn var(&self, id: VarId) -> Result<&Variable> {
        self.vars
            .get(id.0)
            .ok_or(Error::UnknownVariable { id: id.0 })
    }

    fn var_mut(&mut self, id: VarId) -> Result<&mut Variable> {
        self.vars
            .get_mut(id.0)
            .ok_or(Error::UnknownVariable { id: id.0 })
    }

    pub fn value(&self, id: VarId) -> Result<&Tensor> {
        Ok(&self.var(id)?.value)
    }

    pub fn grad(&self, id: VarId) -> Result<Option<&Tensor>> {
        Ok(self.var(id)?.grad.as_ref())
    }

    pub fn generation(&self, id: VarId) -> Result<usize> {
        Ok(self.var(id)?.generation)
    }

    pub fn creator(&self, id: VarId) -> Result<Option<OpId>> {
        Ok(self.var(id)?.creator)
    }

    pub fn name(&self, id: VarId) -> Result<Option<&str>> {
        Ok(self.var(id)?.name())
    }

    fn op_node(&self, id: OpId) -> Result<&OpNode> {
        self.ops
            .get(id.0)
            .ok_or(Error::UnknownOperation { id: id.0 })
    }

    /// Name of an applied operation, `None` if backward released it.
    pub fn op_name(&self, id: OpId) -> Result<Option<&'static str>> {
        Ok(self.op_node(id)?.op.as_ref().map(|op| op.name()))
    }

    /// The Variables an operation was applied to, in order.
    pub fn inputs(&self, id: OpId) -> Result<&[VarId]> {
        Ok(&self.op_node(id)?.inputs)
    }

    pub fn var_count(&self) -> usize {
        self.vars.len()
    }

    pub fn op_count(&self) -> usize {
        self.ops.len()
    }

    // Gradients and parameter updates

    /// Add `grad` to the Variable's gradient, or set it if there is none.
    /// `grad` must have the Variable's exact shape.
    pub fn accumulate_grad(&mut self, id: VarId, grad: Tensor) -> Result<()> {
        let var = self.var_mut(id)?;
        check_grad_fits(var, &grad)?;
        match &mut var.grad {
            Some(existing) => existing.add_assign(&grad)?,
            None => var.grad = Some(grad),
        }
        Ok(())
    }

    /// Clear the gradient. Creator links are untouched.
    pub fn zero_grad(&mut self, id: VarId) -> Result<()> {
        self.var_mut(id)?.grad = None;
        Ok(())
    }

    pub fn zero_grads(&mut self, ids: &[VarId]) -> Result<()> {
        for &id in ids {
            self.zero_grad(id)?;
        }
        Ok(())
    }

    pub fn zero_all_grads(&mut self) {
        for var in &mut self.vars {
            var.grad = None;
        }
    }

    /// Replace a Variable's value with a tensor of the same shape.
    /// Intended for optimizers updating parameter leaves.
    pub fn set_value(&mut self, id: VarId, value: Tensor) -> Result<()> {
        let var = self.var_mut(id)?;
        if value.shape() != var.value.shape() {
            return Err(Error::ShapeMismatch {
                op: "set_value",
                lhs: var.value.shape().clone(),
                rhs: value.shape().clone(),
            });
        }
        var.value = value;
        Ok(())
    }

    // Session management

    /// Remember the current arena size.
    pub fn mark(&self) -> GraphMark {
        GraphMark {
            vars: self.vars.len(),
            ops: self.ops.len(),
        }
    }

    /// Drop every Variable and Operation created after `mark`. Ids handed
    /// out after the mark become invalid (and may be reused).
    pub fn rewind(&mut self, mark: GraphMark) {
        self.vars.truncate(mark.vars);
        self.ops.truncate(mark.ops);
    }

    // Backward

    /// Differentiate `terminal` with respect to every Variable it depends
    /// on, releasing the graph afterwards.
    ///
    /// If `terminal` has no gradient yet it is seeded with ones of its own
    /// shape (dL/dL = 1, element-wise for non-scalar terminals).
    pub fn backward(&mut self, terminal: VarId) -> Result<()> {
        self.backward_with(terminal, BackwardOptions::default())
    }

    pub fn backward_with(&mut self, terminal: VarId, options: BackwardOptions) -> Result<()> {
        let root = self.var(terminal)?;
        let _span = debug_span!("backward", terminal = terminal.0).entered();
        debug!(
            generation = root.generation,
            retain_graph = options.retain_graph,
            "backward started"
        );

        let seeded = root.grad.is_none();
        if let Some(creator) = root.creator {
            if self.ops[creator.0].op.is_none() {
                if !seeded {
                    debug!("terminal already differentiated, nothing to do");
                    return Ok(());
                }
                return Err(Error::GraphReleased { id: creator.0 });
            }
        }
        // Contributions of this pass only. A terminal that already carries a
        // gradient propagates it unchanged instead of being re-seeded.
        let seed = match &root.grad {
            Some(grad) => grad.clone(),
            None => Tensor::ones_like(&root.value),
        };
        let mut staged: HashMap<VarId, Tensor> = HashMap::new();
        staged.insert(terminal, seed);

        let mut pending = BinaryHeap::new();
        let mut enqueued = HashSet::new();
        if let Some(creator) = root.creator {
            enqueued.insert(creator);
            pending.push(Pending {
                generation: root.generation,
                op: creator,
            });
        }

        let mut processed = Vec::new();
        while let Some(Pending { generation, op: op_id }) = pending.pop() {
            let node = self.op_node(op_id)?;
            let Some(op) = node.op.as_deref() else {
                return Err(Error::GraphReleased { id: op_id.0 });
            };
            let Some(grad_output) = staged.get(&node.output) else {
                bail!("no gradient reached {}", node.output);
            };
            trace!(op = op.name(), op_id = op_id.0, generation, "backward step");

            let grads = op.backward(grad_output)?;
            if grads.len() != node.inputs.len() {
                return Err(Error::Arity {
                    op: op.name(),
                    expected: node.inputs.len(),
                    got: grads.len(),
                });
            }

            for (&input, grad) in node.inputs.iter().zip(grads) {
                self.stage_grad(&mut staged, input, grad)?;
                let var = &self.vars[input.0];
                if let Some(creator) = var.creator {
                    if enqueued.insert(creator) {
                        pending.push(Pending {
                            generation: var.generation,
                            op: creator,
                        });
                    }
                }
            }
            processed.push(op_id);
        }

        if !seeded {
            staged.remove(&terminal);
        }
        let mut totals = Vec::with_capacity(staged.len());
        for (id, grad) in staged {
            let total = match &self.vars[id.0].grad {
                Some(existing) => existing.add(&grad)?,
                None => grad,
            };
            totals.push((id, total));
        }
        for (id, total) in totals {
            self.vars[id.0].grad = Some(total);
        }
        if !options.retain_graph {
            for &op_id in &processed {
                self.ops[op_id.0].op = None;
            }
        }
        debug!(ops = processed.len(), "backward finished");
        Ok(())
    }

    fn stage_grad(
        &self,
        staged: &mut HashMap<VarId, Tensor>,
        id: VarId,
        grad: Tensor,
    ) -> Result<()> {
        check_grad_fits(&self.vars[id.0], &grad)?;
        match staged.entry(id) {
            Entry::Occupied(mut entry) => entry.get_mut().add_assign(&grad)?,
            Entry::Vacant(entry) => {
                entry.insert(grad);
            }
        }
        Ok(())
    }

    // Convenience constructors for the built-in operations

    pub fn add(&mut self, lhs: VarId, rhs: VarId) -> Result<VarId> {
        self.apply(Binary::new(BinaryOp::Add), &[lhs, rhs])
    }

    pub fn sub(&mut self, lhs: VarId, rhs: VarId) -> Result<VarId> {
        self.apply(Binary::new(BinaryOp::Sub), &[lhs, rhs])
    }

    pub fn mul(&mut self, lhs: VarId, rhs: VarId) -> Result<VarId> {
        self.apply(Binary::new(BinaryOp::Mul), &[lhs, rhs])
    }

    pub fn div(&mut self, lhs: VarId, rhs: VarId) -> Result<VarId> {
        self.apply(Binary::new(BinaryOp::Div), &[lhs, rhs])
    }

    pub fn neg(&mut self, x: VarId) -> Result<VarId> {
        self.apply(Unary::new(UnaryOp::Neg), &[x])
    }

    pub fn exp(&mut self, x: VarId) -> Result<VarId> {
        self.apply(Unary::new(UnaryOp::Exp), &[x])
    }

    pub fn log(&mut self, x: VarId) -> Result<VarId> {
        self.apply(Unary::new(UnaryOp::Log), &[x])
    }

    pub fn sqrt(&mut self, x: VarId) -> Result<VarId> {
        self.apply(Unary::new(UnaryOp::Sqrt), &[x])
    }

    pub fn sigmoid(&mut self, x: VarId) -> Result<VarId> {
        self.apply(Unary::new(UnaryOp::Sigmoid), &[x])
    }

    pub fn tanh(&mut self, x: VarId) -> Result<VarId> {
        self.apply(Unary::new(UnaryOp::Tanh), &[x])
    }

    pub fn powf(&mut self, x: VarId, exponent: f64) -> Result<VarId> {
        self.apply(Unary::new(UnaryOp::Powf(exponent)), &[x])
    }

    pub fn matmul(&mut self, lhs: VarId, rhs: VarId) -> Result<VarId> {
        self.apply(MatMul::new(), &[lhs, rhs])
    }

    pub fn sum(&mut self, x: VarId, axis: isize, keepdims: bool) -> Result<VarId> {
        self.apply(Reduce::along(ReduceOp::Sum, axis, keepdims), &[x])
    }

    pub fn mean(&mut self, x: VarId, axis: isize, keepdims: bool) -> Result<VarId> {
        self.apply(Reduce::along(ReduceOp::Mean, axis, keepdims), &[x])
    }

    pub fn variance(&mut self, x: VarId, axis: isize, keepdims: bool) -> Result<VarId> {
        self.apply(Reduce::along(ReduceOp::Variance, axis, keepdims), &[x])
    }

    pub fn sum_all(&mut self, x: VarId) -> Result<VarId> {
        self.apply(Reduce::all(ReduceOp::Sum), &[x])
    }

    pub fn mean_all(&mut self, x: VarId) -> Result<VarId> {
        self.apply(Reduce::all(ReduceOp::Mean), &[x])
    }

    pub fn reshape(&mut self, x: VarId, shape: impl Into<Shape>) -> Result<VarId> {
        self.apply(Reshape::new(shape), &[x])
    }

    pub fn broadcast_to(&mut self, x: VarId, shape: impl Into<Shape>) -> Result<VarId> {
        self.apply(BroadcastTo::new(shape), &[x])
    }

    pub fn transpose(&mut self, x: VarId) -> Result<VarId> {
        self.apply(Transpose::new(), &[x])
    }
}

fn check_grad_fits(var: &Variable, grad: &Tensor) -> Result<()> {
    if grad.shape() != var.value.shape() {
        return Err(Error::ShapeMismatch {
            op: "accumulate_grad",
            lhs: var.value.shape().clone(),
            rhs: grad.shape().clone(),
        });
    }
    Ok(())
}
