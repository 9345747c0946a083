use crate::error::Result;
use crate::op::{check_arity, check_grad_shape, saved, unbroadcast, unforwarded, Operation};
use crate::shape::Shape;
use crate::tensor::Tensor;

/// Element-wise binary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
        }
    }

    fn needs_operands(self) -> bool {
        matches!(self, BinaryOp::Mul | BinaryOp::Div)
    }
}

#[derive(Debug)]
struct BinarySaved {
    lhs_shape: Shape,
    rhs_shape: Shape,
    out_shape: Shape,
    /// Operand values, kept only by the product and quotient rules.
    operands: Option<(Tensor, Tensor)>,
}

/// Broadcasting element-wise `lhs <op> rhs`.
#[derive(Debug)]
pub struct Binary {
    op: BinaryOp,
    saved: Option<BinarySaved>,
}

impl Binary {
    pub fn new(op: BinaryOp) -> Self {
        Binary { op, saved: None }
    }
}

impl Operation for Binary {
    fn name(&self) -> &'static str {
        self.op.name()
    }

    fn arity(&self) -> usize {
        2
    }

    fn forward(&mut self, inputs: &[&Tensor]) -> Result<Tensor> {
        check_arity(self, inputs.len())?;
        unforwarded(&self.saved, self.name())?;
        let (lhs, rhs) = (inputs[0], inputs[1]);
        let out = match self.op {
            BinaryOp::Add => lhs.add(rhs)?,
            BinaryOp::Sub => lhs.sub(rhs)?,
            BinaryOp::Mul => lhs.mul(rhs)?,
            BinaryOp::Div => lhs.div(rhs)?,
        };
        self.saved = Some(BinarySaved {
            lhs_shape: lhs.shape().clone(),
            rhs_shape: rhs.shape().clone(),
            out_shape: out.shape().clone(),
            operands: self
                .op
                .needs_operands()
                .then(|| (lhs.clone(), rhs.clone())),
        });
        Ok(out)
    }

    fn backward(&self, grad_output: &Tensor) -> Result<Vec<Tensor>> {
        let s = saved(&self.saved, self.name())?;
        check_grad_shape(self.name(), grad_output, &s.out_shape)?;

        let (raw_lhs, raw_rhs) = match (self.op, &s.operands) {
            // d(a + b)/da = 1, d(a + b)/db = 1
            (BinaryOp::Add, _) => (grad_output.clone(), grad_output.clone()),
            // d(a - b)/da = 1, d(a - b)/db = -1
            (BinaryOp::Sub, _) => (grad_output.clone(), grad_output.neg()),
            // d(a * b)/da = b, d(a * b)/db = a
            (BinaryOp::Mul, Some((lhs, rhs))) => (grad_output.mul(rhs)?, grad_output.mul(lhs)?),
            // d(a / b)/da = 1/b, d(a / b)/db = -a / b²
            (BinaryOp::Div, Some((lhs, rhs))) => {
                let b_sq = rhs.mul(rhs)?;
                (
                    grad_output.div(rhs)?,
                    grad_output.neg().mul(lhs)?.div(&b_sq)?,
                )
            }
            _ => crate::bail!("{}: operands were not saved during forward", self.name()),
        };

        Ok(vec![
            unbroadcast(&raw_lhs, &s.lhs_shape)?,
            unbroadcast(&raw_rhs, &s.rhs_shape)?,
        ])
    }
}
