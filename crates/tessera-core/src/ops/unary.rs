use crate::error::Result;
use crate::op::{check_arity, check_grad_shape, saved, unforwarded, Operation};
use crate::tensor::Tensor;

/// Element-wise unary operations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Neg,
    Exp,
    Log,
    Sqrt,
    Sigmoid,
    Tanh,
    /// `x ^ c` for a constant exponent.
    Powf(f64),
}

impl UnaryOp {
    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Neg => "neg",
            UnaryOp::Exp => "exp",
            UnaryOp::Log => "log",
            UnaryOp::Sqrt => "sqrt",
            UnaryOp::Sigmoid => "sigmoid",
            UnaryOp::Tanh => "tanh",
            UnaryOp::Powf(_) => "powf",
        }
    }
}

#[derive(Debug)]
struct UnarySaved {
    input: Tensor,
    output: Tensor,
}

/// Element-wise `op(x)`.
#[derive(Debug)]
pub struct Unary {
    op: UnaryOp,
    saved: Option<UnarySaved>,
}

impl Unary {
    pub fn new(op: UnaryOp) -> Self {
        Unary { op, saved: None }
    }
}

impl Operation for Unary {
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
        let output = match self.op {
            UnaryOp::Neg => x.neg(),
            UnaryOp::Exp => x.exp(),
            UnaryOp::Log => x.log(),
            UnaryOp::Sqrt => x.sqrt(),
            UnaryOp::Sigmoid => x.sigmoid(),
            UnaryOp::Tanh => x.tanh(),
            UnaryOp::Powf(c) => x.powf(c),
        };
        self.saved = Some(UnarySaved {
            input: x.clone(),
            output: output.clone(),
        });
        Ok(output)
    }

    fn backward(&self, grad_output: &Tensor) -> Result<Vec<Tensor>> {
        let s = saved(&self.saved, self.name())?;
        check_grad_shape(self.name(), grad_output, s.output.shape())?;
        let (x, y) = (&s.input, &s.output);

        let grad = match self.op {
            UnaryOp::Neg => grad_output.neg(),
            // d(e^x)/dx = e^x
            UnaryOp::Exp => grad_output.mul(y)?,
            // d(ln x)/dx = 1/x
            UnaryOp::Log => grad_output.div(x)?,
            // d(√x)/dx = 1 / (2√x)
            UnaryOp::Sqrt => grad_output.div(&y.affine(2.0, 0.0))?,
            // σ'(x) = σ(x)(1 - σ(x))
            UnaryOp::Sigmoid => grad_output.mul(&y.map(|s| s * (1.0 - s)))?,
            // tanh'(x) = 1 - tanh²(x)
            UnaryOp::Tanh => grad_output.mul(&y.map(|t| 1.0 - t * t))?,
            UnaryOp::Powf(c) => grad_output.mul(&x.map(|v| c * v.powf(c - 1.0)))?,
        };
        Ok(vec![grad])
    }
}
