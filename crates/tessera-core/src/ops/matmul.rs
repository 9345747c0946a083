use crate::error::Result;
use crate::op::{check_arity, check_grad_shape, saved, unforwarded, Operation};
use crate::shape::Shape;
use crate::tensor::Tensor;

#[derive(Debug)]
struct MatMulSaved {
    lhs: Tensor,
    rhs: Tensor,
    out_shape: Shape,
}

/// C = A @ B where A:[..., m, k], B:[..., k, n], C:[..., m, n]
///   grad_A = grad_C @ Bᵀ  →  [m, n] @ [n, k] = [m, k]
///   grad_B = Aᵀ @ grad_C  →  [k, m] @ [m, n] = [k, n]
#[derive(Debug, Default)]
pub struct MatMul {
    saved: Option<MatMulSaved>,
}

impl MatMul {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Operation for MatMul {
    fn name(&self) -> &'static str {
        "matmul"
    }

    fn arity(&self) -> usize {
        2
    }

    fn forward(&mut self, inputs: &[&Tensor]) -> Result<Tensor> {
        check_arity(self, inputs.len())?;
        unforwarded(&self.saved, self.name())?;
        let (lhs, rhs) = (inputs[0], inputs[1]);
        let out = lhs.matmul(rhs)?;
        self.saved = Some(MatMulSaved {
            lhs: lhs.clone(),
            rhs: rhs.clone(),
            out_shape: out.shape().clone(),
        });
        Ok(out)
    }

    fn backward(&self, grad_output: &Tensor) -> Result<Vec<Tensor>> {
        let s = saved(&self.saved, self.name())?;
        check_grad_shape(self.name(), grad_output, &s.out_shape)?;
        let grad_lhs = grad_output.matmul(&s.rhs.transpose()?)?;
        let grad_rhs = s.lhs.transpose()?.matmul(grad_output)?;
        Ok(vec![grad_lhs, grad_rhs])
    }
}
