use crate::error::Result;
use crate::op::{check_arity, check_grad_shape, saved, unbroadcast, unforwarded, Operation};
use crate::shape::Shape;
use crate::tensor::Tensor;

/// Same data, different shape. Gradient is reshaped back.
#[derive(Debug)]
pub struct Reshape {
    target: Shape,
    src_shape: Option<Shape>,
}

impl Reshape {
    pub fn new(target: impl Into<Shape>) -> Self {
        Reshape {
            target: target.into(),
            src_shape: None,
        }
    }
}

impl Operation for Reshape {
    fn name(&self) -> &'static str {
        "reshape"
    }

    fn arity(&self) -> usize {
        1
    }

    fn forward(&mut self, inputs: &[&Tensor]) -> Result<Tensor> {
        check_arity(self, inputs.len())?;
        unforwarded(&self.src_shape, self.name())?;
        let out = inputs[0].reshape(&self.target)?;
        self.src_shape = Some(inputs[0].shape().clone());
        Ok(out)
    }

    fn backward(&self, grad_output: &Tensor) -> Result<Vec<Tensor>> {
        let src = saved(&self.src_shape, self.name())?;
        check_grad_shape(self.name(), grad_output, &self.target)?;
        Ok(vec![grad_output.reshape(src)?])
    }
}

/// Stretch to a larger shape. Gradient is summed back over the stretched axes.
#[derive(Debug)]
pub struct BroadcastTo {
    target: Shape,
    src_shape: Option<Shape>,
}

impl BroadcastTo {
    pub fn new(target: impl Into<Shape>) -> Self {
        BroadcastTo {
            target: target.into(),
            src_shape: None,
        }
    }
}

impl Operation for BroadcastTo {
    fn name(&self) -> &'static str {
        "broadcast_to"
    }

    fn arity(&self) -> usize {
        1
    }

    fn forward(&mut self, inputs: &[&Tensor]) -> Result<Tensor> {
        check_arity(self, inputs.len())?;
        unforwarded(&self.src_shape, self.name())?;
        let out = inputs[0].broadcast_to(&self.target)?;
        self.src_shape = Some(inputs[0].shape().clone());
        Ok(out)
    }

    fn backward(&self, grad_output: &Tensor) -> Result<Vec<Tensor>> {
        let src = saved(&self.src_shape, self.name())?;
        check_grad_shape(self.name(), grad_output, &self.target)?;
        Ok(vec![unbroadcast(grad_output, src)?])
    }
}

/// Swap the last two axes. Its own inverse.
#[derive(Debug, Default)]
pub struct Transpose {
    out_shape: Option<Shape>,
}

impl Transpose {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Operation for Transpose {
    fn name(&self) -> &'static str {
        "transpose"
    }

    fn arity(&self) -> usize {
        1
    }

    fn forward(&mut self, inputs: &[&Tensor]) -> Result<Tensor> {
        check_arity(self, inputs.len())?;
        unforwarded(&self.out_shape, self.name())?;
        let out = inputs[0].transpose()?;
        self.out_shape = Some(out.shape().clone());
        Ok(out)
    }

    fn backward(&self, grad_output: &Tensor) -> Result<Vec<Tensor>> {
        let out_shape = saved(&self.out_shape, self.name())?;
        check_grad_shape(self.name(), grad_output, out_shape)?;
        Ok(vec![grad_output.transpose()?])
    }
}
