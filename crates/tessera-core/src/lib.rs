//! # tessera-core
//!
//! Dense tensors and a dynamic-graph, reverse-mode autograd engine for Tessera.
//!
//! This crate provides:
//! - [`Tensor`]: dense row-major `f64` array with NumPy-style broadcasting
//! - [`Shape`]: dimensions, strides, broadcast and reduction rules
//! - [`Operation`]: the forward/backward contract, with the built-in
//!   catalog in [`ops`]
//! - [`Graph`]: arena of Variables and the backward engine
//! - [`grad_check`]: central-difference verification of backward rules
// - Shape: n-dimensional shape, broadcasting
// - Tensor: values and pure kernels, no graph knowledge
// - Operation: one differentiable step, saves its own forward state
// - Graph: Variables by id, generations, backward

pub mod error;
pub mod grad_check;
pub mod graph;
pub mod op;
pub mod ops;
pub mod shape;
pub mod tensor;

pub use error::{Error, Result};
pub use grad_check::{check_gradients, numerical_grad, GradCheckConfig, GradCheckReport};
pub use graph::{BackwardOptions, Graph, GraphMark, OpId, VarId, Variable};
pub use op::{unbroadcast, Operation};
pub use shape::Shape;
pub use tensor::{ReduceOp, Tensor};
