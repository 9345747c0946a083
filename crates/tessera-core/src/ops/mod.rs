//! Built-in [`Operation`](crate::Operation) implementations.
//!
//! Each type is one node kind of the computation graph. They are normally
//! created through the convenience methods on [`Graph`](crate::Graph), but
//! can be constructed and passed to [`Graph::apply`](crate::Graph::apply)
//! directly.

mod binary;
mod matmul;
mod reduce;
mod shape;
mod unary;

pub use binary::{Binary, BinaryOp};
pub use matmul::MatMul;
pub use reduce::Reduce;
pub use shape::{BroadcastTo, Reshape, Transpose};
pub use unary::{Unary, UnaryOp};
