//! # Tessera
//!
//! A small dynamic-graph autograd engine over dense `f64` tensors.
//!
//! This is the top-level facade crate that re-exports everything you need.
//!
//! ## Usage
//!
//! ```rust
//! use tessera::prelude::*;
//!
//! let mut g = Graph::new();
//! let a = g.leaf(Tensor::scalar(2.0));
//! let b = g.leaf(Tensor::scalar(1.0));
//! let c = g.leaf(Tensor::scalar(3.0));
//! let s = g.add(a, b)?;
//! let y = g.mul(s, c)?;
//! g.backward(y)?;
//!
//! assert_eq!(g.value(y)?.to_scalar()?, 9.0);
//! assert_eq!(g.grad(a)?.unwrap().to_scalar()?, 3.0);
//! # Ok::<(), tessera::Error>(())
//! ```
//!
//! ## Architecture
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `shape` | Shape, strides, broadcasting |
//! | `tensor` | Tensor values, elementwise ops, reductions, matmul |
//! | `op` / `ops` | Operation trait and the built-in catalog |
//! | `graph` | Variable arena, generations, backward engine |
//! | `grad_check` | Central-difference gradient checking |

/// Re-export core types.
pub use tessera_core::{
    check_gradients, numerical_grad, unbroadcast, BackwardOptions, Error, GradCheckConfig,
    GradCheckReport, Graph, GraphMark, OpId, Operation, ReduceOp, Result, Shape, Tensor, VarId,
    Variable,
};

/// Built-in operations.
pub mod ops {
    pub use tessera_core::ops::*;
}

/// Gradient checking.
pub mod grad_check {
    pub use tessera_core::grad_check::*;
}

pub use tessera_core::bail;

/// Convenient glob import: `use tessera::prelude::*;`
pub mod prelude {
    pub use crate::ops::{BinaryOp, UnaryOp};
    pub use crate::{
        BackwardOptions, Error, GradCheckConfig, Graph, Operation, ReduceOp, Result, Shape,
        Tensor, VarId,
    };
}
