use crate::shape::Shape;

/// All errors that can occur within Tessera.
///
/// The variants fall into three families: shape errors (broadcast, reshape,
/// matmul and gradient-shape violations), index errors (axis, coordinate or
/// variable id out of range) and arity errors (wrong number of inputs to an
/// operation, or of gradients out of one). Every error is raised at the
/// point of violation and surfaced unmodified.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Two shapes that had to agree did not (e.g. adding [2,3] to [4,5]).
    #[error("shape mismatch in {op}: {lhs} vs {rhs}")]
    ShapeMismatch {
        op: &'static str,
        lhs: Shape,
        rhs: Shape,
    },

    /// Element count mismatch when creating a tensor from a vec.
    #[error("element count mismatch: shape {shape} requires {expected} elements, got {got}")]
    ElementCountMismatch {
        shape: Shape,
        expected: usize,
        got: usize,
    },

    /// A shape with a zero-sized dimension.
    #[error("invalid shape {shape}: every dimension must be at least 1")]
    InvalidShape { shape: Shape },

    /// Operation requires a specific rank.
    #[error("rank mismatch in {op}: expected rank {expected}, got {got}")]
    RankMismatch {
        op: &'static str,
        expected: usize,
        got: usize,
    },

    /// Axis out of range for the tensor's rank. Negative axes count from the end.
    #[error("axis {axis} out of range for tensor with {rank} dimensions")]
    AxisOutOfRange { axis: isize, rank: usize },

    /// Multi-index has the wrong length or a coordinate is out of bounds.
    #[error("index {index:?} out of bounds for shape {shape}")]
    IndexOutOfBounds { index: Vec<usize>, shape: Shape },

    /// A variable id that does not belong to this graph.
    #[error("unknown variable id {id}")]
    UnknownVariable { id: usize },

    /// An operation id that does not belong to this graph.
    #[error("unknown operation id {id}")]
    UnknownOperation { id: usize },

    /// Wrong number of inputs to an operation (or gradients out of one).
    #[error("arity mismatch in {op}: expected {expected}, got {got}")]
    Arity {
        op: &'static str,
        expected: usize,
        got: usize,
    },

    /// `backward` called on an operation whose `forward` never ran.
    #[error("{op}: backward called before forward")]
    NotForwarded { op: &'static str },

    /// `forward` called a second time on the same operation instance.
    #[error("{op}: forward may only run once per operation")]
    AlreadyForwarded { op: &'static str },

    /// Backward reached an operation whose saved state an earlier pass
    /// released. Rebuild the forward pass, or use `retain_graph`.
    #[error("operation {id} was released by an earlier backward pass")]
    GraphReleased { id: usize },

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }

    /// Broadcast, reshape, matmul or gradient-shape violation.
    pub fn is_shape_error(&self) -> bool {
        matches!(
            self,
            Error::ShapeMismatch { .. }
                | Error::ElementCountMismatch { .. }
                | Error::InvalidShape { .. }
                | Error::RankMismatch { .. }
        )
    }

    /// Axis, coordinate or variable id out of range.
    pub fn is_index_error(&self) -> bool {
        matches!(
            self,
            Error::AxisOutOfRange { .. }
                | Error::IndexOutOfBounds { .. }
                | Error::UnknownVariable { .. }
                | Error::UnknownOperation { .. }
        )
    }

    pub fn is_arity_error(&self) -> bool {
        matches!(self, Error::Arity { .. })
    }

    /// Operation used outside its forward-once, backward-after lifecycle.
    pub fn is_lifecycle_error(&self) -> bool {
        matches!(
            self,
            Error::NotForwarded { .. } | Error::AlreadyForwarded { .. } | Error::GraphReleased { .. }
        )
    }
}

/// Convenience Result type used throughout Tessera.
pub type Result<T> = std::result::Result<T, Error>;

/// Macro for early return with a formatted error message.
/// Usage: `bail!("something went wrong: {}", detail)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}
