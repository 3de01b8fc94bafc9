//! Backward operation trait

use super::tensor::Tensor;

/// A node on the gradient tape.
///
/// Implementations read their output's gradient cell and accumulate
/// gradients into their inputs. They must not recurse into the inputs'
/// own ops; the traversal in [`crate::autograd::backward`] schedules each
/// node exactly once, after every consumer of its output has run.
pub trait BackwardOp {
    /// Propagate this op's output gradient to its inputs
    fn backward(&self);

    /// The input tensors, for graph traversal
    fn inputs(&self) -> Vec<Tensor>;
}
