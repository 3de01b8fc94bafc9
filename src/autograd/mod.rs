//! Tape-based autograd engine
//!
//! Provides automatic differentiation using a computational graph with
//! gradient tape. Tensors are stored flattened; every op takes explicit
//! dimensions and pairs its forward computation with a backward struct.

mod backward;
mod ops;
mod tensor;


use std::collections::HashSet;
use std::rc::Rc;

pub use backward::BackwardOp;
pub use ops::*;
pub use tensor::Tensor;

/// Perform backward pass on a tensor
///
/// Seeds the gradient with `grad_output`, or with ones when `None`
/// (the usual case for a scalar loss), then runs every op in the graph
/// exactly once in reverse topological order. An op fires only after all
/// consumers of its output have accumulated into the output's gradient
/// cell, so tensors with multiple consumers are counted once.
pub fn backward(tensor: &mut Tensor, grad_output: Option<ndarray::Array1<f32>>) {
    if let Some(grad) = grad_output {
        tensor.set_grad(grad);
    } else {
        let ones = ndarray::Array1::ones(tensor.data().len());
        tensor.set_grad(ones);
    }

    let Some(root) = tensor.backward_op() else {
        return;
    };

    let mut visited = HashSet::new();
    let mut postorder = Vec::new();
    collect_postorder(&root, &mut visited, &mut postorder);
    for op in postorder.iter().rev() {
        op.backward();
    }
}

/// Depth-first postorder over the op graph, deduplicated by op identity
fn collect_postorder(
    op: &Rc<dyn BackwardOp>,
    visited: &mut HashSet<*const ()>,
    postorder: &mut Vec<Rc<dyn BackwardOp>>,
) {
    let key = Rc::as_ptr(op) as *const ();
    if !visited.insert(key) {
        return;
    }
    for input in op.inputs() {
        if let Some(producer) = input.backward_op() {
            collect_postorder(&producer, visited, postorder);
        }
    }
    postorder.push(Rc::clone(op));
}
