//! Gradient-carrying flat tensor

use super::backward::BackwardOp;
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// A flat f32 tensor with optional gradient tracking.
///
/// Multi-dimensional values are stored flattened in row-major order; ops
/// take explicit dimensions. The gradient lives in a shared cell, so every
/// clone of a tensor accumulates into the same gradient buffer even though
/// the data itself is cloned.
#[derive(Clone)]
pub struct Tensor {
    data: Array1<f32>,
    grad: Rc<RefCell<Option<Array1<f32>>>>,
    requires_grad: bool,
    backward_op: Option<Rc<dyn BackwardOp>>,
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("data", &self.data)
            .field("grad", &self.grad)
            .field("requires_grad", &self.requires_grad)
            .field("backward_op", &self.backward_op.as_ref().map(|_| "<op>"))
            .finish()
    }
}


impl Tensor {
    /// Create a tensor from an ndarray
    pub fn new(data: Array1<f32>, requires_grad: bool) -> Self {
        Self {
            data,
            grad: Rc::new(RefCell::new(None)),
            requires_grad,
            backward_op: None,
        }
    }

    /// Create a tensor from a Vec
    pub fn from_vec(data: Vec<f32>, requires_grad: bool) -> Self {
        Self::new(Array1::from(data), requires_grad)
    }

    /// Tensor of zeros
    pub fn zeros(len: usize, requires_grad: bool) -> Self {
        Self::new(Array1::zeros(len), requires_grad)
    }

    /// Tensor of ones
    pub fn ones(len: usize, requires_grad: bool) -> Self {
        Self::new(Array1::ones(len), requires_grad)
    }

    /// Borrow the underlying data
    pub fn data(&self) -> &Array1<f32> {
        &self.data
    }

    /// Mutably borrow the underlying data (optimizer parameter updates)
    pub fn data_mut(&mut self) -> &mut Array1<f32> {
        &mut self.data
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the tensor has no elements
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether gradients are tracked for this tensor
    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// Current gradient, if any has been accumulated
    pub fn grad(&self) -> Option<Array1<f32>> {
        self.grad.borrow().clone()
    }

    /// Shared handle to the gradient cell (for backward ops)
    pub fn grad_cell(&self) -> Rc<RefCell<Option<Array1<f32>>>> {
        Rc::clone(&self.grad)
    }

    /// Overwrite the gradient
    pub fn set_grad(&mut self, grad: Array1<f32>) {
        *self.grad.borrow_mut() = Some(grad);
    }

    /// Add `grad` into the gradient cell, initializing it if empty
    pub fn accumulate_grad(&self, grad: Array1<f32>) {
        let mut cell = self.grad.borrow_mut();
        match cell.as_mut() {
            Some(existing) => *existing = &*existing + &grad,
            None => *cell = Some(grad),
        }
    }

    /// Clear the gradient
    pub fn zero_grad(&mut self) {
        *self.grad.borrow_mut() = None;
    }

    /// The op that produced this tensor, if gradient-tracked
    pub fn backward_op(&self) -> Option<Rc<dyn BackwardOp>> {
        self.backward_op.clone()
    }

    /// Attach the producing op
    pub fn set_backward_op(&mut self, op: Rc<dyn BackwardOp>) {
        self.backward_op = Some(op);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec() {
        let t = Tensor::from_vec(vec![1.0, 2.0, 3.0], true);
        assert_eq!(t.len(), 3);
        assert!(t.requires_grad());
        assert_eq!(t.data()[1], 2.0);
    }

    #[test]
    fn test_zeros_and_ones() {
        let z = Tensor::zeros(4, false);
        let o = Tensor::ones(4, false);
        assert!(z.data().iter().all(|&v| v == 0.0));
        assert!(o.data().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_accumulate_grad() {
        let t = Tensor::from_vec(vec![0.0, 0.0], true);
        t.accumulate_grad(Array1::from(vec![1.0, 2.0]));
        t.accumulate_grad(Array1::from(vec![0.5, 0.5]));
        let grad = t.grad().unwrap();
        assert_eq!(grad[0], 1.5);
        assert_eq!(grad[1], 2.5);
    }

    #[test]
    fn test_clone_shares_grad_cell() {
        let t = Tensor::from_vec(vec![1.0], true);
        let c = t.clone();
        c.accumulate_grad(Array1::from(vec![3.0]));
        assert_eq!(t.grad().unwrap()[0], 3.0);
    }

    #[test]
    fn test_zero_grad() {
        let mut t = Tensor::from_vec(vec![1.0], true);
        t.accumulate_grad(Array1::from(vec![1.0]));
        t.zero_grad();
        assert!(t.grad().is_none());
    }
}
