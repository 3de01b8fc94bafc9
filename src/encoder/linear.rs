//! Fully-connected layer

use crate::autograd::{add_bias, matmul};
use crate::Tensor;

/// Fully-connected layer: y = x @ W + b
///
/// Weight is (in_dim x out_dim) flattened; the same layer is reused for
/// every row of a batched input.
pub struct Linear {
    /// Weight matrix (in_dim x out_dim)
    pub weight: Tensor,
    /// Bias vector (out_dim)
    pub bias: Tensor,
    in_dim: usize,
    out_dim: usize,
}

impl Linear {
    /// Create a layer with deterministic Xavier-scaled weights and zero bias
    ///
    /// The init is a sin ramp, so two layers with identical dimensions
    /// start with identical weights.
    pub fn new(in_dim: usize, out_dim: usize) -> Self {
        let scale = (2.0 / (in_dim + out_dim) as f32).sqrt();
        Self {
            weight: Tensor::from_vec(
                (0..in_dim * out_dim)
                    .map(|i| (i as f32 * 0.137).sin() * scale)
                    .collect(),
                true,
            ),
            bias: Tensor::zeros(out_dim, true),
            in_dim,
            out_dim,
        }
    }

    /// Forward pass over `rows` input rows
    pub fn forward(&self, x: &Tensor, rows: usize) -> Tensor {
        let projected = matmul(x, &self.weight, rows, self.in_dim, self.out_dim);
        add_bias(&projected, &self.bias, rows, self.out_dim)
    }

    /// Input dimension
    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    /// Output dimension
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    /// Get all parameters as a vector
    pub fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.weight, &self.bias]
    }

    /// Get all parameters as mutable references for optimizer
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.weight, &mut self.bias]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_output_shape() {
        let layer = Linear::new(4, 3);
        let x = Tensor::from_vec(vec![0.1; 2 * 4], false);
        let y = layer.forward(&x, 2);
        assert_eq!(y.len(), 2 * 3);
    }

    #[test]
    fn test_linear_identical_dims_identical_init() {
        let a = Linear::new(6, 2);
        let b = Linear::new(6, 2);
        assert_eq!(
            a.weight.data().as_slice().unwrap(),
            b.weight.data().as_slice().unwrap()
        );
    }

    #[test]
    fn test_linear_backward_reaches_weight_and_bias() {
        let layer = Linear::new(2, 2);
        let x = Tensor::from_vec(vec![1.0, 2.0], true);
        let mut y = layer.forward(&x, 1);
        crate::autograd::backward(&mut y, None);
        assert!(layer.weight.grad().is_some());
        assert!(layer.bias.grad().is_some());
        assert!(x.grad().is_some());
    }

    #[test]
    fn test_linear_parameters() {
        let layer = Linear::new(3, 2);
        assert_eq!(layer.parameters().len(), 2);
    }
}
