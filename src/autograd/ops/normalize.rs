//! Layer normalization with backward pass

use crate::autograd::{BackwardOp, Tensor};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// Layer Normalization over the whole tensor
///
/// LayerNorm(x) = gamma * (x - mean) / sqrt(var + epsilon) + beta
///
/// Callers normalizing per position slice the input first (see
/// `encoder::LayerNorm::forward_batched`).
pub fn layer_norm(x: &Tensor, gamma: &Tensor, beta: &Tensor, epsilon: f32) -> Tensor {
    assert_eq!(x.len(), gamma.len(), "gamma length must match input");
    assert_eq!(x.len(), beta.len(), "beta length must match input");

    let n = x.len() as f32;
    let mean = x.data().sum() / n;
    let variance = x.data().mapv(|val| (val - mean).powi(2)).sum() / n;
    let std = (variance + epsilon).sqrt();

    let normalized = x.data().mapv(|val| (val - mean) / std);
    let data = &normalized * gamma.data() + beta.data();

    let requires_grad = x.requires_grad() || gamma.requires_grad() || beta.requires_grad();
    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(LayerNormBackward {
            x: x.clone(),
            gamma: gamma.clone(),
            beta: beta.clone(),
            normalized,
            std,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct LayerNormBackward {
    x: Tensor,
    gamma: Tensor,
    beta: Tensor,
    normalized: Array1<f32>,
    std: f32,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for LayerNormBackward {
    fn backward(&self) {
        if let Some(grad_output) = self.result_grad.borrow().as_ref() {
            let n = self.x.len() as f32;

            // ∂L/∂beta = ∂L/∂y
            if self.beta.requires_grad() {
                self.beta.accumulate_grad(grad_output.clone());
            }

            // ∂L/∂gamma = ∂L/∂y * x_normalized
            if self.gamma.requires_grad() {
                self.gamma.accumulate_grad(grad_output * &self.normalized);
            }

            if self.x.requires_grad() {
                let grad_normalized = grad_output * self.gamma.data();
                let sum_grad = grad_normalized.sum();
                let sum_grad_normalized = (&grad_normalized * &self.normalized).sum();

                // ∂L/∂x_i = (g_i - mean(g) - x̂_i * mean(g * x̂)) / std
                let grad_x: Vec<f32> = grad_normalized
                    .iter()
                    .zip(self.normalized.iter())
                    .map(|(&g, &norm)| (g - sum_grad / n - norm * sum_grad_normalized / n) / self.std)
                    .collect();

                self.x.accumulate_grad(Array1::from(grad_x));
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.x.clone(), self.gamma.clone(), self.beta.clone()]
    }
}
