//! Inverted dropout with gradient masking
//!
//! Each entry is zeroed with probability `p`; survivors are rescaled by
//! 1/(1-p) so the expected activation is unchanged. The mask is captured
//! at forward time and reused in the backward pass.

use crate::autograd::{BackwardOp, Tensor};
use ndarray::Array1;
use rand::Rng;
use std::cell::RefCell;
use std::rc::Rc;

/// Apply inverted dropout with probability `p`, drawing the mask from `rng`.
///
/// With `p == 0.0` this is the identity (the input tensor is returned,
/// gradient tape intact). Callers that need two statistically independent
/// perturbations must pass independently seeded generators; reusing one
/// mask across branches is a correctness bug, not an optimization.
pub fn dropout<R: Rng>(a: &Tensor, p: f32, rng: &mut R) -> Tensor {
    assert!((0.0..1.0).contains(&p), "dropout probability must be in [0, 1)");

    if p == 0.0 {
        return a.clone();
    }

    let keep_scale = 1.0 / (1.0 - p);
    let mask = Array1::from(
        (0..a.len())
            .map(|_| if rng.gen::<f32>() < p { 0.0 } else { keep_scale })
            .collect::<Vec<f32>>(),
    );

    let data = a.data() * &mask;
    let requires_grad = a.requires_grad();
    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(DropoutBackward {
            a: a.clone(),
            mask,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct DropoutBackward {
    a: Tensor,
    mask: Array1<f32>,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for DropoutBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // Same mask as the forward pass, scaling included
                self.a.accumulate_grad(grad * &self.mask);
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_dropout_zero_probability_is_identity() {
        let mut rng = StdRng::seed_from_u64(1);
        let a = Tensor::from_vec(vec![1.0, 2.0, 3.0], true);
        let out = dropout(&a, 0.0, &mut rng);
        assert_eq!(out.data().as_slice().unwrap(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_dropout_zeroes_and_rescales() {
        let mut rng = StdRng::seed_from_u64(7);
        let a = Tensor::from_vec(vec![1.0; 1000], false);
        let out = dropout(&a, 0.5, &mut rng);
        let zeros = out.data().iter().filter(|&&v| v == 0.0).count();
        // Survivors are exactly 1/(1-p) = 2.0
        assert!(out.data().iter().all(|&v| v == 0.0 || (v - 2.0).abs() < 1e-6));
        // Roughly half dropped
        assert!(zeros > 350 && zeros < 650, "dropped {zeros} of 1000");
    }

    #[test]
    fn test_independent_streams_draw_different_masks() {
        let mut rng1 = StdRng::seed_from_u64(11);
        let mut rng2 = StdRng::seed_from_u64(13);
        let a = Tensor::from_vec(vec![1.0; 256], false);
        let out1 = dropout(&a, 0.5, &mut rng1);
        let out2 = dropout(&a, 0.5, &mut rng2);
        assert_ne!(
            out1.data().as_slice().unwrap(),
            out2.data().as_slice().unwrap(),
            "independently seeded masks must differ"
        );
    }

    #[test]
    fn test_dropout_backward_uses_mask() {
        let mut rng = StdRng::seed_from_u64(3);
        let a = Tensor::from_vec(vec![1.0; 64], true);
        let mut out = dropout(&a, 0.5, &mut rng);
        let out_data = out.data().clone();
        crate::autograd::backward(&mut out, None);
        let grad = a.grad().unwrap();
        // Gradient is zero exactly where the activation was dropped
        for (g, o) in grad.iter().zip(out_data.iter()) {
            assert_eq!(*g == 0.0, *o == 0.0);
        }
    }
}
