//! Factorization-machine prediction head

use crate::autograd::{add, BackwardOp, Tensor};
use crate::error::Result;
use crate::fields::{Embeddable, FieldEmbedding, FieldLinear};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

use super::PredictionHead;

/// Second-order factorization-machine score plus a first-order linear term
///
/// The pairwise interaction uses the closed form
/// `0.5 * sum_d((sum_f v)^2 - sum_f v^2)`, so it is linear in the number
/// of fields rather than quadratic.
pub struct FmHead {
    linear: FieldLinear,
}

impl FmHead {
    /// Build the head for the given field cardinalities
    pub fn new(fields: &[usize]) -> Self {
        Self {
            linear: FieldLinear::new(fields),
        }
    }

    /// First-order term
    pub fn linear(&self) -> &FieldLinear {
        &self.linear
    }

    /// Get all parameters as a vector
    pub fn parameters(&self) -> Vec<&Tensor> {
        self.linear.parameters()
    }

    /// Get all parameters as mutable references for optimizer
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.linear.parameters_mut()
    }
}

impl PredictionHead for FmHead {
    fn forward(
        &self,
        embedding: &FieldEmbedding,
        batch: &[u32],
        batch_size: usize,
    ) -> Result<Tensor> {
        let first_order = self.linear.forward(batch, batch_size)?;
        let embedded = embedding.embed(batch, batch_size)?;
        let second_order = fm_interaction(
            &embedded,
            batch_size,
            embedding.num_fields(),
            embedding.embed_dim(),
        );
        Ok(add(&first_order, &second_order))
    }

    fn name(&self) -> &'static str {
        "fm"
    }
}

/// Closed-form pairwise interaction over a `(B, F, D)` embedding tensor
///
/// Returns one scalar per sample:
/// `0.5 * sum_d((sum_f v_fd)^2 - sum_f v_fd^2)`.
pub fn fm_interaction(
    embedding: &Tensor,
    batch_size: usize,
    num_fields: usize,
    embed_dim: usize,
) -> Tensor {
    assert_eq!(
        embedding.len(),
        batch_size * num_fields * embed_dim,
        "embedding tensor size mismatch"
    );

    let data = embedding.data();
    let e = data.as_slice().expect("tensor must be contiguous");
    let sample = num_fields * embed_dim;

    let mut scores = Vec::with_capacity(batch_size);
    for b in 0..batch_size {
        let eb = &e[b * sample..(b + 1) * sample];
        let mut score = 0.0f32;
        for k in 0..embed_dim {
            let mut s = 0.0f32;
            let mut sq = 0.0f32;
            for f in 0..num_fields {
                let v = eb[f * embed_dim + k];
                s += v;
                sq += v * v;
            }
            score += s * s - sq;
        }
        scores.push(0.5 * score);
    }

    let requires_grad = embedding.requires_grad();
    let mut result = Tensor::from_vec(scores, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(FmInteractionBackward {
            embedding: embedding.clone(),
            batch_size,
            num_fields,
            embed_dim,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct FmInteractionBackward {
    embedding: Tensor,
    batch_size: usize,
    num_fields: usize,
    embed_dim: usize,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for FmInteractionBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let data = self.embedding.data();
            let e = data.as_slice().expect("tensor must be contiguous");
            let d = self.embed_dim;
            let sample = self.num_fields * d;

            // d(score)/dv_fd = sum_f'(v_f'd) - v_fd
            let mut grad_e = vec![0.0f32; e.len()];
            for b in 0..self.batch_size {
                let base = b * sample;
                let g = grad[b];
                for k in 0..d {
                    let s: f32 = (0..self.num_fields).map(|f| e[base + f * d + k]).sum();
                    for f in 0..self.num_fields {
                        grad_e[base + f * d + k] = g * (s - e[base + f * d + k]);
                    }
                }
            }
            self.embedding.accumulate_grad(Array1::from(grad_e));
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.embedding.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_orthogonal_embeddings_interact_zero() {
        // Disjoint support means every cross product vanishes
        let e = Tensor::from_vec(vec![1.0, 0.0, 0.0, 2.0], false);
        let out = fm_interaction(&e, 1, 2, 2);
        assert_relative_eq!(out.data()[0], 0.0);
    }

    #[test]
    fn test_interaction_matches_pairwise_sum() {
        // Two fields: interaction is dot(v0, v1)
        let e = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], false);
        let out = fm_interaction(&e, 1, 2, 2);
        assert_relative_eq!(out.data()[0], 1.0 * 3.0 + 2.0 * 4.0);
    }

    #[test]
    fn test_interaction_backward() {
        let e = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], true);
        let mut out = fm_interaction(&e, 1, 2, 2);
        crate::autograd::backward(&mut out, None);
        // grad of dot(v0, v1) wrt v0 is v1 and vice versa
        assert_eq!(
            e.grad().unwrap().as_slice().unwrap(),
            &[3.0, 4.0, 1.0, 2.0]
        );
    }

    #[test]
    fn test_head_output_shape() {
        let table = FieldEmbedding::new(&[3, 5, 2], 4);
        let head = FmHead::new(&[3, 5, 2]);
        let out = head.forward(&table, &[0, 0, 0, 2, 4, 1], 2).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_head_rejects_bad_index() {
        let table = FieldEmbedding::new(&[3, 5, 2], 4);
        let head = FmHead::new(&[3, 5, 2]);
        assert!(head.forward(&table, &[0, 0, 9], 1).is_err());
    }

    #[test]
    fn test_head_backward_reaches_table() {
        let table = FieldEmbedding::new(&[3, 5, 2], 4);
        let head = FmHead::new(&[3, 5, 2]);
        let mut out = head.forward(&table, &[2, 4, 1], 1).unwrap();
        crate::autograd::backward(&mut out, None);
        assert!(table.weight.grad().is_some());
        assert!(head.linear().weight.grad().is_some());
    }
}
