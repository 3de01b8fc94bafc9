//! Alignment/separation regularizer over paired sample embeddings

use crate::autograd::{BackwardOp, Tensor};
use crate::error::{ModelError, Result};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

use super::pairs::PairIndexSet;

/// Denominator guard for the separation cosine
pub const SIMILARITY_EPS: f32 = 1e-4;

/// Pulls paired sample embeddings together and pushes a sample's own
/// field embeddings apart
///
/// Alignment: mean squared per-field Euclidean distance over all sample
/// pairs. Separation: mean epsilon-guarded cosine similarity over all
/// ordered field pairs of each sample. The loss is the sum of the two.
pub struct AlignmentSeparation {
    pairs: PairIndexSet,
}

impl AlignmentSeparation {
    /// Build the objective for a fixed batch size
    pub fn new(batch_size: usize) -> Self {
        Self {
            pairs: PairIndexSet::new(batch_size),
        }
    }

    /// Precomputed pair set
    pub fn pairs(&self) -> &PairIndexSet {
        &self.pairs
    }

    fn validate(
        &self,
        embedding: &Tensor,
        batch_size: usize,
        num_fields: usize,
        embed_dim: usize,
    ) -> Result<()> {
        if batch_size != self.pairs.batch_size() {
            return Err(ModelError::BatchSizeMismatch {
                expected: self.pairs.batch_size(),
                actual: batch_size,
            });
        }
        let expected = batch_size * num_fields * embed_dim;
        if embedding.len() != expected {
            return Err(ModelError::ShapeMismatch {
                what: "embedding tensor",
                expected,
                actual: embedding.len(),
            });
        }
        Ok(())
    }

    /// Scalar loss with an analytic backward op into the embedding tensor
    pub fn forward(
        &self,
        embedding: &Tensor,
        batch_size: usize,
        num_fields: usize,
        embed_dim: usize,
    ) -> Result<Tensor> {
        let (align, separate) = self.terms(embedding, batch_size, num_fields, embed_dim)?;

        let requires_grad = embedding.requires_grad();
        let mut result = Tensor::from_vec(vec![align + separate], requires_grad);

        if requires_grad {
            let backward_op = Rc::new(AlignSepBackward {
                embedding: embedding.clone(),
                pairs: self.pairs.clone(),
                batch_size,
                num_fields,
                embed_dim,
                result_grad: result.grad_cell(),
            });
            result.set_backward_op(backward_op);
        }

        Ok(result)
    }

    /// Both sub-terms as plain floats, for inspection
    pub fn terms(
        &self,
        embedding: &Tensor,
        batch_size: usize,
        num_fields: usize,
        embed_dim: usize,
    ) -> Result<(f32, f32)> {
        self.validate(embedding, batch_size, num_fields, embed_dim)?;

        let data = embedding.data();
        let e = data.as_slice().expect("tensor must be contiguous");
        let f = num_fields;
        let d = embed_dim;
        let sample = f * d;

        // Alignment: mean over (pairs x fields) of squared distance
        let mut align = 0.0f32;
        for (i, j) in self.pairs.iter() {
            let ei = &e[i * sample..(i + 1) * sample];
            let ej = &e[j * sample..(j + 1) * sample];
            for (a, b) in ei.iter().zip(ej) {
                let diff = a - b;
                align += diff * diff;
            }
        }
        if !self.pairs.is_empty() {
            align /= (self.pairs.len() * f) as f32;
        }

        // Separation: mean over (samples x F x F) of guarded cosine
        let mut separate = 0.0f32;
        for b in 0..batch_size {
            let eb = &e[b * sample..(b + 1) * sample];
            let norms: Vec<f32> = (0..f)
                .map(|k| {
                    eb[k * d..(k + 1) * d]
                        .iter()
                        .map(|x| x * x)
                        .sum::<f32>()
                        .sqrt()
                })
                .collect();
            for p in 0..f {
                for q in 0..f {
                    let dot: f32 = eb[p * d..(p + 1) * d]
                        .iter()
                        .zip(&eb[q * d..(q + 1) * d])
                        .map(|(x, y)| x * y)
                        .sum();
                    separate += dot / (norms[p] * norms[q] + SIMILARITY_EPS);
                }
            }
        }
        if batch_size > 0 {
            separate /= (batch_size * f * f) as f32;
        }

        Ok((align, separate))
    }
}

struct AlignSepBackward {
    embedding: Tensor,
    pairs: PairIndexSet,
    batch_size: usize,
    num_fields: usize,
    embed_dim: usize,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for AlignSepBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let upstream = grad[0];
            let data = self.embedding.data();
            let e = data.as_slice().expect("tensor must be contiguous");
            let f = self.num_fields;
            let d = self.embed_dim;
            let sample = f * d;

            let mut grad_e = vec![0.0f32; e.len()];

            // Alignment gradient: +/- 2/(P*F) * (E_i - E_j)
            if !self.pairs.is_empty() {
                let coeff = 2.0 / (self.pairs.len() * f) as f32;
                for (i, j) in self.pairs.iter() {
                    for k in 0..sample {
                        let diff = e[i * sample + k] - e[j * sample + k];
                        grad_e[i * sample + k] += coeff * diff;
                        grad_e[j * sample + k] -= coeff * diff;
                    }
                }
            }

            // Separation gradient, per sample: for each field p,
            //   2/(B*F^2) * sum_q [ e_q / denom - dot * n_q / (denom^2 * n_p) * e_p ]
            // with denom = n_p * n_q + eps. Zero-norm fields contribute only
            // the first part (their dot terms vanish).
            let coeff = 2.0 / (self.batch_size * f * f) as f32;
            for b in 0..self.batch_size {
                let base = b * sample;
                let eb = &e[base..base + sample];
                let norms: Vec<f32> = (0..f)
                    .map(|k| {
                        eb[k * d..(k + 1) * d]
                            .iter()
                            .map(|x| x * x)
                            .sum::<f32>()
                            .sqrt()
                    })
                    .collect();
                for p in 0..f {
                    for q in 0..f {
                        let dot: f32 = eb[p * d..(p + 1) * d]
                            .iter()
                            .zip(&eb[q * d..(q + 1) * d])
                            .map(|(x, y)| x * y)
                            .sum();
                        let denom = norms[p] * norms[q] + SIMILARITY_EPS;
                        for k in 0..d {
                            let mut g = eb[q * d + k] / denom;
                            if norms[p] > 0.0 {
                                g -= dot * norms[q] * eb[p * d + k] / (denom * denom * norms[p]);
                            }
                            grad_e[base + p * d + k] += coeff * g;
                        }
                    }
                }
            }

            for g in &mut grad_e {
                *g *= upstream;
            }
            self.embedding.accumulate_grad(Array1::from(grad_e));
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.embedding.clone()]
    }
}
