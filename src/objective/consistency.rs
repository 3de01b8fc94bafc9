//! Perturbation-consistency objective

use crate::autograd::{concat, dropout, mul, narrow, scale, sub, sum};
use crate::encoder::{Encoder, EncoderConfig, Linear};
use crate::error::{ModelError, Result};
use crate::Tensor;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Stream separation constant for the second perturbation branch
const BRANCH_SEED_MIX: u64 = 0x9e37_79b9_7f4a_7c15;

/// Penalizes disagreement between two dropout-perturbed views of a batch
///
/// Each branch owns its own random stream; both share one encoder stack
/// but project through branch-local linear layers. The loss is the batch
/// mean of the squared Euclidean distance between the two projections.
pub struct PerturbationConsistency {
    dropout_p: f32,
    num_fields: usize,
    embed_dim: usize,
    encoder: Encoder,
    proj1: Linear,
    proj2: Linear,
    rng1: StdRng,
    rng2: StdRng,
}

impl PerturbationConsistency {
    /// Create the objective with two independently seeded streams
    pub fn new(num_fields: usize, config: &EncoderConfig, dropout_p: f32, seed: u64) -> Self {
        assert!(
            (0.0..1.0).contains(&dropout_p),
            "dropout probability must be in [0, 1)"
        );
        let flat = num_fields * config.embed_dim;
        Self {
            dropout_p,
            num_fields,
            embed_dim: config.embed_dim,
            encoder: Encoder::new(config),
            proj1: Linear::new(flat, config.embed_dim),
            proj2: Linear::new(flat, config.embed_dim),
            rng1: StdRng::seed_from_u64(seed),
            rng2: StdRng::seed_from_u64(seed ^ BRANCH_SEED_MIX),
        }
    }

    /// Perturbation probability
    pub fn dropout_p(&self) -> f32 {
        self.dropout_p
    }

    /// Shared encoder stack
    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    /// Scalar consistency loss
    ///
    /// Differentiable through the op tape: dropout masks, the encoder,
    /// and both projections all contribute gradients.
    pub fn forward(
        &mut self,
        embedding: &Tensor,
        batch_size: usize,
        training: bool,
    ) -> Result<Tensor> {
        let f = self.num_fields;
        let d = self.embed_dim;
        let expected = batch_size * f * d;
        if embedding.len() != expected {
            return Err(ModelError::ShapeMismatch {
                what: "embedding tensor",
                expected,
                actual: embedding.len(),
            });
        }

        let view1 = if training {
            dropout(embedding, self.dropout_p, &mut self.rng1)
        } else {
            embedding.clone()
        };
        let view2 = if training {
            dropout(embedding, self.dropout_p, &mut self.rng2)
        } else {
            embedding.clone()
        };

        // Each sample's field axis is the sequence axis
        let mut rows1 = Vec::with_capacity(batch_size);
        for b in 0..batch_size {
            let sample = narrow(&view1, b * f * d, f * d);
            rows1.push(self.encoder.forward(&sample, f, training, &mut self.rng1));
        }
        let mut rows2 = Vec::with_capacity(batch_size);
        for b in 0..batch_size {
            let sample = narrow(&view2, b * f * d, f * d);
            rows2.push(self.encoder.forward(&sample, f, training, &mut self.rng2));
        }

        let z1 = self.proj1.forward(&concat(&rows1), batch_size);
        let z2 = self.proj2.forward(&concat(&rows2), batch_size);

        let diff = sub(&z1, &z2);
        let squared = mul(&diff, &diff);
        Ok(scale(&sum(&squared), 1.0 / batch_size as f32))
    }

    /// Get all parameters as a vector
    pub fn parameters(&self) -> Vec<&Tensor> {
        let mut params = self.encoder.parameters();
        params.extend(self.proj1.parameters());
        params.extend(self.proj2.parameters());
        params
    }

    /// Get all parameters as mutable references for optimizer
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.encoder.parameters_mut();
        params.extend(self.proj1.parameters_mut());
        params.extend(self.proj2.parameters_mut());
        params
    }
}
