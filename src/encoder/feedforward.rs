//! Position-wise feed-forward network

use crate::autograd::{dropout, relu};
use crate::Tensor;
use rand::Rng;

use super::config::EncoderConfig;
use super::linear::Linear;

/// Two-layer feed-forward network with ReLU and internal dropout
pub struct FeedForward {
    linear1: Linear,
    linear2: Linear,
    dropout_p: f32,
}

impl FeedForward {
    /// Create new FFN layer with initialized weights
    pub fn new(config: &EncoderConfig) -> Self {
        Self {
            linear1: Linear::new(config.embed_dim, config.feedforward_dim),
            linear2: Linear::new(config.feedforward_dim, config.embed_dim),
            dropout_p: config.dropout,
        }
    }

    /// Forward pass over `seq_len` positions
    ///
    /// Dropout is applied between the layers only when `training` is set.
    pub fn forward<R: Rng>(
        &self,
        x: &Tensor,
        seq_len: usize,
        training: bool,
        rng: &mut R,
    ) -> Tensor {
        let hidden = relu(&self.linear1.forward(x, seq_len));
        let hidden = if training {
            dropout(&hidden, self.dropout_p, rng)
        } else {
            hidden
        };
        self.linear2.forward(&hidden, seq_len)
    }

    /// Get all parameters as a vector
    pub fn parameters(&self) -> Vec<&Tensor> {
        let mut params = self.linear1.parameters();
        params.extend(self.linear2.parameters());
        params
    }

    /// Get all parameters as mutable references for optimizer
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.linear1.parameters_mut();
        params.extend(self.linear2.parameters_mut());
        params
    }
}
