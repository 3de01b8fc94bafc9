//! Encoder block: attention + feed-forward with post-norm residuals

use crate::autograd::{add, dropout};
use crate::Tensor;
use rand::Rng;

use super::attention::MultiHeadAttention;
use super::config::EncoderConfig;
use super::feedforward::FeedForward;
use super::norm::LayerNorm;

/// One encoder layer
///
/// Post-norm residual order: norm(x + dropout(attn(x))), then
/// norm(x + dropout(ffn(x))).
pub struct EncoderBlock {
    config: EncoderConfig,
    /// Self-attention
    pub self_attn: MultiHeadAttention,
    /// Normalization after the attention residual
    pub norm1: LayerNorm,
    /// Normalization after the feed-forward residual
    pub norm2: LayerNorm,
    /// Feed-forward network
    pub ffn: FeedForward,
}

impl EncoderBlock {
    /// Create new encoder block with initialized weights
    pub fn new(config: &EncoderConfig) -> Self {
        Self {
            config: config.clone(),
            self_attn: MultiHeadAttention::new(config),
            norm1: LayerNorm::new(config.embed_dim, config.layer_norm_eps),
            norm2: LayerNorm::new(config.embed_dim, config.layer_norm_eps),
            ffn: FeedForward::new(config),
        }
    }

    /// Forward pass over `seq_len` positions
    pub fn forward<R: Rng>(
        &self,
        x: &Tensor,
        seq_len: usize,
        training: bool,
        rng: &mut R,
    ) -> Tensor {
        let d = self.config.embed_dim;
        let p = self.config.dropout;

        let attn_out = self.self_attn.forward(x, seq_len);
        let attn_out = if training {
            dropout(&attn_out, p, rng)
        } else {
            attn_out
        };
        let x = self
            .norm1
            .forward_batched(&add(x, &attn_out), seq_len, d);

        let ffn_out = self.ffn.forward(&x, seq_len, training, rng);
        let ffn_out = if training {
            dropout(&ffn_out, p, rng)
        } else {
            ffn_out
        };
        self.norm2.forward_batched(&add(&x, &ffn_out), seq_len, d)
    }

    /// Get all parameters as a vector
    pub fn parameters(&self) -> Vec<&Tensor> {
        let mut params = self.self_attn.parameters();
        params.extend(self.norm1.parameters());
        params.extend(self.norm2.parameters());
        params.extend(self.ffn.parameters());
        params
    }

    /// Get all parameters as mutable references for optimizer
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.self_attn.parameters_mut();
        params.extend(self.norm1.parameters_mut());
        params.extend(self.norm2.parameters_mut());
        params.extend(self.ffn.parameters_mut());
        params
    }
}
