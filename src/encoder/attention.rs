//! Multi-head self-attention module

use crate::autograd::{attention, concat_cols, matmul, slice_cols};
use crate::Tensor;

use super::config::EncoderConfig;

/// Multi-head self-attention layer
///
/// Heads are sliced out of the Q/K/V projections with tape-preserving
/// column ops, so gradients flow back through every head.
pub struct MultiHeadAttention {
    config: EncoderConfig,
    /// Query projection weight (embed_dim x embed_dim)
    pub w_q: Tensor,
    /// Key projection weight (embed_dim x embed_dim)
    pub w_k: Tensor,
    /// Value projection weight (embed_dim x embed_dim)
    pub w_v: Tensor,
    /// Output projection weight (embed_dim x embed_dim)
    pub w_o: Tensor,
}

impl MultiHeadAttention {
    /// Create new attention layer with initialized weights
    pub fn new(config: &EncoderConfig) -> Self {
        let d = config.embed_dim;
        assert!(
            d % config.num_heads == 0,
            "embed_dim must be divisible by num_heads"
        );

        // Xavier initialization scale, deterministic sin ramp
        let scale = (2.0 / (d + d) as f32).sqrt();
        let init = |mult: f32| {
            Tensor::from_vec(
                (0..d * d).map(|i| (i as f32 * mult).sin() * scale).collect(),
                true,
            )
        };

        Self {
            config: config.clone(),
            w_q: init(0.123),
            w_k: init(0.234),
            w_v: init(0.345),
            w_o: init(0.456),
        }
    }

    /// Forward pass
    ///
    /// `x` is (seq_len x embed_dim, flattened); returns the same shape.
    pub fn forward(&self, x: &Tensor, seq_len: usize) -> Tensor {
        let d = self.config.embed_dim;
        let num_heads = self.config.num_heads;
        let head_dim = self.config.head_dim();

        let q = matmul(x, &self.w_q, seq_len, d, d);
        let k = matmul(x, &self.w_k, seq_len, d, d);
        let v = matmul(x, &self.w_v, seq_len, d, d);

        let heads: Vec<Tensor> = (0..num_heads)
            .map(|h| {
                let q_head = slice_cols(&q, seq_len, d, h * head_dim, head_dim);
                let k_head = slice_cols(&k, seq_len, d, h * head_dim, head_dim);
                let v_head = slice_cols(&v, seq_len, d, h * head_dim, head_dim);
                attention(&q_head, &k_head, &v_head, seq_len, head_dim, head_dim)
            })
            .collect();

        let combined = concat_cols(&heads, seq_len, head_dim);
        matmul(&combined, &self.w_o, seq_len, d, d)
    }

    /// Get all parameters as a vector
    pub fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.w_q, &self.w_k, &self.w_v, &self.w_o]
    }

    /// Get all parameters as mutable references for optimizer
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.w_q, &mut self.w_k, &mut self.w_v, &mut self.w_o]
    }
}
