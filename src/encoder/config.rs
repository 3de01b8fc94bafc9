//! Encoder configuration

use serde::{Deserialize, Serialize};

/// Configuration for the stacked self-attention encoder
///
/// The field axis of the embedding tensor is treated as the sequence
/// axis, so `embed_dim` doubles as the model width.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Model width (embedding width of each field vector)
    pub embed_dim: usize,
    /// Number of attention heads
    pub num_heads: usize,
    /// Feed-forward intermediate dimension
    pub feedforward_dim: usize,
    /// Number of encoder layers
    pub num_layers: usize,
    /// Internal dropout probability (attention output and FFN)
    pub dropout: f32,
    /// Layer normalization epsilon
    pub layer_norm_eps: f32,
}

impl EncoderConfig {
    /// Default configuration for a given embedding width
    ///
    /// Two heads, feed-forward width 1024, three layers, dropout 0.6.
    /// `embed_dim` must be divisible by the head count (two here), since
    /// attention splits the width evenly across heads; an odd width
    /// panics at construction rather than deep inside the encoder.
    pub fn new(embed_dim: usize) -> Self {
        assert!(
            embed_dim % 2 == 0,
            "embed_dim must be divisible by num_heads (2)"
        );
        Self {
            embed_dim,
            num_heads: 2,
            feedforward_dim: 1024,
            num_layers: 3,
            dropout: 0.6,
            layer_norm_eps: 1e-5,
        }
    }

    /// Tiny configuration for tests
    pub fn tiny() -> Self {
        Self {
            embed_dim: 4,
            num_heads: 2,
            feedforward_dim: 8,
            num_layers: 2,
            dropout: 0.5,
            layer_norm_eps: 1e-5,
        }
    }

    /// Per-head dimension
    pub fn head_dim(&self) -> usize {
        self.embed_dim / self.num_heads
    }
}
