//! Stacked self-attention sequence encoder
//!
//! The perturbation-consistency objective treats the field axis of a
//! sample's embedding tensor as a sequence and runs it through this
//! encoder: multi-head self-attention plus a ReLU feed-forward block with
//! internal dropout, repeated for a configured number of layers, with
//! post-norm residual connections.

mod attention;
mod block;
mod config;
mod feedforward;
mod linear;
mod model;
mod norm;

pub use attention::MultiHeadAttention;
pub use block::EncoderBlock;
pub use config::EncoderConfig;
pub use feedforward::FeedForward;
pub use linear::Linear;
pub use model::Encoder;
pub use norm::LayerNorm;
