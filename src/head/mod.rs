//! Supervised prediction heads over the shared embedding table
//!
//! Heads compose with a [`FieldEmbedding`] passed by reference at call
//! time rather than owning it, so the same pretrained table can back any
//! number of heads.

mod fm;
mod mlp;

pub use fm::{fm_interaction, FmHead};
pub use mlp::{MlpHead, DEFAULT_HIDDEN_DIM};

use crate::error::Result;
use crate::fields::FieldEmbedding;
use crate::Tensor;

/// A scoring function over embedded field batches
pub trait PredictionHead {
    /// One scalar score per sample, differentiable into the table and
    /// the head's own parameters
    fn forward(
        &self,
        embedding: &FieldEmbedding,
        batch: &[u32],
        batch_size: usize,
    ) -> Result<Tensor>;

    /// Short identifier for reporting
    fn name(&self) -> &'static str;
}
