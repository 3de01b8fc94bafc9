//! Stacked encoder

use crate::Tensor;
use rand::Rng;

use super::block::EncoderBlock;
use super::config::EncoderConfig;

/// Stack of encoder blocks sharing one configuration
///
/// The consistency objective runs both perturbation branches through the
/// same `Encoder` instance, so the weights are shared by construction.
pub struct Encoder {
    config: EncoderConfig,
    blocks: Vec<EncoderBlock>,
}

impl Encoder {
    /// Create a stack of `config.num_layers` blocks
    pub fn new(config: &EncoderConfig) -> Self {
        Self {
            config: config.clone(),
            blocks: (0..config.num_layers)
                .map(|_| EncoderBlock::new(config))
                .collect(),
        }
    }

    /// Configuration
    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Forward pass over `seq_len` positions
    pub fn forward<R: Rng>(
        &self,
        x: &Tensor,
        seq_len: usize,
        training: bool,
        rng: &mut R,
    ) -> Tensor {
        let mut hidden = x.clone();
        for block in &self.blocks {
            hidden = block.forward(&hidden, seq_len, training, rng);
        }
        hidden
    }

    /// Get all parameters as a vector
    pub fn parameters(&self) -> Vec<&Tensor> {
        self.blocks.iter().flat_map(EncoderBlock::parameters).collect()
    }

    /// Get all parameters as mutable references for optimizer
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.blocks
            .iter_mut()
            .flat_map(EncoderBlock::parameters_mut)
            .collect()
    }
}
