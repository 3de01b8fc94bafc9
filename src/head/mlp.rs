//! MLP prediction head

use crate::autograd::relu;
use crate::encoder::Linear;
use crate::error::Result;
use crate::fields::{Embeddable, FieldEmbedding};
use crate::Tensor;

use super::PredictionHead;

/// Default hidden width
pub const DEFAULT_HIDDEN_DIM: usize = 128;

/// Two-layer perceptron over the flattened field embeddings
///
/// Each sample's `(F, D)` embedding is flattened to `F*D` and mapped
/// through `Linear -> ReLU -> Linear` to one scalar.
pub struct MlpHead {
    fc1: Linear,
    fc2: Linear,
}

impl MlpHead {
    /// Build the head with the default hidden width
    pub fn new(num_fields: usize, embed_dim: usize) -> Self {
        Self::with_hidden_dim(num_fields, embed_dim, DEFAULT_HIDDEN_DIM)
    }

    /// Build the head with an explicit hidden width
    pub fn with_hidden_dim(num_fields: usize, embed_dim: usize, hidden_dim: usize) -> Self {
        Self {
            fc1: Linear::new(num_fields * embed_dim, hidden_dim),
            fc2: Linear::new(hidden_dim, 1),
        }
    }

    /// Get all parameters as a vector
    pub fn parameters(&self) -> Vec<&Tensor> {
        let mut params = self.fc1.parameters();
        params.extend(self.fc2.parameters());
        params
    }

    /// Get all parameters as mutable references for optimizer
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.fc1.parameters_mut();
        params.extend(self.fc2.parameters_mut());
        params
    }
}

impl PredictionHead for MlpHead {
    fn forward(
        &self,
        embedding: &FieldEmbedding,
        batch: &[u32],
        batch_size: usize,
    ) -> Result<Tensor> {
        let embedded = embedding.embed(batch, batch_size)?;
        let hidden = relu(&self.fc1.forward(&embedded, batch_size));
        Ok(self.fc2.forward(&hidden, batch_size))
    }

    fn name(&self) -> &'static str {
        "mlp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_head_output_shape() {
        let table = FieldEmbedding::new(&[3, 5, 2], 4);
        let head = MlpHead::with_hidden_dim(3, 4, 8);
        let out = head.forward(&table, &[0, 0, 0, 2, 4, 1], 2).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_head_backward_reaches_table_and_layers() {
        let table = FieldEmbedding::new(&[3, 5, 2], 4);
        let head = MlpHead::with_hidden_dim(3, 4, 8);
        let mut out = head.forward(&table, &[2, 4, 1], 1).unwrap();
        crate::autograd::backward(&mut out, None);
        assert!(table.weight.grad().is_some());
        assert!(head.fc1.weight.grad().is_some());
        assert!(head.fc2.weight.grad().is_some());
    }

    #[test]
    fn test_head_rejects_bad_batch() {
        let table = FieldEmbedding::new(&[3, 5, 2], 4);
        let head = MlpHead::new(3, 4);
        assert!(head.forward(&table, &[0, 0], 1).is_err());
    }

    #[test]
    fn test_parameter_census() {
        let head = MlpHead::new(3, 4);
        assert_eq!(head.parameters().len(), 4);
    }
}
