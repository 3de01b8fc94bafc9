//! Shared field embedding table

use crate::autograd::{BackwardOp, Tensor};
use crate::error::Result;
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

use super::{field_offsets, global_rows};

/// Capability of producing a batch field-embedding tensor
///
/// The base model's forward computation is deliberately abstract: the
/// self-supervised objective and every prediction head depend on this
/// trait rather than inheriting a pass-through forward.
pub trait Embeddable {
    /// Number of categorical fields
    fn num_fields(&self) -> usize;

    /// Embedding width
    fn embed_dim(&self) -> usize;

    /// Embed a batch of shape (batch_size, num_fields) of per-field
    /// zero-based indices into a flattened
    /// (batch_size * num_fields * embed_dim) tensor.
    fn embed(&self, batch: &[u32], batch_size: usize) -> Result<Tensor>;
}

/// Embedding table for all categorical fields
///
/// One shared matrix of `sum(fields) x embed_dim` values; field `f`'s row
/// for category `c` is `offsets[f] + c`. The matrix is the only
/// persistent learned state of the self-supervised core.
pub struct FieldEmbedding {
    /// Shared embedding matrix (total_rows x embed_dim, flattened)
    pub weight: Tensor,
    fields: Vec<usize>,
    offsets: Vec<u32>,
    embed_dim: usize,
}

impl FieldEmbedding {
    /// Create a table for the given field cardinalities
    ///
    /// Weights start at small-variance values (deterministic ramp with
    /// standard deviation around 0.01).
    pub fn new(fields: &[usize], embed_dim: usize) -> Self {
        let total_rows: usize = fields.iter().sum();
        Self {
            weight: Tensor::from_vec(
                (0..total_rows * embed_dim)
                    .map(|i| (i as f32 * 0.111).sin() * 0.01)
                    .collect(),
                true,
            ),
            fields: fields.to_vec(),
            offsets: field_offsets(fields),
            embed_dim,
        }
    }

    /// Field cardinalities
    pub fn fields(&self) -> &[usize] {
        &self.fields
    }

    /// Per-field offsets into the shared matrix
    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    /// Total number of rows in the shared matrix
    pub fn total_rows(&self) -> usize {
        self.fields.iter().sum()
    }
}

impl Embeddable for FieldEmbedding {
    fn num_fields(&self) -> usize {
        self.fields.len()
    }

    fn embed_dim(&self) -> usize {
        self.embed_dim
    }

    fn embed(&self, batch: &[u32], batch_size: usize) -> Result<Tensor> {
        let rows = global_rows(&self.fields, &self.offsets, batch, batch_size)?;

        let d = self.embed_dim;
        let weight_data = self.weight.data();
        let weight_slice = weight_data
            .as_slice()
            .expect("embedding weight must be contiguous");

        let mut output = Vec::with_capacity(rows.len() * d);
        for &row in &rows {
            output.extend_from_slice(&weight_slice[row * d..(row + 1) * d]);
        }

        let requires_grad = self.weight.requires_grad();
        let mut result = Tensor::from_vec(output, requires_grad);

        if requires_grad {
            let backward_op = Rc::new(GatherBackward {
                weight: self.weight.clone(),
                rows,
                embed_dim: d,
                result_grad: result.grad_cell(),
            });
            result.set_backward_op(backward_op);
        }

        Ok(result)
    }
}

struct GatherBackward {
    weight: Tensor,
    rows: Vec<usize>,
    embed_dim: usize,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for GatherBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            // Scatter-add each output row's gradient into its source row.
            // Repeated rows accumulate, matching embedding-lookup
            // gradient semantics.
            let grad_slice = grad.as_slice().expect("gradient must be contiguous");
            let d = self.embed_dim;
            let mut grad_w = vec![0.0f32; self.weight.len()];
            for (out_row, &src_row) in self.rows.iter().enumerate() {
                let dst = &mut grad_w[src_row * d..(src_row + 1) * d];
                let src = &grad_slice[out_row * d..(out_row + 1) * d];
                for (acc, &g) in dst.iter_mut().zip(src) {
                    *acc += g;
                }
            }
            self.weight.accumulate_grad(Array1::from(grad_w));
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.weight.clone()]
    }
}
