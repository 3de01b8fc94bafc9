//! First-order linear term over categorical fields

use crate::autograd::{BackwardOp, Tensor};
use crate::error::Result;
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

use super::{field_offsets, global_rows};

/// Per-category scalar weights plus a global bias
///
/// The factorization-machine head's first-order term: each category value
/// owns one scalar, and a sample's linear score is the sum of its fields'
/// scalars plus the bias.
pub struct FieldLinear {
    /// One scalar per global row
    pub weight: Tensor,
    /// Global bias (length 1)
    pub bias: Tensor,
    fields: Vec<usize>,
    offsets: Vec<u32>,
}

impl FieldLinear {
    /// Create a linear term for the given field cardinalities
    pub fn new(fields: &[usize]) -> Self {
        let total_rows: usize = fields.iter().sum();
        Self {
            weight: Tensor::from_vec(
                (0..total_rows)
                    .map(|i| (i as f32 * 0.111).sin() * 0.01)
                    .collect(),
                true,
            ),
            bias: Tensor::zeros(1, true),
            fields: fields.to_vec(),
            offsets: field_offsets(fields),
        }
    }

    /// Per-sample linear scores, shape (batch_size,)
    pub fn forward(&self, batch: &[u32], batch_size: usize) -> Result<Tensor> {
        let rows = global_rows(&self.fields, &self.offsets, batch, batch_size)?;
        let num_fields = self.fields.len();

        let weight = self.weight.data();
        let bias = self.bias.data()[0];

        let mut scores = Vec::with_capacity(batch_size);
        for sample in rows.chunks(num_fields) {
            let sum: f32 = sample.iter().map(|&row| weight[row]).sum();
            scores.push(sum + bias);
        }

        let requires_grad = self.weight.requires_grad() || self.bias.requires_grad();
        let mut result = Tensor::from_vec(scores, requires_grad);

        if requires_grad {
            let backward_op = Rc::new(FieldLinearBackward {
                weight: self.weight.clone(),
                bias: self.bias.clone(),
                rows,
                num_fields,
                result_grad: result.grad_cell(),
            });
            result.set_backward_op(backward_op);
        }

        Ok(result)
    }

    /// Get all parameters as a vector
    pub fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.weight, &self.bias]
    }

    /// Get all parameters as mutable references for optimizer
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.weight, &mut self.bias]
    }
}

struct FieldLinearBackward {
    weight: Tensor,
    bias: Tensor,
    rows: Vec<usize>,
    num_fields: usize,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for FieldLinearBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let mut grad_w = vec![0.0f32; self.weight.len()];
            let mut grad_b = 0.0f32;
            for (sample, rows) in self.rows.chunks(self.num_fields).enumerate() {
                let g = grad[sample];
                for &row in rows {
                    grad_w[row] += g;
                }
                grad_b += g;
            }
            self.weight.accumulate_grad(Array1::from(grad_w));
            self.bias.accumulate_grad(Array1::from(vec![grad_b]));
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.weight.clone(), self.bias.clone()]
    }
}
