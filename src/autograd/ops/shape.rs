//! Shape autograd operations: narrow, concat, column slicing
//!
//! These keep the gradient tape intact when a batch is processed one
//! sample at a time (narrow/concat over rows) or when attention heads are
//! sliced out of a projection (slice_cols/concat_cols).

use crate::autograd::{BackwardOp, Tensor};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// Contiguous sub-range `[start, start + len)` of a flattened tensor
pub fn narrow(a: &Tensor, start: usize, len: usize) -> Tensor {
    assert!(start + len <= a.len(), "narrow range out of bounds");

    let slice = &a.data().as_slice().expect("tensor must be contiguous")[start..start + len];
    let requires_grad = a.requires_grad();
    let mut result = Tensor::new(Array1::from(slice.to_vec()), requires_grad);

    if requires_grad {
        let backward_op = Rc::new(NarrowBackward {
            a: a.clone(),
            start,
            len,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct NarrowBackward {
    a: Tensor,
    start: usize,
    len: usize,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for NarrowBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // Scatter the gradient back into the source range
                let mut grad_a = vec![0.0f32; self.a.len()];
                grad_a[self.start..self.start + self.len]
                    .copy_from_slice(grad.as_slice().expect("gradient must be contiguous"));
                self.a.accumulate_grad(Array1::from(grad_a));
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }
}

/// Concatenate tensors end to end
pub fn concat(parts: &[Tensor]) -> Tensor {
    assert!(!parts.is_empty(), "concat needs at least one tensor");

    let total: usize = parts.iter().map(Tensor::len).sum();
    let mut data = Vec::with_capacity(total);
    for part in parts {
        data.extend_from_slice(part.data().as_slice().expect("tensor must be contiguous"));
    }

    let requires_grad = parts.iter().any(Tensor::requires_grad);
    let mut result = Tensor::new(Array1::from(data), requires_grad);

    if requires_grad {
        let backward_op = Rc::new(ConcatBackward {
            parts: parts.to_vec(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct ConcatBackward {
    parts: Vec<Tensor>,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for ConcatBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let grad_slice = grad.as_slice().expect("gradient must be contiguous");
            let mut offset = 0;
            for part in &self.parts {
                let len = part.len();
                if part.requires_grad() {
                    part.accumulate_grad(Array1::from(grad_slice[offset..offset + len].to_vec()));
                }
                offset += len;
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        self.parts.clone()
    }
}

/// Extract a column block from a row-major (rows x row_width) matrix
pub fn slice_cols(
    a: &Tensor,
    rows: usize,
    row_width: usize,
    col_start: usize,
    col_len: usize,
) -> Tensor {
    assert_eq!(a.len(), rows * row_width, "matrix size mismatch");
    assert!(col_start + col_len <= row_width, "column range out of bounds");

    let a_slice = a.data().as_slice().expect("tensor must be contiguous");
    let mut data = Vec::with_capacity(rows * col_len);
    for r in 0..rows {
        let start = r * row_width + col_start;
        data.extend_from_slice(&a_slice[start..start + col_len]);
    }

    let requires_grad = a.requires_grad();
    let mut result = Tensor::new(Array1::from(data), requires_grad);

    if requires_grad {
        let backward_op = Rc::new(SliceColsBackward {
            a: a.clone(),
            rows,
            row_width,
            col_start,
            col_len,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct SliceColsBackward {
    a: Tensor,
    rows: usize,
    row_width: usize,
    col_start: usize,
    col_len: usize,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for SliceColsBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                let grad_slice = grad.as_slice().expect("gradient must be contiguous");
                let mut grad_a = vec![0.0f32; self.a.len()];
                for r in 0..self.rows {
                    let dst = r * self.row_width + self.col_start;
                    let src = r * self.col_len;
                    grad_a[dst..dst + self.col_len]
                        .copy_from_slice(&grad_slice[src..src + self.col_len]);
                }
                self.a.accumulate_grad(Array1::from(grad_a));
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }
}

/// Interleave equal-width column blocks into one row-major matrix
///
/// Inverse of slicing `parts.len()` blocks of `part_width` columns out of
/// a (rows x parts.len()*part_width) matrix.
pub fn concat_cols(parts: &[Tensor], rows: usize, part_width: usize) -> Tensor {
    assert!(!parts.is_empty(), "concat_cols needs at least one tensor");
    for part in parts {
        assert_eq!(part.len(), rows * part_width, "column block size mismatch");
    }

    let row_width = parts.len() * part_width;
    let mut data = vec![0.0f32; rows * row_width];
    for (p, part) in parts.iter().enumerate() {
        let part_slice = part.data().as_slice().expect("tensor must be contiguous");
        for r in 0..rows {
            let dst = r * row_width + p * part_width;
            let src = r * part_width;
            data[dst..dst + part_width].copy_from_slice(&part_slice[src..src + part_width]);
        }
    }

    let requires_grad = parts.iter().any(Tensor::requires_grad);
    let mut result = Tensor::new(Array1::from(data), requires_grad);

    if requires_grad {
        let backward_op = Rc::new(ConcatColsBackward {
            parts: parts.to_vec(),
            rows,
            part_width,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct ConcatColsBackward {
    parts: Vec<Tensor>,
    rows: usize,
    part_width: usize,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for ConcatColsBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let grad_slice = grad.as_slice().expect("gradient must be contiguous");
            let row_width = self.parts.len() * self.part_width;

            for (p, part) in self.parts.iter().enumerate() {
                if !part.requires_grad() {
                    continue;
                }
                let mut grad_part = vec![0.0f32; self.rows * self.part_width];
                for r in 0..self.rows {
                    let src = r * row_width + p * self.part_width;
                    let dst = r * self.part_width;
                    grad_part[dst..dst + self.part_width]
                        .copy_from_slice(&grad_slice[src..src + self.part_width]);
                }
                part.accumulate_grad(Array1::from(grad_part));
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        self.parts.clone()
    }
}
