//! Matrix multiplication and bias autograd operations
//!
//! GEMM runs through ndarray's `dot` on 2-D views; matrices are flattened
//! row-major with explicit dimensions.

use crate::autograd::{BackwardOp, Tensor};
use ndarray::{Array1, ArrayView2};
use std::cell::RefCell;
use std::rc::Rc;

/// Transpose a row-major matrix (rows x cols) to (cols x rows)
#[inline]
pub fn transpose(data: &[f32], rows: usize, cols: usize) -> Vec<f32> {
    let mut transposed = vec![0.0f32; rows * cols];
    for r in 0..rows {
        for c in 0..cols {
            transposed[c * rows + r] = data[r * cols + c];
        }
    }
    transposed
}

/// Compute C = A @ B on flattened row-major slices
pub fn matmul_compute(a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Vec<f32> {
    let a = ArrayView2::from_shape((m, k), a).expect("matrix A dims must match slice length");
    let b = ArrayView2::from_shape((k, n), b).expect("matrix B dims must match slice length");
    a.dot(&b).into_iter().collect()
}

/// Matrix multiplication
///
/// Computes C = A @ B where:
/// - A is m×k (flattened to length m*k)
/// - B is k×n (flattened to length k*n)
/// - C is m×n (flattened to length m*n)
pub fn matmul(a: &Tensor, b: &Tensor, m: usize, k: usize, n: usize) -> Tensor {
    assert_eq!(a.len(), m * k, "Matrix A size mismatch");
    assert_eq!(b.len(), k * n, "Matrix B size mismatch");

    let result_data = matmul_compute(
        a.data().as_slice().expect("matrix A must be contiguous"),
        b.data().as_slice().expect("matrix B must be contiguous"),
        m,
        k,
        n,
    );

    let requires_grad = a.requires_grad() || b.requires_grad();
    let mut result = Tensor::new(Array1::from(result_data), requires_grad);

    if requires_grad {
        let backward_op = Rc::new(MatmulBackward {
            a: a.clone(),
            b: b.clone(),
            m,
            k,
            n,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct MatmulBackward {
    a: Tensor,
    b: Tensor,
    m: usize,
    k: usize,
    n: usize,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for MatmulBackward {
    fn backward(&self) {
        if let Some(grad_output) = self.result_grad.borrow().as_ref() {
            // ∂L/∂A = ∂L/∂C @ B^T  (m×n) @ (n×k) = (m×k)
            // ∂L/∂B = A^T @ ∂L/∂C  (k×m) @ (m×n) = (k×n)
            let grad_c = grad_output.as_slice().expect("gradient must be contiguous");
            let a_data = self.a.data();
            let b_data = self.b.data();
            let a_slice = a_data.as_slice().expect("matrix A must be contiguous");
            let b_slice = b_data.as_slice().expect("matrix B must be contiguous");

            if self.a.requires_grad() {
                let b_t = transpose(b_slice, self.k, self.n);
                let grad_a = matmul_compute(grad_c, &b_t, self.m, self.n, self.k);
                self.a.accumulate_grad(Array1::from(grad_a));
            }

            if self.b.requires_grad() {
                let a_t = transpose(a_slice, self.m, self.k);
                let grad_b = matmul_compute(&a_t, grad_c, self.k, self.m, self.n);
                self.b.accumulate_grad(Array1::from(grad_b));
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone(), self.b.clone()]
    }
}

/// Broadcast-add a bias row vector to every row of a (rows x cols) matrix
pub fn add_bias(x: &Tensor, bias: &Tensor, rows: usize, cols: usize) -> Tensor {
    assert_eq!(x.len(), rows * cols, "input size mismatch");
    assert_eq!(bias.len(), cols, "bias length must equal column count");

    let bias_data = bias.data();
    let mut data = x.data().to_vec();
    for r in 0..rows {
        for c in 0..cols {
            data[r * cols + c] += bias_data[c];
        }
    }

    let requires_grad = x.requires_grad() || bias.requires_grad();
    let mut result = Tensor::new(Array1::from(data), requires_grad);

    if requires_grad {
        let backward_op = Rc::new(AddBiasBackward {
            x: x.clone(),
            bias: bias.clone(),
            rows,
            cols,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct AddBiasBackward {
    x: Tensor,
    bias: Tensor,
    rows: usize,
    cols: usize,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for AddBiasBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.x.requires_grad() {
                self.x.accumulate_grad(grad.clone());
            }
            if self.bias.requires_grad() {
                // ∂L/∂bias_c = sum over rows of ∂L/∂out[r, c]
                let mut grad_bias = vec![0.0f32; self.cols];
                for r in 0..self.rows {
                    for c in 0..self.cols {
                        grad_bias[c] += grad[r * self.cols + c];
                    }
                }
                self.bias.accumulate_grad(Array1::from(grad_bias));
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.x.clone(), self.bias.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transpose_2x3() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let result = transpose(&data, 2, 3);
        assert_eq!(result, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_matmul_compute_2x2() {
        // A = [[1, 2], [3, 4]], B = [[5, 6], [7, 8]], C = [[19, 22], [43, 50]]
        let a = vec![1.0, 2.0, 3.0, 4.0];
        let b = vec![5.0, 6.0, 7.0, 8.0];
        let c = matmul_compute(&a, &b, 2, 2, 2);
        assert_eq!(c, vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_matmul_compute_rectangular() {
        // (2x3) @ (3x2)
        let a = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let b = vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0];
        let c = matmul_compute(&a, &b, 2, 3, 2);
        assert_eq!(c, vec![58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_matmul_backward_shapes() {
        let a = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], true);
        let b = Tensor::from_vec(vec![0.5, 0.5, 0.5, 0.5], true);
        let mut c = matmul(&a, &b, 2, 2, 2);
        crate::autograd::backward(&mut c, None);
        assert_eq!(a.grad().unwrap().len(), 4);
        assert_eq!(b.grad().unwrap().len(), 4);
    }

    #[test]
    fn test_add_bias_forward_and_backward() {
        let x = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], true);
        let bias = Tensor::from_vec(vec![10.0, 20.0], true);
        let mut y = add_bias(&x, &bias, 2, 2);
        assert_eq!(y.data().as_slice().unwrap(), &[11.0, 22.0, 13.0, 24.0]);

        crate::autograd::backward(&mut y, None);
        // bias gradient sums over rows
        assert_eq!(bias.grad().unwrap().as_slice().unwrap(), &[2.0, 2.0]);
        assert_eq!(x.grad().unwrap().as_slice().unwrap(), &[1.0, 1.0, 1.0, 1.0]);
    }
}
