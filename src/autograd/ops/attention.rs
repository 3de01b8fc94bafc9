//! Scaled dot-product attention with backward pass

use crate::autograd::{BackwardOp, Tensor};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

use super::matmul::{matmul_compute, transpose};

/// Scaled Dot-Product Attention
///
/// Attention(Q, K, V) = softmax(Q @ K^T / sqrt(d_k)) @ V
///
/// - `q`, `k`: (seq_len x d_k, flattened)
/// - `v`: (seq_len x d_v, flattened)
///
/// Returns a (seq_len x d_v, flattened) tensor.
pub fn attention(q: &Tensor, k: &Tensor, v: &Tensor, seq_len: usize, d_k: usize, d_v: usize) -> Tensor {
    assert_eq!(q.len(), seq_len * d_k, "Q size mismatch");
    assert_eq!(k.len(), seq_len * d_k, "K size mismatch");
    assert_eq!(v.len(), seq_len * d_v, "V size mismatch");

    let scale = (d_k as f32).sqrt();

    // Q @ K^T, scaled: (seq_len, seq_len)
    let q_slice = q.data().as_slice().expect("Q must be contiguous");
    let k_slice = k.data().as_slice().expect("K must be contiguous");
    let k_t = transpose(k_slice, seq_len, d_k);
    let mut scores = matmul_compute(q_slice, &k_t, seq_len, d_k, seq_len);
    for score in &mut scores {
        *score /= scale;
    }

    // Row-wise softmax with max subtraction for stability
    let mut attention_weights = vec![0.0; seq_len * seq_len];
    for i in 0..seq_len {
        let row_start = i * seq_len;
        let row = &scores[row_start..row_start + seq_len];

        let max_val = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exp_vals: Vec<f32> = row.iter().map(|&x| (x - max_val).exp()).collect();
        let sum_exp: f32 = exp_vals.iter().sum();

        for (j, &exp_val) in exp_vals.iter().enumerate() {
            attention_weights[row_start + j] = exp_val / sum_exp;
        }
    }

    // Attn @ V: (seq_len, d_v)
    let v_slice = v.data().as_slice().expect("V must be contiguous");
    let output_data = matmul_compute(&attention_weights, v_slice, seq_len, seq_len, d_v);

    let requires_grad = q.requires_grad() || k.requires_grad() || v.requires_grad();
    let mut result = Tensor::new(Array1::from(output_data), requires_grad);

    if requires_grad {
        let backward_op = Rc::new(AttentionBackward {
            q: q.clone(),
            k: k.clone(),
            v: v.clone(),
            attention_weights: Array1::from(attention_weights),
            seq_len,
            d_k,
            d_v,
            scale,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct AttentionBackward {
    q: Tensor,
    k: Tensor,
    v: Tensor,
    attention_weights: Array1<f32>,
    seq_len: usize,
    d_k: usize,
    d_v: usize,
    scale: f32,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for AttentionBackward {
    fn backward(&self) {
        if let Some(grad_output) = self.result_grad.borrow().as_ref() {
            let seq_len = self.seq_len;
            let d_k = self.d_k;
            let d_v = self.d_v;
            let grad_out_slice = grad_output.as_slice().expect("gradient must be contiguous");
            let attn_slice = self.attention_weights.as_slice().expect("weights are contiguous");

            // ∂L/∂V = Attn^T @ ∂L/∂out
            if self.v.requires_grad() {
                let attn_t = transpose(attn_slice, seq_len, seq_len);
                let grad_v = matmul_compute(&attn_t, grad_out_slice, seq_len, seq_len, d_v);
                self.v.accumulate_grad(Array1::from(grad_v));
            }

            // ∂L/∂Attn = ∂L/∂out @ V^T
            let v_data = self.v.data();
            let v_slice = v_data.as_slice().expect("V must be contiguous");
            let v_t = transpose(v_slice, seq_len, d_v);
            let grad_attention_weights = matmul_compute(grad_out_slice, &v_t, seq_len, d_v, seq_len);

            // Softmax gradient, row-wise: p_j * (g_j - sum_k p_k g_k)
            let mut grad_scores = vec![0.0; seq_len * seq_len];
            for i in 0..seq_len {
                let row_start = i * seq_len;
                let mut sum_pk_gradk = 0.0;
                for k in 0..seq_len {
                    let k_idx = row_start + k;
                    sum_pk_gradk += attn_slice[k_idx] * grad_attention_weights[k_idx];
                }
                for j in 0..seq_len {
                    let idx = row_start + j;
                    grad_scores[idx] = attn_slice[idx] * (grad_attention_weights[idx] - sum_pk_gradk);
                }
            }

            // Undo the 1/sqrt(d_k) scaling
            for g in &mut grad_scores {
                *g /= self.scale;
            }

            // ∂L/∂Q = grad_scores @ K
            if self.q.requires_grad() {
                let k_data = self.k.data();
                let k_slice = k_data.as_slice().expect("K must be contiguous");
                let grad_q = matmul_compute(&grad_scores, k_slice, seq_len, seq_len, d_k);
                self.q.accumulate_grad(Array1::from(grad_q));
            }

            // ∂L/∂K = grad_scores^T @ Q
            if self.k.requires_grad() {
                let grad_t = transpose(&grad_scores, seq_len, seq_len);
                let q_data = self.q.data();
                let q_slice = q_data.as_slice().expect("Q must be contiguous");
                let grad_k = matmul_compute(&grad_t, q_slice, seq_len, seq_len, d_k);
                self.k.accumulate_grad(Array1::from(grad_k));
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.q.clone(), self.k.clone(), self.v.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attention_output_shape() {
        let q = Tensor::from_vec(vec![0.1; 3 * 4], false);
        let k = Tensor::from_vec(vec![0.2; 3 * 4], false);
        let v = Tensor::from_vec(vec![0.3; 3 * 2], false);
        let out = attention(&q, &k, &v, 3, 4, 2);
        assert_eq!(out.len(), 3 * 2);
    }

    #[test]
    fn test_attention_rows_are_convex_combinations() {
        // With one value row of all 1.0 and one of all 0.0, every output
        // entry must lie in [0, 1] because attention weights sum to 1.
        let q = Tensor::from_vec(vec![0.5, -0.5, 0.25, 0.75], false);
        let k = Tensor::from_vec(vec![0.1, 0.9, -0.3, 0.2], false);
        let v = Tensor::from_vec(vec![1.0, 1.0, 0.0, 0.0], false);
        let out = attention(&q, &k, &v, 2, 2, 2);
        for &x in out.data().iter() {
            assert!((0.0..=1.0).contains(&x), "output {x} outside convex hull");
        }
    }

    #[test]
    fn test_attention_backward_gradients_finite() {
        let q = Tensor::from_vec(vec![0.1, 0.2, 0.3, 0.4], true);
        let k = Tensor::from_vec(vec![0.4, 0.3, 0.2, 0.1], true);
        let v = Tensor::from_vec(vec![1.0, -1.0, 0.5, -0.5], true);
        let mut out = attention(&q, &k, &v, 2, 2, 2);
        crate::autograd::backward(&mut out, None);

        for t in [&q, &k, &v] {
            let grad = t.grad().expect("gradient should exist");
            assert!(grad.iter().all(|&g| g.is_finite()));
        }
    }
}
