//! Autograd operations

mod activations;
mod attention;
mod basic;
mod dropout;
mod matmul;
mod normalize;
mod shape;

pub use activations::relu;
pub use attention::attention;
pub use basic::{add, mul, scale, sub, sum};
pub use dropout::dropout;
pub use matmul::{add_bias, matmul, matmul_compute, transpose};
pub use normalize::layer_norm;
pub use shape::{concat, concat_cols, narrow, slice_cols};
