//! Self-supervised feature-interaction pretraining for categorical
//! field models.
//!
//! This crate learns a shared embedding table for categorical fields
//! (e.g. drug identifier slots) by minimizing a dual self-supervised
//! objective:
//!
//! - an **alignment/separation regularizer** over pairwise sample
//!   embeddings ([`objective::AlignmentSeparation`]), and
//! - a **perturbation-consistency loss** comparing two independently
//!   dropout-perturbed views of the same embedding after a shared
//!   self-attention encoder ([`objective::PerturbationConsistency`]).
//!
//! The same table then feeds supervised prediction heads
//! ([`head::FmHead`], [`head::MlpHead`]) for fine-tuning.
//!
//! ```
//! use entrelazar::objective::InteractionObjective;
//!
//! let fields = [3, 5, 2];
//! let mut obj = InteractionObjective::with_seed(&fields, 4, 4, 0.5, 42);
//! // one batch of 4 samples, 3 fields each
//! let batch = vec![0, 1, 0, 2, 4, 1, 1, 0, 1, 2, 3, 0];
//! let loss = obj.compute_loss(&batch, 4, 0.5, 0.05, true).unwrap();
//! assert!(loss.data()[0].is_finite());
//! ```

pub mod autograd;
pub mod data;
pub mod encoder;
pub mod error;
pub mod fields;
pub mod head;
pub mod objective;

pub use autograd::Tensor;
pub use error::{ModelError, Result};
