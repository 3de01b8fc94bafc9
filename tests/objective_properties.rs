//! Integration tests for the self-supervised objective and its supporting
//! machinery: pair enumeration, offset lookup, loss bounds, error paths,
//! and the batch producer.

use approx::assert_relative_eq;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use entrelazar::autograd::dropout;
use entrelazar::data::CyclicBatches;
use entrelazar::encoder::EncoderConfig;
use entrelazar::fields::{field_offsets, Embeddable, FieldEmbedding};
use entrelazar::head::fm_interaction;
use entrelazar::objective::{
    AlignmentSeparation, InteractionObjective, PairIndexSet, PerturbationConsistency,
    DEFAULT_ALPHA, DEFAULT_BETA,
};
use entrelazar::{ModelError, Tensor};

#[test]
fn pair_set_for_batch_of_four_is_complete() {
    let pairs = PairIndexSet::new(4);
    assert_eq!(
        pairs.iter().collect::<Vec<_>>(),
        vec![(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)]
    );
}

#[test]
fn offsets_and_lookup_roundtrip() {
    let fields = [3usize, 5, 2];
    assert_eq!(field_offsets(&fields), vec![0, 3, 8]);

    // Sample [2, 4, 1] must resolve to global rows [2, 7, 9]
    let table = FieldEmbedding::new(&fields, 4);
    let out = table.embed(&[2, 4, 1], 1).unwrap();
    let weight = table.weight.data();
    for (slot, row) in [2usize, 7, 9].iter().enumerate() {
        assert_eq!(out.data()[slot * 4], weight[row * 4]);
    }
}

#[test]
fn stale_pair_set_is_a_hard_error() {
    let mut obj = InteractionObjective::new(&[3, 5, 2], 1024, &EncoderConfig::tiny(), 0.5, 7);
    let batch = vec![0u32; 7 * 3];
    let err = obj
        .compute_loss(&batch, 7, DEFAULT_ALPHA, DEFAULT_BETA, true)
        .unwrap_err();
    assert_eq!(
        err,
        ModelError::BatchSizeMismatch {
            expected: 1024,
            actual: 7
        }
    );
}

#[test]
fn consistency_is_exactly_zero_without_perturbation() {
    let config = EncoderConfig::tiny();
    let mut obj = PerturbationConsistency::new(3, &config, 0.0, 11);
    let e = Tensor::from_vec(
        (0..2 * 3 * config.embed_dim)
            .map(|i| (i as f32 * 0.31).cos())
            .collect(),
        true,
    );
    let loss = obj.forward(&e, 2, false).unwrap();
    assert_eq!(loss.data()[0], 0.0);
}

#[test]
fn fm_interaction_of_orthogonal_vectors_is_zero() {
    let e = Tensor::from_vec(vec![2.0, 0.0, 0.0, -3.0], false);
    let out = fm_interaction(&e, 1, 2, 2);
    assert_relative_eq!(out.data()[0], 0.0);
}

#[test]
fn independent_streams_produce_different_masks() {
    let mut rng1 = StdRng::seed_from_u64(42);
    let mut rng2 = StdRng::seed_from_u64(42 ^ 0x9e37_79b9_7f4a_7c15);
    let x = Tensor::from_vec(vec![1.0; 256], false);
    let a = dropout(&x, 0.5, &mut rng1);
    let b = dropout(&x, 0.5, &mut rng2);
    assert_ne!(a.data().as_slice().unwrap(), b.data().as_slice().unwrap());
}

#[test]
fn cyclic_producer_wraps_around() {
    let batches: Vec<Vec<u32>> = CyclicBatches::new(vec![0, 1, 2, 3, 4], 1, 3)
        .unwrap()
        .take(3)
        .collect();
    assert_eq!(batches[0], vec![0, 1, 2]);
    assert_eq!(batches[1], vec![3, 4, 0]);
    assert_eq!(batches[2], vec![1, 2, 3]);
}

#[test]
fn composite_loss_gradient_is_finite_everywhere() {
    let mut obj = InteractionObjective::new(&[3, 5, 2], 4, &EncoderConfig::tiny(), 0.5, 42);
    let batch = vec![0, 1, 0, 2, 4, 1, 1, 0, 1, 2, 3, 0];
    let mut loss = obj
        .compute_loss(&batch, 4, DEFAULT_ALPHA, DEFAULT_BETA, true)
        .unwrap();
    entrelazar::autograd::backward(&mut loss, None);

    for param in obj.parameters() {
        if let Some(grad) = param.grad() {
            assert!(grad.iter().all(|g| g.is_finite()));
        }
    }
    let table_grad = obj.embedding().weight.grad().unwrap();
    assert!(table_grad.iter().any(|&g| g != 0.0));
}

proptest! {
    #[test]
    fn alignment_is_nonnegative_and_separation_is_bounded(
        values in prop::collection::vec(-1.0f32..1.0, 3 * 2 * 2)
    ) {
        let obj = AlignmentSeparation::new(3);
        let e = Tensor::from_vec(values, false);
        let (align, separate) = obj.terms(&e, 3, 2, 2).unwrap();
        prop_assert!(align >= 0.0);
        prop_assert!(separate.abs() <= 1.0);
    }

    #[test]
    fn consistency_loss_is_nonnegative(
        values in prop::collection::vec(-1.0f32..1.0, 2 * 3 * 4),
        seed in 0u64..1024
    ) {
        let config = EncoderConfig::tiny();
        let mut obj = PerturbationConsistency::new(3, &config, 0.5, seed);
        let e = Tensor::from_vec(values, false);
        let loss = obj.forward(&e, 2, true).unwrap();
        prop_assert!(loss.data()[0] >= 0.0);
    }

    #[test]
    fn embed_rejects_any_out_of_range_index(bad in 3u32..100) {
        let table = FieldEmbedding::new(&[3, 5, 2], 4);
        let err = table.embed(&[bad, 0, 0], 1).unwrap_err();
        prop_assert_eq!(err, ModelError::IndexOutOfRange {
            field: 0,
            index: bad,
            cardinality: 3,
        });
    }
}
