//! Cyclic batch producer
//!
//! Wraps a finite pool of samples as an infinite iterator of fixed-size
//! batches. The pool is traversed in order and wraps around with no
//! end-of-sequence signal; the consumer decides how many batches to take.

use crate::error::{ModelError, Result};

/// Infinite iterator over fixed-size batches of a finite sample pool
///
/// Samples are row-major `(num_fields,)` index rows in one flat buffer.
/// Each `next()` yields `batch_size * num_fields` indices, wrapping
/// around the pool boundary mid-batch when necessary.
#[derive(Debug, Clone)]
pub struct CyclicBatches {
    samples: Vec<u32>,
    num_fields: usize,
    batch_size: usize,
    cursor: usize,
}

impl CyclicBatches {
    /// Wrap a flat sample buffer
    ///
    /// Fails when the buffer is empty, its length is not a multiple of
    /// `num_fields`, or `batch_size` is zero.
    pub fn new(samples: Vec<u32>, num_fields: usize, batch_size: usize) -> Result<Self> {
        if num_fields == 0 || samples.is_empty() || samples.len() % num_fields != 0 {
            return Err(ModelError::ShapeMismatch {
                what: "sample pool",
                expected: num_fields,
                actual: samples.len(),
            });
        }
        if batch_size == 0 {
            return Err(ModelError::ShapeMismatch {
                what: "batch size",
                expected: 1,
                actual: 0,
            });
        }
        Ok(Self {
            samples,
            num_fields,
            batch_size,
            cursor: 0,
        })
    }

    /// Number of samples in the pool
    pub fn pool_len(&self) -> usize {
        self.samples.len() / self.num_fields
    }

    /// Batch size
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl Iterator for CyclicBatches {
    type Item = Vec<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        let pool = self.pool_len();
        let mut batch = Vec::with_capacity(self.batch_size * self.num_fields);
        for _ in 0..self.batch_size {
            let start = self.cursor * self.num_fields;
            batch.extend_from_slice(&self.samples[start..start + self.num_fields]);
            self.cursor = (self.cursor + 1) % pool;
        }
        Some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batches_cover_pool_in_order() {
        let mut batches = CyclicBatches::new(vec![0, 1, 2, 3, 4, 5], 2, 2).unwrap();
        assert_eq!(batches.next().unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(batches.next().unwrap(), vec![4, 5, 0, 1]);
    }

    #[test]
    fn test_wraparound_mid_batch() {
        // Pool of 3 samples, batch of 2: third batch starts at sample 1
        let mut batches = CyclicBatches::new(vec![10, 20, 30], 1, 2).unwrap();
        assert_eq!(batches.next().unwrap(), vec![10, 20]);
        assert_eq!(batches.next().unwrap(), vec![30, 10]);
        assert_eq!(batches.next().unwrap(), vec![20, 30]);
    }

    #[test]
    fn test_never_exhausts() {
        let batches = CyclicBatches::new(vec![1, 2], 1, 1).unwrap();
        assert_eq!(batches.take(100).count(), 100);
    }

    #[test]
    fn test_batch_larger_than_pool() {
        let mut batches = CyclicBatches::new(vec![7, 8], 1, 5).unwrap();
        assert_eq!(batches.next().unwrap(), vec![7, 8, 7, 8, 7]);
    }

    #[test]
    fn test_rejects_ragged_pool() {
        assert!(CyclicBatches::new(vec![0, 1, 2], 2, 1).is_err());
        assert!(CyclicBatches::new(vec![], 2, 1).is_err());
        assert!(CyclicBatches::new(vec![0], 0, 1).is_err());
    }

    #[test]
    fn test_rejects_zero_batch_size() {
        // Otherwise next() would yield empty batches forever
        assert!(CyclicBatches::new(vec![0, 1], 1, 0).is_err());
    }
}
