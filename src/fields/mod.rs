//! Categorical field embedding: shared table, offsets, per-field linear term
//!
//! Every field's category values live in one shared matrix; field `f`'s
//! rows start at `offset[f]`, the exclusive prefix sum of the field
//! cardinalities. Both the embedding table and the linear term use the
//! same offset lookup.

mod embedding;
mod linear;

pub use embedding::{Embeddable, FieldEmbedding};
pub use linear::FieldLinear;

use crate::error::{ModelError, Result};

/// Exclusive prefix sum of field cardinalities
///
/// `offsets[0] == 0`; `offsets[k]` is the global row where field `k`'s
/// first category value lives.
pub fn field_offsets(fields: &[usize]) -> Vec<u32> {
    let mut offsets = Vec::with_capacity(fields.len());
    let mut acc = 0u32;
    for &cardinality in fields {
        offsets.push(acc);
        acc += u32::try_from(cardinality).expect("total cardinality must fit in u32");
    }
    offsets
}

/// Resolve a batch of per-field indices into global rows of the shared table
///
/// Validates the batch length against `batch_size * fields.len()` and every
/// index against its field's cardinality.
pub(crate) fn global_rows(
    fields: &[usize],
    offsets: &[u32],
    batch: &[u32],
    batch_size: usize,
) -> Result<Vec<usize>> {
    let num_fields = fields.len();
    if batch.len() != batch_size * num_fields {
        return Err(ModelError::ShapeMismatch {
            what: "input batch",
            expected: batch_size * num_fields,
            actual: batch.len(),
        });
    }

    let mut rows = Vec::with_capacity(batch.len());
    for (pos, &index) in batch.iter().enumerate() {
        let field = pos % num_fields;
        if index as usize >= fields[field] {
            return Err(ModelError::IndexOutOfRange {
                field,
                index,
                cardinality: fields[field],
            });
        }
        rows.push(offsets[field] as usize + index as usize);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_offsets_exclusive_prefix_sum() {
        assert_eq!(field_offsets(&[3, 5, 2]), vec![0, 3, 8]);
        assert_eq!(field_offsets(&[7]), vec![0]);
    }

    #[test]
    fn test_global_rows_lookup() {
        let fields = [3, 5, 2];
        let offsets = field_offsets(&fields);
        let rows = global_rows(&fields, &offsets, &[2, 4, 1], 1).unwrap();
        assert_eq!(rows, vec![2, 7, 9]);
    }

    #[test]
    fn test_global_rows_rejects_out_of_range() {
        let fields = [3, 5, 2];
        let offsets = field_offsets(&fields);
        let err = global_rows(&fields, &offsets, &[2, 5, 1], 1).unwrap_err();
        assert_eq!(
            err,
            ModelError::IndexOutOfRange {
                field: 1,
                index: 5,
                cardinality: 5
            }
        );
    }

    #[test]
    fn test_global_rows_rejects_wrong_length() {
        let fields = [3, 5, 2];
        let offsets = field_offsets(&fields);
        let err = global_rows(&fields, &offsets, &[0, 0], 1).unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { .. }));
    }
}
