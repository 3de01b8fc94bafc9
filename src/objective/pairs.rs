//! Within-batch sample pair enumeration

/// All unordered sample pairs `(i, j)` with `i < j` over a fixed batch size
///
/// Built once at objective construction; the alignment objective rejects
/// any batch whose size differs from the one the set was built for.
#[derive(Debug, Clone)]
pub struct PairIndexSet {
    batch_size: usize,
    row: Vec<usize>,
    col: Vec<usize>,
}

impl PairIndexSet {
    /// Enumerate all `batch_size * (batch_size - 1) / 2` pairs
    pub fn new(batch_size: usize) -> Self {
        let count = batch_size * batch_size.saturating_sub(1) / 2;
        let mut row = Vec::with_capacity(count);
        let mut col = Vec::with_capacity(count);
        for i in 0..batch_size {
            for j in (i + 1)..batch_size {
                row.push(i);
                col.push(j);
            }
        }
        Self {
            batch_size,
            row,
            col,
        }
    }

    /// Batch size the set was built for
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of pairs
    pub fn len(&self) -> usize {
        self.row.len()
    }

    /// True when the batch size admits no pairs (0 or 1)
    pub fn is_empty(&self) -> bool {
        self.row.is_empty()
    }

    /// Iterate over `(i, j)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.row.iter().copied().zip(self.col.iter().copied())
    }
}
