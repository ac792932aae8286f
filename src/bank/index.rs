//! Flat cosine-similarity index.
//!
//! Rows are stored L2-normalized, so cosine similarity reduces to an inner
//! product and a search is one pass over the matrix. The bank holds a few
//! hundred templates; brute force beats any approximate structure at that
//! size and has no build cost worth caching beyond the embeddings
//! themselves.
//!
//! The index is immutable after construction: readers never lock.

/// Dense row-store of unit vectors with top-k inner-product search.
pub struct FlatIndex {
    dims: usize,
    rows: Vec<Vec<f32>>,
}

impl FlatIndex {
    pub fn new(dims: usize) -> Self {
        Self { dims, rows: Vec::new() }
    }

    /// Rebuild from cached rows. Rows are trusted to be normalized already.
    pub fn from_rows(dims: usize, rows: Vec<Vec<f32>>) -> anyhow::Result<Self> {
        for (i, row) in rows.iter().enumerate() {
            anyhow::ensure!(
                row.len() == dims,
                "index row {i} has {} dims, expected {dims}",
                row.len()
            );
        }
        Ok(Self { dims, rows })
    }

    /// Append a vector. The caller normalizes; zero vectors are accepted and
    /// simply never match anything.
    pub fn push(&mut self, vector: Vec<f32>) {
        debug_assert_eq!(vector.len(), self.dims);
        self.rows.push(vector);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }

    /// Top-k rows by inner product against `query`, best first.
    /// Returns `(row_index, similarity)` pairs.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if k == 0 || self.rows.is_empty() || query.len() != self.dims {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| (i, dot(query, row)))
            .collect();

        // Stable tie-break on row index keeps results deterministic.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(mut v: Vec<f32>) -> Vec<f32> {
        super::super::embedding::l2_normalize(&mut v);
        v
    }

    #[test]
    fn search_ranks_by_inner_product() {
        let mut index = FlatIndex::new(2);
        index.push(unit(vec![1.0, 0.0]));
        index.push(unit(vec![0.0, 1.0]));
        index.push(unit(vec![1.0, 1.0]));

        let hits = index.search(&unit(vec![1.0, 0.0]), 3);
        assert_eq!(hits[0].0, 0);
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
        // the diagonal vector beats the orthogonal one
        assert_eq!(hits[1].0, 2);
        assert_eq!(hits[2].0, 1);
    }

    #[test]
    fn search_truncates_to_k() {
        let mut index = FlatIndex::new(2);
        for _ in 0..10 {
            index.push(unit(vec![1.0, 0.0]));
        }
        assert_eq!(index.search(&unit(vec![1.0, 0.0]), 3).len(), 3);
    }

    #[test]
    fn search_on_empty_index_returns_nothing() {
        let index = FlatIndex::new(4);
        assert!(index.search(&[0.5; 4], 5).is_empty());
    }

    #[test]
    fn search_with_mismatched_query_dims_returns_nothing() {
        let mut index = FlatIndex::new(4);
        index.push(unit(vec![1.0, 0.0, 0.0, 0.0]));
        assert!(index.search(&[1.0, 0.0], 5).is_empty());
    }

    #[test]
    fn from_rows_rejects_mixed_dimensions() {
        let rows = vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0]];
        assert!(FlatIndex::from_rows(2, rows).is_err());
    }
}
