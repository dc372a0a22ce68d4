use crate::embedding::EmbeddingFailure;

/// In-memory similarity scan over the embeddings of one ranking run.
///
/// The pool sizes here are recruiting pools, not web scale, so every
/// candidate is scored against the query exhaustively; there is no
/// approximate index to tune or drift.
pub struct SimilarityIndex {
    query: Vec<f32>,
}

fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

impl SimilarityIndex {
    pub fn new(query: Vec<f32>) -> Self {
        Self { query }
    }

    pub fn dimension(&self) -> usize {
        self.query.len()
    }

    /// Similarity of one candidate vector to the query: `1 - d²`, where d² is
    /// the squared Euclidean distance. Not clamped here; bounding happens in
    /// the hybrid combination.
    pub fn score(&self, candidate: &[f32]) -> Result<f64, EmbeddingFailure> {
        if candidate.len() != self.query.len() {
            return Err(EmbeddingFailure::DimensionMismatch {
                expected: self.query.len(),
                actual: candidate.len(),
            });
        }

        let distance = squared_euclidean(&self.query, candidate);
        Ok(1.0 - f64::from(distance))
    }

    /// Score every candidate. Returns one score per input, in input order;
    /// an empty input yields an empty result.
    pub fn score_all(&self, candidates: &[Vec<f32>]) -> Result<Vec<f64>, EmbeddingFailure> {
        candidates
            .iter()
            .map(|candidate| self.score(candidate))
            .collect()
    }
}
