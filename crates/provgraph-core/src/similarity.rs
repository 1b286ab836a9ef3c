//! # Vector Similarity
//!
//! Cosine similarity between a caller-supplied query embedding and the
//! optional embedding stored on each entity.
//!
//! The engine never computes embeddings; the caller brings the query vector
//! and the dataset brings the entity vectors. An entity without an
//! embedding, or with one of another dimension, has no similarity.

use crate::types::Entity;

/// A validated query embedding with its norm precomputed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QueryVector {
    values: Vec<f64>,
    norm: f64,
}

impl QueryVector {
    /// `None` for an empty, non-finite or all-zero vector.
    pub(crate) fn new(values: Vec<f64>) -> Option<Self> {
        if values.is_empty() || values.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let norm = magnitude(&values);
        if norm == 0.0 || !norm.is_finite() {
            return None;
        }
        Some(Self { values, norm })
    }

    pub(crate) fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Cosine similarity in `[-1, 1]`.
    pub(crate) fn similarity(&self, embedding: &[f64]) -> Option<f64> {
        if embedding.len() != self.values.len() {
            return None;
        }
        let norm = magnitude(embedding);
        if norm == 0.0 || !norm.is_finite() {
            return None;
        }
        let dot: f64 = self.values.iter().zip(embedding).map(|(a, b)| a * b).sum();
        Some((dot / (self.norm * norm)).clamp(-1.0, 1.0))
    }

    pub(crate) fn score(&self, entity: &Entity) -> Option<f64> {
        entity
            .embedding
            .as_deref()
            .and_then(|embedding| self.similarity(embedding))
    }
}

fn magnitude(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityType;

    #[test]
    fn rejects_degenerate_queries() {
        assert!(QueryVector::new(Vec::new()).is_none());
        assert!(QueryVector::new(vec![0.0, 0.0]).is_none());
        assert!(QueryVector::new(vec![1.0, f64::NAN]).is_none());
        assert_eq!(QueryVector::new(vec![1.0, 0.0]).map(|q| q.dimension()), Some(2));
    }

    #[test]
    fn cosine_ignores_magnitude() {
        let query = QueryVector::new(vec![1.0, 0.0]).expect("query");
        assert_eq!(query.similarity(&[5.0, 0.0]), Some(1.0));
        assert_eq!(query.similarity(&[0.0, 2.0]), Some(0.0));
        assert_eq!(query.similarity(&[-3.0, 0.0]), Some(-1.0));
        let diagonal = query.similarity(&[1.0, 1.0]).expect("similarity");
        assert!((diagonal - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
    }

    #[test]
    fn mismatched_or_missing_embeddings_have_no_score() {
        let query = QueryVector::new(vec![1.0, 0.0]).expect("query");
        assert_eq!(query.similarity(&[1.0, 0.0, 0.0]), None);
        assert_eq!(query.similarity(&[0.0, 0.0]), None);

        let bare = Entity::new("drug:a", EntityType::Drug, "A");
        assert_eq!(query.score(&bare), None);
        let embedded = bare.with_embedding(vec![0.0, 4.0]);
        assert_eq!(query.score(&embedded), Some(0.0));
    }
}
