use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::OriginalType;

/// Width of every stored vector (sentence-embedding model output)
pub const EMBEDDING_DIMENSION: usize = 384;

/// Fixed-width embedding vector
///
/// The length is checked on construction, so any two values can be compared
/// without re-validating. Persisted in pgvector text form `[f1,f2,...]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    pub fn new(values: Vec<f32>) -> Result<Self, String> {
        if values.len() != EMBEDDING_DIMENSION {
            return Err(format!(
                "embedding must have {} dimensions, got {}",
                EMBEDDING_DIMENSION,
                values.len()
            ));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err("embedding contains non-finite values".to_string());
        }
        Ok(Self(values))
    }

    pub fn zeros() -> Self {
        Self(vec![0.0; EMBEDDING_DIMENSION])
    }

    /// Unit vector along `axis`; handy for fixtures and reference seeds
    pub fn basis(axis: usize) -> Self {
        let mut values = vec![0.0; EMBEDDING_DIMENSION];
        values[axis % EMBEDDING_DIMENSION] = 1.0;
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn norm(&self) -> f64 {
        self.0
            .iter()
            .map(|v| f64::from(*v) * f64::from(*v))
            .sum::<f64>()
            .sqrt()
    }

    /// Cosine distance (`1 - cos θ`), same semantics as pgvector `<=>`
    ///
    /// Returns `None` when either side has zero norm.
    pub fn cosine_distance(&self, other: &EmbeddingVector) -> Option<f64> {
        let (a, b) = (self.norm(), other.norm());
        if a == 0.0 || b == 0.0 {
            return None;
        }
        let dot: f64 = self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(x, y)| f64::from(*x) * f64::from(*y))
            .sum();
        Some(1.0 - dot / (a * b))
    }

    /// Weighted mean of `vectors`, `Σ wᵢ·vᵢ / Σ wᵢ`
    ///
    /// Entries with non-positive weight are ignored. Returns `None` when no
    /// weight remains or the mean collapses to the zero vector.
    pub fn weighted_average<'a, I>(vectors: I) -> Option<EmbeddingVector>
    where
        I: IntoIterator<Item = (&'a EmbeddingVector, f64)>,
    {
        let mut acc = vec![0.0f64; EMBEDDING_DIMENSION];
        let mut total_weight = 0.0f64;

        for (vector, weight) in vectors {
            if !(weight.is_finite() && weight > 0.0) {
                continue;
            }
            for (slot, v) in acc.iter_mut().zip(vector.0.iter()) {
                *slot += weight * f64::from(*v);
            }
            total_weight += weight;
        }

        if total_weight <= 0.0 {
            return None;
        }

        let averaged = EmbeddingVector(
            acc.into_iter()
                .map(|v| (v / total_weight) as f32)
                .collect(),
        );
        if averaged.norm() == 0.0 {
            return None;
        }
        Some(averaged)
    }

    /// pgvector text literal, e.g. `[0.1,0.2,0.3]`
    pub fn to_literal(&self) -> String {
        let mut out = String::with_capacity(self.0.len() * 10 + 2);
        out.push('[');
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&v.to_string());
        }
        out.push(']');
        out
    }

    pub fn parse_literal(literal: &str) -> Result<Self, String> {
        let inner = literal
            .trim()
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .ok_or_else(|| format!("malformed vector literal: {:.32}", literal))?;

        let values = inner
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<f32>()
                    .map_err(|e| format!("bad vector component {:?}: {}", part, e))
            })
            .collect::<Result<Vec<f32>, String>>()?;

        Self::new(values)
    }
}

impl TryFrom<Vec<f32>> for EmbeddingVector {
    type Error = String;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<EmbeddingVector> for Vec<f32> {
    fn from(vector: EmbeddingVector) -> Self {
        vector.0
    }
}

/// A persisted embedding row
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEmbedding {
    pub original_id: Uuid,
    pub original_type: OriginalType,
    pub embedding: EmbeddingVector,
    /// Instant the synthesis inputs were read; `None` for content vectors
    pub source_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}
