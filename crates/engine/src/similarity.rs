//! Vector similarity metrics
//!
//! Metrics are resolved once from configuration into a strategy object and
//! shared by every worker.

use crate::model::{AttributeTable, NodeId, Timeframe};
use serde::{Deserialize, Serialize};
use sinf_common::errors::{InfluenceError, Result};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Similarity between two feature vectors of equal length
pub trait SimilarityMetric: Send + Sync + fmt::Debug {
    /// Metric name
    fn name(&self) -> &'static str;

    /// Similarity score; higher means more alike
    fn similarity(&self, a: &[f64], b: &[f64]) -> Result<f64>;

    /// Whether zero-norm vectors are outside the metric's domain
    fn requires_nonzero_norm(&self) -> bool {
        false
    }
}

/// Built-in metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMethod {
    Cosine,
    Euclidean,
    Manhattan,
}

impl SimilarityMethod {
    /// Strategy object for this method
    pub fn metric(self) -> Arc<dyn SimilarityMetric> {
        match self {
            SimilarityMethod::Cosine => Arc::new(Cosine),
            SimilarityMethod::Euclidean => Arc::new(Euclidean),
            SimilarityMethod::Manhattan => Arc::new(Manhattan),
        }
    }
}

impl FromStr for SimilarityMethod {
    type Err = InfluenceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(SimilarityMethod::Cosine),
            "euclidean" => Ok(SimilarityMethod::Euclidean),
            "manhattan" => Ok(SimilarityMethod::Manhattan),
            other => Err(InfluenceError::config(format!(
                "unknown similarity method '{}' (expected cosine, euclidean or manhattan)",
                other
            ))),
        }
    }
}

/// Create a metric from its configured name
pub fn create_metric(method: &str) -> Result<Arc<dyn SimilarityMetric>> {
    Ok(method.parse::<SimilarityMethod>()?.metric())
}

fn check_dimensions(a: &[f64], b: &[f64]) -> Result<()> {
    if a.len() != b.len() {
        return Err(InfluenceError::InvalidVector {
            message: format!("dimension mismatch: {} vs {}", a.len(), b.len()),
        });
    }
    Ok(())
}

fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Normalised dot product in `[-1, 1]`
#[derive(Debug, Clone, Copy, Default)]
pub struct Cosine;

impl SimilarityMetric for Cosine {
    fn name(&self) -> &'static str {
        "cosine"
    }

    fn similarity(&self, a: &[f64], b: &[f64]) -> Result<f64> {
        check_dimensions(a, b)?;
        let (na, nb) = (norm(a), norm(b));
        if na == 0.0 || nb == 0.0 {
            return Err(InfluenceError::InvalidVector {
                message: "cosine similarity of a zero-norm vector".to_string(),
            });
        }
        let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        // Rounding can push identical vectors just past 1
        Ok((dot / (na * nb)).clamp(-1.0, 1.0))
    }

    fn requires_nonzero_norm(&self) -> bool {
        true
    }
}

/// `1 - ||a - b||_2`
#[derive(Debug, Clone, Copy, Default)]
pub struct Euclidean;

impl SimilarityMetric for Euclidean {
    fn name(&self) -> &'static str {
        "euclidean"
    }

    fn similarity(&self, a: &[f64], b: &[f64]) -> Result<f64> {
        check_dimensions(a, b)?;
        let distance = a
            .iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f64>()
            .sqrt();
        Ok(1.0 - distance)
    }
}

/// `1 - ||a - b||_1`
#[derive(Debug, Clone, Copy, Default)]
pub struct Manhattan;

impl SimilarityMetric for Manhattan {
    fn name(&self) -> &'static str {
        "manhattan"
    }

    fn similarity(&self, a: &[f64], b: &[f64]) -> Result<f64> {
        check_dimensions(a, b)?;
        let distance: f64 = a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum();
        Ok(1.0 - distance)
    }
}

/// First snapshot outside the metric's domain, if any
pub fn find_degenerate_snapshot(
    metric: &dyn SimilarityMetric,
    attributes: &AttributeTable,
) -> Option<(NodeId, Timeframe)> {
    if !metric.requires_nonzero_norm() {
        return None;
    }
    attributes
        .iter()
        .find(|(_, _, vector)| norm(vector) == 0.0)
        .map(|(node, tf, _)| (node.clone(), tf))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    #[test]
    fn test_cosine() {
        let m = Cosine;
        assert!((m.similarity(&[1.0, 0.0], &[1.0, 0.0]).unwrap() - 1.0).abs() < EPS);
        assert!(m.similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap().abs() < EPS);
        assert!((m.similarity(&[1.0, 2.0], &[-1.0, -2.0]).unwrap() + 1.0).abs() < EPS);
        // Scale invariant
        assert!((m.similarity(&[1.0, 1.0], &[3.0, 3.0]).unwrap() - 1.0).abs() < EPS);
    }

    #[test]
    fn test_cosine_zero_norm_is_error() {
        let err = Cosine.similarity(&[0.0, 0.0], &[1.0, 0.0]).unwrap_err();
        assert!(matches!(err, InfluenceError::InvalidVector { .. }));
    }

    #[test]
    fn test_euclidean() {
        let m = Euclidean;
        assert_eq!(m.similarity(&[1.0, 2.0], &[1.0, 2.0]).unwrap(), 1.0);
        assert!((m.similarity(&[0.0, 0.0], &[3.0, 4.0]).unwrap() + 4.0).abs() < EPS);
    }

    #[test]
    fn test_manhattan_differs_from_euclidean() {
        let a = [0.0, 0.0];
        let b = [3.0, 4.0];
        assert_eq!(Manhattan.similarity(&a, &b).unwrap(), -6.0);
        assert_ne!(
            Manhattan.similarity(&a, &b).unwrap(),
            Euclidean.similarity(&a, &b).unwrap()
        );
    }

    #[test]
    fn test_dimension_mismatch() {
        assert!(Euclidean.similarity(&[1.0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("Cosine".parse::<SimilarityMethod>().unwrap(), SimilarityMethod::Cosine);
        assert_eq!(create_metric("manhattan").unwrap().name(), "manhattan");
        let err = create_metric("jaccard").unwrap_err();
        assert!(matches!(err, InfluenceError::Config { .. }));
    }

    #[test]
    fn test_find_degenerate_snapshot() {
        let table = AttributeTable::new(
            vec!["a".into(), "b".into()],
            vec![
                (NodeId::from(1), 0, vec![1.0, 0.0]),
                (NodeId::from(2), 3, vec![0.0, 0.0]),
            ],
        )
        .unwrap();
        assert_eq!(
            find_degenerate_snapshot(&Cosine, &table),
            Some((NodeId::from(2), 3))
        );
        assert_eq!(find_degenerate_snapshot(&Euclidean, &table), None);
    }
}
