//! Influence rules
//!
//! A rule turns the old/new snapshots of both endpoints of an edge into a new
//! influence value. The running value from the previous transition is passed
//! back in so rules can keep an influence episode alive.

use crate::model::AttributeTable;
use crate::similarity::{find_degenerate_snapshot, SimilarityMetric};
use sinf_common::errors::{InfluenceError, Result};
use std::sync::Arc;

/// Snapshots of the two endpoints around one timeframe transition.
///
/// `i` is the smaller endpoint of the edge, `j` the larger.
#[derive(Debug, Clone, Copy)]
pub struct Transition<'a> {
    pub i_old: &'a [f64],
    pub i_new: &'a [f64],
    pub j_old: &'a [f64],
    pub j_new: &'a [f64],
}

/// Strategy computing the influence of one transition
pub trait InfluenceRule: Send + Sync {
    fn influence(&self, transition: &Transition<'_>, threshold: f64, prev_influence: f64) -> Result<f64>;

    /// Eager check of the attribute table, run before any worker starts
    fn validate(&self, _attributes: &AttributeTable) -> Result<()> {
        Ok(())
    }
}

impl<F> InfluenceRule for F
where
    F: Fn(&Transition<'_>, f64, f64) -> Result<f64> + Send + Sync,
{
    fn influence(&self, transition: &Transition<'_>, threshold: f64, prev_influence: f64) -> Result<f64> {
        self(transition, threshold, prev_influence)
    }
}

/// Asymmetric-change detector.
///
/// With `sim_i`/`sim_j` the self-similarity of each endpoint across the
/// transition and `sim_ij` the similarity of their new snapshots, influence
/// fires when the previous value exceeded the threshold, or when exactly one
/// endpoint stayed above it. The magnitude is `sim_ij`; the sign is positive
/// when `i` was the more stable endpoint (`sim_i > sim_j`). All comparisons
/// against the threshold are strict.
#[derive(Debug, Clone)]
pub struct AsymmetricChange {
    metric: Arc<dyn SimilarityMetric>,
}

impl AsymmetricChange {
    pub fn new(metric: Arc<dyn SimilarityMetric>) -> Self {
        Self { metric }
    }

    pub fn metric(&self) -> &dyn SimilarityMetric {
        self.metric.as_ref()
    }
}

impl InfluenceRule for AsymmetricChange {
    fn influence(&self, t: &Transition<'_>, threshold: f64, prev_influence: f64) -> Result<f64> {
        let sim_i = self.metric.similarity(t.i_old, t.i_new)?;
        let sim_j = self.metric.similarity(t.j_old, t.j_new)?;
        let sim_ij = self.metric.similarity(t.i_new, t.j_new)?;

        let i_stable = sim_i > threshold;
        let j_stable = sim_j > threshold;
        let triggered = prev_influence > threshold || i_stable != j_stable;

        if !triggered {
            return Ok(0.0);
        }
        Ok(if sim_i > sim_j { sim_ij } else { -sim_ij })
    }

    fn validate(&self, attributes: &AttributeTable) -> Result<()> {
        match find_degenerate_snapshot(self.metric.as_ref(), attributes) {
            Some((node, timeframe)) => Err(InfluenceError::InvalidVector {
                message: format!(
                    "{} similarity is undefined for the zero vector of node {} at timeframe {}",
                    self.metric.name(),
                    node,
                    timeframe
                ),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::{Cosine, Euclidean};

    fn rule() -> AsymmetricChange {
        AsymmetricChange::new(Arc::new(Cosine))
    }

    #[test]
    fn test_asymmetric_trigger_positive() {
        // i unchanged, j moved onto i
        let t = Transition {
            i_old: &[1.0, 0.0],
            i_new: &[1.0, 0.0],
            j_old: &[0.0, 1.0],
            j_new: &[1.0, 0.0],
        };
        let inf = rule().influence(&t, 0.8, 0.0).unwrap();
        assert!((inf - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_asymmetric_trigger_negative() {
        let t = Transition {
            i_old: &[0.0, 1.0],
            i_new: &[1.0, 0.0],
            j_old: &[1.0, 0.0],
            j_new: &[1.0, 0.0],
        };
        let inf = rule().influence(&t, 0.8, 0.0).unwrap();
        assert!((inf + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_both_stable_no_influence() {
        let t = Transition {
            i_old: &[1.0, 0.0],
            i_new: &[1.0, 0.0],
            j_old: &[0.0, 1.0],
            j_new: &[0.0, 1.0],
        };
        assert_eq!(rule().influence(&t, 0.8, 0.0).unwrap(), 0.0);
    }

    #[test]
    fn test_previous_influence_keeps_episode_alive() {
        // Both stable, but the previous transition was above threshold
        let t = Transition {
            i_old: &[3.0, 4.0],
            i_new: &[3.0, 4.0],
            j_old: &[4.0, 3.0],
            j_new: &[4.0, 3.0],
        };
        let inf = rule().influence(&t, 0.8, 0.9).unwrap();
        // sim_i == sim_j, so the sign is negative
        assert!((inf + 0.96).abs() < 1e-12);
        // A previous value exactly at the threshold does not count
        assert_eq!(rule().influence(&t, 0.8, 0.8).unwrap(), 0.0);
    }

    #[test]
    fn test_threshold_boundary_is_exclusive() {
        // Euclidean gives sim = 1 - distance; both endpoints move by 0.5,
        // so sim_i == sim_j == 0.5 == threshold
        let rule = AsymmetricChange::new(Arc::new(Euclidean));
        let t = Transition {
            i_old: &[0.0],
            i_new: &[0.5],
            j_old: &[2.0],
            j_new: &[2.5],
        };
        assert_eq!(rule.influence(&t, 0.5, 0.0).unwrap(), 0.0);
    }

    #[test]
    fn test_closure_rule() {
        let constant = |_: &Transition<'_>, _: f64, prev: f64| -> Result<f64> { Ok(prev + 1.0) };
        let t = Transition {
            i_old: &[1.0],
            i_new: &[1.0],
            j_old: &[1.0],
            j_new: &[1.0],
        };
        assert_eq!(constant.influence(&t, 0.8, 1.0).unwrap(), 2.0);
    }

    #[test]
    fn test_validate_rejects_zero_vectors() {
        let table = AttributeTable::new(
            vec!["x".into()],
            vec![(crate::model::NodeId::from(5), 2, vec![0.0])],
        )
        .unwrap();
        let err = rule().validate(&table).unwrap_err();
        assert!(err.to_string().contains("node 5 at timeframe 2"));
        assert!(AsymmetricChange::new(Arc::new(Euclidean)).validate(&table).is_ok());
    }
}
