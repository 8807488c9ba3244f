//! Weight-dependent decay of raw influence values

use sinf_common::errors::{InfluenceError, Result};

/// Adjusts a raw influence by the weight of the edge it was observed on
pub trait BalanceFunction: Send + Sync {
    fn balance(&self, influence: f64, weight: f64) -> Result<f64>;
}

/// `influence - penalty * influence * (1 - log2(weight + 1) / weight)`.
///
/// At `weight = 1` the adjustment vanishes; as the weight grows it approaches
/// `penalty * influence`. Weights must be positive.
#[derive(Debug, Clone, Copy)]
pub struct LogWeightBalance {
    penalty: f64,
}

impl LogWeightBalance {
    pub fn new(penalty: f64) -> Self {
        Self { penalty }
    }

    pub fn penalty(&self) -> f64 {
        self.penalty
    }
}

impl Default for LogWeightBalance {
    fn default() -> Self {
        Self::new(0.1)
    }
}

impl BalanceFunction for LogWeightBalance {
    fn balance(&self, influence: f64, weight: f64) -> Result<f64> {
        // Also catches NaN
        if !(weight > 0.0) {
            return Err(InfluenceError::InvalidWeight { weight });
        }
        let decay = 1.0 - (weight + 1.0).log2() / weight;
        Ok(influence - self.penalty * influence * decay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_unit_weight_is_identity() {
        let b = LogWeightBalance::default();
        assert!((b.balance(0.7, 1.0).unwrap() - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_large_weight_approaches_full_penalty() {
        let b = LogWeightBalance::new(0.1);
        let balanced = b.balance(1.0, 1e9).unwrap();
        assert!((balanced - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_non_positive_weight_rejected() {
        let b = LogWeightBalance::default();
        assert!(matches!(b.balance(0.5, 0.0), Err(InfluenceError::InvalidWeight { .. })));
        assert!(matches!(b.balance(0.5, -2.0), Err(InfluenceError::InvalidWeight { .. })));
        assert!(b.balance(0.5, f64::NAN).is_err());
    }

    #[test]
    fn test_boundedness_for_weights_at_least_one() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let penalty = rng.gen_range(0.001..0.999);
            let weight = rng.gen_range(1.0..1000.0);
            let x = rng.gen_range(-1.0..1.0);
            let balanced = LogWeightBalance::new(penalty).balance(x, weight).unwrap();
            assert!(balanced.abs() <= x.abs() + 1e-15, "x={x} w={weight} p={penalty}");
            // Balancing never flips the sign
            assert!(balanced * x >= 0.0);
        }
    }
}
