//! Summary statistics over contribution sequences

/// Arithmetic mean; `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Number of strict local maxima. The first and last values have only one
/// neighbour and are never counted.
pub fn count_peaks(values: &[f64]) -> usize {
    values
        .windows(3)
        .filter(|w| w[1] > w[0] && w[1] > w[2])
        .count()
}

/// Population standard deviation; `None` for an empty slice
pub fn population_std(values: &[f64]) -> Option<f64> {
    let mu = mean(values)?;
    let variance = values.iter().map(|v| (v - mu) * (v - mu)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[]), None);
        assert!((mean(&[0.5, -0.2]).unwrap() - 0.15).abs() < 1e-12);
    }

    #[test]
    fn test_count_peaks() {
        assert_eq!(count_peaks(&[]), 0);
        assert_eq!(count_peaks(&[1.0, 2.0]), 0);
        assert_eq!(count_peaks(&[0.0, 1.0, 0.0, 2.0, 1.0]), 2);
        // Plateaus are not strict maxima
        assert_eq!(count_peaks(&[0.0, 1.0, 1.0, 0.0]), 0);
        // Endpoints never count
        assert_eq!(count_peaks(&[5.0, 1.0, 5.0]), 0);
    }

    #[test]
    fn test_population_std() {
        assert_eq!(population_std(&[]), None);
        assert_eq!(population_std(&[3.0]), Some(0.0));
        let std = population_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((std - 2.0).abs() < 1e-12);
    }
}
