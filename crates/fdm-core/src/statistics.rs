//! Series Statistics
//!
//! Summary statistics of a real-valued series: mean, population standard
//! deviation, RMS and range. Used for PSD diagnostics, signal summaries and
//! chunked-fit reports.

use crate::util::eng;

/// Summary statistics of a real series
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SeriesStats {
    /// Number of values analyzed
    pub count: usize,
    /// Arithmetic mean
    pub mean: f64,
    /// Population standard deviation (divides by `count`)
    pub std: f64,
    /// Root mean square
    pub rms: f64,
    /// Minimum value
    pub min: f64,
    /// Maximum value
    pub max: f64,
}

impl SeriesStats {
    /// Compute statistics for the given values
    pub fn compute(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;

        let mut sum_sq_dev = 0.0;
        let mut sum_sq = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &v in values {
            sum_sq_dev += (v - mean) * (v - mean);
            sum_sq += v * v;
            min = min.min(v);
            max = max.max(v);
        }

        Self {
            count: values.len(),
            mean,
            std: (sum_sq_dev / n).sqrt(),
            rms: (sum_sq / n).sqrt(),
            min,
            max,
        }
    }

    /// Standard deviation relative to the mean (`NaN` for a zero mean)
    pub fn relative_std(&self) -> f64 {
        self.std / self.mean.abs()
    }

    /// Format as text report
    pub fn to_text(&self, unit: &str) -> String {
        let mut output = String::new();
        output.push_str(&format!("Count:   {}\n", self.count));
        output.push_str(&format!("Mean:    {} {}\n", eng(self.mean), unit));
        output.push_str(&format!("Std:     {} {}\n", eng(self.std), unit));
        output.push_str(&format!("RMS:     {} {}\n", eng(self.rms), unit));
        output.push_str(&format!(
            "Range:   [{}, {}] {}\n",
            eng(self.min),
            eng(self.max),
            unit
        ));
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_empty() {
        let stats = SeriesStats::compute(&[]);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.mean, 0.0);
    }

    #[test]
    fn test_stats_known_values() {
        let stats = SeriesStats::compute(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(stats.count, 8);
        assert!((stats.mean - 5.0).abs() < 1e-12);
        assert!((stats.std - 2.0).abs() < 1e-12);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 9.0);
    }

    #[test]
    fn test_stats_sine_rms() {
        let values: Vec<f64> = (0..1000)
            .map(|i| (2.0 * std::f64::consts::PI * i as f64 / 100.0).sin())
            .collect();
        let stats = SeriesStats::compute(&values);
        assert!((stats.rms - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-3);
        assert!(stats.mean.abs() < 1e-9);
    }
}
