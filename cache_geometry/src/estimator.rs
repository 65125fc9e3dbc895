use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_MIN_SAMPLES: usize = 15;
pub const DEFAULT_TRIM_FRACTION: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trim {
    /// Share of the samples dropped on each side, rounded down.
    Fraction(f64),
    /// Number of samples dropped on each side.
    Count(usize),
}

impl Trim {
    pub fn cutoff(&self, len: usize) -> usize {
        match *self {
            // tolerance keeps len / 5 exact for 0.2
            Trim::Fraction(f) => (len as f64 * f + 1e-9).floor() as usize,
            Trim::Count(k) => k,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EstimatorError {
    #[error("{got} samples given, at least {required} required")]
    TooFewSamples { got: usize, required: usize },
    #[error("trimming {cutoff} samples from each end of {got} leaves nothing")]
    OverTrimmed { got: usize, cutoff: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimmedMean {
    pub min_samples: usize,
    pub trim: Trim,
}

impl Default for TrimmedMean {
    fn default() -> Self {
        TrimmedMean {
            min_samples: DEFAULT_MIN_SAMPLES,
            trim: Trim::Fraction(DEFAULT_TRIM_FRACTION),
        }
    }
}

impl TrimmedMean {
    pub fn estimate(&self, samples: &[f64]) -> Result<f64, EstimatorError> {
        let got = samples.len();
        if got < self.min_samples {
            return Err(EstimatorError::TooFewSamples {
                got,
                required: self.min_samples,
            });
        }
        let cutoff = self.trim.cutoff(got);
        if got == 0 || 2 * cutoff >= got {
            return Err(EstimatorError::OverTrimmed { got, cutoff });
        }
        let kept = got - 2 * cutoff;
        let sum: f64 = samples
            .iter()
            .copied()
            .sorted_by(|a, b| a.total_cmp(b))
            .skip(cutoff)
            .take(kept)
            .sum();
        Ok(sum / kept as f64)
    }
}

pub fn trimmed_mean(samples: &[f64]) -> Result<f64, EstimatorError> {
    TrimmedMean::default().estimate(samples)
}

#[cfg(test)]
mod tests {
    use super::{trimmed_mean, EstimatorError, Trim, TrimmedMean};

    fn bulk() -> Vec<f64> {
        (0..20).map(|i| 10.0 + (i % 5) as f64 * 0.1).collect()
    }

    #[test]
    fn outliers_do_not_move_the_estimate() {
        let bulk = bulk();
        let bulk_mean = bulk.iter().sum::<f64>() / bulk.len() as f64;

        for magnitude in [1e3, 1e6, 1e12] {
            let mut samples = bulk.clone();
            // 3 slow, 2 fast on 25 samples, cutoff is 5 per side
            samples.extend([magnitude, magnitude * 2.0, magnitude * 3.0]);
            samples.extend([0.0, 1e-9]);
            let estimate = trimmed_mean(&samples).unwrap();
            assert!(
                (estimate - bulk_mean).abs() < 0.05,
                "estimate {} vs bulk {}",
                estimate,
                bulk_mean
            );
        }
    }

    #[test]
    fn symmetric_trim_of_sorted_ramp() {
        let samples: Vec<f64> = (1..=15).rev().map(f64::from).collect();
        // drops 1..=3 and 13..=15
        assert_eq!(trimmed_mean(&samples).unwrap(), 8.0);
    }

    #[test]
    fn too_few_samples_fails() {
        let samples = vec![1.0; 14];
        assert_eq!(
            trimmed_mean(&samples),
            Err(EstimatorError::TooFewSamples {
                got: 14,
                required: 15
            })
        );
        assert!(trimmed_mean(&[]).is_err());
    }

    #[test]
    fn fixed_count_trim() {
        let estimator = TrimmedMean {
            min_samples: 5,
            trim: Trim::Count(1),
        };
        assert_eq!(estimator.estimate(&[100.0, 2.0, 4.0, 3.0, -50.0]), Ok(3.0));
    }

    #[test]
    fn over_trimming_fails() {
        let estimator = TrimmedMean {
            min_samples: 4,
            trim: Trim::Count(2),
        };
        assert_eq!(
            estimator.estimate(&[1.0, 2.0, 3.0, 4.0]),
            Err(EstimatorError::OverTrimmed { got: 4, cutoff: 2 })
        );
    }

    #[test]
    fn fraction_cutoff_rounds_down() {
        assert_eq!(Trim::Fraction(0.2).cutoff(15), 3);
        assert_eq!(Trim::Fraction(0.2).cutoff(19), 3);
        assert_eq!(Trim::Fraction(0.2).cutoff(35), 7);
        assert_eq!(Trim::Fraction(0.2).cutoff(4), 0);
    }
}
