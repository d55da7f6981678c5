use std::str::FromStr;

use crate::error::BucketsError;

/// Default resolution-time boundaries in seconds, one minute through one week.
pub const DEFAULT_RESOLUTION_BUCKETS: [f64; 9] = [
    60.0,     // 1 minute
    600.0,    // 10 minutes
    1800.0,   // 30 minutes
    3600.0,   // 1 hour
    14400.0,  // 4 hours
    28800.0,  // 8 hours
    86400.0,  // 24 hours
    172800.0, // 48 hours
    604800.0, // 1 week
];

/// Upper bounds of a cumulative histogram.
///
/// Always non-empty, positive, finite and strictly increasing. The implicit
/// `+Inf` bucket is not stored here.
#[derive(Debug, Clone, PartialEq)]
pub struct Buckets(Vec<f64>);

impl Buckets {
    pub fn new(bounds: Vec<f64>) -> Result<Self, BucketsError> {
        if bounds.is_empty() {
            return Err(BucketsError::Empty);
        }
        for &b in &bounds {
            if !b.is_finite() || b <= 0.0 {
                return Err(BucketsError::NotPositive(b));
            }
        }
        for pair in bounds.windows(2) {
            if pair[1] <= pair[0] {
                return Err(BucketsError::NotIncreasing {
                    prev: pair[0],
                    next: pair[1],
                });
            }
        }
        Ok(Self(bounds))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

impl Default for Buckets {
    fn default() -> Self {
        Self(DEFAULT_RESOLUTION_BUCKETS.to_vec())
    }
}

impl FromStr for Buckets {
    type Err = String;

    /// Parses a comma separated list such as `60,600,3600`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bounds = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<f64>()
                    .map_err(|e| format!("invalid bucket boundary {part:?}: {e}"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Buckets::new(bounds).map_err(|e| e.to_string())
    }
}

/// Cumulative ("less than or equal") histogram built from one batch of
/// observations.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramAccumulator {
    buckets: Vec<(f64, u64)>,
    sum: f64,
    count: u64,
}

impl HistogramAccumulator {
    /// `(upper bound, cumulative count)` pairs in increasing bound order.
    pub fn buckets(&self) -> &[(f64, u64)] {
        &self.buckets
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Total observations, which is also the value of the `+Inf` bucket.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Cumulative count for an exact configured boundary.
    pub fn cumulative(&self, bound: f64) -> Option<u64> {
        self.buckets
            .iter()
            .find(|(b, _)| *b == bound)
            .map(|(_, c)| *c)
    }
}

/// Folds raw observations into a cumulative histogram.
///
/// Every boundary `b` with `d <= b` is incremented for each observation `d`,
/// so one observation lands in all buckets at or above it. An empty input is a
/// valid histogram with all counts at zero.
pub fn build_histogram(bounds: &Buckets, observations: &[f64]) -> HistogramAccumulator {
    let mut buckets: Vec<(f64, u64)> = bounds.as_slice().iter().map(|&b| (b, 0)).collect();
    let mut sum = 0.0;

    for &d in observations {
        sum += d;
        for (bound, cumulative) in buckets.iter_mut() {
            if d <= *bound {
                *cumulative += 1;
            }
        }
    }

    HistogramAccumulator {
        buckets,
        sum,
        count: observations.len() as u64,
    }
}
