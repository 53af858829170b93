use serde::Serialize;

/// Highest similarity threshold for which statistics are reported.
pub const MAX_THRESHOLD: u8 = 5;
/// Deltas within this band around zero count as neutral.
pub const NEUTRAL_BAND: f64 = 0.1;

/// Aggregate of property deltas over the examples meeting one similarity threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdStatistics {
    pub threshold: u8,
    pub count: usize,
    pub mean: Option<f64>,
    /// Sample standard deviation; undefined for fewer than two deltas.
    pub std_dev: Option<f64>,
    pub increase: usize,
    pub decrease: usize,
    pub neutral: usize,
}

impl ThresholdStatistics {
    fn from_deltas(threshold: u8, deltas: &[f64]) -> Self {
        let count = deltas.len();
        let mean = (count > 0).then(|| deltas.iter().sum::<f64>() / count as f64);
        let std_dev = mean.filter(|_| count > 1).map(|m| {
            let variance = deltas.iter().map(|d| (d - m).powi(2)).sum::<f64>() / (count - 1) as f64;
            variance.sqrt()
        });
        Self {
            threshold,
            count,
            mean,
            std_dev,
            increase: deltas.iter().filter(|&&d| d > NEUTRAL_BAND).count(),
            decrease: deltas.iter().filter(|&&d| d < -NEUTRAL_BAND).count(),
            neutral: deltas.iter().filter(|&&d| d.abs() <= NEUTRAL_BAND).count(),
        }
    }
}

/// Statistics of one numeric field, one entry per threshold `0..=5`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldStatistics {
    pub field: usize,
    pub name: String,
    pub thresholds: Vec<ThresholdStatistics>,
}

impl FieldStatistics {
    /// Computes cumulative statistics from `(similarity, delta)` observations.
    ///
    /// Threshold `t` aggregates every delta whose similarity is at least `t`.
    pub fn compute(field: usize, name: &str, observations: &[(u8, f64)]) -> Self {
        let thresholds = (0..=MAX_THRESHOLD)
            .map(|t| {
                let deltas: Vec<f64> = observations
                    .iter()
                    .filter(|(similarity, _)| *similarity >= t)
                    .map(|&(_, delta)| delta)
                    .collect();
                ThresholdStatistics::from_deltas(t, &deltas)
            })
            .collect();
        Self {
            field,
            name: name.to_string(),
            thresholds,
        }
    }

    pub fn at(&self, threshold: u8) -> Option<&ThresholdStatistics> {
        self.thresholds.get(threshold as usize)
    }
}
