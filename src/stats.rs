//! Small numeric helpers shared by detection, convergence and reporting.

use serde::{Deserialize, Serialize};

/// Arithmetic mean. Returns 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance (divides by `n`).
pub fn population_variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|&x| (x - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// Sample variance (divides by `n - 1`). Returns 0.0 below two samples.
pub fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|&x| (x - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

/// Sample standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    sample_variance(values).sqrt()
}

/// Coefficient of variation (`std / mean`).
///
/// `None` when fewer than two values are given or the mean is not positive.
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values);
    if m <= 0.0 {
        return None;
    }
    Some(std_dev(values) / m)
}

/// The finite values of a slice, in order.
pub fn finite(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

/// Last `n` elements of a slice (or all of them if shorter).
pub fn tail(values: &[f64], n: usize) -> &[f64] {
    &values[values.len().saturating_sub(n)..]
}

/// Relative change between the first and last element of a slice.
///
/// `None` when fewer than two values are given or the first value is zero.
pub fn relative_change(values: &[f64]) -> Option<f64> {
    let (first, last) = (values.first()?, values.last()?);
    if values.len() < 2 || first.abs() < f64::EPSILON {
        return None;
    }
    Some(((last - first) / first).abs())
}

/// Ordinary least squares slope of `ys` against their indices.
pub fn ols_slope(ys: &[f64]) -> f64 {
    let n = ys.len();
    if n < 2 {
        return 0.0;
    }

    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(ys);

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, &y) in ys.iter().enumerate() {
        let dx = i as f64 - x_mean;
        numerator += dx * (y - y_mean);
        denominator += dx * dx;
    }

    if denominator.abs() < 1e-12 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Mean, standard deviation and range of a set of values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Number of values summarized.
    pub count: usize,
    /// Arithmetic mean.
    pub mean: f64,
    /// Sample standard deviation.
    pub std_dev: f64,
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
}

impl Summary {
    /// Summarizes the finite values of a slice. `None` if there are none.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let kept = finite(values);
        if kept.is_empty() {
            return None;
        }

        let min = kept.iter().copied().fold(f64::INFINITY, f64::min);
        let max = kept.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Some(Self {
            count: kept.len(),
            mean: mean(&kept),
            std_dev: std_dev(&kept),
            min,
            max,
        })
    }
}

/// JSON has no NaN or infinity: non-finite floats are written as `null` and
/// read back as NaN.
pub(crate) mod nullable_float {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        value.is_finite().then_some(*value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }

    pub mod seq {
        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
            let mapped: Vec<Option<f64>> = values
                .iter()
                .map(|v| v.is_finite().then_some(*v))
                .collect();
            mapped.serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<f64>, D::Error> {
            let raw: Vec<Option<f64>> = Vec::deserialize(deserializer)?;
            Ok(raw.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
        }
    }
}
