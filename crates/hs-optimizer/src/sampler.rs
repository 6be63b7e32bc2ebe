//! Parameter samplers and their per-bucket outcome statistics.

use hs_types::SamplerError;
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::{Rng, RngCore};

/// Accumulated objectives for one region of a parameter's domain.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket<T> {
    /// Most recent value mapped here (not an average).
    pub value: Option<T>,
    pub sum: f64,
    pub sum_sq: f64,
    pub count: u64,
}

impl<T> Bucket<T> {
    fn empty() -> Self {
        Self {
            value: None,
            sum: 0.0,
            sum_sq: 0.0,
            count: 0,
        }
    }

    fn record(&mut self, value: T, objective: f64) {
        self.value = Some(value);
        self.sum += objective;
        self.sum_sq += objective * objective;
        self.count += 1;
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    /// Population standard deviation of the recorded objectives.
    pub fn std_dev(&self) -> Option<f64> {
        let mean = self.mean()?;
        let variance = self.sum_sq / self.count as f64 - mean * mean;
        // Rounding can push a zero variance slightly negative.
        Some(variance.max(0.0).sqrt())
    }
}

/// Largest value list an integer range may expand to.
pub const MAX_DISCRETE_VALUES: usize = 1_000_000;

/// Largest bucket count a continuous sampler accepts.
pub const MAX_BUCKETS: usize = 1_000_000;

fn empty_buckets<T>(count: usize) -> Vec<Bucket<T>> {
    (0..count).map(|_| Bucket::empty()).collect()
}

/// Clamp a raw (possibly NaN or infinite) bucket position into `0..=last`.
fn clamp_bucket(raw: f64, last: usize) -> usize {
    if raw.is_nan() || raw <= 0.0 {
        0
    } else if raw >= last as f64 {
        last
    } else {
        raw as usize
    }
}

/// Draws values for one hyperparameter and keeps outcome statistics per bucket.
pub trait ParameterSampler<T>: Send + Sync {
    fn sample(&self, rng: &mut dyn RngCore) -> T;

    /// Bucket index for `value`, always within `0..buckets().len()`.
    fn value_to_bucket(&self, value: &T) -> usize;

    fn buckets(&self) -> &[Bucket<T>];

    fn buckets_mut(&mut self) -> &mut [Bucket<T>];

    fn name(&self) -> &str;

    fn accumulate(&mut self, value: T, objective: f64) {
        let last = self.buckets().len().saturating_sub(1);
        let index = self.value_to_bucket(&value).min(last);
        if let Some(bucket) = self.buckets_mut().get_mut(index) {
            bucket.record(value, objective);
        }
    }
}

// ---- Discrete samplers ----

/// Uniform choice from a fixed list; one bucket per list entry.
#[derive(Debug, Clone)]
pub struct DiscreteUniform<T> {
    values: Vec<T>,
    buckets: Vec<Bucket<T>>,
}

impl<T: Clone + PartialEq> DiscreteUniform<T> {
    pub fn new(values: Vec<T>) -> Result<Self, SamplerError> {
        if values.is_empty() {
            return Err(SamplerError::EmptyValues);
        }
        let buckets = empty_buckets(values.len());
        Ok(Self { values, buckets })
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }
}

impl DiscreteUniform<i64> {
    /// Every integer in `low..=high`, at most [`MAX_DISCRETE_VALUES`] of them.
    pub fn int_range(low: i64, high: i64) -> Result<Self, SamplerError> {
        let count = i128::from(high) - i128::from(low) + 1;
        if count > MAX_DISCRETE_VALUES as i128 {
            return Err(SamplerError::TooManyValues {
                low,
                high,
                max: MAX_DISCRETE_VALUES,
            });
        }
        Self::new((low..=high).collect())
    }
}

/// Position of `value` in `values`; unknown values land in bucket 0.
fn position_of<T: PartialEq>(values: &[T], value: &T) -> usize {
    values.iter().position(|v| v == value).unwrap_or(0)
}

impl<T: Clone + PartialEq + Send + Sync> ParameterSampler<T> for DiscreteUniform<T> {
    fn sample(&self, rng: &mut dyn RngCore) -> T {
        self.values[rng.random_range(0..self.values.len())].clone()
    }

    fn value_to_bucket(&self, value: &T) -> usize {
        position_of(&self.values, value)
    }

    fn buckets(&self) -> &[Bucket<T>] {
        &self.buckets
    }

    fn buckets_mut(&mut self) -> &mut [Bucket<T>] {
        &mut self.buckets
    }

    fn name(&self) -> &str {
        "discrete-uniform"
    }
}

/// Choice from a fixed list with caller-supplied categorical weights.
#[derive(Debug, Clone)]
pub struct DiscreteWeighted<T> {
    values: Vec<T>,
    weights: WeightedIndex<f64>,
    buckets: Vec<Bucket<T>>,
}

impl<T: Clone + PartialEq> DiscreteWeighted<T> {
    pub fn new(values: Vec<T>, weights: Vec<f64>) -> Result<Self, SamplerError> {
        if values.is_empty() {
            return Err(SamplerError::EmptyValues);
        }
        if values.len() != weights.len() {
            return Err(SamplerError::WeightCountMismatch {
                values: values.len(),
                weights: weights.len(),
            });
        }
        let weights = WeightedIndex::new(&weights).map_err(|err| SamplerError::InvalidWeights {
            message: err.to_string(),
        })?;
        let buckets = empty_buckets(values.len());
        Ok(Self {
            values,
            weights,
            buckets,
        })
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }
}

impl<T: Clone + PartialEq + Send + Sync> ParameterSampler<T> for DiscreteWeighted<T> {
    fn sample(&self, rng: &mut dyn RngCore) -> T {
        self.values[self.weights.sample(rng)].clone()
    }

    fn value_to_bucket(&self, value: &T) -> usize {
        position_of(&self.values, value)
    }

    fn buckets(&self) -> &[Bucket<T>] {
        &self.buckets
    }

    fn buckets_mut(&mut self) -> &mut [Bucket<T>] {
        &mut self.buckets
    }

    fn name(&self) -> &str {
        "discrete-weighted"
    }
}

// ---- Continuous samplers ----

/// Uniform over `[lower, upper)` with `num_buckets + 1` equal-width buckets.
#[derive(Debug, Clone)]
pub struct ContinuousUniform {
    lower: f64,
    upper: f64,
    num_buckets: usize,
    buckets: Vec<Bucket<f64>>,
}

impl ContinuousUniform {
    pub fn new(lower: f64, upper: f64, num_buckets: usize) -> Result<Self, SamplerError> {
        if !(lower.is_finite() && upper.is_finite() && lower < upper) {
            return Err(SamplerError::InvalidRange { lower, upper });
        }
        if num_buckets == 0 {
            return Err(SamplerError::ZeroBuckets);
        }
        if num_buckets > MAX_BUCKETS {
            return Err(SamplerError::TooManyBuckets {
                buckets: num_buckets,
                max: MAX_BUCKETS,
            });
        }
        Ok(Self {
            lower,
            upper,
            num_buckets,
            buckets: empty_buckets(num_buckets + 1),
        })
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.lower, self.upper)
    }
}

impl ParameterSampler<f64> for ContinuousUniform {
    fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        rng.random_range(self.lower..self.upper)
    }

    fn value_to_bucket(&self, value: &f64) -> usize {
        let raw = (self.num_buckets as f64 * (value - self.lower) / (self.upper - self.lower)).floor();
        clamp_bucket(raw, self.num_buckets)
    }

    fn buckets(&self) -> &[Bucket<f64>] {
        &self.buckets
    }

    fn buckets_mut(&mut self) -> &mut [Bucket<f64>] {
        &mut self.buckets
    }

    fn name(&self) -> &str {
        "uniform"
    }
}

/// `exp(y)` with `y` uniform over `[ln lower, ln upper)`. Suited to scale
/// parameters such as learning rates.
#[derive(Debug, Clone)]
pub struct LogUniform {
    log_space: ContinuousUniform,
    buckets: Vec<Bucket<f64>>,
}

impl LogUniform {
    pub fn new(lower: f64, upper: f64, num_buckets: usize) -> Result<Self, SamplerError> {
        if lower <= 0.0 || lower.is_nan() {
            return Err(SamplerError::NonPositiveLogBound { lower });
        }
        let log_space =
            ContinuousUniform::new(lower.ln(), upper.ln(), num_buckets).map_err(|err| match err {
                SamplerError::InvalidRange { .. } => SamplerError::InvalidRange { lower, upper },
                other => other,
            })?;
        let buckets = empty_buckets(log_space.buckets.len());
        Ok(Self { log_space, buckets })
    }

    pub fn bounds(&self) -> (f64, f64) {
        let (low, high) = self.log_space.bounds();
        (low.exp(), high.exp())
    }
}

impl ParameterSampler<f64> for LogUniform {
    fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        self.log_space.sample(rng).exp()
    }

    fn value_to_bucket(&self, value: &f64) -> usize {
        // ln of zero or a negative value is -inf / NaN, both clamp to bucket 0.
        self.log_space.value_to_bucket(&value.ln())
    }

    fn buckets(&self) -> &[Bucket<f64>] {
        &self.buckets
    }

    fn buckets_mut(&mut self) -> &mut [Bucket<f64>] {
        &mut self.buckets
    }

    fn name(&self) -> &str {
        "log-uniform"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn uniform_bucket_mapping() {
        let sampler = ContinuousUniform::new(0.0, 10.0, 10).unwrap();
        assert_eq!(sampler.buckets().len(), 11);
        assert_eq!(sampler.value_to_bucket(&5.0), 5);
        assert_eq!(sampler.value_to_bucket(&0.0), 0);
        assert_eq!(sampler.value_to_bucket(&9.99), 9);
        assert_eq!(sampler.value_to_bucket(&-1.0), 0);
        assert_eq!(sampler.value_to_bucket(&10.0), 10);
        assert_eq!(sampler.value_to_bucket(&1e12), 10);
        assert_eq!(sampler.value_to_bucket(&f64::NAN), 0);
        assert_eq!(sampler.value_to_bucket(&f64::NEG_INFINITY), 0);
        assert_eq!(sampler.value_to_bucket(&f64::INFINITY), 10);
    }

    #[test]
    fn uniform_samples_stay_in_range() {
        let sampler = ContinuousUniform::new(-2.0, 3.0, 5).unwrap();
        let mut rng = rng();
        for _ in 0..500 {
            let x = sampler.sample(&mut rng);
            assert!((-2.0..3.0).contains(&x), "sample out of range: {x}");
        }
    }

    #[test]
    fn log_uniform_sample_maps_back_into_range() {
        let sampler = LogUniform::new(1e-5, 1e-1, 8).unwrap();
        let mut rng = rng();
        for _ in 0..500 {
            let x = sampler.sample(&mut rng);
            assert!(x > 0.0 && x < 0.1 + 1e-12, "sample out of range: {x}");
            assert!(sampler.value_to_bucket(&x) <= 8);
        }
        assert_eq!(sampler.value_to_bucket(&1e-5), 0);
        assert_eq!(sampler.value_to_bucket(&0.0), 0);
        assert_eq!(sampler.value_to_bucket(&-3.0), 0);
        assert_eq!(sampler.value_to_bucket(&1.0), 8);
    }

    #[test]
    fn log_uniform_rejects_non_positive_bounds() {
        assert_eq!(
            LogUniform::new(0.0, 1.0, 4).unwrap_err(),
            SamplerError::NonPositiveLogBound { lower: 0.0 }
        );
        assert!(LogUniform::new(1.0, 0.5, 4).is_err());
    }

    #[test]
    fn invalid_uniform_ranges_are_rejected() {
        assert!(ContinuousUniform::new(1.0, 1.0, 4).is_err());
        assert!(ContinuousUniform::new(f64::NAN, 1.0, 4).is_err());
        assert_eq!(
            ContinuousUniform::new(0.0, 1.0, 0).unwrap_err(),
            SamplerError::ZeroBuckets
        );
    }

    #[test]
    fn oversized_domains_are_rejected() {
        assert!(matches!(
            DiscreteUniform::int_range(0, i64::MAX).unwrap_err(),
            SamplerError::TooManyValues { max: MAX_DISCRETE_VALUES, .. }
        ));
        assert!(matches!(
            DiscreteUniform::int_range(i64::MIN, i64::MAX).unwrap_err(),
            SamplerError::TooManyValues { .. }
        ));
        assert_eq!(
            DiscreteUniform::int_range(1, 0).unwrap_err(),
            SamplerError::EmptyValues
        );
        assert_eq!(DiscreteUniform::int_range(-2, 2).unwrap().values().len(), 5);

        assert_eq!(
            ContinuousUniform::new(0.0, 1.0, usize::MAX).unwrap_err(),
            SamplerError::TooManyBuckets {
                buckets: usize::MAX,
                max: MAX_BUCKETS
            }
        );
        assert_eq!(
            LogUniform::new(1e-4, 1.0, usize::MAX).unwrap_err(),
            SamplerError::TooManyBuckets {
                buckets: usize::MAX,
                max: MAX_BUCKETS
            }
        );
        assert_eq!(
            LogUniform::new(1e-4, 1.0, 0).unwrap_err(),
            SamplerError::ZeroBuckets
        );
    }

    #[test]
    fn discrete_samples_come_from_values() {
        let values = vec!["adam".to_string(), "sgd".to_string(), "rmsprop".to_string()];
        let uniform = DiscreteUniform::new(values.clone()).unwrap();
        let weighted = DiscreteWeighted::new(values.clone(), vec![0.7, 0.2, 0.1]).unwrap();
        let mut rng = rng();
        for _ in 0..200 {
            assert!(values.contains(&uniform.sample(&mut rng)));
            assert!(values.contains(&weighted.sample(&mut rng)));
        }
    }

    #[test]
    fn weighted_sampler_respects_zero_weights() {
        let weighted = DiscreteWeighted::new(vec![1_i64, 2, 3], vec![0.0, 1.0, 0.0]).unwrap();
        let mut rng = rng();
        assert!((0..100).all(|_| weighted.sample(&mut rng) == 2));
    }

    #[test]
    fn weighted_sampler_validates_weights() {
        assert_eq!(
            DiscreteWeighted::new(vec![1_i64, 2], vec![1.0]).unwrap_err(),
            SamplerError::WeightCountMismatch {
                values: 2,
                weights: 1
            }
        );
        assert!(matches!(
            DiscreteWeighted::new(vec![1_i64, 2], vec![0.0, 0.0]),
            Err(SamplerError::InvalidWeights { .. })
        ));
        assert_eq!(
            DiscreteWeighted::<i64>::new(vec![], vec![]).unwrap_err(),
            SamplerError::EmptyValues
        );
    }

    #[test]
    fn discrete_unknown_values_land_in_first_bucket() {
        let mut sampler = DiscreteUniform::int_range(3, 6).unwrap();
        assert_eq!(sampler.values(), &[3, 4, 5, 6]);
        assert_eq!(sampler.value_to_bucket(&5), 2);
        assert_eq!(sampler.value_to_bucket(&42), 0);

        sampler.accumulate(42, 1.0);
        assert_eq!(sampler.buckets()[0].count, 1);
        assert_eq!(sampler.buckets()[0].value, Some(42));
    }

    #[test]
    fn accumulate_tracks_statistics() {
        let mut sampler = ContinuousUniform::new(0.0, 10.0, 10).unwrap();
        sampler.accumulate(5.2, 2.0);
        sampler.accumulate(5.7, 4.0);

        let bucket = &sampler.buckets()[5];
        assert_eq!(bucket.count, 2);
        assert_eq!(bucket.sum, 6.0);
        assert_eq!(bucket.sum_sq, 20.0);
        assert_eq!(bucket.value, Some(5.7));
        assert_eq!(bucket.mean(), Some(3.0));
        assert_eq!(bucket.std_dev(), Some(1.0));
        assert_eq!(sampler.buckets()[4].mean(), None);
    }

    #[test]
    fn accumulate_never_panics_outside_the_range() {
        let mut uniform = ContinuousUniform::new(0.0, 1.0, 4).unwrap();
        let mut log = LogUniform::new(0.01, 1.0, 4).unwrap();
        for value in [-5.0, 0.0, 1.0, 7.5, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            uniform.accumulate(value, 0.5);
            log.accumulate(value, 0.5);
        }
        let total: u64 = uniform.buckets().iter().map(|b| b.count).sum();
        assert_eq!(total, 7);
        let total: u64 = log.buckets().iter().map(|b| b.count).sum();
        assert_eq!(total, 7);
    }
}
