//! Streaming (single-pass) mean and variance.
//!
//! [`RunningStats`] implements Welford's recurrence as an immutable update:
//! `(count, mean, m2) + x -> (count + 1, mean', m2')` with
//!
//! ```text
//! mean' = mean + (x - mean) / (count + 1)
//! m2'   = m2 + (x - mean) * (x - mean')
//! ```
//!
//! Only the triple is retained, so arbitrarily many Monte Carlo draws can be
//! folded in. Two accumulators built on disjoint samples are combined with
//! [`RunningStats::merge`] (Chan et al. pairwise update), which is how
//! independent workers are reduced.

use rkyv::{Archive, Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Archive, Serialize, Deserialize)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulator holding the values of `iter`.
    pub fn from_values<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        iter.into_iter().fold(Self::new(), Self::update)
    }

    /// Return the accumulator with `x` folded in.
    #[must_use]
    pub fn update(self, x: f64) -> Self {
        let count = self.count + 1;
        let delta = x - self.mean;
        let mean = self.mean + delta / count as f64;
        let m2 = self.m2 + delta * (x - mean);
        Self { count, mean, m2 }
    }

    pub fn push(&mut self, x: f64) {
        *self = self.update(x);
    }

    /// Combine with an accumulator over a disjoint sample.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        if other.count == 0 {
            return self;
        }
        if self.count == 0 {
            return other;
        }
        let count = self.count + other.count;
        let (na, nb, n) = (self.count as f64, other.count as f64, count as f64);
        let delta = other.mean - self.mean;
        let mean = self.mean + delta * nb / n;
        let m2 = self.m2 + other.m2 + delta * delta * na * nb / n;
        Self { count, mean, m2 }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Mean of the values seen so far (0 when empty).
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sum of squared deviations from the mean.
    pub fn m2(&self) -> f64 {
        self.m2
    }

    /// Population variance; `None` when empty.
    pub fn variance(&self) -> Option<f64> {
        (self.count > 0).then(|| self.m2 / self.count as f64)
    }

    /// Sample (Bessel-corrected) variance; `None` below two values.
    pub fn sample_variance(&self) -> Option<f64> {
        (self.count > 1).then(|| self.m2 / (self.count - 1) as f64)
    }

    pub fn std_dev(&self) -> Option<f64> {
        self.variance().map(f64::sqrt)
    }
}

/// Element-wise merge of two per-star accumulator vectors.
///
/// An empty `acc` adopts `other` unchanged.
pub fn merge_all(acc: &mut Vec<RunningStats>, other: &[RunningStats]) {
    if acc.is_empty() {
        acc.extend_from_slice(other);
        return;
    }
    for (a, b) in acc.iter_mut().zip(other) {
        *a = a.merge(*b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: [f64; 8] = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];

    fn two_pass(values: &[f64]) -> (f64, f64) {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        (mean, var)
    }

    #[test]
    fn textbook_mean_and_variance() {
        let stats = RunningStats::from_values(DATA);
        assert_eq!(stats.count(), 8);
        assert!((stats.mean() - 5.0).abs() < 1e-12);
        assert!((stats.variance().unwrap() - 4.0).abs() < 1e-12);
        assert!((stats.std_dev().unwrap() - 2.0).abs() < 1e-12);

        let (mean, var) = two_pass(&DATA);
        assert!((stats.mean() - mean).abs() < 1e-12);
        assert!((stats.variance().unwrap() - var).abs() < 1e-12);
        assert!((stats.sample_variance().unwrap() - 32.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn update_is_pure() {
        let a = RunningStats::from_values([1.0, 2.0]);
        let b = a.update(3.0);
        assert_eq!(a.count(), 2);
        assert_eq!(b.count(), 3);
        assert!((b.mean() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn empty_accumulator() {
        let s = RunningStats::new();
        assert!(s.is_empty());
        assert_eq!(s.variance(), None);
        assert_eq!(s.sample_variance(), None);
    }

    #[test]
    fn large_offset_stays_stable() {
        // Naive sum-of-squares loses all precision here.
        let shifted: Vec<f64> = DATA.iter().map(|v| v + 1e9).collect();
        let stats = RunningStats::from_values(shifted.iter().copied());
        assert!((stats.mean() - (5.0 + 1e9)).abs() < 1e-6);
        assert!((stats.variance().unwrap() - 4.0).abs() < 1e-6);
    }

    #[test]
    fn merge_matches_sequential() {
        let (left, right) = DATA.split_at(3);
        let merged = RunningStats::from_values(left.iter().copied())
            .merge(RunningStats::from_values(right.iter().copied()));
        let seq = RunningStats::from_values(DATA);
        assert_eq!(merged.count(), seq.count());
        assert!((merged.mean() - seq.mean()).abs() < 1e-12);
        assert!((merged.m2() - seq.m2()).abs() < 1e-9);

        assert_eq!(RunningStats::new().merge(seq), seq);
        assert_eq!(seq.merge(RunningStats::new()), seq);
    }

    #[test]
    fn merge_all_elementwise() {
        let mut acc = Vec::new();
        let first = vec![RunningStats::from_values([1.0]), RunningStats::from_values([10.0])];
        merge_all(&mut acc, &first);
        assert_eq!(acc, first);

        let second = vec![RunningStats::from_values([3.0]), RunningStats::new()];
        merge_all(&mut acc, &second);
        assert!((acc[0].mean() - 2.0).abs() < 1e-12);
        assert_eq!(acc[1].count(), 1);
    }
}
