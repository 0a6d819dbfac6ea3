//! Feedback-biased subsampling of the cluster region.
//!
//! Each evaluation compares the cluster region with a subsample of itself
//! that stands in for "the cluster without its field contaminants". The
//! resampler owns the per-star scores that bias these subsamples: every
//! evaluated probability vector is added to the scores, and later draws pick
//! stars with probability proportional to them.
//!
//! Draws are without replacement, using exponential keys
//! (Efraimidis–Spirakis): star `i` gets key `ln(u_i) / score_i` and the
//! largest keys win. Stars with a zero score are only taken once every
//! positive-score star has been drawn.

use std::cmp::Ordering;

use rand::rngs::StdRng;
use rand::RngExt;

use crate::error::{Error, Result};

/// How the comparison subsample is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResamplePolicy {
    /// Uniform on the first draw, proportional to accumulated scores after.
    #[default]
    FeedbackWeighted,
    /// Always uniform; probabilities never feed back into the draws.
    Uniform,
}

#[derive(Debug, Clone)]
pub struct FeedbackResampler {
    policy: ResamplePolicy,
    scores: Vec<f64>,
    updates: u64,
}

impl FeedbackResampler {
    /// Resampler over `n` stars with all scores at zero.
    pub fn new(n: usize, policy: ResamplePolicy) -> Self {
        Self {
            policy,
            scores: vec![0.0; n],
            updates: 0,
        }
    }

    pub fn policy(&self) -> ResamplePolicy {
        self.policy
    }

    /// Accumulated per-star scores.
    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    /// Fold one evaluated probability vector into the scores.
    ///
    /// Fails with [`Error::DimensionMismatch`] unless there is one
    /// probability per star.
    pub fn record(&mut self, probs: &[f64]) -> Result<()> {
        if probs.len() != self.scores.len() {
            return Err(Error::DimensionMismatch {
                expected: self.scores.len(),
                got: probs.len(),
            });
        }
        self.accumulate(probs);
        Ok(())
    }

    pub(super) fn accumulate(&mut self, probs: &[f64]) {
        for (s, p) in self.scores.iter_mut().zip(probs) {
            *s += p;
        }
        self.updates += 1;
    }

    /// Draw `k` distinct star indices (sorted ascending).
    pub fn draw(&self, rng: &mut StdRng, k: usize) -> Vec<usize> {
        let n = self.scores.len();
        if k >= n {
            return (0..n).collect();
        }

        let weighted = self.policy == ResamplePolicy::FeedbackWeighted && self.updates > 0;

        // (has positive weight, key, index)
        let mut keys: Vec<(bool, f64, usize)> = self
            .scores
            .iter()
            .enumerate()
            .map(|(i, &score)| {
                // u in (0, 1]
                let u = 1.0 - rng.random::<f64>();
                if !weighted {
                    (true, u.ln(), i)
                } else if score > 0.0 && score.is_finite() {
                    (true, u.ln() / score, i)
                } else {
                    (false, u, i)
                }
            })
            .collect();

        keys.select_nth_unstable_by(k, |a, b| {
            b.0.cmp(&a.0)
                .then_with(|| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal))
        });

        let mut picked: Vec<usize> = keys[..k].iter().map(|&(_, _, i)| i).collect();
        picked.sort_unstable();
        picked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn draws_are_distinct_and_sized() {
        let r = FeedbackResampler::new(100, ResamplePolicy::FeedbackWeighted);
        let mut rng = StdRng::seed_from_u64(1);
        let d = r.draw(&mut rng, 40);
        assert_eq!(d.len(), 40);
        assert!(d.windows(2).all(|w| w[0] < w[1]));
        assert!(d.iter().all(|&i| i < 100));
        assert_eq!(r.draw(&mut rng, 150).len(), 100);
    }

    #[test]
    fn feedback_favors_high_scores() {
        let n = 200;
        let mut r = FeedbackResampler::new(n, ResamplePolicy::FeedbackWeighted);
        // First half are likely members, second half likely field.
        let probs: Vec<f64> = (0..n)
            .map(|i| if i < n / 2 { 0.99 } else { 0.01 })
            .collect();
        r.record(&probs).unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        let mut high = 0usize;
        for _ in 0..20 {
            let picked = r.draw(&mut rng, 100);
            high += picked.iter().filter(|&&i| i < n / 2).count();
        }
        // Uniform draws would give ~1000.
        assert!(high > 1800, "high-score picks: {}", high);
    }

    #[test]
    fn zero_scores_are_drawn_last() {
        let mut r = FeedbackResampler::new(10, ResamplePolicy::FeedbackWeighted);
        let probs = [1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        r.record(&probs).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(r.draw(&mut rng, 3), vec![0, 1, 2]);
        let d = r.draw(&mut rng, 5);
        assert!(d.starts_with(&[0, 1, 2]));
    }

    #[test]
    fn uniform_policy_ignores_scores() {
        let n = 200;
        let mut r = FeedbackResampler::new(n, ResamplePolicy::Uniform);
        let probs: Vec<f64> = (0..n).map(|i| if i < n / 2 { 1.0 } else { 0.0 }).collect();
        r.record(&probs).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let mut high = 0usize;
        for _ in 0..20 {
            let picked = r.draw(&mut rng, 100);
            high += picked.iter().filter(|&&i| i < n / 2).count();
        }
        assert!((800..1200).contains(&high), "high-score picks: {}", high);
    }

    #[test]
    fn record_checks_length() {
        let mut r = FeedbackResampler::new(4, ResamplePolicy::FeedbackWeighted);
        assert_eq!(
            r.record(&[0.5, 0.5]),
            Err(Error::DimensionMismatch {
                expected: 4,
                got: 2
            })
        );
        assert!(r.scores().iter().all(|&s| s == 0.0));
        r.record(&[0.5, 0.5, 0.0, 1.0]).unwrap();
        assert_eq!(r.scores(), &[0.5, 0.5, 0.0, 1.0]);
    }
}
