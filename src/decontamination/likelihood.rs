//! Weighted multivariate likelihood of one star set against another.
//!
//! For a target star `i` and a reference set `R`:
//!
//! ```text
//! L_i = w_i * sum_j  w_j / sqrt(prod_k s_ijk) * exp(-0.5 * min(50, sum_k d_ijk^2 / s_ijk))
//!
//! d_ijk = w_k * (q_ik - q_jk)
//! s_ijk = w_k * (sigma_ik^2 + sigma_jk^2)
//! ```
//!
//! where `w_i`, `w_j` are completeness weights and `w_k` the dimension
//! weights. An undefined difference counts as 0, an undefined or zero summed
//! variance as 1. Clipping the exponent keeps far pairs from underflowing.

use crate::error::{Error, Result};

use super::dimensions::PreparedRegion;

/// Upper bound on the summed exponent argument.
pub const MAX_EXPONENT: f64 = 50.0;

#[derive(Debug, Clone)]
pub struct LikelihoodKernel {
    weights: Vec<f64>,
}

impl LikelihoodKernel {
    /// Kernel with one weight per retained dimension.
    pub fn new(weights: Vec<f64>) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Likelihood of every `target` star against the whole `reference` set.
    ///
    /// Fails with [`Error::DimensionMismatch`] unless both regions carry one
    /// dimension per kernel weight.
    pub fn evaluate(
        &self,
        target: &PreparedRegion,
        reference: &PreparedRegion,
    ) -> Result<Vec<f64>> {
        let rows: Vec<usize> = (0..reference.len()).collect();
        self.evaluate_subset(target, reference, &rows)
    }

    /// Likelihood of every `target` star against the `rows` of `reference`.
    ///
    /// # Panics
    ///
    /// Panics if a row index is out of range for `reference`.
    pub fn evaluate_subset(
        &self,
        target: &PreparedRegion,
        reference: &PreparedRegion,
        rows: &[usize],
    ) -> Result<Vec<f64>> {
        self.check_dims(target)?;
        self.check_dims(reference)?;
        Ok(self.sum_rows(target, reference, rows))
    }

    fn check_dims(&self, region: &PreparedRegion) -> Result<()> {
        if region.n_dims() != self.weights.len() {
            return Err(Error::DimensionMismatch {
                expected: self.weights.len(),
                got: region.n_dims(),
            });
        }
        Ok(())
    }

    /// [`Self::evaluate_subset`] for regions already known to match the
    /// kernel's dimensions.
    pub(super) fn sum_rows(
        &self,
        target: &PreparedRegion,
        reference: &PreparedRegion,
        rows: &[usize],
    ) -> Vec<f64> {
        (0..target.len())
            .map(|i| {
                let w_i = target.completeness(i);
                if w_i == 0.0 {
                    return 0.0;
                }
                let sum: f64 = rows
                    .iter()
                    .map(|&j| reference.completeness(j) * self.pair(target, i, reference, j))
                    .sum();
                w_i * sum
            })
            .collect()
    }

    /// Unweighted kernel value of one (target, reference) pair.
    fn pair(&self, target: &PreparedRegion, i: usize, reference: &PreparedRegion, j: usize) -> f64 {
        let (qa, va) = (target.values(i), target.variances(i));
        let (qb, vb) = (reference.values(j), reference.variances(j));

        let mut d_sum = 0.0;
        let mut s_prod = 1.0;
        for k in 0..self.weights.len() {
            let w = self.weights[k];
            let mut d = w * (qa[k] - qb[k]);
            if d.is_nan() {
                d = 0.0;
            }
            let mut s = w * (va[k] + vb[k]);
            if s.is_nan() || s == 0.0 {
                s = 1.0;
            }
            d_sum += d * d / s;
            s_prod *= s;
        }

        (-0.5 * d_sum.min(MAX_EXPONENT)).exp() / s_prod.sqrt()
    }
}
