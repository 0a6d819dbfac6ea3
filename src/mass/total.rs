//! Total cluster mass from an IMF sample draw.
//!
//! An IMF sample array is read as a cluster built star by star: the first
//! `N` samples make an initial mass `M_init`. Dynamical evolution turns it
//! into an actual mass, of which only the part inside the observable mass
//! window `[min, max]` shows up photometrically. The cutoff `N` is searched
//! so that this observable part matches the observed photometric mass.

use rand::rngs::StdRng;
use rand::RngExt;
use tracing::debug;

use super::environment::{dissolution_timescale, stellar_evolution_mass_loss, SkyPosition, GAMMA};
use super::search::{grid_search, GridSearchConfig};
use crate::{Error, Result};

/// Lower bound of the cutoff search, in samples.
pub const MIN_CUTOFF: usize = 100;

/// Observed photometric mass budget and its observable mass window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhotometricMass {
    total: f64,
    min: f64,
    max: f64,
}

impl PhotometricMass {
    pub fn new(total: f64, min: f64, max: f64) -> Result<Self> {
        if !(total.is_finite() && total > 0.0) {
            return Err(Error::InvalidObservedMass(total));
        }
        if !(min.is_finite() && max.is_finite() && min < max) {
            return Err(Error::DegenerateMassRange { min, max });
        }
        Ok(Self { total, min, max })
    }

    /// Budget from a set of assigned stellar masses: their sum and range.
    /// Non-finite and non-positive entries are ignored.
    pub fn from_masses(masses: &[f64]) -> Result<Self> {
        let valid = masses.iter().copied().filter(|m| m.is_finite() && *m > 0.0);
        let init = (0.0, f64::INFINITY, f64::NEG_INFINITY);
        let (total, min, max) = valid.fold(init, |(t, lo, hi), m| (t + m, lo.min(m), hi.max(m)));
        Self::new(total, min, max)
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

/// Physical parameters of the cluster driving its mass loss.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterContext {
    /// log10 of the age in years.
    pub log_age: f64,
    pub sky: SkyPosition,
}

/// Stellar evolution plus environmental dissolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MassLossModel {
    /// Fraction lost to stellar evolution.
    pub evolution_loss: f64,
    pub age_yr: f64,
    /// Dissolution timescale.
    pub t0_yr: f64,
}

impl MassLossModel {
    pub fn new(log_age: f64, t0_yr: f64) -> Self {
        Self {
            evolution_loss: stellar_evolution_mass_loss(log_age),
            age_yr: 10f64.powf(log_age),
            t0_yr,
        }
    }

    pub fn for_cluster(ctx: &ClusterContext) -> Self {
        Self::new(ctx.log_age, dissolution_timescale(&ctx.sky))
    }

    /// Present-day mass of a cluster born with `initial` solar masses.
    /// Zero once the cluster has dissolved.
    pub fn actual_mass(&self, initial: f64) -> f64 {
        let term1 = (1.0 - self.evolution_loss).powf(GAMMA);
        let term2 = GAMMA / initial.powf(GAMMA) * self.age_yr / self.t0_yr;
        if term1 > term2 {
            initial * (term1 - term2).powf(1.0 / GAMMA)
        } else {
            0.0
        }
    }
}

/// One total-mass estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MassEstimate {
    pub actual: f64,
    pub initial: f64,
    /// Absolute difference between the observable part of `actual` and the
    /// observed photometric mass.
    pub deviation: f64,
    /// Number of IMF samples making up `initial`.
    pub cutoff: usize,
    /// Set when the actual mass is zero or non-finite, or no part of it
    /// falls in the observable window.
    pub degenerate: bool,
}

/// Prefix sums over one IMF sample array.
#[derive(Debug, Clone)]
pub struct CutoffProfile {
    cumulative: Vec<f64>,
    above_max: Vec<f64>,
    below_min: Vec<f64>,
    photometric: PhotometricMass,
    model: MassLossModel,
}

impl CutoffProfile {
    pub fn new(
        samples: &[f64],
        photometric: PhotometricMass,
        model: MassLossModel,
    ) -> Result<Self> {
        if samples.len() <= MIN_CUTOFF {
            return Err(Error::InsufficientImfSamples {
                len: samples.len(),
                min: MIN_CUTOFF,
            });
        }

        let n = samples.len();
        let mut cumulative = Vec::with_capacity(n);
        let mut above_max = Vec::with_capacity(n);
        let mut below_min = Vec::with_capacity(n);
        let (mut c, mut a, mut b) = (0.0, 0.0, 0.0);
        for &m in samples {
            c += m;
            if m > photometric.max {
                a += m;
            }
            if m < photometric.min {
                b += m;
            }
            cumulative.push(c);
            above_max.push(a);
            below_min.push(b);
        }

        Ok(Self {
            cumulative,
            above_max,
            below_min,
            photometric,
            model,
        })
    }

    pub fn len(&self) -> usize {
        self.cumulative.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cumulative.is_empty()
    }

    /// Estimate for the first `cutoff` samples (clamped to `[1, len]`).
    pub fn evaluate(&self, cutoff: usize) -> MassEstimate {
        let cutoff = cutoff.clamp(1, self.len());
        let i = cutoff - 1;

        let initial = self.cumulative[i];
        let ratio = self.below_min[i] / (initial - self.above_max[i]);
        let actual = self.model.actual_mass(initial);
        let deviation = (actual * (1.0 - ratio) - self.photometric.total).abs();

        let degenerate =
            !(actual.is_finite() && actual > 0.0) || !ratio.is_finite() || ratio >= 1.0;

        MassEstimate {
            actual,
            initial,
            deviation,
            cutoff,
            degenerate,
        }
    }

    /// Grid search for the cutoff best matching the observed mass.
    pub fn fit(&self, config: &GridSearchConfig) -> MassEstimate {
        let result = grid_search(
            |p| {
                let d = self.evaluate(p as usize).deviation;
                if d.is_nan() {
                    f64::INFINITY
                } else {
                    d
                }
            },
            MIN_CUTOFF as f64,
            self.len() as f64,
            config,
        );
        let estimate = self.evaluate(result.parameter as usize);
        debug!(
            "cutoff {} after {} iterations: M_init = {:.1}, M_actual = {:.1}",
            estimate.cutoff, result.iterations, estimate.initial, estimate.actual
        );
        estimate
    }
}

/// IMF sample arrays indexed by metallicity, then age.
#[derive(Debug, Clone)]
pub struct ImfSampleGrid {
    cells: Vec<Vec<Vec<f64>>>,
}

impl ImfSampleGrid {
    pub fn new(cells: Vec<Vec<Vec<f64>>>) -> Result<Self> {
        if cells.is_empty() || cells.iter().any(|row| row.is_empty()) {
            return Err(Error::EmptyImfGrid);
        }
        for samples in cells.iter().flatten() {
            if samples.len() <= MIN_CUTOFF {
                return Err(Error::InsufficientImfSamples {
                    len: samples.len(),
                    min: MIN_CUTOFF,
                });
            }
        }
        Ok(Self { cells })
    }

    /// Grid with a single cell.
    pub fn from_samples(samples: Vec<f64>) -> Result<Self> {
        Self::new(vec![vec![samples]])
    }

    pub fn n_metallicities(&self) -> usize {
        self.cells.len()
    }

    pub fn get(&self, met: usize, age: usize) -> Option<&[f64]> {
        self.cells.get(met)?.get(age).map(Vec::as_slice)
    }

    /// A uniformly chosen sample array.
    pub fn pick(&self, rng: &mut StdRng) -> &[f64] {
        let row = &self.cells[rng.random_range(0..self.cells.len())];
        &row[rng.random_range(0..row.len())]
    }
}

/// Total-mass estimate from one randomly chosen IMF sample array.
pub fn estimate_total_mass(
    grid: &ImfSampleGrid,
    photometric: PhotometricMass,
    model: MassLossModel,
    search: &GridSearchConfig,
    rng: &mut StdRng,
) -> Result<MassEstimate> {
    let profile = CutoffProfile::new(grid.pick(rng), photometric, model)?;
    Ok(profile.fit(search))
}
