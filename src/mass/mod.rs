//! Photometric mass estimation against synthetic populations.
//!
//! Each synthetic realization (one Monte Carlo draw of a synthetic cluster)
//! contributes in two ways:
//!
//! 1. **Per-star masses**: every observed star is matched to its nearest
//!    synthetic single star in photometric space and takes that star's
//!    primary mass. When the realization holds binaries, the match is
//!    repeated against the binary subset (taking the secondary mass), and
//!    the two match distances give a binary probability. All three are
//!    folded into per-star [`RunningStats`].
//! 2. **Total mass**: an IMF sample array is cut so that the dynamically
//!    evolved mass matches the realization's photometric mass
//!    (see [`total`]).
//!
//! Realizations are independent, so [`run_parallel`] spreads them over rayon
//! workers and merges the per-worker estimators.

pub mod distribution;
pub mod environment;
pub mod search;
pub mod total;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::spatial::{Neighbor, SpatialMatcher};
use crate::stats::{merge_all, RunningStats};

pub use distribution::MassDistribution;
pub use environment::SkyPosition;
pub use search::{grid_search, GridSearchConfig, GridSearchResult};
pub use total::{
    estimate_total_mass, ClusterContext, CutoffProfile, ImfSampleGrid, MassEstimate, MassLossModel,
    PhotometricMass,
};

/// Smallest match distance used when turning distances into likelihoods.
pub const MIN_MATCH_DISTANCE: f64 = 1e-12;

/// One synthetic population draw.
#[derive(Debug, Clone)]
pub struct SyntheticRealization {
    dim: usize,
    /// Flat photometry, `dim` values per star.
    photometry: Vec<f64>,
    mass_primary: Vec<f64>,
    /// Secondary masses when binaries are modeled; 0 marks a single star.
    mass_secondary: Option<Vec<f64>>,
}

impl SyntheticRealization {
    pub fn new(
        dim: usize,
        photometry: Vec<f64>,
        mass_primary: Vec<f64>,
        mass_secondary: Option<Vec<f64>>,
    ) -> Result<Self> {
        if mass_primary.is_empty() {
            return Err(Error::EmptyRealization);
        }
        let n = mass_primary.len();
        if dim == 0 || photometry.len() != n * dim {
            return Err(Error::DimensionMismatch {
                expected: n * dim.max(1),
                got: photometry.len(),
            });
        }
        if let Some(secondary) = &mass_secondary {
            if secondary.len() != n {
                return Err(Error::DimensionMismatch {
                    expected: n,
                    got: secondary.len(),
                });
            }
        }
        Ok(Self {
            dim,
            photometry,
            mass_primary,
            mass_secondary,
        })
    }

    pub fn len(&self) -> usize {
        self.mass_primary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mass_primary.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn photometry(&self, i: usize) -> &[f64] {
        &self.photometry[i * self.dim..(i + 1) * self.dim]
    }

    pub fn mass_primary(&self) -> &[f64] {
        &self.mass_primary
    }

    pub fn mass_secondary(&self) -> Option<&[f64]> {
        self.mass_secondary.as_deref()
    }

    pub fn binaries_modeled(&self) -> bool {
        self.mass_secondary.is_some()
    }

    /// `true` for stars with a positive secondary mass.
    pub fn binary_mask(&self) -> Vec<bool> {
        match &self.mass_secondary {
            Some(secondary) => secondary.iter().map(|&m| m > 0.0).collect(),
            None => vec![false; self.len()],
        }
    }

    pub fn binary_fraction(&self) -> f64 {
        let n_bin = self.binary_mask().iter().filter(|&&b| b).count();
        n_bin as f64 / self.len() as f64
    }

    /// Photometric mass budget of the realization: total, lightest and
    /// heaviest primary mass.
    pub fn photometric_mass(&self) -> Result<PhotometricMass> {
        PhotometricMass::from_masses(&self.mass_primary)
    }

    /// Flat photometry of the stars where `mask == want`, with their indices.
    fn subset(&self, mask: &[bool], want: bool) -> (Vec<f64>, Vec<usize>) {
        let idx: Vec<usize> = (0..self.len()).filter(|&i| mask[i] == want).collect();
        let points = idx
            .iter()
            .flat_map(|&i| self.photometry(i).iter().copied())
            .collect();
        (points, idx)
    }
}

/// What a realization contributed to the binary statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOutcome {
    /// The realization carries no secondary masses.
    NotModeled,
    /// Binaries are modeled but none were drawn.
    NoneDrawn,
    /// `count` binary systems were matched against.
    Matched { count: usize },
}

/// Counts of [`BinaryOutcome`]s over all realizations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub not_modeled: u64,
    pub none_drawn: u64,
    pub matched: u64,
}

impl OutcomeCounts {
    fn record(&mut self, outcome: BinaryOutcome) {
        match outcome {
            BinaryOutcome::NotModeled => self.not_modeled += 1,
            BinaryOutcome::NoneDrawn => self.none_drawn += 1,
            BinaryOutcome::Matched { .. } => self.matched += 1,
        }
    }

    fn merge(&mut self, other: OutcomeCounts) {
        self.not_modeled += other.not_modeled;
        self.none_drawn += other.none_drawn;
        self.matched += other.matched;
    }

    pub fn total(&self) -> u64 {
        self.not_modeled + self.none_drawn + self.matched
    }
}

/// Per-realization summary returned by [`MassEstimator::add_realization`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RealizationSummary {
    pub binary_fraction: f64,
    pub outcome: BinaryOutcome,
    /// Observed stars matched against the single-star subset.
    pub matched_single: usize,
    /// Observed stars matched against the binary subset.
    pub matched_binary: usize,
}

/// Mass estimation settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MassConfig {
    pub search: GridSearchConfig,
    /// Matches closer than this use it as their distance.
    pub min_distance: f64,
    /// Base seed of the per-worker generators in [`run_parallel`].
    pub seed: u64,
    /// Realizations per rayon work item.
    pub chunk_size: usize,
}

impl Default for MassConfig {
    fn default() -> Self {
        Self {
            search: GridSearchConfig::default(),
            min_distance: MIN_MATCH_DISTANCE,
            seed: 0,
            chunk_size: 16,
        }
    }
}

/// Accumulates per-star and total-mass statistics over realizations.
#[derive(Debug, Clone)]
pub struct MassEstimator {
    dim: usize,
    /// Flat observed photometry, `dim` values per star.
    observed: Vec<f64>,
    config: MassConfig,
    single_mass: Vec<RunningStats>,
    binary_mass: Vec<RunningStats>,
    binary_prob: Vec<RunningStats>,
    binary_fractions: Vec<f64>,
    outcomes: OutcomeCounts,
    masses: MassDistribution,
}

impl MassEstimator {
    /// Estimator for the observed stars in `observed` (flat, `dim` values
    /// per star, in the same photometric system as the realizations).
    pub fn new(observed: Vec<f64>, dim: usize, config: MassConfig) -> Result<Self> {
        if dim == 0 || !observed.len().is_multiple_of(dim) {
            return Err(Error::DimensionMismatch {
                expected: dim,
                got: observed.len(),
            });
        }
        let n = observed.len() / dim;
        Ok(Self {
            dim,
            observed,
            config,
            single_mass: vec![RunningStats::new(); n],
            binary_mass: vec![RunningStats::new(); n],
            binary_prob: vec![RunningStats::new(); n],
            binary_fractions: Vec::new(),
            outcomes: OutcomeCounts::default(),
            masses: MassDistribution::new(),
        })
    }

    /// Number of observed stars.
    pub fn n_stars(&self) -> usize {
        self.single_mass.len()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn config(&self) -> &MassConfig {
        &self.config
    }

    /// Per-star primary masses from single-star matches.
    pub fn star_masses(&self) -> &[RunningStats] {
        &self.single_mass
    }

    /// Per-star secondary masses from binary matches.
    pub fn binary_masses(&self) -> &[RunningStats] {
        &self.binary_mass
    }

    /// Per-star probability of being a binary system.
    pub fn binary_probabilities(&self) -> &[RunningStats] {
        &self.binary_prob
    }

    /// Binary fraction of every realization seen, in order.
    pub fn binary_fractions(&self) -> &[f64] {
        &self.binary_fractions
    }

    pub fn outcomes(&self) -> OutcomeCounts {
        self.outcomes
    }

    pub fn mass_distribution(&self) -> &MassDistribution {
        &self.masses
    }

    /// Match the observed stars against one realization and fold the
    /// assigned masses into the per-star statistics.
    pub fn add_realization(&mut self, real: &SyntheticRealization) -> Result<RealizationSummary> {
        if real.dim() != self.dim {
            return Err(Error::DimensionMismatch {
                expected: self.dim,
                got: real.dim(),
            });
        }

        let mask = real.binary_mask();
        let binary_fraction = real.binary_fraction();
        self.binary_fractions.push(binary_fraction);

        let single = self.match_subset(real, &mask, false)?;
        let mut matched_single = 0;
        if let Some((matches, idx)) = &single {
            for (stats, m) in self.single_mass.iter_mut().zip(matches) {
                if let Some(m) = m {
                    stats.push(real.mass_primary()[idx[m.index]]);
                    matched_single += 1;
                }
            }
        }

        let mut matched_binary = 0;
        let outcome = match real.mass_secondary() {
            None => BinaryOutcome::NotModeled,
            Some(secondary) => match self.match_subset(real, &mask, true)? {
                None => BinaryOutcome::NoneDrawn,
                Some((matches, idx)) => {
                    for (i, m) in matches.iter().enumerate() {
                        let Some(m) = m else { continue };
                        self.binary_mass[i].push(secondary[idx[m.index]]);
                        matched_binary += 1;

                        let Some((single_matches, _)) = &single else { continue };
                        if let Some(s) = single_matches[i] {
                            let mut p = 1.0 / (1.0 + self.likelihood(&s) / self.likelihood(m));
                            if p.is_nan() {
                                p = 0.0;
                            }
                            self.binary_prob[i].push(p);
                        }
                    }
                    BinaryOutcome::Matched { count: idx.len() }
                }
            },
        };
        self.outcomes.record(outcome);

        debug!(
            "realization of {} stars: binary fraction {:.3}, {:?}",
            real.len(),
            binary_fraction,
            outcome
        );

        Ok(RealizationSummary {
            binary_fraction,
            outcome,
            matched_single,
            matched_binary,
        })
    }

    /// Total-mass estimate for one realization, folded into the mass
    /// distribution.
    pub fn estimate_total_mass(
        &mut self,
        photometric: PhotometricMass,
        grid: &ImfSampleGrid,
        model: MassLossModel,
        rng: &mut StdRng,
    ) -> Result<MassEstimate> {
        let estimate = estimate_total_mass(grid, photometric, model, &self.config.search, rng)?;
        self.masses.push(&estimate);
        Ok(estimate)
    }

    /// Per-star matching plus total-mass estimate using the realization's
    /// own photometric mass budget.
    pub fn process(
        &mut self,
        real: &SyntheticRealization,
        grid: &ImfSampleGrid,
        model: MassLossModel,
        rng: &mut StdRng,
    ) -> Result<(RealizationSummary, MassEstimate)> {
        let summary = self.add_realization(real)?;
        let photometric = real.photometric_mass()?;
        let estimate = self.estimate_total_mass(photometric, grid, model, rng)?;
        Ok((summary, estimate))
    }

    /// Fold in an estimator run over a disjoint set of realizations.
    pub fn merge(&mut self, other: &MassEstimator) -> Result<()> {
        if other.dim != self.dim || other.n_stars() != self.n_stars() {
            return Err(Error::DimensionMismatch {
                expected: self.observed.len(),
                got: other.observed.len(),
            });
        }
        merge_all(&mut self.single_mass, &other.single_mass);
        merge_all(&mut self.binary_mass, &other.binary_mass);
        merge_all(&mut self.binary_prob, &other.binary_prob);
        self.binary_fractions
            .extend_from_slice(&other.binary_fractions);
        self.outcomes.merge(other.outcomes);
        self.masses.merge(&other.masses);
        Ok(())
    }

    /// Nearest neighbors of every observed star within one subset of the
    /// realization. `None` when the subset has no usable points.
    #[allow(clippy::type_complexity)]
    fn match_subset(
        &self,
        real: &SyntheticRealization,
        mask: &[bool],
        binaries: bool,
    ) -> Result<Option<(Vec<Option<Neighbor>>, Vec<usize>)>> {
        let (points, idx) = real.subset(mask, binaries);
        if idx.is_empty() {
            return Ok(None);
        }
        let matcher: SpatialMatcher = match SpatialMatcher::new(&points, self.dim) {
            Ok(m) => m,
            Err(Error::EmptyPointSet) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(Some((matcher.match_points(&self.observed), idx)))
    }

    fn likelihood(&self, m: &Neighbor) -> f64 {
        1.0 / m.distance.max(self.config.min_distance)
    }
}

/// Process `realizations` on rayon workers and merge the results.
///
/// Realizations are split into blocks of `config.chunk_size`; block `k`
/// draws its IMF samples from `StdRng::seed_from_u64(config.seed + k)`.
/// Blocks are merged in order, so the result depends only on the seed and
/// the chunk size.
pub fn run_parallel(
    observed: &[f64],
    dim: usize,
    realizations: &[SyntheticRealization],
    grid: &ImfSampleGrid,
    ctx: &ClusterContext,
    config: MassConfig,
) -> Result<MassEstimator> {
    let model = MassLossModel::for_cluster(ctx);
    info!(
        "Processing {} realizations (q_ev = {:.4}, t0 = {:.3e} yr)",
        realizations.len(),
        model.evolution_loss,
        model.t0_yr
    );

    let workers: Vec<MassEstimator> = realizations
        .par_chunks(config.chunk_size.max(1))
        .enumerate()
        .map(|(k, block)| {
            let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(k as u64));
            let mut est = MassEstimator::new(observed.to_vec(), dim, config)?;
            for real in block {
                est.process(real, grid, model, &mut rng)?;
            }
            Ok(est)
        })
        .collect::<Result<_>>()?;

    let mut merged = MassEstimator::new(observed.to_vec(), dim, config)?;
    for w in &workers {
        merged.merge(w)?;
    }
    info!(
        "Merged {} workers: {} mass estimates, {} degenerate",
        workers.len(),
        merged.masses.len(),
        merged.masses.degenerate_count()
    );
    Ok(merged)
}
