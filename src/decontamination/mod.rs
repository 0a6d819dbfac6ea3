//! Bayesian field-star decontamination.
//!
//! Assigns every star of a cluster region a probability of being a cluster
//! member rather than a field star:
//!
//! 1. **Init**: prepare the cluster region and every field region in a common
//!    dimension layout, and compute once the likelihood of each cluster-region
//!    star against each (whole) field region.
//! 2. **Iterate**: for each field region with `n_fl` stars, compare the
//!    cluster region with a subsample of `n_cl - n_fl` of its own stars (the
//!    "cleaned" cluster). The Bayesian probability
//!    `1 / (1 + L_field / L_cluster)` is added to a running total.
//! 3. **Stop** once the running average changes by less than the tolerance
//!    (after a minimum number of runs), or when the run budget is used up.
//!
//! The subsample is drawn by a [`FeedbackResampler`], which by default
//! favors stars with high accumulated probability.

pub mod dimensions;
pub mod likelihood;
pub mod resampler;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::star::KinematicColumns;
use crate::Region;

pub use dimensions::{DimRange, DimensionLayout, Normalization, PreparedRegion};
pub use likelihood::LikelihoodKernel;
pub use resampler::{FeedbackResampler, ResamplePolicy};

/// Likelihood assigned to every star when a field region outnumbers the
/// cluster region and no comparison sample can be built.
pub const FLOOR_LIKELIHOOD: f64 = 1e-7;

/// Probability threshold above which a star is counted as a member.
pub const MEMBER_THRESHOLD: f64 = 0.5;

// ── Configuration ───────────────────────────────────────────────────────────

/// Source of the dimension weight vector.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum WeightPolicy {
    /// Every retained dimension weighs 1.
    #[default]
    Uniform,
    /// Full vector `[mag, colors..., plx, pmx, pmy, rv]`; the weights of the
    /// retained dimensions are selected from it.
    Select(Vec<f64>),
    /// One weight per retained dimension, used as is.
    Explicit(Vec<f64>),
}

impl WeightPolicy {
    pub fn resolve(&self, layout: &DimensionLayout) -> Result<Vec<f64>> {
        match self {
            WeightPolicy::Uniform => Ok(vec![1.0; layout.len()]),
            WeightPolicy::Select(full) => layout.select_weights(full),
            WeightPolicy::Explicit(w) => {
                if w.len() != layout.len() {
                    return Err(Error::WeightLengthMismatch {
                        expected: layout.len(),
                        got: w.len(),
                    });
                }
                Ok(w.clone())
            }
        }
    }
}

/// Parameters controlling a decontamination run.
#[derive(Debug, Clone)]
pub struct DecontaminationConfig {
    /// Maximum number of outer runs (each run visits every field region).
    /// At least one run is always performed. Default 1000.
    pub max_runs: u32,
    /// Dimension weights. Default: all 1.
    pub weights: WeightPolicy,
    /// Kinematic columns to use. `None` keeps the columns defined for at
    /// least one cluster-region star.
    pub kinematic_columns: Option<KinematicColumns>,
    /// Normalization of the data dimensions. Default `Shared`.
    pub normalization: Normalization,
    /// Subsampling policy. Default `FeedbackWeighted`.
    pub resample_policy: ResamplePolicy,
    /// Relative tolerance on the running average probabilities. Default 0.001.
    pub tolerance: f64,
    /// Fraction of `max_runs` that must elapse before convergence is
    /// accepted. Default 0.1.
    pub min_run_fraction: f64,
    /// Seed for the subsampling RNG. `None` seeds from the thread RNG.
    pub seed: Option<u64>,
}

impl Default for DecontaminationConfig {
    fn default() -> Self {
        Self {
            max_runs: 1000,
            weights: WeightPolicy::Uniform,
            kinematic_columns: None,
            normalization: Normalization::Shared,
            resample_policy: ResamplePolicy::FeedbackWeighted,
            tolerance: 0.001,
            min_run_fraction: 0.1,
            seed: None,
        }
    }
}

// ── State and result ────────────────────────────────────────────────────────

/// Lifecycle of a [`DecontaminationEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Regions prepared, no run performed yet.
    Init,
    /// At least one run done, not converged.
    Iterating { runs: u32 },
    /// Running averages stabilized at run `run` (0-based).
    Converged { run: u32 },
    /// The run budget was used up without meeting the tolerance.
    BudgetExhausted,
}

impl EngineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EngineState::Converged { .. } | EngineState::BudgetExhausted
        )
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecontaminationStatus {
    Converged { run: u32 },
    BudgetExhausted,
}

/// Membership probabilities of the cluster-region stars.
#[derive(Debug, Clone)]
pub struct DecontaminationResult {
    /// One probability per cluster-region star, in input order.
    pub probabilities: Vec<f64>,
    pub status: DecontaminationStatus,
    /// Outer runs performed.
    pub runs: u32,
    /// Probability vectors averaged into the result.
    pub evaluations: u64,
}

impl DecontaminationResult {
    pub fn converged(&self) -> bool {
        matches!(self.status, DecontaminationStatus::Converged { .. })
    }

    /// Indices of stars with probability at or above `threshold`.
    pub fn members(&self, threshold: f64) -> Vec<usize> {
        self.probabilities
            .iter()
            .enumerate()
            .filter(|(_, &p)| p >= threshold)
            .map(|(i, _)| i)
            .collect()
    }

    /// Compare a structural estimate of the number of members (e.g. from a
    /// density profile) with the number of stars at or above
    /// [`MEMBER_THRESHOLD`]. `None` when `n_structural` is zero.
    pub fn compare_member_count(&self, n_structural: usize) -> Option<MemberCountComparison> {
        if n_structural == 0 {
            return None;
        }
        let n_da = self.members(MEMBER_THRESHOLD).len();
        let (ns, nd) = (n_structural as f64, n_da as f64);
        let value = (ns - nd) / (ns + nd);
        Some(MemberCountComparison {
            n_structural,
            n_decontaminated: n_da,
            value,
            discrepant: value.abs() > MemberCountComparison::MAX_ABS_VALUE,
        })
    }
}

/// Agreement between structural and photometric member counts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemberCountComparison {
    pub n_structural: usize,
    pub n_decontaminated: usize,
    /// `(n_structural - n_decontaminated) / (n_structural + n_decontaminated)`.
    pub value: f64,
    /// Counts differ by more than a factor of two.
    pub discrepant: bool,
}

impl MemberCountComparison {
    pub const MAX_ABS_VALUE: f64 = 0.33;
}

// ── Engine ──────────────────────────────────────────────────────────────────

/// Fixed comparison against one field region.
#[derive(Debug, Clone)]
struct FieldTerm {
    n_stars: usize,
    /// Likelihood of each cluster-region star against the field region.
    likelihood: Vec<f64>,
}

#[derive(Debug)]
pub struct DecontaminationEngine {
    config: DecontaminationConfig,
    layout: DimensionLayout,
    kernel: LikelihoodKernel,
    cluster: PreparedRegion,
    fields: Vec<FieldTerm>,
    resampler: FeedbackResampler,
    rng: StdRng,
    accumulated: Vec<f64>,
    previous_avg: Vec<f64>,
    evaluations: u64,
    runs: u32,
    state: EngineState,
}

impl DecontaminationEngine {
    /// Prepare the regions and compute the fixed field likelihoods.
    ///
    /// Field regions without stars are skipped. Fails when the cluster region
    /// is empty, no field region has stars, the weights do not fit the
    /// retained dimensions, or a retained dimension has no valid value in the
    /// cluster region.
    ///
    /// The number of color dimensions is taken from the cluster region. Color
    /// columns present only on field stars are ignored, and field stars with
    /// fewer colors have the missing ones treated as undefined.
    pub fn new(cluster: &Region, fields: &[Region], config: DecontaminationConfig) -> Result<Self> {
        if cluster.is_empty() {
            return Err(Error::EmptyClusterRegion);
        }
        let fields: Vec<&Region> = fields
            .iter()
            .filter(|f| {
                if f.is_empty() {
                    debug!("Skipping empty field region");
                }
                !f.is_empty()
            })
            .collect();
        if fields.is_empty() {
            return Err(Error::NoFieldRegions);
        }

        let n_colors = cluster
            .stars
            .iter()
            .map(|s| s.colors.len())
            .max()
            .unwrap_or(0);
        let kinematics = config
            .kinematic_columns
            .unwrap_or_else(|| KinematicColumns::detect(&cluster.stars));
        let layout = DimensionLayout::new(n_colors, kinematics);
        let weights = config.weights.resolve(&layout)?;
        layout.check_defined(&cluster.stars)?;
        info!(
            "Decontamination dimensions: {:?}, weights {:?}",
            layout.names(),
            weights
        );

        let prepare = |stars: &[crate::Star], shared: &[DimRange]| match config.normalization {
            Normalization::Shared => PreparedRegion::new(stars, &layout, shared),
            Normalization::PerRegion => {
                PreparedRegion::new(stars, &layout, &DimRange::from_stars(&layout, [stars]))
            }
            Normalization::None => PreparedRegion::raw(stars, &layout),
        };

        let shared = DimRange::from_stars(
            &layout,
            std::iter::once(cluster.stars()).chain(fields.iter().map(|f| f.stars())),
        );
        let cluster_prep = prepare(cluster.stars(), &shared);
        let kernel = LikelihoodKernel::new(weights);

        let field_terms = fields
            .iter()
            .map(|f| {
                let prep = prepare(f.stars(), &shared);
                Ok(FieldTerm {
                    n_stars: prep.len(),
                    likelihood: kernel.evaluate(&cluster_prep, &prep)?,
                })
            })
            .collect::<Result<Vec<FieldTerm>>>()?;

        info!(
            "Prepared cluster region ({} stars) and {} field regions",
            cluster_prep.len(),
            field_terms.len()
        );

        let n = cluster_prep.len();
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(rand::random()),
        };

        Ok(Self {
            resampler: FeedbackResampler::new(n, config.resample_policy),
            config,
            layout,
            kernel,
            cluster: cluster_prep,
            fields: field_terms,
            rng,
            accumulated: vec![0.0; n],
            previous_avg: vec![0.0; n],
            evaluations: 0,
            runs: 0,
            state: EngineState::Init,
        })
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn layout(&self) -> &DimensionLayout {
        &self.layout
    }

    pub fn kernel(&self) -> &LikelihoodKernel {
        &self.kernel
    }

    pub fn resampler(&self) -> &FeedbackResampler {
        &self.resampler
    }

    /// Fixed likelihoods of the cluster-region stars against each non-empty
    /// field region.
    pub fn field_likelihoods(&self) -> impl Iterator<Item = &[f64]> {
        self.fields.iter().map(|f| f.likelihood.as_slice())
    }

    /// Current average probabilities (all zero before the first run).
    pub fn probabilities(&self) -> Vec<f64> {
        if self.evaluations == 0 {
            return vec![0.0; self.accumulated.len()];
        }
        let n = self.evaluations as f64;
        self.accumulated.iter().map(|a| a / n).collect()
    }

    fn max_runs(&self) -> u32 {
        self.config.max_runs.max(1)
    }

    fn min_converged_run(&self) -> u32 {
        let runs = self.config.min_run_fraction * self.max_runs() as f64;
        (runs.floor() as u32).max(1)
    }

    /// Perform one outer run and return the new state. A terminal state is
    /// returned unchanged.
    pub fn step(&mut self) -> EngineState {
        if self.state.is_terminal() {
            return self.state;
        }

        let run = self.runs;
        let n_cl = self.cluster.len();

        for field_idx in 0..self.fields.len() {
            let n_fl = self.fields[field_idx].n_stars;

            let cluster_lkl = if n_fl < n_cl {
                let rows = self.resampler.draw(&mut self.rng, n_cl - n_fl);
                self.kernel.sum_rows(&self.cluster, &self.cluster, &rows)
            } else {
                vec![FLOOR_LIKELIHOOD; n_cl]
            };

            let probs: Vec<f64> = self.fields[field_idx]
                .likelihood
                .iter()
                .zip(&cluster_lkl)
                .map(|(&fl, &cl)| bayes_probability(fl, cl))
                .collect();

            for (acc, p) in self.accumulated.iter_mut().zip(&probs) {
                *acc += p;
            }
            self.resampler.accumulate(&probs);
            self.evaluations += 1;
        }

        self.runs += 1;
        let avg = self.probabilities();
        let stable = all_close(&self.previous_avg, &avg, self.config.tolerance);

        self.state = if stable && run >= self.min_converged_run() {
            info!("Membership probabilities converged (run {})", run);
            EngineState::Converged { run }
        } else if self.runs >= self.max_runs() {
            info!(
                "Membership probabilities did not converge in {} runs",
                self.runs
            );
            EngineState::BudgetExhausted
        } else {
            debug!("Run {} done, {} evaluations", run, self.evaluations);
            EngineState::Iterating { runs: self.runs }
        };
        self.previous_avg = avg;
        self.state
    }

    /// Iterate until convergence or budget exhaustion.
    pub fn run(mut self) -> DecontaminationResult {
        info!(
            "Applying Bayesian decontamination ({} runs max)",
            self.max_runs()
        );
        while !self.step().is_terminal() {}

        let status = match self.state {
            EngineState::Converged { run } => DecontaminationStatus::Converged { run },
            _ => DecontaminationStatus::BudgetExhausted,
        };
        DecontaminationResult {
            probabilities: self.probabilities(),
            status,
            runs: self.runs,
            evaluations: self.evaluations,
        }
    }
}

/// Prepare and run a decontamination in one call.
pub fn decontaminate(
    cluster: &Region,
    fields: &[Region],
    config: DecontaminationConfig,
) -> Result<DecontaminationResult> {
    Ok(DecontaminationEngine::new(cluster, fields, config)?.run())
}

/// `1 / (1 + field / cluster)`, with NaN mapped to 0 and the result kept
/// inside `[0, 1]`.
pub fn bayes_probability(field_lkl: f64, cluster_lkl: f64) -> f64 {
    let p = 1.0 / (1.0 + field_lkl / cluster_lkl);
    if p.is_nan() {
        0.0
    } else {
        p.clamp(0.0, 1.0)
    }
}

/// Element-wise `|a - b| <= 1e-8 + rtol * |b|`.
fn all_close(a: &[f64], b: &[f64], rtol: f64) -> bool {
    const ATOL: f64 = 1e-8;
    a.iter()
        .zip(b)
        .all(|(x, y)| (x - y).abs() <= ATOL + rtol * y.abs())
}
