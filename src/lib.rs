//! # starcluster
//!
//! **Field-star decontamination and photometric mass estimation** for star
//! clusters, written in Rust.
//!
//! Given the stars observed inside a cluster region and a few field regions
//! around it, `starcluster` estimates for each cluster-region star the
//! probability that it is a true cluster member rather than a field
//! interloper. Matching the members against synthetic stellar populations
//! then yields per-star masses, binary probabilities and the total
//! (initial and present-day) mass of the cluster.
//!
//! ## Features
//!
//! - **Bayesian decontamination**: iterative resampling of the cluster region
//!   against every field region, with a weighted, error-normalized
//!   multivariate likelihood over photometry and kinematics
//! - **Explicit convergence**: runs stop once the running probabilities are
//!   stable, and budget exhaustion is reported as such
//! - **Mass matching**: k-d tree nearest-neighbor assignment of synthetic
//!   masses, folded into streaming (Welford) statistics
//! - **Total mass**: bounded grid search of an IMF sample cutoff under a
//!   stellar-evolution plus Galactic tidal-dissolution mass-loss model
//! - **Parallel realizations**: Monte Carlo realizations run on rayon workers
//!   and merge exactly
//! - **Persistence**: mass distributions serialize with [rkyv](https://docs.rs/rkyv)
//!
//! ## Example
//!
//! ```no_run
//! use starcluster::catalogs::{read_region_csv, CatalogLayout};
//! use starcluster::{decontaminate, DecontaminationConfig, Region};
//!
//! let layout = CatalogLayout::default();
//! let cluster = Region::cluster(read_region_csv("data/cluster.csv", &layout).unwrap());
//! let fields = vec![
//!     Region::field(read_region_csv("data/field_1.csv", &layout).unwrap()),
//!     Region::field(read_region_csv("data/field_2.csv", &layout).unwrap()),
//! ];
//!
//! let config = DecontaminationConfig {
//!     max_runs: 500,
//!     seed: Some(42),
//!     ..Default::default()
//! };
//! let result = decontaminate(&cluster, &fields, config).unwrap();
//! if !result.converged() {
//!     println!("budget exhausted after {} runs", result.runs);
//! }
//! println!("{} likely members", result.members(0.5).len());
//! ```
//!
//! ## Algorithm overview
//!
//! 1. **Preparation**: select the retained dimensions (first magnitude, all
//!    colors, available kinematics) and their weights, normalize them, and
//!    compute each star's completeness weight
//! 2. **Field likelihood**: evaluate every cluster-region star once against
//!    each field region
//! 3. **Cluster likelihood**: per run and field region, evaluate against a
//!    subsample of the cluster region as large as the cluster region minus the
//!    field region, drawn with feedback from earlier probabilities
//! 4. **Probability**: `1 / (1 + L_field / L_cluster)`, averaged over all
//!    evaluations until the average stops moving
//! 5. **Masses**: nearest synthetic star per member, then the IMF cutoff whose
//!    evolved mass matches the observed photometric mass
//!

pub mod catalogs;
pub mod decontamination;
pub mod error;
pub mod mass;
pub mod region;
pub mod spatial;
pub mod star;
pub mod stats;

pub use decontamination::{
    decontaminate, DecontaminationConfig, DecontaminationEngine, DecontaminationResult,
    DecontaminationStatus, EngineState, WeightPolicy,
};
pub use error::{Error, Result};
pub use mass::{
    run_parallel, BinaryOutcome, ClusterContext, ImfSampleGrid, MassConfig, MassDistribution,
    MassEstimate, MassEstimator, PhotometricMass, SkyPosition, SyntheticRealization,
};
pub use region::{Frame, Region, RegionKind};
pub use spatial::{KdTree, Neighbor, SpatialIndex, SpatialMatcher};
pub use star::*;
pub use stats::RunningStats;
