//! Error type for input degeneracies that make a computation meaningless.
//!
//! Numerical trouble inside a run (NaN from a near-zero variance, an exact
//! photometric match) is replaced by documented safe defaults and never
//! surfaces here.

use thiserror::Error;

/// Library error type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The cluster region contains no stars.
    #[error("cluster region is empty")]
    EmptyClusterRegion,

    /// No field region with at least one star was supplied.
    #[error("no non-empty field regions were supplied")]
    NoFieldRegions,

    /// A weight vector does not match the expected number of dimensions.
    #[error("expected {expected} dimension weights, got {got}")]
    WeightLengthMismatch { expected: usize, got: usize },

    /// A retained dimension is undefined for every star in the cluster region.
    #[error("dimension {dim} ('{name}') is undefined for every cluster-region star")]
    UndefinedDimension { dim: usize, name: String },

    /// Point sets or photometric vectors disagree on dimensionality.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// A spatial index was requested over a point set with no finite points.
    #[error("cannot build a spatial index from an empty point set")]
    EmptyPointSet,

    /// The synthetic realization has no stars.
    #[error("synthetic realization is empty")]
    EmptyRealization,

    /// The observable mass range is empty or inverted.
    #[error("degenerate photometric mass range [{min}, {max}]")]
    DegenerateMassRange { min: f64, max: f64 },

    /// The observed photometric mass total is not a positive finite number.
    #[error("observed photometric mass must be positive, got {0}")]
    InvalidObservedMass(f64),

    /// The IMF sample grid has no cells.
    #[error("IMF sample grid is empty")]
    EmptyImfGrid,

    /// An IMF sample array is too short for the cutoff search.
    #[error("IMF sample array has {len} entries, need more than {min}")]
    InsufficientImfSamples { len: usize, min: usize },

    /// Frame trimming left too few stars to analyse.
    #[error("only {0} stars left after frame trimming (need at least 10)")]
    TooFewStarsAfterTrim(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
