//! Data dimensions used by the likelihood and the preparation of regions.
//!
//! A star contributes one magnitude (the first catalog magnitude), every
//! color, and the kinematic columns present in the catalog. Each region is
//! turned into a [`PreparedRegion`]: a dense row-major table of normalized
//! values and squared normalized uncertainties, plus a per-star completeness
//! weight (fraction of dimensions with valid data).

use crate::error::{Error, Result};
use crate::star::{KinematicColumn, KinematicColumns, Measurement};
use crate::Star;

/// Retained data dimensions, fixed for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionLayout {
    pub n_colors: usize,
    pub kinematics: KinematicColumns,
}

impl DimensionLayout {
    pub fn new(n_colors: usize, kinematics: KinematicColumns) -> Self {
        Self {
            n_colors,
            kinematics,
        }
    }

    /// Number of retained dimensions (never zero: the magnitude is always kept).
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        1 + self.n_colors + self.kinematics.count()
    }

    /// Length of a full weight vector `[mag, colors..., plx, pmx, pmy, rv]`.
    pub fn full_weight_len(&self) -> usize {
        1 + self.n_colors + KinematicColumn::ALL.len()
    }

    /// Human-readable dimension names, used in error messages.
    pub fn names(&self) -> Vec<String> {
        let mut names = vec!["mag".to_string()];
        names.extend((0..self.n_colors).map(|i| format!("color{}", i)));
        names.extend(self.kinematics.present().map(|c| c.name().to_string()));
        names
    }

    /// Pick the weights of the retained dimensions out of a full weight
    /// vector. Colors are taken in order; kinematic weights only for the
    /// columns present.
    pub fn select_weights(&self, full: &[f64]) -> Result<Vec<f64>> {
        if full.len() < self.full_weight_len() {
            return Err(Error::WeightLengthMismatch {
                expected: self.full_weight_len(),
                got: full.len(),
            });
        }
        let mut w = Vec::with_capacity(self.len());
        w.push(full[0]);
        w.extend_from_slice(&full[1..1 + self.n_colors]);
        for (i, col) in KinematicColumn::ALL.iter().enumerate() {
            if self.kinematics.contains(*col) {
                w.push(full[1 + self.n_colors + i]);
            }
        }
        Ok(w)
    }

    /// Measurements of `star` in retained-dimension order.
    pub fn measurements<'a>(
        &'a self,
        star: &'a Star,
    ) -> impl Iterator<Item = Option<Measurement>> + 'a {
        let mag = std::iter::once(star.mag());
        let colors = (0..self.n_colors).map(move |i| star.colors.get(i).copied().flatten());
        let kin = self
            .kinematics
            .present()
            .map(move |c| star.kinematics.get(c));
        mag.chain(colors)
            .chain(kin)
            .map(|m| m.filter(Measurement::is_defined))
    }

    /// Fail when a dimension has no valid value in any of `stars`.
    pub fn check_defined(&self, stars: &[Star]) -> Result<()> {
        let mut seen = vec![false; self.len()];
        for star in stars {
            for (k, m) in self.measurements(star).enumerate() {
                seen[k] |= m.is_some();
            }
        }
        match seen.iter().position(|&s| !s) {
            Some(dim) => Err(Error::UndefinedDimension {
                dim,
                name: self.names()[dim].clone(),
            }),
            None => Ok(()),
        }
    }
}

/// How dimension values are mapped to `[0, 1]` before the likelihood.
///
/// `PerRegion` reproduces the classic decontamination scheme, in which each
/// region is scaled by its own extent. `Shared` puts the cluster and field
/// regions on one scale and separates members from contaminants more
/// sharply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Normalization {
    /// One min/max range per dimension, taken over the cluster region and
    /// all field regions together.
    #[default]
    Shared,
    /// Every region normalized with its own min/max.
    PerRegion,
    /// Raw values and uncertainties.
    None,
}

/// Offset and span used to normalize one dimension.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DimRange {
    pub min: f64,
    pub span: f64,
}

impl DimRange {
    pub const IDENTITY: DimRange = DimRange {
        min: 0.0,
        span: 1.0,
    };

    /// Ranges of every retained dimension over a set of star groups.
    ///
    /// A dimension with no valid values or zero extent keeps a unit span.
    pub fn from_stars<'a, I>(layout: &DimensionLayout, groups: I) -> Vec<DimRange>
    where
        I: IntoIterator<Item = &'a [Star]>,
    {
        let n = layout.len();
        let mut lo = vec![f64::INFINITY; n];
        let mut hi = vec![f64::NEG_INFINITY; n];
        for stars in groups {
            for star in stars {
                for (k, m) in layout.measurements(star).enumerate() {
                    if let Some(m) = m {
                        lo[k] = lo[k].min(m.value);
                        hi[k] = hi[k].max(m.value);
                    }
                }
            }
        }
        lo.iter()
            .zip(&hi)
            .map(|(&min, &max)| {
                let span = max - min;
                if min.is_finite() && span.is_finite() && span > 0.0 {
                    DimRange { min, span }
                } else if min.is_finite() {
                    DimRange { min, span: 1.0 }
                } else {
                    DimRange::IDENTITY
                }
            })
            .collect()
    }
}

/// A region in the dense layout the likelihood kernel works on.
///
/// Undefined entries are stored as NaN.
#[derive(Debug, Clone)]
pub struct PreparedRegion {
    n_dims: usize,
    values: Vec<f64>,
    variances: Vec<f64>,
    completeness: Vec<f64>,
}

impl PreparedRegion {
    /// Lay out `stars`, normalizing dimension `k` with `ranges[k]`.
    pub fn new(stars: &[Star], layout: &DimensionLayout, ranges: &[DimRange]) -> Self {
        let n_dims = layout.len();
        assert_eq!(ranges.len(), n_dims, "one range per dimension");

        let mut values = Vec::with_capacity(stars.len() * n_dims);
        let mut variances = Vec::with_capacity(stars.len() * n_dims);
        let mut completeness = Vec::with_capacity(stars.len());

        for star in stars {
            let mut defined = 0usize;
            for (m, r) in layout.measurements(star).zip(ranges) {
                match m {
                    Some(m) => {
                        defined += 1;
                        values.push((m.value - r.min) / r.span);
                        let e = m.error / r.span;
                        variances.push(e * e);
                    }
                    None => {
                        values.push(f64::NAN);
                        variances.push(f64::NAN);
                    }
                }
            }
            completeness.push(defined as f64 / n_dims as f64);
        }

        Self {
            n_dims,
            values,
            variances,
            completeness,
        }
    }

    /// Lay out `stars` without normalization.
    pub fn raw(stars: &[Star], layout: &DimensionLayout) -> Self {
        Self::new(stars, layout, &vec![DimRange::IDENTITY; layout.len()])
    }

    pub fn len(&self) -> usize {
        self.completeness.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completeness.is_empty()
    }

    pub fn n_dims(&self) -> usize {
        self.n_dims
    }

    /// Normalized values of star `i`.
    pub fn values(&self, i: usize) -> &[f64] {
        &self.values[i * self.n_dims..(i + 1) * self.n_dims]
    }

    /// Squared normalized uncertainties of star `i`.
    pub fn variances(&self, i: usize) -> &[f64] {
        &self.variances[i * self.n_dims..(i + 1) * self.n_dims]
    }

    /// Fraction of dimensions with valid data for star `i`.
    pub fn completeness(&self, i: usize) -> f64 {
        self.completeness[i]
    }
}
