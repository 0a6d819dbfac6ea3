//! Spatial regions of a stellar field and structural helpers on them.
//!
//! A [`Region`] is an ordered, read-only set of stars sharing a footprint:
//! either the cluster region (stars inside the candidate radius) or one of
//! several field regions used as the contamination reference.

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::RngExt;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::Star;

/// Minimum number of stars that must survive frame trimming.
pub const MIN_STARS_AFTER_TRIM: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Cluster,
    Field,
}

#[derive(Debug, Clone)]
pub struct Region {
    pub kind: RegionKind,
    pub stars: Vec<Star>,
}

impl Region {
    pub fn cluster(stars: Vec<Star>) -> Self {
        Self {
            kind: RegionKind::Cluster,
            stars,
        }
    }

    pub fn field(stars: Vec<Star>) -> Self {
        Self {
            kind: RegionKind::Field,
            stars,
        }
    }

    pub fn len(&self) -> usize {
        self.stars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stars.is_empty()
    }

    pub fn stars(&self) -> &[Star] {
        &self.stars
    }
}

/// Rectangular frame `(xmin, xmax, ymin, ymax)`, bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl Frame {
    pub fn contains(&self, star: &Star) -> bool {
        (self.xmin..=self.xmax).contains(&star.x) && (self.ymin..=self.ymax).contains(&star.y)
    }
}

/// Keep only stars inside `frame`.
///
/// Fails when fewer than [`MIN_STARS_AFTER_TRIM`] stars remain.
pub fn trim_frame(stars: Vec<Star>, frame: &Frame) -> Result<Vec<Star>> {
    let n = stars.len();
    let kept: Vec<Star> = stars.into_iter().filter(|s| frame.contains(s)).collect();
    if kept.len() < MIN_STARS_AFTER_TRIM {
        return Err(Error::TooFewStarsAfterTrim(kept.len()));
    }
    info!("Stars removed by trimming the frame: {}", n - kept.len());
    Ok(kept)
}

/// Contamination estimate for a cluster region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContaminationIndex {
    /// Field density over cluster-region density. Near 0: little
    /// contamination; 0.5: as many field stars as members expected;
    /// 1 or more: no members expected.
    pub index: f64,
    /// Stars in the cluster region minus the expected field stars.
    pub n_members: i64,
}

/// Compare the field star density with the star density inside the
/// cluster radius.
///
/// `rdp_length` is the radial extent over which `field_density` was measured.
/// When the cluster radius reaches half of it, the "field" density actually
/// samples the cluster outskirts and `None` is returned.
pub fn contamination_index(
    stars: &[Star],
    center: (f64, f64),
    radius: f64,
    field_density: f64,
    rdp_length: f64,
) -> Option<ContaminationIndex> {
    if radius >= rdp_length / 2.0 {
        warn!("Cluster radius is too large to obtain a reliable contamination index");
        return None;
    }

    let r2 = radius * radius;
    let n_in = stars
        .iter()
        .filter(|s| s.dist2_to(center.0, center.1) < r2)
        .count();
    let area = PI * r2;
    let cl_density = n_in as f64 / area;
    let index = field_density / cl_density;
    let n_members = (n_in as f64 - field_density * area) as i64;

    if index >= 1.0 {
        warn!("Contamination index value is very large: {:.2}", index);
    } else {
        info!("Contamination index obtained ({:.2})", index);
    }

    Some(ContaminationIndex { index, n_members })
}

/// Resample stars with replacement, keeping the sample size.
pub fn bootstrap_resample(stars: &[Star], rng: &mut StdRng) -> Vec<Star> {
    if stars.is_empty() {
        return Vec::new();
    }
    (0..stars.len())
        .map(|_| stars[rng.random_range(0..stars.len())].clone())
        .collect()
}
