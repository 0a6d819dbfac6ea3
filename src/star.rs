//! Star records as they come out of a photometric/kinematic catalog.
//!
//! Every measured quantity is carried together with its own uncertainty.
//! A dimension that was not measured for a star is `None`; a measurement
//! with a non-finite value is treated the same way.

/// A single measured value and its 1-sigma uncertainty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub value: f64,
    pub error: f64,
}

impl Measurement {
    pub fn new(value: f64, error: f64) -> Self {
        Self { value, error }
    }

    /// `true` when the value can take part in a likelihood.
    pub fn is_defined(&self) -> bool {
        self.value.is_finite()
    }
}

/// Optional kinematic columns, in the order they appear in weight vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KinematicColumn {
    Parallax,
    PmX,
    PmY,
    RadialVelocity,
}

impl KinematicColumn {
    pub const ALL: [KinematicColumn; 4] = [
        KinematicColumn::Parallax,
        KinematicColumn::PmX,
        KinematicColumn::PmY,
        KinematicColumn::RadialVelocity,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            KinematicColumn::Parallax => "parallax",
            KinematicColumn::PmX => "pm_x",
            KinematicColumn::PmY => "pm_y",
            KinematicColumn::RadialVelocity => "radial_velocity",
        }
    }
}

/// Which optional kinematic columns a catalog provides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KinematicColumns {
    pub parallax: bool,
    pub pm_x: bool,
    pub pm_y: bool,
    pub radial_velocity: bool,
}

impl KinematicColumns {
    /// No kinematic data at all (photometry-only catalogs).
    pub fn none() -> Self {
        Self::default()
    }

    /// All four kinematic columns.
    pub fn all() -> Self {
        Self {
            parallax: true,
            pm_x: true,
            pm_y: true,
            radial_velocity: true,
        }
    }

    pub fn contains(&self, col: KinematicColumn) -> bool {
        match col {
            KinematicColumn::Parallax => self.parallax,
            KinematicColumn::PmX => self.pm_x,
            KinematicColumn::PmY => self.pm_y,
            KinematicColumn::RadialVelocity => self.radial_velocity,
        }
    }

    /// Present columns in canonical order.
    pub fn present(&self) -> impl Iterator<Item = KinematicColumn> + '_ {
        KinematicColumn::ALL
            .into_iter()
            .filter(move |&c| self.contains(c))
    }

    pub fn count(&self) -> usize {
        self.present().count()
    }

    /// Columns that are defined for at least one of the given stars.
    pub fn detect(stars: &[Star]) -> Self {
        let has = |col: KinematicColumn| stars.iter().any(|s| s.kinematics.is_defined(col));
        Self {
            parallax: has(KinematicColumn::Parallax),
            pm_x: has(KinematicColumn::PmX),
            pm_y: has(KinematicColumn::PmY),
            radial_velocity: has(KinematicColumn::RadialVelocity),
        }
    }
}

/// Kinematic measurements of one star.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Kinematics {
    /// Parallax (mas).
    pub parallax: Option<Measurement>,
    /// Proper motion along x (mas/yr).
    pub pm_x: Option<Measurement>,
    /// Proper motion along y (mas/yr).
    pub pm_y: Option<Measurement>,
    /// Radial velocity (km/s).
    pub radial_velocity: Option<Measurement>,
}

impl Kinematics {
    pub fn get(&self, col: KinematicColumn) -> Option<Measurement> {
        match col {
            KinematicColumn::Parallax => self.parallax,
            KinematicColumn::PmX => self.pm_x,
            KinematicColumn::PmY => self.pm_y,
            KinematicColumn::RadialVelocity => self.radial_velocity,
        }
    }

    pub fn is_defined(&self, col: KinematicColumn) -> bool {
        self.get(col).is_some_and(|m| m.is_defined())
    }
}

/// A catalog star.
///
/// `mags` and `colors` hold one entry per photometric column of the catalog.
/// Decontamination uses the first magnitude and every color; the remaining
/// magnitudes travel along for downstream consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct Star {
    pub id: u64,
    pub x: f64,
    pub y: f64,
    pub mags: Vec<Option<Measurement>>,
    pub colors: Vec<Option<Measurement>>,
    pub kinematics: Kinematics,
}

impl Star {
    /// Star with a single magnitude and a set of colors, no kinematics.
    pub fn photometric(id: u64, x: f64, y: f64, mag: Measurement, colors: &[Measurement]) -> Self {
        Self {
            id,
            x,
            y,
            mags: vec![Some(mag)],
            colors: colors.iter().copied().map(Some).collect(),
            kinematics: Kinematics::default(),
        }
    }

    /// Primary magnitude, if measured.
    pub fn mag(&self) -> Option<Measurement> {
        self.mags.first().copied().flatten()
    }

    /// Squared distance from `(cx, cy)` in frame coordinates.
    pub fn dist2_to(&self, cx: f64, cy: f64) -> f64 {
        let dx = self.x - cx;
        let dy = self.y - cy;
        dx * dx + dy * dy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_kinematic_columns() {
        let mut a = Star::photometric(1, 0.0, 0.0, Measurement::new(15.0, 0.01), &[]);
        let b = Star::photometric(2, 1.0, 1.0, Measurement::new(16.0, 0.02), &[]);
        a.kinematics.pm_x = Some(Measurement::new(1.5, 0.1));
        // A NaN value does not count as present.
        a.kinematics.parallax = Some(Measurement::new(f64::NAN, 0.1));

        let cols = KinematicColumns::detect(&[a, b]);
        assert!(cols.pm_x);
        assert!(!cols.parallax);
        assert!(!cols.pm_y);
        assert_eq!(cols.count(), 1);
        assert_eq!(
            cols.present().collect::<Vec<_>>(),
            vec![KinematicColumn::PmX]
        );
    }

    #[test]
    fn primary_magnitude() {
        let s = Star {
            id: 7,
            x: 0.0,
            y: 0.0,
            mags: vec![None, Some(Measurement::new(12.0, 0.1))],
            colors: vec![],
            kinematics: Kinematics::default(),
        };
        assert_eq!(s.mag(), None);
        assert_eq!(s.dist2_to(3.0, 4.0), 25.0);
    }
}
