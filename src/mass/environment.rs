//! Mass-loss ingredients: stellar evolution and the Galactic tidal
//! environment.
//!
//! The dissolution timescale `t0` follows Lamers, Gieles & Portegies Zwart
//! (2005): `t0 = C_env (1 - eps) 10^(-4 gamma) rho_amb^(-1/2)`, with the
//! ambient density `rho_amb = Laplacian(Phi) / (4 pi)` of a three-component
//! Milky Way potential evaluated at the cluster's Galactocentric radius and
//! height. Only the radial/vertical derivatives of each component enter.

use std::f64::consts::PI;

use nalgebra::{Matrix3, Vector3};

/// Exponent of the mass-loss law `dM/dt = -M^(1 - gamma) / t0`.
pub const GAMMA: f64 = 0.62;

/// Environmental dissolution constant (yr).
const C_ENV0: f64 = 810e6;
/// Eccentricity correction.
const EPSILON: f64 = 0.08;
/// Sun–Galactic center distance (pc).
const R_SUN_PC: f64 = 8000.0;

// Bulge (Hernquist)
const M_BULGE: f64 = 2.5e10;
const R_BULGE: f64 = 0.5e3;
// Disk (Miyamoto–Nagai)
const M_DISK: f64 = 7.5e10;
const A_DISK: f64 = 5.4e3;
const B_DISK: f64 = 0.3e3;
// Halo (Sanderson)
const M_HALO: f64 = 1.87e11;
const R_HALO: f64 = 15.19e3;

/// Fraction of the initial cluster mass lost to stellar evolution at
/// `log_age` (log10 of the age in years). Ages below 10^7.1 yr are treated
/// as 10^7.1 yr.
pub fn stellar_evolution_mass_loss(log_age: f64) -> f64 {
    const A: f64 = 7.0;
    const B: f64 = 0.26;
    const C: f64 = -1.8;
    10f64.powf((log_age.max(7.1) - A).powf(B) + C)
}

/// Equatorial (ICRS) to Galactic rotation matrix.
fn icrs_to_galactic() -> Matrix3<f64> {
    Matrix3::new(
        -0.054_875_560_416_215_4,
        -0.873_437_090_234_885,
        -0.483_835_015_548_713,
        0.494_109_427_875_584,
        -0.444_829_629_960_011,
        0.746_982_244_497_219,
        -0.867_666_149_019_005,
        -0.198_076_373_431_202,
        0.455_983_776_175_067,
    )
}

/// Galactic longitude and latitude (radians, `l` in `[0, 2 pi)`) of an
/// equatorial direction given in degrees.
pub fn galactic_coordinates(ra_deg: f64, dec_deg: f64) -> (f64, f64) {
    let (sin_ra, cos_ra) = ra_deg.to_radians().sin_cos();
    let (sin_dec, cos_dec) = dec_deg.to_radians().sin_cos();
    let eq = Vector3::new(cos_dec * cos_ra, cos_dec * sin_ra, sin_dec);
    let g = icrs_to_galactic() * eq;
    let l = g.y.atan2(g.x).rem_euclid(2.0 * PI);
    let b = g.z.clamp(-1.0, 1.0).asin();
    (l, b)
}

/// Cluster position on the sky plus its distance modulus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyPosition {
    pub ra_deg: f64,
    pub dec_deg: f64,
    pub distance_modulus: f64,
}

/// Galactocentric cylindrical position (pc).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GalacticPosition {
    /// Distance from the Galactic rotation axis.
    pub r_pc: f64,
    /// Height above the Galactic plane.
    pub z_pc: f64,
}

impl SkyPosition {
    pub fn distance_pc(&self) -> f64 {
        10f64.powf(0.2 * (self.distance_modulus + 5.0))
    }

    /// Galactocentric position, with the Sun in the plane at 8 kpc.
    pub fn galactocentric(&self) -> GalacticPosition {
        let (l, b) = galactic_coordinates(self.ra_deg, self.dec_deg);
        let d = self.distance_pc();
        let x = d * b.cos() * l.cos() - R_SUN_PC;
        let y = d * b.cos() * l.sin();
        GalacticPosition {
            r_pc: x.hypot(y),
            z_pc: d * b.sin(),
        }
    }
}

/// Ambient mass density (M_sun / pc^3) from the Laplacian of the bulge,
/// disk and halo potentials.
pub fn ambient_density(pos: &GalacticPosition) -> f64 {
    let r = pos.r_pc;
    let z = pos.z_pc;

    let bulge = 2.0 * M_BULGE * R_BULGE / (r * (r + R_BULGE).powi(3));

    let b2 = B_DISK * B_DISK;
    let zb = (z * z + b2).sqrt();
    let a_zb2 = (A_DISK + zb).powi(2);
    let numerator = M_DISK * b2 * (A_DISK * r * r + (A_DISK + 3.0 * zb) * a_zb2);
    let denominator = (b2 + z * z).powf(1.5) * (r * r + a_zb2).powf(2.5);
    let disk = numerator / denominator;

    let amp = -M_HALO / (2f64.ln() - 0.5);
    let halo = -amp / (r * (r + R_HALO).powi(2));

    (bulge + disk + halo) / (4.0 * PI)
}

/// Environmental dissolution timescale `t0` (yr) at the cluster position.
pub fn dissolution_timescale(sky: &SkyPosition) -> f64 {
    dissolution_timescale_at(&sky.galactocentric())
}

/// Dissolution timescale `t0` (yr) at a Galactocentric position.
pub fn dissolution_timescale_at(pos: &GalacticPosition) -> f64 {
    let rho = ambient_density(pos);
    C_ENV0 * (1.0 - EPSILON) * 10f64.powf(-4.0 * GAMMA) * rho.powf(-0.5)
}
