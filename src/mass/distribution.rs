//! Accumulated total-mass estimates across realizations.

use rkyv::{Archive, Deserialize, Serialize};
use tracing::info;

use super::total::MassEstimate;
use crate::stats::RunningStats;

/// Raw actual/initial mass values of every realization, running statistics
/// over the non-degenerate ones, and a count of degenerate estimates.
///
/// Serializable with rkyv so that independent worker processes can write
/// their distributions to disk and have them merged later.
#[derive(Debug, Clone, Default, PartialEq, Archive, Serialize, Deserialize)]
pub struct MassDistribution {
    actual: Vec<f64>,
    initial: Vec<f64>,
    deviation: Vec<f64>,
    actual_stats: RunningStats,
    initial_stats: RunningStats,
    degenerate: u64,
}

impl MassDistribution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, estimate: &MassEstimate) {
        self.actual.push(estimate.actual);
        self.initial.push(estimate.initial);
        self.deviation.push(estimate.deviation);
        if estimate.degenerate {
            self.degenerate += 1;
        } else {
            self.actual_stats.push(estimate.actual);
            self.initial_stats.push(estimate.initial);
        }
    }

    /// Append the estimates of `other`, after those of `self`.
    pub fn merge(&mut self, other: &MassDistribution) {
        self.actual.extend_from_slice(&other.actual);
        self.initial.extend_from_slice(&other.initial);
        self.deviation.extend_from_slice(&other.deviation);
        self.actual_stats = self.actual_stats.merge(other.actual_stats);
        self.initial_stats = self.initial_stats.merge(other.initial_stats);
        self.degenerate += other.degenerate;
    }

    /// Number of estimates, degenerate ones included.
    pub fn len(&self) -> usize {
        self.actual.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actual.is_empty()
    }

    pub fn actual(&self) -> &[f64] {
        &self.actual
    }

    pub fn initial(&self) -> &[f64] {
        &self.initial
    }

    pub fn deviation(&self) -> &[f64] {
        &self.deviation
    }

    pub fn actual_stats(&self) -> &RunningStats {
        &self.actual_stats
    }

    pub fn initial_stats(&self) -> &RunningStats {
        &self.initial_stats
    }

    pub fn degenerate_count(&self) -> u64 {
        self.degenerate
    }

    /// Serialize the distribution to bytes using rkyv.
    pub fn to_rkyv_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map_err(|e| anyhow::anyhow!("rkyv serialization failed: {}", e))?;
        Ok(bytes.to_vec())
    }

    /// Save the distribution to a file using rkyv.
    pub fn save_to_file(&self, path: &str) -> anyhow::Result<()> {
        let bytes = self.to_rkyv_bytes()?;
        std::fs::write(path, &bytes)?;
        info!(
            "Saved mass distribution to {} ({} bytes)",
            path,
            bytes.len()
        );
        Ok(())
    }

    /// Load a distribution from an rkyv file.
    pub fn load_from_file(path: &str) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)?;
        let dist = rkyv::from_bytes::<Self, rkyv::rancor::Error>(&bytes)
            .map_err(|e| anyhow::anyhow!("rkyv deserialization failed: {}", e))?;
        info!(
            "Loaded mass distribution: {} estimates, {} degenerate",
            dist.len(),
            dist.degenerate
        );
        Ok(dist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimate(actual: f64, degenerate: bool) -> MassEstimate {
        MassEstimate {
            actual,
            initial: 2.0 * actual,
            deviation: 1.0,
            cutoff: 1000,
            degenerate,
        }
    }

    #[test]
    fn degenerate_estimates_are_counted_not_averaged() {
        let mut dist = MassDistribution::new();
        dist.push(&estimate(100.0, false));
        dist.push(&estimate(0.0, true));
        dist.push(&estimate(300.0, false));

        assert_eq!(dist.len(), 3);
        assert_eq!(dist.degenerate_count(), 1);
        assert_eq!(dist.actual(), &[100.0, 0.0, 300.0]);
        assert_eq!(dist.actual_stats().count(), 2);
        assert!((dist.actual_stats().mean() - 200.0).abs() < 1e-12);
        assert!((dist.initial_stats().mean() - 400.0).abs() < 1e-12);
    }

    #[test]
    fn merge_concatenates() {
        let mut a = MassDistribution::new();
        a.push(&estimate(1.0, false));
        let mut b = MassDistribution::new();
        b.push(&estimate(3.0, false));
        b.push(&estimate(0.0, true));

        a.merge(&b);
        assert_eq!(a.actual(), &[1.0, 3.0, 0.0]);
        assert_eq!(a.degenerate_count(), 1);
        assert!((a.actual_stats().mean() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn bytes_round_trip() {
        let mut dist = MassDistribution::new();
        dist.push(&estimate(120.5, false));
        dist.push(&estimate(0.0, true));
        let bytes = dist.to_rkyv_bytes().unwrap();
        let back = rkyv::from_bytes::<MassDistribution, rkyv::rancor::Error>(&bytes).unwrap();
        assert_eq!(back, dist);
    }
}
