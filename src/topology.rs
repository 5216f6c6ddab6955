//! Coupling topology generators and the normalized weight matrix.
//!
//! A topology describes which voices feed which; the matrix it generates is
//! row-normalized into a diffusive operator (every non-zero row sums to one).
//! Construction always starts from a cleared matrix and happens on the
//! control thread; the audio thread only ever reads a published generation.

use rand::Rng;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::types::EngineError;

/// The coupling pattern between voices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Display)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Topology {
    /// No coupling at all.
    None,
    /// Each voice feeds its two ring neighbors.
    Ring,
    /// A ring whose edges are rewired to random targets with probability
    /// `rewire`.
    SmallWorld { rewire: f32 },
    /// Fully connected blocks of `cluster_size` voices, bridged at their
    /// first members.
    Clustered { cluster_size: usize },
    /// One hub voice connected to every spoke.
    HubSpoke { hub: usize },
    /// Every unordered pair is connected with probability `probability`.
    Random { probability: f32 },
    /// Every voice feeds every other.
    Complete,
}

impl Topology {
    /// Validate generator parameters against a pool of `pool_size` voices.
    pub fn validate(&self, pool_size: usize) -> Result<(), EngineError> {
        match *self {
            Topology::SmallWorld { rewire } => {
                if !(0.0..=1.0).contains(&rewire) || !rewire.is_finite() {
                    return Err(EngineError::InvalidParameter {
                        param: "rewire",
                        value: rewire as f64,
                        reason: "must lie in [0, 1]",
                    });
                }
            }
            Topology::Clustered { cluster_size } => {
                if cluster_size == 0 {
                    return Err(EngineError::InvalidParameter {
                        param: "cluster_size",
                        value: 0.0,
                        reason: "must be at least 1",
                    });
                }
            }
            Topology::HubSpoke { hub } => {
                if hub >= pool_size {
                    return Err(EngineError::InvalidParameter {
                        param: "hub",
                        value: hub as f64,
                        reason: "hub index must address a pool voice",
                    });
                }
            }
            Topology::Random { probability } => {
                if !(0.0..=1.0).contains(&probability) || !probability.is_finite() {
                    return Err(EngineError::InvalidParameter {
                        param: "probability",
                        value: probability as f64,
                        reason: "must lie in [0, 1]",
                    });
                }
            }
            Topology::None | Topology::Ring | Topology::Complete => {}
        }
        Ok(())
    }
}

/// A V x V non-negative weight matrix in a flat buffer.
///
/// Invariants after [`CouplingMatrix::build`]: the diagonal is zero and every
/// row sums to exactly one or is all-zero.
#[derive(Debug, Clone, PartialEq)]
pub struct CouplingMatrix {
    weights: Box<[f32]>,
    size: usize,
}

impl CouplingMatrix {
    pub fn zeros(size: usize) -> Self {
        Self {
            weights: vec![0.0; size * size].into_boxed_slice(),
            size,
        }
    }

    /// Build and normalize a fresh matrix for `spec` over `size` voices.
    /// The caller provides the PRNG so rewiring stays seedable.
    pub fn build<R: Rng>(spec: &Topology, size: usize, rng: &mut R) -> Self {
        let mut matrix = Self::zeros(size);
        match *spec {
            Topology::None => {}
            Topology::Ring => matrix.build_ring(),
            Topology::SmallWorld { rewire } => {
                matrix.build_ring();
                matrix.rewire_edges(rewire, rng);
            }
            Topology::Clustered { cluster_size } => matrix.build_clustered(cluster_size),
            Topology::HubSpoke { hub } => matrix.build_hub_spoke(hub),
            Topology::Random { probability } => matrix.build_random(probability, rng),
            Topology::Complete => matrix.build_complete(),
        }
        matrix.normalize_rows();
        matrix
    }

    fn build_ring(&mut self) {
        let v = self.size;
        for i in 0..v {
            let prev = (i + v - 1) % v;
            let next = (i + 1) % v;
            if prev != i {
                self.set(i, prev, 1.0);
            }
            if next != i {
                self.set(i, next, 1.0);
            }
        }
    }

    fn rewire_edges<R: Rng>(&mut self, rewire: f32, rng: &mut R) {
        let v = self.size;
        if v < 2 {
            return;
        }
        // Collect the undirected edges first so a rewired edge is not
        // revisited within the same pass.
        let mut edges = Vec::new();
        for i in 0..v {
            for j in (i + 1)..v {
                if self.get(i, j) > 0.0 {
                    edges.push((i, j));
                }
            }
        }
        for (i, j) in edges {
            if rng.random::<f32>() >= rewire {
                continue;
            }
            let mut target = rng.random_range(0..v);
            while target == i {
                target = rng.random_range(0..v);
            }
            self.set(i, j, 0.0);
            self.set(j, i, 0.0);
            self.set(i, target, 1.0);
            self.set(target, i, 1.0);
        }
    }

    fn build_clustered(&mut self, cluster_size: usize) {
        let v = self.size;
        let cluster_size = cluster_size.max(1);
        for start in (0..v).step_by(cluster_size) {
            let end = (start + cluster_size).min(v);
            for i in start..end {
                for j in start..end {
                    if i != j {
                        self.set(i, j, 1.0);
                    }
                }
            }
            // Bridge to the next block through the block heads.
            let next_start = start + cluster_size;
            if next_start < v {
                self.set(start, next_start, 0.5);
                self.set(next_start, start, 0.5);
            }
        }
    }

    fn build_hub_spoke(&mut self, hub: usize) {
        for i in 0..self.size {
            if i != hub {
                self.set(hub, i, 1.0);
                self.set(i, hub, 1.0);
            }
        }
    }

    fn build_random<R: Rng>(&mut self, probability: f32, rng: &mut R) {
        let v = self.size;
        for i in 0..v {
            for j in (i + 1)..v {
                if rng.random::<f32>() < probability {
                    self.set(i, j, 1.0);
                    self.set(j, i, 1.0);
                }
            }
        }
    }

    fn build_complete(&mut self) {
        for i in 0..self.size {
            for j in 0..self.size {
                if i != j {
                    self.set(i, j, 1.0);
                }
            }
        }
    }

    /// Divide each non-zero row by its sum, yielding a diffusive operator.
    fn normalize_rows(&mut self) {
        for i in 0..self.size {
            let sum = self.row_sum(i);
            if sum > 0.0 {
                for j in 0..self.size {
                    let w = self.get(i, j);
                    self.set(i, j, w / sum);
                }
            }
        }
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f32 {
        self.weights[i * self.size + j]
    }

    #[inline]
    fn set(&mut self, i: usize, j: usize, value: f32) {
        self.weights[i * self.size + j] = value;
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn row_sum(&self, i: usize) -> f32 {
        (0..self.size).map(|j| self.get(i, j)).sum()
    }

    pub fn is_symmetric(&self) -> bool {
        for i in 0..self.size {
            for j in (i + 1)..self.size {
                if (self.get(i, j) - self.get(j, i)).abs() > 1e-6 {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(0xC0FFEE)
    }

    fn assert_rows_normalized(m: &CouplingMatrix) {
        for i in 0..m.size() {
            let sum = m.row_sum(i);
            assert!(
                sum.abs() < 1e-6 || (sum - 1.0).abs() < 1e-6,
                "row {} sums to {}",
                i,
                sum
            );
        }
    }

    fn assert_zero_diagonal(m: &CouplingMatrix) {
        for i in 0..m.size() {
            assert_eq!(m.get(i, i), 0.0, "diagonal at {}", i);
        }
    }

    #[test]
    fn test_ring_normalization() {
        let m = CouplingMatrix::build(&Topology::Ring, 8, &mut rng());
        assert_zero_diagonal(&m);
        for i in 0..8 {
            assert!((m.row_sum(i) - 1.0).abs() < 1e-6);
            assert!((m.get(i, (i + 1) % 8) - 0.5).abs() < 1e-6);
            assert!((m.get(i, (i + 7) % 8) - 0.5).abs() < 1e-6);
            for j in 0..8 {
                if j != (i + 1) % 8 && j != (i + 7) % 8 {
                    assert_eq!(m.get(i, j), 0.0);
                }
            }
        }
        assert!(m.is_symmetric());
    }

    #[test]
    fn test_hub_spoke_rows() {
        let m = CouplingMatrix::build(&Topology::HubSpoke { hub: 0 }, 4, &mut rng());
        assert_zero_diagonal(&m);
        // Hub row spreads evenly over the spokes.
        for j in 1..4 {
            assert!((m.get(0, j) - 1.0 / 3.0).abs() < 1e-6);
        }
        // Each spoke row has a single unit entry back to the hub.
        for i in 1..4 {
            assert!((m.get(i, 0) - 1.0).abs() < 1e-6);
            for j in 1..4 {
                assert_eq!(m.get(i, j), 0.0);
            }
        }
    }

    #[test]
    fn test_complete_rows() {
        let m = CouplingMatrix::build(&Topology::Complete, 5, &mut rng());
        assert_zero_diagonal(&m);
        assert_rows_normalized(&m);
        for i in 0..5 {
            for j in 0..5 {
                if i != j {
                    assert!((m.get(i, j) - 0.25).abs() < 1e-6);
                }
            }
        }
        assert!(m.is_symmetric());
    }

    #[test]
    fn test_clustered_bridges() {
        let m = CouplingMatrix::build(&Topology::Clustered { cluster_size: 3 }, 6, &mut rng());
        assert_zero_diagonal(&m);
        assert_rows_normalized(&m);
        // Before normalization the block head carries two unit neighbors
        // plus a 0.5 bridge, so the bridge weight lands at 0.5 / 2.5.
        assert!((m.get(0, 3) - 0.2).abs() < 1e-6);
        assert!((m.get(3, 0) - 0.2).abs() < 1e-6);
        // Interior members only see their own block.
        assert_eq!(m.get(1, 3), 0.0);
        assert_eq!(m.get(2, 4), 0.0);
    }

    #[test]
    fn test_small_world_stays_normalized() {
        let m = CouplingMatrix::build(&Topology::SmallWorld { rewire: 0.5 }, 12, &mut rng());
        assert_zero_diagonal(&m);
        assert_rows_normalized(&m);
    }

    #[test]
    fn test_random_is_symmetric_and_normalized() {
        let m = CouplingMatrix::build(&Topology::Random { probability: 0.4 }, 10, &mut rng());
        assert_zero_diagonal(&m);
        assert_rows_normalized(&m);
        assert!(m.is_symmetric());
    }

    #[test]
    fn test_none_is_all_zero() {
        let m = CouplingMatrix::build(&Topology::None, 6, &mut rng());
        for i in 0..6 {
            assert_eq!(m.row_sum(i), 0.0);
        }
    }

    #[test]
    fn test_same_seed_same_matrix() {
        let spec = Topology::SmallWorld { rewire: 0.7 };
        let a = CouplingMatrix::build(&spec, 16, &mut StdRng::seed_from_u64(42));
        let b = CouplingMatrix::build(&spec, 16, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_validate_rejects_bad_parameters() {
        assert!(Topology::HubSpoke { hub: 8 }.validate(8).is_err());
        assert!(Topology::Clustered { cluster_size: 0 }.validate(8).is_err());
        assert!(Topology::Random { probability: 1.5 }.validate(8).is_err());
        assert!(Topology::SmallWorld { rewire: -0.1 }.validate(8).is_err());
        assert!(Topology::Ring.validate(8).is_ok());
    }

    #[test]
    fn test_serde_round_trip() {
        let spec = Topology::SmallWorld { rewire: 0.25 };
        let json = serde_json::to_string(&spec).unwrap();
        let back: Topology = serde_json::from_str(&json).unwrap();
        assert_eq!(spec, back);
    }
}
