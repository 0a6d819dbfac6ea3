//! Nearest-neighbor matching in photometric space.
//!
//! [`SpatialIndex`] is the capability the mass estimator relies on: build
//! once over a fixed point set, then answer many nearest-neighbor queries.
//! [`KdTree`] is the provided implementation, a balanced tree over points of
//! any fixed dimension:
//!
//! 1. Points are stored flat (`n * dim` values) with their original indices;
//!    points with a non-finite coordinate are left out of the tree.
//! 2. Each node splits on `depth % dim` at the median, so the tree is balanced.
//! 3. Queries descend the near side first and only visit the far side when the
//!    splitting plane is closer than the best match so far.
//!
//! Average query cost is logarithmic in the number of reference points.

use crate::error::{Error, Result};

/// Result of a nearest-neighbor query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index of the reference point in the slice the index was built from.
    pub index: usize,
    /// Euclidean distance to the query point.
    pub distance: f64,
}

/// Build-once, query-many nearest-neighbor capability.
pub trait SpatialIndex: Sized {
    /// Build from `points`, a flat array of `points.len() / dim` points.
    fn build(points: &[f64], dim: usize) -> Result<Self>;

    /// Dimension of the indexed points.
    fn dim(&self) -> usize;

    /// Nearest indexed point to `query`, or `None` for a non-finite query.
    fn nearest(&self, query: &[f64]) -> Option<Neighbor>;
}

#[derive(Debug, Clone)]
struct KdNode {
    /// Index into the compacted point storage
    point: usize,
    left: Option<usize>,
    right: Option<usize>,
    split_dim: usize,
}

/// Balanced k-d tree over fixed-dimension points.
#[derive(Debug, Clone)]
pub struct KdTree {
    dim: usize,
    /// Compacted finite points, `dim` values each.
    coords: Vec<f64>,
    /// Original index of each compacted point.
    source_idx: Vec<usize>,
    nodes: Vec<KdNode>,
    root: Option<usize>,
}

impl KdTree {
    /// Number of indexed (finite) points.
    pub fn len(&self) -> usize {
        self.source_idx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source_idx.is_empty()
    }

    fn point(&self, i: usize) -> &[f64] {
        &self.coords[i * self.dim..(i + 1) * self.dim]
    }

    fn build_recursive(
        coords: &[f64],
        dim: usize,
        indices: &mut [usize],
        depth: usize,
        nodes: &mut Vec<KdNode>,
    ) -> Option<usize> {
        if indices.is_empty() {
            return None;
        }

        let split_dim = depth % dim;
        let median = indices.len() / 2;
        indices.select_nth_unstable_by(median, |&a, &b| {
            coords[a * dim + split_dim].total_cmp(&coords[b * dim + split_dim])
        });

        let node_idx = nodes.len();
        nodes.push(KdNode {
            point: indices[median],
            left: None,
            right: None,
            split_dim,
        });

        let (left_indices, right_part) = indices.split_at_mut(median);
        let right_indices = &mut right_part[1..];

        let left = Self::build_recursive(coords, dim, left_indices, depth + 1, nodes);
        let right = Self::build_recursive(coords, dim, right_indices, depth + 1, nodes);
        nodes[node_idx].left = left;
        nodes[node_idx].right = right;

        Some(node_idx)
    }

    fn nearest_recursive(&self, node_idx: usize, query: &[f64], best: &mut (usize, f64)) {
        let node = &self.nodes[node_idx];
        let point = self.point(node.point);

        let d2 = distance_squared(query, point);
        if d2 < best.1 {
            *best = (node.point, d2);
        }

        let diff = query[node.split_dim] - point[node.split_dim];
        let (near, far) = if diff < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        if let Some(near_idx) = near {
            self.nearest_recursive(near_idx, query, best);
        }
        if let Some(far_idx) = far {
            if diff * diff < best.1 {
                self.nearest_recursive(far_idx, query, best);
            }
        }
    }
}

impl SpatialIndex for KdTree {
    fn build(points: &[f64], dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(Error::DimensionMismatch {
                expected: 1,
                got: 0,
            });
        }
        if !points.len().is_multiple_of(dim) {
            return Err(Error::DimensionMismatch {
                expected: dim,
                got: points.len() % dim,
            });
        }

        let mut coords = Vec::with_capacity(points.len());
        let mut source_idx = Vec::with_capacity(points.len() / dim);
        for (i, p) in points.chunks_exact(dim).enumerate() {
            if p.iter().all(|v| v.is_finite()) {
                coords.extend_from_slice(p);
                source_idx.push(i);
            }
        }
        if source_idx.is_empty() {
            return Err(Error::EmptyPointSet);
        }

        let mut indices: Vec<usize> = (0..source_idx.len()).collect();
        let mut nodes = Vec::with_capacity(source_idx.len());
        let root = Self::build_recursive(&coords, dim, &mut indices, 0, &mut nodes);

        Ok(Self {
            dim,
            coords,
            source_idx,
            nodes,
            root,
        })
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn nearest(&self, query: &[f64]) -> Option<Neighbor> {
        if query.len() != self.dim || !query.iter().all(|v| v.is_finite()) {
            return None;
        }
        let root = self.root?;
        let mut best = (usize::MAX, f64::INFINITY);
        self.nearest_recursive(root, query, &mut best);
        Some(Neighbor {
            index: self.source_idx[best.0],
            distance: best.1.sqrt(),
        })
    }
}

#[inline]
fn distance_squared(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Matches query points against a fixed reference set.
#[derive(Debug, Clone)]
pub struct SpatialMatcher<I: SpatialIndex = KdTree> {
    index: I,
}

impl<I: SpatialIndex> SpatialMatcher<I> {
    /// Build the underlying index over `points` (flat, `dim` values each).
    pub fn new(points: &[f64], dim: usize) -> Result<Self> {
        Ok(Self {
            index: I::build(points, dim)?,
        })
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    /// Nearest reference point for each query (flat, `dim` values each).
    ///
    /// Queries with a non-finite coordinate yield `None`.
    pub fn match_points(&self, queries: &[f64]) -> Vec<Option<Neighbor>> {
        queries
            .chunks_exact(self.index.dim())
            .map(|q| self.index.nearest(q))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{RngExt, SeedableRng};

    fn brute_force(points: &[f64], dim: usize, q: &[f64]) -> (usize, f64) {
        points
            .chunks_exact(dim)
            .enumerate()
            .filter(|(_, p)| p.iter().all(|v| v.is_finite()))
            .map(|(i, p)| (i, distance_squared(p, q).sqrt()))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap()
    }

    #[test]
    fn finds_exact_point() {
        let pts = [0.0, 0.0, 1.0, 1.0, 5.0, 5.0, -3.0, 2.0];
        let tree = KdTree::build(&pts, 2).unwrap();
        assert_eq!(tree.len(), 4);
        let n = tree.nearest(&[5.0, 5.0]).unwrap();
        assert_eq!(n.index, 2);
        assert_eq!(n.distance, 0.0);
        let n = tree.nearest(&[-2.5, 2.2]).unwrap();
        assert_eq!(n.index, 3);
    }

    #[test]
    fn matches_brute_force_3d() {
        let mut rng = StdRng::seed_from_u64(42);
        let dim = 3;
        let pts: Vec<f64> = (0..3000).map(|_| rng.random::<f64>() * 10.0).collect();
        let tree = KdTree::build(&pts, dim).unwrap();

        for _ in 0..200 {
            let q: Vec<f64> = (0..dim).map(|_| rng.random::<f64>() * 12.0 - 1.0).collect();
            let got = tree.nearest(&q).unwrap();
            let (_, dist) = brute_force(&pts, dim, &q);
            assert!((got.distance - dist).abs() < 1e-12);
            let p = &pts[got.index * dim..(got.index + 1) * dim];
            assert!((distance_squared(p, &q).sqrt() - dist).abs() < 1e-12);
        }
    }

    #[test]
    fn skips_non_finite_points_and_queries() {
        let pts = [0.0, f64::NAN, 2.0, 2.0, 4.0, 4.0];
        let tree = KdTree::build(&pts, 2).unwrap();
        assert_eq!(tree.len(), 2);
        // Original indices survive compaction.
        assert_eq!(tree.nearest(&[0.0, 0.0]).unwrap().index, 1);
        assert_eq!(tree.nearest(&[f64::NAN, 0.0]), None);
        assert_eq!(tree.nearest(&[0.0]), None);
    }

    #[test]
    fn build_errors() {
        assert_eq!(
            KdTree::build(&[f64::NAN, 1.0], 2).unwrap_err(),
            Error::EmptyPointSet
        );
        assert!(KdTree::build(&[1.0, 2.0, 3.0], 2).is_err());
        assert!(KdTree::build(&[1.0], 0).is_err());
    }

    #[test]
    fn matcher_queries_many() {
        let pts = [0.0, 0.0, 10.0, 10.0];
        let matcher: SpatialMatcher = SpatialMatcher::new(&pts, 2).unwrap();
        let out = matcher.match_points(&[1.0, 1.0, 9.0, 8.0, f64::NAN, 0.0]);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].unwrap().index, 0);
        assert_eq!(out[1].unwrap().index, 1);
        assert!(out[2].is_none());
    }
}
