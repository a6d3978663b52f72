use std::num::NonZeroUsize;

use kiddo::immutable::float::kdtree::ImmutableKdTree;
use kiddo::SquaredEuclidean;

/// Neighbourhood definition used by [`KdTree::search`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KdTreeSearchParam {
    /// The `knn` nearest points.
    Knn {
        /// Number of neighbours.
        knn: usize,
    },
    /// Every point within `radius`.
    Radius {
        /// Search radius.
        radius: f64,
    },
    /// At most `max_nn` nearest points within `radius`.
    Hybrid {
        /// Search radius.
        radius: f64,
        /// Maximum number of neighbours.
        max_nn: usize,
    },
}

/// A kd-tree over the points of a point cloud.
///
/// Items stored in the tree are the indices of the points in the slice the tree was built
/// from. All the distances returned by the queries are Euclidean (not squared) and sorted
/// in ascending order, except for [`KdTree::radius`].
pub struct KdTree {
    // unset for an empty point set
    tree: Option<ImmutableKdTree<f64, u32, 3, 32>>,
    num_points: usize,
}

impl KdTree {
    /// Build the tree from a slice of points.
    pub fn new(points: &[[f64; 3]]) -> Self {
        Self {
            tree: (!points.is_empty()).then(|| ImmutableKdTree::new_from_slice(points)),
            num_points: points.len(),
        }
    }

    /// Number of points indexed by the tree.
    pub fn len(&self) -> usize {
        self.num_points
    }

    /// Check if the tree indexes no points.
    pub fn is_empty(&self) -> bool {
        self.num_points == 0
    }

    /// Find the `k` nearest neighbours of `query`, the query itself included when it is part
    /// of the indexed points.
    ///
    /// # Returns
    ///
    /// The indices of the neighbours and their distances. Empty when `k == 0`, the tree is
    /// empty or the query is not finite.
    pub fn knn(&self, query: &[f64; 3], k: usize) -> (Vec<usize>, Vec<f64>) {
        let Some(k) = NonZeroUsize::new(k) else {
            return (Vec::new(), Vec::new());
        };
        let Some(tree) = self.queryable_tree(query) else {
            return (Vec::new(), Vec::new());
        };

        tree.nearest_n::<SquaredEuclidean>(query, k)
            .into_iter()
            .map(|nn| (nn.item as usize, nn.distance.sqrt()))
            .unzip()
    }

    /// Find every point within `radius` to `query`, in no particular order.
    pub fn radius(&self, query: &[f64; 3], radius: f64) -> (Vec<usize>, Vec<f64>) {
        let Some(tree) = self.queryable_tree(query) else {
            return (Vec::new(), Vec::new());
        };
        if !(radius.is_finite() && radius > 0.0) {
            return (Vec::new(), Vec::new());
        }

        tree.within_unsorted::<SquaredEuclidean>(query, radius * radius)
            .into_iter()
            .map(|nn| (nn.item as usize, nn.distance.sqrt()))
            .unzip()
    }

    /// Find at most `max_nn` nearest points within `radius` to `query`.
    pub fn hybrid(&self, query: &[f64; 3], radius: f64, max_nn: usize) -> (Vec<usize>, Vec<f64>) {
        let Some(max_nn) = NonZeroUsize::new(max_nn) else {
            return (Vec::new(), Vec::new());
        };
        let Some(tree) = self.queryable_tree(query) else {
            return (Vec::new(), Vec::new());
        };
        if !(radius.is_finite() && radius > 0.0) {
            return (Vec::new(), Vec::new());
        }

        tree.nearest_n_within::<SquaredEuclidean>(query, radius * radius, max_nn, true)
            .into_iter()
            .map(|nn| (nn.item as usize, nn.distance.sqrt()))
            .unzip()
    }

    /// Run the query described by `param`.
    pub fn search(&self, query: &[f64; 3], param: &KdTreeSearchParam) -> (Vec<usize>, Vec<f64>) {
        match *param {
            KdTreeSearchParam::Knn { knn } => self.knn(query, knn),
            KdTreeSearchParam::Radius { radius } => self.radius(query, radius),
            KdTreeSearchParam::Hybrid { radius, max_nn } => self.hybrid(query, radius, max_nn),
        }
    }

    fn queryable_tree(&self, query: &[f64; 3]) -> Option<&ImmutableKdTree<f64, u32, 3, 32>> {
        if query.iter().all(|v| v.is_finite()) {
            self.tree.as_ref()
        } else {
            None
        }
    }
}
