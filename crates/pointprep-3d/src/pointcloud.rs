use glam::DVec3;

/// A point cloud with points, colors, and normals.
///
/// Colors and normals, when present, hold one entry per point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    // The points in the point cloud.
    points: Vec<[f64; 3]>,
    // The colors of the points.
    colors: Option<Vec<[u8; 3]>>,
    // The normals of the points.
    normals: Option<Vec<[f64; 3]>>,
}

impl PointCloud {
    /// Create a new point cloud from points, colors (optional), and normals (optional).
    pub fn new(
        points: Vec<[f64; 3]>,
        colors: Option<Vec<[u8; 3]>>,
        normals: Option<Vec<[f64; 3]>>,
    ) -> Self {
        Self {
            points,
            colors,
            normals,
        }
    }

    /// Get the number of points in the point cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the point cloud.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Get as reference the colors of the points in the point cloud.
    pub fn colors(&self) -> Option<&[[u8; 3]]> {
        self.colors.as_deref()
    }

    /// Get as reference the normals of the points in the point cloud.
    pub fn normals(&self) -> Option<&[[f64; 3]]> {
        self.normals.as_deref()
    }

    /// Get the minimum bound of the point cloud.
    ///
    /// Returns the zero vector for an empty cloud.
    pub fn get_min_bound(&self) -> DVec3 {
        self.points
            .iter()
            .map(|p| DVec3::from_array(*p))
            .reduce(DVec3::min)
            .unwrap_or(DVec3::ZERO)
    }

    /// Get the maximum bound of the point cloud.
    ///
    /// Returns the zero vector for an empty cloud.
    pub fn get_max_bound(&self) -> DVec3 {
        self.points
            .iter()
            .map(|p| DVec3::from_array(*p))
            .reduce(DVec3::max)
            .unwrap_or(DVec3::ZERO)
    }

    /// Get the centroid of the points.
    ///
    /// Returns the zero vector for an empty cloud.
    pub fn get_center(&self) -> DVec3 {
        if self.points.is_empty() {
            return DVec3::ZERO;
        }
        let sum = self
            .points
            .iter()
            .fold(DVec3::ZERO, |acc, p| acc + DVec3::from_array(*p));
        sum / self.points.len() as f64
    }

    /// Translate every point of the cloud in place.
    ///
    /// # Arguments
    ///
    /// * `translation` - The offset added to each point.
    pub fn translate(&mut self, translation: DVec3) {
        for point in self.points.iter_mut() {
            *point = (DVec3::from_array(*point) + translation).to_array();
        }
    }

    /// Build a new point cloud from a subset of the points.
    ///
    /// Colors and normals follow their points.
    ///
    /// # Arguments
    ///
    /// * `indices` - The indices of the points to select.
    /// * `invert` - If `true`, select every point whose index is NOT in `indices`.
    ///
    /// # Returns
    ///
    /// With `invert == false` the points are returned in the order of `indices`,
    /// otherwise in ascending index order. Out of range indices are skipped.
    pub fn select_by_index(&self, indices: &[usize], invert: bool) -> PointCloud {
        let num_points = self.points.len();

        let selected: Vec<usize> = if invert {
            let mut mask = vec![true; num_points];
            for &idx in indices {
                if let Some(keep) = mask.get_mut(idx) {
                    *keep = false;
                }
            }
            (0..num_points).filter(|&i| mask[i]).collect()
        } else {
            indices.iter().copied().filter(|&i| i < num_points).collect()
        };

        if !invert && selected.len() != indices.len() {
            log::warn!(
                "select_by_index: skipped {} out of range indices",
                indices.len() - selected.len()
            );
        }

        let points = selected.iter().map(|&i| self.points[i]).collect();
        let colors = self
            .colors
            .as_ref()
            .map(|colors| selected.iter().filter_map(|&i| colors.get(i).copied()).collect());
        let normals = self
            .normals
            .as_ref()
            .map(|normals| selected.iter().filter_map(|&i| normals.get(i).copied()).collect());

        PointCloud::new(points, colors, normals)
    }

    /// Assign the same color to every point, replacing existing colors.
    pub fn paint_uniform_color(&mut self, color: [u8; 3]) {
        self.colors = Some(vec![color; self.points.len()]);
    }

    /// Replace the normals of the point cloud.
    ///
    /// PRECONDITION: `normals` has one entry per point.
    pub fn set_normals(&mut self, normals: Vec<[f64; 3]>) {
        debug_assert_eq!(normals.len(), self.points.len());
        self.normals = Some(normals);
    }
}
