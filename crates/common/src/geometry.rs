use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Smallest side length a cube may have. Point-sized proxies would otherwise
/// produce a degenerate root that contains nothing but its own center.
pub const MIN_CUBE_SIDE: f32 = 1.0e-3;

/// Axis-aligned bounding box in world space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn from_center_size(center: Vec3, size: Vec3) -> Self {
        let half = size.abs() * 0.5;
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Tightest box around a set of points, `None` when the set is empty.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p)));
        Some(Self { min, max })
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Inclusive containment test.
    pub fn contains_point(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    pub fn encapsulate(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// World box of this box after applying `m` (all eight corners).
    pub fn transformed(&self, m: &Mat4) -> Aabb {
        let corners = (0..8).map(|i| {
            let c = Vec3::new(
                if i & 4 != 0 { self.max.x } else { self.min.x },
                if i & 2 != 0 { self.max.y } else { self.min.y },
                if i & 1 != 0 { self.max.z } else { self.min.z },
            );
            m.transform_point3(c)
        });
        // Eight corners, never empty.
        Aabb::from_points(corners).unwrap_or(*self)
    }
}

/// Axis-aligned cube: the bounds of every spatial volume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cube {
    pub center: Vec3,
    pub half_extent: f32,
}

impl Cube {
    pub fn new(center: Vec3, half_extent: f32) -> Self {
        Self {
            center,
            half_extent: half_extent.abs(),
        }
    }

    /// Expand a box into a cube anchored at the box minimum, with the side
    /// length of the box's longest axis.
    pub fn enclosing(aabb: &Aabb) -> Self {
        let side = aabb.size().max_element().max(MIN_CUBE_SIDE);
        let half = side * 0.5;
        Self {
            center: aabb.min + Vec3::splat(half),
            half_extent: half,
        }
    }

    pub fn min(&self) -> Vec3 {
        self.center - Vec3::splat(self.half_extent)
    }

    pub fn max(&self) -> Vec3 {
        self.center + Vec3::splat(self.half_extent)
    }

    pub fn side(&self) -> f32 {
        self.half_extent * 2.0
    }

    pub fn to_aabb(&self) -> Aabb {
        Aabb {
            min: self.min(),
            max: self.max(),
        }
    }

    /// Inclusive containment test.
    pub fn contains_point(&self, p: Vec3) -> bool {
        self.to_aabb().contains_point(p)
    }

    pub fn contains_cube(&self, other: &Cube) -> bool {
        self.contains_point(other.min()) && self.contains_point(other.max())
    }

    /// Index of the octant holding `p`. Bits are x, y, z from high to low,
    /// and a coordinate equal to the center selects the upper half, so points
    /// on shared faces resolve to exactly one octant.
    pub fn octant_index(&self, p: Vec3) -> usize {
        let mut index = 0;
        if p.x >= self.center.x {
            index |= 4;
        }
        if p.y >= self.center.y {
            index |= 2;
        }
        if p.z >= self.center.z {
            index |= 1;
        }
        index
    }

    /// Offset of octant `index` from the center, as a sign per axis.
    pub fn octant_sign(index: usize) -> Vec3 {
        Vec3::new(
            if index & 4 != 0 { 1.0 } else { -1.0 },
            if index & 2 != 0 { 1.0 } else { -1.0 },
            if index & 1 != 0 { 1.0 } else { -1.0 },
        )
    }

    /// One of the eight half-size sub-cubes.
    pub fn octant(&self, index: usize) -> Cube {
        let quarter = self.half_extent * 0.5;
        Cube {
            center: self.center + Self::octant_sign(index) * quarter,
            half_extent: quarter,
        }
    }

    pub fn octants(&self) -> [Cube; 8] {
        std::array::from_fn(|i| self.octant(i))
    }

    /// Volume of the intersection with another cube (zero for face contact).
    pub fn overlap_volume(&self, other: &Cube) -> f32 {
        let lo = self.min().max(other.min());
        let hi = self.max().min(other.max());
        let d = (hi - lo).max(Vec3::ZERO);
        d.x * d.y * d.z
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enclosing_cube_is_anchored_at_min() {
        let aabb = Aabb::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(4.0, 1.0, 2.0));
        let cube = Cube::enclosing(&aabb);
        assert_eq!(cube.min(), Vec3::ZERO);
        assert_eq!(cube.side(), 4.0);
        assert!(cube.contains_point(aabb.max));
    }

    #[test]
    fn enclosing_point_has_minimum_side() {
        let aabb = Aabb::from_center_size(Vec3::ONE, Vec3::ZERO);
        let cube = Cube::enclosing(&aabb);
        assert_eq!(cube.side(), MIN_CUBE_SIDE);
        assert!(cube.contains_point(Vec3::ONE));
    }

    #[test]
    fn octants_tile_parent() {
        let cube = Cube::new(Vec3::new(1.0, 2.0, 3.0), 4.0);
        let children = cube.octants();
        let total: f32 = children.iter().map(|c| c.side().powi(3)).sum();
        assert!((total - cube.side().powi(3)).abs() < 1e-3);
        for (i, a) in children.iter().enumerate() {
            assert_eq!(a.half_extent, cube.half_extent * 0.5);
            assert!(cube.contains_cube(a));
            for b in children.iter().skip(i + 1) {
                assert_eq!(a.overlap_volume(b), 0.0);
            }
        }
    }

    #[test]
    fn octant_index_matches_octant_bounds() {
        let cube = Cube::new(Vec3::ZERO, 1.0);
        let p = Vec3::new(0.5, -0.5, 0.25);
        let idx = cube.octant_index(p);
        assert_eq!(idx, 0b101);
        assert!(cube.octant(idx).contains_point(p));
    }

    #[test]
    fn face_points_resolve_to_upper_octant() {
        let cube = Cube::new(Vec3::ZERO, 1.0);
        assert_eq!(cube.octant_index(Vec3::ZERO), 7);
    }

    #[test]
    fn aabb_transformed_by_translation() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let moved = aabb.transformed(&Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0)));
        assert_eq!(moved.min, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(moved.max, Vec3::new(3.0, 1.0, 1.0));
    }

    #[test]
    fn aabb_from_points_empty() {
        assert!(Aabb::from_points(std::iter::empty()).is_none());
    }
}
