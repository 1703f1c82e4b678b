//! Axis-aligned bounding boxes, reduced to 2D from the engine's 3D AABB.

use super::vec2::Vec2;

/// An axis-aligned bounding box in document space.
///
/// Invariant: `min.x() <= max.x()` and `min.y() <= max.y()`. Degenerate
/// boxes (zero width or height) are valid and arise for point-like
/// entities such as a zero-length line.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    min: Vec2,
    max: Vec2,
}

impl Aabb {
    /// Builds an AABB from explicit min/max corners, reordering components
    /// so the invariant holds regardless of input order.
    #[must_use]
    pub fn new(a: Vec2, b: Vec2) -> Self {
        Self {
            min: a.min(&b),
            max: a.max(&b),
        }
    }

    /// Returns the minimum corner.
    #[must_use]
    pub fn min(&self) -> Vec2 {
        self.min
    }

    /// Returns the maximum corner.
    #[must_use]
    pub fn max(&self) -> Vec2 {
        self.max
    }

    /// Builds the smallest AABB enclosing every point in `points`.
    ///
    /// Returns `None` for an empty slice.
    #[must_use]
    pub fn from_points(points: &[Vec2]) -> Option<Self> {
        let mut iter = points.iter();
        let first = *iter.next()?;
        let mut min = first;
        let mut max = first;
        for p in iter {
            min = min.min(p);
            max = max.max(p);
        }
        Some(Self { min, max })
    }

    /// Width along x.
    #[must_use]
    pub fn width(&self) -> f32 {
        self.max.x() - self.min.x()
    }

    /// Height along y.
    #[must_use]
    pub fn height(&self) -> f32 {
        self.max.y() - self.min.y()
    }

    /// Center point.
    #[must_use]
    pub fn center(&self) -> Vec2 {
        self.min.lerp(&self.max, 0.5)
    }

    /// Returns `true` if `point` lies within the box, inclusive of edges.
    #[must_use]
    pub fn contains_point(&self, point: Vec2) -> bool {
        point.x() >= self.min.x()
            && point.x() <= self.max.x()
            && point.y() >= self.min.y()
            && point.y() <= self.max.y()
    }

    /// Returns `true` if `self` fully contains `other`.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        self.contains_point(other.min) && self.contains_point(other.max)
    }

    /// Returns `true` if the two boxes share any area or edge.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.x() <= other.max.x()
            && self.max.x() >= other.min.x()
            && self.min.y() <= other.max.y()
            && self.max.y() >= other.min.y()
    }

    /// Returns the smallest AABB enclosing both boxes.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(&other.min),
            max: self.max.max(&other.max),
        }
    }

    /// Grows the box outward by `amount` on every side. A negative amount
    /// shrinks it, clamping so min never exceeds max.
    #[must_use]
    pub fn inflate(&self, amount: f32) -> Self {
        let delta = Vec2::new(amount, amount);
        let min = self.min.sub(&delta);
        let max = self.max.add(&delta);
        Self {
            min: min.min(&max),
            max: min.max(&max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_reorders_swapped_corners() {
        let box_ = Aabb::new(Vec2::new(10.0, 10.0), Vec2::new(0.0, 0.0));
        assert_eq!(box_.min(), Vec2::new(0.0, 0.0));
        assert_eq!(box_.max(), Vec2::new(10.0, 10.0));
    }

    #[test]
    fn overlaps_detects_touching_edges() {
        let a = Aabb::new(Vec2::new(0.0, 0.0), Vec2::new(10.0, 10.0));
        let b = Aabb::new(Vec2::new(10.0, 0.0), Vec2::new(20.0, 10.0));
        assert!(a.overlaps(&b));
    }

    #[test]
    fn overlaps_rejects_separated_boxes() {
        let a = Aabb::new(Vec2::new(0.0, 0.0), Vec2::new(10.0, 10.0));
        let b = Aabb::new(Vec2::new(11.0, 0.0), Vec2::new(20.0, 10.0));
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn union_encloses_both() {
        let a = Aabb::new(Vec2::new(0.0, 0.0), Vec2::new(5.0, 5.0));
        let b = Aabb::new(Vec2::new(3.0, -2.0), Vec2::new(9.0, 1.0));
        let u = a.union(&b);
        assert_eq!(u.min(), Vec2::new(0.0, -2.0));
        assert_eq!(u.max(), Vec2::new(9.0, 5.0));
    }

    #[test]
    fn from_points_empty_is_none() {
        assert!(Aabb::from_points(&[]).is_none());
    }

    #[test]
    fn inflate_shrinks_on_negative_amount() {
        let a = Aabb::new(Vec2::new(0.0, 0.0), Vec2::new(10.0, 10.0));
        let shrunk = a.inflate(-4.0);
        assert_eq!(shrunk.min(), Vec2::new(4.0, 4.0));
        assert_eq!(shrunk.max(), Vec2::new(6.0, 6.0));
    }
}
