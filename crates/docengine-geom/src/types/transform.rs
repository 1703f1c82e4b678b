//! Affine 2D transform: translation, rotation, and uniform/non-uniform scale.

use super::vec2::Vec2;

/// A 2x3 affine transform applied as `p' = R * S * p + t`.
///
/// Stored as separate translation/rotation/scale components rather than a
/// packed matrix so that entity records (which carry position, rotation,
/// and scale directly per spec.md's record schema) can be built without an
/// intermediate matrix decomposition.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Transform2D {
    translation: Vec2,
    rotation_radians: f32,
    scale: Vec2,
}

impl Default for Transform2D {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform2D {
    /// The identity transform.
    pub const IDENTITY: Self = Self {
        translation: Vec2::new(0.0, 0.0),
        rotation_radians: 0.0,
        scale: Vec2::new(1.0, 1.0),
    };

    /// Builds a transform from its components.
    #[must_use]
    pub const fn new(translation: Vec2, rotation_radians: f32, scale: Vec2) -> Self {
        Self {
            translation,
            rotation_radians,
            scale,
        }
    }

    /// Returns the translation component.
    #[must_use]
    pub fn translation(&self) -> Vec2 {
        self.translation
    }

    /// Returns the rotation component in radians.
    #[must_use]
    pub fn rotation_radians(&self) -> f32 {
        self.rotation_radians
    }

    /// Returns the scale component.
    #[must_use]
    pub fn scale(&self) -> Vec2 {
        self.scale
    }

    /// Applies the transform to a point: scale, then rotate, then translate.
    #[must_use]
    pub fn apply_point(&self, point: Vec2) -> Vec2 {
        let scaled = Vec2::new(point.x() * self.scale.x(), point.y() * self.scale.y());
        scaled.rotate(self.rotation_radians).add(&self.translation)
    }

    /// Applies only the linear part (rotation + scale) to a direction,
    /// ignoring translation.
    #[must_use]
    pub fn apply_direction(&self, direction: Vec2) -> Vec2 {
        let scaled = Vec2::new(
            direction.x() * self.scale.x(),
            direction.y() * self.scale.y(),
        );
        scaled.rotate(self.rotation_radians)
    }

    /// Returns a copy translated by `delta`.
    #[must_use]
    pub fn translated(&self, delta: Vec2) -> Self {
        Self {
            translation: self.translation.add(&delta),
            ..*self
        }
    }

    /// Returns a copy with rotation incremented by `radians`.
    #[must_use]
    pub fn rotated(&self, radians: f32) -> Self {
        Self {
            rotation_radians: self.rotation_radians + radians,
            ..*self
        }
    }

    /// Returns a copy with scale multiplied componentwise by `factor`.
    #[must_use]
    pub fn scaled(&self, factor: Vec2) -> Self {
        Self {
            scale: Vec2::new(self.scale.x() * factor.x(), self.scale.y() * factor.y()),
            ..*self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_a_no_op() {
        let p = Vec2::new(3.0, -4.0);
        assert_eq!(Transform2D::IDENTITY.apply_point(p), p);
    }

    #[test]
    fn translation_shifts_point() {
        let t = Transform2D::new(Vec2::new(1.0, 2.0), 0.0, Vec2::new(1.0, 1.0));
        assert_eq!(t.apply_point(Vec2::ZERO), Vec2::new(1.0, 2.0));
    }

    #[test]
    fn scale_then_rotate_order() {
        let t = Transform2D::new(
            Vec2::ZERO,
            std::f32::consts::FRAC_PI_2,
            Vec2::new(2.0, 1.0),
        );
        let r = t.apply_point(Vec2::new(1.0, 0.0));
        assert!((r.x()).abs() < 1e-5);
        assert!((r.y() - 2.0).abs() < 1e-5);
    }

    #[test]
    fn apply_direction_ignores_translation() {
        let t = Transform2D::new(Vec2::new(5.0, 5.0), 0.0, Vec2::new(1.0, 1.0));
        assert_eq!(t.apply_direction(Vec2::new(1.0, 0.0)), Vec2::new(1.0, 0.0));
    }
}
