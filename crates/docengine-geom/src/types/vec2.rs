//! Deterministic 2D vector used throughout the document engine.

/// A 2D point or direction in world-space units.
///
/// Arithmetic stays in `f32` to match the render/tessellation pipeline's
/// precision; callers must ensure inputs are finite.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Vec2 {
    data: [f32; 2],
}

/// Global epsilon used when detecting degenerate values (zero-length
/// vectors, near-zero denominators).
pub const EPSILON: f32 = 1e-6;

impl Vec2 {
    /// Creates a vector from components.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { data: [x, y] }
    }

    /// The zero vector.
    pub const ZERO: Self = Self::new(0.0, 0.0);

    /// Returns the x component.
    #[must_use]
    pub fn x(&self) -> f32 {
        self.data[0]
    }

    /// Returns the y component.
    #[must_use]
    pub fn y(&self) -> f32 {
        self.data[1]
    }

    /// Returns the components as an array.
    #[must_use]
    pub fn to_array(self) -> [f32; 2] {
        self.data
    }

    /// Adds two vectors.
    #[must_use]
    pub fn add(&self, other: &Self) -> Self {
        Self::new(self.x() + other.x(), self.y() + other.y())
    }

    /// Subtracts another vector.
    #[must_use]
    pub fn sub(&self, other: &Self) -> Self {
        Self::new(self.x() - other.x(), self.y() - other.y())
    }

    /// Scales the vector by a scalar.
    #[must_use]
    pub fn scale(&self, scalar: f32) -> Self {
        Self::new(self.x() * scalar, self.y() * scalar)
    }

    /// Dot product with another vector.
    #[must_use]
    pub fn dot(&self, other: &Self) -> f32 {
        self.x() * other.x() + self.y() * other.y()
    }

    /// 2D "cross product" (the z-component of the 3D cross product).
    #[must_use]
    pub fn cross(&self, other: &Self) -> f32 {
        self.x() * other.y() - self.y() * other.x()
    }

    /// Euclidean length.
    #[must_use]
    pub fn length(&self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Squared length (avoids the `sqrt` for comparisons).
    #[must_use]
    pub fn length_squared(&self) -> f32 {
        self.dot(self)
    }

    /// Distance to another point.
    #[must_use]
    pub fn distance(&self, other: &Self) -> f32 {
        self.sub(other).length()
    }

    /// Normalizes the vector, returning the zero vector if length is ~0.
    #[must_use]
    pub fn normalize(&self) -> Self {
        let len = self.length();
        if len <= EPSILON {
            return Self::ZERO;
        }
        self.scale(1.0 / len)
    }

    /// Componentwise minimum.
    #[must_use]
    pub fn min(&self, other: &Self) -> Self {
        Self::new(self.x().min(other.x()), self.y().min(other.y()))
    }

    /// Componentwise maximum.
    #[must_use]
    pub fn max(&self, other: &Self) -> Self {
        Self::new(self.x().max(other.x()), self.y().max(other.y()))
    }

    /// Linear interpolation between `self` and `other` at parameter `t`.
    #[must_use]
    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        self.add(&other.sub(self).scale(t))
    }

    /// Rotates the vector by `radians` around the origin.
    #[must_use]
    pub fn rotate(&self, radians: f32) -> Self {
        let (sin, cos) = radians.sin_cos();
        Self::new(
            self.x() * cos - self.y() * sin,
            self.x() * sin + self.y() * cos,
        )
    }
}

impl From<[f32; 2]> for Vec2 {
    fn from(value: [f32; 2]) -> Self {
        Self { data: value }
    }
}
