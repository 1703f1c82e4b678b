//! Core geometric value types: vectors, transforms, and bounding boxes.

mod aabb;
mod transform;
mod vec2;

pub use aabb::Aabb;
pub use transform::Transform2D;
pub use vec2::{Vec2, EPSILON};
