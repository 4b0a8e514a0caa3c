//! Bounding-sphere math.
//!
//! The LOD machinery projects world-space error spheres into screen space,
//! so the sphere type must survive arbitrary affine transforms and must be
//! byte-castable for GPU records.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// A bounding sphere - center plus radius.
///
/// Radii are allowed to be non-finite: `+inf` acts as an "always larger
/// than any threshold" sentinel in LOD selection and propagates unchanged
/// through transforms.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Sphere {
    /// Sphere center.
    pub center: Vec3,
    /// Sphere radius.
    pub radius: f32,
}

impl Sphere {
    /// Creates a sphere from center and radius.
    #[inline]
    #[must_use]
    pub const fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Returns this sphere mapped through an affine transform.
    ///
    /// The center is transformed as a point; the radius is scaled by the
    /// largest basis-axis scale, which keeps the result a conservative
    /// bound under non-uniform scaling.
    #[must_use]
    pub fn transformed(&self, transform: &Mat4) -> Self {
        let scale = transform
            .x_axis
            .truncate()
            .length()
            .max(transform.y_axis.truncate().length())
            .max(transform.z_axis.truncate().length());
        Self {
            center: transform.transform_point3(self.center),
            radius: self.radius * scale,
        }
    }
}

impl Default for Sphere {
    fn default() -> Self {
        Self::new(Vec3::ZERO, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translation_moves_center_only() {
        let sphere = Sphere::new(Vec3::new(1.0, 2.0, 3.0), 0.5);
        let moved = sphere.transformed(&Mat4::from_translation(Vec3::new(0.0, 0.0, -10.0)));
        assert_eq!(moved.center, Vec3::new(1.0, 2.0, -7.0));
        assert_eq!(moved.radius, 0.5);
    }

    #[test]
    fn test_radius_uses_largest_axis_scale() {
        let sphere = Sphere::new(Vec3::ZERO, 2.0);
        let scaled = sphere.transformed(&Mat4::from_scale(Vec3::new(1.0, 3.0, 0.5)));
        assert!((scaled.radius - 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_infinite_radius_propagates() {
        let sphere = Sphere::new(Vec3::ZERO, f32::INFINITY);
        let moved = sphere.transformed(&Mat4::from_translation(Vec3::X));
        assert!(moved.radius.is_infinite());
    }

    #[test]
    fn test_sphere_is_pod_sized() {
        assert_eq!(std::mem::size_of::<Sphere>(), 16);
    }
}
