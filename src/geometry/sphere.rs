use crate::geometry::bounding_box::Box3;
use nalgebra::Point3;

/// A bounding sphere, used as the weight/priority signal for octree nodes (see
/// [`crate::priority_queue`]) and for the traversal-vs-profile intersection test in
/// [`crate::profile_request`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sphere {
    pub center: Point3<f64>,
    pub radius: f64,
}

impl Sphere {
    pub fn new(center: Point3<f64>, radius: f64) -> Self {
        Sphere { center, radius }
    }

    /// A sphere that circumscribes the given box.
    pub fn bounding(b: &Box3) -> Self {
        let center = b.center();
        let radius = (b.max() - center).norm();
        Sphere { center, radius }
    }

    /// Applies a rigid/affine transform to the sphere. Only used with matrices that preserve
    /// uniform scale, consistent with how world matrices are applied to octree nodes.
    pub fn transform(&self, matrix: &nalgebra::Matrix4<f64>) -> Self {
        let center = matrix.transform_point(&self.center);
        let scale = matrix.fixed_view::<3, 1>(0, 0).norm();
        Sphere {
            center,
            radius: self.radius * scale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_sphere_contains_box_corners() {
        let b = Box3::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0));
        let s = Sphere::bounding(&b);
        assert_eq!(s.center, Point3::new(0.0, 0.0, 0.0));
        assert!((s.radius - 3.0_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn transform_scales_radius() {
        let s = Sphere::new(Point3::new(0.0, 0.0, 0.0), 2.0);
        let m = nalgebra::Matrix4::new_scaling(2.0);
        let t = s.transform(&m);
        assert!((t.radius - 4.0).abs() < 1e-9);
    }
}
