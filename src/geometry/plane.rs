use nalgebra::{Point3, Vector3};

/// A plane in Hessian normal form: `{p : normal . p == b}`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub normal: Vector3<f64>,
    pub b: f64,
}

impl Plane {
    /// Constructs the plane through `point` with the given (not necessarily normalized) normal.
    pub fn from_point_normal(point: Point3<f64>, normal: Vector3<f64>) -> Self {
        let normal = normal.normalize();
        let b = normal.dot(&point.coords);
        Plane { normal, b }
    }

    pub fn signed_distance(&self, p: Point3<f64>) -> f64 {
        self.normal.dot(&p.coords) - self.b
    }

    pub fn is_on_positive_side(&self, p: Point3<f64>) -> bool {
        self.signed_distance(p) >= 0.0
    }

    pub fn is_on_negative_side(&self, p: Point3<f64>) -> bool {
        !self.is_on_positive_side(p)
    }

    pub fn project_onto_plane(&self, p: Point3<f64>) -> Point3<f64> {
        p - self.normal * self.signed_distance(p)
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::{Point3, Vector3};

    use crate::geometry::plane::Plane;

    #[test]
    fn from_point_normal() {
        let p = Plane::from_point_normal(Point3::new(1.0, 2.0, 0.5), Vector3::new(0.0, 0.0, 3.0));
        assert_eq!(Vector3::new(0.0, 0.0, 1.0), p.normal);
        assert_eq!(0.5, p.b);
        assert!(p.is_on_positive_side(Point3::new(0.0, 0.0, 1.0)));
        assert!(p.is_on_negative_side(Point3::new(0.0, 0.0, 0.0)));
    }

    #[test]
    fn project_point_on_plane() {
        let p = Plane::from_point_normal(Point3::new(1.0, 2.0, 0.5), Vector3::new(0.0, 0.0, 3.0));
        let on_plane = p.project_onto_plane(Point3::new(1.0, 2.0, 3.0));
        assert_eq!(on_plane, Point3::new(1.0, 2.0, 0.5));
    }

    #[test]
    fn signed_distance_matches_magnitude() {
        let p = Plane::from_point_normal(Point3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(p.signed_distance(Point3::new(3.0, 5.0, 5.0)), 3.0);
        assert_eq!(p.signed_distance(Point3::new(-3.0, 5.0, 5.0)), -3.0);
    }
}
