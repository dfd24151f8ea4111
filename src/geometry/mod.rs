pub mod bounding_box;
pub mod plane;
pub mod sphere;

/// World-space position, used throughout the profile extraction core.
///
/// The octree stores point positions at `f32` precision (see
/// [`NodeRef::position_column`](crate::octree_source::NodeRef::position_column)); profile
/// geometry (markers, planes, mileage) is kept at `f64` because a polyline can span a distance
/// where `f32` no longer resolves individual points.
pub type Vec3 = nalgebra::Point3<f64>;
pub type Vector3 = nalgebra::Vector3<f64>;
pub type Matrix4 = nalgebra::Matrix4<f64>;
