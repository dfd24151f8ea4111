use crate::attributes::TypedPointBuffer;
use crate::error::{ProfileError, Result};
use crate::events::{Publisher, SubscriptionHandle};
use crate::geometry::plane::Plane;
use crate::geometry::{Vec3, Vector3};
use nalgebra::Point3;

/// Events emitted by [`Profile`] mutation (§6, "Events"). The source emits `marker_added`
/// immediately followed by a spurious `marker_moved` for the same index (see SPEC_FULL §9);
/// here `add_marker` only ever publishes `MarkerAdded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileEvent {
    MarkerAdded { index: usize },
    MarkerMoved { index: usize },
    MarkerRemoved { index: usize },
    WidthChanged,
}

/// Per-segment derived geometry (C2). Every field here is recomputed by
/// [`Profile::derive_segments`]; nothing here is stored across calls.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Index of this segment within `Profile::derive_segments()`'s output, used to attribute
    /// emitted data back to a segment when aggregating (see `ProfileController::aggregation`).
    pub index: usize,
    pub start: Vec3,
    pub end: Vec3,
    pub start_g: Vec3,
    pub end_g: Vec3,
    pub side: Vector3,
    pub forward: Vector3,
    pub cut_plane: Plane,
    pub half_plane: Plane,
    pub length: f64,
    pub points: TypedPointBuffer,
}

/// Ordered polyline of markers with a corridor width and a fixed (unused by the filter) height.
pub struct Profile {
    markers: Vec<Vec3>,
    width: f64,
    height: f64,
    publisher: Publisher<ProfileEvent>,
}

impl Profile {
    pub fn new(width: f64, height: f64) -> Result<Self> {
        if width <= 0.0 {
            return Err(ProfileError::InvalidProfile {
                reason: "width must be positive",
            });
        }
        Ok(Profile {
            markers: Vec::new(),
            width,
            height,
            publisher: Publisher::new(),
        })
    }

    pub fn markers(&self) -> &[Vec3] {
        &self.markers
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    #[must_use = "dropping the returned handle immediately unsubscribes"]
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&ProfileEvent) + Send + Sync + 'static,
    {
        self.publisher.subscribe(callback)
    }

    pub fn add_marker(&mut self, p: Vec3) {
        self.markers.push(p);
        let index = self.markers.len() - 1;
        self.publisher.publish(&ProfileEvent::MarkerAdded { index });
    }

    pub fn move_marker(&mut self, index: usize, p: Vec3) -> Result<()> {
        if index >= self.markers.len() {
            return Err(ProfileError::InvalidProfile {
                reason: "marker index out of bounds",
            });
        }
        self.markers[index] = p;
        self.publisher.publish(&ProfileEvent::MarkerMoved { index });
        Ok(())
    }

    pub fn remove_marker(&mut self, index: usize) -> Result<()> {
        if index >= self.markers.len() {
            return Err(ProfileError::InvalidProfile {
                reason: "marker index out of bounds",
            });
        }
        self.markers.remove(index);
        self.publisher
            .publish(&ProfileEvent::MarkerRemoved { index });
        Ok(())
    }

    pub fn set_width(&mut self, w: f64) -> Result<()> {
        if w <= 0.0 {
            return Err(ProfileError::InvalidProfile {
                reason: "width must be positive",
            });
        }
        self.width = w;
        self.publisher.publish(&ProfileEvent::WidthChanged);
        Ok(())
    }

    /// Derives the per-segment geometry for the current marker set. Returns an empty vector if
    /// fewer than two markers are present (see SPEC_FULL §8, boundary behaviors); the caller
    /// (`ProfileController::recompute`) treats that as an `InvalidProfile` no-op.
    pub fn derive_segments(&self) -> Vec<Segment> {
        let mut segments = Vec::with_capacity(self.markers.len().saturating_sub(1));
        for (index, pair) in self.markers.windows(2).enumerate() {
            let start = pair[0];
            let end = pair[1];
            let start_g = Point3::new(start.x, start.y, 0.0);
            let end_g = Point3::new(end.x, end.y, 0.0);
            let side = (end_g - start_g).normalize();
            let forward = side.cross(&Vector3::new(0.0, 0.0, 1.0)).normalize();
            let cut_plane = Plane::from_point_normal(start_g, forward);
            let midpoint = nalgebra::center(&start_g, &end_g);
            let half_plane = Plane::from_point_normal(midpoint, side);
            let length = (end_g - start_g).norm();
            segments.push(Segment {
                index,
                start,
                end,
                start_g,
                end_g,
                side,
                forward,
                cut_plane,
                half_plane,
                length,
                points: TypedPointBuffer::new(),
            });
        }
        segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_segments_count_and_orthogonality() {
        let mut p = Profile::new(2.0, 10.0).unwrap();
        p.add_marker(Point3::new(0.0, 0.0, 0.0));
        p.add_marker(Point3::new(10.0, 0.0, 0.0));
        p.add_marker(Point3::new(10.0, 10.0, 0.0));
        let segments = p.derive_segments();
        assert_eq!(segments.len(), 2);
        for s in &segments {
            assert!((s.forward.norm() - 1.0).abs() < 1e-9);
            assert!((s.side.norm() - 1.0).abs() < 1e-9);
            assert!(s.forward.dot(&s.side).abs() < 1e-9);
        }
    }

    #[test]
    fn fewer_than_two_markers_yields_no_segments() {
        let mut p = Profile::new(2.0, 10.0).unwrap();
        assert!(p.derive_segments().is_empty());
        p.add_marker(Point3::new(0.0, 0.0, 0.0));
        assert!(p.derive_segments().is_empty());
    }

    #[test]
    fn segments_share_endpoints_pairwise() {
        let mut p = Profile::new(2.0, 10.0).unwrap();
        p.add_marker(Point3::new(0.0, 0.0, 0.0));
        p.add_marker(Point3::new(10.0, 0.0, 0.0));
        p.add_marker(Point3::new(10.0, 10.0, 0.0));
        let segments = p.derive_segments();
        assert_eq!(segments[0].end, segments[1].start);
    }

    #[test]
    fn set_width_rejects_non_positive() {
        let mut p = Profile::new(2.0, 10.0).unwrap();
        assert!(p.set_width(0.0).is_err());
        assert!(p.set_width(-1.0).is_err());
        assert!(p.set_width(5.0).is_ok());
        assert_eq!(p.width(), 5.0);
    }

    #[test]
    fn add_marker_emits_exactly_one_event() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let mut p = Profile::new(2.0, 10.0).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let handle = p.subscribe(move |e| {
            if matches!(e, ProfileEvent::MarkerAdded { .. }) {
                count2.fetch_add(1, Ordering::SeqCst);
            }
        });
        p.add_marker(Point3::new(0.0, 0.0, 0.0));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        drop(handle);
    }

    #[test]
    fn move_marker_rejects_out_of_bounds() {
        let mut p = Profile::new(2.0, 10.0).unwrap();
        p.add_marker(Point3::new(0.0, 0.0, 0.0));
        assert!(p.move_marker(5, Point3::new(1.0, 1.0, 1.0)).is_err());
        assert!(p.move_marker(0, Point3::new(1.0, 1.0, 1.0)).is_ok());
    }

    #[test]
    fn add_then_remove_marker_is_geometrically_equivalent() {
        let mut p = Profile::new(2.0, 10.0).unwrap();
        p.add_marker(Point3::new(0.0, 0.0, 0.0));
        p.add_marker(Point3::new(10.0, 0.0, 0.0));
        let before = p.derive_segments();

        p.add_marker(Point3::new(10.0, 10.0, 0.0));
        let last = p.markers().len() - 1;
        p.remove_marker(last).unwrap();

        let after = p.derive_segments();
        assert_eq!(before.len(), after.len());
        for (b, a) in before.iter().zip(after.iter()) {
            assert_eq!(b.start, a.start);
            assert_eq!(b.end, a.end);
            assert_eq!(b.start_g, a.start_g);
            assert_eq!(b.end_g, a.end_g);
            assert_eq!(b.side, a.side);
            assert_eq!(b.forward, a.forward);
            assert_eq!(b.cut_plane, a.cut_plane);
            assert_eq!(b.half_plane, a.half_plane);
            assert_eq!(b.length, a.length);
        }
    }
}
