use crate::error::{ProfileError, Result};
use crate::geometry::{Matrix4, Vector3};
use crate::octree_source::NodeRef;
use crate::profile::Segment;
use nalgebra::Point3;
use std::time::{Duration, Instant};

/// Points accepted from one `(node, segment)` pair, in input order, trimmed to the number
/// actually accepted (C5 output).
#[derive(Debug, Clone, Default)]
pub struct AcceptedBatch {
    pub indices: Vec<u32>,
    pub mileage: Vec<f64>,
    pub projected_positions: Vec<[f32; 3]>,
}

impl AcceptedBatch {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Whether a resumed [`SegmentFilter::accept`] call finished the node or needs another tick.
#[derive(Debug)]
pub enum FilterProgress {
    NotDone,
    Done(AcceptedBatch),
}

const PROBE_INTERVAL: usize = 1000;

/// Cooperative per-node, per-segment point acceptance and cross-section projection (C5).
///
/// One `SegmentFilter` instance handles exactly one `(node, segment)` pair across however many
/// resumptions it takes; [`crate::profile_request::ProfileRequest`] owns that lifetime. Elapsed
/// time is only probed every [`PROBE_INTERVAL`] points rather than on every point, since the
/// clock read would otherwise dominate the per-point cost (see SPEC_FULL §4.5, "Rationale").
pub struct SegmentFilter {
    cursor: usize,
    accepted: AcceptedBatch,
    checkpoint: Instant,
}

impl SegmentFilter {
    pub fn new() -> Self {
        SegmentFilter {
            cursor: 0,
            accepted: AcceptedBatch::default(),
            checkpoint: Instant::now(),
        }
    }

    /// Resumes (or starts) filtering `node`'s points against `segment`.
    ///
    /// `matrix` is the point cloud's world matrix; the node-local `T(node.bounding_box().min())`
    /// offset is applied here (SPEC_FULL §4.5 step 1). `width` is `profile.width`; `segment_dir`
    /// is `segment.side`. Returns `EmptyGeometry` if the node claims points but has no position
    /// column once loaded.
    pub fn accept(
        &mut self,
        node: &dyn NodeRef,
        matrix: &Matrix4,
        segment: &Segment,
        segment_dir: &Vector3,
        total_mileage: f64,
        width: f64,
        yield_budget: Duration,
    ) -> Result<FilterProgress> {
        let num_points = node.num_points() as usize;
        let positions = match node.position_column() {
            Some(p) => p,
            None => {
                if num_points > 0 {
                    return Err(ProfileError::EmptyGeometry {
                        node_level: node.level(),
                        num_points: node.num_points(),
                    });
                }
                return Ok(FilterProgress::Done(std::mem::take(&mut self.accepted)));
            }
        };

        let offset = node.bounding_box().min();
        let local_to_world = matrix * Matrix4::new_translation(&offset.coords);

        let mut since_probe = 0usize;
        while self.cursor < num_points {
            let i = self.cursor;
            let local = Point3::new(
                positions[i * 3] as f64,
                positions[i * 3 + 1] as f64,
                positions[i * 3 + 2] as f64,
            );
            let pos = local_to_world.transform_point(&local);

            let d_cut = segment.cut_plane.signed_distance(pos).abs();
            let d_half = segment.half_plane.signed_distance(pos).abs();
            if d_cut < width / 2.0 && d_half < segment.length / 2.0 {
                let local_mileage = segment_dir.dot(&(pos - segment.start));
                let mileage = total_mileage + local_mileage;
                self.accepted.indices.push(i as u32);
                self.accepted.mileage.push(mileage);
                self.accepted
                    .projected_positions
                    .push([mileage as f32, 0.0, pos.z as f32]);
            }

            self.cursor += 1;
            since_probe += 1;
            if since_probe >= PROBE_INTERVAL {
                since_probe = 0;
                let now = Instant::now();
                if now.duration_since(self.checkpoint) > yield_budget {
                    self.checkpoint = now;
                    return Ok(FilterProgress::NotDone);
                }
            }
        }

        Ok(FilterProgress::Done(std::mem::take(&mut self.accepted)))
    }
}

impl Default for SegmentFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{AttributeKind, Column};
    use crate::geometry::bounding_box::Box3;
    use crate::geometry::sphere::Sphere;
    use crate::octree_source::NodeId;
    use crate::profile::Profile;
    use std::sync::Arc;

    struct FakeNode {
        level: u32,
        num_points: u32,
        bbox: Box3,
        positions: Option<Arc<[f32]>>,
    }

    impl NodeRef for FakeNode {
        fn id(&self) -> NodeId {
            0
        }
        fn level(&self) -> u32 {
            self.level
        }
        fn num_points(&self) -> u32 {
            self.num_points
        }
        fn bounding_box(&self) -> Box3 {
            self.bbox.clone()
        }
        fn bounding_sphere(&self) -> Sphere {
            Sphere::bounding(&self.bbox)
        }
        fn has_children(&self) -> bool {
            false
        }
        fn hierarchy_step_size(&self) -> u32 {
            1
        }
        fn children(&self) -> [Option<Arc<dyn NodeRef>>; 8] {
            [None, None, None, None, None, None, None, None]
        }
        fn loaded(&self) -> bool {
            true
        }
        fn load(&self) {}
        fn position_column(&self) -> Option<Arc<[f32]>> {
            self.positions.clone()
        }
        fn attribute_column(&self, _kind: AttributeKind) -> Option<Column> {
            None
        }
    }

    fn node_with_points(points: &[[f32; 3]]) -> FakeNode {
        let mut flat = Vec::with_capacity(points.len() * 3);
        for p in points {
            flat.extend_from_slice(p);
        }
        FakeNode {
            level: 0,
            num_points: points.len() as u32,
            bbox: Box3::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0)),
            positions: Some(Arc::from(flat.into_boxed_slice())),
        }
    }

    fn straight_profile(width: f64) -> (Profile, Segment) {
        let mut profile = Profile::new(width, 10.0).unwrap();
        profile.add_marker(Point3::new(0.0, 0.0, 0.0));
        profile.add_marker(Point3::new(10.0, 0.0, 0.0));
        let segment = profile.derive_segments().into_iter().next().unwrap();
        (profile, segment)
    }

    #[test]
    fn accepts_points_inside_corridor() {
        let (_profile, segment) = straight_profile(2.0);
        let node = node_with_points(&[[1.0, 0.0, 0.0], [5.0, 0.0, 0.0], [9.0, 0.0, 0.0]]);
        let mut filter = SegmentFilter::new();
        let result = filter
            .accept(
                &node,
                &Matrix4::identity(),
                &segment,
                &segment.side,
                0.0,
                2.0,
                Duration::from_millis(4),
            )
            .unwrap();
        let batch = match result {
            FilterProgress::Done(b) => b,
            FilterProgress::NotDone => panic!("expected completion"),
        };
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.mileage, vec![1.0, 5.0, 9.0]);
        assert_eq!(
            batch.projected_positions,
            vec![[1.0, 0.0, 0.0], [5.0, 0.0, 0.0], [9.0, 0.0, 0.0]]
        );
    }

    #[test]
    fn rejects_beyond_segment_end() {
        let (_profile, segment) = straight_profile(2.0);
        let node = node_with_points(&[[11.0, 0.0, 0.0]]);
        let mut filter = SegmentFilter::new();
        let batch = match filter
            .accept(
                &node,
                &Matrix4::identity(),
                &segment,
                &segment.side,
                0.0,
                2.0,
                Duration::from_millis(4),
            )
            .unwrap()
        {
            FilterProgress::Done(b) => b,
            FilterProgress::NotDone => panic!("expected completion"),
        };
        assert!(batch.is_empty());
    }

    #[test]
    fn rejects_beyond_cut_plane() {
        let (_profile, segment) = straight_profile(2.0);
        let node = node_with_points(&[[5.0, 2.0, 0.0]]);
        let mut filter = SegmentFilter::new();
        let batch = match filter
            .accept(
                &node,
                &Matrix4::identity(),
                &segment,
                &segment.side,
                0.0,
                2.0,
                Duration::from_millis(4),
            )
            .unwrap()
        {
            FilterProgress::Done(b) => b,
            FilterProgress::NotDone => panic!("expected completion"),
        };
        assert!(batch.is_empty());
    }

    #[test]
    fn rejects_point_exactly_on_cut_plane() {
        // Segment runs along +x from (0,0,0) to (10,0,0); its cut plane has normal (0,-1,0)
        // through the start, so d_cut == |pos.y|. width/2 == 1.0, so pos.y == 1.0 lands exactly
        // on the boundary and must be rejected under the spec's strict `<` (SPEC_FULL §8).
        let (_profile, segment) = straight_profile(2.0);
        let node = node_with_points(&[[5.0, 1.0, 0.0]]);
        let mut filter = SegmentFilter::new();
        let batch = match filter
            .accept(
                &node,
                &Matrix4::identity(),
                &segment,
                &segment.side,
                0.0,
                2.0,
                Duration::from_millis(4),
            )
            .unwrap()
        {
            FilterProgress::Done(b) => b,
            FilterProgress::NotDone => panic!("expected completion"),
        };
        assert!(batch.is_empty());
    }

    #[test]
    fn mileage_continues_across_segments() {
        let mut profile = Profile::new(2.0, 10.0).unwrap();
        profile.add_marker(Point3::new(0.0, 0.0, 0.0));
        profile.add_marker(Point3::new(10.0, 0.0, 0.0));
        profile.add_marker(Point3::new(10.0, 10.0, 0.0));
        let segments = profile.derive_segments();
        let segment2 = &segments[1];
        let node = node_with_points(&[[10.0, 5.0, 0.0]]);
        let mut filter = SegmentFilter::new();
        let batch = match filter
            .accept(
                &node,
                &Matrix4::identity(),
                segment2,
                &segment2.side,
                10.0,
                2.0,
                Duration::from_millis(4),
            )
            .unwrap()
        {
            FilterProgress::Done(b) => b,
            FilterProgress::NotDone => panic!("expected completion"),
        };
        assert_eq!(batch.mileage, vec![15.0]);
    }

    #[test]
    fn yields_cooperatively_under_tight_budget() {
        let (_profile, segment) = straight_profile(1000.0);
        let points: Vec<[f32; 3]> = (0..4000).map(|i| [i as f32 * 0.001, 0.0, 0.0]).collect();
        let node = node_with_points(&points);
        let mut filter = SegmentFilter::new();
        let mut yields = 0;
        loop {
            match filter
                .accept(
                    &node,
                    &Matrix4::identity(),
                    &segment,
                    &segment.side,
                    0.0,
                    1000.0,
                    Duration::from_nanos(1),
                )
                .unwrap()
            {
                FilterProgress::NotDone => yields += 1,
                FilterProgress::Done(batch) => {
                    assert_eq!(batch.len(), 4000);
                    break;
                }
            }
        }
        assert!(yields >= 1);
    }
}
