use crate::geometry::bounding_box::{Box3, OptionBox3};
use crate::geometry::sphere::Sphere;
use nalgebra::Point3;

/// Per-point attribute columns carried alongside a batch of projected positions, already
/// zero-filled by the caller to the same length as the position slice (mirroring
/// `TypedPointBuffer::append`'s zero-extend rule for attributes absent from a given node).
#[derive(Debug, Clone, Default)]
pub struct PointAttributes {
    pub color: Vec<[u8; 4]>,
    pub intensity: Vec<u16>,
    pub classification: Vec<u8>,
    pub return_number: Vec<u8>,
    pub number_of_returns: Vec<u8>,
    pub point_source_id: Vec<u16>,
}

impl PointAttributes {
    fn drain_prefix(&mut self, n: usize) -> PointAttributes {
        PointAttributes {
            color: self.color.drain(..n).collect(),
            intensity: self.intensity.drain(..n).collect(),
            classification: self.classification.drain(..n).collect(),
            return_number: self.return_number.drain(..n).collect(),
            number_of_returns: self.number_of_returns.drain(..n).collect(),
            point_source_id: self.point_source_id.drain(..n).collect(),
        }
    }
}

/// A fixed-capacity columnar batch of projected points (C8).
///
/// Downstream GPU upload prefers many mid-sized contiguous buffers to one giant growing one
/// (SPEC_FULL §4.8, "Rationale"), so a batch never grows past `capacity`; once full it is
/// finalized (its bounding box/sphere are fixed) and appends continue into a fresh batch.
pub struct Batch {
    capacity: usize,
    position: Vec<[f32; 3]>,
    color: Vec<[u8; 4]>,
    intensity: Vec<u16>,
    classification: Vec<u8>,
    return_number: Vec<u8>,
    number_of_returns: Vec<u8>,
    point_source_id: Vec<u16>,
    bounding_box: OptionBox3,
    finalized_bounds: Option<(Box3, Sphere)>,
}

impl Batch {
    fn new(capacity: usize) -> Self {
        Batch {
            capacity,
            position: Vec::with_capacity(capacity),
            color: Vec::with_capacity(capacity),
            intensity: Vec::with_capacity(capacity),
            classification: Vec::with_capacity(capacity),
            return_number: Vec::with_capacity(capacity),
            number_of_returns: Vec::with_capacity(capacity),
            point_source_id: Vec::with_capacity(capacity),
            bounding_box: OptionBox3::empty(),
            finalized_bounds: None,
        }
    }

    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.position.len() >= self.capacity
    }

    /// The range of this batch currently populated, `(start, count)`; since batches are always
    /// filled contiguously from the front, `start` is always `0`.
    pub fn draw_range(&self) -> (usize, usize) {
        (0, self.position.len())
    }

    pub fn position(&self) -> &[[f32; 3]] {
        &self.position
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized_bounds.is_some()
    }

    pub fn bounding_box(&self) -> Option<Box3> {
        self.finalized_bounds.as_ref().map(|(b, _)| b.clone())
    }

    pub fn bounding_sphere(&self) -> Option<Sphere> {
        self.finalized_bounds.as_ref().map(|(_, s)| *s)
    }

    fn push(&mut self, position: [f32; 3], attrs: &mut PointAttributes) {
        self.bounding_box.extend(Point3::new(
            position[0] as f64,
            position[1] as f64,
            position[2] as f64,
        ));
        self.position.push(position);
        self.color.push(attrs.color.remove(0));
        self.intensity.push(attrs.intensity.remove(0));
        self.classification.push(attrs.classification.remove(0));
        self.return_number.push(attrs.return_number.remove(0));
        self.number_of_returns.push(attrs.number_of_returns.remove(0));
        self.point_source_id.push(attrs.point_source_id.remove(0));
    }

    fn finalize(&mut self) {
        if self.finalized_bounds.is_none() {
            if let Some(b) = self.bounding_box.clone().into_box3() {
                let sphere = Sphere::bounding(&b);
                self.finalized_bounds = Some((b, sphere));
            }
        }
    }
}

/// Per-source batched output: the full set of [`Batch`]es produced for one point cloud input,
/// plus the aggregate projected bounding box across all of them (C8).
pub struct ProjectedEntry {
    capacity: usize,
    batches: Vec<Batch>,
    projected_box: OptionBox3,
}

impl ProjectedEntry {
    pub fn new(capacity: usize) -> Self {
        ProjectedEntry {
            capacity,
            batches: vec![Batch::new(capacity)],
            projected_box: OptionBox3::empty(),
        }
    }

    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    pub fn projected_box(&self) -> &OptionBox3 {
        &self.projected_box
    }

    /// Appends `positions` (already projected into `(mileage, 0, elevation)` space) and their
    /// matching attribute columns, finalizing and rotating batches as they fill.
    pub fn append(&mut self, positions: &[[f32; 3]], mut attrs: PointAttributes) {
        let mut remaining = positions;
        while !remaining.is_empty() {
            let active = self.batches.last_mut().expect("at least one batch always present");
            if active.is_full() {
                active.finalize();
                self.batches.push(Batch::new(self.capacity));
                continue;
            }
            let free = self.capacity - active.len();
            let take = free.min(remaining.len());
            let mut head_attrs = attrs.drain_prefix(take);
            let active = self.batches.last_mut().unwrap();
            for position in &remaining[..take] {
                self.projected_box.extend(Point3::new(
                    position[0] as f64,
                    position[1] as f64,
                    position[2] as f64,
                ));
                active.push(*position, &mut head_attrs);
            }
            remaining = &remaining[take..];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(n: usize) -> PointAttributes {
        PointAttributes {
            color: vec![[0, 0, 0, 0]; n],
            intensity: vec![0; n],
            classification: vec![0; n],
            return_number: vec![0; n],
            number_of_returns: vec![0; n],
            point_source_id: vec![0; n],
        }
    }

    #[test]
    fn append_within_capacity_stays_in_one_batch() {
        let mut entry = ProjectedEntry::new(10);
        let positions: Vec<[f32; 3]> = (0..5).map(|i| [i as f32, 0.0, 0.0]).collect();
        entry.append(&positions, attrs(5));
        assert_eq!(entry.batches().len(), 1);
        assert_eq!(entry.batches()[0].len(), 5);
        assert!(!entry.batches()[0].is_finalized());
    }

    #[test]
    fn append_beyond_capacity_rotates_and_finalizes_batch() {
        let mut entry = ProjectedEntry::new(4);
        let positions: Vec<[f32; 3]> = (0..10).map(|i| [i as f32, 0.0, 0.0]).collect();
        entry.append(&positions, attrs(10));
        assert_eq!(entry.batches().len(), 3);
        assert!(entry.batches()[0].is_finalized());
        assert!(entry.batches()[1].is_finalized());
        assert!(!entry.batches()[2].is_finalized());
        assert_eq!(entry.batches()[0].len(), 4);
        assert_eq!(entry.batches()[1].len(), 4);
        assert_eq!(entry.batches()[2].len(), 2);
    }

    #[test]
    fn projected_box_unions_across_batches() {
        let mut entry = ProjectedEntry::new(4);
        let positions: Vec<[f32; 3]> = vec![
            [0.0, 0.0, -1.0],
            [1.0, 0.0, 0.0],
            [2.0, 0.0, 1.0],
            [3.0, 0.0, 2.0],
            [4.0, 0.0, 3.0],
        ];
        entry.append(&positions, attrs(5));
        let bb = entry.projected_box().clone().into_box3().unwrap();
        assert_eq!(bb.min(), Point3::new(0.0, 0.0, -1.0));
        assert_eq!(bb.max(), Point3::new(4.0, 0.0, 3.0));
    }
}
