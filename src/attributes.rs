use crate::error::{ProfileError, Result};
use crate::geometry::bounding_box::OptionBox3;
use nalgebra::Point3;
use std::collections::HashMap;

/// The closed set of per-point attributes the profile core understands (see SPEC_FULL §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Position,
    Color,
    Intensity,
    Classification,
    ReturnNumber,
    NumberOfReturns,
    PointSourceId,
    /// Derived exclusively by [`crate::segment_filter::SegmentFilter`]; never copied from node
    /// geometry (see SPEC_FULL §9, "attribute typing").
    Mileage,
    /// Declared for forward compatibility with the original design; unused by this core (see
    /// SPEC_FULL §9, "attribute typing").
    Indices,
}

impl AttributeKind {
    /// The fixed number of elements this attribute stores per point.
    pub fn stride(self) -> usize {
        match self {
            AttributeKind::Position => 3,
            AttributeKind::Color => 4,
            AttributeKind::Intensity
            | AttributeKind::Classification
            | AttributeKind::ReturnNumber
            | AttributeKind::NumberOfReturns
            | AttributeKind::PointSourceId
            | AttributeKind::Mileage
            | AttributeKind::Indices => 1,
        }
    }
}

/// A typed, flat column of attribute values. The element type is fixed per [`AttributeKind`]:
/// `position` is `F32` (stride 3), `color` is `U8` (stride 4), `mileage` is `F64`, everything
/// else is a stride-1 integer column.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    F32(Vec<f32>),
    U8(Vec<u8>),
    U16(Vec<u16>),
    F64(Vec<f64>),
}

impl Column {
    fn empty_like(&self) -> Column {
        match self {
            Column::F32(_) => Column::F32(Vec::new()),
            Column::U8(_) => Column::U8(Vec::new()),
            Column::U16(_) => Column::U16(Vec::new()),
            Column::F64(_) => Column::F64(Vec::new()),
        }
    }

    /// Number of scalar elements stored (i.e. `num_points * stride`).
    pub fn len(&self) -> usize {
        match self {
            Column::F32(v) => v.len(),
            Column::U8(v) => v.len(),
            Column::U16(v) => v.len(),
            Column::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn zeros(&self, count: usize) -> Column {
        match self {
            Column::F32(_) => Column::F32(vec![0.0; count]),
            Column::U8(_) => Column::U8(vec![0; count]),
            Column::U16(_) => Column::U16(vec![0; count]),
            Column::F64(_) => Column::F64(vec![0.0; count]),
        }
    }

    /// Re-indexes a column by point `indices` (each scaled by `stride` elements), as
    /// `ProfileRequest` does when copying a node's non-position attributes down to only the
    /// points a `SegmentFilter` accepted.
    pub fn gather(&self, indices: &[u32], stride: usize) -> Column {
        fn gather_typed<T: Copy>(v: &[T], indices: &[u32], stride: usize) -> Vec<T> {
            let mut out = Vec::with_capacity(indices.len() * stride);
            for &i in indices {
                let start = i as usize * stride;
                out.extend_from_slice(&v[start..start + stride]);
            }
            out
        }
        match self {
            Column::F32(v) => Column::F32(gather_typed(v, indices, stride)),
            Column::U8(v) => Column::U8(gather_typed(v, indices, stride)),
            Column::U16(v) => Column::U16(gather_typed(v, indices, stride)),
            Column::F64(v) => Column::F64(gather_typed(v, indices, stride)),
        }
    }

    fn extend_from(&mut self, other: &Column) {
        match (self, other) {
            (Column::F32(a), Column::F32(b)) => a.extend_from_slice(b),
            (Column::U8(a), Column::U8(b)) => a.extend_from_slice(b),
            (Column::U16(a), Column::U16(b)) => a.extend_from_slice(b),
            (Column::F64(a), Column::F64(b)) => a.extend_from_slice(b),
            _ => unreachable!("columns for the same AttributeKind always share an element type"),
        }
    }
}

/// Growable columnar store of per-point attributes (C1).
///
/// `num_points` is invariant across every non-empty column: for any attribute `a` present in
/// the buffer, `column(a).len() == num_points * a.stride()`.
#[derive(Debug, Clone, Default)]
pub struct TypedPointBuffer {
    num_points: usize,
    columns: HashMap<AttributeKind, Column>,
    bounding_box: OptionBox3,
}

impl TypedPointBuffer {
    pub fn new() -> Self {
        TypedPointBuffer {
            num_points: 0,
            columns: HashMap::new(),
            bounding_box: OptionBox3::empty(),
        }
    }

    /// Constructs an empty buffer already stamped with `num_points`, for callers (e.g.
    /// `ProfileRequest::apply_batch`) that know the point count up front and build columns with
    /// [`TypedPointBuffer::set_column`] immediately afterwards.
    pub fn with_len(num_points: usize) -> Self {
        TypedPointBuffer {
            num_points,
            columns: HashMap::new(),
            bounding_box: OptionBox3::empty(),
        }
    }

    pub fn len(&self) -> usize {
        self.num_points
    }

    pub fn is_empty(&self) -> bool {
        self.num_points == 0
    }

    pub fn column(&self, kind: AttributeKind) -> Option<&Column> {
        self.columns.get(&kind)
    }

    pub fn bounding_box(&self) -> &OptionBox3 {
        &self.bounding_box
    }

    /// Replaces (or inserts) a column outright. The caller is responsible for the
    /// `len == num_points * stride` invariant.
    pub fn set_column(&mut self, kind: AttributeKind, column: Column) {
        self.columns.insert(kind, column);
    }

    pub fn extend_bounding_box(&mut self, p: Point3<f64>) {
        self.bounding_box.extend(p);
    }

    /// Merges `other` into `self`, following the append-merge rules of SPEC_FULL §3:
    /// attributes present on both sides are concatenated; attributes present on only one side
    /// are zero-extended/zero-prefixed so every non-empty column keeps
    /// `len == num_points * stride` afterwards.
    pub fn append(&mut self, other: &TypedPointBuffer) -> Result<()> {
        // attributes present in both: concatenate, after checking the strides agree.
        let mut kinds: Vec<AttributeKind> = self
            .columns
            .keys()
            .chain(other.columns.keys())
            .copied()
            .collect();
        kinds.sort_by_key(|k| *k as u8 as i32 + kind_discriminant(k));
        kinds.dedup();

        for kind in kinds {
            let self_col = self.columns.get(&kind);
            let other_col = other.columns.get(&kind);

            match (self_col, other_col) {
                (Some(a), Some(b)) => {
                    check_stride(kind, a.len(), self.num_points)?;
                    check_stride(kind, b.len(), other.num_points)?;
                    let mut merged = a.clone();
                    merged.extend_from(b);
                    self.columns.insert(kind, merged);
                }
                (Some(a), None) => {
                    check_stride(kind, a.len(), self.num_points)?;
                    let mut merged = a.clone();
                    let zero_tail = a.zeros(other.num_points * kind.stride());
                    merged.extend_from(&zero_tail);
                    self.columns.insert(kind, merged);
                }
                (None, Some(b)) => {
                    check_stride(kind, b.len(), other.num_points)?;
                    let mut merged = b.empty_like();
                    let zero_head = b.zeros(self.num_points * kind.stride());
                    merged.extend_from(&zero_head);
                    merged.extend_from(b);
                    self.columns.insert(kind, merged);
                }
                (None, None) => unreachable!(),
            }
        }

        self.num_points += other.num_points;
        self.bounding_box.extend_other(&other.bounding_box);
        Ok(())
    }
}

/// Stable ordering key so `append`'s merge order does not depend on `HashMap` iteration order.
fn kind_discriminant(kind: &AttributeKind) -> i32 {
    match kind {
        AttributeKind::Position => 0,
        AttributeKind::Color => 1,
        AttributeKind::Intensity => 2,
        AttributeKind::Classification => 3,
        AttributeKind::ReturnNumber => 4,
        AttributeKind::NumberOfReturns => 5,
        AttributeKind::PointSourceId => 6,
        AttributeKind::Mileage => 7,
        AttributeKind::Indices => 8,
    }
}

fn check_stride(kind: AttributeKind, column_len: usize, num_points: usize) -> Result<()> {
    if num_points == 0 {
        return Ok(());
    }
    if column_len % num_points != 0 {
        return Err(ProfileError::StrideMismatch {
            attribute: kind,
            expected_stride: kind.stride(),
            actual_stride: column_len / num_points.max(1),
        });
    }
    let actual_stride = column_len / num_points;
    if actual_stride != kind.stride() {
        return Err(ProfileError::StrideMismatch {
            attribute: kind,
            expected_stride: kind.stride(),
            actual_stride,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_with_positions(xs: &[f32]) -> TypedPointBuffer {
        let mut buf = TypedPointBuffer::new();
        buf.num_points = xs.len() / 3;
        buf.set_column(AttributeKind::Position, Column::F32(xs.to_vec()));
        buf
    }

    #[test]
    fn append_concatenates_shared_attribute() {
        let mut a = buffer_with_positions(&[1.0, 2.0, 3.0]);
        let b = buffer_with_positions(&[4.0, 5.0, 6.0]);
        a.append(&b).unwrap();
        assert_eq!(a.len(), 2);
        match a.column(AttributeKind::Position).unwrap() {
            Column::F32(v) => assert_eq!(v, &vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            _ => panic!("wrong column type"),
        }
    }

    #[test]
    fn append_zero_extends_attribute_missing_from_other() {
        let mut a = buffer_with_positions(&[1.0, 2.0, 3.0]);
        a.set_column(AttributeKind::Classification, Column::U8(vec![9]));
        let b = buffer_with_positions(&[4.0, 5.0, 6.0]);
        a.append(&b).unwrap();
        match a.column(AttributeKind::Classification).unwrap() {
            Column::U8(v) => assert_eq!(v, &vec![9, 0]),
            _ => panic!("wrong column type"),
        }
    }

    #[test]
    fn append_zero_prefixes_attribute_missing_from_self() {
        let mut a = buffer_with_positions(&[1.0, 2.0, 3.0]);
        let mut b = buffer_with_positions(&[4.0, 5.0, 6.0]);
        b.set_column(AttributeKind::Classification, Column::U8(vec![9]));
        a.append(&b).unwrap();
        match a.column(AttributeKind::Classification).unwrap() {
            Column::U8(v) => assert_eq!(v, &vec![0, 9]),
            _ => panic!("wrong column type"),
        }
    }

    #[test]
    fn append_rejects_stride_mismatch() {
        let mut a = buffer_with_positions(&[1.0, 2.0, 3.0]);
        // Corrupt: 2 elements claimed for 1 point of a stride-1 attribute.
        a.set_column(AttributeKind::Classification, Column::U8(vec![1, 2]));
        let b = buffer_with_positions(&[4.0, 5.0, 6.0]);
        let err = a.append(&b).unwrap_err();
        assert_eq!(
            err,
            ProfileError::StrideMismatch {
                attribute: AttributeKind::Classification,
                expected_stride: 1,
                actual_stride: 2,
            }
        );
    }

    #[test]
    fn append_unions_bounding_box() {
        let mut a = TypedPointBuffer::new();
        a.extend_bounding_box(Point3::new(0.0, 0.0, 0.0));
        let mut b = TypedPointBuffer::new();
        b.extend_bounding_box(Point3::new(5.0, 5.0, 5.0));
        a.append(&b).unwrap();
        let bb = a.bounding_box().clone().into_box3().unwrap();
        assert_eq!(bb.min(), Point3::new(0.0, 0.0, 0.0));
        assert_eq!(bb.max(), Point3::new(5.0, 5.0, 5.0));
    }
}
