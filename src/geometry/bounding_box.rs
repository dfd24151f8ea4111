use nalgebra::Point3;
use std::fmt::{Debug, Formatter};

/// An axis aligned bounding box that may be empty.
///
/// The box is defined by a minimum and a maximum bound, but no assertion is made that
/// `min <= max`. An empty box (no point has ever been unioned into it) is represented by
/// `min > max` componentwise, mirroring the teacher's `OptionAABB`/`AABB` split: callers
/// accumulate into an `OptionBox3` and only promote it to the invariant-checked [`Box3`]
/// once they know it is non-empty.
#[derive(Clone, PartialEq)]
pub struct OptionBox3 {
    min: Point3<f64>,
    max: Point3<f64>,
}

impl OptionBox3 {
    /// Constructs an empty bounding box.
    pub fn empty() -> Self {
        OptionBox3 {
            min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Grows the bounding box so that it contains `p`.
    pub fn extend(&mut self, p: Point3<f64>) {
        if p.x < self.min.x {
            self.min.x = p.x;
        }
        if p.y < self.min.y {
            self.min.y = p.y;
        }
        if p.z < self.min.z {
            self.min.z = p.z;
        }
        if p.x > self.max.x {
            self.max.x = p.x;
        }
        if p.y > self.max.y {
            self.max.y = p.y;
        }
        if p.z > self.max.z {
            self.max.z = p.z;
        }
    }

    /// Unions another (possibly empty) bounding box into this one.
    pub fn extend_other(&mut self, other: &OptionBox3) {
        if other.is_empty() {
            return;
        }
        if other.min.x < self.min.x {
            self.min.x = other.min.x;
        }
        if other.min.y < self.min.y {
            self.min.y = other.min.y;
        }
        if other.min.z < self.min.z {
            self.min.z = other.min.z;
        }
        if other.max.x > self.max.x {
            self.max.x = other.max.x;
        }
        if other.max.y > self.max.y {
            self.max.y = other.max.y;
        }
        if other.max.z > self.max.z {
            self.max.z = other.max.z;
        }
    }

    /// Promotes this box to a non-empty [`Box3`], or `None` if it is still empty.
    pub fn into_box3(self) -> Option<Box3> {
        if self.is_empty() {
            None
        } else {
            Some(Box3 { inner: self })
        }
    }
}

impl Default for OptionBox3 {
    fn default() -> Self {
        Self::empty()
    }
}

impl Debug for OptionBox3 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "OptionBox3 (empty)")
        } else {
            write!(
                f,
                "OptionBox3 ({:?},{:?},{:?} - {:?},{:?},{:?})",
                self.min.x, self.min.y, self.min.z, self.max.x, self.max.y, self.max.z
            )
        }
    }
}

/// An axis aligned bounding box that is guaranteed to be non-empty (`min <= max`
/// componentwise).
#[derive(Clone, PartialEq)]
pub struct Box3 {
    inner: OptionBox3,
}

impl Box3 {
    /// Creates a new box from the given bounds. Panics if `min > max` on any axis.
    pub fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        assert!(min.x <= max.x);
        assert!(min.y <= max.y);
        assert!(min.z <= max.z);
        Box3 {
            inner: OptionBox3 { min, max },
        }
    }

    pub fn min(&self) -> Point3<f64> {
        self.inner.min
    }

    pub fn max(&self) -> Point3<f64> {
        self.inner.max
    }

    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.inner.min, &self.inner.max)
    }

    pub fn extent(&self) -> nalgebra::Vector3<f64> {
        self.inner.max - self.inner.min
    }

    pub fn contains(&self, p: &Point3<f64>) -> bool {
        self.inner.min.x <= p.x
            && self.inner.min.y <= p.y
            && self.inner.min.z <= p.z
            && self.inner.max.x >= p.x
            && self.inner.max.y >= p.y
            && self.inner.max.z >= p.z
    }

    pub fn intersects(&self, other: &Self) -> bool {
        self.inner.min.x <= other.inner.max.x
            && self.inner.max.x >= other.inner.min.x
            && self.inner.min.y <= other.inner.max.y
            && self.inner.max.y >= other.inner.min.y
            && self.inner.min.z <= other.inner.max.z
            && self.inner.max.z >= other.inner.min.z
    }

    /// Unions `other` into `self`.
    pub fn extend_union(&mut self, other: &Self) {
        self.inner.extend_other(&other.inner);
    }

    pub fn to_option_box3(&self) -> OptionBox3 {
        self.inner.clone()
    }
}

impl Debug for Box3 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Box3 ({:?},{:?},{:?} - {:?},{:?},{:?})",
            self.inner.min.x,
            self.inner.min.y,
            self.inner.min.z,
            self.inner.max.x,
            self.inner.max.y,
            self.inner.max.z
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_box_has_no_points() {
        let b = OptionBox3::empty();
        assert!(b.is_empty());
        assert!(b.into_box3().is_none());
    }

    #[test]
    fn extend_grows_bounds() {
        let mut b = OptionBox3::empty();
        b.extend(Point3::new(1.0, 2.0, 3.0));
        b.extend(Point3::new(3.0, 2.0, 1.0));
        let b = b.into_box3().unwrap();
        assert_eq!(b.min(), Point3::new(1.0, 2.0, 1.0));
        assert_eq!(b.max(), Point3::new(3.0, 2.0, 3.0));
    }

    #[test]
    fn contains() {
        let b = Box3::new(Point3::new(2.0, 4.0, 1.0), Point3::new(4.0, 5.0, 2.0));
        assert!(b.contains(&Point3::new(2.0, 4.0, 1.0)));
        assert!(b.contains(&Point3::new(3.0, 4.5, 1.5)));
        assert!(!b.contains(&Point3::new(1.5, 4.5, 1.5)));
        assert!(!b.contains(&Point3::new(4.5, 4.5, 1.5)));
    }

    #[test]
    fn extend_union() {
        let mut a = Box3::new(Point3::new(2.0, 4.0, 1.0), Point3::new(4.0, 5.0, 2.0));
        let b = Box3::new(Point3::new(2.0, 2.0, 2.0), Point3::new(3.0, 5.0, 3.0));
        a.extend_union(&b);
        assert_eq!(a.min(), Point3::new(2.0, 2.0, 1.0));
        assert_eq!(a.max(), Point3::new(4.0, 5.0, 3.0));
    }

    #[test]
    fn intersects() {
        let a = Box3::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        let touching = Box3::new(Point3::new(1.0, 1.0, 1.0), Point3::new(2.0, 2.0, 2.0));
        let disjoint = Box3::new(Point3::new(2.0, 2.0, 2.0), Point3::new(3.0, 3.0, 3.0));
        assert!(a.intersects(&touching));
        assert!(!a.intersects(&disjoint));
    }
}
