use crate::geometry::bounding_box::Box3;
use crate::geometry::sphere::Sphere;
use crate::geometry::Matrix4;
use std::sync::Arc;

/// Opaque identity for a node, stable across `load()` calls and suitable as a
/// [`crate::node_lru::NodeLru`] key. Two [`NodeRef`] handles that refer to the same octree cell
/// must return the same id.
pub type NodeId = u64;

/// A single octree cell, loaded on demand by the collaborating octree subsystem (§6, consumed).
///
/// This mirrors the split the reader side of the teacher's index takes between cell identity
/// (cheap, always available) and cell payload (expensive, available only once `loaded()`):
/// traversal and the priority queue only ever need `level`/`bounding_box`/`bounding_sphere`,
/// while `position_column` is meaningful only after the node has actually been fetched.
pub trait NodeRef: Send + Sync {
    fn id(&self) -> NodeId;
    fn level(&self) -> u32;
    fn num_points(&self) -> u32;
    fn bounding_box(&self) -> Box3;
    fn bounding_sphere(&self) -> Sphere;
    fn has_children(&self) -> bool;
    fn hierarchy_step_size(&self) -> u32;
    fn children(&self) -> [Option<Arc<dyn NodeRef>>; 8];

    /// Whether this node's point payload has been fetched and is available through
    /// [`NodeRef::position_column`].
    fn loaded(&self) -> bool;

    /// Requests that this node's payload be fetched. Idempotent and non-blocking: calling it
    /// on an already-loaded or already-loading node is a no-op from the caller's perspective.
    /// [`ProfileRequest`](crate::profile_request::ProfileRequest) re-pushes the node and polls
    /// `loaded()` again on a later `update()`.
    fn load(&self);

    /// Node-local point positions, `3 * num_points` entries long, offset by `bounding_box().min()`.
    /// `None` if the node is not yet loaded, or if it claims `num_points() == 0`.
    fn position_column(&self) -> Option<Arc<[f32]>>;

    /// Other loaded per-point attribute columns, keyed by the same [`crate::attributes::AttributeKind`]
    /// that `SegmentFilter` re-indexes by the accepted point list.
    fn attribute_column(&self, kind: crate::attributes::AttributeKind) -> Option<crate::attributes::Column>;
}

/// A single point-cloud input and its octree, consumed through this interface only (§6).
pub trait OctreeSource: Send + Sync {
    fn root(&self) -> Arc<dyn NodeRef>;

    /// World transform applied to a node's local point positions, composed with the node's own
    /// `bounding_box.min()` offset by the caller (see SPEC_FULL §4.5, step 1).
    fn world_matrix(&self) -> Matrix4;

    /// Point clouds the user has hidden are skipped entirely (`SourceHidden`, §7) rather than
    /// treated as an error.
    fn visible(&self) -> bool;
}
