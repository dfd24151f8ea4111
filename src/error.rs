use crate::attributes::AttributeKind;
use thiserror::Error;

/// Errors surfaced by the profile extraction core.
///
/// `NodeNotLoaded` and `SourceHidden` from the design are deliberately *not* variants here:
/// the former is resolved internally by re-pushing the node onto the [`crate::priority_queue`]
/// (it never escapes [`crate::profile_request`]), and the latter is not a failure at all —
/// a hidden point cloud is simply skipped by [`crate::profile_controller`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProfileError {
    /// Two [`crate::attributes::TypedPointBuffer`]s being appended disagree on the
    /// elements-per-point stride of the same attribute.
    #[error(
        "stride mismatch for attribute {attribute:?}: expected {expected_stride}, got {actual_stride}"
    )]
    StrideMismatch {
        attribute: AttributeKind,
        expected_stride: usize,
        actual_stride: usize,
    },

    /// A node claims `num_points > 0` but does not expose a `position` column once loaded.
    #[error("node at level {node_level} has {num_points} points but no position column")]
    EmptyGeometry { node_level: u32, num_points: u32 },

    /// The profile does not have enough markers, or its width is not positive.
    #[error("invalid profile: {reason}")]
    InvalidProfile { reason: &'static str },
}

pub type Result<T> = std::result::Result<T, ProfileError>;
