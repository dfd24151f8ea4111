use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables recognized by the profile extraction core (see §6 Configuration).
///
/// Mirrors the shape of the teacher's `index::attribute_index::config::AttributeIndexConfig`:
/// a plain `serde`-derived struct with a `Default` impl, constructed once by the embedder and
/// threaded down into the components that need it rather than read from globals.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Cumulative accepted point count after which live requests are demoted to
    /// [`crate::profile_request::ProfileRequest::finish_level_then_cancel`].
    pub threshold: usize,

    /// Minimum time between two effective `recompute()` invocations.
    pub debounce: Duration,

    /// Maximum number of *loaded* nodes promoted from the priority queue to filtering per
    /// `update()` tick.
    pub max_nodes_per_update: usize,

    /// Wall-clock budget the segment filter is allowed to run for before it must yield back
    /// to the host.
    pub filter_yield_budget: Duration,

    /// Capacity of a single [`crate::projected_entry::Batch`].
    pub batch_capacity: usize,

    /// Deepest octree level a request is allowed to traverse into. `None` means unbounded.
    pub max_depth: Option<u32>,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        ProfileConfig {
            threshold: 60_000,
            debounce: Duration::from_millis(100),
            max_nodes_per_update: 1,
            filter_yield_budget: Duration::from_millis(4),
            batch_capacity: 10_000,
            max_depth: None,
        }
    }
}
