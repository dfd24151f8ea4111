use crate::config::ProfileConfig;
use crate::error::{ProfileError, Result};
use crate::geometry::bounding_box::OptionBox3;
use crate::octree_source::{NodeId, NodeRef, OctreeSource};
use crate::priority_queue::PriorityQueue;
use crate::profile::{Profile, Segment};
use crate::segment_filter::{FilterProgress, SegmentFilter};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

/// Snapshot of the segment vector plus an aggregate bounding box, emitted once per
/// `onProgress`/`onFinish` (§3).
#[derive(Debug, Clone, Default)]
pub struct ProfileData {
    pub segments: Vec<Segment>,
    pub bounding_box: OptionBox3,
}

impl ProfileData {
    fn fresh(segments: &[Segment]) -> Self {
        ProfileData {
            segments: segments
                .iter()
                .map(|s| Segment {
                    points: crate::attributes::TypedPointBuffer::new(),
                    ..s.clone()
                })
                .collect(),
            bounding_box: OptionBox3::empty(),
        }
    }

    fn total_points(&self) -> usize {
        self.segments.iter().map(|s| s.points.len()).sum()
    }
}

/// Outcome of a single [`ProfileRequest::update`] tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The request made progress (or is waiting on a node load) and should be ticked again.
    Progress,
    Finished,
    Cancelled,
}

struct PendingNode {
    node: Arc<dyn NodeRef>,
    segment_index: usize,
    filter: SegmentFilter,
}

/// State machine driving traversal, loading, filtering, batching and cancellation for one
/// `(OctreeSource, Profile)` pair (C6).
///
/// Grounded on the teacher's `OctreeReader`: a `frontier`/`load_queue` pair of sets driven one
/// step at a time by an external `update()` call, generalized here from a spatial grid-cell
/// frontier to a priority-ordered node queue, and from "load or reload" to "load, expand,
/// filter, emit".
pub struct ProfileRequest {
    source: Arc<dyn OctreeSource>,
    segments: Vec<Segment>,
    width: f64,
    config: ProfileConfig,
    queue: PriorityQueue<Arc<dyn NodeRef>>,
    max_depth: Option<u32>,
    points_served: usize,
    highest_level_served: u32,
    temporary_result: ProfileData,
    pending: Option<PendingNode>,
    finished: bool,
    cancelled: bool,
    on_progress: Box<dyn FnMut(&ProfileData) + Send>,
    on_finish: Box<dyn FnMut() + Send>,
    on_cancel: Box<dyn FnMut() + Send>,
    touch_node: Box<dyn FnMut(NodeId) + Send>,
}

const EMIT_THRESHOLD: usize = 100;

impl ProfileRequest {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn OctreeSource>,
        profile: &Profile,
        config: ProfileConfig,
        on_progress: impl FnMut(&ProfileData) + Send + 'static,
        on_finish: impl FnMut() + Send + 'static,
        on_cancel: impl FnMut() + Send + 'static,
        touch_node: impl FnMut(NodeId) + Send + 'static,
    ) -> Result<Self> {
        let segments = profile.derive_segments();
        if segments.is_empty() {
            return Err(ProfileError::InvalidProfile {
                reason: "profile has fewer than two markers",
            });
        }
        let mut queue = PriorityQueue::new();
        queue.push(source.root(), f64::INFINITY);
        let temporary_result = ProfileData::fresh(&segments);
        Ok(ProfileRequest {
            source,
            width: profile.width(),
            max_depth: config.max_depth,
            segments,
            config,
            queue,
            points_served: 0,
            highest_level_served: 0,
            temporary_result,
            pending: None,
            finished: false,
            cancelled: false,
            on_progress: Box::new(on_progress),
            on_finish: Box::new(on_finish),
            on_cancel: Box::new(on_cancel),
            touch_node: Box::new(touch_node),
        })
    }

    pub fn points_served(&self) -> usize {
        self.points_served
    }

    pub fn highest_level_served(&self) -> u32 {
        self.highest_level_served
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Immediate cancellation: drops the queue, fires `onCancel` exactly once, and turns every
    /// later `update()` into a no-op (§5, "Cancellation semantics").
    pub fn cancel(&mut self) {
        if self.finished || self.cancelled {
            return;
        }
        self.queue.clear();
        self.pending = None;
        self.cancelled = true;
        (self.on_cancel)();
    }

    /// Graceful cancellation: nodes already queued at `level <= highest_level_served` still run
    /// to completion; deeper nodes are discarded on pop. `onFinish` (not `onCancel`) fires once
    /// the queue drains naturally.
    pub fn finish_level_then_cancel(&mut self) {
        if self.finished || self.cancelled {
            return;
        }
        self.max_depth = Some(match self.max_depth {
            Some(d) => d.min(self.highest_level_served),
            None => self.highest_level_served,
        });
    }

    fn maybe_emit(&mut self) {
        if self.temporary_result.total_points() > EMIT_THRESHOLD {
            self.emit();
        }
    }

    fn emit(&mut self) {
        self.points_served += self.temporary_result.total_points();
        (self.on_progress)(&self.temporary_result);
        self.temporary_result = ProfileData::fresh(&self.segments);
    }

    fn finalize(&mut self) {
        if self.temporary_result.total_points() > 0 {
            self.emit();
        }
        self.finished = true;
        (self.on_finish)();
    }

    /// World-space intersection test between a node's bounding sphere and any segment's swept
    /// corridor (§4.6, "Traversal intersection test").
    fn node_intersects_any_segment(&self, node: &dyn NodeRef) -> bool {
        let sphere_world = node.bounding_sphere().transform(&self.source.world_matrix());
        self.segments.iter().any(|segment| {
            let ab = segment.end_g - segment.start_g;
            let len2 = ab.norm_squared();
            let t = if len2 > 0.0 {
                ((sphere_world.center - segment.start_g).dot(&ab) / len2).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let closest = segment.start_g + ab * t;
            let dist = (sphere_world.center - closest).norm();
            dist < sphere_world.radius + self.width
        })
    }

    fn expand(&mut self, node: &Arc<dyn NodeRef>) {
        let should_expand =
            node.level() == 0 || (node.level() % node.hierarchy_step_size() == 0 && node.has_children());
        if !should_expand {
            return;
        }
        for child in node.children().into_iter().flatten() {
            if self.node_intersects_any_segment(child.as_ref()) {
                let weight = child.bounding_sphere().radius;
                self.queue.push(child, weight);
            }
        }
    }

    /// Drives one promoted node's `SegmentFilter` work across every segment. Returns `Ok(true)`
    /// once the node's work is fully consumed (filtering moves to the next popped node on the
    /// next loop iteration), `Ok(false)` if the filter yielded `NotDone` and the tick must end.
    ///
    /// `Err` propagates a `StrideMismatch` out of `apply_batch` — the one error SPEC_FULL §7
    /// marks "fatal for the request"; the caller must cancel rather than keep draining the
    /// queue against a buffer that failed to merge.
    fn drive_pending(&mut self) -> Result<bool> {
        loop {
            let Some(pending) = &mut self.pending else {
                return Ok(true);
            };
            let segment = &self.segments[pending.segment_index];
            let mileage_base: f64 = self.segments[..pending.segment_index]
                .iter()
                .map(|s| s.length)
                .sum();
            let result = pending.filter.accept(
                pending.node.as_ref(),
                &self.source.world_matrix(),
                segment,
                &segment.side,
                mileage_base,
                self.width,
                self.config.filter_yield_budget,
            );
            match result {
                Ok(FilterProgress::NotDone) => return Ok(false),
                Ok(FilterProgress::Done(batch)) => {
                    let segment_index = pending.segment_index;
                    let node = pending.node.clone();
                    self.apply_batch(segment_index, node.as_ref(), &batch)?;
                    let next_index = segment_index + 1;
                    if next_index >= self.segments.len() {
                        self.pending = None;
                        return Ok(true);
                    }
                    let Some(pending) = &mut self.pending else {
                        unreachable!()
                    };
                    pending.segment_index = next_index;
                    pending.filter = SegmentFilter::new();
                }
                Err(ProfileError::EmptyGeometry { node_level, num_points }) => {
                    warn!(
                        "skipping node at level {node_level} with {num_points} points: no position column"
                    );
                    self.pending = None;
                    return Ok(true);
                }
                Err(other) => {
                    debug!("segment filter error, skipping node: {other:?}");
                    self.pending = None;
                    return Ok(true);
                }
            }
        }
    }

    /// Copies one node's accepted points into the matching segment's result buffer: the
    /// projected position and mileage computed by the filter, plus every other attribute
    /// re-indexed by `batch.indices` (§4.6 step 4).
    ///
    /// `Err(StrideMismatch)` from `TypedPointBuffer::append` is request-fatal (SPEC_FULL §7) and
    /// must propagate to the caller rather than be discarded.
    fn apply_batch(
        &mut self,
        segment_index: usize,
        node: &dyn NodeRef,
        batch: &crate::segment_filter::AcceptedBatch,
    ) -> Result<()> {
        use crate::attributes::{AttributeKind, Column, TypedPointBuffer};
        use nalgebra::Point3;

        let num_accepted = batch.len();
        if num_accepted == 0 {
            return Ok(());
        }

        let mut position_flat = Vec::with_capacity(num_accepted * 3);
        for p in &batch.projected_positions {
            position_flat.extend_from_slice(p);
        }

        let mut source = TypedPointBuffer::with_len(num_accepted);
        source.set_column(AttributeKind::Position, Column::F32(position_flat));
        source.set_column(AttributeKind::Mileage, Column::F64(batch.mileage.clone()));

        for kind in [
            AttributeKind::Color,
            AttributeKind::Intensity,
            AttributeKind::Classification,
            AttributeKind::ReturnNumber,
            AttributeKind::NumberOfReturns,
            AttributeKind::PointSourceId,
        ] {
            if let Some(column) = node.attribute_column(kind) {
                source.set_column(kind, column.gather(&batch.indices, kind.stride()));
            }
        }

        for p in &batch.projected_positions {
            let world = Point3::new(p[0] as f64, p[1] as f64, p[2] as f64);
            source.extend_bounding_box(world);
            self.temporary_result.bounding_box.extend(world);
        }

        let target = &mut self.temporary_result.segments[segment_index];
        target.points.append(&source)
    }

    /// Advances the request by one tick. The host calls this once per frame.
    pub fn update(&mut self) -> StepOutcome {
        if self.cancelled {
            return StepOutcome::Cancelled;
        }
        if self.finished {
            return StepOutcome::Finished;
        }

        let mut promoted_this_tick = 0usize;
        loop {
            if self.pending.is_some() {
                match self.drive_pending() {
                    Ok(true) => {}
                    Ok(false) => return StepOutcome::Progress,
                    Err(err) => {
                        warn!("cancelling request: {err}");
                        self.cancel();
                        return StepOutcome::Cancelled;
                    }
                }
                self.maybe_emit();
                if promoted_this_tick >= self.config.max_nodes_per_update {
                    return StepOutcome::Progress;
                }
            }

            match self.queue.pop() {
                None => {
                    self.finalize();
                    return StepOutcome::Finished;
                }
                Some((node, weight)) => {
                    if let Some(max_depth) = self.max_depth {
                        if node.level() > max_depth {
                            continue;
                        }
                    }
                    if !node.loaded() {
                        node.load();
                        self.queue.push(node, weight);
                        return StepOutcome::Progress;
                    }
                    (self.touch_node)(node.id());
                    self.highest_level_served = self.highest_level_served.max(node.level());
                    self.expand(&node);
                    promoted_this_tick += 1;
                    self.pending = Some(PendingNode {
                        node,
                        segment_index: 0,
                        filter: SegmentFilter::new(),
                    });
                }
            }
        }
    }

    /// Runs `update()` repeatedly until `budget` elapses or the request reaches a terminal
    /// state, whichever comes first (§5.1, host driver loop).
    pub fn drive_to_completion(&mut self, budget: Duration) -> StepOutcome {
        let start = std::time::Instant::now();
        loop {
            let outcome = self.update();
            if !matches!(outcome, StepOutcome::Progress) {
                return outcome;
            }
            if start.elapsed() > budget {
                return StepOutcome::Progress;
            }
        }
    }
}
