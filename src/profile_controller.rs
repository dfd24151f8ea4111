use crate::config::ProfileConfig;
use crate::events::{Publisher, SubscriptionHandle};
use crate::geometry::bounding_box::{Box3, OptionBox3};
use crate::node_lru::NodeLru;
use crate::octree_source::{NodeId, OctreeSource};
use crate::profile::Profile;
use crate::profile_request::{ProfileData, ProfileRequest, StepOutcome};
use crate::projected_entry::{PointAttributes, ProjectedEntry};
use log::{debug, info};
use nalgebra::Point3;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Opaque handle returned by [`ProfileController::add_pointcloud`], identifying a source for
/// later `remove_pointcloud` calls. Backed by the source's `Arc` data pointer, so it is stable
/// for the source's whole lifetime without the controller needing to hand out its own ids.
pub type SourceHandle = usize;

fn source_handle(source: &Arc<dyn OctreeSource>) -> SourceHandle {
    Arc::as_ptr(source) as *const () as usize
}

/// Events published by the controller (§6, "Events").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerEvent {
    RecomputedSegment { segment: usize },
    RecomputeFinished,
}

/// A camera collaborator this core can orient, consumed only through this interface (§4.7,
/// "Scale"). Out of scope: the camera's own projection/rendering.
pub trait OrthographicCamera {
    fn look_at(&mut self, center: Point3<f64>, half_width: f64, half_height: f64);
}

/// Aggregation state touched both by [`ProfileController`] methods and by the `on_progress`
/// callbacks handed to each [`ProfileRequest`]. Those callbacks must be `'static` and cannot
/// borrow the controller, so the state they mutate lives behind a lock instead (the same shape
/// the teacher uses for cross-thread subscription channels, adapted here for cross-closure
/// sharing within one thread).
struct Shared {
    entries: HashMap<SourceHandle, ProjectedEntry>,
    projected_box: OptionBox3,
    cumulative_points: usize,
    events: Publisher<ControllerEvent>,
    batch_capacity: usize,
}

impl Shared {
    fn new(batch_capacity: usize) -> Self {
        Shared {
            entries: HashMap::new(),
            projected_box: OptionBox3::empty(),
            cumulative_points: 0,
            events: Publisher::new(),
            batch_capacity,
        }
    }

    fn on_progress(&mut self, handle: SourceHandle, data: &ProfileData) {
        let entry = self
            .entries
            .entry(handle)
            .or_insert_with(|| ProjectedEntry::new(self.batch_capacity));

        for segment in &data.segments {
            let num_points = segment.points.len();
            if num_points == 0 {
                continue;
            }
            self.cumulative_points += num_points;

            let positions = match segment.points.column(crate::attributes::AttributeKind::Position) {
                Some(crate::attributes::Column::F32(v)) => v,
                _ => continue,
            };
            let position_chunks: Vec<[f32; 3]> = positions
                .chunks_exact(3)
                .map(|c| [c[0], c[1], c[2]])
                .collect();

            let attrs = gather_point_attributes(segment, num_points);
            entry.append(&position_chunks, attrs);
            self.projected_box.extend_other(segment.points.bounding_box());

            debug!("segment {} contributed {num_points} points", segment.index);
            self.events.publish(&ControllerEvent::RecomputedSegment {
                segment: segment.index,
            });
        }

        self.events.publish(&ControllerEvent::RecomputeFinished);
    }
}

fn gather_point_attributes(
    segment: &crate::profile::Segment,
    num_points: usize,
) -> PointAttributes {
    use crate::attributes::{AttributeKind, Column};

    fn column_or_default<T: Copy + Default>(
        segment: &crate::profile::Segment,
        kind: AttributeKind,
        num_points: usize,
        extract: impl Fn(&Column) -> Option<&[T]>,
    ) -> Vec<T> {
        segment
            .points
            .column(kind)
            .and_then(extract)
            .map(|v| v.to_vec())
            .unwrap_or_else(|| vec![T::default(); num_points * kind.stride()])
    }

    let color = column_or_default(segment, AttributeKind::Color, num_points, |c| match c {
        Column::U8(v) => Some(v.as_slice()),
        _ => None,
    });
    let intensity = column_or_default(segment, AttributeKind::Intensity, num_points, |c| match c {
        Column::U16(v) => Some(v.as_slice()),
        _ => None,
    });
    let classification = column_or_default(segment, AttributeKind::Classification, num_points, |c| {
        match c {
            Column::U8(v) => Some(v.as_slice()),
            _ => None,
        }
    });
    let return_number = column_or_default(segment, AttributeKind::ReturnNumber, num_points, |c| {
        match c {
            Column::U8(v) => Some(v.as_slice()),
            _ => None,
        }
    });
    let number_of_returns =
        column_or_default(segment, AttributeKind::NumberOfReturns, num_points, |c| match c {
            Column::U8(v) => Some(v.as_slice()),
            _ => None,
        });
    let point_source_id =
        column_or_default(segment, AttributeKind::PointSourceId, num_points, |c| match c {
            Column::U16(v) => Some(v.as_slice()),
            _ => None,
        });

    PointAttributes {
        color: color.chunks_exact(4).map(|c| [c[0], c[1], c[2], c[3]]).collect(),
        intensity,
        classification,
        return_number,
        number_of_returns,
        point_source_id,
    }
}

/// Debounces marker edits, manages multiple point-cloud inputs, spawns/cancels per-source
/// requests, aggregates results into per-source [`ProjectedEntry`]s, and publishes the
/// projected bounding box and scale (C7).
pub struct ProfileController {
    profile: Profile,
    config: ProfileConfig,
    sources: HashMap<SourceHandle, Arc<dyn OctreeSource>>,
    requests: HashMap<SourceHandle, ProfileRequest>,
    shared: Arc<Mutex<Shared>>,
    node_lru: Arc<Mutex<NodeLru<NodeId, ()>>>,
    last_run: Option<Instant>,
    pending_recompute: bool,
}

impl ProfileController {
    pub fn new(profile: Profile, config: ProfileConfig, node_cache_capacity: usize) -> Self {
        ProfileController {
            profile,
            shared: Arc::new(Mutex::new(Shared::new(config.batch_capacity))),
            node_lru: Arc::new(Mutex::new(NodeLru::new(node_cache_capacity))),
            config,
            sources: HashMap::new(),
            requests: HashMap::new(),
            last_run: None,
            pending_recompute: false,
        }
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Replaces the active profile and drops every in-flight request: the mileage axis is
    /// defined entirely by the new polyline, so no partial results from the old one are valid.
    ///
    /// The original design's `setProfile` calls `removeEventListener` twice without ever having
    /// called `addEventListener` — the controller never actually re-subscribes to the new
    /// profile's mutation events (see SPEC_FULL §9, "listener leakage"). Wiring a profile's
    /// `Publisher<ProfileEvent>` back into `recompute()` from inside this method would need
    /// `self` to hand out a handle to itself while still being mutated, which is exactly the
    /// `Controller <-> Profile` ownership cycle the design notes call out. Rather than
    /// reintroduce it via `Rc<RefCell<_>>`, the embedder is expected to call
    /// `profile.subscribe(...)` once after `set_profile` and invoke `recompute()` from that
    /// callback (see `DESIGN.md`, "debounce gating / listener leakage").
    pub fn set_profile(&mut self, profile: Profile) {
        self.cancel_all();
        self.profile = profile;
    }

    pub fn add_pointcloud(&mut self, source: Arc<dyn OctreeSource>) -> SourceHandle {
        let handle = source_handle(&source);
        self.sources.insert(handle, source);
        handle
    }

    pub fn remove_pointcloud(&mut self, handle: SourceHandle) {
        self.sources.remove(&handle);
        if let Some(mut request) = self.requests.remove(&handle) {
            request.cancel();
        }
        let mut shared = self.shared.lock().unwrap();
        shared.entries.remove(&handle);
        let mut projected_box = OptionBox3::empty();
        for entry in shared.entries.values() {
            projected_box.extend_other(entry.projected_box());
        }
        shared.projected_box = projected_box;
    }

    #[must_use = "dropping the returned handle immediately unsubscribes"]
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&ControllerEvent) + Send + Sync + 'static,
    {
        self.shared.lock().unwrap().events.subscribe(callback)
    }

    pub fn projected_box(&self) -> Option<Box3> {
        self.shared.lock().unwrap().projected_box.clone().into_box3()
    }

    /// Leading-edge debounce: a call within `config.debounce` of the last *actual* run is
    /// dropped for now but remembered, and taken up by the next [`ProfileController::update`]
    /// once the window has elapsed. This replaces the source's ineffective gate, which reset
    /// itself to "clear" before ever checking it (see SPEC_FULL §9, "debounce gating").
    pub fn recompute(&mut self) {
        let now = Instant::now();
        let within_debounce = match self.last_run {
            Some(last) => now.duration_since(last) < self.config.debounce,
            None => false,
        };
        if within_debounce {
            self.pending_recompute = true;
            return;
        }
        self.last_run = Some(now);
        self.pending_recompute = false;
        self.perform_recompute();
    }

    pub fn finish_level_then_cancel(&mut self) {
        for request in self.requests.values_mut() {
            request.finish_level_then_cancel();
        }
    }

    fn cancel_all(&mut self) {
        for request in self.requests.values_mut() {
            request.cancel();
        }
        self.requests.clear();
        let mut shared = self.shared.lock().unwrap();
        shared.entries.clear();
        shared.projected_box = OptionBox3::empty();
        shared.cumulative_points = 0;
    }

    pub fn reset(&mut self) {
        self.cancel_all();
        self.last_run = None;
        self.pending_recompute = false;
    }

    fn perform_recompute(&mut self) {
        self.cancel_all();
        if self.profile.markers().len() < 2 {
            // InvalidProfile (§7): fewer than two markers. recompute is a no-op.
            return;
        }
        if self.profile.width() <= 0.0 {
            return;
        }

        let handles: Vec<SourceHandle> = self
            .sources
            .iter()
            .filter(|(_, source)| source.visible())
            .map(|(handle, _)| *handle)
            .collect();

        for handle in handles {
            let source = self.sources[&handle].clone();
            let shared = self.shared.clone();
            let node_lru = self.node_lru.clone();

            let on_progress = {
                let shared = shared.clone();
                move |data: &ProfileData| {
                    shared.lock().unwrap().on_progress(handle, data);
                }
            };
            let on_finish = move || {
                info!("profile request for source {handle} finished");
            };
            let on_cancel = move || {
                debug!("profile request for source {handle} cancelled");
            };
            let touch_node = move |id: NodeId| {
                node_lru.lock().unwrap().touch(&id);
            };

            match ProfileRequest::new(
                source,
                &self.profile,
                self.config,
                on_progress,
                on_finish,
                on_cancel,
                touch_node,
            ) {
                Ok(request) => {
                    self.requests.insert(handle, request);
                }
                Err(err) => debug!("could not start profile request: {err}"),
            }
        }
    }

    /// Advances every active request by one tick, taking up any deferred (debounced) recompute
    /// whose window has elapsed, and applying the points-served threshold early-exit (§4.7,
    /// "Threshold early-exit").
    pub fn update(&mut self) {
        if self.pending_recompute {
            let ready = match self.last_run {
                Some(last) => Instant::now().duration_since(last) >= self.config.debounce,
                None => true,
            };
            if ready {
                self.last_run = Some(Instant::now());
                self.pending_recompute = false;
                self.perform_recompute();
            }
        }

        let mut done = Vec::new();
        for (handle, request) in self.requests.iter_mut() {
            match request.update() {
                StepOutcome::Progress => {}
                StepOutcome::Finished | StepOutcome::Cancelled => done.push(*handle),
            }
        }
        for handle in done {
            self.requests.remove(&handle);
        }

        let total_points = self.shared.lock().unwrap().cumulative_points;
        if total_points > self.config.threshold {
            self.finish_level_then_cancel();
        }
    }

    /// Calls [`ProfileController::update`] repeatedly until every active request has finished or
    /// cancelled, or `budget` elapses, whichever comes first. Returns `true` if every request
    /// reached a terminal state. A headless embedder (a CLI exporter, a test) with no render loop
    /// of its own drives the controller this way instead of calling `update()` once per frame
    /// (§5.1, "Host driver loop").
    pub fn drive_to_completion(&mut self, budget: std::time::Duration) -> bool {
        let start = Instant::now();
        loop {
            self.update();
            if self.requests.is_empty() && !self.pending_recompute {
                return true;
            }
            if start.elapsed() > budget {
                return false;
            }
        }
    }

    /// Computes `(sx, sy)` = pixels per world unit along mileage and elevation, and — if a
    /// camera is supplied — centers it on the projected box with aspect-correct half-extents.
    ///
    /// The source text's literal half-extent formula (`w/2*sx`, `h/2*sy`) only produces world
    /// units if `sx`/`sy` are inverted from how it defines them two lines earlier; the only
    /// dimensionally consistent reading — and the only one that uses "takes the min" for
    /// anything — is the aspect-correct-fit one implemented here: both axes scaled uniformly by
    /// `min(sx, sy)` (see `DESIGN.md`, "scale formula").
    pub fn set_scale_from_dimensions(
        &self,
        width_px: f64,
        height_px: f64,
        camera: Option<&mut dyn OrthographicCamera>,
    ) -> Option<(f64, f64)> {
        let bb = self.projected_box()?;
        let extent = bb.extent();
        if extent.x <= 0.0 || extent.z <= 0.0 {
            return None;
        }
        let sx = width_px / extent.x;
        let sy = height_px / extent.z;
        let scale = sx.min(sy);

        if let Some(camera) = camera {
            camera.look_at(bb.center(), width_px / (2.0 * scale), height_px / (2.0 * scale));
        }
        Some((sx, sy))
    }
}
