use super::events::{Handlers, MontageEventQueue};
use super::{
    FullWeightGraph, GraphUpdateContext, MontageEvaluationRecord, MontageEvaluationSnapshot,
    MontageEvent, MontageEventKind, MontageInstance, NativeBindings, NotifyDispatch, NotifyPhase,
    NotifyQueue, PoseGraph, PoseSampler, PostUpdateReport, QueuedNotify, RootMotionAccumulator,
    RootMotionBlendQueue, RootMotionBlendRequest, SlotPoses, SlotWeightRecord, SlotWeightTracker,
    UpdateHookContext,
};
use super::montage_instance::SyncLeaderState;
use crate::{
    Error, MontageData, MontageInstanceId, PassedMarker, RootMotionMode, RuntimeConfig,
    Transform, WEIGHT_EPSILON,
};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, mpsc};
use std::thread::{self, ThreadId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    PreUpdate,
    Updating,
    Evaluating,
    PostUpdating,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::PreUpdate => "pre-update",
            Phase::Updating => "updating",
            Phase::Evaluating => "evaluating",
            Phase::PostUpdating => "post-updating",
        };
        f.write_str(name)
    }
}

type UpdateResult = thread::Result<Box<FrameState>>;

/// Everything Update mutates. Owned by the runtime, or by the update task while one is in
/// flight, never both.
struct FrameState {
    frame: u64,
    root_motion_mode: RootMotionMode,
    instances: Vec<MontageInstance>,
    slots: SlotWeightTracker,
    notifies: NotifyQueue,
    root_motion_requests: RootMotionBlendQueue,
    montage_events: MontageEventQueue,
    graph: Box<dyn PoseGraph>,
    bindings: NativeBindings,
    snapshot: Option<Arc<MontageEvaluationSnapshot>>,
}

impl FrameState {
    fn reset(&mut self, predicted_lod: i32) {
        self.notifies.reset(predicted_lod);
        self.slots.reset();
        self.root_motion_requests.clear();
        self.snapshot = None;
    }

    fn run_update(&mut self, delta: f32) {
        let delta = if delta.is_finite() && delta > 0.0 {
            delta
        } else {
            0.0
        };
        self.frame += 1;

        // Instances played since the last Update announce themselves and start moving next tick.
        let mut just_started = Vec::with_capacity(self.instances.len());
        for instance in &mut self.instances {
            if instance.fresh {
                instance.fresh = false;
                log::debug!("{} started '{}'", instance.id(), instance.montage().name);
                self.montage_events.push(montage_event(MontageEventKind::Started, instance));
                just_started.push(true);
            } else {
                instance.update_weight(delta);
                just_started.push(false);
            }
        }

        // Blend weight of each instance for this frame. Fixed before advance, which may snap a
        // zero-length blend-out to 0 while the slot weights below still count the montage.
        let frame_weights: Vec<f32> = self
            .instances
            .iter()
            .map(|i| if i.is_active() { i.weight() } else { 0.0 })
            .collect();
        for (instance, &weight) in self.instances.iter().zip(&frame_weights) {
            if !instance.is_active() {
                continue;
            }
            let montage = instance.montage();
            for slot in &montage.slots {
                if montage.is_additive_in(slot) {
                    self.slots.accumulate_additive_weight(slot, weight);
                } else {
                    self.slots.accumulate_montage_weight(slot, weight);
                }
            }
        }

        let mut graph_ctx = GraphUpdateContext {
            delta_time: delta,
            slots: &mut self.slots,
            bindings: &mut self.bindings,
            montages: &self.instances,
        };
        self.graph.update(&mut graph_ctx);
        self.bindings.run_update_hooks(&UpdateHookContext {
            delta_time: delta,
            montages: &self.instances,
            slots: &self.slots,
        });

        let mode = self.root_motion_mode;
        let mut markers: Vec<Vec<PassedMarker>> = Vec::with_capacity(self.instances.len());
        for ((instance, &started), &frame_weight) in self
            .instances
            .iter_mut()
            .zip(&just_started)
            .zip(&frame_weights)
        {
            let outcome = if started {
                Default::default()
            } else {
                instance.advance_with(delta, mode.extracts())
            };

            let relevant = instance
                .montage()
                .slots
                .iter()
                .any(|slot| self.slots.is_relevant_for_notifies(slot));
            if relevant && !outcome.notifies.is_empty() {
                self.notifies
                    .add_from(Some(instance.id()), &outcome.notifies, instance.notify_weight());
            }

            if let Some(transform) = outcome.root_motion.filter(|_| mode.queues_requests()) {
                let slot = instance.montage().slots.first().cloned().unwrap_or_default();
                let weight = match mode {
                    RootMotionMode::RootMotionFromEverything => {
                        frame_weight * self.slots.global_weight(&slot)
                    }
                    _ => frame_weight,
                };
                if weight > WEIGHT_EPSILON {
                    self.root_motion_requests.push(RootMotionBlendRequest {
                        transform,
                        slot,
                        weight,
                        source: instance.id(),
                    });
                }
            }

            if instance.is_blending_out() && !instance.blend_out_reported {
                instance.blend_out_reported = true;
                log::debug!(
                    "{} blending out (interrupted: {})",
                    instance.id(),
                    instance.was_interrupted()
                );
                self.montage_events
                    .push(montage_event(MontageEventKind::BlendingOut, instance));
            }
            markers.push(outcome.markers);
        }

        self.sync_followers(&markers);
        let curves = self.evaluate_curves(&frame_weights);

        let records: Vec<MontageEvaluationRecord> = self
            .instances
            .iter()
            .zip(markers)
            .zip(&frame_weights)
            .filter(|((instance, _), _)| instance.is_active())
            .map(|((instance, markers_passed), &weight)| MontageEvaluationRecord {
                instance: instance.id(),
                montage: Arc::clone(instance.montage()),
                weight,
                desired_weight: instance.desired_weight(),
                position: instance.position(),
                playing: instance.is_playing(),
                active: instance.is_active(),
                markers_passed,
            })
            .collect();

        let events = &mut self.montage_events;
        self.instances.retain(|instance| {
            if !instance.is_blend_complete() {
                return true;
            }
            log::debug!("{} ended '{}'", instance.id(), instance.montage().name);
            events.push(montage_event(MontageEventKind::Ended, instance));
            false
        });
        self.drop_orphaned_followers();

        let slots: Vec<SlotWeightRecord> = self
            .slots
            .iter()
            .map(|(slot, entry)| SlotWeightRecord {
                slot: slot.to_string(),
                local_weight: entry.local_weight,
                non_additive_weight: entry.non_additive_weight,
                global_weight: entry.global_weight,
            })
            .collect();
        self.snapshot = Some(Arc::new(
            MontageEvaluationSnapshot::new(self.frame, records, slots).with_curves(curves),
        ));
    }

    // Followers snap to where their leader ended up after this frame's advance.
    fn sync_followers(&mut self, markers: &[Vec<PassedMarker>]) {
        let leaders: Vec<(MontageInstanceId, SyncLeaderState)> = self
            .instances
            .iter()
            .zip(markers)
            .filter(|(leader, _)| {
                leader.is_active()
                    && self
                        .instances
                        .iter()
                        .any(|f| f.sync_leader() == Some(leader.id()))
            })
            .map(|(leader, passed)| {
                let mut state = leader.sync_leader_state();
                state.markers = passed.clone();
                (leader.id(), state)
            })
            .collect();
        if leaders.is_empty() {
            return;
        }
        for follower in self.instances.iter_mut().filter(|i| i.is_active()) {
            let Some(leader) = follower.sync_leader() else {
                continue;
            };
            if let Some((_, state)) = leaders.iter().find(|(id, _)| *id == leader) {
                follower.sync_to_leader(state);
            }
        }
    }

    fn drop_orphaned_followers(&mut self) {
        let live: Vec<MontageInstanceId> = self.instances.iter().map(MontageInstance::id).collect();
        for follower in &mut self.instances {
            if follower.sync_leader().is_some_and(|leader| !live.contains(&leader)) {
                log::debug!("{} lost its sync leader", follower.id());
                follower.set_sync_leader(None);
            }
        }
    }

    // Each curve sums value * weight over the montages that carry it, at their final position.
    fn evaluate_curves(&self, frame_weights: &[f32]) -> Vec<(String, f32)> {
        let mut curves: Vec<(String, f32)> = Vec::new();
        for (instance, &weight) in self.instances.iter().zip(frame_weights) {
            if weight <= WEIGHT_EPSILON {
                continue;
            }
            for curve in &instance.montage().curves {
                let value = curve.sample(instance.position()) * weight;
                match curves.iter_mut().find(|(name, _)| *name == curve.name) {
                    Some((_, total)) => *total += value,
                    None => curves.push((curve.name.clone(), value)),
                }
            }
        }
        curves
    }
}

fn montage_event(kind: MontageEventKind, instance: &MontageInstance) -> MontageEvent {
    MontageEvent {
        kind,
        instance: instance.id(),
        montage: Arc::clone(instance.montage()),
        interrupted: instance.was_interrupted(),
    }
}

// Fatal in debug builds; release builds log and carry on.
fn report_thread_violation(operation: &str, detail: &str) {
    let error = Error::ThreadViolation {
        operation: operation.to_string(),
    };
    if cfg!(debug_assertions) {
        panic!("{error}: {detail}");
    }
    log::error!("{error}: {detail}");
}

/// Montage runtime of one skeletal instance.
///
/// A frame runs `pre_update`, then `update` or `dispatch_update`, then any number of
/// `evaluate` calls, then `post_update`. Every game-thread call joins an in-flight update
/// task before touching montage state.
pub struct AnimationRuntime {
    config: RuntimeConfig,
    owner: ThreadId,
    phase: Phase,
    state: Option<Box<FrameState>>,
    in_flight: Option<mpsc::Receiver<UpdateResult>>,
    pool: Option<Arc<rayon::ThreadPool>>,
    handlers: Handlers,
    active_states: Vec<QueuedNotify>,
    root_motion: RootMotionAccumulator,
    predicted_lod: i32,
    post_update_pending: bool,
}

impl fmt::Debug for AnimationRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimationRuntime")
            .field("config", &self.config)
            .field("phase", &self.phase)
            .field("in_flight", &self.in_flight.is_some())
            .field("predicted_lod", &self.predicted_lod)
            .field("post_update_pending", &self.post_update_pending)
            .finish()
    }
}

impl AnimationRuntime {
    pub fn new(config: RuntimeConfig) -> Result<Self, Error> {
        Self::with_graph(config, FullWeightGraph)
    }

    pub fn with_graph<G: PoseGraph + 'static>(config: RuntimeConfig, graph: G) -> Result<Self, Error> {
        config.validate()?;
        let state = FrameState {
            frame: 0,
            root_motion_mode: config.root_motion_mode,
            instances: Vec::new(),
            slots: SlotWeightTracker::new(),
            notifies: NotifyQueue::new(config.notify_seed, config.dedicated_server),
            root_motion_requests: RootMotionBlendQueue::default(),
            montage_events: MontageEventQueue::default(),
            graph: Box::new(graph),
            bindings: NativeBindings::new(),
            snapshot: None,
        };
        Ok(Self {
            config,
            owner: thread::current().id(),
            phase: Phase::Idle,
            state: Some(Box::new(state)),
            in_flight: None,
            pool: None,
            handlers: Handlers::default(),
            active_states: Vec::new(),
            root_motion: RootMotionAccumulator::new(),
            predicted_lod: 0,
            post_update_pending: false,
        })
    }

    /// Update tasks go to `pool` from now on. Without a pool `dispatch_update` runs inline.
    pub fn with_worker_pool(mut self, pool: Arc<rayon::ThreadPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_update_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Makes the calling thread the owning thread, eg. after moving the runtime.
    pub fn adopt_current_thread(&mut self) {
        self.owner = thread::current().id();
    }

    fn ensure_owner(&self, operation: &str) {
        if thread::current().id() != self.owner {
            report_thread_violation(operation, "only the owning thread may call this");
        }
    }

    fn join(&mut self) -> Result<(), Error> {
        let Some(receiver) = self.in_flight.take() else {
            return Ok(());
        };
        log::trace!("joining in-flight update task");
        match receiver.recv() {
            Ok(Ok(state)) => {
                self.state = Some(state);
                self.phase = Phase::Evaluating;
                Ok(())
            }
            Ok(Err(payload)) => std::panic::resume_unwind(payload),
            Err(_) => Err(Error::WorkerLost),
        }
    }

    fn state_mut(&mut self) -> Result<&mut FrameState, Error> {
        self.join()?;
        self.state.as_deref_mut().ok_or(Error::WorkerLost)
    }

    pub fn set_pose_graph<G: PoseGraph + 'static>(&mut self, graph: G) -> Result<(), Error> {
        self.ensure_owner("set_pose_graph");
        self.state_mut()?.graph = Box::new(graph);
        Ok(())
    }

    pub fn bindings_mut(&mut self) -> Result<&mut NativeBindings, Error> {
        self.ensure_owner("bindings_mut");
        Ok(&mut self.state_mut()?.bindings)
    }

    pub fn set_predicted_lod(&mut self, lod: i32) {
        self.predicted_lod = lod;
    }

    pub fn predicted_lod(&self) -> i32 {
        self.predicted_lod
    }

    /// Starts a frame. A frame whose post-update never ran gets it now, and its report is
    /// returned.
    pub fn pre_update(&mut self, _delta: f32) -> Result<Option<PostUpdateReport>, Error> {
        self.ensure_owner("pre_update");
        self.join()?;
        let caught_up = if self.post_update_pending {
            log::debug!("running skipped post-update before the next frame");
            let mut report = self.run_post_update()?;
            report.caught_up = true;
            Some(report)
        } else {
            None
        };
        let lod = self.predicted_lod;
        self.state_mut()?.reset(lod);
        self.phase = Phase::PreUpdate;
        Ok(caught_up)
    }

    fn begin_update(&mut self, operation: &str, delta: f32) -> Result<(), Error> {
        if self.phase != Phase::PreUpdate || self.in_flight.is_some() {
            report_thread_violation(operation, "update requires a preceding pre_update");
            self.pre_update(delta)?;
        }
        Ok(())
    }

    /// Runs Update on the calling thread.
    pub fn update(&mut self, delta: f32) -> Result<(), Error> {
        self.ensure_owner("update");
        self.begin_update("update", delta)?;
        self.phase = Phase::Updating;
        self.state_mut()?.run_update(delta);
        self.phase = Phase::Evaluating;
        self.post_update_pending = true;
        Ok(())
    }

    /// Runs Update as a task on the worker pool. Any later game-thread call joins it.
    pub fn dispatch_update(&mut self, delta: f32) -> Result<(), Error> {
        self.ensure_owner("dispatch_update");
        let Some(pool) = self.pool.clone() else {
            return self.update(delta);
        };
        self.begin_update("dispatch_update", delta)?;
        let mut state = self.state.take().ok_or(Error::WorkerLost)?;
        let (sender, receiver) = mpsc::channel();
        log::trace!("dispatching update task (delta {delta})");
        pool.spawn(move || {
            let result = catch_unwind(AssertUnwindSafe(move || {
                state.run_update(delta);
                state
            }));
            // The runtime may have been dropped while the task ran.
            let _ = sender.send(result);
        });
        self.in_flight = Some(receiver);
        self.phase = Phase::Updating;
        self.post_update_pending = true;
        Ok(())
    }

    pub fn wait_for_update(&mut self) -> Result<(), Error> {
        self.join()
    }

    /// Joins an in-flight update and runs its post-update early if it has not run yet.
    pub fn complete_frame(&mut self) -> Result<Option<PostUpdateReport>, Error> {
        self.ensure_owner("complete_frame");
        self.join()?;
        if !self.post_update_pending {
            return Ok(None);
        }
        let mut report = self.run_post_update()?;
        report.caught_up = true;
        Ok(Some(report))
    }

    /// Snapshot of this frame, without joining. `NotReady` while the update task runs or
    /// before Update has produced one.
    pub fn evaluation_snapshot(&self) -> Result<Arc<MontageEvaluationSnapshot>, Error> {
        if self.in_flight.is_some() {
            return Err(Error::NotReady {
                phase: "update task still running".to_string(),
            });
        }
        self.state
            .as_deref()
            .and_then(|state| state.snapshot.clone())
            .ok_or_else(|| Error::NotReady {
                phase: format!("no update this frame ({})", self.phase),
            })
    }

    /// Joins an in-flight update, then returns its snapshot.
    pub fn current_snapshot(&mut self) -> Result<Arc<MontageEvaluationSnapshot>, Error> {
        self.join()?;
        self.evaluation_snapshot()
    }

    /// Blends every slot from this frame's snapshot. `NotReady` means "use the reference pose".
    pub fn evaluate(&self, sampler: &dyn PoseSampler) -> Result<SlotPoses, Error> {
        Ok(self.evaluation_snapshot()?.evaluate(sampler))
    }

    pub fn post_update(&mut self) -> Result<PostUpdateReport, Error> {
        self.ensure_owner("post_update");
        self.join()?;
        if !self.post_update_pending {
            return Err(Error::NotReady {
                phase: format!("post_update without update ({})", self.phase),
            });
        }
        self.run_post_update()
    }

    /// One whole frame on the calling thread. A post-update caught up by `pre_update` is
    /// folded into the returned report.
    pub fn tick(&mut self, delta: f32) -> Result<PostUpdateReport, Error> {
        let caught_up = self.pre_update(delta)?;
        self.update(delta)?;
        let mut report = self.post_update()?;
        if let Some(previous) = caught_up {
            report.merge_caught_up(previous);
        }
        Ok(report)
    }

    fn run_post_update(&mut self) -> Result<PostUpdateReport, Error> {
        self.phase = Phase::PostUpdating;
        self.post_update_pending = false;

        let state = self.state.as_deref_mut().ok_or(Error::WorkerLost)?;
        let queued: Vec<QueuedNotify> = state.notifies.drain().collect();
        let events = state.montage_events.take_ordered();
        let requests: Vec<RootMotionBlendRequest> = state.root_motion_requests.drain().collect();

        let mut report = PostUpdateReport::default();
        self.dispatch_notifies(queued, &mut report);

        for event in &events {
            self.handlers
                .dispatch_montage_event(event, &mut report.failures);
            report.montage_events_dispatched += 1;
        }

        for request in &requests {
            self.root_motion.accumulate(request);
        }
        self.root_motion.make_up_to_full_weight();
        report.root_motion_requests = requests.len();

        self.phase = Phase::Idle;
        Ok(report)
    }

    // One-shots trigger in queue order. State notifies end when they drop out of the queue,
    // begin when they first appear (after the ends) and tick every frame they stay.
    fn dispatch_notifies(&mut self, queued: Vec<QueuedNotify>, report: &mut PostUpdateReport) {
        let mut begins = Vec::new();
        let mut next_active: Vec<QueuedNotify> = Vec::new();
        for entry in queued {
            if entry.event.is_state() {
                if !contains_notify(&self.active_states, &entry) {
                    begins.push(entry.clone());
                }
                next_active.push(entry);
            } else {
                self.deliver_notify(NotifyPhase::Trigger, &entry, report);
            }
        }

        let previous = std::mem::take(&mut self.active_states);
        for entry in previous.iter().filter(|e| !contains_notify(&next_active, e)) {
            self.deliver_notify(NotifyPhase::End, entry, report);
        }
        for entry in &begins {
            self.deliver_notify(NotifyPhase::Begin, entry, report);
        }
        for entry in &next_active {
            self.deliver_notify(NotifyPhase::Tick, entry, report);
        }
        self.active_states = next_active;
    }

    fn deliver_notify(&mut self, phase: NotifyPhase, entry: &QueuedNotify, report: &mut PostUpdateReport) {
        let dispatch = NotifyDispatch {
            phase,
            event: Arc::clone(&entry.event),
            weight: entry.weight,
            source: entry.source,
        };
        self.handlers.dispatch_notify(&dispatch, &mut report.failures);
        report.notifies_dispatched += 1;
    }

    pub fn on_montage_started<F>(&mut self, name: &str, handler: F)
    where
        F: FnMut(&MontageEvent) -> anyhow::Result<()> + Send + 'static,
    {
        self.handlers
            .add_montage_handler(MontageEventKind::Started, name, Box::new(handler));
    }

    pub fn on_montage_blending_out<F>(&mut self, name: &str, handler: F)
    where
        F: FnMut(&MontageEvent) -> anyhow::Result<()> + Send + 'static,
    {
        self.handlers
            .add_montage_handler(MontageEventKind::BlendingOut, name, Box::new(handler));
    }

    pub fn on_montage_ended<F>(&mut self, name: &str, handler: F)
    where
        F: FnMut(&MontageEvent) -> anyhow::Result<()> + Send + 'static,
    {
        self.handlers
            .add_montage_handler(MontageEventKind::Ended, name, Box::new(handler));
    }

    pub fn on_notify<F>(&mut self, name: &str, handler: F)
    where
        F: FnMut(&NotifyDispatch) -> anyhow::Result<()> + Send + 'static,
    {
        self.handlers.add_notify_handler(name, Box::new(handler));
    }

    /// Starts a montage. Montages of the same group, and other root-motion montages when this
    /// one carries root motion, blend out over this montage's blend-in time.
    pub fn play_montage(
        &mut self,
        montage: Arc<MontageData>,
        play_rate: f32,
    ) -> Result<MontageInstanceId, Error> {
        self.ensure_owner("play_montage");
        montage.validate()?;
        if !play_rate.is_finite() {
            return Err(Error::InvalidValue {
                message: format!("play rate for '{}' must be finite", montage.name),
            });
        }
        let curve = self.config.default_blend_curve;
        let state = self.state_mut()?;

        for other in state
            .instances
            .iter_mut()
            .filter(|other| other.is_active() && !other.is_blending_out())
        {
            let same_group = montage.group.is_some() && other.montage().group == montage.group;
            let competing_root_motion = montage.has_root_motion() && other.montage().has_root_motion();
            if same_group || competing_root_motion {
                log::debug!("{} replaced by '{}'", other.id(), montage.name);
                other.stop(montage.blend_in, true);
            }
        }

        let mut instance = MontageInstance::new(Arc::clone(&montage), curve);
        instance.play(play_rate);
        for slot in &montage.slots {
            state.slots.register_slot(slot);
        }
        let id = instance.id();
        state.instances.push(instance);
        log::debug!("playing '{}' as {id} at rate {play_rate}", montage.name);
        Ok(id)
    }

    fn active_instance_mut(
        &mut self,
        id: MontageInstanceId,
        operation: &str,
    ) -> Result<&mut MontageInstance, Error> {
        self.ensure_owner(operation);
        let state = self.state_mut()?;
        match state
            .instances
            .iter_mut()
            .find(|i| i.id() == id && i.is_active())
        {
            Some(instance) => Ok(instance),
            None => {
                let error = Error::InvalidState {
                    message: format!("{operation}: {id} is not an active montage"),
                };
                log::warn!("{error}");
                Err(error)
            }
        }
    }

    fn instance(&mut self, id: MontageInstanceId) -> Option<&MontageInstance> {
        self.state_mut()
            .ok()?
            .instances
            .iter()
            .find(|i| i.id() == id && i.is_active())
    }

    pub fn stop_montage(&mut self, id: MontageInstanceId, blend_out: f32) -> Result<(), Error> {
        if !blend_out.is_finite() || blend_out < 0.0 {
            return Err(Error::InvalidValue {
                message: "blend out time must be finite and >= 0".to_string(),
            });
        }
        self.active_instance_mut(id, "stop_montage")?
            .stop(blend_out, true);
        Ok(())
    }

    pub fn stop_all_montages(&mut self, blend_out: f32) -> Result<(), Error> {
        self.ensure_owner("stop_all_montages");
        let blend_out = blend_out.max(0.0);
        for instance in self
            .state_mut()?
            .instances
            .iter_mut()
            .filter(|i| i.is_active())
        {
            instance.stop(blend_out, true);
        }
        Ok(())
    }

    pub fn pause_montage(&mut self, id: MontageInstanceId) -> Result<(), Error> {
        self.active_instance_mut(id, "pause_montage")?.pause();
        Ok(())
    }

    pub fn resume_montage(&mut self, id: MontageInstanceId) -> Result<(), Error> {
        self.active_instance_mut(id, "resume_montage")?.resume();
        Ok(())
    }

    /// Active, advancing and not blending out.
    pub fn is_montage_playing(&mut self, id: MontageInstanceId) -> bool {
        self.instance(id)
            .is_some_and(|i| i.is_playing() && !i.is_blending_out())
    }

    pub fn is_montage_active(&mut self, id: MontageInstanceId) -> bool {
        self.instance(id).is_some()
    }

    pub fn current_section(&mut self, id: MontageInstanceId) -> Option<String> {
        self.instance(id)?.current_section().map(str::to_string)
    }

    pub fn montage_position(&mut self, id: MontageInstanceId) -> Option<f32> {
        self.instance(id).map(MontageInstance::position)
    }

    pub fn montage_weight(&mut self, id: MontageInstanceId) -> Option<f32> {
        self.instance(id).map(MontageInstance::weight)
    }

    pub fn active_montages(&mut self) -> Vec<MontageInstanceId> {
        match self.state_mut() {
            Ok(state) => state
                .instances
                .iter()
                .filter(|i| i.is_active())
                .map(MontageInstance::id)
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn jump_to_section(&mut self, id: MontageInstanceId, section: &str) -> Result<(), Error> {
        let result = self
            .active_instance_mut(id, "jump_to_section")?
            .jump_to_section(section);
        if let Err(error) = &result {
            log::warn!("{error}");
        }
        result
    }

    pub fn jump_to_section_end(&mut self, id: MontageInstanceId, section: &str) -> Result<(), Error> {
        let result = self
            .active_instance_mut(id, "jump_to_section_end")?
            .jump_to_section_end(section);
        if let Err(error) = &result {
            log::warn!("{error}");
        }
        result
    }

    pub fn set_next_section(
        &mut self,
        id: MontageInstanceId,
        section: &str,
        next: Option<&str>,
    ) -> Result<(), Error> {
        self.active_instance_mut(id, "set_next_section")?
            .set_next_section(section, next)
    }

    pub fn set_play_rate(&mut self, id: MontageInstanceId, play_rate: f32) -> Result<(), Error> {
        if !play_rate.is_finite() {
            return Err(Error::InvalidValue {
                message: "play rate must be finite".to_string(),
            });
        }
        self.active_instance_mut(id, "set_play_rate")?
            .set_play_rate(play_rate);
        Ok(())
    }

    pub fn set_montage_position(&mut self, id: MontageInstanceId, position: f32) -> Result<(), Error> {
        if !position.is_finite() {
            return Err(Error::InvalidValue {
                message: "montage position must be finite".to_string(),
            });
        }
        self.active_instance_mut(id, "set_montage_position")?
            .set_position(position);
        Ok(())
    }

    /// Makes `follower` track `leader`'s position, play rate and section links from the next
    /// Update on. Following another leader replaces the previous one.
    pub fn montage_sync_follow(
        &mut self,
        follower: MontageInstanceId,
        leader: MontageInstanceId,
    ) -> Result<(), Error> {
        if follower == leader {
            return Err(Error::InvalidValue {
                message: format!("{follower} cannot follow itself"),
            });
        }
        self.active_instance_mut(leader, "montage_sync_follow")?;
        self.active_instance_mut(follower, "montage_sync_follow")?
            .set_sync_leader(Some(leader));
        log::debug!("{follower} follows {leader}");
        Ok(())
    }

    pub fn montage_sync_stop_following(&mut self, follower: MontageInstanceId) -> Result<(), Error> {
        self.active_instance_mut(follower, "montage_sync_stop_following")?
            .set_sync_leader(None);
        Ok(())
    }

    /// Every follower of `leader` stops following it.
    pub fn montage_sync_stop_leading(&mut self, leader: MontageInstanceId) -> Result<(), Error> {
        self.active_instance_mut(leader, "montage_sync_stop_leading")?;
        for follower in self
            .state_mut()?
            .instances
            .iter_mut()
            .filter(|i| i.sync_leader() == Some(leader))
        {
            follower.set_sync_leader(None);
        }
        Ok(())
    }

    pub fn montage_sync_leader(&mut self, id: MontageInstanceId) -> Option<MontageInstanceId> {
        self.instance(id)?.sync_leader()
    }

    /// Slot weights as of the last Update.
    pub fn slot_weights(&mut self) -> Result<&SlotWeightTracker, Error> {
        Ok(&self.state_mut()?.slots)
    }

    pub fn has_root_motion(&self) -> bool {
        self.root_motion.has_root_motion()
    }

    /// Root motion accumulated since the last consume, scaled from identity by `alpha`.
    /// Consuming clears the accumulator.
    pub fn consume_root_motion(&mut self, alpha: f32) -> Transform {
        self.ensure_owner("consume_root_motion");
        self.root_motion.consume(alpha)
    }
}

fn contains_notify(entries: &[QueuedNotify], entry: &QueuedNotify) -> bool {
    entries.iter().any(|e| Arc::ptr_eq(&e.event, &entry.event))
}
