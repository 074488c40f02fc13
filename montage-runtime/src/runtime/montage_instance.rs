use crate::model::{SECTION_END_OFFSET, TIME_EPSILON};
use crate::{
    BlendCurve, Error, MontageData, MontageInstanceId, NotifyEvent, NotifyKind, PassedMarker,
    Transform, WEIGHT_EPSILON,
};
use std::sync::Arc;

// Bounds section hops per advance so a zero-length loop cannot spin forever.
const MAX_SECTION_STEPS: usize = 64;

// Followers closer than this to their leader's position are left where they are.
const SYNC_POSITION_TOLERANCE: f32 = 1.0e-4;

/// Alpha blend from the weight at the moment the target changed toward the new target.
#[derive(Clone, Copy, Debug)]
struct WeightBlend {
    curve: BlendCurve,
    begin: f32,
    desired: f32,
    duration: f32,
    elapsed: f32,
    weight: f32,
}

impl WeightBlend {
    fn new(curve: BlendCurve) -> Self {
        Self {
            curve,
            begin: 0.0,
            desired: 0.0,
            duration: 0.0,
            elapsed: 0.0,
            weight: 0.0,
        }
    }

    fn set_target(&mut self, desired: f32, duration: f32) {
        self.begin = self.weight;
        self.desired = desired;
        self.duration = duration.max(0.0);
        self.elapsed = 0.0;
        if self.duration <= 0.0 {
            self.weight = desired;
        }
    }

    fn remaining(&self) -> f32 {
        (self.duration - self.elapsed).max(0.0)
    }

    fn tick(&mut self, delta: f32) {
        if self.weight == self.desired {
            return;
        }
        self.elapsed += delta;
        if self.duration <= 0.0 || self.elapsed + TIME_EPSILON >= self.duration {
            self.weight = self.desired;
            return;
        }
        let alpha = self.curve.apply(self.elapsed / self.duration);
        self.weight = self.begin + (self.desired - self.begin) * alpha;
    }
}

/// What one `advance` produced. The orchestrator routes each part to its consumer.
#[derive(Clone, Debug, Default)]
pub struct AdvanceOutcome {
    /// In traversal order, so the earliest crossed marker comes first.
    pub markers: Vec<PassedMarker>,
    /// Notifies crossed (one-shot) or overlapped (state), in track order per section slice.
    pub notifies: Vec<Arc<NotifyEvent>>,
    pub root_motion: Option<Transform>,
    /// Playback reached the end of the montage, or the automatic blend-out started.
    pub auto_blend_out: bool,
}

/// Where a sync leader ended up this frame, as seen by its followers.
#[derive(Clone, Debug)]
pub(crate) struct SyncLeaderState {
    pub montage: Arc<MontageData>,
    pub position: f32,
    pub play_rate: f32,
    pub section: Option<String>,
    pub next_section: Option<String>,
    pub markers: Vec<PassedMarker>,
}

/// One playing montage: position, blend weight, play rate and section links.
#[derive(Clone, Debug)]
pub struct MontageInstance {
    id: MontageInstanceId,
    montage: Arc<MontageData>,
    position: f32,
    play_rate: f32,
    section: Option<usize>,
    next_sections: Vec<Option<usize>>,
    prev_sections: Vec<Option<usize>>,
    blend: WeightBlend,
    previous_weight: f32,
    playing: bool,
    active: bool,
    blending_out: bool,
    interrupted: bool,
    sync_leader: Option<MontageInstanceId>,
    pub(crate) fresh: bool,
    pub(crate) blend_out_reported: bool,
}

impl MontageInstance {
    pub fn new(montage: Arc<MontageData>, default_curve: BlendCurve) -> Self {
        let next_sections: Vec<Option<usize>> = montage
            .sections
            .iter()
            .map(|s| s.next_section.as_deref().and_then(|n| montage.section_index(n)))
            .collect();
        let mut prev_sections = vec![None; next_sections.len()];
        for (index, next) in next_sections.iter().enumerate() {
            if let Some(next) = *next {
                prev_sections[next] = Some(index);
            }
        }
        let curve = montage.blend_curve.unwrap_or(default_curve);
        let section = montage.section_index_at(0.0);

        Self {
            id: MontageInstanceId::next(),
            montage,
            position: 0.0,
            play_rate: 1.0,
            section,
            next_sections,
            prev_sections,
            blend: WeightBlend::new(curve),
            previous_weight: 0.0,
            playing: false,
            active: true,
            blending_out: false,
            interrupted: false,
            sync_leader: None,
            fresh: true,
            blend_out_reported: false,
        }
    }

    pub fn id(&self) -> MontageInstanceId {
        self.id
    }

    pub fn montage(&self) -> &Arc<MontageData> {
        &self.montage
    }

    pub fn position(&self) -> f32 {
        self.position
    }

    pub fn weight(&self) -> f32 {
        self.blend.weight
    }

    pub fn desired_weight(&self) -> f32 {
        self.blend.desired
    }

    pub fn previous_weight(&self) -> f32 {
        self.previous_weight
    }

    /// Weight used for notify gating: the larger of this and the previous tick's weight, so a
    /// notify on the frame a montage blends out still sees its last audible weight.
    pub fn notify_weight(&self) -> f32 {
        self.blend.weight.max(self.previous_weight)
    }

    pub fn play_rate(&self) -> f32 {
        self.play_rate
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_blending_out(&self) -> bool {
        self.blending_out
    }

    pub fn was_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Fully blended out; the orchestrator removes the instance on the next purge.
    pub fn is_blend_complete(&self) -> bool {
        !self.active
    }

    pub fn section_index(&self) -> Option<usize> {
        self.section
    }

    pub fn current_section(&self) -> Option<&str> {
        self.section
            .and_then(|i| self.montage.sections.get(i))
            .map(|s| s.name.as_str())
    }

    pub fn next_section(&self, section: &str) -> Option<&str> {
        let index = self.montage.section_index(section)?;
        let next = self.next_sections.get(index).copied().flatten()?;
        self.montage.sections.get(next).map(|s| s.name.as_str())
    }

    pub fn sync_leader(&self) -> Option<MontageInstanceId> {
        self.sync_leader
    }

    pub(crate) fn set_sync_leader(&mut self, leader: Option<MontageInstanceId>) {
        self.sync_leader = leader;
    }

    pub(crate) fn sync_leader_state(&self) -> SyncLeaderState {
        let section = self.current_section().map(str::to_string);
        let next_section = section
            .as_deref()
            .and_then(|name| self.next_section(name))
            .map(str::to_string);
        SyncLeaderState {
            montage: Arc::clone(&self.montage),
            position: self.position,
            play_rate: self.play_rate,
            section,
            next_section,
            markers: Vec::new(),
        }
    }

    /// Follows the leader's timeline. A follower sharing sync markers with its leader is
    /// realigned only when the leader crosses one of them, landing the same distance past its
    /// own copy of the marker; any other follower takes the leader's position. The play rate
    /// is copied, and so is the next link of a section both montages are in.
    pub(crate) fn sync_to_leader(&mut self, leader: &SyncLeaderState) {
        let shares_markers = self
            .montage
            .markers
            .iter()
            .any(|own| leader.montage.markers.iter().any(|m| m.name == own.name));
        let target = if shares_markers {
            leader.markers.iter().rev().find_map(|passed| {
                self.montage
                    .markers
                    .iter()
                    .find(|own| own.name == passed.name)
                    .map(|own| own.time + (leader.position - passed.time))
            })
        } else {
            Some(leader.position)
        };
        if let Some(target) = target {
            if (self.position - target).abs() > SYNC_POSITION_TOLERANCE {
                self.position = target.clamp(0.0, self.montage.length);
                self.section = self.montage.section_index_at(self.position);
            }
        }
        self.play_rate = leader.play_rate;

        let Some(section) = leader.section.as_deref() else {
            return;
        };
        if self.current_section() != Some(section) {
            return;
        }
        let next = leader
            .next_section
            .as_deref()
            .filter(|name| self.montage.section_index(name).is_some());
        if let Err(error) = self.set_next_section(section, next) {
            log::warn!("{} could not follow its sync leader: {error}", self.id);
        }
    }

    /// Starts (or restarts) playback and blends toward full weight over the montage blend-in.
    pub fn play(&mut self, play_rate: f32) {
        self.play_rate = play_rate;
        self.playing = true;
        self.active = true;
        self.blending_out = false;
        self.interrupted = false;
        self.blend_out_reported = false;
        self.blend.set_target(1.0, self.montage.blend_in);
    }

    /// Begins blending out. Returns `true` when this call started the blend-out; a repeated
    /// stop only shortens a blend-out already in progress.
    pub fn stop(&mut self, blend_out: f32, interrupted: bool) -> bool {
        let blend_out = blend_out.max(0.0);
        let started = if self.blend.desired > 0.0 || !self.blending_out {
            self.blend.set_target(0.0, blend_out);
            self.blending_out = true;
            self.interrupted = interrupted;
            true
        } else {
            if blend_out < self.blend.remaining() {
                self.blend.set_target(0.0, blend_out);
            }
            false
        };
        if self.blend.duration <= 0.0 {
            self.playing = false;
        }
        started
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn resume(&mut self) {
        if self.active {
            self.playing = true;
        }
    }

    pub fn set_desired_weight(&mut self, weight: f32) {
        let weight = weight.clamp(0.0, 1.0);
        let duration = if weight >= self.blend.weight {
            self.montage.blend_in
        } else {
            self.montage.blend_out
        };
        self.blend.set_target(weight, duration);
    }

    pub fn set_play_rate(&mut self, play_rate: f32) {
        if play_rate.is_finite() {
            self.play_rate = play_rate;
        }
    }

    pub fn set_position(&mut self, position: f32) {
        let position = position.clamp(0.0, self.montage.length);
        self.position = position;
        self.section = self.montage.section_index_at(position);
        self.on_position_changed();
    }

    pub fn jump_to_section(&mut self, name: &str) -> Result<(), Error> {
        let index = self.require_section(name)?;
        self.position = self.montage.sections[index].start_time;
        self.section = Some(index);
        self.on_position_changed();
        Ok(())
    }

    pub fn jump_to_section_end(&mut self, name: &str) -> Result<(), Error> {
        let index = self.require_section(name)?;
        let (start, end) = self
            .montage
            .section_range(index)
            .unwrap_or((0.0, self.montage.length));
        self.position = (end - SECTION_END_OFFSET).max(start);
        self.section = Some(index);
        self.on_position_changed();
        Ok(())
    }

    /// Relinks `section` to continue into `next` (or end the montage when `None`).
    pub fn set_next_section(&mut self, section: &str, next: Option<&str>) -> Result<(), Error> {
        let index = self.require_section(section)?;
        let next_index = match next {
            Some(name) => Some(self.require_section(name)?),
            None => None,
        };
        if let Some(old) = self.next_sections[index] {
            if self.prev_sections[old] == Some(index) {
                self.prev_sections[old] = None;
            }
        }
        self.next_sections[index] = next_index;
        if let Some(next_index) = next_index {
            self.prev_sections[next_index] = Some(index);
        }
        Ok(())
    }

    fn require_section(&self, name: &str) -> Result<usize, Error> {
        self.montage
            .section_index(name)
            .ok_or_else(|| Error::InvalidSection {
                montage: self.montage.name.clone(),
                section: name.to_string(),
            })
    }

    // A jump while blending out brings the montage back in.
    fn on_position_changed(&mut self) {
        if self.active && self.blending_out {
            self.play(self.play_rate);
        }
    }

    /// Blends the current weight toward the desired weight. Returns `true` once the instance
    /// has fully blended out and become inactive.
    pub fn update_weight(&mut self, delta: f32) -> bool {
        if !self.active {
            return true;
        }
        self.previous_weight = self.blend.weight;
        if delta.is_finite() && delta > 0.0 {
            self.blend.tick(delta);
        }
        if self.blend.desired <= WEIGHT_EPSILON && self.blend.weight <= WEIGHT_EPSILON {
            self.blend.weight = 0.0;
            self.playing = false;
            self.active = false;
        }
        !self.active
    }

    pub fn advance(&mut self, delta: f32) -> AdvanceOutcome {
        self.advance_with(delta, true)
    }

    pub(crate) fn advance_with(&mut self, delta: f32, extract_root_motion: bool) -> AdvanceOutcome {
        let mut out = AdvanceOutcome::default();
        if !self.playing || !self.active || !delta.is_finite() || delta <= 0.0 {
            return out;
        }

        let mut remaining = delta * self.play_rate * self.montage.rate_scale;
        let mut steps = 0;
        while remaining.abs() > TIME_EPSILON && steps < MAX_SECTION_STEPS {
            steps += 1;
            let Some((start, end)) = self.section.and_then(|s| self.montage.section_range(s))
            else {
                self.stop_at_boundary(&mut out);
                break;
            };

            let previous = self.position;
            let forward = remaining > 0.0;
            let target = if forward {
                (previous + remaining).min(end)
            } else {
                (previous + remaining).max(start)
            };
            self.position = target;
            remaining -= target - previous;
            self.collect_slice(previous, target, extract_root_motion, &mut out);

            let at_boundary = if forward {
                target >= end - TIME_EPSILON
            } else {
                target <= start + TIME_EPSILON
            };
            if !at_boundary {
                break;
            }

            let Some(section) = self.section else {
                break;
            };
            let link = if forward {
                self.next_sections[section]
            } else {
                self.prev_sections[section]
            };
            match link {
                Some(next) => {
                    self.section = Some(next);
                    self.position = if forward {
                        self.montage.sections[next].start_time
                    } else {
                        self.montage
                            .section_range(next)
                            .map(|(_, end)| end)
                            .unwrap_or(self.montage.length)
                    };
                }
                None => {
                    self.playing = false;
                    self.stop_at_boundary(&mut out);
                    break;
                }
            }
        }

        self.check_auto_blend_out(&mut out);
        out
    }

    fn stop_at_boundary(&mut self, out: &mut AdvanceOutcome) {
        if !self.blending_out {
            self.stop(self.montage.blend_out, false);
        }
        out.auto_blend_out = true;
    }

    // Starts the blend-out once the time left in a terminal section drops under the trigger.
    fn check_auto_blend_out(&mut self, out: &mut AdvanceOutcome) {
        if !self.playing || self.blending_out {
            return;
        }
        let Some(section) = self.section else {
            return;
        };
        let rate = self.play_rate * self.montage.rate_scale;
        if rate.abs() <= TIME_EPSILON {
            return;
        }
        let Some((start, end)) = self.montage.section_range(section) else {
            return;
        };
        let (link, distance) = if rate > 0.0 {
            (self.next_sections[section], end - self.position)
        } else {
            (self.prev_sections[section], self.position - start)
        };
        if link.is_some() {
            return;
        }
        let trigger = self
            .montage
            .blend_out_trigger_time
            .unwrap_or(self.montage.blend_out);
        if distance / rate.abs() <= trigger {
            self.stop(self.montage.blend_out, false);
            out.auto_blend_out = true;
        }
    }

    fn collect_slice(
        &self,
        from: f32,
        to: f32,
        extract_root_motion: bool,
        out: &mut AdvanceOutcome,
    ) {
        let forward = to >= from;
        let (lo, hi) = if forward { (from, to) } else { (to, from) };
        // Forward slices are [from, to); reverse slices are (to, from].
        let crosses = |time: f32| {
            if forward {
                time >= lo && time < hi
            } else {
                time > lo && time <= hi
            }
        };

        let first_marker = out.markers.len();
        for marker in &self.montage.markers {
            if crosses(marker.time) {
                out.markers.push(PassedMarker {
                    name: marker.name.clone(),
                    time: marker.time,
                });
            }
        }
        let slice_markers = &mut out.markers[first_marker..];
        if forward {
            slice_markers.sort_by(|a, b| a.time.total_cmp(&b.time));
        } else {
            slice_markers.sort_by(|a, b| b.time.total_cmp(&a.time));
        }

        for notify in &self.montage.notifies {
            let hit = match notify.kind {
                NotifyKind::OneShot => crosses(notify.trigger_time),
                NotifyKind::State => notify.trigger_time < hi && notify.end_time() > lo,
            };
            if hit {
                out.notifies.push(Arc::clone(notify));
            }
        }

        if extract_root_motion {
            if let Some(track) = &self.montage.root_motion {
                let delta = track.extract(from, to);
                out.root_motion = Some(match out.root_motion {
                    Some(total) => total.compose(&delta),
                    None => delta,
                });
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn force_weight_for_tests(&mut self, weight: f32, desired: f32) {
        self.blend.weight = weight;
        self.blend.begin = weight;
        self.blend.desired = desired;
        self.blend.duration = 0.0;
        self.blend.elapsed = 0.0;
        self.fresh = false;
    }
}
