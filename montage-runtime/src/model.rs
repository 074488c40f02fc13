use crate::{Error, Transform};
use std::sync::Arc;

/// Weights at or below this are treated as zero (fully blended out).
pub const WEIGHT_EPSILON: f32 = 1.0e-5;

pub(crate) const TIME_EPSILON: f32 = 1.0e-6;

/// Jumping to a section end lands this far before the end, so the section is still current.
pub(crate) const SECTION_END_OFFSET: f32 = 1.0e-4;

pub const DEFAULT_BLEND_TIME: f32 = 0.25;
pub const DEFAULT_SLOT: &str = "DefaultSlot";
pub const DEFAULT_SECTION: &str = "Default";

/// Shape of a montage weight transition. Maps normalized blend time to normalized weight.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub enum BlendCurve {
    #[default]
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
    Sinusoidal,
    Bezier {
        cx1: f32,
        cy1: f32,
        cx2: f32,
        cy2: f32,
    },
}

impl BlendCurve {
    pub fn apply(self, alpha: f32) -> f32 {
        let t = alpha.clamp(0.0, 1.0);
        match self {
            BlendCurve::Linear => t,
            BlendCurve::EaseIn => t * t,
            BlendCurve::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            BlendCurve::EaseInOut => t * t * (3.0 - 2.0 * t),
            BlendCurve::Sinusoidal => {
                ((t * std::f32::consts::PI - std::f32::consts::FRAC_PI_2).sin() + 1.0) * 0.5
            }
            BlendCurve::Bezier { cx1, cy1, cx2, cy2 } => {
                bezier_value(t, cx1, cy1, cx2, cy2)
            }
        }
    }

    pub fn validate(self) -> Result<(), Error> {
        if let BlendCurve::Bezier { cx1, cy1, cx2, cy2 } = self {
            let finite = [cx1, cy1, cx2, cy2].iter().all(|v| v.is_finite());
            if !finite || !(0.0..=1.0).contains(&cx1) || !(0.0..=1.0).contains(&cx2) {
                return Err(Error::InvalidValue {
                    message: "bezier blend curve control x values must be within [0, 1]"
                        .to_string(),
                });
            }
        }
        Ok(())
    }
}

const BEZIER_ITERATIONS: usize = 24;

// Cubic bezier from (0, 0) to (1, 1). The x axis is monotonic while both control x values stay
// in [0, 1], so bisection finds the curve parameter at `time` and y is read there.
fn bezier_value(time: f32, cx1: f32, cy1: f32, cx2: f32, cy2: f32) -> f32 {
    let axis = |t: f32, p1: f32, p2: f32| {
        let u = 1.0 - t;
        3.0 * u * u * t * p1 + 3.0 * u * t * t * p2 + t * t * t
    };
    let (mut lo, mut hi) = (0.0f32, 1.0f32);
    for _ in 0..BEZIER_ITERATIONS {
        let mid = (lo + hi) * 0.5;
        if axis(mid, cx1, cx2) < time {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    axis((lo + hi) * 0.5, cy1, cy2)
}

/// A named span of a montage. `next_section` naming the section itself makes it loop.
#[derive(Clone, Debug, PartialEq)]
pub struct CompositeSection {
    pub name: String,
    pub start_time: f32,
    pub next_section: Option<String>,
}

impl CompositeSection {
    pub fn new(name: impl Into<String>, start_time: f32) -> Self {
        Self {
            name: name.into(),
            start_time,
            next_section: None,
        }
    }

    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next_section = Some(next.into());
        self
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NotifyKind {
    /// Fires once when its trigger time is crossed.
    OneShot,
    /// Spans `[trigger_time, trigger_time + duration]` and gets begin/tick/end callbacks.
    State,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum NotifyFilter {
    #[default]
    None,
    /// Passes only while the predicted LOD is below `filter_lod`.
    Lod { filter_lod: i32 },
}

/// A timed event embedded in a montage. Identity (the `Arc` pointer) is the dedup key for
/// state notifies.
#[derive(Clone, Debug, PartialEq)]
pub struct NotifyEvent {
    pub name: String,
    pub trigger_time: f32,
    pub duration: f32,
    pub kind: NotifyKind,
    pub trigger_weight_threshold: f32,
    pub filter: NotifyFilter,
    pub trigger_chance: f32,
    pub client_only: bool,
}

impl NotifyEvent {
    pub fn one_shot(name: impl Into<String>, trigger_time: f32) -> Self {
        Self {
            name: name.into(),
            trigger_time,
            duration: 0.0,
            kind: NotifyKind::OneShot,
            trigger_weight_threshold: WEIGHT_EPSILON,
            filter: NotifyFilter::None,
            trigger_chance: 1.0,
            client_only: false,
        }
    }

    pub fn state(name: impl Into<String>, trigger_time: f32, duration: f32) -> Self {
        Self {
            duration,
            kind: NotifyKind::State,
            ..Self::one_shot(name, trigger_time)
        }
    }

    pub fn with_weight_threshold(mut self, threshold: f32) -> Self {
        self.trigger_weight_threshold = threshold;
        self
    }

    pub fn with_lod_filter(mut self, filter_lod: i32) -> Self {
        self.filter = NotifyFilter::Lod { filter_lod };
        self
    }

    pub fn with_trigger_chance(mut self, chance: f32) -> Self {
        self.trigger_chance = chance;
        self
    }

    pub fn client_only(mut self) -> Self {
        self.client_only = true;
        self
    }

    pub fn is_state(&self) -> bool {
        self.kind == NotifyKind::State
    }

    pub fn end_time(&self) -> f32 {
        self.trigger_time + self.duration.max(0.0)
    }
}

/// Named sync point on the montage timeline.
#[derive(Clone, Debug, PartialEq)]
pub struct SyncMarker {
    pub name: String,
    pub time: f32,
}

impl SyncMarker {
    pub fn new(name: impl Into<String>, time: f32) -> Self {
        Self {
            name: name.into(),
            time,
        }
    }
}

/// A marker crossed during one `advance`.
#[derive(Clone, Debug, PartialEq)]
pub struct PassedMarker {
    pub name: String,
    pub time: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RootMotionKey {
    pub time: f32,
    pub transform: Transform,
}

/// Root bone transform over time. Sampled linearly and clamped to the key range.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RootMotionTrack {
    pub keys: Vec<RootMotionKey>,
}

impl RootMotionTrack {
    pub fn new(keys: Vec<RootMotionKey>) -> Self {
        Self { keys }
    }

    pub fn sample(&self, time: f32) -> Transform {
        let (Some(first), Some(last)) = (self.keys.first(), self.keys.last()) else {
            return Transform::IDENTITY;
        };
        if time <= first.time {
            return first.transform;
        }
        if time >= last.time {
            return last.transform;
        }
        let next = self.keys.partition_point(|key| key.time <= time);
        let (a, b) = (&self.keys[next - 1], &self.keys[next]);
        let span = b.time - a.time;
        if span <= TIME_EPSILON {
            return b.transform;
        }
        a.transform.lerp(&b.transform, (time - a.time) / span)
    }

    /// Root motion accumulated moving from `from` to `to`, in the space of the `from` sample.
    pub fn extract(&self, from: f32, to: f32) -> Transform {
        self.sample(to).relative_to(&self.sample(from))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CurveKey {
    pub time: f32,
    pub value: f32,
}

/// Named float track driven by a montage (material parameters, morph targets, gameplay
/// curves). Sampled linearly and clamped to the key range.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FloatCurve {
    pub name: String,
    pub keys: Vec<CurveKey>,
}

impl FloatCurve {
    pub fn new(name: impl Into<String>, keys: Vec<CurveKey>) -> Self {
        Self {
            name: name.into(),
            keys,
        }
    }

    pub fn sample(&self, time: f32) -> f32 {
        let (Some(first), Some(last)) = (self.keys.first(), self.keys.last()) else {
            return 0.0;
        };
        if time <= first.time {
            return first.value;
        }
        if time >= last.time {
            return last.value;
        }
        let next = self.keys.partition_point(|key| key.time <= time);
        let (a, b) = (self.keys[next - 1], self.keys[next]);
        let span = b.time - a.time;
        if span <= TIME_EPSILON {
            return b.value;
        }
        a.value + (b.value - a.value) * (time - a.time) / span
    }
}

/// Immutable montage asset. Shared between instances and snapshots as `Arc<MontageData>`.
#[derive(Clone, Debug, PartialEq)]
pub struct MontageData {
    pub name: String,
    pub length: f32,
    pub blend_in: f32,
    pub blend_out: f32,
    /// Time before the end at which an automatic blend-out starts. `None` uses `blend_out`.
    pub blend_out_trigger_time: Option<f32>,
    /// Overrides the runtime default blend curve.
    pub blend_curve: Option<BlendCurve>,
    pub rate_scale: f32,
    /// Playing a montage stops every other active montage of the same group.
    pub group: Option<String>,
    pub slots: Vec<String>,
    /// Slots whose track is layered additively over the blended base pose.
    pub additive_slots: Vec<String>,
    pub sections: Vec<CompositeSection>,
    pub notifies: Vec<Arc<NotifyEvent>>,
    pub markers: Vec<SyncMarker>,
    pub root_motion: Option<RootMotionTrack>,
    pub curves: Vec<FloatCurve>,
}

impl MontageData {
    pub fn new(name: impl Into<String>, length: f32) -> Self {
        Self {
            name: name.into(),
            length,
            blend_in: DEFAULT_BLEND_TIME,
            blend_out: DEFAULT_BLEND_TIME,
            blend_out_trigger_time: None,
            blend_curve: None,
            rate_scale: 1.0,
            group: None,
            slots: vec![DEFAULT_SLOT.to_string()],
            additive_slots: Vec::new(),
            sections: vec![CompositeSection::new(DEFAULT_SECTION, 0.0)],
            notifies: Vec::new(),
            markers: Vec::new(),
            root_motion: None,
            curves: Vec::new(),
        }
    }

    pub fn with_slots<I, S>(mut self, slots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.slots = slots.into_iter().map(Into::into).collect();
        self
    }

    /// Marks the tracks of `slots` additive, adding any slot the montage does not target yet.
    pub fn with_additive_slots<I, S>(mut self, slots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for slot in slots.into_iter().map(Into::into) {
            if !self.targets_slot(&slot) {
                self.slots.push(slot.clone());
            }
            if !self.is_additive_in(&slot) {
                self.additive_slots.push(slot);
            }
        }
        self
    }

    pub fn with_blend_times(mut self, blend_in: f32, blend_out: f32) -> Self {
        self.blend_in = blend_in;
        self.blend_out = blend_out;
        self
    }

    pub fn with_sections(mut self, sections: Vec<CompositeSection>) -> Self {
        self.sections = sections;
        self
    }

    pub fn with_notify(mut self, notify: NotifyEvent) -> Self {
        self.notifies.push(Arc::new(notify));
        self
    }

    pub fn with_marker(mut self, marker: SyncMarker) -> Self {
        self.markers.push(marker);
        self
    }

    pub fn with_root_motion(mut self, track: RootMotionTrack) -> Self {
        self.root_motion = Some(track);
        self
    }

    pub fn with_curve(mut self, curve: FloatCurve) -> Self {
        self.curves.push(curve);
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |message: String| Err(Error::InvalidValue { message });

        if !self.length.is_finite() || self.length <= 0.0 {
            return invalid(format!("montage '{}' must have a positive length", self.name));
        }
        for (label, value) in [("blend in", self.blend_in), ("blend out", self.blend_out)] {
            if !value.is_finite() || value < 0.0 {
                return invalid(format!(
                    "montage '{}' {label} time must be finite and >= 0",
                    self.name
                ));
            }
        }
        if !self.rate_scale.is_finite() {
            return invalid(format!("montage '{}' rate scale must be finite", self.name));
        }
        if self.slots.is_empty() {
            return invalid(format!("montage '{}' targets no slots", self.name));
        }
        if self.sections.is_empty() {
            return invalid(format!("montage '{}' has no sections", self.name));
        }
        let mut previous_start = f32::NEG_INFINITY;
        for section in &self.sections {
            if !(0.0..self.length).contains(&section.start_time)
                || section.start_time <= previous_start
            {
                return invalid(format!(
                    "section '{}' of montage '{}' must start inside the montage, after the previous section",
                    section.name, self.name
                ));
            }
            previous_start = section.start_time;
            if let Some(next) = &section.next_section {
                if self.section_index(next).is_none() {
                    return Err(Error::InvalidSection {
                        montage: self.name.clone(),
                        section: next.clone(),
                    });
                }
            }
        }
        if let Some(slot) = self.additive_slots.iter().find(|s| !self.targets_slot(s)) {
            return invalid(format!(
                "montage '{}' marks slot '{slot}' additive but does not target it",
                self.name
            ));
        }
        for curve in &self.curves {
            let ordered = curve.keys.windows(2).all(|pair| pair[0].time <= pair[1].time);
            let finite = curve
                .keys
                .iter()
                .all(|key| key.time.is_finite() && key.value.is_finite());
            if !ordered || !finite {
                return invalid(format!(
                    "curve '{}' of montage '{}' needs finite keys in time order",
                    curve.name, self.name
                ));
            }
        }
        if let Some(curve) = self.blend_curve {
            curve.validate()?;
        }
        Ok(())
    }

    pub fn section_index(&self, name: &str) -> Option<usize> {
        self.sections.iter().position(|s| s.name == name)
    }

    /// Section containing `time`: the last one whose start is at or before it.
    pub fn section_index_at(&self, time: f32) -> Option<usize> {
        if !(0.0..=self.length).contains(&time) {
            return None;
        }
        self.sections
            .iter()
            .rposition(|s| s.start_time <= time + TIME_EPSILON)
    }

    pub fn section_range(&self, index: usize) -> Option<(f32, f32)> {
        let start = self.sections.get(index)?.start_time;
        let end = self
            .sections
            .get(index + 1)
            .map(|s| s.start_time)
            .unwrap_or(self.length);
        Some((start, end))
    }

    pub fn section_length(&self, index: usize) -> f32 {
        self.section_range(index)
            .map(|(start, end)| end - start)
            .unwrap_or(0.0)
    }

    pub fn has_root_motion(&self) -> bool {
        self.root_motion.is_some()
    }

    pub fn targets_slot(&self, slot: &str) -> bool {
        self.slots.iter().any(|s| s == slot)
    }

    pub fn is_additive_in(&self, slot: &str) -> bool {
        self.additive_slots.iter().any(|s| s == slot)
    }
}
