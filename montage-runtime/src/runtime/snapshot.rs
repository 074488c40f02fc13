use crate::{MontageData, MontageInstanceId, PassedMarker, Pose};
use std::sync::Arc;

/// Pose source supplied by the host pose graph. Called from Evaluate, possibly from several
/// threads at once.
pub trait PoseSampler: Sync {
    /// Pose flowing into `slot` from upstream of the slot node.
    fn source_pose(&self, slot: &str) -> Pose;

    fn sample_montage(&self, montage: &MontageData, slot: &str, position: f32) -> Pose;
}

#[derive(Clone, Debug)]
pub struct MontageEvaluationRecord {
    pub instance: MontageInstanceId,
    pub montage: Arc<MontageData>,
    pub weight: f32,
    pub desired_weight: f32,
    pub position: f32,
    pub playing: bool,
    pub active: bool,
    pub markers_passed: Vec<PassedMarker>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SlotWeightRecord {
    pub slot: String,
    pub local_weight: f32,
    pub non_additive_weight: f32,
    pub global_weight: f32,
}

impl SlotWeightRecord {
    pub fn effective_weight(&self) -> f32 {
        self.local_weight * self.global_weight
    }

    pub fn source_weight(&self) -> f32 {
        1.0 - self.non_additive_weight * self.global_weight
    }
}

/// Blended output of every slot, in slot registration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SlotPoses {
    pub slots: Vec<(String, Pose)>,
}

impl SlotPoses {
    pub fn get(&self, slot: &str) -> Option<&Pose> {
        self.slots.iter().find(|(name, _)| name == slot).map(|(_, pose)| pose)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Immutable per-frame copy of everything Evaluate reads. Montages are kept in creation
/// order, which is also the blend order.
#[derive(Clone, Debug, Default)]
pub struct MontageEvaluationSnapshot {
    frame: u64,
    montages: Vec<MontageEvaluationRecord>,
    slots: Vec<SlotWeightRecord>,
    curves: Vec<(String, f32)>,
}

impl MontageEvaluationSnapshot {
    pub(crate) fn new(
        frame: u64,
        montages: Vec<MontageEvaluationRecord>,
        slots: Vec<SlotWeightRecord>,
    ) -> Self {
        Self {
            frame,
            montages,
            slots,
            curves: Vec::new(),
        }
    }

    pub(crate) fn with_curves(mut self, curves: Vec<(String, f32)>) -> Self {
        self.curves = curves;
        self
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn montages(&self) -> &[MontageEvaluationRecord] {
        &self.montages
    }

    pub fn montage(&self, id: MontageInstanceId) -> Option<&MontageEvaluationRecord> {
        self.montages.iter().find(|m| m.instance == id)
    }

    pub fn slots(&self) -> &[SlotWeightRecord] {
        &self.slots
    }

    pub fn slot(&self, slot: &str) -> Option<&SlotWeightRecord> {
        self.slots.iter().find(|s| s.slot == slot)
    }

    /// Montage curve values of this frame, summed over montages and scaled by their weights.
    pub fn curves(&self) -> &[(String, f32)] {
        &self.curves
    }

    pub fn curve(&self, name: &str) -> Option<f32> {
        self.curves
            .iter()
            .find(|(curve, _)| curve == name)
            .map(|&(_, value)| value)
    }

    pub fn evaluate(&self, sampler: &dyn PoseSampler) -> SlotPoses {
        SlotPoses {
            slots: self
                .slots
                .iter()
                .map(|record| (record.slot.clone(), self.evaluate_slot(record, sampler)))
                .collect(),
        }
    }

    pub fn evaluate_slot_named(&self, slot: &str, sampler: &dyn PoseSampler) -> Option<Pose> {
        self.slot(slot)
            .map(|record| self.evaluate_slot(record, sampler))
    }

    // Non-additive montages take montage_weight * global each and the source pose keeps whatever
    // is left of 1. Nothing is clamped, so an over-saturated slot stays over-saturated. Additive
    // tracks are layered on the blended base afterwards, in creation order.
    fn evaluate_slot(&self, record: &SlotWeightRecord, sampler: &dyn PoseSampler) -> Pose {
        let source = sampler.source_pose(&record.slot);
        if record.local_weight <= 0.0 || record.effective_weight() <= 0.0 {
            return source;
        }

        let mut out = if record.non_additive_weight > 0.0 {
            let mut base = Pose::zeroed(source.len());
            base.accumulate_weighted(&source, &source, record.source_weight());
            for montage in self.contributing(&record.slot, false) {
                let pose = sampler.sample_montage(&montage.montage, &record.slot, montage.position);
                base.accumulate_weighted(&pose, &source, montage.weight * record.global_weight);
            }
            base.normalize_rotations();
            base
        } else {
            source
        };

        for montage in self.contributing(&record.slot, true) {
            let pose = sampler.sample_montage(&montage.montage, &record.slot, montage.position);
            out.apply_additive(&pose, montage.weight * record.global_weight);
        }
        out
    }

    fn contributing<'a>(
        &'a self,
        slot: &'a str,
        additive: bool,
    ) -> impl Iterator<Item = &'a MontageEvaluationRecord> + 'a {
        self.montages.iter().filter(move |m| {
            m.weight > 0.0
                && m.montage.targets_slot(slot)
                && m.montage.is_additive_in(slot) == additive
        })
    }
}
