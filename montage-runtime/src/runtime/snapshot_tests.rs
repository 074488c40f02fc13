use crate::runtime::{
    MontageEvaluationRecord, MontageEvaluationSnapshot, PoseSampler, SlotWeightRecord,
};
use crate::{MontageData, MontageInstanceId, Pose, Transform};
use glam::Vec3;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn assert_approx(actual: f32, expected: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= 1.0e-5,
        "expected {expected}, got {actual} (diff {diff})"
    );
}

const BONES: usize = 2;

/// Source pose sits at the origin; each montage offsets every bone along x by its length.
#[derive(Default)]
struct OffsetSampler {
    samples: AtomicUsize,
}

impl PoseSampler for OffsetSampler {
    fn source_pose(&self, _slot: &str) -> Pose {
        Pose::identity(BONES)
    }

    fn sample_montage(&self, montage: &MontageData, _slot: &str, position: f32) -> Pose {
        self.samples.fetch_add(1, Ordering::Relaxed);
        let offset = Vec3::new(montage.length, position, 0.0);
        Pose::new(vec![Transform::from_translation(offset); BONES])
    }
}

fn record(length: f32, slot: &str, weight: f32) -> MontageEvaluationRecord {
    MontageEvaluationRecord {
        instance: MontageInstanceId::next(),
        montage: Arc::new(MontageData::new(format!("m{length}"), length).with_slots([slot])),
        weight,
        desired_weight: 1.0,
        position: 0.0,
        playing: true,
        active: true,
        markers_passed: Vec::new(),
    }
}

fn slot(name: &str, local_weight: f32, global_weight: f32) -> SlotWeightRecord {
    SlotWeightRecord {
        slot: name.to_string(),
        local_weight,
        non_additive_weight: local_weight,
        global_weight,
    }
}

fn additive_record(length: f32, slot: &str, weight: f32) -> MontageEvaluationRecord {
    let montage = MontageData::new(format!("a{length}"), length)
        .with_slots(Vec::<String>::new())
        .with_additive_slots([slot]);
    MontageEvaluationRecord {
        montage: Arc::new(montage),
        ..record(length, slot, weight)
    }
}

#[test]
fn montages_share_the_effective_weight_and_source_takes_the_rest() {
    let snapshot = MontageEvaluationSnapshot::new(
        1,
        vec![record(1.0, "FullBody", 0.5), record(3.0, "FullBody", 0.5)],
        vec![slot("FullBody", 1.0, 0.8)],
    );
    let poses = snapshot.evaluate(&OffsetSampler::default());
    let pose = poses.get("FullBody").expect("slot pose");
    for bone in &pose.bones {
        // 0.2 * 0 + 0.4 * 1 + 0.4 * 3
        assert_approx(bone.translation.x, 1.6);
        assert_approx(bone.scale.x, 1.0);
    }
}

#[test]
fn over_saturated_slot_is_not_clamped() {
    let snapshot = MontageEvaluationSnapshot::new(
        1,
        vec![record(1.0, "FullBody", 0.9), record(3.0, "FullBody", 0.8)],
        vec![slot("FullBody", 1.7, 1.0)],
    );
    assert_approx(snapshot.slot("FullBody").unwrap().effective_weight(), 1.7);
    let pose = snapshot
        .evaluate_slot_named("FullBody", &OffsetSampler::default())
        .unwrap();
    // Source weight is 1 - 1.7 = -0.7.
    assert_approx(pose.bones[0].translation.x, 0.9 + 0.8 * 3.0);
    assert_approx(pose.bones[0].scale.x, 1.0);
}

#[test]
fn silent_slot_passes_the_source_through() {
    let snapshot = MontageEvaluationSnapshot::new(
        1,
        vec![record(1.0, "FullBody", 1.0)],
        vec![slot("FullBody", 1.0, 0.0), slot("UpperBody", 0.0, 1.0)],
    );
    let sampler = OffsetSampler::default();
    let poses = snapshot.evaluate(&sampler);
    assert_eq!(poses.len(), 2);
    assert_eq!(poses.get("FullBody"), Some(&Pose::identity(BONES)));
    assert_eq!(poses.get("UpperBody"), Some(&Pose::identity(BONES)));
    assert_eq!(sampler.samples.load(Ordering::Relaxed), 0);
}

#[test]
fn only_weighted_montages_targeting_the_slot_are_sampled() {
    let snapshot = MontageEvaluationSnapshot::new(
        1,
        vec![
            record(1.0, "FullBody", 1.0),
            record(2.0, "UpperBody", 1.0),
            record(3.0, "FullBody", 0.0),
        ],
        vec![slot("FullBody", 1.0, 1.0)],
    );
    let sampler = OffsetSampler::default();
    let pose = snapshot.evaluate_slot_named("FullBody", &sampler).unwrap();
    assert_eq!(sampler.samples.load(Ordering::Relaxed), 1);
    assert_approx(pose.bones[1].translation.x, 1.0);
    assert!(snapshot.evaluate_slot_named("Legs", &sampler).is_none());
}

#[test]
fn evaluation_is_bit_identical_across_threads() {
    let snapshot = MontageEvaluationSnapshot::new(
        7,
        vec![
            record(1.3, "FullBody", 0.37),
            record(2.9, "FullBody", 0.41),
            record(0.7, "UpperBody", 0.9),
        ],
        vec![slot("FullBody", 0.78, 0.6), slot("UpperBody", 0.9, 1.0)],
    );
    let sampler = OffsetSampler::default();
    let expected = snapshot.evaluate(&sampler);

    let (shared, sampler) = (&snapshot, &sampler);
    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(move || shared.evaluate(sampler)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("evaluate thread"))
            .collect()
    });
    for poses in results {
        assert_eq!(poses, expected);
    }
    assert_eq!(snapshot.frame(), 7);
}

#[test]
fn records_keep_creation_order() {
    let first = record(1.0, "FullBody", 0.5);
    let second = record(2.0, "FullBody", 0.5);
    let ids = [first.instance, second.instance];
    let snapshot = MontageEvaluationSnapshot::new(1, vec![first, second], Vec::new());
    let order: Vec<_> = snapshot.montages().iter().map(|m| m.instance).collect();
    assert_eq!(order, ids);
    assert!(ids[0].get() < ids[1].get());
    assert_approx(snapshot.montage(ids[1]).unwrap().montage.length, 2.0);
}

/// Source pose sits at x = 10, so layering and blending give different results.
struct DisplacedSourceSampler;

impl PoseSampler for DisplacedSourceSampler {
    fn source_pose(&self, _slot: &str) -> Pose {
        Pose::new(vec![Transform::from_translation(Vec3::new(10.0, 0.0, 0.0)); BONES])
    }

    fn sample_montage(&self, montage: &MontageData, _slot: &str, _position: f32) -> Pose {
        Pose::new(vec![Transform::from_translation(Vec3::new(montage.length, 0.0, 0.0)); BONES])
    }
}

#[test]
fn additive_tracks_layer_over_the_blended_base() {
    let mut layered = slot("FullBody", 1.5, 1.0);
    layered.non_additive_weight = 1.0;
    assert_approx(layered.source_weight(), 0.0);
    let snapshot = MontageEvaluationSnapshot::new(
        1,
        vec![record(1.0, "FullBody", 1.0), additive_record(2.0, "FullBody", 0.5)],
        vec![layered],
    );
    let pose = snapshot
        .evaluate_slot_named("FullBody", &DisplacedSourceSampler)
        .unwrap();
    // Base is the full-weight montage at x = 1; the additive adds 2 * 0.5 on top.
    assert_approx(pose.bones[0].translation.x, 2.0);
    assert_approx(pose.bones[0].scale.x, 1.0);
}

#[test]
fn additive_only_slot_layers_over_the_source() {
    let mut layered = slot("FullBody", 0.5, 0.5);
    layered.non_additive_weight = 0.0;
    assert_approx(layered.source_weight(), 1.0);
    let snapshot = MontageEvaluationSnapshot::new(
        1,
        vec![additive_record(2.0, "FullBody", 0.5)],
        vec![layered],
    );
    let sampler = OffsetSampler::default();
    let pose = snapshot
        .evaluate_slot_named("FullBody", &DisplacedSourceSampler)
        .unwrap();
    // 10 + 2 * (0.5 * 0.5); blending would have pulled the source toward x = 2 instead.
    assert_approx(pose.bones[0].translation.x, 10.5);
    assert_approx(pose.bones[1].scale.y, 1.0);

    snapshot.evaluate_slot_named("FullBody", &sampler).unwrap();
    assert_eq!(sampler.samples.load(Ordering::Relaxed), 1);
}

#[test]
fn curves_are_looked_up_by_name() {
    let snapshot = MontageEvaluationSnapshot::new(1, Vec::new(), Vec::new())
        .with_curves(vec![("blink".to_string(), 0.25)]);
    assert_eq!(snapshot.curve("blink"), Some(0.25));
    assert_eq!(snapshot.curve("jaw"), None);
    assert_eq!(snapshot.curves().len(), 1);
}
