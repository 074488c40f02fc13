use crate::runtime::MontageInstance;
use crate::{
    BlendCurve, CompositeSection, Error, MontageData, NotifyEvent, RootMotionKey,
    RootMotionTrack, SyncMarker, Transform,
};
use glam::Vec3;
use std::sync::Arc;

fn assert_approx(actual: f32, expected: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= 1.0e-5,
        "expected {expected}, got {actual} (diff {diff})"
    );
}

fn instance(montage: MontageData) -> MontageInstance {
    MontageInstance::new(Arc::new(montage), BlendCurve::Linear)
}

fn three_sections(length: f32) -> MontageData {
    MontageData::new("combo", length)
        .with_blend_times(0.0, 0.25)
        .with_sections(vec![
            CompositeSection::new("windup", 0.0),
            CompositeSection::new("swing", 1.0),
            CompositeSection::new("recover", 2.0),
        ])
}

#[test]
fn blend_in_is_linear_by_default() {
    let mut inst = instance(MontageData::new("wave", 2.0).with_blend_times(0.2, 0.2));
    inst.play(1.0);
    assert_approx(inst.weight(), 0.0);
    assert_approx(inst.desired_weight(), 1.0);

    assert!(!inst.update_weight(0.1));
    assert_approx(inst.weight(), 0.5);
    assert!(!inst.update_weight(0.1));
    assert_approx(inst.weight(), 1.0);
    assert_approx(inst.previous_weight(), 0.5);
}

#[test]
fn eased_curve_changes_the_intermediate_weight_only() {
    let mut montage = MontageData::new("wave", 2.0).with_blend_times(0.2, 0.2);
    montage.blend_curve = Some(BlendCurve::EaseIn);
    let mut inst = MontageInstance::new(Arc::new(montage), BlendCurve::Linear);
    inst.play(1.0);
    inst.update_weight(0.1);
    assert_approx(inst.weight(), 0.25);
    inst.update_weight(0.1);
    assert_approx(inst.weight(), 1.0);
}

#[test]
fn blend_out_completes_within_ceil_of_duration_over_delta() {
    for (blend_out, delta) in [(0.2f32, 0.1f32), (0.25, 1.0 / 60.0), (0.5, 0.12), (0.3, 0.1)] {
        let mut inst = instance(MontageData::new("fade", 5.0).with_blend_times(0.0, blend_out));
        inst.play(1.0);
        inst.force_weight_for_tests(0.01, 1.0);
        assert!(inst.stop(blend_out, true));

        let updates = (blend_out / delta).ceil() as usize;
        for step in 0..updates {
            assert!(inst.is_active(), "removed early at step {step} ({blend_out}/{delta})");
            inst.update_weight(delta);
        }
        assert!(!inst.is_active(), "still active after {updates} updates ({blend_out}/{delta})");
        assert!(inst.is_blend_complete());

        assert!(inst.update_weight(delta));
        assert!(!inst.is_active());
        assert_approx(inst.weight(), 0.0);
    }
}

#[test]
fn stop_is_cooperative_and_repeated_stops_only_shorten() {
    let mut inst = instance(MontageData::new("fade", 5.0).with_blend_times(0.0, 1.0));
    inst.play(1.0);
    assert_approx(inst.weight(), 1.0);

    assert!(inst.stop(1.0, true));
    assert_approx(inst.desired_weight(), 0.0);
    assert!(inst.is_active());
    assert!(inst.is_blending_out());
    assert!(inst.was_interrupted());

    inst.update_weight(0.5);
    assert_approx(inst.weight(), 0.5);

    assert!(!inst.stop(2.0, true));
    inst.update_weight(0.25);
    assert_approx(inst.weight(), 0.25);

    assert!(!inst.stop(0.0, true));
    assert_approx(inst.weight(), 0.0);
    assert!(!inst.is_playing());
    assert!(inst.update_weight(0.0));
}

#[test]
fn set_desired_weight_uses_blend_out_time_when_lowering() {
    let mut inst = instance(MontageData::new("lean", 5.0).with_blend_times(0.0, 0.4));
    inst.play(1.0);
    inst.set_desired_weight(0.5);
    inst.update_weight(0.2);
    assert_approx(inst.weight(), 0.75);
    inst.update_weight(0.2);
    assert_approx(inst.weight(), 0.5);
    assert!(inst.is_active());
}

#[test]
fn advance_scales_by_play_rate_and_is_a_no_op_when_paused() {
    let mut inst = instance(MontageData::new("run", 2.0).with_blend_times(0.0, 0.25));
    inst.play(2.0);
    inst.advance(0.25);
    assert_approx(inst.position(), 0.5);

    inst.pause();
    let outcome = inst.advance(0.25);
    assert_approx(inst.position(), 0.5);
    assert!(outcome.markers.is_empty());
    assert!(!outcome.auto_blend_out);

    inst.resume();
    inst.set_play_rate(1.0);
    inst.advance(0.25);
    assert_approx(inst.position(), 0.75);
}

#[test]
fn markers_are_reported_earliest_first() {
    let montage = MontageData::new("steps", 2.0)
        .with_blend_times(0.0, 0.25)
        .with_marker(SyncMarker::new("b", 0.3))
        .with_marker(SyncMarker::new("late", 0.9))
        .with_marker(SyncMarker::new("a", 0.1));
    let mut inst = instance(montage);
    inst.play(1.0);

    let names = |outcome: &crate::runtime::AdvanceOutcome| {
        outcome
            .markers
            .iter()
            .map(|m| m.name.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(names(&inst.advance(0.5)), ["a", "b"]);
    assert_eq!(names(&inst.advance(0.5)), ["late"]);
}

#[test]
fn reverse_play_reports_markers_in_traversal_order() {
    let montage = MontageData::new("steps", 2.0)
        .with_blend_times(0.0, 0.25)
        .with_marker(SyncMarker::new("left", 0.6))
        .with_marker(SyncMarker::new("right", 0.9));
    let mut inst = instance(montage);
    inst.play(-1.0);
    inst.set_position(1.0);

    let outcome = inst.advance(0.5);
    assert_approx(inst.position(), 0.5);
    let names: Vec<_> = outcome.markers.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, ["right", "left"]);
}

#[test]
fn self_linked_section_loops() {
    let montage = MontageData::new("loop", 2.0)
        .with_blend_times(0.0, 0.25)
        .with_sections(vec![
            CompositeSection::new("intro", 0.0).with_next("loop"),
            CompositeSection::new("loop", 1.0).with_next("loop"),
        ]);
    let mut inst = instance(montage);
    inst.play(1.0);

    inst.advance(1.5);
    assert_approx(inst.position(), 1.5);
    assert_eq!(inst.current_section(), Some("loop"));

    for _ in 0..10 {
        let outcome = inst.advance(1.0);
        assert!(!outcome.auto_blend_out);
    }
    assert_approx(inst.position(), 1.5);
    assert!(inst.is_playing());
    assert!(!inst.is_blending_out());
}

#[test]
fn final_section_blends_out_automatically_then_stops_at_the_end() {
    let mut inst = instance(MontageData::new("once", 1.0).with_blend_times(0.0, 0.25));
    inst.play(1.0);

    let outcome = inst.advance(0.8);
    assert!(outcome.auto_blend_out);
    assert!(inst.is_blending_out());
    assert!(!inst.was_interrupted());
    assert!(inst.is_playing());

    let outcome = inst.advance(0.5);
    assert!(outcome.auto_blend_out);
    assert_approx(inst.position(), 1.0);
    assert!(!inst.is_playing());
}

#[test]
fn explicit_trigger_time_overrides_blend_out() {
    let mut montage = MontageData::new("once", 2.0).with_blend_times(0.0, 0.25);
    montage.blend_out_trigger_time = Some(1.0);
    let mut inst = instance(montage);
    inst.play(1.0);

    assert!(!inst.advance(0.9).auto_blend_out);
    assert!(inst.advance(0.2).auto_blend_out);
    assert!(inst.is_blending_out());
}

#[test]
fn unknown_section_jump_leaves_state_unchanged() {
    let mut inst = instance(three_sections(3.0));
    inst.play(1.0);
    inst.advance(0.5);

    let err = inst.jump_to_section("missing").unwrap_err();
    assert!(matches!(err, Error::InvalidSection { ref section, .. } if section == "missing"));
    assert_approx(inst.position(), 0.5);
    assert_eq!(inst.current_section(), Some("windup"));

    assert!(inst.jump_to_section_end("missing").is_err());
    assert_approx(inst.position(), 0.5);
}

#[test]
fn section_jumps_land_on_start_and_just_before_end() {
    let mut inst = instance(three_sections(3.0));
    inst.play(1.0);

    inst.jump_to_section("recover").unwrap();
    assert_approx(inst.position(), 2.0);
    assert_eq!(inst.current_section(), Some("recover"));

    inst.jump_to_section_end("swing").unwrap();
    assert_approx(inst.position(), 2.0 - 1.0e-4);
    assert_eq!(inst.current_section(), Some("swing"));
}

#[test]
fn jump_while_blending_out_plays_again() {
    let mut inst = instance(three_sections(3.0));
    inst.play(1.0);
    inst.stop(0.5, true);
    assert!(inst.is_blending_out());

    inst.jump_to_section("swing").unwrap();
    assert!(!inst.is_blending_out());
    assert!(inst.is_playing());
    assert_approx(inst.desired_weight(), 1.0);
}

#[test]
fn set_next_section_relinks_playback() {
    let mut inst = instance(three_sections(3.0));
    inst.play(1.0);
    assert_eq!(inst.next_section("windup"), None);

    inst.set_next_section("windup", Some("recover")).unwrap();
    assert_eq!(inst.next_section("windup"), Some("recover"));

    inst.advance(1.25);
    assert_approx(inst.position(), 2.25);
    assert_eq!(inst.current_section(), Some("recover"));

    assert!(matches!(
        inst.set_next_section("windup", Some("nowhere")),
        Err(Error::InvalidSection { .. })
    ));
    assert_eq!(inst.next_section("windup"), Some("recover"));
}

#[test]
fn one_shots_fire_once_and_states_fire_while_overlapping() {
    let montage = MontageData::new("swing", 2.0)
        .with_blend_times(0.0, 0.25)
        .with_notify(NotifyEvent::one_shot("hit", 0.5))
        .with_notify(NotifyEvent::state("trail", 0.2, 0.6));
    let mut inst = instance(montage);
    inst.play(1.0);

    let names = |inst: &mut MontageInstance, delta: f32| {
        inst.advance(delta)
            .notifies
            .iter()
            .map(|n| n.name.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(names(&mut inst, 0.3), ["trail"]);
    assert_eq!(names(&mut inst, 0.3), ["hit", "trail"]);
    assert_eq!(names(&mut inst, 0.5), ["trail"]);
    assert!(names(&mut inst, 0.5).is_empty());
}

#[test]
fn root_motion_is_extracted_per_advance() {
    let track = RootMotionTrack::new(vec![
        RootMotionKey {
            time: 0.0,
            transform: Transform::IDENTITY,
        },
        RootMotionKey {
            time: 2.0,
            transform: Transform::from_translation(Vec3::new(4.0, 0.0, 0.0)),
        },
    ]);
    let montage = MontageData::new("dash", 2.0)
        .with_blend_times(0.0, 0.25)
        .with_root_motion(track);
    let mut inst = instance(montage);
    inst.play(1.0);

    let outcome = inst.advance(0.5);
    let motion = outcome.root_motion.expect("root motion");
    assert_approx(motion.translation.x, 1.0);

    assert!(inst.advance_with(0.5, false).root_motion.is_none());
    assert_approx(inst.position(), 1.0);
}

#[test]
fn follower_without_shared_markers_takes_the_leader_position_and_rate() {
    let mut leader = instance(three_sections(3.0));
    leader.play(1.5);
    leader.set_next_section("swing", Some("swing")).unwrap();
    leader.advance(0.8);

    let mut follower = instance(three_sections(3.0));
    follower.play(1.0);
    follower.advance(0.1);

    follower.sync_to_leader(&leader.sync_leader_state());
    assert_approx(follower.position(), 1.2);
    assert_approx(follower.play_rate(), 1.5);
    assert_eq!(follower.current_section(), Some("swing"));
    assert_eq!(follower.next_section("swing"), Some("swing"));
}

#[test]
fn follower_sharing_markers_realigns_only_on_crossings() {
    let mut leader = instance(
        MontageData::new("walk", 1.0)
            .with_blend_times(0.0, 0.25)
            .with_marker(SyncMarker::new("left_foot", 0.5)),
    );
    let mut follower = instance(
        MontageData::new("walk_upper", 4.0)
            .with_blend_times(0.0, 0.25)
            .with_marker(SyncMarker::new("left_foot", 2.0)),
    );
    leader.play(1.0);
    follower.play(1.0);

    leader.advance(0.4);
    follower.advance(0.3);
    let mut state = leader.sync_leader_state();
    follower.sync_to_leader(&state);
    assert_approx(follower.position(), 0.3);

    state.markers = leader.advance(0.2).markers;
    follower.advance(0.2);
    state.position = leader.position();
    follower.sync_to_leader(&state);
    assert_approx(follower.position(), 2.1);
}

#[test]
fn zero_blend_out_at_the_end_snaps_weight_inside_advance() {
    let mut inst = instance(MontageData::new("cut", 1.0).with_blend_times(0.0, 0.0));
    inst.play(1.0);
    assert_approx(inst.weight(), 1.0);

    let outcome = inst.advance(1.0);
    assert!(outcome.auto_blend_out);
    assert_approx(inst.weight(), 0.0);
    assert!(inst.is_active());
    assert!(inst.update_weight(0.1));
}
