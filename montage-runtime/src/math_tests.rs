use crate::{Pose, Transform};
use glam::{Quat, Vec3};

fn assert_approx(actual: f32, expected: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= 1.0e-5,
        "expected {expected}, got {actual} (diff {diff})"
    );
}

#[test]
fn compose_with_inverse_is_identity() {
    let t = Transform::new(
        Vec3::new(1.0, 2.0, 3.0),
        Quat::from_rotation_z(0.5),
        Vec3::ONE,
    );
    assert!(t.compose(&t.inverse()).is_identity(1.0e-5));
    assert!(t.inverse().compose(&t).is_identity(1.0e-5));
}

#[test]
fn relative_to_recovers_the_applied_delta() {
    let base = Transform::new(Vec3::new(4.0, 0.0, 1.0), Quat::from_rotation_y(1.2), Vec3::ONE);
    let delta = Transform::new(Vec3::new(0.0, 1.0, 0.0), Quat::from_rotation_x(0.3), Vec3::ONE);
    let moved = base.compose(&delta);
    let recovered = moved.relative_to(&base);

    assert!(recovered.translation.abs_diff_eq(delta.translation, 1.0e-5));
    assert_approx(recovered.rotation.dot(delta.rotation).abs(), 1.0);
}

#[test]
fn accumulation_takes_the_shortest_rotation() {
    let q = Quat::from_rotation_z(0.8);
    let mut sum = Transform::ZERO;
    sum.accumulate_weighted(&Transform::from_rotation(q), 0.5);
    sum.accumulate_weighted(&Transform::from_rotation(-q), 0.5);
    sum.normalize_rotation();

    assert_approx(sum.rotation.dot(q), 1.0);
    assert!(sum.scale.abs_diff_eq(Vec3::ONE, 1.0e-6));
}

#[test]
fn zero_rotation_normalizes_to_identity() {
    let mut t = Transform::ZERO;
    t.normalize_rotation();
    assert_eq!(t.rotation, Quat::IDENTITY);
}

#[test]
fn lerp_halfway_mixes_translation_and_rotation() {
    let a = Transform::IDENTITY;
    let b = Transform::new(Vec3::new(2.0, 0.0, 0.0), Quat::from_rotation_z(1.0), Vec3::splat(3.0));
    let mid = a.lerp(&b, 0.5);
    assert_approx(mid.translation.x, 1.0);
    assert_approx(mid.scale.x, 2.0);
    assert_approx(mid.rotation.dot(Quat::from_rotation_z(0.5)).abs(), 1.0);
}

#[test]
fn pose_accumulation_falls_back_for_missing_bones() {
    let fallback = Pose::new(vec![
        Transform::from_translation(Vec3::X),
        Transform::from_translation(Vec3::Y),
    ]);
    let partial = Pose::new(vec![Transform::from_translation(Vec3::Z)]);

    let mut out = Pose::zeroed(2);
    out.accumulate_weighted(&partial, &fallback, 1.0);
    out.normalize_rotations();

    assert!(out.bones[0].translation.abs_diff_eq(Vec3::Z, 1.0e-6));
    assert!(out.bones[1].translation.abs_diff_eq(Vec3::Y, 1.0e-6));
    assert_eq!(out.len(), 2);
    assert!(Pose::identity(0).is_empty());
}

#[test]
fn additive_layer_scales_the_delta_by_weight() {
    let base = Transform::new(Vec3::new(1.0, 0.0, 0.0), Quat::IDENTITY, Vec3::splat(2.0));
    let delta = Transform::new(
        Vec3::new(0.0, 4.0, 0.0),
        Quat::from_rotation_z(1.0),
        Vec3::splat(3.0),
    );

    let half = base.apply_additive(&delta, 0.5);
    assert_approx(half.translation.x, 1.0);
    assert_approx(half.translation.y, 2.0);
    assert_approx(half.scale.x, 4.0);
    assert_approx(half.rotation.angle_between(Quat::from_rotation_z(0.5)), 0.0);

    let none = base.apply_additive(&delta, 0.0);
    assert!(none.translation.abs_diff_eq(base.translation, 1.0e-6));
    assert!(none.scale.abs_diff_eq(base.scale, 1.0e-6));
}

#[test]
fn additive_pose_leaves_bones_it_lacks() {
    let mut pose = Pose::new(vec![Transform::IDENTITY; 2]);
    let delta = Pose::new(vec![Transform::from_translation(Vec3::X)]);
    pose.apply_additive(&delta, 1.0);
    assert_approx(pose.bones[0].translation.x, 1.0);
    assert_approx(pose.bones[1].translation.x, 0.0);
}
