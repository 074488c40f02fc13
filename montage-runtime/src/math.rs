use glam::{Quat, Vec3};

const SCALE_EPSILON: f32 = 1.0e-8;

/// Translation, rotation and scale of one bone (or of the root-motion delta).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Additive zero used as the starting point of a weighted accumulation.
    pub const ZERO: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::from_xyzw(0.0, 0.0, 0.0, 0.0),
        scale: Vec3::ZERO,
    };

    pub fn new(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    pub fn from_rotation(rotation: Quat) -> Self {
        Self {
            rotation,
            ..Self::IDENTITY
        }
    }

    pub fn is_identity(&self, tolerance: f32) -> bool {
        self.translation.abs_diff_eq(Vec3::ZERO, tolerance)
            && self.scale.abs_diff_eq(Vec3::ONE, tolerance)
            && (self.rotation.dot(Quat::IDENTITY).abs() - 1.0).abs() <= tolerance
    }

    /// Applies `other` in the local space of `self`.
    pub fn compose(&self, other: &Transform) -> Transform {
        Transform {
            translation: self.translation + self.rotation * (self.scale * other.translation),
            rotation: (self.rotation * other.rotation).normalize(),
            scale: self.scale * other.scale,
        }
    }

    pub fn inverse(&self) -> Transform {
        let inv_scale = Vec3::new(
            safe_recip(self.scale.x),
            safe_recip(self.scale.y),
            safe_recip(self.scale.z),
        );
        let inv_rotation = self.rotation.inverse();
        Transform {
            translation: inv_scale * (inv_rotation * -self.translation),
            rotation: inv_rotation,
            scale: inv_scale,
        }
    }

    /// Delta that takes `base` to `self`, expressed in the space of `base`.
    pub fn relative_to(&self, base: &Transform) -> Transform {
        base.inverse().compose(self)
    }

    pub fn lerp(&self, other: &Transform, alpha: f32) -> Transform {
        Transform {
            translation: self.translation.lerp(other.translation, alpha),
            rotation: self.rotation.slerp(other.rotation, alpha),
            scale: self.scale.lerp(other.scale, alpha),
        }
    }

    /// Adds `other * weight` component-wise, flipping the rotation onto the same hemisphere
    /// as the running sum so the blend takes the shortest path.
    pub fn accumulate_weighted(&mut self, other: &Transform, weight: f32) {
        self.translation += other.translation * weight;
        self.scale += other.scale * weight;
        let rotation = if self.rotation.dot(other.rotation) < 0.0 {
            -other.rotation
        } else {
            other.rotation
        };
        self.rotation = self.rotation + rotation * weight;
    }

    /// Layers a local-space delta (relative to identity) on top of `self`, scaled by `weight`.
    pub fn apply_additive(&self, additive: &Transform, weight: f32) -> Transform {
        let rotation = Quat::IDENTITY.slerp(additive.rotation, weight);
        Transform {
            translation: self.translation + additive.translation * weight,
            rotation: (rotation * self.rotation).normalize(),
            scale: self.scale * Vec3::ONE.lerp(additive.scale, weight),
        }
    }

    pub fn normalize_rotation(&mut self) {
        if self.rotation.length_squared() <= SCALE_EPSILON {
            self.rotation = Quat::IDENTITY;
        } else {
            self.rotation = self.rotation.normalize();
        }
    }
}

fn safe_recip(value: f32) -> f32 {
    if value.abs() <= SCALE_EPSILON {
        0.0
    } else {
        1.0 / value
    }
}

/// Local-space bone transforms for one slot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pose {
    pub bones: Vec<Transform>,
}

impl Pose {
    pub fn new(bones: Vec<Transform>) -> Self {
        Self { bones }
    }

    pub fn identity(bone_count: usize) -> Self {
        Self {
            bones: vec![Transform::IDENTITY; bone_count],
        }
    }

    pub(crate) fn zeroed(bone_count: usize) -> Self {
        Self {
            bones: vec![Transform::ZERO; bone_count],
        }
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    /// Accumulates `other * weight`. Bones missing from `other` take `fallback`'s transform.
    pub(crate) fn accumulate_weighted(&mut self, other: &Pose, fallback: &Pose, weight: f32) {
        for (index, bone) in self.bones.iter_mut().enumerate() {
            let source = other
                .bones
                .get(index)
                .or_else(|| fallback.bones.get(index))
                .copied()
                .unwrap_or(Transform::IDENTITY);
            bone.accumulate_weighted(&source, weight);
        }
    }

    /// Layers `additive` bone by bone. Bones the additive pose lacks are left alone.
    pub(crate) fn apply_additive(&mut self, additive: &Pose, weight: f32) {
        for (bone, delta) in self.bones.iter_mut().zip(&additive.bones) {
            *bone = bone.apply_additive(delta, weight);
        }
    }

    pub(crate) fn normalize_rotations(&mut self) {
        for bone in &mut self.bones {
            bone.normalize_rotation();
        }
    }
}
