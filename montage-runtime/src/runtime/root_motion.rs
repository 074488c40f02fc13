use crate::{MontageInstanceId, Transform, WEIGHT_EPSILON};

#[derive(Clone, Debug, PartialEq)]
pub struct RootMotionBlendRequest {
    pub transform: Transform,
    pub slot: String,
    pub weight: f32,
    pub source: MontageInstanceId,
}

/// Requests queued during Update, drained by PostUpdate.
#[derive(Clone, Debug, Default)]
pub struct RootMotionBlendQueue {
    requests: Vec<RootMotionBlendRequest>,
}

impl RootMotionBlendQueue {
    pub fn push(&mut self, request: RootMotionBlendRequest) {
        self.requests.push(request);
    }

    pub fn clear(&mut self) {
        self.requests.clear();
    }

    pub fn requests(&self) -> &[RootMotionBlendRequest] {
        &self.requests
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, RootMotionBlendRequest> {
        self.requests.drain(..)
    }
}

/// Folds weighted root-motion deltas into one transform per frame and keeps the result until
/// it is consumed. Frames that are not consumed compose onto each other.
#[derive(Clone, Debug)]
pub struct RootMotionAccumulator {
    frame: Transform,
    frame_weight: f32,
    pending: Transform,
    has_root_motion: bool,
}

impl Default for RootMotionAccumulator {
    fn default() -> Self {
        Self {
            frame: Transform::ZERO,
            frame_weight: 0.0,
            pending: Transform::IDENTITY,
            has_root_motion: false,
        }
    }
}

impl RootMotionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accumulate(&mut self, request: &RootMotionBlendRequest) {
        self.accumulate_with_blend(&request.transform, request.weight);
    }

    pub fn accumulate_with_blend(&mut self, transform: &Transform, weight: f32) {
        if weight.is_nan() || weight <= WEIGHT_EPSILON {
            return;
        }
        self.frame.accumulate_weighted(transform, weight);
        self.frame_weight += weight;
    }

    /// Fills the weight missing up to 1 with identity and commits the frame.
    pub fn make_up_to_full_weight(&mut self) {
        if self.frame_weight <= 0.0 {
            return;
        }
        if self.frame_weight < 1.0 {
            self.frame
                .accumulate_weighted(&Transform::IDENTITY, 1.0 - self.frame_weight);
        }
        self.frame.normalize_rotation();
        self.pending = self.pending.compose(&self.frame);
        self.has_root_motion = true;
        self.frame = Transform::ZERO;
        self.frame_weight = 0.0;
    }

    pub fn has_root_motion(&self) -> bool {
        self.has_root_motion
    }

    pub fn peek(&self) -> Transform {
        self.pending
    }

    /// Returns identity blended toward the accumulated motion by `alpha`, then clears.
    pub fn consume(&mut self, alpha: f32) -> Transform {
        let pending = std::mem::replace(&mut self.pending, Transform::IDENTITY);
        let had_motion = std::mem::replace(&mut self.has_root_motion, false);
        if !had_motion || alpha.is_nan() || alpha < WEIGHT_EPSILON {
            return Transform::IDENTITY;
        }
        if alpha >= 1.0 - WEIGHT_EPSILON {
            return pending;
        }
        Transform::IDENTITY.lerp(&pending, alpha)
    }
}
