use crate::{BlendCurve, Error};

/// Which montages feed the root-motion accumulator.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum RootMotionMode {
    /// Root motion is left in the pose and never extracted.
    NoExtraction,
    /// Extracted from the pose but discarded.
    IgnoreRootMotion,
    /// Every contributing montage, weighted by montage weight and slot global weight.
    RootMotionFromEverything,
    /// Montages only, weighted by montage weight.
    #[default]
    RootMotionFromMontagesOnly,
}

impl RootMotionMode {
    pub(crate) fn extracts(self) -> bool {
        !matches!(self, RootMotionMode::NoExtraction)
    }

    pub(crate) fn queues_requests(self) -> bool {
        matches!(
            self,
            RootMotionMode::RootMotionFromEverything | RootMotionMode::RootMotionFromMontagesOnly
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeConfig {
    /// Seed of the notify trigger-chance stream. Same seed, same sequence of drops.
    pub notify_seed: u64,
    /// Headless instances drop client-only notifies.
    pub dedicated_server: bool,
    pub root_motion_mode: RootMotionMode,
    /// Used by montages that do not carry their own blend curve.
    pub default_blend_curve: BlendCurve,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            notify_seed: 0,
            dedicated_server: false,
            root_motion_mode: RootMotionMode::default(),
            default_blend_curve: BlendCurve::Linear,
        }
    }
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<(), Error> {
        self.default_blend_curve.validate()
    }

    #[cfg(feature = "json")]
    pub fn from_json_str(s: &str) -> Result<Self, Error> {
        crate::json::runtime_config_from_json_str(s)
    }
}
