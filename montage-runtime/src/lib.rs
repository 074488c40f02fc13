//! Montage playback and slot blending runtime for skeletal pose graphs.
//!
//! The runtime is driven once per frame in three phases: `update` (may run on a worker
//! thread), `evaluate` (read-only, over an immutable snapshot) and `post_update` (owning
//! thread, dispatches notifies and montage events). The pose graph and pose sampling are
//! supplied by the host through the [`PoseGraph`] and [`PoseSampler`] traits.

#![forbid(unsafe_code)]

mod config;
mod error;
mod ids;
mod math;
mod model;
mod runtime;

#[cfg(feature = "json")]
pub mod json;

pub use config::*;
pub use error::*;
pub use ids::*;
pub use math::*;
pub use model::*;
pub use runtime::*;


#[cfg(test)]
mod math_tests;
