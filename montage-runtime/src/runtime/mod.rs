mod bindings;
mod context;
mod events;
mod graph;
mod montage_instance;
mod notify_queue;
mod root_motion;
mod slot_weights;
mod snapshot;
mod worker;

pub use bindings::*;
pub use context::*;
pub use events::{
    MontageEvent, MontageEventHandler, MontageEventKind, NotifyDispatch, NotifyHandler,
    NotifyPhase, PostUpdateReport,
};
pub use graph::*;
pub use montage_instance::*;
pub use notify_queue::*;
pub use root_motion::*;
pub use slot_weights::*;
pub use snapshot::*;
pub use worker::*;

#[cfg(test)]
mod montage_instance_tests;




#[cfg(test)]
mod snapshot_tests;

#[cfg(test)]
mod bindings_tests;
