use super::{MontageInstance, NativeBindings, SlotWeightTracker, StateChange};

/// Everything the pose graph may touch during its Update.
pub struct GraphUpdateContext<'a> {
    pub delta_time: f32,
    pub slots: &'a mut SlotWeightTracker,
    pub bindings: &'a mut NativeBindings,
    pub montages: &'a [MontageInstance],
}

impl GraphUpdateContext<'_> {
    /// Called by a slot node with its own weight in the graph.
    pub fn set_slot_weight(&mut self, slot: &str, weight: f32) {
        self.slots.set_global_weight(slot, weight);
    }

    pub fn slot_local_weight(&self, slot: &str) -> f32 {
        self.slots.local_weight(slot)
    }

    /// Host override for a transition rule; `None` means the graph decides.
    pub fn can_take_transition(&mut self, machine: &str, from: &str, to: &str) -> Option<bool> {
        self.bindings.can_take_transition(machine, from, to)
    }

    /// Reports a completed state change so the exit and entry hooks run.
    pub fn change_state(&mut self, machine: &str, from: &str, to: &str) {
        let change = StateChange {
            machine,
            previous_state: from,
            next_state: to,
        };
        self.bindings.state_exited(&change);
        self.bindings.state_entered(&change);
    }
}

/// The host pose graph, as far as montage blending is concerned.
pub trait PoseGraph: Send {
    fn update(&mut self, ctx: &mut GraphUpdateContext<'_>);
}

/// Graph with a single layer: every registered slot runs at full weight.
#[derive(Clone, Copy, Debug, Default)]
pub struct FullWeightGraph;

impl PoseGraph for FullWeightGraph {
    fn update(&mut self, ctx: &mut GraphUpdateContext<'_>) {
        let slots: Vec<String> = ctx.slots.slot_names().map(str::to_string).collect();
        for slot in slots {
            ctx.set_slot_weight(&slot, 1.0);
        }
    }
}
