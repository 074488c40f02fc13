use super::{MontageInstance, SlotWeightTracker};

/// State machine transition observed by entry/exit hooks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateChange<'a> {
    pub machine: &'a str,
    pub previous_state: &'a str,
    pub next_state: &'a str,
}

/// Read-only view handed to native update hooks once the pose graph has updated.
pub struct UpdateHookContext<'a> {
    pub delta_time: f32,
    pub montages: &'a [MontageInstance],
    pub slots: &'a SlotWeightTracker,
}

pub type TransitionHook = Box<dyn FnMut() -> bool + Send>;
pub type StateHook = Box<dyn FnMut(&StateChange<'_>) + Send>;
pub type UpdateHook = Box<dyn FnMut(&UpdateHookContext<'_>) + Send>;

struct TransitionBinding {
    machine: String,
    previous_state: String,
    next_state: String,
    name: String,
    hook: TransitionHook,
}

struct StateBinding {
    machine: String,
    state: String,
    name: String,
    hook: StateHook,
}

struct NamedUpdateHook {
    name: String,
    hook: UpdateHook,
}

/// Host hooks on state machine transitions and state entry/exit, keyed by machine and state
/// names. Travels with the frame state, so every hook is `Send`.
#[derive(Default)]
pub struct NativeBindings {
    transitions: Vec<TransitionBinding>,
    entries: Vec<StateBinding>,
    exits: Vec<StateBinding>,
    update_hooks: Vec<NamedUpdateHook>,
}

impl std::fmt::Debug for NativeBindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeBindings")
            .field("transitions", &self.transitions.len())
            .field("entries", &self.entries.len())
            .field("exits", &self.exits.len())
            .field("update_hooks", &self.update_hooks.len())
            .finish()
    }
}

impl NativeBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any binding already registered for the same transition.
    pub fn add_transition_binding<F>(
        &mut self,
        machine: &str,
        previous_state: &str,
        next_state: &str,
        name: &str,
        hook: F,
    ) where
        F: FnMut() -> bool + Send + 'static,
    {
        self.transitions.retain(|b| {
            !(b.machine == machine && b.previous_state == previous_state && b.next_state == next_state)
        });
        self.transitions.push(TransitionBinding {
            machine: machine.to_string(),
            previous_state: previous_state.to_string(),
            next_state: next_state.to_string(),
            name: name.to_string(),
            hook: Box::new(hook),
        });
    }

    /// Name of the binding registered for this transition, if any.
    pub fn has_transition_binding(
        &self,
        machine: &str,
        previous_state: &str,
        next_state: &str,
    ) -> Option<&str> {
        self.transitions
            .iter()
            .find(|b| {
                b.machine == machine && b.previous_state == previous_state && b.next_state == next_state
            })
            .map(|b| b.name.as_str())
    }

    /// Runs the transition hook. `None` when no hook is bound and the graph rule applies.
    pub fn can_take_transition(
        &mut self,
        machine: &str,
        previous_state: &str,
        next_state: &str,
    ) -> Option<bool> {
        self.transitions
            .iter_mut()
            .find(|b| {
                b.machine == machine && b.previous_state == previous_state && b.next_state == next_state
            })
            .map(|b| (b.hook)())
    }

    pub fn add_state_entry_binding<F>(&mut self, machine: &str, state: &str, name: &str, hook: F)
    where
        F: FnMut(&StateChange<'_>) + Send + 'static,
    {
        push_state_binding(&mut self.entries, machine, state, name, Box::new(hook));
    }

    pub fn add_state_exit_binding<F>(&mut self, machine: &str, state: &str, name: &str, hook: F)
    where
        F: FnMut(&StateChange<'_>) + Send + 'static,
    {
        push_state_binding(&mut self.exits, machine, state, name, Box::new(hook));
    }

    pub fn has_state_entry_binding(&self, machine: &str, state: &str) -> Option<&str> {
        find_state_binding(&self.entries, machine, state)
    }

    pub fn has_state_exit_binding(&self, machine: &str, state: &str) -> Option<&str> {
        find_state_binding(&self.exits, machine, state)
    }

    /// Runs entry hooks bound to `change.next_state`. Returns how many ran.
    pub fn state_entered(&mut self, change: &StateChange<'_>) -> usize {
        run_state_bindings(&mut self.entries, change.machine, change.next_state, change)
    }

    /// Runs exit hooks bound to `change.previous_state`. Returns how many ran.
    pub fn state_exited(&mut self, change: &StateChange<'_>) -> usize {
        run_state_bindings(&mut self.exits, change.machine, change.previous_state, change)
    }

    pub fn add_update_hook<F>(&mut self, name: &str, hook: F)
    where
        F: FnMut(&UpdateHookContext<'_>) + Send + 'static,
    {
        self.update_hooks.push(NamedUpdateHook {
            name: name.to_string(),
            hook: Box::new(hook),
        });
    }

    pub fn update_hook_names(&self) -> impl Iterator<Item = &str> {
        self.update_hooks.iter().map(|h| h.name.as_str())
    }

    pub(crate) fn run_update_hooks(&mut self, ctx: &UpdateHookContext<'_>) {
        for hook in &mut self.update_hooks {
            log::trace!("running update hook '{}'", hook.name);
            (hook.hook)(ctx);
        }
    }
}

fn push_state_binding(
    bindings: &mut Vec<StateBinding>,
    machine: &str,
    state: &str,
    name: &str,
    hook: StateHook,
) {
    bindings.push(StateBinding {
        machine: machine.to_string(),
        state: state.to_string(),
        name: name.to_string(),
        hook,
    });
}

fn find_state_binding<'a>(bindings: &'a [StateBinding], machine: &str, state: &str) -> Option<&'a str> {
    bindings
        .iter()
        .find(|b| b.machine == machine && b.state == state)
        .map(|b| b.name.as_str())
}

fn run_state_bindings(
    bindings: &mut [StateBinding],
    machine: &str,
    state: &str,
    change: &StateChange<'_>,
) -> usize {
    let mut ran = 0;
    for binding in bindings
        .iter_mut()
        .filter(|b| b.machine == machine && b.state == state)
    {
        (binding.hook)(change);
        ran += 1;
    }
    ran
}
