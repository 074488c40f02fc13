use crate::runtime::{NativeBindings, StateChange};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn change<'a>(machine: &'a str, from: &'a str, to: &'a str) -> StateChange<'a> {
    StateChange {
        machine,
        previous_state: from,
        next_state: to,
    }
}

#[test]
fn unbound_transition_defers_to_the_graph() {
    let mut bindings = NativeBindings::new();
    assert_eq!(bindings.has_transition_binding("locomotion", "idle", "run"), None);
    assert_eq!(bindings.can_take_transition("locomotion", "idle", "run"), None);
}

#[test]
fn transition_binding_is_replaced_not_stacked() {
    let mut bindings = NativeBindings::new();
    bindings.add_transition_binding("locomotion", "idle", "run", "always", || true);
    bindings.add_transition_binding("locomotion", "idle", "run", "never", || false);

    assert_eq!(
        bindings.has_transition_binding("locomotion", "idle", "run"),
        Some("never")
    );
    assert_eq!(bindings.can_take_transition("locomotion", "idle", "run"), Some(false));
    assert_eq!(bindings.can_take_transition("locomotion", "run", "idle"), None);
    assert_eq!(bindings.can_take_transition("combat", "idle", "run"), None);
}

#[test]
fn transition_hook_keeps_its_own_state() {
    let mut bindings = NativeBindings::new();
    let mut calls = 0;
    bindings.add_transition_binding("locomotion", "idle", "run", "every-other", move || {
        calls += 1;
        calls % 2 == 0
    });
    let answers: Vec<_> = (0..4)
        .map(|_| bindings.can_take_transition("locomotion", "idle", "run"))
        .collect();
    assert_eq!(answers, [Some(false), Some(true), Some(false), Some(true)]);
}

#[test]
fn entry_and_exit_hooks_follow_the_state_names() {
    let entered = Arc::new(AtomicUsize::new(0));
    let exited = Arc::new(AtomicUsize::new(0));
    let mut bindings = NativeBindings::new();
    {
        let entered = Arc::clone(&entered);
        bindings.add_state_entry_binding("locomotion", "run", "on-run", move |change| {
            assert_eq!(change.next_state, "run");
            entered.fetch_add(1, Ordering::SeqCst);
        });
    }
    {
        let exited = Arc::clone(&exited);
        bindings.add_state_exit_binding("locomotion", "idle", "leave-idle", move |change| {
            assert_eq!(change.previous_state, "idle");
            exited.fetch_add(1, Ordering::SeqCst);
        });
    }
    assert_eq!(bindings.has_state_entry_binding("locomotion", "run"), Some("on-run"));
    assert_eq!(bindings.has_state_exit_binding("locomotion", "run"), None);

    let idle_to_run = change("locomotion", "idle", "run");
    assert_eq!(bindings.state_exited(&idle_to_run), 1);
    assert_eq!(bindings.state_entered(&idle_to_run), 1);

    let run_to_idle = change("locomotion", "run", "idle");
    assert_eq!(bindings.state_exited(&run_to_idle), 0);
    assert_eq!(bindings.state_entered(&run_to_idle), 0);

    assert_eq!(bindings.state_entered(&change("combat", "idle", "run")), 0);
    assert_eq!(entered.load(Ordering::SeqCst), 1);
    assert_eq!(exited.load(Ordering::SeqCst), 1);
}

#[test]
fn several_entry_hooks_on_one_state_all_run() {
    let mut bindings = NativeBindings::new();
    bindings.add_state_entry_binding("locomotion", "run", "first", |_| {});
    bindings.add_state_entry_binding("locomotion", "run", "second", |_| {});
    assert_eq!(bindings.state_entered(&change("locomotion", "idle", "run")), 2);
    assert_eq!(bindings.has_state_entry_binding("locomotion", "run"), Some("first"));
}

#[test]
fn update_hooks_keep_registration_order() {
    let mut bindings = NativeBindings::new();
    bindings.add_update_hook("ik", |_| {});
    bindings.add_update_hook("look-at", |_| {});
    let names: Vec<_> = bindings.update_hook_names().collect();
    assert_eq!(names, ["ik", "look-at"]);
    assert!(format!("{bindings:?}").contains("update_hooks: 2"));
}
