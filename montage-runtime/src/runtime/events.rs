use crate::{Error, MontageData, MontageInstanceId, NotifyEvent};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MontageEventKind {
    Started,
    BlendingOut,
    Ended,
}

#[derive(Clone, Debug)]
pub struct MontageEvent {
    pub kind: MontageEventKind,
    pub instance: MontageInstanceId,
    pub montage: Arc<MontageData>,
    /// Stopped by a caller (or replaced by another montage) rather than reaching its end.
    pub interrupted: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotifyPhase {
    /// One-shot notify crossed this frame.
    Trigger,
    Begin,
    Tick,
    End,
}

#[derive(Clone, Debug)]
pub struct NotifyDispatch {
    pub phase: NotifyPhase,
    pub event: Arc<NotifyEvent>,
    pub weight: f32,
    pub source: Option<MontageInstanceId>,
}

/// Montage transitions observed during Update. Dispatched started, then blending-out, then
/// ended, each in the order they were observed.
#[derive(Clone, Debug, Default)]
pub(crate) struct MontageEventQueue {
    started: Vec<MontageEvent>,
    blending_out: Vec<MontageEvent>,
    ended: Vec<MontageEvent>,
}

impl MontageEventQueue {
    pub(crate) fn push(&mut self, event: MontageEvent) {
        match event.kind {
            MontageEventKind::Started => self.started.push(event),
            MontageEventKind::BlendingOut => self.blending_out.push(event),
            MontageEventKind::Ended => self.ended.push(event),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.started.len() + self.blending_out.len() + self.ended.len()
    }

    pub(crate) fn take_ordered(&mut self) -> Vec<MontageEvent> {
        let mut out = Vec::with_capacity(self.len());
        out.append(&mut self.started);
        out.append(&mut self.blending_out);
        out.append(&mut self.ended);
        out
    }
}

pub type MontageEventHandler = Box<dyn FnMut(&MontageEvent) -> anyhow::Result<()> + Send>;
pub type NotifyHandler = Box<dyn FnMut(&NotifyDispatch) -> anyhow::Result<()> + Send>;

struct Named<H> {
    name: String,
    handler: H,
}

/// Ordered subscriber lists, one per event kind.
#[derive(Default)]
pub(crate) struct Handlers {
    started: Vec<Named<MontageEventHandler>>,
    blending_out: Vec<Named<MontageEventHandler>>,
    ended: Vec<Named<MontageEventHandler>>,
    notify: Vec<Named<NotifyHandler>>,
}

impl Handlers {
    pub(crate) fn add_montage_handler(
        &mut self,
        kind: MontageEventKind,
        name: &str,
        handler: MontageEventHandler,
    ) {
        let list = match kind {
            MontageEventKind::Started => &mut self.started,
            MontageEventKind::BlendingOut => &mut self.blending_out,
            MontageEventKind::Ended => &mut self.ended,
        };
        list.push(Named {
            name: name.to_string(),
            handler,
        });
    }

    pub(crate) fn add_notify_handler(&mut self, name: &str, handler: NotifyHandler) {
        self.notify.push(Named {
            name: name.to_string(),
            handler,
        });
    }

    /// Delivers to every subscriber. A failing or panicking handler is recorded and the rest
    /// still run.
    pub(crate) fn dispatch_montage_event(&mut self, event: &MontageEvent, failures: &mut Vec<Error>) {
        let list = match event.kind {
            MontageEventKind::Started => &mut self.started,
            MontageEventKind::BlendingOut => &mut self.blending_out,
            MontageEventKind::Ended => &mut self.ended,
        };
        for named in list {
            let handler = &mut named.handler;
            let result = catch_unwind(AssertUnwindSafe(|| handler(event)));
            record_failure(&named.name, result, failures);
        }
    }

    pub(crate) fn dispatch_notify(&mut self, dispatch: &NotifyDispatch, failures: &mut Vec<Error>) {
        for named in &mut self.notify {
            let handler = &mut named.handler;
            let result = catch_unwind(AssertUnwindSafe(|| handler(dispatch)));
            record_failure(&named.name, result, failures);
        }
    }
}

fn record_failure(
    handler: &str,
    result: std::thread::Result<anyhow::Result<()>>,
    failures: &mut Vec<Error>,
) {
    let message = match result {
        Ok(Ok(())) => return,
        Ok(Err(e)) => format!("{e:#}"),
        Err(payload) => {
            let text = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            format!("panicked: {text}")
        }
    };
    let error = Error::HandlerFailure {
        handler: handler.to_string(),
        message,
    };
    log::warn!("{error}");
    failures.push(error);
}

/// What one PostUpdate delivered.
#[derive(Debug, Default)]
pub struct PostUpdateReport {
    pub notifies_dispatched: usize,
    pub montage_events_dispatched: usize,
    pub root_motion_requests: usize,
    /// Frame whose post-update had been skipped and was run first.
    pub caught_up: bool,
    pub failures: Vec<Error>,
}

impl PostUpdateReport {
    /// Folds in the report of a skipped post-update that ran ahead of this one. Its failures
    /// come first.
    pub(crate) fn merge_caught_up(&mut self, previous: PostUpdateReport) {
        self.notifies_dispatched += previous.notifies_dispatched;
        self.montage_events_dispatched += previous.montage_events_dispatched;
        self.root_motion_requests += previous.root_motion_requests;
        self.caught_up = true;
        let failures = std::mem::take(&mut self.failures);
        self.failures = previous.failures;
        self.failures.extend(failures);
    }
}
