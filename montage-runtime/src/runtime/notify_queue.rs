use crate::{MontageInstanceId, NotifyEvent, NotifyFilter};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_chacha::rand_core::SeedableRng;
use std::sync::Arc;

/// A notify that passed every gate this tick.
#[derive(Clone, Debug)]
pub struct QueuedNotify {
    pub event: Arc<NotifyEvent>,
    /// Weight of the source when the notify was queued.
    pub weight: f32,
    pub source: Option<MontageInstanceId>,
}

/// Notifies collected during one Update, filtered on the way in.
#[derive(Clone, Debug)]
pub struct NotifyQueue {
    entries: Vec<QueuedNotify>,
    predicted_lod: i32,
    dedicated_server: bool,
    rng: ChaCha8Rng,
}

impl NotifyQueue {
    pub fn new(seed: u64, dedicated_server: bool) -> Self {
        Self {
            entries: Vec::new(),
            predicted_lod: 0,
            dedicated_server,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Drops queued entries and records the LOD used by the LOD filter. The chance stream is
    /// left where it is.
    pub fn reset(&mut self, predicted_lod: i32) {
        self.entries.clear();
        self.predicted_lod = predicted_lod;
    }

    pub fn predicted_lod(&self) -> i32 {
        self.predicted_lod
    }

    pub fn add<'a, I>(&mut self, events: I, instance_weight: f32)
    where
        I: IntoIterator<Item = &'a Arc<NotifyEvent>>,
    {
        self.add_from(None, events, instance_weight);
    }

    /// Runs each event through the server, weight, LOD and chance gates, in that order.
    // Negated comparisons make NaN thresholds and chances drop the event.
    #[allow(clippy::neg_cmp_op_on_partial_ord)]
    pub fn add_from<'a, I>(
        &mut self,
        source: Option<MontageInstanceId>,
        events: I,
        instance_weight: f32,
    ) where
        I: IntoIterator<Item = &'a Arc<NotifyEvent>>,
    {
        for event in events {
            if self.dedicated_server && event.client_only {
                continue;
            }
            if !(event.trigger_weight_threshold <= instance_weight) {
                continue;
            }
            if let NotifyFilter::Lod { filter_lod } = event.filter {
                if filter_lod <= self.predicted_lod {
                    continue;
                }
            }
            if !event.is_state() && !(self.rng.r#gen::<f32>() < event.trigger_chance) {
                continue;
            }
            self.push_unique(QueuedNotify {
                event: Arc::clone(event),
                weight: instance_weight,
                source,
            });
        }
    }

    /// Folds another queue into this one. State notifies already present are skipped.
    pub fn append(&mut self, other: &NotifyQueue) {
        for entry in &other.entries {
            self.push_unique(entry.clone());
        }
    }

    fn push_unique(&mut self, entry: QueuedNotify) {
        if entry.event.is_state()
            && self
                .entries
                .iter()
                .any(|e| Arc::ptr_eq(&e.event, &entry.event))
        {
            return;
        }
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[QueuedNotify] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, QueuedNotify> {
        self.entries.drain(..)
    }
}
