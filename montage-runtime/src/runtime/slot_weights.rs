use std::collections::HashMap;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SlotWeightEntry {
    /// Sum of the weights of the montages targeting this slot. Never clamped.
    pub local_weight: f32,
    /// Part of `local_weight` from montages whose track in this slot is not additive.
    pub non_additive_weight: f32,
    /// Weight of the slot node itself in the pose graph.
    pub global_weight: f32,
    pub relevant_this_tick: bool,
    pub was_relevant_last_tick: bool,
}

impl SlotWeightEntry {
    pub fn effective_weight(&self) -> f32 {
        self.local_weight * self.global_weight
    }

    /// Share of the slot output left to the upstream pose. Additive tracks do not displace it.
    pub fn source_weight(&self) -> f32 {
        1.0 - self.non_additive_weight * self.global_weight
    }

    fn refresh_relevance(&mut self) {
        self.relevant_this_tick = self.effective_weight() > 0.0;
    }
}

/// Per-frame slot weight table, keyed by slot name and kept in registration order.
#[derive(Clone, Debug, Default)]
pub struct SlotWeightTracker {
    names: Vec<String>,
    entries: Vec<SlotWeightEntry>,
    index: HashMap<String, usize>,
}

impl SlotWeightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zeroes every weight and rolls this tick's relevance into last tick's.
    pub fn reset(&mut self) {
        for entry in &mut self.entries {
            entry.was_relevant_last_tick = entry.relevant_this_tick;
            entry.relevant_this_tick = false;
            entry.local_weight = 0.0;
            entry.non_additive_weight = 0.0;
            entry.global_weight = 0.0;
        }
    }

    pub fn register_slot(&mut self, slot: &str) -> usize {
        if let Some(&index) = self.index.get(slot) {
            return index;
        }
        let index = self.entries.len();
        self.names.push(slot.to_string());
        self.entries.push(SlotWeightEntry::default());
        self.index.insert(slot.to_string(), index);
        index
    }

    pub fn accumulate_montage_weight(&mut self, slot: &str, weight: f32) {
        let index = self.register_slot(slot);
        let entry = &mut self.entries[index];
        entry.local_weight += weight;
        entry.non_additive_weight += weight;
        entry.refresh_relevance();
    }

    /// Counts toward relevance and the local weight, but leaves the source share untouched.
    pub fn accumulate_additive_weight(&mut self, slot: &str, weight: f32) {
        let index = self.register_slot(slot);
        let entry = &mut self.entries[index];
        entry.local_weight += weight;
        entry.refresh_relevance();
    }

    /// Last writer in a tick wins.
    pub fn set_global_weight(&mut self, slot: &str, weight: f32) {
        let index = self.register_slot(slot);
        let entry = &mut self.entries[index];
        entry.global_weight = weight;
        entry.refresh_relevance();
    }

    pub fn entry(&self, slot: &str) -> Option<&SlotWeightEntry> {
        self.index.get(slot).map(|&i| &self.entries[i])
    }

    pub fn local_weight(&self, slot: &str) -> f32 {
        self.entry(slot).map(|e| e.local_weight).unwrap_or(0.0)
    }

    pub fn global_weight(&self, slot: &str) -> f32 {
        self.entry(slot).map(|e| e.global_weight).unwrap_or(0.0)
    }

    pub fn effective_weight(&self, slot: &str) -> f32 {
        self.entry(slot).map(|e| e.effective_weight()).unwrap_or(0.0)
    }

    pub fn source_weight(&self, slot: &str) -> f32 {
        self.entry(slot).map(|e| e.source_weight()).unwrap_or(1.0)
    }

    pub fn is_relevant(&self, slot: &str) -> bool {
        self.entry(slot).is_some_and(|e| e.relevant_this_tick)
    }

    /// Relevant now or on the previous tick; notifies keep firing across that edge.
    pub fn is_relevant_for_notifies(&self, slot: &str) -> bool {
        self.entry(slot)
            .is_some_and(|e| e.relevant_this_tick || e.was_relevant_last_tick)
    }

    pub fn became_irrelevant(&self, slot: &str) -> bool {
        self.entry(slot)
            .is_some_and(|e| e.was_relevant_last_tick && !e.relevant_this_tick)
    }

    pub fn slot_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SlotWeightEntry)> {
        self.names.iter().map(String::as_str).zip(self.entries.iter())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
