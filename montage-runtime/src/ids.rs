use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// Process-global and monotonically increasing, so sorting by id is sorting by creation order.
static NEXT_MONTAGE_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one playing montage for its whole lifetime. Ids are never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MontageInstanceId(u64);

impl MontageInstanceId {
    pub(crate) fn next() -> Self {
        Self(NEXT_MONTAGE_INSTANCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MontageInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "montage#{}", self.0)
    }
}
