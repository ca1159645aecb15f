use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Identity tag that partitions variable ownership among sampler components.
///
/// Each call to [`Selector::new`] returns a tag that compares unequal to every
/// previously created one. A selector is `Copy`, so sharing ownership between
/// two sampler components is an explicit act of passing the same value to
/// both. Selectors are only ever used as partition keys: they support
/// equality and hashing, but intentionally no ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Selector(u64);

impl Selector {
    pub fn new() -> Self {
        Selector(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for Selector {
    fn default() -> Self {
        Selector::new()
    }
}
