//! Per-thread interop counters
//!
//! The script context is single-threaded, so counters are thread-local and
//! need no atomics.

use std::cell::Cell;

/// Interop statistics for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InteropStats {
    pub internal_calls: usize,
    pub external_calls: usize,
    pub trampolines_generated: usize,
    pub cache_hits: usize,
    pub conversion_errors: usize,
    pub storage_allocated: usize,
    pub storage_released: usize,
}

impl InteropStats {
    /// Storage cells allocated but not yet released
    pub fn live_storage(&self) -> usize {
        self.storage_allocated - self.storage_released
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Counter {
    InternalCall,
    ExternalCall,
    TrampolineGenerated,
    CacheHit,
    ConversionError,
    StorageAllocated,
    StorageReleased,
}

thread_local! {
    static COUNTERS: Cell<InteropStats> = Cell::new(InteropStats::default());
}

pub(crate) fn bump(counter: Counter) {
    COUNTERS.with(|cell| {
        let mut stats = cell.get();
        let slot = match counter {
            Counter::InternalCall => &mut stats.internal_calls,
            Counter::ExternalCall => &mut stats.external_calls,
            Counter::TrampolineGenerated => &mut stats.trampolines_generated,
            Counter::CacheHit => &mut stats.cache_hits,
            Counter::ConversionError => &mut stats.conversion_errors,
            Counter::StorageAllocated => &mut stats.storage_allocated,
            Counter::StorageReleased => &mut stats.storage_released,
        };
        *slot += 1;
        cell.set(stats);
    });
}

pub fn snapshot() -> InteropStats {
    COUNTERS.with(Cell::get)
}
