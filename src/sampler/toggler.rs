//! Auxiliary output signal
//!
//! Invoked once per firing with the new level so an external probe (e.g. an
//! oscilloscope on a GPIO line) can observe the firing period. The core never
//! reads anything back. Implementations run inside the firing context and must
//! not block.

/// Receives the signal level on every firing
pub trait SignalToggler: Send + Sync {
    fn set_level(&self, high: bool);
}

/// Discards every level change
#[derive(Clone, Copy, Debug, Default)]
pub struct NullToggler;

impl SignalToggler for NullToggler {
    fn set_level(&self, _high: bool) {}
}

/// Level driven on the n-th firing of a run (1-based): high on odd firings
pub fn level_for_firing(firing: u64) -> bool {
    firing % 2 == 1
}
