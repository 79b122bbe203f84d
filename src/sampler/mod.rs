//! Periodic jitter sampler
//!
//! - `engine`: the pure state machine (`PeriodicSampler`)
//! - `histogram`, `statistics`: accumulators fed by every firing
//! - `driver`: `SamplerService`, which runs the engine on real firing threads
//! - `clock`, `toggler`, `tuner`, `events`: collaborators of the firing context

pub mod clock;
pub mod driver;
pub mod engine;
pub mod events;
pub mod histogram;
pub mod statistics;
pub mod toggler;
pub mod tuner;

pub use clock::{ClockSource, MonotonicClock};
pub use driver::SamplerService;
pub use engine::{advance_deadline, FireOutcome, FireReport, PeriodicSampler, StatisticsScratch};
pub use events::SamplerEvent;
pub use histogram::{EdgePolicy, HistogramAccumulator, HistogramConfig};
pub use statistics::{MagnitudeTracker, RunningStatistics};
pub use toggler::{NullToggler, SignalToggler};
pub use tuner::RealtimeSettings;
