//! Sampler service: the engine behind one exclusive lock plus its firing threads
//!
//! Every run gets its own firing thread. The thread sleeps on an absolute
//! deadline, takes the state lock only long enough to run `on_fire`, and exits
//! when the run ends or when it finds that its run has been superseded.
//!
//! `stop()` takes the same lock, so it returns only after any in-flight firing
//! has finished. It raises `stop_requested` first; a firing thread checks that
//! flag before re-locking, so `stop()` waits for at most one firing.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{ConfigError, ControlError};
use crate::models::{RunMode, SamplerConfig, SamplerStatus, StatisticsReport, Timestamp};
use crate::sampler::clock::{ClockSource, MonotonicClock};
use crate::sampler::engine::{FireOutcome, PeriodicSampler, StatisticsScratch};
use crate::sampler::events::{self, EventSink, SamplerEvent, EVENT_RING_CAPACITY};
use crate::sampler::histogram::HistogramConfig;
use crate::sampler::toggler::{self, NullToggler, SignalToggler};
use crate::sampler::tuner::{self, RealtimeSettings};

/// State shared between the control context and the firing threads
struct SharedCore {
    sampler: PeriodicSampler,
    events: EventSink,
}

struct Shared {
    core: Mutex<SharedCore>,
    /// Signalled whenever a run ends on its own
    idle: Condvar,
    /// Set by `stop()` before it takes the lock, cleared by `start()` under it
    stop_requested: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SharedCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns the periodic sampler and everything that drives it
pub struct SamplerService {
    shared: Arc<Shared>,
    clock: Arc<dyn ClockSource>,
    toggler: Arc<dyn SignalToggler>,
    realtime: RealtimeSettings,
    /// Readers copy into this and derive the report after unlocking the core
    scratch: Mutex<StatisticsScratch>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    consumer: Mutex<Option<JoinHandle<()>>>,
    consumer_stop: Arc<AtomicBool>,
}

impl SamplerService {
    /// Service on `CLOCK_MONOTONIC` with no output signal and no real-time tuning
    pub fn new(period: Duration, histogram: HistogramConfig) -> crate::error::Result<Self> {
        Self::with_components(
            period,
            histogram,
            RealtimeSettings::default(),
            Arc::new(MonotonicClock::new()),
            Arc::new(NullToggler),
        )
    }

    pub fn with_components(
        period: Duration,
        histogram: HistogramConfig,
        realtime: RealtimeSettings,
        clock: Arc<dyn ClockSource>,
        toggler: Arc<dyn SignalToggler>,
    ) -> crate::error::Result<Self> {
        realtime.validate()?;
        let sampler = PeriodicSampler::new(period, histogram)?;
        let scratch = StatisticsScratch::new()?;
        let (sink, consumer) = events::event_channel(EVENT_RING_CAPACITY);
        let consumer_stop = Arc::new(AtomicBool::new(false));
        let consumer_handle = events::spawn_event_consumer(consumer, Arc::clone(&consumer_stop));

        log::info!(
            "[SAMPLER] Service ready: period={} ms, bins={}, bin_width={} ns, clock resolution={} ns",
            period.as_millis(),
            histogram.bin_count,
            histogram.bin_width_ns,
            clock.resolution().as_nanos()
        );

        Ok(SamplerService {
            shared: Arc::new(Shared {
                core: Mutex::new(SharedCore { sampler, events: sink }),
                idle: Condvar::new(),
                stop_requested: AtomicBool::new(false),
            }),
            clock,
            toggler,
            realtime,
            scratch: Mutex::new(scratch),
            workers: Mutex::new(Vec::new()),
            consumer: Mutex::new(Some(consumer_handle)),
            consumer_stop,
        })
    }

    /// Begin a run with the configured period.
    pub fn start(&self, mode: RunMode) -> Result<(), ControlError> {
        let (run_id, first_deadline) = {
            let mut core = self.shared.lock();
            let config = SamplerConfig::new(core.sampler.period(), mode.into());
            let first = core.sampler.start(config, self.clock.now())?;
            self.shared.stop_requested.store(false, Ordering::Release);
            (core.sampler.run_id(), first)
        };

        let shared = Arc::clone(&self.shared);
        let clock = Arc::clone(&self.clock);
        let toggler = Arc::clone(&self.toggler);
        let realtime = self.realtime.clone();
        let spawned = thread::Builder::new()
            .name(format!("lattest-fire-{}", run_id))
            .spawn(move || {
                let result = catch_unwind(AssertUnwindSafe(|| {
                    firing_loop(&shared, clock.as_ref(), toggler.as_ref(), &realtime, run_id, first_deadline)
                }));
                if let Err(panic_info) = result {
                    log::error!("[SAMPLER] Firing thread for run {} panicked: {:?}", run_id, panic_info);
                    let mut core = shared.lock();
                    if core.sampler.run_id() == run_id {
                        core.sampler.stop();
                    }
                    shared.idle.notify_all();
                }
            });

        match spawned {
            Ok(handle) => {
                let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
                reap_finished(&mut workers);
                workers.push(handle);
                log::info!("[SAMPLER] Run {} started ({:?})", run_id, mode);
                Ok(())
            }
            Err(e) => {
                log::error!("[SAMPLER] Failed to spawn firing thread for run {}: {}", run_id, e);
                let mut core = self.shared.lock();
                if core.sampler.run_id() == run_id {
                    core.sampler.stop();
                }
                Err(ControlError::ThreadSpawn(e.to_string()))
            }
        }
    }

    /// Cancel the next firing. Waits for an in-flight firing to finish.
    pub fn stop(&self) {
        self.shared.stop_requested.store(true, Ordering::Release);
        let cancelled = self.shared.lock().sampler.stop();
        self.shared.idle.notify_all();
        if cancelled {
            log::info!("[SAMPLER] Run stopped");
        }
    }

    pub fn set_period(&self, period: Duration) -> Result<(), ControlError> {
        self.shared.lock().sampler.set_period(period)?;
        log::info!("[SAMPLER] Period set to {} ms", period.as_millis());
        Ok(())
    }

    pub fn configure_histogram(&self, config: HistogramConfig) -> Result<(), ConfigError> {
        self.shared.lock().sampler.configure_histogram(config)?;
        log::info!(
            "[SAMPLER] Histogram reconfigured: {} bins x {} ns ({})",
            config.bin_count,
            config.bin_width_ns,
            config.edge_policy.as_str()
        );
        Ok(())
    }

    pub fn histogram_config(&self) -> HistogramConfig {
        self.shared.lock().sampler.histogram_config()
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().sampler.is_running()
    }

    pub fn status(&self) -> SamplerStatus {
        let core = self.shared.lock();
        SamplerStatus {
            state: core.sampler.state(),
            period: core.sampler.period(),
            run_count: core.sampler.run_count(),
            firings: core.sampler.firings(),
            overruns: core.sampler.overruns(),
            clock_resolution: self.clock.resolution(),
            histogram: core.sampler.histogram_config(),
        }
    }

    /// Consistent snapshot of the accumulators. The state lock covers only
    /// the copy; percentiles and bin bounds are derived after it is released.
    pub fn statistics(&self) -> StatisticsReport {
        let mut scratch = self.scratch.lock().unwrap_or_else(PoisonError::into_inner);
        self.shared.lock().sampler.capture_into(&mut scratch);
        scratch.report()
    }

    /// Events that could not be queued because the ring was full
    pub fn dropped_events(&self) -> u64 {
        self.shared.lock().events.dropped()
    }

    /// Block until the sampler is idle or `timeout` elapses.
    /// Returns whether the sampler is idle.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut core = self.shared.lock();
        while core.sampler.is_running() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            core = match self.shared.idle.wait_timeout(core, remaining) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    /// Stop the sampler, join every thread, drive the signal low and log the
    /// final report. Safe to call more than once.
    pub fn shutdown(&self) {
        self.stop();

        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            workers.drain(..).collect()
        };
        for handle in handles {
            if handle.join().is_err() {
                log::warn!("[SAMPLER] A firing thread terminated abnormally");
            }
        }
        self.toggler.set_level(false);

        let consumer = self.consumer.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = consumer {
            log_final_report(&self.statistics(), self.dropped_events());
            self.consumer_stop.store(true, Ordering::Release);
            if handle.join().is_err() {
                log::warn!("[SAMPLER] Event consumer terminated abnormally");
            }
        }
    }
}

impl Drop for SamplerService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Body of a firing thread
fn firing_loop(
    shared: &Shared,
    clock: &dyn ClockSource,
    toggler: &dyn SignalToggler,
    realtime: &RealtimeSettings,
    run_id: u64,
    first_deadline: Timestamp,
) {
    tuner::prepare_firing_thread(realtime);

    let mut deadline = first_deadline;
    loop {
        clock.sleep_until(deadline);
        let now = clock.now();

        if shared.stop_requested.load(Ordering::Acquire) {
            // stop() is waiting for the lock; leave the state to it
            return;
        }
        let mut core = shared.lock();
        if core.sampler.run_id() != run_id || !core.sampler.is_running() {
            // Stopped or superseded while asleep
            return;
        }

        let report = core.sampler.on_fire(now);
        let firing = core.sampler.firings();
        toggler.set_level(toggler::level_for_firing(firing));

        if report.missed > 0 {
            core.events.push(SamplerEvent::Overrun {
                run_id,
                firing,
                missed: report.missed,
            });
        }

        match report.outcome {
            FireOutcome::Reschedule(next) => deadline = next,
            FireOutcome::Stop => {
                let samples = core.sampler.statistics().count();
                core.events.push(SamplerEvent::RunComplete {
                    run_id,
                    firings: firing,
                    samples,
                });
                drop(core);
                shared.idle.notify_all();
                return;
            }
        }
    }
}

/// Join handles whose threads have already exited
fn reap_finished(workers: &mut Vec<JoinHandle<()>>) {
    let (finished, running): (Vec<_>, Vec<_>) = workers.drain(..).partition(|h| h.is_finished());
    for handle in finished {
        if handle.join().is_err() {
            log::warn!("[SAMPLER] A firing thread terminated abnormally");
        }
    }
    *workers = running;
}

fn log_final_report(report: &StatisticsReport, dropped_events: u64) {
    log::info!("[SAMPLER] Final report: {} jitter samples", report.count);
    if report.count > 0 {
        log::info!(
            "[SAMPLER] min={} ns max={} ns mean={} ns stddev={} ns p99={} ns",
            report.min,
            report.max,
            report.mean,
            report.stddev,
            report.magnitude.p99_ns
        );
    }
    for bin in report.histogram.bins.iter().filter(|b| b.count > 0) {
        log::info!("[SAMPLER]   >= {:>12} ns: {}", bin.lower_bound_ns, bin.count);
    }
    if report.histogram.underflow > 0 || report.histogram.overflow > 0 {
        log::info!(
            "[SAMPLER]   underflow={} overflow={}",
            report.histogram.underflow,
            report.histogram.overflow
        );
    }
    if dropped_events > 0 {
        log::warn!("[SAMPLER] {} firing events were dropped (ring full)", dropped_events);
    }
}
