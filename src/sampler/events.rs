//! Firing-context event pipe
//!
//! The firing context may not format, allocate, or log. It pushes small
//! `Copy` events into an rtrb ring buffer instead; a background consumer
//! thread turns them into `log` records.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Default ring capacity
pub const EVENT_RING_CAPACITY: usize = 1024;

/// Notable things that happened inside a firing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SamplerEvent {
    /// A late firing skipped `missed` whole periods
    Overrun { run_id: u64, firing: u64, missed: u64 },
    /// A finite run fired its last time
    RunComplete { run_id: u64, firings: u64, samples: u64 },
}

/// Producer half, owned by the sampler core
pub struct EventSink {
    producer: rtrb::Producer<SamplerEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventSink {
    /// Non-blocking. A full ring counts the event as dropped.
    pub fn push(&mut self, event: SamplerEvent) {
        if self.producer.push(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("slots", &self.producer.slots())
            .field("dropped", &self.dropped())
            .finish()
    }
}

/// Create a sink and its consumer half
pub fn event_channel(capacity: usize) -> (EventSink, rtrb::Consumer<SamplerEvent>) {
    let (producer, consumer) = rtrb::RingBuffer::new(capacity);
    let sink = EventSink {
        producer,
        dropped: Arc::new(AtomicU64::new(0)),
    };
    (sink, consumer)
}

/// Render an event for the log
pub fn describe(event: &SamplerEvent) -> String {
    match event {
        SamplerEvent::Overrun { run_id, firing, missed } => format!(
            "[SAMPLER_EVENT] Run {}: firing #{} was late, skipped {} period(s)",
            run_id, firing, missed
        ),
        SamplerEvent::RunComplete { run_id, firings, samples } => format!(
            "[SAMPLER_EVENT] Run {} complete: {} firings, {} jitter samples",
            run_id, firings, samples
        ),
    }
}

/// Spawn the consumer thread. It polls until `stop_flag` is set, then drains
/// whatever is left so no event is lost at shutdown.
pub fn spawn_event_consumer(
    mut consumer: rtrb::Consumer<SamplerEvent>,
    stop_flag: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        loop {
            let stopping = stop_flag.load(Ordering::Acquire);
            while let Ok(event) = consumer.pop() {
                match event {
                    SamplerEvent::Overrun { .. } => log::warn!("{}", describe(&event)),
                    SamplerEvent::RunComplete { .. } => log::info!("{}", describe(&event)),
                }
            }
            if stopping {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        log::debug!("[SAMPLER_EVENT] Consumer thread exiting");
    })
}
