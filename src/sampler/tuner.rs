//! Real-time preparation for the firing context
//!
//! Optional and best-effort:
//! - Locking all memory pages to prevent page faults (process-wide, once)
//! - Setting CPU affinity of each firing thread
//! - Enabling SCHED_FIFO priority on each firing thread
//!
//! Every failure is logged and measurement continues in SCHED_OTHER.

use nix::sys::mman::{mlockall, MlockAllFlags};
use serde::{Deserialize, Serialize};

/// Real-time options, part of the persisted settings
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeSettings {
    /// mlockall(MCL_CURRENT | MCL_FUTURE) at startup
    pub lock_memory: bool,
    /// SCHED_FIFO priority (1..=99) for firing threads
    pub fifo_priority: Option<i32>,
    /// Pin firing threads to this CPU
    pub cpu: Option<usize>,
}

impl RealtimeSettings {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(priority) = self.fifo_priority {
            if !(1..=99).contains(&priority) {
                return Err(format!("fifo_priority {} outside 1..=99", priority));
            }
        }
        if let Some(cpu) = self.cpu {
            if cpu >= libc::CPU_SETSIZE as usize {
                return Err(format!("cpu {} outside the supported CPU set", cpu));
            }
        }
        Ok(())
    }
}

/// Lock current and future pages in RAM.
pub fn lock_memory() -> Result<(), Box<dyn std::error::Error>> {
    mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE)
        .map_err(|e| format!("mlockall failed: {}", e))?;
    Ok(())
}

/// Apply affinity and priority to the calling thread.
/// Called by every firing thread before its first sleep.
pub fn prepare_firing_thread(settings: &RealtimeSettings) {
    if let Some(cpu) = settings.cpu {
        match set_cpu_affinity(cpu) {
            Ok(()) => log::debug!("[TUNER] Firing thread pinned to CPU {}", cpu),
            Err(e) => log::warn!("[TUNER] Failed to pin firing thread to CPU {}: {}", cpu, e),
        }
    }
    if let Some(priority) = settings.fifo_priority {
        match set_sched_fifo(priority) {
            Ok(()) => log::debug!("[TUNER] Firing thread running SCHED_FIFO priority {}", priority),
            Err(e) => log::warn!(
                "[TUNER] Failed to set SCHED_FIFO priority {} ({}). Continuing in SCHED_OTHER mode.",
                priority, e
            ),
        }
    }
}

/// Set CPU affinity for the current thread.
fn set_cpu_affinity(core: usize) -> Result<(), Box<dyn std::error::Error>> {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(core, &mut set);

        let ret = libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set);
        if ret < 0 {
            return Err(format!(
                "sched_setaffinity failed with errno: {}",
                std::io::Error::last_os_error()
            )
            .into());
        }
    }
    Ok(())
}

/// Set SCHED_FIFO priority for the current thread.
fn set_sched_fifo(priority: i32) -> Result<(), Box<dyn std::error::Error>> {
    unsafe {
        let mut param: libc::sched_param = std::mem::zeroed();
        param.sched_priority = priority;

        let ret = libc::sched_setscheduler(0, libc::SCHED_FIFO, &param);
        if ret < 0 {
            return Err(format!(
                "sched_setscheduler failed with errno: {}",
                std::io::Error::last_os_error()
            )
            .into());
        }
    }
    Ok(())
}
