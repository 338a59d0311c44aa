//! Thread-to-core pinning.

use core_affinity::CoreId;
use tracing::{debug, warn};

/// Pins the calling thread to `cpu`.
///
/// Returns `false` and logs a warning when the OS refuses; the thread keeps
/// running unpinned.
pub fn pin_thread(cpu: usize) -> bool {
    let allowed = core_affinity::get_core_ids()
        .is_some_and(|ids| ids.iter().any(|core| core.id == cpu));
    let pinned = allowed && core_affinity::set_for_current(CoreId { id: cpu });
    if pinned {
        debug!(cpu, "thread pinned");
    } else {
        warn!(cpu, online = num_cpus::get(), "failed to pin thread, running unpinned");
    }
    pinned
}

/// Warns about CPU choices that will make the numbers meaningless.
pub fn check_placement(producer_cpu: usize, consumer_cpu: usize) {
    let online = num_cpus::get();
    for (role, cpu) in [("producer", producer_cpu), ("consumer", consumer_cpu)] {
        if cpu >= online {
            warn!(role, cpu, online, "cpu is not online");
        }
    }
    if producer_cpu == consumer_cpu {
        warn!(
            cpu = producer_cpu,
            "producer and consumer share a core; spinning threads will time-slice"
        );
    }
}
