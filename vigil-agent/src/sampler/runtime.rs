//! Process runtime sampler.
//!
//! Emits the fixed 27-gauge set consumed by the existing dashboards, plus
//! `RandomValue` and the `PollCount` liveness counter. The gauge names
//! predate this agent; fields describing allocator internals with no direct
//! equivalent on this runtime report zero, while the resident and virtual
//! sizes map onto the heap fields.

use super::offer;
use std::time::Duration;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use vigil_core::Metric;

/// Point-in-time view of the process memory statistics.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuntimeStats {
    pub alloc: f64,
    pub buck_hash_sys: f64,
    pub frees: f64,
    pub gc_cpu_fraction: f64,
    pub gc_sys: f64,
    pub heap_alloc: f64,
    pub heap_idle: f64,
    pub heap_inuse: f64,
    pub heap_objects: f64,
    pub heap_released: f64,
    pub heap_sys: f64,
    pub last_gc: f64,
    pub lookups: f64,
    pub m_cache_inuse: f64,
    pub m_cache_sys: f64,
    pub m_span_inuse: f64,
    pub m_span_sys: f64,
    pub mallocs: f64,
    pub next_gc: f64,
    pub num_forced_gc: f64,
    pub num_gc: f64,
    pub other_sys: f64,
    pub pause_total_ns: f64,
    pub stack_inuse: f64,
    pub stack_sys: f64,
    pub sys: f64,
    pub total_alloc: f64,
}

/// The documented gauge set, in wire order.
pub const RUNTIME_GAUGES: &[(&str, fn(&RuntimeStats) -> f64)] = &[
    ("Alloc", |s| s.alloc),
    ("BuckHashSys", |s| s.buck_hash_sys),
    ("Frees", |s| s.frees),
    ("GCCPUFraction", |s| s.gc_cpu_fraction),
    ("GCSys", |s| s.gc_sys),
    ("HeapAlloc", |s| s.heap_alloc),
    ("HeapIdle", |s| s.heap_idle),
    ("HeapInuse", |s| s.heap_inuse),
    ("HeapObjects", |s| s.heap_objects),
    ("HeapReleased", |s| s.heap_released),
    ("HeapSys", |s| s.heap_sys),
    ("LastGC", |s| s.last_gc),
    ("Lookups", |s| s.lookups),
    ("MCacheInuse", |s| s.m_cache_inuse),
    ("MCacheSys", |s| s.m_cache_sys),
    ("MSpanInuse", |s| s.m_span_inuse),
    ("MSpanSys", |s| s.m_span_sys),
    ("Mallocs", |s| s.mallocs),
    ("NextGC", |s| s.next_gc),
    ("NumForcedGC", |s| s.num_forced_gc),
    ("NumGC", |s| s.num_gc),
    ("OtherSys", |s| s.other_sys),
    ("PauseTotalNs", |s| s.pause_total_ns),
    ("StackInuse", |s| s.stack_inuse),
    ("StackSys", |s| s.stack_sys),
    ("Sys", |s| s.sys),
    ("TotalAlloc", |s| s.total_alloc),
];

fn snapshot(sys: &mut System, pid: Pid) -> RuntimeStats {
    sys.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        ProcessRefreshKind::nothing().with_memory(),
    );

    let mut stats = RuntimeStats::default();
    if let Some(process) = sys.process(pid) {
        let resident = process.memory() as f64;
        let virt = process.virtual_memory() as f64;
        stats.alloc = resident;
        stats.heap_alloc = resident;
        stats.heap_inuse = resident;
        stats.heap_idle = (virt - resident).max(0.0);
        stats.heap_sys = virt;
        stats.sys = virt;
        stats.total_alloc = resident;
    }
    stats
}

/// Sample the process runtime on every tick until cancellation.
pub async fn collect_runtime(
    shutdown: CancellationToken,
    poll_interval: Duration,
    queue: mpsc::Sender<Metric>,
) {
    let Ok(pid) = sysinfo::get_current_pid() else {
        tracing::error!("cannot resolve own pid, runtime sampler disabled");
        return;
    };
    let mut sys = System::new();

    let start = tokio::time::Instant::now() + poll_interval;
    let mut ticker = tokio::time::interval_at(start, poll_interval);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {
                let stats = snapshot(&mut sys, pid);
                for (name, read) in RUNTIME_GAUGES {
                    offer(&queue, Metric::gauge(*name, read(&stats)));
                }
                offer(&queue, Metric::gauge("RandomValue", rand::random::<f64>()));
                // One tick, one increment: the running sum at the server is
                // the number of completed polls since agent start.
                offer(&queue, Metric::counter("PollCount", 1));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use vigil_core::MetricKind;

    #[test]
    fn gauge_table_has_the_documented_27_names() {
        assert_eq!(RUNTIME_GAUGES.len(), 27);
        let names: HashSet<_> = RUNTIME_GAUGES.iter().map(|(n, _)| *n).collect();
        assert_eq!(names.len(), 27);
        for required in ["Alloc", "GCCPUFraction", "HeapObjects", "PauseTotalNs", "TotalAlloc"] {
            assert!(names.contains(required), "missing {required}");
        }
    }

    #[tokio::test]
    async fn one_tick_emits_the_full_set_and_a_poll_count() {
        let shutdown = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(256);

        let sampler = tokio::spawn(collect_runtime(
            shutdown.clone(),
            Duration::from_millis(10),
            tx,
        ));

        let mut metrics = Vec::new();
        for _ in 0..29 {
            metrics.push(rx.recv().await.expect("sampler closed early"));
        }
        shutdown.cancel();
        sampler.await.unwrap();

        let poll = metrics.iter().find(|m| m.id == "PollCount").unwrap();
        assert_eq!(poll.kind, MetricKind::Counter);
        assert_eq!(poll.delta, Some(1));

        let random = metrics.iter().find(|m| m.id == "RandomValue").unwrap();
        let value = random.value.unwrap();
        assert!((0.0..1.0).contains(&value));

        let gauges = metrics.iter().filter(|m| m.kind == MetricKind::Gauge).count();
        assert_eq!(gauges, 28); // 27 runtime gauges + RandomValue
    }

    #[tokio::test]
    async fn cancellation_stops_the_sampler_without_draining() {
        let shutdown = CancellationToken::new();
        let (tx, _rx) = mpsc::channel(8);
        shutdown.cancel();
        // Returns promptly even though the first tick never arrives.
        collect_runtime(shutdown, Duration::from_secs(3600), tx).await;
    }
}
