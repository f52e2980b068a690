//! Host system sampler: memory totals and per-core CPU utilization.

use super::offer;
use std::time::Duration;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use vigil_core::Metric;

/// Sample host memory and CPU on every tick until cancellation.
///
/// CPU utilization is the usage since the previous refresh, so the first
/// tick reports zeros and every later one covers a full poll interval.
pub async fn collect_system(
    shutdown: CancellationToken,
    poll_interval: Duration,
    queue: mpsc::Sender<Metric>,
) {
    let mut sys = System::new_with_specifics(
        RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything()),
    );

    let start = tokio::time::Instant::now() + poll_interval;
    let mut ticker = tokio::time::interval_at(start, poll_interval);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {
                sys.refresh_memory();
                sys.refresh_cpu_usage();

                offer(&queue, Metric::gauge("TotalMemory", sys.total_memory() as f64));
                offer(&queue, Metric::gauge("FreeMemory", sys.free_memory() as f64));
                for (core, cpu) in sys.cpus().iter().enumerate() {
                    offer(
                        &queue,
                        Metric::gauge(format!("CPUutilization{core}"), f64::from(cpu.cpu_usage())),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::MetricKind;

    #[tokio::test]
    async fn one_tick_emits_memory_and_per_core_gauges() {
        let shutdown = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(512);

        let sampler = tokio::spawn(collect_system(
            shutdown.clone(),
            Duration::from_millis(10),
            tx,
        ));

        let mut metrics = Vec::new();
        for _ in 0..3 {
            metrics.push(rx.recv().await.expect("sampler closed early"));
        }
        shutdown.cancel();
        sampler.await.unwrap();

        assert!(metrics.iter().all(|m| m.kind == MetricKind::Gauge));
        assert!(metrics.iter().any(|m| m.id == "TotalMemory"));
        assert!(metrics.iter().any(|m| m.id == "FreeMemory"));
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_stalling() {
        let shutdown = CancellationToken::new();
        // Room for a single sample; the rest of the tick must be dropped.
        let (tx, rx) = mpsc::channel(1);

        let sampler = tokio::spawn(collect_system(
            shutdown.clone(),
            Duration::from_millis(5),
            tx,
        ));

        // Give it a few ticks against the full queue, then stop. The test
        // passes iff the sampler never wedges on the send.
        tokio::time::sleep(Duration::from_millis(40)).await;
        shutdown.cancel();
        sampler.await.unwrap();
        drop(rx);
    }
}
