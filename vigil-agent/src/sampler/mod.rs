//! Samplers: the producing half of the pipeline.
//!
//! Two independent samplers tick on the shared poll interval and feed the
//! bounded queue. Sends never block: when the queue is full the sample is
//! dropped, since a stalled sampler would skew every later reading anyway.

use tokio::sync::mpsc;
use vigil_core::Metric;

pub mod runtime;
pub mod system;

pub use runtime::collect_runtime;
pub use system::collect_system;

/// Non-blocking enqueue; a full queue drops the sample.
fn offer(queue: &mpsc::Sender<Metric>, metric: Metric) {
    match queue.try_send(metric) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(metric)) => {
            tracing::warn!(id = %metric.id, "queue full, dropping sample");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}
