//! Worker Pool Module
//!
//! Runs a fixed number of workers over a shared FIFO queue, pacing each
//! worker by the latency of its last task: a task slow enough to have
//! plausibly reached the network earns a longer pause than a fast cache hit,
//! which keeps real fetch bursts under upstream rate limits without slowing
//! mostly-cached runs.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Above this per-task latency the task plausibly reached the network.
const NETWORK_LATENCY_THRESHOLD: Duration = Duration::from_millis(10);

/// Pause after a task that plausibly hit the network.
const SLOW_PAUSE: Duration = Duration::from_millis(50);

/// Pause after a fast task (plausible cache hit).
const FAST_PAUSE: Duration = Duration::from_millis(1);

// == Run Pool ==
/// Drains `items` with at most `width` concurrent workers.
///
/// Items are drawn FIFO from a shared queue. Task completion order across
/// workers is not guaranteed; the returned future resolves once every worker
/// has finished. Workers do not catch task failures — the `worker` closure
/// must convert its own errors into recorded per-item state. A panicking
/// task ends only its own worker's loop (logged as a warning); the remaining
/// workers keep draining the queue.
pub async fn run_pool<T, F, Fut>(items: Vec<T>, width: usize, worker: F)
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    if items.is_empty() {
        return;
    }
    let width = width.max(1);
    let queue = Arc::new(Mutex::new(items.into_iter().collect::<VecDeque<T>>()));

    debug!(width, "Starting worker pool");

    let mut handles = Vec::with_capacity(width);
    for worker_id in 0..width {
        let queue = Arc::clone(&queue);
        let worker = worker.clone();
        handles.push(tokio::spawn(async move {
            loop {
                let item = { queue.lock().await.pop_front() };
                let Some(item) = item else { break };

                let started = Instant::now();
                worker(item).await;
                let latency = started.elapsed();

                // Pace before pulling the next item
                if latency > NETWORK_LATENCY_THRESHOLD {
                    tokio::time::sleep(SLOW_PAUSE).await;
                } else {
                    tokio::time::sleep(FAST_PAUSE).await;
                }
            }
            debug!(worker_id, "Worker drained");
        }));
    }

    for result in join_all(handles).await {
        if let Err(err) = result {
            warn!("Pool worker aborted: {}", err);
        }
    }
}
