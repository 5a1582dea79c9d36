//! Throttled call gate for outbound API requests
//!
//! Remote stores enforce undisclosed burst limits, so calls are spaced out
//! proactively instead of being retried after a throttling error.

use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, trace};

use crate::error::{Result, SyncError};

type Thunk = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Start-time rate limiter with a FIFO queue of pending calls.
///
/// Each gate owns a dispatcher task that pops queued calls in submission
/// order and starts each one no sooner than `1 / requests_per_second`
/// after the previous start. Started calls run as independent tasks, so
/// several may be in flight at once and dropping the future returned by
/// [`CallGate::add`] does not cancel a call.
#[derive(Clone, Debug)]
pub struct CallGate {
    queue: mpsc::UnboundedSender<Thunk>,
    interval: Duration,
}

impl CallGate {
    /// Create a gate and spawn its dispatcher on the current Tokio runtime.
    pub fn new(requests_per_second: f64) -> Result<Self> {
        if !requests_per_second.is_finite() || requests_per_second <= 0.0 {
            return Err(SyncError::Config(format!(
                "requests_per_second must be positive, got {}",
                requests_per_second
            )));
        }
        let handle = Handle::try_current()
            .map_err(|e| SyncError::Config(format!("call gate needs a Tokio runtime: {}", e)))?;

        let interval = Duration::try_from_secs_f64(1.0 / requests_per_second).map_err(|e| {
            SyncError::Config(format!(
                "requests_per_second {} is too small: {}",
                requests_per_second, e
            ))
        })?;
        let (queue, rx) = mpsc::unbounded_channel();
        handle.spawn(dispatch(rx, interval));

        Ok(Self { queue, interval })
    }

    /// Minimum spacing between two call starts.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Queue a call. The call is enqueued before this returns, so
    /// submission order is dispatch order even if the returned futures are
    /// polled out of order.
    pub fn add<F, Fut, T>(&self, call: F) -> impl Future<Output = Result<T>> + Send + use<F, Fut, T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let thunk: Thunk = Box::new(move || {
            Box::pin(async move {
                // the caller may have stopped waiting
                let _ = tx.send(call().await);
            })
        });
        let queued = self.queue.send(thunk).is_ok();

        async move {
            if !queued {
                return Err(SyncError::GateClosed);
            }
            rx.await.map_err(|_| SyncError::GateClosed)?
        }
    }
}

async fn dispatch(mut rx: mpsc::UnboundedReceiver<Thunk>, interval: Duration) {
    let mut next_slot = Instant::now();
    while let Some(thunk) = rx.recv().await {
        let slot = next_slot.max(Instant::now());
        sleep_until(slot).await;
        next_slot = slot + interval;
        trace!("Dispatching queued call");
        tokio::spawn(thunk());
    }
    debug!("Call gate dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_spacing_and_order() {
        let gate = CallGate::new(2.0).unwrap();
        let starts = Arc::new(Mutex::new(Vec::new()));

        let calls: Vec<_> = (0..5)
            .map(|i| {
                let starts = starts.clone();
                gate.add(move || async move {
                    starts.lock().push((i, Instant::now()));
                    Ok(i)
                })
            })
            .collect();

        let results: Vec<i32> = futures::future::try_join_all(calls).await.unwrap();
        assert_eq!(results, vec![0, 1, 2, 3, 4]);

        let starts = starts.lock();
        let order: Vec<i32> = starts.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        for pair in starts.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= Duration::from_millis(500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_overlap_in_flight() {
        let gate = CallGate::new(10.0).unwrap();
        let begin = Instant::now();

        let calls: Vec<_> = (0..3)
            .map(|_| {
                gate.add(|| async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(())
                })
            })
            .collect();
        futures::future::try_join_all(calls).await.unwrap();

        // serialized calls would take 30s
        assert!(begin.elapsed() < Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_future_still_runs() {
        let gate = CallGate::new(1.0).unwrap();
        let ran = Arc::new(AtomicBool::new(false));

        let flag = ran.clone();
        drop(gate.add(move || async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        }));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_error_passes_through() {
        let gate = CallGate::new(100.0).unwrap();
        let res: Result<()> = gate
            .add(|| async { Err(SyncError::Backend("throttled".into())) })
            .await;
        assert!(matches!(res, Err(SyncError::Backend(m)) if m == "throttled"));
    }

    #[tokio::test]
    async fn test_invalid_rate() {
        assert!(matches!(CallGate::new(0.0), Err(SyncError::Config(_))));
        assert!(matches!(CallGate::new(-1.0), Err(SyncError::Config(_))));
        assert!(matches!(CallGate::new(f64::NAN), Err(SyncError::Config(_))));
        assert!(matches!(CallGate::new(1e-30), Err(SyncError::Config(_))));
        assert_eq!(
            CallGate::new(4.0).unwrap().interval(),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_requires_runtime() {
        assert!(matches!(CallGate::new(1.0), Err(SyncError::Config(_))));
    }
}
