//! Rate-limited, bounded-concurrency dispatch queue.
//!
//! One [`Dispatcher`] is shared by every outbound call to a given
//! collaborator. A call first waits for one of `concurrency` permits, then
//! for its slot on a fixed-interval schedule derived from the
//! requests-per-second ceiling. Slots are handed out in arrival order.
//! Only the call itself runs under the timeout; time spent queueing never
//! counts against it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;

use crate::error::ServiceError;

pub struct Dispatcher {
    permits: Arc<Semaphore>,
    interval: Option<Duration>,
    next_slot: Mutex<Instant>,
}

impl Dispatcher {
    /// `requests_per_second` of `None` (or a non-positive value) disables
    /// pacing; concurrency is still bounded.
    pub fn new(concurrency: usize, requests_per_second: Option<f64>) -> Self {
        let interval = requests_per_second
            .filter(|rps| *rps > 0.0 && rps.is_finite())
            .map(|rps| Duration::from_secs_f64(1.0 / rps));
        Self {
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            interval,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Waits for a permit and a rate slot, then runs `call` with at most
    /// `timeout` to finish. The permit is held until `call` completes.
    pub async fn dispatch<T, F, Fut>(&self, timeout: Duration, call: F) -> Result<T, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ServiceError::DispatchClosed)?;
        self.wait_for_slot().await;
        match tokio::time::timeout(timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::Timeout(timeout)),
        }
    }

    async fn wait_for_slot(&self) {
        let Some(interval) = self.interval else {
            return;
        };
        let start = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let start = (*next).max(now);
            *next = start + interval;
            start
        };
        tokio::time::sleep_until(start).await;
    }

    /// Stops handing out permits; waiting and future calls fail with
    /// [`ServiceError::DispatchClosed`].
    pub fn close(&self) {
        self.permits.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CALL_TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_bounds_concurrency() {
        let dispatcher = Arc::new(Dispatcher::new(2, None));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = vec![];
        for _ in 0..8 {
            let dispatcher = dispatcher.clone();
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            tasks.push(tokio::spawn(async move {
                dispatcher
                    .dispatch(CALL_TIMEOUT, || async {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, ServiceError>(())
                    })
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_paces_requests() {
        let dispatcher = Dispatcher::new(4, Some(100.0));
        assert_eq!(dispatcher.interval(), Some(Duration::from_millis(10)));

        let start = Instant::now();
        for _ in 0..5 {
            dispatcher
                .dispatch(CALL_TIMEOUT, || async { Ok::<_, ServiceError>(()) })
                .await
                .unwrap();
        }
        // Five slots at 10ms spacing: the last starts at least 40ms in.
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_closed_dispatcher_fails() {
        let dispatcher = Dispatcher::new(1, None);
        dispatcher.close();
        let result = dispatcher
            .dispatch(CALL_TIMEOUT, || async { Ok::<_, ServiceError>(()) })
            .await;
        assert!(matches!(result, Err(ServiceError::DispatchClosed)));
    }

    #[test]
    fn test_non_positive_rate_disables_pacing() {
        assert_eq!(Dispatcher::new(1, Some(0.0)).interval(), None);
        assert_eq!(Dispatcher::new(1, None).interval(), None);
    }

    #[tokio::test]
    async fn test_queue_wait_is_not_timed() {
        let dispatcher = Arc::new(Dispatcher::new(1, None));
        let timeout = Duration::from_millis(60);

        let mut tasks = vec![];
        for _ in 0..4 {
            let dispatcher = dispatcher.clone();
            tasks.push(tokio::spawn(async move {
                dispatcher
                    .dispatch(timeout, || async {
                        tokio::time::sleep(Duration::from_millis(25)).await;
                        Ok::<_, ServiceError>(())
                    })
                    .await
            }));
        }
        // The last call queues for ~75ms, longer than the timeout.
        for task in tasks {
            task.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let dispatcher = Dispatcher::new(1, None);
        let result = dispatcher
            .dispatch(Duration::from_millis(10), || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, ServiceError>(())
            })
            .await;
        assert!(matches!(result, Err(ServiceError::Timeout(_))));
    }
}
