//! The FIFO dispatch queue and its single worker.
//!
//! Per-task lifecycle: queued, waiting for a rate-limit slot, dispatched,
//! then either succeeded, retrying after a backoff, or failed. The
//! transitions are decided by [`classify_status`] and [`backoff_delay`],
//! which are kept as plain functions so the state machine is testable
//! without a network.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

use crate::config::DispatchSettings;

use super::limiter::RequestWindow;
use super::transport::{OutboundRequest, Transport};

/// Terminal failure reported to the enqueuer.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// The queue is full; the caller should surface an error rather than
    /// letting work pile up without bound.
    #[error("dispatch queue full, request rejected")]
    Backpressure,
    /// The dispatcher stopped before the task completed.
    #[error("dispatcher shut down")]
    Shutdown,
    /// Downstream rejected the request with a non-retryable status.
    #[error("{label} rejected with HTTP {status}")]
    Rejected {
        label: String,
        status: u16,
        body: Value,
    },
    /// The attempt budget ran out on retryable failures.
    #[error("{label} failed after {attempts} attempts: {last_error}")]
    Exhausted {
        label: String,
        attempts: u32,
        last_error: String,
    },
}

/// Successful dispatch: the downstream response.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub status: u16,
    pub body: Value,
    pub attempts: u32,
}

type Completion = oneshot::Sender<Result<DispatchOutcome, DispatchError>>;

struct QueuedTask {
    request: OutboundRequest,
    done: Completion,
}

/// Cheap cloneable handle used by HTTP handlers to enqueue work.
#[derive(Clone)]
pub struct DispatchHandle {
    tx: mpsc::Sender<QueuedTask>,
}

impl DispatchHandle {
    /// Enqueue a request for dispatch.
    ///
    /// Returns a ticket the caller may await (blocking pattern) or drop
    /// after handing it to an out-of-band logger (ack-first pattern). Once
    /// enqueued a task always runs to a terminal state; there is no
    /// cancellation.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Backpressure`] when the queue is at capacity,
    /// [`DispatchError::Shutdown`] when the dispatcher has stopped.
    pub fn enqueue(&self, request: OutboundRequest) -> Result<DispatchTicket, DispatchError> {
        let (done, rx) = oneshot::channel();
        let label = request.label.clone();

        match self.tx.try_send(QueuedTask { request, done }) {
            Ok(()) => Ok(DispatchTicket { rx, label }),
            Err(mpsc::error::TrySendError::Full(_)) => Err(DispatchError::Backpressure),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DispatchError::Shutdown),
        }
    }
}

/// A pending completion for one enqueued task.
#[derive(Debug)]
pub struct DispatchTicket {
    rx: oneshot::Receiver<Result<DispatchOutcome, DispatchError>>,
    label: String,
}

impl DispatchTicket {
    /// The label of the underlying request, for logging.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Wait until the task reaches a terminal state.
    ///
    /// # Errors
    ///
    /// Returns the task's terminal [`DispatchError`], or
    /// [`DispatchError::Shutdown`] when the dispatcher stopped first.
    pub async fn outcome(self) -> Result<DispatchOutcome, DispatchError> {
        self.rx.await.unwrap_or(Err(DispatchError::Shutdown))
    }
}

/// The dispatch queue component. Owns the worker task; constructed at
/// startup and handed to handlers through the application state.
pub struct Dispatcher {
    handle: DispatchHandle,
    worker: tokio::task::JoinHandle<()>,
}

impl Dispatcher {
    /// Spawn the worker and return the owning component.
    #[must_use]
    pub fn spawn(
        settings: DispatchSettings,
        transport: Arc<dyn Transport>,
        dry_run: bool,
    ) -> Self {
        let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
        let worker = tokio::spawn(worker_loop(rx, settings, transport, dry_run));

        Self {
            handle: DispatchHandle { tx },
            worker,
        }
    }

    /// A handle for enqueuing work.
    #[must_use]
    pub fn handle(&self) -> DispatchHandle {
        self.handle.clone()
    }

    /// Stop accepting work from this component's own handle and wait for
    /// the queue to drain. Clones of the handle keep the worker alive until
    /// they are dropped too.
    pub async fn shutdown(self) {
        drop(self.handle);
        if self.worker.await.is_err() {
            warn!("dispatch worker ended abnormally");
        }
    }
}

async fn worker_loop(
    mut rx: mpsc::Receiver<QueuedTask>,
    settings: DispatchSettings,
    transport: Arc<dyn Transport>,
    dry_run: bool,
) {
    let mut window = RequestWindow::new(settings.max_per_second, settings.max_per_minute);

    while let Some(task) = rx.recv().await {
        let result = process_task(
            &task.request,
            &mut window,
            &settings,
            transport.as_ref(),
            dry_run,
        )
        .await;

        // The caller may have detached (ack-first pattern); a closed
        // completion channel is not an error.
        let _ = task.done.send(result);
    }

    debug!("dispatch worker stopped");
}

/// Drive one task to a terminal state.
async fn process_task(
    request: &OutboundRequest,
    window: &mut RequestWindow,
    settings: &DispatchSettings,
    transport: &dyn Transport,
    dry_run: bool,
) -> Result<DispatchOutcome, DispatchError> {
    if dry_run {
        info!(label = %request.label, body = %request.body, "dry run, skipping dispatch");
        return Ok(DispatchOutcome {
            status: 0,
            body: Value::Null,
            attempts: 0,
        });
    }

    let mut attempt: u32 = 1;
    loop {
        wait_for_slot(window).await;
        window.record(Instant::now());

        debug!(label = %request.label, attempt, "dispatching");

        let (last_error, retry_after) = match transport.execute(request).await {
            Ok(response) => match classify_status(response.status) {
                AttemptVerdict::Success => {
                    debug!(label = %request.label, status = response.status, attempt, "dispatched");
                    return Ok(DispatchOutcome {
                        status: response.status,
                        body: response.body,
                        attempts: attempt,
                    });
                }
                AttemptVerdict::Fail => {
                    // Permanent rejection: keep the payload in the log for diagnosis.
                    warn!(
                        label = %request.label,
                        status = response.status,
                        response = %response.body,
                        payload = %request.body,
                        "downstream rejected request"
                    );
                    return Err(DispatchError::Rejected {
                        label: request.label.clone(),
                        status: response.status,
                        body: response.body,
                    });
                }
                AttemptVerdict::Retry => (format!("HTTP {}", response.status), response.retry_after),
            },
            Err(err) => (err.to_string(), None),
        };

        if attempt >= settings.max_attempts {
            error!(
                label = %request.label,
                attempts = attempt,
                error = %last_error,
                "retry budget exhausted"
            );
            return Err(DispatchError::Exhausted {
                label: request.label.clone(),
                attempts: attempt,
                last_error,
            });
        }

        let delay = backoff_delay(attempt, retry_after, settings, jitter(settings.retry_jitter));
        debug!(
            label = %request.label,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %last_error,
            "retrying after backoff"
        );
        sleep(delay).await;
        attempt += 1;
    }
}

/// Sleep until the rate limiter clears a slot. Conditions may have changed
/// while sleeping, so the delay is always re-evaluated before returning.
async fn wait_for_slot(window: &mut RequestWindow) {
    loop {
        let delay = window.required_delay(Instant::now());
        if delay.is_zero() {
            return;
        }
        sleep(delay).await;
    }
}

/// Per-attempt verdict on an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptVerdict {
    Success,
    Retry,
    Fail,
}

/// 2xx succeeds, 429 and 5xx are retryable, every other status is final.
const fn classify_status(status: u16) -> AttemptVerdict {
    match status {
        200..=299 => AttemptVerdict::Success,
        429 | 500..=599 => AttemptVerdict::Retry,
        _ => AttemptVerdict::Fail,
    }
}

/// Backoff before the next attempt: a server-supplied `Retry-After` wins,
/// otherwise the delay grows linearly with the attempt number plus jitter,
/// capped.
fn backoff_delay(
    attempt: u32,
    retry_after: Option<Duration>,
    settings: &DispatchSettings,
    jitter: Duration,
) -> Duration {
    retry_after.unwrap_or_else(|| {
        settings
            .retry_cap
            .min(settings.retry_base.saturating_mul(attempt).saturating_add(jitter))
    })
}

fn jitter(cap: Duration) -> Duration {
    let cap_ms = u64::try_from(cap.as_millis()).unwrap_or(u64::MAX);
    if cap_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=cap_ms))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dispatch::transport::{RequestAuth, TransportError, TransportResponse};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted transport: pops one canned reply per call and records when
    /// each attempt happened.
    struct ScriptedTransport {
        replies: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Result<TransportResponse, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        /// Replies 200 to everything.
        fn always_ok() -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(VecDeque::new()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn execute(
            &self,
            _request: &OutboundRequest,
        ) -> Result<TransportResponse, TransportError> {
            self.calls.lock().unwrap().push(Instant::now());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ok_response(200)))
        }
    }

    fn ok_response(status: u16) -> TransportResponse {
        TransportResponse {
            status,
            retry_after: None,
            body: serde_json::json!([{"success": true, "id": 1}]),
        }
    }

    fn plain_response(status: u16) -> Result<TransportResponse, TransportError> {
        Ok(TransportResponse {
            status,
            retry_after: None,
            body: Value::Null,
        })
    }

    fn request(label: &str) -> OutboundRequest {
        OutboundRequest {
            label: label.to_string(),
            url: "https://api.cin7.example/v1/Quotes?loadboms=false".to_string(),
            auth: RequestAuth::Basic {
                username: "user".to_string(),
                api_key: secrecy::SecretString::from("key"),
            },
            body: serde_json::json!([{"reference": label}]),
        }
    }

    fn settings() -> DispatchSettings {
        DispatchSettings {
            retry_jitter: Duration::ZERO,
            ..DispatchSettings::default()
        }
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(200), AttemptVerdict::Success);
        assert_eq!(classify_status(204), AttemptVerdict::Success);
        assert_eq!(classify_status(429), AttemptVerdict::Retry);
        assert_eq!(classify_status(500), AttemptVerdict::Retry);
        assert_eq!(classify_status(503), AttemptVerdict::Retry);
        assert_eq!(classify_status(400), AttemptVerdict::Fail);
        assert_eq!(classify_status(401), AttemptVerdict::Fail);
        assert_eq!(classify_status(404), AttemptVerdict::Fail);
        assert_eq!(classify_status(301), AttemptVerdict::Fail);
    }

    #[test]
    fn test_backoff_prefers_retry_after() {
        let settings = settings();
        let delay = backoff_delay(1, Some(Duration::from_secs(2)), &settings, Duration::ZERO);
        assert_eq!(delay, Duration::from_secs(2));
    }

    #[test]
    fn test_backoff_grows_linearly_and_caps() {
        let settings = settings();
        assert_eq!(
            backoff_delay(1, None, &settings, Duration::ZERO),
            Duration::from_millis(500)
        );
        assert_eq!(
            backoff_delay(3, None, &settings, Duration::from_millis(100)),
            Duration::from_millis(1600)
        );
        // 500ms * 40 = 20s, capped at 10s.
        assert_eq!(backoff_delay(40, None, &settings, Duration::ZERO), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_try() {
        let transport = ScriptedTransport::always_ok();
        let dispatcher = Dispatcher::spawn(settings(), transport.clone(), false);

        let ticket = dispatcher.handle().enqueue(request("q1")).unwrap();
        let outcome = ticket.outcome().await.unwrap();

        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(transport.call_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_500_exhausts_the_attempt_budget() {
        let transport = ScriptedTransport::new(vec![
            plain_response(500),
            plain_response(500),
            plain_response(500),
            plain_response(500),
            // Would succeed on a fifth attempt, but the budget is four.
            plain_response(200),
        ]);
        let dispatcher = Dispatcher::spawn(settings(), transport.clone(), false);

        let ticket = dispatcher.handle().enqueue(request("q1")).unwrap();
        let err = ticket.outcome().await.unwrap_err();

        match err {
            DispatchError::Exhausted { attempts, .. } => assert_eq!(attempts, 4),
            other => panic!("expected Exhausted, got {other:?}"),
        }
        assert_eq!(transport.call_times().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_429_honors_retry_after() {
        let transport = ScriptedTransport::new(vec![
            Ok(TransportResponse {
                status: 429,
                retry_after: Some(Duration::from_secs(2)),
                body: Value::Null,
            }),
            plain_response(200),
        ]);
        let dispatcher = Dispatcher::spawn(settings(), transport.clone(), false);

        let ticket = dispatcher.handle().enqueue(request("q1")).unwrap();
        let outcome = ticket.outcome().await.unwrap();
        assert_eq!(outcome.attempts, 2);

        let calls = transport.call_times();
        assert_eq!(calls.len(), 2);
        let gap = calls[1].duration_since(calls[0]);
        assert!(gap >= Duration::from_secs(2), "waited only {gap:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_4xx_is_not_retried() {
        let transport = ScriptedTransport::new(vec![Ok(TransportResponse {
            status: 422,
            retry_after: None,
            body: serde_json::json!({"errors": ["bad sku"]}),
        })]);
        let dispatcher = Dispatcher::spawn(settings(), transport.clone(), false);

        let ticket = dispatcher.handle().enqueue(request("q1")).unwrap();
        let err = ticket.outcome().await.unwrap_err();

        match err {
            DispatchError::Rejected { status, .. } => assert_eq!(status, 422),
            other => panic!("expected Rejected, got {other:?}"),
        }
        assert_eq!(transport.call_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_errors_are_retried() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError("connection refused".to_string())),
            plain_response(200),
        ]);
        let dispatcher = Dispatcher::spawn(settings(), transport.clone(), false);

        let ticket = dispatcher.handle().enqueue(request("q1")).unwrap();
        let outcome = ticket.outcome().await.unwrap();
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_respects_both_sliding_windows() {
        let transport = ScriptedTransport::always_ok();
        let limits = DispatchSettings {
            max_per_second: 3,
            max_per_minute: 20,
            retry_jitter: Duration::ZERO,
            ..DispatchSettings::default()
        };
        let dispatcher = Dispatcher::spawn(limits, transport.clone(), false);
        let handle = dispatcher.handle();

        let tickets: Vec<_> = (0..50)
            .map(|i| handle.enqueue(request(&format!("q{i}"))).unwrap())
            .collect();
        for ticket in tickets {
            ticket.outcome().await.unwrap();
        }

        let calls = transport.call_times();
        assert_eq!(calls.len(), 50);

        // FIFO: timestamps must be non-decreasing.
        for pair in calls.windows(2) {
            assert!(pair[0] <= pair[1]);
        }

        // No trailing window may exceed its limit.
        for (i, &start) in calls.iter().enumerate() {
            let in_second = calls
                .iter()
                .filter(|&&t| t >= start && t.duration_since(start) < Duration::from_secs(1))
                .count();
            let in_minute = calls
                .iter()
                .filter(|&&t| t >= start && t.duration_since(start) < Duration::from_secs(60))
                .count();
            assert!(in_second <= 3, "window starting at call {i} saw {in_second} in 1s");
            assert!(in_minute <= 20, "window starting at call {i} saw {in_minute} in 60s");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_reports_backpressure() {
        // A transport that never completes keeps the worker busy so the
        // channel fills up.
        struct StuckTransport;

        #[async_trait]
        impl Transport for StuckTransport {
            async fn execute(
                &self,
                _request: &OutboundRequest,
            ) -> Result<TransportResponse, TransportError> {
                std::future::pending().await
            }
        }

        let limits = DispatchSettings {
            queue_capacity: 1,
            ..settings()
        };
        let dispatcher = Dispatcher::spawn(limits, Arc::new(StuckTransport), false);
        let handle = dispatcher.handle();

        // First task is picked up by the worker, second fills the queue.
        let _in_flight = handle.enqueue(request("q1")).unwrap();
        tokio::task::yield_now().await;
        let _queued = handle.enqueue(request("q2")).unwrap();

        let err = handle.enqueue(request("q3")).unwrap_err();
        assert!(matches!(err, DispatchError::Backpressure));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dry_run_skips_the_transport() {
        let transport = ScriptedTransport::always_ok();
        let dispatcher = Dispatcher::spawn(settings(), transport.clone(), true);

        let ticket = dispatcher.handle().enqueue(request("q1")).unwrap();
        let outcome = ticket.outcome().await.unwrap();

        assert_eq!(outcome.attempts, 0);
        assert!(transport.call_times().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tasks_complete_in_fifo_order() {
        let transport = ScriptedTransport::always_ok();
        let dispatcher = Dispatcher::spawn(settings(), transport.clone(), false);
        let handle = dispatcher.handle();

        let first = handle.enqueue(request("first")).unwrap();
        let second = handle.enqueue(request("second")).unwrap();
        let third = handle.enqueue(request("third")).unwrap();

        // All three complete; the recorded call order matches enqueue order.
        first.outcome().await.unwrap();
        second.outcome().await.unwrap();
        third.outcome().await.unwrap();
        assert_eq!(transport.call_times().len(), 3);
    }
}
