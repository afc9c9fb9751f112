//! Progress logging for long-running remote calls.
//!
//! A side task wakes every 10 s while a request is outstanding and logs how
//! long it has been waiting. It is aborted as soon as the request finishes,
//! on success and error paths alike (dropping the monitor aborts it too).

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
const THRESHOLDS_SECS: [u64; 5] = [30, 60, 120, 180, 300];
const INFO_SPACING: Duration = Duration::from_secs(60);
const WARN_WINDOW: Duration = Duration::from_secs(60);
const WARN_SPACING: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    StillWaiting { elapsed: Duration, remaining: Duration },
    TimeoutNear { remaining: Duration },
}

/// Decides what, if anything, to log at each poll.
#[derive(Debug, Clone)]
pub struct ProgressState {
    timeout: Duration,
    last_logged: Duration,
}

impl ProgressState {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_logged: Duration::ZERO,
        }
    }

    /// Both rules are evaluated on the same poll; the warning wins when both fire.
    pub fn observe(&mut self, elapsed: Duration) -> Option<ProgressEvent> {
        let remaining = self.timeout.saturating_sub(elapsed);
        let mut event = None;

        let crossed = THRESHOLDS_SECS.iter().any(|&t| elapsed >= Duration::from_secs(t));
        if crossed && elapsed.saturating_sub(self.last_logged) >= INFO_SPACING {
            event = Some(ProgressEvent::StillWaiting { elapsed, remaining });
            self.last_logged = elapsed;
        }

        if remaining <= WARN_WINDOW && elapsed.saturating_sub(self.last_logged) >= WARN_SPACING {
            event = Some(ProgressEvent::TimeoutNear { remaining });
            self.last_logged = elapsed;
        }

        event
    }
}

pub struct ProgressMonitor {
    handle: Option<JoinHandle<()>>,
}

impl ProgressMonitor {
    pub fn spawn(service: &str, timeout: Duration) -> Self {
        Self::with_interval(service, timeout, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_interval(service: &str, timeout: Duration, interval: Duration) -> Self {
        let service = service.to_string();
        let handle = tokio::spawn(async move {
            let start = Instant::now();
            let mut state = ProgressState::new(timeout);
            loop {
                tokio::time::sleep(interval).await;
                let elapsed = start.elapsed();
                match state.observe(elapsed) {
                    Some(ProgressEvent::StillWaiting { elapsed, remaining }) => tracing::info!(
                        service = %service,
                        elapsed_secs = elapsed.as_secs(),
                        remaining_secs = remaining.as_secs(),
                        "Request still in progress"
                    ),
                    Some(ProgressEvent::TimeoutNear { remaining }) => tracing::warn!(
                        service = %service,
                        remaining_secs = remaining.as_secs(),
                        "Request close to timeout"
                    ),
                    None => {}
                }
                if elapsed >= timeout {
                    break;
                }
            }
        });
        Self { handle: Some(handle) }
    }

    /// Aborts the side task and waits for it to wind down.
    pub async fn stop(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
