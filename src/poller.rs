use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::PortalClient;

/// Background task that refreshes the unread notification count.
///
/// Polls once immediately and then every `poll_interval_ms`. Stops when
/// [`NotificationPoller::stop`] is called, the handle is dropped, or the
/// session expires.
#[derive(Debug)]
pub struct NotificationPoller {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl NotificationPoller {
    /// Spawns the poller on the current tokio runtime.
    pub fn spawn(client: PortalClient) -> Self {
        let token = client.resilience().polling_token().child_token();
        let period = Duration::from_millis(client.options().poll_interval_ms.max(1));
        let task = tokio::spawn(run(client, period, token.clone()));
        Self {
            token,
            task: Some(task),
        }
    }

    /// Stops this poller only; other pollers keep running.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the polling task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Waits for the polling task to exit.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for NotificationPoller {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn run(client: PortalClient, period: Duration, token: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        tokio::select! {
            _ = token.cancelled() => break,
            outcome = client.refresh_notifications() => {
                if let Err(err) = outcome {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %err, "notification refresh failed");
                    #[cfg(not(feature = "tracing"))]
                    let _ = err;
                }
            }
        }

        if client.resilience().is_session_expired() {
            break;
        }
    }

    #[cfg(feature = "tracing")]
    tracing::debug!("notification polling stopped");
}
