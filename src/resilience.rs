use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{ConnectionStatus, ErrorKind, ReconnectPolicy};

const NOTICE_CAPACITY: usize = 64;

/// One step of an active reconnect loop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReconnectAttempt {
    /// 1-indexed attempt number.
    pub attempt: u32,
    pub max_attempts: u32,
    /// Backoff applied if this attempt fails.
    pub delay: Duration,
}

/// Events the embedding UI turns into alerts, banners or redirects.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Notice {
    Reconnecting(ReconnectAttempt),
    Reconnected,
    ReconnectFailed,
    DataReloaded,
    ReloadFailed { kind: ErrorKind },
    /// Emitted once per manager; polling has already been stopped.
    SessionExpired { redirect_to: String },
    UnreadNotifications { count: u64, previous: u64 },
}

/// Result of [`ResilienceManager::reconnect_with`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReconnectOutcome {
    Reconnected,
    Exhausted,
    /// Another loop held the reconnect guard; nothing was probed.
    AlreadyRunning,
}

impl ReconnectOutcome {
    pub fn is_reconnected(self) -> bool {
        matches!(self, Self::Reconnected)
    }
}

/// Releases an in-progress flag when dropped.
#[derive(Debug)]
pub struct FlagGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> FlagGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Process-wide connection state: consecutive failures, reconnect and
/// polling guards, and one-shot session expiry.
///
/// Create one per application and share it by `Arc`; every
/// [`PortalClient`](crate::PortalClient) clone reports into the same manager.
#[derive(Debug)]
pub struct ResilienceManager {
    failures: AtomicU32,
    reconnect_in_progress: AtomicBool,
    reconnect_scheduled: AtomicBool,
    notification_update_in_progress: AtomicBool,
    first_notification_check: AtomicBool,
    unread_count: AtomicU64,
    session_expired: AtomicBool,
    polling: CancellationToken,
    status_tx: watch::Sender<ConnectionStatus>,
    notices: broadcast::Sender<Notice>,
}

impl Default for ResilienceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ResilienceManager {
    pub fn new() -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Healthy);
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            failures: AtomicU32::new(0),
            reconnect_in_progress: AtomicBool::new(false),
            reconnect_scheduled: AtomicBool::new(false),
            notification_update_in_progress: AtomicBool::new(false),
            first_notification_check: AtomicBool::new(true),
            unread_count: AtomicU64::new(0),
            session_expired: AtomicBool::new(false),
            polling: CancellationToken::new(),
            status_tx,
            notices,
        }
    }

    /// Current consecutive failure count.
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::Acquire)
    }

    /// Connectivity state for the current counter.
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus::from_failures(self.failures())
    }

    /// Records one failed network operation and publishes the new status.
    ///
    /// Callers outside the crate go through
    /// [`PortalClient::record_failure`](crate::PortalClient::record_failure),
    /// which also schedules the severe-state reconnect.
    pub(crate) fn increment_failure(&self) -> ConnectionStatus {
        let previous = self
            .failures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_add(1))
            })
            .unwrap_or_else(|n| n);
        let failures = previous.saturating_add(1);

        #[cfg(feature = "tracing")]
        tracing::warn!(failures, "connection failure recorded");

        self.publish(ConnectionStatus::from_failures(failures))
    }

    /// Clears the counter after any successful network operation.
    pub fn reset_failures(&self) {
        let previous = self.failures.swap(0, Ordering::AcqRel);

        #[cfg(feature = "tracing")]
        tracing::debug!(previous, "connection failures reset");
        #[cfg(not(feature = "tracing"))]
        let _ = previous;

        self.publish(ConnectionStatus::Healthy);
    }

    fn publish(&self, status: ConnectionStatus) -> ConnectionStatus {
        self.status_tx.send_if_modified(|current| {
            let changed = *current != status;
            *current = status;
            changed
        });
        status
    }

    /// Receives every status transition.
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// Receives notices emitted after subscribing.
    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    pub(crate) fn notify(&self, notice: Notice) {
        // No subscribers is fine.
        let _ = self.notices.send(notice);
    }

    /// Claims the single pending automatic-reconnect slot.
    ///
    /// Returns `false` while a previously scheduled reconnect has not fired yet.
    pub fn claim_scheduled_reconnect(&self) -> bool {
        self.reconnect_scheduled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn release_scheduled_reconnect(&self) {
        self.reconnect_scheduled.store(false, Ordering::Release);
    }

    pub fn is_reconnect_scheduled(&self) -> bool {
        self.reconnect_scheduled.load(Ordering::Acquire)
    }

    /// Marks a reconnect loop as running, or returns `None` if one already is.
    pub fn try_begin_reconnect(&self) -> Option<FlagGuard<'_>> {
        FlagGuard::acquire(&self.reconnect_in_progress)
    }

    pub fn is_reconnecting(&self) -> bool {
        self.reconnect_in_progress.load(Ordering::Acquire)
    }

    /// Probes until one health check passes or `policy.max_attempts` fail.
    ///
    /// Failed attempt `n` is followed by `policy.delay_for(n)`; the last one
    /// returns immediately. Success resets the failure counter.
    pub async fn reconnect_with<F, Fut>(
        &self,
        policy: &ReconnectPolicy,
        mut probe: F,
    ) -> ReconnectOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let Some(_guard) = self.try_begin_reconnect() else {
            #[cfg(feature = "tracing")]
            tracing::debug!("reconnect already running; skipping");
            return ReconnectOutcome::AlreadyRunning;
        };

        for attempt in 1..=policy.max_attempts {
            let step = ReconnectAttempt {
                attempt,
                max_attempts: policy.max_attempts,
                delay: policy.delay_for(attempt),
            };

            #[cfg(feature = "tracing")]
            tracing::info!(attempt, max_attempts = step.max_attempts, "reconnect attempt");

            self.notify(Notice::Reconnecting(step));
            if probe().await {
                self.reset_failures();
                self.notify(Notice::Reconnected);
                return ReconnectOutcome::Reconnected;
            }
            if attempt < policy.max_attempts {
                sleep(step.delay).await;
            }
        }

        #[cfg(feature = "tracing")]
        tracing::error!(attempts = policy.max_attempts, "reconnect failed after all attempts");

        self.notify(Notice::ReconnectFailed);
        ReconnectOutcome::Exhausted
    }

    /// Marks the session as expired. Only the first call returns `true`,
    /// stops polling and emits [`Notice::SessionExpired`].
    pub fn handle_session_expired(&self, redirect_to: &str) -> bool {
        if self.session_expired.swap(true, Ordering::AcqRel) {
            return false;
        }

        #[cfg(feature = "tracing")]
        tracing::warn!(redirect_to, "session expired; stopping polling");

        self.polling.cancel();
        self.notify(Notice::SessionExpired {
            redirect_to: redirect_to.to_owned(),
        });
        true
    }

    pub fn is_session_expired(&self) -> bool {
        self.session_expired.load(Ordering::Acquire)
    }

    /// Token cancelled on session expiry. Pollers should use a child token.
    pub fn polling_token(&self) -> &CancellationToken {
        &self.polling
    }

    pub(crate) fn try_begin_notification_update(&self) -> Option<FlagGuard<'_>> {
        FlagGuard::acquire(&self.notification_update_in_progress)
    }

    /// Stores a fresh unread count. Returns the previous count and whether
    /// the UI should be alerted: on the first non-zero count, or when the
    /// count grows.
    pub(crate) fn record_unread(&self, count: u64) -> (u64, bool) {
        let previous = self.unread_count.swap(count, Ordering::AcqRel);
        if count == 0 {
            return (previous, false);
        }
        let first = self.first_notification_check.swap(false, Ordering::AcqRel);
        (previous, first || count > previous)
    }

    pub fn unread_count(&self) -> u64 {
        self.unread_count.load(Ordering::Acquire)
    }
}
