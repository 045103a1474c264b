//! `bills-portal-http` is an async HTTP client for the bills administration
//! portal API with connection resilience built in.
//!
//! Every request reports into a shared [`ResilienceManager`], which counts
//! consecutive failures and derives a [`ConnectionStatus`] from them.
//!
//! Recovery entry points:
//! - [`PortalClient::record_failure`]
//! - [`PortalClient::check_server_health`]
//! - [`PortalClient::auto_reconnect`]
//! - [`PortalClient::reload_basic_data`]
//! - [`retry_with_backoff`]
//!
//! Status changes and [`Notice`]s are published on channels for the
//! embedding UI to render.

mod client;
mod error;
mod options;
mod poller;
mod resilience;
mod retry;
mod status;
mod types;

pub use client::PortalClient;
pub use error::{ErrorKind, PortalError};
pub use options::{ClientOptions, ReconnectPolicy, RetryPolicy};
pub use poller::NotificationPoller;
pub use resilience::{FlagGuard, Notice, ReconnectAttempt, ReconnectOutcome, ResilienceManager};
pub use retry::{retry_with_backoff, retry_with_delay};
pub use status::{ConnectionStatus, DEGRADED_THRESHOLD, SEVERE_THRESHOLD};
pub use types::{BasicData, HealthReport, UnreadCount};

pub type Result<T> = std::result::Result<T, PortalError>;
