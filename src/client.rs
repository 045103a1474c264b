use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::time::sleep;

use crate::{
    retry_with_backoff, types::expect_array, BasicData, ClientOptions, ConnectionStatus,
    HealthReport, Notice, PortalError, ReconnectOutcome, ResilienceManager, Result, UnreadCount,
};

const HEALTH_PATH: &str = "/health";
const COMPANIES_PATH: &str = "/api/companies";
const CATEGORIES_PATH: &str = "/api/categories";
const SITE_SETTINGS_PATH: &str = "/api/site-settings";
const USER_STATS_PATH: &str = "/api/user-stats";
const UNREAD_COUNT_PATH: &str = "/api/unread-notifications-count";
const NOTIFICATIONS_PATH: &str = "/api/notifications";
const MARK_ALL_READ_PATH: &str = "/api/mark-notifications-read";

#[derive(Clone)]
/// HTTP client for the portal REST API.
///
/// Every request reports its outcome to the shared [`ResilienceManager`]:
/// success clears the failure counter, connectivity failures advance it and
/// a 401 triggers one-time session expiry.
pub struct PortalClient {
    http: reqwest::Client,
    base_url: String,
    session_cookie: Option<String>,
    options: ClientOptions,
    resilience: Arc<ResilienceManager>,
}

impl fmt::Debug for PortalClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalClient")
            .field("base_url", &self.base_url)
            .field(
                "session_cookie",
                &self.session_cookie.as_ref().map(|_| "<redacted>"),
            )
            .field("options", &self.options)
            .finish()
    }
}

impl PortalClient {
    /// Creates a client for the portal at `base_url` (scheme and host,
    /// e.g. `"https://bills.example.com"`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            session_cookie: None,
            options: ClientOptions::default(),
            resilience: Arc::new(ResilienceManager::new()),
        }
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `PORTAL_BASE_URL`: portal origin (required)
    /// - `PORTAL_SESSION_COOKIE`: session cookie, bare value or `name=value`
    ///   (optional)
    ///
    /// # Example
    ///
    /// ```no_run
    /// use bills_portal_http::PortalClient;
    ///
    /// let portal = PortalClient::from_env().expect("missing PORTAL_BASE_URL");
    /// ```
    pub fn from_env() -> std::result::Result<Self, String> {
        let url = std::env::var("PORTAL_BASE_URL")
            .map_err(|_| "missing PORTAL_BASE_URL environment variable".to_owned())?;
        if url.trim().is_empty() {
            return Err("PORTAL_BASE_URL is set but empty".to_owned());
        }
        let client = Self::new(url.trim());
        match std::env::var("PORTAL_SESSION_COOKIE") {
            Ok(cookie) if !cookie.trim().is_empty() => Ok(client.with_session_cookie(cookie)),
            _ => Ok(client),
        }
    }

    /// Sends the given session cookie with every request.
    ///
    /// A bare value is sent as `session=<value>`.
    pub fn with_session_cookie(mut self, cookie: impl AsRef<str>) -> Self {
        self.session_cookie = Some(normalize_session_cookie(cookie.as_ref()));
        self
    }

    /// Applies timeout, polling and recovery options.
    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.options = opts;
        self
    }

    /// Reports into an existing manager instead of a private one.
    pub fn with_resilience(mut self, resilience: Arc<ResilienceManager>) -> Self {
        self.resilience = resilience;
        self
    }

    /// Shared connection state this client reports into.
    pub fn resilience(&self) -> &Arc<ResilienceManager> {
        &self.resilience
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// GETs `path` and decodes the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, timeout_ms: u64) -> Result<T> {
        let request = self.request(Method::GET, path, timeout_ms);
        self.send_json(request, timeout_ms).await
    }

    /// POSTs `body` as JSON to `path` and decodes the JSON response.
    pub async fn post_json<B, T>(&self, path: &str, body: &B, timeout_ms: u64) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.request(Method::POST, path, timeout_ms).json(body);
        self.send_json(request, timeout_ms).await
    }

    /// Sends a DELETE to `path` and decodes the JSON response.
    pub async fn delete_json<T: DeserializeOwned>(&self, path: &str, timeout_ms: u64) -> Result<T> {
        let request = self.request(Method::DELETE, path, timeout_ms);
        self.send_json(request, timeout_ms).await
    }

    /// Company catalog from `/api/companies`; the body must be a JSON array.
    pub async fn companies(&self) -> Result<Vec<Value>> {
        let body = self
            .get_json(COMPANIES_PATH, self.options.request_timeout_ms)
            .await?;
        expect_array(body, "companies")
    }

    /// Category catalog from `/api/categories`; the body must be a JSON array.
    pub async fn categories(&self) -> Result<Vec<Value>> {
        let body = self
            .get_json(CATEGORIES_PATH, self.options.request_timeout_ms)
            .await?;
        expect_array(body, "categories")
    }

    /// Site settings object, passed through as returned by the backend.
    pub async fn site_settings(&self) -> Result<Value> {
        self.get_json(SITE_SETTINGS_PATH, self.options.request_timeout_ms)
            .await
    }

    /// Dashboard statistics for the signed-in user.
    pub async fn user_stats(&self) -> Result<Value> {
        self.get_json(USER_STATS_PATH, self.options.request_timeout_ms)
            .await
    }

    /// Unread notification count, bounded by `notification_timeout_ms`.
    pub async fn unread_notification_count(&self) -> Result<u64> {
        let body: UnreadCount = self
            .get_json(UNREAD_COUNT_PATH, self.options.notification_timeout_ms)
            .await?;
        Ok(body.count)
    }

    /// Notifications for the signed-in user, newest first.
    pub async fn notifications(&self) -> Result<Vec<Value>> {
        let body = self
            .get_json(NOTIFICATIONS_PATH, self.options.request_timeout_ms)
            .await?;
        expect_array(body, "notifications")
    }

    pub async fn mark_notification_read(&self, id: u64) -> Result<Value> {
        let request = self.request(
            Method::POST,
            &format!("{NOTIFICATIONS_PATH}/{id}/read"),
            self.options.request_timeout_ms,
        );
        self.send_json(request, self.options.request_timeout_ms)
            .await
    }

    /// Marks every notification read and zeroes the tracked unread count, so
    /// the next non-zero count alerts again.
    pub async fn mark_notifications_read(&self) -> Result<Value> {
        let request = self.request(
            Method::POST,
            MARK_ALL_READ_PATH,
            self.options.request_timeout_ms,
        );
        let body = self
            .send_json(request, self.options.request_timeout_ms)
            .await?;
        self.resilience.record_unread(0);
        Ok(body)
    }

    /// Fetches the unread count unless another refresh is in flight or the
    /// session has expired, in which case `Ok(None)` is returned.
    ///
    /// Emits [`Notice::UnreadNotifications`] on the first non-zero count and
    /// whenever the count grows.
    pub async fn refresh_notifications(&self) -> Result<Option<u64>> {
        if self.resilience.is_session_expired() {
            return Ok(None);
        }
        let Some(_guard) = self.resilience.try_begin_notification_update() else {
            return Ok(None);
        };

        let count = self.unread_notification_count().await?;
        let (previous, alert) = self.resilience.record_unread(count);
        if alert {
            self.resilience
                .notify(Notice::UnreadNotifications { count, previous });
        }
        Ok(Some(count))
    }

    /// Probes `/health`. Any non-success status, timeout or network error
    /// yields `false`.
    pub async fn check_server_health(&self) -> bool {
        let timeout_ms = self.options.health_timeout_ms;
        let response = match self
            .request(Method::GET, HEALTH_PATH, timeout_ms)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                let err = PortalError::from_transport(err, timeout_ms);
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %err, "health check failed");
                #[cfg(not(feature = "tracing"))]
                let _ = err;
                return false;
            }
        };

        let status = response.status();
        if !status.is_success() {
            #[cfg(feature = "tracing")]
            tracing::warn!(status = status.as_u16(), "health check returned non-success status");
            return false;
        }

        // The body is informational only.
        let report = response.json::<HealthReport>().await.unwrap_or_default();
        #[cfg(feature = "tracing")]
        tracing::debug!(status = %report.status, database = ?report.database, "server healthy");
        #[cfg(not(feature = "tracing"))]
        let _ = report;
        true
    }

    /// Runs the reconnect loop against `/health`. Returns `true` once the
    /// server answers; the failure counter is reset at that point.
    pub async fn auto_reconnect(&self) -> bool {
        self.reconnect().await.is_reconnected()
    }

    async fn reconnect(&self) -> ReconnectOutcome {
        self.resilience
            .reconnect_with(&self.options.reconnect, || self.check_server_health())
            .await
    }

    /// Manual reconnect: reconnect, then reload basic data.
    pub async fn force_reconnect(&self) -> Result<BasicData> {
        match self.reconnect().await {
            ReconnectOutcome::Reconnected => self.reload_basic_data().await,
            ReconnectOutcome::Exhausted => Err(PortalError::ReconnectExhausted {
                attempts: self.options.reconnect.max_attempts,
            }),
            ReconnectOutcome::AlreadyRunning => Err(PortalError::ReconnectInProgress),
        }
    }

    /// Loads companies, categories, site settings and user stats
    /// concurrently, each under the configured retry policy.
    ///
    /// All four loads are awaited; any failure fails the reload. The batch as
    /// a whole is bounded by `bulk_timeout_ms`.
    pub async fn reload_basic_data(&self) -> Result<BasicData> {
        let policy = &self.options.retry;
        let deadline = Duration::from_millis(self.options.bulk_timeout_ms);

        let batch = async {
            tokio::join!(
                retry_with_backoff(policy, || self.companies()),
                retry_with_backoff(policy, || self.categories()),
                retry_with_backoff(policy, || self.site_settings()),
                retry_with_backoff(policy, || self.user_stats()),
            )
        };

        let outcome = match tokio::time::timeout(deadline, batch).await {
            Ok((companies, categories, site_settings, user_stats)) => {
                BasicData::from_parts(companies, categories, site_settings, user_stats)
            }
            Err(_) => Err(PortalError::Timeout {
                after_ms: self.options.bulk_timeout_ms,
            }),
        };

        match &outcome {
            Ok(_) => {
                self.resilience.reset_failures();
                self.resilience.notify(Notice::DataReloaded);
            }
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %err, "basic data reload failed");
                if err.counts_as_failure() {
                    self.record_failure();
                }
                self.resilience
                    .notify(Notice::ReloadFailed { kind: err.kind() });
            }
        }
        outcome
    }

    /// Records one failed network operation and returns the new status.
    ///
    /// Requests made through this client call it on their own; use it for
    /// failures observed elsewhere, such as a malformed body. Reaching the
    /// severe state schedules one automatic reconnect after
    /// `severe_reconnect_delay_ms`, unless one is already pending. The
    /// scheduled reconnect does nothing if the status is healthy by then.
    pub fn record_failure(&self) -> ConnectionStatus {
        let status = self.resilience.increment_failure();
        if status == ConnectionStatus::Severe && self.resilience.claim_scheduled_reconnect() {
            self.schedule_reconnect();
        }
        status
    }

    fn schedule_reconnect(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            #[cfg(feature = "tracing")]
            tracing::warn!("no tokio runtime; automatic reconnect not scheduled");
            self.resilience.release_scheduled_reconnect();
            return;
        };

        let client = self.clone();
        let delay = Duration::from_millis(self.options.reconnect.severe_reconnect_delay_ms);
        runtime.spawn(async move {
            sleep(delay).await;
            client.resilience.release_scheduled_reconnect();
            if client.resilience.status() == ConnectionStatus::Healthy {
                #[cfg(feature = "tracing")]
                tracing::debug!("connection recovered before scheduled reconnect");
                return;
            }
            client.reconnect().await;
        });
    }

    fn record_error(&self, err: &PortalError) {
        if err.is_session_expired() {
            self.resilience
                .handle_session_expired(&self.options.session_redirect);
        } else if err.counts_as_failure() {
            self.record_failure();
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str, timeout_ms: u64) -> RequestBuilder {
        let request = self
            .http
            .request(method, self.url(path))
            .header(header::CACHE_CONTROL, "no-cache")
            .timeout(Duration::from_millis(timeout_ms));
        match &self.session_cookie {
            Some(cookie) => request.header(header::COOKIE, cookie),
            None => request,
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        timeout_ms: u64,
    ) -> Result<T> {
        let outcome = Self::fetch_json(request, timeout_ms).await;
        match &outcome {
            Ok(_) => self.resilience.reset_failures(),
            Err(err) => self.record_error(err),
        }
        outcome
    }

    async fn fetch_json<T: DeserializeOwned>(request: RequestBuilder, timeout_ms: u64) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|err| PortalError::from_transport(err, timeout_ms))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| PortalError::from_transport(err, timeout_ms))?;

        if !status.is_success() {
            return Err(PortalError::from_status(status.as_u16(), body));
        }

        serde_json::from_str::<T>(&body).map_err(|err| {
            PortalError::Malformed(format!("invalid response JSON: {err}; body: {body}"))
        })
    }
}

fn normalize_session_cookie(cookie: &str) -> String {
    let trimmed = cookie.trim();
    if trimmed.contains('=') {
        trimmed.to_owned()
    } else {
        format!("session={trimmed}")
    }
}
