/// Failure category, fixed where the failure is first observed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// The request was aborted after its deadline.
    Timeout,
    /// The request never reached the server.
    NetworkUnreachable,
    /// 4xx response.
    ClientError { status: u16 },
    /// 5xx (or otherwise unexpected non-success) response.
    ServerError { status: u16 },
    /// Response arrived but its body did not have the expected shape.
    Malformed,
    /// Reconnect loop did not reach the server.
    Reconnect,
}

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    /// The request was cancelled by its timeout.
    #[error("request timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },
    /// Network or request execution error from `reqwest`.
    #[error("network error: {0}")]
    Network(reqwest::Error),
    /// 4xx status with raw response body.
    #[error("client error {status}: {body}")]
    Client { status: u16, body: String },
    /// 5xx status with raw response body.
    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },
    /// Response decoding or shape validation error.
    #[error("malformed response: {0}")]
    Malformed(String),
    /// Every reconnect attempt failed the health check.
    #[error("server unreachable after {attempts} reconnect attempts")]
    ReconnectExhausted { attempts: u32 },
    /// Another reconnect loop is already running.
    #[error("reconnect already in progress")]
    ReconnectInProgress,
}

impl PortalError {
    /// Classifies a non-success HTTP status.
    pub fn from_status(status: u16, body: String) -> Self {
        if (400..500).contains(&status) {
            Self::Client { status, body }
        } else {
            Self::Server { status, body }
        }
    }

    /// Classifies a `reqwest` failure for a request bounded by `timeout_ms`.
    pub fn from_transport(err: reqwest::Error, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                after_ms: timeout_ms,
            }
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Network(err)
        }
    }

    /// Category of the failure, without its payload.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Network(_) => ErrorKind::NetworkUnreachable,
            Self::Client { status, .. } => ErrorKind::ClientError { status: *status },
            Self::Server { status, .. } => ErrorKind::ServerError { status: *status },
            Self::Malformed(_) => ErrorKind::Malformed,
            Self::ReconnectExhausted { .. } | Self::ReconnectInProgress => ErrorKind::Reconnect,
        }
    }

    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Client { status, .. } | Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether re-running the same operation can succeed.
    ///
    /// Timeouts and 401/403/404 responses are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => false,
            Self::Client { status, .. } => !matches!(status, 401 | 403 | 404),
            _ => true,
        }
    }

    /// Whether the failure advances the connection failure counter.
    ///
    /// 401 goes through session expiry and 403 is an access decision, not a
    /// connectivity problem. Malformed bodies are left to the caller.
    pub fn counts_as_failure(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Network(_) | Self::Server { .. } => true,
            Self::Client { status, .. } => !matches!(status, 401 | 403),
            Self::Malformed(_) | Self::ReconnectExhausted { .. } | Self::ReconnectInProgress => {
                false
            }
        }
    }

    /// A 401 response: the backend no longer accepts the session.
    pub fn is_session_expired(&self) -> bool {
        self.status() == Some(401)
    }

    /// Short text suitable for a user-facing alert.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "Connection timed out. Check your network and try again.",
            Self::Network(_) => "Could not reach the server. Check your network and try again.",
            Self::Client { status: 401, .. } => "Your session has expired. Please sign in again.",
            Self::Client { status: 403, .. } => "You do not have permission to perform this action.",
            Self::Client { status: 404, .. } => "The requested item was not found.",
            Self::Client { .. } => "The request was rejected by the server.",
            Self::Server { status: 502 | 503, .. } => {
                "The server is temporarily unavailable. Please try again shortly."
            }
            Self::Server { .. } => "The server failed to process the request.",
            Self::Malformed(_) => "The server returned unexpected data.",
            Self::ReconnectExhausted { .. } | Self::ReconnectInProgress => {
                "Reconnecting to the server failed. Please reload the page."
            }
        }
    }
}
