use std::fmt;

/// Main error type for the inventory pipeline.
///
/// Kept as a flat enum of string-carrying variants (rather than one wrapping
/// a nested source error per variant) so that recoverable errors can be
/// attached to the resource or region they affected without fighting the
/// borrow checker over a boxed `dyn Error`.
#[derive(Debug, Clone)]
pub enum Error {
    /// Malformed policy, invalid regions, unreadable snapshot path. Fatal at
    /// startup — the run aborts before discovery begins.
    Config(String),
    /// An outbound call was classified `mutating` or `unknown` by the
    /// SafetyGate and was refused.
    SafetyViolation {
        /// AWS service the call targeted (e.g. "EC2").
        service: String,
        /// Operation name as presented to the gate (e.g. "TerminateInstances").
        operation: String,
        /// Why the call was refused.
        reason: String,
    },
    /// An operation-level deadline expired before the call returned.
    Timeout {
        /// Human-readable description of what timed out.
        operation: String,
        /// Elapsed time in milliseconds when the timeout fired.
        elapsed_ms: u64,
    },
    /// Error surfaced from the AWS call path itself (throttling, access
    /// denied, not-found, or any 4xx/5xx from the underlying transport).
    AwsApi {
        /// AWS service the call targeted.
        service: String,
        /// Operation name.
        operation: String,
        /// Error message from AWS (or the transport).
        message: String,
        /// Whether retrying the same call might succeed.
        retryable: bool,
    },
    /// A service handler failed to enrich one resource. Always attached to
    /// the resource's `enrichment_errors`, never propagated to the caller.
    Enrichment {
        /// The resource's ARN, or its `service:region:id` key if it has none.
        arn_or_id: String,
        /// What went wrong.
        message: String,
    },
    /// A snapshot's recomputed checksum did not match the stored checksum.
    Integrity {
        /// Snapshot identifier.
        snapshot_id: String,
        /// Checksum recorded in the snapshot header.
        expected: String,
        /// Checksum recomputed from the snapshot's resource list.
        actual: String,
    },
    /// Generic service-side error not covered by a more specific variant.
    Service(String),
    /// Authentication error (bad credentials, expired session token, ...).
    Auth(String),
    /// Network-level error: DNS, connect, TLS handshake, timeout below the
    /// operation-deadline layer.
    Network(String),
    /// Input failed validation before being used.
    Validation(String),
    /// Referenced entity does not exist.
    NotFound(String),
    /// Request was throttled by the remote API.
    RateLimit(String),
    /// Error internal to this process (bug, invariant violation).
    Internal(String),
    /// Connection-establishment error distinct from a mid-request network
    /// error.
    Connection(String),
    /// Operation was cancelled (account deadline exceeded, or a cancellation
    /// token fired).
    Cancelled(String),
    /// Failure to parse a response or a configuration document.
    Parse(String),
    /// IO error (snapshot file read/write, AWS CLI subprocess spawn).
    Io(String),
}

impl Error {
    /// Create a new configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Error::Config(message.into())
    }

    /// Create a new safety-violation error.
    pub fn safety_violation<S: Into<String>>(service: S, operation: S, reason: S) -> Self {
        Error::SafetyViolation {
            service: service.into(),
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout<S: Into<String>>(operation: S, elapsed_ms: u64) -> Self {
        Error::Timeout {
            operation: operation.into(),
            elapsed_ms,
        }
    }

    /// Create a new AWS API error.
    pub fn aws_api<S: Into<String>>(service: S, operation: S, message: S, retryable: bool) -> Self {
        Error::AwsApi {
            service: service.into(),
            operation: operation.into(),
            message: message.into(),
            retryable,
        }
    }

    /// Create a new enrichment error attached to a resource key.
    pub fn enrichment<S: Into<String>>(arn_or_id: S, message: S) -> Self {
        Error::Enrichment {
            arn_or_id: arn_or_id.into(),
            message: message.into(),
        }
    }

    /// Create a new snapshot integrity error.
    pub fn integrity<S: Into<String>>(snapshot_id: S, expected: S, actual: S) -> Self {
        Error::Integrity {
            snapshot_id: snapshot_id.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a new service error.
    pub fn service<S: Into<String>>(message: S) -> Self {
        Error::Service(message.into())
    }

    /// Create a new authentication error.
    pub fn auth<S: Into<String>>(message: S) -> Self {
        Error::Auth(message.into())
    }

    /// Create a new network error.
    pub fn network<S: Into<String>>(message: S) -> Self {
        Error::Network(message.into())
    }

    /// Create a new validation error.
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Error::Validation(message.into())
    }

    /// Create a new not-found error.
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Error::NotFound(message.into())
    }

    /// Create a new rate-limit error.
    pub fn rate_limit<S: Into<String>>(message: S) -> Self {
        Error::RateLimit(message.into())
    }

    /// Create a new internal error.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }

    /// Create a new connection error.
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Error::Connection(message.into())
    }

    /// Create a new cancellation error.
    pub fn cancelled<S: Into<String>>(message: S) -> Self {
        Error::Cancelled(message.into())
    }

    /// Create a new parse error.
    pub fn parsing<S: Into<String>>(message: S) -> Self {
        Error::Parse(message.into())
    }

    /// Create a new IO error.
    pub fn io<S: Into<String>>(message: S) -> Self {
        Error::Io(message.into())
    }

    /// Whether retrying the call that produced this error could succeed.
    /// Used by the SafetyGate's backoff helper: throttling is retried,
    /// access-denied and safety violations never are.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::RateLimit(_) => true,
            Error::AwsApi { retryable, .. } => *retryable,
            Error::Timeout { .. } => true,
            Error::Network(_) | Error::Connection(_) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(message) => write!(f, "configuration error: {}", message),
            Error::SafetyViolation {
                service,
                operation,
                reason,
            } => write!(
                f,
                "safety violation: {}.{} refused ({})",
                service, operation, reason
            ),
            Error::Timeout {
                operation,
                elapsed_ms,
            } => write!(f, "operation '{}' timed out after {}ms", operation, elapsed_ms),
            Error::AwsApi {
                service,
                operation,
                message,
                ..
            } => write!(f, "{}.{} failed: {}", service, operation, message),
            Error::Enrichment { arn_or_id, message } => {
                write!(f, "enrichment failed for {}: {}", arn_or_id, message)
            }
            Error::Integrity {
                snapshot_id,
                expected,
                actual,
            } => write!(
                f,
                "checksum mismatch for snapshot {}: expected {}, got {}",
                snapshot_id, expected, actual
            ),
            Error::Service(message) => write!(f, "service error: {}", message),
            Error::Auth(message) => write!(f, "authentication error: {}", message),
            Error::Network(message) => write!(f, "network error: {}", message),
            Error::Validation(message) => write!(f, "validation error: {}", message),
            Error::NotFound(message) => write!(f, "not found: {}", message),
            Error::RateLimit(message) => write!(f, "rate limited: {}", message),
            Error::Internal(message) => write!(f, "internal error: {}", message),
            Error::Connection(message) => write!(f, "connection error: {}", message),
            Error::Cancelled(message) => write!(f, "cancelled: {}", message),
            Error::Parse(message) => write!(f, "parse error: {}", message),
            Error::Io(message) => write!(f, "io error: {}", message),
        }
    }
}

impl std::error::Error for Error {}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout {
                operation: "http request".to_string(),
                elapsed_ms: 0,
            }
        } else if err.is_connect() {
            Error::Connection(format!("connection failed: {}", err))
        } else if err.is_status() {
            let status = err.status().unwrap_or_default();
            match status.as_u16() {
                401 | 403 => Error::Auth(format!("authentication failed: {}", err)),
                404 => Error::NotFound(format!("resource not found: {}", err)),
                429 => Error::RateLimit(format!("rate limited: {}", err)),
                500..=599 => Error::Service(format!("server error: {}", err)),
                _ => Error::Service(format!("http error: {}", err)),
            }
        } else {
            Error::Network(format!("request failed: {}", err))
        }
    }
}
