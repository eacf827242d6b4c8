use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error as ThisError;

/// Boxed error detail type.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid or unknown configuration. Fatal for the component.
    Config,
    /// Consume was invoked twice on a single-upstream component.
    AlreadyStarted,
    /// A message could not be delivered downstream. Transient.
    Delivery,
    /// A wait-for-close deadline elapsed before the component drained.
    Timeout,
    /// Shutdown was observed while a message was still in flight.
    Cancelled,
    /// A reader or writer lost its connection to the external endpoint.
    NotConnected,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Config => write!(f, "config"),
            ErrorKind::AlreadyStarted => write!(f, "already started"),
            ErrorKind::Delivery => write!(f, "delivery"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::Cancelled => write!(f, "cancelled"),
            ErrorKind::NotConnected => write!(f, "not connected"),
        }
    }
}

pub struct ErrorInner {
    pub kind: ErrorKind,
    pub source: Option<BoxError>,
    pub message: Option<String>,
}

/// Error type shared across the workspace.
///
/// The inner record is behind an `Arc` so a single failure can be cloned
/// onto every reply sink of a combined batch.
#[derive(Clone)]
pub struct Error {
    inner: Arc<ErrorInner>,
}

impl Error {
    pub fn new<E>(kind: ErrorKind, source: Option<E>) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            inner: Arc::new(ErrorInner {
                kind,
                source: source.map(Into::into),
                message: None,
            }),
        }
    }

    pub fn with_message<E>(kind: ErrorKind, message: impl Into<String>, source: Option<E>) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            inner: Arc::new(ErrorInner {
                kind,
                source: source.map(Into::into),
                message: Some(message.into()),
            }),
        }
    }

    pub fn config(message: impl Into<String>) -> Error {
        Error::with_message(ErrorKind::Config, message, None::<BoxError>)
    }

    pub fn already_started() -> Error {
        Error::with_message(
            ErrorKind::AlreadyStarted,
            "consumer already started",
            None::<BoxError>,
        )
    }

    pub fn delivery(message: impl Into<String>) -> Error {
        Error::with_message(ErrorKind::Delivery, message, None::<BoxError>)
    }

    pub fn timeout(message: impl Into<String>) -> Error {
        Error::with_message(ErrorKind::Timeout, message, None::<BoxError>)
    }

    pub fn cancelled() -> Error {
        Error::with_message(
            ErrorKind::Cancelled,
            "component shut down while the message was in flight",
            None::<BoxError>,
        )
    }

    pub fn not_connected() -> Error {
        Error::with_message(
            ErrorKind::NotConnected,
            "endpoint connection is not established",
            None::<BoxError>,
        )
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.inner.kind
    }

    pub fn is_config(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Config)
    }

    pub fn is_already_started(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::AlreadyStarted)
    }

    pub fn is_delivery(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Delivery)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Timeout)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Cancelled)
    }

    pub fn is_not_connected(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::NotConnected)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_struct("sluice::Error");
        f.field("kind", &self.inner.kind);
        if let Some(ref message) = self.inner.message {
            f.field("message", message);
        }
        if let Some(ref source) = self.inner.source {
            f.field("source", source);
        }
        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref message) = self.inner.message {
            write!(f, "{} error: {}", self.inner.kind, message)?;
        } else {
            write!(f, "{} error", self.inner.kind)?;
        }

        if let Some(ref source) = self.inner.source {
            write!(f, ": {source}")?;
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .source
            .as_ref()
            .map(|e| &**e as &(dyn StdError + 'static))
    }
}

/// Configuration errors raised during component construction.
#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("unknown {kind} type '{name}'")]
    UnknownType { kind: &'static str, name: String },
    #[error("invalid value for field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("configuration could not be serialised: {0}")]
    Serialise(String),
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::new(ErrorKind::Config, Some(err))
    }
}
