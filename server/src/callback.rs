//! Callback registry for correlated access log entries.
//!
//! Sinks implement [`AccessLogCallback`]. The server is constructed with one
//! [`CallbackList`], an ordered, immutable list shared by every stream. For
//! each HTTP entry, callbacks run in registration order and each one finishes
//! before the next starts.

use async_trait::async_trait;
use shared::envoy::service::accesslog::v2::StreamAccessLogsMessage;
use std::str::FromStr;
use std::sync::Arc;

use crate::context::EntryContext;
use crate::error::{CallbackError, ParsePolicyError};

/// A consumer of correlated access log entries.
///
/// Callbacks are shared between all concurrently open streams and must be
/// safe to invoke concurrently.
///
/// # Example
///
/// ```
/// use accesslogger::callback::AccessLogCallback;
/// use accesslogger::context::EntryContext;
/// use accesslogger::error::CallbackError;
/// use async_trait::async_trait;
/// use shared::envoy::service::accesslog::v2::StreamAccessLogsMessage;
///
/// struct PrintPath;
///
/// #[async_trait]
/// impl AccessLogCallback for PrintPath {
///     fn name(&self) -> &str {
///         "print-path"
///     }
///
///     async fn handle(
///         &self,
///         ctx: &EntryContext<'_>,
///         _message: &StreamAccessLogsMessage,
///     ) -> Result<(), CallbackError> {
///         if let Some(request) = &ctx.entry.request {
///             println!("{} -> {}", request.path, ctx.correlated_value);
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait AccessLogCallback: Send + Sync {
    /// Name used in logs and error reports.
    fn name(&self) -> &str;

    /// Handles one entry of `message`.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink failed to process the entry. What happens
    /// next is decided by the server's [`FailurePolicy`].
    async fn handle(
        &self,
        ctx: &EntryContext<'_>,
        message: &StreamAccessLogsMessage,
    ) -> Result<(), CallbackError>;
}

/// What the stream handler does when a callback reports a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log and count the failure, then keep dispatching.
    #[default]
    Continue,
    /// End the stream on the first failure.
    Abort,
}

impl FromStr for FailurePolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continue" => Ok(Self::Continue),
            "abort" => Ok(Self::Abort),
            other => Err(ParsePolicyError(other.to_string())),
        }
    }
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Continue => write!(f, "continue"),
            Self::Abort => write!(f, "abort"),
        }
    }
}

/// Result of dispatching one entry to every callback.
#[derive(Debug)]
pub enum Dispatch {
    /// Every callback ran. `failures` counts the ones that reported an error.
    Completed {
        /// Number of callbacks that reported an error.
        failures: usize,
    },
    /// A callback failed under [`FailurePolicy::Abort`]; later callbacks did not run.
    Aborted {
        /// Name of the failing callback.
        callback: String,
        /// The reported error.
        error: CallbackError,
    },
}

/// Ordered, immutable list of callbacks.
///
/// Cloning is cheap; all clones share the same list.
#[derive(Clone)]
pub struct CallbackList {
    callbacks: Arc<[Arc<dyn AccessLogCallback>]>,
}

impl CallbackList {
    /// Creates a list that invokes `callbacks` in the given order.
    #[must_use]
    pub fn new(callbacks: Vec<Arc<dyn AccessLogCallback>>) -> Self {
        Self {
            callbacks: callbacks.into(),
        }
    }

    /// Number of registered callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Returns true if no callback is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Names of the registered callbacks in invocation order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.callbacks.iter().map(|c| c.name().to_string()).collect()
    }

    /// Invokes every callback for one entry, in registration order.
    pub async fn dispatch(
        &self,
        ctx: &EntryContext<'_>,
        message: &StreamAccessLogsMessage,
        policy: FailurePolicy,
    ) -> Dispatch {
        let mut failures = 0;

        for callback in self.callbacks.iter() {
            if let Err(error) = callback.handle(ctx, message).await {
                match policy {
                    FailurePolicy::Continue => {
                        tracing::warn!(
                            callback = callback.name(),
                            entry = ctx.index,
                            error = %error,
                            "Callback failed, continuing"
                        );
                        failures += 1;
                    }
                    FailurePolicy::Abort => {
                        return Dispatch::Aborted {
                            callback: callback.name().to_string(),
                            error,
                        };
                    }
                }
            }
        }

        Dispatch::Completed { failures }
    }
}

impl Default for CallbackList {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl std::fmt::Debug for CallbackList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackList")
            .field("callbacks", &self.names())
            .finish()
    }
}

impl FromIterator<Arc<dyn AccessLogCallback>> for CallbackList {
    fn from_iter<I: IntoIterator<Item = Arc<dyn AccessLogCallback>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
