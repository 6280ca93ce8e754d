//! Engine error type with Sentry integration.
//!
//! Failures in this crate are never fatal to the shopper: the local cart
//! keeps working. Errors are logged, reported to Sentry, and surfaced to
//! callers that want to display sync state.

use std::time::Duration;

use thiserror::Error;

use crate::client::ClientError;
use crate::storage::StorageError;

/// Errors from a sync pass or reconciliation.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Remote cart service call failed.
    #[error("Cart service error: {0}")]
    Client(#[from] ClientError),

    /// Local persistence failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Some remote calls of a pass were applied before one failed.
    #[error("Sync pass stopped after {applied} of {planned} calls: {source}")]
    PartialPass {
        applied: usize,
        planned: usize,
        #[source]
        source: ClientError,
    },

    /// The scheduler task is no longer running.
    #[error("Sync scheduler stopped")]
    SchedulerStopped,
}

impl SyncError {
    /// Whether retrying later can succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Client(e) | Self::PartialPass { source: e, .. } => e.is_transient(),
            Self::Storage(_) => true,
            Self::SchedulerStopped => false,
        }
    }

    /// Wait requested by the service, if it rate limited the call.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Client(ClientError::RateLimited(secs))
            | Self::PartialPass {
                source: ClientError::RateLimited(secs),
                ..
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

/// Result type alias for `SyncError`.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Send an error to Sentry and log it with the event id.
pub fn capture(err: &SyncError, context: &str) {
    let event_id = sentry::capture_error(err);
    tracing::error!(
        error = %err,
        sentry_event_id = %event_id,
        "{context}"
    );
}

/// Add a breadcrumb for cart activity.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of cart
/// mutations leading up to a failed sync.
pub fn add_breadcrumb(category: &str, message: &str, data: &[(&str, &str)]) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    for (key, value) in data {
        breadcrumb.data.insert(
            (*key).to_string(),
            serde_json::Value::String((*value).to_string()),
        );
    }

    sentry::add_breadcrumb(breadcrumb);
}
