//! Error taxonomy for fetching and exporting registry data
//!
//! Fetch errors abort a single entity's fetch. Export errors are isolated to
//! the sub-resource that produced them.

use thiserror::Error;

/// Failure while retrieving one sub-resource from the registry
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Transport failure, timeout, or non-success HTTP status
    #[error("network error for {url}: {message}")]
    Network {
        url: String,
        message: String,
        /// HTTP status when the server answered at all
        status: Option<u16>,
        /// Request hit the per-request timeout
        timed_out: bool,
    },

    /// Body was not JSON or not one of the expected shapes
    #[error("unexpected response from {url}: {message}")]
    Parse { url: String, message: String },
}

impl FetchError {
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
            status: None,
            timed_out: false,
        }
    }

    pub fn parse(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Build a network error from a reqwest failure
    pub fn from_reqwest(url: &str, err: &reqwest::Error) -> Self {
        Self::Network {
            url: url.to_string(),
            message: err.to_string(),
            status: err.status().map(|s| s.as_u16()),
            timed_out: err.is_timeout(),
        }
    }

    /// Whether a retry has a chance of succeeding.
    ///
    /// Only network failures qualify, and of those only transport errors,
    /// timeouts, 429 and 5xx responses. A 4xx other than 429 is permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network { status, .. } => match status {
                None => true,
                Some(code) => *code == 429 || *code >= 500,
            },
            FetchError::Parse { .. } => false,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            FetchError::Network { url, .. } | FetchError::Parse { url, .. } => url,
        }
    }
}

/// Failure while writing one sub-resource to a sink
#[derive(Debug, Error)]
pub enum ExportError {
    /// Payload shape cannot be flattened into a table
    #[error("cannot convert '{key}' to a table: {message}")]
    Conversion { key: String, message: String },

    /// Writing the artifact failed
    #[error("failed to write '{key}': {source}")]
    Persistence {
        key: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ExportError {
    pub fn conversion(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conversion {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn persistence(key: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Persistence {
            key: key.into(),
            source: source.into(),
        }
    }

    /// Sub-resource key the failure belongs to
    pub fn key(&self) -> &str {
        match self {
            ExportError::Conversion { key, .. } | ExportError::Persistence { key, .. } => key,
        }
    }
}
