//! Error types shared by the mirror core and the capability implementations.

use std::path::PathBuf;

use thiserror::Error;

/// A feed version string that could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed stemcell version '{raw}': {reason}")]
pub struct VersionError {
    /// The version string exactly as the feed supplied it.
    pub raw: String,
    pub reason: &'static str,
}

/// Failures talking to the stemcell feed.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The feed answered with a non-success HTTP status.
    #[error("feed returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// The request never produced a response (DNS, TLS, connection reset...).
    #[error("feed request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// The feed body was not the expected JSON document.
    #[error("feed response from {url} could not be decoded: {message}")]
    Decode { url: String, message: String },

    /// Writing the downloaded body to its destination failed.
    #[error("I/O error while downloading {url}: {source}")]
    Io {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failures from the cloud gallery and blob store bindings.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The service answered with an unexpected HTTP status.
    #[error("{method} {url} returned HTTP {status}: {body}")]
    Http {
        method: &'static str,
        url: String,
        status: u16,
        body: String,
    },

    /// The request never produced a response.
    #[error("{method} {url} failed: {message}")]
    Transport {
        method: &'static str,
        url: String,
        message: String,
    },

    /// Acquiring an access token failed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A response body did not have the expected shape.
    #[error("unexpected response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    /// The request could not be built from the supplied inputs.
    #[error("invalid request: {0}")]
    InvalidInput(String),

    /// Local file access failed (reading the image to upload).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures dispatching a publish notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The receiving system rejected the event.
    #[error("dispatch of workflow '{workflow}' failed with HTTP {status}: {body}")]
    Dispatch {
        workflow: String,
        status: u16,
        body: String,
    },

    /// The request never produced a response.
    #[error("notification request failed: {0}")]
    Transport(String),
}

/// Convenience constructor for [`ServiceError::Io`].
pub fn service_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ServiceError {
    ServiceError::Io {
        path: path.into(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_error_names_raw_value() {
        let err = VersionError {
            raw: "abc".into(),
            reason: "non-numeric component",
        };
        assert_eq!(
            err.to_string(),
            "malformed stemcell version 'abc': non-numeric component"
        );
    }

    #[test]
    fn service_error_carries_request_context() {
        let err = ServiceError::Http {
            method: "PUT",
            url: "https://example/versions/1.2.3".into(),
            status: 409,
            body: "conflict".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("PUT"));
        assert!(msg.contains("409"));
        assert!(msg.contains("versions/1.2.3"));
    }
}
