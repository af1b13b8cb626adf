//! Error types for the cutvol crate.

use std::fmt;

/// Result type for cut-volume operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error produced by an elevation service implementation.
pub type ServiceError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while measuring a cut volume.
#[derive(Debug)]
pub enum Error {
    /// The polygon cannot be measured (too few points or degenerate geometry).
    InvalidPolygon {
        /// Description of what was invalid.
        detail: String,
    },
    /// The polygon's signed area is zero, so it has no centroid.
    DegenerateCentroid,
    /// Sampling was cancelled or superseded by a newer request.
    Cancelled,
    /// The elevation service failed to resolve heights.
    ElevationQueryFailed {
        /// Index of the batch that failed, if the failure happened while sampling.
        batch: Option<usize>,
        /// The underlying cause.
        source: ServiceError,
    },
}

impl Error {
    pub(crate) fn invalid_polygon(detail: impl Into<String>) -> Self {
        Error::InvalidPolygon {
            detail: detail.into(),
        }
    }

    pub(crate) fn elevation(batch: Option<usize>, source: impl Into<ServiceError>) -> Self {
        Error::ElevationQueryFailed {
            batch,
            source: source.into(),
        }
    }

    /// Returns true if this error only signals cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidPolygon { detail } => write!(f, "invalid polygon: {detail}"),
            Error::DegenerateCentroid => {
                write!(f, "polygon has zero signed area and no centroid")
            }
            Error::Cancelled => write!(f, "elevation sampling was cancelled"),
            Error::ElevationQueryFailed {
                batch: Some(batch),
                source,
            } => write!(f, "elevation query for batch {batch} failed: {source}"),
            Error::ElevationQueryFailed {
                batch: None,
                source,
            } => write!(f, "elevation query failed: {source}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::ElevationQueryFailed { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_batch() {
        let err = Error::elevation(Some(7), "connection reset");
        assert_eq!(
            err.to_string(),
            "elevation query for batch 7 failed: connection reset"
        );
    }

    #[test]
    fn test_source_exposes_cause() {
        use std::error::Error as _;

        let err = Error::elevation(None, "timeout");
        assert_eq!(err.source().map(ToString::to_string).as_deref(), Some("timeout"));
        assert!(Error::Cancelled.source().is_none());
    }

    #[test]
    fn test_is_cancelled() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::DegenerateCentroid.is_cancelled());
        assert!(!Error::invalid_polygon("too few points").is_cancelled());
    }
}
