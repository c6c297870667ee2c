//! Error types for basm-mirror.

use std::path::PathBuf;

use thiserror::Error;

use basm_core::{
    FeedError, GalleryImageVersionKey, SeriesName, ServiceError, StemcellVersion, VersionError,
};

/// All errors that can end a mirror run.
///
/// Everything before [`MirrorError::Publish`] happens before the gallery can
/// observe the new version, so a failed run is always safe to repeat.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// The feed could not be queried for the series.
    #[error("stemcell feed unavailable for series '{series}': {source}")]
    FeedUnavailable {
        series: SeriesName,
        #[source]
        source: FeedError,
    },

    /// The feed listed no stemcells for the series.
    #[error("stemcell feed returned no entries for series '{series}'")]
    EmptyFeed { series: SeriesName },

    /// The feed's version string could not be parsed.
    #[error("series '{series}': {source}")]
    MalformedVersion {
        series: SeriesName,
        #[source]
        source: VersionError,
    },

    /// The latest entry carries no `regular.url`.
    #[error("failed to find download URL for stemcell {version} of series '{series}'")]
    MissingDownloadUrl {
        series: SeriesName,
        version: StemcellVersion,
    },

    /// The idempotency lookup against the gallery failed.
    #[error("failed to check gallery image version {key}: {source}")]
    GalleryLookup {
        key: GalleryImageVersionKey,
        #[source]
        source: ServiceError,
    },

    /// Creating or reading the gallery image definition failed.
    #[error("failed to ensure image definition {gallery_name}/{image_name}: {source}")]
    ImageDefinition {
        gallery_name: String,
        image_name: String,
        #[source]
        source: ServiceError,
    },

    /// The scratch directory could not be created under the base directory.
    #[error("workspace unavailable at {path}: {reason}")]
    WorkspaceUnavailable { path: PathBuf, reason: String },

    /// Downloading the stemcell archive failed.
    #[error("failed to download stemcell {version} from {url}: {source}")]
    Download {
        version: StemcellVersion,
        url: String,
        #[source]
        source: FeedError,
    },

    /// The archive could not be unpacked.
    #[error("failed to extract {archive}: {reason}")]
    ExtractionFailed { archive: PathBuf, reason: String },

    /// Extraction finished but the disk image is not where it should be.
    #[error("failed to find {} in stemcell image (workspace contains: {})", .path.display(), .contents.join(", "))]
    DiskImageNotFound { path: PathBuf, contents: Vec<String> },

    /// Uploading the disk image failed.
    #[error("failed to upload {}: {source}", .path.display())]
    Upload {
        path: PathBuf,
        #[source]
        source: ServiceError,
    },

    /// Creating the gallery image version failed.
    #[error("failed to publish gallery image version {key}: {source}")]
    Publish {
        key: GalleryImageVersionKey,
        #[source]
        source: ServiceError,
    },

    /// A local filesystem operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience constructor for [`MirrorError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> MirrorError {
    MirrorError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`MirrorError::ExtractionFailed`].
pub(crate) fn extraction_err(archive: impl Into<PathBuf>, reason: impl ToString) -> MirrorError {
    MirrorError::ExtractionFailed {
        archive: archive.into(),
        reason: reason.to_string(),
    }
}
