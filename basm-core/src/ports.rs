//! Capabilities the mirror orchestrator drives.
//!
//! Every external system sits behind one of these traits so the orchestrator
//! can be exercised without a network. Implementations live in
//! `basm-mirror` (feed), `basm-azure` (gallery, blobs) and `basm-notify`.

use std::io::Write;
use std::path::Path;

use crate::error::{FeedError, NotifyError, ServiceError};
use crate::types::{FeedEntry, GalleryImageVersionKey, SeriesName, StemcellPublished};

/// Read access to the public stemcell feed.
pub trait StemcellFeed {
    /// All entries the feed lists for `series`, newest first.
    fn entries(&self, series: &SeriesName) -> Result<Vec<FeedEntry>, FeedError>;

    /// Stream the body at `url` into `sink`, returning the number of bytes
    /// written.
    fn download(&self, url: &str, sink: &mut dyn Write) -> Result<u64, FeedError>;
}

/// Existence checks and writes against the cloud image gallery.
pub trait GalleryClient {
    fn version_exists(&self, key: &GalleryImageVersionKey) -> Result<bool, ServiceError>;

    /// Create the image definition if it is missing. An existing definition
    /// is a success.
    fn ensure_image_definition(
        &self,
        series: &SeriesName,
        gallery_name: &str,
        image_name: &str,
    ) -> Result<(), ServiceError>;

    fn publish_version(
        &self,
        key: &GalleryImageVersionKey,
        source_blob_uri: &str,
    ) -> Result<(), ServiceError>;
}

/// Durable storage for the raw disk image.
pub trait BlobStore {
    /// Upload `local_path` under a fresh, unique name and return its URI.
    fn upload(&self, local_path: &Path) -> Result<String, ServiceError>;
}

/// Best-effort delivery of "new stemcell published" events.
pub trait Notifier {
    fn notify_new_stemcell(&self, event: &StemcellPublished) -> Result<(), NotifyError>;
}

/// Notifier used when no event sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify_new_stemcell(&self, event: &StemcellPublished) -> Result<(), NotifyError> {
        tracing::debug!(
            version = %event.gallery_image_version,
            "no notifier configured; skipping publish event"
        );
        Ok(())
    }
}
