//! basm core library: domain types, version parsing, errors and the
//! capability traits the mirror drives.
//!
//! - [`version`]: [`StemcellVersion`] parsing and formatting
//! - [`types`]: feed records, gallery keys, publish events
//! - [`error`]: error types shared across crates
//! - [`ports`]: feed, gallery, blob store and notifier traits

pub mod error;
pub mod ports;
pub mod types;
pub mod version;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use error::{service_io_err, FeedError, NotifyError, ServiceError, VersionError};
pub use ports::{BlobStore, GalleryClient, NoopNotifier, Notifier, StemcellFeed};
pub use types::{
    FeedAsset, FeedEntry, GalleryImageVersionKey, GalleryScope, PublishedArtifact, SeriesName,
    StemcellCandidate, StemcellPublished,
};
pub use version::StemcellVersion;
