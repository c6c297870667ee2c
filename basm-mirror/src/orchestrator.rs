//! Mirror orchestration.
//!
//! ## `Mirror::run`: publish protocol
//!
//! 1. Resolve the latest candidate from the feed.
//! 2. Ask the gallery whether `(gallery, image, version)` exists → stop if so.
//! 3. Ensure the image definition exists.
//! 4. Acquire an extraction workspace (released on every exit path).
//! 5. Stream the archive into the workspace.
//! 6. Extract the disk image.
//! 7. Upload the disk image.
//! 8. Publish the gallery image version.
//! 9. Notify, best effort.
//!
//! The version only becomes visible to step 2 of a later run once step 8
//! succeeds, so any failure before it is safe to retry blindly.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use chrono::Utc;

use basm_core::{
    BlobStore, GalleryClient, GalleryImageVersionKey, GalleryScope, Notifier, PublishedArtifact,
    SeriesName, StemcellCandidate, StemcellFeed, StemcellPublished,
};

use crate::error::{io_err, MirrorError};
use crate::extractor;
use crate::resolver::{self, Selection};
use crate::workspace::ExtractionWorkspace;

/// File name of the downloaded archive inside the workspace.
pub const ARCHIVE_FILE: &str = "stemcell.tgz";

/// Settings the orchestrator needs beyond its collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    /// Directory under which each run creates its scratch workspace.
    pub workspace_base: PathBuf,
    pub selection: Selection,
    /// Identity reported to the notifier.
    pub scope: GalleryScope,
}

/// Result of a run that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorOutcome {
    /// The gallery already had this version; nothing was downloaded.
    AlreadyMirrored { key: GalleryImageVersionKey },
    /// A new gallery image version was published.
    Published {
        key: GalleryImageVersionKey,
        artifact: PublishedArtifact,
    },
}

impl MirrorOutcome {
    /// Whether this run published a new version.
    pub fn published(&self) -> bool {
        matches!(self, Self::Published { .. })
    }

    pub fn key(&self) -> &GalleryImageVersionKey {
        match self {
            Self::AlreadyMirrored { key } | Self::Published { key, .. } => key,
        }
    }
}

/// Drives one series from the feed into the gallery.
pub struct Mirror<'a> {
    feed: &'a dyn StemcellFeed,
    gallery: &'a dyn GalleryClient,
    blobs: &'a dyn BlobStore,
    notifier: &'a dyn Notifier,
    config: MirrorConfig,
}

impl<'a> Mirror<'a> {
    pub fn new(
        feed: &'a dyn StemcellFeed,
        gallery: &'a dyn GalleryClient,
        blobs: &'a dyn BlobStore,
        notifier: &'a dyn Notifier,
        config: MirrorConfig,
    ) -> Self {
        Self {
            feed,
            gallery,
            blobs,
            notifier,
            config,
        }
    }

    /// Mirror the latest stemcell of `series` into `gallery_name/image_name`.
    pub fn run(
        &self,
        series: &SeriesName,
        gallery_name: &str,
        image_name: &str,
    ) -> Result<MirrorOutcome, MirrorError> {
        let candidate = resolver::resolve(self.feed, series, self.config.selection)?;
        let key = GalleryImageVersionKey::new(gallery_name, image_name, candidate.version);

        let exists = self
            .gallery
            .version_exists(&key)
            .map_err(|source| MirrorError::GalleryLookup {
                key: key.clone(),
                source,
            })?;
        if exists {
            tracing::info!(%series, %key, "no new stemcell to upload");
            return Ok(MirrorOutcome::AlreadyMirrored { key });
        }

        tracing::info!(%series, gallery = gallery_name, image = image_name, "checking gallery image definition");
        self.gallery
            .ensure_image_definition(series, gallery_name, image_name)
            .map_err(|source| MirrorError::ImageDefinition {
                gallery_name: gallery_name.to_owned(),
                image_name: image_name.to_owned(),
                source,
            })?;

        let workspace = ExtractionWorkspace::acquire(&self.config.workspace_base)?;
        let artifact = self.transfer(&candidate, &key, &workspace);
        workspace.release();
        let artifact = artifact?;

        self.notify(&key);

        Ok(MirrorOutcome::Published { key, artifact })
    }

    /// Download, extract, upload and publish inside `workspace`.
    fn transfer(
        &self,
        candidate: &StemcellCandidate,
        key: &GalleryImageVersionKey,
        workspace: &ExtractionWorkspace,
    ) -> Result<PublishedArtifact, MirrorError> {
        tracing::info!(
            version = %candidate.version,
            url = %candidate.download_url,
            workspace = %workspace.path().display(),
            "new stemcell version found; downloading"
        );
        let archive = workspace.join(ARCHIVE_FILE);
        let file = File::create(&archive).map_err(|e| io_err(&archive, e))?;
        let mut sink = BufWriter::new(file);
        let bytes = self
            .feed
            .download(&candidate.download_url, &mut sink)
            .map_err(|source| MirrorError::Download {
                version: candidate.version,
                url: candidate.download_url.clone(),
                source,
            })?;
        sink.flush().map_err(|e| io_err(&archive, e))?;
        drop(sink);
        tracing::info!(bytes, archive = %archive.display(), "download complete");

        let disk_image = extractor::extract(&archive)?;
        if !disk_image.is_file() {
            let contents = workspace.listing();
            tracing::error!(
                path = %disk_image.display(),
                contents = ?contents,
                "disk image missing after extraction"
            );
            return Err(MirrorError::DiskImageNotFound {
                path: disk_image,
                contents,
            });
        }

        tracing::info!(path = %disk_image.display(), "uploading disk image");
        let blob_uri = self
            .blobs
            .upload(&disk_image)
            .map_err(|source| MirrorError::Upload {
                path: disk_image.clone(),
                source,
            })?;

        tracing::info!(%key, %blob_uri, "creating gallery image version");
        self.gallery
            .publish_version(key, &blob_uri)
            .map_err(|source| MirrorError::Publish {
                key: key.clone(),
                source,
            })?;
        tracing::info!(%key, "completed disk image upload and gallery image version creation");

        Ok(PublishedArtifact {
            blob_uri,
            gallery_image_version: key.version.to_string(),
            published_at: Utc::now(),
        })
    }

    /// The version is already published; a notifier failure is only logged.
    fn notify(&self, key: &GalleryImageVersionKey) {
        let event = StemcellPublished::new(key, &self.config.scope);
        if let Err(err) = self.notifier.notify_new_stemcell(&event) {
            tracing::error!(%key, error = %err, "failed to notify about published stemcell");
        }
    }
}
