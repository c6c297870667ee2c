//! Recording fakes for the mirror's collaborators.

#![allow(dead_code)]

use std::cell::RefCell;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use basm_core::{
    BlobStore, FeedAsset, FeedEntry, FeedError, GalleryClient, GalleryImageVersionKey,
    GalleryScope, NotifyError, Notifier, SeriesName, ServiceError, StemcellFeed,
    StemcellPublished,
};
use basm_mirror::{Mirror, MirrorConfig, Selection};
use flate2::write::GzEncoder;
use tempfile::TempDir;

pub const SERIES: &str = "bosh-azure-hyperv-ubuntu-jammy-go_agent";
pub const GALLERY: &str = "test-gallery";
pub const IMAGE: &str = "test-image";
pub const BLOB_URI: &str = "https://acct.blob.core.windows.net/stemcell/bosh-stemcell-1.vhd";

/// One observed collaborator call, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Entries(String),
    Exists(String),
    EnsureDefinition {
        series: String,
        gallery: String,
        image: String,
    },
    Download(String),
    Upload(PathBuf),
    Publish { key: String, blob_uri: String },
    Notify(StemcellPublished),
}

pub type CallLog = Rc<RefCell<Vec<Call>>>;

// ---------------------------------------------------------------------------
// Archive fixtures
// ---------------------------------------------------------------------------

pub fn tar_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap()
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::fast());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// A stemcell tarball whose inner `image` holds `inner_files`.
pub fn stemcell_archive(inner_files: &[(&str, &[u8])]) -> Vec<u8> {
    let inner = gzip(&tar_bytes(inner_files));
    gzip(&tar_bytes(&[
        ("stemcell.MF", &b"name: fake\nversion: '1.682'\n"[..]),
        ("image", inner.as_slice()),
    ]))
}

pub fn entry(version: &str, url: Option<&str>) -> FeedEntry {
    FeedEntry {
        version: version.into(),
        regular: url.map(|u| FeedAsset {
            url: Some(u.into()),
        }),
    }
}

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

pub struct FakeFeed {
    pub log: CallLog,
    pub entries: Result<Vec<FeedEntry>, u16>,
    pub archive: Vec<u8>,
    /// Write half the archive, then fail with this status.
    pub fail_download: Option<u16>,
}

impl StemcellFeed for FakeFeed {
    fn entries(&self, series: &SeriesName) -> Result<Vec<FeedEntry>, FeedError> {
        self.log.borrow_mut().push(Call::Entries(series.to_string()));
        self.entries.clone().map_err(|status| FeedError::Status {
            url: format!("https://feed/{series}"),
            status,
        })
    }

    fn download(&self, url: &str, sink: &mut dyn Write) -> Result<u64, FeedError> {
        self.log.borrow_mut().push(Call::Download(url.to_owned()));
        if let Some(status) = self.fail_download {
            let partial = &self.archive[..self.archive.len() / 2];
            sink.write_all(partial).map_err(|source| FeedError::Io {
                url: url.to_owned(),
                source,
            })?;
            return Err(FeedError::Status {
                url: url.to_owned(),
                status,
            });
        }
        sink.write_all(&self.archive).map_err(|source| FeedError::Io {
            url: url.to_owned(),
            source,
        })?;
        Ok(self.archive.len() as u64)
    }
}

pub struct FakeGallery {
    pub log: CallLog,
    pub exists: bool,
    pub fail_exists: bool,
    pub fail_definition: bool,
    pub fail_publish: bool,
}

impl GalleryClient for FakeGallery {
    fn version_exists(&self, key: &GalleryImageVersionKey) -> Result<bool, ServiceError> {
        self.log.borrow_mut().push(Call::Exists(key.to_string()));
        if self.fail_exists {
            return Err(http_error("GET", 500));
        }
        Ok(self.exists)
    }

    fn ensure_image_definition(
        &self,
        series: &SeriesName,
        gallery_name: &str,
        image_name: &str,
    ) -> Result<(), ServiceError> {
        self.log.borrow_mut().push(Call::EnsureDefinition {
            series: series.to_string(),
            gallery: gallery_name.to_owned(),
            image: image_name.to_owned(),
        });
        if self.fail_definition {
            return Err(http_error("PUT", 403));
        }
        Ok(())
    }

    fn publish_version(
        &self,
        key: &GalleryImageVersionKey,
        source_blob_uri: &str,
    ) -> Result<(), ServiceError> {
        self.log.borrow_mut().push(Call::Publish {
            key: key.to_string(),
            blob_uri: source_blob_uri.to_owned(),
        });
        if self.fail_publish {
            return Err(http_error("PUT", 500));
        }
        Ok(())
    }
}

pub struct FakeBlobs {
    pub log: CallLog,
    pub fail: bool,
    /// Contents of the file at the time it was uploaded.
    pub uploaded: RefCell<Option<Vec<u8>>>,
}

impl BlobStore for FakeBlobs {
    fn upload(&self, local_path: &Path) -> Result<String, ServiceError> {
        self.log
            .borrow_mut()
            .push(Call::Upload(local_path.to_path_buf()));
        let bytes = std::fs::read(local_path)
            .map_err(|e| basm_core::service_io_err(local_path, e))?;
        *self.uploaded.borrow_mut() = Some(bytes);
        if self.fail {
            return Err(http_error("PUT", 503));
        }
        Ok(BLOB_URI.to_owned())
    }
}

pub struct FakeNotifier {
    pub log: CallLog,
    pub fail: bool,
}

impl Notifier for FakeNotifier {
    fn notify_new_stemcell(&self, event: &StemcellPublished) -> Result<(), NotifyError> {
        self.log.borrow_mut().push(Call::Notify(event.clone()));
        if self.fail {
            return Err(NotifyError::Dispatch {
                workflow: "sync.yml".into(),
                status: 500,
                body: "server error".into(),
            });
        }
        Ok(())
    }
}

fn http_error(method: &'static str, status: u16) -> ServiceError {
    ServiceError::Http {
        method,
        url: "https://management.azure.com/fake".into(),
        status,
        body: "injected failure".into(),
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// All fakes wired together around a temporary workspace base.
pub struct Harness {
    pub log: CallLog,
    pub feed: FakeFeed,
    pub gallery: FakeGallery,
    pub blobs: FakeBlobs,
    pub notifier: FakeNotifier,
    pub base: TempDir,
    pub workspace_base: PathBuf,
}

impl Harness {
    pub fn new(entries: Vec<FeedEntry>, archive: Vec<u8>) -> Self {
        let log: CallLog = Rc::default();
        let base = TempDir::new().expect("workspace base");
        let workspace_base = base.path().to_path_buf();
        Self {
            feed: FakeFeed {
                log: log.clone(),
                entries: Ok(entries),
                archive,
                fail_download: None,
            },
            gallery: FakeGallery {
                log: log.clone(),
                exists: false,
                fail_exists: false,
                fail_definition: false,
                fail_publish: false,
            },
            blobs: FakeBlobs {
                log: log.clone(),
                fail: false,
                uploaded: RefCell::new(None),
            },
            notifier: FakeNotifier {
                log: log.clone(),
                fail: false,
            },
            log,
            base,
            workspace_base,
        }
    }

    pub fn scope() -> GalleryScope {
        GalleryScope {
            subscription_id: "00000000-0000-0000-0000-000000000000".into(),
            resource_group: "test-resource-group".into(),
        }
    }

    pub fn mirror(&self) -> Mirror<'_> {
        Mirror::new(
            &self.feed,
            &self.gallery,
            &self.blobs,
            &self.notifier,
            MirrorConfig {
                workspace_base: self.workspace_base.clone(),
                selection: Selection::FirstEntry,
                scope: Self::scope(),
            },
        )
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.borrow().clone()
    }

    /// Whether no workspace directory is left under the base.
    pub fn base_is_empty(&self) -> bool {
        std::fs::read_dir(self.base.path())
            .expect("read base")
            .next()
            .is_none()
    }
}
