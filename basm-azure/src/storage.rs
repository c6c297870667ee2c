//! Page-blob uploads to an Azure Storage container.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use basm_core::{service_io_err, BlobStore, ServiceError};

use crate::credential::{TokenSource, STORAGE_SCOPE};
use crate::http::{bearer, dispatch, unexpected, Body};
use crate::settings::AzureSettings;

const STORAGE_API_VERSION: &str = "2021-08-06";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Page blobs are addressed in 512-byte pages.
pub const PAGE_SIZE: u64 = 512;
/// Largest range a single Put Page call accepts.
pub const DEFAULT_RANGE_SIZE: usize = 4 * 1024 * 1024;

pub struct BlobContainerClient {
    settings: AzureSettings,
    credential: Arc<dyn TokenSource>,
    agent: ureq::Agent,
    range_size: usize,
}

impl BlobContainerClient {
    pub fn new(settings: AzureSettings, credential: Arc<dyn TokenSource>) -> Self {
        Self {
            settings,
            credential,
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
            range_size: DEFAULT_RANGE_SIZE,
        }
    }

    /// Override the Put Page range size. Rounded down to whole pages, at
    /// least one page.
    pub fn with_range_size(mut self, bytes: usize) -> Self {
        let page = PAGE_SIZE as usize;
        self.range_size = (bytes / page).max(1) * page;
        self
    }

    fn container_url(&self) -> String {
        format!(
            "{}/{}",
            self.settings.blob_endpoint(),
            self.settings.storage_container
        )
    }

    fn request(&self, method: &'static str, url: &str) -> Result<ureq::Request, ServiceError> {
        let token = self.credential.token(STORAGE_SCOPE)?;
        Ok(self
            .agent
            .request(method, url)
            .set("Authorization", &bearer(&token))
            .set("x-ms-version", STORAGE_API_VERSION)
            .set(
                "x-ms-date",
                &Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
            ))
    }

    /// Create the container if it does not exist yet.
    pub fn ensure_container(&self) -> Result<(), ServiceError> {
        let url = self.container_url();
        let request = self.request("PUT", &url)?.query("restype", "container");
        let response = dispatch("PUT", &url, request, Body::Bytes(&[]))?;
        match response.status() {
            201 => {
                tracing::info!(container = %self.settings.storage_container, "created storage container");
                Ok(())
            }
            409 => {
                tracing::debug!(container = %self.settings.storage_container, "storage container exists");
                Ok(())
            }
            _ => Err(unexpected("PUT", &url, response)),
        }
    }

    fn create_page_blob(&self, url: &str, size: u64) -> Result<(), ServiceError> {
        let request = self
            .request("PUT", url)?
            .set("x-ms-blob-type", "PageBlob")
            .set("x-ms-blob-content-length", &size.to_string());
        let response = dispatch("PUT", url, request, Body::Bytes(&[]))?;
        match response.status() {
            201 => Ok(()),
            _ => Err(unexpected("PUT", url, response)),
        }
    }

    fn put_pages(&self, url: &str, offset: u64, data: &[u8]) -> Result<(), ServiceError> {
        let end = offset + data.len() as u64 - 1;
        let request = self
            .request("PUT", url)?
            .query("comp", "page")
            .set("x-ms-page-write", "update")
            .set("x-ms-range", &format!("bytes={offset}-{end}"));
        let response = dispatch("PUT", url, request, Body::Bytes(data))?;
        match response.status() {
            201 => Ok(()),
            _ => Err(unexpected("PUT", url, response)),
        }
    }
}

impl BlobStore for BlobContainerClient {
    fn upload(&self, local_path: &Path) -> Result<String, ServiceError> {
        let mut file = File::open(local_path).map_err(|e| service_io_err(local_path, e))?;
        let size = file
            .metadata()
            .map_err(|e| service_io_err(local_path, e))?
            .len();
        if size % PAGE_SIZE != 0 {
            return Err(ServiceError::InvalidInput(format!(
                "{} is {size} bytes, not a multiple of {PAGE_SIZE}",
                local_path.display()
            )));
        }

        let name = format!("bosh-stemcell-{}.vhd", uuid::Uuid::new_v4());
        let url = format!("{}/{}", self.container_url(), name);
        tracing::info!(blob = %name, size, "uploading disk image");

        self.create_page_blob(&url, size)?;

        let mut buffer = vec![0u8; self.range_size];
        let mut offset = 0u64;
        let mut written = 0u64;
        while offset < size {
            let len = read_full(&mut file, &mut buffer).map_err(|e| service_io_err(local_path, e))?;
            if len == 0 {
                return Err(service_io_err(
                    local_path,
                    std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "file shrank during upload",
                    ),
                ));
            }
            let chunk = &buffer[..len];
            if chunk.iter().any(|&b| b != 0) {
                self.put_pages(&url, offset, chunk)?;
                written += len as u64;
            }
            offset += len as u64;
        }

        tracing::info!(blob = %name, size, written, "disk image uploaded");
        Ok(url)
    }
}

/// Fill `buf` from `reader` unless EOF comes first.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_size_rounds_to_pages() {
        struct NoToken;
        impl TokenSource for NoToken {
            fn token(&self, _scope: &str) -> Result<String, ServiceError> {
                Ok(String::new())
            }
        }
        let settings = AzureSettings::new("s", "rg", "eastus", "acct", "c");
        let client = BlobContainerClient::new(settings, Arc::new(NoToken));
        assert_eq!(client.with_range_size(1500).range_size, 1024);

        let settings = AzureSettings::new("s", "rg", "eastus", "acct", "c");
        let client = BlobContainerClient::new(settings, Arc::new(NoToken));
        assert_eq!(client.with_range_size(10).range_size, 512);
    }

    #[test]
    fn read_full_stops_at_eof() {
        let mut data: &[u8] = &[1, 2, 3];
        let mut buf = [0u8; 8];
        assert_eq!(read_full(&mut data, &mut buf).unwrap(), 3);
        assert_eq!(read_full(&mut data, &mut buf).unwrap(), 0);
    }
}
