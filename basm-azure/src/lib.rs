//! Azure bindings for the stemcell mirror: credentials, the compute gallery
//! and page-blob storage.

mod http;

pub mod compute;
pub mod credential;
pub mod settings;
pub mod storage;

pub use compute::{ComputeGalleryClient, ImageIdentifier, DEFAULT_PUBLISHER};
pub use credential::{
    ClientSecretCredential, ManagedIdentityCredential, TokenSource, MANAGEMENT_SCOPE,
    STORAGE_SCOPE,
};
pub use settings::{AzureSettings, DEFAULT_MANAGEMENT_ENDPOINT};
pub use storage::{BlobContainerClient, DEFAULT_RANGE_SIZE, PAGE_SIZE};
