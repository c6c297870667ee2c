//! Azure resource coordinates shared by the gallery and blob clients.

use basm_core::GalleryScope;

pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";

/// Where the gallery and the staging storage account live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureSettings {
    pub subscription_id: String,
    pub resource_group: String,
    /// Region for new gallery resources and the single replication target.
    pub location: String,
    pub storage_account: String,
    pub storage_container: String,
    /// Resource manager base URL, without a trailing slash.
    pub management_endpoint: String,
    /// Blob service base URL. Defaults to the public-cloud account endpoint.
    pub blob_endpoint: Option<String>,
}

impl AzureSettings {
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        location: impl Into<String>,
        storage_account: impl Into<String>,
        storage_container: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            location: location.into(),
            storage_account: storage_account.into(),
            storage_container: storage_container.into(),
            management_endpoint: DEFAULT_MANAGEMENT_ENDPOINT.to_owned(),
            blob_endpoint: None,
        }
    }

    /// ARM id of the storage account holding uploaded images.
    pub fn storage_account_id(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Storage/storageAccounts/{}",
            self.subscription_id, self.resource_group, self.storage_account
        )
    }

    pub fn blob_endpoint(&self) -> String {
        match &self.blob_endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_owned(),
            None => format!("https://{}.blob.core.windows.net", self.storage_account),
        }
    }

    pub fn management_endpoint(&self) -> &str {
        self.management_endpoint.trim_end_matches('/')
    }

    pub fn scope(&self) -> GalleryScope {
        GalleryScope {
            subscription_id: self.subscription_id.clone(),
            resource_group: self.resource_group.clone(),
        }
    }
}
