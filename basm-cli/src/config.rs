//! Command-line and environment configuration.
//!
//! Every value has a flag and a `BASM_*` variable. The argument groups are
//! turned into the explicit config structs of the library crates here and
//! nowhere else.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;

use basm_azure::{
    AzureSettings, BlobContainerClient, ClientSecretCredential, ComputeGalleryClient,
    ImageIdentifier, ManagedIdentityCredential, TokenSource, DEFAULT_MANAGEMENT_ENDPOINT,
    DEFAULT_PUBLISHER,
};
use basm_core::{NoopNotifier, Notifier, SeriesName};
use basm_mirror::{HttpFeed, MirrorConfig, Selection, DEFAULT_FEED_URL};
use basm_notify::{GitHubNotifier, GitHubNotifierConfig};

pub const DEFAULT_SERIES: &str = "bosh-azure-hyperv-ubuntu-jammy-go_agent";

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

#[derive(Args, Debug, Clone)]
pub struct FeedArgs {
    /// Stemcell series to mirror.
    #[arg(long, env = "BASM_STEMCELL_SERIES", default_value = DEFAULT_SERIES)]
    pub series: String,

    /// Base URL of the stemcell feed API.
    #[arg(long, env = "BASM_FEED_URL", default_value = DEFAULT_FEED_URL)]
    pub feed_url: String,

    /// How the latest version is picked: `first` or `highest`.
    #[arg(long, env = "BASM_VERSION_SELECTION", default_value = "first")]
    pub selection: Selection,
}

impl FeedArgs {
    pub fn series(&self) -> SeriesName {
        SeriesName::from(self.series.as_str())
    }

    pub fn feed(&self) -> HttpFeed {
        HttpFeed::new(self.feed_url.as_str())
    }
}

// ---------------------------------------------------------------------------
// Azure
// ---------------------------------------------------------------------------

#[derive(Args, Debug, Clone)]
pub struct AzureArgs {
    #[arg(long, env = "BASM_AZURE_SUBSCRIPTION_ID")]
    pub subscription_id: String,

    #[arg(long, env = "BASM_RESOURCE_GROUP")]
    pub resource_group: String,

    /// Region for the gallery image and its single replica.
    #[arg(long, env = "BASM_REGION", default_value = "eastus")]
    pub region: String,

    #[arg(long, env = "BASM_GALLERY_NAME", default_value = "bosh-azure-stemcells")]
    pub gallery_name: String,

    #[arg(long, env = "BASM_GALLERY_IMAGE_NAME", default_value = "ubuntu-jammy")]
    pub gallery_image_name: String,

    #[arg(long, env = "BASM_STORAGE_ACCOUNT_NAME")]
    pub storage_account: String,

    #[arg(long, env = "BASM_STORAGE_CONTAINER_NAME", default_value = "stemcell")]
    pub storage_container: String,

    /// Mounted directory that holds each run's scratch workspace.
    #[arg(long, env = "BASM_MOUNTED_DIRECTORY", default_value = "/mount/stemcellfiles")]
    pub mounted_directory: PathBuf,

    /// Service principal tenant. Without it a managed identity is used.
    #[arg(long, env = "BASM_AZURE_TENANT_ID")]
    pub tenant_id: Option<String>,

    /// Service principal id, or the client id of a user-assigned identity.
    #[arg(long, env = "BASM_AZURE_CLIENT_ID")]
    pub client_id: Option<String>,

    #[arg(long, env = "BASM_AZURE_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    #[arg(long, env = "BASM_GALLERY_PUBLISHER", default_value = DEFAULT_PUBLISHER)]
    pub publisher: String,

    /// Image offer. Derived from the series when unset.
    #[arg(long, env = "BASM_GALLERY_OFFER")]
    pub offer: Option<String>,

    /// Image sku. Derived from the series when unset.
    #[arg(long, env = "BASM_GALLERY_SKU")]
    pub sku: Option<String>,

    #[arg(long, env = "BASM_MANAGEMENT_ENDPOINT", default_value = DEFAULT_MANAGEMENT_ENDPOINT)]
    pub management_endpoint: String,

    /// Blob service endpoint. Defaults to the public-cloud account URL.
    #[arg(long, env = "BASM_BLOB_ENDPOINT")]
    pub blob_endpoint: Option<String>,
}

impl AzureArgs {
    pub fn settings(&self) -> AzureSettings {
        let mut settings = AzureSettings::new(
            self.subscription_id.as_str(),
            self.resource_group.as_str(),
            self.region.as_str(),
            self.storage_account.as_str(),
            self.storage_container.as_str(),
        );
        settings.management_endpoint = self.management_endpoint.clone();
        settings.blob_endpoint = self.blob_endpoint.clone();
        settings
    }

    pub fn identifier(&self) -> ImageIdentifier {
        ImageIdentifier {
            publisher: self.publisher.clone(),
            offer: self.offer.clone(),
            sku: self.sku.clone(),
        }
    }

    pub fn credential(&self) -> Result<Arc<dyn TokenSource>> {
        match (&self.tenant_id, &self.client_secret) {
            (Some(tenant), Some(secret)) => {
                let client_id = self
                    .client_id
                    .as_deref()
                    .context("BASM_AZURE_CLIENT_ID is required with a client secret")?;
                tracing::info!(tenant = %tenant, "using service principal credentials");
                Ok(Arc::new(ClientSecretCredential::new(
                    tenant.as_str(),
                    client_id,
                    secret.as_str(),
                )))
            }
            (None, None) => {
                tracing::info!(
                    user_assigned = self.client_id.is_some(),
                    "using managed identity credentials"
                );
                Ok(Arc::new(ManagedIdentityCredential::new(self.client_id.clone())))
            }
            _ => bail!("BASM_AZURE_TENANT_ID and BASM_AZURE_CLIENT_SECRET must be set together"),
        }
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

#[derive(Args, Debug, Clone)]
pub struct NotifyArgs {
    #[arg(long, env = "BASM_GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Repository as `owner/name`.
    #[arg(long, env = "BASM_GITHUB_REPOSITORY")]
    pub github_repository: Option<String>,

    /// Workflow file name or id to dispatch.
    #[arg(long, env = "BASM_GITHUB_WORKFLOW")]
    pub github_workflow: Option<String>,

    #[arg(long, env = "BASM_GITHUB_REF", default_value = "main")]
    pub github_ref: String,

    #[arg(long, env = "BASM_GITHUB_API_URL", default_value = basm_notify::DEFAULT_API_BASE_URL)]
    pub github_api_url: String,

    #[arg(long, env = "BASM_GITHUB_TIMEOUT_SECS", default_value_t = 10)]
    pub github_timeout_secs: u64,
}

impl NotifyArgs {
    /// The GitHub notifier config, when token, repository and workflow are
    /// all present.
    pub fn github_config(&self) -> Result<Option<GitHubNotifierConfig>> {
        let (token, repository, workflow) = match (
            &self.github_token,
            &self.github_repository,
            &self.github_workflow,
        ) {
            (Some(t), Some(r), Some(w)) => (t, r, w),
            (None, None, None) => return Ok(None),
            _ => {
                tracing::warn!(
                    "GitHub notification needs BASM_GITHUB_TOKEN, BASM_GITHUB_REPOSITORY and BASM_GITHUB_WORKFLOW; notifier disabled"
                );
                return Ok(None);
            }
        };
        let Some((owner, name)) = GitHubNotifierConfig::parse_repository(repository) else {
            bail!("BASM_GITHUB_REPOSITORY must be 'owner/name', got '{repository}'");
        };
        Ok(Some(GitHubNotifierConfig {
            api_base_url: self.github_api_url.clone(),
            repository_owner: owner,
            repository_name: name,
            workflow_identifier: workflow.clone(),
            git_ref: self.github_ref.clone(),
            token: token.clone(),
            timeout: Duration::from_secs(self.github_timeout_secs),
        }))
    }

    pub fn notifier(&self) -> Result<Box<dyn Notifier>> {
        Ok(match self.github_config()? {
            Some(config) => {
                tracing::info!(
                    repository = %format!("{}/{}", config.repository_owner, config.repository_name),
                    workflow = %config.workflow_identifier,
                    "GitHub notification enabled"
                );
                Box::new(GitHubNotifier::new(config))
            }
            None => Box::new(NoopNotifier),
        })
    }
}

// ---------------------------------------------------------------------------
// Assembled run
// ---------------------------------------------------------------------------

/// Everything a mirror run needs, built once per process.
#[derive(Args, Debug, Clone)]
pub struct MirrorArgs {
    #[command(flatten)]
    pub feed: FeedArgs,

    #[command(flatten)]
    pub azure: AzureArgs,

    #[command(flatten)]
    pub notify: NotifyArgs,
}

/// Concrete collaborators for [`basm_mirror::Mirror`].
pub struct Services {
    pub series: SeriesName,
    pub gallery_name: String,
    pub image_name: String,
    pub feed: HttpFeed,
    pub gallery: ComputeGalleryClient,
    pub blobs: BlobContainerClient,
    pub notifier: Box<dyn Notifier>,
    pub config: MirrorConfig,
}

impl MirrorArgs {
    pub fn build(&self) -> Result<Services> {
        let settings = self.azure.settings();
        let credential = self.azure.credential()?;
        let config = MirrorConfig {
            workspace_base: self.azure.mounted_directory.clone(),
            selection: self.feed.selection,
            scope: settings.scope(),
        };
        Ok(Services {
            series: self.feed.series(),
            gallery_name: self.azure.gallery_name.clone(),
            image_name: self.azure.gallery_image_name.clone(),
            feed: self.feed.feed(),
            gallery: ComputeGalleryClient::new(
                settings.clone(),
                self.azure.identifier(),
                Arc::clone(&credential),
            ),
            blobs: BlobContainerClient::new(settings, credential),
            notifier: self.notify.notifier()?,
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notify(token: Option<&str>, repo: Option<&str>, workflow: Option<&str>) -> NotifyArgs {
        NotifyArgs {
            github_token: token.map(str::to_owned),
            github_repository: repo.map(str::to_owned),
            github_workflow: workflow.map(str::to_owned),
            github_ref: "main".into(),
            github_api_url: basm_notify::DEFAULT_API_BASE_URL.into(),
            github_timeout_secs: 10,
        }
    }

    #[test]
    fn notifier_needs_all_three_settings() {
        assert!(notify(None, None, None).github_config().unwrap().is_none());
        assert!(notify(Some("t"), Some("a/b"), None).github_config().unwrap().is_none());

        let config = notify(Some("t"), Some("a/b"), Some("sync.yml"))
            .github_config()
            .unwrap()
            .unwrap();
        assert_eq!(config.repository_owner, "a");
        assert_eq!(config.repository_name, "b");
        assert_eq!(config.timeout, Duration::from_secs(10));
    }

    #[test]
    fn malformed_repository_is_rejected() {
        assert!(notify(Some("t"), Some("just-a-name"), Some("w"))
            .github_config()
            .is_err());
    }
}
