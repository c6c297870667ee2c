//! Azure Compute Gallery client over the resource manager REST API.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use basm_core::{GalleryClient, GalleryImageVersionKey, SeriesName, ServiceError};

use crate::credential::{TokenSource, MANAGEMENT_SCOPE};
use crate::http::{bearer, decode_json, dispatch, unexpected, Body};
use crate::settings::AzureSettings;

const API_VERSION: &str = "2023-07-03";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub const DEFAULT_PUBLISHER: &str = "bosh";

/// Publisher/offer/sku triple stamped on new image definitions.
///
/// Offer and sku fall back to the operating-system and release segments of
/// the series name when not set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageIdentifier {
    pub publisher: String,
    pub offer: Option<String>,
    pub sku: Option<String>,
}

impl Default for ImageIdentifier {
    fn default() -> Self {
        Self {
            publisher: DEFAULT_PUBLISHER.to_owned(),
            offer: None,
            sku: None,
        }
    }
}

impl ImageIdentifier {
    fn resolve(&self, series: &SeriesName) -> Result<Value, ServiceError> {
        let offer = self.offer.as_deref().or_else(|| series.offer());
        let sku = self.sku.as_deref().or_else(|| series.sku());
        match (offer, sku) {
            (Some(offer), Some(sku)) => Ok(json!({
                "publisher": self.publisher,
                "offer": offer,
                "sku": sku,
            })),
            _ => Err(ServiceError::InvalidInput(format!(
                "cannot derive image offer/sku from series '{series}'; set them explicitly"
            ))),
        }
    }
}

pub struct ComputeGalleryClient {
    settings: AzureSettings,
    identifier: ImageIdentifier,
    credential: Arc<dyn TokenSource>,
    agent: ureq::Agent,
}

impl ComputeGalleryClient {
    pub fn new(
        settings: AzureSettings,
        identifier: ImageIdentifier,
        credential: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            settings,
            identifier,
            credential,
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
        }
    }

    fn gallery_url(&self, gallery_name: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/galleries/{}",
            self.settings.management_endpoint(),
            self.settings.subscription_id,
            self.settings.resource_group,
            gallery_name
        )
    }

    fn image_url(&self, gallery_name: &str, image_name: &str) -> String {
        format!("{}/images/{}", self.gallery_url(gallery_name), image_name)
    }

    fn version_url(&self, key: &GalleryImageVersionKey) -> String {
        format!(
            "{}/versions/{}",
            self.image_url(&key.gallery_name, &key.image_name),
            key.version
        )
    }

    fn send(
        &self,
        method: &'static str,
        url: &str,
        body: Body<'_>,
    ) -> Result<ureq::Response, ServiceError> {
        let token = self.credential.token(MANAGEMENT_SCOPE)?;
        let request = self
            .agent
            .request(method, url)
            .query("api-version", API_VERSION)
            .set("Authorization", &bearer(&token));
        dispatch(method, url, request, body)
    }
}

impl GalleryClient for ComputeGalleryClient {
    fn version_exists(&self, key: &GalleryImageVersionKey) -> Result<bool, ServiceError> {
        let url = self.version_url(key);
        let response = self.send("GET", &url, Body::None)?;
        match response.status() {
            200 => {
                let body = decode_json(&url, response)?;
                let state = body
                    .pointer("/properties/provisioningState")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if state.eq_ignore_ascii_case("Failed") {
                    tracing::warn!(%key, "gallery image version exists in Failed state; treating as absent");
                    return Ok(false);
                }
                Ok(true)
            }
            404 => Ok(false),
            _ => Err(unexpected("GET", &url, response)),
        }
    }

    fn ensure_image_definition(
        &self,
        series: &SeriesName,
        gallery_name: &str,
        image_name: &str,
    ) -> Result<(), ServiceError> {
        let url = self.image_url(gallery_name, image_name);
        let response = self.send("GET", &url, Body::None)?;
        match response.status() {
            200 => {
                tracing::debug!(gallery = gallery_name, image = image_name, "image definition present");
                return Ok(());
            }
            404 => {}
            _ => return Err(unexpected("GET", &url, response)),
        }

        let definition = json!({
            "location": self.settings.location,
            "properties": {
                "osType": "Linux",
                "osState": "Generalized",
                "hyperVGeneration": "V1",
                "identifier": self.identifier.resolve(series)?,
            },
        });
        tracing::info!(gallery = gallery_name, image = image_name, "creating image definition");
        let response = self.send("PUT", &url, Body::Json(&definition))?;
        match response.status() {
            200 | 201 | 202 => Ok(()),
            // Only a definition that now exists makes a conflict benign.
            409 => {
                let conflict = unexpected("PUT", &url, response);
                let recheck = self.send("GET", &url, Body::None)?;
                if recheck.status() == 200 {
                    tracing::info!(gallery = gallery_name, image = image_name, "image definition created concurrently");
                    Ok(())
                } else {
                    Err(conflict)
                }
            }
            _ => Err(unexpected("PUT", &url, response)),
        }
    }

    fn publish_version(
        &self,
        key: &GalleryImageVersionKey,
        source_blob_uri: &str,
    ) -> Result<(), ServiceError> {
        let url = self.version_url(key);
        let version = json!({
            "location": self.settings.location,
            "properties": {
                "publishingProfile": {
                    "targetRegions": [
                        { "name": self.settings.location, "regionalReplicaCount": 1 }
                    ],
                },
                "storageProfile": {
                    "osDiskImage": {
                        "source": {
                            "storageAccountId": self.settings.storage_account_id(),
                            "uri": source_blob_uri,
                        },
                    },
                },
            },
        });
        let response = self.send("PUT", &url, Body::Json(&version))?;
        match response.status() {
            200 | 201 | 202 => {
                tracing::info!(%key, "gallery image version accepted");
                Ok(())
            }
            _ => Err(unexpected("PUT", &url, response)),
        }
    }
}
