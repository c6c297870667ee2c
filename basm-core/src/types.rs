//! Domain types for the stemcell mirror.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::version::StemcellVersion;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A stemcell series, e.g. `bosh-azure-hyperv-ubuntu-jammy-go_agent`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeriesName(pub String);

impl SeriesName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Operating system segment of the series (`ubuntu` in the example above).
    pub fn offer(&self) -> Option<&str> {
        self.segment(3)
    }

    /// Release segment of the series (`jammy` in the example above).
    pub fn sku(&self) -> Option<&str> {
        self.segment(4)
    }

    fn segment(&self, index: usize) -> Option<&str> {
        self.0.split('-').nth(index).filter(|s| !s.is_empty())
    }
}

impl fmt::Display for SeriesName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for SeriesName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SeriesName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Feed records
// ---------------------------------------------------------------------------

/// One entry of the feed's per-series listing. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regular: Option<FeedAsset>,
}

impl FeedEntry {
    /// The `regular.url` download link, if the feed supplied one.
    pub fn download_url(&self) -> Option<&str> {
        self.regular
            .as_ref()
            .and_then(|asset| asset.url.as_deref())
            .filter(|url| !url.is_empty())
    }
}

/// A downloadable flavour of a stemcell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedAsset {
    #[serde(default)]
    pub url: Option<String>,
}

/// The feed's current latest stemcell for a series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StemcellCandidate {
    pub series: SeriesName,
    pub version: StemcellVersion,
    pub download_url: String,
}

// ---------------------------------------------------------------------------
// Gallery identity
// ---------------------------------------------------------------------------

/// The `(gallery, image, version)` triple that decides whether a stemcell has
/// already been mirrored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GalleryImageVersionKey {
    pub gallery_name: String,
    pub image_name: String,
    pub version: StemcellVersion,
}

impl GalleryImageVersionKey {
    pub fn new(
        gallery_name: impl Into<String>,
        image_name: impl Into<String>,
        version: StemcellVersion,
    ) -> Self {
        Self {
            gallery_name: gallery_name.into(),
            image_name: image_name.into(),
            version,
        }
    }
}

impl fmt::Display for GalleryImageVersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.gallery_name, self.image_name, self.version)
    }
}

/// Subscription and resource group that own the gallery.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GalleryScope {
    pub subscription_id: String,
    pub resource_group: String,
}

// ---------------------------------------------------------------------------
// Publish results
// ---------------------------------------------------------------------------

/// What a successful upload + publish produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedArtifact {
    pub blob_uri: String,
    pub gallery_image_version: String,
    pub published_at: DateTime<Utc>,
}

/// Event handed to the notifier after a new version became visible.
///
/// Field names are the workflow inputs downstream automation expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StemcellPublished {
    pub gallery_name: String,
    pub gallery_image_name: String,
    pub gallery_image_version: String,
    pub gallery_subscription_id: String,
    pub gallery_resource_group: String,
}

impl StemcellPublished {
    pub fn new(key: &GalleryImageVersionKey, scope: &GalleryScope) -> Self {
        Self {
            gallery_name: key.gallery_name.clone(),
            gallery_image_name: key.image_name.clone(),
            gallery_image_version: key.version.to_string(),
            gallery_subscription_id: scope.subscription_id.clone(),
            gallery_resource_group: scope.resource_group.clone(),
        }
    }

    /// The event as ordered `(field, value)` string pairs.
    pub fn fields(&self) -> [(&'static str, &str); 5] {
        [
            ("gallery_name", self.gallery_name.as_str()),
            ("gallery_image_name", self.gallery_image_name.as_str()),
            ("gallery_image_version", self.gallery_image_version.as_str()),
            ("gallery_subscription_id", self.gallery_subscription_id.as_str()),
            ("gallery_resource_group", self.gallery_resource_group.as_str()),
        ]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_offer_and_sku() {
        let series = SeriesName::from("bosh-azure-hyperv-ubuntu-jammy-go_agent");
        assert_eq!(series.offer(), Some("ubuntu"));
        assert_eq!(series.sku(), Some("jammy"));
        assert_eq!(SeriesName::from("ubuntu-jammy").offer(), None);
    }

    #[test]
    fn feed_entry_without_regular_has_no_url() {
        let entry: FeedEntry = serde_json::from_str(r#"{"version":"45.6"}"#).unwrap();
        assert_eq!(entry.download_url(), None);

        let entry: FeedEntry =
            serde_json::from_str(r#"{"version":"1.682.0","regular":{"url":"https://x/y.tgz","size":12}}"#)
                .unwrap();
        assert_eq!(entry.download_url(), Some("https://x/y.tgz"));
    }

    #[test]
    fn key_display() {
        let key = GalleryImageVersionKey::new("g", "img", StemcellVersion::new(1, 682, 0));
        assert_eq!(key.to_string(), "g/img/1.682.0");
    }

    #[test]
    fn published_event_serializes_with_workflow_input_names() {
        let key = GalleryImageVersionKey::new("gallery", "image", StemcellVersion::new(1, 2, 3));
        let scope = GalleryScope {
            subscription_id: "sub".into(),
            resource_group: "rg".into(),
        };
        let event = StemcellPublished::new(&key, &scope);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["gallery_image_version"], "1.2.3");
        assert_eq!(json["gallery_subscription_id"], "sub");
        assert_eq!(json["gallery_resource_group"], "rg");
        assert_eq!(event.fields()[1], ("gallery_image_name", "image"));
    }
}
