//! Version resolution: which stemcell is "latest" for a series.

use std::str::FromStr;

use basm_core::{FeedEntry, SeriesName, StemcellCandidate, StemcellFeed, StemcellVersion};

use crate::error::MirrorError;

/// How the latest entry is picked from the feed listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    /// Trust the feed's newest-first ordering and take the first entry.
    #[default]
    FirstEntry,
    /// Parse every entry and take the highest version. Entries with a
    /// malformed version are skipped with a warning; the run fails only when
    /// no entry parses.
    HighestVersion,
}

impl FromStr for Selection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "first" | "first-entry" => Ok(Self::FirstEntry),
            "highest" | "highest-version" => Ok(Self::HighestVersion),
            other => Err(format!(
                "unknown version selection '{other}'; expected: first, highest"
            )),
        }
    }
}

/// Query the feed and return the candidate to mirror.
///
/// Fails without side effects when the feed is unreachable, empty, lists a
/// malformed version, or the chosen entry has no download URL.
pub fn resolve(
    feed: &dyn StemcellFeed,
    series: &SeriesName,
    selection: Selection,
) -> Result<StemcellCandidate, MirrorError> {
    let entries = feed
        .entries(series)
        .map_err(|source| MirrorError::FeedUnavailable {
            series: series.clone(),
            source,
        })?;

    let (entry, version) = match selection {
        Selection::FirstEntry => {
            let entry = entries.first().ok_or_else(|| MirrorError::EmptyFeed {
                series: series.clone(),
            })?;
            (entry, parse_version(series, entry)?)
        }
        Selection::HighestVersion => {
            let mut best: Option<(&FeedEntry, StemcellVersion)> = None;
            let mut skipped = None;
            for entry in &entries {
                let version = match StemcellVersion::parse(&entry.version) {
                    Ok(version) => version,
                    Err(err) => {
                        tracing::warn!(
                            series = %series,
                            raw_version = %entry.version,
                            "skipping feed entry with malformed version"
                        );
                        skipped.get_or_insert(err);
                        continue;
                    }
                };
                if best.map_or(true, |(_, v)| version > v) {
                    best = Some((entry, version));
                }
            }
            match (best, skipped) {
                (Some(best), _) => best,
                (None, Some(source)) => {
                    return Err(MirrorError::MalformedVersion {
                        series: series.clone(),
                        source,
                    })
                }
                (None, None) => {
                    return Err(MirrorError::EmptyFeed {
                        series: series.clone(),
                    })
                }
            }
        }
    };

    let download_url = entry
        .download_url()
        .ok_or_else(|| MirrorError::MissingDownloadUrl {
            series: series.clone(),
            version,
        })?
        .to_owned();

    tracing::debug!(
        series = %series,
        raw_version = %entry.version,
        %version,
        "resolved latest stemcell"
    );

    Ok(StemcellCandidate {
        series: series.clone(),
        version,
        download_url,
    })
}

fn parse_version(series: &SeriesName, entry: &FeedEntry) -> Result<StemcellVersion, MirrorError> {
    StemcellVersion::parse(&entry.version).map_err(|source| {
        tracing::error!(series = %series, raw_version = %entry.version, "malformed feed version");
        MirrorError::MalformedVersion {
            series: series.clone(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use basm_core::{FeedAsset, FeedError};
    use rstest::rstest;

    use super::*;

    struct StaticFeed(Result<Vec<FeedEntry>, u16>);

    impl StemcellFeed for StaticFeed {
        fn entries(&self, _series: &SeriesName) -> Result<Vec<FeedEntry>, FeedError> {
            self.0.clone().map_err(|status| FeedError::Status {
                url: "http://feed/s".into(),
                status,
            })
        }

        fn download(&self, _url: &str, _sink: &mut dyn Write) -> Result<u64, FeedError> {
            unreachable!("resolver never downloads")
        }
    }

    fn entry(version: &str, url: Option<&str>) -> FeedEntry {
        FeedEntry {
            version: version.into(),
            regular: url.map(|u| FeedAsset {
                url: Some(u.into()),
            }),
        }
    }

    fn series() -> SeriesName {
        SeriesName::from("bosh-azure-hyperv-ubuntu-jammy-go_agent")
    }

    #[test]
    fn first_entry_is_latest() {
        let feed = StaticFeed(Ok(vec![
            entry("1.682.0", Some("https://x/y.tgz")),
            entry("1.700", Some("https://x/z.tgz")),
        ]));
        let candidate = resolve(&feed, &series(), Selection::FirstEntry).unwrap();
        assert_eq!(candidate.version, StemcellVersion::new(1, 682, 0));
        assert_eq!(candidate.download_url, "https://x/y.tgz");
    }

    #[test]
    fn highest_version_ignores_feed_order() {
        let feed = StaticFeed(Ok(vec![
            entry("1.682.0", Some("https://x/y.tgz")),
            entry("1.700", Some("https://x/z.tgz")),
            entry("1.9", Some("https://x/old.tgz")),
        ]));
        let candidate = resolve(&feed, &series(), Selection::HighestVersion).unwrap();
        assert_eq!(candidate.version.to_string(), "1.700.0");
        assert_eq!(candidate.download_url, "https://x/z.tgz");
    }

    #[test]
    fn highest_version_skips_malformed_history() {
        let feed = StaticFeed(Ok(vec![
            entry("1.682.0", Some("https://x/y.tgz")),
            entry("1.x", Some("https://x/broken.tgz")),
            entry("1.9", Some("https://x/old.tgz")),
        ]));
        let candidate = resolve(&feed, &series(), Selection::HighestVersion).unwrap();
        assert_eq!(candidate.version.to_string(), "1.682.0");
    }

    #[test]
    fn highest_version_fails_when_nothing_parses() {
        let feed = StaticFeed(Ok(vec![entry("latest", Some("https://x/y.tgz"))]));
        let err = resolve(&feed, &series(), Selection::HighestVersion).unwrap_err();
        assert!(matches!(err, MirrorError::MalformedVersion { .. }), "got: {err}");
    }

    #[test]
    fn missing_download_url_is_fatal() {
        let feed = StaticFeed(Ok(vec![entry("45.6", None)]));
        let err = resolve(&feed, &series(), Selection::FirstEntry).unwrap_err();
        match err {
            MirrorError::MissingDownloadUrl { version, .. } => {
                assert_eq!(version.to_string(), "45.6.0")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_version_is_fatal() {
        let feed = StaticFeed(Ok(vec![entry("latest", Some("https://x/y.tgz"))]));
        let err = resolve(&feed, &series(), Selection::FirstEntry).unwrap_err();
        assert!(matches!(err, MirrorError::MalformedVersion { .. }), "got: {err}");
        assert!(err.to_string().contains("'latest'"));
    }

    #[rstest]
    #[case(Selection::FirstEntry)]
    #[case(Selection::HighestVersion)]
    fn empty_feed_is_fatal(#[case] selection: Selection) {
        let feed = StaticFeed(Ok(vec![]));
        let err = resolve(&feed, &series(), selection).unwrap_err();
        assert!(matches!(err, MirrorError::EmptyFeed { .. }), "got: {err}");
    }

    #[rstest]
    #[case("first", Selection::FirstEntry)]
    #[case("Highest", Selection::HighestVersion)]
    #[case("highest-version", Selection::HighestVersion)]
    #[case("HIGHEST", Selection::HighestVersion)]
    fn selection_parses(#[case] raw: &str, #[case] expected: Selection) {
        assert_eq!(raw.parse::<Selection>().unwrap(), expected);
    }

    #[test]
    fn unknown_selection_is_rejected() {
        assert!("newest".parse::<Selection>().is_err());
    }

    #[test]
    fn feed_status_error_is_feed_unavailable() {
        let feed = StaticFeed(Err(503));
        let err = resolve(&feed, &series(), Selection::FirstEntry).unwrap_err();
        assert!(matches!(
            err,
            MirrorError::FeedUnavailable {
                source: FeedError::Status { status: 503, .. },
                ..
            }
        ));
    }

}
