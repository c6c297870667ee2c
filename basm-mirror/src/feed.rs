//! Blocking HTTP client for the public stemcell feed.

use std::io::Write;
use std::time::Duration;

use basm_core::{FeedEntry, FeedError, SeriesName, StemcellFeed};

/// Public feed the stemcells are mirrored from.
pub const DEFAULT_FEED_URL: &str = "https://bosh.io/api/v1/stemcells";

/// Connect timeout for feed requests. Reads are unbounded: archives are
/// several gigabytes.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// [`StemcellFeed`] backed by `GET {base_url}/{series}`.
pub struct HttpFeed {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpFeed {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .build();
        Self { base_url, agent }
    }

    pub fn series_url(&self, series: &SeriesName) -> String {
        format!("{}/{}", self.base_url, series)
    }

    fn get(&self, url: &str) -> Result<ureq::Response, FeedError> {
        self.agent.get(url).call().map_err(|err| match err {
            ureq::Error::Status(status, _) => FeedError::Status {
                url: url.to_owned(),
                status,
            },
            ureq::Error::Transport(transport) => FeedError::Transport {
                url: url.to_owned(),
                message: transport.to_string(),
            },
        })
    }
}

impl Default for HttpFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_URL)
    }
}

impl StemcellFeed for HttpFeed {
    fn entries(&self, series: &SeriesName) -> Result<Vec<FeedEntry>, FeedError> {
        let url = self.series_url(series);
        tracing::debug!(%url, "querying stemcell feed");
        self.get(&url)?
            .into_json::<Vec<FeedEntry>>()
            .map_err(|e| FeedError::Decode {
                url: url.clone(),
                message: e.to_string(),
            })
    }

    fn download(&self, url: &str, sink: &mut dyn Write) -> Result<u64, FeedError> {
        let response = self.get(url)?;
        let mut body = response.into_reader();
        let written = std::io::copy(&mut body, sink).map_err(|source| FeedError::Io {
            url: url.to_owned(),
            source,
        })?;
        sink.flush().map_err(|source| FeedError::Io {
            url: url.to_owned(),
            source,
        })?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use basm_core::testing::{FakeHttpServer, ScriptedResponse};
    use serde_json::json;

    use super::*;

    #[test]
    fn entries_decodes_feed_listing() {
        let server = FakeHttpServer::start(vec![ScriptedResponse::json(
            200,
            json!([
                {"name": "s", "version": "1.682", "regular": {"url": "https://x/y.tgz", "size": 1}},
                {"version": "1.681"}
            ]),
        )])
        .unwrap();
        let feed = HttpFeed::new(format!("{}/api/v1/stemcells/", server.url()));

        let entries = feed.entries(&SeriesName::from("ubuntu-jammy")).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].version, "1.682");
        assert_eq!(entries[0].download_url(), Some("https://x/y.tgz"));
        assert_eq!(entries[1].download_url(), None);

        let requests = server.finish();
        assert_eq!(requests[0].method, "GET");
        assert_eq!(requests[0].path(), "/api/v1/stemcells/ubuntu-jammy");
    }

    #[test]
    fn non_success_status_is_reported() {
        let server = FakeHttpServer::start(vec![ScriptedResponse::text(404, "Not Found")]).unwrap();
        let feed = HttpFeed::new(server.url());

        let err = feed.entries(&SeriesName::from("nope")).unwrap_err();
        assert!(matches!(err, FeedError::Status { status: 404, .. }), "got: {err}");
        server.finish();
    }

    #[test]
    fn invalid_json_is_a_decode_error() {
        let server =
            FakeHttpServer::start(vec![ScriptedResponse::text(200, "<html>oops</html>")]).unwrap();
        let feed = HttpFeed::new(server.url());

        let err = feed.entries(&SeriesName::from("s")).unwrap_err();
        assert!(matches!(err, FeedError::Decode { .. }), "got: {err}");
        server.finish();
    }

    #[test]
    fn download_streams_body_into_sink() {
        let payload: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        let server = FakeHttpServer::start(vec![ScriptedResponse::bytes(200, payload.clone())])
            .unwrap();
        let feed = HttpFeed::new(server.url());

        let mut sink = Vec::new();
        let written = feed
            .download(&format!("{}/stemcell.tgz", server.url()), &mut sink)
            .unwrap();
        assert_eq!(written, payload.len() as u64);
        assert_eq!(sink, payload);
        server.finish();
    }
}
