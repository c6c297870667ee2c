//! GitHub Actions `workflow_dispatch` notifier.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use basm_core::{NotifyError, Notifier, StemcellPublished};

pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const API_VERSION: &str = "2022-11-28";

/// Where and how to dispatch the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubNotifierConfig {
    pub api_base_url: String,
    pub repository_owner: String,
    pub repository_name: String,
    /// Workflow file name (`sync.yml`) or numeric id.
    pub workflow_identifier: String,
    /// Branch or tag the workflow runs on.
    pub git_ref: String,
    pub token: String,
    pub timeout: Duration,
}

impl GitHubNotifierConfig {
    /// Split an `owner/name` repository slug.
    pub fn parse_repository(slug: &str) -> Option<(String, String)> {
        let (owner, name) = slug.trim().split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some((owner.to_owned(), name.to_owned()))
    }

    fn dispatch_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/actions/workflows/{}/dispatches",
            self.api_base_url.trim_end_matches('/'),
            self.repository_owner,
            self.repository_name,
            self.workflow_identifier
        )
    }
}

#[derive(Debug, Serialize)]
struct DispatchPayload<'a> {
    #[serde(rename = "ref")]
    git_ref: &'a str,
    inputs: BTreeMap<&'a str, &'a str>,
}

/// Triggers a workflow run for every newly published stemcell.
pub struct GitHubNotifier {
    config: GitHubNotifierConfig,
    agent: ureq::Agent,
}

impl GitHubNotifier {
    pub fn new(config: GitHubNotifierConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Self { config, agent }
    }
}

impl Notifier for GitHubNotifier {
    fn notify_new_stemcell(&self, event: &StemcellPublished) -> Result<(), NotifyError> {
        let payload = DispatchPayload {
            git_ref: &self.config.git_ref,
            inputs: event.fields().into_iter().collect(),
        };

        tracing::info!(
            workflow = %self.config.workflow_identifier,
            repository = %format!("{}/{}", self.config.repository_owner, self.config.repository_name),
            "dispatching GitHub workflow"
        );

        let result = self
            .agent
            .post(&self.config.dispatch_url())
            .set("Authorization", &format!("Bearer {}", self.config.token))
            .set("Accept", "application/vnd.github+json")
            .set("X-GitHub-Api-Version", API_VERSION)
            .send_json(&payload);

        let (status, body) = match result {
            Ok(response) => {
                let status = response.status();
                if status == 200 || status == 204 {
                    tracing::info!(status, "GitHub workflow dispatch accepted");
                    return Ok(());
                }
                (status, response.into_string().unwrap_or_default())
            }
            Err(ureq::Error::Status(status, response)) => {
                (status, response.into_string().unwrap_or_default())
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(NotifyError::Transport(transport.to_string()));
            }
        };

        tracing::error!(status, %body, "GitHub workflow dispatch failed");
        Err(NotifyError::Dispatch {
            workflow: self.config.workflow_identifier.clone(),
            status,
            body,
        })
    }
}
