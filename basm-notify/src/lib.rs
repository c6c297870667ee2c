//! Publish notifications for the stemcell mirror.
//!
//! [`GitHubNotifier`] triggers a GitHub Actions workflow through the
//! `workflow_dispatch` API so downstream automation can pick up a newly
//! published gallery image version.

pub mod github;

pub use github::{GitHubNotifier, GitHubNotifierConfig, DEFAULT_API_BASE_URL, DEFAULT_TIMEOUT};
