//! `basm run`: mirror the latest stemcell once.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use basm_mirror::{Mirror, MirrorOutcome};

use crate::config::{MirrorArgs, Services};

/// Arguments for `basm run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub mirror: MirrorArgs,

    /// Print the outcome as a JSON object.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let services = self.mirror.build()?;
        prepare(&services)?;
        let outcome = run_once(&services)?;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&OutcomeJson::from(&outcome))?);
        } else {
            print_outcome(&outcome);
        }
        Ok(())
    }
}

/// One-time setup before the first run of a process.
pub fn prepare(services: &Services) -> Result<()> {
    services
        .blobs
        .ensure_container()
        .context("failed to prepare the storage container")
}

/// Execute one mirror run with the assembled collaborators.
pub fn run_once(services: &Services) -> Result<MirrorOutcome> {
    let mirror = Mirror::new(
        &services.feed,
        &services.gallery,
        &services.blobs,
        services.notifier.as_ref(),
        services.config.clone(),
    );
    mirror
        .run(&services.series, &services.gallery_name, &services.image_name)
        .with_context(|| {
            format!(
                "mirroring '{}' into {}/{} failed",
                services.series, services.gallery_name, services.image_name
            )
        })
}

#[derive(Debug, Serialize)]
struct OutcomeJson<'a> {
    published: bool,
    gallery: &'a str,
    image: &'a str,
    version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    blob_uri: Option<&'a str>,
}

impl<'a> From<&'a MirrorOutcome> for OutcomeJson<'a> {
    fn from(outcome: &'a MirrorOutcome) -> Self {
        let key = outcome.key();
        let blob_uri = match outcome {
            MirrorOutcome::Published { artifact, .. } => Some(artifact.blob_uri.as_str()),
            MirrorOutcome::AlreadyMirrored { .. } => None,
        };
        Self {
            published: outcome.published(),
            gallery: &key.gallery_name,
            image: &key.image_name,
            version: key.version.to_string(),
            blob_uri,
        }
    }
}

fn print_outcome(outcome: &MirrorOutcome) {
    match outcome {
        MirrorOutcome::AlreadyMirrored { key } => {
            println!("{} {key} is already mirrored", "·".dimmed());
        }
        MirrorOutcome::Published { key, artifact } => {
            println!("{} published {key}", "✓".green());
            println!("  source  {}", artifact.blob_uri);
            println!("  at      {}", artifact.published_at.to_rfc3339());
        }
    }
}
