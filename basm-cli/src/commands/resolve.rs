//! `basm resolve`: show which stemcell the feed offers, without touching
//! the cloud.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use crate::config::FeedArgs;

/// Arguments for `basm resolve`.
#[derive(Args, Debug)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub feed: FeedArgs,

    /// Print the candidate as JSON.
    #[arg(long)]
    pub json: bool,
}

impl ResolveArgs {
    pub fn run(self) -> Result<()> {
        let series = self.feed.series();
        let candidate = basm_mirror::resolve(&self.feed.feed(), &series, self.feed.selection)
            .with_context(|| format!("failed to resolve the latest stemcell of '{series}'"))?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&candidate)?);
        } else {
            println!("{} {}", candidate.series.as_str().bold(), candidate.version);
            println!("  {}", candidate.download_url);
        }
        Ok(())
    }
}
