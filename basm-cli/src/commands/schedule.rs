//! `basm schedule`: run at startup, then once a day.

use std::thread;

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use clap::Args;

use crate::commands::run::{prepare, run_once};
use crate::config::{MirrorArgs, Services};

/// Arguments for `basm schedule`.
#[derive(Args, Debug)]
pub struct ScheduleArgs {
    #[command(flatten)]
    pub mirror: MirrorArgs,

    /// Daily run time, `HH:MM` in UTC.
    #[arg(long, env = "BASM_DAILY_AT", default_value = "07:00", value_parser = parse_daily_at)]
    pub daily_at: NaiveTime,

    /// Wait for the first scheduled time instead of running immediately.
    #[arg(long)]
    pub skip_startup_run: bool,
}

impl ScheduleArgs {
    pub fn run(self) -> Result<()> {
        let services = self.mirror.build()?;
        prepare(&services)?;

        if !self.skip_startup_run {
            cycle(&services);
        }
        loop {
            let now = Utc::now();
            let next = next_run_after(now, self.daily_at);
            tracing::info!(next_run = %next.to_rfc3339(), "waiting for next scheduled run");
            thread::sleep((next - now).to_std().unwrap_or_default());
            cycle(&services);
        }
    }
}

/// A failed cycle is logged; the next cycle retries from scratch.
fn cycle(services: &Services) {
    match run_once(services) {
        Ok(outcome) => tracing::info!(
            key = %outcome.key(),
            published = outcome.published(),
            "scheduled run finished"
        ),
        Err(e) => tracing::error!(error = %format!("{e:#}"), "scheduled run failed"),
    }
}

fn parse_daily_at(s: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|e| format!("expected HH:MM, got '{s}': {e}"))
}

/// The first occurrence of `at` (UTC) strictly after `now`.
pub fn next_run_after(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let today = Utc.from_utc_datetime(&now.date_naive().and_time(at));
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn later_today_when_time_not_reached() {
        let next = next_run_after(utc("2024-05-01T08:30:00Z"), parse_daily_at("12:00").unwrap());
        assert_eq!(next, utc("2024-05-01T12:00:00Z"));
    }

    #[test]
    fn tomorrow_when_time_passed_or_now() {
        let at = parse_daily_at("00:00").unwrap();
        assert_eq!(
            next_run_after(utc("2024-05-01T00:00:00Z"), at),
            utc("2024-05-02T00:00:00Z")
        );
        assert_eq!(
            next_run_after(utc("2024-12-31T23:59:00Z"), at),
            utc("2025-01-01T00:00:00Z")
        );
    }

    #[test]
    fn daily_at_rejects_garbage() {
        assert!(parse_daily_at("25:00").is_err());
        assert!(parse_daily_at("noon").is_err());
        assert!(parse_daily_at(" 06:15 ").is_ok());
    }
}
