//! Cron-driven job scheduler.
//!
//! One task, ticking every 60 seconds plus an immediate pass at startup.
//! Sub-minute precision is not supported; a schedule that would match
//! more than once between ticks fires at most once per tick.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::db::DbPool;
use crate::entity::job;
use crate::models::JobStatus;
use crate::services::JobExecutor;

/// Tick granularity. Also the lookback used for never-run jobs.
const TICK: Duration = Duration::from_secs(60);

/// Schedule parse failures.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("expected 5 fields (minute hour day-of-month month day-of-week), got {0}")]
    FieldCount(usize),
    #[error(transparent)]
    Parse(#[from] cron::error::Error),
}

/// Parse an operator-supplied 5-field cron expression
/// (minute hour day-of-month month day-of-week).
///
/// The underlying parser wants a seconds field, so a literal `0` is
/// prepended after validating the field count. Numeric day-of-week
/// tokens follow standard cron (0 or 7 = Sunday) and are rewritten to
/// named days, which every parser agrees on.
pub fn parse_schedule(expr: &str) -> Result<Schedule, ScheduleError> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(ScheduleError::FieldCount(fields.len()));
    }

    let dow = normalize_day_of_week(fields[4]);
    let normalized = format!(
        "0 {} {} {} {} {}",
        fields[0], fields[1], fields[2], fields[3], dow
    );
    Ok(Schedule::from_str(&normalized)?)
}

/// Rewrite numeric day-of-week tokens (`0`-`7`, standard cron, Sunday
/// twice) into day names. `*`, `*/N`, and anything unrecognized pass
/// through untouched.
fn normalize_day_of_week(field: &str) -> String {
    fn name(n: u32) -> Option<&'static str> {
        match n {
            0 | 7 => Some("SUN"),
            1 => Some("MON"),
            2 => Some("TUE"),
            3 => Some("WED"),
            4 => Some("THU"),
            5 => Some("FRI"),
            6 => Some("SAT"),
            _ => None,
        }
    }

    field
        .split(',')
        .map(|token| {
            if let Ok(n) = token.parse::<u32>() {
                return name(n).map(str::to_string).unwrap_or_else(|| token.to_string());
            }
            if let Some((start, end)) = token.split_once('-') {
                if let (Ok(s), Ok(e)) = (start.parse::<u32>(), end.parse::<u32>()) {
                    if let (Some(s), Some(e)) = (name(s), name(e)) {
                        return format!("{}-{}", s, e);
                    }
                }
            }
            token.to_string()
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// The firing rule: with `base = last_run` (or `now - 60s` for jobs that
/// never ran), fire iff the next scheduled instant after `base` has
/// arrived. The caller's `status == running` check is the idempotent
/// guard against double-firing at minute boundaries.
pub fn is_due(schedule: &Schedule, last_run: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    let base = last_run.unwrap_or(now - chrono::Duration::seconds(60));
    match schedule.after(&base).next() {
        Some(next) => next <= now,
        None => false,
    }
}

/// Rewrite a legacy preset schedule into its canonical cron expression.
/// Anything unrecognized is returned untouched (already cron, or
/// `manual`).
pub fn migrate_preset(schedule: &str) -> &str {
    match schedule {
        "1min" => "*/1 * * * *",
        "5min" => "*/5 * * * *",
        "10min" => "*/10 * * * *",
        "15min" => "*/15 * * * *",
        "30min" => "*/30 * * * *",
        "1hour" => "0 * * * *",
        "3hour" => "0 */3 * * *",
        "6hour" => "0 */6 * * *",
        "12hour" => "0 */12 * * *",
        "daily" => "0 0 * * *",
        "weekly" => "0 0 * * 0",
        other => other,
    }
}

/// Scheduler service. Owns nothing but handles; constructed once at
/// startup and moved into its task.
pub struct Scheduler {
    pool: DbPool,
    executor: Arc<JobExecutor>,
}

impl Scheduler {
    pub fn new(pool: DbPool, executor: Arc<JobExecutor>) -> Self {
        Self { pool, executor }
    }

    /// Spawn the scheduler loop.
    pub fn start(self) {
        tokio::spawn(async move {
            info!("Scheduler started (60s tick)");

            if let Err(e) = self.migrate_legacy_presets().await {
                error!(error = %e, "legacy preset migration failed");
            }

            let mut ticker = interval(TICK);
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_pass(Utc::now()).await {
                    error!(error = %e, "scheduler pass failed");
                }
            }
        });
    }

    /// One-time rewrite of legacy preset schedules at startup.
    async fn migrate_legacy_presets(&self) -> crate::error::AppResult<()> {
        for job in self.pool.list_jobs().await? {
            let migrated = migrate_preset(&job.schedule);
            if migrated != job.schedule {
                info!(job = %job.name, from = %job.schedule, to = %migrated, "migrating legacy schedule preset");
                self.pool.rewrite_job_schedule(job.id, migrated).await?;
            }
        }
        Ok(())
    }

    /// Check every schedulable job and dispatch those that are due.
    pub async fn run_pass(&self, now: DateTime<Utc>) -> crate::error::AppResult<()> {
        let jobs = self.pool.list_schedulable_jobs().await?;

        for job in jobs {
            if !self.should_fire(&job, now) {
                continue;
            }

            info!(job = %job.name, job_id = job.id, "scheduler firing job");
            let executor = self.executor.clone();
            let job_id = job.id;
            tokio::spawn(async move {
                if let Err(e) = executor.dispatch(job_id, "scheduler").await {
                    warn!(job_id, error = %e, "scheduled dispatch failed");
                }
            });
        }

        Ok(())
    }

    /// Eligibility + firing rule for one job.
    fn should_fire(&self, job: &job::Model, now: DateTime<Utc>) -> bool {
        if job.status == JobStatus::Running.as_str() {
            return false;
        }

        let schedule = match parse_schedule(&job.schedule) {
            Ok(s) => s,
            Err(e) => {
                warn!(job = %job.name, schedule = %job.schedule, error = %e, "invalid cron expression, skipping job");
                return false;
            }
        };

        is_due(&schedule, job.last_run, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn five_field_expressions_parse() {
        assert!(parse_schedule("*/5 * * * *").is_ok());
        assert!(parse_schedule("0 */3 * * *").is_ok());
        assert!(parse_schedule("30 4 1 * 0").is_ok());
        assert!(parse_schedule("0 0 * * 1-5").is_ok());
    }

    #[test]
    fn day_of_week_zero_is_sunday() {
        // 2025-01-01 is a Wednesday; the next weekly fire lands on
        // Sunday the 5th
        let schedule = parse_schedule("0 0 * * 0").unwrap();
        let next = schedule.after(&at("2025-01-01T12:00:00Z")).next().unwrap();
        assert_eq!(next, at("2025-01-05T00:00:00Z"));

        // 7 is the other spelling of Sunday
        let schedule = parse_schedule("0 0 * * 7").unwrap();
        let next = schedule.after(&at("2025-01-01T12:00:00Z")).next().unwrap();
        assert_eq!(next, at("2025-01-05T00:00:00Z"));

        // and 1 is Monday
        let schedule = parse_schedule("0 0 * * 1").unwrap();
        let next = schedule.after(&at("2025-01-01T12:00:00Z")).next().unwrap();
        assert_eq!(next, at("2025-01-06T00:00:00Z"));
    }

    #[test]
    fn wrong_field_counts_are_rejected() {
        assert!(parse_schedule("* * * *").is_err());
        // seconds-inclusive expressions are not accepted either
        assert!(parse_schedule("0 */5 * * * *").is_err());
        assert!(parse_schedule("not a cron").is_err());
        assert!(parse_schedule("").is_err());
    }

    #[test]
    fn every_minute_fires_once_per_tick() {
        let schedule = parse_schedule("*/1 * * * *").unwrap();
        let mut last_run = None;
        let mut fired = 0;

        // simulate ten ticks, 60s apart, each stamping last_run like the
        // executor does
        for i in 0..10 {
            let now = Utc.with_ymd_and_hms(2025, 1, 1, 9, i, 30).unwrap();
            if is_due(&schedule, last_run, now) {
                fired += 1;
                last_run = Some(now);
            }
        }
        assert_eq!(fired, 10);
    }

    #[test]
    fn three_hourly_fires_exactly_once_after_gap() {
        // last run 09:00, tick at 12:00:30 - fire once, then hold until 15:00
        let schedule = parse_schedule("0 */3 * * *").unwrap();
        let last_run = Some(at("2025-01-01T09:00:00Z"));
        let now = at("2025-01-01T12:00:30Z");

        assert!(is_due(&schedule, last_run, now));

        let after_fire = Some(now);
        assert!(!is_due(&schedule, after_fire, at("2025-01-01T12:01:30Z")));
        assert!(!is_due(&schedule, after_fire, at("2025-01-01T14:59:30Z")));
        assert!(is_due(&schedule, after_fire, at("2025-01-01T15:00:10Z")));
    }

    #[test]
    fn never_run_job_fires_only_in_its_minute() {
        let schedule = parse_schedule("30 10 * * *").unwrap();
        assert!(!is_due(&schedule, None, at("2025-01-01T10:29:50Z")));
        assert!(is_due(&schedule, None, at("2025-01-01T10:30:10Z")));
        assert!(!is_due(&schedule, None, at("2025-01-01T10:31:10Z")));
    }

    #[test]
    fn missed_window_catches_up_once() {
        // hourly job whose last run is far in the past fires immediately
        let schedule = parse_schedule("0 * * * *").unwrap();
        let last_run = Some(at("2025-01-01T03:00:00Z"));
        assert!(is_due(&schedule, last_run, at("2025-01-01T09:17:00Z")));
    }

    #[test]
    fn presets_migrate_to_canonical_cron() {
        assert_eq!(migrate_preset("5min"), "*/5 * * * *");
        assert_eq!(migrate_preset("daily"), "0 0 * * *");
        assert_eq!(migrate_preset("weekly"), "0 0 * * 0");
        assert_eq!(migrate_preset("manual"), "manual");
        assert_eq!(migrate_preset("*/7 * * * *"), "*/7 * * * *");
    }
}
