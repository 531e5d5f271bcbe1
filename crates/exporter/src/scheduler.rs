//! Fixed-cadence job scheduling
//!
//! One task drives every job, so runs never overlap. Each job keeps its own
//! due time; a slot that falls due while another job runs is started as soon
//! as that run ends. Several missed slots of the same job collapse into one run.

use chrono::{
    DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc,
    Weekday,
};
use exporter_lib::{
    pipeline::{refresh_catalogs, CatalogSettings, ChatNotifier, Pipeline, CATALOG_JOB},
    collector::PriceListSource,
    ExporterMetrics, HealthRegistry, StructuredLogger,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info};

/// When a job fires, in local time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// At minute zero of every hour
    Hourly,
    Weekly {
        weekday: Weekday,
        hour: u32,
        minute: u32,
    },
    /// On a fixed day of every month
    Monthly { day: u32, hour: u32, minute: u32 },
}

fn at_time(date: NaiveDate, hour: u32, minute: u32) -> NaiveDateTime {
    date.and_time(NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN))
}

fn first_of_next_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date)
}

impl Cadence {
    /// Next wall-clock slot strictly after `now`
    fn next_naive(&self, now: NaiveDateTime) -> NaiveDateTime {
        match *self {
            Cadence::Hourly => at_time(now.date(), now.hour(), 0) + Duration::hours(1),
            Cadence::Weekly {
                weekday,
                hour,
                minute,
            } => {
                let days_ahead = (7 + weekday.num_days_from_monday()
                    - now.weekday().num_days_from_monday())
                    % 7;
                let candidate = at_time(now.date() + Duration::days(days_ahead as i64), hour, minute);
                if candidate > now {
                    candidate
                } else {
                    candidate + Duration::days(7)
                }
            }
            Cadence::Monthly { day, hour, minute } => {
                let this_month = now
                    .date()
                    .with_day(day)
                    .map(|date| at_time(date, hour, minute));
                match this_month {
                    Some(candidate) if candidate > now => candidate,
                    _ => {
                        let next = first_of_next_month(now.date());
                        at_time(next.with_day(day).unwrap_or(next), hour, minute)
                    }
                }
            }
        }
    }

    /// Next firing time after `now` in `now`'s time zone
    ///
    /// A slot that falls into a daylight-saving gap fires an hour later.
    pub fn next_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DateTime<Tz> {
        let naive = self.next_naive(now.naive_local());
        let tz = now.timezone();

        tz.from_local_datetime(&naive)
            .earliest()
            .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
            .unwrap_or_else(|| now.clone() + Duration::hours(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    CostCollection,
    Recommendations,
    CatalogRefresh,
}

impl Job {
    pub const ALL: [Job; 3] = [Job::CostCollection, Job::Recommendations, Job::CatalogRefresh];

    pub fn cadence(&self) -> Cadence {
        match self {
            Job::CostCollection => Cadence::Hourly,
            Job::Recommendations => Cadence::Weekly {
                weekday: Weekday::Mon,
                hour: 15,
                minute: 10,
            },
            Job::CatalogRefresh => Cadence::Monthly {
                day: 1,
                hour: 0,
                minute: 5,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Job::CostCollection => exporter_lib::pipeline::COST_JOB,
            Job::Recommendations => exporter_lib::pipeline::RECOMMENDATION_JOB,
            Job::CatalogRefresh => CATALOG_JOB,
        }
    }
}

/// Due time of every job
#[derive(Debug, Clone)]
pub struct Schedule<Tz: TimeZone> {
    due: Vec<(Job, DateTime<Tz>)>,
}

impl<Tz: TimeZone> Schedule<Tz> {
    pub fn starting_at(jobs: &[Job], now: &DateTime<Tz>) -> Self {
        Self {
            due: jobs
                .iter()
                .map(|job| (*job, job.cadence().next_after(now)))
                .collect(),
        }
    }

    /// Earliest due job, possibly already overdue; ties go to the job listed first
    pub fn next(&self) -> Option<(Job, DateTime<Tz>)> {
        self.due
            .iter()
            .min_by_key(|(_, at)| at.clone())
            .map(|(job, at)| (*job, at.clone()))
    }

    /// Move `job` past the slot it just ran for
    ///
    /// The following slot is taken from the slot itself, not from `now`, so
    /// slots of other jobs are unaffected by how long the run took.
    pub fn advance(&mut self, job: Job, now: &DateTime<Tz>) {
        let cadence = job.cadence();
        for (scheduled, at) in self.due.iter_mut().filter(|(j, _)| *j == job) {
            let following = cadence.next_after(at);
            *at = if following <= *now {
                cadence.next_after(now)
            } else {
                following
            };
            debug!(job = scheduled.name(), "Job slot advanced");
        }
    }
}

/// Everything a job run needs
pub struct JobRunner {
    pub pipeline: Pipeline,
    pub accounts: Vec<String>,
    pub metrics: ExporterMetrics,
    pub notifier: Arc<dyn ChatNotifier>,
    pub price_source: Arc<dyn PriceListSource>,
    pub catalog_settings: CatalogSettings,
    pub health: HealthRegistry,
    pub logger: StructuredLogger,
}

impl JobRunner {
    pub async fn run(&self, job: Job) {
        info!(job = job.name(), "Starting scheduled job");

        match job {
            Job::CostCollection => {
                let summary = self.pipeline.collect_costs(&self.accounts, &self.metrics).await;
                self.health.record_cost_collection(&summary).await;
            }
            Job::Recommendations => {
                let summary = self
                    .pipeline
                    .generate_recommendations(&self.accounts, self.notifier.as_ref())
                    .await;
                self.health.record_recommendations(&summary).await;
            }
            Job::CatalogRefresh => {
                let started = Instant::now();
                let refreshed = refresh_catalogs(
                    self.pipeline.catalogs(),
                    self.price_source.as_ref(),
                    &self.catalog_settings,
                    &self.metrics,
                    &self.logger,
                )
                .await;
                self.metrics
                    .observe_job_duration(CATALOG_JOB, started.elapsed().as_secs_f64());

                match refreshed {
                    Ok(catalogs) => {
                        self.health
                            .catalog_loaded(catalogs.built_at.unwrap_or_else(Utc::now))
                            .await
                    }
                    Err(e) => self.health.catalog_refresh_failed(format!("{:#}", e)).await,
                }
            }
        }
    }
}

/// Run jobs at their cadence until shutdown
pub async fn run(runner: Arc<JobRunner>, mut shutdown: broadcast::Receiver<()>) {
    info!("Starting job scheduler");

    let mut schedule = Schedule::starting_at(&Job::ALL, &Local::now());

    loop {
        let Some((job, at)) = schedule.next() else {
            break;
        };
        let wait = (at.clone() - Local::now()).to_std().unwrap_or_default();
        debug!(job = job.name(), at = %at, "Next job scheduled");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                runner.run(job).await;
                schedule.advance(job, &Local::now());
            }
            _ = shutdown.recv() => {
                info!("Shutting down job scheduler");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_hourly_fires_on_the_hour() {
        assert_eq!(
            Cadence::Hourly.next_after(&utc(2024, 4, 3, 5, 59)),
            utc(2024, 4, 3, 6, 0)
        );
        assert_eq!(
            Cadence::Hourly.next_after(&utc(2024, 4, 3, 6, 0)),
            utc(2024, 4, 3, 7, 0)
        );
        assert_eq!(
            Cadence::Hourly.next_after(&utc(2024, 12, 31, 23, 30)),
            utc(2025, 1, 1, 0, 0)
        );
    }

    #[test]
    fn test_weekly_recommendations_on_monday_afternoon() {
        let cadence = Job::Recommendations.cadence();

        // Wednesday 2024-04-03
        assert_eq!(cadence.next_after(&utc(2024, 4, 3, 9, 0)), utc(2024, 4, 8, 15, 10));
        // Monday before and after the slot
        assert_eq!(cadence.next_after(&utc(2024, 4, 8, 15, 0)), utc(2024, 4, 8, 15, 10));
        assert_eq!(cadence.next_after(&utc(2024, 4, 8, 15, 10)), utc(2024, 4, 15, 15, 10));
    }

    #[test]
    fn test_monthly_refresh_on_the_first() {
        let cadence = Job::CatalogRefresh.cadence();

        assert_eq!(cadence.next_after(&utc(2024, 4, 1, 0, 0)), utc(2024, 4, 1, 0, 5));
        assert_eq!(cadence.next_after(&utc(2024, 4, 1, 0, 5)), utc(2024, 5, 1, 0, 5));
        assert_eq!(cadence.next_after(&utc(2024, 12, 15, 12, 0)), utc(2025, 1, 1, 0, 5));
    }

    #[test]
    fn test_schedule_picks_earliest() {
        let schedule = Schedule::starting_at(&Job::ALL, &utc(2024, 4, 8, 15, 5));
        assert_eq!(schedule.next(), Some((Job::Recommendations, utc(2024, 4, 8, 15, 10))));

        let schedule = Schedule::starting_at(&Job::ALL, &utc(2024, 4, 30, 23, 50));
        assert_eq!(schedule.next(), Some((Job::CostCollection, utc(2024, 5, 1, 0, 0))));

        let schedule = Schedule::starting_at(&Job::ALL, &utc(2024, 5, 1, 0, 1));
        assert_eq!(schedule.next(), Some((Job::CatalogRefresh, utc(2024, 5, 1, 0, 5))));
    }

    #[test]
    fn test_refresh_runs_after_overrunning_cost_job() {
        let mut schedule = Schedule::starting_at(&Job::ALL, &utc(2024, 4, 30, 23, 30));
        assert_eq!(schedule.next(), Some((Job::CostCollection, utc(2024, 5, 1, 0, 0))));

        // Cost collection started at 00:00 and finished after the 00:05 refresh slot
        schedule.advance(Job::CostCollection, &utc(2024, 5, 1, 0, 6));
        assert_eq!(schedule.next(), Some((Job::CatalogRefresh, utc(2024, 5, 1, 0, 5))));

        schedule.advance(Job::CatalogRefresh, &utc(2024, 5, 1, 0, 7));
        assert_eq!(schedule.next(), Some((Job::CostCollection, utc(2024, 5, 1, 1, 0))));
    }

    #[test]
    fn test_recommendations_run_after_overrunning_cost_job() {
        // Monday 2024-04-08
        let mut schedule = Schedule::starting_at(&Job::ALL, &utc(2024, 4, 8, 14, 30));
        assert_eq!(schedule.next(), Some((Job::CostCollection, utc(2024, 4, 8, 15, 0))));

        schedule.advance(Job::CostCollection, &utc(2024, 4, 8, 15, 12));
        assert_eq!(schedule.next(), Some((Job::Recommendations, utc(2024, 4, 8, 15, 10))));

        schedule.advance(Job::Recommendations, &utc(2024, 4, 8, 15, 40));
        assert_eq!(schedule.next(), Some((Job::CostCollection, utc(2024, 4, 8, 16, 0))));
    }

    #[test]
    fn test_missed_hourly_slots_collapse_into_one_run() {
        let mut schedule = Schedule::starting_at(&[Job::CostCollection], &utc(2024, 4, 3, 5, 30));

        schedule.advance(Job::CostCollection, &utc(2024, 4, 3, 9, 20));
        assert_eq!(schedule.next(), Some((Job::CostCollection, utc(2024, 4, 3, 10, 0))));
    }
}
