use chrono::{FixedOffset, NaiveTime, TimeZone};
use clokwerk::{AsyncScheduler, Interval, Job};
use log::info;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;

use crate::config::EvictionConfig;
use crate::evictor::Evictor;

const POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScheduleParseError {
    #[error("invalid eviction interval '{0}', expected <n>m, <n>h or <n>d")]
    Interval(String),
    #[error("invalid eviction time '{0}', expected HH:MM")]
    Time(String),
    #[error("a fixed time of day is only supported for day intervals")]
    TimeWithoutDays,
    #[error("invalid time zone '{0}', expected local, utc or an offset like +02:00")]
    TimeZone(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleUnit {
    Minutes,
    Hours,
    Days,
}

/// How often the eviction sweep runs, e.g. `30m`, `6h` or `1d@03:00`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionSchedule {
    pub every: u32,
    pub unit: ScheduleUnit,
    pub at: Option<String>,
}

impl EvictionSchedule {
    pub fn interval(&self) -> Interval {
        match self.unit {
            ScheduleUnit::Minutes => Interval::Minutes(self.every),
            ScheduleUnit::Hours => Interval::Hours(self.every),
            ScheduleUnit::Days => Interval::Days(self.every),
        }
    }
}

impl fmt::Display for EvictionSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            ScheduleUnit::Minutes => "m",
            ScheduleUnit::Hours => "h",
            ScheduleUnit::Days => "d",
        };
        write!(f, "{}{}", self.every, unit)?;
        if let Some(at) = &self.at {
            write!(f, "@{}", at)?;
        }
        Ok(())
    }
}

impl FromStr for EvictionSchedule {
    type Err = ScheduleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (interval, at) = match s.split_once('@') {
            Some((interval, at)) => (interval.trim(), Some(at.trim())),
            None => (s, None),
        };

        let bad_interval = || ScheduleParseError::Interval(interval.to_string());
        let unit = match interval.chars().last().map(|c| c.to_ascii_lowercase()) {
            Some('m') => ScheduleUnit::Minutes,
            Some('h') => ScheduleUnit::Hours,
            Some('d') => ScheduleUnit::Days,
            _ => return Err(bad_interval()),
        };
        let every: u32 = interval[..interval.len() - 1]
            .parse()
            .map_err(|_| bad_interval())?;
        if every == 0 {
            return Err(bad_interval());
        }

        let at = match at {
            Some(at) => {
                if unit != ScheduleUnit::Days {
                    return Err(ScheduleParseError::TimeWithoutDays);
                }
                let time = NaiveTime::parse_from_str(at, "%H:%M")
                    .map_err(|_| ScheduleParseError::Time(at.to_string()))?;
                Some(time.format("%H:%M").to_string())
            }
            None => None,
        };

        Ok(Self { every, unit, at })
    }
}

/// Time zone the schedule's time of day is interpreted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleTimeZone {
    Local,
    Utc,
    Fixed(FixedOffset),
}

impl FromStr for ScheduleTimeZone {
    type Err = ScheduleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(ScheduleTimeZone::Local),
            "utc" | "z" => Ok(ScheduleTimeZone::Utc),
            other => other
                .parse::<FixedOffset>()
                .map(ScheduleTimeZone::Fixed)
                .map_err(|_| ScheduleParseError::TimeZone(s.to_string())),
        }
    }
}

/// Periodically sweeps the artifact cache.
pub struct EvictionScheduler {
    evictor: Evictor,
    config: EvictionConfig,
}

impl EvictionScheduler {
    pub fn new(evictor: Evictor, config: EvictionConfig) -> Self {
        Self { evictor, config }
    }

    pub fn start(self) -> JoinHandle<()> {
        info!(
            "Eviction scheduler started - every {} ({:?}), max age {}s",
            self.config.schedule,
            self.config.timezone,
            self.config.max_age.as_secs()
        );
        match self.config.timezone {
            ScheduleTimeZone::Local => self.spawn(AsyncScheduler::with_tz(chrono::Local)),
            ScheduleTimeZone::Utc => self.spawn(AsyncScheduler::with_tz(chrono::Utc)),
            ScheduleTimeZone::Fixed(offset) => self.spawn(AsyncScheduler::with_tz(offset)),
        }
    }

    fn spawn<Tz>(self, mut scheduler: AsyncScheduler<Tz>) -> JoinHandle<()>
    where
        Tz: TimeZone + Send + Sync + 'static,
        <Tz as TimeZone>::Offset: Send + Sync,
    {
        let evictor = self.evictor;
        let max_age = self.config.max_age;

        let job = scheduler.every(self.config.schedule.interval());
        if let Some(at) = &self.config.schedule.at {
            job.at(at);
        }
        job.run(move || {
            let evictor = evictor.clone();
            async move {
                evictor.sweep(SystemTime::now(), max_age).await;
            }
        });

        tokio::spawn(async move {
            loop {
                scheduler.run_pending().await;
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        })
    }
}
