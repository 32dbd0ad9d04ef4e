//! Composite phase deviation (CPD), a night-to-night sleep regularity index.
//!
//! Each night contributes a mistiming term (distance from the expected
//! schedule) and an irregularity term (distance from the previous night);
//! CPD is the length of that two-component vector, in hours.

use crate::circular::{self, format_clock};
use crate::error::StatisticsError;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use log::warn;
use std::str::FromStr;

/// Expected sleep onset and wake-up clock times for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chronotype {
    pub sleep_onset: NaiveTime,
    pub wakeup: NaiveTime,
}

impl Chronotype {
    pub fn new(sleep_onset: &str, wakeup: &str) -> Result<Self, StatisticsError> {
        Ok(Chronotype {
            sleep_onset: circular::parse_clock(sleep_onset)?,
            wakeup: circular::parse_clock(wakeup)?,
        })
    }

    /// Circular mean of onset and wake-up.
    pub fn midpoint(&self) -> Result<NaiveTime, StatisticsError> {
        let mean = circular::mean_time(&[format_clock(self.sleep_onset), format_clock(self.wakeup)])?;
        circular::parse_clock(&mean)
    }

    /// Expected sleep duration in hours, wrapping over midnight.
    pub fn duration_hours(&self) -> f64 {
        let hours = (self.wakeup - self.sleep_onset).num_seconds() as f64 / 3600.0;
        if hours < 0.0 {
            hours + 24.0
        } else {
            hours
        }
    }
}

/// Parses `HH:MM-HH:MM`.
impl FromStr for Chronotype {
    type Err = StatisticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (onset, wakeup) = s
            .split_once('-')
            .ok_or_else(|| StatisticsError::InvalidTime(s.to_string()))?;
        Chronotype::new(onset, wakeup)
    }
}

/// Places a midpoint clock time on `date`. Times between 15:00 and midnight
/// belong to the evening before.
fn anchor(date: NaiveDate, time: NaiveTime) -> NaiveDateTime {
    let anchored = date.and_time(time);
    if time.hour() > 14 {
        anchored - Duration::days(1)
    } else {
        anchored
    }
}

fn hours_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_milliseconds() as f64 / 3_600_000.0
}

fn warn_single_night(len: usize, variant: &str) {
    if len == 1 {
        warn!("CPD {variant} over a single night only reflects mistiming");
    }
}

/// CPD on the sleep midpoint, one value per `(calendar date, midpoint)` night.
///
/// Without a chronotype the reference is the circular mean of all midpoints.
pub fn cpd_midpoint(
    nights: &[(NaiveDate, NaiveDateTime)],
    chronotype: Option<&Chronotype>,
) -> Result<Vec<f64>, StatisticsError> {
    if nights.is_empty() {
        return Ok(Vec::new());
    }
    warn_single_night(nights.len(), "midpoint");

    let reference = match chronotype {
        Some(chronotype) => chronotype.midpoint()?,
        None => {
            let clocks: Vec<String> = nights.iter().map(|(_, m)| format_clock(m.time())).collect();
            circular::parse_clock(&circular::mean_time(&clocks)?)?
        }
    };

    let mut previous: Option<NaiveTime> = None;
    let values = nights
        .iter()
        .map(|&(date, midpoint)| {
            let mistiming = hours_between(midpoint, anchor(date, reference));
            let irregularity = previous
                .map(|prev| hours_between(midpoint, anchor(date, prev)))
                .unwrap_or(0.0);
            previous = Some(midpoint.time());
            mistiming.hypot(irregularity)
        })
        .collect();
    Ok(values)
}

/// CPD on sleep duration (hours), one value per night.
///
/// Without a chronotype the reference is the mean of the observed durations.
pub fn cpd_duration(durations_hours: &[f64], chronotype: Option<&Chronotype>) -> Vec<f64> {
    if durations_hours.is_empty() {
        return Vec::new();
    }
    warn_single_night(durations_hours.len(), "duration");

    let reference = chronotype.map(Chronotype::duration_hours).unwrap_or_else(|| {
        durations_hours.iter().sum::<f64>() / durations_hours.len() as f64
    });

    let mut previous: Option<f64> = None;
    durations_hours
        .iter()
        .map(|&duration| {
            let mistiming = reference - duration;
            let irregularity = previous.map(|prev| prev - duration).unwrap_or(0.0);
            previous = Some(duration);
            mistiming.hypot(irregularity)
        })
        .collect()
}
