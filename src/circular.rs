//! Directional statistics over clock times of day.
//!
//! Times are points on a 24 hour circle, so the mean of 23:50 and 00:10 is
//! 00:00 rather than 12:00. All functions take and return `HH:MM` strings.

use crate::error::StatisticsError;
use chrono::{NaiveTime, Timelike};
use std::f64::consts::TAU;

const SECONDS_PER_DAY: f64 = 86_400.0;
const MINUTES_PER_DAY: i64 = 1_440;

pub fn parse_clock(time: &str) -> Result<NaiveTime, StatisticsError> {
    let trimmed = time.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|_| StatisticsError::InvalidTime(time.to_string()))
}

pub fn format_clock(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

fn format_seconds(seconds: f64) -> String {
    let seconds = (seconds.round() as i64).rem_euclid(SECONDS_PER_DAY as i64);
    format!("{:02}:{:02}", seconds / 3600, (seconds % 3600) / 60)
}

fn parse_all<S: AsRef<str>>(times: &[S]) -> Result<Vec<NaiveTime>, StatisticsError> {
    if times.is_empty() {
        return Err(StatisticsError::EmptyInput(
            "no clock times to summarise".to_string(),
        ));
    }
    times.iter().map(|t| parse_clock(t.as_ref())).collect()
}

/// Sum of unit vectors for each time, as (sin, cos) components.
fn resultant(times: &[NaiveTime]) -> (f64, f64) {
    times.iter().fold((0.0, 0.0), |(sin, cos), t| {
        let angle = t.num_seconds_from_midnight() as f64 * TAU / SECONDS_PER_DAY;
        (sin + angle.sin(), cos + angle.cos())
    })
}

/// Circular mean of clock times.
///
/// The mean is rounded to the nearest second and then truncated to the minute,
/// so a phase landing on `22:00:59.9` reads `22:01` rather than `22:00`.
/// Perfectly opposed times have no defined mean; the result is then whatever
/// the floating point phase resolves to.
pub fn mean_time<S: AsRef<str>>(times: &[S]) -> Result<String, StatisticsError> {
    let times = parse_all(times)?;
    let n = times.len() as f64;
    let (sin, cos) = resultant(&times);
    let mut seconds = (sin / n).atan2(cos / n) * SECONDS_PER_DAY / TAU;
    if seconds < 0.0 {
        seconds += SECONDS_PER_DAY;
    }
    Ok(format_seconds(seconds))
}

/// Circular standard deviation `sqrt(-2 ln R)`, expressed as an `HH:MM` span.
pub fn std_time<S: AsRef<str>>(times: &[S]) -> Result<String, StatisticsError> {
    let times = parse_all(times)?;
    let n = times.len() as f64;
    let (sin, cos) = resultant(&times);
    let r = ((sin / n).powi(2) + (cos / n).powi(2))
        .sqrt()
        .clamp(f64::MIN_POSITIVE, 1.0);
    let radians = (-2.0 * r.ln()).sqrt();
    let hours = (radians.to_degrees() / 15.0) % 24.0;
    let whole = hours.floor();
    let minutes = ((hours - whole) * 60.0).trunc();
    Ok(format!("{:02}:{:02}", whole as u32, minutes as u32))
}

fn minutes_of(time: &NaiveTime) -> i64 {
    (time.hour() * 60 + time.minute()) as i64
}

/// Bedtimes before noon belong to the following day.
fn bedtime_key(time: &NaiveTime) -> i64 {
    let minutes = minutes_of(time);
    if time.hour() < 12 {
        minutes + MINUTES_PER_DAY
    } else {
        minutes
    }
}

/// Wake times from noon onwards belong to the previous day.
fn wakeup_key(time: &NaiveTime) -> i64 {
    let minutes = minutes_of(time);
    if time.hour() >= 12 {
        minutes - MINUTES_PER_DAY
    } else {
        minutes
    }
}

fn pick<S, F>(times: &[S], key: F, latest: bool) -> Result<String, StatisticsError>
where
    S: AsRef<str>,
    F: Fn(&NaiveTime) -> i64,
{
    let times = parse_all(times)?;
    let chosen = if latest {
        times.iter().max_by_key(|t| key(t))
    } else {
        times.iter().min_by_key(|t| key(t))
    };
    chosen
        .map(|t| format_clock(*t))
        .ok_or_else(|| StatisticsError::EmptyInput("no clock times to compare".to_string()))
}

pub fn earliest_bedtime<S: AsRef<str>>(times: &[S]) -> Result<String, StatisticsError> {
    pick(times, bedtime_key, false)
}

pub fn latest_bedtime<S: AsRef<str>>(times: &[S]) -> Result<String, StatisticsError> {
    pick(times, bedtime_key, true)
}

pub fn earliest_wakeup_time<S: AsRef<str>>(times: &[S]) -> Result<String, StatisticsError> {
    pick(times, wakeup_key, false)
}

pub fn latest_wakeup_time<S: AsRef<str>>(times: &[S]) -> Result<String, StatisticsError> {
    pick(times, wakeup_key, true)
}
