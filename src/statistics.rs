//! Per-user orchestration of the nightly sleep and HRV metrics.
//!
//! Each entry point loads a user's tables once, derives every night from
//! them, and reports per-user failures in the result map instead of aborting.

use crate::circular;
use crate::config::{EngineConfig, NightMethod};
use crate::data_loading::SleepDataLoader;
use crate::error::{LoadError, StatisticsError};
use crate::heart_analysis::{self, HrvMetric};
use crate::metrics::{self, Metric, MetricComputationContext, MetricValue};
use crate::stages::{self, merge_short_stages};
use crate::{BeatInterval, SleepSummary, StageEvent};
use chrono::{Days, Duration, NaiveDate, NaiveDateTime};
use log::{debug, warn};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Result per user. A user whose data could not be loaded maps to an error.
pub type PerUser<T> = BTreeMap<String, Result<T, LoadError>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserSelection {
    All,
    Only(Vec<String>),
}

impl From<Vec<String>> for UserSelection {
    /// An empty list selects every user.
    fn from(users: Vec<String>) -> Self {
        if users.is_empty() {
            UserSelection::All
        } else {
            UserSelection::Only(users)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    Mean,
    Std,
    Min,
    Max,
}

impl FromStr for Reduction {
    type Err = StatisticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mean" => Ok(Reduction::Mean),
            "std" => Ok(Reduction::Std),
            "min" => Ok(Reduction::Min),
            "max" => Ok(Reduction::Max),
            other => Err(StatisticsError::UnknownReduction(other.to_string())),
        }
    }
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Reduction::Mean => "mean",
            Reduction::Std => "std",
            Reduction::Min => "min",
            Reduction::Max => "max",
        };
        f.write_str(name)
    }
}

/// A metric reduced over a date range. `Number(NaN)` marks an all-null series.
#[derive(Debug, Clone, PartialEq)]
pub enum ReducedValue {
    Number(f64),
    ClockTime(String),
}

impl ReducedValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ReducedValue::Number(v) => Some(*v),
            ReducedValue::ClockTime(_) => None,
        }
    }
}

impl fmt::Display for ReducedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReducedValue::Number(v) => write!(f, "{v}"),
            ReducedValue::ClockTime(t) => f.write_str(t),
        }
    }
}

impl Serialize for ReducedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ReducedValue::Number(v) => serializer.serialize_f64(*v),
            ReducedValue::ClockTime(t) => serializer.serialize_str(t),
        }
    }
}

/// Serialises as `{"<metric>": value, "days": [...]}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReducedStatistic {
    pub metric: Metric,
    pub value: ReducedValue,
    pub days: Vec<NaiveDate>,
}

impl Serialize for ReducedStatistic {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(self.metric.name(), &self.value)?;
        map.serialize_entry("days", &self.days)?;
        map.end()
    }
}

pub type DailyValues = BTreeMap<NaiveDate, Option<MetricValue>>;

/// Outcome of a single-metric query. A user without data in range gets an
/// empty `Daily` map regardless of the requested reduction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatisticOutcome {
    Daily(DailyValues),
    Reduced(ReducedStatistic),
}

/// Outcome of an all-metric query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatisticsOutcome {
    Daily(BTreeMap<NaiveDate, BTreeMap<Metric, Option<MetricValue>>>),
    Reduced {
        values: BTreeMap<Metric, ReducedValue>,
        days: Vec<NaiveDate>,
    },
}

pub type SleepTimestamps = BTreeMap<NaiveDate, (NaiveDateTime, NaiveDateTime)>;
pub type NightlyHrv = BTreeMap<NaiveDate, BTreeMap<HrvMetric, f64>>;

/// One user's nights for a query window, loaded once and shared by all metrics.
#[derive(Debug, Clone, Default)]
pub struct NightData {
    /// One bout per calendar date, sorted by date.
    pub summary: SleepSummary,
    /// Stage sequences by bout id, short events already merged in.
    pub stages: BTreeMap<String, Vec<StageEvent>>,
}

impl NightData {
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.summary.bouts.iter().map(|b| b.calendar_date).collect()
    }

    fn events(&self, bout_id: &str) -> &[StageEvent] {
        self.stages.get(bout_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn check_range(start: NaiveDate, end: NaiveDate) -> Result<(), StatisticsError> {
    if end < start {
        return Err(StatisticsError::InvalidDateRange { start, end });
    }
    Ok(())
}

/// Reduces a per-day series. Clock-time metrics use circular statistics on
/// their `HH:MM` form; everything else ignores nulls.
pub fn reduce(
    metric: Metric,
    series: &[Option<MetricValue>],
    reduction: Reduction,
) -> Result<ReducedValue, StatisticsError> {
    if metric.is_clock_time() {
        let clocks: Vec<String> = series
            .iter()
            .flatten()
            .filter_map(MetricValue::as_clock)
            .map(circular::format_clock)
            .collect();
        if clocks.is_empty() {
            return Ok(ReducedValue::Number(f64::NAN));
        }
        let bedtime = metric == Metric::Bedtime;
        let reduced = match reduction {
            Reduction::Mean => circular::mean_time(&clocks)?,
            Reduction::Std => circular::std_time(&clocks)?,
            Reduction::Min if bedtime => circular::earliest_bedtime(&clocks)?,
            Reduction::Min => circular::earliest_wakeup_time(&clocks)?,
            Reduction::Max if bedtime => circular::latest_bedtime(&clocks)?,
            Reduction::Max => circular::latest_wakeup_time(&clocks)?,
        };
        return Ok(ReducedValue::ClockTime(reduced));
    }

    let values: Vec<f64> = series
        .iter()
        .flatten()
        .filter_map(MetricValue::as_f64)
        .filter(|v| !v.is_nan())
        .collect();
    if values.is_empty() {
        return Ok(ReducedValue::Number(f64::NAN));
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let reduced = match reduction {
        Reduction::Mean => mean,
        Reduction::Std => (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt(),
        Reduction::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        Reduction::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    };
    Ok(ReducedValue::Number(reduced))
}

/// The sleep statistics engine over a loader collaborator.
pub struct SleepStatistics<'l, L: SleepDataLoader + ?Sized> {
    loader: &'l L,
    config: EngineConfig,
}

impl<'l, L: SleepDataLoader + ?Sized> SleepStatistics<'l, L> {
    pub fn new(loader: &'l L, config: EngineConfig) -> Self {
        SleepStatistics { loader, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn resolve_users(&self, users: &UserSelection) -> Result<Vec<String>, StatisticsError> {
        match users {
            UserSelection::All => Ok(self.loader.users()?),
            UserSelection::Only(users) => Ok(users.clone()),
        }
    }

    /// Loads a user's summary for `[start, end]`, keeps one bout per date,
    /// and attaches stage sequences loaded over a padded window.
    pub fn load_night_data(
        &self,
        user: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<NightData, LoadError> {
        let summary = self
            .loader
            .load_sleep_summary(user, start, end)?
            .dedup_same_day();
        if summary.is_empty() {
            return Ok(NightData {
                summary,
                stages: BTreeMap::new(),
            });
        }

        let padding = Days::new(self.config.padding_days);
        let stage_start = start.checked_sub_days(padding).unwrap_or(start);
        let stage_end = end.checked_add_days(padding).unwrap_or(end);
        let mut base = group_by_bout(self.loader.load_sleep_stages(user, stage_start, stage_end)?);
        let mut short =
            group_by_bout(self.loader.load_short_stages(user, stage_start, stage_end)?);

        let mut stages = BTreeMap::new();
        for bout in &summary.bouts {
            let events = base.remove(&bout.id).unwrap_or_default();
            let overlay = short.remove(&bout.id).unwrap_or_default();
            let events = if events.is_empty() || overlay.is_empty() {
                events
            } else {
                merge_short_stages(&events, &overlay).unwrap_or_else(|err| {
                    warn!("Keeping base stages of {}: {}", bout.id, err);
                    events.clone()
                })
            };
            stages.insert(bout.id.clone(), events);
        }
        Ok(NightData { summary, stages })
    }

    /// Runs `per_user` for every selected user on that user's night data.
    fn for_each_user<T, F>(
        &self,
        users: &UserSelection,
        start: NaiveDate,
        end: NaiveDate,
        mut per_user: F,
    ) -> Result<PerUser<T>, StatisticsError>
    where
        F: FnMut(&str, NightData) -> Result<Result<T, LoadError>, StatisticsError>,
    {
        check_range(start, end)?;
        let mut results = BTreeMap::new();
        for user in self.resolve_users(users)? {
            let outcome = match self.load_night_data(&user, start, end) {
                Ok(data) => per_user(&user, data)?,
                Err(err) => {
                    warn!("Could not load sleep data for {}: {}", user, err);
                    Err(err)
                }
            };
            results.insert(user, outcome);
        }
        Ok(results)
    }

    fn context<'a>(&'a self, user: &str, data: &'a NightData) -> MetricComputationContext<'a> {
        MetricComputationContext {
            summary: &data.summary,
            stages: &data.stages,
            chronotype: self.config.chronotype(user),
        }
    }

    /// One metric per night, or its reduction over the range.
    pub fn get_statistic(
        &self,
        users: &UserSelection,
        metric: Metric,
        start: NaiveDate,
        end: NaiveDate,
        reduction: Option<Reduction>,
    ) -> Result<PerUser<StatisticOutcome>, StatisticsError> {
        self.for_each_user(users, start, end, |user, data| {
            if data.summary.is_empty() {
                return Ok(Ok(StatisticOutcome::Daily(BTreeMap::new())));
            }
            let values = metrics::compute(metric, &self.context(user, &data))?;
            let days = data.dates();
            let outcome = match reduction {
                None => StatisticOutcome::Daily(days.into_iter().zip(values).collect()),
                Some(reduction) => StatisticOutcome::Reduced(ReducedStatistic {
                    metric,
                    value: reduce(metric, &values, reduction)?,
                    days,
                }),
            };
            Ok(Ok(outcome))
        })
    }

    /// Every metric per night, or every reduction, from a single load.
    pub fn get_statistics(
        &self,
        users: &UserSelection,
        start: NaiveDate,
        end: NaiveDate,
        reduction: Option<Reduction>,
    ) -> Result<PerUser<StatisticsOutcome>, StatisticsError> {
        self.get_metrics(users, &Metric::ALL, start, end, reduction)
    }

    /// Like [`get_statistics`](Self::get_statistics) for a subset of metrics.
    pub fn get_metrics(
        &self,
        users: &UserSelection,
        selected: &[Metric],
        start: NaiveDate,
        end: NaiveDate,
        reduction: Option<Reduction>,
    ) -> Result<PerUser<StatisticsOutcome>, StatisticsError> {
        self.for_each_user(users, start, end, |user, data| {
            let days = data.dates();
            if days.is_empty() {
                return Ok(Ok(StatisticsOutcome::Daily(BTreeMap::new())));
            }
            let ctx = self.context(user, &data);
            let mut columns = BTreeMap::new();
            for &metric in selected {
                columns.insert(metric, metrics::compute(metric, &ctx)?);
            }

            let outcome = match reduction {
                None => {
                    let mut daily: BTreeMap<NaiveDate, BTreeMap<Metric, Option<MetricValue>>> =
                        BTreeMap::new();
                    for (metric, values) in &columns {
                        for (day, value) in days.iter().zip(values) {
                            daily.entry(*day).or_default().insert(*metric, *value);
                        }
                    }
                    StatisticsOutcome::Daily(daily)
                }
                Some(reduction) => {
                    let mut values = BTreeMap::new();
                    for (metric, series) in &columns {
                        values.insert(*metric, reduce(*metric, series, reduction)?);
                    }
                    StatisticsOutcome::Reduced { values, days }
                }
            };
            Ok(Ok(outcome))
        })
    }

    /// Bedtime and wake-up per night.
    pub fn sleep_timestamps(
        &self,
        users: &UserSelection,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PerUser<SleepTimestamps>, StatisticsError> {
        self.for_each_user(users, start, end, |_, data| {
            Ok(Ok(data
                .summary
                .bouts
                .iter()
                .map(|b| (b.calendar_date, (b.bedtime(), b.wakeup())))
                .collect()))
        })
    }

    /// One nightly HRV metric. Nights without a usable window are absent.
    pub fn night_hrv(
        &self,
        users: &UserSelection,
        metric: HrvMetric,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PerUser<BTreeMap<NaiveDate, f64>>, StatisticsError> {
        let nightly = self.night_hrv_metrics(users, &[metric], start, end)?;
        Ok(nightly
            .into_iter()
            .map(|(user, result)| {
                let flattened = result.map(|nights| {
                    nights
                        .into_iter()
                        .filter_map(|(date, values)| values.get(&metric).map(|v| (date, *v)))
                        .collect()
                });
                (user, flattened)
            })
            .collect())
    }

    /// All nightly HRV metrics from one beat-interval load per user.
    pub fn night_hrv_statistics(
        &self,
        users: &UserSelection,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PerUser<NightlyHrv>, StatisticsError> {
        self.night_hrv_metrics(users, &HrvMetric::ALL, start, end)
    }

    pub fn night_hrv_metrics(
        &self,
        users: &UserSelection,
        metrics: &[HrvMetric],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PerUser<NightlyHrv>, StatisticsError> {
        self.for_each_user(users, start, end, |user, data| {
            Ok(self.user_night_hrv(user, &data, metrics))
        })
    }

    fn user_night_hrv(
        &self,
        user: &str,
        data: &NightData,
        metrics: &[HrvMetric],
    ) -> Result<NightlyHrv, LoadError> {
        let bouts = &data.summary.bouts;
        let (Some(first), Some(last_wakeup)) =
            (bouts.first(), bouts.iter().map(|b| b.wakeup()).max())
        else {
            return Ok(BTreeMap::new());
        };
        let hrv = &self.config.hrv;
        let padding = Duration::hours(hrv.bbi_padding_hours);
        let mut bbi = self
            .loader
            .load_bbi(user, first.bedtime() - padding, last_wakeup + padding)?;
        bbi.sort_by_key(|s| s.timestamp);

        let mut nights = BTreeMap::new();
        for bout in bouts {
            let (bedtime, wakeup) = (bout.bedtime(), bout.wakeup());
            let lo = bbi.partition_point(|s| s.timestamp < bedtime);
            let hi = bbi.partition_point(|s| s.timestamp <= wakeup);
            let mut samples: Vec<BeatInterval> = bbi[lo..hi].to_vec();

            if hrv.method == NightMethod::FilterAwake {
                let hypnogram = stages::hypnogram(
                    bedtime,
                    wakeup,
                    data.events(&bout.id),
                    self.config.hypnogram_resolution_minutes,
                );
                let awake = stages::awake_windows(&hypnogram);
                samples.retain(|s| {
                    !awake
                        .iter()
                        .any(|(from, to)| s.timestamp >= *from && s.timestamp <= *to)
                });
            }
            if let Some(filter) = &hrv.filter {
                samples = filter.apply(&samples);
            }

            let values = heart_analysis::night_statistics(&samples, metrics, hrv);
            debug!(
                "{} {}: {} beats, {} HRV values",
                user,
                bout.calendar_date,
                samples.len(),
                values.len()
            );
            if !values.is_empty() {
                nights.insert(bout.calendar_date, values);
            }
        }
        Ok(nights)
    }
}

fn group_by_bout(events: Vec<StageEvent>) -> BTreeMap<String, Vec<StageEvent>> {
    let mut grouped: BTreeMap<String, Vec<StageEvent>> = BTreeMap::new();
    for event in events {
        grouped.entry(event.summary_id.clone()).or_default().push(event);
    }
    for events in grouped.values_mut() {
        events.sort_by_key(|e| e.start);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_loading::{InMemoryLoader, UserTables};
    use crate::stages::SleepStage;
    use crate::test_support::*;
    use crate::SummaryColumns;
    use pretty_assertions::assert_eq;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn loader() -> InMemoryLoader {
        let mut first = bout("b1", "2023-05-09", "2023-05-08 23:00", 420);
        first.n1_ms = Some(300 * 60_000);
        first.rem_ms = Some(120 * 60_000);
        first.awake_ms = Some(0);
        let mut nap = bout("nap", "2023-05-09", "2023-05-09 14:00", 30);
        nap.n1_ms = Some(30 * 60_000);
        let mut second = bout("b2", "2023-05-10", "2023-05-10 00:00", 360);
        second.n1_ms = Some(360 * 60_000);
        second.awake_ms = Some(30 * 60_000);

        let tables = UserTables {
            summary: SleepSummary {
                columns: SummaryColumns::all(),
                bouts: vec![first, nap, second],
            },
            stages: vec![
                event("b1", "2023-05-08 23:00", 300, SleepStage::N1),
                event("b1", "2023-05-09 04:00", 120, SleepStage::Rem),
                event("nap", "2023-05-09 14:00", 30, SleepStage::N1),
                event("b2", "2023-05-10 00:00", 30, SleepStage::Awake),
                event("b2", "2023-05-10 00:30", 360, SleepStage::N1),
            ],
            ..UserTables::default()
        };
        InMemoryLoader::new().with_user("u1", tables)
    }

    #[test]
    fn daily_values_follow_deduplicated_nights() {
        let loader = loader();
        let engine = SleepStatistics::new(&loader, EngineConfig::default());
        let result = engine
            .get_statistic(
                &UserSelection::All,
                Metric::TotalSleepTime,
                date("2023-05-09"),
                date("2023-05-10"),
                None,
            )
            .unwrap();
        let StatisticOutcome::Daily(daily) = result["u1"].as_ref().unwrap() else {
            panic!("expected daily values");
        };
        assert_eq!(
            daily,
            &BTreeMap::from([
                (date("2023-05-09"), Some(MetricValue::Number(420.0))),
                (date("2023-05-10"), Some(MetricValue::Number(360.0))),
            ])
        );
    }

    #[test]
    fn reductions_over_numeric_and_clock_metrics() {
        let loader = loader();
        let engine = SleepStatistics::new(&loader, EngineConfig::default());
        let users = UserSelection::Only(vec!["u1".to_string()]);
        let (start, end) = (date("2023-05-09"), date("2023-05-10"));

        let mean = engine
            .get_statistic(&users, Metric::TotalSleepTime, start, end, Some(Reduction::Mean))
            .unwrap();
        let StatisticOutcome::Reduced(reduced) = mean["u1"].as_ref().unwrap() else {
            panic!("expected a reduction");
        };
        assert_eq!(reduced.value, ReducedValue::Number(390.0));
        assert_eq!(reduced.days, vec![start, end]);
        assert_eq!(
            serde_json::to_value(reduced).unwrap(),
            serde_json::json!({"TST": 390.0, "days": ["2023-05-09", "2023-05-10"]})
        );

        let earliest = engine
            .get_statistic(&users, Metric::Bedtime, start, end, Some(Reduction::Min))
            .unwrap();
        let StatisticOutcome::Reduced(reduced) = earliest["u1"].as_ref().unwrap() else {
            panic!("expected a reduction");
        };
        assert_eq!(reduced.value, ReducedValue::ClockTime("23:00".to_string()));
    }

    #[test]
    fn all_null_series_reduces_to_nan() {
        let value = reduce(Metric::N2Latency, &[None, None], Reduction::Mean).unwrap();
        assert!(value.as_f64().unwrap().is_nan());
        let std = reduce(
            Metric::Score,
            &[Some(MetricValue::Number(70.0)), None, Some(MetricValue::Number(90.0))],
            Reduction::Std,
        )
        .unwrap();
        assert_eq!(std, ReducedValue::Number(10.0));
    }

    #[test]
    fn get_statistics_reduces_every_metric() {
        let loader = loader();
        let engine = SleepStatistics::new(&loader, EngineConfig::default());
        let result = engine
            .get_statistics(
                &UserSelection::All,
                date("2023-05-09"),
                date("2023-05-10"),
                Some(Reduction::Max),
            )
            .unwrap();
        let StatisticsOutcome::Reduced { values, days } = result["u1"].as_ref().unwrap() else {
            panic!("expected reductions");
        };
        assert_eq!(values.len(), Metric::ALL.len());
        assert_eq!(days.len(), 2);
        assert_eq!(values[&Metric::SleepOnsetLatency], ReducedValue::Number(30.0));
        assert_eq!(
            values[&Metric::WakeupTime],
            ReducedValue::ClockTime("06:30".to_string())
        );
    }

    #[test]
    fn argument_errors_fail_the_call_and_load_errors_stay_per_user() {
        let loader = loader();
        let engine = SleepStatistics::new(&loader, EngineConfig::default());
        assert!(matches!(
            engine.get_statistic(
                &UserSelection::All,
                Metric::TotalSleepTime,
                date("2023-05-10"),
                date("2023-05-09"),
                None
            ),
            Err(StatisticsError::InvalidDateRange { .. })
        ));
        assert!(matches!(
            "median".parse::<Reduction>(),
            Err(StatisticsError::UnknownReduction(_))
        ));

        let users = UserSelection::Only(vec!["u1".to_string(), "ghost".to_string()]);
        let result = engine
            .get_statistic(&users, Metric::TotalSleepTime, date("2023-06-01"), date("2023-06-02"), None)
            .unwrap();
        assert_eq!(
            result["u1"].as_ref().unwrap(),
            &StatisticOutcome::Daily(BTreeMap::new())
        );
        assert!(matches!(result["ghost"], Err(LoadError::UnknownUser(_))));
    }

    /// One hour in bed with an awake spell from 00:20 to 00:30 during which
    /// the beat-to-beat variability doubles.
    fn hrv_loader() -> InMemoryLoader {
        let mut night = bout("h", "2023-05-10", "2023-05-10 00:00", 60);
        night.awake_ms = Some(0);
        let start = at("2023-05-10 00:00");
        let bbi = (0..=3600)
            .map(|k: i64| {
                let swing = if (1200..1800).contains(&k) { 200.0 } else { 100.0 };
                let sign = if k % 2 == 0 { -1.0 } else { 1.0 };
                BeatInterval {
                    timestamp: start + Duration::seconds(k),
                    interval_ms: 1000.0 + sign * swing,
                }
            })
            .collect();
        let tables = UserTables {
            summary: SleepSummary {
                columns: SummaryColumns::all(),
                bouts: vec![night],
            },
            stages: vec![
                event("h", "2023-05-10 00:00", 20, SleepStage::N2),
                event("h", "2023-05-10 00:20", 10, SleepStage::Awake),
                event("h", "2023-05-10 00:30", 30, SleepStage::N2),
            ],
            bbi,
            ..UserTables::default()
        };
        InMemoryLoader::new().with_user("u1", tables)
    }

    #[test]
    fn night_hrv_excludes_awake_windows() {
        let loader = hrv_loader();
        let day = date("2023-05-10");

        let engine = SleepStatistics::new(&loader, EngineConfig::default());
        let filtered = engine
            .night_hrv(&UserSelection::All, HrvMetric::Rmssd, day, day)
            .unwrap();
        assert_eq!(filtered["u1"].as_ref().unwrap(), &BTreeMap::from([(day, 200.0)]));

        let mut config = EngineConfig::default();
        config.hrv.method = NightMethod::AllNight;
        let engine = SleepStatistics::new(&loader, config);
        let all_night = engine
            .night_hrv(&UserSelection::All, HrvMetric::Rmssd, day, day)
            .unwrap();
        assert_eq!(all_night["u1"].as_ref().unwrap(), &BTreeMap::from([(day, 233.33)]));

        let statistics = engine
            .night_hrv_statistics(&UserSelection::All, day, day)
            .unwrap();
        let night = &statistics["u1"].as_ref().unwrap()[&day];
        assert_eq!(night[&HrvMetric::Rmssd], 233.33);
        assert!(night.contains_key(&HrvMetric::Sdnn));
    }

    #[test]
    fn sleep_timestamps_span_time_in_bed() {
        let loader = loader();
        let engine = SleepStatistics::new(&loader, EngineConfig::default());
        let result = engine
            .sleep_timestamps(&UserSelection::All, date("2023-05-10"), date("2023-05-10"))
            .unwrap();
        let nights = result["u1"].as_ref().unwrap();
        assert_eq!(
            nights[&date("2023-05-10")],
            (at("2023-05-10 00:00"), at("2023-05-10 06:30"))
        );
    }
}
