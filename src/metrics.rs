use crate::aggregation::StageProfile;
use crate::error::StatisticsError;
use crate::regularity::{self, Chronotype};
use crate::stages::SleepStage;
use crate::{SleepBout, SleepSummary, StageEvent, MS_PER_HOUR, MS_PER_MINUTE};
use chrono::NaiveTime;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The closed vocabulary of nightly sleep metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Metric {
    TimeInBed,
    TotalSleepTime,
    SleepPeriodTime,
    WakeAfterSleepOnset,
    SleepEfficiency,
    SleepMaintenanceEfficiency,
    N1Duration,
    N2Duration,
    N3Duration,
    RemDuration,
    NremDuration,
    AwakeDuration,
    UnmeasurableDuration,
    N1Percentage,
    N2Percentage,
    N3Percentage,
    RemPercentage,
    NremPercentage,
    SleepOnsetLatency,
    N1Latency,
    N2Latency,
    N3Latency,
    RemLatency,
    AwakeCount,
    N1Count,
    N2Count,
    N3Count,
    RemCount,
    Score,
    Bedtime,
    WakeupTime,
    Midpoint,
    CpdMidpoint,
    CpdDuration,
}

impl Metric {
    pub const ALL: [Metric; 34] = [
        Metric::TimeInBed,
        Metric::TotalSleepTime,
        Metric::SleepPeriodTime,
        Metric::WakeAfterSleepOnset,
        Metric::SleepEfficiency,
        Metric::SleepMaintenanceEfficiency,
        Metric::N1Duration,
        Metric::N2Duration,
        Metric::N3Duration,
        Metric::RemDuration,
        Metric::NremDuration,
        Metric::AwakeDuration,
        Metric::UnmeasurableDuration,
        Metric::N1Percentage,
        Metric::N2Percentage,
        Metric::N3Percentage,
        Metric::RemPercentage,
        Metric::NremPercentage,
        Metric::SleepOnsetLatency,
        Metric::N1Latency,
        Metric::N2Latency,
        Metric::N3Latency,
        Metric::RemLatency,
        Metric::AwakeCount,
        Metric::N1Count,
        Metric::N2Count,
        Metric::N3Count,
        Metric::RemCount,
        Metric::Score,
        Metric::Bedtime,
        Metric::WakeupTime,
        Metric::Midpoint,
        Metric::CpdMidpoint,
        Metric::CpdDuration,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::TimeInBed => "TIB",
            Metric::TotalSleepTime => "TST",
            Metric::SleepPeriodTime => "SPT",
            Metric::WakeAfterSleepOnset => "WASO",
            Metric::SleepEfficiency => "SE",
            Metric::SleepMaintenanceEfficiency => "SME",
            Metric::N1Duration => "N1",
            Metric::N2Duration => "N2",
            Metric::N3Duration => "N3",
            Metric::RemDuration => "REM",
            Metric::NremDuration => "NREM",
            Metric::AwakeDuration => "AWAKE",
            Metric::UnmeasurableDuration => "UNMEASURABLE",
            Metric::N1Percentage => "%N1",
            Metric::N2Percentage => "%N2",
            Metric::N3Percentage => "%N3",
            Metric::RemPercentage => "%REM",
            Metric::NremPercentage => "%NREM",
            Metric::SleepOnsetLatency => "SOL",
            Metric::N1Latency => "Lat_N1",
            Metric::N2Latency => "Lat_N2",
            Metric::N3Latency => "Lat_N3",
            Metric::RemLatency => "Lat_REM",
            Metric::AwakeCount => "countAwake",
            Metric::N1Count => "countN1",
            Metric::N2Count => "countN2",
            Metric::N3Count => "countN3",
            Metric::RemCount => "countREM",
            Metric::Score => "SCORE",
            Metric::Bedtime => "bedTime",
            Metric::WakeupTime => "wakeupTime",
            Metric::Midpoint => "midpoint",
            Metric::CpdMidpoint => "CPD_midpoint",
            Metric::CpdDuration => "CPD_duration",
        }
    }

    /// Metrics whose values are clock times of day.
    pub fn is_clock_time(self) -> bool {
        matches!(self, Metric::Bedtime | Metric::WakeupTime | Metric::Midpoint)
    }

    /// Whether computing this metric needs the stage event table.
    pub fn needs_stages(self) -> bool {
        matches!(
            self,
            Metric::SleepPeriodTime
                | Metric::WakeAfterSleepOnset
                | Metric::SleepMaintenanceEfficiency
                | Metric::SleepOnsetLatency
                | Metric::N1Latency
                | Metric::N2Latency
                | Metric::N3Latency
                | Metric::RemLatency
                | Metric::AwakeCount
                | Metric::N1Count
                | Metric::N2Count
                | Metric::N3Count
                | Metric::RemCount
        )
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = StatisticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .iter()
            .copied()
            .find(|m| m.name() == s)
            .ok_or_else(|| StatisticsError::UnknownMetric(s.to_string()))
    }
}

impl Serialize for Metric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// A single nightly metric value. Nulls are `Option::None` around it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Number(f64),
    Count(u32),
    ClockTime(NaiveTime),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(v) => Some(*v),
            MetricValue::Count(c) => Some(*c as f64),
            MetricValue::ClockTime(_) => None,
        }
    }

    pub fn as_clock(&self) -> Option<NaiveTime> {
        match self {
            MetricValue::ClockTime(t) => Some(*t),
            _ => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(v) => write!(f, "{v}"),
            MetricValue::Count(c) => write!(f, "{c}"),
            MetricValue::ClockTime(t) => write!(f, "{}", t.format("%H:%M")),
        }
    }
}

impl Serialize for MetricValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MetricValue::Number(v) => serializer.serialize_f64(*v),
            MetricValue::Count(c) => serializer.serialize_u32(*c),
            MetricValue::ClockTime(t) => serializer.collect_str(&t.format("%H:%M")),
        }
    }
}

/// Everything a metric may read, passed uniformly to every metric.
#[derive(Debug, Clone, Copy)]
pub struct MetricComputationContext<'a> {
    pub summary: &'a SleepSummary,
    /// Chronologically ordered stage events keyed by bout id.
    pub stages: &'a BTreeMap<String, Vec<StageEvent>>,
    pub chronotype: Option<&'a Chronotype>,
}

impl<'a> MetricComputationContext<'a> {
    fn profile(&self, bout: &SleepBout) -> StageProfile<'a> {
        let events = self
            .stages
            .get(&bout.id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        StageProfile::new(bout.start, events)
    }

    fn stage_minutes(&self, bout: &SleepBout, stage: SleepStage) -> Option<f64> {
        if !self.summary.columns.has_stage(stage) {
            return None;
        }
        bout.stage_ms(stage).map(|ms| ms as f64 / MS_PER_MINUTE)
    }

    fn time_in_bed(&self, bout: &SleepBout) -> Option<f64> {
        self.summary
            .columns
            .awake
            .then(|| bout.time_in_bed_ms() as f64 / MS_PER_MINUTE)
    }

    /// Missing stage values count as zero; only a schema with none of the
    /// sleep stage columns yields null.
    fn total_sleep_time(&self, bout: &SleepBout) -> Option<f64> {
        let columns = &self.summary.columns;
        if !columns.has_any_sleep_stage() {
            return None;
        }
        let total: i64 = SleepStage::SLEEP
            .iter()
            .filter(|&&stage| columns.has_stage(stage))
            .filter_map(|&stage| bout.stage_ms(stage))
            .sum();
        Some(total as f64 / MS_PER_MINUTE)
    }

    fn nrem(&self, bout: &SleepBout) -> Option<f64> {
        let rem = self.stage_minutes(bout, SleepStage::Rem).unwrap_or(0.0);
        self.total_sleep_time(bout).map(|tst| tst - rem)
    }

    fn percentage_of_tst(&self, bout: &SleepBout, part: Option<f64>) -> Option<f64> {
        ratio_percent(part?, self.total_sleep_time(bout)?)
    }

    fn nightly(&self, metric: Metric, bout: &SleepBout) -> Option<MetricValue> {
        use MetricValue::{ClockTime, Count, Number};
        let number = |v: Option<f64>| v.map(Number);
        let latency = |stage| number(self.profile(bout).latency(stage));
        let count = |stage| self.profile(bout).count(stage).map(Count);
        let stage_share = |stage| {
            number(self.percentage_of_tst(bout, self.stage_minutes(bout, stage)))
        };

        match metric {
            Metric::TimeInBed => number(self.time_in_bed(bout)),
            Metric::TotalSleepTime => number(self.total_sleep_time(bout)),
            Metric::SleepPeriodTime => number(self.profile(bout).sleep_period_time()),
            Metric::WakeAfterSleepOnset => number(self.profile(bout).wake_after_sleep_onset()),
            Metric::SleepEfficiency => number(
                self.total_sleep_time(bout)
                    .zip(self.time_in_bed(bout))
                    .and_then(|(tst, tib)| ratio_percent(tst, tib)),
            ),
            Metric::SleepMaintenanceEfficiency => number(
                self.total_sleep_time(bout)
                    .zip(self.profile(bout).sleep_period_time())
                    .and_then(|(tst, spt)| ratio_percent(tst, spt)),
            ),
            Metric::N1Duration => number(self.stage_minutes(bout, SleepStage::N1)),
            Metric::N2Duration => number(self.stage_minutes(bout, SleepStage::N2)),
            Metric::N3Duration => number(self.stage_minutes(bout, SleepStage::N3)),
            Metric::RemDuration => number(self.stage_minutes(bout, SleepStage::Rem)),
            Metric::NremDuration => number(self.nrem(bout)),
            Metric::AwakeDuration => number(self.stage_minutes(bout, SleepStage::Awake)),
            Metric::UnmeasurableDuration => {
                number(self.stage_minutes(bout, SleepStage::Unmeasurable))
            }
            Metric::N1Percentage => stage_share(SleepStage::N1),
            Metric::N2Percentage => stage_share(SleepStage::N2),
            Metric::N3Percentage => stage_share(SleepStage::N3),
            Metric::RemPercentage => stage_share(SleepStage::Rem),
            Metric::NremPercentage => number(self.percentage_of_tst(bout, self.nrem(bout))),
            Metric::SleepOnsetLatency => number(self.profile(bout).sleep_onset_latency()),
            Metric::N1Latency => latency(SleepStage::N1),
            Metric::N2Latency => latency(SleepStage::N2),
            Metric::N3Latency => latency(SleepStage::N3),
            Metric::RemLatency => latency(SleepStage::Rem),
            Metric::AwakeCount => count(SleepStage::Awake),
            Metric::N1Count => count(SleepStage::N1),
            Metric::N2Count => count(SleepStage::N2),
            Metric::N3Count => count(SleepStage::N3),
            Metric::RemCount => count(SleepStage::Rem),
            Metric::Score => bout.score.map(Number),
            Metric::Bedtime => Some(ClockTime(bout.bedtime().time())),
            Metric::WakeupTime => Some(ClockTime(bout.wakeup().time())),
            Metric::Midpoint => Some(ClockTime(bout.midpoint().time())),
            // series metrics are handled in `compute`
            Metric::CpdMidpoint | Metric::CpdDuration => None,
        }
    }
}

fn ratio_percent(part: f64, whole: f64) -> Option<f64> {
    (whole != 0.0).then(|| part / whole * 100.0)
}

/// Computes `metric` for every bout in the summary, in summary order.
pub fn compute(
    metric: Metric,
    ctx: &MetricComputationContext<'_>,
) -> Result<Vec<Option<MetricValue>>, StatisticsError> {
    let bouts = &ctx.summary.bouts;
    match metric {
        Metric::CpdMidpoint => {
            let nights: Vec<_> = bouts
                .iter()
                .map(|b| (b.calendar_date, b.midpoint()))
                .collect();
            let values = regularity::cpd_midpoint(&nights, ctx.chronotype)?;
            Ok(values.into_iter().map(|v| Some(MetricValue::Number(v))).collect())
        }
        Metric::CpdDuration => {
            let hours: Vec<f64> = bouts
                .iter()
                .map(|b| b.duration_ms as f64 / MS_PER_HOUR)
                .collect();
            let values = regularity::cpd_duration(&hours, ctx.chronotype);
            Ok(values.into_iter().map(|v| Some(MetricValue::Number(v))).collect())
        }
        _ => Ok(bouts.iter().map(|b| ctx.nightly(metric, b)).collect()),
    }
}
