pub mod aggregation;
pub mod circular;
pub mod config;
pub mod data_loading;
pub mod error;
pub mod heart_analysis;
pub mod metrics;
pub mod output;
pub mod regularity;
pub mod stages;
pub mod statistics;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;
use stages::SleepStage;

pub const MS_PER_MINUTE: f64 = 60_000.0;
pub const MS_PER_HOUR: f64 = 3_600_000.0;

/// One detected sleep period for one user, as reported by the sleep summary.
///
/// All timestamps are local wall-clock time (UTC timestamp shifted by the
/// recorded offset), without a timezone attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SleepBout {
    pub id: String,
    pub calendar_date: NaiveDate,
    pub start: NaiveDateTime,
    pub timezone_offset_ms: i64,
    pub unix_timestamp_ms: i64,
    pub duration_ms: i64,
    pub n1_ms: Option<i64>,
    pub n2_ms: Option<i64>,
    pub n3_ms: Option<i64>,
    pub rem_ms: Option<i64>,
    pub awake_ms: Option<i64>,
    pub unmeasurable_ms: Option<i64>,
    pub score: Option<f64>,
}

impl SleepBout {
    /// Sleep period plus awake time. A missing awake duration counts as zero.
    pub fn time_in_bed_ms(&self) -> i64 {
        self.duration_ms + self.awake_ms.unwrap_or(0)
    }

    pub fn bedtime(&self) -> NaiveDateTime {
        self.start
    }

    pub fn wakeup(&self) -> NaiveDateTime {
        self.start + Duration::milliseconds(self.time_in_bed_ms())
    }

    pub fn midpoint(&self) -> NaiveDateTime {
        self.start + Duration::milliseconds(self.time_in_bed_ms() / 2)
    }

    /// Summary duration recorded for a single stage, if any.
    pub fn stage_ms(&self, stage: SleepStage) -> Option<i64> {
        match stage {
            SleepStage::N1 => self.n1_ms,
            SleepStage::N2 => self.n2_ms,
            SleepStage::N3 => self.n3_ms,
            SleepStage::Rem => self.rem_ms,
            SleepStage::Awake => self.awake_ms,
            SleepStage::Unmeasurable => self.unmeasurable_ms,
        }
    }
}

/// Which optional columns the summary source actually carries.
///
/// A column that exists but is empty for a night yields a null for that night,
/// while a column missing from the schema changes how aggregates are formed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SummaryColumns {
    pub n1: bool,
    pub n2: bool,
    pub n3: bool,
    pub rem: bool,
    pub awake: bool,
    pub unmeasurable: bool,
    pub score: bool,
}

impl SummaryColumns {
    pub fn all() -> Self {
        SummaryColumns {
            n1: true,
            n2: true,
            n3: true,
            rem: true,
            awake: true,
            unmeasurable: true,
            score: true,
        }
    }

    pub fn has_stage(&self, stage: SleepStage) -> bool {
        match stage {
            SleepStage::N1 => self.n1,
            SleepStage::N2 => self.n2,
            SleepStage::N3 => self.n3,
            SleepStage::Rem => self.rem,
            SleepStage::Awake => self.awake,
            SleepStage::Unmeasurable => self.unmeasurable,
        }
    }

    pub fn has_any_sleep_stage(&self) -> bool {
        self.n1 || self.n2 || self.n3 || self.rem
    }

    pub fn union(self, other: SummaryColumns) -> SummaryColumns {
        SummaryColumns {
            n1: self.n1 || other.n1,
            n2: self.n2 || other.n2,
            n3: self.n3 || other.n3,
            rem: self.rem || other.rem,
            awake: self.awake || other.awake,
            unmeasurable: self.unmeasurable || other.unmeasurable,
            score: self.score || other.score,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SleepSummary {
    pub columns: SummaryColumns,
    pub bouts: Vec<SleepBout>,
}

impl SleepSummary {
    pub fn is_empty(&self) -> bool {
        self.bouts.is_empty()
    }

    /// Keeps one bout per calendar date: the longest, and among equal
    /// durations the one that came last. Result is sorted by date.
    pub fn dedup_same_day(mut self) -> Self {
        self.bouts
            .sort_by(|a, b| (a.calendar_date, a.duration_ms).cmp(&(b.calendar_date, b.duration_ms)));
        let mut kept: Vec<SleepBout> = Vec::with_capacity(self.bouts.len());
        for bout in self.bouts {
            match kept.last_mut() {
                Some(last) if last.calendar_date == bout.calendar_date => {
                    log::debug!(
                        "Replacing bout {} with {} for {}",
                        last.id,
                        bout.id,
                        bout.calendar_date
                    );
                    *last = bout;
                }
                _ => kept.push(bout),
            }
        }
        self.bouts = kept;
        self
    }
}

/// One contiguous run of a single stage within a bout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageEvent {
    pub summary_id: String,
    pub start: NaiveDateTime,
    pub duration_ms: i64,
    pub stage: SleepStage,
}

impl StageEvent {
    pub fn end(&self) -> NaiveDateTime {
        self.start + Duration::milliseconds(self.duration_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BeatInterval {
    pub timestamp: NaiveDateTime,
    pub interval_ms: f64,
}
