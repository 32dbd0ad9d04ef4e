use crate::error::StatisticsError;
use crate::StageEvent;
use chrono::{Duration, NaiveDateTime};
use log::{debug, trace};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Granularity of the base stage grid, in milliseconds.
pub const EPOCH_MS: i64 = 30_000;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SleepStage {
    Unmeasurable,
    Awake,
    N1,
    N2,
    N3,
    Rem,
}

impl SleepStage {
    pub const ALL: [SleepStage; 6] = [
        SleepStage::Unmeasurable,
        SleepStage::Awake,
        SleepStage::N1,
        SleepStage::N2,
        SleepStage::N3,
        SleepStage::Rem,
    ];

    /// Stages that count as being asleep.
    pub const SLEEP: [SleepStage; 4] = [
        SleepStage::N1,
        SleepStage::N2,
        SleepStage::N3,
        SleepStage::Rem,
    ];

    pub fn is_sleep(self) -> bool {
        Self::SLEEP.contains(&self)
    }

    /// Numeric label used by hypnograms.
    pub fn hypnogram_value(self) -> i8 {
        match self {
            SleepStage::Unmeasurable => -1,
            SleepStage::Awake => 0,
            SleepStage::N1 => 1,
            SleepStage::N2 => 2,
            SleepStage::N3 => 3,
            SleepStage::Rem => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SleepStage::Unmeasurable => "unmeasurable",
            SleepStage::Awake => "awake",
            SleepStage::N1 => "n1",
            SleepStage::N2 => "n2",
            SleepStage::N3 => "n3",
            SleepStage::Rem => "rem",
        }
    }
}

impl fmt::Display for SleepStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SleepStage {
    type Err = StatisticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unmeasurable" => Ok(SleepStage::Unmeasurable),
            "awake" | "wake" => Ok(SleepStage::Awake),
            "light" | "n1" => Ok(SleepStage::N1),
            "n2" => Ok(SleepStage::N2),
            "deep" | "n3" => Ok(SleepStage::N3),
            "rem" => Ok(SleepStage::Rem),
            other => Err(StatisticsError::MalformedInput(format!(
                "unknown sleep stage label: {other}"
            ))),
        }
    }
}

/// Merges finer "short" awake events into a bout's base stage sequence.
///
/// The combined span is laid out on a 30 s grid, base labels are carried
/// forward onto every slot, and each short slice overwrites the slot it starts
/// in. Consecutive equal slots are then collapsed back into runs. Without
/// short events the base sequence is returned as is.
pub fn merge_short_stages(
    base: &[StageEvent],
    short: &[StageEvent],
) -> Result<Vec<StageEvent>, StatisticsError> {
    let mut base: Vec<&StageEvent> = base.iter().collect();
    base.sort_by_key(|e| e.start);
    let (first, last_end) = match (base.first(), base.iter().map(|e| e.end()).max()) {
        (Some(first), Some(end)) => (*first, end),
        _ => {
            return Err(StatisticsError::EmptyInput(
                "cannot merge short stages into an empty base sequence".to_string(),
            ))
        }
    };
    if short.is_empty() {
        return Ok(base.into_iter().cloned().collect());
    }

    let slices = expand_short_events(short);
    let span_start = slices
        .iter()
        .copied()
        .min()
        .map_or(first.start, |s| s.min(first.start));
    let span_end = short
        .iter()
        .map(|e| e.end())
        .max()
        .map_or(last_end, |e| e.max(last_end));
    let slots = ((span_end - span_start).num_milliseconds() / EPOCH_MS).max(0) as usize;

    // as-of join: each slot takes the latest base label starting at or before it;
    // slots ahead of the first base event take its label so the span stays tiled
    let mut labels: Vec<SleepStage> = Vec::with_capacity(slots);
    let mut cursor = 0;
    let mut current = first.stage;
    for slot in 0..slots {
        let t = span_start + Duration::milliseconds(slot as i64 * EPOCH_MS);
        while cursor < base.len() && base[cursor].start <= t {
            current = base[cursor].stage;
            cursor += 1;
        }
        labels.push(current);
    }

    for slice in &slices {
        let slot = ((*slice - span_start).num_milliseconds() / EPOCH_MS) as usize;
        if let Some(label) = labels.get_mut(slot) {
            *label = SleepStage::Awake;
        }
    }

    let merged = collapse_runs(&first.summary_id, span_start, &labels);
    debug!(
        "Merged {} base and {} short events of {} into {} runs",
        base.len(),
        short.len(),
        first.summary_id,
        merged.len()
    );
    Ok(merged)
}

/// Start of every 30 s awake slice described by the short events.
fn expand_short_events(short: &[StageEvent]) -> Vec<NaiveDateTime> {
    let mut slices = Vec::new();
    for event in short {
        if event.duration_ms > EPOCH_MS {
            let count = event.duration_ms / EPOCH_MS;
            slices.extend((0..count).map(|k| event.start + Duration::milliseconds(k * EPOCH_MS)));
        } else {
            slices.push(event.start);
        }
    }
    slices
}

fn collapse_runs(
    summary_id: &str,
    span_start: NaiveDateTime,
    labels: &[SleepStage],
) -> Vec<StageEvent> {
    let emit = |first: usize, last: usize, stage: SleepStage| StageEvent {
        summary_id: summary_id.to_string(),
        start: span_start + Duration::milliseconds(first as i64 * EPOCH_MS),
        duration_ms: (last - first + 1) as i64 * EPOCH_MS,
        stage,
    };

    let mut runs = Vec::new();
    let mut open: Option<(usize, usize, SleepStage)> = None;
    for (slot, label) in labels.iter().enumerate() {
        match open {
            Some((first, _, stage)) if stage == *label => {
                open = Some((first, slot, stage));
            }
            _ => {
                if let Some((first, last, stage)) = open {
                    runs.push(emit(first, last, stage));
                }
                open = Some((slot, slot, *label));
            }
        }
    }
    if let Some((first, last, stage)) = open {
        runs.push(emit(first, last, stage));
    }
    runs
}

/// Stage labels sampled at a fixed resolution over a bout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hypnogram {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub resolution_minutes: u32,
    pub values: Vec<i8>,
}

impl Hypnogram {
    pub fn time_at(&self, index: usize) -> NaiveDateTime {
        self.start + Duration::minutes(index as i64 * self.resolution_minutes as i64)
    }
}

/// Samples `events` every `resolution_minutes` from `start` (inclusive) to
/// `end` (exclusive). Each sample carries the label of the latest event that
/// began at or before it; samples before the first event are unmeasurable.
pub fn hypnogram(
    start: NaiveDateTime,
    end: NaiveDateTime,
    events: &[StageEvent],
    resolution_minutes: u32,
) -> Hypnogram {
    let resolution_minutes = resolution_minutes.max(1);
    let step = Duration::minutes(resolution_minutes as i64);
    let mut sorted: Vec<&StageEvent> = events.iter().collect();
    sorted.sort_by_key(|e| e.start);

    let mut values = Vec::new();
    let mut cursor = 0;
    let mut current = SleepStage::Unmeasurable.hypnogram_value();
    let mut t = start;
    while t < end {
        while cursor < sorted.len() && sorted[cursor].start <= t {
            current = sorted[cursor].stage.hypnogram_value();
            cursor += 1;
        }
        values.push(current);
        t += step;
    }
    trace!("Hypnogram from {} has {} samples", start, values.len());

    Hypnogram {
        start,
        end,
        resolution_minutes,
        values,
    }
}

/// Awake periods bounded by a stage transition on both sides.
///
/// A period opens where the hypnogram steps down into awake and closes at the
/// first following sample that steps up out of awake. Awake periods at the
/// very start, or still open at the end, are not reported.
pub fn awake_windows(hypnogram: &Hypnogram) -> Vec<(NaiveDateTime, NaiveDateTime)> {
    let awake = SleepStage::Awake.hypnogram_value();
    let values = &hypnogram.values;
    let mut starts = Vec::new();
    let mut ends = Vec::new();
    for i in 1..values.len() {
        let step = values[i] as i16 - values[i - 1] as i16;
        if values[i] == awake && step < 0 {
            starts.push(i);
        }
        if values[i - 1] == awake && step > 0 {
            ends.push(i);
        }
    }

    let mut windows = Vec::with_capacity(starts.len());
    let mut ends = ends.into_iter().peekable();
    for start in starts {
        while ends.next_if(|&end| end <= start).is_some() {}
        if let Some(end) = ends.next() {
            windows.push((hypnogram.time_at(start), hypnogram.time_at(end)));
        }
    }
    windows
}
