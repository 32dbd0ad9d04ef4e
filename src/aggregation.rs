use crate::stages::SleepStage;
use crate::{StageEvent, MS_PER_MINUTE};
use chrono::NaiveDateTime;

/// Per-bout view over a chronologically ordered stage sequence.
///
/// Every accessor returns `None` when the bout has no stage events at all.
#[derive(Debug, Clone, Copy)]
pub struct StageProfile<'a> {
    start: NaiveDateTime,
    events: &'a [StageEvent],
}

impl<'a> StageProfile<'a> {
    /// `start` is the bout's bedtime from the summary; `events` must be sorted.
    pub fn new(start: NaiveDateTime, events: &'a [StageEvent]) -> Self {
        StageProfile { start, events }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Minutes from bedtime to the first occurrence of `stage`.
    pub fn latency(&self, stage: SleepStage) -> Option<f64> {
        self.events
            .iter()
            .find(|e| e.stage == stage)
            .map(|e| minutes_between(self.start, e.start))
    }

    /// Sleep onset latency: the earliest latency over the sleep stages.
    pub fn sleep_onset_latency(&self) -> Option<f64> {
        SleepStage::SLEEP
            .iter()
            .filter_map(|&stage| self.latency(stage))
            .min_by(f64::total_cmp)
    }

    /// Number of separate runs of `stage`. Consecutive events sharing a label
    /// merge into one run, so `[N1, N1, N2, N1]` counts two N1 runs. Absent
    /// stages are `None`, not zero.
    pub fn count(&self, stage: SleepStage) -> Option<u32> {
        let mut previous = None;
        let mut runs = 0;
        for event in self.events {
            if event.stage == stage && previous != Some(stage) {
                runs += 1;
            }
            previous = Some(event.stage);
        }
        (runs > 0).then_some(runs)
    }

    /// Wake after sleep onset, in minutes.
    ///
    /// A leading awake run is sleep latency and a trailing one is the final
    /// awakening, so neither is counted.
    pub fn wake_after_sleep_onset(&self) -> Option<f64> {
        let mut inner = self.events;
        if inner.is_empty() {
            return None;
        }
        if let Some((first, rest)) = inner.split_first() {
            if first.stage == SleepStage::Awake {
                inner = rest;
            }
        }
        if let Some((last, rest)) = inner.split_last() {
            if last.stage == SleepStage::Awake {
                inner = rest;
            }
        }
        let awake_ms: i64 = inner
            .iter()
            .filter(|e| e.stage == SleepStage::Awake)
            .map(|e| e.duration_ms)
            .sum();
        Some(awake_ms as f64 / MS_PER_MINUTE)
    }

    /// Sleep period time in minutes: from the start of the first sleep run to
    /// the end of the last one, awake runs at the edges excluded.
    pub fn sleep_period_time(&self) -> Option<f64> {
        let first = self.events.iter().find(|e| e.stage != SleepStage::Awake)?;
        let last = self
            .events
            .iter()
            .rev()
            .find(|e| e.stage != SleepStage::Awake)?;
        Some(minutes_between(first.start, last.end()))
    }
}

fn minutes_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_milliseconds() as f64 / MS_PER_MINUTE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use SleepStage::*;

    fn night() -> Vec<StageEvent> {
        vec![
            event("b", "2023-05-08 22:00", 10, Awake),
            event("b", "2023-05-08 22:10", 20, N1),
            event("b", "2023-05-08 22:30", 5, Awake),
            event("b", "2023-05-08 22:35", 30, N3),
            event("b", "2023-05-08 23:05", 15, N1),
            event("b", "2023-05-08 23:20", 25, Rem),
            event("b", "2023-05-08 23:45", 15, Awake),
        ]
    }

    #[test]
    fn latencies_are_relative_to_bedtime() {
        let events = night();
        let profile = StageProfile::new(at("2023-05-08 22:00"), &events);
        assert_eq!(profile.latency(Awake), Some(0.0));
        assert_eq!(profile.latency(N1), Some(10.0));
        assert_eq!(profile.latency(N3), Some(35.0));
        assert_eq!(profile.latency(Rem), Some(80.0));
        assert_eq!(profile.latency(N2), None);
        assert_eq!(profile.sleep_onset_latency(), Some(10.0));
    }

    #[test]
    fn counts_runs_and_leaves_absent_stages_null() {
        let events = night();
        let profile = StageProfile::new(at("2023-05-08 22:00"), &events);
        assert_eq!(profile.count(Awake), Some(3));
        assert_eq!(profile.count(N1), Some(2));
        assert_eq!(profile.count(Rem), Some(1));
        assert_eq!(profile.count(N2), None);
    }

    #[test]
    fn adjacent_events_with_one_label_count_once() {
        let events = vec![
            event("b", "2023-05-08 22:00", 10, N1),
            event("b", "2023-05-08 22:10", 10, N1),
            event("b", "2023-05-08 22:20", 10, N2),
            event("b", "2023-05-08 22:30", 10, N1),
        ];
        let profile = StageProfile::new(at("2023-05-08 22:00"), &events);
        assert_eq!(profile.count(N1), Some(2));
        assert_eq!(profile.count(N2), Some(1));
    }

    #[test]
    fn waso_skips_boundary_awakenings() {
        let events = night();
        let profile = StageProfile::new(at("2023-05-08 22:00"), &events);
        assert_eq!(profile.wake_after_sleep_onset(), Some(5.0));
        assert_eq!(profile.sleep_period_time(), Some(95.0));
    }

    #[test]
    fn empty_bout_is_null_everywhere() {
        let profile = StageProfile::new(at("2023-05-08 22:00"), &[]);
        assert!(profile.is_empty());
        assert_eq!(profile.latency(N1), None);
        assert_eq!(profile.count(Awake), None);
        assert_eq!(profile.wake_after_sleep_onset(), None);
        assert_eq!(profile.sleep_onset_latency(), None);
        assert_eq!(profile.sleep_period_time(), None);
    }

    #[test]
    fn bout_without_awake_runs_has_zero_waso() {
        let events = vec![event("b", "2023-05-10 21:56", 446, N3)];
        let profile = StageProfile::new(at("2023-05-10 21:56"), &events);
        assert_eq!(profile.wake_after_sleep_onset(), Some(0.0));
        assert_eq!(profile.latency(N3), Some(0.0));
        assert_eq!(profile.count(Awake), None);
    }
}
