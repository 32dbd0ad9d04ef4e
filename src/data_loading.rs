use crate::error::LoadError;
use crate::stages::SleepStage;
use crate::{BeatInterval, SleepBout, SleepSummary, StageEvent, SummaryColumns};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const SLEEP_SUMMARY_DIR: &str = "garmin-connect-sleep-summary";
pub const SLEEP_STAGE_DIR: &str = "garmin-connect-sleep-stage";
pub const SLEEP_STAGE_SHORT_DIR: &str = "garmin-connect-sleep-stage-short";
pub const BBI_DIR: &str = "garmin-device-bbi";

/// Supplies the tables the statistics engine works on.
///
/// Date windows are inclusive calendar dates; beat-interval windows are
/// inclusive local timestamps.
pub trait SleepDataLoader {
    fn users(&self) -> Result<Vec<String>, LoadError>;

    /// Summary rows whose calendar date lies in `[start, end]`.
    fn load_sleep_summary(
        &self,
        user: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<SleepSummary, LoadError>;

    /// Stage events whose local start date lies in `[start, end]`.
    fn load_sleep_stages(
        &self,
        user: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<StageEvent>, LoadError>;

    /// Sub-epoch corrective awake events, when the source has any.
    fn load_short_stages(
        &self,
        _user: &str,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<StageEvent>, LoadError> {
        Ok(Vec::new())
    }

    fn load_bbi(
        &self,
        user: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<BeatInterval>, LoadError>;
}

fn in_dates(date: NaiveDate, start: NaiveDate, end: NaiveDate) -> bool {
    date >= start && date <= end
}

/// Fully materialised tables for one user.
#[derive(Debug, Clone, Default)]
pub struct UserTables {
    pub summary: SleepSummary,
    pub stages: Vec<StageEvent>,
    pub short_stages: Vec<StageEvent>,
    pub bbi: Vec<BeatInterval>,
}

/// Loader over tables already held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLoader {
    users: BTreeMap<String, UserTables>,
}

impl InMemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: impl Into<String>, tables: UserTables) -> Self {
        self.users.insert(user.into(), tables);
        self
    }

    fn tables(&self, user: &str) -> Result<&UserTables, LoadError> {
        self.users
            .get(user)
            .ok_or_else(|| LoadError::UnknownUser(user.to_string()))
    }
}

impl SleepDataLoader for InMemoryLoader {
    fn users(&self) -> Result<Vec<String>, LoadError> {
        Ok(self.users.keys().cloned().collect())
    }

    fn load_sleep_summary(
        &self,
        user: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<SleepSummary, LoadError> {
        let summary = &self.tables(user)?.summary;
        Ok(SleepSummary {
            columns: summary.columns,
            bouts: summary
                .bouts
                .iter()
                .filter(|b| in_dates(b.calendar_date, start, end))
                .cloned()
                .collect(),
        })
    }

    fn load_sleep_stages(
        &self,
        user: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<StageEvent>, LoadError> {
        Ok(filter_events(&self.tables(user)?.stages, start, end))
    }

    fn load_short_stages(
        &self,
        user: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<StageEvent>, LoadError> {
        Ok(filter_events(&self.tables(user)?.short_stages, start, end))
    }

    fn load_bbi(
        &self,
        user: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<BeatInterval>, LoadError> {
        Ok(self
            .tables(user)?
            .bbi
            .iter()
            .filter(|s| s.timestamp >= from && s.timestamp <= to)
            .copied()
            .collect())
    }
}

fn filter_events(events: &[StageEvent], start: NaiveDate, end: NaiveDate) -> Vec<StageEvent> {
    events
        .iter()
        .filter(|e| in_dates(e.start.date(), start, end))
        .cloned()
        .collect()
}

/// Local wall-clock time from a UTC epoch and the recorded offset.
fn local_time(unix_ms: i64, offset_ms: i64) -> Result<NaiveDateTime, LoadError> {
    DateTime::from_timestamp_millis(unix_ms)
        .and_then(|utc| utc.naive_utc().checked_add_signed(Duration::milliseconds(offset_ms)))
        .ok_or_else(|| {
            LoadError::Parse(format!("timestamp out of range: {unix_ms} + {offset_ms} ms"))
        })
}

/// Rejects spans whose end cannot be represented.
fn check_span(start: NaiveDateTime, span_ms: Option<i64>) -> Result<(), LoadError> {
    span_ms
        .and_then(|ms| start.checked_add_signed(Duration::milliseconds(ms)))
        .map(|_| ())
        .ok_or_else(|| LoadError::Parse(format!("duration out of range from {start}")))
}

fn ms(value: Option<f64>) -> Option<i64> {
    value.filter(|v| v.is_finite()).map(|v| v.round() as i64)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryRecord {
    sleep_summary_id: String,
    calendar_date: NaiveDate,
    #[serde(alias = "timezone")]
    timezone_offset_in_ms: i64,
    unix_timestamp_in_ms: i64,
    duration_in_ms: f64,
    #[serde(default, alias = "lightSleepDurationInMs")]
    n1_sleep_duration_in_ms: Option<f64>,
    #[serde(default)]
    n2_sleep_duration_in_ms: Option<f64>,
    #[serde(default, alias = "deepSleepDurationInMs")]
    n3_sleep_duration_in_ms: Option<f64>,
    #[serde(default, alias = "remSleepInMs")]
    rem_sleep_duration_in_ms: Option<f64>,
    #[serde(default)]
    awake_duration_in_ms: Option<f64>,
    #[serde(default, alias = "unmeasurableSleepInMs")]
    unmeasurable_sleep_duration_in_ms: Option<f64>,
    #[serde(default)]
    overall_sleep_score: Option<f64>,
}

impl SummaryRecord {
    fn into_bout(self) -> Result<SleepBout, LoadError> {
        let start = local_time(self.unix_timestamp_in_ms, self.timezone_offset_in_ms)?;
        let duration_ms = self.duration_in_ms.round() as i64;
        let awake_ms = ms(self.awake_duration_in_ms);
        check_span(start, duration_ms.checked_add(awake_ms.unwrap_or(0)))?;
        Ok(SleepBout {
            start,
            id: self.sleep_summary_id,
            calendar_date: self.calendar_date,
            timezone_offset_ms: self.timezone_offset_in_ms,
            unix_timestamp_ms: self.unix_timestamp_in_ms,
            duration_ms,
            n1_ms: ms(self.n1_sleep_duration_in_ms),
            n2_ms: ms(self.n2_sleep_duration_in_ms),
            n3_ms: ms(self.n3_sleep_duration_in_ms),
            rem_ms: ms(self.rem_sleep_duration_in_ms),
            awake_ms,
            unmeasurable_ms: ms(self.unmeasurable_sleep_duration_in_ms),
            score: self.overall_sleep_score,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StageRecord {
    sleep_summary_id: String,
    #[serde(alias = "timezone")]
    timezone_offset_in_ms: i64,
    unix_timestamp_in_ms: i64,
    duration_in_ms: f64,
    #[serde(rename = "type")]
    stage: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BbiRecord {
    #[serde(alias = "timezone")]
    timezone_offset_in_ms: i64,
    unix_timestamp_in_ms: i64,
    bbi: f64,
}

/// Which optional summary columns a CSV header carries.
fn summary_columns(headers: &csv::StringRecord) -> SummaryColumns {
    let has = |names: &[&str]| headers.iter().any(|h| names.contains(&h));
    SummaryColumns {
        n1: has(&["n1SleepDurationInMs", "lightSleepDurationInMs"]),
        n2: has(&["n2SleepDurationInMs"]),
        n3: has(&["n3SleepDurationInMs", "deepSleepDurationInMs"]),
        rem: has(&["remSleepDurationInMs", "remSleepInMs"]),
        awake: has(&["awakeDurationInMs"]),
        unmeasurable: has(&["unmeasurableSleepDurationInMs", "unmeasurableSleepInMs"]),
        score: has(&["overallSleepScore"]),
    }
}

/// Loader over a directory tree of CSV exports:
/// `<root>/<user>/<metric directory>/*.csv`.
#[derive(Debug, Clone)]
pub struct CsvDirectoryLoader {
    root: PathBuf,
}

impl CsvDirectoryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        CsvDirectoryLoader { root: root.into() }
    }

    fn user_dir(&self, user: &str) -> Result<PathBuf, LoadError> {
        let dir = self.root.join(user);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(LoadError::UnknownUser(user.to_string()))
        }
    }

    /// CSV files of one metric, sorted by path. A missing directory is empty.
    fn metric_files(&self, user: &str, metric_dir: &str) -> Result<Vec<PathBuf>, LoadError> {
        let dir = self.user_dir(user)?.join(metric_dir);
        if !dir.is_dir() {
            debug!("No {} data for {}", metric_dir, user);
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(&dir).follow_links(true) {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type().is_file()
                && path.extension().and_then(|s| s.to_str()) == Some("csv")
            {
                files.push(path.to_path_buf());
            }
        }
        files.sort();
        Ok(files)
    }

    fn open(path: &Path) -> Result<csv::Reader<File>, LoadError> {
        let file = File::open(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(csv::ReaderBuilder::new().flexible(true).from_reader(file))
    }

    /// Deserialises every row of every file, skipping rows that do not parse.
    fn read_records<T: DeserializeOwned>(files: &[PathBuf]) -> Result<Vec<T>, LoadError> {
        let mut records = Vec::new();
        for path in files {
            let mut rdr = Self::open(path)?;
            for (line, result) in rdr.deserialize::<T>().enumerate() {
                match result {
                    Ok(record) => records.push(record),
                    Err(err) => warn!("Skipping row {} of {}: {}", line + 2, path.display(), err),
                }
            }
        }
        Ok(records)
    }

    fn read_stage_events(
        &self,
        user: &str,
        metric_dir: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<StageEvent>, LoadError> {
        let files = self.metric_files(user, metric_dir)?;
        let mut events = Vec::new();
        for record in Self::read_records::<StageRecord>(&files)? {
            let stage = match record.stage.parse::<SleepStage>() {
                Ok(stage) => stage,
                Err(err) => {
                    warn!("Skipping stage event of {}: {}", record.sleep_summary_id, err);
                    continue;
                }
            };
            let duration_ms = record.duration_in_ms.round() as i64;
            let begins = match local_time(record.unix_timestamp_in_ms, record.timezone_offset_in_ms)
                .and_then(|begins| check_span(begins, Some(duration_ms)).map(|_| begins))
            {
                Ok(begins) => begins,
                Err(err) => {
                    warn!("Skipping stage event of {}: {}", record.sleep_summary_id, err);
                    continue;
                }
            };
            let event = StageEvent {
                start: begins,
                summary_id: record.sleep_summary_id,
                duration_ms,
                stage,
            };
            if in_dates(event.start.date(), start, end) {
                events.push(event);
            }
        }
        events.sort_by(|a, b| (&a.summary_id, a.start).cmp(&(&b.summary_id, b.start)));
        debug!("Loaded {} {} events for {}", events.len(), metric_dir, user);
        Ok(events)
    }
}

impl SleepDataLoader for CsvDirectoryLoader {
    fn users(&self) -> Result<Vec<String>, LoadError> {
        let read_dir = std::fs::read_dir(&self.root).map_err(|source| LoadError::Io {
            path: self.root.clone(),
            source,
        })?;
        let mut users = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|source| LoadError::Io {
                path: self.root.clone(),
                source,
            })?;
            if entry.path().is_dir() {
                users.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        users.sort();
        Ok(users)
    }

    fn load_sleep_summary(
        &self,
        user: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<SleepSummary, LoadError> {
        let files = self.metric_files(user, SLEEP_SUMMARY_DIR)?;
        let mut columns = SummaryColumns::default();
        for path in &files {
            let mut rdr = Self::open(path)?;
            columns = columns.union(summary_columns(rdr.headers()?));
        }
        let mut bouts = Vec::new();
        for record in Self::read_records::<SummaryRecord>(&files)? {
            if !in_dates(record.calendar_date, start, end) {
                continue;
            }
            let id = record.sleep_summary_id.clone();
            match record.into_bout() {
                Ok(bout) => bouts.push(bout),
                Err(err) => warn!("Skipping sleep summary {}: {}", id, err),
            }
        }
        bouts.sort_by_key(|b| (b.calendar_date, b.start));
        debug!("Loaded {} sleep summaries for {}", bouts.len(), user);
        Ok(SleepSummary { columns, bouts })
    }

    fn load_sleep_stages(
        &self,
        user: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<StageEvent>, LoadError> {
        self.read_stage_events(user, SLEEP_STAGE_DIR, start, end)
    }

    fn load_short_stages(
        &self,
        user: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<StageEvent>, LoadError> {
        self.read_stage_events(user, SLEEP_STAGE_SHORT_DIR, start, end)
    }

    fn load_bbi(
        &self,
        user: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<BeatInterval>, LoadError> {
        let files = self.metric_files(user, BBI_DIR)?;
        let mut samples = Vec::new();
        for record in Self::read_records::<BbiRecord>(&files)? {
            let timestamp =
                match local_time(record.unix_timestamp_in_ms, record.timezone_offset_in_ms) {
                    Ok(timestamp) => timestamp,
                    Err(err) => {
                        warn!("Skipping beat interval: {}", err);
                        continue;
                    }
                };
            if timestamp >= from && timestamp <= to {
                samples.push(BeatInterval {
                    timestamp,
                    interval_ms: record.bbi,
                });
            }
        }
        samples.sort_by_key(|s| s.timestamp);
        debug!("Loaded {} beat intervals for {}", samples.len(), user);
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sleep-stats-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn write(path: &Path, body: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn reads_garmin_column_names() {
        let root = scratch_dir("garmin");
        write(
            &root.join("u1").join(SLEEP_SUMMARY_DIR).join("part.csv"),
            "sleepSummaryId,calendarDate,timezoneOffsetInMs,unixTimestampInMs,durationInMs,lightSleepDurationInMs,deepSleepDurationInMs,remSleepInMs,awakeDurationInMs\n\
             s1,2023-05-09,7200000,1683576120000,26160000,15480000,3900000,6780000,780000\n\
             s2,2023-06-01,7200000,1685570000000,20000000,,,,\n",
        );
        let loader = CsvDirectoryLoader::new(&root);
        assert_eq!(loader.users().unwrap(), vec!["u1".to_string()]);

        let summary = loader
            .load_sleep_summary("u1", date("2023-05-01"), date("2023-05-31"))
            .unwrap();
        assert_eq!(summary.bouts.len(), 1);
        let bout = &summary.bouts[0];
        assert_eq!(bout.start, at("2023-05-08 22:02"));
        assert_eq!(bout.n1_ms, Some(15_480_000));
        assert_eq!(bout.rem_ms, Some(6_780_000));
        assert!(summary.columns.n1 && summary.columns.rem && summary.columns.awake);
        assert!(!summary.columns.n2 && !summary.columns.score);

        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn stage_and_bbi_windows_use_local_time() {
        let root = scratch_dir("stages");
        write(
            &root.join("u1").join(SLEEP_STAGE_DIR).join("a.csv"),
            "sleepSummaryId,timezoneOffsetInMs,unixTimestampInMs,durationInMs,type\n\
             s1,7200000,1683576120000,600000,light\n\
             s1,7200000,1683576720000,960000,deep\n\
             s1,7200000,1683576720000,960000,snoring\n",
        );
        write(
            &root.join("u1").join(BBI_DIR).join("a.csv"),
            "unixTimestampInMs,timezoneOffsetInMs,bbi\n\
             1683576120000,7200000,950\n\
             1683576121000,7200000,960\n",
        );
        let loader = CsvDirectoryLoader::new(&root);
        let events = loader
            .load_sleep_stages("u1", date("2023-05-08"), date("2023-05-08"))
            .unwrap();
        let stages: Vec<_> = events.iter().map(|e| e.stage).collect();
        assert_eq!(stages, vec![SleepStage::N1, SleepStage::N3]);
        assert!(loader
            .load_short_stages("u1", date("2023-05-08"), date("2023-05-08"))
            .unwrap()
            .is_empty());

        let bbi = loader
            .load_bbi("u1", at("2023-05-08 22:02:00"), at("2023-05-08 22:02:00"))
            .unwrap();
        assert_eq!(bbi.len(), 1);
        assert_eq!(bbi[0].interval_ms, 950.0);

        assert!(matches!(
            loader.load_sleep_stages("nobody", date("2023-05-08"), date("2023-05-08")),
            Err(LoadError::UnknownUser(_))
        ));
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn rows_with_out_of_range_times_are_skipped() {
        let root = scratch_dir("overflow");
        write(
            &root.join("u1").join(SLEEP_SUMMARY_DIR).join("part.csv"),
            "sleepSummaryId,calendarDate,timezoneOffsetInMs,unixTimestampInMs,durationInMs,awakeDurationInMs\n\
             s1,2023-05-09,7200000,1683576120000,26160000,780000\n\
             s2,2023-05-10,7200000,1683662520000,9000000000000000000,0\n\
             s3,2023-05-11,9000000000000000000,1683748920000,26160000,0\n",
        );
        write(
            &root.join("u1").join(SLEEP_STAGE_DIR).join("a.csv"),
            "sleepSummaryId,timezoneOffsetInMs,unixTimestampInMs,durationInMs,type\n\
             s1,7200000,1683576120000,600000,light\n\
             s1,7200000,1683576720000,9000000000000000000,deep\n",
        );
        write(
            &root.join("u1").join(BBI_DIR).join("a.csv"),
            "unixTimestampInMs,timezoneOffsetInMs,bbi\n\
             1683576120000,7200000,950\n\
             1683576121000,-9000000000000000000,960\n",
        );
        let loader = CsvDirectoryLoader::new(&root);

        let summary = loader
            .load_sleep_summary("u1", date("2023-05-01"), date("2023-05-31"))
            .unwrap();
        let ids: Vec<_> = summary.bouts.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["s1"]);

        let events = loader
            .load_sleep_stages("u1", date("2023-05-08"), date("2023-05-08"))
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].stage, SleepStage::N1);

        let bbi = loader
            .load_bbi("u1", at("2023-05-08 22:00"), at("2023-05-08 23:00"))
            .unwrap();
        assert_eq!(bbi.len(), 1);
        fs::remove_dir_all(&root).unwrap();
    }
}
