use crate::statistics::{NightlyHrv, PerUser, StatisticsOutcome};
use anyhow::Result;
use chrono::NaiveDate;
use log::info;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// One line of the long-format CSV. Reduced values have no date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub user: String,
    pub date: Option<NaiveDate>,
    pub metric: String,
    pub value: Option<String>,
}

fn number(value: f64) -> Option<String> {
    value.is_finite().then(|| value.to_string())
}

pub fn sleep_rows(results: &PerUser<StatisticsOutcome>) -> Vec<Row> {
    let mut rows = Vec::new();
    for (user, outcome) in results {
        let Ok(outcome) = outcome else { continue };
        match outcome {
            StatisticsOutcome::Daily(days) => {
                for (date, values) in days {
                    for (metric, value) in values {
                        rows.push(Row {
                            user: user.clone(),
                            date: Some(*date),
                            metric: metric.to_string(),
                            value: value.map(|v| v.to_string()).filter(|v| v != "NaN"),
                        });
                    }
                }
            }
            StatisticsOutcome::Reduced { values, .. } => {
                for (metric, value) in values {
                    let value = match value.as_f64() {
                        Some(v) => number(v),
                        None => Some(value.to_string()),
                    };
                    rows.push(Row {
                        user: user.clone(),
                        date: None,
                        metric: metric.to_string(),
                        value,
                    });
                }
            }
        }
    }
    rows
}

pub fn hrv_rows(results: &PerUser<NightlyHrv>) -> Vec<Row> {
    let mut rows = Vec::new();
    for (user, nights) in results {
        let Ok(nights) = nights else { continue };
        for (date, values) in nights {
            for (metric, value) in values {
                rows.push(Row {
                    user: user.clone(),
                    date: Some(*date),
                    metric: metric.to_string(),
                    value: number(*value),
                });
            }
        }
    }
    rows
}

pub fn write_csv(path: &Path, rows: &[Row]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }

    info!("Writing {} rows to {}", rows.len(), path.display());
    let mut writer = csv::Writer::from_path(path)?;
    // serde skips the header when there is nothing to write
    if rows.is_empty() {
        writer.write_record(["user", "date", "metric", "value"])?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Successful per-user results of one run; failed users are left out.
#[derive(Debug, Default, Serialize)]
pub struct Report<'a> {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub sleep: BTreeMap<&'a str, &'a StatisticsOutcome>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub hrv: BTreeMap<&'a str, &'a NightlyHrv>,
}

fn successes<T, E>(results: &BTreeMap<String, Result<T, E>>) -> BTreeMap<&str, &T> {
    results
        .iter()
        .filter_map(|(user, result)| result.as_ref().ok().map(|v| (user.as_str(), v)))
        .collect()
}

impl<'a> Report<'a> {
    pub fn new(
        sleep: Option<&'a PerUser<StatisticsOutcome>>,
        hrv: Option<&'a PerUser<NightlyHrv>>,
    ) -> Self {
        Report {
            sleep: sleep.map(successes).unwrap_or_default(),
            hrv: hrv.map(successes).unwrap_or_default(),
        }
    }
}

/// Pretty JSON to `path`, or to stdout when no path is given.
pub fn write_json<T: Serialize + ?Sized>(path: Option<&Path>, value: &T) -> Result<()> {
    match path {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)?;
            }
            info!("Writing JSON to {}", path.display());
            let file = std::fs::File::create(path)?;
            serde_json::to_writer_pretty(file, value)?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            serde_json::to_writer_pretty(&mut handle, value)?;
            writeln!(handle)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadError;
    use crate::heart_analysis::HrvMetric;
    use crate::metrics::{Metric, MetricValue};
    use crate::statistics::ReducedValue;
    use pretty_assertions::assert_eq;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 5, 9).unwrap()
    }

    fn results() -> PerUser<StatisticsOutcome> {
        let values = BTreeMap::from([
            (Metric::TotalSleepTime, Some(MetricValue::Number(436.0))),
            (Metric::N2Latency, None),
        ]);
        BTreeMap::from([
            (
                "alice".to_string(),
                Ok(StatisticsOutcome::Daily(BTreeMap::from([(day(), values)]))),
            ),
            (
                "bob".to_string(),
                Err(LoadError::UnknownUser("bob".to_string())),
            ),
        ])
    }

    #[test]
    fn daily_rows_skip_failed_users() {
        let rows = sleep_rows(&results());
        assert_eq!(
            rows,
            vec![
                Row {
                    user: "alice".to_string(),
                    date: Some(day()),
                    metric: "TST".to_string(),
                    value: Some("436".to_string()),
                },
                Row {
                    user: "alice".to_string(),
                    date: Some(day()),
                    metric: "Lat_N2".to_string(),
                    value: None,
                },
            ]
        );
    }

    #[test]
    fn reduced_nan_is_empty() {
        let results: PerUser<StatisticsOutcome> = BTreeMap::from([(
            "alice".to_string(),
            Ok(StatisticsOutcome::Reduced {
                values: BTreeMap::from([
                    (Metric::N3Latency, ReducedValue::Number(f64::NAN)),
                    (Metric::Bedtime, ReducedValue::ClockTime("23:10".to_string())),
                ]),
                days: vec![day()],
            }),
        )]);
        let rows = sleep_rows(&results);
        assert_eq!(rows[0].metric, "Lat_N3");
        assert_eq!(rows[0].value, None);
        assert_eq!(rows[1].value, Some("23:10".to_string()));
    }

    #[test]
    fn writes_long_csv_and_json_report() {
        let dir = std::env::temp_dir().join(format!("sleep-stats-output-{}", std::process::id()));
        let csv_path = dir.join("out.csv");
        write_csv(&csv_path, &sleep_rows(&results())).unwrap();
        let written = std::fs::read_to_string(&csv_path).unwrap();
        assert_eq!(
            written,
            "user,date,metric,value\nalice,2023-05-09,TST,436\nalice,2023-05-09,Lat_N2,\n"
        );

        let hrv: PerUser<NightlyHrv> = BTreeMap::from([(
            "alice".to_string(),
            Ok(BTreeMap::from([(
                day(),
                BTreeMap::from([(HrvMetric::Rmssd, 42.5)]),
            )])),
        )]);
        let results = results();
        let report = Report::new(Some(&results), Some(&hrv));
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            serde_json::json!({
                "sleep": {"alice": {"2023-05-09": {"TST": 436.0, "Lat_N2": null}}},
                "hrv": {"alice": {"2023-05-09": {"rmssd": 42.5}}}
            })
        );
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
