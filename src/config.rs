use crate::heart_analysis::{BbiFilter, HrvMetric};
use crate::metrics::Metric;
use crate::regularity::Chronotype;
use crate::statistics::Reduction;
use chrono::NaiveDate;
use clap::Parser;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

/// Which part of the night feeds the HRV windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NightMethod {
    AllNight,    // every beat between bedtime and wake-up
    FilterAwake, // minus awake periods found in the hypnogram (default)
}

impl FromStr for NightMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all-night" | "all night" => Ok(NightMethod::AllNight),
            "filter-awake" | "filter awake" => Ok(NightMethod::FilterAwake),
            _ => Err(format!(
                "Invalid HRV method: {}. Use all-night or filter-awake",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HrvConfig {
    /// Fraction of the expected beat count a window needs to be valid.
    pub coverage: f64,
    pub window_minutes: u32,
    /// Windows need strictly more samples than this to be analysed.
    pub min_samples: usize,
    /// Padding applied to the beat-interval load window.
    pub bbi_padding_hours: i64,
    pub min_valid_windows: usize,
    pub method: NightMethod,
    pub filter: Option<BbiFilter>,
    pub decimals: u32,
}

impl Default for HrvConfig {
    fn default() -> Self {
        HrvConfig {
            coverage: 0.7,
            window_minutes: 5,
            min_samples: 5,
            bbi_padding_hours: 12,
            min_valid_windows: 1,
            method: NightMethod::FilterAwake,
            filter: None,
            decimals: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub chronotypes: BTreeMap<String, Chronotype>,
    /// Days added on each side of the range when loading stage events.
    pub padding_days: u64,
    pub hypnogram_resolution_minutes: u32,
    pub hrv: HrvConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            chronotypes: BTreeMap::new(),
            padding_days: 1,
            hypnogram_resolution_minutes: 1,
            hrv: HrvConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn chronotype(&self, user: &str) -> Option<&Chronotype> {
        self.chronotypes.get(user)
    }
}

/// `USER=HH:MM-HH:MM` on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserChronotype {
    pub user: String,
    pub chronotype: Chronotype,
}

impl FromStr for UserChronotype {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (user, schedule) = s
            .split_once('=')
            .ok_or_else(|| format!("Invalid chronotype: {}. Use USER=HH:MM-HH:MM", s))?;
        let chronotype = schedule.parse::<Chronotype>().map_err(|e| e.to_string())?;
        Ok(UserChronotype {
            user: user.to_string(),
            chronotype,
        })
    }
}

/// Derive nightly sleep statistics from exported wearable data
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Directory with one sub-directory of CSV exports per user
    #[arg(help = "Directory with one sub-directory of CSV exports per user")]
    pub input_path: PathBuf,

    /// Users to analyse, defaults to every user found
    #[arg(long = "user")]
    pub users: Vec<String>,

    /// First calendar date (format: YYYY-MM-DD)
    #[arg(long)]
    pub start_date: NaiveDate,

    /// Last calendar date, inclusive (format: YYYY-MM-DD)
    #[arg(long)]
    pub end_date: NaiveDate,

    /// Sleep metrics to compute (e.g. TST, SE, CPD_midpoint), defaults to all
    #[arg(long = "metric")]
    pub metrics: Vec<Metric>,

    /// Nightly HRV metrics to compute (rmssd, sdnn, lf, hf, lfhf)
    #[arg(long = "hrv-metric")]
    pub hrv_metrics: Vec<HrvMetric>,

    /// Reduce each metric over the date range (mean, std, min, max)
    #[arg(long)]
    pub reduction: Option<Reduction>,

    /// Reference schedule for CPD metrics (format: USER=HH:MM-HH:MM)
    #[arg(long = "chronotype")]
    pub chronotypes: Vec<UserChronotype>,

    /// Fraction of expected beats a 5-minute HRV window needs (0.0 to 1.0)
    #[arg(long, env = "SLEEP_STATS_COVERAGE", default_value = "0.7")]
    pub coverage: f64,

    /// How beats are selected for HRV (all-night or filter-awake)
    #[arg(long, default_value = "filter-awake")]
    pub hrv_method: NightMethod,

    /// Remove outlier and ectopic beats before HRV analysis
    #[arg(long)]
    pub filter_bbi: bool,

    /// Resolution in minutes of the hypnogram used to find awake periods
    #[arg(long, default_value = "1")]
    pub hypnogram_resolution: u32,

    /// CSV output file (long format: user, date, metric, value)
    #[arg(long)]
    pub csv_output: Option<PathBuf>,

    /// JSON output file, pretty JSON goes to stdout when no output is given
    #[arg(long)]
    pub json_output: Option<PathBuf>,
}

impl Args {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            chronotypes: self
                .chronotypes
                .iter()
                .map(|c| (c.user.clone(), c.chronotype))
                .collect(),
            hypnogram_resolution_minutes: self.hypnogram_resolution,
            hrv: HrvConfig {
                coverage: self.coverage,
                method: self.hrv_method,
                filter: self.filter_bbi.then(BbiFilter::default),
                ..HrvConfig::default()
            },
            ..EngineConfig::default()
        }
    }
}
