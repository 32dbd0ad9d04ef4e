use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use sleep_stats::config::Args;
use sleep_stats::data_loading::CsvDirectoryLoader;
use sleep_stats::output::{self, Report};
use sleep_stats::statistics::{PerUser, SleepStatistics, UserSelection};

fn report_failures<T>(kind: &str, results: &PerUser<T>) {
    for (user, result) in results {
        if let Err(err) = result {
            warn!("No {} results for {}: {}", kind, user, err);
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let loader = CsvDirectoryLoader::new(&args.input_path);
    let engine = SleepStatistics::new(&loader, args.engine_config());
    let users = UserSelection::from(args.users.clone());

    info!(
        "Computing statistics from {} to {} in {}",
        args.start_date,
        args.end_date,
        args.input_path.display()
    );
    let sleep = if args.metrics.is_empty() {
        engine.get_statistics(&users, args.start_date, args.end_date, args.reduction)
    } else {
        engine.get_metrics(
            &users,
            &args.metrics,
            args.start_date,
            args.end_date,
            args.reduction,
        )
    }
    .context("Failed to compute sleep statistics")?;
    report_failures("sleep", &sleep);

    let hrv = if args.hrv_metrics.is_empty() {
        None
    } else {
        let hrv = engine
            .night_hrv_metrics(&users, &args.hrv_metrics, args.start_date, args.end_date)
            .context("Failed to compute nightly HRV")?;
        report_failures("HRV", &hrv);
        Some(hrv)
    };

    if let Some(path) = &args.csv_output {
        let mut rows = output::sleep_rows(&sleep);
        if let Some(hrv) = &hrv {
            rows.extend(output::hrv_rows(hrv));
        }
        output::write_csv(path, &rows)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    let report = Report::new(Some(&sleep), hrv.as_ref());
    if let Some(path) = &args.json_output {
        output::write_json(Some(path.as_path()), &report)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    } else if args.csv_output.is_none() {
        output::write_json(None, &report)?;
    }

    Ok(())
}
