use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};

use exam_reconciler::{
    config::Config,
    db::Database,
    errors::{AppError, AppResult},
    report::{ReconciliationReport, RunMode},
    repositories::{MongoExamRepository, MongoSubmissionRepository, SubmissionFilter},
    services::{ReconciliationService, RunOptions},
};

const USAGE: &str = "\
Usage: exam-reconciler <analyze|fix> [options]

Modes:
  analyze               dry run: report every discrepancy, write nothing
  fix                   apply corrections to the submissions collection

Options:
  --from YYYY-MM-DD     only submissions created on or after this date (UTC)
  --to YYYY-MM-DD       only submissions created on or before this date (UTC)
  --batch-size N        page size override (default from RECONCILE_BATCH_SIZE)
  --top N               score-change samples in the summary (default 10)
  --json PATH           write the full report as JSON
  --csv DIR             write answer/score correction CSVs into DIR";

#[derive(Debug, PartialEq)]
struct CliArgs {
    mode: RunMode,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    batch_size: Option<u64>,
    top: usize,
    json: Option<PathBuf>,
    csv: Option<PathBuf>,
}

fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut iter = args.iter();

    let mode = match iter.next().map(String::as_str) {
        Some("analyze") => RunMode::Analyze,
        Some("fix") => RunMode::Fix,
        Some(other) => return Err(format!("Unknown mode '{}'", other)),
        None => return Err("Missing mode".to_string()),
    };

    let mut cli = CliArgs {
        mode,
        from: None,
        to: None,
        batch_size: None,
        top: 10,
        json: None,
        csv: None,
    };

    while let Some(flag) = iter.next() {
        let mut value = || {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("Missing value for {}", flag))
        };
        match flag.as_str() {
            "--from" => cli.from = Some(parse_day_start(&value()?)?),
            "--to" => {
                // Inclusive date: filter upper bound is the next midnight.
                let day_start = parse_day_start(&value()?)?;
                let next = day_start
                    .checked_add_days(Days::new(1))
                    .ok_or_else(|| "Date out of range for --to".to_string())?;
                cli.to = Some(next);
            }
            "--batch-size" => {
                let raw = value()?;
                let parsed: u64 = raw
                    .parse()
                    .map_err(|_| format!("Invalid batch size '{}'", raw))?;
                if parsed == 0 {
                    return Err("Batch size must be at least 1".to_string());
                }
                cli.batch_size = Some(parsed);
            }
            "--top" => {
                let raw = value()?;
                cli.top = raw
                    .parse()
                    .map_err(|_| format!("Invalid --top value '{}'", raw))?;
            }
            "--json" => cli.json = Some(PathBuf::from(value()?)),
            "--csv" => cli.csv = Some(PathBuf::from(value()?)),
            other => return Err(format!("Unknown option '{}'", other)),
        }
    }

    Ok(cli)
}

fn parse_day_start(raw: &str) -> Result<DateTime<Utc>, String> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date '{}', expected YYYY-MM-DD", raw))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| format!("Invalid date '{}'", raw))?;
    Ok(Utc.from_utc_datetime(&midnight))
}

fn write_exports(report: &ReconciliationReport, cli: &CliArgs) -> AppResult<()> {
    if let Some(path) = &cli.json {
        std::fs::write(path, report.to_json()?)?;
        log::info!("Wrote JSON report to {}", path.display());
    }
    if let Some(dir) = &cli.csv {
        std::fs::create_dir_all(dir)?;
        let answers = dir.join(format!("answer-corrections-{}.csv", report.run_id));
        let scores = dir.join(format!("score-corrections-{}.csv", report.run_id));
        std::fs::write(&answers, report.answer_corrections_csv())?;
        std::fs::write(&scores, report.score_corrections_csv())?;
        log::info!(
            "Wrote CSV exports to {} and {}",
            answers.display(),
            scores.display()
        );
    }
    Ok(())
}

async fn run(cli: CliArgs) -> AppResult<()> {
    let config = Config::from_env();
    let db = Database::connect(&config).await?;

    let exams = Arc::new(MongoExamRepository::new(&db, &config.tests_collection));
    let submissions = Arc::new(MongoSubmissionRepository::new(
        &db,
        &config.submissions_collection,
    ));
    submissions.ensure_indexes().await?;

    let service = ReconciliationService::new(exams, submissions);
    let options = RunOptions {
        mode: cli.mode,
        filter: SubmissionFilter {
            from: cli.from,
            to: cli.to,
        },
        batch_size: cli.batch_size.unwrap_or(config.default_batch_size),
    };

    let report = service.reconcile(&options).await?;

    // Totals are printed even when the run did not complete.
    println!("{}", report.render_summary(cli.top));
    write_exports(&report, &cli)?;

    if let Some(cause) = report.fatal_error {
        return Err(AppError::DatabaseError(cause));
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("{}\n\n{}", err, USAGE);
            std::process::exit(2);
        }
    };

    if let Err(err) = run(cli).await {
        eprintln!("exam-reconciler fatal: {}", err);
        std::process::exit(1);
    }
}
