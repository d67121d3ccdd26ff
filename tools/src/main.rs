//! capacity-validator: replays a recorded game and audits its
//! peak-demand capacity charges.
//!
//! Usage:
//!   capacity-validator --dir games/g42 --out variance.csv
//!   capacity-validator --events g42.events.jsonl --bootstrap g42.boot.json --out variance.csv \
//!       --detail detail.csv --db audit.db --import
//!   capacity-validator --db audit.db --from-db <run-id> --out variance.csv
//!   capacity-validator --db audit.db --from-db <run-id> --export-events g42.events.jsonl
//!
//! Options:
//!   --config <file>           JSON audit configuration (defaults apply per field)
//!   --interval <n>            assessment interval override
//!   --std-coefficient <x>     threshold coefficient override
//!   --fee-per-point <x>       per-point fee override
//!   --game <id>               label for the detail report (default: directory name)
//!   --run-id <id>             audit run id (default: generated)

use anyhow::{bail, Context, Result};
use peakfee_core::{
    bootstrap::{load_bootstrap, BootstrapRecord},
    config::AuditConfig,
    discovery::{self, BOOT_SUFFIX, EVENTS_SUFFIX},
    driver::AssessmentDriver,
    error::AuditResult,
    event::AuditEvent,
    replay::{write_event_log, EventLogReader},
    report::VarianceReport,
    store::AuditStore,
};
use std::{
    env,
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || has_flag(&args, "--help") {
        print_usage();
        return Ok(());
    }

    let config = load_config(&args)?;
    let dir = flag_value(&args, "--dir").map(PathBuf::from);
    let run_id = flag_value(&args, "--run-id")
        .map(str::to_string)
        .unwrap_or_else(|| format!("audit-{}", uuid::Uuid::new_v4()));
    let game_id = flag_value(&args, "--game")
        .map(str::to_string)
        .or_else(|| dir.as_deref().and_then(dir_label))
        .unwrap_or_else(|| run_id.clone());

    // For :memory: use a shared-cache URI so the runner's connection and
    // the driver's sink connection see the same database.
    let db: Option<String> = flag_value(&args, "--db").map(|db| {
        if db == ":memory:" {
            format!("file:audit_{run_id}?mode=memory&cache=shared")
        } else {
            db.to_string()
        }
    });
    let store = match &db {
        Some(path) => {
            let store = AuditStore::open(path)?;
            store.migrate()?;
            Some(store)
        }
        None => None,
    };

    // Export a stored log and stop.
    if let Some(out) = flag_value(&args, "--export-events") {
        let (Some(store), Some(source)) = (&store, flag_value(&args, "--from-db")) else {
            bail!("--export-events needs --db and --from-db");
        };
        let events = store.events_for_run(source)?;
        write_event_log(BufWriter::new(File::create(out)?), &events)?;
        println!("Exported {} events of run {source} to {out}", events.len());
        return Ok(());
    }

    let output = flag_value(&args, "--out").context("--out <file> is required")?;
    let detail = flag_value(&args, "--detail");

    let bootstrap = resolve_input(&args, "--bootstrap", dir.as_deref(), BOOT_SUFFIX)?;
    let records: Vec<BootstrapRecord> = match &bootstrap {
        Some(path) => load_bootstrap(path)
            .with_context(|| format!("Cannot read bootstrap record {}", path.display()))?,
        None => {
            log::warn!("No bootstrap record found; statistics start from live data");
            Vec::new()
        }
    };

    println!("capacity-validator");
    println!("  run_id:           {run_id}");
    println!("  game:             {game_id}");
    println!("  interval:         {}", config.assessment_interval);
    println!("  std coefficient:  {}", config.std_coefficient);
    println!("  fee per point:    {}", config.fee_per_point);
    println!(
        "  bootstrap:        {}",
        bootstrap.as_deref().map(|p| p.display().to_string()).unwrap_or_else(|| "(none)".into())
    );
    println!();

    if let Some(store) = &store {
        store.insert_run(&run_id, &game_id, env!("CARGO_PKG_VERSION"), chrono::Utc::now())?;
    }

    let mut driver = AssessmentDriver::new(run_id.clone(), config)?.with_game_id(game_id);
    driver.seed(&records)?;
    if let Some(path) = &db {
        driver.register_sink(Box::new(AuditStore::open(path)?));
    }

    let result = match flag_value(&args, "--from-db") {
        Some(source) => {
            let Some(store) = &store else {
                bail!("--from-db needs --db");
            };
            let events = store.events_for_run(source)?;
            log::info!("Replaying {} stored events of run {source}", events.len());
            driver.run(events.into_iter().map(Ok))
        }
        None => {
            let path = resolve_input(&args, "--events", dir.as_deref(), EVENTS_SUFFIX)?
                .context("No event log found (use --events or --dir)")?;
            if has_flag(&args, "--import") {
                let Some(store) = &store else {
                    bail!("--import needs --db");
                };
                let events = EventLogReader::open(&path)?.collect::<AuditResult<Vec<AuditEvent>>>()?;
                let stored = store.append_events(&run_id, &events)?;
                log::info!("Imported {stored} events into run {run_id}");
            }
            driver.run(EventLogReader::open(&path)?)
        }
    };

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            if let Some(store) = &store {
                store.mark_failed(&run_id);
            }
            return Err(e).context("Audit aborted; no report written");
        }
    };

    report.save_final(output)?;
    if let Some(detail) = detail {
        report.save_detail(detail)?;
    }
    print_summary(&report, output);
    Ok(())
}

fn load_config(args: &[String]) -> Result<AuditConfig> {
    let mut config = match flag_value(args, "--config") {
        Some(path) => AuditConfig::load(path)?,
        None => AuditConfig::default(),
    };
    if let Some(interval) = parse_flag(args, "--interval")? {
        config.assessment_interval = interval;
    }
    if let Some(coefficient) = parse_flag(args, "--std-coefficient")? {
        config.std_coefficient = coefficient;
    }
    if let Some(fee) = parse_flag(args, "--fee-per-point")? {
        config.fee_per_point = fee;
    }
    config.validate()?;
    Ok(config)
}

fn resolve_input(
    args: &[String],
    flag: &str,
    dir: Option<&Path>,
    suffix: &str,
) -> Result<Option<PathBuf>> {
    discovery::resolve_input(flag_value(args, flag), dir, suffix).with_context(|| {
        format!(
            "Cannot list {}",
            dir.map(|d| d.display().to_string()).unwrap_or_default()
        )
    })
}

fn dir_label(dir: &Path) -> Option<String> {
    dir.file_name().and_then(|n| n.to_str()).map(str::to_string)
}

fn print_summary(report: &VarianceReport, output: &str) {
    println!("=== AUDIT SUMMARY ===");
    println!("  run_id:           {}", report.run_id);
    println!("  live timeslots:   {}", report.live_timeslots);
    println!("  assessments:      {}", report.assessments.len());
    println!("  bootstrap hours:  {}", report.bootstrap.hours);
    println!("  final mean:       {:.3}", report.final_stats.mean());
    println!("  final sigma:      {:.3}", report.final_stats.sigma());
    println!("  gap timeslots:    {}", report.anomalies.gap_timeslots);
    println!("  orphan txns:      {}", report.anomalies.orphan_transactions);
    println!("  stalled markers:  {}", report.anomalies.stalled_markers);
    println!("  skipped slots:    {}", report.anomalies.skipped_timeslots);
    println!();
    println!("=== VARIANCE BY PARTICIPANT (computed - recorded) ===");
    if report.participants.is_empty() {
        println!("  (no participants)");
    }
    for p in &report.participants {
        println!("  {:<24} {:>14.4}", p.participant, p.variance);
    }
    println!();
    println!("Report written to {output}");
}

fn print_usage() {
    println!("Usage: capacity-validator --dir <game-dir> --out <report.csv> [options]");
    println!("       capacity-validator --events <log.jsonl> [--bootstrap <boot.json>] --out <report.csv>");
    println!("       capacity-validator --db <audit.db> --from-db <run-id> --out <report.csv>");
    println!("Options: --config --interval --std-coefficient --fee-per-point --detail");
    println!("         --db --import --export-events --game --run-id");
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> Result<Option<T>> {
    match flag_value(args, flag) {
        Some(value) => match value.parse() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => bail!("Invalid value for {flag}: {value}"),
        },
        None => Ok(None),
    }
}
