use anyhow::{bail, Context, Result};
use std::{env, path::PathBuf};
use tablescrape::{
    config::load_job_file,
    fetch::http::HttpTransport,
    launcher::{all_ok, run_jobs, Action},
    pipeline::Pipeline,
    store::{LedgerStore, MemoryStore, SheetsStore},
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

struct Args {
    jobs: PathBuf,
    dry_run: bool,
    only: Option<String>,
}

fn parse_args() -> Result<Args> {
    let mut jobs = None;
    let mut dry_run = false;
    let mut only = None;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--dry-run" => dry_run = true,
            "--only" => only = Some(args.next().context("--only needs a job id")?),
            flag if flag.starts_with("--") => bail!("unknown flag {}", flag),
            path if jobs.is_none() => jobs = Some(PathBuf::from(path)),
            extra => bail!("unexpected argument {}", extra),
        }
    }
    Ok(Args {
        jobs: jobs.context("usage: tablescrape <jobs.yaml> [--dry-run] [--only <job_id>]")?,
        dry_run,
        only,
    })
}

fn runner_kind() -> String {
    match env::var("RUNNER_TYPE") {
        Ok(kind) if !kind.trim().is_empty() => kind,
        _ if env::var_os("TERMUX_VERSION").is_some() => "mobile".to_string(),
        _ => "system".to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) job file ─────────────────────────────────────────────────
    let args = parse_args()?;
    let file = load_job_file(&args.jobs)?;
    let jobs: Vec<_> = match &args.only {
        Some(id) => file.jobs.iter().filter(|j| &j.id == id).cloned().collect(),
        None => file.jobs.clone(),
    };
    if jobs.is_empty() {
        bail!("no jobs to run in {}", args.jobs.display());
    }
    info!(jobs = jobs.len(), file = %args.jobs.display(), "loaded job file");

    // ─── 3) transport & store ────────────────────────────────────────
    let transport = HttpTransport::new(&file.fetch.user_agent)?;
    let store: Box<dyn LedgerStore> = if args.dry_run {
        warn!("dry run: writes stay in memory");
        Box::new(MemoryStore::permissive())
    } else {
        let token = env::var("SHEETS_ACCESS_TOKEN").context("SHEETS_ACCESS_TOKEN is not set")?;
        Box::new(SheetsStore::new(token)?)
    };

    // ─── 4) run ──────────────────────────────────────────────────────
    let runner = runner_kind();
    let job_file = args
        .jobs
        .canonicalize()
        .unwrap_or_else(|_| args.jobs.clone());
    let pipeline = Pipeline::new(&transport, store.as_ref(), &file.fetch, &file.ledger);
    let entries = run_jobs(
        &pipeline,
        &jobs,
        |job| format!("{}#{}", job_file.display(), job.id),
        &runner,
        file.ledger.offset(),
    )
    .await;

    // ─── 5) summary ──────────────────────────────────────────────────
    for entry in &entries {
        println!(
            "{:<24} {:<4} {:<4} {:>8}ms  {}",
            entry.job_id, entry.action, entry.outcome, entry.duration_ms, entry.note
        );
    }
    let skipped = entries.iter().filter(|e| e.action == Action::Skip).count();
    if !all_ok(&entries) {
        error!(jobs = entries.len(), skipped, "run finished with failures");
        std::process::exit(1);
    }
    info!(jobs = entries.len(), "run complete");
    Ok(())
}
