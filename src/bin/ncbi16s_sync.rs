use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::{error, info, warn};

use ncbi16s_sync::app::{
    App, ProgressSinkKind, RepairResult, SyncAction, SyncOptions, SyncResult,
};
use ncbi16s_sync::blastdb::{DumpTool, SystemBlastdbcmd};
use ncbi16s_sync::checksum::LocalDigest;
use ncbi16s_sync::config::{ConfigLoader, ConfigOverrides, Defaults, ResolvedConfig};
use ncbi16s_sync::domain::ChecksumBackend;
use ncbi16s_sync::error::SyncError;
use ncbi16s_sync::{fasta, logging};
use ncbi16s_sync::ncbi::NcbiHttpClient;
use ncbi16s_sync::output::{JsonOutput, OutputMode};
use ncbi16s_sync::store::SnapshotStore;
use ncbi16s_sync::tui::Tui;

#[derive(Parser)]
#[command(name = "ncbi16s-sync")]
#[command(about = "Mirror the NCBI 16S Microbial BLAST database and export a repaired FASTA")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(flatten)]
    dirs: DirArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Clone, Default)]
struct DirArgs {
    /// Directory holding the dated snapshots (default: ~/16S)
    #[arg(short = 'd', long, global = true)]
    directory: Option<Utf8PathBuf>,

    /// Directory receiving one log file per run (default: ~/16SLogs)
    #[arg(short = 'l', long, global = true)]
    log_directory: Option<Utf8PathBuf>,

    #[arg(long, global = true)]
    config: Option<String>,

    /// Failed verifications tolerated before giving up
    #[arg(long, global = true)]
    max_attempts: Option<u32>,

    /// Delete snapshot directories whose download failed verification
    #[arg(long, global = true)]
    discard_failed: bool,

    #[arg(long, global = true)]
    checksum_backend: Option<ChecksumBackend>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Bring the local mirror up to date and export FASTA (default)")]
    Sync(SyncArgs),
    #[command(about = "Compare the newest snapshot with upstream without downloading")]
    Status,
    #[command(about = "List snapshot directories")]
    List,
    #[command(about = "Split and deduplicate composite headers in a FASTA file")]
    Repair(RepairArgs),
}

#[derive(Args, Clone, Default)]
struct SyncArgs {
    /// Stop after the archive is verified and expanded
    #[arg(long)]
    skip_dump: bool,
}

#[derive(Args, Clone)]
struct RepairArgs {
    path: PathBuf,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        error!("{report}");
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<SyncError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &SyncError) -> u8 {
    match error {
        SyncError::ConfigRead(_) | SyncError::ConfigWrite(_) | SyncError::InvalidConfig { .. } => 2,
        SyncError::Http(_)
        | SyncError::HttpStatus { .. }
        | SyncError::MissingTool(_)
        | SyncError::ExternalTool { .. }
        | SyncError::EmptyDump(_) => 3,
        SyncError::Integrity { .. } => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    let output_mode = if cli.non_interactive || !std::io::stdout().is_terminal() {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command.unwrap_or(Commands::Sync(SyncArgs::default())) {
        Commands::Sync(args) => {
            let (config, app) = prepare(&cli.dirs, output_mode)?;
            run_sync(args, &config, app, output_mode)
        }
        Commands::Status => {
            let (_, app) = prepare(&cli.dirs, output_mode)?;
            run_status(app, output_mode)
        }
        Commands::List => {
            let (_, app) = prepare(&cli.dirs, output_mode)?;
            run_list(app, output_mode)
        }
        Commands::Repair(args) => {
            logging::init_stderr();
            run_repair(args, output_mode)
        }
    }
}

type SyncApp = App<NcbiHttpClient, LocalDigest, SystemBlastdbcmd>;

fn prepare(dirs: &DirArgs, output_mode: OutputMode) -> miette::Result<(ResolvedConfig, SyncApp)> {
    let config = resolve_config(dirs)?;
    let log_path = logging::init(
        &config.log_dir,
        matches!(output_mode, OutputMode::NonInteractive),
    )?;
    for note in &config.notes {
        warn!("{note}");
    }
    info!("logging to {log_path}");

    let store = SnapshotStore::new(config.database_dir.clone());
    let ncbi = NcbiHttpClient::new()?;
    let hasher = LocalDigest::for_backend(config.checksum_backend);
    let dump = SystemBlastdbcmd::new();
    if let Some(version) = dump.tool_info().blastdbcmd {
        info!("using {version}");
    }
    Ok((config, App::new(store, ncbi, hasher, dump)))
}

fn resolve_config(dirs: &DirArgs) -> miette::Result<ResolvedConfig> {
    let defaults = Defaults::from_home()?;
    let overrides = ConfigOverrides {
        database_dir: dirs.directory.clone(),
        log_dir: dirs.log_directory.clone(),
        max_attempts: dirs.max_attempts,
        keep_failed_attempts: dirs.discard_failed.then_some(false),
        checksum_backend: dirs.checksum_backend,
    };
    let config = ConfigLoader::resolve(dirs.config.as_deref(), overrides, &defaults)?;
    config.ensure_dirs()?;
    Ok(config)
}

fn run_sync(
    args: SyncArgs,
    config: &ResolvedConfig,
    app: SyncApp,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let options = SyncOptions {
        max_attempts: config.max_attempts,
        failed_attempts: config.failed_attempts,
        skip_dump: args.skip_dump,
        today: chrono::Local::now().date_naive(),
    };

    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.sync(options, &JsonOutput)?;
            JsonOutput::print_sync(&result).into_diagnostic()?;
            Ok(())
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(ProgressSinkKind::Sync);
            let result = tui.run(move |sink| app.sync(options, sink))?;
            tui.finish(&sync_summary(&result))
        }
    }
}

fn run_status(app: SyncApp, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.status(&JsonOutput)?;
            JsonOutput::print_status(&result).into_diagnostic()?;
            Ok(())
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(ProgressSinkKind::Status);
            let result = tui.run(move |sink| app.status(sink))?;
            let lines = match (&result.snapshot, &result.local_md5) {
                (Some(tag), Some(local)) => vec![
                    format!("newest snapshot: {tag}"),
                    format!("local md5:       {local}"),
                    format!("upstream md5:    {}", result.upstream_md5),
                    if result.up_to_date {
                        "up to date".to_string()
                    } else {
                        "stale, run `ncbi16s-sync sync`".to_string()
                    },
                ],
                _ => vec![
                    "no local snapshot".to_string(),
                    format!("upstream md5:    {}", result.upstream_md5),
                ],
            };
            tui.finish(&lines)
        }
    }
}

fn run_list(app: SyncApp, output_mode: OutputMode) -> miette::Result<()> {
    let result = app.list(&JsonOutput)?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_list(&result).into_diagnostic(),
        OutputMode::Interactive => {
            println!("snapshots in {}", result.root);
            for entry in &result.snapshots {
                let state = match (entry.tag.is_some(), entry.has_archive, entry.has_fasta) {
                    (false, _, _) => "not a snapshot",
                    (true, false, _) => "missing archive",
                    (true, true, true) => "exported",
                    (true, true, false) if entry.entries > 1 => "expanded",
                    (true, true, false) => "downloaded",
                };
                println!("  {:<16} {state}", entry.name);
            }
            Ok(())
        }
    }
}

fn run_repair(args: RepairArgs, output_mode: OutputMode) -> miette::Result<()> {
    let report = fasta::repair_file(&args.path)?;
    let result = RepairResult {
        path: args.path.display().to_string(),
        report,
    };
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_repair(&result).into_diagnostic(),
        OutputMode::Interactive => {
            println!(
                "{}: {} records in, {} out, {} composite, {} duplicates dropped",
                result.path,
                result.report.records_in,
                result.report.records_out,
                result.report.composite,
                result.report.dropped
            );
            Ok(())
        }
    }
}

fn sync_summary(result: &SyncResult) -> Vec<String> {
    let mut lines = vec![match result.action {
        SyncAction::UpToDate => format!("up to date: {}", result.snapshot_dir),
        SyncAction::Downloaded => format!(
            "downloaded {} ({} download(s))",
            result.snapshot_dir, result.downloads
        ),
    }];
    for dir in &result.failed_attempts {
        lines.push(format!("corrupted attempt: {dir}"));
    }
    if result.expanded {
        lines.push("archive expanded".to_string());
    }
    if let (Some(fasta), Some(report)) = (&result.fasta, &result.repair) {
        lines.push(format!(
            "fasta: {fasta} ({} records, {} composite split, {} duplicates dropped)",
            report.records_out, report.composite, report.dropped
        ));
    }
    lines.push("completed".to_string());
    lines
}
