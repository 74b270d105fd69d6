use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{ArgAction, Parser, Subcommand};
use packsmith_core::build::BuildEvent;
use packsmith_core::config::BuildConfig;
use packsmith_core::importer::{ImportConfig, import_pack};
use packsmith_core::mapping::IdentifierTable;
use packsmith_core::run_log;
use packsmith_core::session::BuildSession;
use packsmith_core::version::SchemaVersion;
use packsmith_core::workspace::discover_packs;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(
    name = "packsmith",
    about = "Build resource packs across platforms, versions and resolutions",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Show progress bars (disable with --progress false or --quiet)
    #[arg(long, default_value_t = true, action=ArgAction::Set, global=true, help_heading = "Logging/UX")]
    progress: bool,
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action=ArgAction::Count, global=true, help_heading = "Logging/UX")]
    verbose: u8,
    /// Quiet mode (overrides verbose)
    #[arg(
        short,
        long,
        default_value_t = false,
        global = true,
        help_heading = "Logging/UX"
    )]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build every platform x version x resolution artifact of a pack
    Build(BuildArgs),
    /// Import an existing pack (directory, .zip or .mcpack) as a new source pack
    Import(ImportArgs),
    /// Print the effective identifier map for one version
    Resolve(ResolveArgs),
    /// List packs (build configs) in a directory
    List(ListArgs),
}

#[derive(Parser, Debug, Clone)]
struct BuildArgs {
    /// Build configuration file (`*.config`)
    config: PathBuf,
}

#[derive(Parser, Debug, Clone)]
struct ImportArgs {
    /// Pack directory or archive
    pack: PathBuf,
    /// Name of the new pack (defaults to the pack's file name)
    #[arg(long)]
    name: Option<String>,
    /// Directory holding source_mapping.json, pack.config and build.config templates
    #[arg(long, default_value = "assets")]
    templates: PathBuf,
    /// Rule directory (defaults to <workspace>/Version_Mappings)
    #[arg(long)]
    mappings_dir: Option<PathBuf>,
    /// Version/format table (defaults to <mappings-dir>/version_mappings.json)
    #[arg(long)]
    version_mappings: Option<PathBuf>,
    /// Where the new source directory and build config are created
    #[arg(long, default_value = ".")]
    workspace: PathBuf,
}

#[derive(Parser, Debug, Clone)]
struct ResolveArgs {
    /// Identifier table (source_mapping.json)
    table: PathBuf,
    /// Schema version to resolve for, e.g. 1.20.4
    #[arg(long)]
    version: String,
}

#[derive(Parser, Debug, Clone)]
struct ListArgs {
    /// Directory to scan for `*.config` files
    #[arg(default_value = ".")]
    dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match &cli.command {
        Commands::Build(args) => {
            let cfg = BuildConfig::load(&args.config)
                .with_context(|| format!("read build config {}", args.config.display()))?;
            let log_file = run_log::rotate(&cfg.log_output_dir).with_context(|| {
                format!("prepare run log in {}", cfg.log_output_dir.display())
            })?;
            init_tracing_with_level(cli.quiet, cli.verbose, Some(log_file));
            run_build(&args.config, cli.progress && !cli.quiet)
        }
        Commands::Import(args) => {
            init_tracing_with_level(cli.quiet, cli.verbose, None);
            run_import(args)
        }
        Commands::Resolve(args) => {
            init_tracing_with_level(cli.quiet, cli.verbose, None);
            run_resolve(args)
        }
        Commands::List(args) => {
            init_tracing_with_level(cli.quiet, cli.verbose, None);
            run_list(args)
        }
    }
}

fn run_build(config: &Path, show_progress: bool) -> anyhow::Result<()> {
    use indicatif::{ProgressBar, ProgressStyle};

    let mut session = BuildSession::new();
    let events = session
        .start(config)
        .with_context(|| format!("start build for {}", config.display()))?;

    let mut bar: Option<ProgressBar> = None;
    for event in events.iter() {
        match event {
            BuildEvent::VersionSkipped { platform, version } => {
                let msg = format!("{platform} {version}: no mappings, skipped");
                match &bar {
                    Some(b) => b.println(msg),
                    None => warn!("{msg}"),
                }
            }
            BuildEvent::Started { cells } => {
                if show_progress {
                    let b = ProgressBar::new(cells as u64);
                    b.set_style(
                        ProgressStyle::with_template(
                            "{spinner:.green} building {pos}/{len} [{elapsed_precise}] {wide_msg}",
                        )
                        .unwrap_or_else(|_| ProgressStyle::default_bar()),
                    );
                    b.enable_steady_tick(Duration::from_millis(120));
                    bar = Some(b);
                }
            }
            BuildEvent::CellStarted { cell, .. } => {
                if let Some(b) = &bar {
                    b.set_message(format!("[{}][{}][{}]", cell.platform, cell.version, cell.label));
                }
            }
            BuildEvent::CellFinished { artifact, .. } => {
                info!(?artifact, "created");
                if let Some(b) = &bar {
                    b.inc(1);
                }
            }
            BuildEvent::CellFailed { cell, error, .. } => {
                error!(platform = %cell.platform, version = %cell.version, label = %cell.label, %error, "cell failed");
                if let Some(b) = &bar {
                    b.inc(1);
                }
            }
            BuildEvent::Cancelled => warn!("build cancelled"),
            BuildEvent::Finished(_) => {}
        }
    }
    if let Some(b) = &bar {
        b.finish_and_clear();
    }

    let summary = session.wait()?;
    for artifact in &summary.artifacts {
        println!("{}", artifact.display());
    }
    if !summary.report.is_clean() || !summary.report.warnings.is_empty() {
        println!("{}", summary.report);
    }
    if !summary.failed.is_empty() {
        bail!("{} of {} cells failed", summary.failed.len(), summary.failed.len() + summary.artifacts.len());
    }
    Ok(())
}

fn run_import(args: &ImportArgs) -> anyhow::Result<()> {
    let name = match &args.name {
        Some(n) => n.clone(),
        None => args
            .pack
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .with_context(|| format!("cannot derive a pack name from {}", args.pack.display()))?,
    };
    if name.trim().is_empty() {
        bail!("pack name must not be empty");
    }
    let mut cfg = ImportConfig::with_templates(&name, &args.templates, &args.workspace);
    if let Some(dir) = &args.mappings_dir {
        cfg.mappings_dir = dir.clone();
        cfg.version_mappings_file = dir.join("version_mappings.json");
    }
    if let Some(file) = &args.version_mappings {
        cfg.version_mappings_file = file.clone();
    }

    let report = import_pack(&args.pack, &cfg)
        .with_context(|| format!("import {}", args.pack.display()))?;
    if !report.report.is_clean() {
        eprintln!("{}", report.report);
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_resolve(args: &ResolveArgs) -> anyhow::Result<()> {
    let version = SchemaVersion::parse(&args.version)?;
    let table = IdentifierTable::load(&args.table)
        .with_context(|| format!("read identifier table {}", args.table.display()))?;
    let resolved = table.resolve(&version);
    for w in resolved.warnings() {
        warn!("{w}");
    }
    println!("{}", serde_json::to_string_pretty(resolved.records())?);
    Ok(())
}

fn run_list(args: &ListArgs) -> anyhow::Result<()> {
    let packs = discover_packs(&args.dir)
        .with_context(|| format!("scan {}", args.dir.display()))?;
    if packs.is_empty() {
        info!(dir = ?args.dir, "no packs found");
    }
    for p in packs {
        let name = p.name.as_deref().unwrap_or("<unnamed>");
        let version = p
            .pack_config
            .as_ref()
            .and_then(|c| c.version.as_deref())
            .unwrap_or("?");
        let resolutions = p
            .pack_config
            .as_ref()
            .map(|c| c.resolutions.join(", "))
            .unwrap_or_default();
        println!("{name} {version} [{resolutions}] {}", p.config_file.display());
        if let Some(icon) = &p.icon {
            println!("  icon: {}", icon.display());
        }
    }
    Ok(())
}

fn init_tracing_with_level(quiet: bool, verbose: u8, log_file: Option<File>) {
    let level = if quiet {
        "error".to_string()
    } else {
        match verbose {
            0 => "info".into(),
            1 => "debug".into(),
            _ => "trace".into(),
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));
    let console = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let file_layer = log_file.map(|f| {
        fmt::layer()
            .with_writer(Mutex::new(f))
            .with_ansi(false)
            .with_target(false)
    });
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init();
}
