mod cli;

use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use cli::{CatalogArgs, Cli, Commands, EnhanceArgs};
use features_rs::{FeatureCatalog, prepare_dataset};
use tracing_appender::non_blocking;
use tracing_subscriber::{EnvFilter, prelude::*};

fn init_tracing(log_file: Option<PathBuf>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stdout);

    if let Some(path) = log_file {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|err| anyhow!("failed to create log directory {parent:?}: {err}"))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| anyhow!("failed to open log file {path:?}: {err}"))?;
        let (non_blocking_writer, guard) = non_blocking(file);
        // The writer flushes on guard drop; keep it for the whole process.
        let _guard = Box::leak(Box::new(guard));
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(non_blocking_writer);
        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .with(file_layer)
            .try_init()
            .map_err(|err| anyhow!("failed to initialize tracing: {err}"))
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .try_init()
            .map_err(|err| anyhow!("failed to initialize tracing: {err}"))
    }
}

fn log_invocation(log_file: Option<&PathBuf>) {
    let cwd = std::env::current_dir().ok();
    let argv: Vec<String> = std::env::args_os()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();

    tracing::info!("==================== new pricesmith run ====================");
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        cwd = ?cwd,
        log_file = ?log_file,
        argv = ?argv,
        "pricesmith invoked"
    );
    if argv.len() >= 2 {
        tracing::info!(
            "cargo_repro_command=cargo run --release -p pricesmith_cli -- {}",
            argv[1..].join(" ")
        );
    }
}

fn run_enhance(args: EnhanceArgs) -> Result<()> {
    let config = args.prepare_config()?;
    let provider = args.provider()?;
    let prepared = prepare_dataset(&config, provider.as_ref())?;
    tracing::info!(
        rows = prepared.rows,
        columns = prepared.columns,
        rows_dropped = prepared.report.rows_dropped(),
        status = ?prepared.status,
        path = %prepared.path.display(),
        "Enhanced dataset created with {} rows and {} columns",
        prepared.rows,
        prepared.columns
    );
    Ok(())
}

fn run_catalog(args: CatalogArgs) -> Result<()> {
    let features = args.feature_config()?;
    features.validate()?;
    let catalog = FeatureCatalog::build(&features, args.with_buy_signal);
    let columns = catalog.expected_warmup()?;
    let pruning = catalog.expected_pruning(false)?;

    println!(
        "{:<24} {:<20} {:<8} {:<10} {:>7} {:>8}  transform",
        "column", "family", "kind", "required", "leading", "trailing"
    );
    for column in &columns {
        let transform = catalog
            .node(&column.name)
            .map(|node| node.transform.to_string())
            .unwrap_or_else(|| "input".to_string());
        println!(
            "{:<24} {:<20} {:<8} {:<10} {:>7} {:>8}  {}",
            column.name,
            column.family.as_str(),
            format!("{:?}", column.kind).to_lowercase(),
            format!("{:?}", column.requirement).to_lowercase(),
            column.warmup.leading,
            column.warmup.trailing,
            transform
        );
    }
    println!(
        "{} columns (date index excluded); {} leading rows pruned on clean input",
        columns.len(),
        pruning.leading
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = match &cli.command {
        Commands::Enhance(args) => args.log_file(),
        Commands::Catalog(_) => None,
    };

    init_tracing(log_file.clone())?;
    log_invocation(log_file.as_ref());

    match cli.command {
        Commands::Enhance(args) => run_enhance(args),
        Commands::Catalog(args) => run_catalog(args),
    }
}
