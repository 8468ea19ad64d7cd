//! `tabulate` command-line tool.

use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use rust_data_tabulate::cache::{CacheStore, FileCacheStore};
use rust_data_tabulate::config::{Config, Layout};
use rust_data_tabulate::descriptor::Descriptor;
use rust_data_tabulate::execution::{CancelToken, Coordinator, CoordinatorOptions, JobOutcome};
use rust_data_tabulate::logging::{LogConfig, LogFormat, init_logging, parse_level};
use rust_data_tabulate::observability::{
    CompositeObserver, FileObserver, JobObserver, TracingObserver,
};
use tracing::level_filters::LevelFilter;

mod args;

use crate::args::{Cli, LogFormatArg, LogLevelArg};

const EXAMPLE_CONFIG: &str = include_str!("../../share/tabulate.example.toml");

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    if cli.copy_config {
        return copy_config(cli.config.as_deref());
    }

    let mut config = load_config(cli.config.as_deref())?;
    config.apply_overrides(&cli.overrides.to_overrides());
    config.validate().context("invalid configuration after overrides")?;

    init_logging(&log_config_from_cli(&cli, &config)).context("failed to initialise logging")?;

    let layout = config.layout();
    if cli.initialize {
        layout
            .create_all()
            .with_context(|| format!("failed to create directories under {}", config.general.root_directory.display()))?;
        println!("initialised {}", config.general.root_directory.display());
    }
    if cli.clear_cache {
        let store = FileCacheStore::open(&layout.cache_path)?;
        store.clear()?;
        println!("cleared cache {}", layout.cache_path.display());
    }

    if cli.sources.is_empty() {
        if cli.initialize || cli.clear_cache {
            return Ok(ExitCode::SUCCESS);
        }
        bail!("no SOURCE given (see --help)");
    }

    let sources: Vec<PathBuf> = cli
        .sources
        .iter()
        .map(|s| resolve_source(s, &layout))
        .collect();

    if cli.verify_source {
        return Ok(verify_sources(&sources, &config));
    }

    let coordinator = build_coordinator(&cli, &config, &layout)?;
    listen_for_interrupt(coordinator.cancel_token())?;

    let report = coordinator.run_paths(&sources, &config.labels);
    println!("{report}");

    if report.all_ok() {
        return Ok(ExitCode::SUCCESS);
    }
    eprintln!();
    eprintln!("{} dataset(s) did not complete:", report.failures().count());
    for job in report.failures() {
        match &job.outcome {
            JobOutcome::Failed(e) => eprintln!("  {}: {e}", job.dataset),
            other => eprintln!("  {}: {}", job.dataset, other.label()),
        }
    }
    Ok(ExitCode::FAILURE)
}

fn load_config(explicit: Option<&Path>) -> anyhow::Result<Config> {
    if let Some(path) = explicit {
        return Config::load(path).with_context(|| format!("failed to load {}", path.display()));
    }
    match Config::default_path() {
        Some(path) if path.is_file() => {
            Config::load(&path).with_context(|| format!("failed to load {}", path.display()))
        }
        _ => Ok(Config::default()),
    }
}

fn copy_config(explicit: Option<&Path>) -> anyhow::Result<ExitCode> {
    let Some(target) = explicit.map(Path::to_path_buf).or_else(Config::default_path) else {
        bail!("no configuration directory available; pass --config");
    };
    if target.exists() {
        eprintln!("{} already exists, not doing anything", target.display());
        return Ok(ExitCode::FAILURE);
    }
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(&target, EXAMPLE_CONFIG)
        .with_context(|| format!("failed to write {}", target.display()))?;
    println!("wrote example configuration to {}", target.display());
    Ok(ExitCode::SUCCESS)
}

/// A SOURCE that does not exist as given is looked up in the sources directory.
fn resolve_source(source: &Path, layout: &Layout) -> PathBuf {
    if source.exists() || source.is_absolute() {
        return source.to_path_buf();
    }
    let candidate = layout.sources_dir.join(source);
    if candidate.exists() {
        candidate
    } else {
        source.to_path_buf()
    }
}

fn verify_sources(sources: &[PathBuf], config: &Config) -> ExitCode {
    let mut invalid = 0usize;
    for path in sources {
        match Descriptor::load(path, &config.labels) {
            Ok(d) => println!("{}: ok ({}, {} columns)", path.display(), d.format.tag(), d.bindings.len()),
            Err(e) => {
                invalid += 1;
                println!("{}: {e}", path.display());
            }
        }
    }
    if invalid == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn build_coordinator(cli: &Cli, config: &Config, layout: &Layout) -> anyhow::Result<Coordinator> {
    std::fs::create_dir_all(&layout.output_dir)
        .with_context(|| format!("failed to create {}", layout.output_dir.display()))?;

    let opts = CoordinatorOptions {
        workers: cli.jobs.unwrap_or(config.general.workers).max(1),
        input_dir: layout.input_dir.clone(),
        output_dir: layout.output_dir.clone(),
        ignore_cache: cli.ignore_cache,
        fetch: cli.fetch,
        reader: config.reader_options(),
        transform: config.transform_options(),
        ..Default::default()
    };
    let cache = Arc::new(FileCacheStore::open(&layout.cache_path)?);

    let mut observers: Vec<Arc<dyn JobObserver>> = vec![Arc::new(TracingObserver)];
    if let Some(path) = &cli.event_log {
        observers.push(Arc::new(FileObserver::new(path)));
    }

    #[cfg_attr(not(feature = "remote"), allow(unused_mut))]
    let mut coordinator =
        Coordinator::new(opts, cache)?.with_observer(Arc::new(CompositeObserver::new(observers)));

    #[cfg(feature = "remote")]
    {
        use rust_data_tabulate::fetch::HttpFetcher;
        use rust_data_tabulate::transform::address::{HttpAddressParser, Retrying};

        if cli.fetch {
            coordinator = coordinator.with_fetcher(Arc::new(HttpFetcher::new()?));
        }
        if let Some(endpoint) = &cli.address_parser {
            let parser = HttpAddressParser::new(endpoint.as_str())
                .map_err(|e| anyhow::anyhow!("address parser {endpoint}: {e}"))?;
            coordinator = coordinator.with_address_parser(Arc::new(Retrying::new(parser, 3)));
        }
    }
    if cli.fetch && !cfg!(feature = "remote") {
        tracing::warn!("built without the `remote` feature, --fetch only uses local copies");
    }

    Ok(coordinator)
}

/// Cancel the run on Ctrl-C. Running jobs abandon their output and nothing more is started.
fn listen_for_interrupt(cancel: CancelToken) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start signal runtime")?;
    std::thread::Builder::new()
        .name("tabulate-signal".to_string())
        .spawn(move || {
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupt received, stopping after running jobs abandon their output");
                    cancel.cancel();
                }
            });
        })
        .context("failed to spawn signal listener")?;
    Ok(())
}

/// Flags beat the configuration file; `RUST_LOG` applies only when neither sets a level.
fn log_config_from_cli(cli: &Cli, config: &Config) -> LogConfig {
    let explicit = cli.log_level.map(|level| match level {
        LogLevelArg::Off => LevelFilter::OFF,
        LogLevelArg::Error => LevelFilter::ERROR,
        LogLevelArg::Warn => LevelFilter::WARN,
        LogLevelArg::Info => LevelFilter::INFO,
        LogLevelArg::Debug => LevelFilter::DEBUG,
        LogLevelArg::Trace => LevelFilter::TRACE,
    });
    let from_flags = explicit.or_else(|| {
        cli.verbosity
            .is_present()
            .then(|| cli.verbosity.tracing_level_filter())
    });
    let from_config = config.general.log_level.as_deref().and_then(parse_level);

    let mut log = LogConfig::default().with_format(match cli.log_format {
        LogFormatArg::Pretty => LogFormat::Pretty,
        LogFormatArg::Compact => LogFormat::Compact,
        LogFormatArg::Json => LogFormat::Json,
    });
    log.use_env_filter = from_flags.is_none();
    if let Some(level) = from_flags.or(from_config) {
        log = log.with_level(level);
    }
    log = log.with_log_file(cli.log_file.clone());
    if log.log_file.is_none() {
        log.with_ansi = io::stderr().is_terminal();
    }
    log
}
