mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};

use pgadmin4_runtime::config::{self, ConfigStore, DevConfig};
use pgadmin4_runtime::presentation::{Presenter, TerminalPresenter};
use pgadmin4_runtime::server_log::ServerLog;
use pgadmin4_runtime::update::{SquirrelUpdater, UpdateCheckParams, UpdateCoordinator};
use pgadmin4_runtime::{LaunchOutcome, Launcher, RuntimeContext};

fn main() {
    // Initialize logger with the runtime's diagnostic format
    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(log::LevelFilter::Info)
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("FATAL: Failed to create Tokio runtime: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(real_main()) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn real_main() -> Result<()> {
    let args = cli::Args::parse();

    match args.sub.unwrap_or(cli::Cmd::Run(cli::RunArgs::default())) {
        cli::Cmd::Run(run) => run_runtime(run).await,
        cli::Cmd::Config { action, config_dir } => handle_config(action, config_dir),
    }
}

fn open_config(config_dir: Option<PathBuf>) -> Result<ConfigStore> {
    match config_dir {
        Some(dir) => {
            let path = dir.join(config::CONFIG_FILE_NAME);
            ConfigStore::open(path.clone())
                .with_context(|| format!("Failed to open {}", path.display()))
        }
        None => ConfigStore::open_default().context("Failed to open the runtime configuration"),
    }
}

fn handle_config(action: cli::ConfigCmd, config_dir: Option<PathBuf>) -> Result<()> {
    let store = open_config(config_dir)?;
    match action {
        cli::ConfigCmd::Show => {
            println!("{}", store.to_pretty_json()?);
        }
        cli::ConfigCmd::Set { key, value } => {
            // Typed when it parses as JSON (`true`, `5051`), a string otherwise.
            let value = serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value));
            store
                .set(&key, value)
                .with_context(|| format!("Failed to set {key}"))?;
            info!("Updated {} in {}", key, store.path().display());
        }
    }
    Ok(())
}

async fn run_runtime(args: cli::RunArgs) -> Result<()> {
    let config = Arc::new(open_config(args.config_dir)?);
    let log_dir = config::local_app_data_dir().context("Failed to resolve the log directory")?;
    let server_log = Arc::new(ServerLog::create_in(&log_dir));
    info!("Server log: {}", server_log.path().display());

    let runtime_dir = std::env::current_exe()
        .context("Failed to locate the runtime executable")?
        .parent()
        .map(Path::to_path_buf)
        .context("Runtime executable has no parent directory")?;
    let dev_config = DevConfig::load(Path::new(config::DEV_CONFIG_FILE_NAME));

    let presenter: Arc<dyn Presenter> = Arc::new(TerminalPresenter::new(!args.no_browser));
    let ctx = RuntimeContext::new(Arc::clone(&config), server_log, presenter, runtime_dir)
        .with_dev_config(dev_config);
    let downloads = Arc::clone(&ctx.downloads);
    let launcher = Arc::new(Launcher::new(ctx).with_timeout(args.timeout.map(Duration::from_secs)));
    let cancel = launcher.cancel_token();

    let signals = Arc::clone(&launcher);
    let signal_task = tokio::spawn(async move { signals.run_signal_loop().await });

    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => warn!("Failed to listen for Ctrl+C: {e}"),
        }
        ctrl_c_cancel.cancel();
    });

    let outcome = match launcher.launch().await {
        Ok(outcome) => outcome,
        Err(e) => {
            launcher.shutdown().await;
            return Err(e);
        }
    };

    let result = match outcome {
        LaunchOutcome::Ready { url } => {
            info!("pgAdmin 4 is available at {url}");
            match launcher.endpoint() {
                Some(endpoint) => {
                    let updater = Arc::new(SquirrelUpdater::new(downloads, log_dir));
                    let (coordinator, events) = UpdateCoordinator::new(
                        config,
                        launcher.context().presenter.clone(),
                        updater,
                        endpoint,
                    );
                    coordinator.rebuild_menu();
                    if !args.no_auto_update && coordinator.state().auto_update_enabled {
                        coordinator.request_update_check(&UpdateCheckParams::from(args.update));
                    }
                    tokio::select! {
                        _ = coordinator.run(events) => {}
                        _ = cancel.cancelled() => {}
                    }
                }
                None => cancel.cancelled().await,
            }
            Ok(())
        }
        LaunchOutcome::Cancelled => Ok(()),
        LaunchOutcome::Failed => Err(anyhow::anyhow!("pgAdmin 4 failed to start")),
        LaunchOutcome::PortUnavailable { port } => {
            Err(anyhow::anyhow!("Port {port} is already in use"))
        }
    };

    launcher.shutdown().await;
    if let Err(e) = signal_task.await {
        warn!("Signal loop ended abnormally: {e}");
    }
    result
}
