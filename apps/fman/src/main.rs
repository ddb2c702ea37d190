//! fman - feature and plugin manager with configuration history
//!
//! The CLI parses arguments, loads the configuration, opens the history and
//! runs one operation through the ops crate while a background task drains
//! the event channel.

mod cli;
mod display;
mod error;
mod events;
mod logging;
mod setup;

use crate::cli::{Cli, Commands, SiteCommands};
use crate::display::OutputRenderer;
use crate::error::CliError;
use crate::events::EventHandler;
use crate::setup::SystemSetup;
use clap::Parser;
use fman_config::Config;
use fman_errors::UserFacingError;
use fman_events::EventReceiver;
use fman_ops::{InstallRequest, OperationResult, OpsCtx};
use fman_types::ColorChoice;
use std::path::Path;
use std::process;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Exit code for a result that completed but reports a refusal or an
/// unhappy feature
const EXIT_NOT_SUCCESS: i32 = 2;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_mode = cli.global.json;

    match run(cli).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            error!("Application error: {}", e);
            if json_mode {
                let body = serde_json::json!({
                    "error": e.to_string(),
                    "code": match &e {
                        CliError::Ops(inner) => inner.user_code(),
                        _ => None,
                    },
                });
                println!("{body}");
            } else {
                eprintln!("Error: {e}");
            }
            process::exit(e.exit_code());
        }
    }
}

/// Main application logic
async fn run(cli: Cli) -> Result<i32, CliError> {
    // File config (or defaults), then environment, then CLI flags
    let mut config = Config::load_or_default(&cli.global.config).await?;
    config.merge_env()?;
    apply_cli_config(&mut config, &cli.global);
    config.validate()?;

    init_tracing(cli.global.json, cli.global.debug, &config.logs_path());
    info!("Starting fman v{}", env!("CARGO_PKG_VERSION"));

    let colors = match config.general.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => console::Term::stdout().features().colors_supported(),
    };

    let (event_sender, event_receiver) = fman_events::channel();
    let (shutdown, drained) = oneshot::channel();
    let drain = spawn_event_drain(
        event_receiver,
        EventHandler::new(colors && !cli.global.json, cli.global.debug),
        drained,
        cli.global.json,
    );

    let setup = SystemSetup::new(config);
    let result = match setup.initialize(event_sender).await {
        Ok(ctx) => {
            if cli.command.is_transaction() {
                cancel_on_ctrl_c(&ctx);
            }
            let result = execute_command(cli.command, &ctx).await;
            drop(ctx);
            result
        }
        Err(e) => Err(e),
    };

    let _ = shutdown.send(());
    let _ = drain.await;

    let result = result?;
    OutputRenderer::new(cli.global.json, colors).render_result(&result)?;
    info!("Command completed");
    Ok(if result.is_success() {
        0
    } else {
        EXIT_NOT_SUCCESS
    })
}

/// Forward events to tracing and the terminal until shutdown, then flush
/// whatever is still queued
fn spawn_event_drain(
    mut receiver: EventReceiver,
    mut handler: EventHandler,
    mut shutdown: oneshot::Receiver<()>,
    quiet: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut handle = |message: fman_events::EventMessage| {
            if quiet {
                logging::log_event_with_tracing(&message);
            } else {
                handler.handle_event(&message);
            }
        };
        loop {
            tokio::select! {
                biased;
                message = receiver.recv() => match message {
                    Some(message) => handle(message),
                    None => break,
                },
                _ = &mut shutdown => {
                    while let Ok(message) = receiver.try_recv() {
                        handle(message);
                    }
                    break;
                }
            }
        }
    })
}

/// Ctrl-C sets the install cancellation token; the transaction rolls back
/// and reports an abort
fn cancel_on_ctrl_c(ctx: &OpsCtx) {
    let token = ctx.install.progress.token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
}

/// Execute the specified command
async fn execute_command(command: Commands, ctx: &OpsCtx) -> Result<OperationResult, CliError> {
    let result = match command {
        Commands::Install {
            feature,
            from,
            site,
            optional,
        } => {
            let request = InstallRequest {
                source: from,
                feature,
                target: site,
                optional,
            };
            OperationResult::InstallReport(fman_ops::install(ctx, &request).await?)
        }
        Commands::Remove { feature, site } => {
            OperationResult::RemoveReport(fman_ops::remove(ctx, site.as_deref(), &feature).await?)
        }
        Commands::Configure { feature, site } => OperationResult::ConfigureReport(
            fman_ops::configure(ctx, site.as_deref(), &feature).await?,
        ),
        Commands::Unconfigure { feature, site } => OperationResult::ConfigureReport(
            fman_ops::unconfigure(ctx, site.as_deref(), &feature).await?,
        ),
        Commands::List { site } => {
            OperationResult::FeatureList(fman_ops::list_features(ctx, site.as_deref()).await?)
        }
        Commands::Status { feature, site } => {
            OperationResult::Status(fman_ops::feature_status(ctx, site.as_deref(), &feature).await?)
        }
        Commands::History => OperationResult::History(fman_ops::history(ctx).await),
        Commands::Revert { id } => OperationResult::RevertReport(fman_ops::revert(ctx, &id).await?),
        Commands::Preserve { id, remove } => match (id, remove) {
            (_, Some(id)) => {
                fman_ops::remove_preserved(ctx, &id).await?;
                OperationResult::Success(format!("Removed preserved configuration {id}"))
            }
            (Some(id), None) => {
                OperationResult::Configuration(fman_ops::preserve(ctx, &id).await?)
            }
            (None, None) => {
                let current = fman_ops::history(ctx)
                    .await
                    .into_iter()
                    .find(|c| c.current)
                    .map(|c| c.id)
                    .ok_or_else(|| CliError::Setup("no current configuration".to_string()))?;
                OperationResult::Configuration(fman_ops::preserve(ctx, &current).await?)
            }
        },
        Commands::Site { command } => match command {
            SiteCommands::Add { path } => OperationResult::Site(fman_ops::add_site(ctx, &path).await?),
            SiteCommands::Remove { site } => {
                OperationResult::Site(fman_ops::remove_site(ctx, &site).await?)
            }
            SiteCommands::Enable { site } => {
                OperationResult::Site(fman_ops::set_site_enabled(ctx, &site, true).await?)
            }
            SiteCommands::Disable { site } => {
                OperationResult::Site(fman_ops::set_site_enabled(ctx, &site, false).await?)
            }
            SiteCommands::List => OperationResult::SiteList(fman_ops::list_sites(ctx).await?),
        },
    };
    Ok(result)
}

/// Apply CLI configuration overrides (highest precedence)
fn apply_cli_config(config: &mut Config, global: &cli::GlobalArgs) {
    if let Some(color) = global.color {
        config.general.color = color;
    }
    if let Some(dir) = &global.state_dir {
        config.paths.state_path = Some(dir.clone());
    }
}

/// Initialize tracing/logging
fn init_tracing(json_mode: bool, debug: bool, log_dir: &Path) {
    let debug_enabled = std::env::var("RUST_LOG").is_ok() || debug;

    if debug_enabled {
        // Debug: structured JSON logs to a file under the state directory
        let file = std::fs::create_dir_all(log_dir).and_then(|()| {
            let path = log_dir.join(format!(
                "fman-{}.log",
                chrono::Utc::now().format("%Y%m%d-%H%M%S")
            ));
            std::fs::File::create(&path).map(|file| (path, file))
        });
        match file {
            Ok((path, file)) => {
                tracing_subscriber::fmt()
                    .json()
                    .with_writer(file)
                    .with_env_filter(
                        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
                            |_| tracing_subscriber::EnvFilter::new("info,fman=debug,fman_ops=debug"),
                        ),
                    )
                    .init();
                if !json_mode {
                    eprintln!("Debug logging enabled: {}", path.display());
                }
                return;
            }
            Err(e) if !json_mode => eprintln!("Warning: Failed to create log file: {e}"),
            Err(_) => {}
        }
    }

    if json_mode {
        // Keep stdout clean for the JSON document
        tracing_subscriber::fmt()
            .with_writer(std::io::sink)
            .with_env_filter("off")
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .init();
    }
}
