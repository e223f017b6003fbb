// src/main.rs

use axum::serve;
use blacklist_checker::{
    check_ips,
    cli::{Cli, Commands},
    resolve_config_path, run, setup_configuration, summarize_config, AppError,
};
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = ?e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = ?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!(signal = "Ctrl+C", "Received signal. Initiating graceful shutdown...") },
        () = terminate => { info!(signal = "Terminate", "Received signal. Initiating graceful shutdown...") },
    }
}

fn init_tracing(cli: &Cli) {
    let env_filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    if cli.json_logs {
        let json_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true);
        registry.with(json_layer).init();
    } else {
        // stderr keeps stdout clean for the JSON printed by `check` and `config`.
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::Config(format!("Failed to render output: {e}")))?;
    println!("{rendered}");
    Ok(())
}

async fn serve_command(cli: &Cli) -> Result<(), AppError> {
    let (app, config) = run(cli.config.clone(), cli.port).await.map_err(|e| {
        eprintln!("Application setup error: {e:?}");
        e
    })?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| AppError::Config(format!("Invalid server address: {e}")))?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!(server.address = %addr, error = ?e, "Failed to bind to address. Exiting.");
        AppError::from(e)
    })?;
    info!(server.address = %addr, "Server listening");

    info!("Starting server run loop...");
    serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!(error = ?e, "Server run loop encountered an error. Exiting.");
            AppError::from(e)
        })?;

    info!("Server shut down gracefully.");
    Ok(())
}

async fn check_command(cli: &Cli, ips: &[String]) -> Result<(), AppError> {
    let (config, _) = setup_configuration(cli.config.clone())?;
    if config.api_keys.is_empty() {
        warn!("No API keys configured; every IP will be reported as failed");
    }
    let report = check_ips(&config, ips).await?;
    print_json(&report)
}

fn config_command(cli: &Cli, file: Option<std::path::PathBuf>) -> Result<(), AppError> {
    let path = resolve_config_path(file.or_else(|| cli.config.clone()));
    let summary = summarize_config(&path)?;
    print_json(&summary)
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse_args();
    init_tracing(&cli);

    match cli.command() {
        Commands::Serve => serve_command(&cli).await,
        Commands::Check { ips } => check_command(&cli, &ips).await,
        Commands::Config { file } => config_command(&cli, file),
    }
}
