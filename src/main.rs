use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mediahub::adapters;
use mediahub::config::ConfigStore;
use mediahub::core::StreamRegistry;
use mediahub::rtsp;
use mediahub::state::AppState;
use mediahub::web;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

#[derive(Parser, Debug)]
#[command(name = "mediahub")]
#[command(version, about = "A camera/audio streaming hub", long_about = None)]
struct CliArgs {
    /// Path to the TOML config file
    #[arg(short = 'c', long, value_name = "FILE", default_value = "mediahub.toml")]
    config: PathBuf,

    /// Admin HTTP API bind address (overrides config)
    #[arg(long, value_name = "ADDRESS")]
    api_listen: Option<String>,

    /// RTSP server bind address (overrides config)
    #[arg(long, value_name = "ADDRESS")]
    rtsp_listen: Option<String>,

    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose);

    tracing::info!("starting mediahub v{}", env!("CARGO_PKG_VERSION"));

    let config_store = ConfigStore::new(&args.config).await?;
    let mut config = (*config_store.get()).clone();

    if let Some(addr) = args.api_listen {
        config.api.listen = addr;
    }
    if let Some(addr) = args.rtsp_listen {
        config.rtsp.listen = addr;
    }
    config_store.set(config.clone()).await?;

    let registry = Arc::new(StreamRegistry::new());
    adapters::register_all(&registry);

    for (name, source) in &config.streams {
        registry.add_stream(name.clone(), source.urls());
    }
    tracing::info!(count = config.streams.len(), "configured streams loaded");

    let state = Arc::new(AppState {
        config: config_store,
        registry: registry.clone(),
    });

    let credentials = config
        .rtsp
        .username
        .clone()
        .zip(config.rtsp.password.clone());

    let api_addr = config.api.listen.clone();
    let rtsp_addr = config.rtsp.listen.clone();

    let api_task = tokio::spawn(async move {
        let router = web::create_router(state);
        let listener = tokio::net::TcpListener::bind(&api_addr).await?;
        tracing::info!(addr = %api_addr, "admin api listening");
        axum::serve(listener, router).await?;
        Ok::<(), anyhow::Error>(())
    });

    let rtsp_task = tokio::spawn(async move {
        rtsp::listen(&rtsp_addr, registry, credentials)
            .await
            .map_err(anyhow::Error::from)
    });

    tokio::select! {
        res = api_task => { res??; }
        res = rtsp_task => { res??; }
        _ = wait_for_shutdown() => {
            tracing::info!("shutdown signal received");
        }
    }

    Ok(())
}

async fn wait_for_shutdown() {
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

fn init_logging(level: LogLevel, verbose_count: u8) {
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "mediahub=error,tower_http=error",
        LogLevel::Warn => "mediahub=warn,tower_http=warn",
        LogLevel::Info => "mediahub=info,tower_http=info",
        LogLevel::Debug => "mediahub=debug,tower_http=debug",
        LogLevel::Trace => "mediahub=trace,tower_http=debug",
    };

    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {err}");
    }
}
