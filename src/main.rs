use std::io::Write;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::signal::unix::SignalKind;
use tokio_util::sync::CancellationToken;

use greenworks_bridge::config;
use greenworks_bridge::error::{ApiError, ApiResult};
use greenworks_bridge::instance::{CloudConnector, Connector};
use greenworks_bridge::server;
use greenworks_bridge::server::appstate::AppState;
use greenworks_bridge::server::http::HttpServer;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: Utf8PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the bridge (default)
    Run,

    /// Log in with an instance's account and list the mowers it exposes
    ListDevices { instance: String },
}

/*
 * Formatter function to output in syslog format. This makes sense when running
 * as a service (where output might go to a log file, or the system journal)
 */
#[allow(clippy::match_same_arms)]
fn syslog_format(
    buf: &mut pretty_env_logger::env_logger::fmt::Formatter,
    record: &log::Record,
) -> std::io::Result<()> {
    writeln!(
        buf,
        "<{}>{}: {}",
        match record.level() {
            log::Level::Error => 3,
            log::Level::Warn => 4,
            log::Level::Info => 6,
            log::Level::Debug => 7,
            log::Level::Trace => 7,
        },
        record.target(),
        record.args()
    )
}

fn init_logging() -> ApiResult<()> {
    /* Try to provide reasonable default filters, when RUST_LOG is not specified */
    const DEFAULT_LOG_FILTERS: &[&str] = &[
        "debug",
        "reqwest=info",
        "hyper_util=info",
        "tower_http::trace::on_request=info",
        "axum::rejection=trace",
    ];

    let log_filters = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTERS.join(","));

    /* Detect if we need syslog or human-readable formatting */
    if std::env::var("SYSTEMD_EXEC_PID").is_ok_and(|pid| pid == std::process::id().to_string()) {
        Ok(pretty_env_logger::env_logger::builder()
            .format(syslog_format)
            .parse_filters(&log_filters)
            .try_init()?)
    } else {
        Ok(pretty_env_logger::formatted_timed_builder()
            .parse_filters(&log_filters)
            .try_init()?)
    }
}

fn install_signal_handlers(cancel: &CancellationToken) -> ApiResult<()> {
    fn shutdown(msg: &str, cancel: &CancellationToken) {
        log::warn!("{msg}");
        let _ = std::io::stderr().flush();
        cancel.cancel();
    }

    let token = cancel.clone();
    tokio::spawn(async move {
        if matches!(signal::ctrl_c().await, Ok(())) {
            shutdown("Ctrl-C pressed, exiting..", &token);
        }
    });

    let token = cancel.clone();
    let mut signal = signal::unix::signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        if matches!(signal.recv().await, Some(())) {
            shutdown("SIGTERM received, exiting..", &token);
        }
    });

    Ok(())
}

async fn list_devices(conf: &config::AppConfig, name: &str) -> ApiResult<()> {
    let inst = conf
        .greenworks
        .get(name)
        .ok_or_else(|| ApiError::InstanceNotFound(name.to_string()))?;

    let connector = CloudConnector::new(inst.base_url()?);
    let api = connector.connect(&inst.credentials(name)?).await?;

    let devices = api.list_devices().await?;
    if devices.is_empty() {
        log::warn!("[{name}] Account has no devices");
    }

    for dev in devices {
        println!(
            "{:30} {:20} {}",
            dev.display_name,
            dev.identity.to_string(),
            if dev.online { "online" } else { "offline" }
        );
    }

    Ok(())
}

async fn serve(conf: config::AppConfig) -> ApiResult<()> {
    if !conf.has_instances() {
        log::warn!("{}", "-".repeat(80));
        log::warn!("No GreenWorks accounts configured in config!");
        log::warn!("The bridge will run, but has no mowers to expose.");
        log::warn!("");
        log::warn!(" ** Please configure at least one entry under 'greenworks:' **");
        log::warn!("{}", "-".repeat(80));
    }

    let cancel = CancellationToken::new();
    install_signal_handlers(&cancel)?;

    let appstate = AppState::from_config(conf, cancel.clone())?;
    appstate.start_all();

    let bconf = &appstate.config().bridge;
    let http = HttpServer::http(
        bconf.ipaddress,
        bconf.http_port,
        server::build_service(appstate.clone()),
    );

    let res = http.run(cancel).await;
    appstate.shutdown().await;
    res
}

async fn run() -> ApiResult<()> {
    init_logging()?;

    let args = Args::parse();

    let conf = config::parse(&args.config)?;
    log::debug!("Configuration loaded successfully");

    match args.command.unwrap_or(Command::Run) {
        Command::Run => serve(conf).await,
        Command::ListDevices { instance } => list_devices(&conf, &instance).await,
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        log::error!("GreenWorks bridge error: {err}");
        log::error!("Fatal error encountered, cannot continue.");
    }
}
