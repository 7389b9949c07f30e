use clap::Parser;
use color_eyre::Result;
use iidx_monitor::config::{default_config_path, AppConfig};
use iidx_monitor::controller::controller_handle::SamplerHandle;
use iidx_monitor::controller::detection::run_detection_loop;
use iidx_monitor::controller::input_source::open_default_source;
use iidx_monitor::controller::{PlayMode, SettingsHandle};
use iidx_monitor::report::run_reporter;
use iidx_monitor::sync::{SyncHandle, SyncStatus};
use std::path::PathBuf;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

// How often the local summary is logged in send mode
const LOCAL_REPORT_INTERVAL_MS: i64 = 5000;

#[derive(Parser, Debug)]
#[command(name = "iidx-monitor", version, about = "Rhythm-game controller monitor")]
struct Args {
    /// Config file, defaults to <config dir>/iidx-monitor/config.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Play mode
    #[arg(long, value_enum)]
    mode: Option<PlayMode>,

    /// Peer host
    #[arg(long)]
    host: Option<String>,

    /// Peer port
    #[arg(long)]
    port: Option<u16>,

    /// Show the peer's controller instead of sampling local devices
    #[arg(long)]
    receive: bool,

    /// Device index for single play
    #[arg(long)]
    sp_device: Option<usize>,

    /// Device index for the 1P side in double play
    #[arg(long)]
    p1_device: Option<usize>,

    /// Device index for the 2P side in double play
    #[arg(long)]
    p2_device: Option<usize>,

    /// Log filter, e.g. "debug" or "iidx_monitor=trace"
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(mode) = self.mode {
            config.play.mode = mode;
        }
        if let Some(host) = &self.host {
            config.sync.host = host.clone();
        }
        if let Some(port) = self.port {
            config.sync.port = port;
        }
        if self.sp_device.is_some() {
            config.play.sp_device = self.sp_device;
        }
        if self.p1_device.is_some() {
            config.play.p1_device = self.p1_device;
        }
        if self.p2_device.is_some() {
            config.play.p2_device = self.p2_device;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup(args.log_level.as_deref())?;

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    info!("Using config {}", config_path.display());
    let mut config = AppConfig::load_or_create(&config_path).await?;
    args.apply(&mut config);
    debug!("Effective config: {:?}", config);

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
        }
        shutdown.cancel();
    });

    if args.receive {
        run_receive(config, cancel).await
    } else {
        run_send(config, cancel).await
    }
}

async fn run_send(config: AppConfig, cancel: CancellationToken) -> Result<()> {
    info!(
        "Starting in send mode ({:?}, sync {})",
        config.play.mode,
        if config.sync.enabled { "on" } else { "off" }
    );

    let settings = SettingsHandle::new(config.play.play_settings());
    let sampler = SamplerHandle::spawn(
        Some(config.sampler.sampler_settings()),
        settings.subscribe(),
        open_default_source,
        cancel.clone(),
    )?;

    let detection = config.sampler.auto_detect.then(|| {
        tokio::spawn(run_detection_loop(
            settings.clone(),
            sampler.devices(),
            config.sampler.detection_interval_ms,
            cancel.clone(),
        ))
    });

    let sync = config.sync.enabled.then(|| {
        let handle =
            SyncHandle::spawn_transmitter(config.sync.clone(), sampler.subscribe(), cancel.clone());
        tokio::spawn(log_sync_status(handle.status(), cancel.clone()));
        handle
    });

    let reporter = tokio::spawn(run_reporter(
        sampler.subscribe(),
        "local",
        LOCAL_REPORT_INTERVAL_MS,
        cancel.clone(),
    ));

    cancel.cancelled().await;

    if let Some(detection) = detection {
        let _ = detection.await;
    }
    if let Some(sync) = sync {
        sync.join().await;
    }
    let _ = reporter.await;
    let _ = tokio::task::spawn_blocking(move || sampler.join()).await;

    info!("Send mode stopped");
    Ok(())
}

async fn run_receive(config: AppConfig, cancel: CancellationToken) -> Result<()> {
    if !config.sync.enabled {
        warn!("Receive mode needs the sync link, but it is disabled in the config");
        return Ok(());
    }
    info!("Starting in receive mode from {}", config.sync.url());

    let sync = SyncHandle::spawn_receiver(config.sync.clone(), cancel.clone());
    let status = tokio::spawn(log_sync_status(sync.status(), cancel.clone()));
    let reporter = tokio::spawn(run_reporter(sync.received(), "remote", 0, cancel.clone()));

    cancel.cancelled().await;

    sync.join().await;
    let _ = status.await;
    let _ = reporter.await;

    info!("Receive mode stopped");
    Ok(())
}

async fn log_sync_status(mut status: watch::Receiver<SyncStatus>, cancel: CancellationToken) {
    let mut last_state = status.borrow().connection_state;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        let current = status.borrow_and_update().clone();
        if current.connection_state != last_state {
            info!(
                "Sync link {:?} (sent {}, received {}, dropped {})",
                current.connection_state,
                current.frames_sent,
                current.frames_received,
                current.frames_dropped
            );
            if let Some(error) = &current.last_error {
                warn!(
                    "Last sync error at {}: {}",
                    error.timestamp.format("%H:%M:%S%.3f"),
                    error.message
                );
            }
            last_state = current.connection_state;
        }
    }
}

fn setup(log_level: Option<&str>) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if let Some(level) = log_level {
        std::env::set_var("RUST_LOG", level)
    } else if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}
