//! Controller Handle - lifecycle of the sampling thread
//!
//! The sampler runs on its own OS thread with a current-thread tokio runtime because
//! the platform input context is not `Send`. Everything else talks to it through
//! channels:
//!
//! ```text
//!                 PlaySettings (watch) ──┐
//!           SamplerCommand (mpsc) ───────┤
//!                                        ▼
//! InputSource ──► Coordinator tick ──► Option<MonitorSnapshot> (watch)
//!             └─► Vec<Device> (watch, for auto-detection)
//! ```

use chrono::Local;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::coordinator::{Coordinator, MonitorSnapshot, PlaySettings, ResetScope};
use super::input_source::{Device, InputSource};
use super::sampler::SamplerSettings;

/// Requests handled at the start of the next tick
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SamplerCommand {
    Reset(ResetScope),
}

/// Errors raised while starting or talking to the sampler
#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    /// The sampling thread or its runtime could not be created
    #[error("Failed to initialize sampler: {0}")]
    InitializationError(String),

    /// The sampler is gone or its command queue is full
    #[error("Failed to send sampler command: {0}")]
    CommandError(String),
}

/// Handle to the running sampler
///
/// Owns the receiving ends of the sampler's channels and the join handle of the
/// sampling thread. Receivers can be cloned out as often as needed; every consumer
/// sees the latest value only.
///
/// Dropping the handle does not stop sampling; cancel the token passed to
/// [`SamplerHandle::spawn`] for that.
///
/// # Performance Impact
///
/// Snapshots are published only when they differ from the last one, so an idle
/// controller wakes watchers once and then stays quiet. The snapshot itself is an
/// `Arc`, and consumers never copy the statistics buffers.
pub struct SamplerHandle {
    snapshots: watch::Receiver<Option<MonitorSnapshot>>,
    devices: watch::Receiver<Vec<Device>>,
    commands: mpsc::Sender<SamplerCommand>,
    thread: Option<JoinHandle<()>>,
}

impl SamplerHandle {
    /// Starts the sampling thread.
    ///
    /// `open_source` runs on the sampling thread, so sources that must stay on one
    /// thread can be created there.
    ///
    /// # Arguments
    ///
    /// * `settings` - Optional sampler settings; uses defaults if None
    /// * `play` - Play mode and device assignments, applied at the start of each tick
    /// * `open_source` - Creates the input source on the sampling thread
    /// * `cancel` - Stops the sampling loop
    ///
    /// # Errors
    ///
    /// * [`SamplerError::InitializationError`] - The OS refused to create the thread
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use iidx_monitor::controller::controller_handle::SamplerHandle;
    /// use iidx_monitor::controller::input_source::open_default_source;
    /// use iidx_monitor::controller::{PlaySettings, SettingsHandle};
    /// use tokio_util::sync::CancellationToken;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let settings = SettingsHandle::new(PlaySettings {
    ///     sp_device: Some(0),
    ///     ..Default::default()
    /// });
    /// let cancel = CancellationToken::new();
    ///
    /// let sampler = SamplerHandle::spawn(None, settings.subscribe(), open_default_source, cancel.clone())?;
    ///
    /// let mut snapshots = sampler.subscribe();
    /// snapshots.changed().await?;
    /// println!("{:?}", snapshots.borrow().as_ref().map(|s| s.mode()));
    ///
    /// cancel.cancel();
    /// sampler.join();
    /// # Ok(())
    /// # }
    /// ```
    pub fn spawn<F>(
        settings: Option<SamplerSettings>,
        play: watch::Receiver<PlaySettings>,
        open_source: F,
        cancel: CancellationToken,
    ) -> Result<Self, SamplerError>
    where
        F: FnOnce() -> Box<dyn InputSource> + Send + 'static,
    {
        let settings = settings.unwrap_or_default();
        info!("Spawning controller sampler with settings: {:?}", settings);

        let (snapshot_sender, snapshots) = watch::channel(None);
        let (device_sender, devices) = watch::channel(Vec::new());
        let (commands, command_receiver) = mpsc::channel(16);
        debug!("Created sampler channels");

        let thread = std::thread::Builder::new()
            .name("controller-sampler".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!("Failed to build sampler runtime: {}", e);
                        return;
                    }
                };

                let source = open_source();
                info!("Sampler using input source '{}'", source.name());

                runtime.block_on(run_sampler_loop(SamplerLoop {
                    source,
                    settings,
                    play,
                    commands: command_receiver,
                    snapshots: snapshot_sender,
                    devices: device_sender,
                    cancel,
                }));
                info!("Controller sampler thread finished");
            })
            .map_err(|e| SamplerError::InitializationError(e.to_string()))?;

        info!("Controller sampler successfully started");
        Ok(Self {
            snapshots,
            devices,
            commands,
            thread: Some(thread),
        })
    }

    /// Latest published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Option<MonitorSnapshot>> {
        self.snapshots.clone()
    }

    /// Devices seen on the most recent tick
    pub fn devices(&self) -> watch::Receiver<Vec<Device>> {
        self.devices.clone()
    }

    pub fn reset(&self, scope: ResetScope) -> Result<(), SamplerError> {
        self.commands
            .try_send(SamplerCommand::Reset(scope))
            .map_err(|e| SamplerError::CommandError(e.to_string()))
    }

    /// Blocks until the sampling thread exits.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Controller sampler thread panicked");
            }
        }
    }
}

struct SamplerLoop {
    source: Box<dyn InputSource>,
    settings: SamplerSettings,
    play: watch::Receiver<PlaySettings>,
    commands: mpsc::Receiver<SamplerCommand>,
    snapshots: watch::Sender<Option<MonitorSnapshot>>,
    devices: watch::Sender<Vec<Device>>,
    cancel: CancellationToken,
}

async fn run_sampler_loop(mut state: SamplerLoop) {
    info!(
        "Starting sampler loop with {}ms interval",
        state.settings.tick_period_ms
    );

    let initial = state.play.borrow_and_update().clone();
    let mut coordinator = Coordinator::new(initial, state.settings.clone());

    let mut interval_timer = tokio::time::interval(tokio::time::Duration::from_millis(
        u64::from(state.settings.tick_period_ms.max(1)),
    ));
    interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    // Stats for performance monitoring
    let mut cycles: u64 = 0;
    let mut emitted: u64 = 0;
    let mut last_stats_time = Local::now();
    let stats_interval = chrono::Duration::seconds(30);

    loop {
        tokio::select! {
            _ = state.cancel.cancelled() => {
                info!("Sampler loop cancelled");
                break;
            }
            _ = interval_timer.tick() => {}
        }

        loop {
            match state.commands.try_recv() {
                Ok(SamplerCommand::Reset(scope)) => coordinator.reset(scope),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    debug!("Sampler command channel closed");
                    break;
                }
            }
        }

        match state.play.has_changed() {
            Ok(true) => {
                let play = state.play.borrow_and_update().clone();
                coordinator.apply_settings(&play);
            }
            Ok(false) => {}
            Err(_) => {
                warn!("Play settings channel closed, keeping current settings");
            }
        }

        let devices = state.source.devices();
        let now = Local::now().timestamp_millis();
        let snapshot = coordinator.tick(&devices, now);

        state.devices.send_if_modified(|current| {
            if *current != devices {
                *current = devices;
                true
            } else {
                false
            }
        });

        if snapshot.is_some() {
            emitted += 1;
        }
        state.snapshots.send_if_modified(|current| {
            if current.is_none() && snapshot.is_none() {
                false
            } else {
                *current = snapshot;
                true
            }
        });

        cycles += 1;

        // Log stats periodically
        let stats_now = Local::now();
        if stats_now - last_stats_time > stats_interval {
            let elapsed_seconds = (stats_now - last_stats_time).num_seconds().max(1);
            info!(
                "Sampler stats: {} cycles, {} snapshots in {} seconds ({:.2} cycles/sec)",
                cycles,
                emitted,
                elapsed_seconds,
                cycles as f64 / elapsed_seconds as f64
            );
            cycles = 0;
            emitted = 0;
            last_stats_time = stats_now;
        }
    }
}
