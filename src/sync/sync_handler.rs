//! Sync link - WebSocket connection to the remote peer
//!
//! The link is a small state machine:
//!
//! ```text
//! Disconnected ──connect──► Connected ──close/error──► Backoff ──delay──► Disconnected
//!       │                                                 ▲
//!       └──────────────────connect failed─────────────────┘
//! ```
//!
//! A transmitting link sends the sampler's snapshots when they changed meaningfully.
//! A receiving link decodes every frame and publishes it as-is.

use chrono::{DateTime, Local};
use futures_util::{SinkExt, StreamExt};
use statum::{machine, state};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::change_detector::ChangeDetector;
use super::config::SyncConfig;
use super::message::{decode, encode};
use crate::controller::MonitorSnapshot;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

/// Last error seen on the link
#[derive(Clone, Debug, PartialEq)]
pub struct SyncErrorRecord {
    pub message: String,
    pub timestamp: DateTime<Local>,
}

#[derive(Clone, Debug, Default)]
pub struct SyncStatus {
    pub connection_state: ConnectionState,
    pub last_error: Option<SyncErrorRecord>,
    pub frames_sent: usize,
    pub frames_received: usize,
    pub frames_dropped: usize,
    pub last_activity: Option<DateTime<Local>>,
}

// Sync errors
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Failed to encode snapshot: {0}")]
    Encode(String),

    #[error("Failed to decode frame: {0}")]
    Decode(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

#[state]
#[derive(Debug, Clone)]
pub enum LinkState {
    Disconnected,
    Connected,
    Backoff,
}

#[machine]
#[derive(Debug)]
pub struct SyncLink<S: LinkState> {
    config: SyncConfig,
    status: watch::Sender<SyncStatus>,
}

/// What a link does while connected
pub enum LinkRole {
    Transmit {
        snapshots: watch::Receiver<Option<MonitorSnapshot>>,
        detector: ChangeDetector,
    },
    Receive {
        received: watch::Sender<Option<MonitorSnapshot>>,
    },
}

pub enum ConnectOutcome {
    Connected(SyncLink<Connected>, Box<WsStream>),
    Failed(SyncLink<Backoff>),
    Cancelled,
}

pub enum LinkExit {
    Closed(SyncLink<Backoff>),
    Finished,
}

// Implementation of methods available in all states
impl<S: LinkState> SyncLink<S> {
    fn set_connection_state(&self, state: ConnectionState) {
        self.status.send_modify(|status| status.connection_state = state);
    }

    fn record_error(&self, error: &SyncError) {
        let record = SyncErrorRecord {
            message: error.to_string(),
            timestamp: Local::now(),
        };
        self.status.send_modify(|status| status.last_error = Some(record));
    }
}

// Implementation for Disconnected state
impl SyncLink<Disconnected> {
    pub fn create(config: SyncConfig, status: watch::Sender<SyncStatus>) -> Self {
        debug!("Creating sync link for {}", config.url());
        Self::new(config, status)
    }

    pub async fn connect(self, cancel: &CancellationToken) -> ConnectOutcome {
        let url = self.config.url();
        info!("Connecting sync link to {}", url);
        self.set_connection_state(ConnectionState::Connecting);

        let attempt = tokio::select! {
            _ = cancel.cancelled() => return ConnectOutcome::Cancelled,
            attempt = connect_async(url.as_str()) => attempt,
        };

        match attempt {
            Ok((stream, _response)) => {
                info!("Sync link connected to {}", url);
                self.set_connection_state(ConnectionState::Connected);
                ConnectOutcome::Connected(self.transition(), Box::new(stream))
            }
            Err(e) => {
                let error = SyncError::Connection(e.to_string());
                warn!("Sync link to {} failed: {}", url, error);
                self.record_error(&error);
                self.set_connection_state(ConnectionState::Failed);
                ConnectOutcome::Failed(self.transition())
            }
        }
    }
}

// Implementation for Connected state
impl SyncLink<Connected> {
    pub async fn run(
        self,
        stream: Box<WsStream>,
        role: &mut LinkRole,
        cancel: &CancellationToken,
    ) -> LinkExit {
        match role {
            LinkRole::Transmit {
                snapshots,
                detector,
            } => self.transmit(stream, snapshots, detector, cancel).await,
            LinkRole::Receive { received } => self.receive(stream, received, cancel).await,
        }
    }

    async fn transmit(
        self,
        stream: Box<WsStream>,
        snapshots: &mut watch::Receiver<Option<MonitorSnapshot>>,
        detector: &mut ChangeDetector,
        cancel: &CancellationToken,
    ) -> LinkExit {
        let (mut sink, mut incoming) = stream.split();
        let (frames, mut frame_receiver) = mpsc::channel::<Message>(self.config.frame_queue.max(1));

        let mut writer: JoinHandle<Result<(), String>> = tokio::spawn(async move {
            while let Some(frame) = frame_receiver.recv().await {
                sink.send(frame).await.map_err(|e| e.to_string())?;
            }
            let _ = sink.close().await;
            Ok(())
        });

        // a fresh connection always starts with the current state
        detector.reset();
        let current = snapshots.borrow_and_update().clone();
        if let Some(snapshot) = current {
            if let Err(error) = self.offer(&frames, detector, &snapshot) {
                return self.close_with(error, writer).await;
            }
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Sync transmitter cancelled");
                    drop(frames);
                    let _ = writer.await;
                    return LinkExit::Finished;
                }
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        info!("Snapshot source closed, stopping transmitter");
                        drop(frames);
                        let _ = writer.await;
                        return LinkExit::Finished;
                    }
                    let current = snapshots.borrow_and_update().clone();
                    if let Some(snapshot) = current {
                        if let Err(error) = self.offer(&frames, detector, &snapshot) {
                            return self.close_with(error, writer).await;
                        }
                    }
                }
                written = &mut writer => {
                    let reason = match written {
                        Ok(Ok(())) => "writer finished".to_string(),
                        Ok(Err(e)) => e,
                        Err(e) => e.to_string(),
                    };
                    let error = SyncError::Connection(reason);
                    warn!("Sync link write failed: {}", error);
                    self.record_error(&error);
                    return self.into_backoff();
                }
                frame = incoming.next() => {
                    match frame {
                        Some(Ok(Message::Close(reason))) => {
                            info!("Peer closed sync link: {:?}", reason);
                            writer.abort();
                            return self.into_backoff();
                        }
                        None => {
                            info!("Sync link stream ended");
                            writer.abort();
                            return self.into_backoff();
                        }
                        Some(Err(e)) => {
                            return self.close_with(SyncError::Connection(e.to_string()), writer).await;
                        }
                        Some(Ok(other)) => debug!("Ignoring inbound frame on transmitter: {:?}", other),
                    }
                }
            }
        }
    }

    // Queue a frame if the snapshot changed since the last one sent
    fn offer(
        &self,
        frames: &mpsc::Sender<Message>,
        detector: &mut ChangeDetector,
        snapshot: &MonitorSnapshot,
    ) -> Result<(), SyncError> {
        if !detector.should_send(snapshot) {
            return Ok(());
        }

        let text = match encode(snapshot) {
            Ok(text) => text,
            Err(error) => {
                error!("{}", error);
                self.record_error(&error);
                return Ok(());
            }
        };

        match frames.try_send(Message::Text(text)) {
            Ok(()) => {
                detector.mark_sent(snapshot);
                self.status.send_modify(|status| {
                    status.frames_sent += 1;
                    status.last_activity = Some(Local::now());
                });
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("Sync frame queue full, dropping frame");
                self.status.send_modify(|status| status.frames_dropped += 1);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(SyncError::Connection("socket writer closed".to_string()))
            }
        }
    }

    async fn receive(
        self,
        mut stream: Box<WsStream>,
        received: &watch::Sender<Option<MonitorSnapshot>>,
        cancel: &CancellationToken,
    ) -> LinkExit {
        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Sync receiver cancelled");
                    let _ = WsStream::close(&mut *stream, None).await;
                    return LinkExit::Finished;
                }
                frame = stream.next() => frame,
            };

            let text = match frame {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(e) => {
                        self.reject(SyncError::Decode(e.to_string()));
                        continue;
                    }
                },
                Some(Ok(Message::Close(reason))) => {
                    info!("Peer closed sync link: {:?}", reason);
                    return self.into_backoff();
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    let error = SyncError::Connection(e.to_string());
                    warn!("Sync link read failed: {}", error);
                    self.record_error(&error);
                    return self.into_backoff();
                }
                None => {
                    info!("Sync link stream ended");
                    return self.into_backoff();
                }
            };

            match decode(&text) {
                Ok(snapshot) => {
                    debug!("Received {:?} frame", snapshot.mode());
                    received.send_replace(Some(snapshot));
                    self.status.send_modify(|status| {
                        status.frames_received += 1;
                        status.last_activity = Some(Local::now());
                    });
                }
                Err(error) => self.reject(error),
            }
        }
    }

    // Malformed frames are recorded; the last good snapshot stays
    fn reject(&self, error: SyncError) {
        warn!("Dropping frame: {}", error);
        self.record_error(&error);
    }

    async fn close_with(
        self,
        error: SyncError,
        writer: JoinHandle<Result<(), String>>,
    ) -> LinkExit {
        warn!("Sync link closing: {}", error);
        self.record_error(&error);
        writer.abort();
        self.into_backoff()
    }

    fn into_backoff(self) -> LinkExit {
        self.set_connection_state(ConnectionState::Reconnecting);
        LinkExit::Closed(self.transition())
    }
}

// Implementation for Backoff state
impl SyncLink<Backoff> {
    /// Waits out the reconnect delay; `None` when cancelled meanwhile.
    pub async fn wait(self, cancel: &CancellationToken) -> Option<SyncLink<Disconnected>> {
        let delay = tokio::time::Duration::from_millis(self.config.reconnect_delay_ms);
        debug!("Reconnecting sync link in {:?}", delay);

        tokio::select! {
            _ = cancel.cancelled() => None,
            _ = tokio::time::sleep(delay) => Some(self.transition()),
        }
    }
}

/// Handle to a running sync link
pub struct SyncHandle {
    status: watch::Receiver<SyncStatus>,
    received: watch::Receiver<Option<MonitorSnapshot>>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Mirrors local snapshots to the peer.
    pub fn spawn_transmitter(
        config: SyncConfig,
        snapshots: watch::Receiver<Option<MonitorSnapshot>>,
        cancel: CancellationToken,
    ) -> Self {
        let role = LinkRole::Transmit {
            snapshots,
            detector: ChangeDetector::new(),
        };
        let (_, received) = watch::channel(None);
        Self::spawn(config, role, received, cancel)
    }

    /// Publishes every snapshot the peer sends.
    pub fn spawn_receiver(config: SyncConfig, cancel: CancellationToken) -> Self {
        let (sender, received) = watch::channel(None);
        let role = LinkRole::Receive { received: sender };
        Self::spawn(config, role, received, cancel)
    }

    fn spawn(
        config: SyncConfig,
        role: LinkRole,
        received: watch::Receiver<Option<MonitorSnapshot>>,
        cancel: CancellationToken,
    ) -> Self {
        info!("Spawning sync link task for {}", config.url());
        let (status_sender, status) = watch::channel(SyncStatus::default());

        let task = tokio::spawn(async move {
            run_link(config, status_sender, role, cancel).await;
            info!("Sync link task finished");
        });

        Self {
            status,
            received,
            task,
        }
    }

    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    /// Last snapshot decoded from the peer
    pub fn received(&self) -> watch::Receiver<Option<MonitorSnapshot>> {
        self.received.clone()
    }

    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!("Sync link task failed: {}", e);
        }
    }
}

async fn run_link(
    config: SyncConfig,
    status: watch::Sender<SyncStatus>,
    mut role: LinkRole,
    cancel: CancellationToken,
) {
    let mut link = SyncLink::create(config, status.clone());

    loop {
        let backoff = match link.connect(&cancel).await {
            ConnectOutcome::Connected(connected, stream) => {
                match connected.run(stream, &mut role, &cancel).await {
                    LinkExit::Closed(backoff) => backoff,
                    LinkExit::Finished => break,
                }
            }
            ConnectOutcome::Failed(backoff) => backoff,
            ConnectOutcome::Cancelled => break,
        };

        match backoff.wait(&cancel).await {
            Some(next) => link = next,
            None => break,
        }
    }

    status.send_modify(|status| status.connection_state = ConnectionState::Disconnected);
}
