//! # Radio Link Module
//!
//! Handles the connection to the TNC that puts frames on the air.
//!
//! This module handles:
//! - The transport sink trait the scheduler forwards live telemetry through
//! - Addressing time and telemetry frames (callsigns, PID, radio port)
//! - The AGW TCP connection to the TNC and its background receive task
//! - A null sink for running without a TNC

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::agw::decoder::decode_header;
use crate::agw::encoder::{encode_frame, encode_monitor_toggle, encode_time_payload};
use crate::agw::protocol::{AgwFrame, AGW_HEADER_SIZE};
use crate::config::LinkConfig;
use crate::error::{Result, TelemError};
use crate::telemetry::TelemetryRecord;

/// Destination for live telemetry frames
///
/// Sends are best effort; a failure is reported but the caller carries on.
#[async_trait]
pub trait TransportSink: Send {
    /// Send one frame
    async fn send(&mut self, frame: &AgwFrame) -> Result<()>;
}

/// Who frames come from and go to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameAddressing {
    pub radio_port: u8,
    pub pid: u8,
    pub source_callsign: String,
    pub time_callsign: String,
    pub telemetry_callsign: String,
}

impl FrameAddressing {
    pub fn from_config(config: &LinkConfig) -> Self {
        Self {
            radio_port: config.radio_port,
            pid: config.pid,
            source_callsign: config.source_callsign.clone(),
            time_callsign: config.time_callsign.clone(),
            telemetry_callsign: config.telemetry_callsign.clone(),
        }
    }

    /// Time beacon: 4-byte little-endian Unix time to the time callsign
    pub fn time_frame(&self, now: i64) -> Result<AgwFrame> {
        AgwFrame::unproto(
            self.radio_port,
            self.pid,
            &self.source_callsign,
            &self.time_callsign,
            encode_time_payload(now).to_vec(),
        )
    }

    /// Live telemetry: the encoded record to the telemetry callsign
    pub fn telemetry_frame(&self, record: &TelemetryRecord) -> Result<AgwFrame> {
        AgwFrame::unproto(
            self.radio_port,
            self.pid,
            &self.source_callsign,
            &self.telemetry_callsign,
            record.encode().to_vec(),
        )
    }
}

impl Default for FrameAddressing {
    fn default() -> Self {
        Self::from_config(&LinkConfig::default())
    }
}

/// AGW connection to the TNC
///
/// Owns the write half of the connection (the TCP stream unless built with
/// [`AgwLink::with_writer`]); the read half lives in a background task
/// feeding a bounded frame buffer. Every frame is flushed as soon as it is
/// written so it reaches the TNC before the next sample.
pub struct AgwLink<W = OwnedWriteHalf> {
    writer: W,
    peer: String,
    receiver: Option<JoinHandle<()>>,
}

impl<W> std::fmt::Debug for AgwLink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgwLink")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

impl AgwLink<OwnedWriteHalf> {
    /// Connect to the TNC and start receiving
    ///
    /// # Arguments
    ///
    /// * `config` - `[link]` configuration section
    ///
    /// # Returns
    ///
    /// * `Result<(AgwLink, mpsc::Receiver<AgwFrame>)>` - The link and the
    ///   buffer received frames arrive in
    ///
    /// # Errors
    ///
    /// Returns error if the TNC cannot be reached or refuses the monitor request
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use pacsat_telem::config::LinkConfig;
    /// use pacsat_telem::link::AgwLink;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let (link, mut frames) = AgwLink::connect(&LinkConfig::default()).await?;
    ///     while let Some(frame) = frames.recv().await {
    ///         println!("{} > {}", frame.call_from, frame.call_to);
    ///     }
    ///     Ok(())
    /// }
    /// ```
    pub async fn connect(config: &LinkConfig) -> Result<(Self, mpsc::Receiver<AgwFrame>)> {
        let addr = format!("{}:{}", config.host, config.port);
        debug!("Connecting to TNC at {}", addr);

        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| TelemError::Link(format!("Failed to connect to TNC at {}: {}", addr, e)))?;
        let (read_half, write_half) = stream.into_split();

        let (handle, frames) = spawn_receiver(read_half, config.rx_buffer_frames);
        let mut link = Self {
            writer: write_half,
            peer: addr,
            receiver: Some(handle),
        };

        link.write_raw(&encode_monitor_toggle(config.radio_port)).await?;
        info!("Connected to TNC at {}", link.peer);

        Ok((link, frames))
    }
}

impl<W: AsyncWrite + Unpin + Send> AgwLink<W> {
    /// Send frames over an already open writer (no receive task)
    pub fn with_writer(writer: W, peer: impl Into<String>) -> Self {
        Self {
            writer,
            peer: peer.into(),
            receiver: None,
        }
    }

    /// Address of the TNC
    pub fn peer(&self) -> &str {
        &self.peer
    }

    async fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer
            .write_all(bytes)
            .await
            .map_err(|e| TelemError::Link(format!("Failed to write frame: {}", e)))?;

        self.writer
            .flush()
            .await
            .map_err(|e| TelemError::Link(format!("Failed to flush link: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> TransportSink for AgwLink<W> {
    async fn send(&mut self, frame: &AgwFrame) -> Result<()> {
        self.write_raw(&encode_frame(frame)).await?;
        debug!(
            "Sent frame {} > {} ({} bytes)",
            frame.call_from,
            frame.call_to,
            frame.data.len()
        );
        Ok(())
    }
}

impl<W> Drop for AgwLink<W> {
    fn drop(&mut self) {
        if let Some(handle) = self.receiver.take() {
            handle.abort();
        }
    }
}

/// Sink used when the link is disabled; frames are only logged
#[derive(Debug, Default)]
pub struct NullLink {
    frames_sent: u64,
}

impl NullLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }
}

#[async_trait]
impl TransportSink for NullLink {
    async fn send(&mut self, frame: &AgwFrame) -> Result<()> {
        self.frames_sent += 1;
        debug!("Link disabled, not sending frame to {}", frame.call_to);
        Ok(())
    }
}

/// Spawn the task reading frames from the TNC into a bounded buffer
///
/// When the buffer is full new frames are dropped. The task ends when the
/// connection closes or the stream stops making sense.
pub fn spawn_receiver<R>(reader: R, capacity: usize) -> (JoinHandle<()>, mpsc::Receiver<AgwFrame>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = tokio::spawn(receive_loop(reader, tx));
    (handle, rx)
}

async fn receive_loop<R: AsyncRead + Unpin>(mut reader: R, tx: mpsc::Sender<AgwFrame>) {
    let mut header_buf = [0u8; AGW_HEADER_SIZE];

    loop {
        if let Err(e) = reader.read_exact(&mut header_buf).await {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                info!("TNC closed the connection");
            } else {
                warn!("Link receive failed: {}", e);
            }
            return;
        }

        let header = match decode_header(&header_buf) {
            Ok(header) => header,
            Err(e) => {
                warn!("Stopping link receiver: {}", e);
                return;
            }
        };

        let mut data = vec![0u8; header.data_len];
        if let Err(e) = reader.read_exact(&mut data).await {
            warn!("Link receive failed mid-frame: {}", e);
            return;
        }

        match tx.try_send(header.into_frame(data)) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => {
                warn!("Receive buffer full, dropping frame from {}", frame.call_from);
            }
            Err(TrySendError::Closed(_)) => return,
        }
    }
}
