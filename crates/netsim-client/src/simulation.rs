//! Client-side walk through the seven OSI layers.
//!
//! The relay only forwards what this module emits: a `layer-update` per
//! stage, then `transmission-complete` once the simulated transfer is done.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use netsim_protocol::{
    ClientMessage, LayerPhase, LayerProgress, Payload, TransmissionData, TransportProtocol,
};
pub use netsim_protocol::limits::{MAX_MEDIA_BYTES, MAX_MESSAGE_BYTES, MAX_TEXT_CHARS};
use rand::Rng;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsiLayer {
    pub number: u8,
    pub name: &'static str,
    pub role: &'static str,
}

/// Layers in encapsulation order, Application first
pub const LAYERS: [OsiLayer; 7] = [
    OsiLayer { number: 7, name: "Application", role: "generates the data" },
    OsiLayer { number: 6, name: "Presentation", role: "encoding, compression and encryption" },
    OsiLayer { number: 5, name: "Session", role: "dialogue control (SYN/ACK/FIN)" },
    OsiLayer { number: 4, name: "Transport", role: "TCP/UDP segmentation and checksum" },
    OsiLayer { number: 3, name: "Network", role: "IP addressing and TTL" },
    OsiLayer { number: 2, name: "Data Link", role: "MAC framing and CRC" },
    OsiLayer { number: 1, name: "Physical", role: "bits on a noisy medium" },
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SimulationError {
    #[error("Text message is empty")]
    EmptyText,

    #[error("Text message has {0} characters (maximum {max})", max = MAX_TEXT_CHARS)]
    TextTooLong(usize),

    #[error("File is {0} bytes (maximum {max})", max = MAX_MEDIA_BYTES)]
    MediaTooLarge(u64),

    #[error("Encoded event is {size} bytes, the relay accepts at most {limit}")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("Transfer failed after {0} attempts")]
    RetriesExhausted(u32),

    #[error("Event channel closed")]
    ChannelClosed,
}

#[derive(Debug, Clone, Copy)]
pub struct Timings {
    /// Time spent in each layer
    pub stage: Duration,
    /// Time on the wire for one attempt
    pub transfer: Duration,
    /// Pause before a TCP retry
    pub retry_delay: Duration,
    /// Chance of a simulated transport error per attempt
    pub error_rate: f64,
    /// Give up after this many TCP attempts. `None` retries until success.
    pub max_attempts: Option<u32>,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            stage: Duration::from_millis(600),
            transfer: Duration::from_secs(2),
            retry_delay: Duration::from_secs(1),
            error_rate: 0.2,
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOutcome {
    pub attempts: u32,
    /// A UDP transfer hit an error and was delivered anyway
    pub corrupted: bool,
}

/// Progress after finishing `step` (zero based) of the seven stages
pub fn progress_for(step: usize) -> f64 {
    (step + 1) as f64 / LAYERS.len() as f64 * 100.0
}

pub fn text_payload(text: &str) -> Result<Payload, SimulationError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(SimulationError::EmptyText);
    }

    let chars = text.chars().count();
    if chars > MAX_TEXT_CHARS {
        return Err(SimulationError::TextTooLong(chars));
    }

    Ok(Payload::Text {
        text: text.to_string(),
    })
}

pub fn check_media_size(size: u64) -> Result<(), SimulationError> {
    if size > MAX_MEDIA_BYTES {
        return Err(SimulationError::MediaTooLarge(size));
    }
    Ok(())
}

pub fn media_payload(name: &str, media_type: &str, bytes: &[u8]) -> Result<Payload, SimulationError> {
    let size = bytes.len() as u64;
    check_media_size(size)?;

    Ok(Payload::Media {
        name: name.to_string(),
        media_type: media_type.to_string(),
        size,
        data: STANDARD.encode(bytes),
    })
}

/// Best-effort MIME type from the file extension
pub fn media_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// One-line summary of a received payload. Media payloads are decoded to
/// check the advertised size.
pub fn describe_payload(payload: &Payload) -> String {
    match payload {
        Payload::Text { text } => {
            let preview: String = text.chars().take(60).collect();
            if preview.len() < text.len() {
                format!("text ({} chars): {}...", text.chars().count(), preview)
            } else {
                format!("text: {}", preview)
            }
        }
        Payload::Media {
            name,
            media_type,
            size,
            data,
        } => match STANDARD.decode(data) {
            Ok(bytes) if bytes.len() as u64 == *size => {
                format!("{} ({}, {} bytes)", name, media_type, size)
            }
            Ok(bytes) => format!(
                "{} ({}, {} bytes, expected {})",
                name,
                media_type,
                bytes.len(),
                size
            ),
            Err(_) => format!("{} ({}, undecodable data)", name, media_type),
        },
    }
}

pub struct Simulator<R> {
    computer: String,
    timings: Timings,
    rng: R,
    outbox: mpsc::Sender<ClientMessage>,
    frame_limit: usize,
}

impl<R: Rng> Simulator<R> {
    pub fn new(computer: &str, timings: Timings, rng: R, outbox: mpsc::Sender<ClientMessage>) -> Self {
        Self {
            computer: computer.to_string(),
            timings,
            rng,
            outbox,
            frame_limit: MAX_MESSAGE_BYTES,
        }
    }

    /// Refuse to start transmissions whose encoded event exceeds `limit`
    pub fn with_frame_limit(mut self, limit: usize) -> Self {
        self.frame_limit = limit;
        self
    }

    /// Announce a transmission, walk it down the stack and put it on the wire
    pub async fn transmit(
        &mut self,
        data: TransmissionData,
        target: &str,
    ) -> Result<TransferOutcome, SimulationError> {
        tracing::info!(
            "Starting {:?} transmission to {} ({:?})",
            data.protocol,
            target,
            data.payload.kind()
        );

        let transmission = serde_json::to_value(&data).unwrap_or(serde_json::Value::Null);
        let protocol = data.protocol;

        let start = ClientMessage::StartTransmission {
            transmission_data: data,
            target_computer: target.to_string(),
        };
        let size = serde_json::to_string(&start).map_or(0, |frame| frame.len());
        if size > self.frame_limit {
            return Err(SimulationError::FrameTooLarge {
                size,
                limit: self.frame_limit,
            });
        }

        self.emit(start).await?;

        self.encapsulate().await?;
        let outcome = self.transfer(protocol).await?;

        self.emit(ClientMessage::TransmissionComplete { transmission })
            .await?;

        Ok(outcome)
    }

    /// Layers 7 to 1
    pub async fn encapsulate(&mut self) -> Result<(), SimulationError> {
        self.walk(LayerPhase::Encapsulation).await?;
        tracing::info!("Encapsulation complete, transmitting");
        Ok(())
    }

    /// Layers 1 to 7
    pub async fn decapsulate(&mut self) -> Result<(), SimulationError> {
        self.walk(LayerPhase::Decapsulation).await?;
        tracing::info!("Decapsulation complete, data received");
        Ok(())
    }

    async fn walk(&mut self, phase: LayerPhase) -> Result<(), SimulationError> {
        let last = LAYERS.len() - 1;

        for step in 0..LAYERS.len() {
            let layer = match phase {
                LayerPhase::Encapsulation => &LAYERS[step],
                LayerPhase::Decapsulation => &LAYERS[last - step],
            };

            self.emit_progress(step, progress_for(step), phase).await?;
            tokio::time::sleep(self.timings.stage).await;

            tracing::debug!("Layer {}: {} - {}", layer.number, layer.name, layer.role);
        }

        // Closing update so the peer's bar always lands on 100
        self.emit_progress(last, 100.0, phase).await
    }

    /// Simulated time on the wire. TCP retries on error; UDP reports it and
    /// carries on.
    pub async fn transfer(
        &mut self,
        protocol: TransportProtocol,
    ) -> Result<TransferOutcome, SimulationError> {
        let error_rate = self.timings.error_rate.clamp(0.0, 1.0);
        let mut attempts = 0;

        loop {
            attempts += 1;
            tokio::time::sleep(self.timings.transfer).await;

            let failed = self.rng.gen_bool(error_rate);
            if !failed {
                tracing::info!("Transfer completed on attempt {}", attempts);
                return Ok(TransferOutcome {
                    attempts,
                    corrupted: false,
                });
            }

            match protocol {
                TransportProtocol::Udp => {
                    tracing::warn!("Transport error (UDP, no retry): data may be corrupted");
                    return Ok(TransferOutcome {
                        attempts,
                        corrupted: true,
                    });
                }
                TransportProtocol::Tcp => {
                    if self.timings.max_attempts.is_some_and(|max| attempts >= max) {
                        let err = SimulationError::RetriesExhausted(attempts);
                        tracing::error!("{}", err);
                        self.emit(ClientMessage::TransmissionError {
                            error: err.to_string(),
                        })
                        .await?;
                        return Err(err);
                    }

                    tracing::warn!("Transport error on attempt {}, retrying", attempts);
                    tokio::time::sleep(self.timings.retry_delay).await;
                }
            }
        }
    }

    async fn emit_progress(
        &self,
        layer: usize,
        progress: f64,
        phase: LayerPhase,
    ) -> Result<(), SimulationError> {
        self.emit(ClientMessage::LayerUpdate(LayerProgress {
            layer: layer as i64,
            progress,
            computer: self.computer.clone(),
            phase,
        }))
        .await
    }

    async fn emit(&self, message: ClientMessage) -> Result<(), SimulationError> {
        self.outbox
            .send(message)
            .await
            .map_err(|_| SimulationError::ChannelClosed)
    }
}
