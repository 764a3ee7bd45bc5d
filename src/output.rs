//! cpal-backed consumer: the audio callback drains decoded frames from the
//! delivery channel and plays them on an output device.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use log::{debug, error, info, warn};

use crate::decoder::FrameReceiver;
use crate::error::OutputError;
use crate::models::StreamInfo;

/// Highest channel count the player will open a device with
pub const MAX_OUTPUT_CHANNELS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillStatus {
    Playing,
    /// Channel closed and every sample has been written
    Finished,
}

/// Copies interleaved frame data into output buffers of arbitrary size.
///
/// Never blocks: an empty channel yields silence for the rest of the buffer.
pub struct FrameFeeder {
    frames: FrameReceiver,
    pending: Vec<f32>,
    pos: usize,
    finished: bool,
    underruns: u64,
}

impl FrameFeeder {
    pub fn new(frames: FrameReceiver) -> Self {
        Self {
            frames,
            pending: Vec::new(),
            pos: 0,
            finished: false,
            underruns: 0,
        }
    }

    /// Fill `out` with interleaved samples. Returns the number of values
    /// written from decoded frames and whether playback is over.
    pub fn fill(&mut self, out: &mut [f32]) -> (usize, FillStatus) {
        let mut written = 0;

        while written < out.len() {
            if self.pos < self.pending.len() {
                let n = (self.pending.len() - self.pos).min(out.len() - written);
                out[written..written + n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
                self.pos += n;
                written += n;
                continue;
            }

            if self.finished {
                break;
            }

            match self.frames.try_recv() {
                Ok(frame) => {
                    self.pending = frame.to_interleaved();
                    self.pos = 0;
                }
                Err(TryRecvError::Empty) => {
                    self.underruns += 1;
                    break;
                }
                Err(TryRecvError::Disconnected) => {
                    self.finished = true;
                }
            }
        }

        out[written..].fill(0.0);

        let status = if self.finished && self.pos >= self.pending.len() {
            FillStatus::Finished
        } else {
            FillStatus::Playing
        };
        (written, status)
    }

    pub fn underruns(&self) -> u64 {
        self.underruns
    }
}

/// Plays a decoder's frames on a cpal output device
pub struct FramePlayer {
    stream: Stream,
    done: Receiver<()>,
    values_played: Arc<AtomicU64>,
    channels: usize,
}

impl FramePlayer {
    /// Build an output stream matching `info`. `preferred_device` is
    /// matched by name; `None` selects the host default.
    pub fn new(
        frames: FrameReceiver,
        info: &StreamInfo,
        preferred_device: Option<&str>,
    ) -> Result<Self, OutputError> {
        if info.channels == 0 || info.channels > MAX_OUTPUT_CHANNELS {
            return Err(OutputError::UnsupportedChannels { channels: info.channels });
        }

        let device = select_device(preferred_device)?;
        info!(
            "Using audio output device: {}",
            device.name().unwrap_or_else(|_| "unknown".to_string())
        );

        let config = StreamConfig {
            channels: info.channels as u16,
            sample_rate: SampleRate(info.sample_rate as u32),
            buffer_size: cpal::BufferSize::Default,
        };

        let (done_tx, done) = bounded::<()>(1);
        let values_played = Arc::new(AtomicU64::new(0));
        let values_played_cb = Arc::clone(&values_played);
        let mut feeder = FrameFeeder::new(frames);
        let mut done_tx: Option<Sender<()>> = Some(done_tx);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let (written, status) = feeder.fill(data);
                    values_played_cb.fetch_add(written as u64, Ordering::Relaxed);
                    if status == FillStatus::Finished {
                        if let Some(tx) = done_tx.take() {
                            let _ = tx.try_send(());
                        }
                    }
                },
                move |err| {
                    error!("Audio output stream error: {}", err);
                },
                None,
            )
            .map_err(|e| OutputError::InitializationFailed(e.to_string()))?;

        debug!(
            "Output stream built: {} channels at {} Hz",
            config.channels, config.sample_rate.0
        );

        Ok(Self {
            stream,
            done,
            values_played,
            channels: info.channels,
        })
    }

    pub fn play(&self) -> Result<(), OutputError> {
        self.stream
            .play()
            .map_err(|e| OutputError::StreamError(e.to_string()))
    }

    /// Block until the delivery channel closed and everything was played
    pub fn wait(&self) {
        if self.done.recv().is_err() {
            warn!("Output stream ended before playback finished");
        }
    }

    /// Samples per channel handed to the device so far
    pub fn samples_played(&self) -> u64 {
        self.values_played.load(Ordering::Relaxed) / self.channels as u64
    }
}

/// Names of the host's output devices
pub fn list_output_devices() -> Result<Vec<String>, OutputError> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| OutputError::InitializationFailed(format!("Failed to enumerate devices: {}", e)))?;
    Ok(devices.filter_map(|device| device.name().ok()).collect())
}

fn select_device(preferred: Option<&str>) -> Result<Device, OutputError> {
    let host = cpal::default_host();

    if let Some(name) = preferred {
        let mut devices = host
            .output_devices()
            .map_err(|e| OutputError::InitializationFailed(format!("Failed to enumerate devices: {}", e)))?;
        return devices
            .find(|device| device.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| OutputError::DeviceNotFound { device: name.to_string() });
    }

    host.default_output_device()
        .ok_or_else(|| OutputError::InitializationFailed("No audio output device found".to_string()))
}
