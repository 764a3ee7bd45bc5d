//! Codec engine contract.
//!
//! The streaming pipeline never touches codec internals directly. Framing is
//! handled by the shared [`ogg`] layer; everything codec-specific goes through
//! [`CodecEngine`]. [`EngineResources`] bundles both so a decoder owns exactly
//! one handle and releases it in a fixed order:
//!
//! 1. logical stream state
//! 2. synthesis state (dsp + block)
//! 3. comment and info
//! 4. sync state

pub mod ogg;
pub mod vorbis;

use log::debug;

use crate::error::EngineError;
use crate::models::StreamInfo;

pub use ogg::{OggPacket, OggPage, PacketOut, PageOut, StreamState, SyncState};
pub use vorbis::VorbisEngine;

/// Which of the three setup headers a packet was accepted as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    Identification,
    Comment,
    Setup,
}

/// Stateful decode primitives for one codec.
///
/// Header packets are fed first, in stream order. Once all three are
/// accepted, `synthesis_init` prepares decoding and each audio packet goes
/// through `synthesis`, after which decoded samples are drained with
/// `pcm_out` / `pcm_read` until `pcm_out` returns an empty burst.
pub trait CodecEngine: Send {
    /// Feed one header packet
    fn header_in(&mut self, packet: &OggPacket) -> Result<HeaderKind, EngineError>;

    /// Stream information, available once all headers were accepted
    fn stream_info(&self) -> Option<StreamInfo>;

    fn synthesis_init(&mut self) -> Result<(), EngineError>;

    /// Decode one audio packet into the pending PCM buffer
    fn synthesis(&mut self, packet: &OggPacket) -> Result<(), EngineError>;

    /// Decoded samples not yet consumed
    fn pcm_out(&self) -> SampleBurst<'_>;

    /// Mark `count` samples per channel as consumed
    fn pcm_read(&mut self, count: usize);

    /// Release synthesis state (dsp + block)
    fn synthesis_clear(&mut self);

    /// Release comment and info state
    fn clear(&mut self);
}

/// View over decoded samples that have not been consumed yet.
#[derive(Debug, Clone, Copy)]
pub struct SampleBurst<'a> {
    planes: &'a [Vec<f32>],
    start: usize,
    len: usize,
}

impl<'a> SampleBurst<'a> {
    pub fn empty() -> Self {
        Self {
            planes: &[],
            start: 0,
            len: 0,
        }
    }

    /// Samples per channel in this burst
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn channels(&self) -> usize {
        self.planes.len()
    }

    /// All values for one channel
    pub fn channel(&self, channel: usize) -> &'a [f32] {
        &self.planes[channel][self.start..self.start + self.len]
    }

    /// Values of every channel at `index`, in channel order
    pub fn sample(&self, index: usize) -> Vec<f32> {
        self.planes
            .iter()
            .map(|plane| plane[self.start + index])
            .collect()
    }
}

/// Planar PCM buffer with a read cursor.
///
/// Decoded blocks are appended per channel; consumed samples are never
/// handed out again.
#[derive(Debug, Default)]
pub struct PcmQueue {
    planes: Vec<Vec<f32>>,
    cursor: usize,
}

impl PcmQueue {
    pub fn new(channels: usize) -> Self {
        Self {
            planes: vec![Vec::new(); channels],
            cursor: 0,
        }
    }

    pub fn channels(&self) -> usize {
        self.planes.len()
    }

    /// Append one decoded block. `planes` must hold one slice per channel,
    /// all of the same length.
    pub fn push_planes(&mut self, planes: &[&[f32]]) {
        debug_assert_eq!(planes.len(), self.planes.len());
        if self.cursor > 0 {
            for plane in &mut self.planes {
                plane.drain(..self.cursor);
            }
            self.cursor = 0;
        }
        for (dest, src) in self.planes.iter_mut().zip(planes) {
            dest.extend_from_slice(src);
        }
    }

    pub fn pending(&self) -> usize {
        self.planes.first().map_or(0, |plane| plane.len() - self.cursor)
    }

    pub fn burst(&self) -> SampleBurst<'_> {
        SampleBurst {
            planes: &self.planes,
            start: self.cursor,
            len: self.pending(),
        }
    }

    pub fn consume(&mut self, count: usize) {
        self.cursor += count.min(self.pending());
        if self.pending() == 0 {
            for plane in &mut self.planes {
                plane.clear();
            }
            self.cursor = 0;
        }
    }

    pub fn clear(&mut self) {
        self.planes = Vec::new();
        self.cursor = 0;
    }
}

/// Every piece of engine state a decoder owns.
///
/// Released exactly once, either by an explicit `release` or on drop, so a
/// failed negotiation frees everything it acquired.
pub struct EngineResources<C: CodecEngine> {
    pub sync: SyncState,
    pub stream: Option<StreamState>,
    pub codec: C,
    released: bool,
}

impl<C: CodecEngine> EngineResources<C> {
    pub fn new(codec: C) -> Self {
        Self {
            sync: SyncState::new(),
            stream: None,
            codec,
            released: false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Release in the documented order; later calls do nothing
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Some(mut stream) = self.stream.take() {
            stream.clear();
        }
        self.codec.synthesis_clear();
        self.codec.clear();
        self.sync.clear();
        debug!("Released codec engine resources");
    }
}

impl<C: CodecEngine> Drop for EngineResources<C> {
    fn drop(&mut self) {
        self.release();
    }
}
