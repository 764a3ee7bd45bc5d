//! Streaming decoder: the aggregate root tying synchronizer, negotiator,
//! assembler, delivery channel and lifecycle together.
//!
//! A [`Decoder`] is created by a successful header negotiation. The decode
//! task ([`Decoder::decode`] or [`Decoder::spawn`]) pushes frames into a
//! bounded channel which the consumer drains through [`Decoder::frames`].
//!
//! Locking: all decode state sits behind one mutex, held by `decode` for the
//! whole run and taken by `close` after the stop signal fired. The error
//! handler has its own lock and is only ever taken while already holding the
//! state lock, never the other way around. `is_closed` and
//! `is_stop_requested` read atomics and never wait on the state lock.

pub mod channel;
mod assembler;
mod headers;
mod hook;
mod sync;

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use log::{debug, error, trace};

use crate::config::DecoderConfig;
use crate::engine::{CodecEngine, EngineResources, VorbisEngine};
use crate::error::StreamError;
use crate::models::StreamInfo;

use assembler::{FrameAssembler, Pipeline};
use channel::{frame_channel, CancellationSignal, FrameSender};
use hook::ErrorHook;
use sync::ByteSource;

pub use channel::FrameReceiver;

struct DecodeState<C: CodecEngine> {
    resources: EngineResources<C>,
    source: ByteSource,
    /// `None` once closed, which closes the delivery channel
    sender: Option<FrameSender>,
    decoded: bool,
}

/// Streaming Ogg Vorbis decoder.
///
/// Shared between the decode task, the consumer and any controller thread
/// through an `Arc`. `close` may be called from any of them, any number of
/// times.
pub struct Decoder<C: CodecEngine = VorbisEngine> {
    info: StreamInfo,
    samples_per_channel: usize,
    state: Mutex<DecodeState<C>>,
    /// Only set while holding the state lock
    closed: AtomicBool,
    frames: FrameReceiver,
    stop: CancellationSignal,
    hook: ErrorHook,
}

/// Open a Vorbis stream with default settings and the given frame size
pub fn open<R>(source: R, samples_per_channel: usize) -> Result<(Decoder, StreamInfo), StreamError>
where
    R: Read + Send + 'static,
{
    Decoder::open_with(
        source,
        VorbisEngine::new(),
        DecoderConfig::with_samples_per_channel(samples_per_channel),
    )
}

impl<C: CodecEngine> Decoder<C> {
    /// Negotiate headers on `source` and build a decoder around `codec`.
    ///
    /// Fails with `InvalidStream` or `TruncatedStream` when negotiation does
    /// not complete; every engine resource acquired so far is released.
    pub fn open_with<R>(
        source: R,
        codec: C,
        config: DecoderConfig,
    ) -> Result<(Self, StreamInfo), StreamError>
    where
        R: Read + Send + 'static,
    {
        config.validate()?;

        let mut resources = EngineResources::new(codec);
        let mut source = ByteSource::new(source, config.chunk_size);
        let info = headers::negotiate(&mut resources, &mut source, &config)?;

        let (sender, frames) = frame_channel(config.frame_buffer);
        debug!(
            "Decoder ready: {}, {} samples per frame, {} frames buffered",
            info.format_description(),
            config.samples_per_channel,
            config.frame_buffer
        );

        let decoder = Self {
            info: info.clone(),
            samples_per_channel: config.samples_per_channel,
            state: Mutex::new(DecodeState {
                resources,
                source,
                sender: Some(sender),
                decoded: false,
            }),
            closed: AtomicBool::new(false),
            frames,
            stop: CancellationSignal::new(),
            hook: ErrorHook::default(),
        };
        Ok((decoder, info))
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    pub fn samples_per_channel(&self) -> usize {
        self.samples_per_channel
    }

    /// Receiving end of the delivery channel.
    ///
    /// Every handle observes the same frames; a frame goes to whichever
    /// handle receives it first.
    pub fn frames(&self) -> FrameReceiver {
        self.frames.clone()
    }

    /// Register the handler for non-fatal stream errors and decode-task
    /// failures. It runs on the decode task, must not block and must not
    /// call `close`.
    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(&StreamError) + Send + Sync + 'static,
    {
        self.hook.set(handler);
    }

    pub fn clear_error_handler(&self) {
        self.hook.clear();
    }

    /// Run the decode task on the calling thread until end of stream or stop.
    ///
    /// Returns `AlreadyClosed` after `close`. A second call after a finished
    /// run returns immediately.
    pub fn decode(&self) -> Result<(), StreamError> {
        let mut state = self.lock_state();
        if self.closed.load(Ordering::Acquire) {
            return Err(StreamError::AlreadyClosed);
        }
        if state.decoded {
            debug!("Decode task already ran");
            return Ok(());
        }
        state.decoded = true;

        let DecodeState {
            resources,
            source,
            sender,
            ..
        } = &mut *state;
        let sender = sender.as_ref().ok_or(StreamError::AlreadyClosed)?;

        if let Err(e) = resources.codec.synthesis_init() {
            let err = StreamError::DecodeInit(e.to_string());
            error!("{}", err);
            self.hook.report(&err);
            return Err(err);
        }

        let mut assembler = FrameAssembler::new(self.samples_per_channel);
        let result = assembler.run(Pipeline {
            resources: &mut *resources,
            source: &mut *source,
            sender,
            stop: &self.stop,
            hook: &self.hook,
        });

        if let Err(err) = &result {
            error!("Decode task failed after {} bytes: {}", source.bytes_read(), err);
            self.hook.report(err);
        }
        result
    }

    /// Ask the decode task to unwind. Idempotent; releases nothing.
    pub fn request_stop(&self) {
        if self.stop.fire() {
            debug!("Stop requested");
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.is_fired()
    }

    /// Stop decoding, close the delivery channel and release engine resources.
    ///
    /// Waits for a running decode task to return. Later calls do nothing.
    pub fn close(&self) {
        self.request_stop();

        let mut state = self.lock_state();
        if self.closed.swap(true, Ordering::AcqRel) {
            trace!("Decoder already closed");
            return;
        }
        state.sender = None;
        state.resources.release();
        debug!("Decoder closed");
    }

    /// Safe to call from the consumer or the error handler while a decode
    /// task is blocked on a full channel.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn lock_state(&self) -> MutexGuard<'_, DecodeState<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: CodecEngine + 'static> Decoder<C> {
    /// Run `decode` followed by `close` on a dedicated thread
    pub fn spawn(self: &Arc<Self>) -> Result<JoinHandle<Result<(), StreamError>>, StreamError> {
        let decoder = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("vorbis-decode".to_string())
            .spawn(move || {
                let result = decoder.decode();
                decoder.close();
                result
            })?;
        Ok(handle)
    }
}
