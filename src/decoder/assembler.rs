//! Frame assembler: drives synchronizer and codec after negotiation and
//! regroups decoded bursts into fixed-size frames.

use log::{debug, trace};

use super::channel::{CancellationSignal, FrameSender, SendOutcome};
use super::hook::ErrorHook;
use super::sync::{next_page, ByteSource, SyncEvent};
use crate::engine::{CodecEngine, EngineResources, PacketOut, StreamState};
use crate::error::StreamError;
use crate::models::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stopped,
}

/// Everything the decode loop borrows for one run
pub(crate) struct Pipeline<'a, C: CodecEngine> {
    pub resources: &'a mut EngineResources<C>,
    pub source: &'a mut ByteSource,
    pub sender: &'a FrameSender,
    pub stop: &'a CancellationSignal,
    pub hook: &'a ErrorHook,
}

pub(crate) struct FrameAssembler {
    samples_per_channel: usize,
    frame: Frame,
    frames_sent: u64,
}

impl FrameAssembler {
    pub fn new(samples_per_channel: usize) -> Self {
        Self {
            samples_per_channel,
            frame: Frame::with_capacity(samples_per_channel),
            frames_sent: 0,
        }
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Decode until end of stream or cancellation, then flush the partial frame.
    pub fn run<C: CodecEngine>(&mut self, pipeline: Pipeline<'_, C>) -> Result<(), StreamError> {
        let Pipeline {
            resources,
            source,
            sender,
            stop,
            hook,
        } = pipeline;
        let EngineResources {
            sync,
            stream,
            codec,
            ..
        } = resources;
        let stream = stream.as_mut().ok_or(StreamError::AlreadyClosed)?;

        let mut end_of_stream = false;
        loop {
            // Packets can already be queued from the last header page
            if self.drain_packets(stream, codec, sender, stop, hook) == Flow::Stopped {
                break;
            }
            if end_of_stream {
                break;
            }

            let event = match next_page(sync, source) {
                Ok(event) => event,
                Err(e) => {
                    // Samples already decoded still reach the consumer
                    self.flush(sender, stop);
                    return Err(e);
                }
            };
            match event {
                SyncEvent::Page(page) => {
                    if let Err(e) = stream.page_in(&page) {
                        hook.report(&StreamError::CorruptPage(e.to_string()));
                        continue;
                    }
                    if page.is_eos() {
                        debug!("End of stream at page {}", page.sequence());
                        end_of_stream = true;
                    }
                }
                SyncEvent::Desynced { skipped } => {
                    hook.report(&StreamError::Desync { skipped });
                }
                SyncEvent::EndOfStream => {
                    debug!("Byte source ended without an end-of-stream page");
                    break;
                }
            }
        }

        self.flush(sender, stop);
        debug!("Decode loop finished after {} frames", self.frames_sent);
        Ok(())
    }

    fn drain_packets<C: CodecEngine>(
        &mut self,
        stream: &mut StreamState,
        codec: &mut C,
        sender: &FrameSender,
        stop: &CancellationSignal,
        hook: &ErrorHook,
    ) -> Flow {
        while !stop.is_fired() {
            match stream.packet_out() {
                PacketOut::NeedMorePages => return Flow::Continue,
                PacketOut::Hole => hook.report(&StreamError::MissingData),
                PacketOut::Packet(packet) => {
                    if let Err(e) = codec.synthesis(&packet) {
                        hook.report(&StreamError::CorruptPacket(e.to_string()));
                        continue;
                    }
                    if self.drain_pcm(codec, sender, stop) == Flow::Stopped {
                        return Flow::Stopped;
                    }
                }
            }
        }
        Flow::Stopped
    }

    fn drain_pcm<C: CodecEngine>(
        &mut self,
        codec: &mut C,
        sender: &FrameSender,
        stop: &CancellationSignal,
    ) -> Flow {
        loop {
            let burst = codec.pcm_out();
            if burst.is_empty() {
                return Flow::Continue;
            }

            let space = self.samples_per_channel - self.frame.len();
            let take = burst.len().min(space);
            for i in 0..take {
                self.frame.push(burst.sample(i));
            }
            codec.pcm_read(take);

            if self.frame.len() == self.samples_per_channel {
                let frame = std::mem::replace(
                    &mut self.frame,
                    Frame::with_capacity(self.samples_per_channel),
                );
                if self.deliver(frame, sender, stop) == Flow::Stopped {
                    return Flow::Stopped;
                }
            }
        }
    }

    fn deliver(&mut self, frame: Frame, sender: &FrameSender, stop: &CancellationSignal) -> Flow {
        match sender.send(frame, stop) {
            SendOutcome::Delivered => {
                self.frames_sent += 1;
                Flow::Continue
            }
            SendOutcome::Cancelled => {
                trace!("Frame dropped: stop requested while waiting for space");
                Flow::Stopped
            }
        }
    }

    /// Hand over a non-empty partial frame. After a stop this never blocks.
    fn flush(&mut self, sender: &FrameSender, stop: &CancellationSignal) {
        if self.frame.is_empty() {
            return;
        }
        let frame = std::mem::take(&mut self.frame);
        if stop.is_fired() {
            if sender.try_send(frame) {
                self.frames_sent += 1;
            } else {
                trace!("Final frame dropped: channel full after stop");
            }
        } else {
            self.deliver(frame, sender, stop);
        }
    }
}
