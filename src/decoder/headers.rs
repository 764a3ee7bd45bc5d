//! Header negotiation: bind the logical stream and read the three Vorbis
//! headers before any audio is decoded.

use log::{debug, trace};

use super::sync::{next_page, ByteSource, SyncEvent};
use crate::config::DecoderConfig;
use crate::engine::{CodecEngine, EngineResources, HeaderKind, OggPage, PacketOut, StreamState, SyncState};
use crate::error::StreamError;
use crate::models::StreamInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NegotiationState {
    AwaitFirstPage,
    AwaitIdentHeader,
    AwaitCommentAndSetup,
    Ready,
}

struct Negotiator {
    state: NegotiationState,
}

impl Negotiator {
    fn advance(&mut self, next: NegotiationState) {
        trace!("Header negotiation: {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// Run negotiation to completion.
///
/// On success the logical stream is bound in `resources` and the returned
/// info is a snapshot that no longer depends on engine buffers. On failure
/// the caller drops `resources`, which releases whatever was acquired.
pub(crate) fn negotiate<C: CodecEngine>(
    resources: &mut EngineResources<C>,
    source: &mut ByteSource,
    config: &DecoderConfig,
) -> Result<StreamInfo, StreamError> {
    let mut negotiator = Negotiator {
        state: NegotiationState::AwaitFirstPage,
    };

    let page = first_page(&mut resources.sync, source, config.max_sync_bytes)?;
    debug!("Binding logical stream {:#010x}", page.serial());
    let stream = resources.stream.insert(StreamState::new(page.serial()));
    stream
        .page_in(&page)
        .map_err(|e| StreamError::InvalidStream(e.to_string()))?;
    negotiator.advance(NegotiationState::AwaitIdentHeader);

    let ident = match stream.packet_out() {
        PacketOut::Packet(packet) => packet,
        _ => {
            return Err(StreamError::InvalidStream(
                "unable to fetch the initial packet from the first page".to_string(),
            ))
        }
    };
    match resources.codec.header_in(&ident) {
        Ok(HeaderKind::Identification) => {}
        Ok(kind) => {
            return Err(StreamError::InvalidStream(format!(
                "expected identification header, found {:?}",
                kind
            )))
        }
        Err(e) => {
            return Err(StreamError::InvalidStream(format!(
                "unable to decode the initial header: {}",
                e
            )))
        }
    }
    negotiator.advance(NegotiationState::AwaitCommentAndSetup);

    let mut headers_read = 0;
    while headers_read < 2 {
        match stream.packet_out() {
            PacketOut::Packet(packet) => {
                resources.codec.header_in(&packet).map_err(|e| {
                    StreamError::InvalidStream(format!("unable to read a secondary header: {}", e))
                })?;
                headers_read += 1;
            }
            PacketOut::Hole => {
                return Err(StreamError::InvalidStream(
                    "data is missing near the secondary headers".to_string(),
                ))
            }
            PacketOut::NeedMorePages => match next_page(&mut resources.sync, source)? {
                SyncEvent::Page(page) => {
                    if let Err(e) = stream.page_in(&page) {
                        trace!("Ignoring page during negotiation: {}", e);
                    }
                }
                SyncEvent::Desynced { skipped } => {
                    trace!("Skipped {} bytes between header pages", skipped);
                }
                SyncEvent::EndOfStream => return Err(StreamError::TruncatedStream),
            },
        }
    }

    let info = resources.codec.stream_info().ok_or_else(|| {
        StreamError::InvalidStream("codec reported no stream information".to_string())
    })?;
    negotiator.advance(NegotiationState::Ready);
    debug!(
        "Negotiated {} with {} comments",
        info.format_description(),
        info.comments.len()
    );
    Ok(info)
}

/// Read until the first page, giving up after `max_skip` bytes of garbage
fn first_page(
    sync: &mut SyncState,
    source: &mut ByteSource,
    max_skip: usize,
) -> Result<OggPage, StreamError> {
    let mut skipped_total = 0;
    loop {
        match next_page(sync, source)? {
            SyncEvent::Page(page) => return Ok(page),
            SyncEvent::Desynced { skipped } => {
                skipped_total += skipped;
                if skipped_total > max_skip {
                    return Err(StreamError::InvalidStream(format!(
                        "no Ogg page found in the first {} bytes",
                        max_skip
                    )));
                }
            }
            SyncEvent::EndOfStream => {
                return Err(StreamError::InvalidStream("not a valid Ogg bitstream".to_string()))
            }
        }
    }
}
