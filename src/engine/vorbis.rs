//! Vorbis codec engine.
//!
//! Header packets are parsed here so stream information is known before any
//! audio is decoded. Synthesis is delegated to symphonia's Vorbis decoder,
//! which is built from the identification and setup headers once all three
//! headers have been accepted.

use log::{debug, trace};
use symphonia::core::audio::{AudioBuffer, AudioBufferRef};
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions, CODEC_TYPE_VORBIS};
use symphonia::core::formats::Packet;

use super::{CodecEngine, HeaderKind, OggPacket, PcmQueue, SampleBurst};
use crate::error::EngineError;
use crate::models::StreamInfo;

const VORBIS_MAGIC: &[u8; 6] = b"vorbis";
const PACKET_IDENT: u8 = 1;
const PACKET_COMMENT: u8 = 3;
const PACKET_SETUP: u8 = 5;

const IDENT_LEN: usize = 30;
const MIN_BLOCKSIZE: usize = 64;
const MAX_BLOCKSIZE: usize = 8192;

/// Fields of the identification header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentHeader {
    pub channels: u8,
    pub sample_rate: u32,
    pub bitrate_max: i32,
    pub bitrate_nominal: i32,
    pub bitrate_min: i32,
    pub blocksize_short: usize,
    pub blocksize_long: usize,
}

/// Fields of the comment header
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommentHeader {
    pub vendor: String,
    pub comments: Vec<String>,
}

/// Little-endian cursor over a header packet
struct HeaderReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> HeaderReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], EngineError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(EngineError::MalformedHeader("header is truncated"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, EngineError> {
        Ok(self.bytes(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, EngineError> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self) -> Result<i32, EngineError> {
        Ok(self.u32()? as i32)
    }

    fn string(&mut self) -> Result<String, EngineError> {
        let len = self.u32()? as usize;
        let bytes = self.bytes(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    fn framing_bit(&mut self) -> Result<(), EngineError> {
        if self.u8()? & 0x01 == 0 {
            return Err(EngineError::MalformedHeader("framing bit not set"));
        }
        Ok(())
    }
}

/// Packet type byte for a Vorbis header, `None` for audio or foreign data
fn header_type(data: &[u8]) -> Option<u8> {
    match data {
        [kind, magic @ ..] if kind & 0x01 == 1 && magic.starts_with(VORBIS_MAGIC) => Some(*kind),
        _ => None,
    }
}

fn parse_ident(data: &[u8]) -> Result<IdentHeader, EngineError> {
    if data.len() < IDENT_LEN {
        return Err(EngineError::MalformedHeader("identification header is truncated"));
    }
    let mut reader = HeaderReader::new(&data[1 + VORBIS_MAGIC.len()..]);

    if reader.u32()? != 0 {
        return Err(EngineError::MalformedHeader("unsupported Vorbis version"));
    }
    let channels = reader.u8()?;
    let sample_rate = reader.u32()?;
    let bitrate_max = reader.i32()?;
    let bitrate_nominal = reader.i32()?;
    let bitrate_min = reader.i32()?;
    let blocksizes = reader.u8()?;
    let blocksize_short = 1usize << (blocksizes & 0x0F);
    let blocksize_long = 1usize << (blocksizes >> 4);
    reader.framing_bit()?;

    if channels == 0 {
        return Err(EngineError::MalformedHeader("zero channels"));
    }
    if sample_rate == 0 {
        return Err(EngineError::MalformedHeader("zero sample rate"));
    }
    if blocksize_short < MIN_BLOCKSIZE
        || blocksize_long > MAX_BLOCKSIZE
        || blocksize_short > blocksize_long
    {
        return Err(EngineError::MalformedHeader("invalid block sizes"));
    }

    Ok(IdentHeader {
        channels,
        sample_rate,
        bitrate_max,
        bitrate_nominal,
        bitrate_min,
        blocksize_short,
        blocksize_long,
    })
}

fn parse_comment(data: &[u8]) -> Result<CommentHeader, EngineError> {
    let mut reader = HeaderReader::new(&data[1 + VORBIS_MAGIC.len()..]);

    let vendor = reader.string()?;
    let count = reader.u32()? as usize;
    // Each comment needs at least its length prefix
    if count > data.len() / 4 {
        return Err(EngineError::MalformedHeader("comment count exceeds packet size"));
    }
    let mut comments = Vec::with_capacity(count);
    for _ in 0..count {
        comments.push(reader.string()?);
    }
    reader.framing_bit()?;

    Ok(CommentHeader { vendor, comments })
}

fn append_pcm(pcm: &mut PcmQueue, decoded: AudioBufferRef<'_>) {
    match decoded {
        AudioBufferRef::F32(buf) => {
            let planes = buf.planes();
            pcm.push_planes(planes.planes());
        }
        other => {
            let mut converted = AudioBuffer::<f32>::new(other.capacity() as u64, *other.spec());
            other.convert(&mut converted);
            let planes = converted.planes();
            pcm.push_planes(planes.planes());
        }
    }
}

/// Vorbis decoding engine backed by symphonia.
#[derive(Default)]
pub struct VorbisEngine {
    ident: Option<IdentHeader>,
    ident_raw: Vec<u8>,
    comment: Option<CommentHeader>,
    setup_raw: Option<Vec<u8>>,
    decoder: Option<Box<dyn Decoder>>,
    pcm: PcmQueue,
}

impl VorbisEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ident(&self) -> Option<&IdentHeader> {
        self.ident.as_ref()
    }

    pub fn comment(&self) -> Option<&CommentHeader> {
        self.comment.as_ref()
    }

    fn headers_complete(&self) -> bool {
        self.ident.is_some() && self.comment.is_some() && self.setup_raw.is_some()
    }
}

impl CodecEngine for VorbisEngine {
    fn header_in(&mut self, packet: &OggPacket) -> Result<HeaderKind, EngineError> {
        let kind = header_type(&packet.data).ok_or(EngineError::NotVorbis)?;

        match kind {
            PACKET_IDENT => {
                if self.ident.is_some() {
                    return Err(EngineError::HeaderOrder("duplicate identification header"));
                }
                if !packet.bos {
                    return Err(EngineError::HeaderOrder(
                        "identification header must start the stream",
                    ));
                }
                let ident = parse_ident(&packet.data)?;
                debug!(
                    "Vorbis identification: {} channels, {} Hz, blocksizes {}/{}",
                    ident.channels, ident.sample_rate, ident.blocksize_short, ident.blocksize_long
                );
                self.ident = Some(ident);
                self.ident_raw = packet.data.clone();
                Ok(HeaderKind::Identification)
            }
            PACKET_COMMENT => {
                if self.ident.is_none() || self.comment.is_some() {
                    return Err(EngineError::HeaderOrder("comment header out of place"));
                }
                let comment = parse_comment(&packet.data)?;
                debug!("Vorbis vendor '{}' with {} comments", comment.vendor, comment.comments.len());
                self.comment = Some(comment);
                Ok(HeaderKind::Comment)
            }
            PACKET_SETUP => {
                if self.comment.is_none() || self.setup_raw.is_some() {
                    return Err(EngineError::HeaderOrder("setup header out of place"));
                }
                self.setup_raw = Some(packet.data.clone());
                Ok(HeaderKind::Setup)
            }
            _ => Err(EngineError::NotVorbis),
        }
    }

    fn stream_info(&self) -> Option<StreamInfo> {
        if !self.headers_complete() {
            return None;
        }
        let ident = self.ident.as_ref()?;
        let comment = self.comment.as_ref()?;
        Some(StreamInfo {
            channels: ident.channels as usize,
            sample_rate: ident.sample_rate as f64,
            vendor: comment.vendor.clone(),
            comments: comment.comments.clone(),
        })
    }

    fn synthesis_init(&mut self) -> Result<(), EngineError> {
        let (ident, setup) = match (&self.ident, &self.setup_raw) {
            (Some(ident), Some(setup)) if self.comment.is_some() => (ident, setup),
            _ => return Err(EngineError::NotInitialized),
        };

        let mut extra_data = self.ident_raw.clone();
        extra_data.extend_from_slice(setup);

        let mut params = CodecParameters::new();
        params
            .for_codec(CODEC_TYPE_VORBIS)
            .with_sample_rate(ident.sample_rate)
            .with_extra_data(extra_data.into_boxed_slice());

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| EngineError::SynthesisInit(e.to_string()))?;

        self.pcm = PcmQueue::new(ident.channels as usize);
        self.decoder = Some(decoder);
        debug!("Vorbis synthesis initialized");
        Ok(())
    }

    fn synthesis(&mut self, packet: &OggPacket) -> Result<(), EngineError> {
        let decoder = self.decoder.as_mut().ok_or(EngineError::NotInitialized)?;
        if header_type(&packet.data).is_some() {
            return Err(EngineError::Synthesis("header packet in audio data".to_string()));
        }

        let ts = packet.granule_position.max(0) as u64;
        let sym_packet = Packet::new_from_slice(0, ts, 0, &packet.data);
        let decoded = decoder
            .decode(&sym_packet)
            .map_err(|e| EngineError::Synthesis(e.to_string()))?;

        trace!("Packet {} decoded to {} samples", packet.packet_no, decoded.frames());
        append_pcm(&mut self.pcm, decoded);
        Ok(())
    }

    fn pcm_out(&self) -> SampleBurst<'_> {
        self.pcm.burst()
    }

    fn pcm_read(&mut self, count: usize) {
        self.pcm.consume(count);
    }

    fn synthesis_clear(&mut self) {
        self.decoder = None;
        self.pcm.clear();
    }

    fn clear(&mut self) {
        self.ident = None;
        self.ident_raw = Vec::new();
        self.comment = None;
        self.setup_raw = None;
    }
}
