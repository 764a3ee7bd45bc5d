//! Builders shared by the unit and integration tests.

use std::io::{self, Read};
use std::sync::{Arc, Mutex};

use crate::engine::{CodecEngine, HeaderKind, OggPacket, OggPage, PcmQueue, SampleBurst};
use crate::error::EngineError;
use crate::models::StreamInfo;

const FLAG_BOS: u8 = 0x02;
const FLAG_EOS: u8 = 0x04;

/// Lacing values for one packet of `len` bytes
pub fn lace(len: usize) -> Vec<u8> {
    let mut lacing = vec![255u8; len / 255];
    lacing.push((len % 255) as u8);
    lacing
}

/// Description of one page holding whole packets
#[derive(Debug, Clone)]
pub struct PageSpec {
    serial: u32,
    sequence: u32,
    header_type: u8,
    granule: i64,
    packets: Vec<Vec<u8>>,
}

impl PageSpec {
    pub fn new(serial: u32, sequence: u32) -> Self {
        Self {
            serial,
            sequence,
            header_type: 0,
            granule: 0,
            packets: Vec::new(),
        }
    }

    pub fn bos(mut self) -> Self {
        self.header_type |= FLAG_BOS;
        self
    }

    pub fn eos(mut self) -> Self {
        self.header_type |= FLAG_EOS;
        self
    }

    pub fn granule(mut self, granule: i64) -> Self {
        self.granule = granule;
        self
    }

    pub fn packet(mut self, data: &[u8]) -> Self {
        self.packets.push(data.to_vec());
        self
    }
}

/// Serialize a page with a valid checksum
pub fn page_bytes(spec: &PageSpec) -> Vec<u8> {
    let mut lacing = Vec::new();
    let mut body = Vec::new();
    for packet in &spec.packets {
        lacing.extend(lace(packet.len()));
        body.extend_from_slice(packet);
    }
    OggPage::new(spec.header_type, spec.granule, spec.serial, spec.sequence, lacing, body)
        .to_bytes()
}

/// Identification header: 44.1 kHz style layout with blocksizes 256/2048
pub fn vorbis_ident_header(channels: u8, sample_rate: u32) -> Vec<u8> {
    let mut data = vec![0x01];
    data.extend_from_slice(b"vorbis");
    data.extend_from_slice(&0u32.to_le_bytes());
    data.push(channels);
    data.extend_from_slice(&sample_rate.to_le_bytes());
    data.extend_from_slice(&0i32.to_le_bytes());
    data.extend_from_slice(&128_000i32.to_le_bytes());
    data.extend_from_slice(&0i32.to_le_bytes());
    data.push(0xB8);
    data.push(0x01);
    data
}

pub fn vorbis_comment_header(vendor: &str, comments: &[&str]) -> Vec<u8> {
    let mut data = vec![0x03];
    data.extend_from_slice(b"vorbis");
    data.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    data.extend_from_slice(vendor.as_bytes());
    data.extend_from_slice(&(comments.len() as u32).to_le_bytes());
    for comment in comments {
        data.extend_from_slice(&(comment.len() as u32).to_le_bytes());
        data.extend_from_slice(comment.as_bytes());
    }
    data.push(0x01);
    data
}

/// A setup header with a valid preamble but no usable codebooks
pub fn vorbis_setup_header() -> Vec<u8> {
    let mut data = vec![0x05];
    data.extend_from_slice(b"vorbis");
    data.extend_from_slice(&[0x00, 0x42, 0x43, 0x56, 0x01]);
    data
}

/// LSB-first bit packer matching the Vorbis setup header layout
#[derive(Default)]
struct BitWriter {
    bytes: Vec<u8>,
    bits: usize,
}

impl BitWriter {
    fn put(&mut self, value: u32, width: usize) -> &mut Self {
        for i in 0..width {
            if self.bits % 8 == 0 {
                self.bytes.push(0);
            }
            if (value >> i) & 1 == 1 {
                let last = self.bytes.len() - 1;
                self.bytes[last] |= 1 << (self.bits % 8);
            }
            self.bits += 1;
        }
        self
    }
}

/// A decodable setup header for a single short-block mode.
///
/// One two-entry codebook, an empty floor 1 and a residue that codes
/// nothing. Audio packets of a single zero byte decode to silence.
pub fn vorbis_silent_setup_header() -> Vec<u8> {
    let mut bits = BitWriter::default();

    // Codebooks
    bits.put(0, 8)
        .put(0x564342, 24)
        .put(1, 16)
        .put(2, 24)
        .put(0, 1)
        .put(0, 1)
        .put(0, 5)
        .put(0, 5)
        .put(0, 4);
    // Time domain transforms
    bits.put(0, 6).put(0, 16);
    // Floors: type 1, no partitions, multiplier 1, 8 range bits
    bits.put(0, 6).put(1, 16).put(0, 5).put(0, 2).put(8, 4);
    // Residues: type 0, empty range, one class without books
    bits.put(0, 6)
        .put(0, 16)
        .put(0, 24)
        .put(0, 24)
        .put(0, 24)
        .put(0, 6)
        .put(0, 8)
        .put(0, 3)
        .put(0, 1);
    // Mappings: one submap, no coupling
    bits.put(0, 6)
        .put(0, 16)
        .put(0, 1)
        .put(0, 1)
        .put(0, 2)
        .put(0, 8)
        .put(0, 8)
        .put(0, 8);
    // Modes: short block on mapping 0
    bits.put(0, 6).put(0, 1).put(0, 16).put(0, 16).put(0, 8);
    // Framing
    bits.put(1, 1);

    let mut data = vec![0x05];
    data.extend_from_slice(b"vorbis");
    data.extend(bits.bytes);
    data
}

/// Serial used by the scripted streams
pub const SERIAL: u32 = 0x5EED;

pub fn scripted_ident(channels: u8) -> Vec<u8> {
    vec![0x01, channels]
}

pub fn scripted_comment(comments: &[&str]) -> Vec<u8> {
    let mut data = vec![0x03];
    data.extend_from_slice(comments.join("\n").as_bytes());
    data
}

pub fn scripted_setup() -> Vec<u8> {
    vec![0x05]
}

/// Audio packet that decodes to `count` samples per channel
pub fn audio(count: u16) -> Vec<u8> {
    let [lo, hi] = count.to_le_bytes();
    vec![0x00, lo, hi]
}

/// Audio packet the scripted codec refuses to decode
pub fn corrupt_audio() -> Vec<u8> {
    vec![0xFF]
}

/// Value the scripted codec emits for the `index`-th sample of `channel`
pub fn sample_value(index: usize, channel: usize) -> f32 {
    (index * 10 + channel) as f32
}

/// The two header pages of a scripted stream
pub fn scripted_header_pages(channels: u8, comments: &[&str]) -> Vec<u8> {
    let mut bytes = page_bytes(&PageSpec::new(SERIAL, 0).bos().packet(&scripted_ident(channels)));
    bytes.extend(page_bytes(
        &PageSpec::new(SERIAL, 1)
            .packet(&scripted_comment(comments))
            .packet(&scripted_setup()),
    ));
    bytes
}

/// One audio page of a scripted stream
pub fn scripted_audio_page(sequence: u32, bursts: &[u16], eos: bool) -> Vec<u8> {
    let mut spec = PageSpec::new(SERIAL, sequence);
    for &count in bursts {
        spec = spec.packet(&audio(count));
    }
    if eos {
        spec = spec.eos();
    }
    page_bytes(&spec)
}

/// Complete scripted stream: headers, then one page per burst, EOS on the last
pub fn scripted_stream(channels: u8, bursts: &[u16]) -> Vec<u8> {
    let mut bytes = scripted_header_pages(channels, &[]);
    for (i, &count) in bursts.iter().enumerate() {
        let eos = i + 1 == bursts.len();
        bytes.extend(scripted_audio_page(2 + i as u32, &[count], eos));
    }
    bytes
}

/// Deterministic codec driven by packet contents.
///
/// Headers are `[0x01, channels]`, `[0x03, comments...]` and `[0x05]`.
/// Audio packets are `[0x00, count_lo, count_hi]`; `[0xFF]` fails synthesis.
pub struct ScriptedCodec {
    headers: usize,
    channels: usize,
    comments: Vec<String>,
    fail_init: bool,
    initialized: bool,
    next_index: usize,
    pcm: PcmQueue,
    releases: Arc<Mutex<Vec<&'static str>>>,
}

impl ScriptedCodec {
    pub fn new() -> Self {
        Self {
            headers: 0,
            channels: 0,
            comments: Vec::new(),
            fail_init: false,
            initialized: false,
            next_index: 0,
            pcm: PcmQueue::default(),
            releases: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Make `synthesis_init` fail
    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Shared record of `synthesis_clear` / `clear` calls, in call order
    pub fn release_log(&self) -> Arc<Mutex<Vec<&'static str>>> {
        Arc::clone(&self.releases)
    }
}

impl CodecEngine for ScriptedCodec {
    fn header_in(&mut self, packet: &OggPacket) -> Result<HeaderKind, EngineError> {
        let kind = match packet.data.first() {
            Some(0x01) => HeaderKind::Identification,
            Some(0x03) => HeaderKind::Comment,
            Some(0x05) => HeaderKind::Setup,
            _ => return Err(EngineError::NotVorbis),
        };
        let expected = match self.headers {
            0 => HeaderKind::Identification,
            1 => HeaderKind::Comment,
            2 => HeaderKind::Setup,
            _ => return Err(EngineError::HeaderOrder("all headers already read")),
        };
        if kind != expected {
            return Err(EngineError::HeaderOrder("unexpected header type"));
        }

        match kind {
            HeaderKind::Identification => {
                if !packet.bos {
                    return Err(EngineError::HeaderOrder("identification must start the stream"));
                }
                self.channels = match packet.data.get(1) {
                    Some(&channels) if channels > 0 => channels as usize,
                    _ => return Err(EngineError::MalformedHeader("bad channel count")),
                };
            }
            HeaderKind::Comment => {
                let text = String::from_utf8_lossy(&packet.data[1..]).into_owned();
                self.comments = text
                    .split('\n')
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            HeaderKind::Setup => {}
        }
        self.headers += 1;
        Ok(kind)
    }

    fn stream_info(&self) -> Option<StreamInfo> {
        (self.headers == 3).then(|| StreamInfo {
            channels: self.channels,
            sample_rate: 48000.0,
            vendor: "scripted".to_string(),
            comments: self.comments.clone(),
        })
    }

    fn synthesis_init(&mut self) -> Result<(), EngineError> {
        if self.fail_init {
            return Err(EngineError::SynthesisInit("scripted failure".to_string()));
        }
        self.pcm = PcmQueue::new(self.channels);
        self.initialized = true;
        Ok(())
    }

    fn synthesis(&mut self, packet: &OggPacket) -> Result<(), EngineError> {
        if !self.initialized {
            return Err(EngineError::NotInitialized);
        }
        let count = match packet.data.as_slice() {
            [0x00, lo, hi] => u16::from_le_bytes([*lo, *hi]) as usize,
            _ => return Err(EngineError::Synthesis("unreadable packet".to_string())),
        };

        let planes: Vec<Vec<f32>> = (0..self.channels)
            .map(|ch| (0..count).map(|i| sample_value(self.next_index + i, ch)).collect())
            .collect();
        let slices: Vec<&[f32]> = planes.iter().map(Vec::as_slice).collect();
        self.pcm.push_planes(&slices);
        self.next_index += count;
        Ok(())
    }

    fn pcm_out(&self) -> SampleBurst<'_> {
        self.pcm.burst()
    }

    fn pcm_read(&mut self, count: usize) {
        self.pcm.consume(count);
    }

    fn synthesis_clear(&mut self) {
        self.initialized = false;
        self.pcm.clear();
        self.releases.lock().unwrap().push("synthesis");
    }

    fn clear(&mut self) {
        self.headers = 0;
        self.comments.clear();
        self.releases.lock().unwrap().push("comment+info");
    }
}

/// Reader handing out at most `chunk` bytes per call, with one
/// `Interrupted` error before the first byte
pub struct ChunkedReader {
    data: Vec<u8>,
    pos: usize,
    chunk: usize,
    interrupt: bool,
}

impl ChunkedReader {
    pub fn new(data: Vec<u8>, chunk: usize) -> Self {
        Self {
            data,
            pos: 0,
            chunk,
            interrupt: false,
        }
    }

    pub fn interrupted_once(mut self) -> Self {
        self.interrupt = true;
        self
    }
}

impl Read for ChunkedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.interrupt {
            self.interrupt = false;
            return Err(io::Error::new(io::ErrorKind::Interrupted, "try again"));
        }
        let len = self.chunk.min(buf.len()).min(self.data.len() - self.pos);
        buf[..len].copy_from_slice(&self.data[self.pos..self.pos + len]);
        self.pos += len;
        Ok(len)
    }
}

/// Reader that serves `data` and then fails
pub struct FailingReader {
    data: io::Cursor<Vec<u8>>,
}

impl FailingReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: io::Cursor::new(data),
        }
    }
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.data.read(buf)? {
            0 => Err(io::Error::new(io::ErrorKind::ConnectionReset, "source went away")),
            n => Ok(n),
        }
    }
}
