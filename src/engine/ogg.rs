//! Ogg framing layer.
//!
//! Two pieces of state live here:
//! - [`SyncState`] accumulates raw bytes from an arbitrarily chunked source
//!   and cuts validated pages out of them.
//! - [`StreamState`] takes the pages of one logical stream and reassembles
//!   the packets they carry, including packets that span several pages.
//!
//! # Page layout
//! ```text
//! Capture pattern: "OggS" (4 bytes)
//! Version:         1 byte (always 0)
//! Header type:     1 byte (flags: continued=0x01, BOS=0x02, EOS=0x04)
//! Granule pos:     8 bytes (little-endian, codec-specific)
//! Serial number:   4 bytes (identifies logical stream)
//! Page seq no:     4 bytes
//! CRC checksum:    4 bytes
//! Num segments:    1 byte
//! Segment table:   N bytes (lacing values)
//! Page data:       sum(segment_table) bytes
//! ```
//!
//! A lacing value below 255 terminates a packet; a packet whose last lacing
//! value on a page is 255 continues on the next page.

use std::collections::VecDeque;

use log::trace;

use crate::error::EngineError;

const CAPTURE_PATTERN: &[u8; 4] = b"OggS";
const HEADER_LEN: usize = 27;
const CRC_OFFSET: usize = 22;
const CRC_POLY: u32 = 0x04C1_1DB7;

const FLAG_CONTINUED: u8 = 0x01;
const FLAG_BOS: u8 = 0x02;
const FLAG_EOS: u8 = 0x04;

static CRC_TABLE: [u32; 256] = build_crc_table();

const fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut r = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            r = if r & 0x8000_0000 != 0 { (r << 1) ^ CRC_POLY } else { r << 1 };
            bit += 1;
        }
        table[i] = r;
        i += 1;
    }
    table
}

fn crc_update(mut crc: u32, data: &[u8]) -> u32 {
    for &byte in data {
        crc = (crc << 8) ^ CRC_TABLE[((crc >> 24) as u8 ^ byte) as usize];
    }
    crc
}

/// Ogg CRC-32: polynomial 0x04C11DB7, initial value 0, no reflection.
pub fn crc32(data: &[u8]) -> u32 {
    crc_update(0, data)
}

/// Checksum of a serialized page with its CRC field treated as zero
fn page_checksum(header: &[u8], body: &[u8]) -> u32 {
    let mut crc = crc_update(0, &header[..CRC_OFFSET]);
    crc = crc_update(crc, &[0; 4]);
    crc = crc_update(crc, &header[CRC_OFFSET + 4..]);
    crc_update(crc, body)
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// One validated page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OggPage {
    version: u8,
    header_type: u8,
    granule_position: i64,
    serial: u32,
    sequence: u32,
    lacing: Vec<u8>,
    body: Vec<u8>,
}

impl OggPage {
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn granule_position(&self) -> i64 {
        self.granule_position
    }

    /// First packet on this page continues one from the previous page
    pub fn is_continued(&self) -> bool {
        self.header_type & FLAG_CONTINUED != 0
    }

    pub fn is_bos(&self) -> bool {
        self.header_type & FLAG_BOS != 0
    }

    /// End-of-stream marker
    pub fn is_eos(&self) -> bool {
        self.header_type & FLAG_EOS != 0
    }

    pub fn lacing(&self) -> &[u8] {
        &self.lacing
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Total serialized size in bytes
    pub fn len(&self) -> usize {
        HEADER_LEN + self.lacing.len() + self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

#[cfg(test)]
impl OggPage {
    pub(crate) fn new(
        header_type: u8,
        granule_position: i64,
        serial: u32,
        sequence: u32,
        lacing: Vec<u8>,
        body: Vec<u8>,
    ) -> Self {
        assert!(lacing.len() <= 255, "too many segments for one page");
        assert_eq!(lacing.iter().map(|&l| l as usize).sum::<usize>(), body.len());
        Self {
            version: 0,
            header_type,
            granule_position,
            serial,
            sequence,
            lacing,
            body,
        }
    }

    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let mut header = Vec::with_capacity(HEADER_LEN + self.lacing.len());
        header.extend_from_slice(CAPTURE_PATTERN);
        header.push(self.version);
        header.push(self.header_type);
        header.extend_from_slice(&self.granule_position.to_le_bytes());
        header.extend_from_slice(&self.serial.to_le_bytes());
        header.extend_from_slice(&self.sequence.to_le_bytes());
        header.extend_from_slice(&[0; 4]);
        header.push(self.lacing.len() as u8);
        header.extend_from_slice(&self.lacing);

        let crc = page_checksum(&header, &self.body);
        header[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&crc.to_le_bytes());
        header.extend_from_slice(&self.body);
        header
    }
}

/// Result of asking the sync state for a page
#[derive(Debug, PartialEq, Eq)]
pub enum PageOut {
    Page(OggPage),
    /// No complete page is buffered yet
    NeedMoreData,
    /// Bytes were dropped to find the next capture pattern
    Desynced { skipped: usize },
}

/// Page synchronisation over an incrementally fed byte buffer.
#[derive(Debug, Default)]
pub struct SyncState {
    data: Vec<u8>,
    start: usize,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes from the source
    pub fn write(&mut self, bytes: &[u8]) {
        if self.start > 0 {
            self.data.drain(..self.start);
            self.start = 0;
        }
        self.data.extend_from_slice(bytes);
    }

    /// Bytes buffered but not yet returned as a page
    pub fn buffered(&self) -> usize {
        self.data.len() - self.start
    }

    pub fn page_out(&mut self) -> PageOut {
        let buf = &self.data[self.start..];
        if buf.len() < HEADER_LEN {
            return PageOut::NeedMoreData;
        }
        if &buf[..4] != CAPTURE_PATTERN {
            return self.skip_to_capture();
        }
        if buf[4] != 0 {
            trace!("Unsupported page version {}", buf[4]);
            return self.skip_to_capture();
        }

        let header_len = HEADER_LEN + buf[26] as usize;
        if buf.len() < header_len {
            return PageOut::NeedMoreData;
        }
        let lacing = &buf[HEADER_LEN..header_len];
        let body_len: usize = lacing.iter().map(|&l| l as usize).sum();
        if buf.len() < header_len + body_len {
            return PageOut::NeedMoreData;
        }

        let header = &buf[..header_len];
        let body = &buf[header_len..header_len + body_len];
        let stored = read_u32(header, CRC_OFFSET);
        if stored != page_checksum(header, body) {
            trace!("Page CRC mismatch (stored {:#010x})", stored);
            return self.skip_to_capture();
        }

        let page = OggPage {
            version: header[4],
            header_type: header[5],
            granule_position: i64::from_le_bytes([
                header[6], header[7], header[8], header[9],
                header[10], header[11], header[12], header[13],
            ]),
            serial: read_u32(header, 14),
            sequence: read_u32(header, 18),
            lacing: lacing.to_vec(),
            body: body.to_vec(),
        };
        self.start += header_len + body_len;
        PageOut::Page(page)
    }

    /// Drop bytes up to the next candidate capture pattern
    fn skip_to_capture(&mut self) -> PageOut {
        let buf = &self.data[self.start..];
        let skipped = buf[1..]
            .iter()
            .position(|&b| b == CAPTURE_PATTERN[0])
            .map_or(buf.len(), |pos| pos + 1);
        self.start += skipped;
        PageOut::Desynced { skipped }
    }

    /// Release the buffer
    pub fn clear(&mut self) {
        self.data = Vec::new();
        self.start = 0;
    }
}

/// One reassembled packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OggPacket {
    pub data: Vec<u8>,
    /// First packet of the logical stream
    pub bos: bool,
    /// Last packet completed on an end-of-stream page
    pub eos: bool,
    /// Set on the last packet completed on a page, -1 otherwise
    pub granule_position: i64,
    pub packet_no: u64,
}

impl OggPacket {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            bos: false,
            eos: false,
            granule_position: -1,
            packet_no: 0,
        }
    }
}

/// Result of asking the stream state for a packet
#[derive(Debug, PartialEq, Eq)]
pub enum PacketOut {
    Packet(OggPacket),
    /// Data was lost between pages; reported once per gap
    Hole,
    /// All complete packets have been returned
    NeedMorePages,
}

#[derive(Debug)]
enum Queued {
    Packet(OggPacket),
    Hole,
}

/// Packet reassembly for one logical stream.
#[derive(Debug)]
pub struct StreamState {
    serial: u32,
    expected_sequence: Option<u32>,
    partial: Vec<u8>,
    /// Skipping a continued packet whose start was never seen
    discarding: bool,
    queue: VecDeque<Queued>,
    packet_no: u64,
    bos_seen: bool,
}

impl StreamState {
    pub fn new(serial: u32) -> Self {
        Self {
            serial,
            expected_sequence: None,
            partial: Vec::new(),
            discarding: false,
            queue: VecDeque::new(),
            packet_no: 0,
            bos_seen: false,
        }
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    /// Add a page's packets to the stream
    pub fn page_in(&mut self, page: &OggPage) -> Result<(), EngineError> {
        if page.serial != self.serial {
            return Err(EngineError::SerialMismatch {
                expected: self.serial,
                found: page.serial,
            });
        }
        if page.version != 0 {
            return Err(EngineError::PageVersion(page.version));
        }

        match self.expected_sequence {
            Some(expected) if expected != page.sequence => {
                trace!("Page sequence gap: expected {}, got {}", expected, page.sequence);
                self.partial.clear();
                self.queue.push_back(Queued::Hole);
                self.discarding = page.is_continued();
            }
            Some(_) => {
                if page.is_continued() {
                    // Nothing to continue after a packet that was dropped
                    self.discarding = self.discarding || self.partial.is_empty();
                } else if !self.partial.is_empty() {
                    self.partial.clear();
                    self.queue.push_back(Queued::Hole);
                }
            }
            None => self.discarding = page.is_continued(),
        }
        self.expected_sequence = Some(page.sequence.wrapping_add(1));
        self.bos_seen |= page.is_bos();

        let mut offset = 0;
        let mut last_completed = None;
        for &len in &page.lacing {
            let segment = &page.body[offset..offset + len as usize];
            offset += len as usize;

            if self.discarding {
                if len < 255 {
                    self.discarding = false;
                }
                continue;
            }

            self.partial.extend_from_slice(segment);
            if len < 255 {
                let packet = OggPacket {
                    data: std::mem::take(&mut self.partial),
                    bos: self.bos_seen && self.packet_no == 0,
                    eos: false,
                    granule_position: -1,
                    packet_no: self.packet_no,
                };
                self.packet_no += 1;
                self.queue.push_back(Queued::Packet(packet));
                last_completed = Some(self.queue.len() - 1);
            }
        }

        if let Some(index) = last_completed {
            if let Some(Queued::Packet(packet)) = self.queue.get_mut(index) {
                packet.granule_position = page.granule_position;
                packet.eos = page.is_eos();
            }
        }
        Ok(())
    }

    pub fn packet_out(&mut self) -> PacketOut {
        match self.queue.pop_front() {
            Some(Queued::Packet(packet)) => PacketOut::Packet(packet),
            Some(Queued::Hole) => PacketOut::Hole,
            None => PacketOut::NeedMorePages,
        }
    }

    /// Release buffered packet data
    pub fn clear(&mut self) {
        self.partial = Vec::new();
        self.queue.clear();
        self.discarding = false;
    }
}
