//! Stream synchronizer: turns a chunked byte source into validated pages.

use std::io::{ErrorKind, Read};

use log::trace;

use crate::engine::{OggPage, PageOut, SyncState};
use crate::error::StreamError;

/// Sequential byte source read in fixed-size chunks.
pub(crate) struct ByteSource {
    reader: Box<dyn Read + Send>,
    chunk: Vec<u8>,
    bytes_read: u64,
    exhausted: bool,
}

impl ByteSource {
    pub fn new<R: Read + Send + 'static>(reader: R, chunk_size: usize) -> Self {
        Self {
            reader: Box::new(reader),
            chunk: vec![0; chunk_size],
            bytes_read: 0,
            exhausted: false,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Read one chunk into `sync`. Returns `false` at end of stream.
    pub fn feed(&mut self, sync: &mut SyncState) -> Result<bool, StreamError> {
        if self.exhausted {
            return Ok(false);
        }
        loop {
            match self.reader.read(&mut self.chunk) {
                Ok(0) => {
                    trace!("Byte source exhausted after {} bytes", self.bytes_read);
                    self.exhausted = true;
                    return Ok(false);
                }
                Ok(n) => {
                    sync.write(&self.chunk[..n]);
                    self.bytes_read += n as u64;
                    return Ok(true);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(StreamError::Io(e)),
            }
        }
    }
}

/// What the synchronizer produced
#[derive(Debug)]
pub(crate) enum SyncEvent {
    Page(OggPage),
    Desynced { skipped: usize },
    EndOfStream,
}

/// Next page, desync report, or end of stream. Reads from `source` only
/// while no complete page is buffered.
pub(crate) fn next_page(
    sync: &mut SyncState,
    source: &mut ByteSource,
) -> Result<SyncEvent, StreamError> {
    loop {
        match sync.page_out() {
            PageOut::Page(page) => {
                trace!(
                    "Page {} of stream {:#010x}, {} bytes",
                    page.sequence(),
                    page.serial(),
                    page.len()
                );
                return Ok(SyncEvent::Page(page));
            }
            PageOut::Desynced { skipped } => return Ok(SyncEvent::Desynced { skipped }),
            PageOut::NeedMoreData => {
                if !source.feed(sync)? {
                    return Ok(SyncEvent::EndOfStream);
                }
            }
        }
    }
}
