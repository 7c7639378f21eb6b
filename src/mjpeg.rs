//! JPEG frame extraction from MJPEG (`multipart/x-mixed-replace`) bodies.
//!
//! The scanner ignores multipart boundaries and part headers entirely and
//! works on JPEG markers, so it handles a bare `image/jpeg` body as well.

use bytes::{Buf, Bytes, BytesMut};
use image::{ImageError, ImageFormat, ImageReader};
use std::io::Cursor;

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;

/// Drop buffered bytes once this much accumulates without a complete frame
const MAX_BUFFERED: usize = 8 * 1024 * 1024;

enum Scan {
    /// Frame occupies `start..end` of the buffer
    Frame { start: usize, end: usize },
    /// Frame starting at `start` is not complete yet
    Partial { start: usize },
    /// Bytes at `start..start + 2` looked like SOI but the segment layout is broken
    Corrupt { start: usize },
    /// A new SOI at `at` interrupted an unfinished frame
    Restart { at: usize },
    NoStart,
}

fn is_standalone(marker: u8) -> bool {
    marker == 0x01 || (0xD0..=0xD7).contains(&marker)
}

fn find_soi(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .windows(2)
        .position(|w| w[0] == 0xFF && w[1] == SOI)
        .map(|pos| pos + from)
}

fn segment_len(buf: &[u8], at: usize) -> Option<usize> {
    let hi = *buf.get(at)? as usize;
    let lo = *buf.get(at + 1)? as usize;
    Some((hi << 8) | lo)
}

/// End of the entropy-coded data following a scan header, or the offset of
/// the next marker when another segment follows.
fn scan_entropy(buf: &[u8], mut i: usize) -> Option<(usize, u8)> {
    while i + 1 < buf.len() {
        if buf[i] != 0xFF {
            i += 1;
            continue;
        }
        let next = buf[i + 1];
        if next == 0x00 || (0xD0..=0xD7).contains(&next) || next == 0xFF {
            i += if next == 0xFF { 1 } else { 2 };
            continue;
        }
        return Some((i, next));
    }
    None
}

fn scan(buf: &[u8]) -> Scan {
    let Some(start) = find_soi(buf, 0) else {
        return Scan::NoStart;
    };

    let mut i = start + 2;
    loop {
        let Some(&byte) = buf.get(i) else {
            return Scan::Partial { start };
        };
        if byte != 0xFF {
            return Scan::Corrupt { start };
        }
        // Fill bytes before a marker
        while buf.get(i + 1) == Some(&0xFF) {
            i += 1;
        }
        let Some(&marker) = buf.get(i + 1) else {
            return Scan::Partial { start };
        };

        match marker {
            EOI => return Scan::Frame { start, end: i + 2 },
            SOI => return Scan::Restart { at: i },
            m if is_standalone(m) => i += 2,
            m => {
                let Some(len) = segment_len(buf, i + 2) else {
                    return Scan::Partial { start };
                };
                if len < 2 {
                    return Scan::Corrupt { start };
                }
                let segment_end = i + 2 + len;
                if m != SOS {
                    i = segment_end;
                    continue;
                }
                match scan_entropy(buf, segment_end) {
                    Some((at, EOI)) => return Scan::Frame { start, end: at + 2 },
                    Some((at, SOI)) => return Scan::Restart { at },
                    Some((at, _)) => i = at,
                    None => return Scan::Partial { start },
                }
            }
        }
    }
}

/// Incremental JPEG frame scanner for a chunked HTTP body
#[derive(Debug, Default)]
pub struct FrameScanner {
    buffer: BytesMut,
}

impl FrameScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        if self.buffer.len() > MAX_BUFFERED {
            tracing::warn!("MJPEG buffer exceeded {} bytes without a frame, dropping", MAX_BUFFERED);
            self.buffer.clear();
        }
    }

    /// Next complete frame, if one is buffered
    pub fn next_frame(&mut self) -> Option<Bytes> {
        loop {
            match scan(&self.buffer) {
                Scan::Frame { start, end } => {
                    self.buffer.advance(start);
                    return Some(self.buffer.split_to(end - start).freeze());
                }
                Scan::Partial { start } => {
                    self.buffer.advance(start);
                    return None;
                }
                Scan::Corrupt { start } => {
                    tracing::debug!("Skipping malformed JPEG start at offset {}", start);
                    self.buffer.advance(start + 2);
                }
                Scan::Restart { at } => {
                    tracing::debug!("Truncated JPEG frame, resyncing at offset {}", at);
                    self.buffer.advance(at);
                }
                Scan::NoStart => {
                    // Keep a trailing 0xFF that may begin the next SOI
                    let keep = usize::from(self.buffer.last() == Some(&0xFF));
                    let len = self.buffer.len();
                    self.buffer.advance(len - keep);
                    return None;
                }
            }
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// Intrinsic `(width, height)` of a JPEG frame, from its decoded headers
pub fn jpeg_dimensions(frame: &[u8]) -> Result<(u32, u32), ImageError> {
    ImageReader::with_format(Cursor::new(frame), ImageFormat::Jpeg).into_dimensions()
}
