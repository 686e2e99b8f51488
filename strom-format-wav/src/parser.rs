// Strom
// Copyright (c) 2026 The Project Strom Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::cmp;

use log::{debug, info};

use strom_core::errors::{DiagnosticCode, DiagnosticLog};
use strom_core::io::{ByteReader, RingBuffer};

use crate::chunks::{
    parse_fmt_chunk, Endianness, FormatInfo, DATA_CHUNK_ID, FMT_CHUNK_ID, LIST_CHUNK_ID,
    RF64_STREAM_MARKER, RIFF_STREAM_MARKER, RIFX_STREAM_MARKER, WAVE_RIFF_FORM,
};

const RIFF_HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;

/// The outcome of a single [`ChunkParser::advance`] step.
pub(crate) enum Advance {
    /// Parsing cannot continue until at least `needed` bytes are buffered.
    NeedData { needed: usize },
    /// A valid `fmt ` chunk was parsed; `format()` is now available.
    Format,
    /// `len` bytes of block-aligned sample data are buffered and ready for conversion. The caller
    /// converts them, then reports consumption with [`ChunkParser::consume_data`].
    Data { len: usize },
    /// The declared data chunk has been fully consumed.
    Finished,
    /// A fatal diagnostic was recorded; the parser will make no further progress.
    Failed,
}

enum Stage {
    RiffHeader,
    ChunkHeader,
    FmtChunk { len: u32 },
    SkipChunk { remaining: u64, trailing: bool },
    DataChunk,
    Trailing,
    Failed,
}

/// A resumable parser for the chunked structure of a RIFF/RIFX WAVE stream.
///
/// The parser consumes bytes from a [`RingBuffer`] it does not own. Whenever the buffered bytes
/// end mid-unit the parser suspends, reporting how many contiguous bytes it needs, and resumes
/// from the same point on the next call. No unit is consumed until it has parsed completely, so
/// the caller may feed input sliced at arbitrary positions.
pub(crate) struct ChunkParser {
    stage: Stage,
    endianness: Endianness,
    riff_len: Option<u32>,
    format: Option<FormatInfo>,
    declared_data_len: Option<u32>,
    data_remaining: u64,
    pos: u64,
}

impl ChunkParser {
    pub(crate) fn new() -> Self {
        ChunkParser {
            stage: Stage::RiffHeader,
            endianness: Endianness::Little,
            riff_len: None,
            format: None,
            declared_data_len: None,
            data_remaining: 0,
            pos: 0,
        }
    }

    /// The parsed format, available once a valid `fmt ` chunk has been consumed.
    pub(crate) fn format(&self) -> Option<&FormatInfo> {
        self.format.as_ref()
    }

    /// The absolute stream offset of the next unparsed byte.
    pub(crate) fn pos(&self) -> u64 {
        self.pos
    }

    /// The size declared by the RIFF header, once it has been parsed.
    pub(crate) fn riff_len(&self) -> Option<u32> {
        self.riff_len
    }

    /// The size declared by the data chunk header, once it has been parsed.
    pub(crate) fn declared_data_len(&self) -> Option<u32> {
        self.declared_data_len
    }

    /// Declared data bytes not yet consumed.
    pub(crate) fn data_remaining(&self) -> u64 {
        self.data_remaining
    }

    /// True while declared data bytes remain to be consumed.
    pub(crate) fn in_data(&self) -> bool {
        matches!(self.stage, Stage::DataChunk) && self.data_remaining > 0
    }

    /// Accounts for `len` bytes of sample data the caller consumed from the ring after an
    /// [`Advance::Data`] hand-off.
    pub(crate) fn consume_data(&mut self, len: usize) {
        debug_assert!(matches!(self.stage, Stage::DataChunk));
        debug_assert!(len as u64 <= self.data_remaining);

        let len = cmp::min(len as u64, self.data_remaining);
        self.data_remaining -= len;
        self.pos += len;
    }

    /// Drives the parser over the buffered bytes until it produces a hand-off or suspends.
    pub(crate) fn advance(&mut self, ring: &mut RingBuffer, diags: &mut DiagnosticLog) -> Advance {
        loop {
            match self.stage {
                Stage::RiffHeader => {
                    if ring.available() < RIFF_HEADER_LEN {
                        return Advance::NeedData { needed: RIFF_HEADER_LEN };
                    }

                    let mut header = [0u8; RIFF_HEADER_LEN];
                    let Ok(view) = ring.peek(0, RIFF_HEADER_LEN) else {
                        return Advance::NeedData { needed: RIFF_HEADER_LEN };
                    };
                    header.copy_from_slice(view);

                    let marker = [header[0], header[1], header[2], header[3]];

                    self.endianness = match marker {
                        RIFF_STREAM_MARKER => Endianness::Little,
                        RIFX_STREAM_MARKER => {
                            diags.warn(
                                DiagnosticCode::AdvisoryMismatch,
                                "RIFX header: sample data is big endian",
                                self.pos,
                            );
                            Endianness::Big
                        }
                        RF64_STREAM_MARKER => {
                            diags.fatal(
                                DiagnosticCode::InvalidContainer,
                                "Invalid WAV file: RF64 is not supported",
                                self.pos,
                            );
                            self.stage = Stage::Failed;
                            return Advance::Failed;
                        }
                        _ => {
                            diags.fatal(
                                DiagnosticCode::InvalidContainer,
                                "Invalid WAV file: missing RIFF stream marker",
                                self.pos,
                            );
                            self.stage = Stage::Failed;
                            return Advance::Failed;
                        }
                    };

                    let form = [header[8], header[9], header[10], header[11]];

                    if form != WAVE_RIFF_FORM {
                        diags.fatal(
                            DiagnosticCode::InvalidContainer,
                            "Invalid WAV file: RIFF form is not WAVE",
                            self.pos + 8,
                        );
                        self.stage = Stage::Failed;
                        return Advance::Failed;
                    }

                    let size = [header[4], header[5], header[6], header[7]];

                    let riff_len = match self.endianness {
                        Endianness::Little => u32::from_le_bytes(size),
                        Endianness::Big => u32::from_be_bytes(size),
                    };

                    debug!("riff header: declared size {}, {:?} endian", riff_len, self.endianness);

                    self.riff_len = Some(riff_len);
                    ring.discard(RIFF_HEADER_LEN);
                    self.pos += RIFF_HEADER_LEN as u64;
                    self.stage = Stage::ChunkHeader;
                }
                Stage::ChunkHeader => {
                    if ring.available() < CHUNK_HEADER_LEN {
                        return Advance::NeedData { needed: CHUNK_HEADER_LEN };
                    }

                    let mut header = [0u8; CHUNK_HEADER_LEN];
                    let Ok(view) = ring.peek(0, CHUNK_HEADER_LEN) else {
                        return Advance::NeedData { needed: CHUNK_HEADER_LEN };
                    };
                    header.copy_from_slice(view);

                    let tag = [header[0], header[1], header[2], header[3]];
                    let len = self.read_size([header[4], header[5], header[6], header[7]]);

                    // Chunks are 2-byte aligned; an odd-sized chunk is followed by a pad byte
                    // that belongs to no chunk.
                    let padded = u64::from(len) + u64::from(len & 1);

                    match tag {
                        FMT_CHUNK_ID if self.format.is_none() => {
                            self.warn_odd(tag, len, diags);
                            ring.discard(CHUNK_HEADER_LEN);
                            self.pos += CHUNK_HEADER_LEN as u64;
                            self.stage = Stage::FmtChunk { len };
                        }
                        FMT_CHUNK_ID => {
                            diags.warn(
                                DiagnosticCode::RecoverableChunkSkip,
                                "duplicate fmt chunk skipped",
                                self.pos,
                            );
                            self.warn_odd(tag, len, diags);
                            ring.discard(CHUNK_HEADER_LEN);
                            self.pos += CHUNK_HEADER_LEN as u64;
                            self.stage = Stage::SkipChunk { remaining: padded, trailing: false };
                        }
                        DATA_CHUNK_ID => {
                            if self.format.is_none() {
                                diags.fatal(
                                    DiagnosticCode::OrderingViolation,
                                    "data chunk before fmt chunk",
                                    self.pos,
                                );
                                self.stage = Stage::Failed;
                                return Advance::Failed;
                            }

                            debug!("data chunk: declared size {}", len);

                            ring.discard(CHUNK_HEADER_LEN);
                            self.pos += CHUNK_HEADER_LEN as u64;
                            self.declared_data_len = Some(len);
                            self.data_remaining = u64::from(len);
                            self.stage = Stage::DataChunk;
                        }
                        LIST_CHUNK_ID if len >= 4 => {
                            // Peek the list form without consuming the header; it decides the
                            // diagnostic only, the chunk is skipped either way.
                            if ring.available() < CHUNK_HEADER_LEN + 4 {
                                return Advance::NeedData { needed: CHUNK_HEADER_LEN + 4 };
                            }

                            let mut form = [0u8; 4];
                            let Ok(view) = ring.peek(CHUNK_HEADER_LEN, 4) else {
                                return Advance::NeedData { needed: CHUNK_HEADER_LEN + 4 };
                            };
                            form.copy_from_slice(view);

                            if form == *b"wave" {
                                diags.warn(
                                    DiagnosticCode::RecoverableChunkSkip,
                                    "LIST chunk with form 'wave' skipped; nested chunks are not \
                                     decoded",
                                    self.pos,
                                );
                            }
                            else {
                                info!(
                                    "ignoring LIST chunk: form={}, len={}",
                                    String::from_utf8_lossy(&form),
                                    len
                                );
                            }

                            self.warn_odd(tag, len, diags);
                            ring.discard(CHUNK_HEADER_LEN);
                            self.pos += CHUNK_HEADER_LEN as u64;
                            self.stage = Stage::SkipChunk { remaining: padded, trailing: false };
                        }
                        _ => {
                            // As per the RIFF spec, unknown chunks are to be ignored.
                            info!(
                                "ignoring unknown chunk: tag={}, len={}",
                                String::from_utf8_lossy(&tag),
                                len
                            );
                            self.warn_odd(tag, len, diags);
                            ring.discard(CHUNK_HEADER_LEN);
                            self.pos += CHUNK_HEADER_LEN as u64;
                            self.stage = Stage::SkipChunk { remaining: padded, trailing: false };
                        }
                    }
                }
                Stage::FmtChunk { len } => {
                    let padded = (u64::from(len) + u64::from(len & 1)) as usize;

                    if ring.available() < padded {
                        return Advance::NeedData { needed: padded };
                    }

                    let Ok(view) = ring.peek(0, len as usize) else {
                        return Advance::NeedData { needed: padded };
                    };
                    let mut reader = ByteReader::new(view);

                    match parse_fmt_chunk(&mut reader, len, self.endianness, self.pos, diags) {
                        Ok(Some(format)) => {
                            debug!("{}", format);
                            self.format = Some(format);
                            ring.discard(padded);
                            self.pos += padded as u64;
                            self.stage = Stage::ChunkHeader;
                            return Advance::Format;
                        }
                        Ok(None) => {
                            self.stage = Stage::Failed;
                            return Advance::Failed;
                        }
                        Err(_) => return Advance::NeedData { needed: padded },
                    }
                }
                Stage::SkipChunk { ref mut remaining, trailing } => {
                    let n = cmp::min(*remaining, ring.available() as u64) as usize;

                    ring.discard(n);
                    self.pos += n as u64;
                    *remaining -= n as u64;

                    if *remaining > 0 {
                        return Advance::NeedData { needed: 1 };
                    }

                    self.stage = if trailing { Stage::Trailing } else { Stage::ChunkHeader };
                }
                Stage::DataChunk => {
                    if self.data_remaining == 0 {
                        debug!("data chunk complete");
                        self.stage = Stage::Trailing;
                        return Advance::Finished;
                    }

                    let Some(format) = &self.format else {
                        self.stage = Stage::Failed;
                        return Advance::Failed;
                    };

                    let block = u64::from(format.block_align);
                    let run = cmp::min(ring.available() as u64, self.data_remaining);
                    let aligned = run - (run % block);

                    if aligned == 0 {
                        return Advance::NeedData { needed: block as usize };
                    }

                    return Advance::Data { len: aligned as usize };
                }
                Stage::Trailing => {
                    if ring.available() < CHUNK_HEADER_LEN {
                        return Advance::NeedData { needed: CHUNK_HEADER_LEN };
                    }

                    let mut header = [0u8; CHUNK_HEADER_LEN];
                    let Ok(view) = ring.peek(0, CHUNK_HEADER_LEN) else {
                        return Advance::NeedData { needed: CHUNK_HEADER_LEN };
                    };
                    header.copy_from_slice(view);

                    let tag = [header[0], header[1], header[2], header[3]];

                    // A chunk identifier is printable ASCII. Anything else after the data chunk
                    // is not a chunk and is dropped.
                    if tag.iter().all(|&b| (0x20..=0x7e).contains(&b)) {
                        let len = self.read_size([header[4], header[5], header[6], header[7]]);
                        let padded = u64::from(len) + u64::from(len & 1);

                        if tag == DATA_CHUNK_ID {
                            diags.warn(
                                DiagnosticCode::RecoverableChunkSkip,
                                "multiple data chunks are not supported; skipping",
                                self.pos,
                            );
                        }
                        else {
                            info!(
                                "skipping trailing chunk: tag={}, len={}",
                                String::from_utf8_lossy(&tag),
                                len
                            );
                        }

                        ring.discard(CHUNK_HEADER_LEN);
                        self.pos += CHUNK_HEADER_LEN as u64;
                        self.stage = Stage::SkipChunk { remaining: padded, trailing: true };
                    }
                    else {
                        // Resync instead of discarding wholesale: drop only the bytes before
                        // the next plausible chunk id, so a valid trailing chunk following the
                        // garbage still parses.
                        let available = ring.available();

                        let skip = {
                            let Ok(view) = ring.peek(0, available) else {
                                return Advance::NeedData { needed: CHUNK_HEADER_LEN };
                            };

                            let mut skip = available;
                            for i in 1..available {
                                let candidate = &view[i..cmp::min(i + 4, available)];
                                if candidate.iter().all(|&b| (0x20..=0x7e).contains(&b)) {
                                    skip = i;
                                    break;
                                }
                            }
                            skip
                        };

                        diags.warn(
                            DiagnosticCode::AdvisoryMismatch,
                            format!("dropped {} unrecognized bytes after the data chunk", skip),
                            self.pos,
                        );

                        ring.discard(skip);
                        self.pos += skip as u64;
                    }
                }
                Stage::Failed => return Advance::Failed,
            }
        }
    }

    fn read_size(&self, bytes: [u8; 4]) -> u32 {
        match self.endianness {
            Endianness::Little => u32::from_le_bytes(bytes),
            Endianness::Big => u32::from_be_bytes(bytes),
        }
    }

    fn warn_odd(&self, tag: [u8; 4], len: u32, diags: &mut DiagnosticLog) {
        if len & 1 == 1 {
            diags.warn(
                DiagnosticCode::AdvisoryMismatch,
                format!(
                    "odd chunk size {} for {}; a pad byte follows",
                    len,
                    String::from_utf8_lossy(&tag)
                ),
                self.pos,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(parser: &mut ChunkParser, ring: &mut RingBuffer, bytes: &[u8]) -> Vec<String> {
        let mut diags = DiagnosticLog::new();
        assert_eq!(ring.write(bytes), bytes.len());
        loop {
            match parser.advance(ring, &mut diags) {
                Advance::NeedData { .. } | Advance::Failed | Advance::Finished => break,
                Advance::Format => continue,
                Advance::Data { len } => {
                    ring.discard(len);
                    parser.consume_data(len);
                }
            }
        }
        diags
            .warnings()
            .iter()
            .chain(diags.errors().iter())
            .map(|d| d.message.clone())
            .collect()
    }

    fn header_and_fmt() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"RIFF");
        buf.extend_from_slice(&100u32.to_le_bytes());
        buf.extend_from_slice(b"WAVE");
        buf.extend_from_slice(b"fmt ");
        buf.extend_from_slice(&16u32.to_le_bytes());
        buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
        buf.extend_from_slice(&1u16.to_le_bytes()); // mono
        buf.extend_from_slice(&8_000u32.to_le_bytes());
        buf.extend_from_slice(&16_000u32.to_le_bytes());
        buf.extend_from_slice(&2u16.to_le_bytes());
        buf.extend_from_slice(&16u16.to_le_bytes());
        buf
    }

    #[test]
    fn header_parses_across_partial_feeds() {
        let mut parser = ChunkParser::new();
        let mut ring = RingBuffer::with_capacity(4096);
        let bytes = header_and_fmt();

        // One byte at a time; the parser suspends until each unit completes.
        for chunk in bytes.chunks(1) {
            feed(&mut parser, &mut ring, chunk);
        }

        let format = parser.format().unwrap();
        assert_eq!(format.sample_rate, 8_000);
        assert_eq!(format.block_align, 2);
    }

    #[test]
    fn data_before_fmt_is_fatal() {
        let mut parser = ChunkParser::new();
        let mut ring = RingBuffer::with_capacity(4096);

        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&100u32.to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&4u32.to_le_bytes());

        let messages = feed(&mut parser, &mut ring, &bytes);
        assert!(parser.format().is_none());
        assert!(messages.iter().any(|m| m.contains("data chunk before fmt")));
    }

    #[test]
    fn unknown_and_odd_chunks_are_skipped() {
        let mut parser = ChunkParser::new();
        let mut ring = RingBuffer::with_capacity(4096);

        let mut bytes = header_and_fmt();
        bytes.extend_from_slice(b"JUNK");
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(&[0, 0, 0, 0]); // 3 bytes + pad
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&[0, 0]);

        let messages = feed(&mut parser, &mut ring, &bytes);
        assert!(parser.format().is_some());
        assert_eq!(parser.data_remaining(), 0);
        assert!(messages.iter().any(|m| m.contains("odd chunk")));
    }

    #[test]
    fn rifx_flips_size_fields() {
        let mut parser = ChunkParser::new();
        let mut ring = RingBuffer::with_capacity(4096);

        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFX");
        bytes.extend_from_slice(&100u32.to_be_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_be_bytes());
        bytes.extend_from_slice(&1u16.to_be_bytes());
        bytes.extend_from_slice(&2u16.to_be_bytes());
        bytes.extend_from_slice(&44_100u32.to_be_bytes());
        bytes.extend_from_slice(&176_400u32.to_be_bytes());
        bytes.extend_from_slice(&4u16.to_be_bytes());
        bytes.extend_from_slice(&16u16.to_be_bytes());

        let messages = feed(&mut parser, &mut ring, &bytes);
        let format = parser.format().unwrap();
        assert_eq!(format.endianness, Endianness::Big);
        assert_eq!(format.sample_rate, 44_100);
        assert!(messages.iter().any(|m| m.contains("big endian")));
    }
}
