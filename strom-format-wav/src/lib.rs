// Strom
// Copyright (c) 2026 The Project Strom Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! A push-driven decoder for RIFF/RIFX WAVE streams.
//!
//! [`WavDecoder`] accepts byte slices of any length as they arrive and produces de-interleaved
//! `f32` channel planes normalized to `[-1.0, +1.0]`. Input never needs to respect chunk, frame,
//! or even header boundaries: the decoder buffers partial units internally and resumes when more
//! bytes are fed. Malformed but non-essential parts of a stream are skipped with warnings; fatal
//! problems stop the decoder and are reported as structured diagnostics rather than panics.
//!
//! Supported sample codings are PCM (8/16/24/32-bit integer), IEEE float (32/64-bit), and G.711
//! A-law/µ-law, in both little-endian (RIFF) and big-endian (RIFX) containers, including
//! `WAVEFORMATEXTENSIBLE` streams resolving to one of the above.

use std::cmp;

use log::debug;

use strom_core::errors::DiagnosticLog;
use strom_core::io::RingBuffer;

mod chunks;
mod parser;
mod pcm;

pub use chunks::{Endianness, FormatInfo, FormatTag};
pub use strom_core::audio::{AudioPlanes, Channels};
pub use strom_core::errors::{Diagnostic, DiagnosticCode, Severity};

use parser::{Advance, ChunkParser};
use pcm::Converter;

/// The lifecycle states of a [`WavDecoder`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DecoderState {
    /// No format has been parsed yet.
    Uninit,
    /// A valid `fmt ` chunk has been parsed; sample data can be decoded.
    Decoding,
    /// The stream is over: the declared data was fully produced, the caller flushed, or the
    /// decoder was freed. Further input is dropped.
    Ended,
    /// A fatal diagnostic was recorded. Only [`WavDecoder::reset`] leaves this state.
    Error,
}

/// `WavDecoderOptions` specifies the buffering behaviour of a [`WavDecoder`].
#[derive(Copy, Clone, Debug)]
pub struct WavDecoderOptions {
    /// The initial ring buffer length in bytes. Rounded up to a power of two.
    pub ring_len: usize,
    /// The ceiling the ring may grow to when a single chunk requires more contiguous bytes than
    /// the ring holds. A requirement above the ceiling is a fatal ring overflow.
    pub max_ring_len: usize,
}

impl Default for WavDecoderOptions {
    fn default() -> Self {
        WavDecoderOptions { ring_len: 32 * 1024, max_ring_len: 1024 * 1024 }
    }
}

/// The decoded output of a single decoder call.
///
/// Diagnostics carried here are only those generated by the call that returned this value;
/// [`WavDecoder::info`] aggregates them over the life of the decoder.
#[derive(Clone, Debug, Default)]
pub struct DecodedAudio {
    /// One plane of `f32` samples per channel, in the channel order of the stream.
    pub channel_data: Vec<Vec<f32>>,
    /// Complete frames converted by this call.
    pub samples_decoded: u64,
    /// How many input bytes the call accepted. Less than the input length only when the internal
    /// buffer reached its ceiling; the caller should resubmit the residual bytes.
    pub accepted_bytes: usize,
    /// Errors generated by this call.
    pub errors: Vec<Diagnostic>,
    /// Warnings generated by this call.
    pub warnings: Vec<Diagnostic>,
}

/// A read-only snapshot of decoder state.
pub struct DecoderInfo<'a> {
    pub state: DecoderState,
    pub format: Option<&'a FormatInfo>,
    /// Data-chunk bytes consumed since the last reset. Header and auxiliary chunk bytes are not
    /// counted.
    pub decoded_bytes: u64,
    /// Complete frames converted since the last reset.
    pub samples_decoded: u64,
    pub errors: &'a [Diagnostic],
    pub warnings: &'a [Diagnostic],
}

/// A push-driven WAVE decoder.
///
/// Feed bytes with [`decode`](WavDecoder::decode), finish with [`flush`](WavDecoder::flush).
/// A decoder is strictly sequential: every call runs to completion, and one instance must not be
/// shared between threads. Distinct instances are independent.
pub struct WavDecoder {
    opts: WavDecoderOptions,
    ring: RingBuffer,
    parser: ChunkParser,
    converter: Option<Converter>,
    state: DecoderState,
    decoded_bytes: u64,
    samples_decoded: u64,
    diags: DiagnosticLog,
    flushed: bool,
}

impl WavDecoder {
    pub fn new() -> Self {
        Self::with_options(Default::default())
    }

    pub fn with_options(opts: WavDecoderOptions) -> Self {
        let opts = WavDecoderOptions {
            ring_len: opts.ring_len,
            max_ring_len: cmp::max(opts.max_ring_len, opts.ring_len),
        };

        WavDecoder {
            ring: RingBuffer::with_capacity(opts.ring_len),
            parser: ChunkParser::new(),
            converter: None,
            state: DecoderState::Uninit,
            decoded_bytes: 0,
            samples_decoded: 0,
            diags: DiagnosticLog::new(),
            flushed: false,
            opts,
        }
    }

    /// The current lifecycle state.
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// The parsed stream format, once a valid `fmt ` chunk has been consumed.
    pub fn format(&self) -> Option<&FormatInfo> {
        self.parser.format()
    }

    /// A read-only snapshot of the decoder: state, format, cumulative counters, and all
    /// diagnostics since the last reset.
    pub fn info(&self) -> DecoderInfo<'_> {
        DecoderInfo {
            state: self.state,
            format: self.parser.format(),
            decoded_bytes: self.decoded_bytes,
            samples_decoded: self.samples_decoded,
            errors: self.diags.errors(),
            warnings: self.diags.warnings(),
        }
    }

    /// Decodes as much of `input` as possible, in any state of header or body.
    ///
    /// Bytes are staged in the internal ring, the chunk parser runs to quiescence, and every
    /// complete block of sample data that became available is converted. The returned planes hold
    /// the frames produced by this call only.
    pub fn decode(&mut self, input: &[u8]) -> DecodedAudio {
        let mark = self.mark();

        match self.state {
            DecoderState::Error => {
                return DecodedAudio { errors: self.diags.errors().to_vec(), ..Default::default() };
            }
            DecoderState::Ended => {
                if !input.is_empty() {
                    self.diags.warn(
                        DiagnosticCode::AdvisoryMismatch,
                        format!("dropped {} bytes received after end of stream", input.len()),
                        self.parser.pos(),
                    );
                }
                return self.finish_call(mark, Vec::new(), 0, 0);
            }
            _ => (),
        }

        let mut planes = match self.parser.format() {
            Some(format) => AudioPlanes::new(usize::from(format.num_channels)),
            None => AudioPlanes::new(0),
        };

        let mut samples = 0;
        let accepted = self.ingest(input, &mut planes, &mut samples);

        self.finish_call(mark, planes.into_channel_data(), accepted, samples)
    }

    /// Decodes block-aligned sample data, allocating fresh planes.
    ///
    /// A hot-loop variant of [`decode`](WavDecoder::decode) for callers that have already fed the
    /// stream header: the decoder must be in the [`Decoding`](DecoderState::Decoding) state and
    /// `input` must be a whole number of frames, otherwise nothing is consumed and an error
    /// diagnostic is returned.
    pub fn decode_frames(&mut self, input: &[u8]) -> DecodedAudio {
        let num_channels = self.parser.format().map_or(0, |f| usize::from(f.num_channels));
        let mut planes = AudioPlanes::new(num_channels);

        let mut out = self.decode_frames_into(input, &mut planes);
        out.channel_data = planes.into_channel_data();
        out
    }

    /// Like [`decode_frames`](WavDecoder::decode_frames), but appends into caller-provided
    /// planes so a pool can reuse allocations. The returned `channel_data` is empty; the samples
    /// are in `planes`.
    pub fn decode_frames_into(&mut self, input: &[u8], planes: &mut AudioPlanes) -> DecodedAudio {
        let mark = self.mark();

        if self.state == DecoderState::Error {
            return DecodedAudio { errors: self.diags.errors().to_vec(), ..Default::default() };
        }

        let block = match (self.state, self.parser.format()) {
            (DecoderState::Decoding, Some(format)) => usize::from(format.block_align),
            _ => {
                self.diags.error(
                    DiagnosticCode::OrderingViolation,
                    "decode_frames requires a stream in the decoding state with a parsed fmt \
                     header",
                    self.parser.pos(),
                );
                return self.finish_call(mark, Vec::new(), 0, 0);
            }
        };

        if input.len() % block != 0 {
            self.diags.error(
                DiagnosticCode::OrderingViolation,
                format!(
                    "decode_frames input of {} bytes is not a multiple of blockAlign {}",
                    input.len(),
                    block
                ),
                self.parser.pos(),
            );
            return self.finish_call(mark, Vec::new(), 0, 0);
        }

        let num_channels = self.parser.format().map_or(0, |f| usize::from(f.num_channels));
        if planes.num_channels() != num_channels {
            *planes = AudioPlanes::new(num_channels);
        }

        let mut samples = 0;
        let accepted = self.ingest(input, planes, &mut samples);

        self.finish_call(mark, Vec::new(), accepted, samples)
    }

    /// Decodes exactly one frame without disturbing the decoder.
    ///
    /// Returns one sample per channel, bit-identical to the first frame
    /// [`decode_frames`](WavDecoder::decode_frames) would produce for the same bytes. No
    /// counters, diagnostics, or buffered bytes change. Returns `None` unless the decoder is in
    /// the [`Decoding`](DecoderState::Decoding) state and `input` is exactly one block long.
    pub fn decode_frame(&self, input: &[u8]) -> Option<Vec<f32>> {
        if self.state != DecoderState::Decoding {
            return None;
        }

        let format = self.parser.format()?;
        let converter = self.converter.as_ref()?;

        if input.len() != usize::from(format.block_align) {
            return None;
        }

        let mut planes = AudioPlanes::new(usize::from(format.num_channels));
        converter.convert(input, &mut planes);

        Some(planes.planes().iter().filter_map(|plane| plane.first().copied()).collect())
    }

    /// Marks the end of the stream.
    ///
    /// Any bytes still buffered can no longer complete their unit: a partial final block is
    /// discarded with an error, a shortfall against the declared data length and an incomplete
    /// header are reported as truncation warnings, and the advisory RIFF size is checked against
    /// the bytes actually received. The decoder ends in the [`Ended`](DecoderState::Ended) state.
    /// A second flush reports nothing new.
    pub fn flush(&mut self) -> DecodedAudio {
        let mark = self.mark();

        if self.state == DecoderState::Error {
            return DecodedAudio { errors: self.diags.errors().to_vec(), ..Default::default() };
        }

        if self.flushed {
            return self.finish_call(mark, Vec::new(), 0, 0);
        }

        let pending = self.ring.available();
        let pos = self.parser.pos();

        if self.parser.riff_len().is_none() {
            if pos > 0 || pending > 0 {
                self.diags.warn(
                    DiagnosticCode::Truncated,
                    "truncated stream: ended before the WAVE header was complete",
                    pos,
                );
            }
        }
        else if self.parser.format().is_none() {
            self.diags.warn(
                DiagnosticCode::Truncated,
                "truncated stream: ended before a complete fmt header was received",
                pos,
            );
        }
        else if self.parser.declared_data_len().is_none() {
            self.diags.warn(
                DiagnosticCode::Truncated,
                "truncated stream: ended before the data chunk",
                pos,
            );
        }
        else {
            let remaining = self.parser.data_remaining();

            if remaining > 0 {
                // Whatever portion of the final block arrived can never complete now.
                let partial = cmp::min(pending as u64, remaining);

                if partial > 0 {
                    self.diags.error(
                        DiagnosticCode::Truncated,
                        format!("Discarded {} bytes of incomplete final block.", partial),
                        pos,
                    );
                }

                let shortfall = remaining - partial;
                if shortfall > 0 {
                    self.diags.warn(
                        DiagnosticCode::Truncated,
                        format!(
                            "truncated data chunk: {} of {} declared bytes were never received",
                            shortfall,
                            self.parser.declared_data_len().unwrap_or(0)
                        ),
                        pos,
                    );
                }
            }
        }

        // The RIFF size is advisory, but a disagreement with the received stream length is worth
        // one report now that the true length is known.
        if let Some(riff_len) = self.parser.riff_len() {
            let received = pos + pending as u64;
            let declared = u64::from(riff_len) + 8;

            if received != declared {
                self.diags.warn(
                    DiagnosticCode::AdvisoryMismatch,
                    format!(
                        "RIFF size {} disagrees with {} bytes of received stream",
                        riff_len, received
                    ),
                    0,
                );
            }
        }

        debug!("flushed: {} pending bytes dropped", pending);

        self.ring.clear();
        self.state = DecoderState::Ended;
        self.flushed = true;

        self.finish_call(mark, Vec::new(), 0, 0)
    }

    /// Returns the decoder to its initial state: no format, empty ring, zeroed counters, no
    /// diagnostics.
    pub fn reset(&mut self) {
        self.ring = RingBuffer::with_capacity(self.opts.ring_len);
        self.parser = ChunkParser::new();
        self.converter = None;
        self.state = DecoderState::Uninit;
        self.decoded_bytes = 0;
        self.samples_decoded = 0;
        self.diags.clear();
        self.flushed = false;
    }

    /// Releases the internal buffers and ends the stream. The format is cleared; diagnostics and
    /// counters remain readable. Idempotent.
    pub fn free(&mut self) {
        self.ring = RingBuffer::with_capacity(0);
        self.parser = ChunkParser::new();
        self.converter = None;
        self.state = DecoderState::Ended;
        self.flushed = true;
    }

    fn mark(&self) -> (usize, usize) {
        (self.diags.errors().len(), self.diags.warnings().len())
    }

    fn finish_call(
        &self,
        mark: (usize, usize),
        channel_data: Vec<Vec<f32>>,
        accepted_bytes: usize,
        samples_decoded: u64,
    ) -> DecodedAudio {
        DecodedAudio {
            channel_data,
            samples_decoded,
            accepted_bytes,
            errors: self.diags.errors()[mark.0..].to_vec(),
            warnings: self.diags.warnings()[mark.1..].to_vec(),
        }
    }

    /// Stages `input`, drives the parser, and converts every complete block that surfaces.
    /// Returns the number of input bytes accepted.
    fn ingest(&mut self, mut input: &[u8], planes: &mut AudioPlanes, samples: &mut u64) -> usize {
        let mut accepted = 0;

        loop {
            // Fast path: while the parser sits inside the data chunk and nothing is staged,
            // block-aligned bytes convert straight from the caller's slice.
            let fast_block = if self.ring.is_empty() && self.parser.in_data() && !input.is_empty()
            {
                self.parser.format().map(|f| usize::from(f.block_align))
            }
            else {
                None
            };

            if let (Some(block), Some(converter)) = (fast_block, &self.converter) {
                let run = cmp::min(input.len() as u64, self.parser.data_remaining()) as usize;
                let take = run / block * block;

                if take > 0 {
                    converter.convert(&input[..take], planes);

                    input = &input[take..];
                    accepted += take;

                    self.parser.consume_data(take);
                    self.decoded_bytes += take as u64;

                    let frames = (take / block) as u64;
                    self.samples_decoded += frames;
                    *samples += frames;
                    continue;
                }
            }

            let written = self.ring.write(input);
            accepted += written;
            input = &input[written..];

            self.drive(planes, samples);

            if self.state == DecoderState::Error {
                break;
            }

            if input.is_empty() {
                break;
            }

            if self.ring.is_full() {
                if self.ring.capacity() < self.opts.max_ring_len {
                    let next = cmp::min(self.ring.capacity() * 2, self.opts.max_ring_len);
                    self.ring.grow(next);
                    continue;
                }

                // The ring is at its ceiling and the parser is starved mid-unit. Short-write and
                // let the caller resubmit the residual.
                break;
            }
        }

        accepted
    }

    /// Runs the parser until it suspends, converting data hand-offs as they surface.
    fn drive(&mut self, planes: &mut AudioPlanes, samples: &mut u64) {
        loop {
            match self.parser.advance(&mut self.ring, &mut self.diags) {
                Advance::NeedData { needed } => {
                    if needed > self.ring.capacity() {
                        if needed <= self.opts.max_ring_len {
                            self.ring.grow(needed);
                            continue;
                        }

                        self.diags.fatal(
                            DiagnosticCode::RingOverflow,
                            format!(
                                "ring overflow: {} contiguous bytes required but the buffer is \
                                 capped at {}",
                                needed, self.opts.max_ring_len
                            ),
                            self.parser.pos(),
                        );
                        self.state = DecoderState::Error;
                    }
                    return;
                }
                Advance::Format => {
                    let (converter, num_channels) = match self.parser.format() {
                        Some(format) => {
                            (Converter::for_format(format), usize::from(format.num_channels))
                        }
                        None => (None, 0),
                    };

                    match converter {
                        Some(converter) => {
                            self.converter = Some(converter);
                            self.state = DecoderState::Decoding;

                            if planes.num_channels() != num_channels {
                                *planes = AudioPlanes::new(num_channels);
                            }
                        }
                        None => {
                            self.diags.fatal(
                                DiagnosticCode::UnsupportedFormat,
                                "unsupported audio format",
                                self.parser.pos(),
                            );
                            self.state = DecoderState::Error;
                            return;
                        }
                    }
                }
                Advance::Data { len } => self.convert_from_ring(len, planes, samples),
                Advance::Finished => {
                    debug!("declared data length produced; stream ended");
                    self.state = DecoderState::Ended;
                    // Keep driving: trailing chunks arriving in this call are still consumed.
                }
                Advance::Failed => {
                    self.state = DecoderState::Error;
                    return;
                }
            }
        }
    }

    /// Converts `len` buffered bytes of sample data, a whole number of blocks, consuming them
    /// from the ring.
    fn convert_from_ring(&mut self, len: usize, planes: &mut AudioPlanes, samples: &mut u64) {
        let Some(block) = self.parser.format().map(|f| usize::from(f.block_align)) else {
            return;
        };
        let Some(converter) = &self.converter else {
            return;
        };

        let mut left = len;

        while left > 0 {
            let contiguous = self.ring.peek_contiguous();
            let take = cmp::min(contiguous.len(), left) / block * block;

            let take = if take > 0 {
                converter.convert(&contiguous[..take], planes);
                take
            }
            else {
                // A block straddles the wrap point of the ring; peek copies it out.
                let Ok(view) = self.ring.peek(0, block) else {
                    break;
                };
                converter.convert(view, planes);
                block
            };

            self.ring.discard(take);
            self.parser.consume_data(take);
            self.decoded_bytes += take as u64;

            let frames = (take / block) as u64;
            self.samples_decoded += frames;
            *samples += frames;

            left -= take;
        }
    }
}

impl Default for WavDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_decoder_is_uninit() {
        let decoder = WavDecoder::new();
        assert_eq!(decoder.state(), DecoderState::Uninit);
        assert!(decoder.format().is_none());
        assert_eq!(decoder.info().decoded_bytes, 0);
    }

    #[test]
    fn decode_frames_before_header_is_rejected() {
        let mut decoder = WavDecoder::new();
        let out = decoder.decode_frames(&[0u8; 4]);

        assert_eq!(out.samples_decoded, 0);
        assert_eq!(out.errors.len(), 1);
        // The contract violation is not fatal.
        assert_eq!(decoder.state(), DecoderState::Uninit);
    }

    #[test]
    fn flush_of_untouched_decoder_is_silent() {
        let mut decoder = WavDecoder::new();
        let out = decoder.flush();

        assert!(out.errors.is_empty());
        assert!(out.warnings.is_empty());
        assert_eq!(decoder.state(), DecoderState::Ended);
    }

    #[test]
    fn input_after_free_is_dropped() {
        let mut decoder = WavDecoder::new();
        decoder.free();

        let out = decoder.decode(&[1, 2, 3]);
        assert_eq!(out.samples_decoded, 0);
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].message.contains("end of stream"));

        // free() is idempotent.
        decoder.free();
        assert_eq!(decoder.state(), DecoderState::Ended);
    }

    #[test]
    fn options_normalize_the_ceiling() {
        let opts = WavDecoderOptions { ring_len: 64 * 1024, max_ring_len: 1024 };
        let decoder = WavDecoder::with_options(opts);
        assert_eq!(decoder.opts.max_ring_len, 64 * 1024);
    }
}
