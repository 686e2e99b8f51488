// Strom
// Copyright (c) 2026 The Project Strom Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use strom_core::audio::{channel_count_to_mask, fix_channel_mask, Channels};
use strom_core::errors::{DiagnosticCode, DiagnosticLog, Result};
use strom_core::io::ByteReader;

/// WAVE is a RIFF stream, with a "RIFF" ASCII stream marker.
pub const RIFF_STREAM_MARKER: [u8; 4] = *b"RIFF";
/// RIFX is the big-endian variant of RIFF.
pub const RIFX_STREAM_MARKER: [u8; 4] = *b"RIFX";
/// RF64 is a 64-bit extension of RIFF, with "RF64" as the stream marker.
/// Reference: EBU Tech 3306 - MBWF / RF64: An extended File Format for Audio.
pub const RF64_STREAM_MARKER: [u8; 4] = *b"RF64";
/// The RIFF form for WAVE.
pub const WAVE_RIFF_FORM: [u8; 4] = *b"WAVE";

pub const FMT_CHUNK_ID: [u8; 4] = *b"fmt ";
pub const DATA_CHUNK_ID: [u8; 4] = *b"data";
pub const LIST_CHUNK_ID: [u8; 4] = *b"LIST";

// The definition of these format identifiers can be found in mmreg.h of the Microsoft Windows
// Platform SDK.
const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
const WAVE_FORMAT_ALAW: u16 = 0x0006;
const WAVE_FORMAT_MULAW: u16 = 0x0007;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xfffe;

/// The highest sample rate the decoder accepts, in Hz.
const MAX_SAMPLE_RATE: u32 = 384_000;
/// The hard channel count limit.
const MAX_CHANNELS: u16 = 256;
/// Channel counts above this are suspicious and draw a warning.
const UNLIKELY_CHANNELS: u16 = 64;

/// The byte order of multi-byte sample and size fields, dictated by the stream marker.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Endianness {
    /// RIFF streams; the overwhelmingly common case.
    Little,
    /// RIFX streams.
    Big,
}

/// The resolved audio sample coding.
///
/// An extensible format chunk is resolved to one of these via its sub-format GUID during parsing
/// and never observed downstream.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FormatTag {
    /// Linear PCM, unsigned for 8-bit samples and signed otherwise.
    Pcm,
    /// IEEE-754 binary32 or binary64 samples.
    IeeeFloat,
    /// ITU-T G.711 A-law companded samples.
    ALaw,
    /// ITU-T G.711 µ-law companded samples.
    MuLaw,
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            FormatTag::Pcm => write!(f, "pcm"),
            FormatTag::IeeeFloat => write!(f, "ieee_float"),
            FormatTag::ALaw => write!(f, "alaw"),
            FormatTag::MuLaw => write!(f, "mulaw"),
        }
    }
}

/// The canonical, validated contents of a `fmt ` chunk.
#[derive(Clone, Debug)]
pub struct FormatInfo {
    /// The resolved sample coding.
    pub format_tag: FormatTag,
    /// The number of interleaved channels per frame.
    pub num_channels: u16,
    /// The sample rate in Hz.
    pub sample_rate: u32,
    /// The declared average data rate in bytes/second. Informational; never used for decoding.
    pub byte_rate: u32,
    /// The byte length of one frame. Always the computed value; a disagreeing declared value is
    /// reported and ignored.
    pub block_align: u16,
    /// The bit width of one encoded sample.
    pub bits_per_sample: u16,
    /// The byte order of multi-byte samples.
    pub endianness: Endianness,
    /// Positional channel assignment. Advisory; output planes are ordered as the file interleaves
    /// them regardless of the mask.
    pub channels: Channels,
}

impl fmt::Display for FormatInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "FormatInfo {{")?;
        writeln!(f, "\tformat_tag: {},", self.format_tag)?;
        writeln!(f, "\tnum_channels: {},", self.num_channels)?;
        writeln!(f, "\tsample_rate: {} Hz,", self.sample_rate)?;
        writeln!(f, "\tbyte_rate: {},", self.byte_rate)?;
        writeln!(f, "\tblock_align: {},", self.block_align)?;
        writeln!(f, "\tbits_per_sample: {},", self.bits_per_sample)?;
        writeln!(f, "\tendianness: {:?},", self.endianness)?;
        writeln!(f, "\tchannels: {},", self.channels)?;
        writeln!(f, "}}")
    }
}

#[inline]
fn read_u16(reader: &mut ByteReader<'_>, endianness: Endianness) -> Result<u16> {
    match endianness {
        Endianness::Little => reader.read_u16(),
        Endianness::Big => reader.read_be_u16(),
    }
}

#[inline]
fn read_u32(reader: &mut ByteReader<'_>, endianness: Endianness) -> Result<u32> {
    match endianness {
        Endianness::Little => reader.read_u32(),
        Endianness::Big => reader.read_be_u32(),
    }
}

/// Parses and validates a `fmt ` chunk payload of `len` bytes.
///
/// Problems are reported on `diags`; a fatal diagnostic yields `Ok(None)`. An `Err` indicates the
/// reader held fewer than `len` bytes.
pub(crate) fn parse_fmt_chunk(
    reader: &mut ByteReader<'_>,
    len: u32,
    endianness: Endianness,
    chunk_pos: u64,
    diags: &mut DiagnosticLog,
) -> Result<Option<FormatInfo>> {
    // WaveFormat has a minimal length of 16 bytes. This may be extended with format specific
    // data.
    if len < 16 {
        diags.fatal(
            DiagnosticCode::InvalidFmt,
            format!("malformed fmt chunk: {} bytes is too small", len),
            chunk_pos,
        );
        return Ok(None);
    }

    let format = read_u16(reader, endianness)?;
    let num_channels = read_u16(reader, endianness)?;
    let sample_rate = read_u32(reader, endianness)?;
    let byte_rate = read_u32(reader, endianness)?;
    let declared_block_align = read_u16(reader, endianness)?;
    let bits_per_sample = read_u16(reader, endianness)?;

    if num_channels == 0 {
        diags.fatal(DiagnosticCode::InvalidFmt, "fmt declares zero channels", chunk_pos);
        return Ok(None);
    }

    if num_channels > MAX_CHANNELS {
        diags.fatal(
            DiagnosticCode::InvalidFmt,
            format!("channel count {} exceeds the {} channel limit", num_channels, MAX_CHANNELS),
            chunk_pos,
        );
        return Ok(None);
    }

    if num_channels > UNLIKELY_CHANNELS {
        diags.warn(
            DiagnosticCode::AdvisoryMismatch,
            format!("channel count {} is unusually high", num_channels),
            chunk_pos,
        );
    }

    if sample_rate == 0 {
        diags.fatal(DiagnosticCode::InvalidFmt, "fmt declares zero sample rate", chunk_pos);
        return Ok(None);
    }

    if sample_rate > MAX_SAMPLE_RATE {
        diags.fatal(
            DiagnosticCode::InvalidFmt,
            format!("fmt declares sample rate {} Hz outside the supported range", sample_rate),
            chunk_pos,
        );
        return Ok(None);
    }

    if !matches!(bits_per_sample, 8 | 16 | 24 | 32 | 64) {
        diags.fatal(
            DiagnosticCode::UnsupportedFormat,
            format!("unsupported bit depth {}", bits_per_sample),
            chunk_pos,
        );
        return Ok(None);
    }

    // An extended WaveFormatEx carries an extra data length field. Its value matters only for the
    // extensible format; for all others the extension is ignored.
    let cb_size = if len >= 18 { read_u16(reader, endianness)? } else { 0 };

    let (format_tag, channels) = match format {
        WAVE_FORMAT_PCM => (FormatTag::Pcm, channel_count_to_mask(num_channels)),
        WAVE_FORMAT_IEEE_FLOAT => (FormatTag::IeeeFloat, channel_count_to_mask(num_channels)),
        WAVE_FORMAT_ALAW => (FormatTag::ALaw, channel_count_to_mask(num_channels)),
        WAVE_FORMAT_MULAW => (FormatTag::MuLaw, channel_count_to_mask(num_channels)),
        WAVE_FORMAT_EXTENSIBLE => {
            // The extensible format requires the full 40 byte chunk with a 22 byte extension.
            if len < 40 || cb_size < 22 {
                diags.fatal(
                    DiagnosticCode::InvalidFmt,
                    "malformed extensible fmt chunk",
                    chunk_pos,
                );
                return Ok(None);
            }

            // The number of valid bits per sample is advisory here; samples are decoded at their
            // coded width.
            let _valid_bits_per_sample = read_u16(reader, endianness)?;
            let channel_mask = read_u32(reader, endianness)?;

            let mut sub_format_guid = [0u8; 16];
            reader.read_buf_exact(&mut sub_format_guid)?;

            // The first four GUID bytes hold the effective format tag. The remainder of the GUID
            // is the fixed ksmedia.h namespace and carries no information.
            let sub_format =
                u32::from_le_bytes([
                    sub_format_guid[0],
                    sub_format_guid[1],
                    sub_format_guid[2],
                    sub_format_guid[3],
                ]);

            let tag = match sub_format {
                f if f == u32::from(WAVE_FORMAT_PCM) => FormatTag::Pcm,
                f if f == u32::from(WAVE_FORMAT_IEEE_FLOAT) => FormatTag::IeeeFloat,
                f if f == u32::from(WAVE_FORMAT_ALAW) => FormatTag::ALaw,
                f if f == u32::from(WAVE_FORMAT_MULAW) => FormatTag::MuLaw,
                _ => {
                    diags.fatal(
                        DiagnosticCode::UnsupportedFormat,
                        format!("unsupported audio format sub-type {:#010x}", sub_format),
                        chunk_pos,
                    );
                    return Ok(None);
                }
            };

            (tag, fix_channel_mask(channel_mask, num_channels))
        }
        _ => {
            diags.fatal(
                DiagnosticCode::UnsupportedFormat,
                format!("unsupported audio format tag {:#06x}", format),
                chunk_pos,
            );
            return Ok(None);
        }
    };

    // The permissible bit depths depend on the sample coding.
    let depth_ok = match format_tag {
        FormatTag::Pcm => matches!(bits_per_sample, 8 | 16 | 24 | 32),
        FormatTag::IeeeFloat => matches!(bits_per_sample, 32 | 64),
        FormatTag::ALaw | FormatTag::MuLaw => bits_per_sample == 8,
    };

    if !depth_ok {
        diags.fatal(
            DiagnosticCode::UnsupportedFormat,
            format!("unsupported bit depth {} for {} audio", bits_per_sample, format_tag),
            chunk_pos,
        );
        return Ok(None);
    }

    // The frame length is fully determined by the sample width and channel count. The declared
    // value is reported when it disagrees, then ignored.
    let block_align = ((bits_per_sample + 7) / 8) * num_channels;

    if declared_block_align != block_align {
        diags.warn(
            DiagnosticCode::AdvisoryMismatch,
            format!(
                "blockAlign {} disagrees with computed {}; using computed value",
                declared_block_align, block_align
            ),
            chunk_pos,
        );
    }

    Ok(Some(FormatInfo {
        format_tag,
        num_channels,
        sample_rate,
        byte_rate,
        block_align,
        bits_per_sample,
        endianness,
        channels,
    }))
}
