// Strom
// Copyright (c) 2026 The Project Strom Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use strom_core::audio::AudioPlanes;

use crate::chunks::{Endianness, FormatInfo, FormatTag};

// alaw_expand and mulaw_expand are adaptations of alaw2linear and ulaw2linear from g711.c by
// SUN Microsystems (unrestricted use license).
const XLAW_QUANT_MASK: u8 = 0x0f;
const XLAW_SEG_MASK: u8 = 0x70;
const XLAW_SEG_SHIFT: u32 = 4;

fn alaw_expand(mut a_val: u8) -> i16 {
    a_val ^= 0x55;

    let mut t = i16::from((a_val & XLAW_QUANT_MASK) << 4);
    let seg = (a_val & XLAW_SEG_MASK) >> XLAW_SEG_SHIFT;

    match seg {
        0 => t += 0x8,
        1 => t += 0x108,
        _ => t = (t + 0x108) << (seg - 1),
    }

    if a_val & 0x80 == 0x80 {
        t
    }
    else {
        -t
    }
}

fn mulaw_expand(mut mu_val: u8) -> i16 {
    const BIAS: i16 = 0x84;

    // Complement to obtain normal u-law value.
    mu_val = !mu_val;

    // Extract and bias the quantization bits. Then shift up by the segment number and subtract
    // out the bias.
    let mut t = i16::from((mu_val & XLAW_QUANT_MASK) << 3) + BIAS;
    t <<= (mu_val & XLAW_SEG_MASK) >> XLAW_SEG_SHIFT;

    if mu_val & 0x80 == 0x80 {
        BIAS - t
    }
    else {
        t - BIAS
    }
}

/// Expands every 8-bit code point through `expand` into a normalized `f32` lookup table.
fn xlaw_table(expand: fn(u8) -> i16) -> Box<[f32; 256]> {
    let mut table = Box::new([0.0f32; 256]);
    for (code, entry) in table.iter_mut().enumerate() {
        *entry = f32::from(expand(code as u8)) / 32_768.0;
    }
    table
}

/// De-interleaves `$data` into `$planes`, one `$width`-byte encoded sample per channel per frame,
/// decoding each with `$decode` over the sample's bytes `$s`.
macro_rules! deinterleave {
    ($data:expr, $planes:expr, $width:expr, $s:ident, $decode:expr) => {{
        let frame_len = $width * $planes.num_channels();

        $planes.reserve($data.len() / frame_len);

        for frame in $data.chunks_exact(frame_len) {
            for (ch, plane) in $planes.planes_mut().iter_mut().enumerate() {
                let $s = &frame[ch * $width..(ch + 1) * $width];
                plane.push($decode);
            }
        }
    }};
}

/// A `Converter` turns interleaved encoded sample bytes into normalized `f32` planes.
///
/// The conversion loop is resolved once per stream, when the format chunk locks, so the per-frame
/// path branches on nothing but the frame count. Companding tables are precomputed at resolution
/// time and live as long as the converter.
pub(crate) enum Converter {
    PcmU8,
    PcmS16Le,
    PcmS16Be,
    PcmS24Le,
    PcmS24Be,
    PcmS32Le,
    PcmS32Be,
    F32Le,
    F32Be,
    F64Le,
    F64Be,
    ALaw(Box<[f32; 256]>),
    MuLaw(Box<[f32; 256]>),
}

impl Converter {
    /// Resolves the converter for a validated format. Returns `None` for combinations the format
    /// validation rejects.
    pub(crate) fn for_format(format: &FormatInfo) -> Option<Converter> {
        use Endianness::{Big, Little};

        let converter = match (format.format_tag, format.bits_per_sample, format.endianness) {
            (FormatTag::Pcm, 8, _) => Converter::PcmU8,
            (FormatTag::Pcm, 16, Little) => Converter::PcmS16Le,
            (FormatTag::Pcm, 16, Big) => Converter::PcmS16Be,
            (FormatTag::Pcm, 24, Little) => Converter::PcmS24Le,
            (FormatTag::Pcm, 24, Big) => Converter::PcmS24Be,
            (FormatTag::Pcm, 32, Little) => Converter::PcmS32Le,
            (FormatTag::Pcm, 32, Big) => Converter::PcmS32Be,
            (FormatTag::IeeeFloat, 32, Little) => Converter::F32Le,
            (FormatTag::IeeeFloat, 32, Big) => Converter::F32Be,
            (FormatTag::IeeeFloat, 64, Little) => Converter::F64Le,
            (FormatTag::IeeeFloat, 64, Big) => Converter::F64Be,
            (FormatTag::ALaw, 8, _) => Converter::ALaw(xlaw_table(alaw_expand)),
            (FormatTag::MuLaw, 8, _) => Converter::MuLaw(xlaw_table(mulaw_expand)),
            _ => return None,
        };

        Some(converter)
    }

    /// Converts `data`, a whole number of frames, appending one sample per channel per frame to
    /// `planes`. `planes` must have one plane per channel.
    pub(crate) fn convert(&self, data: &[u8], planes: &mut AudioPlanes) {
        if planes.num_channels() == 0 {
            return;
        }

        match self {
            Converter::PcmU8 => {
                deinterleave!(data, planes, 1, s, (f32::from(s[0]) - 128.0) / 128.0)
            }
            Converter::PcmS16Le => deinterleave!(
                data,
                planes,
                2,
                s,
                f32::from(i16::from_le_bytes([s[0], s[1]])) / 32_768.0
            ),
            Converter::PcmS16Be => deinterleave!(
                data,
                planes,
                2,
                s,
                f32::from(i16::from_be_bytes([s[0], s[1]])) / 32_768.0
            ),
            Converter::PcmS24Le => deinterleave!(
                data,
                planes,
                3,
                s,
                ((u32::from_le_bytes([s[0], s[1], s[2], 0]) << 8) as i32 >> 8) as f32
                    / 8_388_608.0
            ),
            Converter::PcmS24Be => deinterleave!(
                data,
                planes,
                3,
                s,
                ((u32::from_be_bytes([0, s[0], s[1], s[2]]) << 8) as i32 >> 8) as f32
                    / 8_388_608.0
            ),
            Converter::PcmS32Le => deinterleave!(
                data,
                planes,
                4,
                s,
                i32::from_le_bytes([s[0], s[1], s[2], s[3]]) as f32 / 2_147_483_648.0
            ),
            Converter::PcmS32Be => deinterleave!(
                data,
                planes,
                4,
                s,
                i32::from_be_bytes([s[0], s[1], s[2], s[3]]) as f32 / 2_147_483_648.0
            ),
            Converter::F32Le => deinterleave!(
                data,
                planes,
                4,
                s,
                f32::from_le_bytes([s[0], s[1], s[2], s[3]]).clamp(-1.0, 1.0)
            ),
            Converter::F32Be => deinterleave!(
                data,
                planes,
                4,
                s,
                f32::from_be_bytes([s[0], s[1], s[2], s[3]]).clamp(-1.0, 1.0)
            ),
            Converter::F64Le => deinterleave!(
                data,
                planes,
                8,
                s,
                (f64::from_le_bytes([s[0], s[1], s[2], s[3], s[4], s[5], s[6], s[7]]) as f32)
                    .clamp(-1.0, 1.0)
            ),
            Converter::F64Be => deinterleave!(
                data,
                planes,
                8,
                s,
                (f64::from_be_bytes([s[0], s[1], s[2], s[3], s[4], s[5], s[6], s[7]]) as f32)
                    .clamp(-1.0, 1.0)
            ),
            Converter::ALaw(table) => deinterleave!(data, planes, 1, s, table[usize::from(s[0])]),
            Converter::MuLaw(table) => deinterleave!(data, planes, 1, s, table[usize::from(s[0])]),
        }
    }
}
