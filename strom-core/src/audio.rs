// Strom
// Copyright (c) 2026 The Project Strom Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `audio` module provides audio channel and sample buffer primitives.

use std::fmt;

use bitflags::bitflags;
use log::debug;

bitflags! {
    /// A bitmask representing positional audio channels.
    ///
    /// The positions are identical to those specified by the channel mask in Microsoft's
    /// `WAVEFORMATEXTENSIBLE` structure.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct Channels: u32 {
        /// Front-left (left) channel.
        const FRONT_LEFT         = 0x0000_0001;
        /// Front-right (right) channel.
        const FRONT_RIGHT        = 0x0000_0002;
        /// Front-centre (centre) channel.
        const FRONT_CENTRE       = 0x0000_0004;
        /// Low frequency channel 1.
        const LFE1               = 0x0000_0008;
        /// Rear-left (surround rear left) channel.
        const REAR_LEFT          = 0x0000_0010;
        /// Rear-right (surround rear right) channel.
        const REAR_RIGHT         = 0x0000_0020;
        /// Front left-of-centre (left center) channel.
        const FRONT_LEFT_CENTRE  = 0x0000_0040;
        /// Front right-of-centre (right center) channel.
        const FRONT_RIGHT_CENTRE = 0x0000_0080;
        /// Rear-centre (surround rear centre) channel.
        const REAR_CENTRE        = 0x0000_0100;
        /// Side left (surround left) channel.
        const SIDE_LEFT          = 0x0000_0200;
        /// Side right (surround right) channel.
        const SIDE_RIGHT         = 0x0000_0400;
        /// Top centre channel.
        const TOP_CENTRE         = 0x0000_0800;
        /// Top front-left channel.
        const TOP_FRONT_LEFT     = 0x0000_1000;
        /// Top centre channel.
        const TOP_FRONT_CENTRE   = 0x0000_2000;
        /// Top front-right channel.
        const TOP_FRONT_RIGHT    = 0x0000_4000;
        /// Top rear-left channel.
        const TOP_REAR_LEFT      = 0x0000_8000;
        /// Top rear-centre channel.
        const TOP_REAR_CENTRE    = 0x0001_0000;
        /// Top rear-right channel.
        const TOP_REAR_RIGHT     = 0x0002_0000;
    }
}

impl Channels {
    /// Gets the number of channels in the mask.
    pub fn count(self) -> usize {
        self.bits().count_ones() as usize
    }
}

impl fmt::Display for Channels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#032b}", self.bits())
    }
}

/// Synthesizes a channel mask of the first `count` positions. Channels past the last defined
/// position are not representable and are left out of the mask.
pub fn channel_count_to_mask(count: u16) -> Channels {
    let bits = match count {
        0 => 0,
        n if u32::from(n) >= 18 => (1 << 18) - 1,
        n => (1u32 << n) - 1,
    };
    Channels::from_bits_truncate(bits)
}

/// Interprets a `WAVEFORMATEXTENSIBLE` channel mask, repairing it when it disagrees with the
/// declared channel count. The declared count always wins; an inconsistent mask is replaced by a
/// mask of the first `count` positions.
pub fn fix_channel_mask(mask: u32, count: u16) -> Channels {
    let channels = Channels::from_bits_truncate(mask);

    if channels.count() != usize::from(count) {
        debug!("channel mask {:#x} disagrees with channel count {}", mask, count);
        return channel_count_to_mask(count);
    }

    channels
}

/// `AudioPlanes` is a set of per-channel sample buffers.
///
/// Each plane holds one channel's samples in time order. All planes always hold the same number
/// of frames; producers append one sample to every plane per frame.
#[derive(Clone, Debug, Default)]
pub struct AudioPlanes {
    planes: Vec<Vec<f32>>,
}

impl AudioPlanes {
    /// Instantiate empty planes for `num_channels` channels.
    pub fn new(num_channels: usize) -> Self {
        AudioPlanes { planes: vec![Vec::new(); num_channels] }
    }

    /// Instantiate planes for `num_channels` channels with room for `frames` frames per channel.
    pub fn with_capacity(num_channels: usize, frames: usize) -> Self {
        AudioPlanes { planes: vec![Vec::with_capacity(frames); num_channels] }
    }

    /// The number of channels.
    pub fn num_channels(&self) -> usize {
        self.planes.len()
    }

    /// The number of frames currently buffered per channel.
    pub fn frames(&self) -> usize {
        self.planes.first().map_or(0, Vec::len)
    }

    /// Reserve room for `additional` more frames in every plane.
    pub fn reserve(&mut self, additional: usize) {
        for plane in &mut self.planes {
            plane.reserve(additional);
        }
    }

    /// Immutable access to the planes.
    pub fn planes(&self) -> &[Vec<f32>] {
        &self.planes
    }

    /// Mutable access to the planes.
    pub fn planes_mut(&mut self) -> &mut [Vec<f32>] {
        &mut self.planes
    }

    /// Drop all buffered samples, keeping the allocations.
    pub fn clear(&mut self) {
        for plane in &mut self.planes {
            plane.clear();
        }
    }

    /// Consume the planes, yielding one `Vec<f32>` per channel.
    pub fn into_channel_data(self) -> Vec<Vec<f32>> {
        self.planes
    }
}
