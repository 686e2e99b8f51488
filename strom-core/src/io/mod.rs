// Strom
// Copyright (c) 2026 The Project Strom Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `io` module implements byte-level I/O for push-driven decoding.
//!
//! [`RingBuffer`] stages bytes fed by the caller so that a parser can suspend mid-unit and resume
//! when more input arrives. [`ByteReader`] interprets a borrowed byte slice as little- or
//! big-endian integers and floating-point values of standard widths; it is typically pointed at a
//! non-destructive peek of the ring.

mod byte_reader;
mod ring_buffer;

pub use byte_reader::ByteReader;
pub use ring_buffer::RingBuffer;
