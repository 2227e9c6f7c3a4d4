// Copyright 2020 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Wire-format constants shared by the old and v1 layouts.

use static_assertions::const_assert_eq;

/// Out-of-line allocations are all 8 byte aligned.
pub const FIDL_ALIGNMENT: u32 = 8;

/// Indicates that an optional out-of-line value is present.
pub const ALLOC_PRESENT_U64: u64 = u64::MAX;
/// Indicates that an optional out-of-line value is absent.
pub const ALLOC_ABSENT_U64: u64 = 0;
/// Indicates that a handle is present.
pub const ALLOC_PRESENT_U32: u32 = u32::MAX;
/// Indicates that a handle is absent.
pub const ALLOC_ABSENT_U32: u32 = 0;

/// The size of an envelope header: 4-byte `num_bytes`, 4-byte
/// `num_handles`, and an 8-byte presence word.
pub const ENVELOPE_SIZE: u32 = 16;

/// The inline size of an extensible union in the v1 layout: a 4-byte
/// ordinal, 4 bytes of mandatory zero padding, and an envelope.
pub const XUNION_INLINE_SIZE: u32 = 8 + ENVELOPE_SIZE;

/// The maximum number of bytes in a channel message. Both the source and
/// the destination region are capped at this size.
pub const MAX_MSG_BYTES: u32 = 65536;

/// The maximum recursion depth of a transformation. Each hop to an
/// out-of-line object counts as one step in the recursion depth.
pub const MAX_RECURSION: usize = 32;

const_assert_eq!(XUNION_INLINE_SIZE, 24);
const_assert_eq!(FIDL_ALIGNMENT & (FIDL_ALIGNMENT - 1), 0);

/// Rounds `x` up if necessary so that it is a multiple of `align`.
///
/// Requires `align` to be a (nonzero) power of two.
#[inline(always)]
pub fn round_up_to_align(x: u32, align: u32) -> u32 {
    debug_assert_ne!(align, 0);
    debug_assert_eq!(align & (align - 1), 0);
    (x + align - 1) & !(align - 1)
}

/// Rounds `x` up to the out-of-line alignment boundary.
#[inline(always)]
pub fn fidl_align(x: u32) -> u32 {
    round_up_to_align(x, FIDL_ALIGNMENT)
}

/// Returns the on-wire stride of a vector element of the given size:
/// elements are stored at their natural alignment, capped at the 8-byte
/// alignment unit.
#[inline]
pub fn aligned_element_size(element_size: u32) -> u32 {
    match element_size {
        0..=2 => element_size,
        3..=4 => 4,
        _ => fidl_align(element_size),
    }
}
