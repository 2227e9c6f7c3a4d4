// Copyright 2020 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The transformation engine: a recursive walk over an encoded message,
//! directed by the source coding table, that re-encodes the message in
//! the other wire format.
//!
//! The two layouts share every representation except that of migrated
//! sum types: the old layout stores them inline as a tag and a payload
//! area sized to the widest variant, the v1 layout as a 24-byte
//! extensible-union header whose payload is out-of-line. The engine
//! copies every byte the layout change does not affect, rewrites the
//! bytes it does, and re-establishes the output layout's padding and
//! out-of-line ordering.
//!
//! All state lives in [`Position`] values threaded through the
//! recursion. Each step may move the inline offsets freely but must
//! advance the out-of-line offsets by exactly the number of bytes it
//! consumed and produced out-of-line, so that the next sibling sees the
//! correct next-available offsets.

use crate::coding::{CodedArray, CodedStruct, CodedUnion, CodedVector, CodedXUnion, Type};
use crate::cursor::{Cursor, Position};
use crate::wire::{
    aligned_element_size, fidl_align, ALLOC_ABSENT_U64, ALLOC_PRESENT_U32, ALLOC_PRESENT_U64,
    MAX_MSG_BYTES, MAX_RECURSION,
};
use crate::{Error, Result, Transformation};

/// Transforms the encoded message in `src_bytes`, described by
/// `top_type`, into the other wire format, writing the result to
/// `dst_bytes` and returning the number of meaningful destination bytes.
///
/// `top_type` must be the struct descriptor for the message in the
/// *source* layout (the v1 table for [`Transformation::V1ToOld`], the old
/// table for [`Transformation::OldToV1`]). The source and destination
/// regions must not overlap. On error the contents of `dst_bytes` are
/// unspecified.
pub fn transform(
    transformation: Transformation,
    top_type: &Type,
    src_bytes: &[u8],
    dst_bytes: &mut [u8],
) -> Result<usize> {
    let direction = match transformation {
        Transformation::None => return Ok(0),
        Transformation::V1ToOld => Direction::V1ToOld,
        Transformation::OldToV1 => Direction::OldToV1,
    };
    let src_struct = match top_type {
        Type::Struct(src_struct) => *src_struct,
        _ => return Err(Error::TopTypeNotStruct),
    };
    if src_bytes.len() > MAX_MSG_BYTES as usize {
        return Err(Error::SourceTooLarge);
    }
    if (src_bytes.len() as u32) < src_struct.size {
        return Err(Error::OutOfRange);
    }
    let dst_struct = src_struct.alt_type.ok_or(Error::MissingAltType)?;
    let mut transformer =
        Transformer { cursor: Cursor::new(src_bytes, dst_bytes), direction, handle_count: 0 };
    let mut position = Position {
        src_inline_offset: 0,
        src_out_of_line_offset: fidl_align(src_struct.size),
        dst_inline_offset: 0,
        dst_out_of_line_offset: fidl_align(dst_struct.size),
    };
    transformer.transform_struct(src_struct, &mut position, dst_struct.size, Depth(0))?;
    Ok(transformer.cursor.finish())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    V1ToOld,
    OldToV1,
}

/// Out-of-line recursion depth. Each hop into an out-of-line object
/// counts as one step.
#[derive(Debug, Clone, Copy)]
struct Depth(usize);

impl Depth {
    fn increment(self) -> Result<Depth> {
        if self.0 >= MAX_RECURSION {
            return Err(Error::MaxRecursionDepth);
        }
        Ok(Depth(self.0 + 1))
    }
}

struct Transformer<'a> {
    cursor: Cursor<'a>,
    direction: Direction,
    /// Present handles seen so far. Envelope bookkeeping snapshots this
    /// around a payload walk to compute `num_handles`.
    handle_count: u32,
}

impl<'a> Transformer<'a> {
    /// Dispatches one region of the message to the rule for its kind.
    /// `dst_size` is the inline size of the region in the destination
    /// layout; kinds with no structural content are copied through at
    /// that size.
    fn transform_type(
        &mut self,
        ty: Option<&Type>,
        position: &mut Position,
        dst_size: u32,
        depth: Depth,
    ) -> Result<()> {
        let ty = match ty {
            None => return self.cursor.copy(position, dst_size),
            Some(ty) => ty,
        };
        match (ty, self.direction) {
            (Type::Primitive(_) | Type::Enum(_) | Type::Bits(_), _) => {
                self.cursor.copy(position, dst_size)
            }
            (Type::Handle(_), _) => self.transform_handle(position, dst_size),
            (Type::Struct(src), _) => self.transform_struct(src, position, dst_size, depth),
            (Type::StructPointer(src), _) => self.transform_struct_pointer(src, position, depth),
            (Type::Array(src), _) => self.transform_array(src, position, dst_size, depth),
            (Type::Vector(src), _) => self.transform_vector(src, position, depth),
            (Type::String(_), _) => self.transform_string(position, depth),
            (Type::XUnion(src), Direction::V1ToOld) => {
                self.transform_xunion_to_union(src, position, depth)
            }
            (Type::Union(src), Direction::OldToV1) => {
                self.transform_union_to_xunion(src, position, depth)
            }
            // A genuine extensible union (one with no static counterpart
            // in the other layout) cannot be walked.
            (Type::XUnion(_), Direction::OldToV1) => Err(Error::XUnionNotTransformable),
            (Type::Union(_), Direction::V1ToOld) => Err(Error::BadCodingTable),
            (Type::UnionPointer(_), _) => Err(Error::UnionPointerNotSupported),
            (Type::Table(_), _) => Err(Error::TableNotTransformable),
        }
    }

    fn transform_handle(&mut self, position: &mut Position, dst_size: u32) -> Result<()> {
        let raw: u32 = self.cursor.read(position)?;
        if raw == ALLOC_PRESENT_U32 {
            self.handle_count += 1;
        }
        self.cursor.copy(position, dst_size)
    }

    /// Walks a record's field list once. Struct walking is the only
    /// place where the two layouts' differing paddings are reconciled.
    fn transform_struct(
        &mut self,
        src: &CodedStruct,
        position: &mut Position,
        dst_size: u32,
        depth: Depth,
    ) -> Result<()> {
        // A record with no structural fields is a plain blob of bytes.
        if src.fields.is_empty() {
            return self.cursor.copy(position, dst_size);
        }
        let src_start = position.src_inline_offset;
        let dst_start = position.dst_inline_offset;
        for field in src.fields {
            match field.ty {
                None => {
                    // Raw span; `offset` records where the field's data
                    // ends and trailing source padding begins.
                    let end = src_start + field.offset;
                    let len = end
                        .checked_sub(position.src_inline_offset)
                        .ok_or(Error::BadCodingTable)?;
                    self.cursor.copy(position, len)?;
                }
                Some(field_ty) => {
                    let alt_field = field.alt_field.ok_or(Error::MissingAltType)?;
                    let dst_field_ty = alt_field.ty.ok_or(Error::MissingAltType)?;
                    let dst_field_offset = dst_start + alt_field.offset;
                    let pad = dst_field_offset
                        .checked_sub(position.dst_inline_offset)
                        .ok_or(Error::BadCodingTable)?;
                    self.cursor.pad(position, pad)?;
                    position.src_inline_offset = src_start + field.offset;
                    position.dst_inline_offset = dst_field_offset;
                    let dst_field_size = dst_field_ty.inline_size();
                    self.transform_type(Some(field_ty), position, dst_field_size, depth)?;
                    position.src_inline_offset =
                        src_start + field.offset + field_ty.inline_size();
                    position.dst_inline_offset = dst_field_offset + dst_field_size;
                }
            }
        }
        // Both layouts pad records out to their declared size.
        let pad = (dst_start + dst_size)
            .checked_sub(position.dst_inline_offset)
            .ok_or(Error::BadCodingTable)?;
        self.cursor.pad(position, pad)?;
        position.src_inline_offset = src_start + src.size;
        Ok(())
    }

    fn transform_struct_pointer(
        &mut self,
        src: &CodedStruct,
        position: &mut Position,
        depth: Depth,
    ) -> Result<()> {
        let presence: u64 = self.cursor.read(position)?;
        self.cursor.copy(position, 8)?;
        match presence {
            ALLOC_ABSENT_U64 => Ok(()),
            ALLOC_PRESENT_U64 => {
                let dst = src.alt_type.ok_or(Error::MissingAltType)?;
                let depth = depth.increment()?;
                let mut body = Position {
                    src_inline_offset: position.src_out_of_line_offset,
                    src_out_of_line_offset: position.src_out_of_line_offset + fidl_align(src.size),
                    dst_inline_offset: position.dst_out_of_line_offset,
                    dst_out_of_line_offset: position.dst_out_of_line_offset + fidl_align(dst.size),
                };
                self.transform_struct(src, &mut body, dst.size, depth)?;
                position.src_out_of_line_offset = body.src_out_of_line_offset;
                position.dst_out_of_line_offset = body.dst_out_of_line_offset;
                Ok(())
            }
            _ => Err(Error::InvalidPresenceIndicator),
        }
    }

    fn transform_array(
        &mut self,
        src: &CodedArray,
        position: &mut Position,
        dst_size: u32,
        depth: Depth,
    ) -> Result<()> {
        let dst = src.alt_type.ok_or(Error::MissingAltType)?;
        self.transform_elements(
            src.element,
            src.element_count,
            src.element_size,
            src.element_padding,
            dst.element_size,
            dst.element_padding,
            dst_size,
            position,
            depth,
        )
    }

    fn transform_vector(
        &mut self,
        src: &CodedVector,
        position: &mut Position,
        depth: Depth,
    ) -> Result<()> {
        let dst = src.alt_type.ok_or(Error::MissingAltType)?;
        self.transform_vector_like(src.element, src.element_size, dst.element_size, position, depth)
    }

    fn transform_string(&mut self, position: &mut Position, depth: Depth) -> Result<()> {
        // A string is a nullable vector of bytes with no element
        // descriptor.
        self.transform_vector_like(None, 1, 1, position, depth)
    }

    fn transform_vector_like(
        &mut self,
        element: Option<&'static Type>,
        src_element_size: u32,
        dst_element_size: u32,
        position: &mut Position,
        depth: Depth,
    ) -> Result<()> {
        let count: u64 = self.cursor.read(position)?;
        let presence: u64 = self.cursor.read(&Position {
            src_inline_offset: position.src_inline_offset + 8,
            ..*position
        })?;
        self.cursor.copy(position, 16)?;
        match presence {
            ALLOC_ABSENT_U64 => return Ok(()),
            ALLOC_PRESENT_U64 => {}
            _ => return Err(Error::InvalidPresenceIndicator),
        }
        let count = u32::try_from(count).map_err(|_| Error::OutOfRange)?;
        let src_stride = aligned_element_size(src_element_size);
        let dst_stride = aligned_element_size(dst_element_size);
        let src_region = out_of_line_region(count, src_stride)?;
        let dst_region = out_of_line_region(count, dst_stride)?;
        let depth = depth.increment()?;
        let mut elements = Position {
            src_inline_offset: position.src_out_of_line_offset,
            src_out_of_line_offset: position.src_out_of_line_offset + src_region,
            dst_inline_offset: position.dst_out_of_line_offset,
            dst_out_of_line_offset: position.dst_out_of_line_offset + dst_region,
        };
        self.transform_elements(
            element,
            count,
            src_element_size,
            src_stride - src_element_size,
            dst_element_size,
            dst_stride - dst_element_size,
            dst_region,
            &mut elements,
            depth,
        )?;
        position.src_out_of_line_offset = elements.src_out_of_line_offset;
        position.dst_out_of_line_offset = elements.dst_out_of_line_offset;
        Ok(())
    }

    /// Walks `count` elements laid out back to back at the current inline
    /// offsets, at possibly different strides in the two layouts, then
    /// zeroes whatever remains of the destination region.
    fn transform_elements(
        &mut self,
        element: Option<&'static Type>,
        count: u32,
        src_element_size: u32,
        src_element_padding: u32,
        dst_element_size: u32,
        dst_element_padding: u32,
        dst_region_size: u32,
        position: &mut Position,
        depth: Depth,
    ) -> Result<()> {
        let element = match element {
            // Raw elements are identical in both layouts.
            None => return self.cursor.copy(position, dst_region_size),
            Some(element) => element,
        };
        let src_start = position.src_inline_offset;
        let dst_start = position.dst_inline_offset;
        let src_stride = src_element_size + src_element_padding;
        let dst_stride = dst_element_size + dst_element_padding;
        for i in 0..count {
            position.src_inline_offset = src_start + i * src_stride;
            position.dst_inline_offset = dst_start + i * dst_stride;
            self.transform_type(Some(element), position, dst_element_size, depth)?;
            position.dst_inline_offset = dst_start + i * dst_stride + dst_element_size;
            self.cursor.pad(position, dst_element_padding)?;
        }
        position.src_inline_offset = src_start + count * src_stride;
        position.dst_inline_offset = dst_start + count * dst_stride;
        let remainder = dst_region_size
            .checked_sub(count * dst_stride)
            .ok_or(Error::BadCodingTable)?;
        self.cursor.pad(position, remainder)
    }

    /// v1 → old: reads a 24-byte extensible-union header, maps the
    /// ordinal to the static union's tag, and inlines the out-of-line
    /// payload into the union's payload area.
    fn transform_xunion_to_union(
        &mut self,
        src: &CodedXUnion,
        position: &mut Position,
        depth: Depth,
    ) -> Result<()> {
        let dst = src.alt_type.ok_or(Error::XUnionNotTransformable)?;
        let ordinal: u32 = self.cursor.read(position)?;
        let tag = dst
            .fields
            .iter()
            .position(|variant| variant.xunion_ordinal == ordinal)
            .ok_or(Error::UnknownUnionOrdinal)?;
        let src_field = src.fields.get(tag).ok_or(Error::BadCodingTable)?;
        let dst_field = &dst.fields[tag];
        let presence: u64 = self.cursor.read(&Position {
            src_inline_offset: position.src_inline_offset + 16,
            ..*position
        })?;
        if presence != ALLOC_PRESENT_U64 {
            return Err(Error::InvalidPresenceIndicator);
        }
        match dst.data_offset {
            4 => self.cursor.write::<u32>(position, tag as u32)?,
            8 => self.cursor.write::<u64>(position, tag as u64)?,
            _ => return Err(Error::InvalidUnionTagOffset),
        }
        let dst_variant_size = match dst_field.ty {
            Some(ty) => ty.inline_size(),
            None => dst.size - dst.data_offset - dst_field.padding,
        };
        // The payload appears in the envelope the way the v1 layout
        // renders the variant, so the source stride comes from the
        // v1-side descriptor.
        let src_variant_size = match src_field.ty {
            Some(ty) => ty.inline_size(),
            None => dst_variant_size,
        };
        let depth = depth.increment()?;
        let mut payload = Position {
            src_inline_offset: position.src_out_of_line_offset,
            src_out_of_line_offset: position.src_out_of_line_offset + fidl_align(src_variant_size),
            dst_inline_offset: position.dst_inline_offset + dst.data_offset,
            dst_out_of_line_offset: position.dst_out_of_line_offset,
        };
        self.transform_type(src_field.ty, &mut payload, dst_variant_size, depth)?;
        // Fill out the rest of the payload area so every byte of the
        // union is defined.
        let mut tail = Position {
            dst_inline_offset: position.dst_inline_offset + dst.data_offset + dst_variant_size,
            ..payload
        };
        self.cursor.pad(&mut tail, dst_field.padding)?;
        position.src_out_of_line_offset = payload.src_out_of_line_offset;
        position.dst_out_of_line_offset = payload.dst_out_of_line_offset;
        Ok(())
    }

    /// old → v1: reads the static union's tag and emits a 24-byte
    /// extensible-union header whose payload goes out-of-line.
    /// `num_bytes` and `num_handles` cover the payload's transitive
    /// allocations, so they are written once the payload walk is done.
    fn transform_union_to_xunion(
        &mut self,
        src: &CodedUnion,
        position: &mut Position,
        depth: Depth,
    ) -> Result<()> {
        let dst = src.alt_type.ok_or(Error::MissingAltType)?;
        let tag = match src.data_offset {
            4 => self.cursor.read::<u32>(position)? as usize,
            8 => {
                let tag = self.cursor.read::<u64>(position)?;
                usize::try_from(tag).map_err(|_| Error::UnknownUnionTag)?
            }
            _ => return Err(Error::InvalidUnionTagOffset),
        };
        let src_field = src.fields.get(tag).ok_or(Error::UnknownUnionTag)?;
        let dst_field = dst.fields.get(tag).ok_or(Error::BadCodingTable)?;
        let src_variant_size = match src_field.ty {
            Some(ty) => ty.inline_size(),
            None => src.size - src.data_offset - src_field.padding,
        };
        let dst_variant_size = match dst_field.ty {
            Some(ty) => ty.inline_size(),
            None => src_variant_size,
        };
        self.cursor.write::<u32>(position, src_field.xunion_ordinal)?;
        self.cursor.write::<u32>(
            &Position { dst_inline_offset: position.dst_inline_offset + 4, ..*position },
            0,
        )?;
        self.cursor.write::<u64>(
            &Position { dst_inline_offset: position.dst_inline_offset + 16, ..*position },
            ALLOC_PRESENT_U64,
        )?;
        let handles_before = self.handle_count;
        let payload_start = position.dst_out_of_line_offset;
        let depth = depth.increment()?;
        let mut payload = Position {
            src_inline_offset: position.src_inline_offset + src.data_offset,
            src_out_of_line_offset: position.src_out_of_line_offset,
            dst_inline_offset: payload_start,
            dst_out_of_line_offset: payload_start + fidl_align(dst_variant_size),
        };
        self.transform_type(src_field.ty, &mut payload, dst_variant_size, depth)?;
        // Zero the envelope payload out to its 8-byte boundary.
        let mut tail =
            Position { dst_inline_offset: payload_start + dst_variant_size, ..payload };
        self.cursor.pad(&mut tail, fidl_align(dst_variant_size) - dst_variant_size)?;
        let num_bytes = payload.dst_out_of_line_offset - payload_start;
        let num_handles = self.handle_count - handles_before;
        self.cursor.write::<u32>(
            &Position { dst_inline_offset: position.dst_inline_offset + 8, ..*position },
            num_bytes,
        )?;
        self.cursor.write::<u32>(
            &Position { dst_inline_offset: position.dst_inline_offset + 12, ..*position },
            num_handles,
        )?;
        position.src_out_of_line_offset = payload.src_out_of_line_offset;
        position.dst_out_of_line_offset = payload.dst_out_of_line_offset;
        Ok(())
    }
}

/// The 8-aligned out-of-line region occupied by `count` elements of the
/// given stride.
fn out_of_line_region(count: u32, stride: u32) -> Result<u32> {
    let bytes = u64::from(count) * u64::from(stride);
    if bytes > u64::from(MAX_MSG_BYTES) {
        return Err(Error::OutOfRange);
    }
    Ok(fidl_align(bytes as u32))
}
