// Copyright 2020 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Coding tables: static descriptors for every type that can appear in an
//! encoded message.
//!
//! A descriptor graph is closed and immutable; the descriptors for a
//! message type live for the program lifetime, so counterpart links are
//! `&'static` references. Every descriptor of a type whose encoding
//! differs between the old and v1 layouts carries an `alt_type` link to
//! its counterpart in the other layout, and every structural field of a
//! record carries an `alt_field` link to the corresponding field of the
//! counterpart record. The transformation engine never searches for a
//! counterpart; it only follows these links.

use crate::wire::XUNION_INLINE_SIZE;

/// An encoded primitive and its underlying width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
}

impl Primitive {
    /// The on-wire width in bytes.
    pub fn width(&self) -> u32 {
        match self {
            Primitive::Bool | Primitive::Int8 | Primitive::Uint8 => 1,
            Primitive::Int16 | Primitive::Uint16 => 2,
            Primitive::Int32 | Primitive::Uint32 | Primitive::Float32 => 4,
            Primitive::Int64 | Primitive::Uint64 | Primitive::Float64 => 8,
        }
    }
}

/// An enum, stored on the wire as its underlying primitive.
#[derive(Debug, Clone, Copy)]
pub struct CodedEnum {
    pub underlying: Primitive,
}

/// A bit-set, stored on the wire as its underlying primitive.
#[derive(Debug, Clone, Copy)]
pub struct CodedBits {
    pub underlying: Primitive,
    pub mask: u64,
}

/// A handle slot: 4 bytes, either `ALLOC_PRESENT_U32` or
/// `ALLOC_ABSENT_U32`. Handle values pass through untouched.
#[derive(Debug, Clone, Copy)]
pub struct CodedHandle {
    pub subtype: u32,
    pub nullable: bool,
}

/// A length-prefixed string. Strings encode exactly like nullable vectors
/// of bytes.
#[derive(Debug, Clone, Copy)]
pub struct CodedString {
    pub max_size: u32,
    pub nullable: bool,
}

/// One member of a record.
///
/// A field with no type descriptor is a raw region (primitives and
/// padding) that needs no structural rewrite; for such fields `offset` is
/// the end of the field's data span and `padding` the trailing padding
/// after it. A field with a descriptor gives the member's inline offset
/// within the record, and `alt_field` is the same logical member in the
/// counterpart record.
#[derive(Debug)]
pub struct StructField {
    pub ty: Option<&'static Type>,
    pub offset: u32,
    pub padding: u8,
    pub alt_field: Option<&'static StructField>,
}

/// A record: ordered members at fixed inline offsets.
#[derive(Debug)]
pub struct CodedStruct {
    pub fields: &'static [StructField],
    pub size: u32,
    pub name: &'static str,
    pub alt_type: Option<&'static CodedStruct>,
}

/// One variant of a static union. `xunion_ordinal` is the ordinal the same
/// logical variant carries in the counterpart extensible union.
#[derive(Debug)]
pub struct UnionField {
    pub ty: Option<&'static Type>,
    pub padding: u32,
    pub xunion_ordinal: u32,
}

/// A static union: a 4- or 8-byte tag area followed by a payload area
/// sized to the widest variant. On the wire the tag is the variant's
/// zero-based index in `fields`; `data_offset` is where the payload
/// starts (4 or 8, per the union's alignment).
#[derive(Debug)]
pub struct CodedUnion {
    pub fields: &'static [UnionField],
    pub data_offset: u32,
    pub size: u32,
    pub name: &'static str,
    pub alt_type: Option<&'static CodedXUnion>,
}

/// One variant of an extensible union, keyed by its 32-bit ordinal.
#[derive(Debug)]
pub struct XUnionField {
    pub ty: Option<&'static Type>,
    pub ordinal: u32,
}

/// An extensible union: a 4-byte ordinal, 4 bytes of zero padding, and an
/// envelope whose payload is out-of-line. An extensible union standing in
/// for a migrated static union links to that union via `alt_type`; a
/// genuine extensible union has no counterpart and cannot be transformed.
#[derive(Debug)]
pub struct CodedXUnion {
    pub fields: &'static [XUnionField],
    pub name: &'static str,
    pub alt_type: Option<&'static CodedUnion>,
    pub strict: bool,
}

/// A fixed-length array. `element` is absent for pure-byte arrays.
/// Elements are stored at a stride of `element_size + element_padding`.
#[derive(Debug)]
pub struct CodedArray {
    pub element: Option<&'static Type>,
    pub element_count: u32,
    pub element_size: u32,
    pub element_padding: u32,
    pub alt_type: Option<&'static CodedArray>,
}

impl CodedArray {
    /// The declared inline size of the whole array.
    pub fn size(&self) -> u32 {
        self.element_count * (self.element_size + self.element_padding)
    }
}

/// A length-prefixed vector. `element` is absent when the element type
/// contains nothing structural (e.g. plain bytes).
#[derive(Debug)]
pub struct CodedVector {
    pub element: Option<&'static Type>,
    pub max_count: u32,
    pub element_size: u32,
    pub nullable: bool,
    pub alt_type: Option<&'static CodedVector>,
}

/// One member of a table, keyed by ordinal.
#[derive(Debug)]
pub struct TableField {
    pub ty: &'static Type,
    pub ordinal: u32,
}

/// A table. Reserved for a future transformation; the engine rejects it.
#[derive(Debug)]
pub struct CodedTable {
    pub fields: &'static [TableField],
    pub name: &'static str,
}

/// A type descriptor. The engine dispatches on this to pick the transform
/// rule for each region of the message.
#[derive(Debug, Clone, Copy)]
pub enum Type {
    Primitive(Primitive),
    Enum(CodedEnum),
    Bits(CodedBits),
    Struct(&'static CodedStruct),
    StructPointer(&'static CodedStruct),
    Union(&'static CodedUnion),
    UnionPointer(&'static CodedUnion),
    Array(&'static CodedArray),
    String(CodedString),
    Handle(CodedHandle),
    Vector(&'static CodedVector),
    Table(&'static CodedTable),
    XUnion(&'static CodedXUnion),
}

impl Type {
    /// The number of bytes this type occupies inline, in the layout of the
    /// table the descriptor belongs to. Old-layout tables describe
    /// migrated sum types as static unions (sized to their declared
    /// size); v1-layout tables describe them as extensible unions (always
    /// 24 bytes inline).
    pub fn inline_size(&self) -> u32 {
        match self {
            Type::Primitive(p) => p.width(),
            Type::Enum(e) => e.underlying.width(),
            Type::Bits(b) => b.underlying.width(),
            Type::Struct(s) => s.size,
            Type::StructPointer(_) | Type::UnionPointer(_) => 8,
            Type::Union(u) => u.size,
            Type::Array(a) => a.size(),
            Type::String(_) | Type::Vector(_) => 16,
            Type::Handle(_) => 4,
            Type::Table(_) => 16,
            Type::XUnion(_) => XUNION_INLINE_SIZE,
        }
    }
}
