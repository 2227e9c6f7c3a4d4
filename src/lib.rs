// Copyright 2020 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Transforms encoded FIDL messages between the old wire format, in which
//! unions are stored inline as a tag and a fixed payload area, and the v1
//! wire format, in which unions are stored as extensible tagged envelopes
//! with out-of-line payload.
//!
//! The transformation is schema-directed: the caller supplies the coding
//! table describing the message in the source layout, and the engine
//! walks the encoded bytes under that table's direction, emitting the
//! same logical message re-encoded in the target layout. Every byte not
//! affected by the layout change is preserved; bytes that are affected
//! are rewritten, and the output layout's padding, alignment, and
//! out-of-line ordering invariants are re-established.
//!
//! The core performs no allocation; callers supply the source and
//! destination regions, which must not overlap. Handles pass through as
//! opaque presence markers and no handle table is consulted.
//!
//! ```
//! use fidl_transformer::{transform, Transformation};
//! # use fidl_transformer::coding::CodedStruct;
//! # static SOME_STRUCT_V1_TABLE: CodedStruct = CodedStruct {
//! #     fields: &[], size: 8, name: "SomeStruct",
//! #     alt_type: Some(&SOME_STRUCT_TABLE),
//! # };
//! # static SOME_STRUCT_TABLE: CodedStruct = CodedStruct {
//! #     fields: &[], size: 8, name: "SomeStruct",
//! #     alt_type: Some(&SOME_STRUCT_V1_TABLE),
//! # };
//! # let v1_type = fidl_transformer::coding::Type::Struct(&SOME_STRUCT_V1_TABLE);
//! # let v1_bytes = [0u8; 8];
//! let mut old_bytes = [0u8; 65536];
//! let len = transform(Transformation::V1ToOld, &v1_type, &v1_bytes, &mut old_bytes)?;
//! let old_message = &old_bytes[..len];
//! # assert_eq!(old_message, &v1_bytes);
//! # Ok::<(), fidl_transformer::Error>(())
//! ```

pub mod coding;
mod cursor;
mod transform;
pub mod wire;

pub use transform::transform;

use thiserror::Error;

/// A specialized `Result` type for transformation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The available transformations. Defined over `u64` so the value can
/// travel through ABI boundaries without padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum Transformation {
    /// The no-op transformation: succeeds without writing any output.
    None = 0,
    /// In the v1 wire format, unions are encoded as extensible unions.
    /// This transformation inlines them back into their container,
    /// moving their payload from out-of-line to inline.
    V1ToOld = 1,
    /// The inverse: hoists inline unions out into extensible-union
    /// envelopes.
    OldToV1 = 2,
}

impl Transformation {
    /// Maps a raw direction value onto a transformation. Unrecognized
    /// values are an error, not a no-op.
    pub fn from_raw(raw: u64) -> Result<Transformation> {
        match raw {
            0 => Ok(Transformation::None),
            1 => Ok(Transformation::V1ToOld),
            2 => Ok(Transformation::OldToV1),
            _ => Err(Error::UnknownTransformation(raw)),
        }
    }
}

/// The coarse failure classes a transformation distinguishes. Input
/// errors identify a source message that does not conform to its coding
/// table; capacity errors mean the caller must retry with a larger
/// destination; state errors mean the coding table is outside the
/// supported envelope and retrying cannot help.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgs,
    BadInput,
    BufferTooSmall,
    BadState,
}

/// The error type for transformation operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Only struct types can be transformed at the top level.
    #[error("only top-level structs are supported")]
    TopTypeNotStruct,
    /// The raw direction value names no known transformation.
    #[error("unknown transformation: {0}")]
    UnknownTransformation(u64),
    /// A read would fall outside the source region.
    #[error("out of range")]
    OutOfRange,
    /// The source region exceeds the maximum message size.
    #[error("source exceeds the maximum message size")]
    SourceTooLarge,
    /// An extensible-union ordinal in the source has no counterpart in
    /// the static union's variant list.
    #[error("ordinal has no corresponding variant")]
    UnknownUnionOrdinal,
    /// A static-union tag in the source is outside the variant list.
    #[error("union tag has no corresponding variant")]
    UnknownUnionTag,
    /// A presence word was neither `PRESENT` nor `ABSENT`.
    #[error("invalid presence indicator")]
    InvalidPresenceIndicator,
    /// The message nests out-of-line objects too deeply.
    #[error("maximum recursion depth exceeded")]
    MaxRecursionDepth,
    /// A write would fall outside the destination region.
    #[error("destination buffer is too small")]
    BufferTooSmall,
    /// Tables are reserved for a future transformation.
    #[error("tables cannot be transformed")]
    TableNotTransformable,
    /// Genuine extensible unions (those with no static counterpart) are
    /// reserved for a future transformation.
    #[error("extensible unions cannot be transformed")]
    XUnionNotTransformable,
    /// Nullable unions are no longer part of the wire format.
    #[error("nullable unions are no longer supported")]
    UnionPointerNotSupported,
    /// A descriptor that must carry a counterpart link does not.
    #[error("coding table is missing an alternate type")]
    MissingAltType,
    /// A union's tag area was neither 4 nor 8 bytes.
    #[error("invalid union tag offset")]
    InvalidUnionTagOffset,
    /// A coding table's recorded offsets or sizes are inconsistent.
    #[error("malformed coding table")]
    BadCodingTable,
}

impl Error {
    /// The failure class this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TopTypeNotStruct | Error::UnknownTransformation(_) => ErrorKind::InvalidArgs,
            Error::OutOfRange
            | Error::SourceTooLarge
            | Error::UnknownUnionOrdinal
            | Error::UnknownUnionTag
            | Error::InvalidPresenceIndicator
            | Error::MaxRecursionDepth => ErrorKind::BadInput,
            Error::BufferTooSmall => ErrorKind::BufferTooSmall,
            Error::TableNotTransformable
            | Error::XUnionNotTransformable
            | Error::UnionPointerNotSupported
            | Error::MissingAltType
            | Error::InvalidUnionTagOffset
            | Error::BadCodingTable => ErrorKind::BadState,
        }
    }
}
