//! Primitive data types and the scalar codec.
//!
//! Kernel arguments and return values travel between host and device as raw
//! little-endian bytes laid out by a [`KernelContextAttributes`] schema. This
//! module owns the mapping between a declared [`PrimitiveType`] and the
//! host-side [`Scalar`] value that fills (or is read from) its slot.
//!
//! ## Half precision
//! The host never carries `f16` values. An `F16` slot is written from an
//! [`Scalar::F32`] (rounded to nearest) and read back as an `F32`.
//!
//! [`KernelContextAttributes`]: crate::runtime::kernel::KernelContextAttributes

use std::fmt;

use half::f16;

/// Primitive element type of a kernel argument or return slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    /// Signed 8-bit integer.
    I8,
    /// Unsigned 8-bit integer.
    U8,
    /// Signed 16-bit integer.
    I16,
    /// Unsigned 16-bit integer.
    U16,
    /// Signed 32-bit integer.
    I32,
    /// Unsigned 32-bit integer.
    U32,
    /// Signed 64-bit integer.
    I64,
    /// Unsigned 64-bit integer.
    U64,
    /// IEEE 754 binary16.
    F16,
    /// IEEE 754 binary32.
    F32,
    /// IEEE 754 binary64.
    F64,
}

impl PrimitiveType {
    /// Size of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            PrimitiveType::I8 | PrimitiveType::U8 => 1,
            PrimitiveType::I16 | PrimitiveType::U16 | PrimitiveType::F16 => 2,
            PrimitiveType::I32 | PrimitiveType::U32 | PrimitiveType::F32 => 4,
            PrimitiveType::I64 | PrimitiveType::U64 | PrimitiveType::F64 => 8,
        }
    }

    /// Returns `true` for the floating-point types.
    pub const fn is_float(self) -> bool {
        matches!(self, PrimitiveType::F16 | PrimitiveType::F32 | PrimitiveType::F64)
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrimitiveType::I8 => "i8",
            PrimitiveType::U8 => "u8",
            PrimitiveType::I16 => "i16",
            PrimitiveType::U16 => "u16",
            PrimitiveType::I32 => "i32",
            PrimitiveType::U32 => "u32",
            PrimitiveType::I64 => "i64",
            PrimitiveType::U64 => "u64",
            PrimitiveType::F16 => "f16",
            PrimitiveType::F32 => "f32",
            PrimitiveType::F64 => "f64",
        };
        f.write_str(name)
    }
}

/// A host-side scalar value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    /// `i8` value.
    I8(i8),
    /// `u8` value.
    U8(u8),
    /// `i16` value.
    I16(i16),
    /// `u16` value.
    U16(u16),
    /// `i32` value.
    I32(i32),
    /// `u32` value.
    U32(u32),
    /// `i64` value.
    I64(i64),
    /// `u64` value.
    U64(u64),
    /// `f32` value; also the host form of `f16` slots.
    F32(f32),
    /// `f64` value.
    F64(f64),
}

macro_rules! scalar_codec {
    ($($ty:ident => $variant:ident : $rust:ty),* $(,)?) => {
        impl Scalar {
            /// Writes `self` into `out` as the declared type `ty`.
            ///
            /// Returns `None` when the variant does not match `ty` (an `F16`
            /// slot accepts [`Scalar::F32`]). `out` must be at least
            /// `ty.size()` bytes.
            pub fn encode(self, ty: PrimitiveType, out: &mut [u8]) -> Option<()> {
                let dst = out.get_mut(..ty.size())?;
                match (ty, self) {
                    $((PrimitiveType::$ty, Scalar::$variant(v)) => {
                        dst.copy_from_slice(&v.to_le_bytes());
                    })*
                    (PrimitiveType::F16, Scalar::F32(v)) => {
                        dst.copy_from_slice(&f16::from_f32(v).to_le_bytes());
                    }
                    _ => return None,
                }
                Some(())
            }

            /// Reads a value of type `ty` from the front of `bytes`.
            ///
            /// Returns `None` if `bytes` is shorter than `ty.size()`.
            pub fn decode(ty: PrimitiveType, bytes: &[u8]) -> Option<Scalar> {
                let src = bytes.get(..ty.size())?;
                let value = match ty {
                    $(PrimitiveType::$ty => {
                        Scalar::$variant(<$rust>::from_le_bytes(src.try_into().ok()?))
                    })*
                    PrimitiveType::F16 => {
                        Scalar::F32(f16::from_le_bytes(src.try_into().ok()?).to_f32())
                    }
                };
                Some(value)
            }

            /// The primitive type this value carries natively.
            pub fn primitive_type(&self) -> PrimitiveType {
                match self {
                    $(Scalar::$variant(_) => PrimitiveType::$ty,)*
                }
            }
        }
    };
}

scalar_codec! {
    I8 => I8: i8,
    U8 => U8: u8,
    I16 => I16: i16,
    U16 => U16: u16,
    I32 => I32: i32,
    U32 => U32: u32,
    I64 => I64: i64,
    U64 => U64: u64,
    F32 => F32: f32,
    F64 => F64: f64,
}

impl Scalar {
    /// Lossy view of the value as `f64`, handy for comparisons in tests and logs.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Scalar::I8(v) => v as f64,
            Scalar::U8(v) => v as f64,
            Scalar::I16(v) => v as f64,
            Scalar::U16(v) => v as f64,
            Scalar::I32(v) => v as f64,
            Scalar::U32(v) => v as f64,
            Scalar::I64(v) => v as f64,
            Scalar::U64(v) => v as f64,
            Scalar::F32(v) => v as f64,
            Scalar::F64(v) => v,
        }
    }
}

macro_rules! scalar_from {
    ($($rust:ty => $variant:ident),* $(,)?) => {
        $(impl From<$rust> for Scalar {
            fn from(v: $rust) -> Self {
                Scalar::$variant(v)
            }
        })*
    };
}

scalar_from! {
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
}
