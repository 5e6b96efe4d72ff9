//! Element trait: the compile-time side of [`DType`].
//!
//! Kernels are written once, generic over `T: Element`, and instantiated per
//! element type. The runtime dtype tag is inspected once per call through
//! [`dispatch_dtype!`](crate::dispatch_dtype), never inside a hot loop.

use std::fmt;

use bytemuck::{Pod, Zeroable};
use num_complex::Complex;

use crate::dtype::DType;

/// One-byte boolean (`0` or `1`), the in-buffer representation of [`DType::Bool`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
#[repr(transparent)]
pub struct Bool8(u8);

impl Bool8 {
    pub const FALSE: Bool8 = Bool8(0);
    pub const TRUE: Bool8 = Bool8(1);

    pub fn new(value: bool) -> Self {
        Bool8(value as u8)
    }

    pub fn get(self) -> bool {
        self.0 != 0
    }
}

impl From<bool> for Bool8 {
    fn from(value: bool) -> Self {
        Bool8::new(value)
    }
}

impl From<Bool8> for bool {
    fn from(value: Bool8) -> Self {
        value.get()
    }
}

impl fmt::Debug for Bool8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// A plain-data element that can live in a tensor buffer.
pub trait Element: Pod + Send + Sync + PartialEq + fmt::Debug + 'static {
    /// Runtime tag matching this type.
    const DTYPE: DType;

    /// Additive identity (all-zero bytes for every supported type).
    #[inline]
    fn zero() -> Self {
        Self::zeroed()
    }

    /// `self += rhs`, associative and commutative.
    ///
    /// Integers wrap on overflow, booleans OR.
    fn accumulate(&mut self, rhs: Self);

    /// Integer value of an index element.
    ///
    /// Floats are truncated toward zero. Returns `None` for non-finite floats
    /// and for types that cannot index (bool, complex).
    #[inline]
    fn to_index(self) -> Option<i64> {
        None
    }
}

impl Element for Bool8 {
    const DTYPE: DType = DType::Bool;

    #[inline]
    fn accumulate(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

macro_rules! impl_int_element {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const DTYPE: DType = DType::$dtype;

                #[inline]
                fn accumulate(&mut self, rhs: Self) {
                    *self = self.wrapping_add(rhs);
                }

                #[inline]
                fn to_index(self) -> Option<i64> {
                    // u64 values beyond i64::MAX are out of range for any axis anyway.
                    Some(i64::try_from(self).unwrap_or(i64::MAX))
                }
            }
        )*
    };
}

impl_int_element!(
    i8 => I8, i16 => I16, i32 => I32, i64 => I64,
    u8 => U8, u16 => U16, u32 => U32, u64 => U64,
);

macro_rules! impl_float_element {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const DTYPE: DType = DType::$dtype;

                #[inline]
                fn accumulate(&mut self, rhs: Self) {
                    *self += rhs;
                }

                #[inline]
                fn to_index(self) -> Option<i64> {
                    if self.is_finite() {
                        Some(self.trunc() as i64)
                    } else {
                        None
                    }
                }
            }
        )*
    };
}

impl_float_element!(f32 => F32, f64 => F64);

impl Element for Complex<f32> {
    const DTYPE: DType = DType::C64;

    #[inline]
    fn accumulate(&mut self, rhs: Self) {
        *self += rhs;
    }
}

impl Element for Complex<f64> {
    const DTYPE: DType = DType::C128;

    #[inline]
    fn accumulate(&mut self, rhs: Self) {
        *self += rhs;
    }
}

/// Bind a concrete [`Element`] type for a runtime [`DType`] and evaluate `$body`.
///
/// ```
/// use tessel_core::{dispatch_dtype, DType, Element};
///
/// let size = dispatch_dtype!(DType::I16, T => std::mem::size_of::<T>());
/// assert_eq!(size, 2);
/// ```
#[macro_export]
macro_rules! dispatch_dtype {
    ($dtype:expr, $T:ident => $body:expr) => {
        match $dtype {
            $crate::DType::Bool => { type $T = $crate::Bool8; $body }
            $crate::DType::I8 => { type $T = i8; $body }
            $crate::DType::I16 => { type $T = i16; $body }
            $crate::DType::I32 => { type $T = i32; $body }
            $crate::DType::I64 => { type $T = i64; $body }
            $crate::DType::U8 => { type $T = u8; $body }
            $crate::DType::U16 => { type $T = u16; $body }
            $crate::DType::U32 => { type $T = u32; $body }
            $crate::DType::U64 => { type $T = u64; $body }
            $crate::DType::F32 => { type $T = f32; $body }
            $crate::DType::F64 => { type $T = f64; $body }
            $crate::DType::C64 => { type $T = $crate::Complex<f32>; $body }
            $crate::DType::C128 => { type $T = $crate::Complex<f64>; $body }
        }
    };
}
