// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Scalar marker types.
//!
//! Each scalar type a shader can hold is a zero-sized marker.  Operators are
//! implemented per marker trait, so asking for a shift on a float is a
//! compile error rather than a bad module.

use std::fmt::{Display, Formatter};

/// The runtime tag of a scalar type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ScalarKind {
    Bool,
    I32,
    I64,
    F32,
    F64,
}

impl ScalarKind {
    pub const fn is_float(self) -> bool {
        matches!(self, ScalarKind::F32 | ScalarKind::F64)
    }

    pub const fn is_integer(self) -> bool {
        matches!(self, ScalarKind::I32 | ScalarKind::I64)
    }

    /// Width in bits.  Bools report 32, the width they occupy in a buffer-less module.
    pub const fn width(self) -> u32 {
        match self {
            ScalarKind::I64 | ScalarKind::F64 => 64,
            _ => 32,
        }
    }

    /// Size of one element in an interface array.
    pub const fn stride(self) -> u32 {
        self.width() / 8
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            ScalarKind::Bool => 0,
            ScalarKind::I32 => 1,
            ScalarKind::I64 => 2,
            ScalarKind::F32 => 3,
            ScalarKind::F64 => 4,
        }
    }

    pub(crate) const ELEMENTS: [ScalarKind; 4] = [
        ScalarKind::I32,
        ScalarKind::I64,
        ScalarKind::F32,
        ScalarKind::F64,
    ];
}

impl Display for ScalarKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ScalarKind::Bool => "bool",
            ScalarKind::I32 => "int32",
            ScalarKind::I64 => "int64",
            ScalarKind::F32 => "float32",
            ScalarKind::F64 => "float64",
        };
        f.write_str(name)
    }
}

mod sealed {
    pub trait Sealed {}
}

/// A scalar type usable in shader code.
pub trait Scalar: sealed::Sealed + Copy + std::fmt::Debug + 'static {
    const KIND: ScalarKind;
}

/// Types with arithmetic.
pub trait Numeric: Scalar {}

/// Two's complement integers.  Signedness is chosen per operation, not per type.
pub trait Integer: Numeric {}

/// IEEE floats.
pub trait Float: Numeric {}

/// Types an interface array may hold.
pub trait Element: Numeric {}

macro_rules! scalar {
    ($(#[$meta:meta])* $name:ident, $kind:ident, $($marker:ident),*) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name;
        impl sealed::Sealed for $name {}
        impl Scalar for $name {
            const KIND: ScalarKind = ScalarKind::$kind;
        }
        $(impl $marker for $name {})*
    };
}

scalar!(
    /// Booleans.  Live only in registers and local variables.
    Bool, Bool,
);
scalar!(I32, I32, Numeric, Integer, Element);
scalar!(I64, I64, Numeric, Integer, Element);
scalar!(F32, F32, Numeric, Float, Element);
scalar!(F64, F64, Numeric, Float, Element);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strides() {
        assert_eq!(I32::KIND.stride(), 4);
        assert_eq!(F32::KIND.stride(), 4);
        assert_eq!(I64::KIND.stride(), 8);
        assert_eq!(F64::KIND.stride(), 8);
        let indices: Vec<usize> = ScalarKind::ELEMENTS.iter().map(|k| k.index()).collect();
        assert_eq!(indices, vec![1, 2, 3, 4]);
        assert_eq!(Bool::KIND.index(), 0);
    }
}
