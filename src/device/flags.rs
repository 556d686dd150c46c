// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Capability bit sets.
//!
//! Queue and memory bits use the driver's own values so they convert without a table.

use std::fmt::{Debug, Formatter};
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// Operations common to every flag set, used by the generic matcher.
pub trait Flags: Copy + Eq + Debug + BitOr<Output = Self> + BitAnd<Output = Self> {
    fn empty() -> Self;
    fn bits(self) -> u32;

    fn contains(self, other: Self) -> bool {
        (self & other) == other
    }

    fn intersects(self, other: Self) -> bool {
        (self & other).bits() != 0
    }
}

macro_rules! flag_set {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$fmeta:meta])* $flag:ident = $bit:expr),* $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(u32);

        impl $name {
            $($(#[$fmeta])* pub const $flag: $name = $name($bit);)*

            pub const fn empty() -> Self {
                $name(0)
            }

            pub const fn from_bits(bits: u32) -> Self {
                $name(bits)
            }

            pub const fn bits(self) -> u32 {
                self.0
            }

            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            pub const fn intersects(self, other: Self) -> bool {
                self.0 & other.0 != 0
            }

            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }
        }

        impl Flags for $name {
            fn empty() -> Self {
                $name(0)
            }
            fn bits(self) -> u32 {
                self.0
            }
        }

        impl BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: Self) -> Self {
                $name(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl BitAnd for $name {
            type Output = $name;
            fn bitand(self, rhs: Self) -> Self {
                $name(self.0 & rhs.0)
            }
        }

        impl Not for $name {
            type Output = $name;
            fn not(self) -> Self {
                $name(!self.0)
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}(", stringify!($name))?;
                let mut first = true;
                $(
                    if self.0 & $bit != 0 {
                        if !first {
                            f.write_str(" | ")?;
                        }
                        f.write_str(stringify!($flag))?;
                        first = false;
                    }
                )*
                if first {
                    f.write_str("empty")?;
                }
                f.write_str(")")
            }
        }
    };
}

flag_set!(
    /// What a queue family can execute.
    QueueFlags {
        GRAPHICS = 0x1,
        COMPUTE = 0x2,
        TRANSFER = 0x4,
        SPARSE_BINDING = 0x8,
        PROTECTED = 0x10,
    }
);

flag_set!(
    /// Properties of a memory type.
    MemoryFlags {
        DEVICE_LOCAL = 0x1,
        HOST_VISIBLE = 0x2,
        /// Host writes and device writes are visible without explicit flushes.
        HOST_COHERENT = 0x4,
        HOST_CACHED = 0x8,
        LAZILY_ALLOCATED = 0x10,
        PROTECTED = 0x20,
    }
);

flag_set!(
    /// Optional device features a shader may rely on.
    FeatureFlags {
        SHADER_FLOAT64 = 0x1,
        SHADER_INT64 = 0x2,
        SHADER_INT16 = 0x4,
        ROBUST_BUFFER_ACCESS = 0x8,
    }
);

flag_set!(
    /// How a buffer will be used.
    BufferUsage {
        TRANSFER_SRC = 0x1,
        TRANSFER_DST = 0x2,
        STORAGE_BUFFER = 0x20,
    }
);

flag_set!(
    /// Memory accesses a barrier orders.
    AccessFlags {
        SHADER_READ = 0x20,
        SHADER_WRITE = 0x40,
        TRANSFER_READ = 0x800,
        TRANSFER_WRITE = 0x1000,
        HOST_READ = 0x2000,
        HOST_WRITE = 0x4000,
    }
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_operations() {
        let q = QueueFlags::COMPUTE | QueueFlags::TRANSFER;
        assert!(q.contains(QueueFlags::COMPUTE));
        assert!(!q.contains(QueueFlags::COMPUTE | QueueFlags::GRAPHICS));
        assert!(q.intersects(QueueFlags::COMPUTE | QueueFlags::GRAPHICS));
        assert!(q.contains(QueueFlags::empty()));
        assert!((q & QueueFlags::GRAPHICS).is_empty());
        assert_eq!(format!("{q:?}"), "QueueFlags(COMPUTE | TRANSFER)");
        assert_eq!(format!("{:?}", MemoryFlags::empty()), "MemoryFlags(empty)");
    }
}
