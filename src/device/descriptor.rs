// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! What a physical device reports about itself.

use std::fmt::{Display, Formatter};

use super::flags::{FeatureFlags, MemoryFlags, QueueFlags};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Other,
    IntegratedGpu,
    DiscreteGpu,
    VirtualGpu,
    Cpu,
}

impl Display for DeviceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DeviceKind::Other => "other",
            DeviceKind::IntegratedGpu => "integrated",
            DeviceKind::DiscreteGpu => "discrete",
            DeviceKind::VirtualGpu => "virtual",
            DeviceKind::Cpu => "cpu",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueFamily {
    pub flags: QueueFlags,
    /// Queues available in this family.
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryType {
    pub flags: MemoryFlags,
    /// Index into [DeviceDescriptor::memory_heaps].
    pub heap: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryHeap {
    /// Capacity in bytes.
    pub size: u64,
    pub device_local: bool,
}

/**
A physical device as the matcher sees it.

`Display` prints a compact report, one line per item:

```text
Example GPU
discrete
Q0 GCT x16
Q1 C x2
Mtp0 L -> M[0]
Mtp1 VC -> M[1]
M0 8G L
M1 256M
```
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub name: String,
    pub kind: DeviceKind,
    pub features: FeatureFlags,
    pub queue_families: Vec<QueueFamily>,
    pub memory_types: Vec<MemoryType>,
    pub memory_heaps: Vec<MemoryHeap>,
}

impl DeviceDescriptor {
    /// Whether memory type `index` needs explicit flushes and invalidations.
    pub fn memory_is_coherent(&self, index: usize) -> bool {
        self.memory_types
            .get(index)
            .is_some_and(|t| t.flags.contains(MemoryFlags::HOST_COHERENT))
    }
}

/// Scales `bytes` down by 1024 while the value is above 2048.
fn human_size(bytes: u64) -> (u64, char) {
    const UNITS: &[u8] = b"bkMGTPEZYRQ";
    let mut value = bytes;
    let mut unit = 0;
    while value > 2048 && unit + 1 < UNITS.len() {
        value /= 1024;
        unit += 1;
    }
    (value, UNITS[unit] as char)
}

impl Display for DeviceDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.name)?;
        writeln!(f, "{}", self.kind)?;
        for (j, family) in self.queue_families.iter().enumerate() {
            write!(f, "Q{j} ")?;
            for (flag, letter) in [
                (QueueFlags::GRAPHICS, 'G'),
                (QueueFlags::COMPUTE, 'C'),
                (QueueFlags::TRANSFER, 'T'),
            ] {
                if family.flags.contains(flag) {
                    write!(f, "{letter}")?;
                }
            }
            writeln!(f, " x{}", family.count)?;
        }
        for (j, memory_type) in self.memory_types.iter().enumerate() {
            write!(f, "Mtp{j} ")?;
            for (flag, letter) in [
                (MemoryFlags::DEVICE_LOCAL, 'L'),
                (MemoryFlags::HOST_VISIBLE, 'V'),
                (MemoryFlags::HOST_COHERENT, 'C'),
                (MemoryFlags::HOST_CACHED, '$'),
            ] {
                if memory_type.flags.contains(flag) {
                    write!(f, "{letter}")?;
                }
            }
            writeln!(f, " -> M[{}]", memory_type.heap)?;
        }
        for (j, heap) in self.memory_heaps.iter().enumerate() {
            let (value, unit) = human_size(heap.size);
            write!(f, "M{j} {value}{unit}")?;
            if heap.device_local {
                write!(f, " L")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(human_size(512), (512, 'b'));
        assert_eq!(human_size(2048), (2048, 'b'));
        assert_eq!(human_size(2049), (2, 'k'));
        assert_eq!(human_size(8 << 30), (8, 'G'));
        assert_eq!(human_size(256 << 20), (256, 'M'));
        assert_eq!(human_size(u64::MAX).1, 'E');
    }

    #[test]
    fn report() {
        let d = DeviceDescriptor {
            name: "Example GPU".to_string(),
            kind: DeviceKind::DiscreteGpu,
            features: FeatureFlags::empty(),
            queue_families: vec![
                QueueFamily {
                    flags: QueueFlags::GRAPHICS | QueueFlags::COMPUTE | QueueFlags::TRANSFER,
                    count: 16,
                },
                QueueFamily {
                    flags: QueueFlags::COMPUTE,
                    count: 2,
                },
            ],
            memory_types: vec![
                MemoryType {
                    flags: MemoryFlags::DEVICE_LOCAL,
                    heap: 0,
                },
                MemoryType {
                    flags: MemoryFlags::HOST_VISIBLE | MemoryFlags::HOST_COHERENT,
                    heap: 1,
                },
            ],
            memory_heaps: vec![
                MemoryHeap {
                    size: 8 << 30,
                    device_local: true,
                },
                MemoryHeap {
                    size: 256 << 20,
                    device_local: false,
                },
            ],
        };
        assert_eq!(
            d.to_string(),
            "Example GPU\ndiscrete\nQ0 GCT x16\nQ1 C x2\nMtp0 L -> M[0]\nMtp1 VC -> M[1]\nM0 8G L\nM1 256M\n"
        );
        assert!(d.memory_is_coherent(1));
        assert!(!d.memory_is_coherent(0));
        assert!(!d.memory_is_coherent(7));
    }
}
