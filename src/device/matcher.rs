// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! Tiered matching of requirements against a device.

Every slot (queue family, memory type) is graded against a [FlagRequirement]:

* *excellent*: carries all desired flags and none of the undesired ones;
* *adequate*: carries all required flags and none of the forbidden ones;
* otherwise *inadequate*.

Slots are scanned in the order the device declares them.  The first excellent slot
wins, then the first adequate one.  There is no backtracking between requirements.
*/

use super::descriptor::DeviceDescriptor;
use super::flags::{FeatureFlags, Flags, MemoryFlags, QueueFlags};

/// Match quality.  Ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    Excellent,
    Adequate,
    Inadequate,
}

/**
Flags a slot should and must carry, or avoid.

`required` is always a subset of `desired` and `forbidden` a subset of `undesired`;
the constructor widens the preferences to keep it that way.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlagRequirement<F> {
    desired: F,
    undesired: F,
    required: F,
    forbidden: F,
}

impl<F: Flags> FlagRequirement<F> {
    pub fn new(desired: F, undesired: F, required: F, forbidden: F) -> Self {
        FlagRequirement {
            desired: desired | required,
            undesired: undesired | forbidden,
            required,
            forbidden,
        }
    }

    /// Must carry `need`; prefers to avoid `dodge` but tolerates it.
    pub fn need_dodging(need: F, dodge: F) -> Self {
        Self::new(need, dodge, need, F::empty())
    }

    pub fn desired(&self) -> F {
        self.desired
    }
    pub fn undesired(&self) -> F {
        self.undesired
    }
    pub fn required(&self) -> F {
        self.required
    }
    pub fn forbidden(&self) -> F {
        self.forbidden
    }

    pub fn grade(&self, flags: F) -> Tier {
        if flags.contains(self.desired) && !flags.intersects(self.undesired) {
            Tier::Excellent
        } else if flags.contains(self.required) && !flags.intersects(self.forbidden) {
            Tier::Adequate
        } else {
            Tier::Inadequate
        }
    }
}

/// A memory requirement with the bytes it will occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryRequirement {
    pub flags: FlagRequirement<MemoryFlags>,
    pub size: u64,
}

/// Feature needs.  Features have no undesired side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FeatureRequirement {
    pub desired: FeatureFlags,
    pub required: FeatureFlags,
}

impl FeatureRequirement {
    pub fn grade(&self, features: FeatureFlags) -> Tier {
        if features.contains(self.desired | self.required) {
            Tier::Excellent
        } else if features.contains(self.required) {
            Tier::Adequate
        } else {
            Tier::Inadequate
        }
    }
}

/**
Everything a workload asks of a device.

Memory requirements are matched in declaration order against a running per-heap
budget, so declare them in the order they will be allocated.
*/
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceRequirements {
    pub features: FeatureRequirement,
    pub queues: Vec<FlagRequirement<QueueFlags>>,
    pub memory: Vec<MemoryRequirement>,
}

impl ResourceRequirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_features(&mut self, desired: FeatureFlags, required: FeatureFlags) {
        self.features.desired |= desired | required;
        self.features.required |= required;
    }

    /// Returns the index of the new requirement in the report.
    pub fn add_queue(&mut self, requirement: FlagRequirement<QueueFlags>) -> usize {
        self.queues.push(requirement);
        self.queues.len() - 1
    }

    /// A queue that must support `need` and should support nothing in `dodge`.
    pub fn add_queue_requirement(&mut self, need: QueueFlags, dodge: QueueFlags) -> usize {
        self.add_queue(FlagRequirement::need_dodging(need, dodge))
    }

    pub fn add_memory(&mut self, flags: FlagRequirement<MemoryFlags>, size: u64) -> usize {
        self.memory.push(MemoryRequirement { flags, size });
        self.memory.len() - 1
    }

    pub fn add_memory_requirement(
        &mut self,
        want: MemoryFlags,
        dodge: MemoryFlags,
        need: MemoryFlags,
        size: u64,
    ) -> usize {
        self.add_memory(
            FlagRequirement::new(want, dodge, need, MemoryFlags::empty()),
            size,
        )
    }
}

/// Where one requirement landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Assignment {
    /// Index of the chosen queue family or memory type.
    pub slot: Option<usize>,
    pub tier: Tier,
}

impl Assignment {
    const UNSATISFIED: Assignment = Assignment {
        slot: None,
        tier: Tier::Inadequate,
    };
}

/// The outcome of [match_device].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchReport {
    pub features: Tier,
    pub queues: Vec<Assignment>,
    pub memory: Vec<Assignment>,
    /// Requirements (features counted once) matched excellently.
    pub excellent: usize,
    /// Requirements matched only adequately.
    pub adequate: usize,
}

impl MatchReport {
    /// Whether every requirement reached at least the adequate tier.
    pub fn is_adequate(&self) -> bool {
        self.features != Tier::Inadequate
            && self
                .queues
                .iter()
                .chain(self.memory.iter())
                .all(|a| a.tier != Tier::Inadequate)
    }

    pub fn queue_family(&self, requirement: usize) -> Option<usize> {
        self.queues.get(requirement).and_then(|a| a.slot)
    }

    pub fn memory_type(&self, requirement: usize) -> Option<usize> {
        self.memory.get(requirement).and_then(|a| a.slot)
    }
}

/**
The generic two-pass scan.

`eligible` can veto a slot on grounds beyond its flags, such as a full heap.
*/
pub(crate) fn tiered_match<F: Flags>(
    slots: &[F],
    requirement: &FlagRequirement<F>,
    mut eligible: impl FnMut(usize) -> bool,
) -> Assignment {
    for wanted in [Tier::Excellent, Tier::Adequate] {
        for (index, flags) in slots.iter().enumerate() {
            if requirement.grade(*flags) <= wanted && eligible(index) {
                return Assignment {
                    slot: Some(index),
                    tier: wanted,
                };
            }
        }
    }
    Assignment::UNSATISFIED
}

/// Grades `device` against `requirements`.  Deterministic.
pub fn match_device(requirements: &ResourceRequirements, device: &DeviceDescriptor) -> MatchReport {
    let features = requirements.features.grade(device.features);

    let family_flags: Vec<QueueFlags> = device.queue_families.iter().map(|f| f.flags).collect();
    let queues: Vec<Assignment> = requirements
        .queues
        .iter()
        .map(|r| tiered_match(&family_flags, r, |_| true))
        .collect();

    let type_flags: Vec<MemoryFlags> = device.memory_types.iter().map(|t| t.flags).collect();
    let mut remaining: Vec<u64> = device.memory_heaps.iter().map(|h| h.size).collect();
    let mut memory = Vec::with_capacity(requirements.memory.len());
    for r in &requirements.memory {
        let heap_of = |t: usize| device.memory_types[t].heap;
        let fits = |t: usize| {
            remaining
                .get(heap_of(t))
                .is_some_and(|left| *left >= r.size)
        };
        let assignment = tiered_match(&type_flags, &r.flags, fits);
        if let Some(t) = assignment.slot {
            //reservations stay even if a later requirement fails
            if let Some(left) = remaining.get_mut(heap_of(t)) {
                *left -= r.size;
            }
        }
        memory.push(assignment);
    }

    let tiers = std::iter::once(features)
        .chain(queues.iter().map(|a| a.tier))
        .chain(memory.iter().map(|a| a.tier));
    let (mut excellent, mut adequate) = (0, 0);
    for tier in tiers {
        match tier {
            Tier::Excellent => excellent += 1,
            Tier::Adequate => adequate += 1,
            Tier::Inadequate => {}
        }
    }
    MatchReport {
        features,
        queues,
        memory,
        excellent,
        adequate,
    }
}

/**
Picks the memory type for one buffer.

`type_bits` is the driver's mask of types the buffer may live in.  No heap budget is
tracked here; [match_device] already reserved space for the buffer's sphere.
*/
pub fn assign_memory_type(
    requirement: &FlagRequirement<MemoryFlags>,
    device: &DeviceDescriptor,
    type_bits: u32,
) -> Assignment {
    let type_flags: Vec<MemoryFlags> = device.memory_types.iter().map(|t| t.flags).collect();
    tiered_match(&type_flags, requirement, |t| {
        t < 32 && type_bits & (1 << t) != 0
    })
}

/**
Ranks candidate devices and returns the best adequate one.

More excellent matches win; ties go to the earlier device.
*/
pub fn best_device(
    requirements: &ResourceRequirements,
    devices: &[DeviceDescriptor],
) -> Option<(usize, MatchReport)> {
    let mut best: Option<(usize, MatchReport)> = None;
    for (index, device) in devices.iter().enumerate() {
        let report = match_device(requirements, device);
        if !report.is_adequate() {
            continue;
        }
        let better = match &best {
            None => true,
            Some((_, current)) => report.excellent > current.excellent,
        };
        if better {
            best = Some((index, report));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceKind, MemoryHeap, MemoryType, QueueFamily};

    fn device(families: &[QueueFlags], types: &[(MemoryFlags, usize)], heaps: &[u64]) -> DeviceDescriptor {
        DeviceDescriptor {
            name: "test".to_string(),
            kind: DeviceKind::DiscreteGpu,
            features: FeatureFlags::SHADER_INT64 | FeatureFlags::SHADER_FLOAT64,
            queue_families: families
                .iter()
                .map(|f| QueueFamily { flags: *f, count: 1 })
                .collect(),
            memory_types: types
                .iter()
                .map(|(flags, heap)| MemoryType {
                    flags: *flags,
                    heap: *heap,
                })
                .collect(),
            memory_heaps: heaps
                .iter()
                .map(|size| MemoryHeap {
                    size: *size,
                    device_local: true,
                })
                .collect(),
        }
    }

    #[test]
    fn dedicated_compute_family_is_excellent() {
        let mut req = ResourceRequirements::new();
        let q = req.add_queue_requirement(QueueFlags::COMPUTE, QueueFlags::GRAPHICS);
        let everything = QueueFlags::GRAPHICS | QueueFlags::COMPUTE | QueueFlags::TRANSFER;

        let both = device(&[everything, QueueFlags::COMPUTE], &[], &[]);
        let report = match_device(&req, &both);
        assert_eq!(
            report.queues[q],
            Assignment {
                slot: Some(1),
                tier: Tier::Excellent
            }
        );

        let only_general = device(&[everything], &[], &[]);
        let report = match_device(&req, &only_general);
        assert_eq!(
            report.queues[q],
            Assignment {
                slot: Some(0),
                tier: Tier::Adequate
            }
        );
        assert!(report.is_adequate());

        let graphics_only = device(&[QueueFlags::GRAPHICS], &[], &[]);
        let report = match_device(&req, &graphics_only);
        assert_eq!(report.queue_family(q), None);
        assert!(!report.is_adequate());
    }

    #[test]
    fn forbidden_flags_reject() {
        let req = FlagRequirement::new(
            MemoryFlags::DEVICE_LOCAL,
            MemoryFlags::empty(),
            MemoryFlags::empty(),
            MemoryFlags::HOST_VISIBLE,
        );
        assert_eq!(req.undesired(), MemoryFlags::HOST_VISIBLE);
        assert_eq!(req.grade(MemoryFlags::DEVICE_LOCAL), Tier::Excellent);
        assert_eq!(req.grade(MemoryFlags::empty()), Tier::Adequate);
        assert_eq!(
            req.grade(MemoryFlags::DEVICE_LOCAL | MemoryFlags::HOST_VISIBLE),
            Tier::Inadequate
        );
    }

    #[test]
    fn heap_budget_is_consumed_in_order() {
        let local = MemoryFlags::DEVICE_LOCAL;
        let host = MemoryFlags::HOST_VISIBLE;
        //type 0 on a small fast heap, type 1 on a big host heap
        let d = device(&[QueueFlags::COMPUTE], &[(local, 0), (host, 1)], &[100, 1000]);
        let mut req = ResourceRequirements::new();
        let first = req.add_memory_requirement(local, MemoryFlags::empty(), MemoryFlags::empty(), 80);
        let second = req.add_memory_requirement(local, MemoryFlags::empty(), MemoryFlags::empty(), 80);
        let report = match_device(&req, &d);
        assert_eq!(report.memory[first].slot, Some(0));
        assert_eq!(report.memory[first].tier, Tier::Excellent);
        //the fast heap is spent, so the second lands adequately on the other type
        assert_eq!(report.memory[second].slot, Some(1));
        assert_eq!(report.memory[second].tier, Tier::Adequate);
    }

    #[test]
    fn failed_requirement_keeps_earlier_reservations() {
        let host = MemoryFlags::HOST_VISIBLE;
        let d = device(&[QueueFlags::COMPUTE], &[(host, 0)], &[100]);
        let mut req = ResourceRequirements::new();
        req.add_memory_requirement(host, MemoryFlags::empty(), host, 60);
        req.add_memory_requirement(host, MemoryFlags::empty(), host, 60);
        req.add_memory_requirement(host, MemoryFlags::empty(), host, 40);
        let report = match_device(&req, &d);
        assert_eq!(report.memory_type(0), Some(0));
        assert_eq!(report.memory_type(1), None);
        //60 reserved by the first; 40 still fits
        assert_eq!(report.memory_type(2), Some(0));
        assert!(!report.is_adequate());
    }

    #[test]
    fn matching_is_idempotent() {
        let d = device(
            &[QueueFlags::GRAPHICS | QueueFlags::COMPUTE, QueueFlags::TRANSFER],
            &[(MemoryFlags::DEVICE_LOCAL, 0), (MemoryFlags::HOST_VISIBLE, 1)],
            &[1 << 20, 1 << 20],
        );
        let mut req = ResourceRequirements::new();
        req.add_features(FeatureFlags::SHADER_INT64, FeatureFlags::SHADER_INT64);
        req.add_queue_requirement(QueueFlags::COMPUTE, QueueFlags::GRAPHICS);
        req.add_queue_requirement(QueueFlags::TRANSFER, QueueFlags::COMPUTE);
        req.add_memory_requirement(
            MemoryFlags::HOST_VISIBLE,
            MemoryFlags::DEVICE_LOCAL,
            MemoryFlags::HOST_VISIBLE,
            4096,
        );
        let a = match_device(&req, &d);
        let b = match_device(&req, &d);
        assert_eq!(a, b);
        assert_eq!(a.features, Tier::Excellent);
        assert_eq!(a.excellent + a.adequate, 4);
    }

    #[test]
    fn features() {
        let mut req = ResourceRequirements::new();
        req.add_features(FeatureFlags::ROBUST_BUFFER_ACCESS, FeatureFlags::SHADER_INT64);
        assert_eq!(req.features.grade(FeatureFlags::SHADER_INT64), Tier::Adequate);
        assert_eq!(
            req.features.grade(FeatureFlags::SHADER_INT64 | FeatureFlags::ROBUST_BUFFER_ACCESS),
            Tier::Excellent
        );
        assert_eq!(req.features.grade(FeatureFlags::SHADER_FLOAT64), Tier::Inadequate);
    }

    #[test]
    fn type_bits_restrict_assignment() {
        let d = device(
            &[QueueFlags::COMPUTE],
            &[(MemoryFlags::DEVICE_LOCAL, 0), (MemoryFlags::DEVICE_LOCAL, 0)],
            &[1 << 20],
        );
        let req = FlagRequirement::need_dodging(MemoryFlags::DEVICE_LOCAL, MemoryFlags::empty());
        assert_eq!(assign_memory_type(&req, &d, 0b11).slot, Some(0));
        assert_eq!(assign_memory_type(&req, &d, 0b10).slot, Some(1));
        assert_eq!(assign_memory_type(&req, &d, 0).slot, None);
    }

    #[test]
    fn best_device_prefers_more_excellent_matches() {
        let mut req = ResourceRequirements::new();
        req.add_queue_requirement(QueueFlags::COMPUTE, QueueFlags::GRAPHICS);
        let general = device(&[QueueFlags::GRAPHICS | QueueFlags::COMPUTE], &[], &[]);
        let dedicated = device(&[QueueFlags::COMPUTE], &[], &[]);
        let none = device(&[QueueFlags::GRAPHICS], &[], &[]);
        let (index, report) = best_device(&req, &[none.clone(), general.clone(), dedicated]).unwrap();
        assert_eq!(index, 2);
        assert_eq!(report.queues[0].tier, Tier::Excellent);
        assert_eq!(best_device(&req, &[general.clone(), general]).unwrap().0, 0);
        assert!(best_device(&req, &[none]).is_none());
    }
}
