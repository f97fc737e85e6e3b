//! Memory planner for buffer reuse.
//!
//! Intermediate buffers live from the first to the last schedule item that
//! touches them. Buffers whose lifetimes do not overlap can share one
//! physical allocation.
//!
//! # Algorithm
//!
//! 1. **Liveness analysis**: first and last appearance of every buffer that
//!    is neither allocated yet nor an output of the schedule.
//! 2. **Greedy assignment**: candidates are visited largest first; each one
//!    takes the first physical buffer with the same device and dtype, enough
//!    room and no overlapping lifetime, or becomes a physical buffer itself.
//! 3. **Apply replacements**: logical buffers are swapped for their physical
//!    buffers in every item.

use std::cmp::Reverse;
use std::collections::HashMap;

use itertools::Itertools;
use tessera_device::{Buffer, BufferId};
use tessera_dtype::{DType, DeviceSpec};
use tracing::{debug, trace};

use crate::schedule::{Schedule, ScheduleItem};

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// Buffers are interchangeable only on the same device with the same dtype.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BufferPoolKey {
    pub device: DeviceSpec,
    pub dtype: DType,
}

impl BufferPoolKey {
    fn of(buffer: &Buffer) -> Self {
        Self { device: buffer.device(), dtype: buffer.dtype() }
    }
}

/// Liveness information for a buffer.
#[derive(Debug, Clone)]
pub struct BufferLiveness {
    pub buffer: Buffer,
    /// Index of first schedule item that uses this buffer.
    pub first_appearance: usize,
    /// Index of last schedule item that uses this buffer.
    pub last_appearance: usize,
}

impl BufferLiveness {
    fn overlaps(&self, other: &BufferLiveness) -> bool {
        self.first_appearance <= other.last_appearance && other.first_appearance <= self.last_appearance
    }
}

/// A physical allocation and the lifetimes packed into it.
#[derive(Debug)]
struct PhysicalBuffer {
    buffer: Buffer,
    key: BufferPoolKey,
    tenants: Vec<BufferLiveness>,
}

/// Result of memory planning.
#[derive(Debug, Default)]
pub struct MemoryPlannerResult {
    /// Logical buffer to the physical buffer replacing it. Buffers that keep
    /// their own storage are absent.
    pub buffer_replace: HashMap<BufferId, Buffer>,
    /// Bytes no longer allocated thanks to reuse.
    pub memory_saved: usize,
    pub buffers_reused: usize,
}

// ============================================================================
// LIVENESS ANALYSIS
// ============================================================================

/// First and last appearance of every plannable buffer, skipping buffers
/// that are already allocated (inputs, assign targets) and schedule outputs.
pub fn analyze_liveness(schedule: &Schedule) -> HashMap<BufferId, BufferLiveness> {
    let mut liveness: HashMap<BufferId, BufferLiveness> = HashMap::new();

    for (step, item) in schedule.items.iter().enumerate() {
        for buffer in item.buffers() {
            if buffer.is_allocated() {
                trace!(step, buffer = %buffer.id(), "skipping: already allocated");
                continue;
            }
            if schedule.outputs.contains(&buffer.id()) {
                trace!(step, buffer = %buffer.id(), "skipping: output buffer");
                continue;
            }
            liveness
                .entry(buffer.id())
                .and_modify(|info| info.last_appearance = step)
                .or_insert_with(|| BufferLiveness {
                    buffer: buffer.clone(),
                    first_appearance: step,
                    last_appearance: step,
                });
        }
    }

    debug!(num_optimizable = liveness.len(), "liveness analysis complete");
    liveness
}

// ============================================================================
// ASSIGNMENT
// ============================================================================

fn assign_physical(liveness: HashMap<BufferId, BufferLiveness>) -> MemoryPlannerResult {
    let candidates =
        liveness.into_values().sorted_by_key(|c| (Reverse(c.buffer.nbytes()), c.first_appearance, c.buffer.id()));

    let mut physical: Vec<PhysicalBuffer> = Vec::new();
    let mut result = MemoryPlannerResult::default();
    for candidate in candidates {
        let key = BufferPoolKey::of(&candidate.buffer);
        let host = physical.iter_mut().find(|p| {
            p.key == key
                && p.buffer.size() >= candidate.buffer.size()
                && p.tenants.iter().all(|t| !t.overlaps(&candidate))
        });
        match host {
            Some(host) => {
                trace!(
                    logical = %candidate.buffer.id(),
                    physical = %host.buffer.id(),
                    first = candidate.first_appearance,
                    last = candidate.last_appearance,
                    "reusing buffer"
                );
                result.buffer_replace.insert(candidate.buffer.id(), host.buffer.clone());
                result.memory_saved += candidate.buffer.nbytes();
                result.buffers_reused += 1;
                host.tenants.push(candidate);
            }
            None => physical.push(PhysicalBuffer { buffer: candidate.buffer.clone(), key, tenants: vec![candidate] }),
        }
    }
    result
}

// ============================================================================
// MAIN ENTRY POINT
// ============================================================================

/// Plan physical storage for the intermediates of `schedule`.
#[tracing::instrument(skip_all, fields(items = schedule.len()))]
pub fn plan_memory(schedule: &Schedule) -> MemoryPlannerResult {
    let liveness = analyze_liveness(schedule);
    if liveness.is_empty() {
        debug!("no optimizable buffers found");
        return MemoryPlannerResult::default();
    }

    let analyzed = liveness.len();
    let result = assign_physical(liveness);
    debug!(
        buffers_analyzed = analyzed,
        buffers_reused = result.buffers_reused,
        memory_saved_bytes = result.memory_saved,
        "memory planner complete"
    );
    result
}

/// Swap logical buffers for their physical replacements.
pub fn apply_buffer_replacements(items: &mut [ScheduleItem], replacements: &HashMap<BufferId, Buffer>) {
    if replacements.is_empty() {
        return;
    }
    for item in items {
        for buffer in item.outputs.iter_mut().chain(item.inputs.iter_mut()) {
            if let Some(replacement) = replacements.get(&buffer.id()) {
                *buffer = replacement.clone();
            }
        }
    }
}
