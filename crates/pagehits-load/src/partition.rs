//! Splitting a record set into per-worker ranges
//!
//! Every worker gets `limit / worker_count` records. When the limit does not
//! divide evenly, the trailing `limit % worker_count` records are not assigned
//! to anyone and are not loaded. Callers that need every record should pick a
//! limit that is a multiple of the worker count.

use serde::Serialize;
use std::ops::Range;

/// Half-open range `[start, end)` of record indexes owned by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Resolve the number of records a load should cover.
///
/// A `requested` limit of 0 means "not specified". In that case a backend
/// that declares `default_alignment` loads `floor(total / alignment) * alignment`
/// records; a backend without one loads nothing. The result never exceeds
/// `total_available`.
pub fn resolve_limit(
    total_available: usize,
    requested: usize,
    default_alignment: Option<usize>,
) -> usize {
    let limit = match (requested, default_alignment) {
        (0, Some(alignment)) if alignment > 0 => (total_available / alignment) * alignment,
        _ => requested,
    };
    limit.min(total_available)
}

/// The partitions of one load plus the numbers they were derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    /// Limit after clamping to the available record count
    pub limit: usize,
    /// Records per partition
    pub subset: usize,
    pub partitions: Vec<Partition>,
}

impl PartitionPlan {
    /// `worker_count` must be at least 1.
    pub fn new(total_available: usize, limit: usize, worker_count: usize) -> Self {
        debug_assert!(worker_count > 0, "worker_count must be at least 1");
        let worker_count = worker_count.max(1);
        let limit = limit.min(total_available);
        let subset = limit / worker_count;

        let partitions = (0..worker_count)
            .map(|index| Partition {
                index,
                start: subset * index,
                end: subset * (index + 1),
            })
            .collect();

        Self {
            limit,
            subset,
            partitions,
        }
    }

    /// Records covered by some partition.
    pub fn assigned(&self) -> usize {
        self.subset * self.partitions.len()
    }

    /// Records below the limit that no partition covers.
    pub fn dropped(&self) -> usize {
        self.limit - self.assigned()
    }
}

/// Compute `worker_count` contiguous, disjoint partitions over `[0, limit)`.
pub fn partition(total_available: usize, limit: usize, worker_count: usize) -> Vec<Partition> {
    PartitionPlan::new(total_available, limit, worker_count).partitions
}
