//! Two-level chunk planning.
//!
//! Pure functions, no IO. The primary partition groups raw paragraphs; the
//! secondary partition groups whatever the primary stage produced, always in
//! threes.

/// Group size used to combine primary results before the secondary stage.
///
/// Fixed on purpose; the request's `secondary_chunk_size` does not feed it.
pub const SECONDARY_GROUP_SIZE: usize = 3;

/// Output of [`plan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Contiguous groups of at most `primary_size` paragraphs, in order.
    pub primary_groups: Vec<Vec<String>>,
    /// Number of secondary groups the configured `secondary_size` would yield
    /// when applied inside each primary group. Informational only.
    pub secondary_group_count: usize,
}

impl ChunkPlan {
    /// A single primary group is passed straight to the secondary stage.
    pub fn skips_primary_stage(&self) -> bool {
        self.primary_groups.len() == 1
    }
}

/// Split `items` into contiguous groups of at most `size`, preserving order.
///
/// A `size` of zero is treated as one.
pub fn group<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    items.chunks(size.max(1)).map(|c| c.to_vec()).collect()
}

/// Plan both partition levels for a document.
///
/// Assumes at least one paragraph; empty documents are rejected before a task
/// exists.
pub fn plan(paragraphs: &[String], primary_size: usize, secondary_size: usize) -> ChunkPlan {
    let primary_groups = group(paragraphs, primary_size);
    let secondary_size = secondary_size.max(1);
    let secondary_group_count = primary_groups
        .iter()
        .map(|g| g.len().div_ceil(secondary_size))
        .sum();

    ChunkPlan {
        primary_groups,
        secondary_group_count,
    }
}
