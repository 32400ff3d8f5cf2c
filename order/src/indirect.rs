use std::sync::atomic::{AtomicU32, Ordering};

use bytemuck::{Pod, Zeroable};

/// Indices per splat quad (two triangles).
pub const QUAD_INDEX_COUNT: u32 = 6;

/// Key written to slots that no visible splat claimed. Sorts behind every real key.
pub const SENTINEL_KEY: u32 = u32::MAX;

/// Parameter block of an indexed indirect draw. `instance_count` doubles as the
/// visible-splat counter of the ordering pass.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndirectCommand {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
    pub first_instance: u32,
}

impl DrawIndirectCommand {
    /// State the command block is reset to before every pass.
    pub const RESET: Self = Self {
        index_count: QUAD_INDEX_COUNT,
        instance_count: 0,
        first_index: 0,
        vertex_offset: 0,
        first_instance: 0,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VisibleInstance {
    pub sort_key: u32,
    pub splat_index: u32,
}

/// Host-side output of the ordering pass: a command block and two compacted
/// arrays. Slots are granted by an atomic bump allocator on `instance_count`.
#[derive(Debug)]
pub struct IndirectDrawBuffers {
    command: DrawIndirectCommand,
    instance_count: AtomicU32,
    keys: Box<[AtomicU32]>,
    indices: Box<[AtomicU32]>,
}

impl IndirectDrawBuffers {
    pub fn new(capacity: usize) -> Self {
        let fill = |value: u32| -> Box<[AtomicU32]> {
            (0..capacity).map(|_| AtomicU32::new(value)).collect()
        };
        Self {
            command: DrawIndirectCommand::RESET,
            instance_count: AtomicU32::new(0),
            keys: fill(SENTINEL_KEY),
            indices: fill(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.keys.len()
    }

    /// Zeroes the visible counter. Keys of stale slots are left in place, they
    /// lie past the new count and must not be read.
    pub fn reset(&mut self) {
        self.command = DrawIndirectCommand::RESET;
        *self.instance_count.get_mut() = 0;
    }

    /// Claims the next free slot and writes one visible instance to it.
    pub(crate) fn push(&self, sort_key: u32, splat_index: u32) {
        let slot = self.instance_count.fetch_add(1, Ordering::Relaxed) as usize;
        self.keys[slot].store(sort_key, Ordering::Relaxed);
        self.indices[slot].store(splat_index, Ordering::Relaxed);
    }

    pub fn instance_count(&self) -> u32 {
        self.instance_count.load(Ordering::Acquire)
    }

    pub fn command(&self) -> DrawIndirectCommand {
        DrawIndirectCommand {
            instance_count: self.instance_count(),
            ..self.command
        }
    }

    /// The written slots `[0, instance_count)`, in allocation order.
    pub fn visible(&self) -> Vec<VisibleInstance> {
        let count = self.instance_count() as usize;
        self.keys[..count]
            .iter()
            .zip(&self.indices[..count])
            .map(|(key, index)| VisibleInstance {
                sort_key: key.load(Ordering::Relaxed),
                splat_index: index.load(Ordering::Relaxed),
            })
            .collect()
    }

    /// Visible instances in back-to-front order (ascending key, ties by index).
    pub fn sorted_back_to_front(&self) -> Vec<VisibleInstance> {
        let mut visible = self.visible();
        visible.sort_unstable_by_key(|v| (v.sort_key, v.splat_index));
        visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_matches_indexed_indirect_layout() {
        assert_eq!(std::mem::size_of::<DrawIndirectCommand>(), 20);
        let words: [u32; 5] = bytemuck::cast(DrawIndirectCommand::RESET);
        assert_eq!(words, [QUAD_INDEX_COUNT, 0, 0, 0, 0]);
    }

    #[test]
    fn push_allocates_consecutive_slots() {
        let mut buffers = IndirectDrawBuffers::new(4);
        buffers.push(10, 3);
        buffers.push(20, 1);
        assert_eq!(buffers.instance_count(), 2);
        assert_eq!(
            buffers.visible(),
            vec![
                VisibleInstance { sort_key: 10, splat_index: 3 },
                VisibleInstance { sort_key: 20, splat_index: 1 },
            ]
        );
        assert_eq!(buffers.command().instance_count, 2);

        buffers.reset();
        assert_eq!(buffers.instance_count(), 0);
        assert!(buffers.visible().is_empty());
        assert_eq!(buffers.command(), DrawIndirectCommand::RESET);
    }

    #[test]
    fn sorted_is_far_to_near() {
        let buffers = IndirectDrawBuffers::new(3);
        buffers.push(5, 0);
        buffers.push(1, 1);
        buffers.push(3, 2);
        let order: Vec<u32> = buffers
            .sorted_back_to_front()
            .iter()
            .map(|v| v.splat_index)
            .collect();
        assert_eq!(order, vec![1, 2, 0]);
    }
}
