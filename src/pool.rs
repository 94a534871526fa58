//! The ring of staging slots.
//!
//! The pool itself is not synchronized. It lives inside the writer's shared
//! state and is only touched while holding that state's mutex.
//!
//! Byte regions are not stored in a slot while it is busy: they travel with
//! the compression task and are parked back in the slot when the task
//! releases it. A slot therefore holds its buffers only while it is free and
//! not current.

use std::fmt;

/// Staging and output regions of one block.
#[derive(Debug, Default)]
pub struct BlockBuffers {
    /// Bytes written by the caller, at most `block_size`.
    pub uncompressed: Vec<u8>,
    /// Framed compressed block, resized per use to the codec's reserve size.
    pub compressed: Vec<u8>,
}

impl BlockBuffers {
    /// Allocates a staging region of `block_size` bytes.
    pub fn with_block_size(block_size: usize) -> Self {
        Self {
            uncompressed: Vec::with_capacity(block_size),
            compressed: Vec::new(),
        }
    }
}

/// Identity of one occupancy of a slot.
///
/// The generation changes every time the slot is submitted, so a reference
/// taken for an earlier block never matches a later occupant of the same index.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotRef {
    /// Ring index.
    pub index: usize,
    /// Submission counter of the slot at the time the reference was taken.
    pub generation: u64,
}

impl fmt::Debug for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlotRef({}@{})", self.index, self.generation)
    }
}

#[derive(Debug)]
struct Slot {
    busy: bool,
    generation: u64,
    predecessor: Option<SlotRef>,
    buffers: Option<BlockBuffers>,
}

impl Slot {
    fn new(block_size: usize) -> Self {
        Self {
            busy: false,
            generation: 0,
            predecessor: None,
            buffers: Some(BlockBuffers::with_block_size(block_size)),
        }
    }
}

/// Ordered ring of slots plus the cursor of the slot accepting writes.
#[derive(Debug)]
pub struct BufferPool {
    slots: Vec<Slot>,
    current: usize,
    max_slots: usize,
    block_size: usize,
}

impl BufferPool {
    /// Creates a pool holding its first slot, which is current.
    pub fn new(max_slots: usize, block_size: usize) -> Self {
        let mut slots = Vec::with_capacity(max_slots);
        slots.push(Slot::new(block_size));
        Self {
            slots,
            current: 0,
            max_slots: max_slots.max(1),
            block_size,
        }
    }

    /// Index of the slot accepting writes.
    pub fn current(&self) -> usize {
        self.current
    }

    /// Number of slots allocated so far.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false: the pool starts with one slot.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of slots currently busy.
    pub fn busy_count(&self) -> usize {
        self.slots.iter().filter(|s| s.busy).count()
    }

    /// Freezes the current slot for compression.
    ///
    /// Returns the reference identifying this occupancy.
    pub fn mark_current_busy(&mut self) -> SlotRef {
        let index = self.current;
        let slot = &mut self.slots[index];
        slot.generation += 1;
        slot.busy = true;
        SlotRef {
            index,
            generation: slot.generation,
        }
    }

    /// Moves the cursor to the next slot, growing the ring while below the bound.
    ///
    /// Returns the previous and the new current index. The new current slot may
    /// still be busy; the caller has to wait for [`BufferPool::is_busy`] to clear.
    pub fn advance(&mut self) -> (usize, usize) {
        let previous = self.current;
        let next = previous + 1;
        self.current = if next < self.slots.len() {
            next
        } else if self.slots.len() < self.max_slots {
            self.slots.push(Slot::new(self.block_size));
            next
        } else {
            0
        };
        (previous, self.current)
    }

    /// True while the slot at `index` has a block in flight.
    pub fn is_busy(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(|s| s.busy)
    }

    /// True once the occupancy named by `slot` has reached the sink.
    ///
    /// A reference whose slot has since been resubmitted is finished as well.
    pub fn is_finished(&self, slot: SlotRef) -> bool {
        self.slots
            .get(slot.index)
            .is_none_or(|s| s.generation != slot.generation || !s.busy)
    }

    /// Records the block that must reach the sink before the slot at `index`.
    pub fn set_predecessor(&mut self, index: usize, predecessor: Option<SlotRef>) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.predecessor = predecessor;
        }
    }

    /// Predecessor link of the slot at `index`.
    pub fn predecessor(&self, index: usize) -> Option<SlotRef> {
        self.slots.get(index).and_then(|s| s.predecessor)
    }

    /// Takes the parked buffers of a free slot, allocating them if missing.
    pub fn take_buffers(&mut self, index: usize) -> BlockBuffers {
        let block_size = self.block_size;
        self.slots
            .get_mut(index)
            .and_then(|s| s.buffers.take())
            .unwrap_or_else(|| BlockBuffers::with_block_size(block_size))
    }

    /// Marks the occupancy free and parks its buffers.
    ///
    /// Returns false if `slot` no longer names the current occupancy.
    pub fn release(&mut self, slot: SlotRef, buffers: BlockBuffers) -> bool {
        match self.slots.get_mut(slot.index) {
            Some(s) if s.generation == slot.generation && s.busy => {
                s.busy = false;
                s.buffers = Some(buffers);
                true
            }
            _ => false,
        }
    }
}
