//! Pending → executing → ready progression of chunks on the device.
//!
//! One FIFO holds every outstanding chunk in row-id order; each slot carries
//! its own state tag instead of living on one of three separate lists, so a
//! chunk occupies exactly one place and transitions are local to its slot.
//! Chunks may *complete* out of submission order (a fast unit finishing
//! chunk 2 while chunk 1 still runs), but consumption happens only at the
//! front, so rows always surface in ascending row-id order.

use std::collections::VecDeque;

use lode_result::{Error, Result};
use lode_device::{CommandQueue, Submission};

use crate::chunk::Chunk;

enum SlotState<S> {
    /// Loaded, not yet dispatched to a queue.
    Pending,
    /// Dispatched; the submission tracks the three stage signals.
    Executing(S),
    /// All stages complete (or no execution was needed); consumable.
    Ready,
}

struct Slot<S> {
    chunk: Chunk,
    state: SlotState<S>,
}

/// Device-side execution window over the loaded chunks.
pub struct Pipeline<Q: CommandQueue> {
    queues: Vec<Q>,
    program: Option<Q::Program>,
    slots: VecDeque<Slot<Q::Submission>>,
    next_queue: usize,
    max_async: usize,
    work_group: usize,
}

impl<Q: CommandQueue> Pipeline<Q> {
    /// A pipeline with no queues never executes; every admitted chunk must
    /// then be admitted ready (the predictable-query path).
    pub fn new(
        queues: Vec<Q>,
        program: Option<Q::Program>,
        max_async: usize,
        work_group: usize,
    ) -> Self {
        Self {
            queues,
            program,
            slots: VecDeque::new(),
            next_queue: 0,
            max_async,
            work_group,
        }
    }

    /// Chunks pending or executing. Ready chunks no longer count against the
    /// in-flight bound.
    pub fn in_flight(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| !matches!(s.state, SlotState::Ready))
            .count()
    }

    pub fn has_capacity(&self) -> bool {
        self.in_flight() < self.max_async
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Append a chunk in row-id order. `execute` chooses between queueing
    /// for the device and marking it immediately consumable.
    pub fn admit(&mut self, chunk: Chunk, execute: bool) -> Result<()> {
        let state = if execute {
            SlotState::Pending
        } else {
            SlotState::Ready
        };
        self.slots.push_back(Slot { chunk, state });
        if execute {
            self.dispatch()?;
        }
        Ok(())
    }

    /// Submit every pending slot, round-robin across the queues.
    pub fn dispatch(&mut self) -> Result<()> {
        if self.queues.is_empty() {
            return Err(Error::Internal(
                "pipeline has pending chunks but no command queue".to_string(),
            ));
        }
        let program = self
            .program
            .as_ref()
            .ok_or_else(|| Error::Internal("pipeline has no compiled program".to_string()))?;
        for slot in self.slots.iter_mut() {
            if matches!(slot.state, SlotState::Pending) {
                let queue = &mut self.queues[self.next_queue];
                let input = slot.chunk.kernel_input(self.work_group);
                let submission = queue.submit(program, input)?;
                tracing::trace!(rowid = slot.chunk.rowid(), queue = self.next_queue, "chunk dispatched");
                self.next_queue = (self.next_queue + 1) % self.queues.len();
                slot.state = SlotState::Executing(submission);
            }
        }
        Ok(())
    }

    /// Promote every executing slot whose stages have all completed,
    /// wherever it sits in the FIFO.
    pub fn poll(&mut self) -> Result<()> {
        for slot in self.slots.iter_mut() {
            if let SlotState::Executing(submission) = &mut slot.state {
                if let Some(output) = submission.poll()? {
                    slot.chunk.set_rowmap(output.rowmap);
                    slot.state = SlotState::Ready;
                }
            }
        }
        Ok(())
    }

    /// Block until the front chunk is consumable. Returns `false` when the
    /// pipeline is empty.
    pub fn wait_front(&mut self) -> Result<bool> {
        loop {
            let Some(slot) = self.slots.front_mut() else {
                return Ok(false);
            };
            match &mut slot.state {
                SlotState::Ready => return Ok(true),
                SlotState::Executing(submission) => {
                    let output = submission.wait()?;
                    slot.chunk.set_rowmap(output.rowmap);
                    slot.state = SlotState::Ready;
                    return Ok(true);
                }
                SlotState::Pending => {
                    self.dispatch()?;
                }
            }
        }
    }

    /// Take the front chunk if it is ready.
    pub fn pop_ready(&mut self) -> Option<Chunk> {
        match self.slots.front() {
            Some(slot) if matches!(slot.state, SlotState::Ready) => {
                self.slots.pop_front().map(|s| s.chunk)
            }
            _ => None,
        }
    }

    /// Drop every slot, releasing in-flight submissions without awaiting
    /// them, and give back the queues and program.
    pub fn release(&mut self) {
        let dropped = self.slots.len();
        self.slots.clear();
        self.queues.clear();
        self.program = None;
        if dropped > 0 {
            tracing::debug!(chunks = dropped, "pipeline released with chunks outstanding");
        }
    }

    /// Drop outstanding slots but keep queues and program; used by rescan.
    pub fn clear_chunks(&mut self) {
        self.slots.clear();
        self.next_queue = 0;
    }
}
