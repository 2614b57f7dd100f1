// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! An append-only queue stored as a list of fixed-capacity chunks.
//!
//! The solver appends reachable methods and call edges to these queues while
//! cursors drain them, so the queue must support iteration concurrent with
//! growth. Cursors keep a (chunk, offset) position and re-borrow the queue on
//! every step, which keeps the pattern safe even though the queue grows
//! between steps.

use arrayvec::ArrayVec;

// The maximum number of elements a chunk can hold.
const CHUNK_CAP: usize = 64;

pub struct ChunkedQueue<T> {
    chunks: Vec<Box<ArrayVec<T, CHUNK_CAP>>>,
    len: usize,
}

impl<T> ChunkedQueue<T> {
    pub fn new() -> Self {
        ChunkedQueue {
            chunks: Vec::new(),
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends an element to the back of the queue.
    pub fn push(&mut self, elem: T) {
        if self.chunks.last().map_or(true, |c| c.is_full()) {
            self.chunks.push(Box::new(ArrayVec::new()));
        }
        self.chunks.last_mut().unwrap().push(elem);
        self.len += 1;
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.chunks.iter().flat_map(|c| c.iter())
    }

    /// A cursor positioned at the front of the queue.
    pub fn cursor(&self) -> QueueCursor {
        QueueCursor { chunk: 0, index: 0 }
    }
}

impl<T> Default for ChunkedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A detached iteration position into a [`ChunkedQueue`].
///
/// Stepping never invalidates: elements pushed after the cursor position are
/// seen by later steps.
#[derive(Copy, Clone, Debug)]
pub struct QueueCursor {
    chunk: usize,
    index: usize,
}

impl QueueCursor {
    pub fn next<T: Copy>(&mut self, queue: &ChunkedQueue<T>) -> Option<T> {
        if self.index == CHUNK_CAP {
            self.chunk += 1;
            self.index = 0;
        }
        let elem = queue.chunks.get(self.chunk)?.get(self.index).copied();
        if elem.is_some() {
            self.index += 1;
        }
        elem
    }
}

#[cfg(test)]
mod test {
    use super::ChunkedQueue;

    #[test]
    fn push_and_iterate() {
        let mut queue = ChunkedQueue::new();
        for i in 0..200u32 {
            queue.push(i);
        }
        assert_eq!(queue.len(), 200);
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), (0..200).collect::<Vec<_>>());
    }

    #[test]
    fn cursor_sees_growth() {
        let mut queue = ChunkedQueue::new();
        let mut cursor = queue.cursor();
        assert_eq!(cursor.next(&queue), None);

        for i in 0..70u32 {
            queue.push(i);
        }
        let mut drained = Vec::new();
        while let Some(x) = cursor.next(&queue) {
            drained.push(x);
            // grow the queue mid-drain
            if x == 10 {
                queue.push(1000);
            }
        }
        assert_eq!(drained.len(), 71);
        assert_eq!(drained[70], 1000);
    }
}
