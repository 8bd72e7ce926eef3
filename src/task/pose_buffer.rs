// Copyright (c) 2024-present Arclight Animation contributors.
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Pooled pose buffers for task execution.

use crate::{
    pose::{InitialPoseState, Pose},
    skeleton::Skeleton,
    TaskIndex, INVALID_INDEX,
};
use std::sync::Arc;

/// Index of a buffer in the pool.
pub type PoseBufferIndex = u32;

/// Initial pool size; the average peak concurrent-buffer count per character
/// is about five.
const INITIAL_POOL_SIZE: usize = 5;

/// A pooled pose plus the task currently owning it. `owner == INVALID_INDEX`
/// marks a free buffer.
#[derive(Debug)]
pub struct PoseBuffer {
    /// Task owning the buffer, or [`INVALID_INDEX`] when free.
    pub owner: TaskIndex,
    /// The pose storage itself.
    pub pose: Pose,
}

/// A pool of pose buffers for one graph instance. Starts at five buffers and
/// doubles whenever every buffer is owned.
#[derive(Debug, Default)]
pub struct PoseBufferPool {
    buffers: Vec<PoseBuffer>,
    skeleton: Option<Arc<Skeleton>>,
}

impl PoseBufferPool {
    /// Binds the pool to a skeleton and allocates the initial buffers.
    pub fn initialize(&mut self, skeleton: Arc<Skeleton>) {
        self.buffers.clear();
        for _ in 0..INITIAL_POOL_SIZE {
            self.buffers.push(PoseBuffer {
                owner: INVALID_INDEX,
                pose: Pose::new(skeleton.clone(), InitialPoseState::Reference),
            });
        }
        self.skeleton = Some(skeleton);
    }

    /// Returns `true` once [`Self::initialize`] ran.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.skeleton.is_some()
    }

    /// Total number of buffers, free and owned.
    #[inline]
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Number of currently owned buffers.
    pub fn owned_count(&self) -> usize {
        self.buffers
            .iter()
            .filter(|b| b.owner != INVALID_INDEX)
            .count()
    }

    /// Claims the first free buffer for `owner`, doubling the pool if every
    /// buffer is taken.
    pub fn first_available(&mut self, owner: TaskIndex) -> PoseBufferIndex {
        for (index, buffer) in self.buffers.iter_mut().enumerate() {
            if buffer.owner == INVALID_INDEX {
                buffer.owner = owner;
                return index as PoseBufferIndex;
            }
        }

        let index = self.buffers.len();
        let grow_to = (self.buffers.len() * 2).max(INITIAL_POOL_SIZE);
        let skeleton = self
            .skeleton
            .clone()
            .expect("pose buffer pool used before initialization");
        while self.buffers.len() < grow_to {
            self.buffers.push(PoseBuffer {
                owner: INVALID_INDEX,
                pose: Pose::new(skeleton.clone(), InitialPoseState::Reference),
            });
        }
        self.buffers[index].owner = owner;
        index as PoseBufferIndex
    }

    /// Borrows a buffer.
    #[inline]
    pub fn get(&self, index: PoseBufferIndex) -> &PoseBuffer {
        &self.buffers[index as usize]
    }

    /// Mutably borrows a buffer.
    #[inline]
    pub fn get_mut(&mut self, index: PoseBufferIndex) -> &mut PoseBuffer {
        &mut self.buffers[index as usize]
    }

    /// Mutably borrows two distinct buffers at once.
    pub fn get_two_mut(
        &mut self,
        a: PoseBufferIndex,
        b: PoseBufferIndex,
    ) -> (&mut PoseBuffer, &mut PoseBuffer) {
        assert_ne!(a, b, "a buffer cannot be blended with itself");
        let (a, b) = (a as usize, b as usize);
        if a < b {
            let (left, right) = self.buffers.split_at_mut(b);
            (&mut left[a], &mut right[0])
        } else {
            let (left, right) = self.buffers.split_at_mut(a);
            (&mut right[0], &mut left[b])
        }
    }

    /// Frees a single buffer.
    #[inline]
    pub fn release(&mut self, index: PoseBufferIndex) {
        self.buffers[index as usize].owner = INVALID_INDEX;
    }

    /// Frees every buffer; called at the start of each evaluation.
    pub fn release_all(&mut self) {
        for buffer in &mut self.buffers {
            buffer.owner = INVALID_INDEX;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::math::Transform;

    fn skeleton() -> Arc<Skeleton> {
        Arc::new(
            Skeleton::new(
                vec![("root".to_string(), None)],
                vec![Transform::identity()],
            )
            .unwrap(),
        )
    }

    #[test]
    fn pool_starts_at_five_and_doubles_when_exhausted() {
        let mut pool = PoseBufferPool::default();
        pool.initialize(skeleton());
        assert_eq!(pool.buffer_count(), 5);

        for task in 0..5 {
            pool.first_available(task);
        }
        assert_eq!(pool.owned_count(), 5);

        let index = pool.first_available(5);
        assert_eq!(index, 5);
        assert_eq!(pool.buffer_count(), 10);
        assert_eq!(pool.owned_count(), 6);
    }

    #[test]
    fn released_buffers_are_reused_first() {
        let mut pool = PoseBufferPool::default();
        pool.initialize(skeleton());
        let a = pool.first_available(0);
        pool.release(a);
        let b = pool.first_available(1);
        assert_eq!(a, b);
        pool.release_all();
        assert_eq!(pool.owned_count(), 0);
    }
}
