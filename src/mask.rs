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

//! Per-bone blend weight masks and their per-instance scratch pool.

use crate::BoneIndex;

/// Index of a mask checked out of a [`BoneMaskPool`] for the current frame.
pub type BoneMaskIndex = u32;

/// A blend weight per skeleton bone, used to scale per-bone blend weights.
/// The absence of a mask means a uniform weight of one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoneMask {
    weights: Vec<f32>,
}

impl BoneMask {
    /// Creates a mask from explicit per-bone weights.
    pub fn new(weights: Vec<f32>) -> Self {
        Self { weights }
    }

    /// Number of weights the mask carries.
    #[inline]
    pub fn weight_count(&self) -> usize {
        self.weights.len()
    }

    /// The raw weights.
    #[inline]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Weight of a bone. Bones beyond the mask's length weigh one, which is
    /// how a too-short mask degrades instead of failing.
    #[inline]
    pub fn bone_weight(&self, bone: BoneIndex) -> f32 {
        self.weights.get(bone as usize).copied().unwrap_or(1.0)
    }
}

/// A per-instance pool of scratch masks.
///
/// Masks referenced by blend tasks have to outlive the node walk that
/// registered them, so nodes store a frame-local copy here and hand the task
/// an index. The pool resets at the start of every evaluation.
#[derive(Debug, Default)]
pub struct BoneMaskPool {
    masks: Vec<BoneMask>,
    in_use: usize,
}

impl BoneMaskPool {
    /// Returns all masks to the pool. Storage is kept for reuse.
    pub fn reset(&mut self) {
        self.in_use = 0;
    }

    /// Number of masks checked out this frame.
    #[inline]
    pub fn in_use(&self) -> usize {
        self.in_use
    }

    /// Stores a frame-local copy of a mask and returns its index.
    pub fn store(&mut self, weights: &[f32]) -> BoneMaskIndex {
        let index = self.in_use;
        if index == self.masks.len() {
            self.masks.push(BoneMask::default());
        }
        let slot = &mut self.masks[index];
        slot.weights.clear();
        slot.weights.extend_from_slice(weights);
        self.in_use += 1;
        index as BoneMaskIndex
    }

    /// Borrows a checked-out mask.
    pub fn get(&self, index: BoneMaskIndex) -> Option<&BoneMask> {
        if (index as usize) < self.in_use {
            self.masks.get(index as usize)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn missing_weights_default_to_one() {
        let mask = BoneMask::new(vec![0.5, 0.0]);
        assert_eq!(mask.bone_weight(0), 0.5);
        assert_eq!(mask.bone_weight(1), 0.0);
        assert_eq!(mask.bone_weight(7), 1.0);
    }

    #[test]
    fn pool_recycles_storage_across_frames() {
        let mut pool = BoneMaskPool::default();
        let a = pool.store(&[0.1, 0.2]);
        assert_eq!(pool.get(a).unwrap().weights(), &[0.1, 0.2]);
        assert_eq!(pool.in_use(), 1);

        pool.reset();
        assert_eq!(pool.in_use(), 0);
        assert!(pool.get(a).is_none());

        let b = pool.store(&[0.9]);
        assert_eq!(b, 0);
        assert_eq!(pool.get(b).unwrap().weights(), &[0.9]);
    }
}
