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

//! The task that samples a clip into a fresh pose buffer.

use crate::{
    clip::AnimationClip,
    error::GraphError,
    task::{pose_buffer::PoseBufferIndex, TaskContext},
    NodeIndex, Percentage,
};
use std::sync::Arc;

/// Samples `clip` at a normalized time into a newly claimed pose buffer.
///
/// The stored time is strictly a percentage; it is multiplied by the clip
/// duration exactly once, here. The registering node guarantees that
/// invariant.
#[derive(Debug)]
pub struct SampleTask {
    source_node: NodeIndex,
    clip: Arc<AnimationClip>,
    time: Percentage,
}

impl SampleTask {
    /// Creates a sample task for a node.
    pub fn new(source_node: NodeIndex, clip: Arc<AnimationClip>, time: Percentage) -> Self {
        debug_assert!((0.0..=1.0).contains(&time));
        Self {
            source_node,
            clip,
            time,
        }
    }

    /// The node that registered the task.
    #[inline]
    pub fn source_node(&self) -> NodeIndex {
        self.source_node
    }

    /// The normalized sampling time.
    #[inline]
    pub fn time(&self) -> Percentage {
        self.time
    }

    pub(super) fn execute(&self, ctx: &mut TaskContext<'_>) -> Result<PoseBufferIndex, GraphError> {
        let buffer_index = ctx.get_new_pose_buffer();
        let buffer = ctx.pool.get_mut(buffer_index);
        self.clip
            .sample_pose(self.time * self.clip.duration(), &mut buffer.pose)?;
        Ok(buffer_index)
    }
}
