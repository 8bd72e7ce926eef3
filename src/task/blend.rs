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

//! The task that blends two already-produced pose buffers.

use crate::{
    blender,
    error::GraphError,
    graph::definition::BlendOptions,
    mask::BoneMaskIndex,
    math::is_near_zero,
    task::{pose_buffer::PoseBufferIndex, TaskContext},
    NodeIndex, TaskIndex,
};

/// Blends the target dependency's pose into the source dependency's buffer.
///
/// The source buffer is transferred to this task and becomes its output; the
/// target buffer is only accessed and is released back to the pool once the
/// blend is done.
#[derive(Debug)]
pub struct BlendTask {
    source_node: NodeIndex,
    dependencies: [TaskIndex; 2],
    blend_weight: f32,
    options: BlendOptions,
    mask: Option<BoneMaskIndex>,
}

impl BlendTask {
    /// Creates a blend task over two prior tasks. Weights within `1e-6` of
    /// one snap to exactly one so the blend can skip work.
    pub fn new(
        source_node: NodeIndex,
        source_task: TaskIndex,
        target_task: TaskIndex,
        blend_weight: f32,
        options: BlendOptions,
        mask: Option<BoneMaskIndex>,
    ) -> Self {
        debug_assert!((0.0..=1.0).contains(&blend_weight));
        let blend_weight = if is_near_zero(blend_weight - 1.0, 1e-6) {
            1.0
        } else {
            blend_weight
        };
        Self {
            source_node,
            dependencies: [source_task, target_task],
            blend_weight,
            options,
            mask,
        }
    }

    /// The node that registered the task.
    #[inline]
    pub fn source_node(&self) -> NodeIndex {
        self.source_node
    }

    /// The effective blend weight after snapping.
    #[inline]
    pub fn blend_weight(&self) -> f32 {
        self.blend_weight
    }

    pub(super) fn dependencies(&self) -> &[TaskIndex] {
        &self.dependencies
    }

    pub(super) fn execute(&self, ctx: &mut TaskContext<'_>) -> Result<PoseBufferIndex, GraphError> {
        let source_buffer = ctx.transfer_dependency_pose_buffer(0)?;
        let target_buffer = ctx.access_dependency_pose_buffer(1)?;

        // Additive blending is rejected at definition load; only the
        // interpolative path exists.
        debug_assert!(!self.options.contains(BlendOptions::ADDITIVE));

        let mask = self.mask.and_then(|index| ctx.masks.get(index));
        let (source, target) = ctx.pool.get_two_mut(source_buffer, target_buffer);
        blender::blend_in_place(&mut source.pose, &target.pose, self.blend_weight, mask);

        ctx.release_dependency_pose_buffer(1)?;
        Ok(source_buffer)
    }
}
