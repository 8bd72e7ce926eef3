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

//! Playback speed scaling.

use super::{
    passthrough, GraphContext, GraphDefinition, GraphError, NodeArena, NodeIndex, NodeStatus,
    PoseNodeOps, PoseNodeResult, PoseNodeState,
};
use crate::{
    math::{is_near_zero, lerpf},
    sync_track::{SyncTrackTime, SyncTrackTimeRange},
};

/// Scales the delta time its child sees by a float value node, blending a
/// freshly engaged scale in from one over the settings' blend time.
///
/// The node reports its duration as the child's duration divided by the
/// effective scale, so parents see the slowed or sped-up timeline.
#[derive(Debug)]
pub struct SpeedScaleNode {
    index: NodeIndex,
    base: PoseNodeState,
    blend_weight: f32,
}

impl SpeedScaleNode {
    /// Creates the runtime node for a settings entry.
    pub fn new(index: NodeIndex) -> Self {
        Self {
            index,
            base: PoseNodeState::default(),
            blend_weight: 1.0,
        }
    }

    fn effective_scale(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
    ) -> Result<f32, GraphError> {
        let settings = definition.speed_scale_settings(self.index)?;
        let Some(scale_node) = settings.scale else {
            return Ok(1.0);
        };
        let blend_time = settings.blend_time;
        let mut scale = super::get_float(scale_node, arena, definition, ctx)?;
        if self.blend_weight < 1.0 {
            if blend_time <= f32::EPSILON {
                self.blend_weight = 1.0;
            } else {
                self.blend_weight =
                    (self.blend_weight + ctx.delta_time / blend_time).clamp(0.0, 1.0);
                scale = lerpf(1.0, scale, self.blend_weight);
            }
        }
        Ok(scale.max(0.0))
    }
}

impl PoseNodeOps for SpeedScaleNode {
    fn index(&self) -> NodeIndex {
        self.index
    }

    fn state(&self) -> &PoseNodeState {
        &self.base
    }

    fn state_mut(&mut self) -> &mut PoseNodeState {
        &mut self.base
    }

    fn initialize(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
        time: SyncTrackTime,
    ) -> Result<(), GraphError> {
        let child = definition.speed_scale_settings(self.index)?.child;
        self.blend_weight = 1.0;
        passthrough::initialize_child(&mut self.base, child, arena, definition, ctx, time)
    }

    fn shutdown(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
    ) -> Result<(), GraphError> {
        let child = definition.speed_scale_settings(self.index)?.child;
        super::shutdown(child, arena, definition)?;
        self.base.status = NodeStatus::Uninitialized;
        Ok(())
    }

    fn update(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
    ) -> Result<PoseNodeResult, GraphError> {
        let child = definition.speed_scale_settings(self.index)?.child;
        let scale = self.effective_scale(arena, definition, ctx)?;

        let saved_delta_time = ctx.delta_time;
        ctx.delta_time *= scale;
        let result = passthrough::update_child(&mut self.base, child, arena, definition, ctx);
        ctx.delta_time = saved_delta_time;
        let result = result?;

        // The mirror set the child's duration; report the scaled timeline.
        if scale > f32::EPSILON {
            self.base.duration /= scale;
        } else {
            self.base.duration = 0.0;
        }
        Ok(result)
    }

    fn update_synchronized(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
        range: &SyncTrackTimeRange,
    ) -> Result<PoseNodeResult, GraphError> {
        // Synchronization dictates the child's timeline; scaling time on top
        // of that is contradictory, so degrade to a plain passthrough with an
        // immediately engaged scale.
        log::warn!(
            "speed scale node {} updated synchronously; scale is ignored",
            self.index
        );
        let settings = definition.speed_scale_settings(self.index)?;
        self.blend_weight = if is_near_zero(settings.blend_time, f32::EPSILON) {
            1.0
        } else {
            0.0
        };
        passthrough::update_child_synchronized(
            &mut self.base,
            settings.child,
            arena,
            definition,
            ctx,
            range,
        )
    }

    fn deactivate_branch(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
    ) -> Result<(), GraphError> {
        let child = definition.speed_scale_settings(self.index)?.child;
        super::deactivate_branch(child, arena, definition, ctx)
    }
}
