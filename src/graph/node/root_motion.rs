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

//! Root-motion replacement: drive the character from gameplay intent instead
//! of (parts of) the authored root motion.

use super::{
    passthrough, GraphContext, GraphDefinition, GraphError, NodeArena, NodeIndex, NodeStatus,
    PoseNodeOps, PoseNodeResult, PoseNodeState,
};
use crate::{
    graph::definition::RootMotionOverrideFlags,
    math::is_near_zero,
    sync_track::{SyncTrackTime, SyncTrackTimeRange},
};
use nalgebra::{UnitQuaternion, Vector3};

/// Character-space forward axis used when deriving a facing rotation.
#[inline]
fn forward_axis() -> Vector3<f32> {
    Vector3::z()
}

/// Passes its child through and rewrites components of the resulting
/// root-motion delta: per-axis heading velocity replacement with a linear
/// velocity budget, and optional facing replacement.
#[derive(Debug)]
pub struct RootMotionOverrideNode {
    index: NodeIndex,
    base: PoseNodeState,
}

impl RootMotionOverrideNode {
    /// Creates the runtime node for a settings entry.
    pub fn new(index: NodeIndex) -> Self {
        Self {
            index,
            base: PoseNodeState::default(),
        }
    }

    fn modify_root_motion(
        &self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
        result: &mut PoseNodeResult,
    ) -> Result<(), GraphError> {
        let settings = definition.root_motion_override_settings(self.index)?;
        let flags = settings.flags;

        let mut max_linear_velocity = settings.max_linear_velocity;
        let mut heading_allowed =
            settings.heading_velocity.is_some() && flags.overrides_heading();
        if let Some(limit_node) = settings.velocity_limit {
            max_linear_velocity =
                super::get_float(limit_node, arena, definition, ctx)?.abs();
            heading_allowed &= !is_near_zero(max_linear_velocity, f32::EPSILON);
        }

        if heading_allowed {
            let heading_node = settings
                .heading_velocity
                .ok_or(GraphError::MissingChild { node: self.index })?;
            let desired_velocity = super::get_vector(heading_node, arena, definition, ctx)?;

            let mut translation = result.root_motion_delta.translation;
            if flags.contains(RootMotionOverrideFlags::HEADING_X) {
                translation.x = desired_velocity.x * ctx.delta_time;
            }
            if flags.contains(RootMotionOverrideFlags::HEADING_Y) {
                translation.y = desired_velocity.y * ctx.delta_time;
            }
            if flags.contains(RootMotionOverrideFlags::HEADING_Z) {
                translation.z = desired_velocity.z * ctx.delta_time;
            }

            let max_step = ctx.delta_time * max_linear_velocity;
            if max_step > 0.0 && translation.norm_squared() > max_step * max_step {
                translation = translation.normalize() * max_step;
            }
            result.root_motion_delta.translation = translation;
        }

        let facing_allowed = settings.facing_direction.is_some() && flags.overrides_facing();
        if facing_allowed {
            let facing_node = settings
                .facing_direction
                .ok_or(GraphError::MissingChild { node: self.index })?;
            let desired_facing = super::get_vector(facing_node, arena, definition, ctx)?;

            let mut facing = Vector3::zeros();
            if flags.contains(RootMotionOverrideFlags::FACING_X) {
                facing.x = desired_facing.x;
            }
            if flags.contains(RootMotionOverrideFlags::FACING_Y) {
                facing.y = desired_facing.y;
            }
            if flags.contains(RootMotionOverrideFlags::FACING_Z) {
                facing.z = desired_facing.z;
            }
            if facing.norm_squared() > f32::EPSILON {
                result.root_motion_delta.rotation =
                    UnitQuaternion::rotation_between(&forward_axis(), &facing)
                        .unwrap_or_else(UnitQuaternion::identity);
            }
        }

        ctx.record_root_motion(self.index, result.root_motion_delta);
        Ok(())
    }
}

impl PoseNodeOps for RootMotionOverrideNode {
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
        let child = definition.root_motion_override_settings(self.index)?.child;
        passthrough::initialize_child(&mut self.base, child, arena, definition, ctx, time)
    }

    fn shutdown(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
    ) -> Result<(), GraphError> {
        let child = definition.root_motion_override_settings(self.index)?.child;
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
        let child = definition.root_motion_override_settings(self.index)?.child;
        let mut result =
            passthrough::update_child(&mut self.base, child, arena, definition, ctx)?;
        self.modify_root_motion(arena, definition, ctx, &mut result)?;
        Ok(result)
    }

    fn update_synchronized(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
        range: &SyncTrackTimeRange,
    ) -> Result<PoseNodeResult, GraphError> {
        let child = definition.root_motion_override_settings(self.index)?.child;
        let mut result = passthrough::update_child_synchronized(
            &mut self.base,
            child,
            arena,
            definition,
            ctx,
            range,
        )?;
        self.modify_root_motion(arena, definition, ctx, &mut result)?;
        Ok(result)
    }

    fn deactivate_branch(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
    ) -> Result<(), GraphError> {
        let child = definition.root_motion_override_settings(self.index)?.child;
        super::deactivate_branch(child, arena, definition, ctx)
    }
}
