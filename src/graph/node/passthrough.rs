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

//! Passthrough behavior: delegate to a single child and mirror its time.
//!
//! Several node kinds (plain passthrough, state, speed scale, root motion
//! override) share this shape. Instead of an inheritance chain, the shared
//! behavior lives in free helpers each variant calls from its own trait impl.

use super::{
    pose_state, GraphContext, GraphDefinition, GraphError, NodeArena, NodeIndex, PoseNodeOps,
    PoseNodeResult, PoseNodeState,
};
use crate::sync_track::{SyncTrackTime, SyncTrackTimeRange};

/// Copies the child's duration and times into the parent's state.
pub(crate) fn mirror_child(
    base: &mut PoseNodeState,
    child: NodeIndex,
    arena: &NodeArena,
) -> Result<(), GraphError> {
    let child_state = pose_state(child, arena)?;
    base.duration = child_state.duration;
    base.current_time = child_state.current_time;
    base.previous_time = child_state.previous_time;
    Ok(())
}

/// Initializes the child at a sync time, then mirrors it.
pub(crate) fn initialize_child(
    base: &mut PoseNodeState,
    child: NodeIndex,
    arena: &mut NodeArena,
    definition: &GraphDefinition,
    ctx: &mut GraphContext<'_>,
    time: SyncTrackTime,
) -> Result<(), GraphError> {
    super::initialize(child, arena, definition, ctx, time)?;
    mirror_child(base, child, arena)?;
    base.status = super::NodeStatus::Initialized;
    base.loop_count = 0;
    Ok(())
}

/// Updates the child with the frame's delta time, then mirrors it.
pub(crate) fn update_child(
    base: &mut PoseNodeState,
    child: NodeIndex,
    arena: &mut NodeArena,
    definition: &GraphDefinition,
    ctx: &mut GraphContext<'_>,
) -> Result<PoseNodeResult, GraphError> {
    let result = super::update(child, arena, definition, ctx)?;
    mirror_child(base, child, arena)?;
    Ok(result)
}

/// Updates the child over a caller-dictated sync window, then mirrors it.
pub(crate) fn update_child_synchronized(
    base: &mut PoseNodeState,
    child: NodeIndex,
    arena: &mut NodeArena,
    definition: &GraphDefinition,
    ctx: &mut GraphContext<'_>,
    range: &SyncTrackTimeRange,
) -> Result<PoseNodeResult, GraphError> {
    let result = super::update_synchronized(child, arena, definition, ctx, range)?;
    mirror_child(base, child, arena)?;
    Ok(result)
}

/// A pose node that forwards everything to a single child.
#[derive(Debug)]
pub struct PassthroughNode {
    index: NodeIndex,
    base: PoseNodeState,
}

impl PassthroughNode {
    /// Creates the runtime node for a settings entry.
    pub fn new(index: NodeIndex) -> Self {
        Self {
            index,
            base: PoseNodeState::default(),
        }
    }
}

impl PoseNodeOps for PassthroughNode {
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
        let child = definition.passthrough_settings(self.index)?.child;
        initialize_child(&mut self.base, child, arena, definition, ctx, time)
    }

    fn shutdown(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
    ) -> Result<(), GraphError> {
        let child = definition.passthrough_settings(self.index)?.child;
        super::shutdown(child, arena, definition)?;
        self.base.status = super::NodeStatus::Uninitialized;
        Ok(())
    }

    fn update(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
    ) -> Result<PoseNodeResult, GraphError> {
        let child = definition.passthrough_settings(self.index)?.child;
        update_child(&mut self.base, child, arena, definition, ctx)
    }

    fn update_synchronized(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
        range: &SyncTrackTimeRange,
    ) -> Result<PoseNodeResult, GraphError> {
        let child = definition.passthrough_settings(self.index)?.child;
        update_child_synchronized(&mut self.base, child, arena, definition, ctx, range)
    }

    fn deactivate_branch(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
    ) -> Result<(), GraphError> {
        let child = definition.passthrough_settings(self.index)?.child;
        super::deactivate_branch(child, arena, definition, ctx)
    }
}
