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

//! The per-frame evaluation context threaded through the node walk.

use crate::{
    event::SampledEventsBuffer, math::Transform, pose::Pose, skeleton::Skeleton,
    task::TaskSystem, NodeIndex, Seconds,
};
use std::sync::Arc;

/// Whether the subtree currently being visited is about to be discarded.
/// Nodes in an inactive branch still sample their events, but flag them so
/// gameplay can ignore them.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum BranchState {
    /// The branch contributes to this frame's output.
    #[default]
    Active,
    /// The branch is being abandoned this frame.
    Inactive,
}

/// Everything a node may touch during one evaluation: the target skeleton,
/// frame timing, the world transform pair, the task system to register into
/// and the sampled-events buffer. Rebuilt at the start of every `evaluate`.
pub struct GraphContext<'a> {
    /// The skeleton being animated.
    pub skeleton: &'a Arc<Skeleton>,
    /// The previous frame's output pose, for nodes that need to reason about
    /// where the character is coming from.
    pub previous_pose: Option<&'a Pose>,
    /// Seconds elapsed since the previous evaluation. Speed-scaling nodes
    /// shrink or stretch this for their subtree and restore it afterwards.
    pub delta_time: Seconds,
    /// The character's current world transform.
    pub world_transform: Transform,
    /// Inverse of the world transform.
    pub world_transform_inverse: Transform,
    /// Monotonic id of this evaluation, used by value nodes to cache.
    pub update_id: u64,
    /// Branch liveness of the subtree being visited.
    pub branch_state: BranchState,
    /// The instance's task system.
    pub tasks: &'a mut TaskSystem,
    /// The instance's sampled-events buffer.
    pub sampled_events: &'a mut SampledEventsBuffer,
    #[cfg(debug_assertions)]
    active_nodes: Vec<NodeIndex>,
    #[cfg(debug_assertions)]
    root_motion_actions: Vec<(NodeIndex, Transform)>,
}

impl<'a> GraphContext<'a> {
    /// Builds a context for one evaluation.
    pub fn new(
        skeleton: &'a Arc<Skeleton>,
        previous_pose: Option<&'a Pose>,
        delta_time: Seconds,
        world_transform: Transform,
        update_id: u64,
        tasks: &'a mut TaskSystem,
        sampled_events: &'a mut SampledEventsBuffer,
    ) -> Self {
        Self {
            skeleton,
            previous_pose,
            delta_time,
            world_transform,
            world_transform_inverse: world_transform.inverse(),
            update_id,
            branch_state: BranchState::Active,
            tasks,
            sampled_events,
            #[cfg(debug_assertions)]
            active_nodes: Vec::new(),
            #[cfg(debug_assertions)]
            root_motion_actions: Vec::new(),
        }
    }

    /// Returns `true` while the visited branch contributes to the output.
    #[inline]
    pub fn is_branch_active(&self) -> bool {
        self.branch_state == BranchState::Active
    }

    /// Records a node as active this frame. Debug builds only; release builds
    /// compile this away.
    #[inline]
    pub fn track_active_node(&mut self, node: NodeIndex) {
        #[cfg(debug_assertions)]
        self.active_nodes.push(node);
        #[cfg(not(debug_assertions))]
        let _ = node;
    }

    /// The nodes recorded as active this frame, in visit order.
    #[cfg(debug_assertions)]
    pub fn active_nodes(&self) -> &[NodeIndex] {
        &self.active_nodes
    }

    /// Records a root-motion contribution for debugging.
    #[inline]
    pub fn record_root_motion(&mut self, node: NodeIndex, delta: Transform) {
        #[cfg(debug_assertions)]
        self.root_motion_actions.push((node, delta));
        #[cfg(not(debug_assertions))]
        let _ = (node, delta);
    }

    /// The recorded root-motion contributions, in visit order.
    #[cfg(debug_assertions)]
    pub fn root_motion_actions(&self) -> &[(NodeIndex, Transform)] {
        &self.root_motion_actions
    }
}
