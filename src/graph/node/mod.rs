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

//! The runtime node framework.
//!
//! Runtime nodes live in a dense arena parallel to the definition's settings
//! table: the settings index *is* the runtime node index. Nodes hold only
//! per-character state; their settings are read through the shared definition
//! at dispatch time. Recursion borrows a node out of its arena slot for the
//! duration of its own update, leaving a [`GraphNode::Vacant`] marker behind;
//! re-entering a vacant slot is how graph cycles are caught at runtime.

pub mod blend;
pub mod bool_nodes;
pub mod clip;
pub mod event_condition;
pub mod float_nodes;
pub mod id_nodes;
pub mod parameter;
pub mod passthrough;
pub mod root_motion;
pub mod speed_scale;
pub mod state;
pub mod state_machine;
pub mod transition;

use crate::{
    error::GraphError,
    event::SampledEventRange,
    graph::{
        context::GraphContext,
        definition::{BlendOptions, GraphDefinition},
    },
    mask::BoneMaskIndex,
    math::Transform,
    sync_track::{SyncTrack, SyncTrackTime, SyncTrackTimeRange},
    task::{BlendTask, Task},
    NodeIndex, Percentage, Seconds, StringId, TaskIndex,
};
use nalgebra::Vector3;

pub use blend::BlendNode;
pub use bool_nodes::{BoolAndNode, BoolNotNode, BoolOrNode};
pub use clip::AnimationClipNode;
pub use event_condition::EventConditionNode;
pub use float_nodes::FloatClampNode;
pub use id_nodes::IdComparisonNode;
pub use parameter::{BoolParameterNode, FloatParameterNode, IdParameterNode, VectorParameterNode};
pub use passthrough::PassthroughNode;
pub use root_motion::RootMotionOverrideNode;
pub use speed_scale::SpeedScaleNode;
pub use state::{StateNode, TransitionPhase};
pub use state_machine::StateMachineNode;
pub use transition::TransitionNode;

/// Lifecycle status of a runtime node.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum NodeStatus {
    /// Not yet initialized, or shut down.
    #[default]
    Uninitialized,
    /// Ready to update.
    Initialized,
}

/// The time-tracking state every pose node carries.
#[derive(Clone, Debug, Default)]
pub struct PoseNodeState {
    /// Lifecycle status.
    pub status: NodeStatus,
    /// Duration of the node's content in seconds.
    pub duration: Seconds,
    /// Normalized progress after the latest update.
    pub current_time: Percentage,
    /// Normalized progress before the latest update.
    pub previous_time: Percentage,
    /// How many times the content looped since initialization.
    pub loop_count: u32,
}

impl PoseNodeState {
    /// Resets the state for (re-)initialization at a normalized time.
    pub fn reset_at(&mut self, time: Percentage) {
        self.status = NodeStatus::Initialized;
        self.current_time = time;
        self.previous_time = time;
        self.loop_count = 0;
    }
}

/// What a pose node hands back from an update: the task producing its pose
/// (if any), its root-motion delta, and the range of events it sampled.
#[derive(Clone, Debug)]
pub struct PoseNodeResult {
    /// Handle of the registered task; `None` means "no pose change this
    /// frame, reuse the previous pose".
    pub task: Option<TaskIndex>,
    /// How the character root moved during this update, in character space.
    pub root_motion_delta: Transform,
    /// The events this subtree sampled during the update.
    pub events: SampledEventRange,
}

impl PoseNodeResult {
    /// A result with no task, identity root motion and an empty event range
    /// anchored at the current buffer position.
    pub fn empty(events_at: u32) -> Self {
        Self {
            task: None,
            root_motion_delta: Transform::identity(),
            events: SampledEventRange::empty_at(events_at),
        }
    }

    /// Returns `true` if the node registered pose work this frame.
    #[inline]
    pub fn has_registered_tasks(&self) -> bool {
        self.task.is_some()
    }
}

/// A typed value produced by a value node.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum GraphValue {
    /// Boolean value.
    Bool(bool),
    /// Float value.
    Float(f32),
    /// Name-hash value.
    Id(StringId),
    /// Three-component vector value.
    Vector(Vector3<f32>),
}

impl GraphValue {
    /// Name of the contained type, for error reporting.
    pub fn type_name(&self) -> &'static str {
        match self {
            GraphValue::Bool(_) => "bool",
            GraphValue::Float(_) => "float",
            GraphValue::Id(_) => "id",
            GraphValue::Vector(_) => "vector",
        }
    }
}

/// A runtime node: per-character state for one settings entry.
#[derive(Debug)]
pub enum GraphNode {
    /// Marker left in a slot while its node is borrowed out for an update.
    Vacant,
    /// See [`AnimationClipNode`].
    AnimationClip(AnimationClipNode),
    /// See [`BlendNode`].
    Blend(BlendNode),
    /// See [`PassthroughNode`].
    Passthrough(PassthroughNode),
    /// See [`StateNode`].
    State(StateNode),
    /// See [`TransitionNode`].
    Transition(TransitionNode),
    /// See [`StateMachineNode`].
    StateMachine(StateMachineNode),
    /// See [`SpeedScaleNode`].
    SpeedScale(SpeedScaleNode),
    /// See [`RootMotionOverrideNode`].
    RootMotionOverride(RootMotionOverrideNode),
    /// See [`BoolParameterNode`].
    BoolParameter(BoolParameterNode),
    /// See [`FloatParameterNode`].
    FloatParameter(FloatParameterNode),
    /// See [`IdParameterNode`].
    IdParameter(IdParameterNode),
    /// See [`VectorParameterNode`].
    VectorParameter(VectorParameterNode),
    /// See [`BoolAndNode`].
    BoolAnd(BoolAndNode),
    /// See [`BoolOrNode`].
    BoolOr(BoolOrNode),
    /// See [`BoolNotNode`].
    BoolNot(BoolNotNode),
    /// See [`FloatClampNode`].
    FloatClamp(FloatClampNode),
    /// See [`IdComparisonNode`].
    IdComparison(IdComparisonNode),
    /// See [`EventConditionNode`].
    EventCondition(EventConditionNode),
}

/// The dense runtime node array of one instance.
#[derive(Debug, Default)]
pub struct NodeArena {
    slots: Vec<GraphNode>,
}

impl NodeArena {
    /// Builds an arena from instantiated nodes, in settings order.
    pub fn new(slots: Vec<GraphNode>) -> Self {
        Self { slots }
    }

    /// Number of slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` when the arena holds no nodes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Borrows a slot.
    pub fn get(&self, index: NodeIndex) -> Result<&GraphNode, GraphError> {
        self.slots
            .get(index as usize)
            .ok_or(GraphError::NodeIndexOutOfBounds {
                node: index,
                count: self.slots.len(),
            })
    }

    /// Mutably borrows a slot.
    pub fn get_mut(&mut self, index: NodeIndex) -> Result<&mut GraphNode, GraphError> {
        let count = self.slots.len();
        self.slots
            .get_mut(index as usize)
            .ok_or(GraphError::NodeIndexOutOfBounds { node: index, count })
    }

    /// Moves a node out of its slot for the duration of its own update. A
    /// vacant slot here means the node is already being updated further up
    /// the stack, i.e. the graph has a cycle.
    pub fn take(&mut self, index: NodeIndex) -> Result<GraphNode, GraphError> {
        let slot = self.get_mut(index)?;
        match std::mem::replace(slot, GraphNode::Vacant) {
            GraphNode::Vacant => Err(GraphError::CyclicGraph { node: index }),
            node => Ok(node),
        }
    }

    /// Returns a node taken with [`Self::take`] to its slot.
    pub fn put(&mut self, index: NodeIndex, node: GraphNode) {
        self.slots[index as usize] = node;
    }

    /// Iterates all slots mutably; used to reset value-node caches.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut GraphNode> {
        self.slots.iter_mut()
    }
}

/// Operations every pose-node variant implements. One level deep: shared
/// passthrough behavior is a set of helpers, not a base class.
pub(crate) trait PoseNodeOps {
    /// The node's own index.
    fn index(&self) -> NodeIndex;
    /// Shared time-tracking state.
    fn state(&self) -> &PoseNodeState;
    /// Shared time-tracking state, mutably.
    fn state_mut(&mut self) -> &mut PoseNodeState;

    /// Initializes the node (and its pose children) at a sync time.
    fn initialize(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
        time: SyncTrackTime,
    ) -> Result<(), GraphError>;

    /// Shuts the node (and its pose children) down.
    fn shutdown(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
    ) -> Result<(), GraphError>;

    /// Advances the node by the context's delta time.
    fn update(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
    ) -> Result<PoseNodeResult, GraphError>;

    /// Advances the node over a caller-dictated sync window.
    fn update_synchronized(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
        range: &SyncTrackTimeRange,
    ) -> Result<PoseNodeResult, GraphError>;

    /// Marks the events this subtree sampled this frame as coming from an
    /// abandoned branch. Default: nothing to flag.
    fn deactivate_branch(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
    ) -> Result<(), GraphError> {
        let _ = (arena, definition, ctx);
        Ok(())
    }
}

/// Operations every value-node variant implements.
pub(crate) trait ValueNodeOps {
    /// The node's own index.
    fn index(&self) -> NodeIndex;

    /// Resets per-update caches; called when the instance initializes.
    fn initialize(&mut self);

    /// Produces the node's value, computing and caching per update id.
    fn value(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
    ) -> Result<GraphValue, GraphError>;

    /// Overwrites the node's value. Only control parameters accept this.
    fn set_value(&mut self, value: GraphValue) -> Result<(), GraphError> {
        let _ = value;
        Err(GraphError::NodeTypeMismatch { node: self.index() })
    }
}

macro_rules! pose_dispatch {
    ($node:expr, $index:expr, $method:ident $(, $arg:expr)*) => {
        match $node {
            GraphNode::AnimationClip(n) => n.$method($($arg),*),
            GraphNode::Blend(n) => n.$method($($arg),*),
            GraphNode::Passthrough(n) => n.$method($($arg),*),
            GraphNode::State(n) => n.$method($($arg),*),
            GraphNode::Transition(n) => n.$method($($arg),*),
            GraphNode::StateMachine(n) => n.$method($($arg),*),
            GraphNode::SpeedScale(n) => n.$method($($arg),*),
            GraphNode::RootMotionOverride(n) => n.$method($($arg),*),
            _ => Err(GraphError::NodeTypeMismatch { node: $index }),
        }
    };
}

macro_rules! value_dispatch {
    ($node:expr, $index:expr, $method:ident $(, $arg:expr)*) => {
        match $node {
            GraphNode::BoolParameter(n) => n.$method($($arg),*),
            GraphNode::FloatParameter(n) => n.$method($($arg),*),
            GraphNode::IdParameter(n) => n.$method($($arg),*),
            GraphNode::VectorParameter(n) => n.$method($($arg),*),
            GraphNode::BoolAnd(n) => n.$method($($arg),*),
            GraphNode::BoolOr(n) => n.$method($($arg),*),
            GraphNode::BoolNot(n) => n.$method($($arg),*),
            GraphNode::FloatClamp(n) => n.$method($($arg),*),
            GraphNode::IdComparison(n) => n.$method($($arg),*),
            GraphNode::EventCondition(n) => n.$method($($arg),*),
            _ => Err(GraphError::NodeTypeMismatch { node: $index }),
        }
    };
}

/// Initializes a pose node (recursively) at a sync time.
pub(crate) fn initialize(
    index: NodeIndex,
    arena: &mut NodeArena,
    definition: &GraphDefinition,
    ctx: &mut GraphContext<'_>,
    time: SyncTrackTime,
) -> Result<(), GraphError> {
    let mut node = arena.take(index)?;
    let result = pose_dispatch!(&mut node, index, initialize, arena, definition, ctx, time);
    arena.put(index, node);
    result
}

/// Shuts a pose node (recursively) down.
pub(crate) fn shutdown(
    index: NodeIndex,
    arena: &mut NodeArena,
    definition: &GraphDefinition,
) -> Result<(), GraphError> {
    let mut node = arena.take(index)?;
    let result = pose_dispatch!(&mut node, index, shutdown, arena, definition);
    arena.put(index, node);
    result
}

/// Advances a pose node by the context's delta time.
pub(crate) fn update(
    index: NodeIndex,
    arena: &mut NodeArena,
    definition: &GraphDefinition,
    ctx: &mut GraphContext<'_>,
) -> Result<PoseNodeResult, GraphError> {
    ctx.track_active_node(index);
    let mut node = arena.take(index)?;
    let result = pose_dispatch!(&mut node, index, update, arena, definition, ctx);
    arena.put(index, node);
    result
}

/// Advances a pose node over a caller-dictated sync window.
pub(crate) fn update_synchronized(
    index: NodeIndex,
    arena: &mut NodeArena,
    definition: &GraphDefinition,
    ctx: &mut GraphContext<'_>,
    range: &SyncTrackTimeRange,
) -> Result<PoseNodeResult, GraphError> {
    ctx.track_active_node(index);
    let mut node = arena.take(index)?;
    let result =
        pose_dispatch!(&mut node, index, update_synchronized, arena, definition, ctx, range);
    arena.put(index, node);
    result
}

/// Flags a subtree's events as coming from a branch abandoned this frame.
/// The branch state is flipped to inactive for the duration of the call so
/// anything sampled inside is flagged at the source.
pub(crate) fn deactivate_branch(
    index: NodeIndex,
    arena: &mut NodeArena,
    definition: &GraphDefinition,
    ctx: &mut GraphContext<'_>,
) -> Result<(), GraphError> {
    let mut node = arena.take(index)?;
    let previous_branch_state = ctx.branch_state;
    ctx.branch_state = crate::graph::context::BranchState::Inactive;
    let result = pose_dispatch!(&mut node, index, deactivate_branch, arena, definition, ctx);
    ctx.branch_state = previous_branch_state;
    arena.put(index, node);
    result
}

/// The sync track a pose node currently follows.
pub(crate) fn sync_track<'a>(
    index: NodeIndex,
    arena: &'a NodeArena,
    definition: &GraphDefinition,
) -> Result<&'a SyncTrack, GraphError> {
    match arena.get(index)? {
        GraphNode::AnimationClip(n) => Ok(n.clip().sync_track()),
        GraphNode::Blend(n) => Ok(n.blended_sync_track()),
        GraphNode::Passthrough(_) => {
            sync_track(definition.passthrough_settings(index)?.child, arena, definition)
        }
        GraphNode::State(_) => {
            sync_track(definition.state_settings(index)?.child, arena, definition)
        }
        GraphNode::SpeedScale(_) => {
            sync_track(definition.speed_scale_settings(index)?.child, arena, definition)
        }
        GraphNode::RootMotionOverride(_) => sync_track(
            definition.root_motion_override_settings(index)?.child,
            arena,
            definition,
        ),
        GraphNode::Transition(n) => {
            if n.is_complete() {
                sync_track(
                    definition.transition_settings(index)?.target_state,
                    arena,
                    definition,
                )
            } else {
                Ok(SyncTrack::default_ref())
            }
        }
        GraphNode::StateMachine(n) => {
            let settings = definition.state_machine_settings(index)?;
            match n.active_element(settings) {
                Some(element) => sync_track(element, arena, definition),
                None => Ok(SyncTrack::default_ref()),
            }
        }
        GraphNode::Vacant => Err(GraphError::CyclicGraph { node: index }),
        _ => Err(GraphError::NodeTypeMismatch { node: index }),
    }
}

/// The time-tracking state of a pose node, for callers that mirror a child.
pub(crate) fn pose_state<'a>(
    index: NodeIndex,
    arena: &'a NodeArena,
) -> Result<&'a PoseNodeState, GraphError> {
    match arena.get(index)? {
        GraphNode::AnimationClip(n) => Ok(n.state()),
        GraphNode::Blend(n) => Ok(n.state()),
        GraphNode::Passthrough(n) => Ok(n.state()),
        GraphNode::State(n) => Ok(n.state()),
        GraphNode::Transition(n) => Ok(n.state()),
        GraphNode::StateMachine(n) => Ok(n.state()),
        GraphNode::SpeedScale(n) => Ok(n.state()),
        GraphNode::RootMotionOverride(n) => Ok(n.state()),
        GraphNode::Vacant => Err(GraphError::CyclicGraph { node: index }),
        _ => Err(GraphError::NodeTypeMismatch { node: index }),
    }
}

/// Produces a value node's value.
pub(crate) fn value(
    index: NodeIndex,
    arena: &mut NodeArena,
    definition: &GraphDefinition,
    ctx: &mut GraphContext<'_>,
) -> Result<GraphValue, GraphError> {
    let mut node = arena.take(index)?;
    let result = value_dispatch!(&mut node, index, value, arena, definition, ctx);
    arena.put(index, node);
    result
}

/// Reads a bool from a value node.
pub(crate) fn get_bool(
    index: NodeIndex,
    arena: &mut NodeArena,
    definition: &GraphDefinition,
    ctx: &mut GraphContext<'_>,
) -> Result<bool, GraphError> {
    match value(index, arena, definition, ctx)? {
        GraphValue::Bool(v) => Ok(v),
        _ => Err(GraphError::ValueTypeMismatch {
            node: index,
            expected: "bool",
        }),
    }
}

/// Reads a float from a value node.
pub(crate) fn get_float(
    index: NodeIndex,
    arena: &mut NodeArena,
    definition: &GraphDefinition,
    ctx: &mut GraphContext<'_>,
) -> Result<f32, GraphError> {
    match value(index, arena, definition, ctx)? {
        GraphValue::Float(v) => Ok(v),
        _ => Err(GraphError::ValueTypeMismatch {
            node: index,
            expected: "float",
        }),
    }
}

/// Reads an ID from a value node.
pub(crate) fn get_id(
    index: NodeIndex,
    arena: &mut NodeArena,
    definition: &GraphDefinition,
    ctx: &mut GraphContext<'_>,
) -> Result<StringId, GraphError> {
    match value(index, arena, definition, ctx)? {
        GraphValue::Id(v) => Ok(v),
        _ => Err(GraphError::ValueTypeMismatch {
            node: index,
            expected: "id",
        }),
    }
}

/// Reads a vector from a value node.
pub(crate) fn get_vector(
    index: NodeIndex,
    arena: &mut NodeArena,
    definition: &GraphDefinition,
    ctx: &mut GraphContext<'_>,
) -> Result<Vector3<f32>, GraphError> {
    match value(index, arena, definition, ctx)? {
        GraphValue::Vector(v) => Ok(v),
        _ => Err(GraphError::ValueTypeMismatch {
            node: index,
            expected: "vector",
        }),
    }
}

/// Writes a control parameter's value.
pub(crate) fn set_value(
    index: NodeIndex,
    arena: &mut NodeArena,
    value: GraphValue,
) -> Result<(), GraphError> {
    match arena.get_mut(index)? {
        node @ (GraphNode::BoolParameter(_)
        | GraphNode::FloatParameter(_)
        | GraphNode::IdParameter(_)
        | GraphNode::VectorParameter(_)) => value_dispatch!(node, index, set_value, value),
        _ => Err(GraphError::NodeTypeMismatch { node: index }),
    }
}

/// Resets every value node's per-update cache; the instance calls this when
/// it initializes.
pub(crate) fn reset_value_caches(arena: &mut NodeArena) {
    for node in arena.iter_mut() {
        match node {
            GraphNode::BoolParameter(n) => n.initialize(),
            GraphNode::FloatParameter(n) => n.initialize(),
            GraphNode::IdParameter(n) => n.initialize(),
            GraphNode::VectorParameter(n) => n.initialize(),
            GraphNode::BoolAnd(n) => n.initialize(),
            GraphNode::BoolOr(n) => n.initialize(),
            GraphNode::BoolNot(n) => n.initialize(),
            GraphNode::FloatClamp(n) => n.initialize(),
            GraphNode::IdComparison(n) => n.initialize(),
            GraphNode::EventCondition(n) => n.initialize(),
            _ => {}
        }
    }
}

/// Typed mutable access to a state node; the state machine uses this to flag
/// transition phases.
pub(crate) fn state_node_mut<'a>(
    index: NodeIndex,
    arena: &'a mut NodeArena,
) -> Result<&'a mut StateNode, GraphError> {
    match arena.get_mut(index)? {
        GraphNode::State(node) => Ok(node),
        _ => Err(GraphError::NodeTypeMismatch { node: index }),
    }
}

/// Typed shared access to a transition node.
pub(crate) fn transition_node<'a>(
    index: NodeIndex,
    arena: &'a NodeArena,
) -> Result<&'a TransitionNode, GraphError> {
    match arena.get(index)? {
        GraphNode::Transition(node) => Ok(node),
        _ => Err(GraphError::NodeTypeMismatch { node: index }),
    }
}

/// Registers the blend task combining two child results, if both produced
/// work. With only one side producing a task there is nothing to blend and
/// the existing task passes through unchanged.
pub(crate) fn register_blend_task(
    ctx: &mut GraphContext<'_>,
    node: NodeIndex,
    source_task: Option<TaskIndex>,
    target_task: Option<TaskIndex>,
    blend_weight: f32,
    options: BlendOptions,
    mask: Option<BoneMaskIndex>,
) -> Option<TaskIndex> {
    match (source_task, target_task) {
        (Some(source), Some(target)) => Some(ctx.tasks.register(Task::Blend(BlendTask::new(
            node,
            source,
            target,
            blend_weight,
            options,
            mask,
        )))),
        (Some(source), None) => Some(source),
        (None, target) => target,
    }
}

/// Snaps blend weights that are within `1e-6` of one to exactly one.
pub(crate) fn snap_blend_weight(weight: f32) -> f32 {
    if crate::math::is_near_zero(weight - 1.0, 1e-6) {
        1.0
    } else {
        weight
    }
}
