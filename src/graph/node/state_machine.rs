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

//! The state machine node: active-state tracking and transition arbitration.

use super::{
    GraphContext, GraphDefinition, GraphError, GraphNode, NodeArena, NodeIndex, NodeStatus,
    PoseNodeOps, PoseNodeResult, PoseNodeState, TransitionPhase,
};
use crate::{
    graph::definition::{StateMachineSettings, TransitionRef},
    sync_track::{SyncTrackTime, SyncTrackTimeRange},
};

/// The machine's currently running cross-fade.
#[derive(Copy, Clone, Debug)]
struct ActiveTransition {
    /// The transition node doing the fade.
    node: NodeIndex,
    /// Index of its target in the machine's state list.
    target_state: u16,
}

/// Runs a set of states connected by transitions. Exactly one state (or one
/// in-flight transition) backs the machine's pose at any time.
///
/// Per update: finished transitions are retired, the active element advances,
/// and then every outgoing transition condition of the (incoming) state is
/// evaluated in declaration order; the first that holds starts a new
/// transition. An in-flight transition may be replaced by a transition
/// leaving its target state.
#[derive(Debug)]
pub struct StateMachineNode {
    index: NodeIndex,
    base: PoseNodeState,
    active_state_index: u16,
    active_transition: Option<ActiveTransition>,
}

impl StateMachineNode {
    /// Creates the runtime node for a settings entry.
    pub fn new(index: NodeIndex) -> Self {
        Self {
            index,
            base: PoseNodeState::default(),
            active_state_index: 0,
            active_transition: None,
        }
    }

    /// Index of the active state in the machine's state list. While a
    /// transition runs this remains the state being left.
    #[inline]
    pub fn active_state_index(&self) -> u16 {
        self.active_state_index
    }

    /// Returns `true` while a cross-fade is in flight.
    #[inline]
    pub fn is_transition_active(&self) -> bool {
        self.active_transition.is_some()
    }

    /// The node currently backing the machine's pose: the in-flight
    /// transition, or the active state.
    pub fn active_element(&self, settings: &StateMachineSettings) -> Option<NodeIndex> {
        if let Some(active) = self.active_transition {
            return Some(active.node);
        }
        settings
            .states
            .get(self.active_state_index as usize)
            .map(|state| state.state_node)
    }

    fn mirror_element(
        &mut self,
        element: NodeIndex,
        arena: &NodeArena,
    ) -> Result<(), GraphError> {
        let element_state = super::pose_state(element, arena)?;
        self.base.duration = element_state.duration;
        self.base.current_time = element_state.current_time;
        self.base.previous_time = element_state.previous_time;
        Ok(())
    }

    /// Retires a completed transition: the fade is over, so the source branch
    /// shuts down and the target becomes the active state.
    fn finalize_transition(
        &mut self,
        active: ActiveTransition,
        settings: &StateMachineSettings,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
    ) -> Result<(), GraphError> {
        super::shutdown(active.node, arena, definition)?;
        let target_state_node = settings.states[active.target_state as usize].state_node;
        super::state_node_mut(target_state_node, arena)?
            .set_transition_phase(TransitionPhase::None);
        self.active_state_index = active.target_state;
        self.active_transition = None;
        Ok(())
    }

    fn retire_if_complete(
        &mut self,
        settings: &StateMachineSettings,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
    ) -> Result<(), GraphError> {
        if let Some(active) = self.active_transition {
            if super::transition_node(active.node, arena)?.is_complete() {
                self.finalize_transition(active, settings, arena, definition)?;
            }
        }
        Ok(())
    }

    /// Fires a transition out of `scanned_state`. Returns the result that now
    /// backs the machine for this frame.
    #[allow(clippy::too_many_arguments)]
    fn start_transition(
        &mut self,
        settings: &StateMachineSettings,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
        scanned_state: u16,
        firing: &TransitionRef,
        current_result: PoseNodeResult,
    ) -> Result<PoseNodeResult, GraphError> {
        let target_state_index = firing.target_state_index;
        let target_state_node = settings.states[target_state_index as usize].state_node;

        // Self-transitions restart the state's timeline. A cross-fade of a
        // node with itself would alias one arena slot, so the restart takes
        // effect without one; this frame's pose stands.
        if target_state_index == scanned_state {
            super::initialize(
                target_state_node,
                arena,
                definition,
                ctx,
                SyncTrackTime::default(),
            )?;
            return Ok(current_result);
        }

        let source_state_node = settings.states[scanned_state as usize].state_node;

        let replaced = self.active_transition;
        if let Some(old) = replaced {
            // Interrupting a running fade abandons it: its events this frame
            // are flagged, its source branch goes down, and its target state
            // carries the phase over as the new source.
            super::deactivate_branch(old.node, arena, definition, ctx)?;
            super::shutdown(old.node, arena, definition)?;
        } else {
            // The state being left is a losing branch from here on.
            super::deactivate_branch(source_state_node, arena, definition, ctx)?;
        }

        super::state_node_mut(source_state_node, arena)?
            .set_transition_phase(TransitionPhase::Outgoing);

        let transition_index = firing.transition_node;
        let mut transition_slot = arena.take(transition_index)?;
        let started = match &mut transition_slot {
            GraphNode::Transition(transition) => {
                match transition.begin(arena, definition, ctx, source_state_node) {
                    Ok(()) if replaced.is_none() => {
                        // On the firing frame the source was already updated;
                        // drive the target and blend with the existing result.
                        Some(transition.update_started(arena, definition, ctx, &current_result))
                    }
                    Ok(()) => Some(Ok(current_result)),
                    Err(error) => Some(Err(error)),
                }
            }
            _ => None,
        };
        arena.put(transition_index, transition_slot);
        let result = started
            .ok_or(GraphError::NodeTypeMismatch {
                node: transition_index,
            })??;

        super::state_node_mut(target_state_node, arena)?
            .set_transition_phase(TransitionPhase::Incoming);

        if replaced.is_some() {
            self.active_state_index = scanned_state;
        }
        self.active_transition = Some(ActiveTransition {
            node: transition_index,
            target_state: target_state_index,
        });
        self.mirror_element(transition_index, arena)?;
        Ok(result)
    }

    fn update_internal(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
        range: Option<&SyncTrackTimeRange>,
    ) -> Result<PoseNodeResult, GraphError> {
        let settings = definition.state_machine_settings(self.index)?;

        // A transition that finished last frame and was not retired yet.
        self.retire_if_complete(settings, arena, definition)?;

        let element = self
            .active_element(settings)
            .ok_or(GraphError::MissingChild { node: self.index })?;
        let mut result = match range {
            Some(range) => super::update_synchronized(element, arena, definition, ctx, range)?,
            None => super::update(element, arena, definition, ctx)?,
        };
        self.mirror_element(element, arena)?;

        // Retire immediately once the fade lands on the target.
        self.retire_if_complete(settings, arena, definition)?;

        // Transition arbitration: first declared condition that holds wins.
        // While fading, the candidates are the incoming state's transitions.
        let scanned_state = self
            .active_transition
            .map(|active| active.target_state)
            .unwrap_or(self.active_state_index);
        let transitions = &settings.states[scanned_state as usize].transitions;
        for transition_ref in transitions {
            if super::get_bool(transition_ref.condition, arena, definition, ctx)? {
                result = self.start_transition(
                    settings,
                    arena,
                    definition,
                    ctx,
                    scanned_state,
                    transition_ref,
                    result,
                )?;
                break;
            }
        }

        Ok(result)
    }
}

impl PoseNodeOps for StateMachineNode {
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
        let settings = definition.state_machine_settings(self.index)?;
        let entry_state = settings
            .states
            .first()
            .ok_or(GraphError::MissingChild { node: self.index })?
            .state_node;

        self.active_state_index = 0;
        self.active_transition = None;
        super::initialize(entry_state, arena, definition, ctx, time)?;
        self.mirror_element(entry_state, arena)?;
        self.base.status = NodeStatus::Initialized;
        self.base.loop_count = 0;
        Ok(())
    }

    fn shutdown(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
    ) -> Result<(), GraphError> {
        let settings = definition.state_machine_settings(self.index)?;
        if let Some(active) = self.active_transition.take() {
            // Shuts down the fade's source branch...
            super::shutdown(active.node, arena, definition)?;
            // ...and its target state, which never got to become active.
            let target_state_node = settings.states[active.target_state as usize].state_node;
            super::shutdown(target_state_node, arena, definition)?;
        } else if let Some(state) = settings.states.get(self.active_state_index as usize) {
            super::shutdown(state.state_node, arena, definition)?;
        }
        self.active_state_index = 0;
        self.base.status = NodeStatus::Uninitialized;
        Ok(())
    }

    fn update(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
    ) -> Result<PoseNodeResult, GraphError> {
        self.update_internal(arena, definition, ctx, None)
    }

    fn update_synchronized(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
        range: &SyncTrackTimeRange,
    ) -> Result<PoseNodeResult, GraphError> {
        self.update_internal(arena, definition, ctx, Some(range))
    }

    fn deactivate_branch(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
    ) -> Result<(), GraphError> {
        let settings = definition.state_machine_settings(self.index)?;
        if let Some(element) = self.active_element(settings) {
            super::deactivate_branch(element, arena, definition, ctx)?;
        }
        Ok(())
    }
}
