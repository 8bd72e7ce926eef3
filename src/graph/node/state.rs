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

//! States: passthrough nodes with lifetime bookkeeping and entry/exit events.

use super::{
    passthrough, GraphContext, GraphDefinition, GraphError, NodeArena, NodeIndex, NodeStatus,
    PoseNodeOps, PoseNodeResult, PoseNodeState,
};
use crate::{
    event::{SampledEvent, SampledEventRange, SampledEventSource},
    sync_track::{SyncTrackTime, SyncTrackTimeRange},
    Seconds, StringId,
};

/// Where a state stands relative to the machine's transitions.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TransitionPhase {
    /// Plainly active, no transition touching the state.
    #[default]
    None,
    /// The machine is fading away from this state.
    Outgoing,
    /// The machine is fading into this state.
    Incoming,
}

/// A state of a state machine. Wraps its child like a passthrough, tracks the
/// time spent active and samples its entry/exit state events so conditions
/// elsewhere in the graph can react to them.
///
/// Entry and exit markers are one-shot per activation: the entry event fires
/// on the state's first update after (re-)initialization, the exit event the
/// moment the state starts being left, and neither repeats on the following
/// frames even though a cross-fade keeps updating the state for its whole
/// duration. The latches rearm when the state is initialized again.
#[derive(Debug)]
pub struct StateNode {
    index: NodeIndex,
    base: PoseNodeState,
    transition_phase: TransitionPhase,
    elapsed_time_in_state: Seconds,
    entry_event_fired: bool,
    exit_event_fired: bool,
    last_event_range: SampledEventRange,
}

impl StateNode {
    /// Creates the runtime node for a settings entry.
    pub fn new(index: NodeIndex) -> Self {
        Self {
            index,
            base: PoseNodeState::default(),
            transition_phase: TransitionPhase::None,
            elapsed_time_in_state: 0.0,
            entry_event_fired: false,
            exit_event_fired: false,
            last_event_range: SampledEventRange::default(),
        }
    }

    /// The state's current transition phase.
    #[inline]
    pub fn transition_phase(&self) -> TransitionPhase {
        self.transition_phase
    }

    /// Flags the state as being faded away from, into, or neither. The owning
    /// state machine maintains this.
    #[inline]
    pub fn set_transition_phase(&mut self, phase: TransitionPhase) {
        self.transition_phase = phase;
    }

    /// Returns `true` while a transition touches this state.
    #[inline]
    pub fn is_transitioning(&self) -> bool {
        self.transition_phase != TransitionPhase::None
    }

    /// Seconds this state has been active since it was last initialized.
    #[inline]
    pub fn elapsed_time_in_state(&self) -> Seconds {
        self.elapsed_time_in_state
    }

    fn push_state_event(&self, ctx: &mut GraphContext<'_>, id: StringId) {
        if id.is_none() {
            return;
        }
        ctx.sampled_events.push(SampledEvent {
            source: SampledEventSource::State,
            id,
            weight: 1.0,
            percent_through: 1.0,
            is_ignored: false,
            from_inactive_branch: !ctx.is_branch_active(),
        });
    }

    /// The shared tail of both update flavors: bookkeeping plus entry/exit
    /// event sampling appended to the child's event range.
    fn finish_update(
        &mut self,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
        mut result: PoseNodeResult,
    ) -> Result<PoseNodeResult, GraphError> {
        let settings = definition.state_settings(self.index)?;
        self.elapsed_time_in_state += ctx.delta_time;

        if !self.entry_event_fired {
            self.push_state_event(ctx, settings.entry_event);
            self.entry_event_fired = true;
        }
        if self.transition_phase == TransitionPhase::Outgoing && !self.exit_event_fired {
            self.push_state_event(ctx, settings.exit_event);
            self.exit_event_fired = true;
        }

        result.events.end = ctx.sampled_events.len();
        self.last_event_range = result.events;
        Ok(result)
    }
}

impl PoseNodeOps for StateNode {
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
        let child = definition.state_settings(self.index)?.child;
        self.transition_phase = TransitionPhase::None;
        self.elapsed_time_in_state = 0.0;
        self.entry_event_fired = false;
        self.exit_event_fired = false;
        self.last_event_range = SampledEventRange::default();
        passthrough::initialize_child(&mut self.base, child, arena, definition, ctx, time)
    }

    fn shutdown(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
    ) -> Result<(), GraphError> {
        let child = definition.state_settings(self.index)?.child;
        super::shutdown(child, arena, definition)?;
        self.transition_phase = TransitionPhase::None;
        self.base.status = NodeStatus::Uninitialized;
        Ok(())
    }

    fn update(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
    ) -> Result<PoseNodeResult, GraphError> {
        let child = definition.state_settings(self.index)?.child;
        let result = passthrough::update_child(&mut self.base, child, arena, definition, ctx)?;
        self.finish_update(definition, ctx, result)
    }

    fn update_synchronized(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
        range: &SyncTrackTimeRange,
    ) -> Result<PoseNodeResult, GraphError> {
        let child = definition.state_settings(self.index)?.child;
        let result = passthrough::update_child_synchronized(
            &mut self.base,
            child,
            arena,
            definition,
            ctx,
            range,
        )?;
        self.finish_update(definition, ctx, result)
    }

    fn deactivate_branch(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
    ) -> Result<(), GraphError> {
        let settings = definition.state_settings(self.index)?;
        let (child, exit_event) = (settings.child, settings.exit_event);
        super::deactivate_branch(child, arena, definition, ctx)?;
        // The branch state is inactive here, so the exit marker is flagged at
        // the source. The latch keeps the following fade-out frames from
        // sampling it again.
        if !self.exit_event_fired {
            self.push_state_event(ctx, exit_event);
            self.exit_event_fired = true;
        }
        ctx.sampled_events
            .mark_from_inactive_branch(self.last_event_range);
        Ok(())
    }
}
