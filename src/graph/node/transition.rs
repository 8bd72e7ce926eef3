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

//! Transitions: progress-driven synchronized cross-fades between states.

use super::{
    register_blend_task, snap_blend_weight, GraphContext, GraphDefinition, GraphError,
    NodeArena, NodeIndex, NodeStatus, PoseNodeOps, PoseNodeResult, PoseNodeState,
};
use crate::{
    event::SampledEventRange,
    graph::definition::BlendOptions,
    math::{wrap_time, Transform},
    sync_track::{SyncTrack, SyncTrackTime, SyncTrackTimeRange},
};

/// Cross-fades from a dynamically assigned source pose node into its settings'
/// target state. Progress advances by `dt / duration`; the blend weight *is*
/// the progress. While the fade runs the node reports a default one-event
/// sync track; once complete it follows the target's.
#[derive(Debug)]
pub struct TransitionNode {
    index: NodeIndex,
    base: PoseNodeState,
    progress: f32,
    source: Option<NodeIndex>,
    last_event_range: SampledEventRange,
}

impl TransitionNode {
    /// Creates the runtime node for a settings entry.
    pub fn new(index: NodeIndex) -> Self {
        Self {
            index,
            base: PoseNodeState::default(),
            progress: 0.0,
            source: None,
            last_event_range: SampledEventRange::default(),
        }
    }

    /// Cross-fade progress in `[0, 1]`.
    #[inline]
    pub fn progress(&self) -> f32 {
        self.progress
    }

    /// Returns `true` once the fade has fully reached the target.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.progress >= 1.0
    }

    /// The source pose node the owning state machine wired in, if started.
    #[inline]
    pub fn source(&self) -> Option<NodeIndex> {
        self.source
    }

    /// Starts the transition: wires the source in and initializes the target
    /// state at the source's current sync position, preserving phase.
    pub(crate) fn begin(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
        source: NodeIndex,
    ) -> Result<(), GraphError> {
        let target_state = definition.transition_settings(self.index)?.target_state;

        let source_state = super::pose_state(source, arena)?;
        let source_time = source_state.current_time;
        let (duration, current_time, previous_time) = (
            source_state.duration,
            source_state.current_time,
            source_state.previous_time,
        );
        let sync_time = super::sync_track(source, arena, definition)?.get_time(source_time);

        super::initialize(target_state, arena, definition, ctx, sync_time)?;

        self.source = Some(source);
        self.progress = 0.0;
        self.base.status = NodeStatus::Initialized;
        self.base.duration = duration;
        self.base.current_time = current_time;
        self.base.previous_time = previous_time;
        self.base.loop_count = 0;
        self.last_event_range = SampledEventRange::default();
        Ok(())
    }

    /// The firing-frame update. The source was already updated by the state
    /// machine before the condition fired, so only the target is driven here,
    /// over a zero-width window at its freshly initialized phase.
    pub(crate) fn update_started(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
        source_result: &PoseNodeResult,
    ) -> Result<PoseNodeResult, GraphError> {
        let settings = definition.transition_settings(self.index)?;
        let target_state = settings.target_state;
        self.progress =
            (ctx.delta_time / settings.duration.max(f32::EPSILON)).clamp(0.0, 1.0);
        let weight = snap_blend_weight(self.progress);

        let target_time = super::pose_state(target_state, arena)?.current_time;
        let sync_time = super::sync_track(target_state, arena, definition)?.get_time(target_time);
        let range = SyncTrackTimeRange {
            begin: sync_time,
            end: sync_time,
        };
        let target_result =
            super::update_synchronized(target_state, arena, definition, ctx, &range)?;

        self.finish_update(
            arena,
            definition,
            ctx,
            weight,
            &range,
            source_result,
            &target_result,
        )
    }

    /// The shared tail of every update flavor: attenuate events, register the
    /// blend and refresh the node's blended timeline.
    #[allow(clippy::too_many_arguments)]
    fn finish_update(
        &mut self,
        arena: &NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
        weight: f32,
        range: &SyncTrackTimeRange,
        source_result: &PoseNodeResult,
        target_result: &PoseNodeResult,
    ) -> Result<PoseNodeResult, GraphError> {
        let target_state = definition.transition_settings(self.index)?.target_state;
        let source = self.source.ok_or(GraphError::MissingChild { node: self.index })?;

        ctx.sampled_events
            .attenuate(source_result.events, 1.0 - weight);
        ctx.sampled_events.attenuate(target_result.events, weight);

        let task = register_blend_task(
            ctx,
            self.index,
            source_result.task,
            target_result.task,
            weight,
            BlendOptions::INTERPOLATIVE,
            None,
        );
        let root_motion_delta = Transform::interpolate(
            &source_result.root_motion_delta,
            &target_result.root_motion_delta,
            weight,
        );
        ctx.record_root_motion(self.index, root_motion_delta);

        let source_track = super::sync_track(source, arena, definition)?.clone();
        let target_track = super::sync_track(target_state, arena, definition)?.clone();
        let blended = SyncTrack::blend(&source_track, &target_track, weight).ok_or(
            GraphError::SyncTrackMismatch {
                node: self.index,
                source_events: source_track.event_count(),
                target_events: target_track.event_count(),
            },
        )?;

        let source_state = super::pose_state(source, arena)?;
        let target_state_data = super::pose_state(target_state, arena)?;
        self.base.duration = SyncTrack::calculate_synchronized_track_duration(
            source_state.duration,
            target_state_data.duration,
            &source_track,
            &target_track,
            &blended,
            weight,
        );
        self.base.previous_time = blended.get_percentage_through(range.begin);
        self.base.current_time = blended.get_percentage_through(range.end);

        self.last_event_range =
            SampledEventRange::join(source_result.events, target_result.events);

        Ok(PoseNodeResult {
            task,
            root_motion_delta,
            events: self.last_event_range,
        })
    }

    fn drive_children(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
        range: &SyncTrackTimeRange,
        weight: f32,
        loops: u32,
    ) -> Result<PoseNodeResult, GraphError> {
        let target_state = definition.transition_settings(self.index)?.target_state;
        let source = self.source.ok_or(GraphError::MissingChild { node: self.index })?;

        let source_result = super::update_synchronized(source, arena, definition, ctx, range)?;
        let target_result =
            super::update_synchronized(target_state, arena, definition, ctx, range)?;
        self.base.loop_count += loops;

        self.finish_update(
            arena,
            definition,
            ctx,
            weight,
            range,
            &source_result,
            &target_result,
        )
    }
}

impl PoseNodeOps for TransitionNode {
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
        _arena: &mut NodeArena,
        _definition: &GraphDefinition,
        _ctx: &mut GraphContext<'_>,
        time: SyncTrackTime,
    ) -> Result<(), GraphError> {
        // A transition only becomes meaningful through `begin`; plain
        // initialization just resets it.
        self.progress = 0.0;
        self.source = None;
        self.base.duration = 0.0;
        self.base.reset_at(time.percent.clamp(0.0, 1.0));
        Ok(())
    }

    fn shutdown(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
    ) -> Result<(), GraphError> {
        // The target state lives on as the machine's active state; only the
        // abandoned source branch goes down with the transition.
        if let Some(source) = self.source.take() {
            super::shutdown(source, arena, definition)?;
        }
        self.progress = 0.0;
        self.base.status = NodeStatus::Uninitialized;
        Ok(())
    }

    fn update(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
    ) -> Result<PoseNodeResult, GraphError> {
        let settings = definition.transition_settings(self.index)?;
        self.progress = (self.progress + ctx.delta_time / settings.duration.max(f32::EPSILON))
            .clamp(0.0, 1.0);
        let weight = snap_blend_weight(self.progress);

        let source = self.source.ok_or(GraphError::MissingChild { node: self.index })?;
        let target_state = settings.target_state;
        let source_track = super::sync_track(source, arena, definition)?.clone();
        let target_track = super::sync_track(target_state, arena, definition)?.clone();
        let blended = SyncTrack::blend(&source_track, &target_track, weight).ok_or(
            GraphError::SyncTrackMismatch {
                node: self.index,
                source_events: source_track.event_count(),
                target_events: target_track.event_count(),
            },
        )?;

        let delta_percent = if self.base.duration > f32::EPSILON {
            ctx.delta_time / self.base.duration
        } else {
            0.0
        };
        let (end_progress, loops) = wrap_time(self.base.current_time + delta_percent);
        let range = SyncTrackTimeRange {
            begin: blended.get_time(self.base.current_time.clamp(0.0, 1.0)),
            end: blended.get_time(end_progress),
        };

        self.drive_children(arena, definition, ctx, &range, weight, loops)
    }

    fn update_synchronized(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
        range: &SyncTrackTimeRange,
    ) -> Result<PoseNodeResult, GraphError> {
        let settings = definition.transition_settings(self.index)?;
        self.progress = (self.progress + ctx.delta_time / settings.duration.max(f32::EPSILON))
            .clamp(0.0, 1.0);
        let weight = snap_blend_weight(self.progress);
        let loops = u32::from(range.wraps());
        self.drive_children(arena, definition, ctx, range, weight, loops)
    }

    fn deactivate_branch(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
    ) -> Result<(), GraphError> {
        if let Some(source) = self.source {
            super::deactivate_branch(source, arena, definition, ctx)?;
        }
        ctx.sampled_events
            .mark_from_inactive_branch(self.last_event_range);
        Ok(())
    }
}
