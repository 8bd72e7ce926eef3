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

//! The two-way synchronized blend node.
//!
//! The node reads its weight, derives a blended sync track from its
//! children's tracks, maps its own progress through that track into a sync
//! window and drives both children over the same window. That is what keeps
//! siblings phase-locked despite different absolute durations.

use super::{
    register_blend_task, snap_blend_weight, GraphContext, GraphDefinition, GraphError,
    NodeArena, NodeIndex, NodeStatus, PoseNodeOps, PoseNodeResult, PoseNodeState,
};
use crate::{
    event::SampledEventRange,
    mask::BoneMaskIndex,
    math::{wrap_time, Transform},
    sync_track::{SyncTrack, SyncTrackTime, SyncTrackTimeRange},
};

/// Blends two pose children by a float value node's weight, keeping them
/// phase-locked through their sync tracks.
#[derive(Debug)]
pub struct BlendNode {
    index: NodeIndex,
    base: PoseNodeState,
    blend_weight: f32,
    blended_sync_track: SyncTrack,
    last_event_range: SampledEventRange,
}

impl BlendNode {
    /// Creates the runtime node for a settings entry.
    pub fn new(index: NodeIndex) -> Self {
        Self {
            index,
            base: PoseNodeState::default(),
            blend_weight: 0.0,
            blended_sync_track: SyncTrack::default(),
            last_event_range: SampledEventRange::default(),
        }
    }

    /// The most recent effective blend weight.
    #[inline]
    pub fn blend_weight(&self) -> f32 {
        self.blend_weight
    }

    /// The blended sync track this node currently follows.
    #[inline]
    pub fn blended_sync_track(&self) -> &SyncTrack {
        &self.blended_sync_track
    }

    fn read_weight(
        &self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
    ) -> Result<f32, GraphError> {
        let weight_node = definition.blend_settings(self.index)?.weight;
        let weight = super::get_float(weight_node, arena, definition, ctx)?;
        Ok(snap_blend_weight(weight.clamp(0.0, 1.0)))
    }

    fn child_tracks(
        &self,
        arena: &NodeArena,
        definition: &GraphDefinition,
    ) -> Result<(SyncTrack, SyncTrack), GraphError> {
        let settings = definition.blend_settings(self.index)?;
        let source = super::sync_track(settings.source, arena, definition)?.clone();
        let target = super::sync_track(settings.target, arena, definition)?.clone();
        Ok((source, target))
    }

    fn blend_tracks(
        &self,
        source: &SyncTrack,
        target: &SyncTrack,
        weight: f32,
    ) -> Result<SyncTrack, GraphError> {
        SyncTrack::blend(source, target, weight).ok_or(GraphError::SyncTrackMismatch {
            node: self.index,
            source_events: source.event_count(),
            target_events: target.event_count(),
        })
    }

    /// Checks the definition's bone mask into the frame's scratch pool so the
    /// blend task can reach it after the walk.
    fn frame_mask(
        &self,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
    ) -> Result<Option<BoneMaskIndex>, GraphError> {
        let settings = definition.blend_settings(self.index)?;
        Ok(settings
            .bone_mask
            .as_ref()
            .map(|mask| ctx.tasks.mask_pool_mut().store(mask.weights())))
    }

    /// The shared tail of both update flavors: children already updated over
    /// `range` with results in hand, register the blend and refresh times.
    #[allow(clippy::too_many_arguments)]
    fn finish_update(
        &mut self,
        arena: &NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
        weight: f32,
        blended: SyncTrack,
        range: &SyncTrackTimeRange,
        loops: u32,
        source_result: PoseNodeResult,
        target_result: PoseNodeResult,
    ) -> Result<PoseNodeResult, GraphError> {
        let settings = definition.blend_settings(self.index)?;

        ctx.sampled_events
            .attenuate(source_result.events, 1.0 - weight);
        ctx.sampled_events.attenuate(target_result.events, weight);

        let mask = self.frame_mask(definition, ctx)?;
        let task = register_blend_task(
            ctx,
            self.index,
            source_result.task,
            target_result.task,
            weight,
            settings.options,
            mask,
        );

        let root_motion_delta = Transform::interpolate(
            &source_result.root_motion_delta,
            &target_result.root_motion_delta,
            weight,
        );
        ctx.record_root_motion(self.index, root_motion_delta);

        let source_state = super::pose_state(settings.source, arena)?;
        let target_state = super::pose_state(settings.target, arena)?;
        let (source_track, target_track) = self.child_tracks(arena, definition)?;
        self.base.duration = SyncTrack::calculate_synchronized_track_duration(
            source_state.duration,
            target_state.duration,
            &source_track,
            &target_track,
            &blended,
            weight,
        );
        self.base.previous_time = blended.get_percentage_through(range.begin);
        self.base.current_time = blended.get_percentage_through(range.end);
        self.base.loop_count += loops;

        self.blend_weight = weight;
        self.blended_sync_track = blended;
        self.last_event_range =
            SampledEventRange::join(source_result.events, target_result.events);

        Ok(PoseNodeResult {
            task,
            root_motion_delta,
            events: self.last_event_range,
        })
    }
}

impl PoseNodeOps for BlendNode {
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
        let settings = definition.blend_settings(self.index)?;
        super::initialize(settings.source, arena, definition, ctx, time)?;
        super::initialize(settings.target, arena, definition, ctx, time)?;

        let weight = self.read_weight(arena, definition, ctx)?;
        let (source_track, target_track) = self.child_tracks(arena, definition)?;
        let blended = self.blend_tracks(&source_track, &target_track, weight)?;

        let source_state = super::pose_state(settings.source, arena)?;
        let target_state = super::pose_state(settings.target, arena)?;
        self.base.duration = SyncTrack::calculate_synchronized_track_duration(
            source_state.duration,
            target_state.duration,
            &source_track,
            &target_track,
            &blended,
            weight,
        );
        self.base.reset_at(blended.get_percentage_through(time).clamp(0.0, 1.0));
        self.blend_weight = weight;
        self.blended_sync_track = blended;
        Ok(())
    }

    fn shutdown(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
    ) -> Result<(), GraphError> {
        let settings = definition.blend_settings(self.index)?;
        super::shutdown(settings.target, arena, definition)?;
        super::shutdown(settings.source, arena, definition)?;
        self.base.status = NodeStatus::Uninitialized;
        Ok(())
    }

    fn update(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
    ) -> Result<PoseNodeResult, GraphError> {
        let settings = definition.blend_settings(self.index)?;
        let (source, target) = (settings.source, settings.target);

        let weight = self.read_weight(arena, definition, ctx)?;
        let (source_track, target_track) = self.child_tracks(arena, definition)?;
        let blended = self.blend_tracks(&source_track, &target_track, weight)?;

        let delta_percent = if self.base.duration > f32::EPSILON {
            ctx.delta_time / self.base.duration
        } else {
            0.0
        };
        let (end_progress, loops) = wrap_time(self.base.current_time + delta_percent);
        let range = SyncTrackTimeRange {
            begin: blended.get_time(self.base.current_time),
            end: blended.get_time(end_progress),
        };

        let source_result = super::update_synchronized(source, arena, definition, ctx, &range)?;
        let target_result = super::update_synchronized(target, arena, definition, ctx, &range)?;

        self.finish_update(
            arena,
            definition,
            ctx,
            weight,
            blended,
            &range,
            loops,
            source_result,
            target_result,
        )
    }

    fn update_synchronized(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
        range: &SyncTrackTimeRange,
    ) -> Result<PoseNodeResult, GraphError> {
        let settings = definition.blend_settings(self.index)?;
        let (source, target) = (settings.source, settings.target);

        let weight = self.read_weight(arena, definition, ctx)?;
        let (source_track, target_track) = self.child_tracks(arena, definition)?;
        let blended = self.blend_tracks(&source_track, &target_track, weight)?;
        let loops = u32::from(range.wraps());

        let source_result = super::update_synchronized(source, arena, definition, ctx, range)?;
        let target_result = super::update_synchronized(target, arena, definition, ctx, range)?;

        self.finish_update(
            arena,
            definition,
            ctx,
            weight,
            blended,
            range,
            loops,
            source_result,
            target_result,
        )
    }

    fn deactivate_branch(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
    ) -> Result<(), GraphError> {
        let settings = definition.blend_settings(self.index)?;
        let (source, target) = (settings.source, settings.target);
        super::deactivate_branch(source, arena, definition, ctx)?;
        super::deactivate_branch(target, arena, definition, ctx)?;
        ctx.sampled_events
            .mark_from_inactive_branch(self.last_event_range);
        Ok(())
    }
}
