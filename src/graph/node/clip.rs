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

//! The leaf pose node: sample one animation clip.

use super::{
    GraphContext, GraphDefinition, GraphError, NodeArena, NodeIndex, NodeStatus, PoseNodeOps,
    PoseNodeResult, PoseNodeState,
};
use crate::{
    clip::AnimationClip,
    event::{SampledEvent, SampledEventRange, SampledEventSource},
    math::wrap_time,
    sync_track::{SyncTrackTime, SyncTrackTimeRange},
    task::{SampleTask, Task},
    Percentage,
};
use std::sync::Arc;

/// Plays an animation clip, registering one sample task per update. The clip
/// is resolved from the dataset at instantiation through the settings' data
/// slot. An optional bool value node flips playback direction.
#[derive(Debug)]
pub struct AnimationClipNode {
    index: NodeIndex,
    base: PoseNodeState,
    clip: Arc<AnimationClip>,
    last_event_range: SampledEventRange,
}

impl AnimationClipNode {
    /// Creates the runtime node with its resolved clip.
    pub fn new(index: NodeIndex, clip: Arc<AnimationClip>) -> Self {
        Self {
            index,
            base: PoseNodeState::default(),
            clip,
            last_event_range: SampledEventRange::default(),
        }
    }

    /// The clip the node samples.
    #[inline]
    pub fn clip(&self) -> &Arc<AnimationClip> {
        &self.clip
    }

    /// Samples clip events over the window just traversed and registers the
    /// sample task, building the node's result.
    fn finish_update(
        &mut self,
        ctx: &mut GraphContext<'_>,
        previous: Percentage,
        current: Percentage,
        loops: u32,
    ) -> PoseNodeResult {
        let events_start = ctx.sampled_events.mark();
        let from_inactive_branch = !ctx.is_branch_active();
        let asset_id = self.clip.asset_id();
        self.clip
            .visit_events_in_window(previous, current, loops > 0, |event, percent_through| {
                ctx.sampled_events.push(SampledEvent {
                    source: SampledEventSource::AnimationClip(asset_id),
                    id: event.id,
                    weight: 1.0,
                    percent_through,
                    is_ignored: false,
                    from_inactive_branch,
                });
            });
        self.last_event_range = ctx.sampled_events.range_from(events_start);

        let task = ctx.tasks.register(Task::Sample(SampleTask::new(
            self.index,
            self.clip.clone(),
            current,
        )));

        let root_motion_delta = self.clip.root_motion_delta(previous, current, loops);
        ctx.record_root_motion(self.index, root_motion_delta);

        PoseNodeResult {
            task: Some(task),
            root_motion_delta,
            events: self.last_event_range,
        }
    }
}

impl PoseNodeOps for AnimationClipNode {
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
        self.base.duration = self.clip.duration();
        let start = self
            .clip
            .sync_track()
            .get_percentage_through(time)
            .clamp(0.0, 1.0);
        self.base.reset_at(start);
        Ok(())
    }

    fn shutdown(
        &mut self,
        _arena: &mut NodeArena,
        _definition: &GraphDefinition,
    ) -> Result<(), GraphError> {
        self.base.status = NodeStatus::Uninitialized;
        Ok(())
    }

    fn update(
        &mut self,
        arena: &mut NodeArena,
        definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
    ) -> Result<PoseNodeResult, GraphError> {
        let settings = definition.animation_clip_settings(self.index)?;
        let mut direction = 1.0;
        if let Some(reverse_node) = settings.play_in_reverse {
            if super::get_bool(reverse_node, arena, definition, ctx)? {
                direction = -1.0;
            }
        }

        self.base.previous_time = self.base.current_time;
        let (current, loops) = if self.base.duration > f32::EPSILON {
            wrap_time(self.base.current_time + direction * ctx.delta_time / self.base.duration)
        } else {
            (self.base.current_time, 0)
        };
        self.base.current_time = current;
        self.base.loop_count += loops;

        Ok(self.finish_update(ctx, self.base.previous_time, current, loops))
    }

    fn update_synchronized(
        &mut self,
        _arena: &mut NodeArena,
        _definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
        range: &SyncTrackTimeRange,
    ) -> Result<PoseNodeResult, GraphError> {
        let sync_track = self.clip.sync_track();
        let previous = sync_track.get_percentage_through(range.begin).clamp(0.0, 1.0);
        let current = sync_track.get_percentage_through(range.end).clamp(0.0, 1.0);
        let loops = u32::from(range.wraps());

        self.base.previous_time = previous;
        self.base.current_time = current;
        self.base.loop_count += loops;

        Ok(self.finish_update(ctx, previous, current, loops))
    }

    fn deactivate_branch(
        &mut self,
        _arena: &mut NodeArena,
        _definition: &GraphDefinition,
        ctx: &mut GraphContext<'_>,
    ) -> Result<(), GraphError> {
        ctx.sampled_events
            .mark_from_inactive_branch(self.last_event_range);
        Ok(())
    }
}
