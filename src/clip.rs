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

//! Immutable animation clips: decoded per-bone tracks plus their metadata.

use crate::{
    error::GraphError,
    event::{AnimationEvent, AnimationEventKind},
    math::Transform,
    pose::{InitialPoseState, Pose},
    skeleton::Skeleton,
    sync_track::SyncTrack,
    track::BoneTrack,
    Percentage, Seconds,
};
use std::sync::Arc;

/// An immutable animation asset: one decoded transform track per animated
/// bone, an optional root-motion track, authored events and a sync track.
#[derive(Debug)]
pub struct AnimationClip {
    asset_id: u64,
    skeleton: Arc<Skeleton>,
    tracks: Vec<BoneTrack>,
    root_motion: Option<BoneTrack>,
    events: Vec<AnimationEvent>,
    sync_track: SyncTrack,
    duration: Seconds,
    frame_rate: u8,
}

impl AnimationClip {
    /// Creates a clip from decoded tracks. Duration is the longest track
    /// extent.
    pub fn new(
        asset_id: u64,
        skeleton: Arc<Skeleton>,
        tracks: Vec<BoneTrack>,
        frame_rate: u8,
    ) -> Self {
        let duration = tracks
            .iter()
            .map(|t| t.duration())
            .fold(0.0f32, |a, b| a.max(b));
        Self {
            asset_id,
            skeleton,
            tracks,
            root_motion: None,
            events: Vec::new(),
            sync_track: SyncTrack::default(),
            duration,
            frame_rate,
        }
    }

    /// Attaches a root-motion track. Root motion is kept out of the bone
    /// tracks so the pose stays in place while the delta is reported
    /// separately.
    pub fn set_root_motion(&mut self, track: BoneTrack) {
        self.duration = self.duration.max(track.duration());
        self.root_motion = Some(track);
    }

    /// Replaces the authored event list.
    pub fn set_events(&mut self, events: Vec<AnimationEvent>) {
        self.events = events;
    }

    /// Replaces the sync track.
    pub fn set_sync_track(&mut self, sync_track: SyncTrack) {
        self.sync_track = sync_track;
    }

    /// Stable asset identity of the clip.
    #[inline]
    pub fn asset_id(&self) -> u64 {
        self.asset_id
    }

    /// The skeleton the clip was authored for.
    #[inline]
    pub fn skeleton(&self) -> &Arc<Skeleton> {
        &self.skeleton
    }

    /// Duration of the clip in seconds.
    #[inline]
    pub fn duration(&self) -> Seconds {
        self.duration
    }

    /// Authored key frames per second. Metadata only; sampling interpolates
    /// between whatever keys are present.
    #[inline]
    pub fn frame_rate(&self) -> u8 {
        self.frame_rate
    }

    /// The decoded bone tracks.
    #[inline]
    pub fn tracks(&self) -> &[BoneTrack] {
        &self.tracks
    }

    /// The authored events.
    #[inline]
    pub fn events(&self) -> &[AnimationEvent] {
        &self.events
    }

    /// The clip's sync track.
    #[inline]
    pub fn sync_track(&self) -> &SyncTrack {
        &self.sync_track
    }

    /// Fills a pose by sampling every track at `time` (seconds). Bones without
    /// a track are left at the reference pose.
    pub fn sample_pose(&self, time: Seconds, pose: &mut Pose) -> Result<(), GraphError> {
        if pose.bone_count() != self.skeleton.bone_count() {
            return Err(GraphError::SkeletonMismatch {
                pose_bones: pose.bone_count(),
                clip_bones: self.skeleton.bone_count(),
            });
        }
        pose.reset(InitialPoseState::Reference);
        for track in &self.tracks {
            if (track.bone() as usize) < pose.bone_count() {
                pose.set_transform(track.bone(), track.sample(time));
            }
        }
        pose.mark_sampled();
        Ok(())
    }

    /// Root-motion delta between two normalized times of the clip. `loops` is
    /// how many times the playhead crossed the loop seam between them; the
    /// delta is composed through the seam accordingly.
    pub fn root_motion_delta(
        &self,
        previous: Percentage,
        current: Percentage,
        loops: u32,
    ) -> Transform {
        let Some(track) = &self.root_motion else {
            return Transform::identity();
        };

        let sample_at = |p: Percentage| track.sample(p * self.duration);
        let delta = |from: Percentage, to: Percentage| {
            sample_at(from).inverse().compose(&sample_at(to))
        };

        if loops == 0 {
            return delta(previous, current);
        }

        let mut result = delta(previous, 1.0);
        let full_loop = delta(0.0, 1.0);
        for _ in 1..loops {
            result = result.compose(&full_loop);
        }
        result.compose(&delta(0.0, current))
    }

    /// Visits every authored event intersecting the update window
    /// `(previous, current]` in normalized time, crossing the loop seam when
    /// `looped` is set. The callback receives the event and the progress
    /// through its window (always `1.0` for immediate events).
    pub fn visit_events_in_window<F>(
        &self,
        previous: Percentage,
        current: Percentage,
        looped: bool,
        mut visitor: F,
    ) where
        F: FnMut(&AnimationEvent, Percentage),
    {
        if self.events.is_empty() || self.duration <= 0.0 {
            return;
        }
        let previous_sec = previous * self.duration;
        let current_sec = current * self.duration;
        if looped {
            self.visit_segment(previous_sec, self.duration, true, &mut visitor);
            self.visit_segment(0.0, current_sec, false, &mut visitor);
        } else {
            self.visit_segment(previous_sec, current_sec, false, &mut visitor);
        }
    }

    fn visit_segment<F>(&self, from: Seconds, to: Seconds, include_start: bool, visitor: &mut F)
    where
        F: FnMut(&AnimationEvent, Percentage),
    {
        for event in &self.events {
            match event.kind {
                AnimationEventKind::Immediate => {
                    let fires = if include_start || from == 0.0 {
                        event.start_time >= from && event.start_time <= to
                    } else {
                        event.start_time > from && event.start_time <= to
                    };
                    if fires {
                        visitor(event, 1.0);
                    }
                }
                AnimationEventKind::Durable => {
                    if event.start_time < to && event.end_time() > from {
                        let percent = if event.duration <= f32::EPSILON {
                            1.0
                        } else {
                            ((to - event.start_time) / event.duration).clamp(0.0, 1.0)
                        };
                        visitor(event, percent);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{track::TrackKey, StringId};
    use nalgebra::Vector3;

    fn skeleton() -> Arc<Skeleton> {
        Arc::new(
            Skeleton::new(
                vec![("root".to_string(), None), ("spine".to_string(), Some(0))],
                vec![Transform::identity(); 2],
            )
            .unwrap(),
        )
    }

    fn translation_key(time: f32, x: f32) -> TrackKey {
        TrackKey {
            time,
            transform: Transform::from_translation(Vector3::new(x, 0.0, 0.0)),
        }
    }

    fn clip() -> AnimationClip {
        let mut clip = AnimationClip::new(
            7,
            skeleton(),
            vec![BoneTrack::new(
                1,
                vec![translation_key(0.0, 0.0), translation_key(2.0, 4.0)],
            )],
            30,
        );
        clip.set_root_motion(BoneTrack::new(
            0,
            vec![translation_key(0.0, 0.0), translation_key(2.0, 2.0)],
        ));
        clip
    }

    #[test]
    fn sample_pose_fills_tracked_bones_and_leaves_reference_elsewhere() {
        let clip = clip();
        let mut pose = Pose::new(clip.skeleton().clone(), InitialPoseState::None);
        clip.sample_pose(1.0, &mut pose).unwrap();
        assert!((pose.transform(1).translation.x - 2.0).abs() < 1e-6);
        assert_eq!(pose.transform(0).translation.x, 0.0);
    }

    #[test]
    fn sample_pose_rejects_wrong_skeleton() {
        let clip = clip();
        let other = Arc::new(
            Skeleton::new(
                vec![("only".to_string(), None)],
                vec![Transform::identity()],
            )
            .unwrap(),
        );
        let mut pose = Pose::new(other, InitialPoseState::None);
        assert!(matches!(
            clip.sample_pose(0.0, &mut pose),
            Err(GraphError::SkeletonMismatch { .. })
        ));
    }

    #[test]
    fn root_motion_delta_is_linear_between_samples() {
        let clip = clip();
        let delta = clip.root_motion_delta(0.25, 0.5, 0);
        assert!((delta.translation.x - 0.5).abs() < 1e-5);
    }

    #[test]
    fn root_motion_delta_composes_across_the_loop_seam() {
        let clip = clip();
        // 0.75 -> end covers 0.5 units, start -> 0.25 covers another 0.5.
        let delta = clip.root_motion_delta(0.75, 0.25, 1);
        assert!((delta.translation.x - 1.0).abs() < 1e-5);
    }

    #[test]
    fn events_fire_inside_the_window_only() {
        let mut clip = clip();
        clip.set_events(vec![
            AnimationEvent::immediate(StringId::from_name("step"), 1.0),
            AnimationEvent::durable(StringId::from_name("slide"), 0.5, 1.0),
        ]);

        let mut seen = Vec::new();
        clip.visit_events_in_window(0.4, 0.6, false, |e, p| seen.push((e.id, p)));
        // Window is 0.8s..1.2s: both the step at 1.0 and the slide (0.5..1.5).
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, StringId::from_name("step"));
        assert!((seen[1].1 - 0.7).abs() < 1e-5);

        seen.clear();
        clip.visit_events_in_window(0.0, 0.2, false, |e, p| seen.push((e.id, p)));
        assert!(seen.is_empty());
    }

    #[test]
    fn events_cross_the_loop_seam_when_wrapped() {
        let mut clip = clip();
        clip.set_events(vec![AnimationEvent::immediate(
            StringId::from_name("step"),
            0.1,
        )]);
        let mut seen = Vec::new();
        clip.visit_events_in_window(0.9, 0.1, true, |e, _| seen.push(e.id));
        assert_eq!(seen, vec![StringId::from_name("step")]);
    }
}
