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

//! Sync tracks: phase timelines that make blending between clips of different
//! durations meaningful.
//!
//! A sync track divides the normalized `[0, 1]` time of a clip (or subtree)
//! into named contiguous events. A position on the track is a
//! [`SyncTrackTime`]: which event, and how far through it. Two clips stay
//! phase-locked under a blend by mapping the blend's progress through a
//! *blended* track into each clip's own track.

use crate::{math::lerpf, Percentage, Seconds, StringId};
use once_cell::sync::Lazy;

/// A named phase segment of a sync track. `start` and `duration` are
/// percentages of the whole track.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SyncEvent {
    /// Name of the phase, e.g. `LeftFootDown`.
    pub id: StringId,
    /// Start of the segment in `[0, 1)`.
    pub start: Percentage,
    /// Length of the segment in `(0, 1]`.
    pub duration: Percentage,
}

/// A position on a sync track: event index plus progress through that event.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SyncTrackTime {
    /// Index of the event.
    pub event_index: u32,
    /// Progress through the event in `[0, 1]`.
    pub percent: Percentage,
}

impl Default for SyncTrackTime {
    fn default() -> Self {
        Self {
            event_index: 0,
            percent: 0.0,
        }
    }
}

impl SyncTrackTime {
    /// Collapses the time into a single comparable scalar: event index plus
    /// in-event progress.
    #[inline]
    pub fn to_float(&self) -> f32 {
        self.event_index as f32 + self.percent
    }
}

/// A begin/end pair of sync track positions describing one update window.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct SyncTrackTimeRange {
    /// Where the window starts.
    pub begin: SyncTrackTime,
    /// Where the window ends. An end that compares before the begin means the
    /// window wrapped around the loop seam.
    pub end: SyncTrackTime,
}

impl SyncTrackTimeRange {
    /// Returns `true` if the window crosses the loop seam.
    #[inline]
    pub fn wraps(&self) -> bool {
        self.end.to_float() < self.begin.to_float()
    }
}

static DEFAULT_TRACK: Lazy<SyncTrack> = Lazy::new(SyncTrack::default);

/// An ordered sequence of contiguous, non-overlapping sync events covering
/// `[0, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct SyncTrack {
    events: Vec<SyncEvent>,
}

impl Default for SyncTrack {
    /// A single unnamed event spanning the whole track.
    fn default() -> Self {
        Self {
            events: vec![SyncEvent {
                id: StringId::NONE,
                start: 0.0,
                duration: 1.0,
            }],
        }
    }
}

impl SyncTrack {
    /// Builds a track from event durations, normalizing them to sum to one and
    /// deriving contiguous start times. Empty input yields the default track.
    pub fn from_durations(events: Vec<(StringId, Percentage)>) -> Self {
        let total: f32 = events.iter().map(|(_, d)| d.max(0.0)).sum();
        if events.is_empty() || total <= f32::EPSILON {
            return Self::default();
        }
        let mut start = 0.0;
        let events = events
            .into_iter()
            .map(|(id, duration)| {
                let duration = duration.max(0.0) / total;
                let event = SyncEvent {
                    id,
                    start,
                    duration,
                };
                start += duration;
                event
            })
            .collect();
        Self { events }
    }

    /// Builds a track of `count` equal unnamed events. Useful for clips whose
    /// phases are evenly spaced (e.g. symmetric locomotion cycles).
    pub fn with_equal_events(count: usize) -> Self {
        if count == 0 {
            return Self::default();
        }
        Self::from_durations(vec![(StringId::NONE, 1.0); count])
    }

    /// A shared single-event track, the sync track of anything without
    /// authored phase data.
    pub fn default_ref() -> &'static SyncTrack {
        &DEFAULT_TRACK
    }

    /// Number of events.
    #[inline]
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// The events in order.
    #[inline]
    pub fn events(&self) -> &[SyncEvent] {
        &self.events
    }

    /// Maps a normalized track position to a sync time. The input must already
    /// be wrapped into `[0, 1]`; boundary positions resolve to the *end* of
    /// the earlier event rather than the start of the later one.
    pub fn get_time(&self, progress: Percentage) -> SyncTrackTime {
        debug_assert!((0.0..=1.0).contains(&progress));
        for (index, event) in self.events.iter().enumerate() {
            if event.duration <= f32::EPSILON {
                continue;
            }
            if event.start + event.duration >= progress {
                return SyncTrackTime {
                    event_index: index as u32,
                    percent: ((progress - event.start) / event.duration).clamp(0.0, 1.0),
                };
            }
        }
        // Float drift can push the final event's end slightly below 1.0.
        SyncTrackTime {
            event_index: (self.events.len() - 1) as u32,
            percent: 1.0,
        }
    }

    /// Maps a sync time back to a normalized track position.
    pub fn get_percentage_through(&self, time: SyncTrackTime) -> Percentage {
        let index = (time.event_index as usize).min(self.events.len() - 1);
        let event = &self.events[index];
        event.start + event.duration * time.percent
    }

    /// Blends two sync tracks. Event durations are interpolated pairwise and
    /// names are taken from the dominant side. Returns `None` when the event
    /// counts differ; callers turn that into a typed error carrying their node
    /// index.
    pub fn blend(source: &SyncTrack, target: &SyncTrack, weight: f32) -> Option<SyncTrack> {
        debug_assert!((0.0..=1.0).contains(&weight));
        if source.events.len() != target.events.len() {
            return None;
        }

        let mut events = Vec::with_capacity(source.events.len());
        let mut start = 0.0;
        for (source_event, target_event) in source.events.iter().zip(target.events.iter()) {
            let duration = lerpf(source_event.duration, target_event.duration, weight);
            events.push(SyncEvent {
                id: if weight <= 0.5 {
                    source_event.id
                } else {
                    target_event.id
                },
                start,
                duration,
            });
            start += duration;
        }
        Some(SyncTrack { events })
    }

    /// Duration in seconds of a blend whose children follow `source_track` and
    /// `target_track`: each side's seconds-duration is scaled by the ratio of
    /// blended-to-source event counts, then interpolated.
    pub fn calculate_synchronized_track_duration(
        source_duration: Seconds,
        target_duration: Seconds,
        source_track: &SyncTrack,
        target_track: &SyncTrack,
        blended_track: &SyncTrack,
        weight: f32,
    ) -> Seconds {
        let scaled_source = source_duration
            * (blended_track.event_count() as f32 / source_track.event_count() as f32);
        let scaled_target = target_duration
            * (blended_track.event_count() as f32 / target_track.event_count() as f32);
        lerpf(scaled_source, scaled_target, weight)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_track_is_one_full_event() {
        let track = SyncTrack::default();
        assert_eq!(track.event_count(), 1);
        let time = track.get_time(0.3);
        assert_eq!(time.event_index, 0);
        assert!((time.percent - 0.3).abs() < 1e-6);
    }

    #[test]
    fn get_time_resolves_boundaries_to_the_earlier_event() {
        let track = SyncTrack::with_equal_events(4);
        let time = track.get_time(0.5);
        assert_eq!(time.event_index, 1);
        assert!((time.percent - 1.0).abs() < 1e-6);

        let time = track.get_time(0.6);
        assert_eq!(time.event_index, 2);
        assert!((time.percent - 0.4).abs() < 1e-4);

        let time = track.get_time(0.0);
        assert_eq!(time.event_index, 0);
        assert_eq!(time.percent, 0.0);

        let time = track.get_time(1.0);
        assert_eq!(time.event_index, 3);
        assert!((time.percent - 1.0).abs() < 1e-6);
    }

    #[test]
    fn percentage_round_trips_through_sync_time() {
        let tracks = [
            SyncTrack::default(),
            SyncTrack::with_equal_events(4),
            SyncTrack::from_durations(vec![
                (StringId::from_name("a"), 0.1),
                (StringId::from_name("b"), 0.6),
                (StringId::from_name("c"), 0.3),
            ]),
        ];
        for track in &tracks {
            for i in 0..=100 {
                let p = i as f32 / 100.0;
                let round_tripped = track.get_percentage_through(track.get_time(p));
                assert!(
                    (round_tripped - p).abs() < 1e-5,
                    "p = {p}, got {round_tripped}"
                );
            }
        }
    }

    #[test]
    fn blend_interpolates_durations_and_keeps_event_count() {
        let a = SyncTrack::from_durations(vec![
            (StringId::from_name("l"), 0.25),
            (StringId::from_name("r"), 0.75),
        ]);
        let b = SyncTrack::from_durations(vec![
            (StringId::from_name("l2"), 0.75),
            (StringId::from_name("r2"), 0.25),
        ]);
        for w in [0.0, 0.25, 0.5, 0.75, 1.0] {
            let blended = SyncTrack::blend(&a, &b, w).unwrap();
            assert_eq!(blended.event_count(), a.event_count());
            assert!((blended.events()[0].duration - lerpf(0.25, 0.75, w)).abs() < 1e-6);
        }
        // Names follow the dominant side.
        let blended = SyncTrack::blend(&a, &b, 0.4).unwrap();
        assert_eq!(blended.events()[0].id, StringId::from_name("l"));
        let blended = SyncTrack::blend(&a, &b, 0.6).unwrap();
        assert_eq!(blended.events()[0].id, StringId::from_name("l2"));
    }

    #[test]
    fn blend_rejects_mismatched_event_counts() {
        let a = SyncTrack::with_equal_events(2);
        let b = SyncTrack::with_equal_events(3);
        assert!(SyncTrack::blend(&a, &b, 0.5).is_none());
    }

    #[test]
    fn synchronized_duration_matches_lerp_for_equal_counts() {
        let a = SyncTrack::with_equal_events(4);
        let b = SyncTrack::with_equal_events(4);
        let blended = SyncTrack::blend(&a, &b, 0.5).unwrap();
        let duration =
            SyncTrack::calculate_synchronized_track_duration(2.0, 1.0, &a, &b, &blended, 0.5);
        assert!((duration - 1.5).abs() < 1e-6);
    }
}
