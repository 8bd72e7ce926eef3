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

//! Keyed transform tracks, the decoded form of per-bone animation data.

use crate::{math::Transform, BoneIndex, Seconds};

/// A single key of a bone track.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TrackKey {
    /// Time of the key in seconds from clip start.
    pub time: Seconds,
    /// Local-space transform at that time.
    pub transform: Transform,
}

/// A sequence of transform keys for one bone, sorted by time.
///
/// Compression is an asset-pipeline concern; the engine only ever sees decoded
/// keys and the `sample(time)` contract.
#[derive(Clone, Debug)]
pub struct BoneTrack {
    bone: BoneIndex,
    keys: Vec<TrackKey>,
}

impl BoneTrack {
    /// Creates a track for a bone. Keys are sorted by time on construction.
    pub fn new(bone: BoneIndex, mut keys: Vec<TrackKey>) -> Self {
        keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { bone, keys }
    }

    /// The bone this track animates.
    #[inline]
    pub fn bone(&self) -> BoneIndex {
        self.bone
    }

    /// Number of keys.
    #[inline]
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// The keys, in time order.
    #[inline]
    pub fn keys(&self) -> &[TrackKey] {
        &self.keys
    }

    /// Time of the last key, which is the track's extent in seconds.
    #[inline]
    pub fn duration(&self) -> Seconds {
        self.keys.last().map(|k| k.time).unwrap_or(0.0)
    }

    /// Samples the track at a time, clamping outside the keyed range and
    /// interpolating between the two neighboring keys inside it.
    pub fn sample(&self, time: Seconds) -> Transform {
        let Some(first) = self.keys.first() else {
            return Transform::identity();
        };
        if time <= first.time {
            return first.transform;
        }
        let last = &self.keys[self.keys.len() - 1];
        if time >= last.time {
            return last.transform;
        }

        // partition_point finds the first key strictly after `time`; the
        // early-outs above guarantee both neighbors exist.
        let after = self.keys.partition_point(|k| k.time <= time);
        let a = &self.keys[after - 1];
        let b = &self.keys[after];
        let span = b.time - a.time;
        if span <= f32::EPSILON {
            return b.transform;
        }
        let t = (time - a.time) / span;
        Transform::interpolate(&a.transform, &b.transform, t)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::Vector3;

    fn linear_track() -> BoneTrack {
        BoneTrack::new(
            0,
            vec![
                TrackKey {
                    time: 0.0,
                    transform: Transform::from_translation(Vector3::new(0.0, 0.0, 0.0)),
                },
                TrackKey {
                    time: 1.0,
                    transform: Transform::from_translation(Vector3::new(2.0, 0.0, 0.0)),
                },
                TrackKey {
                    time: 2.0,
                    transform: Transform::from_translation(Vector3::new(2.0, 4.0, 0.0)),
                },
            ],
        )
    }

    #[test]
    fn sample_interpolates_between_keys() {
        let track = linear_track();
        let mid = track.sample(0.5);
        assert!((mid.translation.x - 1.0).abs() < 1e-6);
        let mid = track.sample(1.5);
        assert!((mid.translation.y - 2.0).abs() < 1e-6);
    }

    #[test]
    fn sample_clamps_outside_key_range() {
        let track = linear_track();
        assert_eq!(track.sample(-1.0).translation.x, 0.0);
        assert_eq!(track.sample(10.0).translation.y, 4.0);
        assert_eq!(track.duration(), 2.0);
    }

    #[test]
    fn keys_are_sorted_on_construction() {
        let track = BoneTrack::new(
            3,
            vec![
                TrackKey {
                    time: 1.0,
                    transform: Transform::identity(),
                },
                TrackKey {
                    time: 0.0,
                    transform: Transform::from_translation(Vector3::new(1.0, 0.0, 0.0)),
                },
            ],
        );
        assert_eq!(track.keys()[0].time, 0.0);
        assert_eq!(track.bone(), 3);
    }
}
