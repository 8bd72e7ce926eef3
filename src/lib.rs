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

//! Runtime animation graph engine for real-time character animation.
//!
//! Given a compiled graph of typed nodes, per-frame control parameter values, a
//! time delta and a target skeleton, the engine produces a skinned pose in
//! character-local space, a root-motion delta transform and a stream of sampled
//! animation events. See [`graph::GraphInstance`] for the entry point.
//!
//! The engine is split into an immutable, shareable [`graph::GraphDefinition`]
//! (node settings, dataset descriptor, root index) and a per-character
//! [`graph::GraphInstance`] (runtime node state, task system, pose buffers,
//! sampled events). Pose nodes never do pose math during the graph walk; they
//! register deferred tasks into the [`task::TaskSystem`] which executes them in
//! dependency order once the walk is over.

#![warn(missing_docs)]

pub mod blender;
pub mod clip;
pub mod dataset;
pub mod error;
pub mod event;
pub mod graph;
pub mod mask;
pub mod math;
pub mod pose;
pub mod skeleton;
pub mod sync_track;
pub mod task;
pub mod track;

pub use error::GraphError;
pub use math::Transform;

/// Time measured in seconds.
pub type Seconds = f32;

/// Normalized time, a fraction of some duration in `[0, 1]`.
pub type Percentage = f32;

/// Index of a bone in a [`skeleton::Skeleton`].
pub type BoneIndex = u32;

/// Index of a node in a graph definition and in the parallel runtime node array.
pub type NodeIndex = u32;

/// Index of a registered task in the per-frame task list.
pub type TaskIndex = u32;

/// Sentinel for "no index" in the on-disk format and in pose buffer ownership.
pub const INVALID_INDEX: u32 = u32::MAX;

/// A 64-bit name hash used wherever the engine refers to things by name: event
/// IDs, control parameter names, sync event names.
///
/// The compiled graph format stores only hashes; [`StringId::from_name`] must
/// therefore be stable across builds, which `fxhash` guarantees for a given
/// crate version.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StringId(pub u64);

impl StringId {
    /// The empty ID, used as "no event" / "no name" marker. Hash value zero is
    /// reserved for it.
    pub const NONE: StringId = StringId(0);

    /// Hashes a name into its ID.
    pub fn from_name(name: &str) -> Self {
        Self(fxhash::hash64(name.as_bytes()))
    }

    /// Returns `true` if this is the reserved empty ID.
    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if this is a real ID.
    pub fn is_some(&self) -> bool {
        self.0 != 0
    }
}

#[cfg(test)]
mod test {
    use super::StringId;

    #[test]
    fn string_id_is_stable_for_equal_names() {
        assert_eq!(StringId::from_name("Jump"), StringId::from_name("Jump"));
        assert_ne!(StringId::from_name("Jump"), StringId::from_name("Run"));
        assert!(StringId::from_name("Jump").is_some());
        assert!(StringId::NONE.is_none());
    }
}
