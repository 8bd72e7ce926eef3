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

//! Typed errors produced by graph loading, instantiation and evaluation.

use crate::{BoneIndex, NodeIndex, TaskIndex};

/// Fatal errors of the animation graph engine.
///
/// An error returned from evaluation aborts the frame: partially registered
/// tasks are discarded and the previous frame's pose stays current. Conditions
/// that can be degraded gracefully (missing parameter names, bone mask length
/// mismatches, speed scaling under synchronization) are logged as warnings
/// instead and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A node was re-entered while it was already being updated. Node settings
    /// must form a DAG; only state machine transitions may loop, and those are
    /// arbitrated by the state machine itself rather than by recursion.
    #[error("cyclic node reference detected at node {node}")]
    CyclicGraph {
        /// Index of the node whose slot was re-entered.
        node: NodeIndex,
    },

    /// A required child reference was absent at evaluation time.
    #[error("node {node} is missing a required child node")]
    MissingChild {
        /// Index of the node with the dangling reference.
        node: NodeIndex,
    },

    /// A node index referenced a slot outside the node array.
    #[error("node index {node} is out of bounds (node count {count})")]
    NodeIndexOutOfBounds {
        /// The offending index.
        node: NodeIndex,
        /// Number of nodes in the graph.
        count: usize,
    },

    /// The runtime node stored in a slot does not match the settings variant
    /// the operation expected.
    #[error("node {node} is not of the expected kind")]
    NodeTypeMismatch {
        /// Index of the offending node.
        node: NodeIndex,
    },

    /// A value node was asked for a value of the wrong type.
    #[error("node {node} does not produce a {expected} value")]
    ValueTypeMismatch {
        /// Index of the offending node.
        node: NodeIndex,
        /// Name of the requested value type.
        expected: &'static str,
    },

    /// A pose was sampled from a clip bound to a different skeleton.
    #[error("skeleton mismatch: pose has {pose_bones} bones, clip targets {clip_bones}")]
    SkeletonMismatch {
        /// Bone count of the pose being filled.
        pose_bones: usize,
        /// Bone count of the clip's skeleton.
        clip_bones: usize,
    },

    /// Two sync tracks with different event counts were blended.
    #[error(
        "sync track event counts differ at node {node}: {source_events} vs {target_events}"
    )]
    SyncTrackMismatch {
        /// Index of the blending node.
        node: NodeIndex,
        /// Event count of the source track.
        source_events: usize,
        /// Event count of the target track.
        target_events: usize,
    },

    /// A bone's parent does not precede it in the skeleton's bone list.
    #[error("skeleton bone {bone} precedes its parent, hierarchy is not topologically ordered")]
    MalformedSkeleton {
        /// Index of the offending bone.
        bone: BoneIndex,
    },

    /// A task referenced a dependency that had not completed.
    #[error("task {task} depends on a task that produced no output")]
    TaskDependency {
        /// Index of the offending task.
        task: TaskIndex,
    },

    /// The runtime dataset does not match the descriptor compiled into the
    /// graph definition.
    #[error("dataset does not match the definition descriptor: {0}")]
    DatasetMismatch(String),

    /// The compiled definition stream is malformed.
    #[error("invalid graph definition: {0}")]
    InvalidDefinition(String),

    /// The instance was evaluated before [`crate::graph::GraphInstance::initialize`].
    #[error("graph instance is not initialized")]
    NotInitialized,

    /// An I/O error occurred while reading or writing a compiled definition.
    #[error("i/o error in graph definition stream")]
    Io(#[from] std::io::Error),
}
