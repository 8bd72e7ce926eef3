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

//! Deferred pose tasks.
//!
//! Pose nodes never touch pose memory during the graph walk. Instead they
//! register tasks here, forming a little DAG per frame: sample tasks at the
//! leaves, blend tasks above them. After the walk, [`TaskSystem::execute`]
//! runs the tasks in registration order (dependencies are always registered
//! before their dependents) drawing buffers from the pose buffer pool.

pub mod blend;
pub mod pose_buffer;
pub mod sample;

pub use blend::BlendTask;
pub use pose_buffer::{PoseBuffer, PoseBufferIndex, PoseBufferPool};
pub use sample::SampleTask;

use crate::{error::GraphError, mask::BoneMaskPool, pose::Pose, skeleton::Skeleton, TaskIndex};
use std::sync::Arc;

/// An atomic deferred pose operation.
#[derive(Debug)]
pub enum Task {
    /// Produce a pose by sampling a clip.
    Sample(SampleTask),
    /// Combine two produced poses.
    Blend(BlendTask),
}

impl Task {
    /// Task handles this task consumes, in dependency-slot order.
    pub fn dependencies(&self) -> &[TaskIndex] {
        match self {
            Task::Sample(_) => &[],
            Task::Blend(blend) => blend.dependencies(),
        }
    }
}

/// Execution-time services handed to a task: the buffer pool, the frame's
/// scratch masks and the resolved output buffers of the task's dependencies.
pub struct TaskContext<'a> {
    task_index: TaskIndex,
    pub(crate) pool: &'a mut PoseBufferPool,
    pub(crate) masks: &'a BoneMaskPool,
    dependency_buffers: Vec<PoseBufferIndex>,
}

impl TaskContext<'_> {
    /// Claims a fresh buffer owned by the executing task.
    pub fn get_new_pose_buffer(&mut self) -> PoseBufferIndex {
        self.pool.first_available(self.task_index)
    }

    /// Reads a dependency's output buffer without changing its ownership.
    pub fn access_dependency_pose_buffer(
        &self,
        dependency: usize,
    ) -> Result<PoseBufferIndex, GraphError> {
        self.dependency_buffers
            .get(dependency)
            .copied()
            .ok_or(GraphError::TaskDependency {
                task: self.task_index,
            })
    }

    /// Takes ownership of a dependency's output buffer.
    pub fn transfer_dependency_pose_buffer(
        &mut self,
        dependency: usize,
    ) -> Result<PoseBufferIndex, GraphError> {
        let buffer = self.access_dependency_pose_buffer(dependency)?;
        self.pool.get_mut(buffer).owner = self.task_index;
        Ok(buffer)
    }

    /// Returns a dependency's output buffer to the pool.
    pub fn release_dependency_pose_buffer(
        &mut self,
        dependency: usize,
    ) -> Result<(), GraphError> {
        let buffer = self.access_dependency_pose_buffer(dependency)?;
        self.pool.release(buffer);
        Ok(())
    }
}

/// The per-instance task list, pose buffer pool and scratch mask pool.
///
/// Single-threaded by design: one task system belongs to one graph instance,
/// and parallelism across characters comes from evaluating instances on
/// different threads.
#[derive(Debug, Default)]
pub struct TaskSystem {
    tasks: Vec<Task>,
    outputs: Vec<Option<PoseBufferIndex>>,
    pool: PoseBufferPool,
    masks: BoneMaskPool,
}

impl TaskSystem {
    /// Binds the pose buffer pool to the instance's skeleton.
    pub fn initialize(&mut self, skeleton: Arc<Skeleton>) {
        self.pool.initialize(skeleton);
        self.tasks.clear();
        self.outputs.clear();
        self.masks.reset();
    }

    /// Drops the frame's tasks and returns every buffer and mask to its pool.
    /// Called at the start of each evaluation, and to discard a partially
    /// registered frame after a fatal error.
    pub fn reset(&mut self) {
        self.tasks.clear();
        self.outputs.clear();
        self.pool.release_all();
        self.masks.reset();
    }

    /// Registers a task and returns its handle. Dependencies must already be
    /// registered, which keeps the task list topologically ordered.
    pub fn register(&mut self, task: Task) -> TaskIndex {
        debug_assert!(task
            .dependencies()
            .iter()
            .all(|d| (*d as usize) < self.tasks.len()));
        let index = self.tasks.len() as TaskIndex;
        self.tasks.push(task);
        self.outputs.push(None);
        index
    }

    /// Number of tasks registered this frame.
    #[inline]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// The registered tasks in registration order.
    #[inline]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// The frame's scratch mask pool.
    #[inline]
    pub fn mask_pool_mut(&mut self) -> &mut BoneMaskPool {
        &mut self.masks
    }

    /// The pose buffer pool, for inspection.
    #[inline]
    pub fn pose_buffer_pool(&self) -> &PoseBufferPool {
        &self.pool
    }

    /// Executes every registered task in order and returns the output buffer
    /// of `final_task`. On success that buffer is the only one still owned.
    pub fn execute(&mut self, final_task: TaskIndex) -> Result<PoseBufferIndex, GraphError> {
        for index in 0..self.tasks.len() {
            let task = &self.tasks[index];
            let mut dependency_buffers = Vec::with_capacity(task.dependencies().len());
            for dependency in task.dependencies() {
                let buffer = self.outputs[*dependency as usize].ok_or(GraphError::TaskDependency {
                    task: index as TaskIndex,
                })?;
                dependency_buffers.push(buffer);
            }

            let mut ctx = TaskContext {
                task_index: index as TaskIndex,
                pool: &mut self.pool,
                masks: &self.masks,
                dependency_buffers,
            };
            let output = match task {
                Task::Sample(sample) => sample.execute(&mut ctx)?,
                Task::Blend(blend) => blend.execute(&mut ctx)?,
            };
            // Recording the output is what makes the task observable to its
            // dependents, i.e. the completion mark.
            self.outputs[index] = Some(output);
        }

        self.outputs
            .get(final_task as usize)
            .copied()
            .flatten()
            .ok_or(GraphError::TaskDependency { task: final_task })
    }

    /// The pose held by a buffer, once tasks have executed.
    #[inline]
    pub fn buffer_pose(&self, buffer: PoseBufferIndex) -> &Pose {
        &self.pool.get(buffer).pose
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        clip::AnimationClip,
        graph::definition::BlendOptions,
        math::Transform,
        skeleton::Skeleton,
        track::{BoneTrack, TrackKey},
        INVALID_INDEX,
    };
    use nalgebra::Vector3;

    fn skeleton() -> Arc<Skeleton> {
        Arc::new(
            Skeleton::new(
                vec![("root".to_string(), None)],
                vec![Transform::identity()],
            )
            .unwrap(),
        )
    }

    fn constant_clip(skeleton: Arc<Skeleton>, x: f32) -> Arc<AnimationClip> {
        Arc::new(AnimationClip::new(
            1,
            skeleton,
            vec![BoneTrack::new(
                0,
                vec![
                    TrackKey {
                        time: 0.0,
                        transform: Transform::from_translation(Vector3::new(x, 0.0, 0.0)),
                    },
                    TrackKey {
                        time: 1.0,
                        transform: Transform::from_translation(Vector3::new(x, 0.0, 0.0)),
                    },
                ],
            )],
            30,
        ))
    }

    #[test]
    fn sample_then_blend_leaves_exactly_one_owned_buffer() {
        let skeleton = skeleton();
        let mut system = TaskSystem::default();
        system.initialize(skeleton.clone());

        let a = system.register(Task::Sample(SampleTask::new(
            0,
            constant_clip(skeleton.clone(), 0.0),
            0.5,
        )));
        let b = system.register(Task::Sample(SampleTask::new(
            1,
            constant_clip(skeleton, 2.0),
            0.5,
        )));
        let blend = system.register(Task::Blend(BlendTask::new(
            2,
            a,
            b,
            0.5,
            BlendOptions::INTERPOLATIVE,
            None,
        )));

        let output = system.execute(blend).unwrap();
        assert!((system.buffer_pose(output).transform(0).translation.x - 1.0).abs() < 1e-6);
        assert_eq!(system.pose_buffer_pool().owned_count(), 1);
        assert_eq!(system.pose_buffer_pool().get(output).owner, blend);
    }

    #[test]
    fn reset_returns_all_buffers() {
        let skeleton = skeleton();
        let mut system = TaskSystem::default();
        system.initialize(skeleton.clone());
        let a = system.register(Task::Sample(SampleTask::new(0, constant_clip(skeleton, 1.0), 0.0)));
        system.execute(a).unwrap();
        assert_eq!(system.pose_buffer_pool().owned_count(), 1);
        system.reset();
        assert_eq!(system.pose_buffer_pool().owned_count(), 0);
        assert_eq!(system.task_count(), 0);
    }

    #[test]
    fn executing_with_an_unresolved_final_task_fails() {
        let mut system = TaskSystem::default();
        system.initialize(skeleton());
        assert!(matches!(
            system.execute(INVALID_INDEX),
            Err(GraphError::TaskDependency { .. })
        ));
    }
}
