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

//! Per-skeleton bundles of local bone transforms.

use crate::{math::Transform, skeleton::Skeleton, BoneIndex};
use nalgebra::{UnitQuaternion, Vector3};
use std::sync::Arc;

/// What a pose currently holds.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum PoseState {
    /// Storage allocated, contents meaningless.
    #[default]
    Unset,
    /// The skeleton's reference pose.
    Reference,
    /// All transforms zeroed.
    Zero,
    /// A delta pose meant to be applied on top of another pose.
    Additive,
    /// A sampled or blended pose.
    Pose,
}

/// Initial contents requested when creating or resetting a pose.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum InitialPoseState {
    /// Leave the transforms untouched and mark the pose unset.
    #[default]
    None,
    /// Fill with the skeleton's reference pose.
    Reference,
    /// Zero every component, including scale.
    Zero,
}

/// A mutable bundle of local-space bone transforms for one skeleton, with an
/// optional cache of character-space transforms.
///
/// Poses are deliberately not `Clone`: buffers holding them are pooled and
/// recycled, and accidental deep copies of a few hundred transforms are easy
/// to introduce otherwise. The only way to copy one is [`Pose::clone_from`].
#[derive(Debug)]
pub struct Pose {
    skeleton: Arc<Skeleton>,
    local: Vec<Transform>,
    global: Vec<Transform>,
    state: PoseState,
}

impl Pose {
    /// Creates a pose for the given skeleton with the requested initial
    /// contents.
    pub fn new(skeleton: Arc<Skeleton>, initial: InitialPoseState) -> Self {
        let mut pose = Self {
            local: vec![Transform::identity(); skeleton.bone_count()],
            global: Vec::new(),
            state: PoseState::Unset,
            skeleton,
        };
        pose.reset(initial);
        pose
    }

    /// Resets the pose to the requested initial contents and drops the global
    /// transform cache.
    pub fn reset(&mut self, initial: InitialPoseState) {
        self.global.clear();
        match initial {
            InitialPoseState::None => {
                self.state = PoseState::Unset;
            }
            InitialPoseState::Reference => {
                self.local
                    .copy_from_slice(self.skeleton.local_reference_pose());
                self.state = PoseState::Reference;
            }
            InitialPoseState::Zero => {
                let zero = Transform::new(
                    Vector3::zeros(),
                    UnitQuaternion::identity(),
                    Vector3::zeros(),
                );
                self.local.fill(zero);
                self.state = PoseState::Zero;
            }
        }
    }

    /// Deep-copies another pose of the same skeleton into this one.
    pub fn clone_from(&mut self, other: &Pose) {
        debug_assert_eq!(self.local.len(), other.local.len());
        self.local.copy_from_slice(&other.local);
        self.global.clear();
        self.global.extend_from_slice(&other.global);
        self.state = other.state;
    }

    /// The skeleton this pose belongs to.
    #[inline]
    pub fn skeleton(&self) -> &Arc<Skeleton> {
        &self.skeleton
    }

    /// Number of bone transforms.
    #[inline]
    pub fn bone_count(&self) -> usize {
        self.local.len()
    }

    /// Current pose state.
    #[inline]
    pub fn state(&self) -> PoseState {
        self.state
    }

    /// Returns `true` if the pose holds meaningful data.
    #[inline]
    pub fn is_set(&self) -> bool {
        self.state != PoseState::Unset
    }

    /// Marks the pose as holding sampled/blended data. Mutating accessors call
    /// this implicitly.
    #[inline]
    pub fn mark_sampled(&mut self) {
        self.state = PoseState::Pose;
    }

    /// Local transform of a bone.
    #[inline]
    pub fn transform(&self, bone: BoneIndex) -> &Transform {
        &self.local[bone as usize]
    }

    /// All local transforms.
    #[inline]
    pub fn transforms(&self) -> &[Transform] {
        &self.local
    }

    /// Overwrites the local transform of a bone and invalidates the global
    /// cache.
    #[inline]
    pub fn set_transform(&mut self, bone: BoneIndex, transform: Transform) {
        self.local[bone as usize] = transform;
        self.global.clear();
        self.state = PoseState::Pose;
    }

    /// Overwrites the translation of a bone.
    #[inline]
    pub fn set_translation(&mut self, bone: BoneIndex, translation: Vector3<f32>) {
        self.local[bone as usize].translation = translation;
        self.global.clear();
        self.state = PoseState::Pose;
    }

    /// Overwrites the rotation of a bone.
    #[inline]
    pub fn set_rotation(&mut self, bone: BoneIndex, rotation: UnitQuaternion<f32>) {
        self.local[bone as usize].rotation = rotation;
        self.global.clear();
        self.state = PoseState::Pose;
    }

    /// Overwrites the scale of a bone.
    #[inline]
    pub fn set_scale(&mut self, bone: BoneIndex, scale: Vector3<f32>) {
        self.local[bone as usize].scale = scale;
        self.global.clear();
        self.state = PoseState::Pose;
    }

    /// Returns `true` if character-space transforms are cached.
    #[inline]
    pub fn has_global_transforms(&self) -> bool {
        !self.global.is_empty()
    }

    /// Composes and caches character-space transforms from the local ones.
    /// Parents are guaranteed to precede children, so a single forward pass
    /// suffices.
    pub fn calculate_global_transforms(&mut self) {
        self.global.clear();
        self.global.extend_from_slice(&self.local);
        for index in 0..self.global.len() {
            if let Some(parent) = self.skeleton.parent_of(index as BoneIndex) {
                self.global[index] = self.global[parent as usize].compose(&self.local[index]);
            }
        }
    }

    /// Cached character-space transforms, empty until
    /// [`Pose::calculate_global_transforms`] ran.
    #[inline]
    pub fn global_transforms(&self) -> &[Transform] {
        &self.global
    }

    /// Cached character-space transform of one bone, if the cache is built.
    #[inline]
    pub fn global_transform(&self, bone: BoneIndex) -> Option<&Transform> {
        self.global.get(bone as usize)
    }

    /// Drops the global transform cache.
    #[inline]
    pub fn clear_global_transforms(&mut self) {
        self.global.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::skeleton::Skeleton;

    fn chain() -> Arc<Skeleton> {
        Arc::new(
            Skeleton::new(
                vec![
                    ("root".to_string(), None),
                    ("spine".to_string(), Some(0)),
                    ("head".to_string(), Some(1)),
                ],
                vec![Transform::from_translation(Vector3::new(0.0, 1.0, 0.0)); 3],
            )
            .unwrap(),
        )
    }

    #[test]
    fn new_reference_pose_matches_skeleton() {
        let skeleton = chain();
        let pose = Pose::new(skeleton.clone(), InitialPoseState::Reference);
        assert_eq!(pose.state(), PoseState::Reference);
        assert_eq!(pose.transforms(), skeleton.local_reference_pose());
    }

    #[test]
    fn global_transforms_compose_parent_chain() {
        let mut pose = Pose::new(chain(), InitialPoseState::Reference);
        assert!(!pose.has_global_transforms());
        pose.calculate_global_transforms();
        let global = pose.global_transforms();
        assert!((global[2].translation.y - 3.0).abs() < 1e-6);
    }

    #[test]
    fn mutation_invalidates_global_cache_and_marks_sampled() {
        let mut pose = Pose::new(chain(), InitialPoseState::Reference);
        pose.calculate_global_transforms();
        pose.set_translation(1, Vector3::new(5.0, 0.0, 0.0));
        assert!(!pose.has_global_transforms());
        assert_eq!(pose.state(), PoseState::Pose);
    }

    #[test]
    fn clone_from_copies_contents() {
        let skeleton = chain();
        let mut a = Pose::new(skeleton.clone(), InitialPoseState::Reference);
        let mut b = Pose::new(skeleton, InitialPoseState::None);
        a.set_translation(2, Vector3::new(0.0, 9.0, 0.0));
        b.clone_from(&a);
        assert_eq!(b.transform(2).translation.y, 9.0);
        assert_eq!(b.state(), PoseState::Pose);
    }
}
