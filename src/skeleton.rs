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

//! Bone hierarchy and reference poses.

use crate::{error::GraphError, math::Transform, BoneIndex};

/// A single bone of a skeleton.
#[derive(Debug, Clone)]
pub struct Bone {
    index: BoneIndex,
    parent: Option<BoneIndex>,
    children: Vec<BoneIndex>,
    name: String,
}

impl Bone {
    /// Index of this bone in its skeleton.
    #[inline]
    pub fn index(&self) -> BoneIndex {
        self.index
    }

    /// Index of the parent bone, `None` for the root.
    #[inline]
    pub fn parent(&self) -> Option<BoneIndex> {
        self.parent
    }

    /// Indices of the direct children of this bone.
    #[inline]
    pub fn children(&self) -> &[BoneIndex] {
        &self.children
    }

    /// Name of the bone.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if this bone has no parent.
    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// An immutable, ordered bone hierarchy with its reference pose.
///
/// A parent bone always precedes its children in the bone list, so walking the
/// list front to back visits parents before children. The skeleton carries the
/// authored local-space reference pose and the character-space reference pose
/// derived from it.
#[derive(Debug)]
pub struct Skeleton {
    bones: Vec<Bone>,
    local_reference_pose: Vec<Transform>,
    global_reference_pose: Vec<Transform>,
}

impl Skeleton {
    /// Builds a skeleton from `(name, parent)` pairs (in bone-index order) and
    /// a local-space reference pose with one transform per bone.
    ///
    /// Fails if a bone references a parent at an equal or later index, or if
    /// the reference pose length does not match the bone count.
    pub fn new(
        bones: Vec<(String, Option<BoneIndex>)>,
        local_reference_pose: Vec<Transform>,
    ) -> Result<Self, GraphError> {
        if bones.len() != local_reference_pose.len() {
            return Err(GraphError::InvalidDefinition(format!(
                "reference pose has {} transforms for {} bones",
                local_reference_pose.len(),
                bones.len()
            )));
        }

        let mut built = Vec::with_capacity(bones.len());
        for (index, (name, parent)) in bones.into_iter().enumerate() {
            let index = index as BoneIndex;
            if let Some(parent) = parent {
                if parent >= index {
                    return Err(GraphError::MalformedSkeleton { bone: index });
                }
            }
            built.push(Bone {
                index,
                parent,
                children: Vec::new(),
                name,
            });
        }
        for index in 0..built.len() {
            if let Some(parent) = built[index].parent {
                built[parent as usize].children.push(index as BoneIndex);
            }
        }

        let global_reference_pose = compose_global(&built, &local_reference_pose);

        Ok(Self {
            bones: built,
            local_reference_pose,
            global_reference_pose,
        })
    }

    /// Number of bones.
    #[inline]
    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    /// All bones in index order.
    #[inline]
    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    /// Borrows a bone by index.
    #[inline]
    pub fn bone(&self, index: BoneIndex) -> Option<&Bone> {
        self.bones.get(index as usize)
    }

    /// Parent index of a bone, `None` for the root or for an invalid index.
    #[inline]
    pub fn parent_of(&self, index: BoneIndex) -> Option<BoneIndex> {
        self.bones.get(index as usize).and_then(|b| b.parent)
    }

    /// Finds a bone by name.
    pub fn find_bone_by_name(&self, name: &str) -> Option<&Bone> {
        self.bones.iter().find(|b| b.name == name)
    }

    /// The authored local-space reference pose.
    #[inline]
    pub fn local_reference_pose(&self) -> &[Transform] {
        &self.local_reference_pose
    }

    /// The character-space reference pose derived from the local one.
    #[inline]
    pub fn global_reference_pose(&self) -> &[Transform] {
        &self.global_reference_pose
    }
}

fn compose_global(bones: &[Bone], local: &[Transform]) -> Vec<Transform> {
    let mut global = local.to_vec();
    for index in 0..bones.len() {
        if let Some(parent) = bones[index].parent {
            global[index] = global[parent as usize].compose(&local[index]);
        }
    }
    global
}

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::Vector3;

    fn chain(names: &[&str]) -> Skeleton {
        let bones = names
            .iter()
            .enumerate()
            .map(|(i, n)| {
                (
                    n.to_string(),
                    if i == 0 { None } else { Some(i as u32 - 1) },
                )
            })
            .collect();
        let reference = names
            .iter()
            .map(|_| Transform::from_translation(Vector3::new(0.0, 1.0, 0.0)))
            .collect();
        Skeleton::new(bones, reference).unwrap()
    }

    #[test]
    fn global_reference_pose_accumulates_down_the_chain() {
        let skeleton = chain(&["root", "spine", "head"]);
        let global = skeleton.global_reference_pose();
        assert!((global[0].translation.y - 1.0).abs() < 1e-6);
        assert!((global[1].translation.y - 2.0).abs() < 1e-6);
        assert!((global[2].translation.y - 3.0).abs() < 1e-6);
    }

    #[test]
    fn parent_must_precede_child() {
        let result = Skeleton::new(
            vec![("a".to_string(), Some(1)), ("b".to_string(), None)],
            vec![Transform::identity(), Transform::identity()],
        );
        assert!(matches!(
            result,
            Err(GraphError::MalformedSkeleton { bone: 0 })
        ));
    }

    #[test]
    fn children_are_backfilled() {
        let skeleton = chain(&["root", "spine", "head"]);
        assert_eq!(skeleton.bone(0).unwrap().children(), &[1]);
        assert!(skeleton.bone(0).unwrap().is_root());
        assert_eq!(skeleton.find_bone_by_name("head").unwrap().index(), 2);
    }
}
