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

//! Local-space pose blending.

use crate::{mask::BoneMask, math::Transform, pose::Pose, BoneIndex};

/// Per-bone blend weight: the node weight scaled by the bone's mask weight.
#[inline]
fn bone_blend_weight(blend_weight: f32, mask: Option<&BoneMask>, bone: BoneIndex) -> f32 {
    match mask {
        Some(mask) => blend_weight * mask.bone_weight(bone),
        None => blend_weight,
    }
}

/// Interpolatively blends `target` into `source` in local bone space, writing
/// the result over `source`. A weight of zero keeps the source pose, one
/// yields the target pose. Rotation uses Slerp, translation and scale Lerp.
///
/// A mask shorter or longer than the pose degrades gracefully: missing
/// weights count as one, excess weights are never read.
pub fn blend_in_place(
    source: &mut Pose,
    target: &Pose,
    blend_weight: f32,
    mask: Option<&BoneMask>,
) {
    debug_assert!((0.0..=1.0).contains(&blend_weight));
    debug_assert_eq!(source.bone_count(), target.bone_count());

    if let Some(mask) = mask {
        if mask.weight_count() != source.bone_count() {
            log::warn!(
                "bone mask has {} weights for {} bones; missing weights count as 1",
                mask.weight_count(),
                source.bone_count()
            );
        }
    }

    let bone_count = source.bone_count().min(target.bone_count());
    for bone in 0..bone_count as BoneIndex {
        let weight = bone_blend_weight(blend_weight, mask, bone);
        if weight == 0.0 {
            continue;
        }
        let blended = Transform::interpolate(
            source.transform(bone),
            target.transform(bone),
            weight,
        );
        source.set_transform(bone, blended);
    }
    source.mark_sampled();
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        pose::InitialPoseState,
        skeleton::Skeleton,
    };
    use nalgebra::Vector3;
    use std::sync::Arc;

    fn skeleton() -> Arc<Skeleton> {
        Arc::new(
            Skeleton::new(
                vec![
                    ("a".to_string(), None),
                    ("b".to_string(), Some(0)),
                    ("c".to_string(), Some(1)),
                ],
                vec![Transform::identity(); 3],
            )
            .unwrap(),
        )
    }

    fn poses() -> (Pose, Pose) {
        let skeleton = skeleton();
        let mut source = Pose::new(skeleton.clone(), InitialPoseState::Reference);
        let mut target = Pose::new(skeleton, InitialPoseState::Reference);
        for bone in 0..3 {
            source.set_translation(bone, Vector3::new(0.0, 0.0, 0.0));
            target.set_translation(bone, Vector3::new(2.0, 0.0, 0.0));
        }
        (source, target)
    }

    #[test]
    fn weight_zero_keeps_source_and_weight_one_yields_target() {
        let (mut source, target) = poses();
        blend_in_place(&mut source, &target, 0.0, None);
        assert_eq!(source.transform(1).translation.x, 0.0);

        let (mut source, target) = poses();
        blend_in_place(&mut source, &target, 1.0, None);
        for bone in 0..3 {
            assert!((source.transform(bone).translation.x - 2.0).abs() < 1e-6);
        }
    }

    #[test]
    fn midpoint_blend_is_halfway() {
        let (mut source, target) = poses();
        blend_in_place(&mut source, &target, 0.5, None);
        assert!((source.transform(0).translation.x - 1.0).abs() < 1e-6);
    }

    #[test]
    fn masked_out_bones_keep_the_source_transform() {
        let (mut source, target) = poses();
        let mask = BoneMask::new(vec![0.0, 1.0, 0.5]);
        blend_in_place(&mut source, &target, 1.0, Some(&mask));
        assert_eq!(source.transform(0).translation.x, 0.0);
        assert!((source.transform(1).translation.x - 2.0).abs() < 1e-6);
        assert!((source.transform(2).translation.x - 1.0).abs() < 1e-6);
    }
}
