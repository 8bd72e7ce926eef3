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

//! Transform math shared by poses, tracks and root motion.

use crate::Percentage;
use nalgebra::{UnitQuaternion, Vector3};

/// Linear interpolation between two scalars.
#[inline]
pub fn lerpf(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Returns `true` if `a` is within `epsilon` of zero.
#[inline]
pub fn is_near_zero(a: f32, epsilon: f32) -> bool {
    a.abs() <= epsilon
}

/// Wraps a normalized time into `[0, 1)` and reports how many whole loops were
/// crossed. Negative input (reverse playback) wraps from the other end; the
/// loop count is reported as an absolute number of crossings.
#[inline]
pub fn wrap_time(time: Percentage) -> (Percentage, u32) {
    let loops = time.floor();
    let wrapped = time - loops;
    (wrapped, loops.abs() as u32)
}

/// A translation/rotation/scale transform.
///
/// Composition applies scale first, then rotation, then translation, which is
/// the convention every local bone transform in the engine follows.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Transform {
    /// Translation component.
    pub translation: Vector3<f32>,
    /// Rotation component, always a unit quaternion.
    pub rotation: UnitQuaternion<f32>,
    /// Non-uniform scale component.
    pub scale: Vector3<f32>,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    /// Creates a new transform from its components.
    #[inline]
    pub fn new(
        translation: Vector3<f32>,
        rotation: UnitQuaternion<f32>,
        scale: Vector3<f32>,
    ) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    /// The identity transform.
    #[inline]
    pub fn identity() -> Self {
        Self {
            translation: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    /// Creates a pure translation.
    #[inline]
    pub fn from_translation(translation: Vector3<f32>) -> Self {
        Self {
            translation,
            ..Self::identity()
        }
    }

    /// Creates a pure rotation.
    #[inline]
    pub fn from_rotation(rotation: UnitQuaternion<f32>) -> Self {
        Self {
            rotation,
            ..Self::identity()
        }
    }

    /// Composes `self * child`: the child transform expressed in the space of
    /// `self`.
    #[inline]
    pub fn compose(&self, child: &Transform) -> Transform {
        Transform {
            translation: self.translation
                + self.rotation * self.scale.component_mul(&child.translation),
            rotation: self.rotation * child.rotation,
            scale: self.scale.component_mul(&child.scale),
        }
    }

    /// Returns the inverse transform, such that
    /// `t.inverse().compose(&t) == identity`. Zero scale components invert to
    /// zero rather than infinity.
    pub fn inverse(&self) -> Transform {
        let inv_scale = Vector3::new(
            safe_invert(self.scale.x),
            safe_invert(self.scale.y),
            safe_invert(self.scale.z),
        );
        let inv_rotation = self.rotation.inverse();
        let translation = -inv_scale.component_mul(&(inv_rotation * self.translation));
        Transform {
            translation,
            rotation: inv_rotation,
            scale: inv_scale,
        }
    }

    /// Interpolates between two transforms: Slerp for rotation, Lerp for
    /// translation and scale. `t == 0` yields `a`, `t == 1` yields `b`.
    #[inline]
    pub fn interpolate(a: &Transform, b: &Transform, t: f32) -> Transform {
        Transform {
            translation: a.translation.lerp(&b.translation, t),
            rotation: a.rotation.slerp(&b.rotation, t),
            scale: a.scale.lerp(&b.scale, t),
        }
    }
}

impl std::ops::Mul for Transform {
    type Output = Transform;

    fn mul(self, rhs: Transform) -> Transform {
        self.compose(&rhs)
    }
}

#[inline]
fn safe_invert(v: f32) -> f32 {
    if v.abs() <= f32::EPSILON {
        0.0
    } else {
        1.0 / v
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn assert_vec_eq(a: Vector3<f32>, b: Vector3<f32>) {
        assert!((a - b).norm() < 1e-5, "{a:?} != {b:?}");
    }

    #[test]
    fn compose_with_identity_is_a_no_op() {
        let t = Transform::new(
            Vector3::new(1.0, 2.0, 3.0),
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 0.5),
            Vector3::new(2.0, 2.0, 2.0),
        );
        let composed = Transform::identity().compose(&t);
        assert_vec_eq(composed.translation, t.translation);
        assert_vec_eq(composed.scale, t.scale);
    }

    #[test]
    fn compose_applies_parent_rotation_to_child_translation() {
        let parent =
            Transform::from_rotation(UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2));
        let child = Transform::from_translation(Vector3::new(1.0, 0.0, 0.0));
        let composed = parent.compose(&child);
        assert_vec_eq(composed.translation, Vector3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn inverse_cancels_composition() {
        let t = Transform::new(
            Vector3::new(1.0, -2.0, 0.5),
            UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.7),
            Vector3::new(2.0, 1.0, 0.5),
        );
        let id = t.inverse().compose(&t);
        assert_vec_eq(id.translation, Vector3::zeros());
        assert_vec_eq(id.scale, Vector3::new(1.0, 1.0, 1.0));
        assert!(id.rotation.angle() < 1e-5);
    }

    #[test]
    fn interpolate_endpoints_match_inputs() {
        let a = Transform::from_translation(Vector3::new(1.0, 0.0, 0.0));
        let b = Transform::from_translation(Vector3::new(3.0, 4.0, 0.0));
        assert_vec_eq(
            Transform::interpolate(&a, &b, 0.0).translation,
            a.translation,
        );
        assert_vec_eq(
            Transform::interpolate(&a, &b, 1.0).translation,
            b.translation,
        );
        assert_vec_eq(
            Transform::interpolate(&a, &b, 0.5).translation,
            Vector3::new(2.0, 2.0, 0.0),
        );
    }

    #[test]
    fn wrap_time_counts_whole_loops() {
        assert_eq!(wrap_time(0.25), (0.25, 0));
        let (wrapped, loops) = wrap_time(1.2);
        assert!((wrapped - 0.2).abs() < 1e-6);
        assert_eq!(loops, 1);
        let (wrapped, loops) = wrap_time(-0.25);
        assert!((wrapped - 0.75).abs() < 1e-6);
        assert_eq!(loops, 1);
    }
}
