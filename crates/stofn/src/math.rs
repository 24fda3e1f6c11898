//! # Math — Poses and Pose Masks
//!
//! We re-export [glam](https://docs.rs/glam) types so users don't need to
//! depend on it directly. On top of them sit two pose flavours:
//!
//! - [`RPose`]: rotation + position. Rigid, never carries scale. Physics
//!   bodies live here so scale can't leak into the simulation.
//! - [`HPose`]: rotation + position + non-uniform scale. Every hierarchy node
//!   has a local and a world `HPose`.
//!
//! ## Composition Without Shear
//!
//! Multiplying two 4x4 TRS matrices with non-uniform scale and rotation
//! produces skew terms that can't be represented as a TRS again. `HPose`
//! composes channel by channel instead:
//!
//! ```text
//! parent * child:
//!   rotation = parent.rotation * child.rotation
//!   position = parent.position + parent.rotation * (parent.scale * child.position)
//!   scale    = parent.scale * child.scale
//! ```
//!
//! This is exactly invertible ([`HPose::inverse_mul`]), which is what makes
//! rebasing a node under a new parent lossless. Every composed rotation is
//! renormalized, so repeated rebasing does not drift. The price is that
//! `(a * b).to_matrix()` is not `a.to_matrix() * b.to_matrix()` once scales
//! are non-uniform.
//!
//! ## Pose Masks
//!
//! A [`PoseMask`] freezes parent channels to identity when composing. A node
//! reparented with `PoseMask::IGNORE_SCALE` keeps its world size no matter
//! how its new parent is scaled.

use std::ops::Mul;

use bitflags::bitflags;
pub use glam::{Mat3, Mat4, Quat, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// A rigid pose: rotation and position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RPose {
    pub rotation: Quat,
    pub position: Vec3,
}

impl RPose {
    pub const IDENTITY: Self = Self {
        rotation: Quat::IDENTITY,
        position: Vec3::ZERO,
    };

    pub fn new(rotation: Quat, position: Vec3) -> Self {
        Self { rotation, position }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    pub fn from_rotation(rotation: Quat) -> Self {
        Self {
            rotation,
            ..Self::IDENTITY
        }
    }

    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.normalize().inverse();
        Self {
            rotation,
            position: rotation * -self.position,
        }
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position + self.rotation * point
    }

    pub fn transform_vector(&self, vector: Vec3) -> Vec3 {
        self.rotation * vector
    }

    pub fn inverse_transform_point(&self, point: Vec3) -> Vec3 {
        self.rotation.inverse() * (point - self.position)
    }

    pub fn inverse_transform_vector(&self, vector: Vec3) -> Vec3 {
        self.rotation.inverse() * vector
    }

    /// Local +X in world space.
    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    /// Local +Y in world space.
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// Local -Z in world space (right-handed, like `Mat4::look_at_rh`).
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }

    /// Normalized-quaternion blend for rotation, linear blend for position.
    ///
    /// `t = 0` yields `a`, `t = 1` yields `b`. Rotations take the shortest arc.
    pub fn nlerp(a: &Self, b: &Self, t: f32) -> Self {
        Self {
            // glam's Quat::lerp flips to the shortest arc and normalizes.
            rotation: a.rotation.lerp(b.rotation, t),
            position: a.position.lerp(b.position, t),
        }
    }

    pub fn is_nan(&self) -> bool {
        self.rotation.is_nan() || self.position.is_nan()
    }

    pub fn is_normalized(&self) -> bool {
        self.rotation.is_normalized()
    }

    /// Component-wise comparison. `q` and `-q` count as the same rotation.
    pub fn abs_diff_eq(&self, other: &Self, max_abs_diff: f32) -> bool {
        quat_eq(self.rotation, other.rotation, max_abs_diff)
            && self.position.abs_diff_eq(other.position, max_abs_diff)
    }
}

impl Default for RPose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for RPose {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self {
            rotation: (self.rotation * rhs.rotation).normalize(),
            position: self.transform_point(rhs.position),
        }
    }
}

/// A hierarchical pose: rotation, position and non-uniform scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HPose {
    pub rotation: Quat,
    pub position: Vec3,
    pub scale: Vec3,
}

impl HPose {
    pub const IDENTITY: Self = Self {
        rotation: Quat::IDENTITY,
        position: Vec3::ZERO,
        scale: Vec3::ONE,
    };

    pub fn new(rotation: Quat, position: Vec3, scale: Vec3) -> Self {
        Self {
            rotation,
            position,
            scale,
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    /// Create a pose at the given position.
    pub fn from_xyz(x: f32, y: f32, z: f32) -> Self {
        Self::from_position(Vec3::new(x, y, z))
    }

    pub fn from_rotation(rotation: Quat) -> Self {
        Self {
            rotation,
            ..Self::IDENTITY
        }
    }

    pub fn from_rigid(pose: RPose, scale: Vec3) -> Self {
        Self {
            rotation: pose.rotation,
            position: pose.position,
            scale,
        }
    }

    /// Drop the scale.
    pub fn rigid(&self) -> RPose {
        RPose::new(self.rotation, self.position)
    }

    /// Return a copy with `scale` replaced.
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// The pose that undoes `self`: `self * self.inverse() == IDENTITY`.
    ///
    /// Zero scale components produce non-finite results.
    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.normalize().inverse();
        let scale = self.scale.recip();
        Self {
            rotation,
            position: scale * (rotation * -self.position),
            scale,
        }
    }

    /// The `x` such that `self * x == rhs`.
    ///
    /// Cheaper and more precise than `self.inverse() * rhs`.
    ///
    /// An axis that `self` scales to zero has no solution. That axis of the
    /// result keeps `rhs`'s value unscaled, so the result stays finite.
    pub fn inverse_mul(&self, rhs: &Self) -> Self {
        let inv_rotation = self.rotation.normalize().inverse();
        let inv_scale = safe_recip(self.scale);
        Self {
            rotation: (inv_rotation * rhs.rotation).normalize(),
            position: (inv_rotation * (rhs.position - self.position)) * inv_scale,
            scale: rhs.scale * inv_scale,
        }
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position + self.rotation * (self.scale * point)
    }

    pub fn transform_vector(&self, vector: Vec3) -> Vec3 {
        self.rotation * (self.scale * vector)
    }

    pub fn inverse_transform_point(&self, point: Vec3) -> Vec3 {
        (self.rotation.inverse() * (point - self.position)) / self.scale
    }

    pub fn inverse_transform_vector(&self, vector: Vec3) -> Vec3 {
        (self.rotation.inverse() * vector) / self.scale
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    /// Compute the 4x4 model matrix (scale, then rotate, then translate).
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    pub fn is_nan(&self) -> bool {
        self.rotation.is_nan() || self.position.is_nan() || self.scale.is_nan()
    }

    pub fn is_normalized(&self) -> bool {
        self.rotation.is_normalized()
    }

    /// Component-wise comparison. `q` and `-q` count as the same rotation.
    pub fn abs_diff_eq(&self, other: &Self, max_abs_diff: f32) -> bool {
        quat_eq(self.rotation, other.rotation, max_abs_diff)
            && self.position.abs_diff_eq(other.position, max_abs_diff)
            && self.scale.abs_diff_eq(other.scale, max_abs_diff)
    }
}

impl Default for HPose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<RPose> for HPose {
    fn from(pose: RPose) -> Self {
        Self::from_rigid(pose, Vec3::ONE)
    }
}

impl Mul for HPose {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self {
            rotation: (self.rotation * rhs.rotation).normalize(),
            position: self.transform_point(rhs.position),
            scale: self.scale * rhs.scale,
        }
    }
}

/// `1 / v` per component, with zero components mapped to one.
fn safe_recip(v: Vec3) -> Vec3 {
    Vec3::select(v.cmpeq(Vec3::ZERO), Vec3::ONE, v.recip())
}

fn quat_eq(a: Quat, b: Quat, max_abs_diff: f32) -> bool {
    a.abs_diff_eq(b, max_abs_diff) || a.abs_diff_eq(-b, max_abs_diff)
}

bitflags! {
    /// Parent channels a node does not inherit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PoseMask: u8 {
        const IGNORE_POSITION = 1 << 0;
        const IGNORE_ROTATION = 1 << 1;
        const IGNORE_SCALE = 1 << 2;
    }
}

impl PoseMask {
    /// `pose` with the masked channels reset to identity.
    pub fn apply(self, pose: &HPose) -> HPose {
        let mut out = *pose;
        if self.contains(Self::IGNORE_POSITION) {
            out.position = Vec3::ZERO;
        }
        if self.contains(Self::IGNORE_ROTATION) {
            out.rotation = Quat::IDENTITY;
        }
        if self.contains(Self::IGNORE_SCALE) {
            out.scale = Vec3::ONE;
        }
        out
    }

    /// Rigid version of [`apply`](Self::apply). `IGNORE_SCALE` has nothing to do.
    pub fn apply_rigid(self, pose: &RPose) -> RPose {
        let mut out = *pose;
        if self.contains(Self::IGNORE_POSITION) {
            out.position = Vec3::ZERO;
        }
        if self.contains(Self::IGNORE_ROTATION) {
            out.rotation = Quat::IDENTITY;
        }
        out
    }

    /// World pose of a child with local pose `local` under `parent`.
    pub fn concat(self, parent: &HPose, local: &HPose) -> HPose {
        self.apply(parent) * *local
    }

    /// Local pose that reproduces `desired` in world space under `parent`.
    ///
    /// Inverse of [`concat`](Self::concat) for the same mask, as long as the
    /// unmasked parent scale has no zero axis. Under a zero axis the result
    /// is finite but cannot reproduce `desired`; see [`HPose::inverse_mul`].
    pub fn rebase(self, parent: &HPose, desired: &HPose) -> HPose {
        self.apply(parent).inverse_mul(desired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    const EPS: f32 = 1e-5;

    fn sample() -> HPose {
        HPose::new(
            Quat::from_euler(glam::EulerRot::YXZ, 0.3, -0.7, 1.1),
            Vec3::new(1.0, -2.0, 3.5),
            Vec3::new(2.0, 0.5, 3.0),
        )
    }

    #[test]
    fn identity_is_neutral() {
        let p = sample();
        assert!((HPose::IDENTITY * p).abs_diff_eq(&p, EPS));
        assert!((p * HPose::IDENTITY).abs_diff_eq(&p, EPS));
        assert_eq!(HPose::default(), HPose::IDENTITY);
        assert_eq!(RPose::default(), RPose::IDENTITY);
    }

    #[test]
    fn parent_scale_and_rotation_apply_to_child_position() {
        let parent = HPose::new(
            Quat::from_rotation_z(FRAC_PI_2),
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(2.0, 1.0, 1.0),
        );
        let child = HPose::from_xyz(1.0, 0.0, 0.0);
        let world = parent * child;
        // Scale x by 2, then rotate +X onto +Y, then offset.
        assert!(world.position.abs_diff_eq(Vec3::new(10.0, 2.0, 0.0), EPS));
        assert!(world.scale.abs_diff_eq(Vec3::new(2.0, 1.0, 1.0), EPS));
    }

    #[test]
    fn inverse_round_trips() {
        let p = sample();
        assert!((p * p.inverse()).abs_diff_eq(&HPose::IDENTITY, EPS));

        let r = p.rigid();
        assert!((r * r.inverse()).abs_diff_eq(&RPose::IDENTITY, EPS));
    }

    #[test]
    fn inverse_mul_solves_composition() {
        let parent = sample();
        let target = HPose::new(
            Quat::from_rotation_x(0.4),
            Vec3::new(-3.0, 0.25, 8.0),
            Vec3::new(0.5, 4.0, 1.0),
        );
        let local = parent.inverse_mul(&target);
        assert!((parent * local).abs_diff_eq(&target, 1e-4));
    }

    #[test]
    fn point_transforms_invert() {
        let p = sample();
        let point = Vec3::new(0.3, 7.0, -1.5);
        let back = p.inverse_transform_point(p.transform_point(point));
        assert!(back.abs_diff_eq(point, 1e-4));

        let r = p.rigid();
        let back = r.inverse_transform_point(r.transform_point(point));
        assert!(back.abs_diff_eq(point, 1e-4));
    }

    #[test]
    fn matrix_matches_point_transform() {
        let p = sample();
        let point = Vec3::new(1.0, 2.0, 3.0);
        let via_matrix = p.to_matrix().transform_point3(point);
        assert!(via_matrix.abs_diff_eq(p.transform_point(point), 1e-4));
    }

    #[test]
    fn basis_vectors() {
        let r = RPose::from_rotation(Quat::from_rotation_y(FRAC_PI_2));
        assert!(r.forward().abs_diff_eq(Vec3::NEG_X, EPS));
        assert!(r.right().abs_diff_eq(Vec3::NEG_Z, EPS));
        assert!(r.up().abs_diff_eq(Vec3::Y, EPS));
    }

    #[test]
    fn nlerp_endpoints_and_midpoint() {
        let a = RPose::from_position(Vec3::ZERO);
        let b = RPose::new(Quat::from_rotation_y(FRAC_PI_2), Vec3::new(2.0, 0.0, 0.0));

        assert!(RPose::nlerp(&a, &b, 0.0).abs_diff_eq(&a, EPS));
        assert!(RPose::nlerp(&a, &b, 1.0).abs_diff_eq(&b, EPS));

        let mid = RPose::nlerp(&a, &b, 0.5);
        assert!(mid.is_normalized());
        assert_relative_eq!(mid.position.x, 1.0, epsilon = EPS);
        let angle = mid.rotation.angle_between(Quat::IDENTITY);
        assert_relative_eq!(angle, FRAC_PI_2 / 2.0, epsilon = 1e-3);
    }

    #[test]
    fn nlerp_takes_shortest_arc() {
        let a = RPose::from_rotation(Quat::from_rotation_z(0.1));
        let b = RPose::from_rotation(-Quat::from_rotation_z(0.3));
        let mid = RPose::nlerp(&a, &b, 0.5);
        let expected = Quat::from_rotation_z(0.2);
        assert!(quat_eq(mid.rotation, expected, 1e-3));
    }

    #[test]
    fn negated_quaternion_compares_equal() {
        let a = RPose::from_rotation(Quat::from_rotation_x(1.0));
        let b = RPose::from_rotation(-Quat::from_rotation_x(1.0));
        assert!(a.abs_diff_eq(&b, EPS));
    }

    #[test]
    fn mask_apply_resets_channels() {
        let p = sample();
        let all = PoseMask::all().apply(&p);
        assert!(all.abs_diff_eq(&HPose::IDENTITY, EPS));

        let no_scale = PoseMask::IGNORE_SCALE.apply(&p);
        assert_eq!(no_scale.scale, Vec3::ONE);
        assert_eq!(no_scale.position, p.position);
        assert_eq!(no_scale.rotation, p.rotation);

        let rigid = PoseMask::IGNORE_POSITION.apply_rigid(&p.rigid());
        assert_eq!(rigid.position, Vec3::ZERO);
        assert_eq!(rigid.rotation, p.rotation);
    }

    #[test]
    fn rebase_inverts_concat_for_every_mask() {
        let parent = sample();
        let desired = HPose::new(
            Quat::from_rotation_y(-0.8),
            Vec3::new(4.0, 4.0, -4.0),
            Vec3::splat(1.5),
        );
        for bits in 0..=PoseMask::all().bits() {
            let mask = PoseMask::from_bits_truncate(bits);
            let local = mask.rebase(&parent, &desired);
            let world = mask.concat(&parent, &local);
            assert!(world.abs_diff_eq(&desired, 1e-4), "mask {mask:?}");
        }
    }

    #[test]
    fn composition_stays_unit_length() {
        // Slightly denormalized, as accumulated float error leaves it.
        let parent = HPose::new(
            Quat::from_xyzw(0.3, -0.2, 0.5, 0.79),
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::new(1.3, 0.7, 2.0),
        );
        let child = sample();
        assert!((parent * child).is_normalized());
        assert!(parent.inverse_mul(&child).is_normalized());
        assert!(parent.inverse().is_normalized());
        assert!((parent.rigid() * child.rigid()).is_normalized());
    }

    #[test]
    fn rebase_under_zero_scale_stays_finite() {
        let parent = HPose::new(
            Quat::from_rotation_z(0.5),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 2.0, 1.0),
        );
        let desired = sample();
        for mask in [PoseMask::empty(), PoseMask::IGNORE_ROTATION] {
            let local = mask.rebase(&parent, &desired);
            assert!(local.position.is_finite() && local.scale.is_finite(), "{mask:?}");
            assert!(!mask.concat(&parent, &local).is_nan());
        }
        // Masking the scale out makes the parent invertible again.
        let local = PoseMask::IGNORE_SCALE.rebase(&parent, &desired);
        let world = PoseMask::IGNORE_SCALE.concat(&parent, &local);
        assert!(world.abs_diff_eq(&desired, 1e-4));
    }

    #[test]
    fn nan_detection() {
        let mut p = HPose::IDENTITY;
        assert!(!p.is_nan());
        p.scale.y = f32::NAN;
        assert!(p.is_nan());
        assert!(!p.rigid().is_nan());
    }

    #[test]
    fn pose_json_shape() {
        let json = serde_json::to_value(HPose::from_xyz(1.0, 2.0, 3.0)).unwrap();
        assert_eq!(json["position"], serde_json::json!([1.0, 2.0, 3.0]));
        assert_eq!(json["scale"], serde_json::json!([1.0, 1.0, 1.0]));
        let back: HPose = serde_json::from_value(json).unwrap();
        assert_eq!(back, HPose::from_xyz(1.0, 2.0, 3.0));
    }
}
