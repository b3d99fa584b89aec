use std::f32::consts::PI;

use glam::{Mat4, Vec3};

use crate::skeleton::Skeleton;

/// Slack subtracted from the chain's full reach when clamping the target, so
/// the planar solve never sees a perfectly extended (degenerate) triangle.
const REACH_SLACK: f32 = 0.01;

#[derive(Debug, thiserror::Error)]
pub enum IkError {
    #[error("Unknown bone id for IK chain ({0})")]
    UnknownBone(i32),

    #[error("Can only solve two-joint chains (base -> mid -> end)")]
    NotTwoJoint,
}

/// Solve two-joint inverse kinematics for the chain `base -> mid -> end`,
/// where `mid` is `end`'s parent, rotating `base` and `mid` so the end
/// effector moves toward `target` (a world-space point).
///
/// The chain bends within a single plane, spanned by the target and end
/// effector directions seen from `base`. Both joint rotations are applied
/// about that plane's normal: `base` keeps its current orientation and is
/// composed with the shoulder rotation, while `mid`'s local rotation is
/// replaced by the elbow rotation.
///
/// A target outside the solvable angle domain is reported as a warning and
/// leaves both rotations untouched.
pub fn solve_two_joint(
    skeleton: &mut Skeleton,
    base_id: i32,
    end_id: i32,
    target: Vec3,
) -> Result<(), IkError> {
    let base_index = skeleton
        .bone_index_by_id(base_id)
        .ok_or(IkError::UnknownBone(base_id))?;
    let end_index = skeleton
        .bone_index_by_id(end_id)
        .ok_or(IkError::UnknownBone(end_id))?;

    let mid_index = skeleton.bones()[end_index]
        .parent()
        .ok_or(IkError::NotTwoJoint)?;
    if skeleton.bones()[mid_index].parent() != Some(base_index) {
        return Err(IkError::NotTwoJoint);
    }

    let base_world = skeleton.bone_transform(base_index);
    let mut base_pos = base_world.transform_point3(Vec3::ZERO);
    let mut mid_pos = skeleton.bone_transform(mid_index).transform_point3(Vec3::ZERO);
    let mut end_pos = skeleton.bone_transform(end_index).transform_point3(Vec3::ZERO);
    let mut tar_pos = target;

    // Clamp the target inside the chain's reach so the triangle below always
    // closes.
    let reach = base_pos.distance(mid_pos) + mid_pos.distance(end_pos);
    if base_pos.distance(target) >= reach - REACH_SLACK {
        let target_dir = (target - base_pos).normalize();
        tar_pos = base_pos + target_dir * (reach - REACH_SLACK);
    }

    // Work in the base bone's local frame from here on.
    let inv_base = base_world.inverse();
    base_pos = inv_base.transform_point3(base_pos);
    mid_pos = inv_base.transform_point3(mid_pos);
    end_pos = inv_base.transform_point3(end_pos);
    tar_pos = inv_base.transform_point3(tar_pos);

    let angle_x = (tar_pos - base_pos).dot(Vec3::X);

    // The chain bends about the normal of the plane spanned by the target and
    // end effector directions. Project everything into that plane and solve
    // classic 2-link planar IK on the first two coordinates.
    let rot_axis = (tar_pos - base_pos)
        .cross(end_pos - base_pos)
        .normalize();
    let plane_view = Mat4::look_at_lh(Vec3::ZERO, rot_axis, Vec3::Y);

    let base_plane = plane_view.transform_point3(base_pos).truncate();
    let mid_plane = plane_view.transform_point3(mid_pos).truncate();
    let end_plane = plane_view.transform_point3(end_pos).truncate();
    let tar_plane = plane_view.transform_point3(tar_pos).truncate();

    let l1 = base_plane.distance(mid_plane);
    let l2 = mid_plane.distance(end_plane);
    let px = tar_plane.x;
    let py = tar_plane.y;

    // Elbow angle from the law of cosines. Degenerate geometry (collinear
    // chain, axis parallel to the up reference) turns the ratio non-finite
    // and lands in the rejection branch below.
    let r2_frac = (px * px + py * py - l1 * l1 - l2 * l2) / (2.0 * l1 * l2);
    if !(-1.0..=1.0).contains(&r2_frac) {
        tracing::warn!("Could not solve IK, target out of range!");
        return Ok(());
    }
    let r2 = r2_frac.acos();

    // Shoulder angle from the same triangle, with a quadrant correction for
    // the ambiguous analytic branch of atan.
    let r1_top = -(l2 * r2.sin()) * px + (l1 + l2 * r2.cos()) * py;
    let r1_bot = (l2 * r2.sin()) * py + (l1 + l2 * r2.cos()) * px;
    let r1_frac = r1_top / r1_bot;
    let mut r1 = r1_frac.atan();

    if r1_frac > 0.0 {
        r1 += PI;
    }
    if r1_frac <= 0.0 && r2_frac <= 0.0 && angle_x < 0.0 {
        r1 += PI;
    }

    let base_rotation = Mat4::from_axis_angle(rot_axis, r1);
    let mid_rotation = Mat4::from_axis_angle(rot_axis, r2);

    // The base keeps its existing orientation (e.g. twist); the mid joint's
    // rotation is replaced outright.
    let bones = skeleton.bones_mut();
    bones[base_index].rotation = bones[base_index].rotation * base_rotation;
    bones[mid_index].rotation = mid_rotation;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::NO_PARENT;

    /// base at the origin, mid at (1,0,0), end at (2,0,0), all identity
    /// rotations.
    fn straight_arm() -> Skeleton {
        let mut skeleton = Skeleton::new();
        skeleton.add_bone("shoulder", 0, NO_PARENT);
        skeleton.add_bone("elbow", 1, 0);
        skeleton.add_bone("wrist", 2, 1);
        skeleton.bones_mut()[1].position = Vec3::X;
        skeleton.bones_mut()[2].position = Vec3::X;
        skeleton
    }

    fn end_effector_position(skeleton: &Skeleton) -> Vec3 {
        skeleton.bone_transform(2).transform_point3(Vec3::ZERO)
    }

    #[test]
    fn reaches_fully_extended_target() {
        let mut skeleton = straight_arm();
        let target = Vec3::new(0.0, 2.0, 0.0);

        solve_two_joint(&mut skeleton, 0, 2, target).unwrap();

        // The target sits exactly at full reach, so it is clamped to
        // 2 - REACH_SLACK along the same ray before solving.
        let clamped = Vec3::new(0.0, 2.0 - REACH_SLACK, 0.0);
        let end = end_effector_position(&skeleton);
        assert!(end.distance(clamped) < 1e-3, "end effector at {end}");
        assert!(end.distance(target) < 0.02);
    }

    #[test]
    fn clamps_target_beyond_reach() {
        let mut near = straight_arm();
        let mut far = straight_arm();

        solve_two_joint(&mut near, 0, 2, Vec3::new(0.0, 2.0, 0.0)).unwrap();
        solve_two_joint(&mut far, 0, 2, Vec3::new(0.0, 3.0, 0.0)).unwrap();

        // Both targets clamp to the same point on the ray, so the poses match.
        let near_end = end_effector_position(&near);
        let far_end = end_effector_position(&far);
        assert!(near_end.distance(far_end) < 1e-5);
    }

    #[test]
    fn reaches_bent_target() {
        let mut skeleton = straight_arm();
        let target = Vec3::new(1.0, 1.0, 0.0);

        solve_two_joint(&mut skeleton, 0, 2, target).unwrap();

        let end = end_effector_position(&skeleton);
        assert!(end.distance(target) < 1e-3, "end effector at {end}");
    }

    #[test]
    fn out_of_range_target_leaves_pose_unchanged() {
        // Unequal link lengths (l1 = 2, l2 = 1) leave a hollow sphere of
        // radius |l1 - l2| around the base that no pose can reach; a target
        // inside it pushes the law-of-cosines argument below -1.
        let mut skeleton = straight_arm();
        skeleton.bones_mut()[1].position = Vec3::new(2.0, 0.0, 0.0);
        let target = Vec3::new(0.0, 0.5, 0.0);

        solve_two_joint(&mut skeleton, 0, 2, target).unwrap();

        assert_eq!(skeleton.bones()[0].rotation, Mat4::IDENTITY);
        assert_eq!(skeleton.bones()[1].rotation, Mat4::IDENTITY);
    }

    #[test]
    fn collinear_target_leaves_pose_unchanged() {
        // A target on the chain axis gives a zero cross product and no bend
        // plane; the solve degrades to the out-of-range rejection instead of
        // panicking.
        let mut skeleton = straight_arm();
        let target = Vec3::new(1.5, 0.0, 0.0);

        solve_two_joint(&mut skeleton, 0, 2, target).unwrap();

        assert_eq!(skeleton.bones()[0].rotation, Mat4::IDENTITY);
        assert_eq!(skeleton.bones()[1].rotation, Mat4::IDENTITY);
    }

    #[test]
    fn bend_axis_parallel_to_up_leaves_pose_unchanged() {
        // A target in the x-z plane puts the bend axis along +Y, parallel to
        // the view's up reference, so the plane projection degenerates.
        let mut skeleton = straight_arm();
        let target = Vec3::new(1.0, 0.0, 1.0);

        solve_two_joint(&mut skeleton, 0, 2, target).unwrap();

        assert_eq!(skeleton.bones()[0].rotation, Mat4::IDENTITY);
        assert_eq!(skeleton.bones()[1].rotation, Mat4::IDENTITY);
    }

    #[test]
    fn rejects_longer_chains() {
        let mut skeleton = Skeleton::new();
        skeleton.add_bone("a", 0, NO_PARENT);
        skeleton.add_bone("b", 1, 0);
        skeleton.add_bone("c", 2, 1);
        skeleton.add_bone("d", 3, 2);

        let result = solve_two_joint(&mut skeleton, 0, 3, Vec3::ONE);
        assert!(matches!(result, Err(IkError::NotTwoJoint)));
        assert_eq!(skeleton.bones()[0].rotation, Mat4::IDENTITY);
    }

    #[test]
    fn rejects_single_joint_chains() {
        let mut skeleton = Skeleton::new();
        skeleton.add_bone("a", 0, NO_PARENT);
        skeleton.add_bone("b", 1, 0);

        let result = solve_two_joint(&mut skeleton, 0, 1, Vec3::ONE);
        assert!(matches!(result, Err(IkError::NotTwoJoint)));
    }

    #[test]
    fn rejects_unknown_bones() {
        let mut skeleton = straight_arm();
        let result = solve_two_joint(&mut skeleton, 0, 99, Vec3::ONE);
        assert!(matches!(result, Err(IkError::UnknownBone(99))));
    }

    #[test]
    fn base_rotation_composes_with_existing_twist() {
        let mut plain = straight_arm();
        let mut twisted = straight_arm();
        let twist = Mat4::from_axis_angle(Vec3::X, 0.5);
        twisted.bones_mut()[0].rotation = twist;

        // Twist about the chain axis leaves every joint position unchanged,
        // so both solves see congruent geometry.
        let target = Vec3::new(1.0, 1.0, 0.0);
        solve_two_joint(&mut plain, 0, 2, target).unwrap();
        solve_two_joint(&mut twisted, 0, 2, target).unwrap();

        // The new shoulder rotation is composed on top of the prior twist.
        let expected = plain.bones()[0].rotation * twist;
        assert!(twisted.bones()[0].rotation.abs_diff_eq(expected, 1e-4));
        assert!(end_effector_position(&twisted).distance(target) < 1e-3);
    }

    #[test]
    fn mid_rotation_is_replaced_outright() {
        let mut plain = straight_arm();
        let mut prebent = straight_arm();
        // Twist about the chain axis at the elbow does not move the wrist, so
        // both chains present identical geometry to the solver.
        prebent.bones_mut()[1].rotation = Mat4::from_axis_angle(Vec3::X, 0.7);

        let target = Vec3::new(1.0, 1.0, 0.0);
        solve_two_joint(&mut plain, 0, 2, target).unwrap();
        solve_two_joint(&mut prebent, 0, 2, target).unwrap();

        // No trace of the prior elbow rotation survives.
        assert!(
            prebent.bones()[1]
                .rotation
                .abs_diff_eq(plain.bones()[1].rotation, 1e-4)
        );
        assert!(end_effector_position(&prebent).distance(target) < 1e-3);
    }
}
