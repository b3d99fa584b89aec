//! An articulated skeletal rig for character animation: a hierarchy of named
//! bones with local transforms, cached world-space transform arrays for
//! downstream skinning, a closed-form two-joint inverse kinematics solver and
//! a loader for the text-based `.skl` hierarchy format.

mod ik;
mod skeleton;
mod skl;

pub use ik::{IkError, solve_two_joint};
pub use skeleton::{Bone, NO_PARENT, Skeleton, SkeletonError};
pub use skl::{SklError, load_skl, parse_skl};
