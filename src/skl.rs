use std::path::Path;

use glam::{EulerRot, Mat4, Vec3};

use crate::skeleton::{Skeleton, SkeletonError};

#[derive(Debug, thiserror::Error)]
pub enum SklError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported skl version ({0})")]
    UnsupportedVersion(i32),

    #[error(transparent)]
    Skeleton(#[from] SkeletonError),
}

/// Which block of the file we are currently reading. Both blocks are
/// terminated by a line containing `end`.
enum Section {
    Idle,
    Nodes,
    Skeleton,
}

/// Split a line into whitespace-separated tokens, treating a quoted span as a
/// single token with the quotes stripped. Bone names usually arrive quoted.
fn split_line(line: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut in_string = false;
    let mut start: Option<usize> = None;

    for (i, ch) in line.char_indices() {
        if ch == '"' {
            if let Some(s) = start.take() {
                tokens.push(&line[s..i]);
            }
            if !in_string {
                start = Some(i + 1);
            }
            in_string = !in_string;
        } else if ch.is_whitespace() && !in_string {
            if let Some(s) = start.take() {
                tokens.push(&line[s..i]);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }

    if let Some(s) = start {
        tokens.push(&line[s..]);
    }

    tokens
}

/// The file stores positions and rotations in a convention with the y and z
/// axes exchanged and the opposite handedness; conjugate by the axis swap and
/// transpose to bring a rotation into ours.
fn convert_rotation(euler: Vec3) -> Mat4 {
    let rotation = Mat4::from_euler(EulerRot::XYZ, euler.x, euler.y, euler.z);
    let flip = Mat4::from_cols_array(&[
        1.0, 0.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);
    (flip * rotation * flip).transpose()
}

/// Load a version 1 `.skl` bone hierarchy file and regenerate the transform
/// caches once before handing the rig over.
pub fn load_skl(path: impl AsRef<Path>) -> Result<Skeleton, SklError> {
    let data = std::fs::read_to_string(path)?;
    parse_skl(&data)
}

pub fn parse_skl(data: &str) -> Result<Skeleton, SklError> {
    let mut skeleton = Skeleton::new();
    let mut section = Section::Idle;

    for line in data.lines() {
        let tokens = split_line(line);
        let Some(&first) = tokens.first() else {
            continue;
        };

        match section {
            Section::Idle => match first {
                "version" => {
                    // A version line that does not parse is ignored, like any
                    // other unrecognized line outside a section.
                    let version = tokens.get(1).and_then(|token| token.parse::<i32>().ok());
                    if let Some(version) = version {
                        if version != 1 {
                            return Err(SklError::UnsupportedVersion(version));
                        }
                    }
                }
                "nodes" => section = Section::Nodes,
                "skeleton" => section = Section::Skeleton,
                _ => {}
            },

            Section::Nodes => {
                if first == "end" {
                    section = Section::Idle;
                } else if let [id, name, parent_id] = tokens[..] {
                    match (id.parse::<i32>(), parent_id.parse::<i32>()) {
                        (Ok(id), Ok(parent_id)) => skeleton.add_bone(name, id, parent_id),
                        _ => tracing::warn!("Malformed node line: {line}"),
                    }
                }
            }

            Section::Skeleton => {
                if first == "end" {
                    section = Section::Idle;
                } else if let Some((id, values)) = parse_pose_line(&tokens) {
                    if let Some(bone) = skeleton.bone_by_id_mut(id) {
                        let [x, y, z, rx, ry, rz] = values;
                        // The file's y and z axes are swapped relative to ours.
                        bone.position = Vec3::new(x, z, y);
                        bone.rotation = convert_rotation(Vec3::new(rx, ry, rz));
                    }
                }
            }
        }
    }

    skeleton.gen_inv_transforms()?;

    Ok(skeleton)
}

/// Parse `<id> <x> <y> <z> <rx> <ry> <rz>`.
fn parse_pose_line(tokens: &[&str]) -> Option<(i32, [f32; 6])> {
    if tokens.len() != 7 {
        return None;
    }

    let id = tokens[0].parse::<i32>().ok()?;
    let mut values = [0.0; 6];
    for (value, token) in values.iter_mut().zip(&tokens[1..]) {
        *value = token.parse::<f32>().ok()?;
    }

    Some((id, values))
}
