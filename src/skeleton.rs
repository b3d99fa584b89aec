use std::fmt;

use glam::{Mat4, Vec3};

/// Parent id used by [`Skeleton::add_bone`] to mark a root bone.
pub const NO_PARENT: i32 = -1;

#[derive(Debug, thiserror::Error)]
pub enum SkeletonError {
    #[error("Singular world transform for bone {0}")]
    SingularTransform(i32),
}

/// A single joint in the hierarchy. The local `position` and `rotation` are
/// relative to the parent bone's frame, or to the world frame for a root.
#[derive(Clone, Debug)]
pub struct Bone {
    pub id: i32,
    pub name: String,
    pub position: Vec3,
    /// Local orientation. Rotation-only; the translation column stays identity.
    pub rotation: Mat4,
    parent: Option<usize>,
}

impl Bone {
    /// Index of the parent bone in the owning skeleton, or `None` for a root.
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }
}

/// An ordered set of bones plus cached world-space transforms and their
/// inverses, indexed the same as the bone sequence.
///
/// The caches are derived state: they are only valid right after
/// [`Skeleton::gen_transforms`] or [`Skeleton::gen_inv_transforms`], and any
/// mutation to a bone invalidates them until the next regeneration.
#[derive(Clone, Debug, Default)]
pub struct Skeleton {
    bones: Vec<Bone>,
    transforms: Vec<Mat4>,
    inv_transforms: Vec<Mat4>,
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn bones_mut(&mut self) -> &mut [Bone] {
        &mut self.bones
    }

    pub fn transforms(&self) -> &[Mat4] {
        &self.transforms
    }

    pub fn inv_transforms(&self) -> &[Mat4] {
        &self.inv_transforms
    }

    /// Append a bone with identity position/rotation. The parent is resolved
    /// against bones already added; [`NO_PARENT`] marks a root and an unknown
    /// parent id is reported and treated as a root.
    pub fn add_bone(&mut self, name: impl Into<String>, id: i32, parent_id: i32) {
        let parent = self.bone_index_by_id(parent_id);

        self.bones.push(Bone {
            id,
            name: name.into(),
            position: Vec3::ZERO,
            rotation: Mat4::IDENTITY,
            parent,
        });
        self.transforms.push(Mat4::IDENTITY);
        self.inv_transforms.push(Mat4::IDENTITY);
    }

    pub(crate) fn bone_index_by_id(&self, id: i32) -> Option<usize> {
        if id == NO_PARENT {
            return None;
        }

        let index = self.bones.iter().position(|bone| bone.id == id);
        if index.is_none() {
            tracing::warn!("Unknown bone id! ({id})");
        }
        index
    }

    pub fn bone_by_id(&self, id: i32) -> Option<&Bone> {
        self.bone_index_by_id(id).map(|index| &self.bones[index])
    }

    pub fn bone_by_id_mut(&mut self, id: i32) -> Option<&mut Bone> {
        self.bone_index_by_id(id)
            .map(|index| &mut self.bones[index])
    }

    /// Look up a bone by name. Names are not required to be unique; the first
    /// match wins.
    pub fn bone_by_name(&self, name: &str) -> Option<&Bone> {
        let bone = self.bones.iter().find(|bone| bone.name == name);
        if bone.is_none() {
            tracing::warn!("Unknown bone name! ({name})");
        }
        bone
    }

    pub fn bone_by_name_mut(&mut self, name: &str) -> Option<&mut Bone> {
        if self.bones.iter().all(|bone| bone.name != name) {
            tracing::warn!("Unknown bone name! ({name})");
            return None;
        }
        self.bones.iter_mut().find(|bone| bone.name == name)
    }

    /// World-space transform of the bone at `index`, composed by walking the
    /// ancestor chain up to the root. No memoization; each call re-walks the
    /// chain.
    pub fn bone_transform(&self, index: usize) -> Mat4 {
        let bone = &self.bones[index];
        let local = Mat4::from_translation(bone.position) * bone.rotation;
        match bone.parent {
            None => local,
            Some(parent) => self.bone_transform(parent) * local,
        }
    }

    /// Recompute the world transform cache for every bone.
    pub fn gen_transforms(&mut self) {
        for index in 0..self.bones.len() {
            self.transforms[index] = self.bone_transform(index);
        }
    }

    /// Recompute both the world transform cache and the inverse transform
    /// cache. Fails if any bone's world transform is not invertible; after an
    /// error both caches are partially written and must not be read until a
    /// later regeneration succeeds.
    pub fn gen_inv_transforms(&mut self) -> Result<(), SkeletonError> {
        for index in 0..self.bones.len() {
            let transform = self.bone_transform(index);
            self.transforms[index] = transform;

            if transform.determinant().abs() <= f32::EPSILON {
                return Err(SkeletonError::SingularTransform(self.bones[index].id));
            }
            self.inv_transforms[index] = transform.inverse();
        }
        Ok(())
    }
}

impl fmt::Display for Skeleton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, bone) in self.bones.iter().enumerate() {
            write!(
                f,
                "Bone {index}: {} {} {}",
                bone.id, bone.name, bone.position
            )?;
            match bone.parent {
                None => writeln!(f, " ROOT")?,
                Some(parent) => writeln!(f, " {}", self.bones[parent].id)?,
            }
        }
        Ok(())
    }
}
