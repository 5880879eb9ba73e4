use std::collections::HashMap;

use log::{debug, warn};

use crate::config::{rigid_matrix, scale_matrix, translation_matrix, Mat3, Mat4, Quat, Vec3};
use crate::error::{Error, Result};

pub const BASE_FRAME: &str = "BASE";

const INVALID_NAME_CHARACTERS: &str = "{}[],;: \t\n\r#";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(usize);

impl FrameId {
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Time-varying transform layered on top of a frame's rest transform.
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub translation: Vec3,
    /// Euler angles in degrees, kept for display; `rotation` is authoritative.
    pub rotation_angles: Vec3,
    pub rotation: Quat,
    pub scaling: Vec3,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            translation: Vec3::zeros(),
            rotation_angles: Vec3::zeros(),
            rotation: Quat::identity(),
            scaling: Vec3::repeat(1.0),
        }
    }
}

impl Pose {
    /// `translate * rotate * scale`, applied to child-local points.
    pub fn to_matrix(&self) -> Mat4 {
        translation_matrix(&self.translation) * self.rotation.to_homogeneous() * scale_matrix(&self.scaling)
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub name: String,
    parent: Option<FrameId>,
    children: Vec<FrameId>,
    joint_rotation: Mat3,
    joint_translation: Vec3,
    rest_transform: Mat4,
    rest_world_transform: Mat4,
    pub pose: Pose,
    pose_transform: Mat4,
}

impl Frame {
    fn new(name: String, parent: Option<FrameId>, joint_rotation: Mat3, joint_translation: Vec3) -> Self {
        Self {
            name,
            parent,
            children: Vec::new(),
            joint_rotation,
            joint_translation,
            rest_transform: Mat4::identity(),
            rest_world_transform: Mat4::identity(),
            pose: Pose::default(),
            pose_transform: Mat4::identity(),
        }
    }

    pub const fn parent(&self) -> Option<FrameId> {
        self.parent
    }

    pub fn children(&self) -> &[FrameId] {
        &self.children
    }

    pub const fn joint_rotation(&self) -> &Mat3 {
        &self.joint_rotation
    }

    pub const fn joint_translation(&self) -> &Vec3 {
        &self.joint_translation
    }

    pub const fn rest_transform(&self) -> &Mat4 {
        &self.rest_transform
    }

    pub const fn rest_world_transform(&self) -> &Mat4 {
        &self.rest_world_transform
    }

    /// World transform from the last [`Skeleton::update_frames`].
    pub const fn pose_transform(&self) -> &Mat4 {
        &self.pose_transform
    }

    pub fn world_translation(&self) -> Vec3 {
        self.pose_transform.fixed_view::<3, 1>(0, 3).into_owned()
    }
}

/// Frame names may not be purely numeric or contain reserved characters.
pub fn sanitize_frame_name(name: &str) -> Result<String> {
    if let Some(character) = name.chars().find(|c| INVALID_NAME_CHARACTERS.contains(*c)) {
        return Err(Error::InvalidFrameName {
            name: name.to_string(),
            character,
        });
    }

    let is_numeric = name.chars().any(|c| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'));
    if is_numeric {
        warn!("Invalid frame name '{}': frame name should not be numeric only", name);
        return Ok(format!("_{}", name));
    }

    Ok(name.to_string())
}

/// Arena of frames rooted at [`BASE_FRAME`].
#[derive(Debug, Clone)]
pub struct Skeleton {
    frames: Vec<Frame>,
    names: HashMap<String, FrameId>,
    rest_initialized: bool,
}

impl Default for Skeleton {
    fn default() -> Self {
        Self::new()
    }
}

impl Skeleton {
    pub fn new() -> Self {
        let mut names = HashMap::new();
        names.insert(BASE_FRAME.to_string(), FrameId(0));

        Self {
            frames: vec![Frame::new(BASE_FRAME.to_string(), None, Mat3::identity(), Vec3::zeros())],
            names,
            rest_initialized: false,
        }
    }

    pub const fn root(&self) -> FrameId {
        FrameId(0)
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn add_frame(&mut self, parent_name: &str, name: &str, joint_rotation: Mat3, joint_translation: Vec3) -> Result<FrameId> {
        let name = sanitize_frame_name(name)?;
        let parent_name = sanitize_frame_name(parent_name)?;

        let Some(parent) = self.find(&parent_name) else {
            return Err(Error::UnknownParent { frame: name, parent: parent_name });
        };
        if self.names.contains_key(&name) {
            return Err(Error::DuplicateFrame(name));
        }

        let id = FrameId(self.frames.len());
        debug!("Adding frame {} (parent {})", name, parent_name);
        self.frames.push(Frame::new(name.clone(), Some(parent), joint_rotation, joint_translation));
        self.frames[parent.0].children.push(id);
        self.names.insert(name, id);
        self.rest_initialized = false;

        Ok(id)
    }

    pub fn find(&self, name: &str) -> Option<FrameId> {
        self.names.get(name).copied()
    }

    pub fn frame(&self, id: FrameId) -> &Frame {
        &self.frames[id.0]
    }

    pub fn frame_mut(&mut self, id: FrameId) -> &mut Frame {
        &mut self.frames[id.0]
    }

    pub fn frame_by_name(&self, name: &str) -> Option<&Frame> {
        self.find(name).map(|id| self.frame(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (FrameId, &Frame)> + use<'_> {
        self.frames.iter().enumerate().map(|(i, frame)| (FrameId(i), frame))
    }

    /// Frames in depth-first order, parents before children.
    pub fn depth_first(&self) -> Vec<FrameId> {
        let mut order = Vec::with_capacity(self.frames.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.frames[id.0].children.iter().rev().copied());
        }

        order
    }

    pub fn reset_poses(&mut self) {
        for frame in &mut self.frames {
            frame.pose = Pose::default();
        }
    }

    pub const fn is_rest_initialized(&self) -> bool {
        self.rest_initialized
    }

    pub fn init_rest_transforms(&mut self) {
        for id in self.depth_first() {
            let frame = &self.frames[id.0];
            let rest = rigid_matrix(&frame.joint_rotation, &frame.joint_translation);
            let parent_rest_world = match frame.parent {
                Some(parent) => self.frames[parent.0].rest_world_transform,
                None => Mat4::identity(),
            };

            let frame = &mut self.frames[id.0];
            frame.rest_transform = rest;
            frame.rest_world_transform = parent_rest_world * rest;
        }

        self.rest_initialized = true;
    }

    /// Recomputes every frame's world transform from its rest transform,
    /// its current pose and its parent's world transform.
    pub fn update_frames(&mut self) {
        if !self.rest_initialized {
            self.init_rest_transforms();
        }

        self.update_pose_transform(self.root(), &Mat4::identity());
    }

    fn update_pose_transform(&mut self, id: FrameId, parent_pose_transform: &Mat4) {
        let frame = &mut self.frames[id.0];
        frame.pose_transform = parent_pose_transform * frame.rest_transform * frame.pose.to_matrix();

        let pose_transform = frame.pose_transform;
        for i in 0..self.frames[id.0].children.len() {
            let child = self.frames[id.0].children[i];
            self.update_pose_transform(child, &pose_transform);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use super::*;

    fn chain() -> Skeleton {
        let mut skeleton = Skeleton::new();
        skeleton.add_frame("BASE", "PELVIS", Mat3::identity(), Vec3::new(0.0, 1.0, 0.0)).unwrap();
        skeleton.add_frame("PELVIS", "TORSO", Mat3::identity(), Vec3::new(0.0, 1.0, 0.0)).unwrap();
        skeleton.add_frame("PELVIS", "THIGH_R", Mat3::identity(), Vec3::new(0.0, 0.0, 0.2)).unwrap();
        skeleton
    }

    #[test]
    fn base_frame_exists() {
        let skeleton = Skeleton::new();
        assert_eq!(skeleton.find(BASE_FRAME), Some(skeleton.root()));
        assert_eq!(skeleton.num_frames(), 1);
    }

    #[test]
    fn parent_must_exist() {
        let mut skeleton = Skeleton::new();
        let err = skeleton.add_frame("PELVIS", "TORSO", Mat3::identity(), Vec3::zeros()).unwrap_err();
        assert!(matches!(err, Error::UnknownParent { .. }));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut skeleton = chain();
        let err = skeleton.add_frame("BASE", "TORSO", Mat3::identity(), Vec3::zeros()).unwrap_err();
        assert!(matches!(err, Error::DuplicateFrame(_)));
    }

    #[test]
    fn frame_names_are_sanitized() {
        assert_eq!(sanitize_frame_name("12").unwrap(), "_12");
        assert_eq!(sanitize_frame_name("UPPERARM_L").unwrap(), "UPPERARM_L");
        assert!(matches!(
            sanitize_frame_name("LEFT ARM"),
            Err(Error::InvalidFrameName { character: ' ', .. })
        ));
        assert!(sanitize_frame_name("arm#1").is_err());
    }

    #[test]
    fn depth_first_visits_parents_first() {
        let skeleton = chain();
        let order: Vec<_> = skeleton.depth_first().into_iter().map(|id| skeleton.frame(id).name.as_str()).collect();
        assert_eq!(order, ["BASE", "PELVIS", "TORSO", "THIGH_R"]);
    }

    #[test]
    fn rest_world_accumulates_ancestors() {
        let mut skeleton = chain();
        assert!(!skeleton.is_rest_initialized());
        skeleton.update_frames();
        assert!(skeleton.is_rest_initialized());

        let torso = skeleton.frame_by_name("TORSO").unwrap();
        assert!((torso.world_translation() - Vec3::new(0.0, 2.0, 0.0)).norm() < 1.0e-6);
        let rest_world = torso.rest_world_transform().fixed_view::<3, 1>(0, 3).into_owned();
        assert!((rest_world - Vec3::new(0.0, 2.0, 0.0)).norm() < 1.0e-6);

        // adding a frame invalidates the cache
        skeleton.add_frame("TORSO", "HEAD", Mat3::identity(), Vec3::new(0.0, 0.5, 0.0)).unwrap();
        assert!(!skeleton.is_rest_initialized());
    }

    #[test]
    fn parent_rotation_applies_before_child_offset() {
        let mut skeleton = chain();
        let pelvis = skeleton.find("PELVIS").unwrap();
        skeleton.frame_mut(pelvis).pose.rotation = Quat::from_axis_angle(&Vec3::z_axis(), FRAC_PI_2);
        skeleton.update_frames();

        let pelvis = skeleton.frame_by_name("PELVIS").unwrap();
        assert!((pelvis.world_translation() - Vec3::new(0.0, 1.0, 0.0)).norm() < 1.0e-6);

        let torso = skeleton.frame_by_name("TORSO").unwrap();
        assert!((torso.world_translation() - Vec3::new(-1.0, 1.0, 0.0)).norm() < 1.0e-6);
    }

    #[test]
    fn pose_translation_and_scale_compose() {
        let mut skeleton = chain();
        let pelvis = skeleton.find("PELVIS").unwrap();
        skeleton.frame_mut(pelvis).pose.translation = Vec3::new(0.5, 0.0, 0.0);
        skeleton.frame_mut(pelvis).pose.scaling = Vec3::new(2.0, 2.0, 2.0);
        skeleton.update_frames();

        let torso = skeleton.frame_by_name("TORSO").unwrap();
        assert!((torso.world_translation() - Vec3::new(0.5, 3.0, 0.0)).norm() < 1.0e-6);

        skeleton.reset_poses();
        skeleton.update_frames();
        let torso = skeleton.frame_by_name("TORSO").unwrap();
        assert!((torso.world_translation() - Vec3::new(0.0, 2.0, 0.0)).norm() < 1.0e-6);
    }
}
