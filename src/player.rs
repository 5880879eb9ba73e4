use std::path::Path;

use log::{info, warn};

use crate::animation::{Animation, AnimationBinding, AnimationOptions, KeyFrame};
use crate::config::Mat4;
use crate::error::Result;
use crate::model::Model;
use crate::segment::MeshLoader;

/// One model and at most one animation bound to it.
///
/// Loads build new state first and only replace the current state once they
/// succeed, so a failed load leaves the scene as it was.
#[derive(Debug, Clone)]
pub struct Scene {
    model: Model,
    animation: Option<(Animation, AnimationBinding)>,
}

impl Scene {
    pub fn new(model: Model) -> Self {
        Self { model, animation: None }
    }

    pub fn load(model_path: &Path, meshes: &mut dyn MeshLoader) -> Result<Self> {
        Ok(Self::new(Model::load(model_path, meshes)?))
    }

    /// Replaces the model. A loaded animation is re-bound to the new frames;
    /// if that fails the old model and animation are kept.
    pub fn load_model(&mut self, path: &Path, meshes: &mut dyn MeshLoader) -> Result<()> {
        let model = Model::load(path, meshes)?;
        let binding = match &self.animation {
            Some((animation, _)) => Some(model.bind(animation)?),
            None => None,
        };

        self.model = model;
        if let (Some((_, old_binding)), Some(binding)) = (self.animation.as_mut(), binding) {
            *old_binding = binding;
        }

        Ok(())
    }

    pub fn load_animation(&mut self, path: &Path, options: &AnimationOptions) -> Result<()> {
        let (animation, binding) = self.model.load_animation(path, options)?;
        info!(
            "Animation {} has {} keyframes over {} seconds",
            path.display(),
            animation.keyframes().len(),
            animation.duration()
        );

        self.animation = Some((animation, binding));
        Ok(())
    }

    pub fn try_load_animation(&mut self, path: &Path, options: &AnimationOptions) -> bool {
        match self.load_animation(path, options) {
            Ok(()) => true,
            Err(e) => {
                warn!("Keeping previous animation: {}", e);
                false
            }
        }
    }

    pub fn unload_animation(&mut self) -> Option<Animation> {
        self.model.skeleton_mut().reset_poses();
        self.animation.take().map(|(animation, _)| animation)
    }

    pub const fn model(&self) -> &Model {
        &self.model
    }

    pub fn animation(&self) -> Option<&Animation> {
        self.animation.as_ref().map(|(animation, _)| animation)
    }

    pub fn duration(&self) -> f32 {
        self.animation().map_or(0.0, Animation::duration)
    }

    pub fn looping(&self) -> bool {
        self.animation().is_some_and(Animation::looping)
    }

    pub fn set_looping(&mut self, looping: bool) {
        if let Some((animation, _)) = &mut self.animation {
            animation.set_looping(looping);
        }
    }

    pub fn current_time(&self) -> f32 {
        self.animation().map_or(0.0, Animation::current_time)
    }

    pub fn set_time(&mut self, time: f32) {
        if let Some((animation, _)) = &mut self.animation {
            animation.set_time(time);
        }
    }

    pub fn advance(&mut self, delta: f32) {
        if let Some((animation, _)) = &mut self.animation {
            animation.advance(delta);
        }
    }

    /// Interpolates the animation at the current time, poses the frames and
    /// resolves the segments. Returns the sampled keyframe, if any.
    pub fn update(&mut self) -> Option<KeyFrame> {
        let keyframe = self.animation.as_ref().map(|(animation, binding)| {
            let keyframe = animation.current_keyframe();
            binding.apply(&keyframe, self.model.skeleton_mut());
            keyframe
        });

        self.model.update();
        keyframe
    }

    pub fn frame_transform(&self, name: &str) -> Option<&Mat4> {
        self.model.frame_transform(name)
    }

    pub fn segment_transform(&self, name: &str) -> Option<&Mat4> {
        self.model.segment_transform(name)
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::config::Vec3;
    use crate::error::FailureKind;
    use crate::segment::UnitCubeLoader;

    const MODEL: &str = r#"{
        "frames": [
            { "name": "PELVIS", "parent": "BASE" },
            { "name": "TORSO", "parent": "PELVIS", "parent_translation": [0, 1, 0] }
        ],
        "segments": [
            { "name": "chest", "frame": "TORSO", "mesh_filename": "cube.obj", "translate": [0, 0.5, 0] }
        ]
    }"#;

    const ANIMATION: &str = "COLUMNS:\ntime, PELVIS:r:z\nDATA:\n0 0\n1 180\n";

    fn scene(dir: &TempDir) -> Scene {
        let path = dir.path().join("model.json");
        fs::write(&path, MODEL).unwrap();
        Scene::load(&path, &mut UnitCubeLoader).unwrap()
    }

    fn write(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn translation(matrix: &Mat4) -> Vec3 {
        matrix.fixed_view::<3, 1>(0, 3).into_owned()
    }

    #[test]
    fn update_poses_frames_and_segments() {
        let dir = TempDir::new().unwrap();
        let mut scene = scene(&dir);
        scene.load_animation(&write(&dir, "spin.txt", ANIMATION), &AnimationOptions::default()).unwrap();

        scene.set_time(0.5);
        let keyframe = scene.update().unwrap();
        assert!((keyframe.poses[0].rotation.angle() - PI / 2.0).abs() < 1.0e-5);

        let torso = translation(scene.frame_transform("TORSO").unwrap());
        assert!((torso - Vec3::new(-1.0, 0.0, 0.0)).norm() < 1.0e-5);
        let chest = translation(scene.segment_transform("chest").unwrap());
        assert!((chest - Vec3::new(-1.5, 0.0, 0.0)).norm() < 1.0e-5);
    }

    #[test]
    fn playback_controls_follow_the_animation() {
        let dir = TempDir::new().unwrap();
        let mut scene = scene(&dir);
        assert_eq!(scene.duration(), 0.0);
        assert!(scene.update().is_none());

        let options = AnimationOptions {
            looping: true,
            ..AnimationOptions::default()
        };
        scene.load_animation(&write(&dir, "spin.txt", ANIMATION), &options).unwrap();
        assert_eq!(scene.duration(), 1.0);
        assert!(scene.looping());

        scene.set_time(0.75);
        scene.advance(0.5);
        assert!((scene.current_time() - 0.25).abs() < 1.0e-6);

        scene.set_looping(false);
        scene.advance(5.0);
        assert_eq!(scene.current_time(), 1.0);
    }

    #[test]
    fn failed_animation_load_keeps_previous_state() {
        let dir = TempDir::new().unwrap();
        let mut scene = scene(&dir);
        scene.load_animation(&write(&dir, "spin.txt", ANIMATION), &AnimationOptions::default()).unwrap();
        scene.set_time(1.0);
        scene.update();
        let before = *scene.frame_transform("TORSO").unwrap();

        let lenient = AnimationOptions {
            strict: false,
            ..AnimationOptions::default()
        };
        let broken = write(&dir, "broken.txt", "COLUMNS: time, FOO:bogus:z\nDATA:\n0 1\n");
        let err = scene.load_animation(&broken, &lenient).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Malformed);
        assert!(!scene.try_load_animation(&broken, &lenient));

        let unknown = write(&dir, "unknown.txt", "COLUMNS: time, HEAD:r:x\nDATA:\n0 1\n");
        let err = scene.load_animation(&unknown, &lenient).unwrap_err();
        assert_eq!(err.kind(), FailureKind::UnresolvedReference);

        assert_eq!(scene.duration(), 1.0);
        assert_eq!(scene.current_time(), 1.0);
        scene.update();
        assert_eq!(*scene.frame_transform("TORSO").unwrap(), before);
    }

    #[test]
    fn model_reload_rebinds_or_keeps_old_model() {
        let dir = TempDir::new().unwrap();
        let mut scene = scene(&dir);
        scene.load_animation(&write(&dir, "spin.txt", ANIMATION), &AnimationOptions::default()).unwrap();

        let without_pelvis = write(&dir, "other.json", r#"{ "frames": [ { "name": "ROOT", "parent": "BASE" } ] }"#);
        assert!(scene.load_model(&without_pelvis, &mut UnitCubeLoader).is_err());
        assert!(scene.model().skeleton().find("PELVIS").is_some());

        let taller = write(
            &dir,
            "taller.json",
            r#"{ "frames": [
                { "name": "PELVIS", "parent": "BASE" },
                { "name": "TORSO", "parent": "PELVIS", "parent_translation": [0, 2, 0] }
            ] }"#,
        );
        scene.load_model(&taller, &mut UnitCubeLoader).unwrap();
        scene.set_time(1.0);
        scene.update();
        let torso = translation(scene.frame_transform("TORSO").unwrap());
        assert!((torso - Vec3::new(0.0, -2.0, 0.0)).norm() < 1.0e-5);
    }

    #[test]
    fn unloading_resets_poses() {
        let dir = TempDir::new().unwrap();
        let mut scene = scene(&dir);
        scene.load_animation(&write(&dir, "spin.txt", ANIMATION), &AnimationOptions::default()).unwrap();
        scene.set_time(1.0);
        scene.update();

        assert!(scene.unload_animation().is_some());
        scene.update();
        let torso = translation(scene.frame_transform("TORSO").unwrap());
        assert!((torso - Vec3::new(0.0, 1.0, 0.0)).norm() < 1.0e-6);
    }
}
